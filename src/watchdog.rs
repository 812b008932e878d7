//! Background stall-timeout guard, per spec.md §5, grounded on
//! `examples/original_source/src/libtsduck/base/algo/tsWatchDog.cpp`. Not
//! wired into [`crate::cleaner::FileCleaner`] — a standalone primitive for
//! callers that want to bound how long one cleanup is allowed to run.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Invoked, once, from the watchdog's own thread when the timeout elapses
/// without an intervening [`WatchDog::reset`].
pub trait TimeoutHandler: Send + 'static {
    fn on_timeout(&mut self);
}

struct State {
    active: bool,
    generation: u64,
}

/// Arms a timeout that fires unless reset before it elapses.
pub struct WatchDog {
    state: Arc<Mutex<State>>,
}

impl WatchDog {
    /// Starts the countdown immediately.
    pub fn new(timeout: Duration, mut handler: impl TimeoutHandler) -> Self {
        let state = Arc::new(Mutex::new(State {
            active: true,
            generation: 0,
        }));
        let thread_state = Arc::clone(&state);
        thread::spawn(move || loop {
            let observed = {
                let s = thread_state.lock().unwrap();
                if !s.active {
                    return;
                }
                s.generation
            };
            thread::sleep(timeout);
            let mut s = thread_state.lock().unwrap();
            if !s.active {
                return;
            }
            if s.generation == observed {
                s.active = false;
                drop(s);
                handler.on_timeout();
                return;
            }
        });
        Self { state }
    }

    /// Restarts the countdown from now.
    pub fn reset(&self) {
        self.state.lock().unwrap().generation += 1;
    }

    /// Permanently disarms the watchdog; `on_timeout` will never fire again.
    pub fn suspend(&self) {
        self.state.lock().unwrap().active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlagHandler(Arc<AtomicBool>);
    impl TimeoutHandler for FlagHandler {
        fn on_timeout(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn fires_after_timeout_without_reset() {
        let fired = Arc::new(AtomicBool::new(false));
        let _dog = WatchDog::new(Duration::from_millis(20), FlagHandler(Arc::clone(&fired)));
        thread::sleep(Duration::from_millis(100));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn suspend_prevents_firing() {
        let fired = Arc::new(AtomicBool::new(false));
        let dog = WatchDog::new(Duration::from_millis(20), FlagHandler(Arc::clone(&fired)));
        dog.suspend();
        thread::sleep(Duration::from_millis(100));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
