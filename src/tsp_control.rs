//! TCP control-server skeleton, per spec.md §5/§6, grounded on
//! `examples/original_source/src/libtsduck/plugins/private/tstspControlServer.h`.
//! Not wired into [`crate::cleaner::FileCleaner`]; shows the shape a future
//! remote-control surface for a long-running cleanup would take.

use std::io::Read;
use std::net::{TcpListener, TcpStream};

/// Handles one newline-terminated command received from a control
/// connection.
pub trait ControlCommandHandler: Send {
    fn handle_command(&mut self, line: &str);
}

/// Accepts control connections on `addr` and dispatches commands to
/// `handler`, one connection at a time, until the listener is dropped or an
/// accept fails.
pub fn serve(addr: &str, mut handler: impl ControlCommandHandler) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr)?;
    for stream in listener.incoming() {
        handle_connection(stream?, &mut handler)?;
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    handler: &mut impl ControlCommandHandler,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    for line in String::from_utf8_lossy(&buf).lines() {
        handler.handle_command(line);
    }
    Ok(())
}
