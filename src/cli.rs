//! Command-line surface, per spec.md §6, grounded on
//! `examples/original_source/src/tstools/tsfclean.cpp`'s `FileCleanOptions`.

use crate::error::CleanError;
use clap::Parser;
use std::path::PathBuf;

/// Cleans up the PSI structure and elementary stream boundaries of MPEG
/// transport stream files.
#[derive(Debug, Parser)]
#[command(name = "tsfclean", version, about)]
pub struct Cli {
    /// Output file (single input) or directory (two or more inputs).
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Verbose logging.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Debug logging (implies --verbose).
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// One or more input transport stream files.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
}

impl Cli {
    /// The log level this invocation should run at.
    pub fn log_level(&self) -> log::LevelFilter {
        if self.debug {
            log::LevelFilter::Trace
        } else if self.verbose {
            log::LevelFilter::Info
        } else {
            log::LevelFilter::Warn
        }
    }

    /// Resolves the output path for each input, in the same order as
    /// `self.inputs`. Rejects multiple inputs with a non-directory output.
    pub fn resolve_outputs(&self) -> Result<Vec<PathBuf>, CleanError> {
        if self.inputs.len() > 1 {
            if self.output.exists() && !self.output.is_dir() {
                return Err(CleanError::Usage(format!(
                    "{} is not a directory, but {} inputs were given",
                    self.output.display(),
                    self.inputs.len()
                )));
            }
            std::fs::create_dir_all(&self.output)
                .map_err(|e| CleanError::OutputSetup(e.to_string()))?;
            Ok(self
                .inputs
                .iter()
                .map(|input| self.output.join(input.file_name().unwrap_or_default()))
                .collect())
        } else if self.output.is_dir() {
            Ok(vec![self
                .output
                .join(self.inputs[0].file_name().unwrap_or_default())])
        } else {
            Ok(vec![self.output.clone()])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_inputs_reject_an_existing_file_as_output() {
        let dir = std::env::temp_dir().join("tsfclean-cli-test-file");
        std::fs::write(&dir, b"not a directory").unwrap();
        let cli = Cli {
            output: dir.clone(),
            verbose: false,
            debug: false,
            inputs: vec![PathBuf::from("a.ts"), PathBuf::from("b.ts")],
        };
        assert!(cli.resolve_outputs().is_err());
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn single_input_with_directory_output_joins_file_name() {
        let dir = std::env::temp_dir().join("tsfclean-cli-test-dir");
        std::fs::create_dir_all(&dir).unwrap();
        let cli = Cli {
            output: dir.clone(),
            verbose: false,
            debug: false,
            inputs: vec![PathBuf::from("input.ts")],
        };
        let outputs = cli.resolve_outputs().unwrap();
        assert_eq!(outputs, vec![dir.join("input.ts")]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn debug_implies_trace_level() {
        let cli = Cli {
            output: PathBuf::from("out.ts"),
            verbose: false,
            debug: true,
            inputs: vec![PathBuf::from("in.ts")],
        };
        assert_eq!(cli.log_level(), log::LevelFilter::Trace);
    }
}
