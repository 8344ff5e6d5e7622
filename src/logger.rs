//! A simple logger for verbose output.

use std::path::Path;

use itertools::Itertools;

/// A logger that prints messages only when verbose mode is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger {
    verbose: bool,
}

impl Logger {
    /// Creates a new `Logger`.
    ///
    /// # Arguments
    ///
    /// * `verbose` - Whether verbose mode is enabled.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Logs a message if verbose mode is enabled.
    pub fn log(&self, msg: &str) {
        if self.verbose {
            eprintln!("[VERBOSE] {}", msg);
        }
    }

    /// Echoes an external command line before it is spawned.
    pub fn log_command(&self, executable: &Path, arguments: &[String]) {
        if self.verbose {
            eprintln!("{} {}", executable.display(), arguments.iter().join(" "));
        }
    }
}
