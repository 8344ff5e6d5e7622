//! Driver diagnostics, collected during graph construction and reported
//! to stderr once the driver knows whether the build can proceed.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Note,
}

/// A single driver diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    /// The input file the diagnostic is about, when there is one.
    pub path: Option<PathBuf>,
}

/// Collects diagnostics and answers "did anything go wrong yet".
///
/// The driver polls `has_errors` after every construction phase; any error
/// aborts the build before a single process is spawned.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors += 1;
        self.diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            message: message.into(),
            path: None,
        });
    }

    /// Reports an error attached to a specific input file.
    pub fn error_at(&mut self, path: &Path, message: impl Into<String>) {
        self.errors += 1;
        self.diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            message: message.into(),
            path: Some(path.to_path_buf()),
        });
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Warning,
            message: message.into(),
            path: None,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Prints every collected diagnostic to stderr.
    pub fn print_all(&self) {
        for diag in &self.diagnostics {
            report(diag);
        }
    }
}

pub fn report(diag: &Diagnostic) {
    let label = match diag.level {
        DiagnosticLevel::Error => "\x1b[31merror\x1b[0m",
        DiagnosticLevel::Warning => "\x1b[33mwarning\x1b[0m",
        DiagnosticLevel::Note => "note",
    };
    eprintln!("{}: {}", label, diag.message);
    if let Some(path) = &diag.path {
        eprintln!(" --> {}", path.display());
    }
}
