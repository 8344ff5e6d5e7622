//! Filesystem timestamps behind a trait, so incremental-rebuild decisions can
//! be driven by a deterministic clock in tests.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub trait ModTimeSource {
    /// Modification time of `path`, or an error if it cannot be statted.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
}

/// Reads modification times from the real filesystem.
#[derive(Debug, Default)]
pub struct SystemModTime;

impl ModTimeSource for SystemModTime {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }
}

/// Hands out pre-seeded timestamps; unknown paths report `NotFound`.
#[derive(Debug, Default)]
pub struct FixedModTime {
    times: HashMap<PathBuf, SystemTime>,
}

impl FixedModTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<PathBuf>, time: SystemTime) {
        self.times.insert(path.into(), time);
    }
}

impl ModTimeSource for FixedModTime {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.times.get(path).copied().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no mtime for {}", path.display()))
        })
    }
}
