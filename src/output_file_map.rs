//! User-supplied overrides for computed output paths.
//!
//! The map is a JSON record file keyed by input path, each entry mapping
//! output kinds to explicit paths:
//!
//! ```json
//! {
//!     "src/a.km": { "object": "build/a.o", "dependencies": "build/a.d" },
//!     "src/b.km": { "object": "build/b.o" }
//! }
//! ```
//!
//! The driver consults the map first for every derived path and never
//! mutates it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::file_type::FileType;

#[derive(Debug, Error)]
pub enum OutputFileMapError {
    #[error("cannot read output file map: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed output file map: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown output kind '{0}' in output file map")]
    UnknownKind(String),
}

/// Table mapping (input file, output kind) to an explicit path.
#[derive(Debug, Default)]
pub struct OutputFileMap {
    entries: HashMap<PathBuf, HashMap<FileType, PathBuf>>,
}

impl OutputFileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and parses the record file at `path`.
    pub fn load(path: &Path) -> Result<Self, OutputFileMapError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, OutputFileMapError> {
        let raw: HashMap<PathBuf, HashMap<String, PathBuf>> = serde_json::from_str(text)?;
        let mut entries = HashMap::new();
        for (input, kinds) in raw {
            let mut mapped = HashMap::new();
            for (key, path) in kinds {
                let ty = FileType::from_map_key(&key)
                    .ok_or_else(|| OutputFileMapError::UnknownKind(key.clone()))?;
                mapped.insert(ty, path);
            }
            entries.insert(input, mapped);
        }
        Ok(Self { entries })
    }

    /// Explicitly registers an override; tests build maps this way.
    pub fn insert(&mut self, input: impl Into<PathBuf>, kind: FileType, path: impl Into<PathBuf>) {
        self.entries
            .entry(input.into())
            .or_default()
            .insert(kind, path.into());
    }

    pub fn lookup(&self, input: &Path, kind: FileType) -> Option<&Path> {
        self.entries
            .get(input)
            .and_then(|kinds| kinds.get(&kind))
            .map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
