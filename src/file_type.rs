//! Artifact kinds the driver knows how to produce or consume.

use std::fmt;

/// The kind of artifact an action or job conceptually produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// A kemudi source file (`.km`).
    Source,
    /// A compiled object file (`.o`).
    Object,
    /// A binary module description (`.kmod`).
    Module,
    /// Documentation extracted alongside a module (`.kdoc`).
    ModuleDoc,
    /// A generated C interoperability header (`.h`).
    Header,
    /// A make-style dependency listing (`.d`).
    Dependencies,
    /// Serialized diagnostics left behind by a frontend run (`.dia`).
    Diagnostics,
    /// Debug information extracted from a linked image.
    DebugInfo,
    /// A linked image, executable or shared library.
    Image,
    /// No on-disk output at all.
    Nothing,
}

impl FileType {
    /// Classifies a filename extension into an input kind.
    ///
    /// Only the kinds that may legitimately appear on the command line are
    /// recognized here; everything else is an unrecognized input.
    pub fn from_extension(ext: &str) -> Option<FileType> {
        match ext {
            "km" => Some(FileType::Source),
            "o" => Some(FileType::Object),
            "kmod" => Some(FileType::Module),
            _ => None,
        }
    }

    /// The output-kind key used by the output file map format.
    pub fn from_map_key(key: &str) -> Option<FileType> {
        match key {
            "object" => Some(FileType::Object),
            "module" => Some(FileType::Module),
            "module-doc" => Some(FileType::ModuleDoc),
            "header" => Some(FileType::Header),
            "dependencies" => Some(FileType::Dependencies),
            "diagnostics" => Some(FileType::Diagnostics),
            "image" => Some(FileType::Image),
            _ => None,
        }
    }

    /// Suffix used when synthesizing a filename for this type.
    pub fn suffix(self) -> &'static str {
        match self {
            FileType::Source => "km",
            FileType::Object => "o",
            FileType::Module => "kmod",
            FileType::ModuleDoc => "kdoc",
            FileType::Header => "h",
            FileType::Dependencies => "d",
            FileType::Diagnostics => "dia",
            FileType::DebugInfo => "debug",
            FileType::Image | FileType::Nothing => "",
        }
    }

    /// Textual outputs may fall back to stdout when no path was given.
    pub fn is_textual(self) -> bool {
        matches!(self, FileType::Header | FileType::Dependencies)
    }

    pub fn name(self) -> &'static str {
        match self {
            FileType::Source => "source",
            FileType::Object => "object",
            FileType::Module => "module",
            FileType::ModuleDoc => "module-doc",
            FileType::Header => "header",
            FileType::Dependencies => "dependencies",
            FileType::Diagnostics => "diagnostics",
            FileType::DebugInfo => "debug-info",
            FileType::Image => "image",
            FileType::Nothing => "none",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
