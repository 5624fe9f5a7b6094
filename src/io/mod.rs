mod local;

pub use local::LocalDir;

use std::io;
use std::path::Path;

/// Kind of a filesystem item found while enumerating a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Directory,
    File,
    /// Sockets, devices and anything else import has no use for.
    Other,
}

/// One direct child of an enumerated directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirItem {
    pub name: String,
    pub kind: ItemKind,
    /// Byte length; only meaningful for files.
    pub size: u64,
}

/// Trait for enumerating the files an archive is imported from
pub trait DirSource {
    /// List the direct children of `dir`
    fn list(&self, dir: &Path) -> io::Result<Vec<DirItem>>;

    /// Describe a single path
    fn stat(&self, path: &Path) -> io::Result<DirItem>;
}
