use super::{DirItem, DirSource, ItemKind};
use std::fs;
use std::io;
use std::path::Path;

/// Directory source backed by the local filesystem
///
/// Children are returned sorted by name so repeated imports of the same tree
/// produce the same archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDir;

impl LocalDir {
    pub fn new() -> Self {
        Self
    }
}

fn describe(name: String, metadata: &fs::Metadata) -> DirItem {
    let kind = if metadata.is_dir() {
        ItemKind::Directory
    } else if metadata.is_file() {
        ItemKind::File
    } else {
        ItemKind::Other
    };
    DirItem {
        name,
        kind,
        size: metadata.len(),
    }
}

impl DirSource for LocalDir {
    fn list(&self, dir: &Path) -> io::Result<Vec<DirItem>> {
        let mut items = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            // Follow symlinks the way stat(2) does
            let metadata = fs::metadata(entry.path())?;
            let name = entry.file_name().to_string_lossy().into_owned();
            items.push(describe(name, &metadata));
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    fn stat(&self, path: &Path) -> io::Result<DirItem> {
        let metadata = fs::metadata(path)?;
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(describe(name, &metadata))
    }
}
