//! PAK archive reader and writer.
//!
//! ## Parsing Strategy
//!
//! The header names where the directory table lives. The whole table is read
//! in one go and every record is filed into the [`PathTree`]. Entry bytes are
//! left on disk until something needs them.
//!
//! ## Writing Strategy
//!
//! Every write first recomputes the layout: entry payloads are packed back to
//! back right after the header in canonical traversal order, and the directory
//! table follows the last payload. Offsets are never carried over from the
//! file that was read.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::io::{DirSource, ItemKind};

use super::entry::ArchiveEntry;
use super::structures::{DirectoryRecord, Header, Label, label_segment};
use super::tree::{NodeId, PathTree};

/// A PAK archive held as a tree of directories and entries.
///
/// Built either empty with [`Archive::new`] or from disk with
/// [`Archive::open`]. An opened archive keeps its file handle so entry bytes
/// can be loaded lazily; [`Archive::write`] captures every byte before the
/// destination is truncated, so writing back to the source path is safe.
#[derive(Debug)]
pub struct Archive {
    path: Option<PathBuf>,
    file: Option<File>,
    tree: PathTree,
    directory_offset: i32,
    directory_length: i32,
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

impl Archive {
    /// An empty archive with no backing file.
    pub fn new() -> Self {
        Self {
            path: None,
            file: None,
            tree: PathTree::new(),
            directory_offset: Header::SIZE as i32,
            directory_length: 0,
        }
    }

    /// Open and parse an existing archive.
    ///
    /// Parsing is all-or-nothing: any failure returns an error and no
    /// archive.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let (header, tree) = parse(&mut file)?;
        info!(
            path = %path.display(),
            entries = header.entry_count(),
            "opened archive"
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Some(file),
            tree,
            directory_offset: header.directory_offset,
            directory_length: header.directory_length,
        })
    }

    /// Open `path` if it exists, otherwise start an empty archive.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::open(path)
        } else {
            debug!(path = %path.display(), "starting new archive");
            Ok(Self::new())
        }
    }

    /// Path the archive was opened from or last written to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn tree(&self) -> &PathTree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn header(&self) -> Header {
        Header::new(self.directory_offset, self.directory_length)
    }

    pub fn directory_offset(&self) -> i32 {
        self.directory_offset
    }

    pub fn directory_length(&self) -> i32 {
        self.directory_length
    }

    pub fn entry_count(&self) -> usize {
        self.directory_length as usize / DirectoryRecord::SIZE
    }

    /// Whether a backing file is currently open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Drop the backing file and every entry.
    pub fn close(&mut self) {
        self.file = None;
        self.tree.clear();
    }

    /// Start over as an empty archive; unsaved changes are lost.
    pub fn reset(&mut self) {
        self.close();
        self.path = None;
        self.directory_offset = Header::SIZE as i32;
        self.directory_length = 0;
    }

    /// Resolve a directory path, optionally creating missing directories.
    pub fn find_path(&mut self, path: &str, create: bool) -> Result<NodeId> {
        self.tree.find_path(path, create)
    }

    pub fn find_entry(&self, label: &str) -> Option<&ArchiveEntry> {
        self.tree.find_entry(label)
    }

    /// Directory records of every entry in canonical order.
    pub fn list(&self) -> Result<Vec<DirectoryRecord>> {
        let mut records = Vec::with_capacity(self.tree.entry_count());
        self.tree.for_each_entry(|entry| {
            records.push(entry.record());
            Ok(())
        })?;
        Ok(records)
    }

    /// Lay entries out again and recompute the directory.
    ///
    /// Payloads are assigned back-to-back regions starting right after the
    /// header, in canonical order; the directory table starts where the last
    /// payload ends.
    pub fn reset_directory(&mut self) -> Result<()> {
        let mut offset = Header::SIZE as i32;
        let mut length = 0i32;
        self.tree.for_each_entry_mut(|entry| {
            entry.set_position(offset);
            offset = offset
                .checked_add(entry.length())
                .ok_or(Error::SizeLimitExceeded {
                    requested: offset as u64 + entry.length() as u64,
                })?;
            length = length
                .checked_add(DirectoryRecord::SIZE as i32)
                .ok_or(Error::SizeLimitExceeded {
                    requested: length as u64 + DirectoryRecord::SIZE as u64,
                })?;
            Ok(())
        })?;
        if offset.checked_add(length).is_none() {
            return Err(Error::SizeLimitExceeded {
                requested: offset as u64 + length as u64,
            });
        }

        self.directory_offset = offset;
        self.directory_length = length;
        Ok(())
    }

    /// Add an entry under the directories named by its label.
    pub fn insert(&mut self, entry: ArchiveEntry) -> Result<NodeId> {
        let label = entry.label().to_string();
        let node = self.tree.insert(entry)?;
        if let Err(err) = self.reset_directory() {
            if let Some((node, index)) = self.tree.locate_entry(&label) {
                self.tree.delete_entry(node, index)?;
            }
            self.reset_directory()?;
            return Err(err);
        }
        Ok(node)
    }

    /// Remove the entry at `index` of `node`, then recompute the directory.
    pub fn delete_entry(&mut self, node: NodeId, index: usize) -> Result<ArchiveEntry> {
        let removed = self.tree.delete_entry(node, index)?;
        self.reset_directory()?;
        debug!(label = %removed.label(), "deleted entry");
        Ok(removed)
    }

    /// Remove the child directory at `index` of `node` with everything in it,
    /// then recompute the directory.
    pub fn delete_subtree(&mut self, node: NodeId, index: usize) -> Result<()> {
        self.tree.delete_subtree(node, index)?;
        self.reset_directory()
    }

    /// Remove an entry by its full label.
    pub fn remove_entry(&mut self, label: &str) -> Result<ArchiveEntry> {
        let parent = match label.rfind('/') {
            Some(pos) => self.tree.lookup(&label[..pos])?,
            None => self.root(),
        };
        let index = self
            .tree
            .node(parent)
            .and_then(|node| node.entry_index(label.as_bytes()))
            .ok_or_else(|| Error::DirectoryNotFound(label.to_string()))?;
        self.delete_entry(parent, index)
    }

    /// Remove a directory and its subtree by path.
    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        let node = self.tree.lookup(path)?;
        let parent = self.tree.node(node).and_then(|n| n.parent());
        let (Some(parent), Some(row)) = (parent, self.tree.row(node)) else {
            return Err(Error::DirectoryNotFound(path.to_string()));
        };
        self.delete_subtree(parent, row)?;
        info!(path, "removed directory");
        Ok(())
    }

    /// Load every entry that is not yet resident.
    pub fn load_all(&mut self) -> Result<()> {
        let Self { tree, file, .. } = self;
        tree.for_each_entry_mut(|entry| entry.ensure_loaded(file.as_mut()))
    }

    /// Serialize the archive to `dest`.
    ///
    /// All entry bytes are captured first and the backing file is closed, so
    /// `dest` may be the path the archive was opened from. A failed write
    /// returns an error and leaves `dest` in an undefined state.
    pub fn write(&mut self, dest: &Path) -> Result<()> {
        self.load_all()?;
        self.file = None;
        self.reset_directory()?;

        let mut out = BufWriter::new(File::create(dest)?);
        out.seek(SeekFrom::Start(Header::SIZE as u64))?;

        let mut cursor = Header::SIZE as i64;
        self.tree.for_each_entry(|entry| {
            if i64::from(entry.position()) != cursor {
                return Err(Error::InvalidFormat(format!(
                    "entry {} laid out at {}, expected {}",
                    entry.label(),
                    entry.position(),
                    cursor
                )));
            }
            let data = entry
                .data()
                .ok_or_else(|| Error::NotLoaded(entry.label().to_string()))?;
            out.write_all(data)?;
            cursor += i64::from(entry.length());
            Ok(())
        })?;

        let mut directory_length = 0i32;
        self.tree.for_each_entry(|entry| {
            entry.record().write_to(&mut out)?;
            directory_length += DirectoryRecord::SIZE as i32;
            debug!(label = %entry.label(), position = entry.position(), "wrote entry");
            Ok(())
        })?;
        debug_assert_eq!(directory_length, self.directory_length);

        out.seek(SeekFrom::Start(0))?;
        self.header().write_to(&mut out)?;
        let file = out.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;

        self.path = Some(dest.to_path_buf());
        info!(
            path = %dest.display(),
            entries = self.entry_count(),
            "wrote archive"
        );
        Ok(())
    }

    /// Import the directory tree at `dir` below `target`.
    ///
    /// Labels are the target's path plus the path relative to `dir`. The
    /// whole source is enumerated, validated and loaded before anything is
    /// inserted, so a failed import leaves the archive unchanged. Returns the
    /// number of entries added.
    pub fn import_directory<S: DirSource + ?Sized>(
        &mut self,
        source: &S,
        dir: &Path,
        target: NodeId,
    ) -> Result<usize> {
        let prefix = self.tree.path_label(target);
        let mut batch = ImportBatch::new(self.data_end()?, self.tree.entry_count());
        collect_directory(source, dir, &prefix, &mut batch)?;

        let added = self.apply(batch)?;
        info!(dir = %dir.display(), entries = added, "imported directory");
        Ok(added)
    }

    /// Import a single file below `target`.
    pub fn add_file<S: DirSource + ?Sized>(
        &mut self,
        source: &S,
        path: &Path,
        target: NodeId,
    ) -> Result<()> {
        let item = source.stat(path)?;
        if item.kind != ItemKind::File {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }
        let label = format!("{}{}", self.tree.path_label(target), item.name);
        let mut batch = ImportBatch::new(self.data_end()?, self.tree.entry_count());
        batch.add_file(label, path, item.size)?;
        self.apply(batch)?;
        Ok(())
    }

    fn data_end(&self) -> Result<u64> {
        let mut end = Header::SIZE as u64;
        self.tree.for_each_entry(|entry| {
            end += entry.length() as u64;
            Ok(())
        })?;
        Ok(end)
    }

    fn apply(&mut self, batch: ImportBatch) -> Result<usize> {
        let mut seen = HashSet::new();
        for entry in &batch.entries {
            let label = entry.label().to_string();
            if self.tree.find_entry(&label).is_some() || !seen.insert(label.clone()) {
                return Err(Error::DuplicateEntry(label));
            }
        }

        for dir in &batch.directories {
            self.tree.find_path(dir, true)?;
        }
        let added = batch.entries.len();
        for entry in batch.entries {
            self.tree.insert(entry)?;
        }
        self.reset_directory()?;
        Ok(added)
    }

    /// Export every entry into `dest`, recreating the directory tree.
    pub fn export_all(&mut self, dest: &Path) -> Result<usize> {
        let root = self.root();
        self.export_subtree(root, dest)
    }

    /// Export the subtree at `node` into a directory named after the node
    /// inside `dest`.
    pub fn export_directory(&mut self, node: NodeId, dest: &Path) -> Result<usize> {
        if node == self.root() {
            return self.export_subtree(node, dest);
        }
        let name = self
            .tree
            .node(node)
            .map(|n| n.label().to_string())
            .ok_or_else(|| Error::DirectoryNotFound(format!("{node:?}")))?;
        self.export_subtree(node, &dest.join(name))
    }

    /// Export the subtree at `node` directly into `dest`.
    ///
    /// Each entry's buffer is dropped once its file is written.
    pub fn export_subtree(&mut self, node: NodeId, dest: &Path) -> Result<usize> {
        let Self { tree, file, .. } = self;
        let mut exported = 0;
        for id in tree.canonical_order(node) {
            let mut dir = dest.to_path_buf();
            dir.extend(tree.components(node, id));
            fs::create_dir_all(&dir)?;

            let Some(current) = tree.node_mut(id) else {
                continue;
            };
            for entry in current.entries_mut() {
                entry.export_to(&dir, file.as_mut())?;
                exported += 1;
            }
        }
        info!(dest = %dest.display(), entries = exported, "exported archive");
        Ok(exported)
    }

    /// Export one entry, by full label, into `dest`.
    pub fn export_entry(&mut self, label: &str, dest: &Path) -> Result<PathBuf> {
        let (node, index) = self
            .tree
            .locate_entry(label)
            .ok_or_else(|| Error::DirectoryNotFound(label.to_string()))?;
        let Self { tree, file, .. } = self;
        let entry = tree
            .node_mut(node)
            .and_then(|n| n.entries_mut().get_mut(index))
            .ok_or_else(|| Error::DirectoryNotFound(label.to_string()))?;
        fs::create_dir_all(dest)?;
        entry.export_to(dest, file.as_mut())
    }
}

/// Parse a header and directory table into a tree.
///
/// I/O failures while reading are reported as [`Error::InvalidFormat`]: a
/// file that cannot be read to the end of its directory is not a valid
/// archive.
pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<(Header, PathTree)> {
    let mut buf = [0u8; Header::SIZE];
    reader.seek(SeekFrom::Start(0)).map_err(corrupt)?;
    reader.read_exact(&mut buf).map_err(corrupt)?;
    let header = Header::from_bytes(&buf)?;

    let file_len = reader.seek(SeekFrom::End(0)).map_err(corrupt)?;
    let directory_end = header.directory_offset as u64 + header.directory_length as u64;
    if directory_end > file_len {
        return Err(Error::InvalidFormat(format!(
            "directory ends at {directory_end}, past the end of the file ({file_len} bytes)"
        )));
    }

    let len = header.directory_length as usize;
    let mut table = Vec::new();
    table
        .try_reserve_exact(len)
        .map_err(|_| Error::OutOfMemory { requested: len })?;
    table.resize(len, 0);
    reader
        .seek(SeekFrom::Start(header.directory_offset as u64))
        .map_err(corrupt)?;
    reader.read_exact(&mut table).map_err(corrupt)?;

    let mut tree = PathTree::new();
    for chunk in table.chunks_exact(DirectoryRecord::SIZE) {
        let record = DirectoryRecord::from_bytes(chunk)?;
        tree.insert(ArchiveEntry::from_record(record))?;
    }
    Ok((header, tree))
}

fn corrupt(err: io::Error) -> Error {
    Error::InvalidFormat(format!(
        "error reading directory, file is corrupt or not a PAK file: {err}"
    ))
}

/// Entries gathered by an import before they touch the tree.
///
/// Every file is checked against the final layout (payloads plus the
/// directory table) as it is added, so applying a complete batch cannot
/// overflow the format's 32-bit offsets.
struct ImportBatch {
    directories: Vec<String>,
    entries: Vec<ArchiveEntry>,
    data_end: u64,
    existing: usize,
}

impl ImportBatch {
    fn new(data_end: u64, existing: usize) -> Self {
        Self {
            directories: Vec::new(),
            entries: Vec::new(),
            data_end,
            existing,
        }
    }

    fn add_file(&mut self, label: String, path: &Path, size: u64) -> Result<()> {
        let label = Label::new(&label)?;
        let end = self.data_end.saturating_add(size);
        let records = (self.existing + self.entries.len() + 1) as u64;
        let layout_end = end.saturating_add(records * DirectoryRecord::SIZE as u64);
        if layout_end > i32::MAX as u64 {
            return Err(Error::SizeLimitExceeded {
                requested: layout_end,
            });
        }
        let mut entry = ArchiveEntry::from_file(label, path.to_path_buf(), size as i32);
        entry.load_from_path(path)?;
        debug!(label = %entry.label(), path = %path.display(), "adding file");

        self.data_end = end;
        self.entries.push(entry);
        Ok(())
    }
}

fn collect_directory<S: DirSource + ?Sized>(
    source: &S,
    dir: &Path,
    prefix: &str,
    batch: &mut ImportBatch,
) -> Result<()> {
    for item in source.list(dir)? {
        let path = dir.join(&item.name);
        match item.kind {
            ItemKind::Directory => {
                let prefix = format!("{prefix}{}/", label_segment(&item.name));
                batch.directories.push(prefix.clone());
                collect_directory(source, &path, &prefix, batch)?;
            }
            ItemKind::File => {
                batch.add_file(format!("{prefix}{}", item.name), &path, item.size)?;
            }
            ItemKind::Other => {
                warn!(path = %path.display(), "skipping item that is not a file or directory");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_pak(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut records = Vec::new();
        let mut offset = Header::SIZE as i32;
        for (label, bytes) in entries {
            records.push(DirectoryRecord {
                label: Label::new(label).unwrap(),
                position: offset,
                length: bytes.len() as i32,
            });
            data.extend_from_slice(bytes);
            offset += bytes.len() as i32;
        }

        let mut out = Vec::new();
        Header::new(offset, (records.len() * DirectoryRecord::SIZE) as i32)
            .write_to(&mut out)
            .unwrap();
        out.extend_from_slice(&data);
        for record in &records {
            record.write_to(&mut out).unwrap();
        }
        out
    }

    #[test]
    fn parse_empty_archive() {
        let mut reader = Cursor::new(build_pak(&[]));
        let (header, tree) = parse(&mut reader).unwrap();
        assert_eq!(header.entry_count(), 0);
        assert!(tree.is_empty());
        assert_eq!(tree.node(tree.root()).unwrap().child_count(), 0);
    }

    #[test]
    fn parse_single_nested_entry() {
        let mut reader = Cursor::new(build_pak(&[("textures/wall.bmp", b"0123456789")]));
        let (_, tree) = parse(&mut reader).unwrap();

        let root = tree.node(tree.root()).unwrap();
        assert_eq!(root.child_count(), 1);
        let textures = root.children()[0];
        let node = tree.node(textures).unwrap();
        assert_eq!(node.label(), "textures");
        assert_eq!(node.size(), 1);
        assert_eq!(
            format!("{}{}", tree.path_label(textures), node.entries()[0].file_name()),
            "textures/wall.bmp"
        );
        assert_eq!(node.entries()[0].length(), 10);
        assert!(!node.entries()[0].is_loaded());
    }

    #[test]
    fn parse_rejects_truncated_directory() {
        let mut bytes = build_pak(&[("a.txt", b"abc")]);
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(
            parse(&mut Cursor::new(bytes)),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn parse_rejects_directory_past_end_of_file() {
        let mut bytes = Vec::new();
        Header::new(Header::SIZE as i32, 0x7FFF_FFC0)
            .write_to(&mut bytes)
            .unwrap();
        let err = parse(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(msg) if msg.contains("past the end")));
    }

    #[test]
    fn parse_rejects_short_file() {
        assert!(matches!(
            parse(&mut Cursor::new(b"PACK".to_vec())),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn parse_rejects_duplicate_labels() {
        let bytes = build_pak(&[("a.txt", b"1"), ("a.txt", b"2")]);
        assert!(matches!(
            parse(&mut Cursor::new(bytes)),
            Err(Error::DuplicateEntry(_))
        ));
    }

    #[test]
    fn reset_directory_packs_entries() {
        let mut archive = Archive::new();
        archive
            .insert(ArchiveEntry::from_bytes(Label::new("b/two").unwrap(), vec![0; 20]).unwrap())
            .unwrap();
        archive
            .insert(ArchiveEntry::from_bytes(Label::new("one").unwrap(), vec![0; 5]).unwrap())
            .unwrap();

        let records = archive.list().unwrap();
        assert_eq!(records[0].label.to_string(), "b/two");
        assert_eq!(records[0].position, 12);
        assert_eq!(records[1].position, 32);
        assert_eq!(archive.directory_offset(), 37);
        assert_eq!(archive.directory_length(), 128);
        assert_eq!(archive.entry_count(), 2);
    }

    #[test]
    fn delete_recomputes_layout() {
        let mut archive = Archive::new();
        for (label, len) in [("a/x", 7), ("a/y", 3), ("z", 4)] {
            archive
                .insert(ArchiveEntry::from_bytes(Label::new(label).unwrap(), vec![1; len]).unwrap())
                .unwrap();
        }

        archive.remove_entry("a/x").unwrap();
        let records = archive.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].position, 12);
        assert_eq!(records[1].position, 15);
        assert_eq!(archive.directory_offset(), 19);
        assert_eq!(archive.directory_length(), 2 * DirectoryRecord::SIZE as i32);

        archive.remove_directory("a").unwrap();
        assert_eq!(archive.directory_length(), DirectoryRecord::SIZE as i32);
        assert_eq!(archive.directory_offset(), 16);
        assert!(matches!(
            archive.remove_directory("a"),
            Err(Error::DirectoryNotFound(_))
        ));
    }

    #[test]
    fn delete_by_position_out_of_range() {
        let mut archive = Archive::new();
        let root = archive.root();
        assert!(matches!(
            archive.delete_entry(root, 0),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        ));
        assert!(matches!(
            archive.delete_subtree(root, 3),
            Err(Error::IndexOutOfRange { index: 3, len: 0 })
        ));
    }

    #[test]
    fn reset_clears_everything() {
        let mut archive = Archive::new();
        archive
            .insert(ArchiveEntry::from_bytes(Label::new("a").unwrap(), vec![0; 9]).unwrap())
            .unwrap();
        archive.reset();
        assert!(archive.tree().is_empty());
        assert_eq!(archive.directory_offset(), Header::SIZE as i32);
        assert_eq!(archive.directory_length(), 0);
    }
}
