use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

use super::structures::{DirectoryRecord, Label};

/// Where an entry's bytes can be reloaded from once they are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    /// Stored in the archive's backing file at `offset`.
    ///
    /// Kept apart from [`ArchiveEntry::position`], which is rewritten by every
    /// directory recompute and describes the layout of the next write.
    Archive { offset: i32 },
    /// Imported from a file on disk.
    File(PathBuf),
    /// Supplied in memory; nothing to reload from.
    Memory,
}

/// One named blob in the archive.
///
/// The entry owns its byte buffer. The buffer is absent until loaded and is
/// dropped again by [`clear`](Self::clear), e.g. after an export.
#[derive(Debug)]
pub struct ArchiveEntry {
    label: Label,
    position: i32,
    length: i32,
    data: Option<Vec<u8>>,
    source: EntrySource,
}

impl ArchiveEntry {
    /// Entry described by a directory record; bytes stay on disk.
    pub fn from_record(record: DirectoryRecord) -> Self {
        Self {
            label: record.label,
            position: record.position,
            length: record.length,
            data: None,
            source: EntrySource::Archive {
                offset: record.position,
            },
        }
    }

    /// Entry backed by a file on disk whose size is already known.
    pub fn from_file(label: Label, path: PathBuf, length: i32) -> Self {
        Self {
            label,
            position: 0,
            length,
            data: None,
            source: EntrySource::File(path),
        }
    }

    /// Entry whose bytes are supplied directly.
    pub fn from_bytes(label: Label, data: Vec<u8>) -> Result<Self> {
        let length = i32::try_from(data.len()).map_err(|_| Error::SizeLimitExceeded {
            requested: data.len() as u64,
        })?;
        Ok(Self {
            label,
            position: 0,
            length,
            data: Some(data),
            source: EntrySource::Memory,
        })
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn file_name(&self) -> String {
        self.label.file_name()
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn set_position(&mut self, position: i32) {
        self.position = position;
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    pub fn set_length(&mut self, length: i32) {
        self.length = length.max(0);
    }

    pub fn source(&self) -> &EntrySource {
        &self.source
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Directory record for the entry at its current position.
    pub fn record(&self) -> DirectoryRecord {
        DirectoryRecord {
            label: self.label.clone(),
            position: self.position,
            length: self.length,
        }
    }

    /// Load the entry's bytes from the archive's open stream.
    ///
    /// The stream position is restored afterwards, so loads can be
    /// interleaved with other sequential reads on the same handle. On failure
    /// the entry stays unloaded.
    pub fn load_from_stream<R: Read + Seek>(&mut self, stream: &mut R) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let offset = match self.source {
            EntrySource::Archive { offset } => offset,
            EntrySource::File(_) | EntrySource::Memory => self.position,
        };

        let saved = stream.stream_position()?;
        let result = read_region(stream, offset, self.length);
        stream.seek(SeekFrom::Start(saved))?;

        self.data = Some(result?);
        debug!(label = %self.label, offset, length = self.length, "loaded entry");
        Ok(())
    }

    /// Load the entry's bytes from a standalone file.
    ///
    /// Reads exactly [`length`](Self::length) bytes, which must already be set
    /// from the file's metadata.
    pub fn load_from_path(&mut self, path: &Path) -> Result<()> {
        let mut file = fs::File::open(path)?;
        let mut buf = allocate(self.length)?;
        file.read_exact(&mut buf)?;
        self.data = Some(buf);
        debug!(label = %self.label, path = %path.display(), "loaded entry from file");
        Ok(())
    }

    /// Make sure the bytes are resident, loading from wherever they live.
    pub fn ensure_loaded<R: Read + Seek>(&mut self, stream: Option<&mut R>) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        if let EntrySource::File(path) = &self.source {
            let path = path.clone();
            return self.load_from_path(&path);
        }
        let Some(stream) = stream.filter(|_| matches!(self.source, EntrySource::Archive { .. }))
        else {
            return Err(Error::NotLoaded(self.label.to_string()));
        };
        self.load_from_stream(stream)
    }

    /// Write the entry into `directory` under its terminal name, then drop
    /// the in-memory buffer.
    pub fn export_to<R: Read + Seek>(
        &mut self,
        directory: &Path,
        stream: Option<&mut R>,
    ) -> Result<PathBuf> {
        self.ensure_loaded(stream)?;
        let target = directory.join(self.file_name());
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| Error::NotLoaded(self.label.to_string()))?;
        fs::write(&target, data)?;
        debug!(label = %self.label, path = %target.display(), "exported entry");

        self.clear();
        Ok(target)
    }

    /// Drop the buffer. Idempotent.
    pub fn clear(&mut self) {
        self.data = None;
    }
}

fn allocate(length: i32) -> Result<Vec<u8>> {
    let len = usize::try_from(length)
        .map_err(|_| Error::InvalidFormat(format!("negative entry length {length}")))?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::OutOfMemory { requested: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

fn read_region<R: Read + Seek>(stream: &mut R, offset: i32, length: i32) -> Result<Vec<u8>> {
    let start = u64::try_from(offset)
        .map_err(|_| Error::InvalidFormat(format!("negative entry offset {offset}")))?;
    let mut buf = allocate(length)?;
    stream.seek(SeekFrom::Start(start))?;
    stream.read_exact(&mut buf)?;
    Ok(buf)
}
