use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Cursor, Read, Write};

use crate::error::{Error, Result};

/// Size of the fixed-width label field in a directory record.
pub const LABEL_SIZE: usize = 56;

/// Longest label accepted for new entries; one byte is kept for the NUL.
pub const MAX_LABEL_LEN: usize = LABEL_SIZE - 1;

/// Stand-in node name for a literal `..` path component.
///
/// Quake 2's `pak0.pak` stores a path with a `..` directory. The tree names
/// that directory `dotdot` so it can be created on disk, and the name is
/// mapped back to `..` whenever a label is rebuilt from tree paths. This is a
/// fixed two-way substitution, not path normalization.
///
/// The mapping is not injective: a stored label that already spells
/// `dotdot/x` lands in the same node as `../x`, and labels rebuilt from that
/// node (imports below it, for instance) come out as `../`.
pub const DOTDOT_PLACEHOLDER: &str = "dotdot";

/// Archive header - 12 bytes at offset 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub signature: [u8; 4],
    pub directory_offset: i32,
    pub directory_length: i32,
}

impl Header {
    pub const SIGNATURE: &'static [u8; 4] = b"PACK";
    pub const SIZE: usize = 12;

    pub fn new(directory_offset: i32, directory_length: i32) -> Self {
        Self {
            signature: *Self::SIGNATURE,
            directory_offset,
            directory_length,
        }
    }

    /// Decode and validate a header.
    ///
    /// Fails with [`Error::InvalidFormat`] on a wrong signature, a negative
    /// field, or a directory length that is not a whole number of records.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::InvalidFormat("truncated header".to_string()));
        }

        if &data[0..4] != Self::SIGNATURE {
            return Err(Error::InvalidFormat("not a PAK file".to_string()));
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        let header = Self {
            signature: *Self::SIGNATURE,
            directory_offset: cursor.read_i32::<LittleEndian>()?,
            directory_length: cursor.read_i32::<LittleEndian>()?,
        };

        if header.directory_offset < 0 || header.directory_length < 0 {
            return Err(Error::InvalidFormat(
                "negative directory offset or length".to_string(),
            ));
        }
        if header.directory_length as usize % DirectoryRecord::SIZE != 0 {
            return Err(Error::InvalidFormat(format!(
                "directory length {} is not a multiple of {}; file is corrupt",
                header.directory_length,
                DirectoryRecord::SIZE
            )));
        }

        Ok(header)
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.signature)?;
        out.write_i32::<LittleEndian>(self.directory_offset)?;
        out.write_i32::<LittleEndian>(self.directory_length)
    }

    pub fn entry_count(&self) -> usize {
        self.directory_length as usize / DirectoryRecord::SIZE
    }
}

/// Directory record - 64 bytes: label, data offset, data length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub label: Label,
    pub position: i32,
    pub length: i32,
}

impl DirectoryRecord {
    pub const SIZE: usize = 64;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::InvalidFormat("truncated directory record".to_string()));
        }

        let mut raw = [0u8; LABEL_SIZE];
        let mut cursor = Cursor::new(data);
        cursor.read_exact(&mut raw)?;
        let record = Self {
            label: Label::from_field(&raw),
            position: cursor.read_i32::<LittleEndian>()?,
            length: cursor.read_i32::<LittleEndian>()?,
        };

        if record.position < 0 || record.length < 0 {
            return Err(Error::InvalidFormat(format!(
                "corrupt record for {}: position {}, length {}",
                record.label, record.position, record.length
            )));
        }

        Ok(record)
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.label.to_field())?;
        out.write_i32::<LittleEndian>(self.position)?;
        out.write_i32::<LittleEndian>(self.length)
    }
}

/// An entry's path label.
///
/// Held as the variable-length bytes up to the first NUL. The padded 56-byte
/// form only exists at the encode/decode boundary ([`Label::from_field`],
/// [`Label::to_field`]), so nothing past the first NUL ever survives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(Vec<u8>);

impl Label {
    /// Build a label for a new entry.
    pub fn new(path: &str) -> Result<Self> {
        if path.len() > MAX_LABEL_LEN || path.contains('\0') {
            return Err(Error::PathTooLong {
                path: path.to_string(),
                max: MAX_LABEL_LEN,
            });
        }
        Ok(Self(path.as_bytes().to_vec()))
    }

    /// Decode a fixed-width field, keeping only the bytes before the first NUL.
    pub fn from_field(field: &[u8; LABEL_SIZE]) -> Self {
        let end = field.iter().position(|&b| b == 0).unwrap_or(LABEL_SIZE);
        Self(field[..end].to_vec())
    }

    /// Encode into the NUL-padded fixed-width field.
    pub fn to_field(&self) -> [u8; LABEL_SIZE] {
        let mut field = [0u8; LABEL_SIZE];
        let len = self.0.len().min(LABEL_SIZE);
        field[..len].copy_from_slice(&self.0[..len]);
        field
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tree node names for the directory part of the label (everything
    /// before the last `/`).
    pub fn directory_segments(&self) -> Vec<String> {
        match self.0.iter().rposition(|&b| b == b'/') {
            Some(pos) => tokenize(&String::from_utf8_lossy(&self.0[..pos])),
            None => Vec::new(),
        }
    }

    /// The terminal path component.
    pub fn file_name(&self) -> String {
        let start = self
            .0
            .iter()
            .rposition(|&b| b == b'/')
            .map_or(0, |pos| pos + 1);
        String::from_utf8_lossy(&self.0[start..]).into_owned()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Split a path on `/` into non-empty tree node names.
///
/// A `..` component becomes [`DOTDOT_PLACEHOLDER`].
pub fn tokenize(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if segment == ".." {
                DOTDOT_PLACEHOLDER.to_string()
            } else {
                segment.to_string()
            }
        })
        .collect()
}

/// Map a tree node name back to the path component stored in labels.
pub fn label_segment(node_name: &str) -> &str {
    if node_name == DOTDOT_PLACEHOLDER {
        ".."
    } else {
        node_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_rejects_bad_signature() {
        let mut data = b"PAKK".to_vec();
        data.extend_from_slice(&[12, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(Header::from_bytes(&data), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn header_rejects_partial_directory() {
        let mut data = Vec::new();
        Header::new(12, 65).write_to(&mut data).unwrap();
        assert!(matches!(Header::from_bytes(&data), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn header_is_little_endian() {
        let mut data = Vec::new();
        Header::new(0x0102_0304, 128).write_to(&mut data).unwrap();
        assert_eq!(&data[..4], b"PACK");
        assert_eq!(&data[4..8], &[4, 3, 2, 1]);
        assert_eq!(&data[8..12], &[128, 0, 0, 0]);
        assert_eq!(Header::from_bytes(&data).unwrap().entry_count(), 2);
    }

    #[test]
    fn record_layout() {
        let record = DirectoryRecord {
            label: Label::new("maps/e1m1.bsp").unwrap(),
            position: 12,
            length: 300,
        };
        let mut data = Vec::new();
        record.write_to(&mut data).unwrap();
        assert_eq!(data.len(), DirectoryRecord::SIZE);
        assert_eq!(&data[..13], b"maps/e1m1.bsp");
        assert!(data[13..LABEL_SIZE].iter().all(|&b| b == 0));
        assert_eq!(DirectoryRecord::from_bytes(&data).unwrap(), record);
    }

    #[test]
    fn record_rejects_negative_length() {
        let mut data = vec![0u8; DirectoryRecord::SIZE];
        data[..5].copy_from_slice(b"a.wav");
        data[60..64].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(
            DirectoryRecord::from_bytes(&data),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn label_drops_bytes_after_nul() {
        let mut field = [0u8; LABEL_SIZE];
        field[..5].copy_from_slice(b"a.txt");
        field[6..10].copy_from_slice(b"junk");
        let label = Label::from_field(&field);
        assert_eq!(label.as_bytes(), b"a.txt");
        assert!(label.to_field()[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn label_length_limit() {
        assert!(Label::new(&"a".repeat(MAX_LABEL_LEN)).is_ok());
        assert!(matches!(
            Label::new(&"a".repeat(LABEL_SIZE)),
            Err(Error::PathTooLong { .. })
        ));
    }

    #[test]
    fn label_segments_and_file_name() {
        let label = Label::new("models/../tank/skin.pcx").unwrap();
        assert_eq!(
            label.directory_segments(),
            vec!["models", DOTDOT_PLACEHOLDER, "tank"]
        );
        assert_eq!(label.file_name(), "skin.pcx");

        let flat = Label::new("default.cfg").unwrap();
        assert!(flat.directory_segments().is_empty());
        assert_eq!(flat.file_name(), "default.cfg");
    }

    #[test]
    fn tokenize_skips_empty_segments() {
        assert_eq!(tokenize("/sound//misc/"), vec!["sound", "misc"]);
        assert_eq!(label_segment(DOTDOT_PLACEHOLDER), "..");
        assert_eq!(label_segment("sound"), "sound");
    }
}
