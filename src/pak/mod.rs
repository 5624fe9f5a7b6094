//! PAK archive parsing, editing and writing.
//!
//! ## Architecture
//!
//! - [`structures`]: the on-disk header, directory record and label codec
//! - [`entry`]: one named blob, with its lazily loaded bytes
//! - [`tree`]: the directory tree rebuilt from the flat label space
//! - [`archive`]: parse, relayout, serialize, import and export
//!
//! ## PAK Format Overview
//!
//! A PAK file consists of:
//! 1. A 12-byte header: `PACK`, directory offset, directory length
//! 2. Raw entry payloads
//! 3. The directory table: 64-byte records of a NUL-padded 56-byte label, a
//!    payload offset and a payload length
//!
//! All integers are signed 32-bit little-endian, which caps an archive at
//! 2 GiB.
//!
//! ## Limitations
//!
//! - No compression, encryption or checksums
//! - Every edit is persisted by rewriting the whole file

mod archive;
mod entry;
mod structures;
mod tree;

pub use archive::{Archive, parse};
pub use entry::{ArchiveEntry, EntrySource};
pub use structures::*;
pub use tree::{NodeId, PathTree, TreeNode};
