//! # qpak
//!
//! Build, inspect and edit Quake PAK archives.
//!
//! A PAK file is a flat container: a header, raw payloads, and a trailing
//! directory of fixed-size records whose labels are slash-separated paths.
//! This library rebuilds the directory hierarchy from those labels, lets you
//! add and remove entries and whole directories, and writes the archive back
//! with every offset recomputed.
//!
//! ## Features
//!
//! - Lazy loading: entry bytes stay on disk until they are exported or the
//!   archive is rewritten
//! - Import a directory tree from disk, export an archive (or part of it) back
//! - Delete entries or directories; the layout is recomputed after every edit
//! - Byte-stable output: entries are written in a fixed traversal order
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use qpak::{Archive, LocalDir};
//!
//! fn main() -> qpak::Result<()> {
//!     let mut archive = Archive::open(Path::new("pak0.pak"))?;
//!
//!     for record in archive.list()? {
//!         println!("{} ({} bytes)", record.label, record.length);
//!     }
//!
//!     let sound = archive.find_path("sound/custom", true)?;
//!     archive.import_directory(&LocalDir::new(), Path::new("my_sounds"), sound)?;
//!     archive.write(Path::new("pak0.pak"))?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod pak;

pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{DirItem, DirSource, ItemKind, LocalDir};
pub use pak::{Archive, ArchiveEntry, Label, NodeId, PathTree};
