//! Error types for PAK archive operations.
//!
//! Every fallible operation in the library returns [`Result<T>`]. Errors are
//! reported to the immediate caller; nothing is retried or skipped silently.

use std::io;

/// Errors produced while parsing, editing or writing a PAK archive.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Opening, reading, writing or seeking a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bad signature, bad directory length or a corrupt directory record.
    #[error("Invalid PAK file: {0}")]
    InvalidFormat(String),

    /// An entry buffer could not be allocated.
    #[error("Out of memory allocating {requested} bytes")]
    OutOfMemory {
        /// Size of the buffer that failed to allocate.
        requested: usize,
    },

    /// The label does not fit the fixed-width field.
    #[error("Path name too long: {path} (at most {max} bytes)")]
    PathTooLong {
        /// The offending label.
        path: String,
        /// Maximum label length in bytes.
        max: usize,
    },

    /// Two entries share a label under one directory.
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// A directory lookup missed and creation was not requested.
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    /// Delete-by-position referenced a row that does not exist.
    #[error("Index {index} out of range (size {len})")]
    IndexOutOfRange {
        /// Requested position.
        index: usize,
        /// Number of items at the time of the request.
        len: usize,
    },

    /// Data would end past the signed 32-bit offset space of the format.
    #[error("File too large: archive would need {requested} bytes")]
    SizeLimitExceeded {
        /// Total byte count that was requested.
        requested: u64,
    },

    /// Entry bytes are not resident and there is nowhere to load them from.
    #[error("Entry data not available: {0}")]
    NotLoaded(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
