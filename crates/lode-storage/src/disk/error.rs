//! Disk I/O errors.

use std::io;
use std::path::PathBuf;

use lode_common::types::PageId;
use thiserror::Error;

/// Result type for disk operations.
pub type DiskResult<T> = Result<T, DiskError>;

/// Errors that can occur during page I/O.
#[derive(Debug, Error)]
pub enum DiskError {
    /// I/O error during a page read or write.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying error.
        #[from]
        source: io::Error,
    },

    /// Failed to open the database file.
    #[error("failed to open database file {path}: {source}")]
    Open {
        /// Path of the file that could not be opened.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// Operation addressed the invalid page ID sentinel.
    #[error("invalid page ID: {page_id}")]
    InvalidPageId {
        /// The offending page ID.
        page_id: PageId,
    },
}

impl DiskError {
    /// Creates an open error with path context.
    pub fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }
}
