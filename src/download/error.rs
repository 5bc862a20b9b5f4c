//! Error types for a single download attempt.
//!
//! Every variant ends the attempt with the record marked `failed`; none of
//! them abort the run. They exist so the worker can log what went wrong.

use std::path::PathBuf;

use thiserror::Error;

use super::FetchError;

/// Errors that can end a download attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The destination file could not be created.
    #[error("failed to create {path}: {source}")]
    CreateFile {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The fetch capability refused or the body stream broke.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Writing body bytes to disk failed.
    #[error("IO error writing to {path}: {source}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The body was too short to be a real media file.
    #[error("truncated download {path}: {bytes} bytes is below the {minimum} byte minimum")]
    Truncated {
        /// Destination path.
        path: PathBuf,
        /// Bytes actually written.
        bytes: u64,
        /// Configured minimum.
        minimum: u64,
    },
}

impl DownloadError {
    /// Creates a file creation error.
    pub fn create_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateFile {
            path: path.into(),
            source,
        }
    }

    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
