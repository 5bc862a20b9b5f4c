//! Error types for index persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or saving the index checkpoint.
///
/// Every variant is fatal at startup; during a run only the end-of-run
/// checkpoint treats them as fatal.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The checkpoint file does not exist.
    #[error("index checkpoint not found at {path}")]
    NotFound {
        /// Expected checkpoint location.
        path: PathBuf,
    },

    /// Reading, writing or renaming the checkpoint failed.
    #[error("IO error on index checkpoint {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The checkpoint exists but is not a valid index document.
    #[error("malformed index checkpoint {path}: {source}")]
    Malformed {
        /// The checkpoint that failed to parse.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory index could not be serialized.
    #[error("failed to serialize index: {source}")]
    Serialize {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Two records share an id.
    #[error("duplicate media id {id} in index checkpoint {path}")]
    DuplicateId {
        /// The checkpoint containing the duplicate.
        path: PathBuf,
        /// The repeated id.
        id: String,
    },
}

impl IndexError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn malformed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Malformed {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_error_not_found_display() {
        let error = IndexError::NotFound {
            path: PathBuf::from("/tmp/media_index.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"), "Expected 'not found' in: {msg}");
        assert!(msg.contains("/tmp/media_index.json"), "Expected path in: {msg}");
    }

    #[test]
    fn test_index_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = IndexError::io("/tmp/media_index.json", io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/media_index.json"), "Expected path in: {msg}");
        assert!(msg.contains("access denied"), "Expected source in: {msg}");
    }

    #[test]
    fn test_index_error_duplicate_id_display() {
        let error = IndexError::DuplicateId {
            path: PathBuf::from("idx.json"),
            id: "42".to_string(),
        };
        assert!(error.to_string().contains("duplicate media id 42"));
    }
}
