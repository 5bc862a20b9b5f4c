//! JSON checkpoint of the media index.
//!
//! The checkpoint is a pretty-printed JSON array of [`MediaRecord`]s. Saves
//! go through a sibling temporary file and a rename so an interrupted write
//! leaves the previous checkpoint intact.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::{IndexError, MediaRecord};

/// Default checkpoint location relative to the working directory.
pub const DEFAULT_INDEX_PATH: &str = "media_index.json";

/// Handle to the on-disk index checkpoint.
#[derive(Debug, Clone)]
pub struct IndexFile {
    path: PathBuf,
}

impl IndexFile {
    /// Creates a handle for the checkpoint at `path`. Nothing is touched on disk.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the checkpoint path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true when a checkpoint file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads and validates the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotFound`] when the file is missing,
    /// [`IndexError::Io`] when it cannot be read, [`IndexError::Malformed`]
    /// when it is not a valid index document and [`IndexError::DuplicateId`]
    /// when two records share an id.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Vec<MediaRecord>, IndexError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(error) => return Err(IndexError::io(self.path.clone(), error)),
        };

        let records: Vec<MediaRecord> =
            serde_json::from_slice(&raw).map_err(|e| IndexError::malformed(self.path.clone(), e))?;

        self.ensure_unique_ids(&records)?;

        debug!(records = records.len(), "loaded index checkpoint");
        Ok(records)
    }

    /// Writes `records` as the new checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DuplicateId`] if two records share an id,
    /// [`IndexError::Serialize`] if the records cannot be encoded and
    /// [`IndexError::Io`] if any filesystem step fails. On error the previous
    /// checkpoint, if any, is left in place.
    #[instrument(
        skip(self, records),
        fields(path = %self.path.display(), records = records.len())
    )]
    pub async fn save(&self, records: &[MediaRecord]) -> Result<(), IndexError> {
        self.ensure_unique_ids(records)?;

        let encoded =
            serde_json::to_vec_pretty(records).map_err(|source| IndexError::Serialize { source })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IndexError::io(parent, e))?;
        }

        let temp_path = self.temp_path();
        let write_result = write_synced(&temp_path, &encoded).await;
        if let Err(error) = write_result {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(error);
        }

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| IndexError::io(self.path.clone(), e))?;

        debug!(bytes = encoded.len(), "index checkpoint written");
        Ok(())
    }

    /// Deletes the checkpoint. Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] for failures other than the file being absent.
    pub async fn remove(&self) -> Result<bool, IndexError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(IndexError::io(self.path.clone(), error)),
        }
    }

    // Anything written here must load again.
    fn ensure_unique_ids(&self, records: &[MediaRecord]) -> Result<(), IndexError> {
        let mut seen = HashSet::with_capacity(records.len());
        match records.iter().find(|record| !seen.insert(record.id.as_str())) {
            Some(duplicate) => Err(IndexError::DuplicateId {
                path: self.path.clone(),
                id: duplicate.id.clone(),
            }),
            None => Ok(()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut raw = self.path.clone().into_os_string();
        raw.push(".tmp");
        PathBuf::from(raw)
    }
}

async fn write_synced(path: &Path, contents: &[u8]) -> Result<(), IndexError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| IndexError::io(path, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| IndexError::io(path, e))?;
    file.sync_all().await.map_err(|e| IndexError::io(path, e))?;
    Ok(())
}
