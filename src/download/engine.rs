//! Download engine: bounded-concurrency, checkpointed processing of an index.
//!
//! This module provides the [`DownloadEngine`], which drives a
//! [`RecordStore`] from its stored state to a fully resolved one: every
//! record either `done` or `failed`.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use indicatif::ProgressBar;
//! use media_rescue_core::download::{DownloadEngine, Fetcher, RunOptions};
//! use media_rescue_core::index::{IndexFile, RecordStore};
//!
//! # async fn example(fetcher: Arc<dyn Fetcher>) -> Result<(), Box<dyn std::error::Error>> {
//! let index = IndexFile::new("media_index.json");
//! let store = RecordStore::new(index.load().await?);
//! let engine = DownloadEngine::new(10, 10)?;
//! let options = RunOptions::new(Path::new("media"), false);
//! let stats = engine
//!     .process_index(&store, &index, fetcher, &options, &ProgressBar::hidden())
//!     .await?;
//! println!("Success: {}, Failed: {}", stats.success(), stats.fails());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::ProgressBar;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::Fetcher;
use super::worker::download_record;
use crate::index::{IndexError, IndexFile, MediaStatus, RecordStore};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Minimum allowed checkpoint interval.
const MIN_CHECKPOINT_INTERVAL: usize = 1;

/// Maximum allowed checkpoint interval.
const MAX_CHECKPOINT_INTERVAL: usize = 10_000;

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Invalid checkpoint interval provided.
    #[error(
        "invalid checkpoint interval {value}: must be between {MIN_CHECKPOINT_INTERVAL} and {MAX_CHECKPOINT_INTERVAL}"
    )]
    InvalidCheckpointInterval {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The media directory could not be created.
    #[error("cannot create media directory {path}: {source}")]
    MediaDir {
        /// The media directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint that progress tracking depends on could not be written.
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] IndexError),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Per-run inputs to [`DownloadEngine::process_index`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory that receives `{id}.{ext}` files.
    pub media_dir: PathBuf,
    /// Reopen records that failed in an earlier run.
    pub retry_failed: bool,
}

impl RunOptions {
    /// Creates run options.
    #[must_use]
    pub fn new(media_dir: impl Into<PathBuf>, retry_failed: bool) -> Self {
        Self {
            media_dir: media_dir.into(),
            retry_failed,
        }
    }
}

/// Tally of a run.
///
/// Counters are atomics so concurrent workers can update them in any order;
/// final values do not depend on completion order.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    already_done: AtomicUsize,
    previously_failed: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records downloaded successfully in this run.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Records attempted and failed in this run.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Records skipped because they were already `done`.
    #[must_use]
    pub fn already_done(&self) -> usize {
        self.already_done.load(Ordering::SeqCst)
    }

    /// Records skipped because they failed earlier and retry mode is off.
    #[must_use]
    pub fn previously_failed(&self) -> usize {
        self.previously_failed.load(Ordering::SeqCst)
    }

    /// Workers run in this invocation.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.completed() + self.failed()
    }

    /// Every record that ends the run `done`.
    #[must_use]
    pub fn success(&self) -> usize {
        self.already_done() + self.completed()
    }

    /// Every record that ends the run `failed`.
    #[must_use]
    pub fn fails(&self) -> usize {
        self.previously_failed() + self.failed()
    }

    fn record_outcome(&self, status: MediaStatus) {
        if status == MediaStatus::Done {
            self.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_already_done(&self) {
        self.already_done.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_previously_failed(&self) {
        self.previously_failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scheduler for concurrent, resumable media downloads.
///
/// # Concurrency Model
///
/// - Each admitted record runs in its own Tokio task holding a [`RecordLease`](crate::index::RecordLease)
/// - A semaphore permit is acquired before spawning and moved into the task,
///   so it is released when the task ends on every path
/// - Records are admitted in collection order; completions are unordered
/// - The engine awaits every task handle before the final checkpoint
///
/// # Retry Behavior
///
/// One attempt per record per run. Failed records are reopened only by a
/// later run with [`RunOptions::retry_failed`] set.
#[derive(Debug)]
pub struct DownloadEngine {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Configured concurrency limit.
    concurrency: usize,
    /// Admitted records between mid-run checkpoints.
    checkpoint_interval: usize,
}

impl DownloadEngine {
    /// Creates a new engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is outside
    /// 1..=100 and [`EngineError::InvalidCheckpointInterval`] if
    /// `checkpoint_interval` is outside 1..=10000.
    #[instrument(level = "debug")]
    pub fn new(concurrency: usize, checkpoint_interval: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }
        if !(MIN_CHECKPOINT_INTERVAL..=MAX_CHECKPOINT_INTERVAL).contains(&checkpoint_interval) {
            return Err(EngineError::InvalidCheckpointInterval {
                value: checkpoint_interval,
            });
        }

        debug!(concurrency, checkpoint_interval, "creating download engine");

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            checkpoint_interval,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured checkpoint interval.
    #[must_use]
    pub fn checkpoint_interval(&self) -> usize {
        self.checkpoint_interval
    }

    /// Reconciles, downloads and checkpoints every eligible record.
    ///
    /// This method:
    /// 1. Reconciles stored statuses against `options.media_dir`
    /// 2. Writes a checkpoint of the reconciled index
    /// 3. Admits `pending` records in order, up to the concurrency limit
    /// 4. Writes a checkpoint every `checkpoint_interval` admissions
    /// 5. Waits for all workers, then writes the final checkpoint
    ///
    /// `progress` is sized to the number of eligible records and advanced once
    /// per finished worker.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Checkpoint`] if the post-reconcile or the final
    /// checkpoint cannot be written, and [`EngineError::MediaDir`] if the media
    /// directory cannot be created. Mid-run checkpoint failures are logged and
    /// tolerated. Individual download failures never error; they are counted
    /// in the returned stats.
    #[instrument(
        skip_all,
        fields(media_dir = %options.media_dir.display(), retry_failed = options.retry_failed)
    )]
    pub async fn process_index(
        &self,
        store: &RecordStore,
        index: &IndexFile,
        fetcher: Arc<dyn Fetcher>,
        options: &RunOptions,
        progress: &ProgressBar,
    ) -> Result<Arc<DownloadStats>, EngineError> {
        ensure_media_dir(&options.media_dir).await?;

        let report = store.reconcile(&options.media_dir, options.retry_failed).await;
        index.save(&store.snapshot()).await?;

        progress.set_length(report.eligible as u64);
        progress.set_position(0);

        let stats = Arc::new(DownloadStats::new());
        let mut handles: Vec<(usize, JoinHandle<()>)> = Vec::with_capacity(report.eligible);
        let mut admitted = 0usize;

        info!(
            records = store.len(),
            eligible = report.eligible,
            concurrency = self.concurrency,
            "starting downloads"
        );

        for slot in 0..store.len() {
            match store.status(slot) {
                Some(MediaStatus::Done) => {
                    stats.increment_already_done();
                    continue;
                }
                Some(MediaStatus::Failed) => {
                    stats.increment_previously_failed();
                    continue;
                }
                Some(MediaStatus::Pending | MediaStatus::InProgress) => {}
                None => break,
            }

            if admitted > 0 && admitted % self.checkpoint_interval == 0 {
                self.write_periodic_checkpoint(store, index, admitted).await;
            }

            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let Some(lease) = store.lease(slot) else {
                warn!(slot, "record slot already leased; skipping");
                continue;
            };
            admitted += 1;

            let fetcher = Arc::clone(&fetcher);
            let stats = Arc::clone(&stats);
            let progress = progress.clone();
            let media_dir = options.media_dir.clone();

            handles.push((
                slot,
                tokio::spawn(async move {
                    // Permit is dropped when this block exits (RAII)
                    let _permit = permit;
                    let status = download_record(lease, fetcher.as_ref(), &media_dir).await;
                    stats.record_outcome(status);
                    progress.inc(1);
                }),
            ));
        }

        debug!(
            task_count = handles.len(),
            "waiting for downloads to complete"
        );

        for (slot, handle) in handles {
            if let Err(error) = handle.await {
                // The dropped lease has already marked the record failed.
                warn!(slot, %error, "download task panicked");
                stats.increment_failed();
                progress.inc(1);
            }
        }

        index.save(&store.snapshot()).await?;

        info!(
            success = stats.success(),
            fails = stats.fails(),
            attempted = stats.attempted(),
            "download run complete"
        );

        Ok(stats)
    }

    async fn write_periodic_checkpoint(
        &self,
        store: &RecordStore,
        index: &IndexFile,
        admitted: usize,
    ) {
        match index.save(&store.snapshot()).await {
            Ok(()) => debug!(admitted, "periodic checkpoint written"),
            Err(error) => warn!(admitted, %error, "periodic checkpoint failed; continuing"),
        }
    }
}

async fn ensure_media_dir(media_dir: &Path) -> Result<(), EngineError> {
    tokio::fs::create_dir_all(media_dir)
        .await
        .map_err(|source| EngineError::MediaDir {
            path: media_dir.to_path_buf(),
            source,
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::{StreamExt, stream};
    use tempfile::TempDir;

    use super::*;
    use crate::download::{ByteStream, FetchError};
    use crate::index::{MediaRecord, MediaType};

    #[derive(Debug, Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, media_id: &str) -> Result<ByteStream, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if media_id.starts_with("bad") {
                return Err(FetchError::http_status(media_id, 404));
            }
            Ok(stream::iter(vec![Ok(Bytes::from(vec![7u8; 1500]))]).boxed())
        }
    }

    /// Serves every record and keeps a copy of the on-disk checkpoint as it
    /// looked when each fetch started.
    ///
    /// With `block_checkpoints`, a directory is placed on the checkpoint's
    /// temporary path while `r2` is fetched, so saves fail until `r4` is
    /// fetched and the blocker is removed.
    #[derive(Debug)]
    struct CheckpointObserver {
        index_path: PathBuf,
        block_checkpoints: bool,
        seen: std::sync::Mutex<std::collections::HashMap<String, Vec<MediaRecord>>>,
    }

    impl CheckpointObserver {
        fn new(index_path: PathBuf, block_checkpoints: bool) -> Self {
            Self {
                index_path,
                block_checkpoints,
                seen: std::sync::Mutex::default(),
            }
        }

        fn blocker(&self) -> PathBuf {
            let mut raw = self.index_path.clone().into_os_string();
            raw.push(".tmp");
            PathBuf::from(raw)
        }

        fn on_disk_when_fetching(&self, media_id: &str) -> Vec<MediaRecord> {
            self.seen.lock().unwrap()[media_id].clone()
        }
    }

    #[async_trait]
    impl Fetcher for CheckpointObserver {
        async fn fetch(&self, media_id: &str) -> Result<ByteStream, FetchError> {
            let raw = std::fs::read(&self.index_path).unwrap();
            let on_disk: Vec<MediaRecord> = serde_json::from_slice(&raw).unwrap();
            self.seen.lock().unwrap().insert(media_id.to_string(), on_disk);

            if self.block_checkpoints {
                match media_id {
                    "r2" => std::fs::create_dir_all(self.blocker().join("busy")).unwrap(),
                    "r4" => std::fs::remove_dir_all(self.blocker()).unwrap(),
                    _ => {}
                }
            }
            Ok(stream::iter(vec![Ok(Bytes::from(vec![3u8; 1200]))]).boxed())
        }
    }

    fn status_of(records: &[MediaRecord], id: &str) -> MediaStatus {
        records.iter().find(|r| r.id == id).unwrap().status
    }

    #[derive(Debug)]
    struct PanickingFetcher;

    #[async_trait]
    impl Fetcher for PanickingFetcher {
        async fn fetch(&self, _media_id: &str) -> Result<ByteStream, FetchError> {
            panic!("fetcher exploded");
        }
    }

    fn records(ids: &[&str]) -> Vec<MediaRecord> {
        ids.iter()
            .map(|id| MediaRecord::new(*id, MediaType::Photo, "jpg"))
            .collect()
    }

    #[test]
    fn test_engine_new_valid_concurrency() {
        assert_eq!(DownloadEngine::new(1, 10).unwrap().concurrency(), 1);
        assert_eq!(DownloadEngine::new(10, 10).unwrap().concurrency(), 10);
        assert_eq!(DownloadEngine::new(100, 10).unwrap().concurrency(), 100);
    }

    #[test]
    fn test_engine_new_invalid_concurrency() {
        assert!(matches!(
            DownloadEngine::new(0, 10),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(matches!(
            DownloadEngine::new(101, 10),
            Err(EngineError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_engine_new_invalid_checkpoint_interval() {
        assert!(matches!(
            DownloadEngine::new(10, 0),
            Err(EngineError::InvalidCheckpointInterval { value: 0 })
        ));
        assert_eq!(DownloadEngine::new(10, 25).unwrap().checkpoint_interval(), 25);
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidConcurrency { value: 0 }.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_download_stats_totals() {
        let stats = DownloadStats::new();
        stats.record_outcome(MediaStatus::Done);
        stats.record_outcome(MediaStatus::Done);
        stats.record_outcome(MediaStatus::Failed);
        stats.increment_already_done();
        stats.increment_previously_failed();
        stats.increment_previously_failed();

        assert_eq!(stats.attempted(), 3);
        assert_eq!(stats.success(), 3);
        assert_eq!(stats.fails(), 3);
    }

    #[tokio::test]
    async fn test_process_index_mixed_outcomes() {
        let dir = TempDir::new().unwrap();
        let media_dir = dir.path().join("media");
        let index = IndexFile::new(dir.path().join("index.json"));
        let store = RecordStore::new(records(&["a", "bad1", "b", "bad2", "c"]));
        let fetcher = Arc::new(CountingFetcher::default());

        let engine = DownloadEngine::new(2, 2).unwrap();
        let stats = engine
            .process_index(
                &store,
                &index,
                fetcher.clone(),
                &RunOptions::new(&media_dir, false),
                &ProgressBar::hidden(),
            )
            .await
            .unwrap();

        assert_eq!(stats.success(), 3);
        assert_eq!(stats.fails(), 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);

        let saved = index.load().await.unwrap();
        assert_eq!(saved, store.snapshot(), "final checkpoint matches the store");
        assert!(saved.iter().all(|r| r.status.is_terminal()));
    }

    #[tokio::test]
    async fn test_process_index_empty_store_writes_checkpoint() {
        let dir = TempDir::new().unwrap();
        let index = IndexFile::new(dir.path().join("index.json"));
        let store = RecordStore::new(Vec::new());

        let stats = DownloadEngine::new(4, 10)
            .unwrap()
            .process_index(
                &store,
                &index,
                Arc::new(CountingFetcher::default()),
                &RunOptions::new(dir.path().join("media"), false),
                &ProgressBar::hidden(),
            )
            .await
            .unwrap();

        assert_eq!(stats.attempted(), 0);
        assert!(index.exists());
    }

    #[tokio::test]
    async fn test_process_index_panicking_worker_counts_as_failure() {
        let dir = TempDir::new().unwrap();
        let index = IndexFile::new(dir.path().join("index.json"));
        let store = RecordStore::new(records(&["a", "b"]));

        let stats = DownloadEngine::new(2, 10)
            .unwrap()
            .process_index(
                &store,
                &index,
                Arc::new(PanickingFetcher),
                &RunOptions::new(dir.path().join("media"), false),
                &ProgressBar::hidden(),
            )
            .await
            .unwrap();

        assert_eq!(stats.failed(), 2);
        assert_eq!(stats.success(), 0);
        assert!(
            store
                .snapshot()
                .iter()
                .all(|r| r.status == MediaStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_process_index_checkpoint_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        // A non-empty directory where the checkpoint belongs makes the rename fail.
        let index_path = dir.path().join("index.json");
        std::fs::create_dir_all(index_path.join("occupied")).unwrap();
        let index = IndexFile::new(&index_path);
        let store = RecordStore::new(records(&["a"]));

        let result = DownloadEngine::new(1, 10)
            .unwrap()
            .process_index(
                &store,
                &index,
                Arc::new(CountingFetcher::default()),
                &RunOptions::new(dir.path().join("media"), false),
                &ProgressBar::hidden(),
            )
            .await;

        assert!(matches!(result, Err(EngineError::Checkpoint(_))));
    }

    #[tokio::test]
    async fn test_process_index_checkpoints_every_interval_admissions() {
        let dir = TempDir::new().unwrap();
        let index_path = dir.path().join("index.json");
        let index = IndexFile::new(&index_path);
        let store = RecordStore::new(records(&["r0", "r1", "r2", "r3", "r4", "r5"]));
        let fetcher = Arc::new(CheckpointObserver::new(index_path, false));

        // One worker: each admission waits for the previous record to finish
        DownloadEngine::new(1, 2)
            .unwrap()
            .process_index(
                &store,
                &index,
                fetcher.clone(),
                &RunOptions::new(dir.path().join("media"), false),
                &ProgressBar::hidden(),
            )
            .await
            .unwrap();

        let first = fetcher.on_disk_when_fetching("r0");
        assert!(first.iter().all(|r| r.status == MediaStatus::Pending));

        let after_two = fetcher.on_disk_when_fetching("r2");
        assert_eq!(status_of(&after_two, "r0"), MediaStatus::Done);
        assert_eq!(status_of(&after_two, "r2"), MediaStatus::Pending);

        let after_four = fetcher.on_disk_when_fetching("r4");
        assert_eq!(status_of(&after_four, "r2"), MediaStatus::Done);
        assert_eq!(status_of(&after_four, "r4"), MediaStatus::Pending);

        assert_eq!(index.load().await.unwrap(), store.snapshot());
    }

    #[tokio::test]
    async fn test_process_index_survives_failed_periodic_checkpoint() {
        let dir = TempDir::new().unwrap();
        let index_path = dir.path().join("index.json");
        let index = IndexFile::new(&index_path);
        let store = RecordStore::new(records(&["r0", "r1", "r2", "r3", "r4", "r5"]));
        let fetcher = Arc::new(CheckpointObserver::new(index_path, true));

        let stats = DownloadEngine::new(1, 2)
            .unwrap()
            .process_index(
                &store,
                &index,
                fetcher.clone(),
                &RunOptions::new(dir.path().join("media"), false),
                &ProgressBar::hidden(),
            )
            .await
            .unwrap();

        // The save before admitting r4 failed and left the r2 checkpoint in place
        let during_outage = fetcher.on_disk_when_fetching("r4");
        assert_eq!(status_of(&during_outage, "r0"), MediaStatus::Done);
        assert_eq!(status_of(&during_outage, "r2"), MediaStatus::Pending);

        assert_eq!(stats.success(), 6);
        let saved = index.load().await.unwrap();
        assert_eq!(saved, store.snapshot());
        assert!(saved.iter().all(|r| r.status == MediaStatus::Done));
    }
}
