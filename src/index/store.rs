//! Shared, slot-addressable record store.
//!
//! The store is the single piece of mutable state shared between the
//! scheduler and the download workers. All access goes through one mutex;
//! critical sections never span an `.await`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::{MediaRecord, MediaStatus};
use crate::download::MIN_MEDIA_BYTES;

#[derive(Debug)]
struct StoreState {
    records: Vec<MediaRecord>,
    leased: Vec<bool>,
}

/// Cloneable handle to the in-memory index.
#[derive(Debug, Clone)]
pub struct RecordStore {
    state: Arc<Mutex<StoreState>>,
}

/// Outcome of the startup reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records that will be scheduled in this run.
    pub eligible: usize,
    /// Records left as `done` with a valid file.
    pub already_done: usize,
    /// Records left as `failed` because retry mode is off.
    pub previously_failed: usize,
    /// Records found `in_progress` and reset to `pending`.
    pub reset_in_progress: usize,
    /// `done` records whose file was missing or too small.
    pub reset_missing: usize,
    /// `failed` records reopened by retry mode.
    pub reopened_failed: usize,
}

/// Per-status counts over an index, used by the status report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Records with status `done`.
    pub done: usize,
    /// Records with status `failed`.
    pub failed: usize,
    /// Records with status `in_progress`.
    pub in_progress: usize,
    /// Records with status `pending`.
    pub pending: usize,
}

impl IndexSummary {
    /// Counts statuses over `records`.
    #[must_use]
    pub fn from_records(records: &[MediaRecord]) -> Self {
        records.iter().fold(Self::default(), |mut summary, record| {
            match record.status {
                MediaStatus::Done => summary.done += 1,
                MediaStatus::Failed => summary.failed += 1,
                MediaStatus::InProgress => summary.in_progress += 1,
                MediaStatus::Pending => summary.pending += 1,
            }
            summary
        })
    }

    /// Total number of records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.done + self.failed + self.in_progress + self.pending
    }
}

impl RecordStore {
    /// Wraps `records` in a shared store.
    #[must_use]
    pub fn new(records: Vec<MediaRecord>) -> Self {
        let leased = vec![false; records.len()];
        Self {
            state: Arc::new(Mutex::new(StoreState { records, leased })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Returns a copy of the record at `slot`.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<MediaRecord> {
        self.lock().records.get(slot).cloned()
    }

    /// Returns the status of the record at `slot`.
    #[must_use]
    pub fn status(&self, slot: usize) -> Option<MediaStatus> {
        self.lock().records.get(slot).map(|record| record.status)
    }

    /// Returns a consistent copy of every record, taken under the store lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MediaRecord> {
        self.lock().records.clone()
    }

    /// Counts records per status.
    #[must_use]
    pub fn summary(&self) -> IndexSummary {
        IndexSummary::from_records(&self.lock().records)
    }

    /// Grants exclusive access to one record slot.
    ///
    /// Returns `None` if the slot does not exist or is already leased.
    #[must_use]
    pub fn lease(&self, slot: usize) -> Option<RecordLease> {
        let mut state = self.lock();
        let taken = state.leased.get_mut(slot)?;
        if *taken {
            return None;
        }
        *taken = true;
        Some(RecordLease {
            store: self.clone(),
            slot,
            finished: false,
        })
    }

    /// Corrects stale statuses left by an earlier run.
    ///
    /// Must run before any lease is granted. Rules, applied per record:
    ///
    /// - `in_progress` becomes `pending`; any partial file is removed.
    /// - `done` without a file of at least [`MIN_MEDIA_BYTES`] becomes `pending`.
    /// - `failed` stays `failed` unless `retry_failed`, then becomes `pending`.
    /// - `pending` stays `pending`.
    ///
    /// Files are inspected with `tokio::fs` outside the store lock; statuses
    /// are then updated in one critical section.
    pub async fn reconcile(&self, media_dir: &Path, retry_failed: bool) -> ReconcileReport {
        let on_disk: Vec<(usize, MediaStatus, PathBuf)> = {
            let state = self.lock();
            state
                .records
                .iter()
                .enumerate()
                .filter(|(_, record)| {
                    matches!(record.status, MediaStatus::InProgress | MediaStatus::Done)
                })
                .map(|(slot, record)| {
                    let path = media_dir.join(record.file_name());
                    (slot, record.status, path)
                })
                .collect()
        };

        let mut missing_files = HashSet::new();
        for (slot, status, path) in &on_disk {
            if *status == MediaStatus::Done && has_valid_file(path).await {
                continue;
            }
            if *status == MediaStatus::Done {
                debug!(slot, path = %path.display(), "done record has no valid file");
                missing_files.insert(*slot);
            }
            remove_stale_file(path).await;
        }

        let mut state = self.lock();
        let mut report = ReconcileReport::default();

        for (slot, record) in state.records.iter_mut().enumerate() {
            match record.status {
                MediaStatus::InProgress => {
                    record.status = MediaStatus::Pending;
                    report.reset_in_progress += 1;
                }
                MediaStatus::Done if missing_files.contains(&slot) => {
                    record.status = MediaStatus::Pending;
                    report.reset_missing += 1;
                }
                MediaStatus::Done => report.already_done += 1,
                MediaStatus::Failed if retry_failed => {
                    record.status = MediaStatus::Pending;
                    report.reopened_failed += 1;
                }
                MediaStatus::Failed => report.previously_failed += 1,
                MediaStatus::Pending => {}
            }
            if record.status == MediaStatus::Pending {
                report.eligible += 1;
            }
        }
        drop(state);

        info!(
            eligible = report.eligible,
            already_done = report.already_done,
            previously_failed = report.previously_failed,
            reset_in_progress = report.reset_in_progress,
            reset_missing = report.reset_missing,
            reopened_failed = report.reopened_failed,
            "reconciled index against media directory"
        );
        report
    }

    /// Consumes the handle and returns the records if no other handle exists.
    #[must_use]
    pub fn into_records(self) -> Vec<MediaRecord> {
        match Arc::try_unwrap(self.state) {
            Ok(mutex) => {
                mutex
                    .into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .records
            }
            Err(shared) => {
                let records = shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .records
                    .clone();
                records
            }
        }
    }
}

async fn has_valid_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() >= MIN_MEDIA_BYTES)
}

async fn remove_stale_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed stale media file"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!(path = %path.display(), %error, "failed to remove stale media file"),
    }
}

/// Exclusive, task-scoped access to one record.
///
/// A lease dropped without [`finish`](Self::finish) (for example when the
/// worker task panics) marks an `in_progress` record `failed` so the final
/// checkpoint never claims an attempt is still running.
#[derive(Debug)]
pub struct RecordLease {
    store: RecordStore,
    slot: usize,
    finished: bool,
}

impl RecordLease {
    /// Index of the leased record in collection order.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Starts an attempt: increments `retries`, sets `in_progress`, and
    /// returns a copy of the updated record.
    #[must_use]
    pub fn begin(&self) -> MediaRecord {
        let mut state = self.store.lock();
        let record = &mut state.records[self.slot];
        record.retries = record.retries.saturating_add(1);
        record.status = MediaStatus::InProgress;
        record.clone()
    }

    /// Records the terminal status of the attempt and releases the slot.
    pub fn finish(mut self, status: MediaStatus) -> MediaStatus {
        {
            let mut state = self.store.lock();
            state.records[self.slot].status = status;
            state.leased[self.slot] = false;
        }
        self.finished = true;
        status
    }
}

impl Drop for RecordLease {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.store.lock();
        if let Some(record) = state.records.get_mut(self.slot)
            && record.status == MediaStatus::InProgress
        {
            record.status = MediaStatus::Failed;
        }
        if let Some(taken) = state.leased.get_mut(self.slot) {
            *taken = false;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::index::MediaType;

    fn record(id: &str, status: MediaStatus) -> MediaRecord {
        let mut record = MediaRecord::new(id, MediaType::Photo, "jpg");
        record.status = status;
        record
    }

    fn write_file(dir: &Path, name: &str, len: usize) {
        std::fs::write(dir.join(name), vec![0u8; len]).unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_done_with_valid_file_stays_done() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.jpg", 2048);
        let store = RecordStore::new(vec![record("a", MediaStatus::Done)]);

        let report = store.reconcile(dir.path(), false).await;

        assert_eq!(store.status(0), Some(MediaStatus::Done));
        assert_eq!(report.already_done, 1);
        assert_eq!(report.eligible, 0);
    }

    #[tokio::test]
    async fn test_reconcile_done_with_missing_file_becomes_pending() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(vec![record("a", MediaStatus::Done)]);

        let report = store.reconcile(dir.path(), false).await;

        assert_eq!(store.status(0), Some(MediaStatus::Pending));
        assert_eq!(report.reset_missing, 1);
        assert_eq!(report.eligible, 1);
    }

    #[tokio::test]
    async fn test_reconcile_done_with_truncated_file_becomes_pending_and_removes_file() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.jpg", 10);
        let store = RecordStore::new(vec![record("a", MediaStatus::Done)]);

        store.reconcile(dir.path(), false).await;

        assert_eq!(store.status(0), Some(MediaStatus::Pending));
        assert!(!dir.path().join("a.jpg").exists());
    }

    #[tokio::test]
    async fn test_reconcile_in_progress_becomes_pending_even_with_file() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.jpg", 4096);
        let mut stale = record("a", MediaStatus::InProgress);
        stale.retries = 3;
        let store = RecordStore::new(vec![stale]);

        let report = store.reconcile(dir.path(), false).await;

        assert_eq!(store.status(0), Some(MediaStatus::Pending));
        assert_eq!(store.get(0).unwrap().retries, 3, "retries are never reset");
        assert_eq!(report.reset_in_progress, 1);
        assert!(!dir.path().join("a.jpg").exists());
    }

    #[tokio::test]
    async fn test_reconcile_failed_without_retry_stays_failed() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(vec![record("a", MediaStatus::Failed)]);

        let report = store.reconcile(dir.path(), false).await;

        assert_eq!(store.status(0), Some(MediaStatus::Failed));
        assert_eq!(report.previously_failed, 1);
        assert_eq!(report.eligible, 0);
    }

    #[tokio::test]
    async fn test_reconcile_failed_with_retry_becomes_pending() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(vec![record("a", MediaStatus::Failed)]);

        let report = store.reconcile(dir.path(), true).await;

        assert_eq!(store.status(0), Some(MediaStatus::Pending));
        assert_eq!(report.reopened_failed, 1);
        assert_eq!(report.eligible, 1);
    }

    #[tokio::test]
    async fn test_reconcile_mixed_library_applies_rules_per_slot() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "kept.jpg", 2048);
        write_file(dir.path(), "partial.jpg", 64);
        let store = RecordStore::new(vec![
            record("lost", MediaStatus::Done),
            record("kept", MediaStatus::Done),
            record("partial", MediaStatus::InProgress),
            record("waiting", MediaStatus::Pending),
            record("broken", MediaStatus::Failed),
        ]);

        let report = store.reconcile(dir.path(), false).await;

        let statuses: Vec<MediaStatus> = store.snapshot().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                MediaStatus::Pending,
                MediaStatus::Done,
                MediaStatus::Pending,
                MediaStatus::Pending,
                MediaStatus::Failed,
            ]
        );
        assert_eq!(report.eligible, 3);
        assert_eq!(report.already_done, 1);
        assert_eq!(report.reset_missing, 1);
        assert_eq!(report.reset_in_progress, 1);
        assert!(dir.path().join("kept.jpg").exists());
        assert!(!dir.path().join("partial.jpg").exists());
    }

    #[test]
    fn test_lease_is_exclusive_until_finished() {
        let store = RecordStore::new(vec![record("a", MediaStatus::Pending)]);

        let lease = store.lease(0).unwrap();
        assert!(store.lease(0).is_none(), "second lease must be refused");

        let started = lease.begin();
        assert_eq!(started.status, MediaStatus::InProgress);
        assert_eq!(started.retries, 1);
        assert_eq!(store.status(0), Some(MediaStatus::InProgress));

        lease.finish(MediaStatus::Done);
        assert_eq!(store.status(0), Some(MediaStatus::Done));
        assert!(store.lease(0).is_some());
    }

    #[test]
    fn test_lease_out_of_range_is_none() {
        let store = RecordStore::new(vec![]);
        assert!(store.lease(0).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_dropped_lease_marks_in_progress_record_failed() {
        let store = RecordStore::new(vec![record("a", MediaStatus::Pending)]);

        {
            let lease = store.lease(0).unwrap();
            let _ = lease.begin();
        }

        assert_eq!(store.status(0), Some(MediaStatus::Failed));
        assert!(store.lease(0).is_some(), "slot is released on drop");
    }

    #[test]
    fn test_summary_counts_each_status() {
        let store = RecordStore::new(vec![
            record("a", MediaStatus::Done),
            record("b", MediaStatus::Failed),
            record("c", MediaStatus::InProgress),
            record("d", MediaStatus::Pending),
            record("e", MediaStatus::Pending),
        ]);

        let summary = store.summary();

        assert_eq!(summary.done, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.in_progress, 1);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.total(), 5);
    }

    #[test]
    fn test_into_records_returns_current_state() {
        let store = RecordStore::new(vec![record("a", MediaStatus::Pending)]);
        store.lease(0).unwrap().finish(MediaStatus::Failed);

        let records = store.into_records();

        assert_eq!(records[0].status, MediaStatus::Failed);
    }
}
