//! Media index: records, the shared store, reconciliation and checkpoints.
//!
//! The index is the ordered list of every media item in the library along
//! with its resolution status. It is loaded once per run, reconciled against
//! the media directory, mutated by download workers through
//! [`RecordLease`]s, and written back with [`IndexFile`].

mod error;
mod persistence;
mod record;
mod store;

pub use error::IndexError;
pub use persistence::{DEFAULT_INDEX_PATH, IndexFile};
pub use record::{MediaRecord, MediaStatus, MediaType, VIDEO_FALLBACK_EXTENSION};
pub use store::{IndexSummary, ReconcileReport, RecordLease, RecordStore};
