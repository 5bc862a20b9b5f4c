//! Media Rescue Core Library
//!
//! This library provides the core functionality for media-rescue, which
//! exports a user's whole media library from a web service to local disk,
//! tolerating failures and resuming after interruption.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`index`] - Media records, the shared record store, and checkpoint persistence
//! - [`download`] - Bounded-concurrency download engine and fetch capability
//! - [`session`] - Login, access-token extraction, and index enumeration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod index;
pub mod session;
mod user_agent;

// Re-export commonly used types
pub use download::{
    DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_CONCURRENCY, DownloadEngine, DownloadStats, EngineError,
    FetchError, Fetcher, HttpFetcher, RunOptions,
};
pub use index::{
    IndexError, IndexFile, IndexSummary, MediaRecord, MediaStatus, MediaType, RecordStore,
};
pub use session::{Credentials, Session, SessionConfig, SessionError, ServiceEndpoints};
