//! Concurrent, resumable media download engine.
//!
//! This module turns a [`RecordStore`](crate::index::RecordStore) into files
//! on disk, one attempt per eligible record per run.
//!
//! # Features
//!
//! - Bounded concurrency via a semaphore (1..=100 workers)
//! - Periodic index checkpoints while downloads are in flight
//! - Streaming writes with removal of partial files on failure
//! - Pluggable [`Fetcher`] so tests can run without a network
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use media_rescue_core::download::{HttpFetcher, build_client};
//! use reqwest::cookie::Jar;
//! use url::Url;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = build_client(Arc::new(Jar::default()), 30, 300)?;
//! let fetcher = HttpFetcher::new(client, Url::parse("http://example.com/d/original/")?);
//! println!("{}", fetcher.media_url("abc123")?);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod fetch;
mod worker;

pub use client::{HttpFetcher, build_client};
pub use constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_CONCURRENCY, DEFAULT_MEDIA_DIR,
    MIN_MEDIA_BYTES, READ_TIMEOUT_SECS,
};
pub use engine::{DownloadEngine, DownloadStats, EngineError, RunOptions};
pub use error::DownloadError;
pub use fetch::{ByteStream, FetchError, Fetcher};
pub use worker::download_record;
