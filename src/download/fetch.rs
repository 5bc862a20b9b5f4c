//! The fetch capability consumed by download workers.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Body of a successful fetch, delivered in chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Failure to retrieve a media item.
///
/// Workers do not branch on the variant: every fetch error fails the record
/// for this run.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS, or body transfer error.
    #[error("network error fetching {media_id}: {source}")]
    Network {
        /// The media item being fetched.
        media_id: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The request or a body read exceeded its timeout.
    #[error("timeout fetching {media_id}")]
    Timeout {
        /// The media item being fetched.
        media_id: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching {media_id}")]
    HttpStatus {
        /// The media item being fetched.
        media_id: String,
        /// The HTTP status code.
        status: u16,
    },

    /// No valid URL could be built for the media id.
    #[error("cannot build a media URL for {media_id}")]
    InvalidUrl {
        /// The media item being fetched.
        media_id: String,
    },

    /// The body stream ended abnormally for a reason other than transport.
    #[error("stream error fetching {media_id}: {message}")]
    Stream {
        /// The media item being fetched.
        media_id: String,
        /// What went wrong.
        message: String,
    },
}

impl FetchError {
    /// Creates a transport error, mapping reqwest timeouts to [`FetchError::Timeout`].
    pub fn network(media_id: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                media_id: media_id.into(),
            }
        } else {
            Self::Network {
                media_id: media_id.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(media_id: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            media_id: media_id.into(),
            status,
        }
    }

    /// Creates a stream error.
    pub fn stream(media_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stream {
            media_id: media_id.into(),
            message: message.into(),
        }
    }
}

/// Authenticated access to original media bytes.
///
/// Implementations own all session state. A returned stream may still fail
/// part-way; the worker treats that exactly like a failed request.
#[async_trait]
pub trait Fetcher: Send + Sync + fmt::Debug {
    /// Starts retrieving the original bytes of `media_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] for transport failures and non-2xx responses.
    async fn fetch(&self, media_id: &str) -> Result<ByteStream, FetchError>;
}
