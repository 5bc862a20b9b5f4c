//! Error types for login and index enumeration.

use thiserror::Error;

/// Errors raised while establishing a session or enumerating the library.
///
/// Transport and status errors are only surfaced after the retry policy is
/// exhausted; every variant is fatal for the run.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A service URL could not be built.
    #[error("invalid service URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// A request failed at the transport level.
    #[error("request to {url} failed: {source}")]
    Http {
        /// The URL requested.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// A request returned a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The URL requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The service rejected the email/password pair.
    #[error("login rejected: please check your email and password")]
    InvalidCredentials,

    /// The API page did not contain an access token and API URL.
    #[error("access token not found on {url}")]
    TokenNotFound {
        /// The API page URL.
        url: String,
    },

    /// A page of the media index could not be decoded.
    #[error("malformed media index page at offset {offset}: {source}")]
    MalformedIndex {
        /// Offset of the page requested.
        offset: usize,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl SessionError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a transport error.
    pub fn http(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Returns true for errors worth another attempt under the retry policy.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::HttpStatus { .. })
    }
}
