//! HTTP implementation of the fetch capability.
//!
//! [`HttpFetcher`] downloads originals from `{original_base}/{media_id}` using
//! a client that already carries the session cookies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;
use reqwest::cookie::Jar;
use tracing::{debug, instrument};
use url::Url;

use super::fetch::{ByteStream, FetchError, Fetcher};
use crate::user_agent;

/// Builds the shared HTTP client used for login, enumeration and downloads.
///
/// The connect timeout bounds connection setup; the read timeout bounds the
/// idle time between body chunks so a stalled transfer cannot hold a worker
/// slot forever.
///
/// # Errors
///
/// Returns the reqwest builder error if TLS or proxy initialisation fails.
pub fn build_client(
    cookie_jar: Arc<Jar>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .read_timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
        .cookie_provider(cookie_jar)
        .build()
}

/// Fetches original media over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    original_base: Url,
}

impl HttpFetcher {
    /// Creates a fetcher for originals under `original_base`.
    ///
    /// A trailing slash is added to the base path if missing so media ids
    /// are appended rather than replacing the last segment.
    #[must_use]
    pub fn new(client: Client, mut original_base: Url) -> Self {
        if !original_base.path().ends_with('/') {
            let path = format!("{}/", original_base.path());
            original_base.set_path(&path);
        }
        Self {
            client,
            original_base,
        }
    }

    /// Returns the URL the original of `media_id` is fetched from.
    ///
    /// The id is appended as a single percent-encoded path segment, so `/`,
    /// `?`, `#` and `%` in an id never change the target.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] for an empty, `.` or `..` id, or if
    /// the base URL cannot carry path segments.
    pub fn media_url(&self, media_id: &str) -> Result<Url, FetchError> {
        let invalid = || FetchError::InvalidUrl {
            media_id: media_id.to_string(),
        };
        if matches!(media_id, "" | "." | "..") {
            return Err(invalid());
        }

        let mut url = self.original_base.clone();
        url.path_segments_mut().map_err(|()| invalid())?.pop_if_empty().push(media_id);
        Ok(url)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, media_id: &str) -> Result<ByteStream, FetchError> {
        let url = self.media_url(media_id)?;
        debug!(url = %url, "requesting original");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(media_id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(media_id, status.as_u16()));
        }

        let owned_id = media_id.to_string();
        Ok(response
            .bytes_stream()
            .map_err(move |e| FetchError::network(owned_id.clone(), e))
            .boxed())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_client() -> Client {
        build_client(Arc::new(Jar::default()), 5, 5).unwrap()
    }

    #[test]
    fn test_media_url_appends_id_to_base() {
        let fetcher = HttpFetcher::new(
            test_client(),
            Url::parse("http://example.com/d/original/").unwrap(),
        );
        assert_eq!(
            fetcher.media_url("abc123").unwrap().as_str(),
            "http://example.com/d/original/abc123"
        );
    }

    #[test]
    fn test_media_url_encodes_id_as_one_segment() {
        let fetcher = HttpFetcher::new(
            test_client(),
            Url::parse("http://example.com/d/original/").unwrap(),
        );

        let url = fetcher.media_url("a/b?c#d").unwrap();
        assert_eq!(url.as_str(), "http://example.com/d/original/a%2Fb%3Fc%23d");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let url = fetcher.media_url("//evil.example/x").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert!(url.path().starts_with("/d/original/"));

        assert_eq!(
            fetcher.media_url("50%").unwrap().as_str(),
            "http://example.com/d/original/50%25"
        );
    }

    #[test]
    fn test_media_url_rejects_dot_segments() {
        let fetcher = HttpFetcher::new(
            test_client(),
            Url::parse("http://example.com/d/original/").unwrap(),
        );
        for id in ["", ".", ".."] {
            assert!(matches!(
                fetcher.media_url(id),
                Err(FetchError::InvalidUrl { .. })
            ));
        }
    }

    #[test]
    fn test_media_url_adds_missing_trailing_slash() {
        let fetcher = HttpFetcher::new(
            test_client(),
            Url::parse("http://example.com/d/original").unwrap(),
        );
        assert_eq!(
            fetcher.media_url("abc123").unwrap().as_str(),
            "http://example.com/d/original/abc123"
        );
    }
}
