//! Authenticated session with the media service.
//!
//! [`Session::login`] performs the three-step web login, extracts the API
//! access token, and keeps the cookie-carrying client that later fetches
//! originals. [`enumerate_media`] pages through the media index.

mod error;
mod index_fetch;
mod retry;

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use reqwest::Client;
use reqwest::cookie::Jar;
use tracing::{debug, info, instrument};
use url::Url;

use crate::download::{CONNECT_TIMEOUT_SECS, HttpFetcher, READ_TIMEOUT_SECS, build_client};

pub use error::SessionError;
pub use index_fetch::{INDEX_PAGE_LIMIT, enumerate_media};
pub use retry::{
    DEFAULT_LOGIN_MAX_ATTEMPTS, DEFAULT_LOGIN_RETRY_DELAY, RetryDecision, RetryPolicy, retry_fixed,
};

/// Default service root.
pub const DEFAULT_BASE_URL: &str = "http://picturelife.com/";

/// Marker the sign-in page shows when credentials are rejected.
const LOGIN_ERROR_MARKER: &str = "Login error!";

/// Script block on the API page that announces the access token and API root.
#[allow(clippy::expect_used)]
static ACCESS_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<script>\s*pl\.access_token\s*=\s*'([^']+)';\s*pl\.api_url\s*=\s*'([^']+)'\s*</script>",
    )
    .expect("access token regex is valid") // Static pattern, safe to panic
});

/// URLs derived from the service root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    base: Url,
}

impl ServiceEndpoints {
    /// Parses the service root; a trailing slash is added if missing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] if `base` is not an absolute http(s) URL.
    pub fn new(base: &str) -> Result<Self, SessionError> {
        let mut url = Url::parse(base).map_err(|e| SessionError::invalid_url(base, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SessionError::invalid_url(base, "scheme must be http or https"));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self { base: url })
    }

    /// Returns the service root.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Page that seeds the session cookies.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] if the path cannot be joined.
    pub fn login_url(&self) -> Result<Url, SessionError> {
        self.join("login")
    }

    /// Form target for email and password.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] if the path cannot be joined.
    pub fn signin_url(&self) -> Result<Url, SessionError> {
        self.join("signin")
    }

    /// Page that embeds the access token and API URL.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] if the path cannot be joined.
    pub fn api_page_url(&self) -> Result<Url, SessionError> {
        self.join("api")
    }

    /// Prefix under which originals are served by id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] if the path cannot be joined.
    pub fn original_base(&self) -> Result<Url, SessionError> {
        self.join("d/original/")
    }

    fn join(&self, path: &str) -> Result<Url, SessionError> {
        self.base
            .join(path)
            .map_err(|e| SessionError::invalid_url(format!("{}{path}", self.base), e))
    }
}

/// Account credentials. The password never appears in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Returns the account email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Connection settings for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Service endpoints.
    pub endpoints: ServiceEndpoints,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Idle read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Retry policy wrapped around each session request.
    pub retry: RetryPolicy,
}

impl SessionConfig {
    /// Creates a config with default timeouts and retry policy.
    #[must_use]
    pub fn new(endpoints: ServiceEndpoints) -> Self {
        Self {
            endpoints,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

/// A logged-in session.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    endpoints: ServiceEndpoints,
    retry: RetryPolicy,
    access_token: String,
    api_url: Url,
}

impl Session {
    /// Logs in and extracts the API access token.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidCredentials`] if the service rejects the login
    /// - [`SessionError::TokenNotFound`] if the API page has no token
    /// - [`SessionError::Http`] / [`SessionError::HttpStatus`] once retries are exhausted
    #[instrument(skip_all, fields(base = %config.endpoints.base(), email = credentials.email()))]
    pub async fn login(
        config: &SessionConfig,
        credentials: &Credentials,
    ) -> Result<Self, SessionError> {
        let client = build_client(
            Arc::new(Jar::default()),
            config.connect_timeout_secs,
            config.read_timeout_secs,
        )
        .map_err(SessionError::Client)?;
        let endpoints = &config.endpoints;
        let retry = &config.retry;

        let login_url = endpoints.login_url()?;
        retry_fixed(retry, "login page", || get_text(&client, &login_url)).await?;
        debug!("session cookies seeded");

        let signin_url = endpoints.signin_url()?;
        let form = [
            ("email", credentials.email.as_str()),
            ("password", credentials.password.as_str()),
        ];
        let signin_body = retry_fixed(retry, "sign in", || async {
            let response = client
                .post(signin_url.clone())
                .form(&form)
                .send()
                .await
                .map_err(|e| SessionError::http(signin_url.as_str(), e))?;
            read_text(response, &signin_url).await
        })
        .await?;
        if signin_body.contains(LOGIN_ERROR_MARKER) {
            return Err(SessionError::InvalidCredentials);
        }

        let api_page_url = endpoints.api_page_url()?;
        let api_page = retry_fixed(retry, "api page", || get_text(&client, &api_page_url)).await?;
        let (access_token, api_url) = extract_access_token(&api_page, &api_page_url)?;

        info!(api_url = %api_url, "logged in");

        Ok(Self {
            client,
            endpoints: endpoints.clone(),
            retry: retry.clone(),
            access_token,
            api_url,
        })
    }

    /// Returns the API access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the API root announced by the service.
    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Returns the retry policy used for session requests.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the cookie-carrying HTTP client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Builds the fetch capability for originals, sharing this session's cookies.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] if the originals URL cannot be built.
    pub fn fetcher(&self) -> Result<HttpFetcher, SessionError> {
        Ok(HttpFetcher::new(
            self.client.clone(),
            self.endpoints.original_base()?,
        ))
    }
}

async fn get_text(client: &Client, url: &Url) -> Result<String, SessionError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| SessionError::http(url.as_str(), e))?;
    read_text(response, url).await
}

async fn read_text(response: reqwest::Response, url: &Url) -> Result<String, SessionError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SessionError::http_status(url.as_str(), status.as_u16()));
    }
    response
        .text()
        .await
        .map_err(|e| SessionError::http(url.as_str(), e))
}

/// Pulls the access token and API URL out of the API page markup.
fn extract_access_token(page: &str, page_url: &Url) -> Result<(String, Url), SessionError> {
    let not_found = || SessionError::TokenNotFound {
        url: page_url.to_string(),
    };
    let captures = ACCESS_TOKEN_RE.captures(page).ok_or_else(not_found)?;
    let token = captures.get(1).ok_or_else(not_found)?.as_str().to_string();
    let raw_api_url = captures.get(2).ok_or_else(not_found)?.as_str();
    let api_url = page_url
        .join(raw_api_url)
        .map_err(|e| SessionError::invalid_url(raw_api_url, e))?;
    Ok((token, api_url))
}
