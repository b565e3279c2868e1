//! Configuration for the chat client.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::core::errors::{ChatError, ChatResult};

/// Default backend base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// Environment variable overriding the backend base URL.
pub const API_BASE_URL_ENV: &str = "CESAME_API_BASE_URL";
/// Environment variable pointing at the `SQLite` file used for the local cache.
pub const STORAGE_PATH_ENV: &str = "CESAME_STORAGE_PATH";
/// Environment variable overriding the stream open timeout (seconds).
pub const OPEN_TIMEOUT_ENV: &str = "CESAME_OPEN_TIMEOUT_SECS";
/// Environment variable enabling demo mode (`1`/`true`).
pub const DEMO_MODE_ENV: &str = "CESAME_DEMO_MODE";
/// Environment variable setting the demo backend's port.
pub const PORT_ENV: &str = "CESAME_PORT";

/// Top-level client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend base URL, e.g. `https://chat.example.org/api`.
    pub api_base_url: String,
    /// Bound on the wait for response headers when opening a stream.
    pub open_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Total timeout for plain REST requests (never applied to streams).
    pub request_timeout: Duration,
    /// `SQLite` file backing the persistence collaborator; `None` keeps it in memory.
    pub storage_path: Option<PathBuf>,
    /// Talk to the bundled demo backend instead of a real one.
    pub demo_mode: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            open_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            storage_path: None,
            demo_mode: false,
        }
    }
}

impl ClientConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the `CESAME_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
            config.api_base_url = url;
        }
        if let Ok(path) = std::env::var(STORAGE_PATH_ENV) {
            config.storage_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = std::env::var(OPEN_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.open_timeout = Duration::from_secs(secs);
        }
        config.demo_mode = std::env::var(DEMO_MODE_ENV)
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);
        config
    }

    /// Set the backend base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set the stream open timeout.
    #[must_use]
    pub const fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set the REST request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Persist the local cache in the given `SQLite` file.
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if the base URL is not an absolute http(s) URL or a timeout is zero.
    pub fn validate(&self) -> ChatResult<()> {
        self.base_url()?;
        if self.open_timeout.is_zero() {
            return Err(ChatError::Config("open_timeout must be > 0".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(ChatError::Config("request_timeout must be > 0".to_string()));
        }
        Ok(())
    }

    /// Parsed base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is malformed or not http(s).
    pub fn base_url(&self) -> ChatResult<Url> {
        let url = Url::parse(self.api_base_url.trim())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChatError::Config(format!(
                "api_base_url must be http(s), got {}",
                url.scheme()
            )));
        }
        if url.cannot_be_a_base() {
            return Err(ChatError::Config(
                "api_base_url cannot be used as a base".to_string(),
            ));
        }
        Ok(url)
    }
}

/// Append percent-encoded path segments to `base`.
///
/// # Errors
/// Returns an error if `base` cannot take path segments.
pub fn endpoint(base: &Url, segments: &[&str]) -> ChatResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ChatError::Config(format!("{base} cannot be used as a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
