use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{OpenRouterError, Result};
use crate::http::DynHttpTransport;
use crate::http::reqwest::default_dyn_transport;
use crate::retry::RetryConfig;

/// Base URL of the public OpenRouter API.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Connection settings shared read-only by every call of one client.
///
/// Holds the base URL, the bearer credential, the two attribution values sent as
/// `HTTP-Referer` and `X-Title`, the transport handle and the retry settings.
#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    auth_token: String,
    http_referer: String,
    x_title: String,
    transport: DynHttpTransport,
    retry: RetryConfig,
    timeout: Option<Duration>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &"<redacted>")
            .field("http_referer", &self.http_referer)
            .field("x_title", &self.x_title)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Creates a configuration using the default `reqwest` transport.
    ///
    /// # Errors
    ///
    /// Returns [`OpenRouterError::InvalidConfig`] when the credential is blank and
    /// [`OpenRouterError::Transport`] when the HTTP client cannot be created.
    pub fn new(
        auth_token: impl Into<String>,
        x_title: impl Into<String>,
        http_referer: impl Into<String>,
    ) -> Result<Self> {
        Self::with_transport_handle(auth_token, x_title, http_referer, default_dyn_transport()?)
    }

    /// Creates a configuration around an existing transport.
    ///
    /// # Examples
    ///
    /// ```
    /// use openrouter_http::config::ClientConfig;
    /// use openrouter_http::http::reqwest::default_dyn_transport;
    ///
    /// let config = ClientConfig::with_transport_handle(
    ///     "sk-or-test",
    ///     "My App",
    ///     "https://example.com",
    ///     default_dyn_transport().unwrap(),
    /// )
    /// .unwrap();
    /// assert_eq!(config.base_url(), "https://openrouter.ai/api/v1");
    /// assert!(!format!("{config:?}").contains("sk-or-test"));
    /// ```
    pub fn with_transport_handle(
        auth_token: impl Into<String>,
        x_title: impl Into<String>,
        http_referer: impl Into<String>,
        transport: DynHttpTransport,
    ) -> Result<Self> {
        let auth_token = auth_token.into();
        if auth_token.trim().is_empty() {
            return Err(OpenRouterError::InvalidConfig {
                field: "auth_token".to_string(),
                reason: "credential must not be empty".to_string(),
            });
        }
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_token: auth_token.trim().to_string(),
            http_referer: http_referer.into(),
            x_title: x_title.into(),
            transport,
            retry: RetryConfig::default(),
            timeout: None,
        })
    }

    /// Creates a configuration from environment variables.
    ///
    /// Reads:
    /// - `OPENROUTER_API_KEY` (required)
    /// - `OPENROUTER_BASE_URL` (optional, defaults to [`DEFAULT_BASE_URL`])
    /// - `OPENROUTER_X_TITLE` and `OPENROUTER_HTTP_REFERER` (optional, empty by default)
    pub fn from_env() -> Result<Self> {
        let auth_token = read_env("OPENROUTER_API_KEY").ok_or_else(|| OpenRouterError::InvalidConfig {
            field: "OPENROUTER_API_KEY".to_string(),
            reason: "environment variable is missing or empty".to_string(),
        })?;
        let x_title = read_env("OPENROUTER_X_TITLE").unwrap_or_default();
        let http_referer = read_env("OPENROUTER_HTTP_REFERER").unwrap_or_default();

        let config = Self::new(auth_token, x_title, http_referer)?;
        match read_env("OPENROUTER_BASE_URL") {
            Some(base_url) => config.with_base_url(base_url),
            None => Ok(config),
        }
    }

    /// Overrides the base URL. A trailing slash is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`OpenRouterError::InvalidConfig`] unless the URL is absolute http(s).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        match reqwest::Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                self.base_url = trimmed.to_string();
                Ok(self)
            }
            Ok(url) => Err(OpenRouterError::InvalidConfig {
                field: "base_url".to_string(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            }),
            Err(err) => Err(OpenRouterError::InvalidConfig {
                field: "base_url".to_string(),
                reason: err.to_string(),
            }),
        }
    }

    /// Swaps the transport, e.g. for a custom `reqwest::Client` or a test double.
    pub fn with_transport(mut self, transport: DynHttpTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Per-attempt timeout forwarded to the transport.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http_referer(&self) -> &str {
        &self.http_referer
    }

    pub fn x_title(&self) -> &str {
        &self.x_title
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn transport(&self) -> &DynHttpTransport {
        &self.transport
    }

    pub(crate) fn authorization(&self) -> String {
        format!("Bearer {}", self.auth_token)
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
