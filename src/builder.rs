use serde::Serialize;

use crate::error::{OpenRouterError, Result};
use crate::http::{HttpMethod, HttpRequest};

/// Turns a method, an absolute URL and an optional payload into an [`HttpRequest`].
///
/// The builder only serializes and validates; headers are left to
/// [`crate::headers::HeaderPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestBuilder;

impl RequestBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Builds a request with a JSON body.
    ///
    /// # Examples
    ///
    /// ```
    /// use openrouter_http::builder::RequestBuilder;
    /// use openrouter_http::http::HttpMethod;
    /// use serde_json::json;
    ///
    /// let request = RequestBuilder::new()
    ///     .build(HttpMethod::Post, "https://openrouter.ai/api/v1/chat/completions", Some(&json!({"model": "m"})))
    ///     .unwrap();
    /// assert_eq!(request.body.as_deref(), Some(&br#"{"model":"m"}"#[..]));
    /// ```
    ///
    /// # Errors
    ///
    /// [`OpenRouterError::Serialization`] when the payload cannot be encoded and
    /// [`OpenRouterError::RequestConstruction`] when the URL is not absolute http(s).
    pub fn build<T>(&self, method: HttpMethod, url: &str, payload: Option<&T>) -> Result<HttpRequest>
    where
        T: Serialize + ?Sized,
    {
        validate_url(url)?;
        let mut request = HttpRequest::new(method, url);
        if let Some(payload) = payload {
            let body = serde_json::to_vec(payload)
                .map_err(|source| OpenRouterError::Serialization { source })?;
            request.body = Some(body.into());
        }
        Ok(request)
    }

    /// Builds a request without a body.
    pub fn build_empty(&self, method: HttpMethod, url: &str) -> Result<HttpRequest> {
        self.build::<()>(method, url, None)
    }
}

/// Joins the configured base URL with an endpoint suffix such as `/chat/completions`.
pub fn full_url(base_url: &str, suffix: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if suffix.is_empty() || suffix.starts_with('/') {
        format!("{base}{suffix}")
    } else {
        format!("{base}/{suffix}")
    }
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|err| OpenRouterError::construction(format!("invalid url {url:?}: {err}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(OpenRouterError::construction(format!(
            "unsupported url scheme {other:?} in {url:?}"
        ))),
    }
}
