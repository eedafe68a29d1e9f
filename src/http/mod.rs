use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;

use crate::error::{OpenRouterError, Result};

/// Enumerates HTTP methods understood by the transport abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = OpenRouterError;

    /// Parses a method name case-insensitively.
    ///
    /// # Examples
    ///
    /// ```
    /// use openrouter_http::http::HttpMethod;
    ///
    /// assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
    /// assert!("BREW".parse::<HttpMethod>().is_err());
    /// ```
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(OpenRouterError::construction(format!(
                "unsupported http method: {other:?}"
            ))),
        }
    }
}

/// Ordered header collection with case-insensitive names.
///
/// Setting a header that already exists replaces its value in place, so the
/// original position is kept and the last write wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a header.
    ///
    /// # Examples
    ///
    /// ```
    /// use openrouter_http::http::HeaderSet;
    ///
    /// let mut headers = HeaderSet::new();
    /// headers.set("Accept", "text/plain");
    /// headers.set("accept", "application/json");
    /// assert_eq!(headers.len(), 1);
    /// assert_eq!(headers.get("ACCEPT"), Some("application/json"));
    /// ```
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.entries[index] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .map(|index| self.entries[index].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name)
            .map(|index| self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = HeaderSet::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}

/// Transport-level request handed to an [`HttpTransport`].
///
/// The body is an immutable shared buffer: cloning the request yields an
/// independent readable view of the same bytes, which is what makes a request
/// safe to resend after a failed attempt.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HeaderSet,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a request without headers or body.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderSet::new(),
            body: None,
            timeout: None,
        }
    }

    /// Builds a POST request carrying an already serialized JSON body.
    ///
    /// No headers are set; the header policy decides the content type.
    ///
    /// # Examples
    ///
    /// ```
    /// use openrouter_http::http::{HttpMethod, HttpRequest};
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec());
    /// assert_eq!(request.method, HttpMethod::Post);
    /// assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
    /// ```
    pub fn post_json(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(HttpMethod::Post, url).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderSet,
    pub body: Vec<u8>,
}

/// HTTP response that carries a streaming body.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HeaderSet,
    pub body: HttpBodyStream,
}

impl fmt::Debug for HttpStreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Alias for the body stream returned by [`HttpTransport::send_stream`].
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Transport abstraction used to decouple the pipeline from the concrete HTTP client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves once the whole body has been read.
    ///
    /// # Examples
    ///
    /// ```
    /// # use async_trait::async_trait;
    /// # use openrouter_http::http::{HttpTransport, HttpRequest, HttpResponse, HttpStreamResponse};
    /// # use openrouter_http::OpenRouterError;
    /// # use futures_util::stream;
    /// struct MemoryTransport;
    ///
    /// #[async_trait]
    /// impl HttpTransport for MemoryTransport {
    ///     async fn send(&self, request: HttpRequest) -> Result<HttpResponse, OpenRouterError> {
    ///         Ok(HttpResponse { status: 200, headers: request.headers, body: b"ok".to_vec() })
    ///     }
    ///     async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, OpenRouterError> {
    ///         Ok(HttpStreamResponse { status: 200, headers: request.headers, body: Box::pin(stream::empty()) })
    ///     }
    /// }
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let response = MemoryTransport
    ///     .send(HttpRequest::post_json("https://example.com", br"{}".to_vec()))
    ///     .await
    ///     .unwrap();
    /// assert_eq!(response.status, 200);
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Implementations map network failures to [`OpenRouterError::Transport`] and
    /// malformed requests to [`OpenRouterError::RequestConstruction`].
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Sends a request and returns the body as a raw byte stream.
    ///
    /// # Errors
    ///
    /// Same mapping as [`HttpTransport::send`].
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse>;
}

/// Thread-safe handle to a transport implementation.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

pub mod reqwest;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_set_keeps_insertion_order_and_replaces_in_place() {
        let mut headers = HeaderSet::new();
        headers.set("Content-Type", "multipart/form-data");
        headers.set("Accept", "application/json");
        headers.set("content-type", "application/json");

        let collected: Vec<_> = headers.iter().collect();
        assert_eq!(
            collected,
            vec![
                ("content-type", "application/json"),
                ("Accept", "application/json"),
            ]
        );
        assert_eq!(headers.remove("ACCEPT").as_deref(), Some("application/json"));
        assert!(!headers.contains("accept"));
    }

    #[test]
    fn cloned_request_shares_body_without_draining() {
        let request = HttpRequest::post_json("https://example.com", br#"{"a":1}"#.to_vec());
        let first = request.clone();
        let second = request.clone();
        drop(first);
        assert_eq!(second.body, request.body);
        assert_eq!(request.body.as_deref(), Some(&br#"{"a":1}"#[..]));
    }

    #[test]
    fn unknown_method_is_a_construction_error() {
        let err = "TRACE".parse::<HttpMethod>().unwrap_err();
        assert!(matches!(err, OpenRouterError::RequestConstruction { .. }));
        assert_eq!(" delete ".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
    }
}
