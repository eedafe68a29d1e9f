//! Fixed header set stamped on every outgoing request.

use crate::config::ClientConfig;
use crate::http::HttpRequest;

pub const JSON_MEDIA_TYPE: &str = "application/json; charset=utf-8";
pub const EVENT_STREAM_MEDIA_TYPE: &str = "text/event-stream";

pub const CONTENT_TYPE: &str = "Content-Type";
pub const ACCEPT: &str = "Accept";
pub const HTTP_REFERER: &str = "HTTP-Referer";
pub const X_TITLE: &str = "X-Title";
pub const AUTHORIZATION: &str = "Authorization";
pub const CACHE_CONTROL: &str = "Cache-Control";
pub const CONNECTION: &str = "Connection";

/// Applies content negotiation, attribution and authorization headers.
///
/// Both flavours only ever `set` headers, so applying a policy twice leaves the
/// request exactly as applying it once.
#[derive(Debug, Clone, Copy)]
pub struct HeaderPolicy<'a> {
    config: &'a ClientConfig,
}

impl<'a> HeaderPolicy<'a> {
    pub fn new(config: &'a ClientConfig) -> Self {
        Self { config }
    }

    /// Headers for a regular JSON call.
    ///
    /// A content type that is already present (multipart uploads) is kept.
    pub fn apply_json(&self, request: &mut HttpRequest) {
        if !request.headers.contains(CONTENT_TYPE) {
            request.headers.set(CONTENT_TYPE, JSON_MEDIA_TYPE);
        }
        request.headers.set(ACCEPT, JSON_MEDIA_TYPE);
        self.apply_common(request);
    }

    /// Headers for a call whose response is consumed as an event stream.
    pub fn apply_stream(&self, request: &mut HttpRequest) {
        request.headers.set(CONTENT_TYPE, "application/json");
        request.headers.set(ACCEPT, EVENT_STREAM_MEDIA_TYPE);
        request.headers.set(CACHE_CONTROL, "no-cache");
        request.headers.set(CONNECTION, "keep-alive");
        self.apply_common(request);
    }

    fn apply_common(&self, request: &mut HttpRequest) {
        request.headers.set(HTTP_REFERER, self.config.http_referer());
        request.headers.set(X_TITLE, self.config.x_title());
        request.headers.set(AUTHORIZATION, self.config.authorization());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, HttpRequest};
    use crate::testing::{ScriptedTransport, test_config};

    fn request() -> HttpRequest {
        HttpRequest::post_json("https://openrouter.test/api/v1/chat/completions", b"{}".to_vec())
    }

    #[test]
    fn json_policy_sets_headers_in_order() {
        let config = test_config(ScriptedTransport::new(Vec::new()));
        let mut request = request();
        HeaderPolicy::new(&config).apply_json(&mut request);

        let names: Vec<_> = request.headers.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec![CONTENT_TYPE, ACCEPT, HTTP_REFERER, X_TITLE, AUTHORIZATION]
        );
        assert_eq!(request.headers.get("content-type"), Some(JSON_MEDIA_TYPE));
        assert_eq!(request.headers.get("x-title"), Some("test-app"));
        assert_eq!(request.headers.get("http-referer"), Some("https://test.example"));
        assert_eq!(request.headers.get("authorization"), Some("Bearer test-token"));
    }

    #[test]
    fn json_policy_preserves_multipart_content_type() {
        let config = test_config(ScriptedTransport::new(Vec::new()));
        let mut request = HttpRequest::new(HttpMethod::Post, "https://openrouter.test/api/v1/files")
            .with_header("content-type", "multipart/form-data; boundary=xyz");
        HeaderPolicy::new(&config).apply_json(&mut request);

        assert_eq!(
            request.headers.get(CONTENT_TYPE),
            Some("multipart/form-data; boundary=xyz")
        );
        assert_eq!(request.headers.get(AUTHORIZATION), Some("Bearer test-token"));
        assert_eq!(request.headers.get(X_TITLE), Some("test-app"));
    }

    #[test]
    fn policies_are_idempotent() {
        let config = test_config(ScriptedTransport::new(Vec::new()));
        let policy = HeaderPolicy::new(&config);

        let mut once = request();
        policy.apply_json(&mut once);
        let mut twice = once.clone();
        policy.apply_json(&mut twice);
        assert_eq!(once.headers, twice.headers);

        let mut once = request();
        policy.apply_stream(&mut once);
        let mut twice = once.clone();
        policy.apply_stream(&mut twice);
        assert_eq!(once.headers, twice.headers);
    }

    #[test]
    fn stream_policy_overrides_accept_and_adds_connection_directives() {
        let config = test_config(ScriptedTransport::new(Vec::new()));
        let mut request = request().with_header(ACCEPT, JSON_MEDIA_TYPE);
        HeaderPolicy::new(&config).apply_stream(&mut request);

        assert_eq!(request.headers.get(ACCEPT), Some(EVENT_STREAM_MEDIA_TYPE));
        assert_eq!(request.headers.get(CACHE_CONTROL), Some("no-cache"));
        assert_eq!(request.headers.get(CONNECTION), Some("keep-alive"));
        assert_eq!(request.headers.get(AUTHORIZATION), Some("Bearer test-token"));
        assert_eq!(request.headers.get(HTTP_REFERER), Some("https://test.example"));
    }
}
