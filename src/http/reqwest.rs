use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Method};

use crate::error::{OpenRouterError, Result};

use super::{
    DynHttpTransport, HeaderSet, HttpBodyStream, HttpMethod, HttpRequest, HttpResponse,
    HttpStreamResponse, HttpTransport,
};

/// Default [`HttpTransport`] backed by `reqwest`.
///
/// Connection reuse is left to the wrapped [`Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wraps a caller-configured `reqwest::Client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a transport with a default client.
    pub fn default_client() -> Result<Self> {
        Client::builder()
            .build()
            .map(Self::new)
            .map_err(|err| OpenRouterError::transport(format!("failed to create reqwest client: {err}")))
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    fn build_request(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder> {
        let url = reqwest::Url::parse(&request.url).map_err(|err| {
            OpenRouterError::construction(format!("invalid url {:?}: {err}", request.url))
        })?;
        let mut builder = self.client.request(Self::method(request.method), url);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        for (name, value) in request.headers.iter() {
            let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| OpenRouterError::construction(format!("invalid header name: {err}")))?;
            let header_value = reqwest::header::HeaderValue::from_str(value).map_err(|err| {
                OpenRouterError::construction(format!("invalid header value for {header_name}: {err}"))
            })?;
            builder = builder.header(header_name, header_value);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        Ok(builder)
    }

    fn headers_to_set(headers: &reqwest::header::HeaderMap) -> HeaderSet {
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    fn map_send_error(err: reqwest::Error) -> OpenRouterError {
        if err.is_builder() {
            OpenRouterError::construction(err.to_string())
        } else {
            OpenRouterError::transport(err.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_set(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|err| OpenRouterError::transport(format!("failed to read response body: {err}")))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_set(response.headers());
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| OpenRouterError::transport(err.to_string())));
        let body: HttpBodyStream = Box::pin(stream);

        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Builds a thread-safe transport with a default `reqwest` client.
pub fn default_dyn_transport() -> Result<DynHttpTransport> {
    Ok(Arc::new(ReqwestTransport::default_client()?))
}
