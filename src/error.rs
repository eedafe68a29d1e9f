use std::fmt;

use thiserror::Error;

/// Aggregates every failure mode of the request pipeline.
///
/// The variants separate "the request itself is wrong" (serialization, construction,
/// decode, unsupported model) from "the service is degraded" (transport, transient API
/// errors), so callers can decide whether to surface, retry later, or fall back.
#[derive(Debug, Error)]
pub enum OpenRouterError {
    /// The request payload could not be encoded as JSON.
    #[error("failed to serialize request: {source}")]
    Serialization {
        #[source]
        source: serde_json::Error,
    },
    /// The method or URL does not form a valid request.
    #[error("invalid request: {message}")]
    RequestConstruction { message: String },
    /// Network-level failure such as a refused connection or a timeout.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Structured error reported by the remote service.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Non-200 status whose body carried no decodable error object.
    #[error("http error {status}")]
    UnclassifiedHttp {
        status: u16,
        /// Leading part of the raw body, kept for diagnosis.
        body: String,
        #[source]
        source: Option<serde_json::Error>,
    },
    /// A success body did not match the requested destination type.
    #[error("failed to decode {len} byte response into {target}: {source} (body starts with {prefix:?})")]
    Decode {
        target: &'static str,
        len: usize,
        prefix: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Every permitted attempt of a logical call failed.
    #[error("all {attempts} attempts failed, last error: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<OpenRouterError>,
    },
    /// The caller cancelled the call.
    #[error("request cancelled: {message}")]
    Cancelled { message: String },
    /// The model is not served through the chat completion endpoint.
    #[error("model {model:?} is not supported with this method")]
    UnsupportedModel { model: String },
    /// `stream: true` was passed to a non-streaming call.
    #[error("streaming is not supported with this method, use open_chat_completion_stream")]
    StreamNotSupported,
    /// Raised when building or validating configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, OpenRouterError>;

/// Error object returned by the remote service inside an `{"error": {...}}` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub message: String,
    /// Status of the HTTP response that carried the error, never read from the body.
    pub http_status: Option<u16>,
    /// Provider code; numeric codes are kept in their textual form.
    pub code: Option<String>,
    pub kind: Option<String>,
    /// Raw `metadata` object, e.g. the upstream provider name.
    pub metadata: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            http_status: None,
            code: None,
            kind: None,
            metadata: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.http_status {
            Some(status) => write!(f, "api error {status}: {}", self.message)?,
            None => write!(f, "api error: {}", self.message)?,
        }
        if let Some(code) = &self.code {
            write!(f, " ({code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl OpenRouterError {
    /// Creates an [`OpenRouterError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use openrouter_http::OpenRouterError;
    ///
    /// let err = OpenRouterError::transport("connection refused");
    /// assert!(err.is_transient());
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`OpenRouterError::RequestConstruction`] from a textual description.
    pub fn construction<T: Into<String>>(message: T) -> Self {
        Self::RequestConstruction {
            message: message.into(),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self::Cancelled {
            message: "cancellation requested by caller".to_string(),
        }
    }

    /// Returns `true` when retrying the same request may succeed.
    ///
    /// See [`crate::retry::is_transient`] for the exact policy.
    pub fn is_transient(&self) -> bool {
        crate::retry::is_transient(self)
    }

    /// HTTP status associated with the failure, looking through retry exhaustion.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(api) => api.http_status,
            Self::UnclassifiedHttp { status, .. } => Some(*status),
            Self::RetryExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// The underlying failure: the last attempt's error for [`Self::RetryExhausted`],
    /// `self` otherwise.
    pub fn last_failure(&self) -> &OpenRouterError {
        match self {
            Self::RetryExhausted { source, .. } => source.last_failure(),
            other => other,
        }
    }
}
