use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, OpenRouterError};

/// Longest body excerpt kept on [`OpenRouterError::UnclassifiedHttp`].
const BODY_EXCERPT_LIMIT: usize = 512;

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl WireError {
    fn into_api_error(self, status: u16) -> ApiError {
        let code = self.code.map(|value| match value {
            Value::String(text) => text,
            other => other.to_string(),
        });
        ApiError {
            message: self
                .message
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| "unknown error".to_string()),
            http_status: Some(status),
            code,
            kind: self.kind,
            metadata: self.metadata,
        }
    }
}

/// Maps a non-200 response to an error value.
///
/// A decodable `{"error": {...}}` body yields [`OpenRouterError::Api`] with the
/// transport status attached. Anything else (empty body, HTML, a JSON array, an
/// object without an `error` object) yields [`OpenRouterError::UnclassifiedHttp`], carrying the JSON
/// decode failure when there was one.
///
/// # Examples
///
/// ```
/// use openrouter_http::classify::classify_failure;
/// use openrouter_http::OpenRouterError;
///
/// let err = classify_failure(500, b"<html>oops</html>");
/// assert!(matches!(err, OpenRouterError::UnclassifiedHttp { status: 500, source: Some(_), .. }));
/// ```
pub fn classify_failure(status: u16, body: &[u8]) -> OpenRouterError {
    match read_wire_error(body) {
        Ok(Some(error)) => OpenRouterError::Api(error.into_api_error(status)),
        Ok(None) => OpenRouterError::UnclassifiedHttp {
            status,
            body: excerpt(body),
            source: None,
        },
        Err(err) => OpenRouterError::UnclassifiedHttp {
            status,
            body: excerpt(body),
            source: Some(err),
        },
    }
}

/// Looks for an error object inside a `200` body.
///
/// The API sometimes reports failures inside a nominally successful envelope;
/// only an `error` object with a non-empty `message` counts.
pub fn sniff_embedded_error(body: &[u8]) -> Option<ApiError> {
    let error = read_wire_error(body).ok().flatten()?;
    if error.message.as_deref().is_none_or(str::is_empty) {
        return None;
    }
    Some(error.into_api_error(200))
}

/// Extracts the `error` object of a top-level JSON object.
///
/// Arrays and scalars never carry an error, even when their elements would
/// deserialize positionally into [`WireError`].
fn read_wire_error(body: &[u8]) -> Result<Option<WireError>, serde_json::Error> {
    let Value::Object(mut fields) = serde_json::from_slice::<Value>(body)? else {
        return Ok(None);
    };
    match fields.remove("error") {
        Some(error @ Value::Object(_)) => serde_json::from_value(error).map(Some),
        _ => Ok(None),
    }
}

fn excerpt(body: &[u8]) -> String {
    let end = body.len().min(BODY_EXCERPT_LIMIT);
    String::from_utf8_lossy(&body[..end]).into_owned()
}
