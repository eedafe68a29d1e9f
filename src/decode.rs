use std::any::type_name;

use serde::de::DeserializeOwned;

use crate::error::{OpenRouterError, Result};

/// Bytes of the body quoted in a [`OpenRouterError::Decode`] message.
const PREFIX_LIMIT: usize = 64;

/// Returns the success body verbatim as text.
///
/// # Errors
///
/// [`OpenRouterError::Decode`] when the body is not UTF-8.
pub fn decode_text(body: Vec<u8>) -> Result<String> {
    String::from_utf8(body).map_err(|err| {
        let (len, prefix) = describe(err.as_bytes());
        OpenRouterError::Decode {
            target: type_name::<String>(),
            len,
            prefix,
            source: Box::new(err),
        }
    })
}

/// Deserializes the success body into `T`.
///
/// # Examples
///
/// ```
/// use openrouter_http::decode::decode_json;
/// use serde_json::Value;
///
/// let value: Value = decode_json(br#"{"id":"gen-1"}"#).unwrap();
/// assert_eq!(value["id"], "gen-1");
/// ```
///
/// # Errors
///
/// [`OpenRouterError::Decode`] naming `T`, the body length and its first bytes.
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|err| {
        let (len, prefix) = describe(body);
        OpenRouterError::Decode {
            target: type_name::<T>(),
            len,
            prefix,
            source: Box::new(err),
        }
    })
}

fn describe(body: &[u8]) -> (usize, String) {
    let end = body.len().min(PREFIX_LIMIT);
    (body.len(), String::from_utf8_lossy(&body[..end]).into_owned())
}
