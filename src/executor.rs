use futures_util::StreamExt;
use tracing::debug;

use crate::classify::{classify_failure, sniff_embedded_error};
use crate::error::Result;
use crate::http::{HttpBodyStream, HttpRequest, HttpTransport};

/// The only status treated as success; other 2xx codes take the failure path.
pub const SUCCESS_STATUS: u16 = 200;

/// Performs exactly one attempt and returns the success body.
///
/// The body is read into memory once. A non-200 status goes to
/// [`classify_failure`]; a 200 body is checked by [`sniff_embedded_error`] before
/// it is handed back for decoding.
pub async fn execute_once(transport: &dyn HttpTransport, request: HttpRequest) -> Result<Vec<u8>> {
    debug!(method = %request.method, url = %request.url, "sending request");
    let response = transport.send(request).await?;
    debug!(status = response.status, bytes = response.body.len(), "received response");

    if response.status != SUCCESS_STATUS {
        return Err(classify_failure(response.status, &response.body));
    }
    if let Some(api) = sniff_embedded_error(&response.body) {
        return Err(api.into());
    }
    Ok(response.body)
}

/// Drains a streaming body into memory, e.g. to classify a failed stream request.
pub async fn collect_body(mut body: HttpBodyStream) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    while let Some(chunk) = body.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer)
}
