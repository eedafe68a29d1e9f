//! In-memory transport used by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;

use crate::config::ClientConfig;
use crate::error::{OpenRouterError, Result};
use crate::http::{HeaderSet, HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};
use crate::retry::{FixedJitter, RetryConfig};

/// One scripted reaction of [`ScriptedTransport`].
pub(crate) enum Step {
    Respond(u16, Vec<u8>),
    Fail(OpenRouterError),
    /// Never resolves, to exercise cancellation of an in-flight request.
    Hang,
    /// Answers `200` with whatever body the request carried.
    Echo,
}

pub(crate) fn ok(body: &str) -> Step {
    Step::Respond(200, body.as_bytes().to_vec())
}

pub(crate) fn status(code: u16, body: &str) -> Step {
    Step::Respond(code, body.as_bytes().to_vec())
}

/// Replays a fixed list of steps and records every request it receives.
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    async fn next(&self, request: HttpRequest) -> Result<(u16, Vec<u8>)> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport received more requests than scripted");
        match step {
            Step::Respond(status, body) => Ok((status, body)),
            Step::Fail(err) => Err(err),
            Step::Hang => std::future::pending().await,
            Step::Echo => Ok((200, request.body.map(|body| body.to_vec()).unwrap_or_default())),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let (status, body) = self.next(request).await?;
        Ok(HttpResponse {
            status,
            headers: HeaderSet::new(),
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse> {
        let (status, body) = self.next(request).await?;
        let middle = body.len() / 2;
        let chunks = vec![
            Ok(Bytes::copy_from_slice(&body[..middle])),
            Ok(Bytes::copy_from_slice(&body[middle..])),
        ];
        Ok(HttpStreamResponse {
            status,
            headers: HeaderSet::new(),
            body: Box::pin(stream::iter(chunks)),
        })
    }
}

/// Configuration with deterministic backoff: 1s, 2s, 4s for the three retries.
pub(crate) fn test_config(transport: Arc<ScriptedTransport>) -> ClientConfig {
    ClientConfig::with_transport_handle("test-token", "test-app", "https://test.example", transport)
        .unwrap()
        .with_base_url("https://openrouter.test/api/v1")
        .unwrap()
        .with_retry(
            RetryConfig::default()
                .with_max_retries(3)
                .with_initial_backoff(Duration::from_secs(1))
                .with_jitter(FixedJitter::new(1.0)),
        )
}
