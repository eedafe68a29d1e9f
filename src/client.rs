use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::builder::{RequestBuilder, full_url};
use crate::classify::classify_failure;
use crate::config::ClientConfig;
use crate::decode::{decode_json, decode_text};
use crate::error::{OpenRouterError, Result};
use crate::executor::{SUCCESS_STATUS, collect_body};
use crate::headers::HeaderPolicy;
use crate::http::{HttpMethod, HttpRequest, HttpStreamResponse};
use crate::models::{ModelCatalog, ModelSupport};
use crate::retry::{RetryController, with_cancel};
use crate::types::{ChatCompletionRequest, ChatCompletionResponse};

pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Entry point for calls against an OpenRouter-compatible API.
///
/// Cloning is cheap; clones share the same [`ClientConfig`] and model predicate.
#[derive(Clone)]
pub struct OpenRouterClient {
    config: Arc<ClientConfig>,
    models: Arc<dyn ModelSupport>,
    builder: RequestBuilder,
}

impl fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OpenRouterClient {
    /// Creates a client with the default [`ModelCatalog`].
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            models: Arc::new(ModelCatalog::default()),
            builder: RequestBuilder::new(),
        }
    }

    /// Creates a client from `OPENROUTER_*` environment variables.
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        ClientConfig::from_env().map(Self::new)
    }

    /// Replaces the predicate deciding which models may be requested.
    pub fn with_model_support(mut self, models: impl ModelSupport + 'static) -> Self {
        self.models = Arc::new(models);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends a chat completion and waits for the full response.
    pub async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        self.create_chat_completion_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`Self::create_chat_completion`], aborting when `cancel` fires.
    ///
    /// # Errors
    ///
    /// - [`OpenRouterError::StreamNotSupported`] when `request.stream` is set,
    /// - [`OpenRouterError::UnsupportedModel`] when the model predicate rejects the model,
    /// - any pipeline error of [`Self::send_json`].
    pub async fn create_chat_completion_with_cancel(
        &self,
        mut request: ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse> {
        if request.stream {
            return Err(OpenRouterError::StreamNotSupported);
        }
        self.resolve_model(&mut request)?;

        let response: ChatCompletionResponse = self
            .send_json(HttpMethod::Post, CHAT_COMPLETIONS_PATH, Some(&request), cancel)
            .await?;
        debug!(
            id = %response.id,
            model = %response.model,
            choices = response.choices.len(),
            usage = ?response.usage,
            "chat completion received"
        );
        Ok(response)
    }

    /// Opens a streaming chat completion and returns the raw response body.
    ///
    /// `stream` is forced on. The request is attempted once; a non-200 status is
    /// drained and classified like any other failure. Framing of the returned
    /// byte stream is left to the caller.
    pub async fn open_chat_completion_stream(
        &self,
        mut request: ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpStreamResponse> {
        request.stream = true;
        self.resolve_model(&mut request)?;

        let url = full_url(self.config.base_url(), CHAT_COMPLETIONS_PATH);
        let mut http_request = self.builder.build(HttpMethod::Post, &url, Some(&request))?;
        if let Some(timeout) = self.config.timeout() {
            http_request.timeout = Some(timeout);
        }
        HeaderPolicy::new(&self.config).apply_stream(&mut http_request);

        debug!(url = %http_request.url, "opening chat completion stream");
        let response = with_cancel(cancel, self.config.transport().send_stream(http_request)).await?;
        if response.status != SUCCESS_STATUS {
            let status = response.status;
            let body = with_cancel(cancel, collect_body(response.body)).await?;
            return Err(classify_failure(status, &body));
        }
        Ok(response)
    }

    /// Runs the full pipeline and deserializes the success body into `T`.
    ///
    /// `suffix` is appended to the configured base URL.
    pub async fn send_json<B, T>(
        &self,
        method: HttpMethod,
        suffix: &str,
        body: Option<&B>,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.prepare(method, suffix, body)?;
        let bytes = self.execute(&request, cancel).await?;
        decode_json(&bytes)
    }

    /// Runs the full pipeline and returns the success body verbatim.
    pub async fn send_text<B>(
        &self,
        method: HttpMethod,
        suffix: &str,
        body: Option<&B>,
        cancel: &CancellationToken,
    ) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let request = self.prepare(method, suffix, body)?;
        let bytes = self.execute(&request, cancel).await?;
        decode_text(bytes)
    }

    /// Sends a caller-built request through the header policy and retry controller.
    ///
    /// Meant for bodies the JSON builder cannot produce, e.g. multipart uploads; a
    /// `Content-Type` already set on `request` is kept.
    pub async fn send_raw(&self, mut request: HttpRequest, cancel: &CancellationToken) -> Result<Vec<u8>> {
        self.stamp(&mut request);
        self.execute(&request, cancel).await
    }

    fn prepare<B>(&self, method: HttpMethod, suffix: &str, body: Option<&B>) -> Result<HttpRequest>
    where
        B: Serialize + ?Sized,
    {
        let url = full_url(self.config.base_url(), suffix);
        let mut request = self.builder.build(method, &url, body)?;
        self.stamp(&mut request);
        Ok(request)
    }

    fn stamp(&self, request: &mut HttpRequest) {
        if request.timeout.is_none() {
            request.timeout = self.config.timeout();
        }
        HeaderPolicy::new(&self.config).apply_json(request);
    }

    async fn execute(&self, request: &HttpRequest, cancel: &CancellationToken) -> Result<Vec<u8>> {
        RetryController::new(self.config.retry())
            .send(self.config.transport().as_ref(), request, cancel)
            .await
    }

    fn resolve_model(&self, request: &mut ChatCompletionRequest) -> Result<()> {
        if let Some(model) = self.models.resolve_alias(&request.model) {
            request.model = model;
        }
        if !self.models.supports_model(&request.model) {
            return Err(OpenRouterError::UnsupportedModel {
                model: request.model.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, JSON_MEDIA_TYPE};
    use crate::retry::RetryConfig;
    use crate::testing::{ScriptedTransport, Step, ok, status, test_config};
    use crate::types::{ChatMessage, ChatRole};
    use proptest::prelude::*;
    use serde_json::{Map, Number, Value, json};
    use std::time::Duration;

    const COMPLETION: &str = r#"{
        "id": "gen-123",
        "object": "chat.completion",
        "created": 1718000000,
        "model": "openai/gpt-4o",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
    }"#;

    fn client(steps: Vec<Step>) -> (OpenRouterClient, Arc<ScriptedTransport>) {
        let transport = ScriptedTransport::new(steps);
        (OpenRouterClient::new(test_config(transport.clone())), transport)
    }

    fn chat(model: &str) -> ChatCompletionRequest {
        ChatCompletionRequest::new(model, vec![ChatMessage::user("Hi")])
    }

    #[tokio::test]
    async fn chat_completion_posts_to_endpoint_with_headers() {
        let (client, transport) = client(vec![ok(COMPLETION)]);

        let response = client.create_chat_completion(chat("gpt-4o")).await.unwrap();
        assert_eq!(response.first_content(), Some("Hello!"));
        assert_eq!(response.usage.as_ref().map(|usage| usage.total_tokens), Some(7));

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(sent.url, "https://openrouter.test/api/v1/chat/completions");
        assert_eq!(sent.headers.get(CONTENT_TYPE), Some(JSON_MEDIA_TYPE));
        assert_eq!(sent.headers.get(AUTHORIZATION), Some("Bearer test-token"));

        let body: Value = serde_json::from_slice(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["model"], "openai/gpt-4o", "alias should be resolved");
    }

    #[tokio::test]
    async fn stream_flag_is_rejected_before_any_request() {
        let (client, transport) = client(Vec::new());
        let mut request = chat("openai/gpt-4o");
        request.stream = true;

        let err = client.create_chat_completion(request).await.unwrap_err();
        assert!(matches!(err, OpenRouterError::StreamNotSupported));
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn unsupported_model_is_rejected_before_any_request() {
        let (client, transport) = client(Vec::new());
        let client = client.with_model_support(|name: &str| name.starts_with("anthropic/"));

        match client.create_chat_completion(chat("openai/gpt-4o")).await {
            Err(OpenRouterError::UnsupportedModel { model }) => assert_eq!(model, "openai/gpt-4o"),
            other => panic!("expected UnsupportedModel, got {other:?}"),
        }
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn echoed_payload_round_trips() {
        let (client, transport) = client(vec![Step::Echo, Step::Echo]);
        let payload = json!({"model": "m", "nested": {"list": [1, 2.5, "three", null]}});

        let echoed: Value = client
            .send_json(HttpMethod::Post, "/echo", Some(&payload), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(echoed, payload);

        let request = chat("openai/gpt-4o");
        let echoed: ChatCompletionRequest = client
            .send_json(HttpMethod::Post, "/echo", Some(&request), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(echoed, request);
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test]
    async fn text_destination_receives_raw_body() {
        let (client, _) = client(vec![ok("plain text, not json")]);
        let text = client
            .send_text::<()>(HttpMethod::Get, "/models", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, "plain text, not json");
    }

    #[tokio::test]
    async fn array_bodies_reach_the_text_destination_verbatim() {
        let listing = r#"[{"message":"hello from list endpoint"}]"#;
        let (client, transport) = client(vec![ok(listing)]);
        let text = client
            .send_text::<()>(HttpMethod::Get, "/models", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, listing);
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_utf8_text_body_is_not_retried() {
        let (client, transport) = client(vec![Step::Respond(200, vec![0xff, 0xfe, b'!'])]);
        let err = client
            .send_text::<()>(HttpMethod::Get, "/models", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OpenRouterError::Decode { .. }));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failures_are_not_retried() {
        let (client, transport) = client(vec![ok(r#"{"unexpected":true}"#)]);

        let err = client.create_chat_completion(chat("openai/gpt-4o")).await.unwrap_err();
        assert!(matches!(err, OpenRouterError::Decode { .. }));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn embedded_error_never_decodes_as_success() {
        let (client, transport) = client(vec![ok(r#"{"error":{"message":"boom"}}"#)]);

        match client.create_chat_completion(chat("openai/gpt-4o")).await {
            Err(OpenRouterError::Api(api)) => assert_eq!(api.message, "boom"),
            other => panic!("expected Api error, got {other:?}"),
        }
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_replay_identical_bodies() {
        let (client, transport) = client(vec![
            status(500, r#"{"error":{"message":"Internal Server Error"}}"#),
            Step::Fail(OpenRouterError::transport("connection reset by peer")),
            ok(COMPLETION),
        ]);

        let response = client.create_chat_completion(chat("openai/gpt-4o")).await.unwrap();
        assert_eq!(response.id, "gen-123");

        let sent = transport.requests();
        assert_eq!(sent.len(), 3);
        assert!(sent.windows(2).all(|pair| pair[0].body == pair[1].body));
        assert!(sent.windows(2).all(|pair| pair[0].headers == pair[1].headers));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_keeps_the_last_api_error() {
        let transport = ScriptedTransport::new(
            (0..3)
                .map(|_| status(503, r#"{"error":{"message":"Overloaded"}}"#))
                .collect(),
        );
        let config = test_config(transport.clone()).with_retry(
            RetryConfig::default()
                .with_max_retries(2)
                .with_initial_backoff(Duration::from_millis(10)),
        );
        let client = OpenRouterClient::new(config);

        let err = client.create_chat_completion(chat("openai/gpt-4o")).await.unwrap_err();
        assert_eq!(transport.attempts(), 3);
        assert_eq!(err.status(), Some(503));
        match err.last_failure() {
            OpenRouterError::Api(api) => assert_eq!(api.message, "Overloaded"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn configured_timeout_is_forwarded() {
        let transport = ScriptedTransport::new(vec![ok(COMPLETION)]);
        let config = test_config(transport.clone()).with_timeout(Duration::from_secs(30));
        OpenRouterClient::new(config)
            .create_chat_completion(chat("openai/gpt-4o"))
            .await
            .unwrap();
        assert_eq!(transport.requests()[0].timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn stream_request_uses_event_stream_headers() {
        let (client, transport) = client(vec![ok("data: {\"id\":\"gen-1\"}\n\ndata: [DONE]\n\n")]);

        let response = client
            .open_chat_completion_stream(chat("openai/gpt-4o"), &CancellationToken::new())
            .await
            .unwrap();
        let body = collect_body(response.body).await.unwrap();
        assert!(body.ends_with(b"data: [DONE]\n\n"));

        let sent = &transport.requests()[0];
        assert_eq!(sent.headers.get(ACCEPT), Some("text/event-stream"));
        assert_eq!(sent.headers.get(CACHE_CONTROL), Some("no-cache"));
        let payload: Value = serde_json::from_slice(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(payload["stream"], true);
    }

    #[tokio::test]
    async fn failed_stream_request_is_classified_without_retry() {
        let (client, transport) = client(vec![status(
            401,
            r#"{"error":{"message":"No auth credentials found","code":401}}"#,
        )]);

        let err = client
            .open_chat_completion_stream(chat("openai/gpt-4o"), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            OpenRouterError::Api(api) => {
                assert_eq!(api.http_status, Some(401));
                assert_eq!(api.message, "No auth credentials found");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert_eq!(transport.attempts(), 1);
    }

    /// Sends `payload` through the full pipeline against a transport that echoes
    /// the request body back.
    fn echo_round_trip<T>(payload: &T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let (client, _) = client(vec![Step::Echo]);
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build")
            .block_on(client.send_json(HttpMethod::Post, "/echo", Some(payload), &CancellationToken::new()))
    }

    /// Finite numbers that survive a text round trip exactly.
    fn json_number() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<u64>().prop_map(Value::from),
            (-4096i32..4096).prop_map(|quarter| {
                Number::from_f64(f64::from(quarter) * 0.25).map_or(Value::Null, Value::Number)
            }),
        ]
    }

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            json_number(),
            "\\PC{0,24}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{0,8}", inner, 0..6)
                    .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>())),
            ]
        })
    }

    fn chat_message() -> impl Strategy<Value = ChatMessage> {
        let role = prop_oneof![
            Just(ChatRole::system()),
            Just(ChatRole::user()),
            Just(ChatRole::assistant()),
            "[a-z]{1,10}".prop_map(ChatRole),
        ];
        (role, "\\PC{0,40}", proptest::option::of("[a-zA-Z0-9_]{1,12}")).prop_map(
            |(role, content, name)| ChatMessage {
                role,
                content,
                name,
            },
        )
    }

    fn chat_request_strategy() -> impl Strategy<Value = ChatCompletionRequest> {
        (
            "[a-z-]{1,12}/[a-z0-9.-]{1,16}",
            prop::collection::vec(chat_message(), 0..5),
            proptest::option::of(1u32..8192),
            proptest::option::of((0u8..=8).prop_map(|quarter| f32::from(quarter) * 0.25)),
            prop::collection::vec("\\PC{1,8}", 0..3),
            proptest::option::of(any::<i64>()),
            prop::collection::vec("[a-z-]{1,8}/[a-z0-9-]{1,8}", 0..3),
        )
            .prop_map(
                |(model, messages, max_tokens, temperature, stop, seed, models)| ChatCompletionRequest {
                    max_tokens,
                    temperature,
                    stop,
                    seed,
                    models,
                    ..ChatCompletionRequest::new(model, messages)
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn any_json_payload_round_trips(
            payload in json_value().prop_filter("an error object is reported, not echoed", |value| {
                value.get("error").is_none_or(|error| !error.is_object())
            })
        ) {
            let echoed: Value = echo_round_trip(&payload).expect("echo should succeed");
            prop_assert_eq!(echoed, payload);
        }

        #[test]
        fn any_chat_request_round_trips(request in chat_request_strategy()) {
            let echoed = echo_round_trip(&request).expect("echo should succeed");
            prop_assert_eq!(echoed, request);
        }
    }
}
