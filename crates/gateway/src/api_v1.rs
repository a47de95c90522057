//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/chat`          Run one orchestration call, get the final answer
//! - `POST /v1/chat/stream`   Same request, progress delivered as SSE events
//! - `GET  /v1/tools`         List registered tools by family

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use deckhand_agent::{OrchestrationResult, PROVIDER_FAILURE_MESSAGE};
use deckhand_core::error::Error;
use deckhand_core::message::ChatMessage;
use deckhand_core::provider::LlmConfig;
use deckhand_core::tool::ToolContext;

use crate::SharedState;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/tools", get(list_tools_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

/// Body of both chat endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The full conversation so far, ending with the user's turn
    pub messages: Vec<ChatMessage>,

    /// Identifiers passed through to the tool families
    #[serde(default)]
    pub context: ToolContext,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    fn validate(&self) -> Result<(), String> {
        if self.messages.is_empty() {
            return Err("messages must not be empty".into());
        }
        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err("temperature must be between 0.0 and 2.0".into());
        }
        if self.max_tokens == Some(0) {
            return Err("maxTokens must be at least 1".into());
        }
        Ok(())
    }

    /// Per-call model settings: request overrides on top of the defaults.
    fn llm_config(&self, defaults: &LlmConfig) -> LlmConfig {
        let mut llm = defaults.clone();
        if let Some(model) = self.model.as_deref().filter(|m| !m.trim().is_empty()) {
            llm.model = model.to_string();
        }
        if let Some(t) = self.temperature {
            llm.temperature = t;
        }
        if let Some(m) = self.max_tokens {
            llm.max_tokens = Some(m);
        }
        llm
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolDto {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    /// Family that handles this tool
    pub family: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDto>,
    pub count: usize,
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `POST /v1/chat`: run one buffered orchestration call.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<OrchestrationResult>, ApiError> {
    payload
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let llm = payload.llm_config(&state.defaults);
    info!(
        messages = payload.messages.len(),
        model = %llm.model,
        "v1/chat request"
    );

    let result = state
        .orchestrator
        .run(&payload.messages, &llm, &payload.context)
        .await
        .map_err(|e| match e {
            Error::Provider(err) => {
                warn!(error = %err, "Model call failed");
                api_error(StatusCode::BAD_GATEWAY, PROVIDER_FAILURE_MESSAGE)
            }
            other => {
                warn!(error = %other, "Orchestration failed");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        })?;

    Ok(Json(result))
}

// ── SSE Streaming ─────────────────────────────────────────────────────────

/// `POST /v1/chat/stream`: run one orchestration call, receive an SSE
/// stream of events.
///
/// Validation failures are reported as a plain HTTP error before the stream
/// opens; everything after that arrives as events, ending with exactly one
/// `final_message` or `error`.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    payload
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let llm = payload.llm_config(&state.defaults);
    info!(
        messages = payload.messages.len(),
        model = %llm.model,
        "v1/chat/stream SSE request"
    );

    let rx = state
        .orchestrator
        .run_stream(payload.messages, llm, payload.context);

    let stream = ReceiverStream::new(rx).map(|event| {
        let event_type = event.event_type();
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event_type).data(data))
    });

    Ok(Sse::new(stream))
}

/// `GET /v1/tools`: every tool the model is offered, in dispatch order.
async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let tools: Vec<ToolDto> = state
        .orchestrator
        .dispatcher()
        .families()
        .iter()
        .flat_map(|family| {
            let family_name = family.name().to_string();
            family.definitions().into_iter().map(move |d| ToolDto {
                name: d.name,
                description: d.description,
                parameters: d.parameters,
                family: family_name.clone(),
            })
        })
        .collect();

    let count = tools.len();
    Json(ToolListResponse { tools, count })
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    use deckhand_agent::Orchestrator;
    use deckhand_core::error::ProviderError;
    use deckhand_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage, WireToolCall};
    use deckhand_core::tool::ToolDispatcher;
    use deckhand_tools::{TodoFamily, TodoStore};

    use crate::AppState;

    /// Lightweight mock provider for gateway tests: plays back responses in
    /// order, failing once they run out or when scripted to.
    struct MockProvider {
        script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl MockProvider {
        fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn text(text: &str) -> Self {
            Self::new(vec![Ok(response(Some(text), vec![]))])
        }
    }

    #[async_trait::async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "gateway_mock"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".into())))
        }
    }

    fn response(content: Option<&str>, tool_calls: Vec<WireToolCall>) -> ProviderResponse {
        ProviderResponse {
            content: content.map(String::from),
            tool_calls,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
            finish_reason: Some("stop".into()),
        }
    }

    fn test_state(provider: Arc<MockProvider>) -> SharedState {
        let dispatcher = ToolDispatcher::new().with_family(Arc::new(TodoFamily::new(TodoStore::default())));
        let orchestrator = Orchestrator::new(provider, Arc::new(dispatcher));
        AppState::new(orchestrator, LlmConfig::new("mock-model"))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn hello() -> serde_json::Value {
        serde_json::json!({ "messages": [{ "role": "user", "content": "hello" }] })
    }

    #[tokio::test]
    async fn list_tools() {
        let app = v1_router(test_state(Arc::new(MockProvider::new(vec![]))));

        let req = Request::builder()
            .uri("/tools")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: ToolListResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.count, json.tools.len());
        assert!(json.tools.iter().any(|t| t.name == "todo_add"));
        assert!(json.tools.iter().all(|t| t.family == "todo"));
    }

    #[tokio::test]
    async fn chat_text_only() {
        let provider = Arc::new(MockProvider::text("Here is your outline."));
        let app = v1_router(test_state(provider.clone()));

        let response = app.oneshot(post_json("/chat", hello())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["message"], "Here is your outline.");
        assert!(json.get("toolCalls").is_none());
        assert_eq!(json["iterations"], 1);
        assert_eq!(json["outcome"], "completed");
    }

    #[tokio::test]
    async fn chat_applies_request_overrides() {
        let provider = Arc::new(MockProvider::text("ok"));
        let app = v1_router(test_state(provider.clone()));

        let mut body = hello();
        body["model"] = "gpt-4o-mini".into();
        body["temperature"] = 0.1.into();
        body["maxTokens"] = 256.into();

        let response = app.oneshot(post_json("/chat", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].model, "gpt-4o-mini");
        assert!((requests[0].temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(requests[0].max_tokens, Some(256));
    }

    #[tokio::test]
    async fn chat_runs_tools_with_request_context() {
        let provider = Arc::new(MockProvider::new(vec![
            Ok(response(
                None,
                vec![WireToolCall::function(
                    "call_1",
                    "todo_add",
                    r#"{"content":"Draft title slide"}"#,
                )],
            )),
            Ok(response(Some("Added it to your plan."), vec![])),
        ]));
        let app = v1_router(test_state(provider));

        let mut body = hello();
        body["context"] = serde_json::json!({ "sessionId": "s-1" });

        let response = app.oneshot(post_json("/chat", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["message"], "Added it to your plan.");
        assert_eq!(json["iterations"], 2);
        let calls = json["toolCalls"].as_array().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["name"], "todo_add");
        assert_eq!(calls[0]["result"]["content"], "Draft title slide");
        assert!(calls[0].get("error").is_none());
    }

    #[tokio::test]
    async fn chat_provider_failure_is_bad_gateway() {
        let provider = Arc::new(MockProvider::new(vec![Err(ProviderError::AuthenticationFailed(
            "invalid key sk-secret".into(),
        ))]));
        let app = v1_router(test_state(provider));

        let response = app.oneshot(post_json("/chat", hello())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let json = body_json(response).await;
        assert_eq!(json["error"], PROVIDER_FAILURE_MESSAGE);
        assert!(!json.to_string().contains("sk-secret"));
    }

    #[tokio::test]
    async fn chat_rejects_empty_conversation() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let app = v1_router(test_state(provider.clone()));

        let response = app
            .oneshot(post_json("/chat", serde_json::json!({ "messages": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "messages must not be empty");
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_rejects_out_of_range_temperature() {
        let app = v1_router(test_state(Arc::new(MockProvider::new(vec![]))));

        let mut body = hello();
        body["temperature"] = 3.5.into();

        let response = app.oneshot(post_json("/chat", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_rejects_missing_messages_field() {
        let app = v1_router(test_state(Arc::new(MockProvider::new(vec![]))));

        let response = app
            .oneshot(post_json("/chat", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn chat_stream_emits_named_events() {
        let provider = Arc::new(MockProvider::text("Streaming hello"));
        let app = v1_router(test_state(provider));

        let response = app.oneshot(post_json("/chat/stream", hello())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let text = body_text(response).await;
        let message_at = text.find("event: message").unwrap();
        let final_at = text.find("event: final_message").unwrap();
        assert!(message_at < final_at);
        assert!(text.contains(r#""content":"Streaming hello""#));
        assert!(text.contains(r#""ceilingReached":false"#));
        assert!(!text.contains("event: error"));
    }

    #[tokio::test]
    async fn chat_stream_reports_tool_lifecycle() {
        let provider = Arc::new(MockProvider::new(vec![
            Ok(response(
                None,
                vec![WireToolCall::function("call_1", "todo_list", "{}")],
            )),
            Ok(response(Some("Nothing planned yet."), vec![])),
        ]));
        let app = v1_router(test_state(provider));

        let mut body = hello();
        body["context"] = serde_json::json!({ "sessionId": "s-2" });

        let response = app.oneshot(post_json("/chat/stream", body)).await.unwrap();
        let text = body_text(response).await;

        let start = text.find("event: tool_call_start").unwrap();
        let complete = text.find("event: tool_call_complete").unwrap();
        let last = text.find("event: final_message").unwrap();
        assert!(start < complete && complete < last);
    }

    #[tokio::test]
    async fn chat_stream_provider_failure_is_error_event() {
        let provider = Arc::new(MockProvider::new(vec![Err(ProviderError::Network(
            "connection reset".into(),
        ))]));
        let app = v1_router(test_state(provider));

        let response = app.oneshot(post_json("/chat/stream", hello())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let text = body_text(response).await;
        assert!(text.contains("event: error"));
        assert!(!text.contains("event: final_message"));
        assert!(!text.contains("connection reset"));
    }

    #[tokio::test]
    async fn chat_stream_validates_before_opening() {
        let app = v1_router(test_state(Arc::new(MockProvider::new(vec![]))));

        let response = app
            .oneshot(post_json("/chat/stream", serde_json::json!({ "messages": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn blank_model_override_keeps_default() {
        let request: ChatRequest = serde_json::from_value(serde_json::json!({
            "messages": [{ "role": "user", "content": "hi" }],
            "model": "  "
        }))
        .unwrap();
        let llm = request.llm_config(&LlmConfig::new("gpt-4o").with_max_tokens(4096));
        assert_eq!(llm.model, "gpt-4o");
        assert_eq!(llm.max_tokens, Some(4096));
    }
}
