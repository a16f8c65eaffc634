//! Mock OpenAI-compatible upstream returning scripted responses

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// How the mock answers chat completions that offer tools
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum ToolCallBehavior {
    /// Emit the same tool call on every turn
    Repeated { name: String, arguments: String },
    /// Emit a tool call with fresh arguments each turn, so loop
    /// detection never triggers
    Unique { name: String },
}

/// Builder for a scripted mock upstream
pub struct MockUpstreamBuilder {
    models: Vec<String>,
    content: String,
    omit_usage: bool,
    tool_calls: Option<ToolCallBehavior>,
}

#[allow(dead_code)]
impl MockUpstreamBuilder {
    pub fn models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| (*m).to_owned()).collect();
        self
    }

    pub fn content(mut self, content: &str) -> Self {
        self.content = content.to_owned();
        self
    }

    /// Leave `usage` out of completions so the gateway must synthesize it
    pub fn omit_usage(mut self) -> Self {
        self.omit_usage = true;
        self
    }

    pub fn tool_calls(mut self, behavior: ToolCallBehavior) -> Self {
        self.tool_calls = Some(behavior);
        self
    }

    pub async fn start(self) -> anyhow::Result<MockUpstream> {
        MockUpstream::start_inner(self, None).await
    }

    /// Bind to a specific address, for restart-after-crash scenarios
    pub async fn start_at(self, addr: SocketAddr) -> anyhow::Result<MockUpstream> {
        MockUpstream::start_inner(self, Some(addr)).await
    }
}

/// A running mock upstream
pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    models: Vec<String>,
    content: String,
    omit_usage: bool,
    tool_calls: Option<ToolCallBehavior>,
    completion_count: AtomicU32,
}

impl MockUpstream {
    pub fn builder() -> MockUpstreamBuilder {
        MockUpstreamBuilder {
            models: vec!["mock-model".to_owned()],
            content: "Hello from mock upstream".to_owned(),
            omit_usage: false,
            tool_calls: None,
        }
    }

    async fn start_inner(builder: MockUpstreamBuilder, addr: Option<SocketAddr>) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            models: builder.models,
            content: builder.content,
            omit_usage: builder.omit_usage,
            tool_calls: builder.tool_calls,
            completion_count: AtomicU32::new(0),
        });

        let app = Router::new()
            .route("/v1/models", routing::get(handle_models))
            .route("/v1/chat/completions", routing::post(handle_chat))
            .route("/v1/embeddings", routing::post(handle_embeddings))
            .with_state(Arc::clone(&state));

        let bind_addr = addr.unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 0)));
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    server_shutdown.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL to configure as a provider, including the `/v1` prefix
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of chat completion requests served
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Shut the server down, leaving the port closed
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    #[serde(default)]
    stream: Option<bool>,
    #[serde(default)]
    tools: Option<Vec<Value>>,
}

async fn handle_models(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    let data: Vec<Value> = state
        .models
        .iter()
        .map(|id| json!({"id": id, "object": "model", "created": 1_700_000_000, "owned_by": "mock"}))
        .collect();

    Json(json!({"object": "list", "data": data}))
}

async fn handle_chat(State(state): State<Arc<MockState>>, Json(request): Json<ChatRequest>) -> impl IntoResponse {
    let turn = state.completion_count.fetch_add(1, Ordering::Relaxed);

    if request.stream.unwrap_or(false) {
        return streaming_response(&state, &request).into_response();
    }

    // Tool-call behavior only fires while the request still offers tools
    if let (Some(behavior), Some(_)) = (&state.tool_calls, &request.tools) {
        let (name, arguments) = match behavior {
            ToolCallBehavior::Repeated { name, arguments } => (name.clone(), arguments.clone()),
            ToolCallBehavior::Unique { name } => (name.clone(), format!(r#"{{"query":"q{turn}"}}"#)),
        };

        let body = json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": request.model,
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": format!("call_{turn}"),
                        "type": "function",
                        "function": {"name": name, "arguments": arguments}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        return Json(body).into_response();
    }

    let mut body = json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": request.model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": state.content},
            "finish_reason": "stop"
        }]
    });
    if !state.omit_usage {
        body["usage"] = json!({"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15});
    }

    Json(body).into_response()
}

/// SSE body: role chunk, one content chunk per word, then the stop chunk.
/// Usage rides on the stop chunk unless the mock omits it.
fn streaming_response(state: &MockState, request: &ChatRequest) -> impl IntoResponse {
    let id = "chatcmpl-mock-stream";
    let created = 1_700_000_000u64;
    let mut body = String::new();

    let mut push_chunk = |chunk: Value| {
        body.push_str(&format!("data: {chunk}\n\n"));
    };

    push_chunk(json!({
        "id": id, "object": "chat.completion.chunk", "created": created, "model": request.model,
        "choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}, "finish_reason": null}]
    }));

    for word in state.content.split_whitespace() {
        push_chunk(json!({
            "id": id, "object": "chat.completion.chunk", "created": created, "model": request.model,
            "choices": [{"index": 0, "delta": {"content": format!("{word} ")}, "finish_reason": null}]
        }));
    }

    let mut stop = json!({
        "id": id, "object": "chat.completion.chunk", "created": created, "model": request.model,
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
    });
    if !state.omit_usage {
        stop["usage"] = json!({"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15});
    }
    push_chunk(stop);

    body.push_str("data: [DONE]\n\n");

    (
        StatusCode::OK,
        [(http::header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
}

async fn handle_embeddings(State(_state): State<Arc<MockState>>, Json(request): Json<Value>) -> impl IntoResponse {
    Json(json!({
        "object": "list",
        "data": [{"object": "embedding", "embedding": [0.1, 0.2, 0.3], "index": 0}],
        "model": request.get("model").cloned().unwrap_or(Value::Null),
        "usage": {"prompt_tokens": 8, "total_tokens": 8}
    }))
}
