//! Response-object CRUD over the store, with background execution
//! through the tool-calling driver.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use crossbar_llm::LlmState;
use crossbar_llm::protocol::{ChatCompletionRequest, ChatMessage};
use crossbar_mcp::McpServer;
use crossbar_store::{ResponseError, ResponseRecord, ResponseStatus, Store, StoreError, generate_id};

#[derive(Clone)]
pub struct ResponsesState {
    pub store: Arc<Store>,
    pub llm: LlmState,
    pub mcp: McpServer,
}

pub fn responses_router(state: ResponsesState) -> Router {
    Router::new()
        .route("/v1/responses", routing::post(create_response))
        .route("/v1/responses/{id}", routing::get(get_response).delete(delete_response))
        .route("/v1/responses/{id}/cancel", routing::post(cancel_response))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateResponseRequest {
    model: String,
    input: Value,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    previous_response_id: Option<String>,
}

async fn create_response(
    State(state): State<ResponsesState>,
    Json(request): Json<CreateResponseRequest>,
) -> Response {
    let mut record = ResponseRecord::new(generate_id("resp"), unix_now(), request.model.clone());
    record.input = normalize_input(&request.input);
    record.instructions = request.instructions.clone();
    record.previous_response_id = request.previous_response_id.clone();

    if let Err(e) = state.store.put_response(&record) {
        return store_error_response(&e);
    }

    // Execute in the background; clients poll for completion
    let task_state = state.clone();
    let id = record.id.clone();
    tokio::spawn(async move {
        execute_response(&task_state, &id).await;
    });

    (StatusCode::OK, Json(record_json(&record))).into_response()
}

async fn get_response(State(state): State<ResponsesState>, Path(id): Path<String>) -> Response {
    match state.store.get_response(&id) {
        Ok(record) => Json(record_json(&record)).into_response(),
        Err(e) => store_error_response(&e),
    }
}

async fn delete_response(State(state): State<ResponsesState>, Path(id): Path<String>) -> Response {
    match state.store.delete_response(&id) {
        Ok(()) => Json(json!({"id": id, "object": "response.deleted", "deleted": true})).into_response(),
        Err(e) => store_error_response(&e),
    }
}

async fn cancel_response(State(state): State<ResponsesState>, Path(id): Path<String>) -> Response {
    let mut record = match state.store.get_response(&id) {
        Ok(record) => record,
        Err(e) => return store_error_response(&e),
    };

    if !record.status.is_terminal() {
        record.status = ResponseStatus::Cancelled;
        if let Err(e) = state.store.put_response(&record) {
            return store_error_response(&e);
        }
    }

    Json(record_json(&record)).into_response()
}

/// Run the completion for a stored response and persist the outcome
async fn execute_response(state: &ResponsesState, id: &str) {
    let Ok(mut record) = state.store.get_response(id) else {
        return;
    };
    if record.status.is_terminal() {
        return;
    }

    record.status = ResponseStatus::InProgress;
    if state.store.put_response(&record).is_err() {
        return;
    }

    let request = build_completion_request(state, &record);

    let outcome = crossbar_mcp::complete_with_tools(&state.llm, &state.mcp, request).await;

    // A cancel may have landed while we were executing
    let Ok(mut record) = state.store.get_response(id) else {
        return;
    };
    if record.status.is_terminal() {
        return;
    }

    match outcome {
        Ok(response) => {
            let text = response
                .choices
                .first()
                .map(|c| c.message.content_text())
                .unwrap_or_default();
            record.status = ResponseStatus::Completed;
            record.output = vec![json!({
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": text}],
            })];
        }
        Err(e) => {
            tracing::warn!(response = id, error = %e, "response execution failed");
            record.status = ResponseStatus::Failed;
            record.error = Some(ResponseError {
                code: "completion_failed".to_owned(),
                message: e.to_string(),
            });
        }
    }

    if let Err(e) = state.store.put_response(&record) {
        tracing::error!(response = id, error = %e, "failed to persist response outcome");
    }
}

/// Assemble the chat request from instructions, prior context, and input
fn build_completion_request(state: &ResponsesState, record: &ResponseRecord) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(ref instructions) = record.instructions {
        messages.push(ChatMessage::text("system", instructions.clone()));
    }

    if let Some(ref previous_id) = record.previous_response_id {
        if let Ok(previous) = state.store.get_response(previous_id) {
            for item in &previous.input {
                if let Some(text) = item.as_str() {
                    messages.push(ChatMessage::text("user", text));
                }
            }
            let output = previous.output_text();
            if !output.is_empty() {
                messages.push(ChatMessage::text("assistant", output));
            }
        }
    }

    for item in &record.input {
        if let Some(text) = item.as_str() {
            messages.push(ChatMessage::text("user", text));
        } else if let (Some(role), Some(content)) = (
            item.get("role").and_then(Value::as_str),
            item.get("content").and_then(Value::as_str),
        ) {
            messages.push(ChatMessage::text(role, content));
        }
    }

    ChatCompletionRequest {
        model: record.model.clone(),
        messages,
        stream: None,
        tools: None,
        tool_choice: None,
        extra: serde_json::Map::new(),
    }
}

fn normalize_input(input: &Value) -> Vec<Value> {
    match input {
        Value::String(s) => vec![Value::String(s.clone())],
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn record_json(record: &ResponseRecord) -> Value {
    serde_json::to_value(record).unwrap_or_else(|_| json!({"id": record.id}))
}

pub(crate) fn store_error_response(error: &StoreError) -> Response {
    let status = match error {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = json!({
        "error": {
            "message": error.to_string(),
            "type": if status == StatusCode::NOT_FOUND { "not_found_error" } else { "internal_error" },
        }
    });
    (status, Json(body)).into_response()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
