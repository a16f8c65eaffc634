//! Axum route handlers for the OpenAI-compatible surface.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use http::{HeaderValue, StatusCode, header};
use serde_json::Value;

use crossbar_core::HttpError;

use crate::error::LlmError;
use crate::protocol::{ChatCompletionRequest, Model, ModelsResponse};
use crate::state::LlmState;
use crate::stream::relay_sse;

/// Build the router for the OpenAI-compatible endpoints
pub fn llm_router(state: LlmState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/models", routing::get(list_models))
        .route("/v1/embeddings", routing::post(embeddings))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
async fn chat_completions(State(state): State<LlmState>, Json(request): Json<ChatCompletionRequest>) -> Response {
    if request.stream.unwrap_or(false) {
        streaming_completion(&state, &request).await
    } else {
        match state.complete(&request).await {
            Ok(response) => Json(response).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

/// Relay a streaming completion, splicing usage into the final chunk
async fn streaming_completion(state: &LlmState, request: &ChatCompletionRequest) -> Response {
    let completion = match state.complete_raw(request).await {
        Ok(completion) => completion,
        Err(e) => return error_response(&e),
    };

    let upstream_headers = completion.upstream.headers().clone();
    let body_stream = relay_sse(
        Box::pin(completion.upstream.bytes_stream()),
        completion.estimator,
        completion.guard,
    );

    let mut response = Response::new(Body::from_stream(body_stream));

    // Relay upstream headers, minus the ones invalidated by the rewrite
    for (name, value) in &upstream_headers {
        if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    response
}

/// Handle `GET /v1/models`
///
/// Refreshes the index first (when configured) so newly added providers
/// and rotated catalogs show up without operator action.
async fn list_models(State(state): State<LlmState>) -> Response {
    state.refresh_for_listing().await;

    let now = unix_now();
    let data: Vec<Model> = state
        .index()
        .model_ids()
        .await
        .into_iter()
        .map(|id| Model {
            id,
            object: "model".to_owned(),
            created: now,
            owned_by: "crossbar".to_owned(),
        })
        .collect();

    Json(ModelsResponse {
        object: "list".to_owned(),
        data,
    })
    .into_response()
}

/// Handle `POST /v1/embeddings`
async fn embeddings(State(state): State<LlmState>, Json(request): Json<Value>) -> Response {
    match state.embed(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Convert a routing error into an OpenAI-style JSON error response
fn error_response(error: &LlmError) -> Response {
    let status = error.status_code();
    let body = serde_json::json!({
        "error": {
            "message": error.client_message(),
            "type": error.error_type(),
            "code": Value::Null,
        }
    });

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %error, "chat completion failed");
    }

    (status, Json(body)).into_response()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
