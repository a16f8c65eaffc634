//! Conversation-object CRUD over the store.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use crossbar_store::{ConversationRecord, Store, generate_id};

use crate::responses::store_error_response;

pub fn conversations_router(store: Arc<Store>) -> Router {
    Router::new()
        .route("/v1/conversations", routing::post(create_conversation))
        .route(
            "/v1/conversations/{id}",
            routing::get(get_conversation).delete(delete_conversation),
        )
        .route(
            "/v1/conversations/{id}/items",
            routing::post(append_items).get(list_items),
        )
        .with_state(store)
}

#[derive(Debug, Default, Deserialize)]
struct CreateConversationRequest {
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    items: Option<Vec<Value>>,
}

async fn create_conversation(
    State(store): State<Arc<Store>>,
    request: Option<Json<CreateConversationRequest>>,
) -> Response {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let mut record = ConversationRecord::new(generate_id("conv"), unix_now());
    record.metadata = request.metadata;
    record.items = request.items.unwrap_or_default();

    match store.put_conversation(&record) {
        Ok(()) => Json(record).into_response(),
        Err(e) => store_error_response(&e),
    }
}

async fn get_conversation(State(store): State<Arc<Store>>, Path(id): Path<String>) -> Response {
    match store.get_conversation(&id) {
        Ok(record) => Json(record).into_response(),
        Err(e) => store_error_response(&e),
    }
}

async fn delete_conversation(State(store): State<Arc<Store>>, Path(id): Path<String>) -> Response {
    match store.delete_conversation(&id) {
        Ok(()) => {
            Json(json!({"id": id, "object": "conversation.deleted", "deleted": true})).into_response()
        }
        Err(e) => store_error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
struct AppendItemsRequest {
    items: Vec<Value>,
}

async fn append_items(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
    Json(request): Json<AppendItemsRequest>,
) -> Response {
    let mut record = match store.get_conversation(&id) {
        Ok(record) => record,
        Err(e) => return store_error_response(&e),
    };

    record.items.extend(request.items);

    match store.put_conversation(&record) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"object": "list", "data": record.items})),
        )
            .into_response(),
        Err(e) => store_error_response(&e),
    }
}

async fn list_items(State(store): State<Arc<Store>>, Path(id): Path<String>) -> Response {
    match store.get_conversation(&id) {
        Ok(record) => Json(json!({"object": "list", "data": record.items})).into_response(),
        Err(e) => store_error_response(&e),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
