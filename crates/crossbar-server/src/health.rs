use axum::Json;
use axum::extract::State;

use crossbar_llm::LlmState;

/// `GET /health`: per-provider status plus totals
pub async fn health_handler(State(llm): State<LlmState>) -> Json<serde_json::Value> {
    let providers = llm.provider_status();
    let models = llm.index().model_count().await;

    Json(serde_json::json!({
        "status": "ok",
        "providers": providers.len(),
        "models": models,
        "provider_status": providers,
    }))
}
