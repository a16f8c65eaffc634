use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use http::StatusCode;

/// Log-and-404 for unmatched paths; the log carries enough to spot
/// misconfigured clients
pub async fn not_found_handler(request: Request) -> Response {
    let user_agent = request
        .headers()
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::warn!(
        method = %request.method(),
        path = request.uri().path(),
        query = request.uri().query().unwrap_or(""),
        user_agent,
        "unmatched request"
    );

    (StatusCode::NOT_FOUND, "not found").into_response()
}
