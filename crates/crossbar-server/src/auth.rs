use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::StatusCode;

/// Validate the shared bearer token on every endpoint except `/health`
pub async fn bearer_auth_middleware(token: String, request: Request, next: Next) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let header = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header) = header else {
        return (StatusCode::UNAUTHORIZED, "Authorization header required").into_response();
    };

    let Some(provided) = header.strip_prefix("Bearer ") else {
        return (StatusCode::UNAUTHORIZED, "Invalid authorization format").into_response();
    };

    if provided != token {
        return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
    }

    next.run(request).await
}
