use http::StatusCode;

/// Trait for domain errors that map onto HTTP responses.
///
/// Each feature crate implements this on its own error enum; the server
/// layer turns the result into a wire response. Keeps domain errors free
/// of any axum types.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `invalid_request_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;
}
