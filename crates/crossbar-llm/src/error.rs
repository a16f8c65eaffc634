use http::StatusCode;

use crossbar_core::HttpError;
use thiserror::Error;

/// Substrings identifying low-level connectivity failures.
///
/// Matched case-insensitively against the full error chain; a hit means
/// the provider is unreachable and gets quarantined.
const TRANSPORT_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timeout",
    "no such host",
    "network is unreachable",
    "temporary failure",
    "timeout",
    "dial",
    "eof",
    "connection closed",
];

/// Upstream API markers that imply a broken model runtime behind a
/// reachable HTTP server. Treated like transport failures.
const FATAL_UPSTREAM_PATTERNS: &[&str] = &[
    "missing tensor",
    "runner process terminated",
    "model runner has unexpectedly stopped",
];

/// Whether an error message matches a known connectivity failure pattern
pub fn is_transport_pattern(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSPORT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Whether an upstream error body carries a fatal model-runtime marker
pub fn is_fatal_upstream(message: &str) -> bool {
    let lower = message.to_lowercase();
    FATAL_UPSTREAM_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Errors surfaced by the routing core
#[derive(Debug, Error)]
pub enum LlmError {
    /// Requested model is not in the index
    #[error("model {model} not found in any provider")]
    UnknownModel { model: String },

    /// Connectivity failure against an upstream; the provider was quarantined
    #[error("provider {provider} unreachable: {message}")]
    Transport { provider: String, message: String },

    /// Upstream reported a broken model runtime; the provider was quarantined
    #[error("provider {provider} fatal upstream error: {message}")]
    FatalUpstream { provider: String, message: String },

    /// Non-2xx from a reachable upstream, bubbled without quarantine
    #[error("upstream returned {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    /// Error while relaying a streaming body
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Malformed client request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownModel { .. } => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Transport { .. }
            | Self::FatalUpstream { .. }
            | Self::UpstreamStatus { .. }
            | Self::Streaming(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::UnknownModel { .. } => "not_found_error",
            Self::Transport { .. } | Self::FatalUpstream { .. } | Self::UpstreamStatus { .. } => "upstream_error",
            Self::Streaming(_) => "streaming_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_patterns_match_case_insensitively() {
        assert!(is_transport_pattern("dial tcp 127.0.0.1:1: Connection Refused"));
        assert!(is_transport_pattern("unexpected EOF while reading body"));
        assert!(is_transport_pattern("request timeout after 30s"));
        assert!(!is_transport_pattern("invalid api key"));
    }

    #[test]
    fn fatal_markers_match() {
        assert!(is_fatal_upstream("error: Missing tensor 'blk.0.attn'"));
        assert!(is_fatal_upstream("the model runner has unexpectedly stopped"));
        assert!(!is_fatal_upstream("rate limit exceeded"));
    }

    #[test]
    fn unknown_model_maps_to_404_and_names_the_model() {
        let err = LlmError::UnknownModel {
            model: "m-missing".to_owned(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.client_message().contains("m-missing"));
    }

    #[test]
    fn upstream_errors_map_to_500() {
        let err = LlmError::UpstreamStatus {
            status: 503,
            message: "overloaded".to_owned(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
