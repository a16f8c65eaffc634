use thiserror::Error;

/// Errors from the MCP tool runtime.
///
/// Script evaluation failures are deliberately absent: they are packaged
/// in-band as tool responses, never surfaced as errors.
#[derive(Debug, Error)]
pub enum McpError {
    /// Name not present in the current tool scan
    #[error("unknown tool: {tool}")]
    ToolNotFound { tool: String },

    /// Arguments rejected by the manifest's parameter schema
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Tool search index failure
    #[error("tool search failed: {0}")]
    Search(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl McpError {
    /// JSON-RPC error code for this error
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            Self::ToolNotFound { .. } | Self::InvalidArguments(_) => crate::protocol::INVALID_PARAMS,
            Self::Search(_) | Self::Internal(_) => crate::protocol::INTERNAL_ERROR,
        }
    }
}
