//! The `/mcp` JSON-RPC endpoint.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::error::McpError;
use crate::protocol::{
    self, CallToolParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerInfo,
};
use crate::server::{McpServer, ToolMode};

/// Header selecting discovery mode for a single request
const TOOL_MODE_HEADER: &str = "x-mcp-tool-mode";

const INSTRUCTIONS: &str = "This server provides AI completion with tool calling support and script \
     execution capabilities. Use tool_search to discover available tools, execute_tool to run \
     discovered tools, and execute_code for custom script execution.";

/// Build the MCP router
pub fn mcp_router(server: McpServer) -> Router {
    Router::new().route("/mcp", routing::post(handle_mcp)).with_state(server)
}

#[derive(Debug, Deserialize)]
struct ModeQuery {
    #[serde(default)]
    tool_mode: Option<String>,
}

/// Discovery mode is requested per call, via header or query parameter
fn request_mode(headers: &HeaderMap, query: &ModeQuery) -> ToolMode {
    let header_discovery = headers
        .get(TOOL_MODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("discovery"));
    let query_discovery = query
        .tool_mode
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case("discovery"));

    if header_discovery || query_discovery {
        ToolMode::Discovery
    } else {
        ToolMode::Normal
    }
}

async fn handle_mcp(
    State(server): State<McpServer>,
    headers: HeaderMap,
    Query(query): Query<ModeQuery>,
    body: axum::body::Bytes,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return Json(JsonRpcResponse::failure(
                Value::Null,
                protocol::PARSE_ERROR,
                format!("parse error: {e}"),
            ))
            .into_response();
        }
    };

    // Notifications get no response body
    let Some(id) = request.id.clone() else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mode = request_mode(&headers, &query);
    let response = dispatch(&server, mode, &request, id).await;
    Json(response).into_response()
}

async fn dispatch(server: &McpServer, mode: ToolMode, request: &JsonRpcRequest, id: Value) -> JsonRpcResponse {
    match request.method.as_str() {
        "initialize" => {
            let result = InitializeResult {
                protocol_version: protocol::PROTOCOL_VERSION,
                capabilities: serde_json::json!({"tools": {"listChanged": false}}),
                server_info: ServerInfo {
                    name: "crossbar".to_owned(),
                    version: env!("CARGO_PKG_VERSION").to_owned(),
                },
                instructions: Some(INSTRUCTIONS.to_owned()),
            };
            match serde_json::to_value(result) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => JsonRpcResponse::failure(id, protocol::INTERNAL_ERROR, e.to_string()),
            }
        }
        "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
        "tools/list" => {
            let result = ListToolsResult {
                tools: server.list_tools(mode),
            };
            match serde_json::to_value(result) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => JsonRpcResponse::failure(id, protocol::INTERNAL_ERROR, e.to_string()),
            }
        }
        "tools/call" => {
            let params: CallToolParams = match request
                .params
                .clone()
                .map(serde_json::from_value)
                .transpose()
            {
                Ok(Some(params)) => params,
                Ok(None) => {
                    return JsonRpcResponse::failure(
                        id,
                        protocol::INVALID_PARAMS,
                        "missing params".to_owned(),
                    );
                }
                Err(e) => {
                    return JsonRpcResponse::failure(id, protocol::INVALID_PARAMS, format!("invalid params: {e}"));
                }
            };

            let arguments = params.arguments.unwrap_or_default();
            match server.call_tool(mode, &params.name, arguments).await {
                Ok(result) => match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(e) => JsonRpcResponse::failure(id, protocol::INTERNAL_ERROR, e.to_string()),
                },
                Err(e) => {
                    let code = e.json_rpc_code();
                    if matches!(e, McpError::Internal(_)) {
                        tracing::error!(error = %e, "tool call failed");
                    }
                    JsonRpcResponse::failure(id, code, e.to_string())
                }
            }
        }
        other => JsonRpcResponse::failure(id, protocol::METHOD_NOT_FOUND, format!("unknown method: {other}")),
    }
}
