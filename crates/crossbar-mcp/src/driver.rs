//! Automatic tool-calling loop.
//!
//! Drives a conversation on behalf of the model: executes the discovery
//! tools it requests, detects repeated identical calls, and bounds the
//! number of iterations. Only `tool_search` and `execute_tool` are ever
//! offered; any other requested name is model confusion and is dropped.

use std::collections::HashMap;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crossbar_llm::LlmState;
use crossbar_llm::error::LlmError;
use crossbar_llm::protocol::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ToolCall, ToolDefinition};

use crate::server::{McpServer, ToolMode};

/// Iteration cap for one driver run
pub const MAX_TOOL_ITERATIONS: usize = 20;

/// Names the driver will execute on the model's behalf
const ALLOWED_TOOLS: &[&str] = &["tool_search", "execute_tool"];

/// Fallback instruction injected when the model keeps repeating a call
const LOOP_FALLBACK_MESSAGE: &str = "The tool has been called multiple times with the same result. \
     Please provide your final answer based on the information gathered.";

#[derive(Debug, Error)]
pub enum DriverError {
    /// The bounded loop was exhausted without a final answer
    #[error("exceeded maximum tool call iterations ({0})")]
    MaxToolIterations(usize),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Canonical key for loop detection: tool name plus a deterministic
/// serialization of the arguments (sorted keys, no whitespace)
pub(crate) fn tool_call_key(name: &str, arguments: &str) -> String {
    let canonical = match serde_json::from_str::<Value>(arguments) {
        Ok(value) => canonical_json(&value),
        Err(_) => arguments.to_owned(),
    };
    format!("{name}:{canonical}")
}

/// Serialize with object keys sorted so textually different but equal
/// argument maps produce the same key
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let encoded: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", encoded.join(","))
        }
        primitive => serde_json::to_string(primitive).unwrap_or_default(),
    }
}

/// OpenAI-shaped definitions for the two discovery tools
fn discovery_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            "tool_search",
            "Search for available tools by keyword or description.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"}
                },
                "required": ["query"]
            }),
        ),
        ToolDefinition::function(
            "execute_tool",
            "Execute a previously discovered tool by name.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Tool name"},
                    "arguments": {"type": "object", "description": "Tool arguments"}
                },
                "required": ["name"]
            }),
        ),
    ]
}

/// Run a completion with automatic tool calling.
///
/// Each iteration asks for a completion, executes at most one valid tool
/// call, and appends the exchange to the transcript. A model stuck
/// repeating the same call gets one fallback completion with the tool
/// list stripped.
///
/// # Errors
///
/// Returns `MaxToolIterations` when the loop cap is exhausted, or any
/// routing error from the underlying completions.
pub async fn complete_with_tools(
    llm: &LlmState,
    mcp: &McpServer,
    request: ChatCompletionRequest,
) -> Result<ChatCompletionResponse, DriverError> {
    let mut request = request;
    let mut messages = request.messages.clone();

    request.tools = Some(discovery_tool_definitions());

    // Loop-pathology accumulator, keyed by canonical call
    let mut seen_calls: HashMap<String, u32> = HashMap::new();
    let mut last_key = String::new();

    for _ in 0..MAX_TOOL_ITERATIONS {
        request.messages = messages.clone();

        let response = llm.complete(&request).await?;

        // Pull out what this iteration needs so the response can be
        // returned untouched when there is nothing to execute
        let (requested_calls, assistant_content) = match response.choices.first() {
            Some(choice) => (
                choice.message.tool_calls.clone().unwrap_or_default(),
                choice.message.content.clone(),
            ),
            None => return Ok(response),
        };

        let mut valid_calls: Vec<ToolCall> = requested_calls
            .into_iter()
            .filter(|tc| ALLOWED_TOOLS.contains(&tc.function.name.as_str()))
            .collect();

        if valid_calls.is_empty() {
            return Ok(response);
        }
        let call = valid_calls.remove(0);

        let key = tool_call_key(&call.function.name, &call.function.arguments);
        let count = seen_calls.entry(key.clone()).or_insert(0);
        *count += 1;

        if *count >= 3 || (key == last_key && *count >= 2) {
            tracing::warn!(call = %key, "model is looping on a tool call, forcing final answer");
            request.messages = messages;
            request
                .messages
                .push(ChatMessage::text("system", LOOP_FALLBACK_MESSAGE));
            request.tools = None;
            return Ok(llm.complete(&request).await?);
        }
        last_key = key;

        // Assistant turn carrying exactly the one call we will execute
        messages.push(ChatMessage {
            role: "assistant".to_owned(),
            content: assistant_content,
            name: None,
            tool_calls: Some(vec![call.clone()]),
            tool_call_id: None,
        });

        let result_text = execute_tool_call(mcp, &call).await;
        tracing::debug!(tool = %call.function.name, "executed tool call");

        messages.push(ChatMessage {
            role: "tool".to_owned(),
            content: Some(Value::String(result_text)),
            name: None,
            tool_calls: None,
            tool_call_id: Some(call.id.clone()),
        });
    }

    Err(DriverError::MaxToolIterations(MAX_TOOL_ITERATIONS))
}

/// Execute one tool call against the MCP server; failures become the
/// textual tool result so the model can see and recover from them
async fn execute_tool_call(mcp: &McpServer, call: &ToolCall) -> String {
    let arguments: Map<String, Value> = serde_json::from_str(&call.function.arguments).unwrap_or_default();

    match mcp.call_tool(ToolMode::Normal, &call.function.name, arguments).await {
        Ok(result) => result.text_body(),
        Err(e) => format!("Error: {e}"),
    }
}
