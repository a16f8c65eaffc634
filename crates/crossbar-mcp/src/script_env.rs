//! Host namespaces exposed to tool scripts.
//!
//! Scripts see two static modules: `mcp` for argument access, result
//! setting, and tool interaction, and `ai` for completions and
//! embeddings. Scripts run on the blocking pool, so the bridged calls
//! block on the captured runtime handle.

use rhai::{Array, Dynamic, EvalAltResult, Module};
use serde_json::{Map, Value};
use tokio::runtime::Handle;

use crossbar_llm::protocol::{ChatCompletionRequest, ChatMessage};
use crossbar_script::ResultSlot;
use crossbar_script::toon;

use crate::driver;
use crate::server::{McpServer, ToolMode};

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    message.into().into()
}

/// Convert a rhai value to JSON
fn dynamic_to_json(value: &Dynamic) -> ScriptResult<Value> {
    rhai::serde::from_dynamic(value).map_err(|e| runtime_error(format!("value is not JSON-shaped: {e}")))
}

/// Convert JSON to a rhai value
fn json_to_dynamic(value: &Value) -> ScriptResult<Dynamic> {
    rhai::serde::to_dynamic(value).map_err(|e| runtime_error(format!("failed to convert value: {e}")))
}

/// Decode a tool's textual response for script use: valid JSON becomes
/// structured data, anything else stays a string
fn decode_tool_text(text: &str) -> Dynamic {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => json_to_dynamic(&value).unwrap_or_else(|_| Dynamic::from(text.to_owned())),
        Err(_) => Dynamic::from(text.to_owned()),
    }
}

fn rhai_map_to_json(map: &rhai::Map) -> ScriptResult<Map<String, Value>> {
    let mut out = Map::new();
    for (key, value) in map {
        out.insert(key.to_string(), dynamic_to_json(value)?);
    }
    Ok(out)
}

/// Build the `mcp` namespace for one evaluation
pub fn mcp_module(server: McpServer, handle: Handle, arguments: Map<String, Value>, slot: ResultSlot) -> Module {
    let mut module = Module::new();

    // Argument lookup, with and without a default
    {
        let arguments = arguments.clone();
        module.set_native_fn("get", move |name: &str| -> ScriptResult<Dynamic> {
            match arguments.get(name) {
                Some(value) => json_to_dynamic(value),
                None => Ok(Dynamic::UNIT),
            }
        });
    }
    {
        module.set_native_fn("get", move |name: &str, default: Dynamic| -> ScriptResult<Dynamic> {
            match arguments.get(name) {
                Some(value) => json_to_dynamic(value),
                None => Ok(default),
            }
        });
    }

    // Typed result setters; the first call wins
    {
        let slot = slot.clone();
        module.set_native_fn("return_string", move |value: Dynamic| -> ScriptResult<String> {
            let text = value.to_string();
            slot.set_once(text.clone());
            Ok(text)
        });
    }
    {
        let slot = slot.clone();
        module.set_native_fn("return_object", move |value: Dynamic| -> ScriptResult<String> {
            let json = dynamic_to_json(&value)?;
            let text = serde_json::to_string(&json)
                .map_err(|e| runtime_error(format!("failed to serialize object: {e}")))?;
            slot.set_once(text.clone());
            Ok(text)
        });
    }
    {
        module.set_native_fn("return_toon", move |value: Dynamic| -> ScriptResult<String> {
            let json = dynamic_to_json(&value)?;
            let text = toon::encode(&json);
            slot.set_once(text.clone());
            Ok(text)
        });
    }

    // Tool interaction against the parent server
    {
        let server = server.clone();
        module.set_native_fn("list_tools", move || -> ScriptResult<Array> {
            server
                .list_tools(ToolMode::Normal)
                .into_iter()
                .map(|d| {
                    json_to_dynamic(&serde_json::json!({
                        "name": d.name,
                        "description": d.description,
                    }))
                })
                .collect()
        });
    }
    {
        let server = server.clone();
        let handle = handle.clone();
        module.set_native_fn("call_tool", move |name: &str, args: rhai::Map| -> ScriptResult<Dynamic> {
            let arguments = rhai_map_to_json(&args)?;
            let result = handle
                .block_on(server.call_tool(ToolMode::Normal, name, arguments))
                .map_err(|e| runtime_error(format!("tool call failed: {e}")))?;
            Ok(decode_tool_text(&result.text_body()))
        });
    }
    {
        let server = server.clone();
        module.set_native_fn("tool_search", move |query: &str| -> ScriptResult<Dynamic> {
            let hits = server
                .search_tools(query, 10)
                .map_err(|e| runtime_error(format!("tool search failed: {e}")))?;
            let json = serde_json::to_value(&hits)
                .map_err(|e| runtime_error(format!("failed to serialize hits: {e}")))?;
            json_to_dynamic(&json)
        });
    }
    {
        let server = server.clone();
        let handle = handle.clone();
        module.set_native_fn(
            "execute_tool",
            move |name: &str, args: rhai::Map| -> ScriptResult<Dynamic> {
                let arguments = rhai_map_to_json(&args)?;
                let result = handle
                    .block_on(server.execute_named_tool(name, arguments))
                    .map_err(|e| runtime_error(format!("tool execution failed: {e}")))?;
                Ok(decode_tool_text(&result.text_body()))
            },
        );
    }
    {
        module.set_native_fn("execute_code", move |code: &str| -> ScriptResult<Dynamic> {
            let result = handle.block_on(server.execute_code(code.to_owned()));
            Ok(decode_tool_text(&result.text_body()))
        });
    }

    module
}

/// Build the `ai` namespace for one evaluation
pub fn ai_module(server: McpServer, handle: Handle) -> Module {
    let mut module = Module::new();

    // completion(model, prompt)
    {
        let server = server.clone();
        let handle = handle.clone();
        module.set_native_fn("completion", move |model: &str, prompt: &str| -> ScriptResult<String> {
            let request = completion_request(model, vec![ChatMessage::text("user", prompt)]);
            run_completion(&server, &handle, request)
        });
    }

    // completion(model, [#{role, content}, …])
    {
        let server = server.clone();
        let handle = handle.clone();
        module.set_native_fn("completion", move |model: &str, messages: Array| -> ScriptResult<String> {
            let mut converted = Vec::with_capacity(messages.len());
            for message in &messages {
                let json = dynamic_to_json(message)?;
                let role = json.get("role").and_then(Value::as_str).unwrap_or("user");
                let content = json.get("content").and_then(Value::as_str).unwrap_or_default();
                converted.push(ChatMessage::text(role, content));
            }
            if converted.is_empty() {
                return Err(runtime_error("completion requires at least one message"));
            }
            let request = completion_request(model, converted);
            run_completion(&server, &handle, request)
        });
    }

    // embedding(model, input) -> list of vectors
    {
        module.set_native_fn("embedding", move |model: &str, input: Dynamic| -> ScriptResult<Dynamic> {
            let input_json = dynamic_to_json(&input)?;
            let request = serde_json::json!({"model": model, "input": input_json});

            let response = handle
                .block_on(server.llm().embed(&request))
                .map_err(|e| runtime_error(format!("embedding failed: {e}")))?;

            let vectors: Vec<Value> = response
                .get("data")
                .and_then(Value::as_array)
                .map(|data| {
                    data.iter()
                        .filter_map(|entry| entry.get("embedding").cloned())
                        .collect()
                })
                .unwrap_or_default();

            json_to_dynamic(&Value::Array(vectors))
        });
    }

    module
}

fn completion_request(model: &str, messages: Vec<ChatMessage>) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_owned(),
        messages,
        stream: None,
        tools: None,
        tool_choice: None,
        extra: Map::new(),
    }
}

/// Run a driver-backed completion and extract the reply text
fn run_completion(server: &McpServer, handle: &Handle, request: ChatCompletionRequest) -> ScriptResult<String> {
    let response = handle
        .block_on(driver::complete_with_tools(server.llm(), server, request))
        .map_err(|e| runtime_error(format!("completion failed: {e}")))?;

    Ok(response
        .choices
        .first()
        .map(|c| c.message.content_text())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_tool_text_parses_json() {
        let decoded = decode_tool_text(r#"{"a": 1}"#);
        assert!(decoded.is::<rhai::Map>());

        let decoded = decode_tool_text("[1,2,3]");
        assert!(decoded.is::<rhai::Array>());
    }

    #[test]
    fn decode_tool_text_keeps_plain_strings() {
        let decoded = decode_tool_text("just text");
        assert_eq!(decoded.to_string(), "just text");
    }
}
