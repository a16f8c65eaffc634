//! Thin JSON-RPC client behind the `script` and `tool` subcommands.

use serde_json::{Value, json};

/// Tools registered directly on the server rather than discovered from
/// the tools root; these are called without the `execute_tool` wrapper
const SERVER_TOOLS: &[&str] = &["execute_code", "execute_tool", "tool_search"];

/// Build the `tools/call` request for a tool invocation
pub fn tool_call_request(name: &str, arguments: Option<Value>) -> Value {
    let arguments = arguments.unwrap_or_else(|| json!({}));

    let params = if SERVER_TOOLS.contains(&name) {
        json!({"name": name, "arguments": arguments})
    } else {
        // Discovered tools go through execute_tool
        json!({"name": "execute_tool", "arguments": {"name": name, "arguments": arguments}})
    };

    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": params,
    })
}

/// POST a JSON-RPC request to the server's `/mcp` endpoint and print the
/// textual tool result.
///
/// # Errors
///
/// Returns an error on transport failure, a JSON-RPC error response, or
/// an undecodable body.
pub async fn execute_mcp_request(server: &str, token: Option<&str>, request: Value) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let url = format!("{}/mcp", server.trim_end_matches('/'));
    let mut builder = client.post(&url).json(&request);
    if let Some(token) = token {
        builder = builder.bearer_auth(token);
    }

    let response = builder.send().await?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("failed to parse response ({status}): {e}"))?;

    if let Some(error) = body.get("error") {
        let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        anyhow::bail!("MCP error: {message}");
    }

    if let Some(content) = body
        .get("result")
        .and_then(|r| r.get("content"))
        .and_then(Value::as_array)
    {
        for block in content {
            if let Some(text) = block.get("text").and_then(Value::as_str) {
                print!("{text}");
            }
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_tools_are_called_directly() {
        let request = tool_call_request("execute_code", Some(json!({"code": "1"})));
        assert_eq!(request["params"]["name"], "execute_code");
    }

    #[test]
    fn discovered_tools_are_wrapped() {
        let request = tool_call_request("my_tool", Some(json!({"x": 1})));
        assert_eq!(request["params"]["name"], "execute_tool");
        assert_eq!(request["params"]["arguments"]["name"], "my_tool");
        assert_eq!(request["params"]["arguments"]["arguments"]["x"], 1);
    }
}
