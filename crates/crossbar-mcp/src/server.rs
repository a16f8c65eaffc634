//! The embedded MCP server: per-request tool catalogs, discovery-mode
//! gating, built-in tools, and script execution.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use crossbar_config::ToolsConfig;
use crossbar_llm::LlmState;
use crossbar_script::ScriptRuntime;

use crate::error::McpError;
use crate::manifest::{ToolManifest, ToolSpec, Visibility};
use crate::protocol::{CallToolResult, ToolDescriptor};
use crate::script_env;
use crate::search::{ToolIndex, ToolSearchResult};
use crate::tools::{ToolScanner, partition_by_visibility};

/// Default hit cap for `tool_search`
const SEARCH_LIMIT: usize = 10;

/// How the request wants tools exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolMode {
    /// Listed tools appear in `tools/list`; on-demand tools are reachable
    /// through `tool_search` / `execute_tool`
    #[default]
    Normal,
    /// Everything is on-demand; `tools/list` carries only the two
    /// discovery tools
    Discovery,
}

/// Shared MCP server state
#[derive(Clone)]
pub struct McpServer {
    inner: Arc<McpInner>,
}

struct McpInner {
    scanner: ToolScanner,
    runtime: ScriptRuntime,
    llm: LlmState,
}

impl McpServer {
    pub fn new(tools: &ToolsConfig, llm: LlmState) -> Self {
        tracing::info!(
            tools_root = ?tools.root,
            libraries_root = ?tools.libraries_root,
            "initialized script tool provider"
        );

        Self {
            inner: Arc::new(McpInner {
                scanner: ToolScanner::new(tools.root.clone()),
                runtime: ScriptRuntime::new(tools.libraries_root.clone()),
                llm,
            }),
        }
    }

    pub fn llm(&self) -> &LlmState {
        &self.inner.llm
    }

    /// Assemble the `tools/list` manifest for the given mode.
    ///
    /// Tools are re-discovered from disk on every call, so filesystem
    /// changes are visible immediately.
    pub fn list_tools(&self, mode: ToolMode) -> Vec<ToolDescriptor> {
        match mode {
            ToolMode::Discovery => vec![tool_search_descriptor(), execute_tool_descriptor()],
            ToolMode::Normal => {
                let (listed, on_demand) = partition_by_visibility(self.inner.scanner.scan());

                let mut descriptors = vec![execute_code_descriptor()];
                descriptors.extend(listed.iter().map(describe));

                // The discovery pair has nothing to do without a hidden set
                if !on_demand.is_empty() {
                    descriptors.push(tool_search_descriptor());
                    descriptors.push(execute_tool_descriptor());
                }

                descriptors
            }
        }
    }

    /// Dispatch a `tools/call`.
    ///
    /// Script evaluation failures are not errors here: they come back as
    /// a tool response whose body carries `Error: …`.
    pub async fn call_tool(
        &self,
        mode: ToolMode,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        match name {
            "execute_code" => {
                let code = arguments
                    .get("code")
                    .and_then(Value::as_str)
                    .ok_or_else(|| McpError::InvalidArguments("code parameter is required".to_owned()))?;
                Ok(self.execute_code(code.to_owned()).await)
            }
            "tool_search" => {
                let query = arguments
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| McpError::InvalidArguments("query parameter is required".to_owned()))?;
                let limit = arguments
                    .get("limit")
                    .and_then(Value::as_u64)
                    .map_or(SEARCH_LIMIT, |n| n as usize);

                let hits = self.search_tools(query, limit)?;
                let body = serde_json::to_string(&hits)
                    .map_err(|e| McpError::Internal(anyhow::anyhow!("failed to serialize hits: {e}")))?;
                Ok(CallToolResult::text(body))
            }
            "execute_tool" => {
                let tool = arguments
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| McpError::InvalidArguments("name parameter is required".to_owned()))?
                    .to_owned();
                let tool_args = arguments
                    .get("arguments")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                self.execute_named_tool(&tool, tool_args).await
            }
            other => match mode {
                // Direct calls reach listed tools only
                ToolMode::Normal => {
                    let spec = self
                        .inner
                        .scanner
                        .find(other)
                        .filter(|spec| spec.visibility() == Visibility::Listed)
                        .ok_or_else(|| McpError::ToolNotFound { tool: other.to_owned() })?;
                    self.run_tool_script(&spec, arguments).await
                }
                ToolMode::Discovery => Err(McpError::ToolNotFound { tool: other.to_owned() }),
            },
        }
    }

    /// Execute a discovered tool (or the built-in `execute_code`) by name,
    /// regardless of its visibility
    pub async fn execute_named_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        if name == "execute_code" {
            let code = arguments
                .get("code")
                .and_then(Value::as_str)
                .ok_or_else(|| McpError::InvalidArguments("code parameter is required".to_owned()))?;
            return Ok(self.execute_code(code.to_owned()).await);
        }

        let spec = self
            .inner
            .scanner
            .find(name)
            .ok_or_else(|| McpError::ToolNotFound { tool: name.to_owned() })?;
        self.run_tool_script(&spec, arguments).await
    }

    /// Search all discoverable tools by keyword, name, or description
    pub fn search_tools(&self, query: &str, limit: usize) -> Result<Vec<ToolSearchResult>, McpError> {
        let mut tools = self.inner.scanner.scan();
        tools.push(execute_code_spec());

        let index = ToolIndex::build(&tools)?;
        index.search(query, limit)
    }

    /// Run arbitrary script code in a fresh environment
    pub async fn execute_code(&self, code: String) -> CallToolResult {
        self.evaluate(code, Map::new()).await
    }

    /// Validate arguments against the manifest, read the script fresh
    /// from disk, and evaluate it
    async fn run_tool_script(
        &self,
        spec: &ToolSpec,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        spec.check_args(&arguments)?;

        let source = tokio::fs::read_to_string(&spec.script_path).await.map_err(|e| {
            McpError::Internal(anyhow::anyhow!(
                "failed to read script {}: {e}",
                spec.script_path.display()
            ))
        })?;

        Ok(self.evaluate(source, arguments).await)
    }

    /// Evaluate script source in a freshly constructed environment.
    ///
    /// Arguments are bound both as top-level variables and through
    /// `mcp::get`. Evaluation failure is data, never an error.
    async fn evaluate(&self, source: String, arguments: Map<String, Value>) -> CallToolResult {
        let server = self.clone();
        let handle = tokio::runtime::Handle::current();

        let outcome = tokio::task::spawn_blocking(move || {
            let mut evaluation = server.inner.runtime.new_evaluation();

            for (name, value) in &arguments {
                evaluation.bind(name, value);
            }

            let slot = evaluation.slot();
            evaluation.register_module(
                "mcp",
                script_env::mcp_module(server.clone(), handle.clone(), arguments, slot),
            );
            evaluation.register_module("ai", script_env::ai_module(server.clone(), handle));

            evaluation.run(&source)
        })
        .await;

        match outcome {
            Ok(outcome) => CallToolResult::text(outcome.into_text()),
            Err(e) => CallToolResult::text(format!("Error: script execution aborted: {e}")),
        }
    }
}

fn describe(spec: &ToolSpec) -> ToolDescriptor {
    ToolDescriptor {
        name: spec.name.clone(),
        description: spec.manifest.description.clone(),
        input_schema: spec.input_schema(),
    }
}

/// Synthetic spec so the built-in shows up in search results
fn execute_code_spec() -> ToolSpec {
    let manifest: ToolManifest = toml::from_str(
        "description = \"Execute arbitrary script code in a sandboxed environment\"\n\
         keywords = [\"code\", \"script\", \"eval\"]\n\
         script = \"-\"\n\
         visibility = \"on-demand\"\n",
    )
    .expect("builtin manifest is valid");

    ToolSpec {
        name: "execute_code".to_owned(),
        manifest,
        script_path: std::path::PathBuf::new(),
    }
}

fn execute_code_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "execute_code".to_owned(),
        description: "Execute arbitrary script code. Use this to run custom scripts.".to_owned(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "The script code to execute"}
            },
            "required": ["code"]
        }),
    }
}

fn tool_search_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "tool_search".to_owned(),
        description: "Search for available tools by keyword or description.".to_owned(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "limit": {"type": "number", "description": "Maximum number of results"}
            },
            "required": ["query"]
        }),
    }
}

fn execute_tool_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "execute_tool".to_owned(),
        description: "Execute a previously discovered tool by name.".to_owned(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Tool name"},
                "arguments": {"type": "object", "description": "Tool arguments"}
            },
            "required": ["name"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_tool(root: &Path, dir: &str, manifest: &str, script: &str) {
        let tool_dir = root.join(dir);
        std::fs::create_dir_all(&tool_dir).unwrap();
        std::fs::write(tool_dir.join("tool.toml"), manifest).unwrap();
        std::fs::write(tool_dir.join("tool.rhai"), script).unwrap();
    }

    fn server_with_root(root: Option<&Path>) -> McpServer {
        let tools = ToolsConfig {
            root: root.map(Path::to_owned),
            libraries_root: None,
        };
        let llm = LlmState::from_config(&indexmap_providers(), &crossbar_config::ModelsConfig::default())
            .expect("empty provider set builds");
        McpServer::new(&tools, llm)
    }

    fn indexmap_providers() -> indexmap::IndexMap<String, crossbar_config::ProviderConfig> {
        indexmap::IndexMap::new()
    }

    fn names(descriptors: &[ToolDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    #[tokio::test]
    async fn empty_root_lists_only_execute_code() {
        let server = server_with_root(None);
        assert_eq!(names(&server.list_tools(ToolMode::Normal)), ["execute_code"]);
    }

    #[tokio::test]
    async fn listed_tools_appear_without_discovery_pair() {
        let root = tempfile::tempdir().unwrap();
        write_tool(
            root.path(),
            "greeter",
            "description = \"Says hello\"\nscript = \"tool.rhai\"\n",
            "mcp::return_string(\"hi\")\n",
        );

        let server = server_with_root(Some(root.path()));
        assert_eq!(
            names(&server.list_tools(ToolMode::Normal)),
            ["execute_code", "greeter"]
        );
    }

    #[tokio::test]
    async fn on_demand_tools_unlock_discovery_pair() {
        let root = tempfile::tempdir().unwrap();
        write_tool(
            root.path(),
            "hidden",
            "description = \"Secret helper\"\nscript = \"tool.rhai\"\nvisibility = \"on-demand\"\n",
            "mcp::return_string(\"hi\")\n",
        );

        let server = server_with_root(Some(root.path()));
        assert_eq!(
            names(&server.list_tools(ToolMode::Normal)),
            ["execute_code", "tool_search", "execute_tool"]
        );
    }

    #[tokio::test]
    async fn discovery_mode_lists_exactly_the_pair() {
        let root = tempfile::tempdir().unwrap();
        write_tool(
            root.path(),
            "greeter",
            "description = \"Says hello\"\nscript = \"tool.rhai\"\n",
            "mcp::return_string(\"hi\")\n",
        );

        let server = server_with_root(Some(root.path()));
        assert_eq!(
            names(&server.list_tools(ToolMode::Discovery)),
            ["tool_search", "execute_tool"]
        );
    }

    #[tokio::test]
    async fn listed_tool_is_directly_callable() {
        let root = tempfile::tempdir().unwrap();
        write_tool(
            root.path(),
            "greeter",
            "description = \"Says hello\"\nscript = \"tool.rhai\"\n\
             [parameters.name]\ntype = \"string\"\nrequired = true\n",
            "mcp::return_string(\"hello \" + name)\n",
        );

        let server = server_with_root(Some(root.path()));
        let args = serde_json::json!({"name": "ada"});
        let result = server
            .call_tool(ToolMode::Normal, "greeter", args.as_object().unwrap().clone())
            .await
            .unwrap();
        assert_eq!(result.text_body(), "hello ada");
    }

    #[tokio::test]
    async fn on_demand_tool_rejects_direct_call_but_runs_via_execute_tool() {
        let root = tempfile::tempdir().unwrap();
        write_tool(
            root.path(),
            "hidden",
            "description = \"Secret helper\"\nscript = \"tool.rhai\"\nvisibility = \"on-demand\"\n",
            "mcp::return_string(\"found me\")\n",
        );

        let server = server_with_root(Some(root.path()));

        let direct = server.call_tool(ToolMode::Normal, "hidden", Map::new()).await;
        assert!(matches!(direct, Err(McpError::ToolNotFound { .. })));

        let wrapped = serde_json::json!({"name": "hidden", "arguments": {}});
        let result = server
            .call_tool(ToolMode::Normal, "execute_tool", wrapped.as_object().unwrap().clone())
            .await
            .unwrap();
        assert_eq!(result.text_body(), "found me");
    }

    #[tokio::test]
    async fn search_finds_on_demand_tools_by_keyword() {
        let root = tempfile::tempdir().unwrap();
        write_tool(
            root.path(),
            "hidden",
            "description = \"Internal helper\"\nkeywords = [\"frobnicate\"]\n\
             script = \"tool.rhai\"\nvisibility = \"on-demand\"\n",
            "mcp::return_string(\"x\")\n",
        );

        let server = server_with_root(Some(root.path()));
        let hits = server.search_tools("frobnicate", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "hidden");
    }

    #[tokio::test]
    async fn execute_code_returns_script_output() {
        let server = server_with_root(None);
        let result = server.execute_code("mcp::return_string(\"direct\")".to_owned()).await;
        assert_eq!(result.text_body(), "direct");
    }

    #[tokio::test]
    async fn script_failure_is_in_band() {
        let server = server_with_root(None);
        let result = server.execute_code("no such syntax ][".to_owned()).await;
        assert!(result.text_body().contains("Error:"));
        assert!(result.is_error.is_none(), "script failures are tool output, not errors");
    }

    #[tokio::test]
    async fn missing_required_argument_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        write_tool(
            root.path(),
            "strict",
            "description = \"d\"\nscript = \"tool.rhai\"\n[parameters.input]\ntype = \"string\"\nrequired = true\n",
            "mcp::return_string(input)\n",
        );

        let server = server_with_root(Some(root.path()));
        let err = server
            .call_tool(ToolMode::Normal, "strict", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn arguments_are_bound_as_variables_and_via_get() {
        let root = tempfile::tempdir().unwrap();
        write_tool(
            root.path(),
            "echo",
            "description = \"d\"\nscript = \"tool.rhai\"\n\
             [parameters.word]\ntype = \"string\"\nrequired = true\n\
             [parameters.count]\ntype = \"number\"\n",
            "let n = mcp::get(\"count\", 2);\nmcp::return_string(word + \"/\" + n.to_string())\n",
        );

        let server = server_with_root(Some(root.path()));
        let args = serde_json::json!({"word": "hi"});
        let result = server
            .call_tool(ToolMode::Normal, "echo", args.as_object().unwrap().clone())
            .await
            .unwrap();
        assert_eq!(result.text_body(), "hi/2");
    }
}
