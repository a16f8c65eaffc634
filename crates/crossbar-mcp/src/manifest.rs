//! Tool manifest (`tool.toml`) parsing and argument validation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value, json};

use crate::error::McpError;

/// Manifest filename looked for in each tool directory
pub const MANIFEST_FILE: &str = "tool.toml";

/// Whether a tool appears in `tools/list` or only through `tool_search`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Visibility {
    #[default]
    #[serde(rename = "listed")]
    Listed,
    #[serde(rename = "on-demand")]
    OnDemand,
}

/// Parameter value types; unknown type strings fall back to `String`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParameterType {
    #[default]
    String,
    Number,
    Boolean,
}

impl<'de> Deserialize<'de> for ParameterType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            _ => Self::String,
        })
    }
}

impl ParameterType {
    fn json_schema_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterSpec {
    #[serde(rename = "type", default)]
    pub kind: ParameterType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// Parsed `tool.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolManifest {
    /// Logical tool name; defaults to the directory name
    #[serde(default)]
    pub name: Option<String>,
    pub description: String,
    /// Search keywords
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Script filename relative to the tool directory
    pub script: String,
    #[serde(default)]
    pub visibility: Visibility,
    /// Parameters keyed by name
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
}

/// A manifest resolved against its directory, script verified to exist
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub manifest: ToolManifest,
    pub script_path: PathBuf,
}

impl ToolSpec {
    pub fn visibility(&self) -> Visibility {
        self.manifest.visibility
    }

    /// JSON schema describing the tool's input object
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, parameter) in &self.manifest.parameters {
            properties.insert(
                name.clone(),
                json!({
                    "type": parameter.kind.json_schema_type(),
                    "description": parameter.description,
                }),
            );
            if parameter.required {
                required.push(Value::String(name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Type-check caller arguments against the declared parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArguments` when a required parameter is missing or
    /// a supplied value has the wrong type.
    pub fn check_args(&self, args: &Map<String, Value>) -> Result<(), McpError> {
        for (name, parameter) in &self.manifest.parameters {
            match args.get(name) {
                Some(value) => {
                    if !parameter.kind.matches(value) {
                        return Err(McpError::InvalidArguments(format!(
                            "parameter '{name}' must be a {}",
                            parameter.kind.json_schema_type()
                        )));
                    }
                }
                None if parameter.required => {
                    return Err(McpError::InvalidArguments(format!(
                        "missing required parameter '{name}'"
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }
}
