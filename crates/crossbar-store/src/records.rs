use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a response object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ResponseStatus {
    /// Whether the response can still transition
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Error attached to a failed response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

/// One stored response object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    pub object: String,
    pub created_at: u64,
    pub model: String,
    pub status: ResponseStatus,
    /// Original input items
    #[serde(default)]
    pub input: Vec<Value>,
    /// Output message objects, populated on completion
    #[serde(default)]
    pub output: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

impl ResponseRecord {
    pub fn new(id: String, created_at: u64, model: String) -> Self {
        Self {
            id,
            object: "response".to_owned(),
            created_at,
            model,
            status: ResponseStatus::Queued,
            input: Vec::new(),
            output: Vec::new(),
            error: None,
            instructions: None,
            previous_response_id: None,
        }
    }

    /// Plain-text rendering of the output, for chaining conversations
    pub fn output_text(&self) -> String {
        let mut text = String::new();
        for item in &self.output {
            let Some(content) = item.get("content").and_then(Value::as_array) else {
                continue;
            };
            for part in content {
                if let Some(part_text) = part.get("text").and_then(Value::as_str) {
                    text.push_str(part_text);
                }
            }
        }
        text
    }
}

/// One stored conversation and its items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub object: String,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub items: Vec<Value>,
}

impl ConversationRecord {
    pub fn new(id: String, created_at: u64) -> Self {
        Self {
            id,
            object: "conversation".to_owned(),
            created_at,
            metadata: None,
            items: Vec::new(),
        }
    }
}
