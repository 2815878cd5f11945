//! Tool input and schema types

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::EngineError;

/// Arguments for a single tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool: String,
    pub params: Map<String, Value>,
}

impl ToolInput {
    /// Create a new ToolInput with no parameters
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            params: Map::new(),
        }
    }

    /// Decode the JSON argument string emitted by the model.
    ///
    /// An empty string is treated as `{}`.
    pub fn from_json(tool: impl Into<String>, arguments: &str) -> Result<Self, ToolError> {
        let trimmed = arguments.trim();
        if trimmed.is_empty() {
            return Ok(Self::new(tool));
        }

        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| ToolError::InvalidJson(e.to_string()))?;

        match value {
            Value::Object(params) => Ok(Self {
                tool: tool.into(),
                params,
            }),
            Value::Null => Ok(Self::new(tool)),
            other => Err(ToolError::NotAnObject(json_kind(&other).to_string())),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Deserialize the parameters into the tool's typed argument struct
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ToolError> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|e| ToolError::InvalidParameter(e.to_string()))
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<String, ToolError> {
        self.param_str_opt(key)
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// Parameters as a JSON object value
    pub fn to_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JSON-Schema descriptor advertised to the model for one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Wrap the descriptor in the chat-completions `function` tool envelope
    pub fn to_function_tool(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Argument decoding errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to parse arguments JSON: {0}")]
    InvalidJson(String),

    #[error("Arguments must be a JSON object, got {0}")]
    NotAnObject(String),
}

impl From<ToolError> for EngineError {
    fn from(err: ToolError) -> Self {
        EngineError::InvalidArguments(err.to_string())
    }
}
