//! Tool abstraction used by the agent network.
//!
//! A [`ToolProtocol`] executes named tools and describes them through [`ToolMetadata`].
//! The [`ToolRegistry`] snapshots a protocol's tool listing so the network can render it
//! into the orchestrator prompt and route `{"tool_call": ...}` requests back to the
//! protocol.
//!
//! ```text
//! orchestrator reply → parse_tool_call → ToolRegistry → ToolProtocol::execute → ToolResult
//! ```
//!
//! # Example
//!
//! ```rust
//! use leancanvas::tool_protocol::{ToolParameter, ToolParameterType};
//!
//! let param = ToolParameter::new("sectionId", ToolParameterType::String)
//!     .with_description("The ID of the canvas section")
//!     .required();
//! assert!(param.required);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Outcome of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: serde_json::Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error),
        }
    }
}

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl fmt::Display for ToolParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolParameterType::String => "string",
            ToolParameterType::Number => "number",
            ToolParameterType::Integer => "integer",
            ToolParameterType::Boolean => "boolean",
            ToolParameterType::Array => "array",
            ToolParameterType::Object => "object",
        };
        f.write_str(name)
    }
}

/// One parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    /// Allowed values for string parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    /// For array types, the type of the items.
    pub items: Option<Box<ToolParameterType>>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            allowed: None,
            items: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict a string parameter to a fixed set of values.
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_items(mut self, item_type: ToolParameterType) -> Self {
        self.items = Some(Box::new(item_type));
        self
    }
}

/// Name, description and parameters of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Prompt rendering: a `- name: description` line plus one line per parameter.
    pub fn describe(&self) -> String {
        let mut out = format!("- {}: {}\n", self.name, self.description);
        if !self.parameters.is_empty() {
            out.push_str("  Parameters:\n");
            for param in &self.parameters {
                let mut line = format!(
                    "    - {} ({}{}): {}",
                    param.name,
                    param.param_type,
                    if param.required { ", required" } else { "" },
                    param.description.as_deref().unwrap_or("No description")
                );
                if let Some(allowed) = &param.allowed {
                    line.push_str(&format!(" [one of: {}]", allowed.join(", ")));
                }
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}

/// Executes tools by name.
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>>;

    async fn get_tool_metadata(
        &self,
        tool_name: &str,
    ) -> Result<ToolMetadata, Box<dyn Error + Send + Sync>> {
        self.list_tools()
            .await?
            .into_iter()
            .find(|tool| tool.name == tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()).into())
    }

    /// Protocol identifier, e.g. `"canvas"`.
    fn protocol_name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolError {
    /// No tool with this name is registered.
    NotFound(String),
    ExecutionFailed(String),
    /// Parameters were missing or had the wrong shape.
    InvalidParameters(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
            ToolError::ExecutionFailed(msg) => write!(f, "Tool execution failed: {}", msg),
            ToolError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// Tools available to an agent, backed by one protocol.
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolMetadata>,
    protocol: Arc<dyn ToolProtocol>,
}

impl ToolRegistry {
    /// Snapshot the protocol's current tool listing.
    pub async fn from_protocol(
        protocol: Arc<dyn ToolProtocol>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let tools = protocol
            .list_tools()
            .await?
            .into_iter()
            .map(|tool| (tool.name.clone(), tool))
            .collect();
        Ok(Self { tools, protocol })
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolMetadata> {
        self.tools.get(name)
    }

    /// Registered tools, sorted by name.
    pub fn list_tools(&self) -> Vec<&ToolMetadata> {
        self.tools.values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Prompt block describing every tool and the call syntax.
    pub fn describe_tools(&self) -> String {
        if self.tools.is_empty() {
            return String::new();
        }
        let mut out = String::from("You have access to the following tools:\n");
        for tool in self.tools.values() {
            out.push_str(&tool.describe());
        }
        out.push_str(
            "\nTo use a tool, respond with a JSON object in the following format:\n\
             {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
             After tool execution, I'll provide the result and you can continue.\n",
        );
        out
    }

    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        if !self.tools.contains_key(tool_name) {
            return Err(ToolError::NotFound(tool_name.to_string()).into());
        }
        self.protocol.execute(tool_name, parameters).await
    }
}
