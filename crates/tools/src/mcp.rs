//! Tool contract: schema, input/output shape, and the per-call execution
//! policy (class, timeout, retry limit) the planner/executor enforces.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Side-effect classification; `capture` tools (digit collection) never retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolClass {
    Read,
    SideEffect,
    Capture,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Json { value: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            content: vec![ContentBlock::Json { value }],
        }
    }

    pub fn as_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ContentBlock::Text { text } => Some(text.clone()),
                ContentBlock::Json { value } => Some(value.to_string()),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool {0} timed out after {1}s")]
    Timeout(String, u64),

    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
}

impl ToolError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        ToolError::NotFound(msg.into())
    }

    pub fn timeout(name: &str, secs: u64) -> Self {
        ToolError::Timeout(name.to_string(), secs)
    }
}

impl From<ToolError> for voice_agent_core::Error {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound(msg) | ToolError::InvalidArguments(msg) => {
                voice_agent_core::Error::ToolValidation(msg)
            }
            ToolError::Timeout(name, secs) => {
                voice_agent_core::Error::Internal(format!("tool {name} timed out after {secs}s"))
            }
            ToolError::ExecutionFailed(msg) => voice_agent_core::Error::Internal(msg),
        }
    }
}

/// A single callable tool. Implementors are registered into a [`crate::registry::ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn class(&self) -> ToolClass {
        ToolClass::SideEffect
    }

    /// Execution timeout; enforced by the registry, not by the tool itself.
    fn timeout_secs(&self) -> u64 {
        10
    }

    /// Retry budget for transient failures. `capture`-class tools are always 0.
    fn retry_limit(&self) -> u32 {
        match self.class() {
            ToolClass::Capture => 0,
            _ => 1,
        }
    }

    fn schema(&self) -> ToolSchema;

    /// Validate `arguments` against this tool's schema before execution.
    fn validate(&self, arguments: &Value) -> Result<(), ToolError>;

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError>;
}
