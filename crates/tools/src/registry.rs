//! Tool registration, discovery, and timeout-guarded execution.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::mcp::{Tool, ToolError, ToolOutput, ToolSchema};

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError>;
    fn list_tools(&self) -> Vec<ToolSchema>;
    fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_boxed(Arc::new(tool));
    }

    pub fn register_boxed(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::not_found(format!("tool not found: {name}")))?;

        tool.validate(&arguments)?;

        let timeout_secs = tool.timeout_secs();
        match tokio::time::timeout(Duration::from_secs(timeout_secs), tool.execute(arguments)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ToolError::timeout(name, timeout_secs)),
        }
    }

    fn list_tools(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }
}

/// One completed tool invocation, kept for operator-facing history.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
    pub output: Result<ToolOutput, String>,
    pub duration_ms: u64,
}

/// Bounded ring buffer of recent tool calls, independent of the durable
/// `ToolAudit` record which the planner/executor persists via the `Store`.
pub struct ToolCallTracker {
    calls: VecDeque<ToolCall>,
    max_history: usize,
}

impl ToolCallTracker {
    pub fn new(max_history: usize) -> Self {
        Self {
            calls: VecDeque::with_capacity(max_history),
            max_history,
        }
    }

    pub fn record(&mut self, call: ToolCall) {
        if self.calls.len() >= self.max_history {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }

    pub fn recent(&mut self, n: usize) -> &[ToolCall] {
        self.calls.make_contiguous();
        let (slice, _) = self.calls.as_slices();
        let start = slice.len().saturating_sub(n);
        &slice[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::{ToolClass};
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn class(&self) -> ToolClass {
            ToolClass::Read
        }
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "echoes its input".into(),
                parameters: json!({"type": "object"}),
            }
        }
        fn validate(&self, _arguments: &Value) -> Result<(), ToolError> {
            Ok(())
        }
        async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::json(arguments))
        }
    }

    #[tokio::test]
    async fn registers_and_executes() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert!(registry.has("echo"));

        let out = registry.execute("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(out.as_text(), json!({"x": 1}).to_string());
    }

    #[tokio::test]
    async fn missing_tool_errors() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
