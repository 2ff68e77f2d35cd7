//! Tool registry and concrete tool implementations consumed by the LLM
//! turn engine's planner/executor.

pub mod mcp;
pub mod registry;
pub mod tools;

pub use mcp::{ContentBlock, Tool, ToolClass, ToolError, ToolOutput, ToolSchema};
pub use registry::{ToolCall, ToolCallTracker, ToolExecutor, ToolRegistry};
pub use tools::{CollectDigitsTool, HangupTool, ProviderClients, TransferCallTool};
