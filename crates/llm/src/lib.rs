//! Streaming turn engine (C2): layered persona prompts, context window
//! assembly, chat completion with tool/function calling, an idempotent
//! tool planner/executor, and persona-consistency rewriting.

pub mod backend;
pub mod consistency;
pub mod context;
pub mod prompt;
pub mod streaming;
pub mod tool_engine;

pub use backend::{ChatBackend, ChatConfig, FinishReason, GenerationResult, OpenRouterBackend, RttTracker, ToolCallChunk};
pub use consistency::ConsistencyConfig;
pub use context::{CallMeta, ContextAssembler, ContextConfig, Fact};
pub use prompt::{Message, PersonaComposer, PersonaConfig, ProfileContext, PromptLayers, RecomposeTrigger, Role};
pub use streaming::{GenerationEvent, PersonalityInfo, SentinelChunker, StreamingGenerator, TokenStream, SENTINEL};
pub use tool_engine::{ToolEngine, ToolEngineConfig, ToolLoopGuard, ToolPlan, ToolPlanMetadata};

use thiserror::Error;

/// Errors from the chat completion wire client. Tool-engine errors go
/// through `voice_agent_core::Error` directly since the core error taxonomy
/// already names the tool-specific variants this engine needs.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("generation error: {0}")]
    Generation(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timeout")]
    Timeout,

    #[error("context too long: {0} > {1}")]
    ContextTooLong(usize, usize),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for voice_agent_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Network(_) | LlmError::Timeout => voice_agent_core::Error::ModelTransient(err.to_string()),
            _ => voice_agent_core::Error::ModelPermanent(err.to_string()),
        }
    }
}
