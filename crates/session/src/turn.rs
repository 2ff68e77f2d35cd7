//! Turn-by-turn driver: the recursive "feed the tool response back and
//! continue" step the tool planner/executor defers to its caller. Drives
//! one or more `ChatBackend::generate_stream` calls, executing any tool
//! calls the model requests through the tool engine and feeding their
//! output back as `tool`-role messages, until the model stops requesting
//! tools or the per-call loop cap is reached.

use std::sync::Arc;

use tokio::sync::mpsc;

use voice_agent_config::PersonaConfig;
use voice_agent_core::Error as CoreError;
use voice_agent_llm::{
    ChatBackend, FinishReason, GenerationEvent, Message, StreamingGenerator, ToolEngine, ToolLoopGuard, ToolPlan,
};
use voice_agent_tools::ToolSchema;

use crate::error::SessionError;

/// One finished turn: the `gptreply`/tool-pending events produced along the
/// way, the messages to fold into call history, and whether the loop cap
/// forced a text-only continuation.
#[derive(Debug, Default)]
pub struct TurnOutcome {
    pub events: Vec<GenerationEvent>,
    pub history: Vec<Message>,
    pub tool_calls_executed: Vec<String>,
    pub capped: bool,
}

pub struct TurnDriver {
    backend: Arc<dyn ChatBackend>,
    tool_engine: Arc<ToolEngine>,
    loop_guard: Arc<ToolLoopGuard>,
    max_tool_loops: u32,
}

impl TurnDriver {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        tool_engine: Arc<ToolEngine>,
        loop_guard: Arc<ToolLoopGuard>,
        max_tool_loops: u32,
    ) -> Self {
        Self { backend, tool_engine, loop_guard, max_tool_loops }
    }

    /// Runs one turn to completion, recursing through tool calls as needed.
    /// `messages` is the full context window already assembled by the
    /// caller (system + phase window); it is extended in place with the
    /// assistant/tool messages this turn produces.
    pub async fn run_turn(
        &self,
        call_sid: &str,
        step_id: &str,
        messages: &mut Vec<Message>,
        tools: &[ToolSchema],
        fallback_tool: Option<&str>,
        generator: &mut StreamingGenerator,
        persona: &PersonaConfig,
        turn_urgency: f32,
    ) -> Result<TurnOutcome, SessionError> {
        let started_at = std::time::Instant::now();
        let result = self
            .run_turn_timed(call_sid, step_id, messages, tools, fallback_tool, generator, persona, turn_urgency)
            .await;
        metrics::histogram!("voice_agent_turn_latency_ms", "outcome" => if result.is_ok() { "ok" } else { "error" })
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_turn_timed(
        &self,
        call_sid: &str,
        step_id: &str,
        messages: &mut Vec<Message>,
        tools: &[ToolSchema],
        fallback_tool: Option<&str>,
        generator: &mut StreamingGenerator,
        persona: &PersonaConfig,
        turn_urgency: f32,
    ) -> Result<TurnOutcome, SessionError> {
        let mut outcome = TurnOutcome::default();
        let mut tools_enabled = true;
        let mut attempt: u32 = 0;

        // Loop cap and tool budget are per interaction, not per call.
        self.loop_guard.reset(call_sid);
        self.tool_engine.reset_budget(call_sid);

        loop {
            let active_tools: &[ToolSchema] = if tools_enabled { tools } else { &[] };
            let (tx, mut rx) = mpsc::channel(32);

            let gen_fut = self.backend.generate_stream(messages.as_slice(), active_tools, tx);
            let drain_fut = async {
                while let Some(token) = rx.recv().await {
                    outcome.events.extend(generator.on_token(&token, persona, turn_urgency));
                }
            };
            let (result, _) = tokio::join!(gen_fut, drain_fut);
            let result = result.map_err(|e| SessionError::ModelError(e.to_string()))?;

            outcome
                .events
                .extend(generator.on_finish(result.finish_reason, persona, turn_urgency));

            if result.finish_reason != FinishReason::ToolCalls || result.tool_calls.is_empty() {
                if result.text.trim().is_empty() && outcome.tool_calls_executed.is_empty() {
                    return Err(SessionError::EmptyResponse);
                }
                messages.push(Message::assistant(result.text.clone()));
                outcome.history.push(Message::assistant(result.text));
                return Ok(outcome);
            }

            if !self.loop_guard.allow(call_sid, self.max_tool_loops) {
                tracing::warn!(call_sid, "tool loop cap reached, forcing text-only continuation");
                outcome.capped = true;
                tools_enabled = false;
                messages.push(Message::system(
                    "Tool-call budget reached for this turn. Continue in plain text without calling any more tools.".to_string(),
                ));
                continue;
            }

            messages.push(Message::assistant(result.text.clone()));
            outcome.history.push(Message::assistant(result.text));

            for call in &result.tool_calls {
                let args: serde_json::Value = serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Null);
                attempt += 1;
                let plan = ToolPlan::new(call_sid, step_id, attempt.to_string(), call.id.clone(), call.name.clone(), args);
                let tool_name = plan.tool_name.clone();

                let content = match self.tool_engine.run(plan, fallback_tool).await {
                    Ok(output) => {
                        metrics::counter!("voice_agent_tool_calls_total", "tool" => tool_name.clone(), "status" => "ok").increment(1);
                        output.as_text()
                    }
                    Err(err) => {
                        metrics::counter!("voice_agent_tool_calls_total", "tool" => tool_name.clone(), "status" => "error").increment(1);
                        format!("{{\"error\":{}}}", serde_json::to_string(&core_error_message(&err)).unwrap_or_default())
                    }
                };

                let tool_msg = Message::tool(content, call.id.clone());
                messages.push(tool_msg.clone());
                outcome.history.push(tool_msg);
                outcome.tool_calls_executed.push(tool_name);
            }
        }
    }
}

fn core_error_message(err: &CoreError) -> String {
    err.to_string()
}
