//! Chat completion backend.
//!
//! `ChatBackend` generalizes the single-provider shape the rest of the
//! workspace is built around (see `voice-agent-router`'s provider trait) to
//! streaming chat completion with tool/function calling. `OpenRouterBackend`
//! is the only implementation; its retry/backoff loop and `GenerationResult`
//! shape are unchanged from a plain request/response client.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::prompt::Message;
use crate::LlmError;
use voice_agent_tools::ToolSchema;

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: String,
    /// Model switched to after the first failed attempt, if configured.
    pub backup_model: Option<String>,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Window size for the rolling round-trip-time tracker.
    pub rtt_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".to_string(),
            backup_model: None,
            endpoint: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            max_tokens: 256,
            temperature: 0.7,
            top_p: 0.9,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            rtt_window: 20,
        }
    }
}

/// One assembled tool call surfaced by the model, raw-argument JSON still
/// unparsed — the tool engine's Validate step decodes and schema-checks it.
#[derive(Debug, Clone)]
pub struct ToolCallChunk {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub tokens: usize,
    pub time_to_first_token_ms: u64,
    pub total_time_ms: u64,
    pub tokens_per_second: f32,
    pub finish_reason: FinishReason,
    pub tool_calls: Vec<ToolCallChunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Error,
    Cancelled,
}

/// Rolling window of recent round-trip times driving the latency-adaptive
/// max-token budget: 70% of the configured ceiling once the average exceeds
/// 3s, 50% once it exceeds 4.5s.
pub struct RttTracker {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl RttTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, rtt: Duration) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(rtt);
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / self.samples.len() as u32
    }

    pub fn effective_max_tokens(&self, base: usize) -> usize {
        let avg = self.average();
        if avg > Duration::from_millis(4500) {
            (base as f32 * 0.5) as usize
        } else if avg > Duration::from_secs(3) {
            (base as f32 * 0.7) as usize
        } else {
            base
        }
    }
}

/// A streaming chat completion backend with tool/function calling.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<GenerationResult, LlmError>;

    async fn generate_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError>;

    async fn is_available(&self) -> bool;

    fn model_name(&self) -> &str;

    fn estimate_tokens(&self, text: &str) -> usize {
        (text.chars().count() as f32 / 4.0).ceil() as usize
    }

    /// Record an observed round-trip time for the latency-adaptive token budget.
    fn record_rtt(&self, _rtt: Duration) {}
}

pub struct OpenRouterBackend {
    client: Client,
    config: ChatConfig,
    rtt: Mutex<RttTracker>,
}

impl OpenRouterBackend {
    pub fn new(config: ChatConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to create HTTP client: {e}")))?;
        let rtt = Mutex::new(RttTracker::new(config.rtt_window));
        Ok(Self { client, config, rtt })
    }

    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint)
    }

    fn build_request(&self, model: &str, messages: &[Message], tools: &[ToolSchema], stream: bool) -> OpenRouterRequest {
        let max_tokens = self.rtt.lock().effective_max_tokens(self.config.max_tokens);
        OpenRouterRequest {
            model: model.to_string(),
            messages: messages.iter().map(Into::into).collect(),
            stream,
            max_tokens: Some(max_tokens as u32),
            temperature: Some(self.config.temperature),
            top_p: Some(self.config.top_p),
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.iter().map(ToolDef::from_schema).collect())
            },
        }
    }

    async fn execute_request(&self, request: &OpenRouterRequest) -> Result<OpenRouterResponse, LlmError> {
        let mut req = self.client.post(self.api_url()).json(request);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            if Self::status_is_retryable(status.as_u16()) {
                return Err(LlmError::Network(format!("server error {status}: {error}")));
            }
            return Err(LlmError::Api(error));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    fn status_is_retryable(status: u16) -> bool {
        status >= 500 || matches!(status, 408 | 425 | 429)
    }

    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }

    fn into_result(response: OpenRouterResponse, total_time_ms: u64) -> GenerationResult {
        let choice = response.choices.into_iter().next();
        let (text, tool_calls, finish_reason) = match choice {
            Some(c) => {
                let tool_calls = c
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| ToolCallChunk {
                        id: tc.id,
                        name: tc.function.name,
                        arguments: tc.function.arguments,
                    })
                    .collect::<Vec<_>>();
                let finish_reason = match c.finish_reason.as_deref() {
                    Some("tool_calls") => FinishReason::ToolCalls,
                    Some("length") => FinishReason::Length,
                    _ => FinishReason::Stop,
                };
                (c.message.content.unwrap_or_default(), tool_calls, finish_reason)
            }
            None => (String::new(), Vec::new(), FinishReason::Error),
        };
        let tokens = response.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0);
        GenerationResult {
            text,
            tokens,
            time_to_first_token_ms: 0,
            total_time_ms,
            tokens_per_second: if total_time_ms == 0 {
                0.0
            } else {
                tokens as f32 / (total_time_ms as f32 / 1000.0)
            },
            finish_reason,
            tool_calls,
        }
    }
}

#[async_trait]
impl ChatBackend for OpenRouterBackend {
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let mut model = self.config.model.clone();
        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    attempt,
                    max_retries = self.config.max_retries,
                    ?backoff,
                    "chat completion request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                if attempt == 1 {
                    if let Some(backup) = &self.config.backup_model {
                        model = backup.clone();
                    }
                }
            }

            let request = self.build_request(&model, messages, tools, false);
            match self.execute_request(&request).await {
                Ok(response) => {
                    let elapsed = start.elapsed();
                    self.rtt.lock().record(elapsed);
                    return Ok(Self::into_result(response, elapsed.as_millis() as u64));
                }
                Err(e) if Self::is_retryable(&e) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("max retries exceeded".to_string())))
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let request = self.build_request(&self.config.model, messages, tools, true);

        let mut req = self.client.post(self.api_url()).json(&request);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(error));
        }

        let mut stream = response.bytes_stream();
        use futures::StreamExt;

        let mut first_token_time = None;
        let mut full_text = String::new();
        let mut tokens = 0usize;
        let mut tool_calls: Vec<ToolCallChunk> = Vec::new();
        let mut finish_reason = FinishReason::Stop;
        let mut buf = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buf.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(idx) = buf.find('\n') {
                let line = buf[..idx].trim_end_matches('\r').to_string();
                buf.drain(..=idx);
                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                if payload == "[DONE]" {
                    continue;
                }
                let Ok(event) = serde_json::from_str::<OpenRouterStreamChunk>(payload) else {
                    continue;
                };
                let Some(choice) = event.choices.into_iter().next() else {
                    continue;
                };
                if first_token_time.is_none() {
                    first_token_time = Some(start.elapsed());
                }
                if let Some(content) = choice.delta.content {
                    full_text.push_str(&content);
                    tokens += 1;
                    if tx.send(content).await.is_err() {
                        return Ok(GenerationResult {
                            text: full_text,
                            tokens,
                            time_to_first_token_ms: first_token_time.map(|t| t.as_millis() as u64).unwrap_or(0),
                            total_time_ms: start.elapsed().as_millis() as u64,
                            tokens_per_second: 0.0,
                            finish_reason: FinishReason::Cancelled,
                            tool_calls,
                        });
                    }
                }
                for delta_call in choice.delta.tool_calls.unwrap_or_default() {
                    // OpenAI-style deltas key continuation chunks by `index`,
                    // not `id` — only the first chunk for a tool call carries
                    // a real id and name, later chunks stream just arguments.
                    match tool_calls.get_mut(delta_call.index) {
                        Some(existing) => existing.arguments.push_str(&delta_call.function.arguments),
                        None => {
                            while tool_calls.len() < delta_call.index {
                                tool_calls.push(ToolCallChunk { id: String::new(), name: String::new(), arguments: String::new() });
                            }
                            tool_calls.push(ToolCallChunk {
                                id: delta_call.id,
                                name: delta_call.function.name,
                                arguments: delta_call.function.arguments,
                            });
                        }
                    }
                }
                if let Some(reason) = choice.finish_reason.as_deref() {
                    finish_reason = match reason {
                        "tool_calls" => FinishReason::ToolCalls,
                        "length" => FinishReason::Length,
                        _ => FinishReason::Stop,
                    };
                }
            }
        }

        let total_time = start.elapsed();
        self.rtt.lock().record(total_time);
        Ok(GenerationResult {
            text: full_text,
            tokens,
            time_to_first_token_ms: first_token_time.map(|t| t.as_millis() as u64).unwrap_or(0),
            total_time_ms: total_time.as_millis() as u64,
            tokens_per_second: if total_time.as_secs_f32() > 0.0 {
                tokens as f32 / total_time.as_secs_f32()
            } else {
                0.0
            },
            finish_reason,
            tool_calls,
        })
    }

    async fn is_available(&self) -> bool {
        let mut req = self.client.get(format!("{}/models", self.config.endpoint));
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        req.send().await.map(|r| r.status().is_success()).unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn record_rtt(&self, rtt: Duration) {
        self.rtt.lock().record(rtt);
    }
}

#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<OpenRouterMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDef>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenRouterMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallWire>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for OpenRouterMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.to_string(),
            content: Some(msg.content.clone()),
            tool_calls: None,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ToolDef {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDef,
}

impl ToolDef {
    fn from_schema(schema: &ToolSchema) -> Self {
        Self {
            kind: "function",
            function: FunctionDef {
                name: schema.name.clone(),
                description: schema.description.clone(),
                parameters: schema.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct FunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize, Clone)]
struct ToolCallWire {
    id: String,
    function: FunctionCallWire,
}

#[derive(Debug, Deserialize, Clone)]
struct FunctionCallWire {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    choices: Vec<OpenRouterChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterStreamChunk {
    choices: Vec<OpenRouterStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterStreamChoice {
    delta: OpenRouterDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenRouterDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDeltaWire>>,
}

#[derive(Debug, Deserialize, Default)]
struct ToolCallDeltaWire {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: String,
    #[serde(default)]
    function: FunctionCallDeltaWire,
}

#[derive(Debug, Deserialize, Default)]
struct FunctionCallDeltaWire {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtt_tracker_scales_down_under_load() {
        let mut tracker = RttTracker::new(4);
        assert_eq!(tracker.effective_max_tokens(200), 200);
        for _ in 0..4 {
            tracker.record(Duration::from_millis(5000));
        }
        assert_eq!(tracker.effective_max_tokens(200), 100);
        let mut tracker = RttTracker::new(4);
        for _ in 0..4 {
            tracker.record(Duration::from_millis(3500));
        }
        assert_eq!(tracker.effective_max_tokens(200), 140);
    }

    #[test]
    fn config_defaults_target_openrouter() {
        let config = ChatConfig::default();
        assert!(config.endpoint.contains("openrouter"));
        assert_eq!(config.max_retries, 3);
    }
}
