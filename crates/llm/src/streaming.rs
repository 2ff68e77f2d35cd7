//! Streaming protocol: bullet-sentinel chunking of the raw token stream
//! into `gptreply` events, each scored for persona consistency. Layers a
//! sentinel-delimited partial protocol on top of a raw token stream.

use voice_agent_config::PersonaConfig;

use crate::backend::FinishReason;
use crate::consistency::{self, ConsistencyConfig};

pub const SENTINEL: char = '\u{2022}';

/// Accumulates raw tokens and yields completed chunks whenever the sentinel
/// appears, or on a final flush once the stream ends.
#[derive(Default)]
pub struct SentinelChunker {
    buffer: String,
}

impl SentinelChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one token (or arbitrary-sized piece) of raw text. Returns any
    /// chunks completed by a sentinel found in the updated buffer, in order.
    pub fn push(&mut self, token: &str) -> Vec<String> {
        self.buffer.push_str(token);
        let mut chunks = Vec::new();
        while let Some(idx) = self.buffer.find(SENTINEL) {
            let chunk: String = self.buffer[..idx].trim().to_string();
            self.buffer = self.buffer[idx + SENTINEL.len_utf8()..].to_string();
            if !chunk.is_empty() {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// Flushes whatever remains in the buffer, e.g. once `finish_reason=stop`.
    pub fn flush(&mut self) -> Option<String> {
        let remainder = self.buffer.trim().to_string();
        self.buffer.clear();
        if remainder.is_empty() {
            None
        } else {
            Some(remainder)
        }
    }
}

#[derive(Debug, Clone)]
pub struct PersonalityInfo {
    pub name: String,
    pub warmth: f32,
    pub formality: f32,
    pub urgency: f32,
    pub empathy: f32,
}

impl From<&PersonaConfig> for PersonalityInfo {
    fn from(p: &PersonaConfig) -> Self {
        Self {
            name: p.name.clone(),
            warmth: p.warmth,
            formality: p.formality,
            urgency: p.urgency,
            empathy: p.empathy,
        }
    }
}

#[derive(Debug, Clone)]
pub enum GenerationEvent {
    GptReply {
        partial_response_index: u32,
        partial_response: String,
        personality_info: PersonalityInfo,
        persona_consistency: f32,
    },
    /// `finish_reason=tool_calls`: no further text for this turn.
    ToolCallsPending,
}

/// Type alias for the raw-token channel a `ChatBackend::generate_stream`
/// call writes into.
pub type TokenStream = tokio::sync::mpsc::Receiver<String>;

/// Drives one turn's raw token stream into `gptreply` events: chunks on the
/// sentinel, scores (and rewrites if needed) each chunk for persona
/// consistency, and assigns a monotonically increasing `partialResponseIndex`.
pub struct StreamingGenerator {
    chunker: SentinelChunker,
    consistency_config: ConsistencyConfig,
    next_index: u32,
}

impl StreamingGenerator {
    pub fn new(consistency_config: ConsistencyConfig) -> Self {
        Self { chunker: SentinelChunker::new(), consistency_config, next_index: 0 }
    }

    fn emit(&mut self, text: String, persona: &PersonaConfig, turn_urgency: f32) -> GenerationEvent {
        let (text, consistency_score) =
            consistency::score_and_rewrite(&text, persona, turn_urgency, &self.consistency_config);
        let event = GenerationEvent::GptReply {
            partial_response_index: self.next_index,
            partial_response: text,
            personality_info: persona.into(),
            persona_consistency: consistency_score,
        };
        self.next_index += 1;
        event
    }

    /// Feeds one raw token, returning zero or more completed `gptreply` events.
    pub fn on_token(&mut self, token: &str, persona: &PersonaConfig, turn_urgency: f32) -> Vec<GenerationEvent> {
        self.chunker
            .push(token)
            .into_iter()
            .map(|chunk| self.emit(chunk, persona, turn_urgency))
            .collect()
    }

    /// Call once the stream ends. Flushes any trailing partial and, for
    /// `finish_reason=tool_calls`, appends the tool-calls-pending marker
    /// instead of any further text event.
    pub fn on_finish(
        &mut self,
        finish_reason: FinishReason,
        persona: &PersonaConfig,
        turn_urgency: f32,
    ) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        if finish_reason != FinishReason::ToolCalls {
            if let Some(remainder) = self.chunker.flush() {
                events.push(self.emit(remainder, persona, turn_urgency));
            }
        } else {
            self.chunker.flush();
            events.push(GenerationEvent::ToolCallsPending);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_on_sentinel_boundary() {
        let mut chunker = SentinelChunker::new();
        assert!(chunker.push("hello there").is_empty());
        let chunks = chunker.push(&format!(" friend{SENTINEL}more text"));
        assert_eq!(chunks, vec!["hello there friend".to_string()]);
        assert_eq!(chunker.flush(), Some("more text".to_string()));
    }

    #[test]
    fn flush_is_none_when_buffer_empty() {
        let mut chunker = SentinelChunker::new();
        chunker.push(&format!("done{SENTINEL}"));
        assert_eq!(chunker.flush(), None);
    }

    #[test]
    fn generator_assigns_increasing_indices() {
        let mut gen = StreamingGenerator::new(ConsistencyConfig::default());
        let persona = PersonaConfig::default();
        let events = gen.on_token(&format!("first chunk{SENTINEL}second chunk{SENTINEL}"), &persona, 0.1);
        assert_eq!(events.len(), 2);
        let indices: Vec<u32> = events
            .iter()
            .map(|e| match e {
                GenerationEvent::GptReply { partial_response_index, .. } => *partial_response_index,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn tool_calls_finish_emits_pending_marker_not_text() {
        let mut gen = StreamingGenerator::new(ConsistencyConfig::default());
        let persona = PersonaConfig::default();
        gen.on_token("partial without sentinel", &persona, 0.1);
        let events = gen.on_finish(FinishReason::ToolCalls, &persona, 0.1);
        assert!(matches!(events.as_slice(), [GenerationEvent::ToolCallsPending]));
    }
}
