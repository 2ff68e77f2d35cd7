//! Per-turn context window assembly: system prompt, call metadata, bounded
//! session summary, top confidence-sorted facts, the current phase's recent
//! turns, and a general backstop window — folded down to fit a token budget.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use crate::prompt::Message;

#[derive(Debug, Clone)]
pub struct Fact {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct CallMeta {
    pub call_sid: String,
    pub customer_name: Option<String>,
    pub intent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub context_token_budget: usize,
    pub max_per_phase: usize,
    pub max_facts: usize,
    /// Upper bound on the session summary's length in characters; folding
    /// truncates from the front once this is exceeded.
    pub summary_char_cap: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_token_budget: 3000,
            max_per_phase: 12,
            max_facts: 5,
            summary_char_cap: 2000,
        }
    }
}

/// Estimates tokens as `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() as f32 / 4.0).ceil() as usize
}

fn content_hash(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

/// Accumulates session-level state (summary, long-term facts) across turns
/// and assembles the final message list sent to the backend for each turn.
pub struct ContextAssembler {
    config: ContextConfig,
    summary: String,
    facts: Vec<Fact>,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self { config, summary: String::new(), facts: Vec::new() }
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn set_summary(&mut self, summary: String) {
        self.summary = summary;
        self.cap_summary();
    }

    fn cap_summary(&mut self) {
        if self.summary.chars().count() > self.config.summary_char_cap {
            let skip = self.summary.chars().count() - self.config.summary_char_cap;
            self.summary = self.summary.chars().skip(skip).collect();
        }
    }

    /// Records a long-term fact, kept sorted by descending confidence and
    /// truncated to `max_facts`.
    pub fn add_fact(&mut self, fact: Fact) {
        let pos = self.facts.partition_point(|f| f.confidence >= fact.confidence);
        self.facts.insert(pos, fact);
        self.facts.truncate(self.config.max_facts);
    }

    fn facts_block(&self) -> Option<String> {
        if self.facts.is_empty() {
            return None;
        }
        let lines = self
            .facts
            .iter()
            .map(|f| format!("- {} (confidence {:.2})", f.text, f.confidence))
            .collect::<Vec<_>>()
            .join("\n");
        Some(format!("Known facts:\n{lines}"))
    }

    fn meta_block(meta: &CallMeta) -> String {
        let mut parts = vec![format!("callSid: {}", meta.call_sid)];
        if let Some(name) = &meta.customer_name {
            parts.push(format!("customer: {name}"));
        }
        if let Some(intent) = &meta.intent {
            parts.push(format!("intent: {intent}"));
        }
        parts.join(", ")
    }

    /// Assembles the ordered message list for one turn: composed system
    /// prompt + call metadata + summary + facts as a single system message,
    /// then the current phase's trailing window, then the general backstop
    /// window (deduplicated against the phase window by content hash), then
    /// folds the oldest entries into the summary until under budget.
    pub fn assemble(
        &mut self,
        system_prompt: &str,
        meta: &CallMeta,
        phase_window: &[Message],
        backstop_window: &[Message],
    ) -> Vec<Message> {
        let mut system_parts = vec![system_prompt.to_string(), Self::meta_block(meta)];
        if !self.summary.is_empty() {
            system_parts.push(format!("Session summary: {}", self.summary));
        }
        if let Some(facts) = self.facts_block() {
            system_parts.push(facts);
        }
        let system_message = Message::system(system_parts.join("\n\n"));

        let phase_tail: Vec<Message> = phase_window
            .iter()
            .rev()
            .take(self.config.max_per_phase)
            .rev()
            .cloned()
            .collect();

        let mut seen: HashSet<u64> = phase_tail.iter().map(|m| content_hash(&m.content)).collect();
        let mut backstop_deduped = Vec::new();
        for m in backstop_window {
            let hash = content_hash(&m.content);
            if seen.insert(hash) {
                backstop_deduped.push(m.clone());
            }
        }

        let mut recent: Vec<Message> = backstop_deduped.into_iter().chain(phase_tail).collect();

        let mut total_tokens = estimate_tokens(&system_message.content)
            + recent.iter().map(|m| estimate_tokens(&m.content)).sum::<usize>();

        while total_tokens > self.config.context_token_budget && !recent.is_empty() {
            let folded = recent.remove(0);
            total_tokens -= estimate_tokens(&folded.content);
            if !self.summary.is_empty() {
                self.summary.push(' ');
            }
            self.summary.push_str(&format!("[{}] {}", folded.role, folded.content));
            self.cap_summary();
        }

        let mut out = vec![system_message];
        out.extend(recent);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Role;

    fn meta() -> CallMeta {
        CallMeta { call_sid: "CA1".into(), customer_name: Some("Sam".into()), intent: None }
    }

    #[test]
    fn facts_stay_confidence_sorted_and_capped() {
        let mut ctx = ContextAssembler::new(ContextConfig { max_facts: 2, ..Default::default() });
        ctx.add_fact(Fact { text: "low".into(), confidence: 0.2 });
        ctx.add_fact(Fact { text: "high".into(), confidence: 0.9 });
        ctx.add_fact(Fact { text: "mid".into(), confidence: 0.5 });
        assert_eq!(ctx.facts.len(), 2);
        assert_eq!(ctx.facts[0].text, "high");
        assert_eq!(ctx.facts[1].text, "mid");
    }

    #[test]
    fn dedup_drops_repeated_backstop_message() {
        let mut ctx = ContextAssembler::new(ContextConfig::default());
        let phase = vec![Message::user("same text")];
        let backstop = vec![Message::user("same text"), Message::user("unique")];
        let assembled = ctx.assemble("sys", &meta(), &phase, &backstop);
        let user_msgs: Vec<_> = assembled.iter().filter(|m| m.role == Role::User).collect();
        assert_eq!(user_msgs.len(), 2);
    }

    #[test]
    fn folds_oldest_into_summary_when_over_budget() {
        let mut ctx = ContextAssembler::new(ContextConfig {
            context_token_budget: 5,
            max_per_phase: 10,
            max_facts: 5,
            summary_char_cap: 5000,
        });
        let phase = vec![Message::user("a fairly long message that exceeds budget".repeat(3))];
        let assembled = ctx.assemble("sys", &meta(), &phase, &[]);
        assert!(!ctx.summary().is_empty());
        assert_eq!(assembled.len(), 1);
    }
}
