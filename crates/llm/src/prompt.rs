//! Chat message types and layered system-prompt composition.

use std::fmt;

use serde::{Deserialize, Serialize};

pub use voice_agent_config::PersonaConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set only on `Role::Tool` messages: the id of the tool call this
    /// message answers, echoed back so the backend can line up the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_call_id: None }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: content.into(), tool_call_id: Some(tool_call_id.into()) }
    }
}

/// What triggers a re-composition of the layered system prompt. The engine
/// recomposes rather than patches in place, since any one layer changing
/// can alter how the others ought to read together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomposeTrigger {
    CallProfileChange,
    MoodConfusionUrgencyChange,
    OperatorOverride,
}

/// The five layers composed, in order, into one system prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptLayers {
    pub base_persona: String,
    pub profile_overlay: String,
    pub persona_dsl: String,
    pub tone_directive: String,
    pub brevity_hint: String,
}

impl PromptLayers {
    /// Joins non-empty layers with a blank line, in composition order.
    pub fn compose(&self) -> String {
        [
            &self.base_persona,
            &self.profile_overlay,
            &self.persona_dsl,
            &self.tone_directive,
            &self.brevity_hint,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n\n")
    }
}

/// Context a call profile contributes to the system prompt: anything
/// specific to this caller that the base persona can't know on its own.
#[derive(Debug, Clone, Default)]
pub struct ProfileContext {
    pub customer_name: Option<String>,
    pub intent: Option<String>,
    pub notes: Vec<String>,
}

/// Builds the layered system prompt from a persona, a call profile, and the
/// call's domain/channel/urgency.
pub struct PersonaComposer {
    persona: PersonaConfig,
}

impl PersonaComposer {
    pub fn new(persona: PersonaConfig) -> Self {
        Self { persona }
    }

    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    pub fn set_persona(&mut self, persona: PersonaConfig) {
        self.persona = persona;
    }

    /// Composes the five-layer system prompt. `turn_urgency` (0.0-1.0) is
    /// this turn's detected urgency, distinct from the persona's baseline
    /// urgency trait — e.g. from a detected escalation keyword.
    pub fn compose(&self, profile: &ProfileContext, domain: &str, channel: &str, turn_urgency: f32) -> PromptLayers {
        let p = &self.persona;
        let base_persona = format!(
            "You are {}, a voice assistant. Warmth {:.1}, formality {:.1}, empathy {:.1}.",
            p.name, p.warmth, p.formality, p.empathy
        );

        let mut overlay = String::new();
        if let Some(name) = &profile.customer_name {
            overlay.push_str(&format!("You are speaking with {name}. "));
        }
        if let Some(intent) = &profile.intent {
            overlay.push_str(&format!("Their stated intent is: {intent}. "));
        }
        for note in &profile.notes {
            overlay.push_str(note);
            overlay.push(' ');
        }
        let profile_overlay = overlay.trim().to_string();

        let persona_dsl = format!(
            "Domain: {domain}. Channel: {channel}. Current urgency: {:.1}.",
            turn_urgency.max(p.urgency)
        );

        let effective_urgency = turn_urgency.max(p.urgency);
        let tone_directive = if effective_urgency > 0.75 {
            "Adopt a crisis-manager tone: acknowledge concern first, be direct, avoid filler.".to_string()
        } else if p.formality > 0.7 {
            "Keep language formal and precise.".to_string()
        } else {
            "Keep language warm and conversational.".to_string()
        };

        let brevity_hint = if effective_urgency > 0.75 {
            "Keep responses to one or two short sentences.".to_string()
        } else {
            "Keep responses to at most three sentences per turn.".to_string()
        };

        PromptLayers {
            base_persona,
            profile_overlay,
            persona_dsl,
            tone_directive,
            brevity_hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_joins_nonempty_layers_only() {
        let layers = PromptLayers {
            base_persona: "base".into(),
            profile_overlay: String::new(),
            persona_dsl: "dsl".into(),
            tone_directive: String::new(),
            brevity_hint: "brief".into(),
        };
        assert_eq!(layers.compose(), "base\n\ndsl\n\nbrief");
    }

    #[test]
    fn high_urgency_switches_to_crisis_tone() {
        let composer = PersonaComposer::new(PersonaConfig::default());
        let layers = composer.compose(&ProfileContext::default(), "billing", "call", 0.9);
        assert!(layers.tone_directive.contains("crisis-manager"));
    }

    #[test]
    fn low_urgency_keeps_default_tone() {
        let composer = PersonaComposer::new(PersonaConfig::default());
        let layers = composer.compose(&ProfileContext::default(), "billing", "call", 0.1);
        assert!(!layers.tone_directive.contains("crisis-manager"));
    }
}
