//! Persona configuration: the single source of truth for the agent's
//! tone knobs, consumed by `voice_agent_llm::PersonaComposer`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,
    /// Warmth level (0.0 - 1.0)
    #[serde(default = "default_warmth")]
    pub warmth: f32,
    /// Formality level (0.0 - 1.0)
    #[serde(default = "default_formality")]
    pub formality: f32,
    /// Urgency level (0.0 - 1.0)
    #[serde(default = "default_urgency")]
    pub urgency: f32,
    /// Empathy level (0.0 - 1.0)
    #[serde(default = "default_empathy")]
    pub empathy: f32,
}

fn default_persona_name() -> String {
    "Priya".to_string()
}
fn default_warmth() -> f32 {
    0.8
}
fn default_formality() -> f32 {
    0.6
}
fn default_urgency() -> f32 {
    0.4
}
fn default_empathy() -> f32 {
    0.9
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            warmth: default_warmth(),
            formality: default_formality(),
            urgency: default_urgency(),
            empathy: default_empathy(),
        }
    }
}
