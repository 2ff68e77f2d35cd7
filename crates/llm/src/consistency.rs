//! Persona consistency scoring and rewrite heuristics.
//!
//! Scores generated text against a small set of heuristics tied to the
//! persona and the turn's urgency, and rewrites text that scores below the
//! configured threshold.

use voice_agent_config::PersonaConfig;

#[derive(Debug, Clone)]
pub struct ConsistencyConfig {
    pub threshold: f32,
    pub max_words_under_urgency: usize,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self { threshold: 0.6, max_words_under_urgency: 25 }
    }
}

fn is_crisis_tone(persona: &PersonaConfig, turn_urgency: f32) -> bool {
    turn_urgency.max(persona.urgency) > 0.75
}

fn is_patient_teacher_tone(persona: &PersonaConfig, turn_urgency: f32) -> bool {
    persona.formality > 0.6 && turn_urgency.max(persona.urgency) < 0.4
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn sentence_count(text: &str) -> usize {
    text.split(['.', '!', '?']).filter(|s| !s.trim().is_empty()).count()
}

/// Scores `text` in [0.0, 1.0] against heuristics derived from `persona`
/// and the turn's urgency: length vs urgency, exclamation count vs
/// crisis-manager tone, sentence count vs patient-teacher tone.
pub fn score(text: &str, persona: &PersonaConfig, turn_urgency: f32, config: &ConsistencyConfig) -> f32 {
    let mut checks = Vec::new();

    if is_crisis_tone(persona, turn_urgency) {
        checks.push(if word_count(text) <= config.max_words_under_urgency { 1.0 } else { 0.0 });
        let exclamations = text.matches('!').count();
        checks.push(if exclamations == 0 { 1.0 } else { 1.0 / (1.0 + exclamations as f32) });
    }

    if is_patient_teacher_tone(persona, turn_urgency) {
        let sentences = sentence_count(text);
        checks.push(if sentences >= 2 { 1.0 } else { 0.5 });
    }

    if checks.is_empty() {
        1.0
    } else {
        checks.iter().sum::<f32>() / checks.len() as f32
    }
}

/// Rewrites `text` to better fit the persona/urgency: truncates overlong
/// crisis-tone replies with an ellipsis, prepends a short acknowledgement
/// for crisis tone, and collapses repeated exclamation marks.
pub fn rewrite(text: &str, persona: &PersonaConfig, turn_urgency: f32, config: &ConsistencyConfig) -> String {
    let mut out = text.to_string();

    if is_crisis_tone(persona, turn_urgency) {
        let words: Vec<&str> = out.split_whitespace().collect();
        if words.len() > config.max_words_under_urgency {
            out = words[..config.max_words_under_urgency].join(" ");
            out.push_str("...");
        }
        if out.contains('!') {
            while out.contains("!!") {
                out = out.replace("!!", "!");
            }
        }
        if !out.trim_start().to_lowercase().starts_with("i understand")
            && !out.trim_start().to_lowercase().starts_with("i hear you")
        {
            out = format!("I understand this is urgent. {out}");
        }
    }

    out
}

/// Scores `text`; if below `config.threshold`, rewrites and re-scores once.
/// Returns the (possibly rewritten) text and its final score.
pub fn score_and_rewrite(
    text: &str,
    persona: &PersonaConfig,
    turn_urgency: f32,
    config: &ConsistencyConfig,
) -> (String, f32) {
    let initial = score(text, persona, turn_urgency, config);
    if initial >= config.threshold {
        return (text.to_string(), initial);
    }
    let rewritten = rewrite(text, persona, turn_urgency, config);
    let rescored = score(&rewritten, persona, turn_urgency, config);
    (rewritten, rescored)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crisis_persona() -> PersonaConfig {
        PersonaConfig { urgency: 0.9, ..PersonaConfig::default() }
    }

    #[test]
    fn overlong_crisis_reply_scores_low_and_gets_truncated() {
        let config = ConsistencyConfig::default();
        let persona = crisis_persona();
        let long_text = "word ".repeat(40);
        let (rewritten, score) = score_and_rewrite(&long_text, &persona, 0.9, &config);
        assert!(score > 0.0);
        assert!(rewritten.len() < long_text.len());
        assert!(rewritten.ends_with("..."));
    }

    #[test]
    fn short_calm_reply_passes_without_rewrite() {
        let config = ConsistencyConfig::default();
        let persona = PersonaConfig::default();
        let text = "Sure, I can help with that.";
        let (out, score) = score_and_rewrite(text, &persona, 0.1, &config);
        assert_eq!(out, text);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn repeated_exclamations_collapse_under_crisis_tone() {
        let config = ConsistencyConfig::default();
        let persona = crisis_persona();
        let text = "This is bad!!! We need to act!!!";
        let rewritten = rewrite(text, &persona, 0.9, &config);
        assert!(!rewritten.contains("!!"));
    }
}
