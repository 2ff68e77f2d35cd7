//! Phase state machine: `greeting -> resolution -> verification? -> closing
//! -> terminal`. The phase selects which sub-window of the dialogue is fed
//! to the turn engine (see `voice_agent_llm::ContextAssembler`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Greeting,
    Resolution,
    Verification,
    Closing,
    Terminal,
}

impl Phase {
    pub fn allowed_transitions(self) -> &'static [Phase] {
        match self {
            Phase::Greeting => &[Phase::Resolution, Phase::Verification, Phase::Closing, Phase::Terminal],
            Phase::Resolution => &[Phase::Verification, Phase::Closing, Phase::Terminal],
            Phase::Verification => &[Phase::Resolution, Phase::Closing, Phase::Terminal],
            Phase::Closing => &[Phase::Terminal],
            Phase::Terminal => &[],
        }
    }

    pub fn can_transition_to(self, next: Phase) -> bool {
        next == self || self.allowed_transitions().contains(&next)
    }
}

/// What caused a phase transition, recorded for observability and to decide
/// whether a prompt recompose is warranted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTrigger {
    TurnCount(u32),
    VerificationKeyword(String),
    ExplicitProfileChange,
    OperatorCommand,
}

const VERIFICATION_KEYWORDS: &[&str] = &["otp", "code", "verify", "passcode"];

/// Turns elapsed in `Greeting` before an automatic move to `Resolution`,
/// absent any other trigger.
const GREETING_TURN_LIMIT: u32 = 2;

fn detect_verification_keyword(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    VERIFICATION_KEYWORDS
        .iter()
        .find(|kw| lower.contains(*kw))
        .map(|kw| kw.to_string())
}

/// Tracks the live phase for one call and the turn counter that drives its
/// automatic transitions.
pub struct PhaseTracker {
    phase: Phase,
    turn_count: u32,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self { phase: Phase::Greeting, turn_count: 0 }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn apply(&mut self, next: Phase) -> bool {
        if self.phase.can_transition_to(next) && self.phase != next {
            self.phase = next;
            true
        } else {
            false
        }
    }

    /// Called once per finalized user utterance. Advances the turn counter
    /// and applies the greeting-timeout and verification-keyword triggers.
    pub fn observe_user_turn(&mut self, text: &str) -> Option<PhaseTrigger> {
        self.turn_count += 1;

        if let Some(keyword) = detect_verification_keyword(text) {
            if matches!(self.phase, Phase::Greeting | Phase::Resolution) && self.apply(Phase::Verification) {
                return Some(PhaseTrigger::VerificationKeyword(keyword));
            }
        }

        if self.phase == Phase::Greeting && self.turn_count >= GREETING_TURN_LIMIT && self.apply(Phase::Resolution) {
            return Some(PhaseTrigger::TurnCount(self.turn_count));
        }

        None
    }

    /// A `collect_digits` tool call on a new profile forces verification,
    /// regardless of the automatic turn-based trigger.
    pub fn on_profile_change(&mut self) -> Option<PhaseTrigger> {
        if self.apply(Phase::Verification) {
            Some(PhaseTrigger::ExplicitProfileChange)
        } else {
            None
        }
    }

    pub fn operator_command(&mut self, target: Phase) -> Result<PhaseTrigger, String> {
        if self.apply(target) {
            Ok(PhaseTrigger::OperatorCommand)
        } else {
            Err(format!("illegal phase transition {:?} -> {:?}", self.phase, target))
        }
    }

    pub fn begin_closing(&mut self) -> bool {
        self.apply(Phase::Closing)
    }

    pub fn terminate(&mut self) {
        self.phase = Phase::Terminal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_advances_to_resolution_after_turn_limit() {
        let mut tracker = PhaseTracker::new();
        assert!(tracker.observe_user_turn("hello there").is_none());
        assert_eq!(
            tracker.observe_user_turn("I have a question"),
            Some(PhaseTrigger::TurnCount(2))
        );
        assert_eq!(tracker.phase(), Phase::Resolution);
    }

    #[test]
    fn verification_keyword_jumps_from_greeting() {
        let mut tracker = PhaseTracker::new();
        let trigger = tracker.observe_user_turn("can you verify my otp");
        assert_eq!(tracker.phase(), Phase::Verification);
        assert!(matches!(trigger, Some(PhaseTrigger::VerificationKeyword(_))));
    }

    #[test]
    fn terminal_rejects_further_transitions() {
        let mut tracker = PhaseTracker::new();
        tracker.terminate();
        assert!(tracker.operator_command(Phase::Greeting).is_err());
    }

    #[test]
    fn closing_to_terminal_allowed_but_not_back_to_resolution() {
        let mut tracker = PhaseTracker::new();
        assert!(tracker.begin_closing());
        assert!(tracker.operator_command(Phase::Terminal).is_ok());
    }
}
