//! In-memory expectation and plan state, scoped to one call at a time.

use chrono::{DateTime, Utc};

use crate::profile::{resolve, ProfileSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectationStatus {
    AwaitingPrompt,
    PromptMarked,
    Collecting,
    Accepted,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct DigitExpectation {
    pub profile: String,
    pub min_digits: usize,
    pub max_digits: usize,
    pub timeout_s: u64,
    pub max_retries: u32,
    pub buffer: String,
    pub collected: Vec<String>,
    pub retries: u32,
    pub plan_id: Option<String>,
    pub plan_step_index: Option<usize>,
    pub plan_total_steps: Option<usize>,
    pub prompted_at: Option<DateTime<Utc>>,
    pub allow_terminator: bool,
    pub terminator_char: char,
    pub end_call_on_success: bool,
    pub mask_for_gpt: bool,
    pub status: ExpectationStatus,
    pub last_key_at: Option<DateTime<Utc>>,
}

impl DigitExpectation {
    pub fn for_profile(profile: &str, mask_for_gpt: bool) -> (Self, &'static ProfileSpec, bool) {
        let (spec, downgraded) = resolve(profile);
        let expectation = Self {
            profile: spec.name.to_string(),
            min_digits: spec.min_digits,
            max_digits: spec.max_digits,
            timeout_s: spec.timeout_s,
            max_retries: spec.max_retries,
            buffer: String::new(),
            collected: Vec::new(),
            retries: 0,
            plan_id: None,
            plan_step_index: None,
            plan_total_steps: None,
            prompted_at: None,
            allow_terminator: true,
            terminator_char: '#',
            end_call_on_success: spec.end_call_on_success,
            mask_for_gpt,
            status: ExpectationStatus::AwaitingPrompt,
            last_key_at: None,
        };
        (expectation, spec, downgraded)
    }

    pub fn mark_prompted(&mut self) {
        self.prompted_at = Some(Utc::now());
        self.status = ExpectationStatus::PromptMarked;
    }

    pub fn timeout_delay_ms(&self, min_collect_delay_ms: u64) -> u64 {
        min_collect_delay_ms.max(3000) + self.timeout_s * 1000
    }
}

/// An ordered sequence of expectations, e.g. "card number, then expiry, then CVV".
#[derive(Debug, Clone)]
pub struct DigitPlan {
    pub id: String,
    pub steps: Vec<String>,
    pub current_step: usize,
    pub completion_message: String,
    pub end_call_on_success: bool,
}

impl DigitPlan {
    pub fn new(id: impl Into<String>, steps: Vec<String>, completion_message: impl Into<String>, end_call_on_success: bool) -> Self {
        Self {
            id: id.into(),
            steps,
            current_step: 0,
            completion_message: completion_message.into(),
            end_call_on_success,
        }
    }

    pub fn current_profile(&self) -> Option<&str> {
        self.steps.get(self.current_step).map(|s| s.as_str())
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Advance to the next step. Returns `true` if the plan is now complete.
    pub fn advance(&mut self) -> bool {
        self.current_step += 1;
        self.current_step >= self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_advances_and_completes() {
        let mut plan = DigitPlan::new("p1", vec!["card_number".into(), "card_expiry".into(), "cvv".into()], "done", false);
        assert_eq!(plan.current_profile(), Some("card_number"));
        assert!(!plan.advance());
        assert_eq!(plan.current_profile(), Some("card_expiry"));
        assert!(!plan.advance());
        assert_eq!(plan.current_profile(), Some("cvv"));
        assert!(plan.advance());
    }
}
