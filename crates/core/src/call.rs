//! Call entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Call status. Transitions are monotonic toward one of the terminal
/// variants (`Completed | Failed | NoAnswer | Busy | Canceled`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Failed,
    NoAnswer,
    Busy,
    Canceled,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallStatus::Completed
                | CallStatus::Failed
                | CallStatus::NoAnswer
                | CallStatus::Busy
                | CallStatus::Canceled
        )
    }

    /// Whether `self -> next` is a legal monotonic transition (never out of
    /// a terminal state, never backwards through the non-terminal ordering).
    pub fn can_transition_to(self, next: CallStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if self == next {
            return true;
        }
        match self {
            CallStatus::Queued => true, // queued -> anything
            CallStatus::Ringing => next != CallStatus::Queued,
            CallStatus::InProgress => next.is_terminal(),
            _ => false,
        }
    }
}

/// Filter/pagination parameters for listing and searching calls.
#[derive(Debug, Clone, Default)]
pub struct CallFilter {
    pub status: Option<CallStatus>,
    pub phone_number: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

/// A telephone call owned exclusively by its transcripts, call states,
/// digit events, in-memory expectation/plan, memory, and tool audits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Globally unique, immutable identifier assigned by the provider.
    pub call_sid: String,
    pub provider: String,
    pub direction: Direction,
    pub phone_number: String,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub user_chat_id: Option<String>,
    pub customer_name: Option<String>,
    pub prompt: String,
    pub first_message: String,
    pub business_context: Option<String>,
    pub last_otp: Option<String>,
    pub last_otp_masked: Option<String>,
    pub digit_count: i32,
    pub digit_summary: Option<String>,
    pub ai_analysis: Option<serde_json::Value>,
}

impl Call {
    pub fn new(
        call_sid: impl Into<String>,
        provider: impl Into<String>,
        direction: Direction,
        phone_number: impl Into<String>,
        prompt: impl Into<String>,
        first_message: impl Into<String>,
    ) -> Self {
        Self {
            call_sid: call_sid.into(),
            provider: provider.into(),
            direction,
            phone_number: phone_number.into(),
            status: CallStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            duration_seconds: None,
            user_chat_id: None,
            customer_name: None,
            prompt: prompt.into(),
            first_message: first_message.into(),
            business_context: None,
            last_otp: None,
            last_otp_masked: None,
            digit_count: 0,
            digit_summary: None,
            ai_analysis: None,
        }
    }

    /// Attempt a status transition, enforcing monotonicity: terminal states never leave,
    /// and queued calls can't skip back to an earlier stage.
    pub fn transition(&mut self, next: CallStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "illegal call status transition {:?} -> {:?}",
                self.status, next
            ));
        }
        if self.status == CallStatus::Queued && next != CallStatus::Queued {
            self.started_at.get_or_insert(Utc::now());
        }
        if next.is_terminal() {
            let ended_at = Utc::now();
            if let Some(started) = self.started_at {
                self.duration_seconds = Some((ended_at - started).num_seconds().max(0));
            }
            self.ended_at = Some(ended_at);
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_transitions() {
        let mut call = Call::new("CA1", "twilio", Direction::Outbound, "+15551234567", "p", "m");
        assert!(call.transition(CallStatus::Ringing).is_ok());
        assert!(call.transition(CallStatus::InProgress).is_ok());
        assert!(call.transition(CallStatus::Completed).is_ok());
        assert!(call.status.is_terminal());

        // Terminal state is final.
        assert!(call.transition(CallStatus::InProgress).is_err());
    }

    #[test]
    fn test_duration_set_on_terminal() {
        let mut call = Call::new("CA2", "twilio", Direction::Inbound, "+15551234567", "p", "m");
        call.transition(CallStatus::InProgress).unwrap();
        call.transition(CallStatus::Completed).unwrap();
        assert!(call.duration_seconds.is_some());
    }
}
