//! CallMemory — rolling summary + extracted facts for long calls

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallMemory {
    pub call_sid: String,
    pub summary: String,
    /// Turn index the summary covers up to; turns after this are still in the live window.
    pub summary_turns: u32,
    pub facts: HashMap<String, serde_json::Value>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CallMemory {
    pub fn new(call_sid: impl Into<String>) -> Self {
        Self {
            call_sid: call_sid.into(),
            summary: String::new(),
            summary_turns: 0,
            facts: HashMap::new(),
            updated_at: None,
        }
    }

    pub fn absorb_summary(&mut self, summary: String, through_turn: u32) {
        self.summary = summary;
        self.summary_turns = through_turn;
        self.updated_at = Some(Utc::now());
    }

    pub fn set_fact(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.facts.insert(key.into(), value);
        self.updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_summary_advances_cursor() {
        let mut mem = CallMemory::new("CA123");
        mem.absorb_summary("caller wants a refund".into(), 6);
        assert_eq!(mem.summary_turns, 6);
        assert!(mem.updated_at.is_some());
    }
}
