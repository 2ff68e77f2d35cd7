//! DigitEvent — append-only; raw digits may be tokenized

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitSource {
    Dtmf,
    Gather,
    Timeout,
    Speech,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigitEvent {
    pub call_sid: String,
    pub source: DigitSource,
    pub profile: String,
    /// Raw digits, tokenized for sensitive profiles or `None` when masked.
    pub digits: Option<String>,
    pub len: usize,
    pub accepted: bool,
    pub reason: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub at: DateTime<Utc>,
}

impl DigitEvent {
    pub fn new(call_sid: impl Into<String>, source: DigitSource, profile: impl Into<String>) -> Self {
        Self {
            call_sid: call_sid.into(),
            source,
            profile: profile.into(),
            digits: None,
            len: 0,
            accepted: false,
            reason: None,
            metadata: HashMap::new(),
            at: Utc::now(),
        }
    }
}
