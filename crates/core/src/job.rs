//! Job entity — single-writer claim, exponential backoff, DLQ

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Claimed,
    Done,
    Dlq,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub not_before: DateTime<Utc>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: JobStatus,
    pub lease_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value, max_attempts: u32) -> Self {
        Self {
            id: 0,
            kind: kind.into(),
            payload,
            not_before: Utc::now(),
            attempts: 0,
            max_attempts,
            status: JobStatus::Pending,
            lease_until: None,
            last_error: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.not_before <= now
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
