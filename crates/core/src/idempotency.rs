//! IdempotencyRecord — process-global, unique on `key`, TTL-bounded

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    InProgress,
    Ok,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub status: IdempotencyStatus,
    pub response: Option<serde_json::Value>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a conditional reservation attempt (`Store::reserve_idempotency`).
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// This caller reserved the key; proceed with the side effect.
    Reserved,
    /// Someone already holds (or completed) this key.
    Existing(IdempotencyRecord),
}
