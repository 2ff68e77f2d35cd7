//! ToolAudit — persistent record of a tool invocation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAuditStatus {
    Ok,
    Failed,
    Cached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolAudit {
    pub call_sid: String,
    pub trace_id: String,
    pub tool_name: String,
    /// Unique on this field; see `IdempotencyRecord`.
    pub idempotency_key: String,
    pub input_hash: String,
    pub request: serde_json::Value,
    pub response: Option<serde_json::Value>,
    pub status: ToolAuditStatus,
    pub duration_ms: Option<u64>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
