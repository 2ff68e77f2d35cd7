//! ServiceHealthLog — append-only alert trail for internal service health
//! (DLQ depth crossings, provider degradation), distinct from per-call data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceHealthStatus {
    Ok,
    Degraded,
    Alert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealthLog {
    pub service: String,
    pub status: ServiceHealthStatus,
    pub count: i64,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl ServiceHealthLog {
    pub fn new(service: impl Into<String>, status: ServiceHealthStatus, count: i64, detail: Option<String>) -> Self {
        Self { service: service.into(), status, count, detail, at: Utc::now() }
    }
}
