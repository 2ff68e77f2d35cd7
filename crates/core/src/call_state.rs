//! CallState — append-only event log; latest-of-kind is queryable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallState {
    pub call_sid: String,
    pub kind: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl CallState {
    pub fn new(call_sid: impl Into<String>, kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            call_sid: call_sid.into(),
            kind: kind.into(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// Picks the latest entry of a given `kind` from an append-only log, as the
/// store's `latest_by_kind` query does under the hood.
pub fn latest_of_kind<'a>(states: &'a [CallState], kind: &str) -> Option<&'a CallState> {
    states
        .iter()
        .filter(|s| s.kind == kind)
        .max_by_key(|s| s.created_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_of_kind() {
        let mut states = vec![
            CallState::new("CA1", "phase", serde_json::json!("greeting")),
        ];
        std::thread::sleep(std::time::Duration::from_millis(2));
        states.push(CallState::new("CA1", "phase", serde_json::json!("closing")));

        let latest = latest_of_kind(&states, "phase").unwrap();
        assert_eq!(latest.data, serde_json::json!("closing"));
    }
}
