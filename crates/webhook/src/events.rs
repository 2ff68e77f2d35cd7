//! Provider event translation: raw inbound webhook payloads become typed
//! commands the call session runtime (C1) and digit subsystem (C3) consume.

use serde::{Deserialize, Serialize};

use crate::error::WebhookError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherCallback {
    pub call_sid: String,
    pub plan_id: String,
    pub step_index: u32,
    pub channel_session_id: String,
    pub digits: Option<String>,
}

/// A provider event translated from raw webhook JSON, ready to be applied
/// to a call session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderEvent {
    Answered { call_sid: String },
    StatusChanged { call_sid: String, status: String },
    Dtmf { call_sid: String, digit: char },
    GatherResult(GatherCallback),
    MachineDetected { call_sid: String, is_machine: bool },
    Hangup { call_sid: String, reason: Option<String> },
}

impl ProviderEvent {
    pub fn call_sid(&self) -> &str {
        match self {
            ProviderEvent::Answered { call_sid } => call_sid,
            ProviderEvent::StatusChanged { call_sid, .. } => call_sid,
            ProviderEvent::Dtmf { call_sid, .. } => call_sid,
            ProviderEvent::GatherResult(cb) => &cb.call_sid,
            ProviderEvent::MachineDetected { call_sid, .. } => call_sid,
            ProviderEvent::Hangup { call_sid, .. } => call_sid,
        }
    }

    /// A stable key for deduplicating repeated deliveries of the same
    /// logical event (distinct from the HTTP-level `Idempotency-Key`,
    /// which guards the whole request rather than its semantic content).
    pub fn dedupe_key(&self) -> String {
        match self {
            ProviderEvent::GatherResult(cb) => {
                format!("gather:{}:{}:{}", cb.call_sid, cb.plan_id, cb.step_index)
            }
            other => format!("{}:{}", other.call_sid(), kind_name(other)),
        }
    }
}

fn kind_name(event: &ProviderEvent) -> &'static str {
    match event {
        ProviderEvent::Answered { .. } => "answered",
        ProviderEvent::StatusChanged { .. } => "status_changed",
        ProviderEvent::Dtmf { .. } => "dtmf",
        ProviderEvent::GatherResult(_) => "gather_result",
        ProviderEvent::MachineDetected { .. } => "machine_detected",
        ProviderEvent::Hangup { .. } => "hangup",
    }
}

/// Translate a generic (already-JSON-normalized) webhook body into a
/// `ProviderEvent`. Each concrete telephony provider is responsible for
/// mapping its own wire shape (Twilio form-encoded, Vonage NCCO JSON, ...)
/// into this normalized shape before calling this function; the core never
/// branches on provider name beyond that adapter boundary.
pub fn translate(body: &serde_json::Value) -> Result<ProviderEvent, WebhookError> {
    let event_type = body
        .get("event_type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WebhookError::MalformedPayload("missing event_type".into()))?;
    let call_sid = body
        .get("call_sid")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WebhookError::MalformedPayload("missing call_sid".into()))?
        .to_string();

    match event_type {
        "answered" => Ok(ProviderEvent::Answered { call_sid }),
        "status" => {
            let status = body
                .get("status")
                .and_then(|v| v.as_str())
                .ok_or_else(|| WebhookError::MalformedPayload("missing status".into()))?
                .to_string();
            Ok(ProviderEvent::StatusChanged { call_sid, status })
        }
        "dtmf" => {
            let digit = body
                .get("digit")
                .and_then(|v| v.as_str())
                .and_then(|s| s.chars().next())
                .ok_or_else(|| WebhookError::MalformedPayload("missing digit".into()))?;
            Ok(ProviderEvent::Dtmf { call_sid, digit })
        }
        "gather_result" => {
            let plan_id = body
                .get("plan_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| WebhookError::MalformedPayload("missing plan_id".into()))?
                .to_string();
            let step_index = body
                .get("step_index")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| WebhookError::MalformedPayload("missing step_index".into()))? as u32;
            let channel_session_id = body
                .get("channel_session_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| WebhookError::MalformedPayload("missing channel_session_id".into()))?
                .to_string();
            let digits = body.get("digits").and_then(|v| v.as_str()).map(str::to_string);
            Ok(ProviderEvent::GatherResult(GatherCallback {
                call_sid,
                plan_id,
                step_index,
                channel_session_id,
                digits,
            }))
        }
        "machine_detection" => {
            let is_machine = body.get("is_machine").and_then(|v| v.as_bool()).unwrap_or(false);
            Ok(ProviderEvent::MachineDetected { call_sid, is_machine })
        }
        "hangup" => {
            let reason = body.get("reason").and_then(|v| v.as_str()).map(str::to_string);
            Ok(ProviderEvent::Hangup { call_sid, reason })
        }
        other => Err(WebhookError::MalformedPayload(format!("unknown event_type: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_gather_result() {
        let body = serde_json::json!({
            "event_type": "gather_result",
            "call_sid": "CA1",
            "plan_id": "p1",
            "step_index": 2,
            "channel_session_id": "sess1",
            "digits": "1234"
        });
        let event = translate(&body).unwrap();
        assert_eq!(event.call_sid(), "CA1");
        assert_eq!(event.dedupe_key(), "gather:CA1:p1:2");
    }

    #[test]
    fn rejects_unknown_event_type() {
        let body = serde_json::json!({"event_type": "mystery", "call_sid": "CA1"});
        assert!(translate(&body).is_err());
    }

    #[test]
    fn rejects_missing_call_sid() {
        let body = serde_json::json!({"event_type": "answered"});
        assert!(translate(&body).is_err());
    }
}
