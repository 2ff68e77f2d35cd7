//! Bridges a `RecordedOutcome` to durable storage: every resolved outcome
//! gets an append-only `DigitEvent`, and an accepted collection additionally
//! updates the call's OTP/digit-summary fields, shared by both the live
//! session runtime and the no-session-yet webhook fallback path.

use voice_agent_core::digit_event::{DigitEvent, DigitSource};
use voice_agent_core::traits::Store;

use crate::error::DigitsError;
use crate::manager::RecordedOutcome;

/// What the caller should do once `outcome` has been persisted.
#[derive(Debug, Default, Clone)]
pub struct DigitOutcomeEffect {
    pub should_end_call: bool,
    /// A masked/plain human-readable note to fold into the call transcript,
    /// set only when a collection was accepted.
    pub transcript_note: Option<String>,
}

/// Persists `outcome` as a `DigitEvent` and, on `Accepted`, updates the
/// call row's `last_otp`/`last_otp_masked`/`digit_count`/`digit_summary`.
/// Raw digits never reach this function or the store: sensitive profiles
/// hand back a vault token, never the underlying digits.
pub async fn apply_recorded_outcome(
    store: &dyn Store,
    call_sid: &str,
    source: DigitSource,
    outcome: &RecordedOutcome,
) -> Result<DigitOutcomeEffect, DigitsError> {
    match outcome {
        RecordedOutcome::Pending => Ok(DigitOutcomeEffect::default()),

        RecordedOutcome::Rejected { profile, reason } | RecordedOutcome::Failed { profile, reason } => {
            let mut event = DigitEvent::new(call_sid, source, profile.clone());
            event.accepted = false;
            event.reason = Some(reason.clone());
            store.append_digit_event(&event).await?;
            Ok(DigitOutcomeEffect::default())
        }

        RecordedOutcome::Accepted { profile, raw_len, display, token, end_call_on_success, .. } => {
            let mut event = DigitEvent::new(call_sid, source, profile.clone());
            event.accepted = true;
            event.len = *raw_len;
            event.digits = token.clone().or_else(|| Some(display.clone()));
            store.append_digit_event(&event).await?;

            let summary = format!("{profile}={display}");
            store
                .record_call_digit_outcome(call_sid, token.as_deref(), display, &summary)
                .await?;

            Ok(DigitOutcomeEffect {
                should_end_call: *end_call_on_success,
                transcript_note: Some(format!("Collected {profile} digits: {display}")),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use voice_agent_core::{Call, CallFilter, CallMemory, CallStatus, DigitEvent as CoreDigitEvent, Transcript};

    #[derive(Default)]
    struct RecordingStore {
        digit_events: Mutex<Vec<CoreDigitEvent>>,
        digit_outcomes: Mutex<Vec<(String, Option<String>, String, String)>>,
    }

    #[async_trait]
    impl Store for RecordingStore {
        async fn insert_call(&self, _call: &Call) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn get_call(&self, _call_sid: &str) -> voice_agent_core::Result<Option<Call>> {
            Ok(None)
        }
        async fn transition_call(&self, _call_sid: &str, _status: CallStatus) -> voice_agent_core::Result<Call> {
            unimplemented!()
        }
        async fn list_calls(&self, _filter: &CallFilter) -> voice_agent_core::Result<Vec<Call>> {
            Ok(Vec::new())
        }
        async fn search_calls(&self, _query: &str, _limit: u32) -> voice_agent_core::Result<Vec<Call>> {
            Ok(Vec::new())
        }
        async fn append_transcript(&self, _transcript: &Transcript) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn list_transcripts(&self, _call_sid: &str) -> voice_agent_core::Result<Vec<Transcript>> {
            Ok(Vec::new())
        }
        async fn append_call_state(&self, _state: &voice_agent_core::CallState) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn latest_call_state(
            &self,
            _call_sid: &str,
            _kind: &str,
        ) -> voice_agent_core::Result<Option<voice_agent_core::CallState>> {
            Ok(None)
        }
        async fn append_digit_event(&self, event: &CoreDigitEvent) -> voice_agent_core::Result<()> {
            self.digit_events.lock().unwrap().push(event.clone());
            Ok(())
        }
        async fn list_digit_events(&self, _call_sid: &str) -> voice_agent_core::Result<Vec<CoreDigitEvent>> {
            Ok(Vec::new())
        }
        async fn record_call_digit_outcome(
            &self,
            call_sid: &str,
            last_otp: Option<&str>,
            last_otp_masked: &str,
            digit_summary: &str,
        ) -> voice_agent_core::Result<()> {
            self.digit_outcomes.lock().unwrap().push((
                call_sid.to_string(),
                last_otp.map(str::to_string),
                last_otp_masked.to_string(),
                digit_summary.to_string(),
            ));
            Ok(())
        }
        async fn insert_service_health_log(
            &self,
            _log: &voice_agent_core::ServiceHealthLog,
        ) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn get_call_memory(&self, _call_sid: &str) -> voice_agent_core::Result<Option<CallMemory>> {
            Ok(None)
        }
        async fn put_call_memory(&self, _memory: &CallMemory) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn reserve_idempotency(
            &self,
            _key: &str,
            _ttl: DateTime<Utc>,
        ) -> voice_agent_core::Result<voice_agent_core::idempotency::Reservation> {
            Ok(voice_agent_core::idempotency::Reservation::Reserved)
        }
        async fn complete_idempotency(
            &self,
            _key: &str,
            _record: voice_agent_core::idempotency::IdempotencyRecord,
        ) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn insert_tool_audit(&self, _audit: &voice_agent_core::tool_audit::ToolAudit) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn enqueue_job(&self, _job: &voice_agent_core::job::Job) -> voice_agent_core::Result<i64> {
            Ok(1)
        }
        async fn claim_jobs(
            &self,
            _kind: &str,
            _limit: u32,
            _lease_until: DateTime<Utc>,
        ) -> voice_agent_core::Result<Vec<voice_agent_core::job::Job>> {
            Ok(Vec::new())
        }
        async fn complete_job(&self, _job_id: i64) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn fail_job(&self, _job_id: i64, _error: &str, _retry_at: Option<DateTime<Utc>>) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn get_provider_health(
            &self,
            _provider: &str,
        ) -> voice_agent_core::Result<Option<voice_agent_core::provider_health::ProviderHealth>> {
            Ok(None)
        }
        async fn put_provider_health(&self, _health: &voice_agent_core::provider_health::ProviderHealth) -> voice_agent_core::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn accepted_otp_persists_event_and_call_summary() {
        let store = RecordingStore::default();
        let outcome = RecordedOutcome::Accepted {
            profile: "otp".to_string(),
            raw_len: 6,
            display: "****56".to_string(),
            token: Some("vault://digits/CA1/tok_1".to_string()),
            plan_complete: None,
            end_call_on_success: true,
        };

        let effect = apply_recorded_outcome(&store, "CA1", DigitSource::Dtmf, &outcome).await.unwrap();
        assert!(effect.should_end_call);
        assert_eq!(effect.transcript_note.as_deref(), Some("Collected otp digits: ****56"));

        let events = store.digit_events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].accepted);
        assert_eq!(events[0].len, 6);
        assert_eq!(events[0].digits.as_deref(), Some("vault://digits/CA1/tok_1"));

        let outcomes = store.digit_outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].1.as_deref(), Some("vault://digits/CA1/tok_1"));
        assert_eq!(outcomes[0].2, "****56");
    }

    #[tokio::test]
    async fn rejected_outcome_persists_event_without_ending_call() {
        let store = RecordingStore::default();
        let outcome = RecordedOutcome::Rejected { profile: "dob".to_string(), reason: "day out of range".to_string() };

        let effect = apply_recorded_outcome(&store, "CA2", DigitSource::Dtmf, &outcome).await.unwrap();
        assert!(!effect.should_end_call);
        assert!(effect.transcript_note.is_none());

        let events = store.digit_events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].accepted);
        assert_eq!(events[0].reason.as_deref(), Some("day out of range"));

        assert!(store.digit_outcomes.lock().unwrap().is_empty());
    }
}
