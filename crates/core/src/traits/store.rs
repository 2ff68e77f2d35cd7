//! Durable storage interface (L0).
//!
//! One trait so call session runtime, job fabric, and tool engine can all
//! depend on an abstract `Store` instead of a concrete database. The
//! Postgres-backed implementation lives in `voice-agent-store`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::call::{Call, CallFilter};
use crate::call_memory::CallMemory;
use crate::call_state::CallState;
use crate::digit_event::DigitEvent;
use crate::idempotency::{IdempotencyRecord, Reservation};
use crate::job::Job;
use crate::provider_health::ProviderHealth;
use crate::service_health_log::ServiceHealthLog;
use crate::tool_audit::ToolAudit;
use crate::transcript::Transcript;
use crate::Result;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn insert_call(&self, call: &Call) -> Result<()>;
    async fn get_call(&self, call_sid: &str) -> Result<Option<Call>>;
    async fn transition_call(&self, call_sid: &str, status: crate::call::CallStatus) -> Result<Call>;

    /// List calls newest-first, applying `filter`'s status/phone/date bounds
    /// and `limit`/`offset` pagination.
    async fn list_calls(&self, filter: &CallFilter) -> Result<Vec<Call>>;
    /// Free-text search over phone number and customer name, newest-first.
    async fn search_calls(&self, query: &str, limit: u32) -> Result<Vec<Call>>;

    async fn append_transcript(&self, transcript: &Transcript) -> Result<()>;
    async fn list_transcripts(&self, call_sid: &str) -> Result<Vec<Transcript>>;

    async fn append_call_state(&self, state: &CallState) -> Result<()>;
    async fn latest_call_state(&self, call_sid: &str, kind: &str) -> Result<Option<CallState>>;

    async fn append_digit_event(&self, event: &DigitEvent) -> Result<()>;
    async fn list_digit_events(&self, call_sid: &str) -> Result<Vec<DigitEvent>>;

    /// Records an accepted OTP-shaped digit collection on the call row:
    /// `last_otp`/`last_otp_masked` (token and masked display), `digit_count`
    /// incremented by one, and `digit_summary` set to `summary`.
    async fn record_call_digit_outcome(
        &self,
        call_sid: &str,
        last_otp: Option<&str>,
        last_otp_masked: &str,
        digit_summary: &str,
    ) -> Result<()>;

    async fn insert_service_health_log(&self, log: &ServiceHealthLog) -> Result<()>;

    async fn get_call_memory(&self, call_sid: &str) -> Result<Option<CallMemory>>;
    async fn put_call_memory(&self, memory: &CallMemory) -> Result<()>;

    /// Conditionally reserve an idempotency key. Returns `Reservation::Reserved`
    /// only to the first caller; later callers observe `Reservation::Existing`.
    async fn reserve_idempotency(&self, key: &str, ttl: DateTime<Utc>) -> Result<Reservation>;
    async fn complete_idempotency(&self, key: &str, record: IdempotencyRecord) -> Result<()>;

    async fn insert_tool_audit(&self, audit: &ToolAudit) -> Result<()>;

    async fn enqueue_job(&self, job: &Job) -> Result<i64>;
    /// Atomically claim up to `limit` due jobs, leasing them until `lease_until`.
    async fn claim_jobs(&self, kind: &str, limit: u32, lease_until: DateTime<Utc>) -> Result<Vec<Job>>;
    async fn complete_job(&self, job_id: i64) -> Result<()>;
    async fn fail_job(&self, job_id: i64, error: &str, retry_at: Option<DateTime<Utc>>) -> Result<()>;

    async fn get_provider_health(&self, provider: &str) -> Result<Option<ProviderHealth>>;
    async fn put_provider_health(&self, health: &ProviderHealth) -> Result<()>;
}
