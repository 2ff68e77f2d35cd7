use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use voice_agent_core::call::{Call, CallFilter, CallStatus, Direction};
use voice_agent_core::call_memory::CallMemory;
use voice_agent_core::call_state::CallState;
use voice_agent_core::digit_event::{DigitEvent, DigitSource};
use voice_agent_core::idempotency::{IdempotencyRecord, IdempotencyStatus, Reservation};
use voice_agent_core::job::{Job, JobStatus};
use voice_agent_core::provider_health::ProviderHealth;
use voice_agent_core::service_health_log::{ServiceHealthLog, ServiceHealthStatus};
use voice_agent_core::tool_audit::{ToolAudit, ToolAuditStatus};
use voice_agent_core::traits::Store;
use voice_agent_core::transcript::{Speaker, Transcript};
use voice_agent_core::Result as CoreResult;

use crate::error::StoreError;

/// Thin wrapper around a `PgPool`. Cloning is cheap; the pool itself is
/// reference-counted.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn status_to_str(status: CallStatus) -> &'static str {
    match status {
        CallStatus::Queued => "queued",
        CallStatus::Ringing => "ringing",
        CallStatus::InProgress => "in_progress",
        CallStatus::Completed => "completed",
        CallStatus::Failed => "failed",
        CallStatus::NoAnswer => "no_answer",
        CallStatus::Busy => "busy",
        CallStatus::Canceled => "canceled",
    }
}

fn status_from_str(s: &str) -> Result<CallStatus, StoreError> {
    Ok(match s {
        "queued" => CallStatus::Queued,
        "ringing" => CallStatus::Ringing,
        "in_progress" => CallStatus::InProgress,
        "completed" => CallStatus::Completed,
        "failed" => CallStatus::Failed,
        "no_answer" => CallStatus::NoAnswer,
        "busy" => CallStatus::Busy,
        "canceled" => CallStatus::Canceled,
        other => return Err(StoreError::NotFound(format!("unknown call status {other}"))),
    })
}

fn direction_to_str(d: Direction) -> &'static str {
    match d {
        Direction::Inbound => "inbound",
        Direction::Outbound => "outbound",
    }
}

fn direction_from_str(s: &str) -> Direction {
    match s {
        "outbound" => Direction::Outbound,
        _ => Direction::Inbound,
    }
}

#[derive(FromRow)]
struct CallRow {
    call_sid: String,
    provider: String,
    direction: String,
    phone_number: String,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    duration_seconds: Option<i64>,
    user_chat_id: Option<String>,
    customer_name: Option<String>,
    prompt: String,
    first_message: String,
    business_context: Option<String>,
    last_otp: Option<String>,
    last_otp_masked: Option<String>,
    digit_count: i32,
    digit_summary: Option<String>,
    ai_analysis: Option<serde_json::Value>,
}

impl CallRow {
    fn into_call(self) -> Result<Call, StoreError> {
        Ok(Call {
            call_sid: self.call_sid,
            provider: self.provider,
            direction: direction_from_str(&self.direction),
            phone_number: self.phone_number,
            status: status_from_str(&self.status)?,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_seconds: self.duration_seconds,
            user_chat_id: self.user_chat_id,
            customer_name: self.customer_name,
            prompt: self.prompt,
            first_message: self.first_message,
            business_context: self.business_context,
            last_otp: self.last_otp,
            last_otp_masked: self.last_otp_masked,
            digit_count: self.digit_count,
            digit_summary: self.digit_summary,
            ai_analysis: self.ai_analysis,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_call(&self, call: &Call) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO calls (
                call_sid, provider, direction, phone_number, status, created_at,
                started_at, ended_at, duration_seconds, user_chat_id, customer_name,
                prompt, first_message, business_context, last_otp, last_otp_masked,
                digit_count, digit_summary, ai_analysis
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
            "#,
        )
        .bind(&call.call_sid)
        .bind(&call.provider)
        .bind(direction_to_str(call.direction))
        .bind(&call.phone_number)
        .bind(status_to_str(call.status))
        .bind(call.created_at)
        .bind(call.started_at)
        .bind(call.ended_at)
        .bind(call.duration_seconds)
        .bind(&call.user_chat_id)
        .bind(&call.customer_name)
        .bind(&call.prompt)
        .bind(&call.first_message)
        .bind(&call.business_context)
        .bind(&call.last_otp)
        .bind(&call.last_otp_masked)
        .bind(call.digit_count)
        .bind(&call.digit_summary)
        .bind(&call.ai_analysis)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_call(&self, call_sid: &str) -> CoreResult<Option<Call>> {
        let row = sqlx::query_as::<_, CallRow>("SELECT * FROM calls WHERE call_sid = $1")
            .bind(call_sid)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        match row {
            Some(r) => Ok(Some(r.into_call().map_err(Into::<voice_agent_core::Error>::into)?)),
            None => Ok(None),
        }
    }

    async fn transition_call(&self, call_sid: &str, status: CallStatus) -> CoreResult<Call> {
        let mut call = self
            .get_call(call_sid)
            .await?
            .ok_or_else(|| StoreError::NotFound(call_sid.to_string()))
            .map_err(Into::<voice_agent_core::Error>::into)?;
        call.transition(status)
            .map_err(StoreError::IllegalTransition)
            .map_err(Into::<voice_agent_core::Error>::into)?;
        sqlx::query(
            r#"UPDATE calls SET status = $2, started_at = $3, ended_at = $4, duration_seconds = $5
               WHERE call_sid = $1"#,
        )
        .bind(&call.call_sid)
        .bind(status_to_str(call.status))
        .bind(call.started_at)
        .bind(call.ended_at)
        .bind(call.duration_seconds)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(call)
    }

    async fn list_calls(&self, filter: &CallFilter) -> CoreResult<Vec<Call>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM calls WHERE 1 = 1");
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status_to_str(status));
        }
        if let Some(phone) = &filter.phone_number {
            qb.push(" AND phone_number = ").push_bind(phone.clone());
        }
        if let Some(since) = filter.since {
            qb.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            qb.push(" AND created_at <= ").push_bind(until);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit.clamp(1, 50) as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset as i64);

        let rows = qb
            .build_query_as::<CallRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.into_iter()
            .map(|r| r.into_call().map_err(Into::<voice_agent_core::Error>::into))
            .collect()
    }

    async fn search_calls(&self, query: &str, limit: u32) -> CoreResult<Vec<Call>> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query_as::<_, CallRow>(
            r#"SELECT * FROM calls
               WHERE phone_number ILIKE $1 OR customer_name ILIKE $1
               ORDER BY created_at DESC LIMIT $2"#,
        )
        .bind(pattern)
        .bind(limit.clamp(1, 50) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        rows.into_iter()
            .map(|r| r.into_call().map_err(Into::<voice_agent_core::Error>::into))
            .collect()
    }

    async fn append_transcript(&self, transcript: &Transcript) -> CoreResult<()> {
        let speaker = match transcript.speaker {
            Speaker::User => "user",
            Speaker::Ai => "ai",
            Speaker::System => "system",
        };
        sqlx::query(
            "INSERT INTO transcripts (call_sid, speaker, message, timestamp) VALUES ($1,$2,$3,$4)",
        )
        .bind(&transcript.call_sid)
        .bind(speaker)
        .bind(&transcript.message)
        .bind(transcript.timestamp)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn list_transcripts(&self, call_sid: &str) -> CoreResult<Vec<Transcript>> {
        #[derive(FromRow)]
        struct Row {
            id: i64,
            call_sid: String,
            speaker: String,
            message: String,
            timestamp: DateTime<Utc>,
        }
        let rows = sqlx::query_as::<_, Row>(
            "SELECT id, call_sid, speaker, message, timestamp FROM transcripts WHERE call_sid = $1 ORDER BY id ASC",
        )
        .bind(call_sid)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| Transcript {
                id: r.id,
                call_sid: r.call_sid,
                speaker: match r.speaker.as_str() {
                    "ai" => Speaker::Ai,
                    "system" => Speaker::System,
                    _ => Speaker::User,
                },
                message: r.message,
                timestamp: r.timestamp,
            })
            .collect())
    }

    async fn append_call_state(&self, state: &CallState) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO call_states (call_sid, kind, data, created_at) VALUES ($1,$2,$3,$4)",
        )
        .bind(&state.call_sid)
        .bind(&state.kind)
        .bind(&state.data)
        .bind(state.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn latest_call_state(&self, call_sid: &str, kind: &str) -> CoreResult<Option<CallState>> {
        #[derive(FromRow)]
        struct Row {
            call_sid: String,
            kind: String,
            data: serde_json::Value,
            created_at: DateTime<Utc>,
        }
        let row = sqlx::query_as::<_, Row>(
            "SELECT call_sid, kind, data, created_at FROM call_states
             WHERE call_sid = $1 AND kind = $2 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(call_sid)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(|r| CallState {
            call_sid: r.call_sid,
            kind: r.kind,
            data: r.data,
            created_at: r.created_at,
        }))
    }

    async fn append_digit_event(&self, event: &DigitEvent) -> CoreResult<()> {
        let source = match event.source {
            DigitSource::Dtmf => "dtmf",
            DigitSource::Gather => "gather",
            DigitSource::Timeout => "timeout",
            DigitSource::Speech => "speech",
        };
        sqlx::query(
            r#"INSERT INTO digit_events
               (call_sid, source, profile, digits, len, accepted, reason, metadata, at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)"#,
        )
        .bind(&event.call_sid)
        .bind(source)
        .bind(&event.profile)
        .bind(&event.digits)
        .bind(event.len as i32)
        .bind(event.accepted)
        .bind(&event.reason)
        .bind(serde_json::to_value(&event.metadata).unwrap_or(serde_json::Value::Null))
        .bind(event.at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn list_digit_events(&self, call_sid: &str) -> CoreResult<Vec<DigitEvent>> {
        #[derive(FromRow)]
        struct Row {
            call_sid: String,
            source: String,
            profile: String,
            digits: Option<String>,
            len: i32,
            accepted: bool,
            reason: Option<String>,
            metadata: serde_json::Value,
            at: DateTime<Utc>,
        }
        let rows = sqlx::query_as::<_, Row>(
            "SELECT call_sid, source, profile, digits, len, accepted, reason, metadata, at
             FROM digit_events WHERE call_sid = $1 ORDER BY at ASC",
        )
        .bind(call_sid)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| DigitEvent {
                call_sid: r.call_sid,
                source: match r.source.as_str() {
                    "gather" => DigitSource::Gather,
                    "timeout" => DigitSource::Timeout,
                    "speech" => DigitSource::Speech,
                    _ => DigitSource::Dtmf,
                },
                profile: r.profile,
                digits: r.digits,
                len: r.len as usize,
                accepted: r.accepted,
                reason: r.reason,
                metadata: serde_json::from_value(r.metadata).unwrap_or_default(),
                at: r.at,
            })
            .collect())
    }

    async fn record_call_digit_outcome(
        &self,
        call_sid: &str,
        last_otp: Option<&str>,
        last_otp_masked: &str,
        digit_summary: &str,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"UPDATE calls SET
                 last_otp = $2,
                 last_otp_masked = $3,
                 digit_count = digit_count + 1,
                 digit_summary = $4
               WHERE call_sid = $1"#,
        )
        .bind(call_sid)
        .bind(last_otp)
        .bind(last_otp_masked)
        .bind(digit_summary)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn insert_service_health_log(&self, log: &ServiceHealthLog) -> CoreResult<()> {
        let status = match log.status {
            ServiceHealthStatus::Ok => "ok",
            ServiceHealthStatus::Degraded => "degraded",
            ServiceHealthStatus::Alert => "alert",
        };
        sqlx::query(
            "INSERT INTO service_health_logs (service, status, count, detail, at) VALUES ($1,$2,$3,$4,$5)",
        )
        .bind(&log.service)
        .bind(status)
        .bind(log.count)
        .bind(&log.detail)
        .bind(log.at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_call_memory(&self, call_sid: &str) -> CoreResult<Option<CallMemory>> {
        #[derive(FromRow)]
        struct Row {
            call_sid: String,
            summary: String,
            summary_turns: i32,
            facts: serde_json::Value,
            updated_at: Option<DateTime<Utc>>,
        }
        let row = sqlx::query_as::<_, Row>(
            "SELECT call_sid, summary, summary_turns, facts, updated_at FROM call_memories WHERE call_sid = $1",
        )
        .bind(call_sid)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(|r| CallMemory {
            call_sid: r.call_sid,
            summary: r.summary,
            summary_turns: r.summary_turns as u32,
            facts: serde_json::from_value(r.facts).unwrap_or_default(),
            updated_at: r.updated_at,
        }))
    }

    async fn put_call_memory(&self, memory: &CallMemory) -> CoreResult<()> {
        sqlx::query(
            r#"INSERT INTO call_memories (call_sid, summary, summary_turns, facts, updated_at)
               VALUES ($1,$2,$3,$4,$5)
               ON CONFLICT (call_sid) DO UPDATE SET
                 summary = EXCLUDED.summary,
                 summary_turns = EXCLUDED.summary_turns,
                 facts = EXCLUDED.facts,
                 updated_at = EXCLUDED.updated_at"#,
        )
        .bind(&memory.call_sid)
        .bind(&memory.summary)
        .bind(memory.summary_turns as i32)
        .bind(serde_json::to_value(&memory.facts).unwrap_or(serde_json::Value::Null))
        .bind(memory.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn reserve_idempotency(&self, key: &str, ttl: DateTime<Utc>) -> CoreResult<Reservation> {
        let inserted = sqlx::query(
            r#"INSERT INTO idempotency_records (key, status, response, expires_at)
               VALUES ($1, 'in_progress', NULL, $2)
               ON CONFLICT (key) DO NOTHING"#,
        )
        .bind(key)
        .bind(ttl)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if inserted.rows_affected() == 1 {
            return Ok(Reservation::Reserved);
        }

        #[derive(FromRow)]
        struct Row {
            key: String,
            status: String,
            response: Option<serde_json::Value>,
            expires_at: DateTime<Utc>,
        }
        let row = sqlx::query_as::<_, Row>(
            "SELECT key, status, response, expires_at FROM idempotency_records WHERE key = $1",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(Reservation::Existing(IdempotencyRecord {
            key: row.key,
            status: match row.status.as_str() {
                "ok" => IdempotencyStatus::Ok,
                "failed" => IdempotencyStatus::Failed,
                _ => IdempotencyStatus::InProgress,
            },
            response: row.response,
            expires_at: row.expires_at,
        }))
    }

    async fn complete_idempotency(&self, key: &str, record: IdempotencyRecord) -> CoreResult<()> {
        let status = match record.status {
            IdempotencyStatus::InProgress => "in_progress",
            IdempotencyStatus::Ok => "ok",
            IdempotencyStatus::Failed => "failed",
        };
        sqlx::query(
            "UPDATE idempotency_records SET status = $2, response = $3, expires_at = $4 WHERE key = $1",
        )
        .bind(key)
        .bind(status)
        .bind(&record.response)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn insert_tool_audit(&self, audit: &ToolAudit) -> CoreResult<()> {
        let status = match audit.status {
            ToolAuditStatus::Ok => "ok",
            ToolAuditStatus::Failed => "failed",
            ToolAuditStatus::Cached => "cached",
        };
        sqlx::query(
            r#"INSERT INTO tool_audits
               (call_sid, trace_id, tool_name, idempotency_key, input_hash, request,
                response, status, duration_ms, metadata, created_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)"#,
        )
        .bind(&audit.call_sid)
        .bind(&audit.trace_id)
        .bind(&audit.tool_name)
        .bind(&audit.idempotency_key)
        .bind(&audit.input_hash)
        .bind(&audit.request)
        .bind(&audit.response)
        .bind(status)
        .bind(audit.duration_ms.map(|d| d as i64))
        .bind(&audit.metadata)
        .bind(audit.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn enqueue_job(&self, job: &Job) -> CoreResult<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"INSERT INTO jobs (kind, payload, not_before, attempts, max_attempts, status, lease_until, last_error)
               VALUES ($1,$2,$3,$4,$5,'pending',NULL,NULL)
               RETURNING id"#,
        )
        .bind(&job.kind)
        .bind(&job.payload)
        .bind(job.not_before)
        .bind(job.attempts as i32)
        .bind(job.max_attempts as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.0)
    }

    async fn claim_jobs(&self, kind: &str, limit: u32, lease_until: DateTime<Utc>) -> CoreResult<Vec<Job>> {
        #[derive(FromRow)]
        struct Row {
            id: i64,
            kind: String,
            payload: serde_json::Value,
            not_before: DateTime<Utc>,
            attempts: i32,
            max_attempts: i32,
            status: String,
            lease_until: Option<DateTime<Utc>>,
            last_error: Option<String>,
        }
        let rows = sqlx::query_as::<_, Row>(
            r#"UPDATE jobs SET status = 'claimed', lease_until = $3
               WHERE id IN (
                   SELECT id FROM jobs
                   WHERE kind = $1 AND status = 'pending' AND not_before <= now()
                   ORDER BY not_before ASC
                   LIMIT $2
                   FOR UPDATE SKIP LOCKED
               )
               RETURNING id, kind, payload, not_before, attempts, max_attempts, status, lease_until, last_error"#,
        )
        .bind(kind)
        .bind(limit as i64)
        .bind(lease_until)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| Job {
                id: r.id,
                kind: r.kind,
                payload: r.payload,
                not_before: r.not_before,
                attempts: r.attempts as u32,
                max_attempts: r.max_attempts as u32,
                status: match r.status.as_str() {
                    "done" => JobStatus::Done,
                    "dlq" => JobStatus::Dlq,
                    "claimed" => JobStatus::Claimed,
                    _ => JobStatus::Pending,
                },
                lease_until: r.lease_until,
                last_error: r.last_error,
            })
            .collect())
    }

    async fn complete_job(&self, job_id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE jobs SET status = 'done', lease_until = NULL WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn fail_job(&self, job_id: i64, error: &str, retry_at: Option<DateTime<Utc>>) -> CoreResult<()> {
        match retry_at {
            Some(at) => {
                sqlx::query(
                    r#"UPDATE jobs SET status = 'pending', attempts = attempts + 1,
                       not_before = $2, lease_until = NULL, last_error = $3 WHERE id = $1"#,
                )
                .bind(job_id)
                .bind(at)
                .bind(error)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"UPDATE jobs SET status = 'dlq', attempts = attempts + 1,
                       lease_until = NULL, last_error = $2 WHERE id = $1"#,
                )
                .bind(job_id)
                .bind(error)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_provider_health(&self, provider: &str) -> CoreResult<Option<ProviderHealth>> {
        #[derive(FromRow)]
        struct Row {
            provider: String,
            failures: serde_json::Value,
            open_until: Option<DateTime<Utc>>,
            last_error_at: Option<DateTime<Utc>>,
            last_success_at: Option<DateTime<Utc>>,
        }
        let row = sqlx::query_as::<_, Row>(
            "SELECT provider, failures, open_until, last_error_at, last_success_at
             FROM provider_health WHERE provider = $1",
        )
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(|r| ProviderHealth {
            provider: r.provider,
            failures: serde_json::from_value(r.failures).unwrap_or_default(),
            open_until: r.open_until,
            last_error_at: r.last_error_at,
            last_success_at: r.last_success_at,
        }))
    }

    async fn put_provider_health(&self, health: &ProviderHealth) -> CoreResult<()> {
        sqlx::query(
            r#"INSERT INTO provider_health (provider, failures, open_until, last_error_at, last_success_at)
               VALUES ($1,$2,$3,$4,$5)
               ON CONFLICT (provider) DO UPDATE SET
                 failures = EXCLUDED.failures,
                 open_until = EXCLUDED.open_until,
                 last_error_at = EXCLUDED.last_error_at,
                 last_success_at = EXCLUDED.last_success_at"#,
        )
        .bind(&health.provider)
        .bind(serde_json::to_value(&health.failures).unwrap_or(serde_json::Value::Null))
        .bind(health.open_until)
        .bind(health.last_error_at)
        .bind(health.last_success_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }
}
