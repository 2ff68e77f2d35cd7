//! Call session registry: creates, looks up, and expires `CallSession`s,
//! mirroring the create/get/remove/cleanup-task shape of an in-memory
//! session store with a periodic sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, RwLock};
use voice_agent_core::traits::Store;
use voice_agent_digits::DigitManager;

use crate::error::SessionError;
use crate::session::{CallSession, SessionConfig};
use crate::turn::TurnDriver;

pub struct SessionManagerConfig {
    pub max_sessions: usize,
    pub session_timeout: Duration,
    pub cleanup_interval: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            session_timeout: Duration::from_secs(600),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

struct Entry {
    session: Arc<CallSession>,
    last_activity: Instant,
}

/// Owns every live `CallSession`, evicting idle ones past `session_timeout`
/// and rejecting new sessions once `max_sessions` is reached (after first
/// trying to make room by clearing anything already expired).
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Entry>>,
    config: SessionManagerConfig,
    digits: Arc<DigitManager>,
    turn_driver: Arc<TurnDriver>,
    store: Arc<dyn Store>,
}

impl SessionManager {
    pub fn new(digits: Arc<DigitManager>, turn_driver: Arc<TurnDriver>, store: Arc<dyn Store>) -> Self {
        Self::with_config(digits, turn_driver, store, SessionManagerConfig::default())
    }

    pub fn with_config(
        digits: Arc<DigitManager>,
        turn_driver: Arc<TurnDriver>,
        store: Arc<dyn Store>,
        config: SessionManagerConfig,
    ) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), config, digits, turn_driver, store }
    }

    /// Opens a new session, or returns the existing one if `call_sid` is
    /// already live (open is idempotent at the webhook layer, so this must
    /// be too).
    pub async fn create(&self, call_sid: &str, session_config: SessionConfig) -> Result<Arc<CallSession>, SessionError> {
        {
            let sessions = self.sessions.read().await;
            if let Some(entry) = sessions.get(call_sid) {
                return Ok(entry.session.clone());
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get(call_sid) {
            return Ok(entry.session.clone());
        }

        if sessions.len() >= self.config.max_sessions {
            self.evict_expired_locked(&mut sessions);
        }
        if sessions.len() >= self.config.max_sessions {
            return Err(SessionError::MediaAttachFailed(format!(
                "session capacity reached ({} sessions)",
                self.config.max_sessions
            )));
        }

        let session = Arc::new(CallSession::open(
            call_sid,
            session_config,
            self.digits.clone(),
            self.turn_driver.clone(),
            self.store.clone(),
        )?);
        sessions.insert(call_sid.to_string(), Entry { session: session.clone(), last_activity: Instant::now() });
        Ok(session)
    }

    pub async fn get(&self, call_sid: &str) -> Option<Arc<CallSession>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(call_sid)?;
        entry.last_activity = Instant::now();
        Some(entry.session.clone())
    }

    pub async fn remove(&self, call_sid: &str, reason: &str) {
        let entry = self.sessions.write().await.remove(call_sid);
        if let Some(entry) = entry {
            entry.session.close(reason).await;
        }
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn evict_expired_locked(&self, sessions: &mut HashMap<String, Entry>) {
        let timeout = self.config.session_timeout;
        let now = Instant::now();
        sessions.retain(|_, entry| now.duration_since(entry.last_activity) < timeout);
    }

    /// Closes and drops every session idle past the configured timeout.
    /// Returns how many were reaped.
    pub async fn cleanup_expired(&self) -> usize {
        let timeout = self.config.session_timeout;
        let now = Instant::now();
        let expired: Vec<(String, Arc<CallSession>)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_activity) >= timeout)
                .map(|(sid, entry)| (sid.clone(), entry.session.clone()))
                .collect()
        };
        if expired.is_empty() {
            return 0;
        }
        {
            let mut sessions = self.sessions.write().await;
            for (sid, _) in &expired {
                sessions.remove(sid);
            }
        }
        for (_, session) in &expired {
            session.close("idle_timeout").await;
        }
        expired.len()
    }

    pub async fn list(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Spawns the periodic idle sweep. Returns a sender; dropping it or
    /// sending `true` stops the task on its next tick.
    pub fn start_cleanup_task(self: Arc<Self>) -> watch::Sender<bool> {
        let (tx, mut rx) = watch::channel(false);
        let interval = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reaped = self.cleanup_expired().await;
                        if reaped > 0 {
                            tracing::debug!(reaped, "swept expired call sessions");
                        }
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_core::traits::Store;
    use voice_agent_digits::DigitManager;
    use voice_agent_llm::{ChatBackend, FinishReason, GenerationResult, LlmError, ToolEngine, ToolEngineConfig, ToolLoopGuard};
    use voice_agent_tools::{ToolExecutor, ToolOutput, ToolSchema};

    struct NullStore;

    #[async_trait::async_trait]
    impl Store for NullStore {
        async fn insert_call(&self, _call: &voice_agent_core::Call) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn get_call(&self, _call_sid: &str) -> voice_agent_core::Result<Option<voice_agent_core::Call>> {
            Ok(None)
        }
        async fn transition_call(
            &self,
            _call_sid: &str,
            _status: voice_agent_core::CallStatus,
        ) -> voice_agent_core::Result<voice_agent_core::Call> {
            unimplemented!("not exercised by session-manager tests")
        }
        async fn list_calls(
            &self,
            _filter: &voice_agent_core::CallFilter,
        ) -> voice_agent_core::Result<Vec<voice_agent_core::Call>> {
            Ok(Vec::new())
        }
        async fn search_calls(&self, _query: &str, _limit: u32) -> voice_agent_core::Result<Vec<voice_agent_core::Call>> {
            Ok(Vec::new())
        }
        async fn append_transcript(&self, _transcript: &voice_agent_core::Transcript) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn list_transcripts(&self, _call_sid: &str) -> voice_agent_core::Result<Vec<voice_agent_core::Transcript>> {
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
        async fn append_digit_event(&self, _event: &voice_agent_core::DigitEvent) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn list_digit_events(&self, _call_sid: &str) -> voice_agent_core::Result<Vec<voice_agent_core::DigitEvent>> {
            Ok(Vec::new())
        }
        async fn record_call_digit_outcome(
            &self,
            _call_sid: &str,
            _last_otp: Option<&str>,
            _last_otp_masked: &str,
            _digit_summary: &str,
        ) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn insert_service_health_log(
            &self,
            _log: &voice_agent_core::ServiceHealthLog,
        ) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn get_call_memory(&self, _call_sid: &str) -> voice_agent_core::Result<Option<voice_agent_core::CallMemory>> {
            Ok(None)
        }
        async fn put_call_memory(&self, _memory: &voice_agent_core::CallMemory) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn reserve_idempotency(
            &self,
            _key: &str,
            _ttl: chrono::DateTime<chrono::Utc>,
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
            _lease_until: chrono::DateTime<chrono::Utc>,
        ) -> voice_agent_core::Result<Vec<voice_agent_core::job::Job>> {
            Ok(Vec::new())
        }
        async fn complete_job(&self, _job_id: i64) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn fail_job(
            &self,
            _job_id: i64,
            _error: &str,
            _retry_at: Option<chrono::DateTime<chrono::Utc>>,
        ) -> voice_agent_core::Result<()> {
            Ok(())
        }
        async fn get_provider_health(
            &self,
            _provider: &str,
        ) -> voice_agent_core::Result<Option<voice_agent_core::provider_health::ProviderHealth>> {
            Ok(None)
        }
        async fn put_provider_health(
            &self,
            _health: &voice_agent_core::provider_health::ProviderHealth,
        ) -> voice_agent_core::Result<()> {
            Ok(())
        }
    }

    struct NullExecutor;

    #[async_trait::async_trait]
    impl ToolExecutor for NullExecutor {
        async fn execute(&self, _name: &str, _args: serde_json::Value) -> Result<ToolOutput, voice_agent_tools::ToolError> {
            Ok(ToolOutput::text("ok"))
        }
        fn list_tools(&self) -> Vec<ToolSchema> {
            Vec::new()
        }
        fn get_tool(&self, _name: &str) -> Option<Arc<dyn voice_agent_tools::Tool>> {
            None
        }
    }

    struct StubBackend;

    #[async_trait::async_trait]
    impl ChatBackend for StubBackend {
        async fn generate(
            &self,
            _messages: &[voice_agent_llm::Message],
            _tools: &[ToolSchema],
        ) -> Result<GenerationResult, LlmError> {
            unimplemented!()
        }
        async fn generate_stream(
            &self,
            _messages: &[voice_agent_llm::Message],
            _tools: &[ToolSchema],
            _tx: tokio::sync::mpsc::Sender<String>,
        ) -> Result<GenerationResult, LlmError> {
            Ok(GenerationResult {
                text: "hi".into(),
                tokens: 1,
                time_to_first_token_ms: 0,
                total_time_ms: 0,
                tokens_per_second: 0.0,
                finish_reason: FinishReason::Stop,
                tool_calls: Vec::new(),
            })
        }
        async fn is_available(&self) -> bool {
            true
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn driver() -> Arc<TurnDriver> {
        let store: Arc<dyn Store> = Arc::new(NullStore);
        let executor: Arc<dyn ToolExecutor> = Arc::new(NullExecutor);
        let engine = Arc::new(ToolEngine::new(store, executor, ToolEngineConfig::default()));
        Arc::new(TurnDriver::new(Arc::new(StubBackend), engine, Arc::new(ToolLoopGuard::new()), 4))
    }

    fn digits() -> Arc<DigitManager> {
        Arc::new(DigitManager::new(
            Arc::new(voice_agent_digits::InMemoryDigitVault::default()),
            Default::default(),
        ))
    }

    fn store() -> Arc<dyn Store> {
        Arc::new(NullStore)
    }

    #[tokio::test]
    async fn create_is_idempotent_per_call_sid() {
        let manager = SessionManager::new(digits(), driver(), store());
        let a = manager.create("CA1", SessionConfig::default()).await.unwrap();
        let b = manager.create("CA1", SessionConfig::default()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.count().await, 1);
    }

    #[tokio::test]
    async fn remove_closes_and_drops_session() {
        let manager = SessionManager::new(digits(), driver(), store());
        let session = manager.create("CA2", SessionConfig::default()).await.unwrap();
        manager.remove("CA2", "test").await;
        assert_eq!(manager.count().await, 0);
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn cleanup_expired_reaps_idle_sessions() {
        let manager = SessionManager::with_config(
            digits(),
            driver(),
            store(),
            SessionManagerConfig { max_sessions: 10, session_timeout: Duration::from_millis(1), cleanup_interval: Duration::from_secs(60) },
        );
        manager.create("CA3", SessionConfig::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(manager.cleanup_expired().await, 1);
        assert_eq!(manager.count().await, 0);
    }
}
