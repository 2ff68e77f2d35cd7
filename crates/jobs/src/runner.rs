//! Single-writer job poller: claims due jobs under lease, executes by kind,
//! reschedules with backoff on failure, moves exhausted jobs to the DLQ.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use voice_agent_core::job::Job;
use voice_agent_core::service_health_log::{ServiceHealthLog, ServiceHealthStatus};
use voice_agent_core::traits::Store;

use crate::backoff::BackoffPolicy;
use crate::error::JobsError;

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    pub poll_interval: Duration,
    pub lease_duration: Duration,
    pub claim_batch_size: u32,
    pub backoff: BackoffPolicy,
    pub dlq_alert_threshold: u32,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            lease_duration: Duration::from_secs(30),
            claim_batch_size: 10,
            backoff: BackoffPolicy {
                base: Duration::from_millis(500),
                max: Duration::from_secs(300),
            },
            dlq_alert_threshold: 50,
        }
    }
}

pub struct JobRunner {
    store: Arc<dyn Store>,
    config: JobRunnerConfig,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    dlq_depth: std::sync::atomic::AtomicU32,
}

impl JobRunner {
    pub fn new(store: Arc<dyn Store>, config: JobRunnerConfig) -> Self {
        Self {
            store,
            config,
            handlers: HashMap::new(),
            dlq_depth: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Run one poll-claim-execute cycle across all registered kinds.
    pub async fn tick(&self) {
        let kinds: Vec<String> = self.handlers.keys().cloned().collect();
        for kind in kinds {
            if let Err(e) = self.tick_kind(&kind).await {
                error!(kind = %kind, error = %e, "job poll cycle failed");
            }
        }
    }

    async fn tick_kind(&self, kind: &str) -> Result<(), JobsError> {
        let handler = self
            .handlers
            .get(kind)
            .cloned()
            .ok_or_else(|| JobsError::NoHandler(kind.to_string()))?;
        let lease_until = Utc::now() + chrono::Duration::from_std(self.config.lease_duration).unwrap_or_default();
        let jobs = self
            .store
            .claim_jobs(kind, self.config.claim_batch_size, lease_until)
            .await
            .map_err(|e| JobsError::Execution(e.to_string()))?;

        for job in jobs {
            match handler.handle(&job).await {
                Ok(()) => {
                    if let Err(e) = self.store.complete_job(job.id).await {
                        error!(job_id = job.id, error = %e, "failed to mark job done");
                    }
                }
                Err(err) => self.fail(job, err).await,
            }
        }
        Ok(())
    }

    async fn fail(&self, job: Job, err: String) {
        let next_attempt = job.attempts + 1;
        if next_attempt >= job.max_attempts {
            if let Err(e) = self.store.fail_job(job.id, &err, None).await {
                error!(job_id = job.id, error = %e, "failed to move job to dlq");
                return;
            }
            let depth = self.dlq_depth.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
            warn!(job_id = job.id, kind = %job.kind, %err, "job exhausted retries, moved to dlq");
            if depth >= self.config.dlq_alert_threshold {
                warn!(depth, threshold = self.config.dlq_alert_threshold, "dlq depth alert threshold crossed");
                let log = ServiceHealthLog::new(
                    "call_job_dlq",
                    ServiceHealthStatus::Alert,
                    depth as i64,
                    Some(format!("dlq depth {depth} crossed alert threshold {}", self.config.dlq_alert_threshold)),
                );
                if let Err(e) = self.store.insert_service_health_log(&log).await {
                    error!(error = %e, "failed to persist dlq alert health log");
                }
            }
            return;
        }
        let retry_at = Utc::now()
            + chrono::Duration::from_std(self.config.backoff.delay_for_attempt(next_attempt)).unwrap_or_default();
        if let Err(e) = self.store.fail_job(job.id, &err, Some(retry_at)).await {
            error!(job_id = job.id, error = %e, "failed to reschedule job");
        }
    }

    /// Start the poller as a background task. Returns a shutdown sender.
    pub fn spawn(self: Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let runner = self.clone();
        let interval = runner.config.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        runner.tick().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("job runner shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
