//! Application state: constructs every collaborator (L0 store, C4 router,
//! C2 turn engine, C3 digits, C1 sessions, C5 jobs/webhooks) from `Settings`
//! and wires them into the shape the HTTP layer needs.

use std::sync::Arc;
use std::time::Duration;

use voice_agent_config::Settings;
use voice_agent_core::circuit::CircuitConfig;
use voice_agent_core::traits::Store;
use voice_agent_digits::{DigitManager, InMemoryDigitVault, RecorderConfig};
use voice_agent_jobs::{BackoffPolicy, JobRunner, JobRunnerConfig, WebhookConfig, WebhookSender};
use voice_agent_llm::{ChatBackend, ChatConfig, OpenRouterBackend, ToolEngine, ToolEngineConfig, ToolLoopGuard};
use voice_agent_router::{Channel, ProviderRouter, RouterConfig};
use voice_agent_session::{SessionManager, TurnDriver};
use voice_agent_store::PgStore;
use voice_agent_tools::{CollectDigitsTool, HangupTool, ProviderClients, ToolExecutor, ToolRegistry, TransferCallTool};
use voice_agent_webhook::DedupeWindow;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::jobs::OutboundCallHandler;
use crate::ServerError;

pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn Store>,
    pub router: Arc<ProviderRouter>,
    pub sessions: Arc<SessionManager>,
    pub digits: Arc<DigitManager>,
    pub turn_driver: Arc<TurnDriver>,
    pub job_runner: Arc<JobRunner>,
    pub webhook_sender: Arc<WebhookSender>,
    /// Concrete per-provider telephony clients, keyed by provider name.
    /// Empty by default: adapters are external collaborators (see
    /// DESIGN.md) registered here by whoever deploys against a specific
    /// provider account.
    pub provider_clients: ProviderClients,
    /// Dedupes repeated gather/status callbacks independent of the
    /// per-provider signature check, since no concrete `TelephonyProvider`
    /// is wired in (see DESIGN.md).
    pub gather_dedupe: Arc<DedupeWindow>,
    pub metrics: PrometheusHandle,
    /// Names of the tools wired into the turn engine's registry, surfaced
    /// back in `POST /outbound-call` responses as `function_types`.
    pub function_types: Vec<String>,
}

impl AppState {
    pub async fn bootstrap(settings: Settings, metrics: PrometheusHandle) -> Result<Arc<Self>, ServerError> {
        let settings = Arc::new(settings);

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ServerError::Internal("DATABASE_URL is not set".to_string()))?;
        let store: Arc<dyn Store> = Arc::new(
            PgStore::connect(&database_url, 10)
                .await
                .map_err(|e| ServerError::Internal(format!("failed to connect store: {e}")))?,
        );

        let router = Arc::new(Self::build_router(&settings));
        let digits = Arc::new(Self::build_digit_manager(&settings));
        let provider_clients = ProviderClients::new();
        let turn_driver =
            Arc::new(Self::build_turn_driver(&settings, store.clone(), router.clone(), digits.clone(), provider_clients.clone())?);
        let sessions = Arc::new(SessionManager::new(digits.clone(), turn_driver.clone(), store.clone()));

        let job_runner =
            Arc::new(Self::build_job_runner(&settings, store.clone(), router.clone(), provider_clients.clone()));
        let webhook_sender = Arc::new(Self::build_webhook_sender(&settings, store.clone()));
        let gather_dedupe = Arc::new(DedupeWindow::new(Duration::from_secs(settings.jobs.gather_dedupe_window_s)));

        Ok(Arc::new(Self {
            settings,
            store,
            router,
            sessions,
            digits,
            turn_driver,
            job_runner,
            webhook_sender,
            provider_clients,
            gather_dedupe,
            metrics,
            function_types: vec!["collect_digits".to_string(), "hangup_call".to_string(), "transfer_call".to_string()],
        }))
    }

    fn build_router(settings: &Settings) -> ProviderRouter {
        let health = &settings.providers.health;
        let router = ProviderRouter::new(RouterConfig {
            error_window: Duration::from_secs(health.error_window_s),
            error_threshold: health.error_threshold,
            cooldown: Duration::from_secs(health.cooldown_s),
            provider_override_cooldown: Duration::from_secs(health.provider_override_cooldown_s),
        });
        // `configured` tracks credential presence only; placing the actual
        // call still goes through the job fabric, not a concrete client.
        router.register(Channel::Call, "twilio", settings.providers.twilio.account_sid.is_some());
        router.register(Channel::Call, "vonage", settings.providers.vonage.api_key.is_some());
        router.register(Channel::Call, "aws_connect", settings.providers.aws_connect.instance_id.is_some());
        router
    }

    fn build_digit_manager(settings: &Settings) -> DigitManager {
        DigitManager::new(
            Arc::new(InMemoryDigitVault::default()),
            RecorderConfig { min_dtmf_gap_ms: settings.digits.min_dtmf_gap_ms },
        )
    }

    fn build_turn_driver(
        settings: &Settings,
        store: Arc<dyn Store>,
        router: Arc<ProviderRouter>,
        digits: Arc<DigitManager>,
        clients: ProviderClients,
    ) -> Result<TurnDriver, ServerError> {
        let chat = &settings.openrouter.chat;
        let chat_config = ChatConfig {
            model: chat.model.clone(),
            backup_model: chat.backup_model.clone(),
            endpoint: chat.endpoint.clone(),
            api_key: chat.api_key.clone(),
            max_tokens: chat.max_tokens,
            temperature: chat.temperature,
            timeout: Duration::from_millis(chat.timeout_ms),
            max_retries: chat.max_retries,
            ..ChatConfig::default()
        };
        let backend: Arc<dyn ChatBackend> = Arc::new(
            OpenRouterBackend::new(chat_config)
                .map_err(|e| ServerError::Internal(format!("failed to build chat backend: {e}")))?,
        );

        let mut registry = ToolRegistry::new();
        registry.register(CollectDigitsTool::new(digits));
        registry.register(HangupTool::new(router.clone(), clients.clone()));
        registry.register(TransferCallTool::new(router, clients));
        let executor: Arc<dyn ToolExecutor> = Arc::new(registry);

        let tool_engine_settings = &settings.openrouter.tool_engine;
        let tool_engine_config = ToolEngineConfig {
            tool_budget_per_interaction: tool_engine_settings.tool_budget_per_interaction,
            max_tool_loops: tool_engine_settings.max_tool_loops,
            circuit: CircuitConfig {
                failure_threshold: tool_engine_settings.circuit_failure_threshold,
                window: Duration::from_secs(tool_engine_settings.circuit_window_s),
                cooldown: Duration::from_secs(tool_engine_settings.circuit_cooldown_s),
            },
            idempotency_ttl: Duration::from_secs(tool_engine_settings.idempotency_ttl_s),
            ..ToolEngineConfig::default()
        };
        let tool_engine = Arc::new(ToolEngine::new(store, executor, tool_engine_config));

        Ok(TurnDriver::new(backend, tool_engine, Arc::new(ToolLoopGuard::new()), tool_engine_settings.max_tool_loops))
    }

    fn build_job_runner(
        settings: &Settings,
        store: Arc<dyn Store>,
        router: Arc<ProviderRouter>,
        clients: ProviderClients,
    ) -> JobRunner {
        let jobs = &settings.jobs;
        let config = JobRunnerConfig {
            poll_interval: Duration::from_secs(jobs.poll_interval_s),
            lease_duration: Duration::from_secs(jobs.lease_s),
            claim_batch_size: jobs.claim_batch_size,
            backoff: BackoffPolicy {
                base: Duration::from_millis(jobs.retry_base_ms),
                max: Duration::from_millis(jobs.retry_max_ms),
            },
            dlq_alert_threshold: jobs.dlq_alert_threshold,
        };
        let mut runner = JobRunner::new(store.clone(), config);
        runner.register("outbound_call", Arc::new(OutboundCallHandler::new(store, router, clients)));
        runner
    }

    fn build_webhook_sender(settings: &Settings, store: Arc<dyn Store>) -> WebhookSender {
        let jobs = &settings.jobs;
        let config = WebhookConfig {
            api_secret: settings.server.auth.api_secret.clone().unwrap_or_default(),
            idempotency_ttl: Duration::from_secs(jobs.webhook_idempotency_ttl_s),
            retry_max_attempts: jobs.max_attempts,
            backoff: BackoffPolicy {
                base: Duration::from_millis(jobs.retry_base_ms),
                max: Duration::from_millis(jobs.retry_max_ms),
            },
        };
        WebhookSender::new(store, config)
    }
}
