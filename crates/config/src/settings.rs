//! Main settings module: environment-driven configuration for every
//! component of the call-control plane — typed sub-configs, each field
//! defaulted from a named environment variable via a
//! `#[serde(default = "...")]` function, with a final `validate()` pass
//! that enforces the required-at-boot set.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

fn env_string(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u64(key: &str, fallback: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

fn env_u32(key: &str, fallback: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

fn env_usize(key: &str, fallback: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

fn env_f32(key: &str, fallback: f32) -> f32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

fn env_bool(key: &str, fallback: bool) -> bool {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

/// Runtime environment; strictness of `Settings::validate` scales with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Validation mode for an inbound webhook route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Requests without a valid signature are rejected.
    Strict,
    /// Invalid signatures are logged but the request still proceeds.
    Warn,
    /// No signature is required at all.
    Off,
}

impl std::str::FromStr for ValidationMode {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "warn" => Ok(Self::Warn),
            "off" => Ok(Self::Off),
            other => Err(ConfigError::InvalidValue {
                field: "webhook_validation".to_string(),
                message: format!("expected strict|warn|off, got '{other}'"),
            }),
        }
    }
}

fn env_validation_mode(key: &str, fallback: ValidationMode) -> ValidationMode {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

/// Top-level application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub openrouter: OpenRouterSettings,
    #[serde(default)]
    pub deepgram: DeepgramConfig,
    #[serde(default)]
    pub jobs: JobsSettings,
    #[serde(default)]
    pub digits: DigitsSettings,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub compliance: ComplianceConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::default(),
            server: ServerConfig::default(),
            providers: ProvidersConfig::default(),
            openrouter: OpenRouterSettings::default(),
            deepgram: DeepgramConfig::default(),
            jobs: JobsSettings::default(),
            digits: DigitsSettings::default(),
            payment: PaymentConfig::default(),
            compliance: ComplianceConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the authoritative required-at-boot set from §6 and a handful
    /// of range invariants on the rest. In development, missing required
    /// secrets only warn; in staging/production they are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_required()?;
        self.validate_server()?;
        self.validate_openrouter()?;
        Ok(())
    }

    fn validate_required(&self) -> Result<(), ConfigError> {
        let required: [(&str, &Option<String>); 6] = [
            ("TWILIO_ACCOUNT_SID", &self.providers.twilio.account_sid),
            ("TWILIO_AUTH_TOKEN", &self.providers.twilio.auth_token),
            ("FROM_NUMBER", &self.providers.twilio.from_number),
            ("OPENROUTER_API_KEY", &self.openrouter.chat.api_key),
            ("DEEPGRAM_API_KEY", &self.deepgram.api_key),
            ("API_SECRET", &self.server.auth.api_secret),
        ];

        let missing: Vec<&str> = required.iter().filter(|(_, v)| v.is_none()).map(|(k, _)| *k).collect();
        if missing.is_empty() {
            return Ok(());
        }

        if self.environment.is_strict() {
            return Err(ConfigError::MissingField(missing.join(", ")));
        }
        tracing::warn!("missing required settings (ok in development): {}", missing.join(", "));
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }
        if self.environment.is_production() && self.server.cors.enabled && self.server.cors.origins.is_empty() {
            tracing::warn!("CORS enabled in production with no configured origins");
        }
        Ok(())
    }

    fn validate_openrouter(&self) -> Result<(), ConfigError> {
        if self.openrouter.consistency.threshold < 0.0 || self.openrouter.consistency.threshold > 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "openrouter.consistency.threshold".to_string(),
                message: "must be in [0.0, 1.0]".to_string(),
            });
        }
        Ok(())
    }
}

/// HTTP server configuration (`§6` inbound surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_host() -> String {
    env_string("SERVER_HOST", "0.0.0.0")
}
fn default_port() -> u16 {
    env_u32("SERVER_PORT", 8080) as u16
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), auth: AuthConfig::default(), cors: CorsConfig::default(), rate_limit: RateLimitConfig::default() }
    }
}

/// Shared secret used both to sign/verify outbound webhook envelopes and as
/// the bearer token for `/outbound-call` and the `/api/calls*` admin routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_secret")]
    pub api_secret: Option<String>,
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
    /// Max allowed clock skew between a request's `X-Timestamp` and now.
    #[serde(default = "default_hmac_skew_ms")]
    pub hmac_max_skew_ms: i64,
}

fn default_api_secret() -> Option<String> {
    env_opt_string("API_SECRET")
}
fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string(), "/ready".to_string(), "/status".to_string(), "/metrics".to_string()]
}
fn default_hmac_skew_ms() -> i64 {
    env_u64("API_HMAC_MAX_SKEW_MS", 300_000) as i64
}
fn default_true() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_secret: default_api_secret(),
            public_paths: default_public_paths(),
            hmac_max_skew_ms: default_hmac_skew_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            origins: std::env::var("CORS_ORIGINS").map(|s| s.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_multiplier: f32,
}

fn default_rps() -> u32 {
    env_u32("RATE_LIMIT_RPS", 50)
}
fn default_burst() -> f32 {
    env_f32("RATE_LIMIT_BURST_MULTIPLIER", 2.0)
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { enabled: default_true(), requests_per_second: default_rps(), burst_multiplier: default_burst() }
    }
}

/// Telephony/SMS provider credentials and webhook verification modes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default = "default_call_provider")]
    pub call_provider: String,
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub vonage: VonageConfig,
    #[serde(default)]
    pub aws_connect: AwsConnectConfig,
    #[serde(default)]
    pub health: ProviderHealthConfig,
}

fn default_call_provider() -> String {
    env_string("CALL_PROVIDER", "twilio")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default = "default_twilio_sid")]
    pub account_sid: Option<String>,
    #[serde(default = "default_twilio_token")]
    pub auth_token: Option<String>,
    #[serde(default = "default_from_number")]
    pub from_number: Option<String>,
    #[serde(default = "default_twilio_webhook_validation")]
    pub webhook_validation: ValidationMode,
    #[serde(default = "default_twilio_tts_voice")]
    pub tts_voice: String,
}

fn default_twilio_sid() -> Option<String> {
    env_opt_string("TWILIO_ACCOUNT_SID")
}
fn default_twilio_token() -> Option<String> {
    env_opt_string("TWILIO_AUTH_TOKEN")
}
fn default_from_number() -> Option<String> {
    env_opt_string("FROM_NUMBER")
}
fn default_twilio_webhook_validation() -> ValidationMode {
    env_validation_mode("TWILIO_WEBHOOK_VALIDATION", ValidationMode::Strict)
}
fn default_twilio_tts_voice() -> String {
    env_string("TWILIO_TTS_VOICE", "Polly.Aditi")
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: default_twilio_sid(),
            auth_token: default_twilio_token(),
            from_number: default_from_number(),
            webhook_validation: default_twilio_webhook_validation(),
            tts_voice: default_twilio_tts_voice(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VonageConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default = "default_vonage_webhook_validation")]
    pub webhook_validation: ValidationMode,
}

fn default_vonage_webhook_validation() -> ValidationMode {
    env_validation_mode("VONAGE_WEBHOOK_VALIDATION", ValidationMode::Strict)
}

impl Default for VonageConfig {
    fn default() -> Self {
        Self { api_key: env_opt_string("VONAGE_API_KEY"), api_secret: env_opt_string("VONAGE_API_SECRET"), webhook_validation: default_vonage_webhook_validation() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConnectConfig {
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default = "default_aws_webhook_validation")]
    pub webhook_validation: ValidationMode,
}

fn default_aws_webhook_validation() -> ValidationMode {
    env_validation_mode("AWS_CONNECT_WEBHOOK_VALIDATION", ValidationMode::Strict)
}

impl Default for AwsConnectConfig {
    fn default() -> Self {
        Self { instance_id: env_opt_string("AWS_CONNECT_INSTANCE_ID"), webhook_validation: default_aws_webhook_validation() }
    }
}

/// Maps onto `voice_agent_router::RouterConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthConfig {
    #[serde(default = "default_error_threshold")]
    pub error_threshold: usize,
    #[serde(default = "default_error_window_s")]
    pub error_window_s: u64,
    #[serde(default = "default_cooldown_s")]
    pub cooldown_s: u64,
    #[serde(default = "default_override_cooldown_s")]
    pub provider_override_cooldown_s: u64,
}

fn default_error_threshold() -> usize {
    env_usize("PROVIDER_ERROR_THRESHOLD", 3)
}
fn default_error_window_s() -> u64 {
    env_u64("PROVIDER_ERROR_WINDOW_S", 60)
}
fn default_cooldown_s() -> u64 {
    env_u64("PROVIDER_COOLDOWN_S", 30)
}
fn default_override_cooldown_s() -> u64 {
    env_u64("PROVIDER_OVERRIDE_COOLDOWN_S", 120)
}

impl Default for ProviderHealthConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            error_window_s: default_error_window_s(),
            cooldown_s: default_cooldown_s(),
            provider_override_cooldown_s: default_override_cooldown_s(),
        }
    }
}

/// STT bridge credentials. Deepgram itself is an external collaborator (out
/// of scope per spec.md's non-goals); the key is still a required boot-time
/// setting so the session runtime can hand it to whatever bridges STT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepgramConfig {
    #[serde(default = "default_deepgram_key")]
    pub api_key: Option<String>,
}

fn default_deepgram_key() -> Option<String> {
    env_opt_string("DEEPGRAM_API_KEY")
}

impl Default for DeepgramConfig {
    fn default() -> Self {
        Self { api_key: default_deepgram_key() }
    }
}

/// OPENROUTER_* family: chat backend, context assembly, tool engine budget
/// and circuit, consistency checking, and SLO thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenRouterSettings {
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub context: ContextSettings,
    #[serde(default)]
    pub tool_engine: ToolEngineSettings,
    #[serde(default)]
    pub consistency: ConsistencySettings,
    #[serde(default)]
    pub slo: SloConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_openrouter_model")]
    pub model: String,
    #[serde(default)]
    pub backup_model: Option<String>,
    #[serde(default = "default_openrouter_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_openrouter_key")]
    pub api_key: Option<String>,
    #[serde(default = "default_openrouter_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_openrouter_temperature")]
    pub temperature: f32,
    #[serde(default = "default_openrouter_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_openrouter_max_retries")]
    pub max_retries: u32,
}

fn default_openrouter_model() -> String {
    env_string("OPENROUTER_MODEL", "openai/gpt-4o-mini")
}
fn default_openrouter_endpoint() -> String {
    // Base URL; `ChatBackend` implementations append `/chat/completions` etc.
    env_string("OPENROUTER_ENDPOINT", "https://openrouter.ai/api/v1")
}
fn default_openrouter_key() -> Option<String> {
    env_opt_string("OPENROUTER_API_KEY")
}
fn default_openrouter_max_tokens() -> usize {
    env_usize("OPENROUTER_MAX_TOKENS", 512)
}
fn default_openrouter_temperature() -> f32 {
    env_f32("OPENROUTER_TEMPERATURE", 0.7)
}
fn default_openrouter_timeout_ms() -> u64 {
    env_u64("OPENROUTER_TIMEOUT_MS", 8_000)
}
fn default_openrouter_max_retries() -> u32 {
    env_u32("OPENROUTER_MAX_RETRIES", 2)
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: default_openrouter_model(),
            backup_model: env_opt_string("OPENROUTER_BACKUP_MODEL"),
            endpoint: default_openrouter_endpoint(),
            api_key: default_openrouter_key(),
            max_tokens: default_openrouter_max_tokens(),
            temperature: default_openrouter_temperature(),
            timeout_ms: default_openrouter_timeout_ms(),
            max_retries: default_openrouter_max_retries(),
        }
    }
}

/// `OPENROUTER_*` "context/memory" knobs, feeding `voice_agent_llm::ContextConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: usize,
    #[serde(default = "default_max_per_phase")]
    pub max_per_phase: usize,
    #[serde(default = "default_max_facts")]
    pub max_facts: usize,
    #[serde(default = "default_summary_char_cap")]
    pub summary_char_cap: usize,
}

fn default_context_token_budget() -> usize {
    env_usize("OPENROUTER_CONTEXT_TOKEN_BUDGET", 3000)
}
fn default_max_per_phase() -> usize {
    env_usize("OPENROUTER_CONTEXT_MAX_PER_PHASE", 12)
}
fn default_max_facts() -> usize {
    env_usize("OPENROUTER_MEMORY_MAX_FACTS", 5)
}
fn default_summary_char_cap() -> usize {
    env_usize("OPENROUTER_MEMORY_SUMMARY_CHAR_CAP", 2000)
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            context_token_budget: default_context_token_budget(),
            max_per_phase: default_max_per_phase(),
            max_facts: default_max_facts(),
            summary_char_cap: default_summary_char_cap(),
        }
    }
}

/// `OPENROUTER_*` "tool/circuit" knobs, feeding `voice_agent_llm::ToolEngineConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEngineSettings {
    #[serde(default = "default_tool_budget")]
    pub tool_budget_per_interaction: u32,
    #[serde(default = "default_max_tool_loops")]
    pub max_tool_loops: u32,
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: usize,
    #[serde(default = "default_circuit_window_s")]
    pub circuit_window_s: u64,
    #[serde(default = "default_circuit_cooldown_s")]
    pub circuit_cooldown_s: u64,
    #[serde(default = "default_tool_idempotency_ttl_s")]
    pub idempotency_ttl_s: u64,
}

fn default_tool_budget() -> u32 {
    env_u32("OPENROUTER_TOOL_BUDGET_PER_INTERACTION", 8)
}
fn default_max_tool_loops() -> u32 {
    env_u32("OPENROUTER_TOOL_MAX_LOOPS", 4)
}
fn default_circuit_failure_threshold() -> usize {
    env_usize("OPENROUTER_CIRCUIT_FAILURE_THRESHOLD", 5)
}
fn default_circuit_window_s() -> u64 {
    env_u64("OPENROUTER_CIRCUIT_WINDOW_S", 60)
}
fn default_circuit_cooldown_s() -> u64 {
    env_u64("OPENROUTER_CIRCUIT_COOLDOWN_S", 30)
}
fn default_tool_idempotency_ttl_s() -> u64 {
    env_u64("OPENROUTER_TOOL_IDEMPOTENCY_TTL_S", 300)
}

impl Default for ToolEngineSettings {
    fn default() -> Self {
        Self {
            tool_budget_per_interaction: default_tool_budget(),
            max_tool_loops: default_max_tool_loops(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_window_s: default_circuit_window_s(),
            circuit_cooldown_s: default_circuit_cooldown_s(),
            idempotency_ttl_s: default_tool_idempotency_ttl_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencySettings {
    #[serde(default = "default_consistency_threshold")]
    pub threshold: f32,
    #[serde(default = "default_max_words_under_urgency")]
    pub max_words_under_urgency: usize,
}

fn default_consistency_threshold() -> f32 {
    env_f32("OPENROUTER_CONSISTENCY_THRESHOLD", 0.6)
}
fn default_max_words_under_urgency() -> usize {
    env_usize("OPENROUTER_CONSISTENCY_MAX_WORDS_UNDER_URGENCY", 25)
}

impl Default for ConsistencySettings {
    fn default() -> Self {
        Self { threshold: default_consistency_threshold(), max_words_under_urgency: default_max_words_under_urgency() }
    }
}

/// `OPENROUTER_*`/`CALL_SLO_*` latency SLO thresholds, read by observability
/// (L7) to classify a turn as within or breaching its budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloConfig {
    #[serde(default = "default_slo_first_token_ms")]
    pub first_token_ms: u64,
    #[serde(default = "default_slo_total_turn_ms")]
    pub total_turn_ms: u64,
    #[serde(default = "default_slo_window_minutes")]
    pub default_window_minutes: u32,
}

fn default_slo_first_token_ms() -> u64 {
    env_u64("CALL_SLO_FIRST_TOKEN_MS", 1200)
}
fn default_slo_total_turn_ms() -> u64 {
    env_u64("CALL_SLO_TOTAL_TURN_MS", 4000)
}
fn default_slo_window_minutes() -> u32 {
    env_u32("CALL_SLO_DEFAULT_WINDOW_MINUTES", 60)
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            first_token_ms: default_slo_first_token_ms(),
            total_turn_ms: default_slo_total_turn_ms(),
            default_window_minutes: default_slo_window_minutes(),
        }
    }
}

/// `CALL_JOB_*`: feeds `voice_agent_jobs::JobRunnerConfig` and
/// `voice_agent_jobs::webhook::WebhookConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsSettings {
    #[serde(default = "default_job_poll_interval_s")]
    pub poll_interval_s: u64,
    #[serde(default = "default_job_lease_s")]
    pub lease_s: u64,
    #[serde(default = "default_job_claim_batch")]
    pub claim_batch_size: u32,
    #[serde(default = "default_job_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_job_retry_max_ms")]
    pub retry_max_ms: u64,
    #[serde(default = "default_job_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_job_timeout_s")]
    pub timeout_s: u64,
    #[serde(default = "default_job_dlq_alert_threshold")]
    pub dlq_alert_threshold: u32,
    #[serde(default = "default_webhook_idempotency_ttl_s")]
    pub webhook_idempotency_ttl_s: u64,
    #[serde(default = "default_gather_dedupe_window_s")]
    pub gather_dedupe_window_s: u64,
}

fn default_job_poll_interval_s() -> u64 {
    env_u64("CALL_JOB_POLL_INTERVAL_S", 2)
}
fn default_job_lease_s() -> u64 {
    env_u64("CALL_JOB_LEASE_S", 30)
}
fn default_job_claim_batch() -> u32 {
    env_u32("CALL_JOB_CLAIM_BATCH", 10)
}
fn default_job_retry_base_ms() -> u64 {
    env_u64("CALL_JOB_RETRY_BASE_MS", 500)
}
fn default_job_retry_max_ms() -> u64 {
    env_u64("CALL_JOB_RETRY_MAX_MS", 300_000)
}
fn default_job_max_attempts() -> u32 {
    env_u32("CALL_JOB_MAX_ATTEMPTS", 5)
}
fn default_job_timeout_s() -> u64 {
    env_u64("CALL_JOB_TIMEOUT_S", 30)
}
fn default_job_dlq_alert_threshold() -> u32 {
    env_u32("CALL_JOB_DLQ_ALERT_THRESHOLD", 20)
}
fn default_webhook_idempotency_ttl_s() -> u64 {
    env_u64("CALL_JOB_WEBHOOK_IDEMPOTENCY_TTL_S", 86_400)
}
fn default_gather_dedupe_window_s() -> u64 {
    env_u64("CALL_JOB_GATHER_DEDUPE_WINDOW_S", 2)
}

impl Default for JobsSettings {
    fn default() -> Self {
        Self {
            poll_interval_s: default_job_poll_interval_s(),
            lease_s: default_job_lease_s(),
            claim_batch_size: default_job_claim_batch(),
            retry_base_ms: default_job_retry_base_ms(),
            retry_max_ms: default_job_retry_max_ms(),
            max_attempts: default_job_max_attempts(),
            timeout_s: default_job_timeout_s(),
            dlq_alert_threshold: default_job_dlq_alert_threshold(),
            webhook_idempotency_ttl_s: default_webhook_idempotency_ttl_s(),
            gather_dedupe_window_s: default_gather_dedupe_window_s(),
        }
    }
}

/// `KEYPAD_*`: feeds `voice_agent_digits::RecorderConfig` plus the digit
/// vault's tokenization key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigitsSettings {
    #[serde(default = "default_min_dtmf_gap_ms")]
    pub min_dtmf_gap_ms: i64,
    #[serde(default = "default_dtmf_encryption_key")]
    pub dtmf_encryption_key: Option<String>,
}

fn default_min_dtmf_gap_ms() -> i64 {
    env_u64("KEYPAD_MIN_DTMF_GAP_MS", 120) as i64
}
fn default_dtmf_encryption_key() -> Option<String> {
    env_opt_string("DTMF_ENCRYPTION_KEY")
}

impl Default for DigitsSettings {
    fn default() -> Self {
        Self { min_dtmf_gap_ms: default_min_dtmf_gap_ms(), dtmf_encryption_key: default_dtmf_encryption_key() }
    }
}

/// `PAYMENT_*`: card/payment-digit collection gating. Per spec.md's open
/// question on precedence, the kill switch is a hard override — when set it
/// disables payment DTMF collection regardless of the per-provider allow
/// flag (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "default_payment_allow_twilio")]
    pub allow_twilio: bool,
    #[serde(default)]
    pub kill_switch: bool,
}

fn default_payment_allow_twilio() -> bool {
    env_bool("PAYMENT_ALLOW_TWILIO", true)
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self { allow_twilio: default_payment_allow_twilio(), kill_switch: env_bool("PAYMENT_KILL_SWITCH", false) }
    }
}

impl PaymentConfig {
    /// Whether payment-profile digit collection may run on `provider`.
    pub fn allowed_on(&self, provider: &str) -> bool {
        if self.kill_switch {
            return false;
        }
        match provider {
            "twilio" => self.allow_twilio,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceMode {
    /// Default: digits tokenized/masked, recordings require explicit opt-in.
    Safe,
    /// Relaxed validation for local development only.
    DevInsecure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    #[serde(default = "default_compliance_mode")]
    pub mode: ComplianceMode,
    #[serde(default)]
    pub recording_enabled: bool,
}

fn default_compliance_mode() -> ComplianceMode {
    match std::env::var("CONFIG_COMPLIANCE_MODE").as_deref() {
        Ok("dev_insecure") => ComplianceMode::DevInsecure,
        _ => ComplianceMode::Safe,
    }
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self { mode: default_compliance_mode(), recording_enabled: env_bool("RECORDING_ENABLED", false) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    env_string("LOG_LEVEL", "info")
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_json: env_bool("LOG_JSON", false), metrics_enabled: default_true() }
    }
}

/// Loads settings from `config/{env}.yaml` / `config/default.yaml` layered
/// under environment variables, then validates.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();
    builder = builder.add_source(File::with_name("config/default").required(false));
    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }
    builder = builder.add_source(Environment::with_prefix("VOICE_AGENT").separator("__").try_parsing(true));

    let built = builder.build()?;
    // Fields absent from the file/`VOICE_AGENT__` layer fall back to their
    // `#[serde(default = "...")]` function, which reads the flat env var
    // (`TWILIO_ACCOUNT_SID`, etc.) directly, so the two layers compose
    // rather than one replacing the other.
    let settings: Settings = built.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_has_sane_server_port() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn payment_kill_switch_overrides_allow_flag() {
        let mut cfg = PaymentConfig { allow_twilio: true, kill_switch: false };
        assert!(cfg.allowed_on("twilio"));
        cfg.kill_switch = true;
        assert!(!cfg.allowed_on("twilio"));
    }

    #[test]
    fn validation_mode_parses_known_values() {
        assert_eq!("strict".parse::<ValidationMode>().unwrap(), ValidationMode::Strict);
        assert_eq!("WARN".parse::<ValidationMode>().unwrap(), ValidationMode::Warn);
        assert!("nonsense".parse::<ValidationMode>().is_err());
    }

    #[test]
    fn production_requires_api_secret() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.server.auth.api_secret = None;
        settings.providers.twilio.account_sid = Some("AC123".to_string());
        settings.providers.twilio.auth_token = Some("tok".to_string());
        settings.providers.twilio.from_number = Some("+15551234567".to_string());
        settings.openrouter.chat.api_key = Some("or-key".to_string());
        settings.deepgram.api_key = Some("dg-key".to_string());
        assert!(settings.validate().is_err());
    }
}
