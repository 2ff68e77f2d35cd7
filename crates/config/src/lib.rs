//! Configuration management for the voice agent
//!
//! Supports loading configuration from:
//! - YAML/TOML files
//! - Environment variables (VOICE_AGENT_ prefix)
//! - Runtime overrides

pub mod agent;
pub mod settings;

pub use agent::PersonaConfig;
pub use settings::{
    AuthConfig, ComplianceConfig, ComplianceMode, CorsConfig, DeepgramConfig, DigitsSettings, JobsSettings,
    OpenRouterSettings, PaymentConfig, ProviderHealthConfig, ProvidersConfig, RateLimitConfig, RuntimeEnvironment,
    ServerConfig, Settings, SloConfig, TwilioConfig, ValidationMode, load_settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
