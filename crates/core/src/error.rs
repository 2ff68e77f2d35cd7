//! Core error types
//!
//! Every crate in the workspace defines its own `thiserror` error enum and
//! converts into this top-level `Error` via `From`, the same composition the
//! rest of the workspace uses for its per-crate errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error taxonomy shared across the workspace.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    #[error("provider permanent error: {0}")]
    ProviderPermanent(String),

    #[error("model transient error: {0}")]
    ModelTransient(String),

    #[error("model permanent error: {0}")]
    ModelPermanent(String),

    #[error("tool validation error: {0}")]
    ToolValidation(String),

    #[error("tool circuit open for {tool_name}")]
    ToolCircuitOpen { tool_name: String },

    #[error("tool budget exceeded: {0}")]
    ToolBudgetExceeded(String),

    #[error("tool idempotency conflict: {0}")]
    ToolIdempotencyConflict(String),

    #[error("digit invalid: {0}")]
    DigitInvalid(String),

    #[error("digit collection timed out")]
    DigitTimeout,

    #[error("digit collection failed: {0}")]
    DigitFailed(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The error "kind" name, used for machine-readable API codes.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Auth(_) => "auth",
            Error::ProviderTransient(_) => "provider_transient",
            Error::ProviderPermanent(_) => "provider_permanent",
            Error::ModelTransient(_) => "model_transient",
            Error::ModelPermanent(_) => "model_permanent",
            Error::ToolValidation(_) => "tool_validation",
            Error::ToolCircuitOpen { .. } => "tool_circuit_open",
            Error::ToolBudgetExceeded(_) => "tool_budget_exceeded",
            Error::ToolIdempotencyConflict(_) => "tool_idempotency_conflict",
            Error::DigitInvalid(_) => "digit_invalid",
            Error::DigitTimeout => "digit_timeout",
            Error::DigitFailed(_) => "digit_failed",
            Error::StorageUnavailable(_) => "storage_unavailable",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether this error class should be retried locally.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ProviderTransient(_) | Error::ModelTransient(_))
    }

    /// Whether the caller should see a 4xx (vs. a retry/5xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::Auth(_) | Error::ToolValidation(_)
        )
    }
}
