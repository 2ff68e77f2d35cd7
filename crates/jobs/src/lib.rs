//! Durable job & webhook fabric (C5).

pub mod backoff;
pub mod error;
pub mod runner;
pub mod webhook;

pub use backoff::BackoffPolicy;
pub use error::JobsError;
pub use runner::{JobHandler, JobRunner, JobRunnerConfig};
pub use webhook::{sign, WebhookConfig, WebhookSender};
