//! Core types and traits for the voice agent call-control plane.
//!
//! This crate provides the foundational types shared across every other
//! crate: the `Call`/`Job`/`DigitEvent`/... persisted record shapes, the
//! `CircuitBreaker` used by the provider router and tool engine, the
//! `TelephonyProvider`/`SmsProvider`/`Store` trait seams, and the crate's
//! error type.

pub mod audio;
pub mod error;
pub mod transcript;
pub mod traits;

// Call session runtime, digit collection, provider routing, job fabric
pub mod call;
pub mod call_state;
pub mod call_memory;
pub mod digit_event;
pub mod job;
pub mod tool_audit;
pub mod idempotency;
pub mod provider_health;
pub mod service_health_log;
pub mod circuit;

pub use audio::{AudioFrame, AudioEncoding, Channels, SampleRate};
pub use error::{Error, Result};
pub use transcript::{Transcript, Speaker, TranscriptResult, WordTimestamp};

pub use call::{Call, CallFilter, CallStatus, Direction};
pub use call_state::CallState;
pub use call_memory::CallMemory;
pub use digit_event::{DigitEvent, DigitSource};
pub use job::{Job, JobStatus};
pub use tool_audit::{ToolAudit, ToolAuditStatus};
pub use idempotency::{IdempotencyRecord, IdempotencyStatus, Reservation};
pub use provider_health::ProviderHealth;
pub use service_health_log::{ServiceHealthLog, ServiceHealthStatus};
pub use circuit::{CircuitBreaker, CircuitConfig, CircuitState};

pub use traits::{TelephonyProvider, SmsProvider, Store};
