//! Webhook ingress (L6): verifies provider signatures and translates
//! provider events into the normalized commands the call session runtime
//! and digit subsystem act on.

pub mod dedupe;
pub mod error;
pub mod events;
pub mod ingress;
pub mod verify;

pub use dedupe::{DedupeWindow, GATHER_DEDUPE_WINDOW};
pub use error::WebhookError;
pub use events::{translate, GatherCallback, ProviderEvent};
pub use ingress::WebhookIngress;
pub use verify::{verify_hmac, verify_request, MAX_TIMESTAMP_SKEW_SECS};
