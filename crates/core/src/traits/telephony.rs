//! Duck-typed provider client traits (Twilio, Vonage, ...).
//!
//! The call orchestrator never matches on provider name; it only calls
//! these traits. Each concrete provider implements both, translating the
//! common shape into its own wire format (TwiML vs NCCO, etc.).

use async_trait::async_trait;
use crate::call::Direction;
use crate::Result;

#[derive(Debug, Clone)]
pub struct PlaceCallRequest {
    pub to: String,
    pub from: String,
    pub direction: Direction,
    pub webhook_url: String,
    pub status_callback_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaceCallResponse {
    pub call_sid: String,
    pub provider: String,
}

/// Telephony provider interface.
///
/// Implementations:
/// - `TwilioProvider`
/// - `VonageProvider`
#[async_trait]
pub trait TelephonyProvider: Send + Sync + 'static {
    /// Place an outbound call.
    async fn place_call(&self, req: PlaceCallRequest) -> Result<PlaceCallResponse>;

    /// Hang up an in-progress call.
    async fn hangup(&self, call_sid: &str) -> Result<()>;

    /// Push media (audio or DTMF prompt) to an in-progress call.
    async fn send_media(&self, call_sid: &str, media_url: &str) -> Result<()>;

    /// Replace the call's live control document (TwiML/NCCO) to redirect flow,
    /// e.g. to fall back to a `<Gather>` when the voice digit collector stalls.
    async fn update_control_document(&self, call_sid: &str, document: &str) -> Result<()>;

    /// Verify an inbound webhook's signature against this provider's scheme.
    fn verify_webhook(&self, signature: &str, url: &str, body: &[u8]) -> bool;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct SendSmsRequest {
    pub to: String,
    pub from: String,
    pub body: String,
}

/// SMS provider interface, used for OTP/fallback messaging and reconciliation.
#[async_trait]
pub trait SmsProvider: Send + Sync + 'static {
    async fn send(&self, req: SendSmsRequest) -> Result<String>;

    fn verify_webhook(&self, signature: &str, url: &str, body: &[u8]) -> bool;

    /// Reconcile delivery status for a previously sent message.
    async fn reconcile(&self, message_sid: &str) -> Result<String>;

    fn name(&self) -> &str;
}
