//! Ties provider signature verification, event translation, and dedup
//! together into the single entry point the HTTP route layer calls.

use std::time::Duration;

use chrono::Utc;
use voice_agent_core::traits::TelephonyProvider;

use crate::dedupe::{DedupeWindow, GATHER_DEDUPE_WINDOW};
use crate::error::WebhookError;
use crate::events::{translate, ProviderEvent};

pub struct WebhookIngress {
    dedupe: DedupeWindow,
}

impl WebhookIngress {
    pub fn new(webhook_idempotency_ttl: Duration) -> Self {
        Self { dedupe: DedupeWindow::new(webhook_idempotency_ttl) }
    }

    pub fn with_gather_window() -> Self {
        Self::new(GATHER_DEDUPE_WINDOW)
    }

    /// Verify, translate, and dedupe one inbound webhook delivery. Returns
    /// `Ok(None)` for a duplicate delivery that should be acknowledged but
    /// otherwise dropped, `Ok(Some(event))` for a fresh one to act on.
    pub fn handle(
        &self,
        provider: &dyn TelephonyProvider,
        signature: &str,
        url: &str,
        body: &[u8],
    ) -> Result<Option<ProviderEvent>, WebhookError> {
        if signature.is_empty() {
            return Err(WebhookError::MissingSignature);
        }
        if !provider.verify_webhook(signature, url, body) {
            return Err(WebhookError::SignatureMismatch);
        }

        let parsed: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let event = translate(&parsed)?;

        if self.dedupe.is_duplicate(&event.dedupe_key(), Utc::now()) {
            return Ok(None);
        }
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AllowAllProvider;

    #[async_trait::async_trait]
    impl TelephonyProvider for AllowAllProvider {
        async fn place_call(
            &self,
            _req: voice_agent_core::traits::PlaceCallRequest,
        ) -> voice_agent_core::Result<voice_agent_core::traits::PlaceCallResponse> {
            unimplemented!()
        }
        async fn hangup(&self, _call_sid: &str) -> voice_agent_core::Result<()> {
            unimplemented!()
        }
        async fn send_media(&self, _call_sid: &str, _media_url: &str) -> voice_agent_core::Result<()> {
            unimplemented!()
        }
        async fn update_control_document(&self, _call_sid: &str, _document: &str) -> voice_agent_core::Result<()> {
            unimplemented!()
        }
        fn verify_webhook(&self, signature: &str, _url: &str, _body: &[u8]) -> bool {
            signature == "valid"
        }
        fn name(&self) -> &str {
            "test"
        }
    }

    #[test]
    fn rejects_bad_signature() {
        let ingress = WebhookIngress::with_gather_window();
        let provider = AllowAllProvider;
        let body = serde_json::json!({"event_type": "answered", "call_sid": "CA1"});
        let result = ingress.handle(&provider, "invalid", "https://x", body.to_string().as_bytes());
        assert!(matches!(result, Err(WebhookError::SignatureMismatch)));
    }

    #[test]
    fn second_gather_within_window_is_deduped() {
        let ingress = WebhookIngress::with_gather_window();
        let provider = AllowAllProvider;
        let body = serde_json::json!({
            "event_type": "gather_result",
            "call_sid": "CA1",
            "plan_id": "p1",
            "step_index": 0,
            "channel_session_id": "s1"
        })
        .to_string();

        let first = ingress.handle(&provider, "valid", "https://x", body.as_bytes()).unwrap();
        assert!(first.is_some());
        let second = ingress.handle(&provider, "valid", "https://x", body.as_bytes()).unwrap();
        assert!(second.is_none());
    }
}
