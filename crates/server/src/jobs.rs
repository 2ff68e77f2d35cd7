//! Job handlers registered with the C5 runner. `outbound_call` is the only
//! kind the control plane itself produces (from `POST /outbound-call`);
//! everything else (status polling, reconciliation) is left to whichever
//! concrete provider client is wired into `ProviderClients`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use voice_agent_core::call::{CallStatus, Direction};
use voice_agent_core::traits::{PlaceCallRequest, Store};
use voice_agent_jobs::JobHandler;
use voice_agent_router::{Channel, ProviderRouter};
use voice_agent_tools::ProviderClients;

#[derive(Debug, Deserialize)]
struct OutboundCallPayload {
    call_sid: String,
    to: String,
    from: String,
    webhook_url: String,
    status_callback_url: Option<String>,
}

pub struct OutboundCallHandler {
    store: Arc<dyn Store>,
    router: Arc<ProviderRouter>,
    clients: ProviderClients,
}

impl OutboundCallHandler {
    pub fn new(store: Arc<dyn Store>, router: Arc<ProviderRouter>, clients: ProviderClients) -> Self {
        Self { store, router, clients }
    }
}

#[async_trait]
impl JobHandler for OutboundCallHandler {
    async fn handle(&self, job: &voice_agent_core::job::Job) -> Result<(), String> {
        let payload: OutboundCallPayload =
            serde_json::from_value(job.payload.clone()).map_err(|e| format!("malformed outbound_call payload: {e}"))?;

        let provider_name = self
            .router
            .select(Channel::Call, Some(&payload.call_sid))
            .ok_or_else(|| "no configured call provider is healthy".to_string())?;

        let client = self.clients.telephony(&provider_name).ok_or_else(|| {
            format!("provider '{provider_name}' is registered but no telephony client is wired in for it")
        })?;

        let result = client
            .place_call(PlaceCallRequest {
                to: payload.to,
                from: payload.from,
                direction: Direction::Outbound,
                webhook_url: payload.webhook_url,
                status_callback_url: payload.status_callback_url,
            })
            .await;

        match result {
            Ok(_response) => {
                self.router.record_success(Channel::Call, &provider_name);
                self.store
                    .transition_call(&payload.call_sid, CallStatus::Ringing)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(())
            }
            Err(e) => {
                self.router.record_failure(Channel::Call, &provider_name);
                Err(e.to_string())
            }
        }
    }
}
