//! Concrete tool implementations available to the turn engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use voice_agent_core::traits::TelephonyProvider;
use voice_agent_digits::DigitManager;
use voice_agent_router::{Channel, ProviderRouter};

use crate::mcp::{ContentBlock, Tool, ToolClass, ToolError, ToolOutput, ToolSchema};

/// Per-channel map from provider name to its live client, looked up after
/// `ProviderRouter::select` names the provider to use.
#[derive(Default, Clone)]
pub struct ProviderClients {
    telephony: HashMap<String, Arc<dyn TelephonyProvider>>,
}

impl ProviderClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_telephony(&mut self, provider: Arc<dyn TelephonyProvider>) {
        self.telephony.insert(provider.name().to_string(), provider);
    }

    pub fn telephony(&self, name: &str) -> Option<Arc<dyn TelephonyProvider>> {
        self.telephony.get(name).cloned()
    }
}

/// Starts (or continues) DTMF collection against a named profile, clamping
/// `min_digits`/`max_digits` to a sane range before handing off to the
/// digit-collection subsystem.
pub struct CollectDigitsTool {
    manager: Arc<DigitManager>,
}

impl CollectDigitsTool {
    pub fn new(manager: Arc<DigitManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for CollectDigitsTool {
    fn name(&self) -> &str {
        "collect_digits"
    }

    fn class(&self) -> ToolClass {
        ToolClass::Capture
    }

    fn timeout_secs(&self) -> u64 {
        120
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Begin collecting DTMF digits from the caller for a named profile."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "call_sid": { "type": "string" },
                    "profile": { "type": "string" },
                    "min_digits": { "type": "integer", "minimum": 1 },
                    "max_digits": { "type": "integer", "minimum": 1 }
                },
                "required": ["call_sid", "profile"]
            }),
        }
    }

    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        let obj = arguments
            .as_object()
            .ok_or_else(|| ToolError::InvalidArguments("arguments must be an object".into()))?;
        if !obj.get("call_sid").is_some_and(|v| v.is_string()) {
            return Err(ToolError::InvalidArguments("call_sid is required".into()));
        }
        if !obj.get("profile").is_some_and(|v| v.is_string()) {
            return Err(ToolError::InvalidArguments("profile is required".into()));
        }
        Ok(())
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let call_sid = arguments["call_sid"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("call_sid is required".into()))?;
        let profile = arguments["profile"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("profile is required".into()))?;

        // min_digits/max_digits overrides aren't wired into DigitManager's
        // profile table yet; clamp here so a misbehaving caller can't send
        // an inverted range even though the profile defaults win today.
        let min_digits = arguments.get("min_digits").and_then(|v| v.as_u64()).unwrap_or(1).max(1);
        let max_digits = arguments
            .get("max_digits")
            .and_then(|v| v.as_u64())
            .unwrap_or(min_digits)
            .max(min_digits);

        let (resolved, downgraded) = self.manager.set_expectation(call_sid, profile, true);

        Ok(ToolOutput {
            content: vec![ContentBlock::Json {
                value: json!({
                    "status": "collecting",
                    "profile": resolved,
                    "downgraded": downgraded,
                    "min_digits": min_digits,
                    "max_digits": max_digits,
                }),
            }],
        })
    }
}

/// Hangs up the current call via whichever provider the router currently
/// selects for the `Call` channel.
pub struct HangupTool {
    router: Arc<ProviderRouter>,
    clients: ProviderClients,
}

impl HangupTool {
    pub fn new(router: Arc<ProviderRouter>, clients: ProviderClients) -> Self {
        Self { router, clients }
    }
}

#[async_trait]
impl Tool for HangupTool {
    fn name(&self) -> &str {
        "hangup_call"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "End the current call.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": { "call_sid": { "type": "string" } },
                "required": ["call_sid"]
            }),
        }
    }

    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        if !arguments.get("call_sid").is_some_and(|v| v.is_string()) {
            return Err(ToolError::InvalidArguments("call_sid is required".into()));
        }
        Ok(())
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let call_sid = arguments["call_sid"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("call_sid is required".into()))?;

        let provider_name = self
            .router
            .select(Channel::Call, Some(call_sid))
            .ok_or_else(|| ToolError::ExecutionFailed("no telephony provider available".into()))?;

        let client = self
            .clients
            .telephony(&provider_name)
            .ok_or_else(|| ToolError::ExecutionFailed(format!("no client registered for {provider_name}")))?;

        client
            .hangup(call_sid)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        self.router.record_success(Channel::Call, &provider_name);
        Ok(ToolOutput::text("call ended"))
    }
}

/// Redirects the call's live control document to transfer it to another
/// number, e.g. escalation to a human agent.
pub struct TransferCallTool {
    router: Arc<ProviderRouter>,
    clients: ProviderClients,
}

impl TransferCallTool {
    pub fn new(router: Arc<ProviderRouter>, clients: ProviderClients) -> Self {
        Self { router, clients }
    }
}

#[async_trait]
impl Tool for TransferCallTool {
    fn name(&self) -> &str {
        "transfer_call"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Transfer the current call to another number.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "call_sid": { "type": "string" },
                    "to": { "type": "string" }
                },
                "required": ["call_sid", "to"]
            }),
        }
    }

    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        if !arguments.get("call_sid").is_some_and(|v| v.is_string()) {
            return Err(ToolError::InvalidArguments("call_sid is required".into()));
        }
        if !arguments.get("to").is_some_and(|v| v.is_string()) {
            return Err(ToolError::InvalidArguments("to is required".into()));
        }
        Ok(())
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let call_sid = arguments["call_sid"].as_str().unwrap();
        let to = arguments["to"].as_str().unwrap();

        let provider_name = self
            .router
            .select(Channel::Call, Some(call_sid))
            .ok_or_else(|| ToolError::ExecutionFailed("no telephony provider available".into()))?;

        let client = self
            .clients
            .telephony(&provider_name)
            .ok_or_else(|| ToolError::ExecutionFailed(format!("no client registered for {provider_name}")))?;

        let document = format!(r#"{{"action":"dial","to":"{to}"}}"#);
        client
            .update_control_document(call_sid, &document)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        self.router.record_success(Channel::Call, &provider_name);
        Ok(ToolOutput::text(format!("transferring to {to}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_digits::RecorderConfig;
    use voice_agent_digits::InMemoryDigitVault;

    #[tokio::test]
    async fn collect_digits_clamps_and_starts() {
        let manager = Arc::new(DigitManager::new(
            Arc::new(InMemoryDigitVault::default()),
            RecorderConfig::default(),
        ));
        let tool = CollectDigitsTool::new(manager.clone());
        let out = tool
            .execute(json!({"call_sid": "CA1", "profile": "otp", "max_digits": 2, "min_digits": 4}))
            .await
            .unwrap();
        assert!(manager.has_expectation("CA1"));
        let text = out.as_text();
        assert!(text.contains("\"min_digits\":4"));
        assert!(text.contains("\"max_digits\":4"));
    }
}
