//! Outbound signed webhook delivery, deduped by idempotency key, retried
//! with the same backoff policy as the job loop.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

use voice_agent_core::idempotency::{IdempotencyRecord, IdempotencyStatus, Reservation};
use voice_agent_core::traits::Store;

use crate::backoff::BackoffPolicy;
use crate::error::JobsError;

type HmacSha256 = Hmac<Sha256>;

pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b"|");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub api_secret: String,
    pub idempotency_ttl: Duration,
    pub retry_max_attempts: u32,
    pub backoff: BackoffPolicy,
}

pub struct WebhookSender {
    http: reqwest::Client,
    store: Arc<dyn Store>,
    config: WebhookConfig,
}

impl WebhookSender {
    pub fn new(store: Arc<dyn Store>, config: WebhookConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            store,
            config,
        }
    }

    /// Deliver `body` to `url` under `idempotency_key`, retrying on failure
    /// up to `retry_max_attempts`. Returns `Ok(())` once the receiver
    /// acknowledges with a 2xx, or on observing the key already delivered.
    pub async fn deliver(&self, url: &str, idempotency_key: &str, body: serde_json::Value) -> Result<(), JobsError> {
        let expires_at = Utc::now() + chrono::Duration::from_std(self.config.idempotency_ttl).unwrap_or_default();
        match self
            .store
            .reserve_idempotency(idempotency_key, expires_at)
            .await
            .map_err(|e| JobsError::Delivery(e.to_string()))?
        {
            Reservation::Existing(record) if record.status == IdempotencyStatus::Ok => return Ok(()),
            Reservation::Existing(_) | Reservation::Reserved => {}
        }

        let payload = serde_json::to_vec(&body).map_err(|e| JobsError::Delivery(e.to_string()))?;
        let mut last_err = String::new();

        for attempt in 0..self.config.retry_max_attempts {
            let timestamp = Utc::now().timestamp();
            let signature = sign(&self.config.api_secret, timestamp, &payload);

            let result = self
                .http
                .post(url)
                .header("X-Signature", signature)
                .header("X-Timestamp", timestamp.to_string())
                .header("Idempotency-Key", idempotency_key)
                .header("Content-Type", "application/json")
                .body(payload.clone())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    self.store
                        .complete_idempotency(
                            idempotency_key,
                            IdempotencyRecord {
                                key: idempotency_key.to_string(),
                                status: IdempotencyStatus::Ok,
                                response: None,
                                expires_at,
                            },
                        )
                        .await
                        .map_err(|e| JobsError::Delivery(e.to_string()))?;
                    return Ok(());
                }
                Ok(resp) => last_err = format!("http status {}", resp.status()),
                Err(e) => last_err = e.to_string(),
            }

            tokio::time::sleep(self.config.backoff.delay_for_attempt(attempt)).await;
        }

        self.store
            .complete_idempotency(
                idempotency_key,
                IdempotencyRecord {
                    key: idempotency_key.to_string(),
                    status: IdempotencyStatus::Failed,
                    response: None,
                    expires_at,
                },
            )
            .await
            .map_err(|e| JobsError::Delivery(e.to_string()))?;
        Err(JobsError::Delivery(last_err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic() {
        let a = sign("secret", 1000, b"body");
        let b = sign("secret", 1000, b"body");
        assert_eq!(a, b);
        let c = sign("secret", 1001, b"body");
        assert_ne!(a, c);
    }
}
