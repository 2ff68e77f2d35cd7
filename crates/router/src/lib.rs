//! Provider router (C4): health-tracked failover across call/SMS providers
//! with a per-request/per-scope override window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use voice_agent_core::circuit::{CircuitBreaker, CircuitConfig, CircuitState};
use voice_agent_core::traits::Store;
use voice_agent_core::Result as CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Call,
    Sms,
}

#[derive(Debug, Clone)]
pub struct ProviderRegistration {
    pub name: String,
    pub configured: bool,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub error_window: Duration,
    pub error_threshold: usize,
    pub cooldown: Duration,
    pub provider_override_cooldown: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            error_window: Duration::from_secs(60),
            error_threshold: 3,
            cooldown: Duration::from_secs(30),
            provider_override_cooldown: Duration::from_secs(120),
        }
    }
}

struct Override {
    provider: String,
    until: DateTime<Utc>,
}

/// Registers configured providers per channel, tracks per-provider health via
/// a `CircuitBreaker`, and exposes scoped overrides installed after a
/// provider-specific DTMF (or similar) failure.
pub struct ProviderRouter {
    config: RouterConfig,
    providers: DashMap<Channel, Vec<ProviderRegistration>>,
    breakers: DashMap<(Channel, String), Arc<CircuitBreaker>>,
    last_failure: DashMap<(Channel, String), DateTime<Utc>>,
    overrides: RwLock<std::collections::HashMap<(Channel, String), Override>>,
}

impl ProviderRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            providers: DashMap::new(),
            breakers: DashMap::new(),
            last_failure: DashMap::new(),
            overrides: RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub fn register(&self, channel: Channel, name: impl Into<String>, configured: bool) {
        let name = name.into();
        self.providers
            .entry(channel)
            .or_default()
            .push(ProviderRegistration {
                name: name.clone(),
                configured,
            });
        self.breakers.entry((channel, name)).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(CircuitConfig {
                failure_threshold: self.config.error_threshold,
                window: self.config.error_window,
                cooldown: self.config.cooldown,
            }))
        });
    }

    fn breaker(&self, channel: Channel, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry((channel, name.to_string()))
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(CircuitConfig {
                    failure_threshold: self.config.error_threshold,
                    window: self.config.error_window,
                    cooldown: self.config.cooldown,
                }))
            })
            .clone()
    }

    /// Install a scope-local override (e.g. a call that just failed DTMF
    /// delivery on `provider`, forcing a different one for `provider_override_cooldown`).
    pub fn install_override(&self, channel: Channel, scope: impl Into<String>, provider: impl Into<String>) {
        let now = Utc::now();
        let until = now + chrono::Duration::from_std(self.config.provider_override_cooldown).unwrap_or_default();
        self.overrides.write().insert(
            (channel, scope.into()),
            Override {
                provider: provider.into(),
                until,
            },
        );
    }

    /// Select the active provider for `channel`, honoring any live scoped
    /// override, else the default-first-then-failover policy.
    pub fn select(&self, channel: Channel, scope: Option<&str>) -> Option<String> {
        let now = Utc::now();

        if let Some(scope) = scope {
            let overrides = self.overrides.read();
            if let Some(o) = overrides.get(&(channel, scope.to_string())) {
                if now < o.until {
                    return Some(o.provider.clone());
                }
            }
        }

        let registrations = self.providers.get(&channel)?;
        let configured: Vec<&ProviderRegistration> =
            registrations.iter().filter(|p| p.configured).collect();
        if configured.is_empty() {
            return None;
        }

        for p in &configured {
            let state = self.breaker(channel, &p.name).state(now);
            if state != CircuitState::Open {
                return Some(p.name.clone());
            }
        }

        // All degraded: pick the least-recently-failed to preserve liveness.
        configured
            .iter()
            .min_by_key(|p| {
                self.last_failure
                    .get(&(channel, p.name.clone()))
                    .map(|t| *t)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC)
            })
            .map(|p| p.name.clone())
    }

    pub fn record_success(&self, channel: Channel, name: &str) {
        self.breaker(channel, name).record_success(Utc::now());
    }

    pub fn record_failure(&self, channel: Channel, name: &str) {
        let now = Utc::now();
        self.breaker(channel, name).record_failure(now);
        self.last_failure.insert((channel, name.to_string()), now);
        metrics::counter!("voice_agent_provider_failures_total", "provider" => name.to_string()).increment(1);
        if self.breaker(channel, name).state(now) == CircuitState::Open {
            warn!(provider = name, ?channel, "provider marked degraded");
        } else {
            info!(provider = name, ?channel, "provider failure recorded");
        }
    }

    /// Snapshot current health into the durable store for the observability layer.
    pub async fn persist_health(&self, store: &dyn Store) -> CoreResult<()> {
        for entry in self.breakers.iter() {
            let (_, name) = entry.key();
            let mut health = store
                .get_provider_health(name)
                .await?
                .unwrap_or_else(|| voice_agent_core::ProviderHealth::new(name.clone()));
            let now = Utc::now();
            health.open_until = match entry.value().state(now) {
                CircuitState::Open => Some(now + chrono::Duration::seconds(1)),
                _ => None,
            };
            store.put_provider_health(&health).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_first_then_failover() {
        let router = ProviderRouter::new(RouterConfig {
            error_threshold: 1,
            ..RouterConfig::default()
        });
        router.register(Channel::Call, "twilio", true);
        router.register(Channel::Call, "vonage", true);

        assert_eq!(router.select(Channel::Call, None).as_deref(), Some("twilio"));
        router.record_failure(Channel::Call, "twilio");
        assert_eq!(router.select(Channel::Call, None).as_deref(), Some("vonage"));
    }

    #[test]
    fn scoped_override_wins() {
        let router = ProviderRouter::new(RouterConfig::default());
        router.register(Channel::Call, "twilio", true);
        router.register(Channel::Call, "vonage", true);
        router.install_override(Channel::Call, "CA123", "vonage");
        assert_eq!(
            router.select(Channel::Call, Some("CA123")).as_deref(),
            Some("vonage")
        );
        assert_eq!(router.select(Channel::Call, None).as_deref(), Some("twilio"));
    }

    #[test]
    fn all_degraded_picks_least_recently_failed() {
        let router = ProviderRouter::new(RouterConfig {
            error_threshold: 1,
            ..RouterConfig::default()
        });
        router.register(Channel::Call, "a", true);
        router.register(Channel::Call, "b", true);
        router.record_failure(Channel::Call, "a");
        std::thread::sleep(Duration::from_millis(2));
        router.record_failure(Channel::Call, "b");
        // `a` failed first, so it is least-recently-failed and wins.
        assert_eq!(router.select(Channel::Call, None).as_deref(), Some("a"));
    }
}
