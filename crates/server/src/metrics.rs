//! Process-local Prometheus metrics: installs the global recorder once at
//! startup and exposes it for the `/metrics` and `/api/observability/gpt`
//! routes. `voice_agent_turn_latency_ms` and `voice_agent_tool_calls_total`
//! are recorded where the latency/outcome is actually known (the turn
//! driver in `voice-agent-session`); this module only carries the counter
//! for failures observed at the HTTP boundary itself.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus recorder installs exactly once per process")
}

pub fn record_provider_failure(provider: &str) {
    metrics::counter!("voice_agent_provider_failures_total", "provider" => provider.to_string()).increment(1);
}
