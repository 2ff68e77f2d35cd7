//! Generic circuit breaker shared by the provider router and the tool engine.
//!
//! Sliding-window failure count over a fixed lookback; trips to open for a
//! cooldown once the threshold is crossed, then half-opens to probe.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitConfig {
    pub failure_threshold: usize,
    pub window: Duration,
    pub cooldown: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

struct Inner {
    failures: VecDeque<DateTime<Utc>>,
    open_until: Option<DateTime<Utc>>,
    half_open_probe_in_flight: bool,
}

/// Thread-safe, clone-and-share circuit breaker (wrap in `Arc` at the call site).
pub struct CircuitBreaker {
    config: CircuitConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                failures: VecDeque::new(),
                open_until: None,
                half_open_probe_in_flight: false,
            }),
        }
    }

    /// Returns the state as of `now`, without mutating failure history.
    pub fn state(&self, now: DateTime<Utc>) -> CircuitState {
        let inner = self.inner.lock();
        match inner.open_until {
            Some(until) if now < until => CircuitState::Open,
            Some(_) => CircuitState::HalfOpen,
            None => CircuitState::Closed,
        }
    }

    /// Call before attempting the guarded operation. Returns `false` if the
    /// circuit is open, or if it is half-open and a probe is already in
    /// flight (only one caller gets to probe at a time).
    pub fn allow(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();
        match inner.open_until {
            Some(until) if now < until => false,
            Some(_) => {
                if inner.half_open_probe_in_flight {
                    false
                } else {
                    inner.half_open_probe_in_flight = true;
                    true
                }
            }
            None => true,
        }
    }

    pub fn record_success(&self, _now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.failures.clear();
        inner.open_until = None;
        inner.half_open_probe_in_flight = false;
    }

    pub fn record_failure(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.half_open_probe_in_flight = false;
        inner.failures.push_back(now);
        let cutoff = now - chrono::Duration::from_std(self.config.window).unwrap_or_default();
        while inner.failures.front().is_some_and(|t| *t < cutoff) {
            inner.failures.pop_front();
        }
        if inner.failures.len() >= self.config.failure_threshold {
            inner.open_until =
                Some(now + chrono::Duration::from_std(self.config.cooldown).unwrap_or_default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold() {
        let cb = CircuitBreaker::new(CircuitConfig {
            failure_threshold: 3,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(10),
        });
        let t0 = Utc::now();
        assert_eq!(cb.state(t0), CircuitState::Closed);
        cb.record_failure(t0);
        cb.record_failure(t0);
        assert_eq!(cb.state(t0), CircuitState::Closed);
        cb.record_failure(t0);
        assert_eq!(cb.state(t0), CircuitState::Open);
    }

    #[test]
    fn half_open_allows_single_probe() {
        let cb = CircuitBreaker::new(CircuitConfig {
            failure_threshold: 1,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(10),
        });
        let t0 = Utc::now();
        cb.record_failure(t0);
        assert_eq!(cb.state(t0), CircuitState::Open);
        let t1 = t0 + chrono::Duration::seconds(11);
        assert_eq!(cb.state(t1), CircuitState::HalfOpen);
        assert!(cb.allow(t1));
        assert!(!cb.allow(t1));
        cb.record_success(t1);
        assert_eq!(cb.state(t1), CircuitState::Closed);
    }
}
