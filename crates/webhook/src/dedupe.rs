//! Short-lived dedup windows for inbound webhook deliveries: duplicate
//! gather callbacks within 2s, and the longer `webhookIdempotencyTtlMs`
//! window for generically-keyed deliveries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

pub const GATHER_DEDUPE_WINDOW: Duration = Duration::from_secs(2);

pub struct DedupeWindow {
    seen: DashMap<String, DateTime<Utc>>,
    ttl: Duration,
}

impl DedupeWindow {
    pub fn new(ttl: Duration) -> Self {
        Self { seen: DashMap::new(), ttl }
    }

    /// Returns `true` if `key` was already seen within the window (i.e. this
    /// delivery is a duplicate to be dropped), else records it as seen.
    pub fn is_duplicate(&self, key: &str, now: DateTime<Utc>) -> bool {
        if let Some(seen_at) = self.seen.get(key) {
            if now.signed_duration_since(*seen_at) < chrono::Duration::from_std(self.ttl).unwrap_or_default() {
                return true;
            }
        }
        self.seen.insert(key.to_string(), now);
        false
    }

    /// Drop entries older than `ttl`. Call periodically to bound memory.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_default();
        self.seen.retain(|_, seen_at| now.signed_duration_since(*seen_at) < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_delivery_within_window_is_duplicate() {
        let window = DedupeWindow::new(GATHER_DEDUPE_WINDOW);
        let t0 = Utc::now();
        assert!(!window.is_duplicate("gather:CA1:p1:0", t0));
        assert!(window.is_duplicate("gather:CA1:p1:0", t0 + chrono::Duration::milliseconds(500)));
    }

    #[test]
    fn delivery_after_window_is_not_duplicate() {
        let window = DedupeWindow::new(GATHER_DEDUPE_WINDOW);
        let t0 = Utc::now();
        assert!(!window.is_duplicate("gather:CA1:p1:0", t0));
        assert!(!window.is_duplicate("gather:CA1:p1:0", t0 + chrono::Duration::seconds(3)));
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let window = DedupeWindow::new(Duration::from_secs(1));
        let t0 = Utc::now();
        window.is_duplicate("k", t0);
        window.sweep(t0 + chrono::Duration::seconds(5));
        assert!(!window.is_duplicate("k", t0 + chrono::Duration::seconds(5)));
    }
}
