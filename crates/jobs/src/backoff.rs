//! Exponential backoff with jitter, shared by the job poller and webhook delivery.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base.as_millis().saturating_mul(1u128 << attempt.min(30));
        let capped = exp.min(self.max.as_millis());
        let jitter_ms = rand::thread_rng().gen_range(0..=(capped / 4).max(1));
        Duration::from_millis((capped + jitter_ms) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_max() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_secs(5),
        };
        let delay = policy.delay_for_attempt(20);
        assert!(delay <= Duration::from_secs(5) + Duration::from_secs(2));
    }

    #[test]
    fn grows_with_attempt() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_secs(60),
        };
        assert!(policy.delay_for_attempt(0) <= Duration::from_millis(125));
        assert!(policy.delay_for_attempt(4) >= Duration::from_millis(1500));
    }
}
