//! ProviderHealth — in-memory sliding-window failure tracking

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub provider: String,
    pub failures: Vec<DateTime<Utc>>,
    pub open_until: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            failures: Vec::new(),
            open_until: None,
            last_error_at: None,
            last_success_at: None,
        }
    }

    pub fn is_degraded(&self, now: DateTime<Utc>) -> bool {
        self.open_until.map(|until| now < until).unwrap_or(false)
    }
}
