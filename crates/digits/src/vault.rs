//! Tokenization of accepted sensitive digits so raw values never reach the
//! LLM context or transcript store.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

#[async_trait]
pub trait DigitVault: Send + Sync + 'static {
    /// Store `digits` and return its `vault://digits/{call_sid}/tok_{id}` token.
    async fn tokenize(&self, call_sid: &str, digits: &str) -> String;

    /// Resolve a token back to its raw digits. Callers are responsible for
    /// their own chat-ownership authentication before calling this.
    async fn resolve(&self, token: &str) -> Option<String>;
}

/// Process-local vault. A production deployment would back this with an
/// encrypted store keyed the same way; the token shape is stable either way.
#[derive(Default)]
pub struct InMemoryDigitVault {
    entries: DashMap<String, String>,
}

#[async_trait]
impl DigitVault for InMemoryDigitVault {
    async fn tokenize(&self, call_sid: &str, digits: &str) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let token = format!("vault://digits/{call_sid}/tok_{id}");
        self.entries.insert(token.clone(), digits.to_string());
        token
    }

    async fn resolve(&self, token: &str) -> Option<String> {
        self.entries.get(token).map(|v| v.clone())
    }
}

/// Mask a digit string for the LLM/operator view: `******` when fully
/// opaque, `****1234` when trailing digits are allowed (card-style display).
pub fn mask(digits: &str, show_last: usize) -> String {
    if show_last == 0 || digits.len() <= show_last {
        "*".repeat(digits.len().max(4))
    } else {
        let (hidden, tail) = digits.split_at(digits.len() - show_last);
        format!("{}{}", "*".repeat(hidden.len()), tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokenize_then_resolve_roundtrips() {
        let vault = InMemoryDigitVault::default();
        let token = vault.tokenize("CA1", "4111111111111111").await;
        assert!(token.starts_with("vault://digits/CA1/tok_"));
        assert_eq!(vault.resolve(&token).await.as_deref(), Some("4111111111111111"));
    }

    #[test]
    fn mask_shows_only_trailing_digits() {
        assert_eq!(mask("4111111111111111", 4), "************1111");
        assert_eq!(mask("1234", 0), "****");
    }
}
