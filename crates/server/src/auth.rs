//! Authentication middleware.
//!
//! Admin routes (`/outbound-call`, `/api/calls*`) are protected by a bearer
//! token held in `AuthConfig::api_secret`; provider webhook routes are
//! verified separately per request via HMAC (see `http::verify_webhook`),
//! since they carry a provider-issued signature rather than a bearer token.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;

static AUTH_DISABLED_WARNED: AtomicBool = AtomicBool::new(false);

enum AuthCheck {
    Disabled,
    PublicPath,
    ConfigError(&'static str),
    CheckSecret(String),
}

fn check_auth_config(state: &AppState, path: &str) -> AuthCheck {
    let auth = &state.settings.server.auth;

    if !auth.enabled {
        if !AUTH_DISABLED_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!("API authentication is DISABLED; set server.auth.enabled for production");
        }
        return AuthCheck::Disabled;
    }

    if auth.public_paths.iter().any(|p| path.starts_with(p.as_str())) {
        return AuthCheck::PublicPath;
    }

    match &auth.api_secret {
        Some(secret) if !secret.is_empty() => AuthCheck::CheckSecret(secret.clone()),
        _ => AuthCheck::ConfigError("auth is enabled but no api_secret is configured"),
    }
}

/// Bearer-token middleware for operator-facing admin routes.
pub async fn auth_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();

    match check_auth_config(&state, &path) {
        AuthCheck::Disabled | AuthCheck::PublicPath => next.run(request).await,
        AuthCheck::ConfigError(msg) => {
            tracing::error!("{msg}");
            (StatusCode::INTERNAL_SERVER_ERROR, "server authentication not configured").into_response()
        }
        AuthCheck::CheckSecret(expected) => {
            let provided = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            match provided {
                Some(header) if header.starts_with("Bearer ") => {
                    if constant_time_compare(header[7..].as_bytes(), expected.as_bytes()) {
                        next.run(request).await
                    } else {
                        tracing::warn!(path = %path, "rejected request with invalid bearer token");
                        (StatusCode::UNAUTHORIZED, "invalid API secret").into_response()
                    }
                }
                Some(_) => (StatusCode::BAD_REQUEST, "expected Authorization: Bearer <token>").into_response(),
                None => (StatusCode::UNAUTHORIZED, "missing Authorization header").into_response(),
            }
        }
    }
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_compare_matches_equal_strings() {
        assert!(constant_time_compare(b"secret", b"secret"));
    }

    #[test]
    fn constant_time_compare_rejects_different_lengths() {
        assert!(!constant_time_compare(b"secret", b"secre"));
    }

    #[test]
    fn constant_time_compare_rejects_same_length_mismatch() {
        assert!(!constant_time_compare(b"secret", b"secreT"));
    }
}
