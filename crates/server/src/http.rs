//! HTTP endpoints: the inbound surface that turns operator requests and
//! provider webhooks into calls on the call session runtime, provider
//! router, and job fabric.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use voice_agent_core::call::{Call, CallFilter, CallStatus, Direction};
use voice_agent_core::job::Job;
use voice_agent_core::DigitSource;
use voice_agent_digits::apply_recorded_outcome;
use voice_agent_webhook::{translate, verify_request, ProviderEvent};

use crate::auth::auth_middleware;
use crate::state::AppState;
use crate::ServerError;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings.server.cors);

    let admin = Router::new()
        .route("/outbound-call", post(outbound_call))
        .route("/api/calls", get(list_calls))
        .route("/api/calls/list", get(list_calls))
        .route("/api/calls/search", get(search_calls))
        .route("/api/calls/:call_sid", get(get_call))
        .route("/api/calls/:call_sid/status", get(get_call_status))
        .route("/api/calls/:call_sid/transcript/audio", get(get_transcript_audio))
        .route("/api/observability/gpt", get(observability_gpt))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let webhooks = Router::new()
        .route("/webhook/:provider/:kind", post(provider_webhook))
        .route("/webhook/sms-status", post(sms_status_webhook))
        .route("/webhook/telegram", post(telegram_webhook));

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/status", get(status))
        .route("/metrics", get(metrics_snapshot))
        .merge(admin)
        .merge(webhooks)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(cors: &voice_agent_config::CorsConfig) -> CorsLayer {
    if !cors.enabled {
        tracing::warn!("CORS is disabled, allowing all origins");
        return CorsLayer::permissive();
    }
    if cors.origins.is_empty() {
        tracing::info!("no CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = cors
        .origins
        .iter()
        .filter_map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|_| tracing::warn!(origin = %o, "invalid CORS origin, skipping"))
                .ok()
        })
        .collect();
    if origins.is_empty() {
        tracing::error!("all configured CORS origins are invalid, falling back to localhost");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

// ---------------------------------------------------------------------
// Health / readiness / status
// ---------------------------------------------------------------------

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "version": env!("CARGO_PKG_VERSION") }))
}

async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.get_call("__readiness_probe__").await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "error": e.to_string() })),
        ),
    }
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "environment": format!("{:?}", state.settings.environment),
        "sessions": state.sessions.count().await,
        "call_provider": state.settings.providers.call_provider,
    }))
}

async fn metrics_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
struct ObservabilityQuery {
    #[serde(default = "default_window_minutes")]
    window_minutes: u32,
}

fn default_window_minutes() -> u32 {
    60
}

async fn observability_gpt(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ObservabilityQuery>,
) -> Result<impl IntoResponse, ServerError> {
    if !(1..=1440).contains(&q.window_minutes) {
        return Err(ServerError::InvalidRequest("window_minutes must be in 1..=1440".to_string()));
    }
    // No time-series store backs this beyond the process-local Prometheus
    // registry, so the window is accepted but the snapshot is instantaneous.
    Ok(Json(json!({
        "window_minutes": q.window_minutes,
        "model": state.settings.openrouter.chat.model,
        "backup_model": state.settings.openrouter.chat.backup_model,
        "metrics": state.metrics.render(),
    })))
}

// ---------------------------------------------------------------------
// POST /outbound-call
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OutboundCallRequest {
    number: String,
    prompt: String,
    first_message: String,
    user_chat_id: Option<String>,
    customer_name: Option<String>,
    business_id: Option<String>,
    #[allow(dead_code)]
    script: Option<String>,
    #[allow(dead_code)]
    purpose: Option<String>,
    #[allow(dead_code)]
    emotion: Option<String>,
    #[allow(dead_code)]
    urgency: Option<String>,
    #[allow(dead_code)]
    technical_level: Option<String>,
    #[allow(dead_code)]
    voice_model: Option<String>,
    collection_profile: Option<String>,
    #[allow(dead_code)]
    collection_expected_length: Option<usize>,
    #[allow(dead_code)]
    collection_timeout_s: Option<u64>,
    #[allow(dead_code)]
    collection_max_retries: Option<u32>,
    #[allow(dead_code)]
    collection_mask_for_gpt: Option<bool>,
    #[allow(dead_code)]
    collection_speak_confirmation: Option<bool>,
}

#[derive(Debug, Serialize)]
struct OutboundCallResponse {
    success: bool,
    call_sid: String,
    to: String,
    status: CallStatus,
    provider: String,
    business_context: Option<String>,
    generated_functions: usize,
    function_types: Vec<String>,
    enhanced_webhooks: Vec<String>,
}

async fn outbound_call(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OutboundCallRequest>,
) -> Result<Json<OutboundCallResponse>, ServerError> {
    if req.prompt.chars().count() > 12_000 {
        return Err(ServerError::InvalidRequest("prompt exceeds 12000 characters".to_string()));
    }
    if req.first_message.chars().count() > 1_000 {
        return Err(ServerError::InvalidRequest("first_message exceeds 1000 characters".to_string()));
    }

    let provider_name = state.router.select(voice_agent_router::Channel::Call, None).ok_or_else(|| {
        crate::metrics::record_provider_failure("none_available");
        ServerError::Internal("no configured call provider is healthy".to_string())
    })?;

    let call_sid = format!("CA{}", uuid::Uuid::new_v4().simple());
    let mut call = Call::new(
        call_sid.clone(),
        provider_name.clone(),
        Direction::Outbound,
        req.number.clone(),
        req.prompt.clone(),
        req.first_message.clone(),
    );
    call.user_chat_id = req.user_chat_id.clone();
    call.customer_name = req.customer_name.clone();
    call.business_context = req.business_id.clone();

    state
        .store
        .insert_call(&call)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    if let Some(profile) = &req.collection_profile {
        state.digits.set_expectation(&call_sid, profile, true);
    }

    let host = &state.settings.server.host;
    let webhook_url = format!("https://{host}/webhook/{provider_name}/voice?callSid={call_sid}");
    let payload = json!({
        "call_sid": call_sid,
        "to": req.number,
        "from": state.settings.providers.twilio.from_number,
        "webhook_url": webhook_url,
        "status_callback_url": format!("https://{host}/webhook/{provider_name}/status?callSid={call_sid}"),
    });
    state
        .store
        .enqueue_job(&Job::new("outbound_call", payload, state.settings.jobs.max_attempts))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    Ok(Json(OutboundCallResponse {
        success: true,
        call_sid,
        to: req.number,
        status: CallStatus::Queued,
        provider: provider_name,
        business_context: req.business_id,
        generated_functions: state.function_types.len(),
        function_types: state.function_types.clone(),
        enhanced_webhooks: vec![webhook_url],
    }))
}

// ---------------------------------------------------------------------
// GET /api/calls, /api/calls/list, /api/calls/search
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListCallsQuery {
    limit: Option<u32>,
    offset: Option<u32>,
    status: Option<String>,
    phone: Option<String>,
    since: Option<chrono::DateTime<chrono::Utc>>,
    until: Option<chrono::DateTime<chrono::Utc>>,
}

fn parse_status(s: &str) -> Result<CallStatus, ServerError> {
    match s {
        "queued" => Ok(CallStatus::Queued),
        "ringing" => Ok(CallStatus::Ringing),
        "in-progress" | "in_progress" => Ok(CallStatus::InProgress),
        "completed" => Ok(CallStatus::Completed),
        "failed" => Ok(CallStatus::Failed),
        "no-answer" | "no_answer" => Ok(CallStatus::NoAnswer),
        "busy" => Ok(CallStatus::Busy),
        "canceled" => Ok(CallStatus::Canceled),
        other => Err(ServerError::InvalidRequest(format!("unknown status '{other}'"))),
    }
}

async fn list_calls(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListCallsQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let limit = q.limit.unwrap_or(20).clamp(1, 50);
    let filter = CallFilter {
        status: q.status.as_deref().map(parse_status).transpose()?,
        phone_number: q.phone,
        since: q.since,
        until: q.until,
        limit,
        offset: q.offset.unwrap_or(0),
    };
    let calls = state.store.list_calls(&filter).await.map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(Json(json!({ "calls": calls, "count": calls.len() })))
}

#[derive(Debug, Deserialize)]
struct SearchCallsQuery {
    q: String,
}

async fn search_calls(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SearchCallsQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let len = q.q.chars().count();
    if !(2..=120).contains(&len) {
        return Err(ServerError::InvalidRequest("q must be 2-120 characters".to_string()));
    }
    let calls = state.store.search_calls(&q.q, 50).await.map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(Json(json!({ "calls": calls, "count": calls.len() })))
}

async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> Result<Json<Call>, ServerError> {
    state
        .store
        .get_call(&call_sid)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(call_sid))
}

async fn get_call_status(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let call = state
        .store
        .get_call(&call_sid)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .ok_or_else(|| ServerError::NotFound(call_sid.clone()))?;
    Ok(Json(json!({ "call_sid": call.call_sid, "status": call.status })))
}

async fn get_transcript_audio(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    if !state.settings.compliance.recording_enabled {
        return Err(ServerError::InvalidRequest("recording is disabled".to_string()));
    }
    let recording = state
        .store
        .latest_call_state(&call_sid, "recording_url")
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    match recording {
        Some(call_state) => Ok((StatusCode::OK, Json(json!({ "status": "ready", "url": call_state.data }))).into_response()),
        None => Ok((StatusCode::ACCEPTED, Json(json!({ "status": "pending" }))).into_response()),
    }
}

// ---------------------------------------------------------------------
// Provider webhooks
// ---------------------------------------------------------------------

fn validation_mode_for(state: &AppState, provider: &str) -> voice_agent_config::ValidationMode {
    match provider {
        "twilio" => state.settings.providers.twilio.webhook_validation,
        "vonage" => state.settings.providers.vonage.webhook_validation,
        "aws_connect" | "aws-connect" => state.settings.providers.aws_connect.webhook_validation,
        _ => voice_agent_config::ValidationMode::Warn,
    }
}

/// Verifies the shared HMAC envelope described in the outbound webhook spec,
/// applying `mode`'s strict/warn/off policy. `strict` rejects; `warn` logs
/// and proceeds; `off` skips verification entirely.
fn verify_inbound(state: &AppState, mode: voice_agent_config::ValidationMode, headers: &HeaderMap, body: &[u8]) -> Result<(), ServerError> {
    if matches!(mode, voice_agent_config::ValidationMode::Off) {
        return Ok(());
    }
    let secret = state.settings.server.auth.api_secret.clone().unwrap_or_default();
    let timestamp = headers
        .get("X-Timestamp")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());
    let signature = headers.get("X-Signature").and_then(|v| v.to_str().ok());

    let result = match (timestamp, signature) {
        (Some(ts), Some(sig)) => verify_request(&secret, chrono::Utc::now().timestamp(), ts, body, sig),
        _ => Err(voice_agent_webhook::WebhookError::MissingSignature),
    };

    match (mode, result) {
        (_, Ok(())) => Ok(()),
        (voice_agent_config::ValidationMode::Strict, Err(e)) => {
            crate::metrics::record_provider_failure("webhook_verification");
            Err(ServerError::Auth(format!("webhook signature verification failed: {e}")))
        }
        (voice_agent_config::ValidationMode::Warn, Err(e)) => {
            tracing::warn!(error = %e, "webhook signature invalid, proceeding under warn mode");
            Ok(())
        }
        (voice_agent_config::ValidationMode::Off, _) => unreachable!(),
    }
}

async fn dispatch_event(state: &AppState, event: ProviderEvent) -> Result<(), ServerError> {
    match &event {
        ProviderEvent::Answered { call_sid } => {
            state.store.transition_call(call_sid, CallStatus::InProgress).await.map_err(|e| ServerError::Internal(e.to_string()))?;
            state
                .sessions
                .create(call_sid, voice_agent_session::SessionConfig::default())
                .await
                .map_err(|e| ServerError::Session(e.to_string()))?;
        }
        ProviderEvent::Hangup { call_sid, .. } => {
            state.store.transition_call(call_sid, CallStatus::Completed).await.map_err(|e| ServerError::Internal(e.to_string()))?;
            state.sessions.remove(call_sid, "provider_hangup").await;
        }
        ProviderEvent::StatusChanged { call_sid, status } => {
            if let Ok(parsed) = parse_status(status) {
                let _ = state.store.transition_call(call_sid, parsed).await;
            }
        }
        ProviderEvent::Dtmf { call_sid, digit } => {
            match state.sessions.get(call_sid).await {
                Some(session) => {
                    session
                        .push_provider_event(voice_agent_session::SessionEvent::Dtmf(*digit))
                        .await
                        .map_err(|e| ServerError::Session(e.to_string()))?;
                }
                None => {
                    if let Ok(outcome) = state.digits.record_key(call_sid, *digit, chrono::Utc::now(), &[]).await {
                        if let Err(e) =
                            apply_recorded_outcome(state.store.as_ref(), call_sid, DigitSource::Dtmf, &outcome).await
                        {
                            tracing::warn!(call_sid, error = %e, "failed to persist digit outcome with no live session");
                        }
                    }
                }
            }
        }
        ProviderEvent::GatherResult(cb) => match state.sessions.get(&cb.call_sid).await {
            Some(session) => {
                if let Some(digits) = &cb.digits {
                    for d in digits.chars() {
                        session
                            .push_provider_event(voice_agent_session::SessionEvent::Dtmf(d))
                            .await
                            .map_err(|e| ServerError::Session(e.to_string()))?;
                    }
                }
            }
            None => {
                if let Some(digits) = &cb.digits {
                    for d in digits.chars() {
                        if let Ok(outcome) = state.digits.record_key(&cb.call_sid, d, chrono::Utc::now(), &[]).await {
                            if let Err(e) =
                                apply_recorded_outcome(state.store.as_ref(), &cb.call_sid, DigitSource::Gather, &outcome).await
                            {
                                tracing::warn!(call_sid = %cb.call_sid, error = %e, "failed to persist digit outcome with no live session");
                            }
                        }
                    }
                }
            }
        },
        ProviderEvent::MachineDetected { .. } => {}
    }
    Ok(())
}

async fn provider_webhook(
    State(state): State<Arc<AppState>>,
    Path((provider, kind)): Path<(String, String)>,
    Query(params): Query<std::collections::HashMap<String, String>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<axum::response::Response, ServerError> {
    let mode = validation_mode_for(&state, &provider);
    verify_inbound(&state, mode, &headers, &body)?;

    if kind == "voice" {
        let call_sid = params.get("callSid").cloned().unwrap_or_default();
        return Ok(render_voice_response(&state, &call_sid).into_response());
    }

    let parsed: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| ServerError::InvalidRequest(format!("malformed webhook body: {e}")))?;
    let event = translate(&parsed).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;

    if state.gather_dedupe.is_duplicate(&event.dedupe_key(), chrono::Utc::now()) {
        return Ok(StatusCode::OK.into_response());
    }
    dispatch_event(&state, event).await?;
    Ok(StatusCode::OK.into_response())
}

/// Builds the TwiML/NCCO response for a `voice` callback: a digit gather
/// prompt if a `DigitExpectation` is pending for this call, otherwise a
/// plain greeting.
fn render_voice_response(state: &AppState, call_sid: &str) -> impl IntoResponse {
    let voice = state.settings.providers.twilio.tts_voice.clone();
    let body = match state.digits.current_expectation(call_sid) {
        Some(expectation) => {
            let channel_session_id = expectation
                .prompted_at
                .map(|t| t.timestamp_millis().to_string())
                .unwrap_or_else(|| "0".to_string());
            render_gather_twiml(
                &state.settings.server.host,
                call_sid,
                "Please enter your digits now.",
                &voice,
                expectation.max_digits,
                expectation.timeout_s,
                expectation.plan_id.as_deref(),
                expectation.plan_step_index,
                &channel_session_id,
            )
        }
        None => format!(r#"<Response><Say voice="{voice}">Connecting you now.</Say></Response>"#),
    };
    ([(axum::http::header::CONTENT_TYPE, "application/xml")], body)
}

async fn sms_status_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, ServerError> {
    verify_inbound(&state, voice_agent_config::ValidationMode::Warn, &headers, &body)?;
    Ok(StatusCode::OK)
}

async fn telegram_webhook(
    State(_state): State<Arc<AppState>>,
    _body: axum::body::Bytes,
) -> impl IntoResponse {
    // The Telegram mini-app UI is an external collaborator; this route only
    // acknowledges delivery so Telegram stops retrying.
    StatusCode::OK
}

/// Renders the bit-exact IVR gather prompt for an active `DigitExpectation`.
/// `planId`/`stepIndex`/`channelSessionId` ride along in the action URL so a
/// callback for a stale gather round (superseded plan step, reconnected
/// channel) can be told apart from the live one.
#[allow(clippy::too_many_arguments)]
pub fn render_gather_twiml(
    host: &str,
    call_sid: &str,
    prompt: &str,
    voice: &str,
    max_digits: usize,
    timeout_s: u64,
    plan_id: Option<&str>,
    step_index: Option<usize>,
    channel_session_id: &str,
) -> String {
    let action = format!(
        "https://{host}/webhook/twilio-gather?callSid={call_sid}&planId={}&stepIndex={}&channelSessionId={channel_session_id}",
        plan_id.unwrap_or(""),
        step_index.map(|i| i.to_string()).unwrap_or_default(),
    );
    format!(
        r#"<Response><Gather input="dtmf" numDigits="{max_digits}" timeout="{timeout_s}" action="{action}" method="POST"><Say voice="{voice}">{prompt}</Say></Gather></Response>"#
    )
}
