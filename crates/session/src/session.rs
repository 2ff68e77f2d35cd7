//! The call session runtime (C1): one `CallSession` per live call, wiring
//! phase tracking, media reordering, TTS pacing, digit capture, and the
//! turn-by-turn LLM driver into the `open`/`push_provider_media`/
//! `push_provider_event`/`close` contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use voice_agent_core::traits::Store;
use voice_agent_core::{AudioFrame, DigitSource, Speaker, Transcript};
use voice_agent_digits::{apply_recorded_outcome, DigitManager};
use voice_agent_llm::{
    CallMeta, ConsistencyConfig, ContextAssembler, ContextConfig, GenerationEvent, Message, PersonaComposer,
    PersonaConfig, ProfileContext, Role, StreamingGenerator,
};
use voice_agent_tools::ToolSchema;

use crate::error::SessionError;
use crate::media::MediaReorderBuffer;
use crate::pacing::{TtsChunk, TtsPacer};
use crate::phase::{Phase, PhaseTracker};
use crate::turn::{TurnDriver, TurnOutcome};

/// Digit characters recognized in a finalized transcript while the session
/// is in capture mode, fed one at a time into the same recorder DTMF uses.
/// There is no dedicated spoken-number parser; this is a deliberately
/// narrow stand-in limited to literal digit characters in the final text.
fn spoken_digits(text: &str) -> Vec<char> {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// One normalized event the provider (or its STT leg) pushes into an open
/// session, after webhook ingress/translation and ASR have already run.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    TranscriptPartial(String),
    TranscriptFinal(String),
    Dtmf(char),
    /// Provider confirms playback through `index` completed.
    Mark { index: u64 },
    OperatorCommand(Phase),
    Hangup,
}

/// What a session event produces for the caller to act on: chunks to send
/// to the provider, a hangup/transfer request, or nothing actionable yet.
#[derive(Debug, Default)]
pub struct SessionReaction {
    pub chunks_to_send: Vec<TtsChunk>,
    pub events: Vec<GenerationEvent>,
    pub should_hangup: bool,
}

pub struct SessionConfig {
    pub persona: PersonaConfig,
    pub profile: ProfileContext,
    pub domain: String,
    pub channel: String,
    pub tools: Vec<ToolSchema>,
    pub fallback_tool: Option<String>,
    pub context_config: ContextConfig,
    pub consistency_config: ConsistencyConfig,
    pub max_buffered_media: usize,
    /// STT reconnect attempts allowed before escalating to hangup.
    pub max_stt_reconnects: u32,
    pub menu_options: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persona: PersonaConfig::default(),
            profile: ProfileContext::default(),
            domain: "default".to_string(),
            channel: "call".to_string(),
            tools: Vec::new(),
            fallback_tool: None,
            context_config: ContextConfig::default(),
            consistency_config: ConsistencyConfig::default(),
            max_buffered_media: 32,
            max_stt_reconnects: 3,
            menu_options: Vec::new(),
        }
    }
}

struct DialogueBuckets {
    by_phase: HashMap<Phase, Vec<Message>>,
    backstop: Vec<Message>,
}

impl DialogueBuckets {
    fn new() -> Self {
        Self { by_phase: HashMap::new(), backstop: Vec::new() }
    }

    fn record(&mut self, phase: Phase, message: Message) {
        self.backstop.push(message.clone());
        self.by_phase.entry(phase).or_default().push(message);
    }

    fn phase_window(&self, phase: Phase) -> &[Message] {
        self.by_phase.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A single live call, from provider `open` through `close`. All mutable
/// state here is call-scoped; the digit manager and tool engine backing
/// `TurnDriver` are shared across calls and keyed internally by `call_sid`.
pub struct CallSession {
    call_sid: String,
    config: SessionConfig,
    open: Mutex<bool>,
    phase: Mutex<PhaseTracker>,
    media: Mutex<MediaReorderBuffer>,
    pacer: TtsPacer,
    dialogue: Mutex<DialogueBuckets>,
    context: AsyncMutex<ContextAssembler>,
    generator: AsyncMutex<StreamingGenerator>,
    persona_composer: Mutex<PersonaComposer>,
    digits: Arc<DigitManager>,
    turn_driver: Arc<TurnDriver>,
    store: Arc<dyn Store>,
    chunk_index: AtomicU64,
    stt_reconnects: AtomicU64,
}

impl CallSession {
    /// Opens a new session. Idempotent: calling twice for the same
    /// `call_sid` against an already-open session is a no-op, not an error,
    /// matching the provider's own at-least-once webhook delivery.
    pub fn open(
        call_sid: impl Into<String>,
        config: SessionConfig,
        digits: Arc<DigitManager>,
        turn_driver: Arc<TurnDriver>,
        store: Arc<dyn Store>,
    ) -> Result<Self, SessionError> {
        let call_sid = call_sid.into();
        if call_sid.trim().is_empty() {
            return Err(SessionError::MediaAttachFailed("empty call_sid".to_string()));
        }
        let persona_composer = PersonaComposer::new(config.persona.clone());
        let max_buffered = config.max_buffered_media;
        let context_config = config.context_config.clone();
        let consistency_config = config.consistency_config.clone();
        Ok(Self {
            call_sid,
            config,
            open: Mutex::new(true),
            phase: Mutex::new(PhaseTracker::new()),
            media: Mutex::new(MediaReorderBuffer::new(max_buffered)),
            pacer: TtsPacer::new(),
            dialogue: Mutex::new(DialogueBuckets::new()),
            context: AsyncMutex::new(ContextAssembler::new(context_config)),
            generator: AsyncMutex::new(StreamingGenerator::new(consistency_config)),
            persona_composer: Mutex::new(persona_composer),
            digits,
            turn_driver,
            store,
            chunk_index: AtomicU64::new(0),
            stt_reconnects: AtomicU64::new(0),
        })
    }

    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    pub fn phase(&self) -> Phase {
        self.phase.lock().phase()
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    fn require_open(&self) -> Result<(), SessionError> {
        if *self.open.lock() {
            Ok(())
        } else {
            Err(SessionError::NotOpen(self.call_sid.clone()))
        }
    }

    /// Accepts one inbound media frame, reordered by provider sequence.
    /// Returns the in-order run now ready to forward to STT.
    pub fn push_provider_media(&self, frame: AudioFrame) -> Result<Vec<AudioFrame>, SessionError> {
        self.require_open()?;
        Ok(self.media.lock().push(frame))
    }

    /// An STT connection dropped and is reconnecting. Returns an error once
    /// the reconnect budget is exhausted, at which point the caller must
    /// escalate to hangup.
    pub fn note_stt_reconnect(&self) -> Result<(), SessionError> {
        let attempts = self.stt_reconnects.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts as u32 > self.config.max_stt_reconnects {
            return Err(SessionError::SttExhausted(attempts as u32));
        }
        Ok(())
    }

    pub fn note_stt_recovered(&self) {
        self.stt_reconnects.store(0, Ordering::SeqCst);
    }

    fn in_digit_capture(&self) -> bool {
        self.digits.has_expectation(&self.call_sid)
    }

    /// Handles one normalized provider/STT event and returns whatever the
    /// caller needs to act on (chunks to play, a hangup request).
    pub async fn push_provider_event(&self, event: SessionEvent) -> Result<SessionReaction, SessionError> {
        self.require_open()?;

        match event {
            SessionEvent::Mark { index } => {
                let mut reaction = SessionReaction::default();
                if let Some(next) = self.pacer.on_mark(index) {
                    reaction.chunks_to_send.push(next);
                }
                Ok(reaction)
            }

            SessionEvent::TranscriptPartial(_text) => {
                // An interim result while we're mid-playback is the barge-in
                // signal: cancel everything pending so the next final starts
                // clean. Nothing for the caller to send as a result.
                self.pacer.barge_in();
                Ok(SessionReaction::default())
            }

            SessionEvent::Dtmf(key) => {
                let effect = self.record_digit_key(key, DigitSource::Dtmf).await?;
                Ok(self.reaction_for_digit_effect(effect).await)
            }

            SessionEvent::TranscriptFinal(text) => {
                if self.in_digit_capture() {
                    let mut reaction = SessionReaction::default();
                    for key in spoken_digits(&text) {
                        let effect = self.record_digit_key(key, DigitSource::Speech).await?;
                        reaction = self.reaction_for_digit_effect(effect).await;
                    }
                    return Ok(reaction);
                }
                self.store
                    .append_transcript(&Transcript {
                        id: 0,
                        call_sid: self.call_sid.clone(),
                        speaker: Speaker::User,
                        message: text.clone(),
                        timestamp: Utc::now(),
                    })
                    .await?;
                self.drive_turn(&text).await
            }

            SessionEvent::OperatorCommand(target) => {
                self.phase
                    .lock()
                    .operator_command(target)
                    .map_err(SessionError::IllegalPhase)?;
                Ok(SessionReaction::default())
            }

            SessionEvent::Hangup => {
                self.close("provider_hangup").await;
                Ok(SessionReaction { should_hangup: true, ..Default::default() })
            }
        }
    }

    async fn record_digit_key(
        &self,
        key: char,
        source: DigitSource,
    ) -> Result<voice_agent_digits::DigitOutcomeEffect, SessionError> {
        let menu: Vec<&str> = self.config.menu_options.iter().map(String::as_str).collect();
        let outcome = match self.digits.record_key(&self.call_sid, key, Utc::now(), &menu).await {
            Ok(outcome) => outcome,
            // Key arrived with no capture in flight: not actionable, not an error.
            Err(voice_agent_digits::DigitsError::NoExpectation) => return Ok(voice_agent_digits::DigitOutcomeEffect::default()),
            Err(e) => return Err(e.into()),
        };
        let effect = apply_recorded_outcome(self.store.as_ref(), &self.call_sid, source, &outcome).await?;
        if let Some(note) = &effect.transcript_note {
            self.store
                .append_transcript(&Transcript {
                    id: 0,
                    call_sid: self.call_sid.clone(),
                    speaker: Speaker::System,
                    message: note.clone(),
                    timestamp: Utc::now(),
                })
                .await?;
        }
        Ok(effect)
    }

    async fn reaction_for_digit_effect(&self, effect: voice_agent_digits::DigitOutcomeEffect) -> SessionReaction {
        if effect.should_end_call {
            self.close("digit_collection_complete").await;
            SessionReaction { should_hangup: true, ..Default::default() }
        } else {
            SessionReaction::default()
        }
    }

    async fn drive_turn(&self, user_text: &str) -> Result<SessionReaction, SessionError> {
        // A new final transcript means any prior interrupted playback is
        // done being interrupted; the upcoming reply starts clean.
        self.pacer.reset();
        let trigger = self.phase.lock().observe_user_turn(user_text);
        let phase = self.phase.lock().phase();
        if trigger.is_some() {
            tracing::info!(call_sid = %self.call_sid, ?phase, "phase transition");
        }

        let user_message = Message::user(user_text.to_string());
        self.dialogue.lock().record(phase, user_message.clone());

        let (system_prompt, meta) = {
            let composer = self.persona_composer.lock();
            let layers = composer.compose(&self.config.profile, &self.config.domain, &self.config.channel, 0.0);
            let meta = CallMeta {
                call_sid: self.call_sid.clone(),
                customer_name: self.config.profile.customer_name.clone(),
                intent: self.config.profile.intent.clone(),
            };
            (layers.compose(), meta)
        };

        let (phase_window, backstop) = {
            let dialogue = self.dialogue.lock();
            (dialogue.phase_window(phase).to_vec(), dialogue.backstop.clone())
        };
        let mut messages = {
            let mut context = self.context.lock().await;
            context.assemble(&system_prompt, &meta, &phase_window, &backstop)
        };

        let persona = self.config.persona.clone();
        let fallback = self.config.fallback_tool.as_deref();
        let mut generator = self.generator.lock().await;

        let outcome: TurnOutcome = self
            .turn_driver
            .run_turn(
                &self.call_sid,
                &phase_to_step_id(phase),
                &mut messages,
                &self.config.tools,
                fallback,
                &mut *generator,
                &persona,
                0.0,
            )
            .await?;

        {
            let mut dialogue = self.dialogue.lock();
            for msg in &outcome.history {
                dialogue.record(phase, msg.clone());
            }
        }

        for msg in &outcome.history {
            if msg.role == Role::Assistant && !msg.content.is_empty() {
                self.store
                    .append_transcript(&Transcript {
                        id: 0,
                        call_sid: self.call_sid.clone(),
                        speaker: Speaker::Ai,
                        message: msg.content.clone(),
                        timestamp: Utc::now(),
                    })
                    .await?;
            }
        }

        if outcome
            .history
            .iter()
            .any(|m| m.role == Role::Assistant && looks_like_closing(&m.content))
        {
            self.phase.lock().begin_closing();
        }

        let mut chunks_to_send = Vec::new();
        for event in &outcome.events {
            if let GenerationEvent::GptReply { partial_response, .. } = event {
                let index = self.chunk_index.fetch_add(1, Ordering::SeqCst);
                let chunk = TtsChunk { index, text: partial_response.clone() };
                if let Some(sendable) = self.pacer.enqueue(chunk) {
                    chunks_to_send.push(sendable);
                }
            }
        }

        Ok(SessionReaction { chunks_to_send, events: outcome.events, should_hangup: false })
    }

    /// Guaranteed cleanup: releases the in-flight digit expectation, resets
    /// the pacer and phase, and marks the session closed. Safe to call more
    /// than once.
    pub async fn close(&self, reason: &str) {
        tracing::info!(call_sid = %self.call_sid, reason, "closing call session");
        *self.open.lock() = false;
        self.digits.clear(&self.call_sid);
        self.pacer.reset();
        self.phase.lock().terminate();
    }
}

fn phase_to_step_id(phase: Phase) -> String {
    format!("{phase:?}").to_lowercase()
}

fn looks_like_closing(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["goodbye", "have a great day", "take care"].iter().any(|p| lower.contains(p))
}
