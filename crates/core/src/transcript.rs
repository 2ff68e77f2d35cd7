//! Transcript entity — append-only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Ai,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: i64,
    pub call_sid: String,
    pub speaker: Speaker,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A finalized or partial speech-to-text result, produced by the STT
/// collaborator and handed to the call session runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub text: String,
    pub confidence: f32,
    pub is_final: bool,
    pub words: Vec<WordTimestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub start_ms: u64,
    pub end_ms: u64,
}
