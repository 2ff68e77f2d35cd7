use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("media_attach_failed: {0}")]
    MediaAttachFailed(String),

    #[error("no session open for {0}")]
    NotOpen(String),

    #[error("stt reconnect exhausted after {0} attempts")]
    SttExhausted(u32),

    #[error("empty model response after backoff")]
    EmptyResponse,

    #[error("illegal phase transition: {0}")]
    IllegalPhase(String),

    #[error("model request failed: {0}")]
    ModelError(String),

    #[error("digit storage error: {0}")]
    DigitStorage(#[from] voice_agent_digits::DigitsError),

    #[error("storage error: {0}")]
    Storage(#[from] voice_agent_core::Error),
}

impl From<SessionError> for voice_agent_core::Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::MediaAttachFailed(_) => voice_agent_core::Error::ProviderTransient(err.to_string()),
            SessionError::NotOpen(_) => voice_agent_core::Error::Validation(err.to_string()),
            SessionError::SttExhausted(_) => voice_agent_core::Error::ProviderPermanent(err.to_string()),
            SessionError::EmptyResponse => voice_agent_core::Error::ModelPermanent(err.to_string()),
            SessionError::IllegalPhase(_) => voice_agent_core::Error::Validation(err.to_string()),
            SessionError::ModelError(_) => voice_agent_core::Error::ModelTransient(err.to_string()),
            SessionError::DigitStorage(e) => e.into(),
            SessionError::Storage(e) => e,
        }
    }
}
