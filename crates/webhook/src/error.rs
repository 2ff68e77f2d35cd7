use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("stale timestamp")]
    StaleTimestamp,

    #[error("unrecognized provider: {0}")]
    UnknownProvider(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl From<WebhookError> for voice_agent_core::Error {
    fn from(err: WebhookError) -> Self {
        voice_agent_core::Error::Validation(err.to_string())
    }
}
