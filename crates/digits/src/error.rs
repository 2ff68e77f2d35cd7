use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigitsError {
    #[error("no expectation in flight for this call")]
    NoExpectation,

    #[error("digit validation failed: {0}")]
    Invalid(String),

    #[error("digit collection timed out")]
    Timeout,

    #[error("digit collection exhausted retries")]
    RetriesExhausted,

    #[error("digit storage error: {0}")]
    Storage(#[from] voice_agent_core::Error),
}

impl From<DigitsError> for voice_agent_core::Error {
    fn from(err: DigitsError) -> Self {
        match err {
            DigitsError::NoExpectation => voice_agent_core::Error::Internal(err.to_string()),
            DigitsError::Invalid(msg) => voice_agent_core::Error::DigitInvalid(msg),
            DigitsError::Timeout => voice_agent_core::Error::DigitTimeout,
            DigitsError::RetriesExhausted => voice_agent_core::Error::DigitFailed(err.to_string()),
            DigitsError::Storage(e) => e,
        }
    }
}
