use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobsError {
    #[error("no handler registered for job kind {0}")]
    NoHandler(String),

    #[error("job execution failed: {0}")]
    Execution(String),

    #[error("webhook delivery failed: {0}")]
    Delivery(String),
}

impl From<JobsError> for voice_agent_core::Error {
    fn from(err: JobsError) -> Self {
        voice_agent_core::Error::Internal(err.to_string())
    }
}
