use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),
}

impl From<StoreError> for voice_agent_core::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => voice_agent_core::Error::StorageUnavailable(e.to_string()),
            StoreError::NotFound(msg) => voice_agent_core::Error::Internal(msg),
            StoreError::IllegalTransition(msg) => voice_agent_core::Error::Validation(msg),
        }
    }
}
