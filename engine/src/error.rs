use latch_db::{models::MalformedRecord, storage::StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The request itself is wrong; retrying it won't help.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Activation code not found")]
    NotFound,

    #[error("Activation code has already been used on another machine")]
    AlreadyUsed,

    #[error("Activation code has expired")]
    Expired,

    #[error("Machine already has an active activation code")]
    MachineAlreadyBound,

    /// Lost a race with a concurrent writer. Safe to retry.
    #[error("Concurrent update, please retry")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Malformed(#[from] MalformedRecord),
}

impl EngineError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
