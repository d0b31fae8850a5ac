use thiserror::Error;

use crate::model::CriteriaError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage medium is locked or otherwise unreachable; callers may retry or ignore
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// Caller bug: the request can never succeed as written
    #[error("malformed query: {0}")]
    Malformed(String),

    #[error("delete failed for {scope}: {reason}")]
    DeleteFailed { scope: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether a later attempt at the same operation can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Unavailable(_) | StoreError::Fjall(_) | StoreError::Io(_) => true,
            StoreError::DeleteFailed { .. } => true,
            StoreError::Malformed(_) | StoreError::Serialization(_) => false,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::Malformed(_))
    }
}

impl From<CriteriaError> for StoreError {
    fn from(err: CriteriaError) -> Self {
        StoreError::Malformed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
