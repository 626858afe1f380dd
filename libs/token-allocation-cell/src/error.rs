use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::TokenStatus;

#[derive(Error, Debug)]
pub enum TokenAllocationError {
    #[error("Invalid token type: {0}")]
    InvalidTokenType(String),

    #[error("Invalid token status: {0}")]
    InvalidTokenStatus(String),

    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("Token not found: {0}")]
    TokenNotFound(Uuid),

    #[error("Slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("Slot already exists: {0}")]
    SlotAlreadyExists(String),

    #[error("Cannot move token {token_id} from {from} to {to}")]
    InvalidStateTransition {
        token_id: Uuid,
        from: TokenStatus,
        to: TokenStatus,
    },

    #[error("Token {token_number} is already being processed")]
    AlreadyInProgress { token_number: String },

    #[error("No tokens available in slot {0}")]
    QueueEmpty(Uuid),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Redis connection error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<TokenAllocationError> for AppError {
    fn from(err: TokenAllocationError) -> Self {
        match err {
            TokenAllocationError::InvalidTokenType(_)
            | TokenAllocationError::InvalidTokenStatus(_)
            | TokenAllocationError::MissingRequiredField(_) => AppError::ValidationError(err.to_string()),
            TokenAllocationError::TokenNotFound(_) | TokenAllocationError::SlotNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            TokenAllocationError::SlotAlreadyExists(_)
            | TokenAllocationError::InvalidStateTransition { .. }
            | TokenAllocationError::AlreadyInProgress { .. }
            | TokenAllocationError::QueueEmpty(_) => AppError::Conflict(err.to_string()),
            TokenAllocationError::Store(_)
            | TokenAllocationError::Redis(_)
            | TokenAllocationError::Serialization(_) => {
                tracing::error!("Token store failure: {}", err);
                AppError::Database("Token store unavailable".to_string())
            }
        }
    }
}
