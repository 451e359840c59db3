use thiserror::Error;

/// Error types for state machine operations.
#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from:?} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },

    #[error("Retry budget exhausted: {retry_count} of {max_retries} attempts used")]
    RetriesExhausted { retry_count: i32, max_retries: i32 },

    #[error("Transaction has a blocking error and must not be retried")]
    BlockingError,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
