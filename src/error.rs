use thiserror::Error;

/// Crate-level error type. Subsystems define their own richer error enums
/// and convert into this at the public boundary.
#[derive(Debug, Error)]
pub enum AduanaError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("State transition error: {0}")]
    StateTransition(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Correlation error: {0}")]
    Correlation(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AduanaError>;
