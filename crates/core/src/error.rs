// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Upload rejected before any job exists (empty body, wrong content type)
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    /// Header row does not carry the required columns
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Publish / receive / ack / nack failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Job store or catalog commit failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors raised before a job is registered; the caller must resubmit.
    pub fn is_rejection(&self) -> bool {
        matches!(self, AppError::InvalidUpload(_) | AppError::SchemaMismatch(_))
    }

    /// Stable machine-readable name, used as the `error` field of API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Domain(_) => "DomainError",
            AppError::InvalidUpload(_) => "InvalidUpload",
            AppError::SchemaMismatch(_) => "SchemaMismatch",
            AppError::Transport(_) => "TransportError",
            AppError::Persistence(_) => "PersistenceError",
            AppError::Io(_) => "IoError",
            AppError::Serialization(_) => "SerializationError",
            AppError::Config(_) => "ConfigError",
            AppError::NotFound(_) => "NotFound",
            AppError::Conflict(_) => "Conflict",
            AppError::InvalidState(_) => "InvalidState",
            AppError::Internal(_) => "InternalError",
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// sqlx::Error conversion is handled in the infra-sqlite crate
// by mapping to AppError::Persistence(String)
