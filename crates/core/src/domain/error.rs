// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Unknown row outcome: {0}")]
    UnknownOutcome(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
