// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid invoice status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
