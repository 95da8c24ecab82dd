//! Domain-level errors: fiscal rule violations, independent of HTTP, SEFAZ
//! and the database.

use thiserror::Error;

use crate::status::DocumentStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Draft, event or profile data breaks a fiscal rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// The status machine does not allow this move
    #[error("Document cannot move from {from} to {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// Operation not allowed for the document as it stands
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        DomainError::InvalidState(msg.into())
    }
}

/// Result type alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
