use thiserror::Error;

use common::AppError;

use crate::xml::XmlError;

/// Failures talking to a SEFAZ web service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SefazError {
    #[error("SEFAZ transport error: {0}")]
    Transport(String),

    #[error("SEFAZ request timed out")]
    Timeout,

    #[error("SEFAZ answered HTTP {status}")]
    Http { status: u16, body: String },

    #[error("Unreadable SEFAZ reply: {0}")]
    Parse(String),
}

impl SefazError {
    /// The request may have been processed even though no reply was read.
    pub fn is_outcome_unknown(&self) -> bool {
        match self {
            SefazError::Transport(_) | SefazError::Timeout => true,
            SefazError::Http { status, .. } => *status >= 500,
            SefazError::Parse(_) => false,
        }
    }
}

impl From<XmlError> for SefazError {
    fn from(err: XmlError) -> Self {
        SefazError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for SefazError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SefazError::Timeout
        } else {
            SefazError::Transport(err.to_string())
        }
    }
}

impl From<SefazError> for AppError {
    fn from(err: SefazError) -> Self {
        AppError::Sefaz(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_unknown() {
        assert!(SefazError::Timeout.is_outcome_unknown());
        assert!(SefazError::Transport("reset".into()).is_outcome_unknown());
        assert!(SefazError::Http { status: 503, body: String::new() }.is_outcome_unknown());
        assert!(!SefazError::Http { status: 404, body: String::new() }.is_outcome_unknown());
        assert!(!SefazError::Parse("x".into()).is_outcome_unknown());
    }

    #[test]
    fn test_app_error_mapping() {
        let err: AppError = SefazError::Timeout.into();
        assert!(matches!(err, AppError::Sefaz(_)));
    }
}
