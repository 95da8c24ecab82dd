//! XML-DSig signing with the tenant's A1 certificate.

pub(crate) mod credential;
mod provider;
mod signer;

use thiserror::Error;

use common::AppError;

pub use credential::Credential;
pub use provider::{CredentialProvider, FileCredentialProvider, StaticCredentialProvider};
pub use signer::{verify, RsaSha1Signer, Signature, XmlSigner};

/// Certificate loading and signing errors.
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Private key error: {0}")]
    PrivateKey(String),

    #[error("Signing failed: {0}")]
    Sign(String),

    #[error("Signature does not match: {0}")]
    Verify(String),

    #[error("Cannot read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error(transparent)]
    Xml(#[from] crate::xml::XmlError),
}

impl From<SigningError> for AppError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::Io { path, reason } => {
                tracing::warn!(path = %path, reason = %reason, "Fiscal certificate file unreadable");
                AppError::validation("Fiscal certificate files cannot be read from the tenant certificate directory")
            }
            SigningError::Certificate(_) | SigningError::PrivateKey(_) => {
                AppError::Validation(format!("Fiscal certificate unusable: {}", err))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}
