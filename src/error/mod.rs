//! Unified error handling for the custom email sender

use crate::crypto::EnvelopeError;
use crate::email::EmailProviderError;
use lambda_runtime::Diagnostic;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
///
/// Every variant is fatal for the invocation: the handler does not recover
/// locally and the error is reported to the Lambda runtime.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Could not find code")]
    MissingCode,

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Decryption error: {0}")]
    Decryption(#[from] EnvelopeError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] EmailProviderError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Error type reported to the Lambda runtime
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "ConfigurationError",
            AppError::MissingCode => "MissingCodeError",
            AppError::InvalidEvent(_) => "InvalidEventError",
            AppError::Decryption(_) => "DecryptionError",
            AppError::Delivery(_) => "DeliveryError",
            AppError::Internal(_) => "InternalError",
        }
    }
}

impl From<AppError> for Diagnostic {
    fn from(error: AppError) -> Self {
        tracing::error!(error_type = error.error_type(), "Invocation failed: {}", error);
        Diagnostic {
            error_type: error.error_type().to_string(),
            error_message: error.to_string(),
        }
    }
}
