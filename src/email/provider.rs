//! Email provider trait and error types

use crate::domain::OutboundMessage;
use async_trait::async_trait;
use thiserror::Error;

/// Email provider error types
#[derive(Error, Debug)]
pub enum EmailProviderError {
    #[error("Email provider not configured")]
    NotConfigured,

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Rate limited")]
    RateLimited,
}

/// What the provider answered for an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub status_code: u16,
    pub message_id: Option<String>,
    pub body: String,
}

/// Trait for email providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send a templated message
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, EmailProviderError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}
