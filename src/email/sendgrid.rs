//! SendGrid email provider implementation
//!
//! Sends dynamic-template mail through the SendGrid v3 `mail/send` endpoint.

use super::provider::{DeliveryReceipt, EmailProvider, EmailProviderError};
use crate::config::SendGridConfig;
use crate::domain::OutboundMessage;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// SendGrid email provider
pub struct SendGridEmailProvider {
    http_client: Client,
    api_key: Option<String>,
    api_base: String,
}

impl SendGridEmailProvider {
    pub fn new(config: &SendGridConfig) -> Result<Self, EmailProviderError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmailProviderError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn send_url(&self) -> String {
        format!("{}/mail/send", self.api_base)
    }
}

#[async_trait]
impl EmailProvider for SendGridEmailProvider {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, EmailProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(EmailProviderError::NotConfigured)?;

        if message.recipient().is_none() {
            return Err(EmailProviderError::InvalidConfiguration(
                "No recipients specified".to_string(),
            ));
        }

        let response = self
            .http_client
            .post(self.send_url())
            .bearer_auth(api_key)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    EmailProviderError::ConnectionError(e.to_string())
                } else {
                    EmailProviderError::SendFailed(e.to_string())
                }
            })?;

        let status = response.status();
        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        match status {
            s if s.is_success() => Ok(DeliveryReceipt {
                status_code: s.as_u16(),
                message_id,
                body,
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(EmailProviderError::AuthenticationFailed(body))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(EmailProviderError::RateLimited),
            s => Err(EmailProviderError::SendFailed(format!(
                "SendGrid returned {}: {}",
                s.as_u16(),
                body
            ))),
        }
    }

    fn provider_name(&self) -> &'static str {
        "sendgrid"
    }
}
