//! Custom email sender entry point

use crate::config::Config;
use crate::crypto::{CodeDecryptor, KeyManagementService};
use crate::domain::TriggerEvent;
use crate::email::{EmailProvider, MessageBuilder, Recipient};
use crate::error::{AppError, Result};
use crate::router::TriggerRouter;
use std::sync::Arc;
use tracing::info;

/// Handles one trigger invocation at a time; shared across invocations.
pub struct Handler {
    config: Config,
    decryptor: CodeDecryptor,
    provider: Arc<dyn EmailProvider>,
    builder: MessageBuilder,
}

impl Handler {
    pub fn new(
        config: Config,
        key_service: Arc<dyn KeyManagementService>,
        provider: Arc<dyn EmailProvider>,
    ) -> Self {
        Self {
            config,
            decryptor: CodeDecryptor::new(key_service),
            provider,
            builder: MessageBuilder::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send the email for `event` and hand the event back unchanged.
    pub async fn handle(&self, event: TriggerEvent) -> Result<TriggerEvent> {
        let raw_event = serde_json::to_string(&event).map_err(anyhow::Error::from)?;
        info!(config = ?self.config, "Loaded configuration");
        info!(event = %raw_event, "Received trigger event");

        self.config.require_sendgrid_api_key()?;

        let code = self.decryptor.plaintext_code(&event, &self.config).await?;

        let email = event.email();
        let name = event.name();

        let router = TriggerRouter::from_config(&self.config.templates)?;
        let email = email.ok_or_else(|| {
            AppError::InvalidEvent("user attribute 'email' is missing".to_string())
        })?;

        let Some(route) = router.route(&event.trigger_source, email) else {
            return Ok(event);
        };

        let message = self
            .builder
            .build(&self.config, &route, Recipient { email, name }, &code)?;

        let payload = serde_json::to_string(&message.redacted()).map_err(anyhow::Error::from)?;
        info!(payload = %payload, "Sending email payload");

        let receipt = self.provider.send(&message).await?;
        info!(
            provider = self.provider.provider_name(),
            status_code = receipt.status_code,
            message_id = receipt.message_id.as_deref().unwrap_or_default(),
            body = %receipt.body,
            "Email sent"
        );

        Ok(event)
    }
}
