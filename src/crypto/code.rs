//! Verification code decryption
//!
//! The identity provider encrypts the one-time code under the pool's KMS key
//! and sends it base64-encoded in `request.code`.

use super::envelope::{EnvelopeClient, EnvelopeError};
use super::keyring::{KeyManagementService, KmsKeyring};
use super::suite::CommitmentPolicy;
use crate::config::Config;
use crate::domain::TriggerEvent;
use crate::error::{AppError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::Arc;

pub struct CodeDecryptor {
    key_service: Arc<dyn KeyManagementService>,
    client: EnvelopeClient,
}

impl CodeDecryptor {
    pub fn new(key_service: Arc<dyn KeyManagementService>) -> Self {
        Self {
            key_service,
            client: EnvelopeClient::new(CommitmentPolicy::RequireEncryptAllowDecrypt),
        }
    }

    /// Plaintext code carried by the event
    ///
    /// Login notifications carry no code and yield an empty string; any other
    /// trigger without a code fails with [`AppError::MissingCode`].
    pub async fn plaintext_code(&self, event: &TriggerEvent, config: &Config) -> Result<String> {
        let Some(code) = event.code() else {
            if event.trigger_source.expects_code() {
                return Err(AppError::MissingCode);
            }
            return Ok(String::new());
        };

        let key_id = config.require_key_id()?;
        let ciphertext = BASE64.decode(code).map_err(EnvelopeError::from)?;

        let keyring = KmsKeyring::new(
            self.key_service.clone(),
            config.kms.key_alias.clone(),
            vec![key_id.to_string()],
        );
        let decrypted = self.client.decrypt(&keyring, &ciphertext).await?;

        Ok(String::from_utf8_lossy(&decrypted.plaintext).into_owned())
    }
}
