//! Keyrings and the KMS key service behind them

use super::header::{EncryptedDataKey, EncryptionContext};
use super::suite::AlgorithmSuite;
use async_trait::async_trait;
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::Client;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Provider id written for data keys wrapped by KMS
pub const KMS_PROVIDER_ID: &str = "aws-kms";

/// Keyring error types
#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("No encrypted data key matches the configured key ids")]
    NoMatchingKey,

    #[error("Keyring has no generator key")]
    NoGenerator,

    #[error("KMS error: {0}")]
    Kms(String),

    #[error("KMS returned key {actual}, expected {expected}")]
    KeyMismatch { expected: String, actual: String },

    #[error("Data key has unexpected length {0}")]
    InvalidDataKey(usize),
}

/// Plaintext data key together with its wrapped copies
#[derive(Debug, Clone)]
pub struct EncryptionMaterials {
    pub data_key: Vec<u8>,
    pub encrypted_data_keys: Vec<EncryptedDataKey>,
}

/// Produces data keys on encrypt and recovers them on decrypt
#[async_trait]
pub trait Keyring: Send + Sync {
    async fn on_encrypt(
        &self,
        suite: AlgorithmSuite,
        context: &EncryptionContext,
    ) -> Result<EncryptionMaterials, KeyringError>;

    async fn on_decrypt(
        &self,
        suite: AlgorithmSuite,
        encrypted_data_keys: &[EncryptedDataKey],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KeyringError>;
}

#[derive(Debug, Clone)]
pub struct GeneratedDataKey {
    pub key_id: String,
    pub plaintext: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct WrappedKey {
    pub key_id: String,
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct UnwrappedKey {
    pub key_id: String,
    pub plaintext: Vec<u8>,
}

/// The three KMS operations a keyring needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyManagementService: Send + Sync {
    async fn generate_data_key(
        &self,
        key_id: &str,
        length: usize,
        context: &EncryptionContext,
    ) -> Result<GeneratedDataKey, KeyringError>;

    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<WrappedKey, KeyringError>;

    async fn decrypt(
        &self,
        key_id: &str,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<UnwrappedKey, KeyringError>;
}

/// Keyring bound to a generator key and any number of additional KMS keys
///
/// On decrypt only `aws-kms` data keys whose provider info names one of the
/// configured identifiers are attempted, in message order.
pub struct KmsKeyring {
    service: Arc<dyn KeyManagementService>,
    generator: Option<String>,
    key_ids: Vec<String>,
}

impl KmsKeyring {
    pub fn new(
        service: Arc<dyn KeyManagementService>,
        generator: Option<String>,
        key_ids: Vec<String>,
    ) -> Self {
        Self {
            service,
            generator,
            key_ids,
        }
    }

    fn is_configured(&self, key_id: &str) -> bool {
        self.generator.as_deref() == Some(key_id) || self.key_ids.iter().any(|id| id == key_id)
    }
}

#[async_trait]
impl Keyring for KmsKeyring {
    async fn on_encrypt(
        &self,
        suite: AlgorithmSuite,
        context: &EncryptionContext,
    ) -> Result<EncryptionMaterials, KeyringError> {
        let generator = self.generator.as_deref().ok_or(KeyringError::NoGenerator)?;
        let generated = self
            .service
            .generate_data_key(generator, suite.key_len(), context)
            .await?;
        if generated.plaintext.len() != suite.key_len() {
            return Err(KeyringError::InvalidDataKey(generated.plaintext.len()));
        }

        let mut encrypted_data_keys = vec![EncryptedDataKey::new(
            KMS_PROVIDER_ID,
            generated.key_id.into_bytes(),
            generated.ciphertext,
        )];
        for key_id in &self.key_ids {
            let wrapped = self
                .service
                .encrypt(key_id, &generated.plaintext, context)
                .await?;
            encrypted_data_keys.push(EncryptedDataKey::new(
                KMS_PROVIDER_ID,
                wrapped.key_id.into_bytes(),
                wrapped.ciphertext,
            ));
        }

        Ok(EncryptionMaterials {
            data_key: generated.plaintext,
            encrypted_data_keys,
        })
    }

    async fn on_decrypt(
        &self,
        suite: AlgorithmSuite,
        encrypted_data_keys: &[EncryptedDataKey],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KeyringError> {
        let mut last_error = None;

        for edk in encrypted_data_keys {
            if edk.provider_id != KMS_PROVIDER_ID {
                continue;
            }
            let Ok(key_id) = std::str::from_utf8(&edk.provider_info) else {
                continue;
            };
            if !self.is_configured(key_id) {
                continue;
            }

            match self.service.decrypt(key_id, &edk.ciphertext, context).await {
                Ok(unwrapped) if unwrapped.key_id != key_id => {
                    last_error = Some(KeyringError::KeyMismatch {
                        expected: key_id.to_string(),
                        actual: unwrapped.key_id,
                    });
                }
                Ok(unwrapped) if unwrapped.plaintext.len() != suite.key_len() => {
                    last_error = Some(KeyringError::InvalidDataKey(unwrapped.plaintext.len()));
                }
                Ok(unwrapped) => return Ok(unwrapped.plaintext),
                Err(e) => {
                    tracing::warn!(key_id = %key_id, "Failed to unwrap data key: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(KeyringError::NoMatchingKey))
    }
}

/// [`KeyManagementService`] backed by AWS KMS
///
/// The handler only decrypts; the generate and encrypt calls back
/// [`EnvelopeClient::encrypt`](super::EnvelopeClient::encrypt) for tooling.
#[derive(Clone)]
pub struct KmsKeyService {
    client: Client,
}

impl KmsKeyService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default credential chain (IAM role, env vars, etc.)
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::from_env().load().await;
        Self::new(Client::new(&sdk_config))
    }
}

fn kms_context(context: &EncryptionContext) -> Option<HashMap<String, String>> {
    if context.is_empty() {
        None
    } else {
        Some(context.clone().into_iter().collect())
    }
}

fn kms_error<E: std::error::Error>(error: E) -> KeyringError {
    KeyringError::Kms(DisplayErrorContext(error).to_string())
}

#[async_trait]
impl KeyManagementService for KmsKeyService {
    async fn generate_data_key(
        &self,
        key_id: &str,
        length: usize,
        context: &EncryptionContext,
    ) -> Result<GeneratedDataKey, KeyringError> {
        let number_of_bytes = i32::try_from(length)
            .map_err(|_| KeyringError::InvalidDataKey(length))?;
        let response = self
            .client
            .generate_data_key()
            .key_id(key_id)
            .number_of_bytes(number_of_bytes)
            .set_encryption_context(kms_context(context))
            .send()
            .await
            .map_err(kms_error)?;

        let plaintext = response
            .plaintext()
            .ok_or_else(|| KeyringError::Kms("GenerateDataKey returned no plaintext".to_string()))?;
        let ciphertext = response
            .ciphertext_blob()
            .ok_or_else(|| KeyringError::Kms("GenerateDataKey returned no ciphertext".to_string()))?;

        Ok(GeneratedDataKey {
            key_id: response.key_id().unwrap_or(key_id).to_string(),
            plaintext: plaintext.clone().into_inner(),
            ciphertext: ciphertext.clone().into_inner(),
        })
    }

    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<WrappedKey, KeyringError> {
        let response = self
            .client
            .encrypt()
            .key_id(key_id)
            .plaintext(Blob::new(plaintext.to_vec()))
            .set_encryption_context(kms_context(context))
            .send()
            .await
            .map_err(kms_error)?;

        let ciphertext = response
            .ciphertext_blob()
            .ok_or_else(|| KeyringError::Kms("Encrypt returned no ciphertext".to_string()))?;

        Ok(WrappedKey {
            key_id: response.key_id().unwrap_or(key_id).to_string(),
            ciphertext: ciphertext.clone().into_inner(),
        })
    }

    async fn decrypt(
        &self,
        key_id: &str,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<UnwrappedKey, KeyringError> {
        let response = self
            .client
            .decrypt()
            .key_id(key_id)
            .ciphertext_blob(Blob::new(ciphertext.to_vec()))
            .set_encryption_context(kms_context(context))
            .send()
            .await
            .map_err(kms_error)?;

        let plaintext = response
            .plaintext()
            .ok_or_else(|| KeyringError::Kms("Decrypt returned no plaintext".to_string()))?;

        Ok(UnwrappedKey {
            key_id: response.key_id().unwrap_or(key_id).to_string(),
            plaintext: plaintext.clone().into_inner(),
        })
    }
}
