//! Common test utilities

#![allow(dead_code)]

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use custom_email_sender::config::Config;
use custom_email_sender::crypto::keyring::EncryptionMaterials;
use custom_email_sender::crypto::{
    AlgorithmSuite, EncryptOptions, EncryptedDataKey, EncryptionContext, EnvelopeClient,
    GeneratedDataKey, KeyManagementService, Keyring, KeyringError, KmsKeyring, UnwrappedKey,
    WrappedKey,
};
use custom_email_sender::domain::TriggerEvent;
use rand::RngCore;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const KEY_ARN: &str =
    "arn:aws:kms:sa-east-1:111122223333:key/0b3f6f7e-1a2b-4c5d-8e9f-001122334455";
pub const OTHER_KEY_ARN: &str =
    "arn:aws:kms:sa-east-1:111122223333:key/ffffffff-1a2b-4c5d-8e9f-001122334455";
pub const KEY_ALIAS: &str = "alias/cognito-custom-sender";

#[derive(Debug, Clone)]
struct StoredKey {
    key_id: String,
    plaintext: Vec<u8>,
    context: EncryptionContext,
}

/// In-memory stand-in for KMS
///
/// Wrapped keys are opaque random handles. Unwrapping checks the key id and
/// the encryption context the way KMS does.
#[derive(Default)]
pub struct InMemoryKms {
    keys: Mutex<HashMap<Vec<u8>, StoredKey>>,
}

impl InMemoryKms {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn store(&self, key_id: &str, plaintext: &[u8], context: &EncryptionContext) -> Vec<u8> {
        let mut handle = vec![0u8; 48];
        rand::thread_rng().fill_bytes(&mut handle);
        self.keys.lock().unwrap().insert(
            handle.clone(),
            StoredKey {
                key_id: key_id.to_string(),
                plaintext: plaintext.to_vec(),
                context: context.clone(),
            },
        );
        handle
    }
}

#[async_trait]
impl KeyManagementService for InMemoryKms {
    async fn generate_data_key(
        &self,
        key_id: &str,
        length: usize,
        context: &EncryptionContext,
    ) -> Result<GeneratedDataKey, KeyringError> {
        let mut plaintext = vec![0u8; length];
        rand::thread_rng().fill_bytes(&mut plaintext);
        let ciphertext = self.store(key_id, &plaintext, context);
        Ok(GeneratedDataKey {
            key_id: key_id.to_string(),
            plaintext,
            ciphertext,
        })
    }

    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<WrappedKey, KeyringError> {
        Ok(WrappedKey {
            key_id: key_id.to_string(),
            ciphertext: self.store(key_id, plaintext, context),
        })
    }

    async fn decrypt(
        &self,
        key_id: &str,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<UnwrappedKey, KeyringError> {
        let keys = self.keys.lock().unwrap();
        let stored = keys
            .get(ciphertext)
            .ok_or_else(|| KeyringError::Kms("InvalidCiphertextException".to_string()))?;
        if stored.key_id != key_id {
            return Err(KeyringError::Kms("IncorrectKeyException".to_string()));
        }
        if &stored.context != context {
            return Err(KeyringError::Kms("InvalidCiphertextException".to_string()));
        }
        Ok(UnwrappedKey {
            key_id: stored.key_id.clone(),
            plaintext: stored.plaintext.clone(),
        })
    }
}

/// Keyring wrapping data keys under a static AES-256-GCM key
///
/// Uses the raw AES keyring layout: provider info is the key name, the tag
/// length in bits, the IV length and the IV; the wrapped key is ciphertext
/// followed by the tag, authenticated with the serialized encryption context.
pub struct RawAesKeyring {
    namespace: String,
    name: String,
    wrapping_key: Vec<u8>,
}

const RAW_AES_TAG_BITS: u32 = 128;
const RAW_AES_IV_LEN: usize = 12;

impl RawAesKeyring {
    pub fn new(namespace: &str, name: &str, wrapping_key: Vec<u8>) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            wrapping_key,
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm, KeyringError> {
        Aes256Gcm::new_from_slice(&self.wrapping_key)
            .map_err(|_| KeyringError::Kms("wrapping key must be 32 bytes".to_string()))
    }

    /// Pairs sorted by key, prefixed by their count; nothing at all when empty
    fn context_aad(context: &EncryptionContext) -> Vec<u8> {
        let mut aad = Vec::new();
        if context.is_empty() {
            return aad;
        }
        aad.extend_from_slice(&(context.len() as u16).to_be_bytes());
        for (key, value) in context {
            for field in [key.as_bytes(), value.as_bytes()] {
                aad.extend_from_slice(&(field.len() as u16).to_be_bytes());
                aad.extend_from_slice(field);
            }
        }
        aad
    }
}

#[async_trait]
impl Keyring for RawAesKeyring {
    async fn on_encrypt(
        &self,
        suite: AlgorithmSuite,
        context: &EncryptionContext,
    ) -> Result<EncryptionMaterials, KeyringError> {
        let mut data_key = vec![0u8; suite.key_len()];
        rand::thread_rng().fill_bytes(&mut data_key);
        let mut iv = [0u8; RAW_AES_IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let aad = Self::context_aad(context);
        let wrapped = self
            .cipher()?
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &data_key,
                    aad: &aad,
                },
            )
            .map_err(|_| KeyringError::Kms("wrapping failed".to_string()))?;

        let mut info = self.name.as_bytes().to_vec();
        info.extend_from_slice(&RAW_AES_TAG_BITS.to_be_bytes());
        info.extend_from_slice(&(RAW_AES_IV_LEN as u32).to_be_bytes());
        info.extend_from_slice(&iv);

        Ok(EncryptionMaterials {
            data_key,
            encrypted_data_keys: vec![EncryptedDataKey::new(self.namespace.clone(), info, wrapped)],
        })
    }

    async fn on_decrypt(
        &self,
        _suite: AlgorithmSuite,
        encrypted_data_keys: &[EncryptedDataKey],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KeyringError> {
        let cipher = self.cipher()?;
        let aad = Self::context_aad(context);

        for edk in encrypted_data_keys {
            if edk.provider_id != self.namespace {
                continue;
            }
            let Some(rest) = edk.provider_info.strip_prefix(self.name.as_bytes()) else {
                continue;
            };
            if rest.len() != 8 + RAW_AES_IV_LEN
                || rest[..4] != RAW_AES_TAG_BITS.to_be_bytes()
                || rest[4..8] != (RAW_AES_IV_LEN as u32).to_be_bytes()
            {
                continue;
            }
            let unwrapped = cipher.decrypt(
                Nonce::from_slice(&rest[8..]),
                Payload {
                    msg: &edk.ciphertext,
                    aad: &aad,
                },
            );
            if let Ok(data_key) = unwrapped {
                return Ok(data_key);
            }
        }

        Err(KeyringError::NoMatchingKey)
    }
}

/// Encrypt a verification code the way the identity provider does
pub async fn encrypt_code(kms: &Arc<InMemoryKms>, key_id: &str, code: &str) -> String {
    let keyring = KmsKeyring::new(kms.clone(), Some(key_id.to_string()), vec![]);
    let mut context = EncryptionContext::new();
    context.insert("userpool-id".to_string(), "sa-east-1_EXAMPLE".to_string());
    let message = EnvelopeClient::default()
        .encrypt(&keyring, code.as_bytes(), context, EncryptOptions::default())
        .await
        .unwrap();
    BASE64.encode(message)
}

/// Environment for a fully configured sender pointed at `sendgrid_base`
pub fn test_env(sendgrid_base: &str) -> HashMap<String, String> {
    [
        ("SENDGRID_API_KEY", "SG.test-key"),
        ("SENDGRID_API_BASE", sendgrid_base),
        ("FROM_EMAIL", "noreply@example.com"),
        ("KEY_ID", KEY_ARN),
        ("KEY_ALIAS", KEY_ALIAS),
        ("SIGN_UP_TEMPLATE_ID", "d-signup"),
        ("SIGN_UP_SUBJECT", "Welcome to Example"),
        ("FORGOT_PASSWORD_TEMPLATE_ID", "d-forgot"),
        ("FORGOT_PASSWORD_SUBJECT", "Reset your password"),
        ("LOGIN_TEMPLATE_ID", "d-login"),
        ("LOGIN_SUBJECT", "New sign-in to your account"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn config_from(env: &HashMap<String, String>) -> Config {
    Config::from_lookup(|name| env.get(name).cloned()).unwrap()
}

/// A trigger event as delivered by the user pool
pub fn trigger_event(trigger_source: &str, code: Option<&str>) -> TriggerEvent {
    let mut request = json!({
        "type": "customEmailSenderRequestV1",
        "clientMetadata": {},
        "userAttributes": {
            "sub": "4f1c2f0e-0000-4000-8000-000000000000",
            "email_verified": "false",
            "email": "john.doe@example.com",
            "name": "John Doe"
        }
    });
    if let Some(code) = code {
        request["code"] = json!(code);
    }

    serde_json::from_value(json!({
        "version": "1",
        "triggerSource": trigger_source,
        "region": "sa-east-1",
        "userPoolId": "sa-east-1_EXAMPLE",
        "userName": "4f1c2f0e-0000-4000-8000-000000000000",
        "callerContext": {
            "awsSdkVersion": "aws-sdk-unknown-unknown",
            "clientId": "example-client"
        },
        "request": request,
        "response": {}
    }))
    .unwrap()
}
