//! Known-answer decryption of envelope messages produced outside this crate
//!
//! `fixtures/envelope_vectors.json` holds messages written by an independent
//! encoder of the message format, wrapped with a raw AES keyring.

mod common;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use common::RawAesKeyring;
use custom_email_sender::crypto::{
    AlgorithmSuite, CommitmentPolicy, EncryptOptions, EncryptionContext, EnvelopeClient,
    EnvelopeError, KeyringError,
};
use pretty_assertions::assert_eq;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct VectorFile {
    key_namespace: String,
    key_name: String,
    wrapping_key: String,
    vectors: Vec<Vector>,
}

#[derive(Debug, Deserialize)]
struct Vector {
    description: String,
    suite: u16,
    frame_length: u32,
    plaintext: String,
    ciphertext: String,
}

impl Vector {
    fn message(&self) -> Vec<u8> {
        BASE64.decode(&self.ciphertext).unwrap()
    }
}

fn load() -> (VectorFile, RawAesKeyring) {
    let file: VectorFile =
        serde_json::from_str(include_str!("fixtures/envelope_vectors.json")).unwrap();
    let keyring = RawAesKeyring::new(
        &file.key_namespace,
        &file.key_name,
        BASE64.decode(&file.wrapping_key).unwrap(),
    );
    (file, keyring)
}

fn vector<'a>(file: &'a VectorFile, description: &str) -> &'a Vector {
    file.vectors
        .iter()
        .find(|v| v.description == description)
        .unwrap_or_else(|| panic!("no vector named {}", description))
}

#[tokio::test]
async fn test_every_vector_decrypts() {
    let (file, keyring) = load();
    let client = EnvelopeClient::new(CommitmentPolicy::RequireEncryptAllowDecrypt);

    let mut suites_seen = std::collections::BTreeSet::new();
    for vector in &file.vectors {
        let decrypted = client
            .decrypt(&keyring, &vector.message())
            .await
            .unwrap_or_else(|e| panic!("{}: {}", vector.description, e));

        assert_eq!(
            String::from_utf8(decrypted.plaintext).unwrap(),
            vector.plaintext,
            "{}",
            vector.description
        );
        assert_eq!(decrypted.suite.id(), vector.suite, "{}", vector.description);
        suites_seen.insert(vector.suite);

        let signed = decrypted.suite.signature().is_some();
        assert_eq!(
            decrypted
                .encryption_context
                .contains_key("aws-crypto-public-key"),
            signed,
            "{}",
            vector.description
        );
    }

    for required in [0x0178, 0x0378, 0x0578] {
        assert!(suites_seen.contains(&required), "missing suite {:#06x}", required);
    }
}

#[tokio::test]
async fn test_vector_encryption_context() {
    let (file, keyring) = load();
    let client = EnvelopeClient::default();

    let decrypted = client
        .decrypt(&keyring, &vector(&file, "0x0578 framed").message())
        .await
        .unwrap();
    assert_eq!(
        decrypted.encryption_context.get("userpool-id").map(String::as_str),
        Some("sa-east-1_EXAMPLE")
    );
    assert_eq!(
        decrypted.encryption_context.get("purpose").map(String::as_str),
        Some("verification-code")
    );

    let decrypted = client
        .decrypt(
            &keyring,
            &vector(&file, "0x0178 non-framed empty context").message(),
        )
        .await
        .unwrap();
    assert!(decrypted.encryption_context.is_empty());
    assert_eq!(decrypted.plaintext, b"482913");
}

#[tokio::test]
async fn test_empty_final_frame() {
    let (file, keyring) = load();
    for description in ["0x0378 multi-frame", "0x0578 multi-frame"] {
        let vector = vector(&file, description);
        assert_eq!(vector.frame_length, 4);
        let decrypted = EnvelopeClient::default()
            .decrypt(&keyring, &vector.message())
            .await
            .unwrap();
        assert_eq!(decrypted.plaintext, b"48291377");
    }
}

#[tokio::test]
async fn test_strict_policy_accepts_only_committing_vectors() {
    let (file, keyring) = load();
    let client = EnvelopeClient::new(CommitmentPolicy::RequireEncryptRequireDecrypt);

    for vector in &file.vectors {
        let committing = AlgorithmSuite::from_id(vector.suite).unwrap().is_committing();
        let result = client.decrypt(&keyring, &vector.message()).await;
        if committing {
            assert!(result.is_ok(), "{}", vector.description);
        } else {
            assert!(
                matches!(result, Err(EnvelopeError::CommitmentPolicy(_))),
                "{}",
                vector.description
            );
        }
    }
}

#[tokio::test]
async fn test_any_flipped_byte_is_rejected() {
    let (file, keyring) = load();
    let client = EnvelopeClient::default();

    for description in ["0x0578 multi-frame-remainder", "0x0178 non-framed empty context"] {
        let original = vector(&file, description).message();
        for index in 0..original.len() {
            let mut message = original.clone();
            message[index] ^= 0x01;
            assert!(
                client.decrypt(&keyring, &message).await.is_err(),
                "{}: flipping byte {} was accepted",
                description,
                index
            );
        }
    }
}

#[tokio::test]
async fn test_wrong_wrapping_key_finds_no_data_key() {
    let (file, _) = load();
    let keyring = RawAesKeyring::new(&file.key_namespace, &file.key_name, vec![0u8; 32]);

    let result = EnvelopeClient::default()
        .decrypt(&keyring, &vector(&file, "0x0378 framed").message())
        .await;
    assert!(matches!(
        result,
        Err(EnvelopeError::Keyring(KeyringError::NoMatchingKey))
    ));
}

#[tokio::test]
async fn test_own_messages_use_same_keyring_layout() {
    let (_, keyring) = load();
    let mut context = EncryptionContext::new();
    context.insert("userpool-id".to_string(), "sa-east-1_EXAMPLE".to_string());

    let message = EnvelopeClient::default()
        .encrypt(&keyring, b"105511", context, EncryptOptions::default())
        .await
        .unwrap();
    let decrypted = EnvelopeClient::default()
        .decrypt(&keyring, &message)
        .await
        .unwrap();
    assert_eq!(decrypted.plaintext, b"105511");
}
