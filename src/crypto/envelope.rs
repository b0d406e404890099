//! Envelope encryption client
//!
//! Reads and writes AWS Encryption SDK messages: a header naming the
//! algorithm suite and the wrapped data keys, an AES-GCM body split into
//! frames, and an ECDSA signature footer for signed suites. The data key
//! itself is obtained from a [`Keyring`].

use super::header::{ContentType, EncryptionContext, MessageHeader, Reader};
use super::keyring::{Keyring, KeyringError};
use super::suite::{
    AlgorithmSuite, CommitmentPolicy, Kdf, MessageFormatVersion, SignatureAlgorithm,
    COMMITMENT_LEN, IV_LEN, TAG_LEN,
};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hkdf::Hkdf;
use p384::ecdsa::signature::{Signer, Verifier};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;

type Aes192Gcm = AesGcm<aes_gcm::aes::Aes192, aes_gcm::aead::consts::U12>;

/// Encryption context key holding the base64 compressed signing public key
pub const PUBLIC_KEY_CONTEXT_KEY: &str = "aws-crypto-public-key";
/// Prefix reserved for context entries written by the client itself
const RESERVED_CONTEXT_PREFIX: &str = "aws-crypto-";

const FRAME_AAD: &[u8] = b"AWSKMSEncryptionClient Frame";
const FINAL_FRAME_AAD: &[u8] = b"AWSKMSEncryptionClient Final Frame";
const SINGLE_BLOCK_AAD: &[u8] = b"AWSKMSEncryptionClient Single Block";
const FINAL_FRAME_MARKER: u32 = 0xFFFF_FFFF;

pub const DEFAULT_FRAME_LENGTH: u32 = 4096;

/// Envelope encryption error types
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Message is truncated")]
    Truncated,

    #[error("Unsupported message format version {0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported algorithm suite {0:#06x}")]
    UnsupportedAlgorithm(u16),

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Commitment policy violation: {0}")]
    CommitmentPolicy(String),

    #[error("Keyring error: {0}")]
    Keyring(#[from] KeyringError),

    #[error("Key derivation failed")]
    KeyDerivation,

    #[error("Key commitment does not match")]
    CommitmentMismatch,

    #[error("Authentication failed: invalid ciphertext or wrong key")]
    AuthenticationFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Signing public key missing from encryption context")]
    MissingPublicKey,

    #[error("Invalid message signature")]
    InvalidSignature,
}

/// Result of a successful decrypt
#[derive(Debug, Clone)]
pub struct DecryptedMessage {
    pub plaintext: Vec<u8>,
    pub encryption_context: EncryptionContext,
    pub suite: AlgorithmSuite,
}

/// Options for [`EnvelopeClient::encrypt`]
#[derive(Debug, Clone, Copy)]
pub struct EncryptOptions {
    pub suite: AlgorithmSuite,
    /// Zero writes a single non-framed block
    pub frame_length: u32,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            suite: AlgorithmSuite::Aes256GcmHkdfSha512CommitKeyEcdsaP384,
            frame_length: DEFAULT_FRAME_LENGTH,
        }
    }
}

/// Encrypts and decrypts envelope messages under a commitment policy
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeClient {
    policy: CommitmentPolicy,
}

impl EnvelopeClient {
    pub fn new(policy: CommitmentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> CommitmentPolicy {
        self.policy
    }

    /// Decrypt and authenticate a complete message
    pub async fn decrypt(
        &self,
        keyring: &dyn Keyring,
        message: &[u8],
    ) -> Result<DecryptedMessage, EnvelopeError> {
        let mut reader = Reader::new(message);
        let header = MessageHeader::parse(&mut reader)?;
        let header_bytes = reader.consumed();
        let suite = header.suite;
        self.policy.check_decrypt(suite)?;

        let header_iv = match header.version {
            MessageFormatVersion::V1 => reader.take(IV_LEN)?.to_vec(),
            MessageFormatVersion::V2 => vec![0u8; IV_LEN],
        };
        let header_tag = reader.take(TAG_LEN)?;

        let data_key = keyring
            .on_decrypt(suite, &header.encrypted_data_keys, &header.encryption_context)
            .await?;
        if data_key.len() != suite.key_len() {
            return Err(KeyringError::InvalidDataKey(data_key.len()).into());
        }

        let keys = derive_keys(suite, &data_key, &header.message_id)?;
        if let (Some(expected), Some(actual)) = (&keys.commitment, &header.commitment) {
            if !constant_time_eq(expected, actual) {
                return Err(EnvelopeError::CommitmentMismatch);
            }
        }

        let cipher = ContentCipher::new(suite, &keys.content_key)?;
        let header_plaintext = cipher.open(&header_iv, header_bytes, &[], header_tag)?;
        if !header_plaintext.is_empty() {
            return Err(EnvelopeError::AuthenticationFailed);
        }

        let verifier = match suite.signature() {
            Some(algorithm) => Some(MessageVerifier::from_context(
                algorithm,
                &header.encryption_context,
            )?),
            None => None,
        };

        let plaintext = match header.content_type {
            ContentType::Framed => read_framed_body(&mut reader, &cipher, &header)?,
            ContentType::NonFramed => read_single_block(&mut reader, &cipher, &header)?,
        };

        if let Some(verifier) = verifier {
            let signed = reader.consumed();
            let signature = reader.field()?;
            verifier.verify(signed, signature)?;
        }

        if reader.remaining() != 0 {
            return Err(EnvelopeError::InvalidFormat(
                "trailing bytes after message".to_string(),
            ));
        }

        Ok(DecryptedMessage {
            plaintext,
            encryption_context: header.encryption_context,
            suite,
        })
    }

    /// Encrypt `plaintext` into a complete message
    pub async fn encrypt(
        &self,
        keyring: &dyn Keyring,
        plaintext: &[u8],
        mut context: EncryptionContext,
        options: EncryptOptions,
    ) -> Result<Vec<u8>, EnvelopeError> {
        let suite = options.suite;
        self.policy.check_encrypt(suite)?;

        if context.keys().any(|key| key.starts_with(RESERVED_CONTEXT_PREFIX)) {
            return Err(EnvelopeError::InvalidFormat(format!(
                "encryption context keys may not start with {}",
                RESERVED_CONTEXT_PREFIX
            )));
        }

        let signer = suite.signature().map(MessageSigner::generate);
        if let Some(signer) = &signer {
            context.insert(PUBLIC_KEY_CONTEXT_KEY.to_string(), signer.public_key());
        }

        let materials = keyring.on_encrypt(suite, &context).await?;
        if materials.data_key.len() != suite.key_len() {
            return Err(KeyringError::InvalidDataKey(materials.data_key.len()).into());
        }

        let mut message_id = vec![0u8; suite.message_id_len()];
        OsRng.fill_bytes(&mut message_id);

        let keys = derive_keys(suite, &materials.data_key, &message_id)?;
        let header = MessageHeader {
            version: suite.message_format_version(),
            suite,
            message_id,
            encryption_context: context,
            encrypted_data_keys: materials.encrypted_data_keys,
            content_type: if options.frame_length == 0 {
                ContentType::NonFramed
            } else {
                ContentType::Framed
            },
            frame_length: options.frame_length,
            commitment: keys.commitment.clone(),
        };

        let cipher = ContentCipher::new(suite, &keys.content_key)?;
        let mut message = header.serialize()?;
        let header_iv = [0u8; IV_LEN];
        let header_tag = cipher.seal(&header_iv, &message, &[])?;
        if header.version == MessageFormatVersion::V1 {
            message.extend_from_slice(&header_iv);
        }
        message.extend_from_slice(&header_tag);

        match header.content_type {
            ContentType::Framed => write_framed_body(&mut message, &cipher, &header, plaintext)?,
            ContentType::NonFramed => write_single_block(&mut message, &cipher, &header, plaintext)?,
        }

        if let Some(signer) = signer {
            let signature = signer.sign(&message);
            let len = u16::try_from(signature.len()).map_err(|_| EnvelopeError::EncryptionFailed)?;
            message.extend_from_slice(&len.to_be_bytes());
            message.extend_from_slice(&signature);
        }

        Ok(message)
    }
}

struct DerivedKeys {
    content_key: Vec<u8>,
    commitment: Option<Vec<u8>>,
}

fn derive_keys(
    suite: AlgorithmSuite,
    data_key: &[u8],
    message_id: &[u8],
) -> Result<DerivedKeys, EnvelopeError> {
    let suite_id = suite.id().to_be_bytes();
    match suite.kdf() {
        Kdf::Identity => Ok(DerivedKeys {
            content_key: data_key.to_vec(),
            commitment: None,
        }),
        Kdf::HkdfSha256 | Kdf::HkdfSha384 => {
            let info = [&suite_id[..], message_id].concat();
            Ok(DerivedKeys {
                content_key: hkdf(suite.kdf(), None, data_key, &info, suite.key_len())?,
                commitment: None,
            })
        }
        Kdf::HkdfSha512Commit => {
            let info = [&suite_id[..], b"DERIVEKEY"].concat();
            Ok(DerivedKeys {
                content_key: hkdf(suite.kdf(), Some(message_id), data_key, &info, suite.key_len())?,
                commitment: Some(hkdf(
                    suite.kdf(),
                    Some(message_id),
                    data_key,
                    b"COMMITKEY",
                    COMMITMENT_LEN,
                )?),
            })
        }
    }
}

fn hkdf(
    kdf: Kdf,
    salt: Option<&[u8]>,
    ikm: &[u8],
    info: &[u8],
    len: usize,
) -> Result<Vec<u8>, EnvelopeError> {
    let mut okm = vec![0u8; len];
    let expanded = match kdf {
        Kdf::HkdfSha256 => Hkdf::<Sha256>::new(salt, ikm).expand(info, &mut okm),
        Kdf::HkdfSha384 => Hkdf::<Sha384>::new(salt, ikm).expand(info, &mut okm),
        Kdf::HkdfSha512Commit => Hkdf::<Sha512>::new(salt, ikm).expand(info, &mut okm),
        Kdf::Identity => return Err(EnvelopeError::KeyDerivation),
    };
    expanded.map_err(|_| EnvelopeError::KeyDerivation)?;
    Ok(okm)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// AES-GCM keyed with the derived content key
enum ContentCipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl ContentCipher {
    fn new(suite: AlgorithmSuite, key: &[u8]) -> Result<Self, EnvelopeError> {
        let invalid = |_| EnvelopeError::KeyDerivation;
        Ok(match suite.key_len() {
            16 => Self::Aes128(Aes128Gcm::new_from_slice(key).map_err(invalid)?),
            24 => Self::Aes192(Aes192Gcm::new_from_slice(key).map_err(invalid)?),
            _ => Self::Aes256(Aes256Gcm::new_from_slice(key).map_err(invalid)?),
        })
    }

    /// Encrypt, returning ciphertext followed by the tag
    fn seal(&self, iv: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let nonce = GenericArray::from_slice(iv);
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        let sealed = match self {
            Self::Aes128(cipher) => cipher.encrypt(nonce, payload),
            Self::Aes192(cipher) => cipher.encrypt(nonce, payload),
            Self::Aes256(cipher) => cipher.encrypt(nonce, payload),
        };
        sealed.map_err(|_| EnvelopeError::EncryptionFailed)
    }

    fn open(
        &self,
        iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, EnvelopeError> {
        if iv.len() != IV_LEN {
            return Err(EnvelopeError::InvalidFormat("bad IV length".to_string()));
        }
        let nonce = GenericArray::from_slice(iv);
        let sealed = [ciphertext, tag].concat();
        let payload = Payload { msg: &sealed, aad };
        let opened = match self {
            Self::Aes128(cipher) => cipher.decrypt(nonce, payload),
            Self::Aes192(cipher) => cipher.decrypt(nonce, payload),
            Self::Aes256(cipher) => cipher.decrypt(nonce, payload),
        };
        opened.map_err(|_| EnvelopeError::AuthenticationFailed)
    }
}

/// Frame IV: the sequence number left-padded with zeros
fn frame_iv(sequence: u32) -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    iv[IV_LEN - 4..].copy_from_slice(&sequence.to_be_bytes());
    iv
}

fn body_aad(message_id: &[u8], content: &[u8], sequence: u32, length: u64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(message_id.len() + content.len() + 12);
    aad.extend_from_slice(message_id);
    aad.extend_from_slice(content);
    aad.extend_from_slice(&sequence.to_be_bytes());
    aad.extend_from_slice(&length.to_be_bytes());
    aad
}

fn read_framed_body(
    reader: &mut Reader<'_>,
    cipher: &ContentCipher,
    header: &MessageHeader,
) -> Result<Vec<u8>, EnvelopeError> {
    let frame_length = header.frame_length;
    let mut plaintext = Vec::new();
    let mut expected: u32 = 1;

    loop {
        let marker = reader.u32()?;
        let is_final = marker == FINAL_FRAME_MARKER;
        let sequence = if is_final { reader.u32()? } else { marker };
        if sequence != expected {
            return Err(EnvelopeError::InvalidFormat(format!(
                "frame {} out of order, expected {}",
                sequence, expected
            )));
        }

        let iv = reader.take(IV_LEN)?;
        if iv != frame_iv(sequence) {
            return Err(EnvelopeError::InvalidFormat(format!(
                "frame {} has an unexpected IV",
                sequence
            )));
        }

        let length = if is_final {
            let length = reader.u32()?;
            if length > frame_length {
                return Err(EnvelopeError::InvalidFormat(
                    "final frame longer than frame length".to_string(),
                ));
            }
            length
        } else {
            frame_length
        };

        let ciphertext = reader.take(length as usize)?;
        let tag = reader.take(TAG_LEN)?;
        let content = if is_final { FINAL_FRAME_AAD } else { FRAME_AAD };
        let aad = body_aad(&header.message_id, content, sequence, u64::from(length));
        plaintext.extend(cipher.open(iv, &aad, ciphertext, tag)?);

        if is_final {
            return Ok(plaintext);
        }
        expected = expected
            .checked_add(1)
            .filter(|next| *next != FINAL_FRAME_MARKER)
            .ok_or_else(|| EnvelopeError::InvalidFormat("too many frames".to_string()))?;
    }
}

fn read_single_block(
    reader: &mut Reader<'_>,
    cipher: &ContentCipher,
    header: &MessageHeader,
) -> Result<Vec<u8>, EnvelopeError> {
    let iv = reader.take(IV_LEN)?;
    let length = reader.u64()?;
    let length = usize::try_from(length).map_err(|_| EnvelopeError::Truncated)?;
    let ciphertext = reader.take(length)?;
    let tag = reader.take(TAG_LEN)?;
    let aad = body_aad(&header.message_id, SINGLE_BLOCK_AAD, 1, length as u64);
    cipher.open(iv, &aad, ciphertext, tag)
}

fn write_framed_body(
    out: &mut Vec<u8>,
    cipher: &ContentCipher,
    header: &MessageHeader,
    plaintext: &[u8],
) -> Result<(), EnvelopeError> {
    let frame_length = header.frame_length as usize;
    let mut chunks: Vec<&[u8]> = plaintext.chunks(frame_length).collect();
    let last = chunks.pop().unwrap_or(&[]);

    let mut sequence: u32 = 1;
    for chunk in chunks {
        let iv = frame_iv(sequence);
        let aad = body_aad(&header.message_id, FRAME_AAD, sequence, chunk.len() as u64);
        let sealed = cipher.seal(&iv, &aad, chunk)?;
        out.extend_from_slice(&sequence.to_be_bytes());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&sealed);
        sequence = sequence
            .checked_add(1)
            .filter(|next| *next != FINAL_FRAME_MARKER)
            .ok_or(EnvelopeError::EncryptionFailed)?;
    }

    let iv = frame_iv(sequence);
    let aad = body_aad(&header.message_id, FINAL_FRAME_AAD, sequence, last.len() as u64);
    let sealed = cipher.seal(&iv, &aad, last)?;
    out.extend_from_slice(&FINAL_FRAME_MARKER.to_be_bytes());
    out.extend_from_slice(&sequence.to_be_bytes());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&(last.len() as u32).to_be_bytes());
    out.extend_from_slice(&sealed);
    Ok(())
}

fn write_single_block(
    out: &mut Vec<u8>,
    cipher: &ContentCipher,
    header: &MessageHeader,
    plaintext: &[u8],
) -> Result<(), EnvelopeError> {
    let iv = frame_iv(1);
    let aad = body_aad(&header.message_id, SINGLE_BLOCK_AAD, 1, plaintext.len() as u64);
    let sealed = cipher.seal(&iv, &aad, plaintext)?;
    out.extend_from_slice(&iv);
    out.extend_from_slice(&(plaintext.len() as u64).to_be_bytes());
    out.extend_from_slice(&sealed);
    Ok(())
}

enum MessageSigner {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
}

impl MessageSigner {
    fn generate(algorithm: SignatureAlgorithm) -> Self {
        match algorithm {
            SignatureAlgorithm::EcdsaP256 => Self::P256(p256::ecdsa::SigningKey::random(&mut OsRng)),
            SignatureAlgorithm::EcdsaP384 => Self::P384(p384::ecdsa::SigningKey::random(&mut OsRng)),
        }
    }

    /// Base64 of the compressed SEC1 public point
    fn public_key(&self) -> String {
        match self {
            Self::P256(key) => BASE64.encode(key.verifying_key().to_encoded_point(true).as_bytes()),
            Self::P384(key) => BASE64.encode(key.verifying_key().to_encoded_point(true).as_bytes()),
        }
    }

    /// DER-encoded signature over `message`
    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::P256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                signature.to_der().as_bytes().to_vec()
            }
            Self::P384(key) => {
                let signature: p384::ecdsa::Signature = key.sign(message);
                signature.to_der().as_bytes().to_vec()
            }
        }
    }
}

enum MessageVerifier {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
}

impl MessageVerifier {
    fn from_context(
        algorithm: SignatureAlgorithm,
        context: &EncryptionContext,
    ) -> Result<Self, EnvelopeError> {
        let encoded = context
            .get(PUBLIC_KEY_CONTEXT_KEY)
            .ok_or(EnvelopeError::MissingPublicKey)?;
        let point = BASE64.decode(encoded)?;
        let invalid = |_| EnvelopeError::InvalidFormat("invalid signing public key".to_string());
        Ok(match algorithm {
            SignatureAlgorithm::EcdsaP256 => {
                Self::P256(p256::ecdsa::VerifyingKey::from_sec1_bytes(&point).map_err(invalid)?)
            }
            SignatureAlgorithm::EcdsaP384 => {
                Self::P384(p384::ecdsa::VerifyingKey::from_sec1_bytes(&point).map_err(invalid)?)
            }
        })
    }

    fn verify(&self, message: &[u8], der: &[u8]) -> Result<(), EnvelopeError> {
        let verified = match self {
            Self::P256(key) => {
                let signature = p256::ecdsa::Signature::from_der(der)
                    .map_err(|_| EnvelopeError::InvalidSignature)?;
                key.verify(message, &signature)
            }
            Self::P384(key) => {
                let signature = p384::ecdsa::Signature::from_der(der)
                    .map_err(|_| EnvelopeError::InvalidSignature)?;
                key.verify(message, &signature)
            }
        };
        verified.map_err(|_| EnvelopeError::InvalidSignature)
    }
}
