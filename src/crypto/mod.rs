//! Envelope encryption for verification codes

pub mod code;
pub mod envelope;
pub mod header;
pub mod keyring;
pub mod suite;

pub use code::CodeDecryptor;
pub use envelope::{DecryptedMessage, EncryptOptions, EnvelopeClient, EnvelopeError};
pub use header::{EncryptedDataKey, EncryptionContext};
pub use keyring::{
    GeneratedDataKey, KeyManagementService, KeyringError, Keyring, KmsKeyService, KmsKeyring,
    UnwrappedKey, WrappedKey,
};
pub use suite::{AlgorithmSuite, CommitmentPolicy};
