//! Envelope algorithm suites and commitment policy

use super::envelope::EnvelopeError;

/// Key derivation applied to the data key before content encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kdf {
    /// The data key is used directly
    Identity,
    HkdfSha256,
    HkdfSha384,
    /// HKDF-SHA512 with a key commitment value in the header
    HkdfSha512Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    EcdsaP256,
    EcdsaP384,
}

/// Message format version carried in the first header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormatVersion {
    V1 = 1,
    V2 = 2,
}

/// Supported algorithm suites, identified on the wire by a u16
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmSuite {
    Aes128GcmIv12Tag16NoKdf,
    Aes192GcmIv12Tag16NoKdf,
    Aes256GcmIv12Tag16NoKdf,
    Aes128GcmIv12Tag16HkdfSha256,
    Aes192GcmIv12Tag16HkdfSha256,
    Aes256GcmIv12Tag16HkdfSha256,
    Aes128GcmIv12Tag16HkdfSha256EcdsaP256,
    Aes192GcmIv12Tag16HkdfSha384EcdsaP384,
    Aes256GcmIv12Tag16HkdfSha384EcdsaP384,
    Aes256GcmHkdfSha512CommitKey,
    Aes256GcmHkdfSha512CommitKeyEcdsaP384,
}

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
/// Length of the key commitment value stored in a v2 header
pub const COMMITMENT_LEN: usize = 32;

impl AlgorithmSuite {
    pub fn from_id(id: u16) -> Result<Self, EnvelopeError> {
        Ok(match id {
            0x0014 => Self::Aes128GcmIv12Tag16NoKdf,
            0x0046 => Self::Aes192GcmIv12Tag16NoKdf,
            0x0078 => Self::Aes256GcmIv12Tag16NoKdf,
            0x0114 => Self::Aes128GcmIv12Tag16HkdfSha256,
            0x0146 => Self::Aes192GcmIv12Tag16HkdfSha256,
            0x0178 => Self::Aes256GcmIv12Tag16HkdfSha256,
            0x0214 => Self::Aes128GcmIv12Tag16HkdfSha256EcdsaP256,
            0x0346 => Self::Aes192GcmIv12Tag16HkdfSha384EcdsaP384,
            0x0378 => Self::Aes256GcmIv12Tag16HkdfSha384EcdsaP384,
            0x0478 => Self::Aes256GcmHkdfSha512CommitKey,
            0x0578 => Self::Aes256GcmHkdfSha512CommitKeyEcdsaP384,
            other => return Err(EnvelopeError::UnsupportedAlgorithm(other)),
        })
    }

    pub fn id(&self) -> u16 {
        match self {
            Self::Aes128GcmIv12Tag16NoKdf => 0x0014,
            Self::Aes192GcmIv12Tag16NoKdf => 0x0046,
            Self::Aes256GcmIv12Tag16NoKdf => 0x0078,
            Self::Aes128GcmIv12Tag16HkdfSha256 => 0x0114,
            Self::Aes192GcmIv12Tag16HkdfSha256 => 0x0146,
            Self::Aes256GcmIv12Tag16HkdfSha256 => 0x0178,
            Self::Aes128GcmIv12Tag16HkdfSha256EcdsaP256 => 0x0214,
            Self::Aes192GcmIv12Tag16HkdfSha384EcdsaP384 => 0x0346,
            Self::Aes256GcmIv12Tag16HkdfSha384EcdsaP384 => 0x0378,
            Self::Aes256GcmHkdfSha512CommitKey => 0x0478,
            Self::Aes256GcmHkdfSha512CommitKeyEcdsaP384 => 0x0578,
        }
    }

    /// AES key length in bytes (also the data key length)
    pub fn key_len(&self) -> usize {
        match self.id() & 0x00ff {
            0x14 => 16,
            0x46 => 24,
            _ => 32,
        }
    }

    pub fn kdf(&self) -> Kdf {
        match self {
            Self::Aes128GcmIv12Tag16NoKdf
            | Self::Aes192GcmIv12Tag16NoKdf
            | Self::Aes256GcmIv12Tag16NoKdf => Kdf::Identity,
            Self::Aes128GcmIv12Tag16HkdfSha256
            | Self::Aes192GcmIv12Tag16HkdfSha256
            | Self::Aes256GcmIv12Tag16HkdfSha256
            | Self::Aes128GcmIv12Tag16HkdfSha256EcdsaP256 => Kdf::HkdfSha256,
            Self::Aes192GcmIv12Tag16HkdfSha384EcdsaP384
            | Self::Aes256GcmIv12Tag16HkdfSha384EcdsaP384 => Kdf::HkdfSha384,
            Self::Aes256GcmHkdfSha512CommitKey | Self::Aes256GcmHkdfSha512CommitKeyEcdsaP384 => {
                Kdf::HkdfSha512Commit
            }
        }
    }

    pub fn signature(&self) -> Option<SignatureAlgorithm> {
        match self {
            Self::Aes128GcmIv12Tag16HkdfSha256EcdsaP256 => Some(SignatureAlgorithm::EcdsaP256),
            Self::Aes192GcmIv12Tag16HkdfSha384EcdsaP384
            | Self::Aes256GcmIv12Tag16HkdfSha384EcdsaP384
            | Self::Aes256GcmHkdfSha512CommitKeyEcdsaP384 => Some(SignatureAlgorithm::EcdsaP384),
            _ => None,
        }
    }

    pub fn is_committing(&self) -> bool {
        self.kdf() == Kdf::HkdfSha512Commit
    }

    pub fn message_format_version(&self) -> MessageFormatVersion {
        if self.is_committing() {
            MessageFormatVersion::V2
        } else {
            MessageFormatVersion::V1
        }
    }

    /// Message id length for this suite's message format
    pub fn message_id_len(&self) -> usize {
        match self.message_format_version() {
            MessageFormatVersion::V1 => 16,
            MessageFormatVersion::V2 => 32,
        }
    }
}

/// Which suites may be used to encrypt and which are accepted on decrypt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitmentPolicy {
    ForbidEncryptAllowDecrypt,
    #[default]
    RequireEncryptAllowDecrypt,
    RequireEncryptRequireDecrypt,
}

impl CommitmentPolicy {
    pub fn check_encrypt(&self, suite: AlgorithmSuite) -> Result<(), EnvelopeError> {
        let allowed = match self {
            Self::ForbidEncryptAllowDecrypt => !suite.is_committing(),
            Self::RequireEncryptAllowDecrypt | Self::RequireEncryptRequireDecrypt => {
                suite.is_committing()
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(EnvelopeError::CommitmentPolicy(format!(
                "{:?} does not allow encrypting with suite {:#06x}",
                self,
                suite.id()
            )))
        }
    }

    pub fn check_decrypt(&self, suite: AlgorithmSuite) -> Result<(), EnvelopeError> {
        if *self == Self::RequireEncryptRequireDecrypt && !suite.is_committing() {
            return Err(EnvelopeError::CommitmentPolicy(format!(
                "{:?} does not allow decrypting suite {:#06x}",
                self,
                suite.id()
            )));
        }
        Ok(())
    }
}
