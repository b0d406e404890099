//! Envelope message header codec
//!
//! Version 1 headers carry 16-byte message ids and an explicit IV length;
//! version 2 headers carry 32-byte message ids and the key commitment value.
//! All integers are big-endian.

use super::envelope::EnvelopeError;
use super::suite::{AlgorithmSuite, MessageFormatVersion, COMMITMENT_LEN, IV_LEN};
use std::collections::BTreeMap;

/// Key/value pairs authenticated with the message, sorted by key
pub type EncryptionContext = BTreeMap<String, String>;

/// Customer authenticated encrypted data (v1 only)
const V1_MESSAGE_TYPE: u8 = 0x80;

/// A data key wrapped by one master key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedDataKey {
    pub provider_id: String,
    pub provider_info: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl EncryptedDataKey {
    pub fn new(
        provider_id: impl Into<String>,
        provider_info: impl Into<Vec<u8>>,
        ciphertext: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            provider_info: provider_info.into(),
            ciphertext: ciphertext.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    NonFramed = 1,
    Framed = 2,
}

impl ContentType {
    fn from_byte(byte: u8) -> Result<Self, EnvelopeError> {
        match byte {
            1 => Ok(Self::NonFramed),
            2 => Ok(Self::Framed),
            other => Err(EnvelopeError::InvalidFormat(format!(
                "unknown content type {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: MessageFormatVersion,
    pub suite: AlgorithmSuite,
    pub message_id: Vec<u8>,
    pub encryption_context: EncryptionContext,
    pub encrypted_data_keys: Vec<EncryptedDataKey>,
    pub content_type: ContentType,
    /// Zero for non-framed content
    pub frame_length: u32,
    /// Key commitment value (v2 only)
    pub commitment: Option<Vec<u8>>,
}

impl MessageHeader {
    /// Read a header from the front of `reader`
    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self, EnvelopeError> {
        let version = match reader.u8()? {
            1 => MessageFormatVersion::V1,
            2 => MessageFormatVersion::V2,
            other => return Err(EnvelopeError::UnsupportedVersion(other)),
        };

        if version == MessageFormatVersion::V1 {
            let message_type = reader.u8()?;
            if message_type != V1_MESSAGE_TYPE {
                return Err(EnvelopeError::InvalidFormat(format!(
                    "unknown message type {:#04x}",
                    message_type
                )));
            }
        }

        let suite = AlgorithmSuite::from_id(reader.u16()?)?;
        if suite.message_format_version() != version {
            return Err(EnvelopeError::InvalidFormat(format!(
                "suite {:#06x} cannot be used with message format {:?}",
                suite.id(),
                version
            )));
        }

        let message_id = reader.take(suite.message_id_len())?.to_vec();
        let encryption_context = parse_encryption_context(reader)?;
        let encrypted_data_keys = parse_encrypted_data_keys(reader)?;
        let content_type = ContentType::from_byte(reader.u8()?)?;

        if version == MessageFormatVersion::V1 {
            if reader.take(4)? != [0u8; 4] {
                return Err(EnvelopeError::InvalidFormat(
                    "reserved header bytes are not zero".to_string(),
                ));
            }
            let iv_len = reader.u8()? as usize;
            if iv_len != IV_LEN {
                return Err(EnvelopeError::InvalidFormat(format!(
                    "unexpected IV length {}",
                    iv_len
                )));
            }
        }

        let frame_length = reader.u32()?;
        match content_type {
            ContentType::NonFramed if frame_length != 0 => {
                return Err(EnvelopeError::InvalidFormat(
                    "non-framed content with a frame length".to_string(),
                ))
            }
            ContentType::Framed if frame_length == 0 => {
                return Err(EnvelopeError::InvalidFormat(
                    "framed content with zero frame length".to_string(),
                ))
            }
            _ => {}
        }

        let commitment = match version {
            MessageFormatVersion::V1 => None,
            MessageFormatVersion::V2 => Some(reader.take(COMMITMENT_LEN)?.to_vec()),
        };

        Ok(Self {
            version,
            suite,
            message_id,
            encryption_context,
            encrypted_data_keys,
            content_type,
            frame_length,
            commitment,
        })
    }

    /// Serialize the header body (everything the header auth tag covers)
    pub fn serialize(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut out = Vec::with_capacity(256);
        out.push(self.version as u8);
        if self.version == MessageFormatVersion::V1 {
            out.push(V1_MESSAGE_TYPE);
        }
        out.extend_from_slice(&self.suite.id().to_be_bytes());
        out.extend_from_slice(&self.message_id);

        let context = serialize_encryption_context(&self.encryption_context)?;
        out.extend_from_slice(&length_u16(context.len())?.to_be_bytes());
        out.extend_from_slice(&context);

        if self.encrypted_data_keys.is_empty() {
            return Err(EnvelopeError::InvalidFormat(
                "at least one encrypted data key is required".to_string(),
            ));
        }
        out.extend_from_slice(&length_u16(self.encrypted_data_keys.len())?.to_be_bytes());
        for edk in &self.encrypted_data_keys {
            write_field(&mut out, edk.provider_id.as_bytes())?;
            write_field(&mut out, &edk.provider_info)?;
            write_field(&mut out, &edk.ciphertext)?;
        }

        out.push(self.content_type as u8);
        if self.version == MessageFormatVersion::V1 {
            out.extend_from_slice(&[0u8; 4]);
            out.push(IV_LEN as u8);
        }
        out.extend_from_slice(&self.frame_length.to_be_bytes());

        if let Some(commitment) = &self.commitment {
            out.extend_from_slice(commitment);
        }
        Ok(out)
    }
}

/// Serialize an encryption context as stored in the header AAD field
///
/// An empty context serializes to zero bytes (no pair count).
pub fn serialize_encryption_context(context: &EncryptionContext) -> Result<Vec<u8>, EnvelopeError> {
    if context.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    out.extend_from_slice(&length_u16(context.len())?.to_be_bytes());
    for (key, value) in context {
        write_field(&mut out, key.as_bytes())?;
        write_field(&mut out, value.as_bytes())?;
    }
    length_u16(out.len())?;
    Ok(out)
}

fn parse_encryption_context(reader: &mut Reader<'_>) -> Result<EncryptionContext, EnvelopeError> {
    let aad_len = reader.u16()? as usize;
    let mut context = EncryptionContext::new();
    if aad_len == 0 {
        return Ok(context);
    }

    let mut aad = Reader::new(reader.take(aad_len)?);
    let count = aad.u16()?;
    for _ in 0..count {
        let key = utf8(aad.field()?)?;
        let value = utf8(aad.field()?)?;
        if context.insert(key, value).is_some() {
            return Err(EnvelopeError::InvalidFormat(
                "duplicate encryption context key".to_string(),
            ));
        }
    }
    if aad.remaining() != 0 {
        return Err(EnvelopeError::InvalidFormat(
            "encryption context length mismatch".to_string(),
        ));
    }
    Ok(context)
}

fn parse_encrypted_data_keys(reader: &mut Reader<'_>) -> Result<Vec<EncryptedDataKey>, EnvelopeError> {
    let count = reader.u16()?;
    if count == 0 {
        return Err(EnvelopeError::InvalidFormat(
            "message has no encrypted data keys".to_string(),
        ));
    }
    (0..count)
        .map(|_| {
            Ok(EncryptedDataKey {
                provider_id: utf8(reader.field()?)?,
                provider_info: reader.field()?.to_vec(),
                ciphertext: reader.field()?.to_vec(),
            })
        })
        .collect()
}

fn write_field(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), EnvelopeError> {
    out.extend_from_slice(&length_u16(bytes.len())?.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn length_u16(len: usize) -> Result<u16, EnvelopeError> {
    u16::try_from(len)
        .map_err(|_| EnvelopeError::InvalidFormat(format!("field of {} bytes is too long", len)))
}

fn utf8(bytes: &[u8]) -> Result<String, EnvelopeError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| EnvelopeError::InvalidFormat("header string is not UTF-8".to_string()))
}

/// Cursor over a serialized message
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Everything read so far
    pub(crate) fn consumed(&self) -> &'a [u8] {
        &self.buf[..self.pos]
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], EnvelopeError> {
        if len > self.remaining() {
            return Err(EnvelopeError::Truncated);
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, EnvelopeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, EnvelopeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, EnvelopeError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, EnvelopeError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// A u16 length-prefixed byte field
    pub(crate) fn field(&mut self) -> Result<&'a [u8], EnvelopeError> {
        let len = self.u16()? as usize;
        self.take(len)
    }
}
