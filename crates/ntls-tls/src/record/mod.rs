//! TLS record layer: header framing and the two record protection modes.
//!
//! - [`cbc`]: MAC-then-encrypt with AES-CBC and HMAC (RFC 5246 6.2.3.2).
//! - [`gcm`]: AES-GCM with an explicit per-record nonce (RFC 5288).
//! - [`params`]: per-connection key material and sequence numbers.

pub mod cbc;
pub mod gcm;
pub mod params;

use crate::buffer::TlsReader;
use ntls_types::TlsError;

pub use params::CryptoParameters;

/// Record header: `content_type(1) || version(2) || length(2)`.
pub const RECORD_HEADER_LEN: usize = 5;
/// Largest plaintext fragment (2^14).
pub const MAX_FRAGMENT_SIZE: usize = 16384;
/// Largest protected fragment (2^14 + 2048).
pub const MAX_CIPHERTEXT_SIZE: usize = MAX_FRAGMENT_SIZE + 2048;

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

/// A decoded record header. The content type is kept raw so the caller can
/// decide how to reject unknown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: u8,
    pub version: u16,
    pub length: u16,
}

impl RecordHeader {
    pub fn parse(reader: &mut TlsReader<'_>) -> Result<Self, TlsError> {
        if reader.remaining() < RECORD_HEADER_LEN {
            return Err(TlsError::decode_error("truncated record header"));
        }
        Ok(Self {
            content_type: reader.read_u8()?,
            version: reader.read_u16()?,
            length: reader.read_u16()?,
        })
    }

    pub fn encode(&self) -> [u8; RECORD_HEADER_LEN] {
        let v = self.version.to_be_bytes();
        let l = self.length.to_be_bytes();
        [self.content_type, v[0], v[1], l[0], l[1]]
    }
}

/// Serialize one record: header followed by `fragment`.
pub fn encode_record(content_type: ContentType, version: u16, fragment: &[u8]) -> Vec<u8> {
    let header = RecordHeader {
        content_type: content_type as u8,
        version,
        length: fragment.len() as u16,
    };
    let mut out = Vec::with_capacity(RECORD_HEADER_LEN + fragment.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(fragment);
    out
}

/// Split a byte stream into whole records, returning them and the number of
/// bytes consumed. A trailing partial record is left for the next call.
pub fn split_records(data: &[u8]) -> (Vec<&[u8]>, usize) {
    let mut records = Vec::new();
    let mut pos = 0;
    while data.len() - pos >= RECORD_HEADER_LEN {
        let len = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        let end = pos + RECORD_HEADER_LEN + len;
        if end > data.len() {
            break;
        }
        records.push(&data[pos..end]);
        pos = end;
    }
    (records, pos)
}
