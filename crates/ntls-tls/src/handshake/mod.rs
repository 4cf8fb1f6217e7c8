//! TLS 1.0-1.2 handshake messages.

pub mod codec;
pub mod extensions;
pub mod key_exchange;
pub mod params;
pub mod signing;

use crate::TlsVersion;
use ntls_types::TlsError;

pub use codec::{CertificateMsg, CertificateRequest, CertificateVerify, ClientHello, Finished, ServerHello};

/// Handshake header: `msg_type(1) || length(3)`.
pub const HANDSHAKE_HEADER_LEN: usize = 4;
/// Upper bound on a single handshake message body.
pub const MAX_HANDSHAKE_MESSAGE_LEN: usize = 1 << 17;

/// Handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => HandshakeType::HelloRequest,
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            13 => HandshakeType::CertificateRequest,
            14 => HandshakeType::ServerHelloDone,
            15 => HandshakeType::CertificateVerify,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            _ => return None,
        })
    }
}

/// What the negotiation states dispatch on. ChangeCipherSpec travels in its
/// own content type but is ordered like a handshake message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    ChangeCipherSpec,
    Handshake(HandshakeType),
}

/// Parse a handshake header from the front of `data`.
///
/// Returns `None` while fewer than [`HANDSHAKE_HEADER_LEN`] bytes are
/// available. Unknown message types are `unexpected_message`.
pub fn parse_handshake_header(data: &[u8]) -> Result<Option<(HandshakeType, usize)>, TlsError> {
    if data.len() < HANDSHAKE_HEADER_LEN {
        return Ok(None);
    }
    let ty = HandshakeType::from_u8(data[0]).ok_or_else(|| {
        TlsError::unexpected_message(format!("unknown handshake type {}", data[0]))
    })?;
    let len = (usize::from(data[1]) << 16) | (usize::from(data[2]) << 8) | usize::from(data[3]);
    if len > MAX_HANDSHAKE_MESSAGE_LEN {
        return Err(TlsError::decode_error(format!("handshake message too large ({len} bytes)")));
    }
    Ok(Some((ty, len)))
}

/// Prefix `body` with its handshake header.
pub fn wrap_handshake(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
    let len = body.len();
    let mut out = Vec::with_capacity(HANDSHAKE_HEADER_LEN + len);
    out.push(msg_type as u8);
    out.push((len >> 16) as u8);
    out.push((len >> 8) as u8);
    out.push(len as u8);
    out.extend_from_slice(body);
    out
}

/// A decoded handshake message (or the ChangeCipherSpec pseudo-message).
///
/// Key exchange bodies stay raw: their layout depends on the negotiated
/// suite, which only the active state knows.
#[derive(Debug, Clone)]
pub enum HandshakeMessage {
    ChangeCipherSpec,
    HelloRequest,
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    Certificate(CertificateMsg),
    ServerKeyExchange(Vec<u8>),
    CertificateRequest(CertificateRequest),
    ServerHelloDone,
    ClientKeyExchange(Vec<u8>),
    CertificateVerify(CertificateVerify),
    Finished(Finished),
}

impl HandshakeMessage {
    /// Decode a handshake body. `version` selects the TLS 1.2 layouts of
    /// CertificateRequest and CertificateVerify; before negotiation it is
    /// irrelevant since only hellos can arrive.
    pub fn decode(
        msg_type: HandshakeType,
        body: &[u8],
        version: Option<TlsVersion>,
    ) -> Result<Self, TlsError> {
        let tls12 = version.is_some_and(TlsVersion::is_tls12);
        Ok(match msg_type {
            HandshakeType::HelloRequest => {
                expect_empty(body, "HelloRequest")?;
                HandshakeMessage::HelloRequest
            }
            HandshakeType::ClientHello => HandshakeMessage::ClientHello(codec::decode_client_hello(body)?),
            HandshakeType::ServerHello => HandshakeMessage::ServerHello(codec::decode_server_hello(body)?),
            HandshakeType::Certificate => HandshakeMessage::Certificate(codec::decode_certificate(body)?),
            HandshakeType::ServerKeyExchange => HandshakeMessage::ServerKeyExchange(body.to_vec()),
            HandshakeType::CertificateRequest => {
                HandshakeMessage::CertificateRequest(codec::decode_certificate_request(body, tls12)?)
            }
            HandshakeType::ServerHelloDone => {
                expect_empty(body, "ServerHelloDone")?;
                HandshakeMessage::ServerHelloDone
            }
            HandshakeType::ClientKeyExchange => HandshakeMessage::ClientKeyExchange(body.to_vec()),
            HandshakeType::CertificateVerify => {
                HandshakeMessage::CertificateVerify(codec::decode_certificate_verify(body, tls12)?)
            }
            HandshakeType::Finished => HandshakeMessage::Finished(codec::decode_finished(body)?),
        })
    }

    pub fn kind(&self) -> MessageKind {
        let ty = match self {
            HandshakeMessage::ChangeCipherSpec => return MessageKind::ChangeCipherSpec,
            HandshakeMessage::HelloRequest => HandshakeType::HelloRequest,
            HandshakeMessage::ClientHello(_) => HandshakeType::ClientHello,
            HandshakeMessage::ServerHello(_) => HandshakeType::ServerHello,
            HandshakeMessage::Certificate(_) => HandshakeType::Certificate,
            HandshakeMessage::ServerKeyExchange(_) => HandshakeType::ServerKeyExchange,
            HandshakeMessage::CertificateRequest(_) => HandshakeType::CertificateRequest,
            HandshakeMessage::ServerHelloDone => HandshakeType::ServerHelloDone,
            HandshakeMessage::ClientKeyExchange(_) => HandshakeType::ClientKeyExchange,
            HandshakeMessage::CertificateVerify(_) => HandshakeType::CertificateVerify,
            HandshakeMessage::Finished(_) => HandshakeType::Finished,
        };
        MessageKind::Handshake(ty)
    }
}

fn expect_empty(body: &[u8], what: &str) -> Result<(), TlsError> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(TlsError::decode_error(format!("{what} must be empty")))
    }
}
