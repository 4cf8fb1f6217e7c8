//! Key exchange strategies for TLS 1.0-1.2 (RFC 5246 7.4.3, 7.4.7; RFC 4492).
//!
//! Each strategy runs one of two sequences:
//!
//! ```text
//! server: generate_server -> write_server -> handle_client
//! client: handle_server   -> generate_client -> write_client
//! ```
//!
//! and leaves the pre-master secret behind for the key schedule. RSA has no
//! server step.

pub mod dhe;
pub mod ecdhe;
pub mod rsa;

use ::rsa::{RsaPrivateKey, RsaPublicKey};

use super::{wrap_handshake, HandshakeType};
use crate::buffer::{SecureBuffer, TlsReader, TlsWriter};
use crate::crypt::{KeyExchangeAlgorithm, SignatureScheme};
use ntls_types::TlsError;

/// ServerKeyExchange split into the signed parameters and the signature.
#[derive(Debug, Clone)]
pub struct ServerKeyExchange {
    /// `ServerDHParams` or `ServerECDHParams`, exactly as on the wire.
    pub params: Vec<u8>,
    /// TLS 1.2 only.
    pub algorithm: Option<SignatureScheme>,
    pub signature: Vec<u8>,
}

/// `client_random || server_random || params`, the input of the
/// ServerKeyExchange signature.
pub fn build_signed_data(client_random: &[u8; 32], server_random: &[u8; 32], params: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(64 + params.len());
    data.extend_from_slice(client_random);
    data.extend_from_slice(server_random);
    data.extend_from_slice(params);
    data
}

pub fn encode_server_key_exchange(ske: &ServerKeyExchange) -> Result<Vec<u8>, TlsError> {
    let mut w = TlsWriter::with_capacity(ske.params.len() + ske.signature.len() + 4);
    w.write_bytes(&ske.params);
    if let Some(alg) = ske.algorithm {
        w.write_u16(alg.0);
    }
    w.write_vec16(&ske.signature)?;
    Ok(wrap_handshake(HandshakeType::ServerKeyExchange, w.as_slice()))
}

/// Split a ServerKeyExchange body. The parameter layout depends on the
/// exchange, so the parameters are walked just far enough to find their end.
pub fn decode_server_key_exchange(
    kx: KeyExchangeAlgorithm,
    body: &[u8],
    tls12: bool,
) -> Result<ServerKeyExchange, TlsError> {
    let mut r = TlsReader::new(body);
    match kx {
        KeyExchangeAlgorithm::Dhe => {
            r.read_vec16()?;
            r.read_vec16()?;
            r.read_vec16()?;
        }
        KeyExchangeAlgorithm::Ecdhe => {
            r.read_u8()?;
            r.read_u16()?;
            r.read_vec8()?;
        }
        KeyExchangeAlgorithm::Rsa => {
            return Err(TlsError::unexpected_message(
                "ServerKeyExchange with RSA key exchange",
            ))
        }
    }
    let params = body[..r.position()].to_vec();
    let algorithm = if tls12 {
        Some(SignatureScheme(r.read_u16()?))
    } else {
        None
    };
    let signature = r.read_vec16()?.to_vec();
    r.expect_end("ServerKeyExchange")?;
    Ok(ServerKeyExchange {
        params,
        algorithm,
        signature,
    })
}

pub fn encode_client_key_exchange(body: &[u8]) -> Vec<u8> {
    wrap_handshake(HandshakeType::ClientKeyExchange, body)
}

/// Key exchange in progress, one variant per strategy.
pub enum KeyExchange {
    Rsa(rsa::RsaKeyExchange),
    Dhe(dhe::DheKeyExchange),
    Ecdhe(ecdhe::EcdheKeyExchange),
}

impl std::fmt::Debug for KeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyExchange::{:?}", self.algorithm())
    }
}

impl KeyExchange {
    pub fn new(alg: KeyExchangeAlgorithm) -> Self {
        match alg {
            KeyExchangeAlgorithm::Rsa => KeyExchange::Rsa(rsa::RsaKeyExchange::new()),
            KeyExchangeAlgorithm::Dhe => KeyExchange::Dhe(dhe::DheKeyExchange::new()),
            KeyExchangeAlgorithm::Ecdhe => KeyExchange::Ecdhe(ecdhe::EcdheKeyExchange::new()),
        }
    }

    pub fn algorithm(&self) -> KeyExchangeAlgorithm {
        match self {
            KeyExchange::Rsa(_) => KeyExchangeAlgorithm::Rsa,
            KeyExchange::Dhe(_) => KeyExchangeAlgorithm::Dhe,
            KeyExchange::Ecdhe(_) => KeyExchangeAlgorithm::Ecdhe,
        }
    }

    /// Server: create the ephemeral key pair.
    pub fn generate_server(&mut self) -> Result<(), TlsError> {
        match self {
            KeyExchange::Rsa(_) => Err(TlsError::internal_error("RSA key exchange has no server parameters")),
            KeyExchange::Dhe(kx) => kx.generate_server(),
            KeyExchange::Ecdhe(kx) => kx.generate_server(),
        }
    }

    /// Server: the parameters to sign and send in ServerKeyExchange.
    pub fn write_server(&self) -> Result<Vec<u8>, TlsError> {
        match self {
            KeyExchange::Rsa(_) => Err(TlsError::internal_error("RSA key exchange has no server parameters")),
            KeyExchange::Dhe(kx) => kx.write_server(),
            KeyExchange::Ecdhe(kx) => kx.write_server(),
        }
    }

    /// Client: take the (already signature-checked) server parameters.
    pub fn handle_server(&mut self, params: &[u8]) -> Result<(), TlsError> {
        match self {
            KeyExchange::Rsa(_) => Err(TlsError::unexpected_message("ServerKeyExchange with RSA key exchange")),
            KeyExchange::Dhe(kx) => kx.handle_server(params),
            KeyExchange::Ecdhe(kx) => kx.handle_server(params),
        }
    }

    /// Client: produce our share and the pre-master secret.
    /// `server_key` is the server certificate key (used by RSA only).
    pub fn generate_client(&mut self, client_version: u16, server_key: &RsaPublicKey) -> Result<(), TlsError> {
        match self {
            KeyExchange::Rsa(kx) => kx.generate_client(client_version, server_key),
            KeyExchange::Dhe(kx) => kx.generate_client(),
            KeyExchange::Ecdhe(kx) => kx.generate_client(),
        }
    }

    /// Client: the ClientKeyExchange body.
    pub fn write_client(&self) -> Result<Vec<u8>, TlsError> {
        match self {
            KeyExchange::Rsa(kx) => kx.write_client(),
            KeyExchange::Dhe(kx) => kx.write_client(),
            KeyExchange::Ecdhe(kx) => kx.write_client(),
        }
    }

    /// Server: derive the pre-master secret from a ClientKeyExchange body.
    pub fn handle_client(
        &mut self,
        body: &[u8],
        server_key: Option<&RsaPrivateKey>,
        client_version: u16,
    ) -> Result<(), TlsError> {
        match self {
            KeyExchange::Rsa(kx) => {
                let key = server_key.ok_or_else(|| TlsError::internal_error("no RSA private key"))?;
                kx.handle_client(body, key, client_version)
            }
            KeyExchange::Dhe(kx) => kx.handle_client(body),
            KeyExchange::Ecdhe(kx) => kx.handle_client(body),
        }
    }

    /// Move the pre-master secret out; it is only used once.
    pub fn take_pre_master_secret(&mut self) -> Result<SecureBuffer, TlsError> {
        let pms = match self {
            KeyExchange::Rsa(kx) => kx.pre_master_secret.take(),
            KeyExchange::Dhe(kx) => kx.pre_master_secret.take(),
            KeyExchange::Ecdhe(kx) => kx.pre_master_secret.take(),
        };
        pms.ok_or_else(|| TlsError::internal_error("pre-master secret not available"))
    }
}
