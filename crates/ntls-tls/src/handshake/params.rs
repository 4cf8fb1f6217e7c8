//! Per-handshake state shared by the negotiation states.

use zeroize::Zeroize;

use super::key_exchange::KeyExchange;
use crate::crypt::transcript::TranscriptHash;
use crate::crypt::{NamedGroup, SignatureScheme};
use crate::CipherSuite;
use ntls_types::TlsError;

/// Lives from the first hello of a handshake until it completes or aborts.
/// The randoms are wiped on drop.
#[derive(Debug, Default)]
pub struct HandshakeParameters {
    pub client_random: [u8; 32],
    pub server_random: [u8; 32],
    pub session_id: Vec<u8>,
    /// Version field of the ClientHello.
    pub client_version: u16,
    pub offered_suites: Vec<CipherSuite>,
    pub server_name: Option<String>,
    /// Peer `signature_algorithms` (ClientHello extension or
    /// CertificateRequest list). `None` when absent.
    pub peer_signature_algorithms: Option<Vec<SignatureScheme>>,
    /// Peer `supported_groups`; `None` when absent.
    pub peer_groups: Option<Vec<NamedGroup>>,
    /// The peer signalled RFC 5746 support.
    pub peer_secure_renegotiation: bool,
    pub key_exchange: Option<KeyExchange>,
    pub transcript: TranscriptHash,
    /// Server: a CertificateRequest was sent. Client: one was received.
    pub certificate_requested: bool,
    /// Client: `NeedCredentials` was already reported for this handshake.
    pub credentials_requested: bool,
}

impl HandshakeParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh 32-byte hello random.
    pub fn generate_random() -> Result<[u8; 32], TlsError> {
        let mut random = [0u8; 32];
        getrandom::getrandom(&mut random).map_err(|_| ntls_types::CryptoError::RandomFail)?;
        Ok(random)
    }

    pub fn key_exchange_mut(&mut self) -> Result<&mut KeyExchange, TlsError> {
        self.key_exchange
            .as_mut()
            .ok_or_else(|| TlsError::internal_error("key exchange not started"))
    }
}

impl Drop for HandshakeParameters {
    fn drop(&mut self) {
        self.client_random.zeroize();
        self.server_random.zeroize();
        self.transcript.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_randoms_differ() {
        let a = HandshakeParameters::generate_random().unwrap();
        let b = HandshakeParameters::generate_random().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_exchange_required() {
        let mut hs = HandshakeParameters::new();
        assert!(hs.key_exchange_mut().is_err());
        hs.key_exchange = Some(KeyExchange::new(crate::crypt::KeyExchangeAlgorithm::Rsa));
        assert!(hs.key_exchange_mut().is_ok());
    }
}
