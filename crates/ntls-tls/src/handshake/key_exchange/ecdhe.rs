//! Ephemeral ECDH over secp256r1 (RFC 4492 5.4, 5.7).

use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;

use crate::buffer::{SecureBuffer, TlsReader, TlsWriter};
use crate::crypt::NamedGroup;
use ntls_types::TlsError;

/// ECCurveType `named_curve`.
pub const CURVE_TYPE_NAMED_CURVE: u8 = 3;

#[derive(Default)]
pub struct EcdheKeyExchange {
    secret: Option<EphemeralSecret>,
    public_key: Vec<u8>,
    peer_public: Option<PublicKey>,
    pub(super) pre_master_secret: Option<SecureBuffer>,
}

fn parse_point(bytes: &[u8]) -> Result<PublicKey, TlsError> {
    PublicKey::from_sec1_bytes(bytes).map_err(|_| TlsError::illegal_parameter("invalid EC point"))
}

impl EcdheKeyExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_key_pair(&mut self) {
        let secret = EphemeralSecret::random(&mut rand::rngs::OsRng);
        self.public_key = secret.public_key().to_encoded_point(false).as_bytes().to_vec();
        self.secret = Some(secret);
    }

    fn agree(&mut self, peer: &PublicKey) -> Result<(), TlsError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| TlsError::internal_error("ECDH key not generated"))?;
        let shared = secret.diffie_hellman(peer);
        self.pre_master_secret = Some(SecureBuffer::from_slice(shared.raw_secret_bytes()));
        Ok(())
    }

    pub fn generate_server(&mut self) -> Result<(), TlsError> {
        self.generate_key_pair();
        Ok(())
    }

    /// `curve_type || named_curve || u8 len || point`.
    pub fn write_server(&self) -> Result<Vec<u8>, TlsError> {
        let mut w = TlsWriter::with_capacity(4 + self.public_key.len());
        w.write_u8(CURVE_TYPE_NAMED_CURVE);
        w.write_u16(NamedGroup::SECP256R1.0);
        w.write_vec8(&self.public_key)?;
        Ok(w.into_vec())
    }

    pub fn handle_server(&mut self, params: &[u8]) -> Result<(), TlsError> {
        let mut r = TlsReader::new(params);
        let curve_type = r.read_u8()?;
        let curve = NamedGroup(r.read_u16()?);
        let point = r.read_vec8()?;
        r.expect_end("ServerECDHParams")?;
        if curve_type != CURVE_TYPE_NAMED_CURVE || curve != NamedGroup::SECP256R1 {
            return Err(TlsError::handshake_failure(format!(
                "unsupported curve (type {curve_type}, id 0x{:04x})",
                curve.0
            )));
        }
        self.peer_public = Some(parse_point(point)?);
        Ok(())
    }

    pub fn generate_client(&mut self) -> Result<(), TlsError> {
        self.generate_key_pair();
        let peer = self
            .peer_public
            .take()
            .ok_or_else(|| TlsError::internal_error("server ECDH parameters missing"))?;
        self.agree(&peer)
    }

    pub fn write_client(&self) -> Result<Vec<u8>, TlsError> {
        let mut w = TlsWriter::with_capacity(1 + self.public_key.len());
        w.write_vec8(&self.public_key)?;
        Ok(w.into_vec())
    }

    pub fn handle_client(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let mut r = TlsReader::new(body);
        let point = r.read_vec8()?;
        r.expect_end("ClientECDiffieHellmanPublic")?;
        let peer = parse_point(point)?;
        self.agree(&peer)
    }
}
