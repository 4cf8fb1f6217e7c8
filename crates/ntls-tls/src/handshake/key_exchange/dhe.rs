//! Ephemeral finite-field Diffie-Hellman (RFC 5246 7.4.3, `ServerDHParams`).
//!
//! The server always offers the RFC 3526 2048-bit MODP group with g = 2.

use num_bigint::BigUint;
use num_traits::One;

use crate::buffer::{SecureBuffer, TlsReader, TlsWriter};
use ntls_types::TlsError;

/// RFC 3526 section 3, 2048-bit MODP group.
const MODP_2048_PRIME: &str = concat!(
    "ffffffffffffffffc90fdaa22168c234c4c6628b80dc1cd129024e088a67cc74",
    "020bbea63b139b22514a08798e3404ddef9519b3cd3a431b302b0a6df25f1437",
    "4fe1356d6d51c245e485b576625e7ec6f44c42e9a637ed6b0bff5cb6f406b7ed",
    "ee386bfb5a899fa5ae9f24117c4b1fe649286651ece45b3dc2007cb8a163bf05",
    "98da48361c55d39a69163fa8fd24cf5f83655d23dca3ad961c62f356208552bb",
    "9ed529077096966d670c354e4abc9804f1746c08ca18217c32905e462e36ce3b",
    "e39e772c180e86039b2783a2ec07a28fb5c55df06f4c52c9de2bcbf6955817183",
    "995497cea956ae515d2261898fa051015728e5a8aacaa68ffffffffffffffff",
);
const MODP_GENERATOR: u32 = 2;
/// Smallest prime a client accepts from a server.
pub const MIN_PRIME_BITS: u64 = 1024;
/// Private exponent size.
const PRIVATE_KEY_LEN: usize = 32;

pub fn modp_2048_prime() -> Result<BigUint, TlsError> {
    BigUint::parse_bytes(MODP_2048_PRIME.as_bytes(), 16)
        .ok_or_else(|| TlsError::internal_error("invalid built-in DH prime"))
}

#[derive(Default)]
pub struct DheKeyExchange {
    p: Option<BigUint>,
    g: Option<BigUint>,
    /// Private exponent, big-endian.
    private_key: Option<SecureBuffer>,
    public_key: Vec<u8>,
    peer_public: Option<BigUint>,
    pub(super) pre_master_secret: Option<SecureBuffer>,
}

/// A peer value must lie in `[2, p - 2]`.
fn check_range(value: &BigUint, p: &BigUint, what: &str) -> Result<(), TlsError> {
    let two = BigUint::from(2u32);
    if *value < two || *value > p - &two {
        return Err(TlsError::illegal_parameter(format!("DH {what} out of range")));
    }
    Ok(())
}

fn read_biguint(r: &mut TlsReader<'_>) -> Result<BigUint, TlsError> {
    let bytes = r.read_vec16()?;
    if bytes.is_empty() {
        return Err(TlsError::decode_error("empty DH value"));
    }
    Ok(BigUint::from_bytes_be(bytes))
}

impl DheKeyExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self) -> Result<(&BigUint, &BigUint), TlsError> {
        match (&self.p, &self.g) {
            (Some(p), Some(g)) => Ok((p, g)),
            _ => Err(TlsError::internal_error("DH group not set")),
        }
    }

    fn generate_key_pair(&mut self) -> Result<(), TlsError> {
        let (p, g) = self.group()?;
        let private_key = SecureBuffer::random(PRIVATE_KEY_LEN)?;
        let x = BigUint::from_bytes_be(&private_key) | BigUint::one();
        let public = g.modpow(&x, p);
        self.public_key = public.to_bytes_be();
        self.private_key = Some(private_key);
        Ok(())
    }

    /// `peer^x mod p` with leading zero bytes stripped (RFC 5246 8.1.2).
    fn agree(&mut self, peer: &BigUint) -> Result<(), TlsError> {
        let (p, _) = self.group()?;
        let private_key = self
            .private_key
            .as_ref()
            .ok_or_else(|| TlsError::internal_error("DH private key not generated"))?;
        let x = BigUint::from_bytes_be(private_key) | BigUint::one();
        let z = peer.modpow(&x, p);
        self.pre_master_secret = Some(SecureBuffer::from_vec(z.to_bytes_be()));
        Ok(())
    }

    pub fn generate_server(&mut self) -> Result<(), TlsError> {
        self.p = Some(modp_2048_prime()?);
        self.g = Some(BigUint::from(MODP_GENERATOR));
        self.generate_key_pair()
    }

    /// `dh_p || dh_g || dh_Ys`, each with a u16 length.
    pub fn write_server(&self) -> Result<Vec<u8>, TlsError> {
        let (p, g) = self.group()?;
        let mut w = TlsWriter::with_capacity(600);
        w.write_vec16(&p.to_bytes_be())?;
        w.write_vec16(&g.to_bytes_be())?;
        w.write_vec16(&self.public_key)?;
        Ok(w.into_vec())
    }

    pub fn handle_server(&mut self, params: &[u8]) -> Result<(), TlsError> {
        let mut r = TlsReader::new(params);
        let p = read_biguint(&mut r)?;
        let g = read_biguint(&mut r)?;
        let ys = read_biguint(&mut r)?;
        r.expect_end("ServerDHParams")?;

        if p.bits() < MIN_PRIME_BITS {
            return Err(TlsError::insufficient_security(format!(
                "DH prime of {} bits is too small",
                p.bits()
            )));
        }
        if !p.bit(0) {
            return Err(TlsError::illegal_parameter("DH prime is even"));
        }
        check_range(&g, &p, "generator")?;
        check_range(&ys, &p, "public value")?;
        self.p = Some(p);
        self.g = Some(g);
        self.peer_public = Some(ys);
        Ok(())
    }

    pub fn generate_client(&mut self) -> Result<(), TlsError> {
        self.generate_key_pair()?;
        let peer = self
            .peer_public
            .take()
            .ok_or_else(|| TlsError::internal_error("server DH parameters missing"))?;
        self.agree(&peer)
    }

    pub fn write_client(&self) -> Result<Vec<u8>, TlsError> {
        let mut w = TlsWriter::with_capacity(self.public_key.len() + 2);
        w.write_vec16(&self.public_key)?;
        Ok(w.into_vec())
    }

    pub fn handle_client(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let mut r = TlsReader::new(body);
        let yc = read_biguint(&mut r)?;
        r.expect_end("ClientDiffieHellmanPublic")?;
        let (p, _) = self.group()?;
        check_range(&yc, p, "public value")?;
        self.agree(&yc)
    }
}
