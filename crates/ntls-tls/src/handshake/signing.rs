//! RSA PKCS#1 v1.5 signatures for ServerKeyExchange and CertificateVerify.
//!
//! TLS 1.2 signs with an explicit `SignatureAndHashAlgorithm` and a
//! DigestInfo-prefixed hash. TLS 1.0/1.1 have no algorithm field and sign the
//! 36-byte MD5||SHA-1 digest without a prefix; that case is `scheme = None`.

use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

use crate::config::PrivateKey;
use crate::crypt::{HashAlgorithm, SignatureScheme};
use ntls_types::TlsError;

/// Produces signatures with the local credentials.
///
/// The default implementation signs with the configured RSA key; install a
/// custom provider to keep the key outside the process.
pub trait SignatureProvider: Send + Sync {
    fn sign(&self, scheme: Option<SignatureScheme>, message: &[u8]) -> Result<Vec<u8>, TlsError>;

    /// TLS 1.2 schemes this provider can produce, in preference order.
    fn supported_schemes(&self) -> Vec<SignatureScheme> {
        SignatureScheme::SUPPORTED.to_vec()
    }
}

/// Signs with an in-memory RSA private key.
pub struct RsaSignatureProvider {
    key: RsaPrivateKey,
}

impl RsaSignatureProvider {
    pub fn new(key: &PrivateKey) -> Result<Self, TlsError> {
        Ok(Self { key: key.to_rsa()? })
    }
}

impl SignatureProvider for RsaSignatureProvider {
    fn sign(&self, scheme: Option<SignatureScheme>, message: &[u8]) -> Result<Vec<u8>, TlsError> {
        sign_rsa(&self.key, scheme, message)
    }
}

fn padding_and_digest(
    scheme: Option<SignatureScheme>,
    message: &[u8],
) -> Result<(Pkcs1v15Sign, Vec<u8>), TlsError> {
    let Some(scheme) = scheme else {
        return Ok((
            Pkcs1v15Sign::new_unprefixed(),
            HashAlgorithm::Md5Sha1.digest(message),
        ));
    };
    let hash = scheme.hash().ok_or_else(|| {
        TlsError::illegal_parameter(format!("unsupported signature scheme 0x{:04x}", scheme.0))
    })?;
    let padding = match hash {
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        HashAlgorithm::Md5 | HashAlgorithm::Md5Sha1 => {
            return Err(TlsError::illegal_parameter("MD5 signatures are not supported"))
        }
    };
    Ok((padding, hash.digest(message)))
}

pub fn sign_rsa(
    key: &RsaPrivateKey,
    scheme: Option<SignatureScheme>,
    message: &[u8],
) -> Result<Vec<u8>, TlsError> {
    let (padding, digest) = padding_and_digest(scheme, message)?;
    key.sign(padding, &digest)
        .map_err(|_| TlsError::internal_error("RSA signing failed"))
}

/// Verify a peer signature; any mismatch is `handshake_failure`.
pub fn verify_rsa(
    key: &RsaPublicKey,
    scheme: Option<SignatureScheme>,
    message: &[u8],
    signature: &[u8],
) -> Result<(), TlsError> {
    let (padding, digest) = padding_and_digest(scheme, message)?;
    key.verify(padding, &digest, signature)
        .map_err(|_| TlsError::handshake_failure("RSA signature verification failed"))
}

/// Pick the first of our schemes the peer accepts. Without a peer list
/// (no signature_algorithms extension) SHA-256 is used.
pub fn select_signature_scheme(
    ours: &[SignatureScheme],
    peer: Option<&[SignatureScheme]>,
) -> Result<SignatureScheme, TlsError> {
    let Some(peer) = peer else {
        return Ok(SignatureScheme::RSA_PKCS1_SHA256);
    };
    ours.iter()
        .copied()
        .find(|s| s.is_supported() && peer.contains(s))
        .ok_or_else(|| TlsError::handshake_failure("no common signature algorithm"))
}
