//! Cipher suite parameters and the hash, MAC and PRF plumbing shared by the
//! record layer and the handshake.

pub mod key_schedule;
pub mod keylog;
pub mod prf;
pub mod transcript;

use hmac::digest::core_api::BlockSizeUser;
use hmac::{Mac, SimpleHmac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::{CipherSuite, TlsVersion};
use ntls_types::TlsError;

pub use prf::PrfAlgorithm;

/// Hash algorithms used by the handshake.
///
/// `Md5Sha1` is the concatenated 36-byte digest TLS 1.0/1.1 use for the
/// handshake hash and for RSA signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Md5Sha1,
}

impl HashAlgorithm {
    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
            HashAlgorithm::Md5Sha1 => 36,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Md5 => Md5::digest(data).to_vec(),
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
            HashAlgorithm::Md5Sha1 => {
                let mut out = Md5::digest(data).to_vec();
                out.extend_from_slice(&Sha1::digest(data));
                out
            }
        }
    }
}

/// Record MAC algorithm of a CBC suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAlgorithm {
    HmacSha1,
    HmacSha256,
    HmacSha384,
}

impl MacAlgorithm {
    /// MAC output length, which is also the MAC key length.
    pub fn len(self) -> usize {
        match self {
            MacAlgorithm::HmacSha1 => 20,
            MacAlgorithm::HmacSha256 => 32,
            MacAlgorithm::HmacSha384 => 48,
        }
    }

    /// HMAC over the concatenation of `parts`.
    pub fn compute(self, key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
        match self {
            MacAlgorithm::HmacSha1 => hmac_parts::<Sha1>(key, parts),
            MacAlgorithm::HmacSha256 => hmac_parts::<Sha256>(key, parts),
            MacAlgorithm::HmacSha384 => hmac_parts::<Sha384>(key, parts),
        }
    }
}

/// HMAC-`D` over the concatenation of `parts`. HMAC accepts keys of any
/// length, so construction cannot fail.
pub(crate) fn hmac_parts<D>(key: &[u8], parts: &[&[u8]]) -> Vec<u8>
where
    D: Digest + BlockSizeUser,
{
    let mut mac = match <SimpleHmac<D> as Mac>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    for part in parts {
        Mac::update(&mut mac, part);
    }
    mac.finalize().into_bytes().to_vec()
}

/// TLS 1.2 `SignatureAndHashAlgorithm` as a single code point (RFC 5246 7.4.1.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureScheme(pub u16);

impl SignatureScheme {
    pub const RSA_PKCS1_SHA1: Self = Self(0x0201);
    pub const RSA_PKCS1_SHA256: Self = Self(0x0401);
    pub const RSA_PKCS1_SHA384: Self = Self(0x0501);
    pub const RSA_PKCS1_SHA512: Self = Self(0x0601);

    /// Schemes supported for RSA certificates, in preference order.
    pub const SUPPORTED: [Self; 4] = [
        Self::RSA_PKCS1_SHA256,
        Self::RSA_PKCS1_SHA384,
        Self::RSA_PKCS1_SHA512,
        Self::RSA_PKCS1_SHA1,
    ];

    /// The hash half of the code point; `None` for schemes we cannot verify.
    pub fn hash(self) -> Option<HashAlgorithm> {
        match self {
            Self::RSA_PKCS1_SHA1 => Some(HashAlgorithm::Sha1),
            Self::RSA_PKCS1_SHA256 => Some(HashAlgorithm::Sha256),
            Self::RSA_PKCS1_SHA384 => Some(HashAlgorithm::Sha384),
            Self::RSA_PKCS1_SHA512 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn is_supported(self) -> bool {
        self.hash().is_some()
    }
}

/// Named elliptic curve (RFC 4492 / RFC 8422).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamedGroup(pub u16);

impl NamedGroup {
    pub const SECP256R1: Self = Self(0x0017);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyExchangeAlgorithm {
    /// RSA-encrypted pre-master secret.
    Rsa,
    /// Ephemeral finite-field Diffie-Hellman signed with the RSA key.
    Dhe,
    /// Ephemeral ECDH over secp256r1 signed with the RSA key.
    Ecdhe,
}

impl KeyExchangeAlgorithm {
    /// Whether the server sends a signed ServerKeyExchange.
    pub fn is_ephemeral(self) -> bool {
        !matches!(self, KeyExchangeAlgorithm::Rsa)
    }
}

/// Bulk record protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkCipher {
    Aes128Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes256Gcm,
}

impl BulkCipher {
    pub fn key_len(self) -> usize {
        match self {
            BulkCipher::Aes128Cbc | BulkCipher::Aes128Gcm => 16,
            BulkCipher::Aes256Cbc | BulkCipher::Aes256Gcm => 32,
        }
    }

    pub fn is_aead(self) -> bool {
        matches!(self, BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm)
    }
}

/// AES block size.
pub const BLOCK_SIZE: usize = 16;
/// GCM: implicit salt taken from the key block.
pub const GCM_FIXED_IV_LEN: usize = 4;
/// GCM: explicit nonce carried in every record.
pub const GCM_EXPLICIT_NONCE_LEN: usize = 8;
/// GCM authentication tag.
pub const GCM_TAG_LEN: usize = 16;

/// Static parameters of a supported cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuiteParams {
    pub suite: CipherSuite,
    pub name: &'static str,
    pub key_exchange: KeyExchangeAlgorithm,
    pub bulk: BulkCipher,
    /// `None` for AEAD suites.
    pub mac: Option<MacAlgorithm>,
    /// TLS 1.2 PRF and handshake hash.
    pub prf_hash: HashAlgorithm,
    /// Suites that rely on TLS 1.2 features (SHA-2 PRF, AEAD).
    pub tls12_only: bool,
}

const fn suite(
    suite: CipherSuite,
    name: &'static str,
    key_exchange: KeyExchangeAlgorithm,
    bulk: BulkCipher,
    mac: Option<MacAlgorithm>,
    prf_hash: HashAlgorithm,
    tls12_only: bool,
) -> CipherSuiteParams {
    CipherSuiteParams {
        suite,
        name,
        key_exchange,
        bulk,
        mac,
        prf_hash,
        tls12_only,
    }
}

use BulkCipher::*;
use KeyExchangeAlgorithm::{Dhe, Ecdhe, Rsa};
use MacAlgorithm::*;

const SUITES: [CipherSuiteParams; 18] = [
    suite(CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256, "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", Ecdhe, Aes128Gcm, None, HashAlgorithm::Sha256, true),
    suite(CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384, "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384", Ecdhe, Aes256Gcm, None, HashAlgorithm::Sha384, true),
    suite(CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256", Ecdhe, Aes128Cbc, Some(HmacSha256), HashAlgorithm::Sha256, true),
    suite(CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384, "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384", Ecdhe, Aes256Cbc, Some(HmacSha384), HashAlgorithm::Sha384, true),
    suite(CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA", Ecdhe, Aes128Cbc, Some(HmacSha1), HashAlgorithm::Sha256, false),
    suite(CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA, "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA", Ecdhe, Aes256Cbc, Some(HmacSha1), HashAlgorithm::Sha256, false),
    suite(CipherSuite::TLS_DHE_RSA_WITH_AES_128_GCM_SHA256, "TLS_DHE_RSA_WITH_AES_128_GCM_SHA256", Dhe, Aes128Gcm, None, HashAlgorithm::Sha256, true),
    suite(CipherSuite::TLS_DHE_RSA_WITH_AES_256_GCM_SHA384, "TLS_DHE_RSA_WITH_AES_256_GCM_SHA384", Dhe, Aes256Gcm, None, HashAlgorithm::Sha384, true),
    suite(CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA256, "TLS_DHE_RSA_WITH_AES_128_CBC_SHA256", Dhe, Aes128Cbc, Some(HmacSha256), HashAlgorithm::Sha256, true),
    suite(CipherSuite::TLS_DHE_RSA_WITH_AES_256_CBC_SHA256, "TLS_DHE_RSA_WITH_AES_256_CBC_SHA256", Dhe, Aes256Cbc, Some(HmacSha256), HashAlgorithm::Sha256, true),
    suite(CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA, "TLS_DHE_RSA_WITH_AES_128_CBC_SHA", Dhe, Aes128Cbc, Some(HmacSha1), HashAlgorithm::Sha256, false),
    suite(CipherSuite::TLS_DHE_RSA_WITH_AES_256_CBC_SHA, "TLS_DHE_RSA_WITH_AES_256_CBC_SHA", Dhe, Aes256Cbc, Some(HmacSha1), HashAlgorithm::Sha256, false),
    suite(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256, "TLS_RSA_WITH_AES_128_GCM_SHA256", Rsa, Aes128Gcm, None, HashAlgorithm::Sha256, true),
    suite(CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384, "TLS_RSA_WITH_AES_256_GCM_SHA384", Rsa, Aes256Gcm, None, HashAlgorithm::Sha384, true),
    suite(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256, "TLS_RSA_WITH_AES_128_CBC_SHA256", Rsa, Aes128Cbc, Some(HmacSha256), HashAlgorithm::Sha256, true),
    suite(CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256, "TLS_RSA_WITH_AES_256_CBC_SHA256", Rsa, Aes256Cbc, Some(HmacSha256), HashAlgorithm::Sha256, true),
    suite(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA, "TLS_RSA_WITH_AES_128_CBC_SHA", Rsa, Aes128Cbc, Some(HmacSha1), HashAlgorithm::Sha256, false),
    suite(CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA, "TLS_RSA_WITH_AES_256_CBC_SHA", Rsa, Aes256Cbc, Some(HmacSha1), HashAlgorithm::Sha256, false),
];

impl CipherSuiteParams {
    /// Look up a supported suite.
    pub fn from_suite(suite: CipherSuite) -> Result<Self, TlsError> {
        SUITES
            .iter()
            .find(|p| p.suite == suite)
            .copied()
            .ok_or_else(|| {
                TlsError::insufficient_security(format!("unsupported cipher suite 0x{:04x}", suite.0))
            })
    }

    /// Whether this suite may be negotiated at `version`.
    pub fn supports(&self, version: TlsVersion) -> bool {
        !self.tls12_only || version.is_tls12()
    }

    pub fn key_len(&self) -> usize {
        self.bulk.key_len()
    }

    /// MAC output and key length; zero for AEAD suites.
    pub fn mac_len(&self) -> usize {
        self.mac.map_or(0, MacAlgorithm::len)
    }

    pub fn is_aead(&self) -> bool {
        self.bulk.is_aead()
    }

    /// IV bytes drawn from the key block per direction: the GCM salt, or the
    /// initial CBC IV of TLS 1.0. TLS 1.1+ CBC carries its IV in each record.
    pub fn fixed_iv_len(&self, version: TlsVersion) -> usize {
        if self.is_aead() {
            GCM_FIXED_IV_LEN
        } else if version == TlsVersion::Tls10 {
            BLOCK_SIZE
        } else {
            0
        }
    }

    /// Per-record explicit IV or nonce length.
    pub fn record_iv_len(&self, version: TlsVersion) -> usize {
        if self.is_aead() {
            GCM_EXPLICIT_NONCE_LEN
        } else if version == TlsVersion::Tls10 {
            0
        } else {
            BLOCK_SIZE
        }
    }

    /// Total key block: `2 * (mac + key + fixed_iv)`.
    pub fn key_block_len(&self, version: TlsVersion) -> usize {
        2 * (self.mac_len() + self.key_len() + self.fixed_iv_len(version))
    }

    pub fn prf(&self, version: TlsVersion) -> PrfAlgorithm {
        if !version.is_tls12() {
            PrfAlgorithm::Legacy
        } else if self.prf_hash == HashAlgorithm::Sha384 {
            PrfAlgorithm::Sha384
        } else {
            PrfAlgorithm::Sha256
        }
    }

    /// Hash applied to the handshake transcript for Finished.
    pub fn handshake_hash(&self, version: TlsVersion) -> HashAlgorithm {
        if version.is_tls12() {
            self.prf_hash
        } else {
            HashAlgorithm::Md5Sha1
        }
    }
}

/// Every supported suite, strongest first.
pub fn all_cipher_suites() -> Vec<CipherSuite> {
    SUITES.iter().map(|p| p.suite).collect()
}

/// Default suites usable at `version`, in preference order.
pub fn default_cipher_suites(version: TlsVersion) -> Vec<CipherSuite> {
    SUITES
        .iter()
        .filter(|p| p.supports(version))
        .map(|p| p.suite)
        .collect()
}
