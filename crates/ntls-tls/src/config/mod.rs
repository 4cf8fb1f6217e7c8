//! TLS configuration with builder pattern.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use zeroize::Zeroize;

use crate::cert_verify::CertificateVerifier;
use crate::crypt::{self, SignatureScheme};
use crate::handshake::signing::SignatureProvider;
use crate::{CipherSuite, TlsVersion};
use ntls_types::CryptoError;

/// Local private key used for ServerKeyExchange and CertificateVerify
/// signatures and for RSA key exchange decryption.
#[derive(Clone)]
pub enum PrivateKey {
    /// RSA private key components (all big-endian).
    Rsa {
        n: Vec<u8>,
        e: Vec<u8>,
        d: Vec<u8>,
        p: Vec<u8>,
        q: Vec<u8>,
    },
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        match self {
            PrivateKey::Rsa { d, p, q, .. } => {
                d.zeroize();
                p.zeroize();
                q.zeroize();
            }
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivateKey::Rsa { n, .. } => write!(f, "PrivateKey::Rsa({} bits)", n.len() * 8),
        }
    }
}

impl PrivateKey {
    /// Load an RSA key from a PKCS#8 `PrivateKeyInfo` DER encoding.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::from_pkcs8_der(der).map_err(|_| CryptoError::InvalidKey)?;
        let primes = key.primes();
        if primes.len() != 2 {
            return Err(CryptoError::InvalidKey);
        }
        Ok(PrivateKey::Rsa {
            n: key.n().to_bytes_be(),
            e: key.e().to_bytes_be(),
            d: key.d().to_bytes_be(),
            p: primes[0].to_bytes_be(),
            q: primes[1].to_bytes_be(),
        })
    }

    pub fn to_rsa(&self) -> Result<RsaPrivateKey, CryptoError> {
        match self {
            PrivateKey::Rsa { n, e, d, p, q } => RsaPrivateKey::from_components(
                BigUint::from_bytes_be(n),
                BigUint::from_bytes_be(e),
                BigUint::from_bytes_be(d),
                vec![BigUint::from_bytes_be(p), BigUint::from_bytes_be(q)],
            )
            .map_err(|_| CryptoError::InvalidKey),
        }
    }
}

/// Renegotiation policy bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenegotiationFlags(pub u32);

impl RenegotiationFlags {
    pub const NONE: Self = Self(0);
    /// Refuse every renegotiation attempt.
    pub const DISALLOW_RENEGOTIATION: Self = Self(1);
    /// Negotiate RFC 5746 secure renegotiation.
    pub const SECURE_RENEGOTIATION: Self = Self(2);
    /// Client: send the renegotiation_info extension.
    pub const SEND_CLIENT_HELLO_EXTENSION: Self = Self(16);
    /// Client: send TLS_EMPTY_RENEGOTIATION_INFO_SCSV.
    pub const SEND_CIPHER_SPEC_CODE: Self = Self(32);
    /// Client: fail when the server does not support secure renegotiation.
    pub const ABORT_HANDSHAKE_IF_UNSUPPORTED: Self = Self(64);
    /// Client: answer any HelloRequest with handshake_failure.
    pub const ABORT_ON_HELLO_REQUEST: Self = Self(128);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Secure renegotiation is requested and not disallowed.
    pub const fn secure_renegotiation_enabled(self) -> bool {
        self.0 & (Self::DISALLOW_RENEGOTIATION.0 | Self::SECURE_RENEGOTIATION.0)
            == Self::SECURE_RENEGOTIATION.0
    }
}

impl Default for RenegotiationFlags {
    fn default() -> Self {
        Self::SECURE_RENEGOTIATION.union(Self::SEND_CLIENT_HELLO_EXTENSION)
    }
}

impl BitOr for RenegotiationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for RenegotiationFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// Whether a server asks for a client certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientCertificatePolicy {
    #[default]
    None,
    /// Request a certificate but accept an empty reply.
    Optional,
    /// Request a certificate and fail the handshake without one.
    Required,
}

/// Callback receiving NSS key log lines.
pub type KeyLogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// TLS configuration.
#[derive(Clone)]
pub struct TlsConfig {
    /// Lowest protocol version accepted.
    pub min_version: TlsVersion,
    /// Version a client offers and the highest a server accepts.
    pub max_version: TlsVersion,
    /// Enabled cipher suites in preference order. Empty selects every suite
    /// usable at the negotiated version.
    pub cipher_suites: Vec<CipherSuite>,
    /// Client: host name for SNI and certificate name checks.
    pub server_name: Option<String>,
    /// Local certificate chain (DER, leaf first).
    pub certificate_chain: Vec<Vec<u8>>,
    /// Private key matching the leaf of `certificate_chain`.
    pub private_key: Option<PrivateKey>,
    /// Trust anchors for the default certificate verifier (DER).
    pub trusted_certs: Vec<Vec<u8>>,
    /// Whether peer certificates are checked at all.
    pub verify_peer: bool,
    /// Overrides the default X.509 verifier.
    pub certificate_verifier: Option<Arc<dyn CertificateVerifier>>,
    /// Overrides signing with `private_key`.
    pub signature_provider: Option<Arc<dyn SignatureProvider>>,
    /// Signature algorithms for TLS 1.2, in preference order.
    pub signature_algorithms: Vec<SignatureScheme>,
    /// Server: client certificate request policy.
    pub client_certificate_policy: ClientCertificatePolicy,
    /// Server: CA distinguished names (DER) listed in CertificateRequest.
    pub ca_names: Vec<Vec<u8>>,
    pub renegotiation_flags: RenegotiationFlags,
    /// Whole blocks of extra CBC padding added to every record.
    pub extra_padding_blocks: u8,
    /// Emit per-record and per-message trace events.
    pub enable_debugging: bool,
    pub key_log_callback: Option<KeyLogCallback>,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("min_version", &self.min_version)
            .field("max_version", &self.max_version)
            .field("cipher_suites", &self.cipher_suites)
            .field("server_name", &self.server_name)
            .field("certificate_chain", &self.certificate_chain.len())
            .field("private_key", &self.private_key)
            .field("verify_peer", &self.verify_peer)
            .field("client_certificate_policy", &self.client_certificate_policy)
            .field("renegotiation_flags", &self.renegotiation_flags)
            .field("extra_padding_blocks", &self.extra_padding_blocks)
            .field("enable_debugging", &self.enable_debugging)
            .field(
                "key_log_callback",
                &self.key_log_callback.as_ref().map(|_| "<callback>"),
            )
            .finish_non_exhaustive()
    }
}

impl TlsConfig {
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Suites usable at `version`, in configured preference order.
    pub fn cipher_suites_for(&self, version: TlsVersion) -> Vec<CipherSuite> {
        if self.cipher_suites.is_empty() {
            return crypt::default_cipher_suites(version);
        }
        self.cipher_suites
            .iter()
            .copied()
            .filter(|s| {
                crypt::CipherSuiteParams::from_suite(*s).is_ok_and(|p| p.supports(version))
            })
            .collect()
    }

    /// Whether local credentials are present.
    pub fn has_credentials(&self) -> bool {
        !self.certificate_chain.is_empty()
            && (self.private_key.is_some() || self.signature_provider.is_some())
    }
}

/// Builder for `TlsConfig`.
pub struct TlsConfigBuilder {
    config: TlsConfig,
}

impl Default for TlsConfigBuilder {
    fn default() -> Self {
        Self {
            config: TlsConfig {
                min_version: TlsVersion::Tls10,
                max_version: TlsVersion::Tls12,
                cipher_suites: Vec::new(),
                server_name: None,
                certificate_chain: Vec::new(),
                private_key: None,
                trusted_certs: Vec::new(),
                verify_peer: true,
                certificate_verifier: None,
                signature_provider: None,
                signature_algorithms: SignatureScheme::SUPPORTED.to_vec(),
                client_certificate_policy: ClientCertificatePolicy::None,
                ca_names: Vec::new(),
                renegotiation_flags: RenegotiationFlags::default(),
                extra_padding_blocks: 0,
                enable_debugging: false,
                key_log_callback: None,
            },
        }
    }
}

impl fmt::Debug for TlsConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl TlsConfigBuilder {
    pub fn min_version(mut self, version: TlsVersion) -> Self {
        self.config.min_version = version;
        self
    }

    pub fn max_version(mut self, version: TlsVersion) -> Self {
        self.config.max_version = version;
        self
    }

    /// Pin both ends of the version range.
    pub fn version(self, version: TlsVersion) -> Self {
        self.min_version(version).max_version(version)
    }

    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.config.cipher_suites = suites.to_vec();
        self
    }

    pub fn server_name(mut self, name: &str) -> Self {
        self.config.server_name = Some(name.to_string());
        self
    }

    pub fn certificate_chain(mut self, certs: Vec<Vec<u8>>) -> Self {
        self.config.certificate_chain = certs;
        self
    }

    pub fn private_key(mut self, key: PrivateKey) -> Self {
        self.config.private_key = Some(key);
        self
    }

    pub fn trusted_cert(mut self, der_cert: Vec<u8>) -> Self {
        self.config.trusted_certs.push(der_cert);
        self
    }

    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.config.verify_peer = verify;
        self
    }

    pub fn certificate_verifier(mut self, verifier: Arc<dyn CertificateVerifier>) -> Self {
        self.config.certificate_verifier = Some(verifier);
        self
    }

    pub fn signature_provider(mut self, provider: Arc<dyn SignatureProvider>) -> Self {
        self.config.signature_provider = Some(provider);
        self
    }

    pub fn signature_algorithms(mut self, schemes: &[SignatureScheme]) -> Self {
        self.config.signature_algorithms = schemes.to_vec();
        self
    }

    pub fn client_certificate_policy(mut self, policy: ClientCertificatePolicy) -> Self {
        self.config.client_certificate_policy = policy;
        self
    }

    pub fn ca_name(mut self, der_name: Vec<u8>) -> Self {
        self.config.ca_names.push(der_name);
        self
    }

    pub fn extra_padding_blocks(mut self, blocks: u8) -> Self {
        self.config.extra_padding_blocks = blocks;
        self
    }

    pub fn renegotiation_flags(mut self, flags: RenegotiationFlags) -> Self {
        self.config.renegotiation_flags = flags;
        self
    }

    pub fn enable_debugging(mut self, enabled: bool) -> Self {
        self.config.enable_debugging = enabled;
        self
    }

    pub fn key_log(mut self, cb: KeyLogCallback) -> Self {
        self.config.key_log_callback = Some(cb);
        self
    }

    pub fn build(self) -> TlsConfig {
        self.config
    }
}
