//! Peer certificate checks.
//!
//! Trust decisions go through the [`CertificateVerifier`] trait so callers can
//! plug in their own policy. [`X509CertificateVerifier`] is the default: it
//! checks validity periods and RSA signatures along the presented chain,
//! anchors the chain in the configured trusted certificates, and matches the
//! server name against the leaf's subjectAltName (falling back to the CN).

use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::oid_registry::{
    OID_PKCS1_RSAENCRYPTION, OID_PKCS1_SHA1WITHRSA, OID_PKCS1_SHA256WITHRSA,
    OID_PKCS1_SHA384WITHRSA, OID_PKCS1_SHA512WITHRSA,
};
use x509_parser::prelude::FromDer;

use crate::config::TlsConfig;
use crate::crypt::{KeyExchangeAlgorithm, SignatureScheme};
use crate::handshake::signing::verify_rsa;
use ntls_types::{AlertDescription, TlsError};

/// Certificate trust policy.
pub trait CertificateVerifier: Send + Sync {
    /// Check the server chain (leaf first) presented to a client.
    fn verify_server(&self, chain: &[Vec<u8>], server_name: Option<&str>) -> Result<(), TlsError>;

    /// Check a non-empty client chain presented to a server.
    fn verify_client(&self, chain: &[Vec<u8>]) -> Result<(), TlsError>;
}

fn unknown(message: impl Into<String>) -> TlsError {
    TlsError::fatal(AlertDescription::CertificateUnknown, message)
}

fn parse(der: &[u8]) -> Result<X509Certificate<'_>, TlsError> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| TlsError::fatal(AlertDescription::BadCertificate, format!("certificate parse: {e}")))
}

/// RSA public key of a certificate; other key types are `unsupported_certificate`.
pub fn rsa_public_key(der: &[u8]) -> Result<RsaPublicKey, TlsError> {
    let cert = parse(der)?;
    let spki = cert.public_key();
    if spki.algorithm.algorithm != OID_PKCS1_RSAENCRYPTION {
        return Err(TlsError::fatal(
            AlertDescription::UnsupportedCertificate,
            "certificate key is not RSA",
        ));
    }
    RsaPublicKey::from_public_key_der(spki.raw)
        .map_err(|_| TlsError::fatal(AlertDescription::BadCertificate, "malformed RSA public key"))
}

/// Check that the leaf may be used for `key_exchange`: RSA key transport
/// needs keyEncipherment, signed ephemeral exchanges need digitalSignature.
/// Certificates without a keyUsage extension are unrestricted.
pub fn check_key_usage(der: &[u8], key_exchange: KeyExchangeAlgorithm) -> Result<(), TlsError> {
    let cert = parse(der)?;
    let usage = cert
        .key_usage()
        .map_err(|e| TlsError::fatal(AlertDescription::BadCertificate, format!("keyUsage: {e}")))?;
    let Some(usage) = usage else {
        return Ok(());
    };
    let allowed = match key_exchange {
        KeyExchangeAlgorithm::Rsa => usage.value.key_encipherment(),
        KeyExchangeAlgorithm::Dhe | KeyExchangeAlgorithm::Ecdhe => usage.value.digital_signature(),
    };
    if allowed {
        Ok(())
    } else {
        Err(TlsError::fatal(
            AlertDescription::UnsupportedCertificate,
            format!("certificate key usage does not permit {key_exchange:?} key exchange"),
        ))
    }
}

/// Default verifier over a fixed set of trusted DER certificates.
#[derive(Debug, Clone, Default)]
pub struct X509CertificateVerifier {
    trusted: Vec<Vec<u8>>,
}

impl X509CertificateVerifier {
    pub fn new(trusted: Vec<Vec<u8>>) -> Self {
        Self { trusted }
    }

    fn verify_chain(&self, chain: &[Vec<u8>]) -> Result<(), TlsError> {
        if chain.is_empty() {
            return Err(unknown("empty certificate chain"));
        }
        let certs = chain.iter().map(|d| parse(d)).collect::<Result<Vec<_>, _>>()?;

        for cert in &certs {
            if !cert.validity().is_valid() {
                return Err(TlsError::fatal(
                    AlertDescription::CertificateExpired,
                    "certificate outside its validity period",
                ));
            }
        }
        for pair in certs.windows(2) {
            if pair[0].issuer().as_raw() != pair[1].subject().as_raw() {
                return Err(unknown("certificate chain is not ordered"));
            }
            verify_signed_by(&pair[0], &pair[1])?;
        }

        let last_der = &chain[chain.len() - 1];
        let last = &certs[certs.len() - 1];
        if self.trusted.iter().any(|t| t == last_der) {
            return Ok(());
        }
        for anchor_der in &self.trusted {
            let Ok(anchor) = parse(anchor_der) else {
                continue;
            };
            if anchor.subject().as_raw() == last.issuer().as_raw()
                && verify_signed_by(last, &anchor).is_ok()
            {
                return Ok(());
            }
        }
        Err(unknown("certificate chain does not end in a trusted certificate"))
    }
}

fn verify_signed_by(cert: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> Result<(), TlsError> {
    let alg = &cert.signature_algorithm.algorithm;
    let scheme = if *alg == OID_PKCS1_SHA256WITHRSA {
        SignatureScheme::RSA_PKCS1_SHA256
    } else if *alg == OID_PKCS1_SHA384WITHRSA {
        SignatureScheme::RSA_PKCS1_SHA384
    } else if *alg == OID_PKCS1_SHA512WITHRSA {
        SignatureScheme::RSA_PKCS1_SHA512
    } else if *alg == OID_PKCS1_SHA1WITHRSA {
        SignatureScheme::RSA_PKCS1_SHA1
    } else {
        return Err(TlsError::fatal(
            AlertDescription::UnsupportedCertificate,
            format!("unsupported certificate signature algorithm {alg}"),
        ));
    };
    let spki = issuer.public_key();
    let key = RsaPublicKey::from_public_key_der(spki.raw)
        .map_err(|_| unknown("issuer key is not RSA"))?;
    verify_rsa(&key, Some(scheme), cert.tbs_certificate.as_ref(), &cert.signature_value.data)
        .map_err(|_| unknown("certificate signature does not verify"))
}

fn dns_name_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .split_once('.')
            .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix),
        None => pattern == host,
    }
}

fn verify_hostname(cert: &X509Certificate<'_>, host: &str) -> Result<(), TlsError> {
    let san = cert
        .subject_alternative_name()
        .map_err(|e| TlsError::fatal(AlertDescription::BadCertificate, format!("subjectAltName: {e}")))?;
    let matched = match san {
        Some(san) => san.value.general_names.iter().any(|name| match name {
            GeneralName::DNSName(dns) => dns_name_matches(dns, host),
            _ => false,
        }),
        None => cert
            .subject()
            .iter_common_name()
            .filter_map(|cn| cn.as_str().ok())
            .any(|cn| dns_name_matches(cn, host)),
    };
    if matched {
        Ok(())
    } else {
        Err(unknown(format!("certificate is not valid for {host}")))
    }
}

impl CertificateVerifier for X509CertificateVerifier {
    fn verify_server(&self, chain: &[Vec<u8>], server_name: Option<&str>) -> Result<(), TlsError> {
        self.verify_chain(chain)?;
        if let Some(host) = server_name {
            verify_hostname(&parse(&chain[0])?, host)?;
        }
        Ok(())
    }

    fn verify_client(&self, chain: &[Vec<u8>]) -> Result<(), TlsError> {
        self.verify_chain(chain)
    }
}

/// Run the configured verifier (or the default one) on a server chain.
pub fn verify_server_certificate(config: &TlsConfig, chain: &[Vec<u8>]) -> Result<(), TlsError> {
    if !config.verify_peer {
        return Ok(());
    }
    let server_name = config.server_name.as_deref();
    match &config.certificate_verifier {
        Some(v) => v.verify_server(chain, server_name),
        None => X509CertificateVerifier::new(config.trusted_certs.clone()).verify_server(chain, server_name),
    }
}

/// Run the configured verifier (or the default one) on a client chain.
pub fn verify_client_certificate(config: &TlsConfig, chain: &[Vec<u8>]) -> Result<(), TlsError> {
    if !config.verify_peer {
        return Ok(());
    }
    match &config.certificate_verifier {
        Some(v) => v.verify_client(chain),
        None => X509CertificateVerifier::new(config.trusted_certs.clone()).verify_client(chain),
    }
}
