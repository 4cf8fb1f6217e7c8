//! Handshake message encoding/decoding (RFC 5246 7.4).
//!
//! `encode_*` functions return the complete message, header included, ready
//! for the transcript. `decode_*` functions take the body only.

use super::extensions::{decode_extensions, encode_extensions, Extension};
use super::{wrap_handshake, HandshakeType};
use crate::buffer::{TlsReader, TlsWriter};
use crate::crypt::key_schedule::VERIFY_DATA_LEN;
use crate::crypt::SignatureScheme;
use crate::CipherSuite;
use ntls_types::TlsError;

/// Certificate type `rsa_sign` in CertificateRequest.
pub const CERT_TYPE_RSA_SIGN: u8 = 1;
/// The only compression method this engine speaks.
pub const COMPRESSION_NULL: u8 = 0;
const MAX_SESSION_ID_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct ClientHello {
    pub client_version: u16,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<u8>,
    pub extensions: Vec<Extension>,
}

#[derive(Debug, Clone)]
pub struct ServerHello {
    pub server_version: u16,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suite: CipherSuite,
    pub compression_method: u8,
    pub extensions: Vec<Extension>,
}

/// Certificate message: DER certificates, leaf first.
#[derive(Debug, Clone, Default)]
pub struct CertificateMsg {
    pub certificate_list: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub certificate_types: Vec<u8>,
    /// TLS 1.2 only.
    pub signature_algorithms: Option<Vec<SignatureScheme>>,
    /// Acceptable CA distinguished names (DER).
    pub authorities: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct CertificateVerify {
    /// Present in TLS 1.2 only.
    pub algorithm: Option<SignatureScheme>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

fn read_random(r: &mut TlsReader<'_>) -> Result<[u8; 32], TlsError> {
    let mut random = [0u8; 32];
    random.copy_from_slice(r.read_bytes(32)?);
    Ok(random)
}

fn read_session_id(r: &mut TlsReader<'_>) -> Result<Vec<u8>, TlsError> {
    let id = r.read_vec8()?;
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(TlsError::decode_error("session_id longer than 32 bytes"));
    }
    Ok(id.to_vec())
}

pub fn encode_client_hello(ch: &ClientHello) -> Result<Vec<u8>, TlsError> {
    let mut w = TlsWriter::with_capacity(128);
    w.write_u16(ch.client_version);
    w.write_bytes(&ch.random);
    w.write_vec8(&ch.session_id)?;
    w.write_nested16(|w| {
        for suite in &ch.cipher_suites {
            w.write_u16(suite.0);
        }
        Ok(())
    })?;
    w.write_vec8(&ch.compression_methods)?;
    encode_extensions(&mut w, &ch.extensions)?;
    Ok(wrap_handshake(HandshakeType::ClientHello, w.as_slice()))
}

pub fn decode_client_hello(body: &[u8]) -> Result<ClientHello, TlsError> {
    let mut r = TlsReader::new(body);
    let client_version = r.read_u16()?;
    let random = read_random(&mut r)?;
    let session_id = read_session_id(&mut r)?;
    let suites = r.read_vec16()?;
    if suites.is_empty() || suites.len() % 2 != 0 {
        return Err(TlsError::decode_error("malformed cipher_suites"));
    }
    let cipher_suites = suites
        .chunks_exact(2)
        .map(|c| CipherSuite(u16::from_be_bytes([c[0], c[1]])))
        .collect();
    let compression_methods = r.read_vec8()?.to_vec();
    if compression_methods.is_empty() {
        return Err(TlsError::decode_error("empty compression_methods"));
    }
    let extensions = decode_extensions(&mut r)?;
    r.expect_end("ClientHello")?;
    Ok(ClientHello {
        client_version,
        random,
        session_id,
        cipher_suites,
        compression_methods,
        extensions,
    })
}

pub fn encode_server_hello(sh: &ServerHello) -> Result<Vec<u8>, TlsError> {
    let mut w = TlsWriter::with_capacity(96);
    w.write_u16(sh.server_version);
    w.write_bytes(&sh.random);
    w.write_vec8(&sh.session_id)?;
    w.write_u16(sh.cipher_suite.0);
    w.write_u8(sh.compression_method);
    encode_extensions(&mut w, &sh.extensions)?;
    Ok(wrap_handshake(HandshakeType::ServerHello, w.as_slice()))
}

pub fn decode_server_hello(body: &[u8]) -> Result<ServerHello, TlsError> {
    let mut r = TlsReader::new(body);
    let server_version = r.read_u16()?;
    let random = read_random(&mut r)?;
    let session_id = read_session_id(&mut r)?;
    let cipher_suite = CipherSuite(r.read_u16()?);
    let compression_method = r.read_u8()?;
    let extensions = decode_extensions(&mut r)?;
    r.expect_end("ServerHello")?;
    Ok(ServerHello {
        server_version,
        random,
        session_id,
        cipher_suite,
        compression_method,
        extensions,
    })
}

pub fn encode_certificate(cert: &CertificateMsg) -> Result<Vec<u8>, TlsError> {
    let mut w = TlsWriter::new();
    w.write_nested24(|w| {
        for der in &cert.certificate_list {
            w.write_vec24(der)?;
        }
        Ok(())
    })?;
    Ok(wrap_handshake(HandshakeType::Certificate, w.as_slice()))
}

pub fn decode_certificate(body: &[u8]) -> Result<CertificateMsg, TlsError> {
    let mut r = TlsReader::new(body);
    let mut list = TlsReader::new(r.read_vec24()?);
    r.expect_end("Certificate")?;
    let mut certificate_list = Vec::new();
    while !list.is_empty() {
        let der = list.read_vec24()?;
        if der.is_empty() {
            return Err(TlsError::decode_error("empty certificate entry"));
        }
        certificate_list.push(der.to_vec());
    }
    Ok(CertificateMsg { certificate_list })
}

pub fn encode_certificate_request(cr: &CertificateRequest) -> Result<Vec<u8>, TlsError> {
    let mut w = TlsWriter::new();
    w.write_vec8(&cr.certificate_types)?;
    if let Some(algs) = &cr.signature_algorithms {
        w.write_nested16(|w| {
            for s in algs {
                w.write_u16(s.0);
            }
            Ok(())
        })?;
    }
    w.write_nested16(|w| {
        for dn in &cr.authorities {
            w.write_vec16(dn)?;
        }
        Ok(())
    })?;
    Ok(wrap_handshake(HandshakeType::CertificateRequest, w.as_slice()))
}

pub fn decode_certificate_request(body: &[u8], tls12: bool) -> Result<CertificateRequest, TlsError> {
    let mut r = TlsReader::new(body);
    let certificate_types = r.read_vec8()?.to_vec();
    if certificate_types.is_empty() {
        return Err(TlsError::decode_error("empty certificate_types"));
    }
    let signature_algorithms = if tls12 {
        let list = r.read_vec16()?;
        if list.is_empty() || list.len() % 2 != 0 {
            return Err(TlsError::decode_error("malformed supported_signature_algorithms"));
        }
        Some(
            list.chunks_exact(2)
                .map(|c| SignatureScheme(u16::from_be_bytes([c[0], c[1]])))
                .collect(),
        )
    } else {
        None
    };
    let mut names = TlsReader::new(r.read_vec16()?);
    r.expect_end("CertificateRequest")?;
    let mut authorities = Vec::new();
    while !names.is_empty() {
        authorities.push(names.read_vec16()?.to_vec());
    }
    Ok(CertificateRequest {
        certificate_types,
        signature_algorithms,
        authorities,
    })
}

pub fn encode_certificate_verify(cv: &CertificateVerify) -> Result<Vec<u8>, TlsError> {
    let mut w = TlsWriter::new();
    if let Some(alg) = cv.algorithm {
        w.write_u16(alg.0);
    }
    w.write_vec16(&cv.signature)?;
    Ok(wrap_handshake(HandshakeType::CertificateVerify, w.as_slice()))
}

pub fn decode_certificate_verify(body: &[u8], tls12: bool) -> Result<CertificateVerify, TlsError> {
    let mut r = TlsReader::new(body);
    let algorithm = if tls12 {
        Some(SignatureScheme(r.read_u16()?))
    } else {
        None
    };
    let signature = r.read_vec16()?.to_vec();
    r.expect_end("CertificateVerify")?;
    Ok(CertificateVerify {
        algorithm,
        signature,
    })
}

pub fn encode_server_hello_done() -> Vec<u8> {
    wrap_handshake(HandshakeType::ServerHelloDone, &[])
}

pub fn encode_hello_request() -> Vec<u8> {
    wrap_handshake(HandshakeType::HelloRequest, &[])
}

pub fn encode_finished(verify_data: &[u8]) -> Vec<u8> {
    wrap_handshake(HandshakeType::Finished, verify_data)
}

pub fn decode_finished(body: &[u8]) -> Result<Finished, TlsError> {
    if body.len() != VERIFY_DATA_LEN {
        return Err(TlsError::decode_error(format!(
            "Finished verify_data must be {VERIFY_DATA_LEN} bytes, got {}",
            body.len()
        )));
    }
    Ok(Finished {
        verify_data: body.to_vec(),
    })
}

/// ChangeCipherSpec record body (content type 20, not a handshake message).
pub fn encode_change_cipher_spec() -> Vec<u8> {
    vec![0x01]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::extensions::build_renegotiation_info;
    use crate::handshake::parse_handshake_header;

    fn body(msg: &[u8]) -> &[u8] {
        &msg[4..]
    }

    #[test]
    fn test_client_hello_roundtrip() {
        let ch = ClientHello {
            client_version: 0x0303,
            random: [0x11; 32],
            session_id: Vec::new(),
            cipher_suites: vec![
                CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV,
            ],
            compression_methods: vec![COMPRESSION_NULL],
            extensions: vec![build_renegotiation_info(&[]).unwrap()],
        };
        let msg = encode_client_hello(&ch).unwrap();
        assert_eq!(
            parse_handshake_header(&msg).unwrap(),
            Some((HandshakeType::ClientHello, msg.len() - 4))
        );
        let decoded = decode_client_hello(body(&msg)).unwrap();
        assert_eq!(decoded.client_version, 0x0303);
        assert_eq!(decoded.random, [0x11; 32]);
        assert_eq!(decoded.cipher_suites, ch.cipher_suites);
        assert_eq!(decoded.extensions, ch.extensions);
    }

    #[test]
    fn test_client_hello_without_extensions() {
        // version || random || sid(0) || suites(2) || compression(1)
        let mut b = vec![0x03, 0x01];
        b.extend_from_slice(&[0u8; 32]);
        b.extend_from_slice(&[0x00, 0x00, 0x02, 0x00, 0x2F, 0x01, 0x00]);
        let ch = decode_client_hello(&b).unwrap();
        assert!(ch.extensions.is_empty());
        assert_eq!(ch.cipher_suites, vec![CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA]);
    }

    #[test]
    fn test_client_hello_malformed() {
        let mut b = vec![0x03, 0x03];
        b.extend_from_slice(&[0u8; 32]);
        b.extend_from_slice(&[0x00, 0x00, 0x03, 0x00, 0x2F, 0x00, 0x01, 0x00]);
        assert!(decode_client_hello(&b).is_err());
        assert!(decode_client_hello(&[0x03, 0x03, 0x00]).is_err());
    }

    #[test]
    fn test_server_hello_roundtrip() {
        let sh = ServerHello {
            server_version: 0x0302,
            random: [0x22; 32],
            session_id: vec![7; 32],
            cipher_suite: CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
            compression_method: COMPRESSION_NULL,
            extensions: Vec::new(),
        };
        let msg = encode_server_hello(&sh).unwrap();
        let decoded = decode_server_hello(body(&msg)).unwrap();
        assert_eq!(decoded.server_version, 0x0302);
        assert_eq!(decoded.session_id.len(), 32);
        assert_eq!(decoded.cipher_suite, sh.cipher_suite);
        assert!(decoded.extensions.is_empty());
    }

    #[test]
    fn test_certificate_roundtrip_and_empty() {
        let cert = CertificateMsg {
            certificate_list: vec![vec![0x30, 0x01, 0x00], vec![0x30; 300]],
        };
        let msg = encode_certificate(&cert).unwrap();
        assert_eq!(decode_certificate(body(&msg)).unwrap().certificate_list, cert.certificate_list);

        let empty = encode_certificate(&CertificateMsg::default()).unwrap();
        assert_eq!(body(&empty), &[0, 0, 0]);
        assert!(decode_certificate(body(&empty)).unwrap().certificate_list.is_empty());
    }

    #[test]
    fn test_certificate_request_by_version() {
        let cr = CertificateRequest {
            certificate_types: vec![CERT_TYPE_RSA_SIGN],
            signature_algorithms: Some(vec![SignatureScheme::RSA_PKCS1_SHA256]),
            authorities: vec![vec![0x30, 0x00]],
        };
        let msg = encode_certificate_request(&cr).unwrap();
        let decoded = decode_certificate_request(body(&msg), true).unwrap();
        assert_eq!(decoded.signature_algorithms, cr.signature_algorithms);
        assert_eq!(decoded.authorities, cr.authorities);

        let legacy = CertificateRequest {
            signature_algorithms: None,
            ..cr
        };
        let msg = encode_certificate_request(&legacy).unwrap();
        let decoded = decode_certificate_request(body(&msg), false).unwrap();
        assert!(decoded.signature_algorithms.is_none());
        assert!(decode_certificate_request(body(&msg), true).is_err());
    }

    #[test]
    fn test_certificate_verify_by_version() {
        let cv = CertificateVerify {
            algorithm: Some(SignatureScheme::RSA_PKCS1_SHA256),
            signature: vec![0x55; 128],
        };
        let msg = encode_certificate_verify(&cv).unwrap();
        assert_eq!(&body(&msg)[..4], &[0x04, 0x01, 0x00, 0x80]);
        let decoded = decode_certificate_verify(body(&msg), true).unwrap();
        assert_eq!(decoded.algorithm, cv.algorithm);

        let legacy = encode_certificate_verify(&CertificateVerify {
            algorithm: None,
            signature: vec![0x55; 128],
        })
        .unwrap();
        let decoded = decode_certificate_verify(body(&legacy), false).unwrap();
        assert!(decoded.algorithm.is_none());
        assert_eq!(decoded.signature.len(), 128);
    }

    #[test]
    fn test_finished_length() {
        let msg = encode_finished(&[9; 12]);
        assert_eq!(decode_finished(body(&msg)).unwrap().verify_data, vec![9; 12]);
        assert!(decode_finished(&[9; 11]).is_err());
        assert!(decode_finished(&[9; 36]).is_err());
    }

    #[test]
    fn test_fixed_messages() {
        assert_eq!(encode_server_hello_done(), vec![14, 0, 0, 0]);
        assert_eq!(encode_hello_request(), vec![0, 0, 0, 0]);
        assert_eq!(encode_change_cipher_spec(), vec![1]);
    }
}
