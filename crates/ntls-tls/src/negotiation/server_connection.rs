//! Server side: ClientHello processing and the server hello flight.

use super::{bytes_match, signer, signing_schemes, ClientKeyExchangeState, MessageStatus, NegotiationState};
use crate::buffer::MultiBuffer;
use crate::cert_verify::check_key_usage;
use crate::config::{ClientCertificatePolicy, RenegotiationFlags};
use crate::context::connection::ConnectionCore;
use crate::crypt::{CipherSuiteParams, KeyExchangeAlgorithm, NamedGroup};
use crate::handshake::codec::{
    encode_certificate, encode_certificate_request, encode_server_hello, encode_server_hello_done,
    CertificateMsg, CertificateRequest, ClientHello, ServerHello, CERT_TYPE_RSA_SIGN,
    COMPRESSION_NULL,
};
use crate::handshake::extensions::{
    build_renegotiation_info, find_extension, parse_ec_point_formats, parse_renegotiation_info,
    parse_server_name, parse_signature_algorithms, parse_supported_groups, ExtensionType,
    EC_POINT_FORMAT_UNCOMPRESSED,
};
use crate::handshake::key_exchange::{
    build_signed_data, encode_server_key_exchange, KeyExchange, ServerKeyExchange,
};
use crate::handshake::params::HandshakeParameters;
use crate::handshake::signing::select_signature_scheme;
use crate::handshake::HandshakeMessage;
use crate::record::CryptoParameters;
use crate::{CipherSuite, TlsVersion};
use ntls_types::TlsError;

/// ClientHello on a fresh or an established server connection.
pub(super) fn handle_client_hello(
    core: &mut ConnectionCore,
    message: HandshakeMessage,
    renegotiating: bool,
    ready: &mut bool,
) -> Result<MessageStatus, TlsError> {
    let HandshakeMessage::ClientHello(ch) = message else {
        return Err(TlsError::unexpected_message("expected ClientHello"));
    };
    if !core.config.has_credentials() {
        tracing::debug!("server credentials missing, asking caller");
        return Ok(MessageStatus::NeedCredentials);
    }

    let flags = core.config.renegotiation_flags;
    if renegotiating
        && (flags.contains(RenegotiationFlags::DISALLOW_RENEGOTIATION) || !core.session.secure_renegotiation)
    {
        return Err(TlsError::handshake_failure("renegotiation refused"));
    }

    let version = negotiate_version(core, ch.client_version, renegotiating)?;
    if !ch.compression_methods.contains(&COMPRESSION_NULL) {
        return Err(TlsError::illegal_parameter("client does not offer null compression"));
    }

    let server_name = find_extension(&ch.extensions, ExtensionType::SERVER_NAME)
        .map(|e| parse_server_name(&e.data))
        .transpose()?
        .flatten();
    let peer_signature_algorithms = if version.is_tls12() {
        find_extension(&ch.extensions, ExtensionType::SIGNATURE_ALGORITHMS)
            .map(|e| parse_signature_algorithms(&e.data))
            .transpose()?
    } else {
        None
    };
    let peer_groups = find_extension(&ch.extensions, ExtensionType::SUPPORTED_GROUPS)
        .map(|e| parse_supported_groups(&e.data))
        .transpose()?;
    let point_formats = find_extension(&ch.extensions, ExtensionType::EC_POINT_FORMATS)
        .map(|e| parse_ec_point_formats(&e.data))
        .transpose()?;
    let ecdhe_usable = peer_groups
        .as_ref()
        .map_or(true, |g| g.contains(&NamedGroup::SECP256R1))
        && point_formats
            .as_ref()
            .map_or(true, |f| f.contains(&EC_POINT_FORMAT_UNCOMPRESSED));

    let peer_secure_renegotiation = check_renegotiation_info(core, &ch, renegotiating)?;

    let suite = select_cipher_suite(core, &ch.cipher_suites, version, ecdhe_usable)?;

    let mut hs = HandshakeParameters::new();
    hs.client_random = ch.random;
    hs.server_random = HandshakeParameters::generate_random()?;
    hs.client_version = ch.client_version;
    hs.offered_suites = ch.cipher_suites;
    hs.server_name = server_name.clone();
    hs.peer_signature_algorithms = peer_signature_algorithms;
    hs.peer_groups = peer_groups;
    hs.peer_secure_renegotiation = peer_secure_renegotiation;
    hs.key_exchange = Some(KeyExchange::new(suite.key_exchange));
    core.handshake = Some(hs);
    if server_name.is_some() {
        core.server_name = server_name;
    }
    core.negotiated_version = Some(version);
    core.session
        .set_pending(CryptoParameters::new(true, version, suite.suite)?);
    *ready = true;
    tracing::debug!(suite = suite.name, ?version, renegotiating, "ClientHello accepted");
    Ok(MessageStatus::Continue)
}

/// Highest version both sides support.
fn negotiate_version(
    core: &ConnectionCore,
    client_version: u16,
    renegotiating: bool,
) -> Result<TlsVersion, TlsError> {
    if client_version < TlsVersion::Tls10.to_u16() {
        return Err(TlsError::protocol_version(format!(
            "client version 0x{client_version:04x} is too old"
        )));
    }
    let version = TlsVersion::from_u16(client_version.min(TlsVersion::Tls12.to_u16()))
        .ok_or_else(|| TlsError::protocol_version("unknown client version"))?
        .min(core.config.max_version);
    if version < core.config.min_version {
        return Err(TlsError::protocol_version(format!(
            "client version {version:?} below configured minimum"
        )));
    }
    if renegotiating && core.negotiated_version != Some(version) {
        return Err(TlsError::protocol_version("version changed on renegotiation"));
    }
    Ok(version)
}

/// RFC 5746 checks on the ClientHello. Returns whether the client signalled
/// support.
fn check_renegotiation_info(
    core: &mut ConnectionCore,
    ch: &ClientHello,
    renegotiating: bool,
) -> Result<bool, TlsError> {
    let scsv = ch
        .cipher_suites
        .contains(&CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV);
    let info = find_extension(&ch.extensions, ExtensionType::RENEGOTIATION_INFO)
        .map(|e| parse_renegotiation_info(&e.data))
        .transpose()?;

    if renegotiating {
        if scsv {
            return Err(TlsError::handshake_failure("SCSV in renegotiation ClientHello"));
        }
        match &info {
            Some(data) if bytes_match(data, &core.session.client_verify_data) => {}
            _ => return Err(TlsError::handshake_failure("renegotiation_info mismatch")),
        }
    } else if info.as_ref().is_some_and(|data| !data.is_empty()) {
        return Err(TlsError::handshake_failure(
            "non-empty renegotiation_info on initial handshake",
        ));
    }

    let peer_secure = scsv || info.is_some();
    core.session.secure_renegotiation =
        peer_secure && core.config.renegotiation_flags.secure_renegotiation_enabled();
    Ok(peer_secure)
}

/// First suite in the client's order that we enable at `version` and our
/// certificate can serve.
fn select_cipher_suite(
    core: &ConnectionCore,
    offered: &[CipherSuite],
    version: TlsVersion,
    ecdhe_usable: bool,
) -> Result<CipherSuiteParams, TlsError> {
    let leaf = core
        .config
        .certificate_chain
        .first()
        .ok_or_else(|| TlsError::internal_error("no server certificate"))?;
    let enabled = core.config.cipher_suites_for(version);
    offered
        .iter()
        .filter(|s| enabled.contains(s))
        .filter_map(|s| CipherSuiteParams::from_suite(*s).ok())
        .filter(|p| p.supports(version))
        .filter(|p| ecdhe_usable || p.key_exchange != KeyExchangeAlgorithm::Ecdhe)
        .find(|p| check_key_usage(leaf, p.key_exchange).is_ok())
        .ok_or_else(|| TlsError::handshake_failure("no shared cipher suite"))
}

/// ServerHello, Certificate, ServerKeyExchange?, CertificateRequest?,
/// ServerHelloDone.
pub(super) fn send_server_flight(
    core: &mut ConnectionCore,
    out: &mut MultiBuffer,
) -> Result<NegotiationState, TlsError> {
    let version = core.version()?;
    let renegotiating = core.is_renegotiating();
    let hs = core.handshake()?;
    let server_random = hs.server_random;

    let mut extensions = Vec::new();
    if hs.peer_secure_renegotiation && core.config.renegotiation_flags.secure_renegotiation_enabled() {
        let data = if renegotiating {
            [
                core.session.client_verify_data.as_slice(),
                core.session.server_verify_data.as_slice(),
            ]
            .concat()
        } else {
            Vec::new()
        };
        extensions.push(build_renegotiation_info(&data)?);
    }

    let pending = core.pending()?;
    let suite = pending.cipher_suite();
    let key_exchange = pending.suite_params().key_exchange;
    let hello = ServerHello {
        server_version: version.to_u16(),
        random: server_random,
        session_id: Vec::new(),
        cipher_suite: suite,
        compression_method: COMPRESSION_NULL,
        extensions,
    };
    core.send_handshake(out, encode_server_hello(&hello)?)?;

    let chain = core.config.certificate_chain.clone();
    let message = encode_certificate(&CertificateMsg {
        certificate_list: chain.clone(),
    })?;
    core.pending_mut()?.server_certificates = chain;
    core.send_handshake(out, message)?;

    if key_exchange.is_ephemeral() {
        let signer = signer(&core.config)?;
        let scheme = if version.is_tls12() {
            Some(select_signature_scheme(
                &signing_schemes(&core.config, signer.as_ref()),
                core.handshake()?.peer_signature_algorithms.as_deref(),
            )?)
        } else {
            None
        };
        let hs = core.handshake_mut()?;
        let kx = hs.key_exchange_mut()?;
        kx.generate_server()?;
        let params = kx.write_server()?;
        let signed = build_signed_data(&hs.client_random, &hs.server_random, &params);
        let signature = signer.sign(scheme, &signed)?;
        let message = encode_server_key_exchange(&ServerKeyExchange {
            params,
            algorithm: scheme,
            signature,
        })?;
        core.send_handshake(out, message)?;
    }

    let certificate_requested = core.config.client_certificate_policy != ClientCertificatePolicy::None;
    if certificate_requested {
        let request = CertificateRequest {
            certificate_types: vec![CERT_TYPE_RSA_SIGN],
            signature_algorithms: version
                .is_tls12()
                .then(|| core.config.signature_algorithms.clone()),
            authorities: core.config.ca_names.clone(),
        };
        core.send_handshake(out, encode_certificate_request(&request)?)?;
        core.handshake_mut()?.certificate_requested = true;
    }

    core.send_handshake(out, encode_server_hello_done())?;
    Ok(NegotiationState::ClientKeyExchange(ClientKeyExchangeState::new(
        certificate_requested,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PrivateKey, TlsConfig};
    use crate::handshake::extensions::build_supported_groups;
    use ntls_types::AlertDescription;

    const SERVER_CERT: &[u8] = include_bytes!("../../tests/data/server.der");
    const SERVER_KEY: &[u8] = include_bytes!("../../tests/data/server_key.der");

    fn server_core(flags: RenegotiationFlags) -> ConnectionCore {
        let config = TlsConfig::builder()
            .certificate_chain(vec![SERVER_CERT.to_vec()])
            .private_key(PrivateKey::from_pkcs8_der(SERVER_KEY).unwrap())
            .renegotiation_flags(flags)
            .build();
        ConnectionCore::new(config, true)
    }

    fn hello(cipher_suites: Vec<CipherSuite>, extensions: Vec<crate::handshake::extensions::Extension>) -> ClientHello {
        ClientHello {
            client_version: TlsVersion::Tls12.to_u16(),
            random: [7; 32],
            session_id: Vec::new(),
            cipher_suites,
            compression_methods: vec![COMPRESSION_NULL],
            extensions,
        }
    }

    fn handle(core: &mut ConnectionCore, ch: ClientHello, renegotiating: bool) -> Result<MessageStatus, TlsError> {
        let mut ready = false;
        let status = handle_client_hello(core, HandshakeMessage::ClientHello(ch), renegotiating, &mut ready)?;
        assert_eq!(ready, status == MessageStatus::Continue);
        Ok(status)
    }

    #[test]
    fn test_accepts_and_selects_in_client_order() {
        let mut core = server_core(RenegotiationFlags::default());
        let ch = hello(
            vec![
                CipherSuite(0x1301),
                CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
            ],
            Vec::new(),
        );
        assert_eq!(handle(&mut core, ch, false).unwrap(), MessageStatus::Continue);
        assert_eq!(core.negotiated_version, Some(TlsVersion::Tls12));
        assert_eq!(
            core.pending().unwrap().cipher_suite(),
            CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA
        );
        assert!(!core.session.secure_renegotiation);
    }

    #[test]
    fn test_missing_credentials() {
        let mut core = ConnectionCore::new(TlsConfig::builder().build(), true);
        let ch = hello(vec![CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA], Vec::new());
        assert_eq!(handle(&mut core, ch, false).unwrap(), MessageStatus::NeedCredentials);
        assert!(core.handshake.is_none());
    }

    #[test]
    fn test_ecdhe_needs_p256() {
        let mut core = server_core(RenegotiationFlags::default());
        let groups = build_supported_groups(&[NamedGroup(0x0018)]).unwrap();
        let ch = hello(
            vec![
                CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
            ],
            vec![groups],
        );
        handle(&mut core, ch, false).unwrap();
        assert_eq!(
            core.pending().unwrap().cipher_suite(),
            CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256
        );
    }

    #[test]
    fn test_suite_not_usable_at_version() {
        let mut core = server_core(RenegotiationFlags::default());
        let mut ch = hello(vec![CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256], Vec::new());
        ch.client_version = TlsVersion::Tls11.to_u16();
        let err = handle(&mut core, ch, false).unwrap_err();
        assert_eq!(err.description(), Some(AlertDescription::HandshakeFailure));
    }

    #[test]
    fn test_version_checks() {
        let mut core = server_core(RenegotiationFlags::default());
        let mut ch = hello(vec![CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA], Vec::new());
        ch.client_version = 0x0300;
        let err = handle(&mut core, ch, false).unwrap_err();
        assert_eq!(err.description(), Some(AlertDescription::ProtocolVersion));

        // Future versions are answered with our highest.
        let mut core = server_core(RenegotiationFlags::default());
        let mut ch = hello(vec![CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA], Vec::new());
        ch.client_version = 0x0304;
        handle(&mut core, ch, false).unwrap();
        assert_eq!(core.negotiated_version, Some(TlsVersion::Tls12));
    }

    #[test]
    fn test_null_compression_required() {
        let mut core = server_core(RenegotiationFlags::default());
        let mut ch = hello(vec![CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA], Vec::new());
        ch.compression_methods = vec![1];
        let err = handle(&mut core, ch, false).unwrap_err();
        assert_eq!(err.description(), Some(AlertDescription::IllegalParameter));
    }

    #[test]
    fn test_renegotiation_signalling() {
        let suites = vec![
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV,
        ];
        let mut core = server_core(RenegotiationFlags::default());
        handle(&mut core, hello(suites.clone(), Vec::new()), false).unwrap();
        assert!(core.session.secure_renegotiation);
        assert!(core.handshake().unwrap().peer_secure_renegotiation);

        let mut core = server_core(RenegotiationFlags::NONE);
        handle(&mut core, hello(suites, Vec::new()), false).unwrap();
        assert!(!core.session.secure_renegotiation);

        let mut core = server_core(RenegotiationFlags::default());
        let info = build_renegotiation_info(&[1; 12]).unwrap();
        let ch = hello(vec![CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA], vec![info]);
        let err = handle(&mut core, ch, false).unwrap_err();
        assert_eq!(err.description(), Some(AlertDescription::HandshakeFailure));
    }

    #[test]
    fn test_renegotiation_refused() {
        let info = build_renegotiation_info(&[1; 12]).unwrap();
        let ch = hello(vec![CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA], vec![info.clone()]);

        // Never agreed on secure renegotiation.
        let mut core = server_core(RenegotiationFlags::default());
        let err = handle(&mut core, ch.clone(), true).unwrap_err();
        assert_eq!(err.description(), Some(AlertDescription::HandshakeFailure));

        // Disallowed by policy.
        let mut core = server_core(RenegotiationFlags::default() | RenegotiationFlags::DISALLOW_RENEGOTIATION);
        core.session.secure_renegotiation = true;
        let err = handle(&mut core, ch.clone(), true).unwrap_err();
        assert_eq!(err.description(), Some(AlertDescription::HandshakeFailure));

        // Wrong verify data.
        let mut core = server_core(RenegotiationFlags::default());
        core.session.secure_renegotiation = true;
        core.session.client_verify_data = vec![2; 12];
        core.negotiated_version = Some(TlsVersion::Tls12);
        let err = handle(&mut core, ch, true).unwrap_err();
        assert_eq!(err.description(), Some(AlertDescription::HandshakeFailure));

        // SCSV is not allowed on renegotiation.
        let mut core = server_core(RenegotiationFlags::default());
        core.session.secure_renegotiation = true;
        core.session.client_verify_data = vec![1; 12];
        core.negotiated_version = Some(TlsVersion::Tls12);
        let ch = hello(
            vec![
                CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV,
            ],
            vec![info],
        );
        let err = handle(&mut core, ch, true).unwrap_err();
        assert_eq!(err.description(), Some(AlertDescription::HandshakeFailure));
    }
}
