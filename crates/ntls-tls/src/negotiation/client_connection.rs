//! Client hello phases: the first ClientHello and HelloRequest handling on an
//! established connection.

use super::{MessageStatus, NegotiationState, ServerHelloState};
use crate::buffer::MultiBuffer;
use crate::config::RenegotiationFlags;
use crate::context::connection::ConnectionCore;
use crate::crypt::{CipherSuiteParams, KeyExchangeAlgorithm, NamedGroup};
use crate::handshake::codec::{encode_client_hello, ClientHello, COMPRESSION_NULL};
use crate::handshake::extensions::{
    build_ec_point_formats, build_renegotiation_info, build_server_name,
    build_signature_algorithms, build_supported_groups,
};
use crate::handshake::params::HandshakeParameters;
use crate::{CipherSuite, TlsVersion};
use ntls_types::TlsError;

/// Start a handshake by sending ClientHello.
pub(super) fn send_client_hello(
    core: &mut ConnectionCore,
    out: &mut MultiBuffer,
    renegotiating: bool,
) -> Result<NegotiationState, TlsError> {
    let flags = core.config.renegotiation_flags;
    let version = if renegotiating {
        core.version()?
    } else {
        core.config.max_version
    };

    let mut cipher_suites = core.config.cipher_suites_for(version);
    if cipher_suites.is_empty() {
        return Err(TlsError::handshake_failure(format!(
            "no cipher suite enabled for {version:?}"
        )));
    }
    let offers_ecdhe = cipher_suites.iter().any(|s| {
        CipherSuiteParams::from_suite(*s).is_ok_and(|p| p.key_exchange == KeyExchangeAlgorithm::Ecdhe)
    });

    let mut extensions = Vec::new();
    if let Some(name) = &core.server_name {
        extensions.push(build_server_name(name)?);
    }
    if flags.secure_renegotiation_enabled() {
        if flags.contains(RenegotiationFlags::SEND_CLIENT_HELLO_EXTENSION) {
            let data = if renegotiating {
                core.session.client_verify_data.clone()
            } else {
                Vec::new()
            };
            extensions.push(build_renegotiation_info(&data)?);
        }
        if flags.contains(RenegotiationFlags::SEND_CIPHER_SPEC_CODE) && !core.session.secure_renegotiation {
            cipher_suites.push(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV);
        }
    }
    if version.is_tls12() {
        extensions.push(build_signature_algorithms(&core.config.signature_algorithms)?);
    }
    if offers_ecdhe {
        extensions.push(build_supported_groups(&[NamedGroup::SECP256R1])?);
        extensions.push(build_ec_point_formats());
    }

    let mut hs = HandshakeParameters::new();
    hs.client_random = HandshakeParameters::generate_random()?;
    hs.client_version = version.to_u16();
    hs.offered_suites = cipher_suites.clone();
    hs.server_name = core.server_name.clone();

    let hello = ClientHello {
        client_version: hs.client_version,
        random: hs.client_random,
        session_id: Vec::new(),
        cipher_suites,
        compression_methods: vec![COMPRESSION_NULL],
        extensions,
    };
    core.handshake = Some(hs);
    core.send_handshake(out, encode_client_hello(&hello)?)?;
    tracing::debug!(?version, renegotiating, "ClientHello sent");
    Ok(NegotiationState::ServerHello(ServerHelloState::default()))
}

/// HelloRequest on an established client connection.
pub(super) fn handle_hello_request(
    core: &mut ConnectionCore,
    hello_requested: &mut bool,
) -> Result<MessageStatus, TlsError> {
    let flags = core.config.renegotiation_flags;
    if flags.contains(RenegotiationFlags::ABORT_ON_HELLO_REQUEST) {
        return Err(TlsError::handshake_failure("renegotiation request refused"));
    }
    if flags.contains(RenegotiationFlags::DISALLOW_RENEGOTIATION) || !core.session.secure_renegotiation {
        tracing::debug!(
            secure_renegotiation = core.session.secure_renegotiation,
            "ignoring HelloRequest"
        );
        return Ok(MessageStatus::Ignore);
    }
    tracing::debug!("renegotiating on HelloRequest");
    *hello_requested = true;
    Ok(MessageStatus::Renegotiate)
}

/// Version the client accepts in ServerHello.
pub(super) fn check_server_version(
    core: &ConnectionCore,
    server_version: u16,
    offered: u16,
    renegotiating: bool,
) -> Result<TlsVersion, TlsError> {
    let version = TlsVersion::from_u16(server_version)
        .filter(|v| *v >= core.config.min_version && *v <= core.config.max_version)
        .filter(|v| v.to_u16() <= offered)
        .ok_or_else(|| {
            TlsError::protocol_version(format!("server chose version 0x{server_version:04x}"))
        })?;
    if renegotiating && core.negotiated_version != Some(version) {
        return Err(TlsError::protocol_version("version changed on renegotiation"));
    }
    Ok(version)
}
