//! Client side: the server's hello flight, answered with the client's
//! key exchange flight.

use rsa::RsaPublicKey;

use super::client_connection::check_server_version;
use super::{
    bytes_match, compute_finished, derive_keys, signer, signing_schemes, MessageStatus,
    NegotiationState, ServerFinishedState,
};
use crate::buffer::MultiBuffer;
use crate::cert_verify::{check_key_usage, rsa_public_key, verify_server_certificate};
use crate::config::RenegotiationFlags;
use crate::context::connection::ConnectionCore;
use crate::crypt::key_schedule::LABEL_CLIENT_FINISHED;
use crate::crypt::{CipherSuiteParams, KeyExchangeAlgorithm};
use crate::handshake::codec::{
    encode_certificate, encode_certificate_verify, encode_finished, CertificateMsg,
    CertificateRequest, CertificateVerify, ServerHello, COMPRESSION_NULL,
};
use crate::handshake::extensions::{find_extension, parse_renegotiation_info, Extension, ExtensionType};
use crate::handshake::key_exchange::{
    build_signed_data, decode_server_key_exchange, encode_client_key_exchange, KeyExchange,
};
use crate::handshake::signing::{select_signature_scheme, verify_rsa};
use crate::handshake::{HandshakeMessage, HandshakeType, MessageKind};
use crate::record::CryptoParameters;
use crate::CipherSuite;
use ntls_types::TlsError;

/// Accumulates ServerHello, Certificate, ServerKeyExchange,
/// CertificateRequest and ServerHelloDone.
#[derive(Debug, Default)]
pub struct ServerHelloState {
    key_exchange: Option<KeyExchangeAlgorithm>,
    server_key: Option<RsaPublicKey>,
    key_exchange_received: bool,
    certificate_request_received: bool,
    done_received: bool,
}

impl ServerHelloState {
    fn server_hello_received(&self) -> bool {
        self.key_exchange.is_some()
    }

    fn certificate_received(&self) -> bool {
        self.server_key.is_some()
    }

    /// The server parameters needed before CertificateRequest or
    /// ServerHelloDone are in.
    fn ready_for_done(&self) -> bool {
        self.certificate_received()
            && (self.key_exchange_received || !self.key_exchange.is_some_and(|kx| kx.is_ephemeral()))
    }

    pub fn verify_message(&self, kind: MessageKind) -> bool {
        let MessageKind::Handshake(ty) = kind else {
            return false;
        };
        if self.done_received {
            return false;
        }
        match ty {
            HandshakeType::HelloRequest => true,
            HandshakeType::ServerHello => !self.server_hello_received(),
            HandshakeType::Certificate => self.server_hello_received() && !self.certificate_received(),
            HandshakeType::ServerKeyExchange => {
                self.certificate_received()
                    && self.key_exchange.is_some_and(|kx| kx.is_ephemeral())
                    && !self.key_exchange_received
                    && !self.certificate_request_received
            }
            HandshakeType::CertificateRequest => {
                self.ready_for_done() && !self.certificate_request_received
            }
            HandshakeType::ServerHelloDone => self.ready_for_done(),
            _ => false,
        }
    }

    pub fn handle_message(
        &mut self,
        core: &mut ConnectionCore,
        message: HandshakeMessage,
    ) -> Result<MessageStatus, TlsError> {
        match message {
            HandshakeMessage::HelloRequest => Ok(MessageStatus::Ignore),
            HandshakeMessage::ServerHello(sh) => self.handle_server_hello(core, sh),
            HandshakeMessage::Certificate(cert) => self.handle_certificate(core, cert),
            HandshakeMessage::ServerKeyExchange(body) => self.handle_server_key_exchange(core, &body),
            HandshakeMessage::CertificateRequest(cr) => self.handle_certificate_request(core, cr),
            HandshakeMessage::ServerHelloDone => self.handle_server_hello_done(core),
            _ => Err(TlsError::unexpected_message("unexpected message in server hello flight")),
        }
    }

    fn handle_server_hello(
        &mut self,
        core: &mut ConnectionCore,
        sh: ServerHello,
    ) -> Result<MessageStatus, TlsError> {
        let renegotiating = core.is_renegotiating();
        let offered = core.handshake()?.client_version;
        let version = check_server_version(core, sh.server_version, offered, renegotiating)?;

        if sh.compression_method != COMPRESSION_NULL {
            return Err(TlsError::illegal_parameter(format!(
                "server chose compression method {}",
                sh.compression_method
            )));
        }

        let offered_suite = sh.cipher_suite != CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV
            && core.handshake()?.offered_suites.contains(&sh.cipher_suite);
        let params = CipherSuiteParams::from_suite(sh.cipher_suite)
            .ok()
            .filter(|p| offered_suite && p.supports(version))
            .ok_or_else(|| {
                TlsError::insufficient_security(format!(
                    "server chose cipher suite 0x{:04x} which was not offered",
                    sh.cipher_suite.0
                ))
            })?;

        check_renegotiation_info(core, &sh.extensions, renegotiating)?;

        core.negotiated_version = Some(version);
        core.session
            .set_pending(CryptoParameters::new(false, version, sh.cipher_suite)?);
        let hs = core.handshake_mut()?;
        hs.server_random = sh.random;
        hs.session_id = sh.session_id;
        hs.key_exchange = Some(KeyExchange::new(params.key_exchange));
        self.key_exchange = Some(params.key_exchange);
        tracing::debug!(suite = params.name, ?version, "ServerHello accepted");
        Ok(MessageStatus::Continue)
    }

    fn handle_certificate(
        &mut self,
        core: &mut ConnectionCore,
        cert: CertificateMsg,
    ) -> Result<MessageStatus, TlsError> {
        let chain = cert.certificate_list;
        let Some(leaf) = chain.first() else {
            return Err(TlsError::handshake_failure("server sent no certificate"));
        };
        let kx = self
            .key_exchange
            .ok_or_else(|| TlsError::internal_error("key exchange not selected"))?;
        verify_server_certificate(&core.config, &chain)?;
        check_key_usage(leaf, kx)?;
        self.server_key = Some(rsa_public_key(leaf)?);
        core.pending_mut()?.server_certificates = chain;
        Ok(MessageStatus::Continue)
    }

    fn handle_server_key_exchange(
        &mut self,
        core: &mut ConnectionCore,
        body: &[u8],
    ) -> Result<MessageStatus, TlsError> {
        let version = core.version()?;
        let kx = self
            .key_exchange
            .ok_or_else(|| TlsError::internal_error("key exchange not selected"))?;
        let server_key = self
            .server_key
            .as_ref()
            .ok_or_else(|| TlsError::internal_error("server key missing"))?;

        let ske = decode_server_key_exchange(kx, body, version.is_tls12())?;
        if let Some(alg) = ske.algorithm {
            if !core.config.signature_algorithms.contains(&alg) {
                return Err(TlsError::illegal_parameter(format!(
                    "ServerKeyExchange signed with unoffered algorithm 0x{:04x}",
                    alg.0
                )));
            }
        }
        let hs = core.handshake_mut()?;
        let signed = build_signed_data(&hs.client_random, &hs.server_random, &ske.params);
        verify_rsa(server_key, ske.algorithm, &signed, &ske.signature)?;
        hs.key_exchange_mut()?.handle_server(&ske.params)?;
        self.key_exchange_received = true;
        Ok(MessageStatus::Continue)
    }

    fn handle_certificate_request(
        &mut self,
        core: &mut ConnectionCore,
        cr: CertificateRequest,
    ) -> Result<MessageStatus, TlsError> {
        let hs = core.handshake_mut()?;
        hs.certificate_requested = true;
        hs.peer_signature_algorithms = cr.signature_algorithms;
        self.certificate_request_received = true;
        tracing::debug!(authorities = cr.authorities.len(), "client certificate requested");
        Ok(MessageStatus::Continue)
    }

    fn handle_server_hello_done(&mut self, core: &mut ConnectionCore) -> Result<MessageStatus, TlsError> {
        let has_credentials = core.config.has_credentials();
        let hs = core.handshake_mut()?;
        if hs.certificate_requested && !has_credentials && !hs.credentials_requested {
            hs.credentials_requested = true;
            return Ok(MessageStatus::NeedCredentials);
        }
        self.done_received = true;
        Ok(MessageStatus::Continue)
    }

    pub fn wants_output(&self) -> bool {
        self.done_received
    }

    /// Certificate?, ClientKeyExchange, CertificateVerify?, ChangeCipherSpec,
    /// Finished.
    pub fn generate_output(
        self,
        core: &mut ConnectionCore,
        out: &mut MultiBuffer,
    ) -> Result<NegotiationState, TlsError> {
        let version = core.version()?;
        let server_key = self
            .server_key
            .ok_or_else(|| TlsError::internal_error("server key missing"))?;

        let mut sent_certificate = false;
        if core.handshake()?.certificate_requested {
            let chain = if core.config.has_credentials() {
                core.config.certificate_chain.clone()
            } else {
                Vec::new()
            };
            sent_certificate = !chain.is_empty();
            let message = encode_certificate(&CertificateMsg {
                certificate_list: chain.clone(),
            })?;
            core.pending_mut()?.client_certificates = chain;
            core.send_handshake(out, message)?;
        }

        let hs = core.handshake_mut()?;
        let client_version = hs.client_version;
        let kx = hs.key_exchange_mut()?;
        kx.generate_client(client_version, &server_key)?;
        let body = kx.write_client()?;
        core.send_handshake(out, encode_client_key_exchange(&body))?;
        derive_keys(core)?;

        if sent_certificate {
            let signer = signer(&core.config)?;
            let hs = core.handshake()?;
            let scheme = if version.is_tls12() {
                Some(select_signature_scheme(
                    &signing_schemes(&core.config, signer.as_ref()),
                    hs.peer_signature_algorithms.as_deref(),
                )?)
            } else {
                None
            };
            let signature = signer.sign(scheme, hs.transcript.messages())?;
            let message = encode_certificate_verify(&CertificateVerify {
                algorithm: scheme,
                signature,
            })?;
            core.send_handshake(out, message)?;
        }

        core.send_change_cipher_spec(out)?;
        let verify_data = compute_finished(core, LABEL_CLIENT_FINISHED)?;
        core.send_handshake(out, encode_finished(&verify_data))?;
        core.session.client_verify_data = verify_data;
        Ok(NegotiationState::ServerFinished(ServerFinishedState::default()))
    }
}

/// RFC 5746 checks on the ServerHello `renegotiation_info` extension.
fn check_renegotiation_info(
    core: &mut ConnectionCore,
    extensions: &[Extension],
    renegotiating: bool,
) -> Result<(), TlsError> {
    let flags = core.config.renegotiation_flags;
    let enabled = flags.secure_renegotiation_enabled();
    match find_extension(extensions, ExtensionType::RENEGOTIATION_INFO) {
        Some(ext) => {
            let data = parse_renegotiation_info(&ext.data)?;
            let expected = if renegotiating {
                [
                    core.session.client_verify_data.as_slice(),
                    core.session.server_verify_data.as_slice(),
                ]
                .concat()
            } else {
                Vec::new()
            };
            if !bytes_match(&data, &expected) {
                return Err(TlsError::handshake_failure("renegotiation_info mismatch"));
            }
            core.session.secure_renegotiation = enabled;
        }
        None => {
            if renegotiating && core.session.secure_renegotiation {
                return Err(TlsError::handshake_failure(
                    "server dropped secure renegotiation",
                ));
            }
            let requested = enabled
                && (flags.contains(RenegotiationFlags::SEND_CLIENT_HELLO_EXTENSION)
                    || flags.contains(RenegotiationFlags::SEND_CIPHER_SPEC_CODE));
            if requested && flags.contains(RenegotiationFlags::ABORT_HANDSHAKE_IF_UNSUPPORTED) {
                return Err(TlsError::handshake_failure(
                    "server does not support secure renegotiation",
                ));
            }
            core.session.secure_renegotiation = false;
        }
    }
    Ok(())
}
