//! Server side: the client's key exchange flight, answered with the server's
//! ChangeCipherSpec and Finished.

use super::{bytes_match, compute_finished, derive_keys, finish_handshake, MessageStatus, NegotiationState};
use crate::buffer::MultiBuffer;
use crate::cert_verify::{rsa_public_key, verify_client_certificate};
use crate::config::ClientCertificatePolicy;
use crate::context::connection::ConnectionCore;
use crate::crypt::key_schedule::{LABEL_CLIENT_FINISHED, LABEL_SERVER_FINISHED};
use crate::crypt::KeyExchangeAlgorithm;
use crate::handshake::codec::{encode_finished, CertificateMsg, CertificateVerify};
use crate::handshake::signing::verify_rsa;
use crate::handshake::{HandshakeMessage, HandshakeType, MessageKind};
use ntls_types::TlsError;

/// Accumulates Certificate?, ClientKeyExchange, CertificateVerify?,
/// ChangeCipherSpec and Finished.
#[derive(Debug, Default)]
pub struct ClientKeyExchangeState {
    certificate_requested: bool,
    certificate_received: bool,
    /// The client presented at least one certificate.
    client_authenticated: bool,
    key_exchange_received: bool,
    certificate_verify_received: bool,
    change_cipher_spec_received: bool,
    finished_received: bool,
}

impl ClientKeyExchangeState {
    pub fn new(certificate_requested: bool) -> Self {
        Self {
            certificate_requested,
            ..Self::default()
        }
    }

    pub fn verify_message(&self, kind: MessageKind) -> bool {
        if self.finished_received {
            return false;
        }
        match kind {
            MessageKind::Handshake(HandshakeType::Certificate) => {
                self.certificate_requested && !self.certificate_received && !self.key_exchange_received
            }
            MessageKind::Handshake(HandshakeType::ClientKeyExchange) => !self.key_exchange_received,
            MessageKind::Handshake(HandshakeType::CertificateVerify) => {
                self.key_exchange_received
                    && self.client_authenticated
                    && !self.certificate_verify_received
                    && !self.change_cipher_spec_received
            }
            MessageKind::ChangeCipherSpec => {
                self.key_exchange_received
                    && !self.change_cipher_spec_received
                    && (self.certificate_verify_received || !self.client_authenticated)
            }
            MessageKind::Handshake(HandshakeType::Finished) => self.change_cipher_spec_received,
            MessageKind::Handshake(_) => false,
        }
    }

    pub fn handle_message(
        &mut self,
        core: &mut ConnectionCore,
        message: HandshakeMessage,
    ) -> Result<MessageStatus, TlsError> {
        match message {
            HandshakeMessage::Certificate(cert) => self.handle_certificate(core, cert),
            HandshakeMessage::ClientKeyExchange(body) => self.handle_client_key_exchange(core, &body),
            HandshakeMessage::CertificateVerify(cv) => self.handle_certificate_verify(core, cv),
            HandshakeMessage::ChangeCipherSpec => {
                if !core.session.activate_pending_read() {
                    return Err(TlsError::unexpected_message(
                        "ChangeCipherSpec before keys were derived",
                    ));
                }
                self.change_cipher_spec_received = true;
                tracing::debug!("read cipher activated");
                Ok(MessageStatus::Continue)
            }
            HandshakeMessage::Finished(finished) => {
                let expected = compute_finished(core, LABEL_CLIENT_FINISHED)?;
                if !bytes_match(&finished.verify_data, &expected) {
                    return Err(TlsError::handshake_failure("client Finished does not verify"));
                }
                core.session.client_verify_data = expected;
                self.finished_received = true;
                Ok(MessageStatus::Finished)
            }
            _ => Err(TlsError::unexpected_message("unexpected message in client key exchange flight")),
        }
    }

    fn handle_certificate(
        &mut self,
        core: &mut ConnectionCore,
        cert: CertificateMsg,
    ) -> Result<MessageStatus, TlsError> {
        self.certificate_received = true;
        let chain = cert.certificate_list;
        if chain.is_empty() {
            if core.config.client_certificate_policy == ClientCertificatePolicy::Required {
                return Err(TlsError::handshake_failure("client certificate required"));
            }
            tracing::debug!("client declined to authenticate");
            return Ok(MessageStatus::Continue);
        }
        verify_client_certificate(&core.config, &chain)?;
        rsa_public_key(&chain[0])?;
        core.pending_mut()?.client_certificates = chain;
        self.client_authenticated = true;
        Ok(MessageStatus::Continue)
    }

    fn handle_client_key_exchange(
        &mut self,
        core: &mut ConnectionCore,
        body: &[u8],
    ) -> Result<MessageStatus, TlsError> {
        if core.config.client_certificate_policy == ClientCertificatePolicy::Required
            && !self.client_authenticated
        {
            return Err(TlsError::handshake_failure("client certificate required"));
        }
        let hs = core.handshake_mut()?;
        let client_version = hs.client_version;
        let kx = hs.key_exchange_mut()?;
        let server_key = match kx.algorithm() {
            KeyExchangeAlgorithm::Rsa => {
                let key = core
                    .config
                    .private_key
                    .as_ref()
                    .ok_or_else(|| TlsError::internal_error("RSA key exchange needs a private key"))?;
                Some(key.to_rsa()?)
            }
            KeyExchangeAlgorithm::Dhe | KeyExchangeAlgorithm::Ecdhe => None,
        };
        core.handshake_mut()?
            .key_exchange_mut()?
            .handle_client(body, server_key.as_ref(), client_version)?;
        derive_keys(core)?;
        self.key_exchange_received = true;
        Ok(MessageStatus::Continue)
    }

    fn handle_certificate_verify(
        &mut self,
        core: &mut ConnectionCore,
        cv: CertificateVerify,
    ) -> Result<MessageStatus, TlsError> {
        if let Some(alg) = cv.algorithm {
            if !core.config.signature_algorithms.contains(&alg) {
                return Err(TlsError::illegal_parameter(format!(
                    "CertificateVerify signed with unrequested algorithm 0x{:04x}",
                    alg.0
                )));
            }
        }
        let leaf = core
            .pending()?
            .client_certificates
            .first()
            .ok_or_else(|| TlsError::internal_error("client certificate missing"))?;
        let key = rsa_public_key(leaf)?;
        verify_rsa(
            &key,
            cv.algorithm,
            core.handshake()?.transcript.messages(),
            &cv.signature,
        )?;
        self.certificate_verify_received = true;
        Ok(MessageStatus::Continue)
    }

    pub fn wants_output(&self) -> bool {
        self.finished_received
    }

    /// ChangeCipherSpec and Finished; the handshake completes.
    pub fn generate_output(
        self,
        core: &mut ConnectionCore,
        out: &mut MultiBuffer,
    ) -> Result<NegotiationState, TlsError> {
        core.send_change_cipher_spec(out)?;
        let verify_data = compute_finished(core, LABEL_SERVER_FINISHED)?;
        core.send_handshake(out, encode_finished(&verify_data))?;
        core.session.server_verify_data = verify_data;
        finish_handshake(core)?;
        Ok(NegotiationState::RenegotiatingServerConnection { ready: false })
    }
}
