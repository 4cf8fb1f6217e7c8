//! Handshake negotiation state machine.
//!
//! One variant per handshake phase. Each phase checks message order with
//! `verify_message`, consumes messages with `handle_message`, and once its
//! inbound flight is complete produces the next flight and the next phase in
//! `generate_output`.

mod client_connection;
mod client_key_exchange;
mod server_connection;
mod server_finished;
mod server_hello;

use std::sync::Arc;

use subtle::ConstantTimeEq;

pub use client_key_exchange::ClientKeyExchangeState;
pub use server_finished::ServerFinishedState;
pub use server_hello::ServerHelloState;

use crate::buffer::MultiBuffer;
use crate::config::TlsConfig;
use crate::context::connection::ConnectionCore;
use crate::crypt::key_schedule::{compute_key_block, compute_master_secret, compute_verify_data};
use crate::crypt::keylog::log_master_secret;
use crate::handshake::signing::{RsaSignatureProvider, SignatureProvider};
use crate::handshake::{HandshakeMessage, MessageKind};
use ntls_types::TlsError;

/// Outcome of handling one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageStatus {
    /// Discarded without effect (HelloRequest the client will not honor).
    Ignore,
    Continue,
    /// Local credentials are missing; replay the same input once installed.
    NeedCredentials,
    /// A new handshake starts on an established connection.
    Renegotiate,
    /// The peer Finished verified and both Finished messages are exchanged.
    Finished,
}

#[derive(Debug)]
pub enum NegotiationState {
    /// Client before its first ClientHello.
    InitialClientConnection,
    /// Client with an established session, waiting for HelloRequest.
    RenegotiatingClientConnection { hello_requested: bool },
    ServerHello(ServerHelloState),
    ServerFinished(ServerFinishedState),
    /// Server waiting for the first ClientHello.
    InitialServerConnection { ready: bool },
    /// Server with an established session, waiting for a new ClientHello.
    RenegotiatingServerConnection { ready: bool },
    ClientKeyExchange(ClientKeyExchangeState),
}

impl NegotiationState {
    pub(crate) fn initial(is_server: bool) -> Self {
        if is_server {
            NegotiationState::InitialServerConnection { ready: false }
        } else {
            NegotiationState::InitialClientConnection
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NegotiationState::InitialClientConnection => "InitialClientConnection",
            NegotiationState::RenegotiatingClientConnection { .. } => "RenegotiatingClientConnection",
            NegotiationState::ServerHello(_) => "ServerHello",
            NegotiationState::ServerFinished(_) => "ServerFinished",
            NegotiationState::InitialServerConnection { .. } => "InitialServerConnection",
            NegotiationState::RenegotiatingServerConnection { .. } => "RenegotiatingServerConnection",
            NegotiationState::ClientKeyExchange(_) => "ClientKeyExchange",
        }
    }

    /// Whether `kind` may arrive now.
    pub fn verify_message(&self, kind: MessageKind) -> bool {
        use crate::handshake::HandshakeType as T;
        match self {
            NegotiationState::InitialClientConnection => false,
            NegotiationState::RenegotiatingClientConnection { hello_requested } => {
                !hello_requested && kind == MessageKind::Handshake(T::HelloRequest)
            }
            NegotiationState::ServerHello(s) => s.verify_message(kind),
            NegotiationState::ServerFinished(s) => s.verify_message(kind),
            NegotiationState::InitialServerConnection { ready }
            | NegotiationState::RenegotiatingServerConnection { ready } => {
                !ready && kind == MessageKind::Handshake(T::ClientHello)
            }
            NegotiationState::ClientKeyExchange(s) => s.verify_message(kind),
        }
    }

    pub fn handle_message(
        &mut self,
        core: &mut ConnectionCore,
        message: HandshakeMessage,
    ) -> Result<MessageStatus, TlsError> {
        match self {
            NegotiationState::InitialClientConnection => Err(TlsError::unexpected_message(
                "message before ClientHello was sent",
            )),
            NegotiationState::RenegotiatingClientConnection { hello_requested } => {
                client_connection::handle_hello_request(core, hello_requested)
            }
            NegotiationState::ServerHello(s) => s.handle_message(core, message),
            NegotiationState::ServerFinished(s) => s.handle_message(core, message),
            NegotiationState::InitialServerConnection { ready } => {
                server_connection::handle_client_hello(core, message, false, ready)
            }
            NegotiationState::RenegotiatingServerConnection { ready } => {
                server_connection::handle_client_hello(core, message, true, ready)
            }
            NegotiationState::ClientKeyExchange(s) => s.handle_message(core, message),
        }
    }

    /// Whether the phase has a flight to send.
    pub fn wants_output(&self) -> bool {
        match self {
            NegotiationState::InitialClientConnection => true,
            NegotiationState::RenegotiatingClientConnection { hello_requested } => *hello_requested,
            NegotiationState::ServerHello(s) => s.wants_output(),
            NegotiationState::ServerFinished(s) => s.wants_output(),
            NegotiationState::InitialServerConnection { ready }
            | NegotiationState::RenegotiatingServerConnection { ready } => *ready,
            NegotiationState::ClientKeyExchange(s) => s.wants_output(),
        }
    }

    /// Write the phase's flight into `out` and return the next phase.
    pub fn generate_output(
        self,
        core: &mut ConnectionCore,
        out: &mut MultiBuffer,
    ) -> Result<NegotiationState, TlsError> {
        let from = self.name();
        let next = match self {
            NegotiationState::InitialClientConnection => {
                client_connection::send_client_hello(core, out, false)?
            }
            NegotiationState::RenegotiatingClientConnection { .. } => {
                client_connection::send_client_hello(core, out, true)?
            }
            NegotiationState::ServerHello(s) => s.generate_output(core, out)?,
            NegotiationState::ServerFinished(s) => s.generate_output(core)?,
            NegotiationState::InitialServerConnection { .. }
            | NegotiationState::RenegotiatingServerConnection { .. } => {
                server_connection::send_server_flight(core, out)?
            }
            NegotiationState::ClientKeyExchange(s) => s.generate_output(core, out)?,
        };
        tracing::debug!(is_server = core.is_server, from, to = next.name(), "negotiation state");
        Ok(next)
    }
}

/// Turn the pre-master secret into the master secret and the pending keys.
pub(crate) fn derive_keys(core: &mut ConnectionCore) -> Result<(), TlsError> {
    let version = core.version()?;
    let extra_padding = core.config.extra_padding_blocks;
    let hs = core.handshake_mut()?;
    let pre_master_secret = hs.key_exchange_mut()?.take_pre_master_secret()?;
    let client_random = hs.client_random;
    let server_random = hs.server_random;

    let suite = *core.pending()?.suite_params();
    let master_secret = compute_master_secret(
        suite.prf(version),
        &pre_master_secret,
        &client_random,
        &server_random,
    );
    log_master_secret(&core.config, &client_random, &master_secret);
    let key_block = compute_key_block(&suite, version, &master_secret, &client_random, &server_random);

    let pending = core.pending_mut()?;
    pending.initialize_cipher(&key_block)?;
    pending.set_extra_padding_blocks(extra_padding);
    pending.set_master_secret(master_secret);
    tracing::debug!(suite = suite.name, ?version, "session keys derived");
    Ok(())
}

/// verify_data over the transcript so far, under the pending master secret.
pub(crate) fn compute_finished(core: &ConnectionCore, label: &str) -> Result<Vec<u8>, TlsError> {
    let version = core.version()?;
    let pending = core.pending()?;
    let suite = pending.suite_params();
    let master_secret = pending
        .master_secret()
        .ok_or_else(|| TlsError::internal_error("master secret not derived"))?;
    let hash = core.handshake()?.transcript.hash(suite.handshake_hash(version));
    Ok(compute_verify_data(suite.prf(version), master_secret, label, &hash))
}

/// Promote the pending parameters and drop the handshake state.
pub(crate) fn finish_handshake(core: &mut ConnectionCore) -> Result<(), TlsError> {
    core.session.switch_to_new_cipher();
    let established = core.session.current().is_some_and(|c| c.has_cipher());
    if !established || core.session.pending().is_some() {
        return Err(TlsError::insufficient_security(
            "handshake finished without an active cipher",
        ));
    }
    core.handshake = None;
    if let Some(current) = core.session.current() {
        tracing::info!(
            is_server = core.is_server,
            suite = current.suite_params().name,
            version = ?current.version(),
            secure_renegotiation = core.session.secure_renegotiation,
            "handshake complete"
        );
    }
    Ok(())
}

/// Constant-time comparison of verify data.
pub(crate) fn bytes_match(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// The configured signer, or one built from the private key.
pub(crate) fn signer(config: &TlsConfig) -> Result<Arc<dyn SignatureProvider>, TlsError> {
    if let Some(provider) = &config.signature_provider {
        return Ok(Arc::clone(provider));
    }
    let key = config
        .private_key
        .as_ref()
        .ok_or_else(|| TlsError::internal_error("no private key configured"))?;
    Ok(Arc::new(RsaSignatureProvider::new(key)?))
}

/// Our TLS 1.2 schemes the signer can produce, in configured order.
pub(crate) fn signing_schemes(
    config: &TlsConfig,
    signer: &dyn SignatureProvider,
) -> Vec<crate::crypt::SignatureScheme> {
    let supported = signer.supported_schemes();
    config
        .signature_algorithms
        .iter()
        .copied()
        .filter(|s| supported.contains(s))
        .collect()
}
