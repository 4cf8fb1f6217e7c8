//! Client side: the server's ChangeCipherSpec and Finished.

use super::{bytes_match, compute_finished, finish_handshake, MessageStatus, NegotiationState};
use crate::context::connection::ConnectionCore;
use crate::crypt::key_schedule::LABEL_SERVER_FINISHED;
use crate::handshake::{HandshakeMessage, HandshakeType, MessageKind};
use ntls_types::TlsError;

#[derive(Debug, Default)]
pub struct ServerFinishedState {
    change_cipher_spec_received: bool,
    finished_received: bool,
}

impl ServerFinishedState {
    pub fn verify_message(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::ChangeCipherSpec => !self.change_cipher_spec_received,
            MessageKind::Handshake(HandshakeType::Finished) => {
                self.change_cipher_spec_received && !self.finished_received
            }
            MessageKind::Handshake(HandshakeType::HelloRequest) => !self.finished_received,
            MessageKind::Handshake(_) => false,
        }
    }

    pub fn handle_message(
        &mut self,
        core: &mut ConnectionCore,
        message: HandshakeMessage,
    ) -> Result<MessageStatus, TlsError> {
        match message {
            HandshakeMessage::HelloRequest => Ok(MessageStatus::Ignore),
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
                let expected = compute_finished(core, LABEL_SERVER_FINISHED)?;
                if !bytes_match(&finished.verify_data, &expected) {
                    return Err(TlsError::handshake_failure("server Finished does not verify"));
                }
                core.session.server_verify_data = expected;
                self.finished_received = true;
                Ok(MessageStatus::Finished)
            }
            _ => Err(TlsError::unexpected_message("unexpected message awaiting server Finished")),
        }
    }

    pub fn wants_output(&self) -> bool {
        self.finished_received
    }

    /// Nothing to send; the handshake completes.
    pub fn generate_output(self, core: &mut ConnectionCore) -> Result<NegotiationState, TlsError> {
        finish_handshake(core)?;
        Ok(NegotiationState::RenegotiatingClientConnection {
            hello_requested: false,
        })
    }
}
