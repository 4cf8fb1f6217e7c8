//! Record-layer coordinator: the public connection API.
//!
//! A `TlsContext` is a pure state machine from one incoming record to zero or
//! more outgoing records. The caller owns the transport, splits the byte
//! stream into records (see [`crate::record::split_records`]) and feeds them
//! one at a time.

pub mod connection;

use zeroize::Zeroize;

use self::connection::ConnectionCore;
use crate::alert::parse_alert;
use crate::buffer::{MultiBuffer, TlsReader};
use crate::config::{PrivateKey, TlsConfig};
use crate::crypt::GCM_EXPLICIT_NONCE_LEN;
use crate::handshake::codec::encode_hello_request;
use crate::handshake::{
    parse_handshake_header, HandshakeMessage, HandshakeType, MessageKind, HANDSHAKE_HEADER_LEN,
};
use crate::negotiation::{MessageStatus, NegotiationState};
use crate::record::{ContentType, RecordHeader, MAX_CIPHERTEXT_SIZE, MAX_FRAGMENT_SIZE};
use crate::{CipherSuite, TlsVersion};
use ntls_types::{Alert, AlertDescription, TlsError};

/// Result of one engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsStatus {
    /// Handshake in progress; send the output and feed the next record.
    Continue,
    /// A HelloRequest was discarded.
    Ignore,
    /// Install credentials with [`TlsContext::set_credentials`], then replay
    /// the same record.
    NeedCredentials,
    /// Handshake content arrived on an established connection; feed it to
    /// [`TlsContext::generate_next_token`].
    Renegotiate,
    /// This side sent and verified Finished.
    Finished,
    /// Application data was decrypted.
    Ok,
    /// The peer sent close_notify.
    PeerClosed,
}

impl From<MessageStatus> for TlsStatus {
    fn from(status: MessageStatus) -> Self {
        match status {
            MessageStatus::Ignore => TlsStatus::Ignore,
            MessageStatus::Continue => TlsStatus::Continue,
            MessageStatus::NeedCredentials => TlsStatus::NeedCredentials,
            MessageStatus::Renegotiate => TlsStatus::Renegotiate,
            MessageStatus::Finished => TlsStatus::Finished,
        }
    }
}

/// One TLS connection.
///
/// Calls must be serialized by the caller. Any error is fatal: the context
/// wipes its secrets, the fatal alert to send is kept for
/// [`take_alert_record`](Self::take_alert_record), and every later call
/// returns [`TlsError::Closed`].
pub struct TlsContext {
    core: ConnectionCore,
    state: Option<NegotiationState>,
    /// Bytes of a handshake message that spans records.
    fragment: Vec<u8>,
    /// Messages at the front of the replayed record already handled before
    /// `NeedCredentials`.
    replay_skip: usize,
    valid: bool,
    alert_record: Option<Vec<u8>>,
    peer_closed: bool,
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext")
            .field("is_server", &self.core.is_server)
            .field("state", &self.state.as_ref().map(NegotiationState::name))
            .field("negotiated_version", &self.core.negotiated_version)
            .field("valid", &self.valid)
            .field("peer_closed", &self.peer_closed)
            .finish_non_exhaustive()
    }
}

impl TlsContext {
    pub fn new(config: TlsConfig, is_server: bool) -> Result<Self, TlsError> {
        if config.min_version > config.max_version {
            return Err(TlsError::internal_error(format!(
                "min_version {:?} above max_version {:?}",
                config.min_version, config.max_version
            )));
        }
        tracing::debug!(
            is_server,
            min_version = ?config.min_version,
            max_version = ?config.max_version,
            "TLS context created"
        );
        Ok(Self {
            state: Some(NegotiationState::initial(is_server)),
            core: ConnectionCore::new(config, is_server),
            fragment: Vec::new(),
            replay_skip: 0,
            valid: true,
            alert_record: None,
            peer_closed: false,
        })
    }

    pub fn new_client(config: TlsConfig) -> Result<Self, TlsError> {
        Self::new(config, false)
    }

    pub fn new_server(config: TlsConfig) -> Result<Self, TlsError> {
        Self::new(config, true)
    }

    /// Drive the handshake.
    ///
    /// Without input, returns whatever flight the current state has ready
    /// (the ClientHello for a fresh client). With input, `record` must hold
    /// exactly one record.
    pub fn generate_next_token(&mut self, record: Option<&[u8]>) -> Result<(TlsStatus, Vec<u8>), TlsError> {
        self.ensure_valid()?;
        let mut out = MultiBuffer::new();
        let result = match record {
            None => self.flush_state(&mut out).map(|_| TlsStatus::Continue),
            Some(record) => self.process_record(record, &mut out),
        };
        match result {
            Ok(status) => Ok((status, out.into_bytes())),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Decrypt one record on an established connection.
    ///
    /// Handshake and ChangeCipherSpec records are not consumed: the status is
    /// `Renegotiate` and the record is handed back for `generate_next_token`.
    pub fn decrypt_message(&mut self, record: &[u8]) -> Result<(TlsStatus, Vec<u8>), TlsError> {
        self.ensure_valid()?;
        match self.decrypt_record(record) {
            Ok(result) => Ok(result),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Protect application data, split into as many records as needed.
    pub fn encrypt_message(&mut self, data: &[u8]) -> Result<Vec<u8>, TlsError> {
        self.ensure_valid()?;
        if !self.core.session.is_writing_encrypted() {
            let err = TlsError::internal_error("no write cipher active");
            return Err(self.fail(err));
        }
        let mut out = MultiBuffer::new();
        match self.core.write_records(&mut out, ContentType::ApplicationData, data) {
            Ok(()) => Ok(out.into_bytes()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Encode an alert record. Sending a fatal alert ends the connection.
    pub fn create_alert(&mut self, alert: Alert) -> Result<Vec<u8>, TlsError> {
        self.ensure_valid()?;
        let mut out = MultiBuffer::new();
        if let Err(e) = self.core.write_records(&mut out, ContentType::Alert, &alert.to_bytes()) {
            return Err(self.fail(e));
        }
        if alert.is_fatal() {
            tracing::warn!(alert = %alert, "sending fatal alert");
            self.invalidate();
        }
        Ok(out.into_bytes())
    }

    /// Send close_notify and invalidate the context.
    pub fn close(&mut self) -> Result<Vec<u8>, TlsError> {
        self.ensure_valid()?;
        let mut out = MultiBuffer::new();
        let result = self
            .core
            .write_records(&mut out, ContentType::Alert, &Alert::close_notify().to_bytes());
        tracing::debug!(is_server = self.core.is_server, "closing connection");
        self.invalidate();
        result.map(|()| out.into_bytes())
    }

    /// Server: ask the client to renegotiate.
    pub fn create_hello_request(&mut self) -> Result<Vec<u8>, TlsError> {
        self.ensure_valid()?;
        let idle = matches!(
            self.state,
            Some(NegotiationState::RenegotiatingServerConnection { ready: false })
        );
        if !self.core.is_server || !idle || !self.has_valid_session() {
            let err = TlsError::internal_error("HelloRequest needs an established server connection");
            return Err(self.fail(err));
        }
        let mut out = MultiBuffer::new();
        match self
            .core
            .write_records(&mut out, ContentType::Handshake, &encode_hello_request())
        {
            Ok(()) => {
                tracing::debug!("HelloRequest sent");
                Ok(out.into_bytes())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Install local credentials, typically after `NeedCredentials`.
    pub fn set_credentials(&mut self, certificate_chain: Vec<Vec<u8>>, private_key: PrivateKey) {
        self.core.config.certificate_chain = certificate_chain;
        self.core.config.private_key = Some(private_key);
    }

    /// The fatal alert record produced by the last failure, if any.
    pub fn take_alert_record(&mut self) -> Option<Vec<u8>> {
        self.alert_record.take()
    }

    pub fn is_server(&self) -> bool {
        self.core.is_server
    }

    pub fn negotiated_version(&self) -> Option<TlsVersion> {
        self.core.negotiated_version
    }

    /// Suite of the active session.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.core.session.current().map(|c| c.cipher_suite())
    }

    /// A completed handshake protects the connection.
    pub fn has_valid_session(&self) -> bool {
        self.valid && self.core.is_renegotiating()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_handshaking(&self) -> bool {
        self.core.handshake.is_some()
    }

    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    pub fn secure_renegotiation(&self) -> bool {
        self.core.session.secure_renegotiation
    }

    /// Client: the configured SNI name. Server: the name the client sent.
    pub fn server_name(&self) -> Option<&str> {
        self.core.server_name.as_deref()
    }

    /// The peer's certificate chain from the active session, leaf first.
    pub fn peer_certificates(&self) -> &[Vec<u8>] {
        match self.core.session.current() {
            Some(current) if self.core.is_server => &current.client_certificates,
            Some(current) => &current.server_certificates,
            None => &[],
        }
    }

    pub fn config(&self) -> &TlsConfig {
        &self.core.config
    }

    /// Fix the explicit nonce of the next GCM record this side writes.
    #[doc(hidden)]
    pub fn set_explicit_nonce(&mut self, nonce: [u8; GCM_EXPLICIT_NONCE_LEN]) {
        if let Some(write) = self.core.session.write_mut() {
            write.set_explicit_nonce(nonce);
        }
    }

    fn ensure_valid(&self) -> Result<(), TlsError> {
        if self.valid {
            Ok(())
        } else {
            Err(TlsError::Closed)
        }
    }

    /// Record the alert for `err`, wipe every secret and invalidate.
    fn fail(&mut self, err: TlsError) -> TlsError {
        if let Some(alert) = err.outgoing_alert() {
            let mut out = MultiBuffer::new();
            match self.core.write_records(&mut out, ContentType::Alert, &alert.to_bytes()) {
                Ok(()) => self.alert_record = Some(out.into_bytes()),
                Err(e) => tracing::warn!(error = %e, "failed to encode alert"),
            }
            tracing::warn!(is_server = self.core.is_server, alert = %alert, error = %err, "fatal error");
        } else {
            tracing::debug!(is_server = self.core.is_server, error = %err, "connection terminated");
        }
        self.invalidate();
        err
    }

    fn invalidate(&mut self) {
        self.core.session.clear();
        self.core.handshake = None;
        self.state = None;
        self.fragment.zeroize();
        self.fragment.clear();
        self.replay_skip = 0;
        self.valid = false;
    }

    fn flush_state(&mut self, out: &mut MultiBuffer) -> Result<(), TlsError> {
        let state = self
            .state
            .take()
            .ok_or_else(|| TlsError::internal_error("no negotiation state"))?;
        let next = if state.wants_output() {
            state.generate_output(&mut self.core, out)?
        } else {
            state
        };
        self.state = Some(next);
        Ok(())
    }

    /// Split one record into its content type and body after the framing
    /// checks.
    fn read_record<'a>(&self, record: &'a [u8]) -> Result<(ContentType, &'a [u8]), TlsError> {
        let mut r = TlsReader::new(record);
        let header = RecordHeader::parse(&mut r)?;
        let body = r.read_rest();
        if usize::from(header.length) != body.len() {
            return Err(TlsError::decode_error(format!(
                "record length {} but {} bytes present",
                header.length,
                body.len()
            )));
        }
        if body.len() > MAX_CIPHERTEXT_SIZE {
            return Err(TlsError::fatal(AlertDescription::RecordOverflow, "record too large"));
        }
        self.check_record_version(header.version)?;
        let content_type = ContentType::from_u8(header.content_type).ok_or_else(|| {
            TlsError::unexpected_message(format!("unknown content type {}", header.content_type))
        })?;
        if self.core.config.enable_debugging {
            tracing::trace!(?content_type, len = body.len(), "record in");
        }
        Ok((content_type, body))
    }

    fn check_record_version(&self, version: u16) -> Result<(), TlsError> {
        let acceptable = match self.core.negotiated_version {
            Some(v) => version == v.to_u16(),
            None => version >> 8 == 3 && version & 0xFF >= 1,
        };
        if acceptable {
            Ok(())
        } else {
            Err(TlsError::protocol_version(format!("record version 0x{version:04x}")))
        }
    }

    /// Decrypt under the active read cipher, or pass plaintext through.
    fn open(&mut self, content_type: ContentType, body: &[u8]) -> Result<Vec<u8>, TlsError> {
        match self.core.session.read_mut() {
            Some(read) if read.has_cipher() => read.decrypt(content_type, body),
            _ if body.len() > MAX_FRAGMENT_SIZE => Err(TlsError::fatal(
                AlertDescription::RecordOverflow,
                "plaintext record too large",
            )),
            _ => Ok(body.to_vec()),
        }
    }

    fn process_record(&mut self, record: &[u8], out: &mut MultiBuffer) -> Result<TlsStatus, TlsError> {
        let (content_type, body) = self.read_record(record)?;
        if !self.fragment.is_empty() && content_type != ContentType::Handshake {
            return Err(TlsError::decode_error(
                "record interleaved with a fragmented handshake message",
            ));
        }
        match content_type {
            ContentType::Alert => {
                let plaintext = self.open(content_type, body)?;
                self.handle_alert(&plaintext)
            }
            ContentType::ChangeCipherSpec => {
                let plaintext = self.open(content_type, body)?;
                if plaintext != [1] {
                    return Err(TlsError::decode_error("malformed ChangeCipherSpec"));
                }
                let status = self.dispatch(HandshakeMessage::ChangeCipherSpec, None, out)?;
                Ok(status.into())
            }
            ContentType::ApplicationData => Err(TlsError::decode_error(
                "application data outside an established session",
            )),
            ContentType::Handshake => self.process_handshake(body, out),
        }
    }

    fn handle_alert(&mut self, body: &[u8]) -> Result<TlsStatus, TlsError> {
        let alert = parse_alert(body)?;
        if alert.description == AlertDescription::CloseNotify {
            tracing::debug!(is_server = self.core.is_server, "peer sent close_notify");
            self.peer_closed = true;
            return Ok(TlsStatus::PeerClosed);
        }
        if alert.is_fatal() {
            return Err(TlsError::AlertReceived(alert));
        }
        tracing::warn!(alert = %alert, "ignoring warning alert");
        Ok(TlsStatus::Continue)
    }

    /// Reassemble handshake messages and run each complete one through the
    /// state machine.
    fn process_handshake(&mut self, body: &[u8], out: &mut MultiBuffer) -> Result<TlsStatus, TlsError> {
        let saved_fragment = self.fragment.clone();
        let was_encrypted = self.core.session.is_reading_encrypted();
        let plaintext = self.open(ContentType::Handshake, body)?;
        self.fragment.extend_from_slice(&plaintext);

        let mut status: Option<MessageStatus> = None;
        let mut handled = 0;
        let mut pos = 0;
        while let Some((msg_type, len)) = parse_handshake_header(&self.fragment[pos..])? {
            let end = pos + HANDSHAKE_HEADER_LEN + len;
            if end > self.fragment.len() {
                break;
            }
            let raw = self.fragment[pos..end].to_vec();
            pos = end;
            if handled < self.replay_skip {
                handled += 1;
                continue;
            }

            let message =
                HandshakeMessage::decode(msg_type, &raw[HANDSHAKE_HEADER_LEN..], self.core.negotiated_version)?;
            let result = self.dispatch(message, Some(&raw), out)?;
            if result == MessageStatus::NeedCredentials {
                if was_encrypted {
                    if let Some(read) = self.core.session.read_mut() {
                        read.rewind_read_sequence();
                    }
                }
                self.fragment.zeroize();
                self.fragment = saved_fragment;
                self.replay_skip = handled;
                return Ok(TlsStatus::NeedCredentials);
            }
            handled += 1;
            status = status.max(Some(result));
        }

        self.fragment.drain(..pos);
        self.replay_skip = 0;
        Ok(status.map_or(TlsStatus::Continue, TlsStatus::from))
    }

    /// Hand one message to the active state, keep the transcript, and run
    /// the state's output step once its flight is complete.
    fn dispatch(
        &mut self,
        message: HandshakeMessage,
        raw: Option<&[u8]>,
        out: &mut MultiBuffer,
    ) -> Result<MessageStatus, TlsError> {
        let kind = message.kind();
        let mut state = self
            .state
            .take()
            .ok_or_else(|| TlsError::internal_error("no negotiation state"))?;
        if !state.verify_message(kind) {
            return Err(TlsError::unexpected_message(format!(
                "{kind:?} not expected in {}",
                state.name()
            )));
        }
        if self.core.config.enable_debugging {
            tracing::trace!(?kind, state = state.name(), "handshake in");
        }

        let status = state.handle_message(&mut self.core, message)?;
        if status == MessageStatus::NeedCredentials {
            self.state = Some(state);
            return Ok(status);
        }
        if let (Some(raw), Some(hs)) = (raw, self.core.handshake.as_mut()) {
            if kind != MessageKind::Handshake(HandshakeType::HelloRequest) {
                hs.transcript.update(raw);
            }
        }

        let next = if state.wants_output() {
            state.generate_output(&mut self.core, out)?
        } else {
            state
        };
        self.state = Some(next);
        Ok(status)
    }

    fn decrypt_record(&mut self, record: &[u8]) -> Result<(TlsStatus, Vec<u8>), TlsError> {
        let (content_type, body) = self.read_record(record)?;
        match content_type {
            ContentType::ApplicationData => {
                if !self.fragment.is_empty() {
                    return Err(TlsError::decode_error(
                        "record interleaved with a fragmented handshake message",
                    ));
                }
                let read = match self.core.session.read_mut() {
                    Some(read) if read.has_cipher() => read,
                    _ => {
                        return Err(TlsError::decode_error(
                            "application data outside an established session",
                        ))
                    }
                };
                let plaintext = read.decrypt(content_type, body)?;
                Ok((TlsStatus::Ok, plaintext))
            }
            ContentType::Alert => {
                let plaintext = self.open(content_type, body)?;
                let status = self.handle_alert(&plaintext)?;
                Ok((status, Vec::new()))
            }
            ContentType::Handshake | ContentType::ChangeCipherSpec => {
                Ok((TlsStatus::Renegotiate, record.to_vec()))
            }
        }
    }
}
