//! Connection state shared by the coordinator and the negotiation states.

use crate::buffer::MultiBuffer;
use crate::config::TlsConfig;
use crate::handshake::codec::encode_change_cipher_spec;
use crate::handshake::params::HandshakeParameters;
use crate::record::{encode_record, ContentType, CryptoParameters, MAX_FRAGMENT_SIZE};
use crate::session::Session;
use crate::TlsVersion;
use ntls_types::TlsError;

/// Everything a negotiation state may read or change.
#[derive(Debug)]
pub struct ConnectionCore {
    pub(crate) is_server: bool,
    pub(crate) config: TlsConfig,
    pub(crate) session: Session,
    /// Present while a handshake is running.
    pub(crate) handshake: Option<HandshakeParameters>,
    pub(crate) negotiated_version: Option<TlsVersion>,
    /// Client: configured SNI name. Server: name the client asked for.
    pub(crate) server_name: Option<String>,
}

impl ConnectionCore {
    pub(crate) fn new(config: TlsConfig, is_server: bool) -> Self {
        let server_name = if is_server {
            None
        } else {
            config.server_name.clone()
        };
        Self {
            is_server,
            config,
            session: Session::new(),
            handshake: None,
            negotiated_version: None,
            server_name,
        }
    }

    /// Version field for outgoing records.
    pub(crate) fn record_version(&self) -> u16 {
        self.negotiated_version
            .unwrap_or(self.config.min_version)
            .to_u16()
    }

    /// A session from an earlier handshake is active.
    pub(crate) fn is_renegotiating(&self) -> bool {
        self.session.current().is_some_and(CryptoParameters::has_cipher)
    }

    pub(crate) fn version(&self) -> Result<TlsVersion, TlsError> {
        self.negotiated_version
            .ok_or_else(|| TlsError::internal_error("protocol version not negotiated"))
    }

    pub(crate) fn handshake(&self) -> Result<&HandshakeParameters, TlsError> {
        self.handshake
            .as_ref()
            .ok_or_else(|| TlsError::internal_error("no handshake in progress"))
    }

    pub(crate) fn handshake_mut(&mut self) -> Result<&mut HandshakeParameters, TlsError> {
        self.handshake
            .as_mut()
            .ok_or_else(|| TlsError::internal_error("no handshake in progress"))
    }

    pub(crate) fn pending(&self) -> Result<&CryptoParameters, TlsError> {
        self.session
            .pending()
            .ok_or_else(|| TlsError::internal_error("no pending crypto parameters"))
    }

    pub(crate) fn pending_mut(&mut self) -> Result<&mut CryptoParameters, TlsError> {
        self.session
            .pending_mut()
            .ok_or_else(|| TlsError::internal_error("no pending crypto parameters"))
    }

    /// Encode `data` as one or more records of `content_type`, protected by
    /// the active write cipher.
    ///
    /// A record is split whenever its ciphertext would exceed the maximum
    /// fragment size; each slice then leaves room for the cipher's largest
    /// expansion.
    pub(crate) fn write_records(
        &mut self,
        out: &mut MultiBuffer,
        content_type: ContentType,
        data: &[u8],
    ) -> Result<(), TlsError> {
        let version = self.record_version();
        let debug = self.config.enable_debugging;
        let mut offset = 0;
        loop {
            let remaining = &data[offset..];
            let fragment = match self.session.write_mut() {
                Some(params) if params.has_cipher() => {
                    let take = if params.encrypted_size(remaining.len()) <= MAX_FRAGMENT_SIZE {
                        remaining.len()
                    } else {
                        MAX_FRAGMENT_SIZE - params.max_extra_encrypted_bytes()
                    };
                    let ciphertext = params.encrypt(content_type, &remaining[..take])?;
                    offset += take;
                    ciphertext
                }
                _ => {
                    let take = remaining.len().min(MAX_FRAGMENT_SIZE);
                    offset += take;
                    remaining[..take].to_vec()
                }
            };
            if debug {
                tracing::trace!(?content_type, len = fragment.len(), "record out");
            }
            out.add(encode_record(content_type, version, &fragment));
            if offset >= data.len() {
                return Ok(());
            }
        }
    }

    /// Send one encoded handshake message and add it to the transcript.
    pub(crate) fn send_handshake(&mut self, out: &mut MultiBuffer, message: Vec<u8>) -> Result<(), TlsError> {
        if self.config.enable_debugging {
            tracing::trace!(msg_type = message[0], len = message.len(), "handshake out");
        }
        self.handshake_mut()?.transcript.update(&message);
        self.write_records(out, ContentType::Handshake, &message)
    }

    /// Send ChangeCipherSpec and switch outgoing records to the pending cipher.
    pub(crate) fn send_change_cipher_spec(&mut self, out: &mut MultiBuffer) -> Result<(), TlsError> {
        self.write_records(out, ContentType::ChangeCipherSpec, &encode_change_cipher_spec())?;
        if !self.session.activate_pending_write() {
            return Err(TlsError::internal_error("no pending cipher to activate"));
        }
        tracing::debug!(is_server = self.is_server, "write cipher activated");
        Ok(())
    }
}
