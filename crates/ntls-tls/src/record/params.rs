//! Per-connection crypto parameters: negotiated suite, master secret, the
//! read and write record ciphers, and their sequence numbers.

use super::cbc::CbcCipher;
use super::gcm::GcmCipher;
use super::{ContentType, MAX_CIPHERTEXT_SIZE, MAX_FRAGMENT_SIZE};
use crate::buffer::SecureBuffer;
use crate::crypt::key_schedule::KeyBlock;
use crate::crypt::{CipherSuiteParams, GCM_EXPLICIT_NONCE_LEN};
use crate::{CipherSuite, TlsVersion};
use ntls_types::{AlertDescription, TlsError};

/// Record protection for one direction.
pub enum RecordCipher {
    Cbc(CbcCipher),
    Gcm(GcmCipher),
}

impl RecordCipher {
    fn seal(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        match self {
            RecordCipher::Cbc(c) => c.seal(seq, content_type, version, data),
            RecordCipher::Gcm(c) => c.seal(seq, content_type, version, data),
        }
    }

    fn open(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        match self {
            RecordCipher::Cbc(c) => c.open(seq, content_type, version, data),
            RecordCipher::Gcm(c) => c.open(seq, content_type, version, data),
        }
    }

    fn rewind(&mut self) {
        if let RecordCipher::Cbc(c) = self {
            c.rewind();
        }
    }

    fn min_extra_encrypted_bytes(&self) -> usize {
        match self {
            RecordCipher::Cbc(c) => c.min_extra_encrypted_bytes(),
            RecordCipher::Gcm(c) => c.extra_encrypted_bytes(),
        }
    }

    fn max_extra_encrypted_bytes(&self) -> usize {
        match self {
            RecordCipher::Cbc(c) => c.max_extra_encrypted_bytes(),
            RecordCipher::Gcm(c) => c.extra_encrypted_bytes(),
        }
    }

    fn encrypted_size(&self, len: usize) -> usize {
        match self {
            RecordCipher::Cbc(c) => c.encrypted_size(len),
            RecordCipher::Gcm(c) => c.encrypted_size(len),
        }
    }
}

/// Crypto state of one handshake's outcome.
///
/// Created when the cipher suite is chosen, filled in by the key exchange
/// (master secret, then the key block), and moved from the session's pending
/// slot to its current slot at ChangeCipherSpec.
pub struct CryptoParameters {
    is_server: bool,
    version: TlsVersion,
    suite: CipherSuiteParams,
    master_secret: Option<SecureBuffer>,
    write_cipher: Option<RecordCipher>,
    read_cipher: Option<RecordCipher>,
    write_seq: u64,
    read_seq: u64,
    /// DER certificates the server presented, leaf first.
    pub server_certificates: Vec<Vec<u8>>,
    /// DER certificates the client presented, leaf first.
    pub client_certificates: Vec<Vec<u8>>,
}

impl std::fmt::Debug for CryptoParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoParameters")
            .field("is_server", &self.is_server)
            .field("version", &self.version)
            .field("suite", &self.suite.name)
            .field("has_cipher", &self.has_cipher())
            .field("write_seq", &self.write_seq)
            .field("read_seq", &self.read_seq)
            .finish_non_exhaustive()
    }
}

impl CryptoParameters {
    pub fn new(is_server: bool, version: TlsVersion, suite: CipherSuite) -> Result<Self, TlsError> {
        let suite = CipherSuiteParams::from_suite(suite)?;
        if !suite.supports(version) {
            return Err(TlsError::insufficient_security(format!(
                "{} is not usable with {:?}",
                suite.name, version
            )));
        }
        Ok(Self {
            is_server,
            version,
            suite,
            master_secret: None,
            write_cipher: None,
            read_cipher: None,
            write_seq: 0,
            read_seq: 0,
            server_certificates: Vec::new(),
            client_certificates: Vec::new(),
        })
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn version(&self) -> TlsVersion {
        self.version
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.suite.suite
    }

    pub fn suite_params(&self) -> &CipherSuiteParams {
        &self.suite
    }

    pub fn master_secret(&self) -> Option<&[u8]> {
        self.master_secret.as_deref()
    }

    pub fn set_master_secret(&mut self, master_secret: SecureBuffer) {
        self.master_secret = Some(master_secret);
    }

    /// Whether the record ciphers have been initialized from a key block.
    pub fn has_cipher(&self) -> bool {
        self.write_cipher.is_some() && self.read_cipher.is_some()
    }

    /// Build both record ciphers from the key block. The write side uses the
    /// client half on a client and the server half on a server.
    pub fn initialize_cipher(&mut self, keys: &KeyBlock) -> Result<(), TlsError> {
        let client = self.build_cipher(
            &keys.client_write_key,
            &keys.client_write_mac_key,
            &keys.client_write_iv,
        )?;
        let server = self.build_cipher(
            &keys.server_write_key,
            &keys.server_write_mac_key,
            &keys.server_write_iv,
        )?;
        let (write, read) = if self.is_server {
            (server, client)
        } else {
            (client, server)
        };
        self.write_cipher = Some(write);
        self.read_cipher = Some(read);
        self.write_seq = 0;
        self.read_seq = 0;
        Ok(())
    }

    fn build_cipher(&self, key: &[u8], mac_key: &[u8], iv: &[u8]) -> Result<RecordCipher, TlsError> {
        match self.suite.mac {
            None => Ok(RecordCipher::Gcm(GcmCipher::new(key, iv)?)),
            Some(mac) => {
                let fixed_iv = if iv.is_empty() { None } else { Some(iv) };
                Ok(RecordCipher::Cbc(CbcCipher::new(key, mac_key, mac, fixed_iv)?))
            }
        }
    }

    fn write_cipher(&mut self) -> Result<&mut RecordCipher, TlsError> {
        self.write_cipher
            .as_mut()
            .ok_or_else(|| TlsError::internal_error("write cipher not initialized"))
    }

    fn read_cipher(&mut self) -> Result<&mut RecordCipher, TlsError> {
        self.read_cipher
            .as_mut()
            .ok_or_else(|| TlsError::internal_error("read cipher not initialized"))
    }

    /// Protect one record payload and advance the write sequence number.
    pub fn encrypt(&mut self, content_type: ContentType, plaintext: &[u8]) -> Result<Vec<u8>, TlsError> {
        if plaintext.len() > MAX_FRAGMENT_SIZE {
            return Err(TlsError::fatal(
                AlertDescription::RecordOverflow,
                "plaintext exceeds maximum fragment size",
            ));
        }
        if self.write_seq == u64::MAX {
            return Err(TlsError::internal_error("write sequence number overflow"));
        }
        let seq = self.write_seq;
        let version = self.version.to_u16();
        let out = self.write_cipher()?.seal(seq, content_type, version, plaintext)?;
        self.write_seq += 1;
        Ok(out)
    }

    /// Remove protection from one record payload and advance the read
    /// sequence number.
    pub fn decrypt(&mut self, content_type: ContentType, ciphertext: &[u8]) -> Result<Vec<u8>, TlsError> {
        if ciphertext.len() > MAX_CIPHERTEXT_SIZE {
            return Err(TlsError::fatal(
                AlertDescription::RecordOverflow,
                "ciphertext exceeds maximum record size",
            ));
        }
        if self.read_seq == u64::MAX {
            return Err(TlsError::internal_error("read sequence number overflow"));
        }
        let seq = self.read_seq;
        let version = self.version.to_u16();
        let plaintext = self.read_cipher()?.open(seq, content_type, version, ciphertext)?;
        if plaintext.len() > MAX_FRAGMENT_SIZE {
            return Err(TlsError::fatal(
                AlertDescription::RecordOverflow,
                "decrypted fragment too large",
            ));
        }
        self.read_seq += 1;
        Ok(plaintext)
    }

    pub fn min_extra_encrypted_bytes(&self) -> usize {
        self.write_cipher
            .as_ref()
            .map_or(0, RecordCipher::min_extra_encrypted_bytes)
    }

    pub fn max_extra_encrypted_bytes(&self) -> usize {
        self.write_cipher
            .as_ref()
            .map_or(0, RecordCipher::max_extra_encrypted_bytes)
    }

    pub fn encrypted_size(&self, plaintext_len: usize) -> usize {
        self.write_cipher
            .as_ref()
            .map_or(plaintext_len, |c| c.encrypted_size(plaintext_len))
    }

    pub fn write_sequence(&self) -> u64 {
        self.write_seq
    }

    pub fn read_sequence(&self) -> u64 {
        self.read_seq
    }

    pub fn reset_write_sequence(&mut self) {
        self.write_seq = 0;
    }

    pub fn reset_read_sequence(&mut self) {
        self.read_seq = 0;
    }

    /// Undo the last read, so a record can be decrypted again after the
    /// caller supplies missing credentials. Restores the TLS 1.0 chained IV
    /// along with the sequence number.
    pub fn rewind_read_sequence(&mut self) {
        self.read_seq = self.read_seq.saturating_sub(1);
        if let Some(cipher) = self.read_cipher.as_mut() {
            cipher.rewind();
        }
    }

    /// Fix the explicit nonce of the next GCM record written. No effect on
    /// CBC suites.
    pub fn set_explicit_nonce(&mut self, nonce: [u8; GCM_EXPLICIT_NONCE_LEN]) {
        if let Some(RecordCipher::Gcm(c)) = self.write_cipher.as_mut() {
            c.set_explicit_nonce(nonce);
        }
    }

    /// Pad every CBC record written with `blocks` extra blocks. No effect on
    /// GCM suites.
    pub fn set_extra_padding_blocks(&mut self, blocks: u8) {
        if let Some(RecordCipher::Cbc(c)) = self.write_cipher.as_mut() {
            c.set_extra_padding_blocks(blocks);
        }
    }

    /// Drop every secret held by these parameters.
    pub fn clear(&mut self) {
        self.master_secret = None;
        self.write_cipher = None;
        self.read_cipher = None;
    }
}
