//! Connection session: the active and the pending crypto parameters.
//!
//! ChangeCipherSpec switches the two directions separately. Sending it
//! activates the pending write side, receiving it activates the pending read
//! side, and once both have happened the pending parameters replace the
//! current ones.

use crate::record::CryptoParameters;
use zeroize::Zeroize;

#[derive(Debug, Default)]
pub struct Session {
    current: Option<CryptoParameters>,
    pending: Option<CryptoParameters>,
    pending_read: bool,
    pending_write: bool,
    /// Both peers agreed on RFC 5746 secure renegotiation.
    pub secure_renegotiation: bool,
    /// verify_data of the last client Finished.
    pub client_verify_data: Vec<u8>,
    /// verify_data of the last server Finished.
    pub server_verify_data: Vec<u8>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&CryptoParameters> {
        self.current.as_ref()
    }

    pub fn pending(&self) -> Option<&CryptoParameters> {
        self.pending.as_ref()
    }

    pub fn pending_mut(&mut self) -> Option<&mut CryptoParameters> {
        self.pending.as_mut()
    }

    pub fn set_pending(&mut self, params: CryptoParameters) {
        self.pending = Some(params);
        self.pending_read = false;
        self.pending_write = false;
    }

    /// Parameters protecting incoming records.
    pub fn read(&self) -> Option<&CryptoParameters> {
        if self.pending_read {
            self.pending.as_ref()
        } else {
            self.current.as_ref()
        }
    }

    pub fn read_mut(&mut self) -> Option<&mut CryptoParameters> {
        if self.pending_read {
            self.pending.as_mut()
        } else {
            self.current.as_mut()
        }
    }

    /// Parameters protecting outgoing records.
    pub fn write(&self) -> Option<&CryptoParameters> {
        if self.pending_write {
            self.pending.as_ref()
        } else {
            self.current.as_ref()
        }
    }

    pub fn write_mut(&mut self) -> Option<&mut CryptoParameters> {
        if self.pending_write {
            self.pending.as_mut()
        } else {
            self.current.as_mut()
        }
    }

    /// Whether incoming records must be decrypted.
    pub fn is_reading_encrypted(&self) -> bool {
        self.read().is_some_and(CryptoParameters::has_cipher)
    }

    pub fn is_writing_encrypted(&self) -> bool {
        self.write().is_some_and(CryptoParameters::has_cipher)
    }

    #[cfg(test)]
    fn is_pending_read(&self) -> bool {
        self.pending_read
    }

    #[cfg(test)]
    fn is_pending_write(&self) -> bool {
        self.pending_write
    }

    /// Start using the pending cipher for outgoing records, from sequence 0.
    pub fn activate_pending_write(&mut self) -> bool {
        match self.pending.as_mut() {
            Some(p) if p.has_cipher() => {
                p.reset_write_sequence();
                self.pending_write = true;
                true
            }
            _ => false,
        }
    }

    /// Start using the pending cipher for incoming records, from sequence 0.
    pub fn activate_pending_read(&mut self) -> bool {
        match self.pending.as_mut() {
            Some(p) if p.has_cipher() => {
                p.reset_read_sequence();
                self.pending_read = true;
                true
            }
            _ => false,
        }
    }

    /// Move the pending parameters into the current slot.
    pub fn switch_to_new_cipher(&mut self) {
        if let Some(pending) = self.pending.take() {
            if let Some(mut old) = self.current.replace(pending) {
                old.clear();
            }
        }
        self.pending_read = false;
        self.pending_write = false;
    }

    /// Drop all crypto state and verify data.
    pub fn clear(&mut self) {
        if let Some(p) = self.current.as_mut() {
            p.clear();
        }
        if let Some(p) = self.pending.as_mut() {
            p.clear();
        }
        self.current = None;
        self.pending = None;
        self.pending_read = false;
        self.pending_write = false;
        self.secure_renegotiation = false;
        self.client_verify_data.zeroize();
        self.server_verify_data.zeroize();
    }
}
