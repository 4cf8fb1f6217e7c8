use std::fmt;
use std::ops::{Deref, DerefMut};

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Fixed-size byte container for key material and intermediate secrets.
///
/// The contents are zeroed when the buffer is dropped, and `Debug` never
/// prints them.
#[derive(Clone, Default)]
pub struct SecureBuffer {
    data: Vec<u8>,
}

impl SecureBuffer {
    /// A zero-filled buffer of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0u8; len],
        }
    }

    /// A buffer filled from the operating system RNG.
    pub fn random(len: usize) -> Result<Self, ntls_types::CryptoError> {
        let mut buf = Self::new(len);
        getrandom::getrandom(&mut buf.data).map_err(|_| ntls_types::CryptoError::RandomFail)?;
        Ok(buf)
    }

    /// Take ownership of `data` without copying it.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Constant-time comparison against `other`.
    pub fn ct_eq(&self, other: &[u8]) -> bool {
        self.data.len() == other.len() && bool::from(self.data.as_slice().ct_eq(other))
    }

    /// Zero the contents now and release the storage.
    pub fn clear(&mut self) {
        self.data.zeroize();
        self.data = Vec::new();
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl Deref for SecureBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for SecureBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl AsRef<[u8]> for SecureBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBuffer({} bytes)", self.data.len())
    }
}
