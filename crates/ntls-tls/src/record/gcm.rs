//! AES-GCM record protection (RFC 5288).
//!
//! The nonce is `fixed_iv(4) || explicit_nonce(8)`; the explicit part is sent
//! in front of the ciphertext. AAD is 13 bytes:
//! `seq_num(8) || type(1) || version(2) || plaintext_length(2)`.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};

use super::ContentType;
use crate::crypt::{GCM_EXPLICIT_NONCE_LEN, GCM_FIXED_IV_LEN, GCM_TAG_LEN};
use ntls_types::{CryptoError, TlsError};
use zeroize::Zeroize;

enum GcmKey {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

fn build_nonce(
    fixed_iv: &[u8; GCM_FIXED_IV_LEN],
    explicit_nonce: &[u8; GCM_EXPLICIT_NONCE_LEN],
) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..GCM_FIXED_IV_LEN].copy_from_slice(fixed_iv);
    nonce[GCM_FIXED_IV_LEN..].copy_from_slice(explicit_nonce);
    nonce
}

fn build_aad(seq: u64, content_type: ContentType, version: u16, plaintext_len: usize) -> [u8; 13] {
    let mut aad = [0u8; 13];
    aad[..8].copy_from_slice(&seq.to_be_bytes());
    aad[8] = content_type as u8;
    aad[9..11].copy_from_slice(&version.to_be_bytes());
    aad[11..13].copy_from_slice(&(plaintext_len as u16).to_be_bytes());
    aad
}

/// One direction of a GCM cipher suite.
pub struct GcmCipher {
    key: GcmKey,
    fixed_iv: [u8; GCM_FIXED_IV_LEN],
    next_explicit_nonce: Option<[u8; GCM_EXPLICIT_NONCE_LEN]>,
}

impl Drop for GcmCipher {
    fn drop(&mut self) {
        self.fixed_iv.zeroize();
    }
}

impl GcmCipher {
    pub fn new(key: &[u8], fixed_iv: &[u8]) -> Result<Self, TlsError> {
        let key = match key.len() {
            16 => GcmKey::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?,
            )),
            32 => GcmKey::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?,
            )),
            got => return Err(CryptoError::InvalidKeyLength { expected: 16, got }.into()),
        };
        let fixed_iv =
            <[u8; GCM_FIXED_IV_LEN]>::try_from(fixed_iv).map_err(|_| CryptoError::InvalidIvLength)?;
        Ok(Self {
            key,
            fixed_iv,
            next_explicit_nonce: None,
        })
    }

    /// Use `nonce` as the explicit nonce of the next sealed record instead of
    /// a random one. Consumed by that record.
    pub fn set_explicit_nonce(&mut self, nonce: [u8; GCM_EXPLICIT_NONCE_LEN]) {
        self.next_explicit_nonce = Some(nonce);
    }

    pub fn extra_encrypted_bytes(&self) -> usize {
        GCM_EXPLICIT_NONCE_LEN + GCM_TAG_LEN
    }

    pub fn encrypted_size(&self, plaintext_len: usize) -> usize {
        plaintext_len + self.extra_encrypted_bytes()
    }

    pub fn seal(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: u16,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        let explicit = match self.next_explicit_nonce.take() {
            Some(n) => n,
            None => {
                let mut n = [0u8; GCM_EXPLICIT_NONCE_LEN];
                getrandom::getrandom(&mut n).map_err(|_| CryptoError::RandomFail)?;
                n
            }
        };
        let nonce = build_nonce(&self.fixed_iv, &explicit);
        let aad = build_aad(seq, content_type, version, plaintext.len());
        let payload = Payload {
            msg: plaintext,
            aad: &aad,
        };
        let sealed = match &self.key {
            GcmKey::Aes128(k) => k.encrypt(Nonce::from_slice(&nonce), payload),
            GcmKey::Aes256(k) => k.encrypt(Nonce::from_slice(&nonce), payload),
        }
        .map_err(|_| TlsError::internal_error("GCM encryption failed"))?;

        let mut out = Vec::with_capacity(GCM_EXPLICIT_NONCE_LEN + sealed.len());
        out.extend_from_slice(&explicit);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    pub fn open(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: u16,
        fragment: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        if fragment.len() < self.extra_encrypted_bytes() {
            return Err(TlsError::bad_record_mac());
        }
        let (explicit, ciphertext) = fragment.split_at(GCM_EXPLICIT_NONCE_LEN);
        let mut explicit_nonce = [0u8; GCM_EXPLICIT_NONCE_LEN];
        explicit_nonce.copy_from_slice(explicit);

        let nonce = build_nonce(&self.fixed_iv, &explicit_nonce);
        let aad = build_aad(seq, content_type, version, ciphertext.len() - GCM_TAG_LEN);
        let payload = Payload {
            msg: ciphertext,
            aad: &aad,
        };
        match &self.key {
            GcmKey::Aes128(k) => k.decrypt(Nonce::from_slice(&nonce), payload),
            GcmKey::Aes256(k) => k.decrypt(Nonce::from_slice(&nonce), payload),
        }
        .map_err(|_| TlsError::bad_record_mac())
    }
}
