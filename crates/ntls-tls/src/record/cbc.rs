//! AES-CBC MAC-then-encrypt record protection (RFC 2246 / 4346 / 5246).
//!
//! ```text
//! TLS 1.1+: fragment = explicit_IV(16) || E(plaintext || MAC || padding)
//! TLS 1.0:  fragment = E(plaintext || MAC || padding), IV chained from the
//!           last ciphertext block of the previous record
//! MAC = HMAC(mac_key, seq(8) || type(1) || version(2) || length(2) || plaintext)
//! ```
//!
//! Padding and MAC failures both surface as `bad_record_mac`.

use aes::{Aes128, Aes256};
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use subtle::{ConditionallySelectable, ConstantTimeEq, ConstantTimeLess};

use super::ContentType;
use crate::buffer::SecureBuffer;
use crate::crypt::{MacAlgorithm, BLOCK_SIZE};
use ntls_types::{CryptoError, TlsError};

/// At most 15 extra blocks keep the padding length within one byte.
pub const MAX_EXTRA_PADDING_BLOCKS: u8 = 15;

macro_rules! cbc_blocks {
    ($mode:ty, $method:ident, $key:expr, $iv:expr, $data:expr) => {{
        let mut mode = <$mode>::new_from_slices($key, $iv).map_err(|_| CryptoError::InvalidKey)?;
        for block in $data.chunks_exact_mut(BLOCK_SIZE) {
            mode.$method(GenericArray::from_mut_slice(block));
        }
    }};
}

fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<(), CryptoError> {
    match key.len() {
        16 => cbc_blocks!(cbc::Encryptor<Aes128>, encrypt_block_mut, key, iv, data),
        32 => cbc_blocks!(cbc::Encryptor<Aes256>, encrypt_block_mut, key, iv, data),
        got => return Err(CryptoError::InvalidKeyLength { expected: 16, got }),
    }
    Ok(())
}

fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<(), CryptoError> {
    match key.len() {
        16 => cbc_blocks!(cbc::Decryptor<Aes128>, decrypt_block_mut, key, iv, data),
        32 => cbc_blocks!(cbc::Decryptor<Aes256>, decrypt_block_mut, key, iv, data),
        got => return Err(CryptoError::InvalidKeyLength { expected: 16, got }),
    }
    Ok(())
}

fn compute_mac(
    mac: MacAlgorithm,
    mac_key: &[u8],
    seq: u64,
    content_type: ContentType,
    version: u16,
    fragment: &[u8],
) -> Vec<u8> {
    mac.compute(
        mac_key,
        &[
            &seq.to_be_bytes(),
            &[content_type as u8],
            &version.to_be_bytes(),
            &(fragment.len() as u16).to_be_bytes(),
            fragment,
        ],
    )
}

/// One direction of a CBC cipher suite.
pub struct CbcCipher {
    key: SecureBuffer,
    mac_key: SecureBuffer,
    mac: MacAlgorithm,
    chained_iv: Option<[u8; BLOCK_SIZE]>,
    /// Chained IV in force before the last record opened.
    previous_iv: Option<[u8; BLOCK_SIZE]>,
    extra_padding_blocks: u8,
}

impl CbcCipher {
    /// `fixed_iv` is the key-block IV of TLS 1.0; later versions pass `None`
    /// and send a fresh IV with every record.
    pub fn new(
        key: &[u8],
        mac_key: &[u8],
        mac: MacAlgorithm,
        fixed_iv: Option<&[u8]>,
    ) -> Result<Self, TlsError> {
        if key.len() != 16 && key.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 16,
                got: key.len(),
            }
            .into());
        }
        if mac_key.len() != mac.len() {
            return Err(CryptoError::InvalidKeyLength {
                expected: mac.len(),
                got: mac_key.len(),
            }
            .into());
        }
        let chained_iv = match fixed_iv {
            Some(iv) => Some(
                <[u8; BLOCK_SIZE]>::try_from(iv).map_err(|_| CryptoError::InvalidIvLength)?,
            ),
            None => None,
        };
        Ok(Self {
            key: SecureBuffer::from_slice(key),
            mac_key: SecureBuffer::from_slice(mac_key),
            mac,
            chained_iv,
            previous_iv: None,
            extra_padding_blocks: 0,
        })
    }

    /// Add whole blocks of padding to every record, up to
    /// [`MAX_EXTRA_PADDING_BLOCKS`].
    pub fn set_extra_padding_blocks(&mut self, blocks: u8) {
        self.extra_padding_blocks = blocks.min(MAX_EXTRA_PADDING_BLOCKS);
    }

    pub fn record_iv_len(&self) -> usize {
        if self.chained_iv.is_some() {
            0
        } else {
            BLOCK_SIZE
        }
    }

    fn extra_padding_len(&self) -> usize {
        self.extra_padding_blocks as usize * BLOCK_SIZE
    }

    pub fn min_extra_encrypted_bytes(&self) -> usize {
        self.record_iv_len() + self.mac.len() + 1 + self.extra_padding_len()
    }

    pub fn max_extra_encrypted_bytes(&self) -> usize {
        self.record_iv_len() + self.mac.len() + BLOCK_SIZE + self.extra_padding_len()
    }

    pub fn encrypted_size(&self, plaintext_len: usize) -> usize {
        let padded = (plaintext_len + self.mac.len() + 1).div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        self.record_iv_len() + padded + self.extra_padding_len()
    }

    /// Protect one record fragment.
    pub fn seal(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: u16,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        let mac = compute_mac(self.mac, &self.mac_key, seq, content_type, version, plaintext);

        let data_len = plaintext.len() + mac.len();
        let pad_len =
            (BLOCK_SIZE - (data_len + 1) % BLOCK_SIZE) % BLOCK_SIZE + self.extra_padding_len();

        let iv = match self.chained_iv {
            Some(iv) => iv,
            None => {
                let mut iv = [0u8; BLOCK_SIZE];
                getrandom::getrandom(&mut iv).map_err(|_| CryptoError::RandomFail)?;
                iv
            }
        };

        let iv_len = self.record_iv_len();
        let mut out = Vec::with_capacity(iv_len + data_len + pad_len + 1);
        out.extend_from_slice(&iv[..iv_len]);
        out.extend_from_slice(plaintext);
        out.extend_from_slice(&mac);
        out.resize(out.len() + pad_len + 1, pad_len as u8);

        aes_cbc_encrypt(&self.key, &iv, &mut out[iv_len..])?;

        if self.chained_iv.is_some() {
            let mut next = [0u8; BLOCK_SIZE];
            next.copy_from_slice(&out[out.len() - BLOCK_SIZE..]);
            self.chained_iv = Some(next);
        }
        Ok(out)
    }

    /// Restore the chained IV to its value before the last record opened.
    /// No effect on TLS 1.1+ where every record carries its own IV.
    pub fn rewind(&mut self) {
        if let Some(iv) = self.previous_iv.take() {
            self.chained_iv = Some(iv);
        }
    }

    /// Remove protection from one record fragment.
    ///
    /// Padding and MAC are checked without data-dependent branches so a
    /// corrupted record takes the same path whichever check fails.
    pub fn open(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: u16,
        fragment: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        let iv_len = self.record_iv_len();
        let mac_len = self.mac.len();
        let min_body = (mac_len + 1).div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        if fragment.len() < iv_len + min_body || (fragment.len() - iv_len) % BLOCK_SIZE != 0 {
            return Err(TlsError::bad_record_mac());
        }

        let iv = match self.chained_iv {
            Some(iv) => iv,
            None => {
                let mut iv = [0u8; BLOCK_SIZE];
                iv.copy_from_slice(&fragment[..BLOCK_SIZE]);
                iv
            }
        };
        let mut decrypted = fragment[iv_len..].to_vec();
        let last_block: [u8; BLOCK_SIZE] = {
            let mut b = [0u8; BLOCK_SIZE];
            b.copy_from_slice(&fragment[fragment.len() - BLOCK_SIZE..]);
            b
        };
        aes_cbc_decrypt(&self.key, &iv, &mut decrypted)?;

        let padding_length = decrypted[decrypted.len() - 1] as usize;
        let total_overhead = padding_length + 1 + mac_len;
        let good_length = u8::from(total_overhead <= decrypted.len());

        // Scan a fixed window; bytes outside the padding are masked out.
        let window = decrypted.len().min(256);
        let mut pad_ok = good_length;
        for (i, &b) in decrypted[decrypted.len() - window..].iter().rev().enumerate() {
            let in_padding = (i as u8).ct_lt(&(padding_length as u8)) | (i as u8).ct_eq(&(padding_length as u8));
            let matches = b.ct_eq(&(padding_length as u8));
            pad_ok &= u8::conditional_select(&1, &matches.unwrap_u8(), in_padding);
        }
        pad_ok &= u8::from(padding_length < window);

        let content_len = if good_length == 1 {
            decrypted.len() - total_overhead
        } else {
            0
        };

        // Always compute the MAC, even when the padding is already known bad.
        let expected = compute_mac(
            self.mac,
            &self.mac_key,
            seq,
            content_type,
            version,
            &decrypted[..content_len],
        );
        let received = if good_length == 1 {
            &decrypted[content_len..content_len + mac_len]
        } else {
            &decrypted[..mac_len]
        };
        let mac_ok = received.ct_eq(expected.as_slice()).unwrap_u8();

        if pad_ok & mac_ok != 1 {
            return Err(TlsError::bad_record_mac());
        }

        if self.chained_iv.is_some() {
            self.previous_iv = self.chained_iv.replace(last_block);
        }
        decrypted.truncate(content_len);
        Ok(decrypted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntls_types::AlertDescription;

    const V12: u16 = 0x0303;

    fn pair(mac: MacAlgorithm, key_len: usize, fixed_iv: Option<&[u8]>) -> (CbcCipher, CbcCipher) {
        let key = vec![0x42u8; key_len];
        let mac_key = vec![0x17u8; mac.len()];
        (
            CbcCipher::new(&key, &mac_key, mac, fixed_iv).unwrap(),
            CbcCipher::new(&key, &mac_key, mac, fixed_iv).unwrap(),
        )
    }

    #[test]
    fn test_cbc_sha1_encrypt_decrypt_roundtrip() {
        let (mut enc, mut dec) = pair(MacAlgorithm::HmacSha1, 16, None);
        let plaintext = b"hello CBC record";
        let sealed = enc.seal(0, ContentType::ApplicationData, V12, plaintext).unwrap();
        assert_eq!(sealed.len(), enc.encrypted_size(plaintext.len()));
        let opened = dec.open(0, ContentType::ApplicationData, V12, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_cbc_sha256_and_sha384_roundtrip() {
        for (mac, key_len) in [(MacAlgorithm::HmacSha256, 16), (MacAlgorithm::HmacSha384, 32)] {
            let (mut enc, mut dec) = pair(mac, key_len, None);
            let plaintext = vec![0x5au8; 1000];
            let sealed = enc.seal(7, ContentType::Handshake, V12, &plaintext).unwrap();
            let opened = dec.open(7, ContentType::Handshake, V12, &sealed).unwrap();
            assert_eq!(opened, plaintext);
        }
    }

    #[test]
    fn test_aes128_sha1_overhead_bounds() {
        let (enc, _) = pair(MacAlgorithm::HmacSha1, 16, None);
        assert_eq!(enc.min_extra_encrypted_bytes(), 37);
        assert_eq!(enc.max_extra_encrypted_bytes(), 52);
        assert_eq!(enc.encrypted_size(0), 48);
    }

    #[test]
    fn test_empty_plaintext_gives_48_bytes() {
        let (mut enc, mut dec) = pair(MacAlgorithm::HmacSha1, 16, None);
        let sealed = enc.seal(0, ContentType::ApplicationData, V12, &[]).unwrap();
        assert_eq!(sealed.len(), 48);
        assert!(dec.open(0, ContentType::ApplicationData, V12, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_encrypted_size_within_bounds_for_all_lengths() {
        let (mut enc, _) = pair(MacAlgorithm::HmacSha1, 16, None);
        for len in 0..100usize {
            let size = enc.encrypted_size(len);
            assert!(size >= len + enc.min_extra_encrypted_bytes());
            assert!(size <= len + enc.max_extra_encrypted_bytes());
            let sealed = enc.seal(len as u64, ContentType::ApplicationData, V12, &vec![1u8; len]).unwrap();
            assert_eq!(sealed.len(), size);
        }
    }

    #[test]
    fn test_bit_flip_anywhere_is_bad_record_mac() {
        let (mut enc, _) = pair(MacAlgorithm::HmacSha1, 16, None);
        let sealed = enc.seal(3, ContentType::ApplicationData, V12, b"attack at dawn").unwrap();
        for i in 0..sealed.len() {
            for bit in [0x01u8, 0x80] {
                let mut tampered = sealed.clone();
                tampered[i] ^= bit;
                let (_, mut dec) = pair(MacAlgorithm::HmacSha1, 16, None);
                let err = dec
                    .open(3, ContentType::ApplicationData, V12, &tampered)
                    .unwrap_err();
                assert_eq!(err.description(), Some(AlertDescription::BadRecordMac));
            }
        }
    }

    #[test]
    fn test_wrong_sequence_or_type_rejected() {
        let (mut enc, mut dec) = pair(MacAlgorithm::HmacSha256, 16, None);
        let sealed = enc.seal(1, ContentType::ApplicationData, V12, b"data").unwrap();
        assert!(dec.open(2, ContentType::ApplicationData, V12, &sealed).is_err());
        assert!(dec.open(1, ContentType::Handshake, V12, &sealed).is_err());
        assert!(dec.open(1, ContentType::ApplicationData, 0x0302, &sealed).is_err());
        assert!(dec.open(1, ContentType::ApplicationData, V12, &sealed).is_ok());
    }

    #[test]
    fn test_short_or_misaligned_fragment_rejected() {
        let (_, mut dec) = pair(MacAlgorithm::HmacSha1, 16, None);
        assert!(dec.open(0, ContentType::ApplicationData, V12, &[0u8; 32]).is_err());
        assert!(dec.open(0, ContentType::ApplicationData, V12, &[0u8; 49]).is_err());
    }

    #[test]
    fn test_tls10_chained_iv() {
        let iv = [0x33u8; 16];
        let (mut enc, mut dec) = pair(MacAlgorithm::HmacSha1, 16, Some(&iv));
        assert_eq!(enc.record_iv_len(), 0);
        assert_eq!(enc.min_extra_encrypted_bytes(), 21);
        assert_eq!(enc.max_extra_encrypted_bytes(), 36);

        let first = enc.seal(0, ContentType::ApplicationData, 0x0301, b"first").unwrap();
        let second = enc.seal(1, ContentType::ApplicationData, 0x0301, b"second").unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(dec.open(0, ContentType::ApplicationData, 0x0301, &first).unwrap(), b"first");
        assert_eq!(dec.open(1, ContentType::ApplicationData, 0x0301, &second).unwrap(), b"second");
    }

    #[test]
    fn test_tls10_rewind_reopens_record() {
        let iv = [0x33u8; 16];
        let (mut enc, mut dec) = pair(MacAlgorithm::HmacSha1, 16, Some(&iv));
        let first = enc.seal(0, ContentType::Handshake, 0x0301, b"first").unwrap();
        let second = enc.seal(1, ContentType::Handshake, 0x0301, b"second").unwrap();

        assert_eq!(dec.open(0, ContentType::Handshake, 0x0301, &first).unwrap(), b"first");
        dec.rewind();
        assert_eq!(dec.open(0, ContentType::Handshake, 0x0301, &first).unwrap(), b"first");
        assert_eq!(dec.open(1, ContentType::Handshake, 0x0301, &second).unwrap(), b"second");
    }

    #[test]
    fn test_maximum_padding_accepted() {
        for len in [0usize, 1, 15, 300] {
            let (mut enc, mut dec) = pair(MacAlgorithm::HmacSha1, 16, None);
            enc.set_extra_padding_blocks(MAX_EXTRA_PADDING_BLOCKS);
            let plaintext = vec![0x61u8; len];
            let sealed = enc.seal(3, ContentType::ApplicationData, V12, &plaintext).unwrap();
            assert_eq!(dec.open(3, ContentType::ApplicationData, V12, &sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_tls10_out_of_order_fails() {
        let iv = [0x33u8; 16];
        let (mut enc, mut dec) = pair(MacAlgorithm::HmacSha1, 16, Some(&iv));
        let _first = enc.seal(0, ContentType::ApplicationData, 0x0301, b"first").unwrap();
        let second = enc.seal(1, ContentType::ApplicationData, 0x0301, b"second").unwrap();
        assert!(dec.open(1, ContentType::ApplicationData, 0x0301, &second).is_err());
    }

    #[test]
    fn test_extra_padding_blocks() {
        let (mut enc, mut dec) = pair(MacAlgorithm::HmacSha1, 16, None);
        enc.set_extra_padding_blocks(3);
        assert_eq!(enc.encrypted_size(0), 48 + 48);
        let sealed = enc.seal(0, ContentType::ApplicationData, V12, b"padded").unwrap();
        assert_eq!(sealed.len(), enc.encrypted_size(6));
        assert_eq!(dec.open(0, ContentType::ApplicationData, V12, &sealed).unwrap(), b"padded");

        enc.set_extra_padding_blocks(200);
        let sealed = enc.seal(1, ContentType::ApplicationData, V12, b"").unwrap();
        assert_eq!(sealed.len(), 48 + 15 * 16);
        assert!(dec.open(1, ContentType::ApplicationData, V12, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_key_lengths() {
        assert!(CbcCipher::new(&[0u8; 24], &[0u8; 20], MacAlgorithm::HmacSha1, None).is_err());
        assert!(CbcCipher::new(&[0u8; 16], &[0u8; 32], MacAlgorithm::HmacSha1, None).is_err());
        assert!(CbcCipher::new(&[0u8; 16], &[0u8; 20], MacAlgorithm::HmacSha1, Some(&[0u8; 8])).is_err());
    }
}
