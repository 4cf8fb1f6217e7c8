//! The TLS pseudo-random function.
//!
//! ```text
//! TLS 1.2:      PRF(secret, label, seed) = P_<hash>(secret, label + seed)
//! TLS 1.0/1.1:  PRF(secret, label, seed) = P_MD5(S1, label + seed) XOR
//!                                          P_SHA1(S2, label + seed)
//!
//! P_hash(secret, seed) = HMAC_hash(secret, A(1) + seed) ||
//!                        HMAC_hash(secret, A(2) + seed) || ...
//! A(0) = seed
//! A(i) = HMAC_hash(secret, A(i-1))
//! ```
//!
//! S1 and S2 are the first and last halves of the secret, rounded up so they
//! share the middle byte when the length is odd.

use hmac::digest::core_api::BlockSizeUser;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384};

use super::hmac_parts;
use crate::buffer::SecureBuffer;

/// PRF variant selected by protocol version and cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrfAlgorithm {
    /// TLS 1.0/1.1 MD5 XOR SHA-1 construction.
    Legacy,
    Sha256,
    Sha384,
}

/// Derive `output_len` bytes from `secret`, `label` and `seed`.
pub fn prf(
    alg: PrfAlgorithm,
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
) -> SecureBuffer {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label.as_bytes());
    label_seed.extend_from_slice(seed);

    match alg {
        PrfAlgorithm::Sha256 => p_hash::<Sha256>(secret, &label_seed, output_len),
        PrfAlgorithm::Sha384 => p_hash::<Sha384>(secret, &label_seed, output_len),
        PrfAlgorithm::Legacy => {
            let half = secret.len().div_ceil(2);
            let s1 = &secret[..half];
            let s2 = &secret[secret.len() - half..];
            let mut out = p_hash::<Md5>(s1, &label_seed, output_len);
            let sha = p_hash::<Sha1>(s2, &label_seed, output_len);
            for (o, s) in out.iter_mut().zip(sha.iter()) {
                *o ^= s;
            }
            out
        }
    }
}

/// P_hash expansion (RFC 5246 Section 5).
fn p_hash<D>(secret: &[u8], seed: &[u8], output_len: usize) -> SecureBuffer
where
    D: Digest + BlockSizeUser,
{
    let mut result = Vec::with_capacity(output_len + <D as Digest>::output_size());
    let mut a = seed.to_vec();

    while result.len() < output_len {
        a = hmac_parts::<D>(secret, &[&a]);
        let block = hmac_parts::<D>(secret, &[&a, seed]);
        result.extend_from_slice(&block);
    }

    result.truncate(output_len);
    SecureBuffer::from_vec(result)
}
