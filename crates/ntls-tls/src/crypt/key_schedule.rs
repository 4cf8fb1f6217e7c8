//! Master secret, key block and Finished derivation (RFC 5246 Sections 6.3,
//! 7.4.9 and 8.1).

use super::prf::{prf, PrfAlgorithm};
use super::CipherSuiteParams;
use crate::buffer::SecureBuffer;
use crate::TlsVersion;

pub const MASTER_SECRET_LEN: usize = 48;
pub const VERIFY_DATA_LEN: usize = 12;

pub const LABEL_MASTER_SECRET: &str = "master secret";
pub const LABEL_KEY_EXPANSION: &str = "key expansion";
pub const LABEL_CLIENT_FINISHED: &str = "client finished";
pub const LABEL_SERVER_FINISHED: &str = "server finished";

/// `master_secret = PRF(pre_master_secret, "master secret",
/// client_random + server_random)[0..48]`
pub fn compute_master_secret(
    alg: PrfAlgorithm,
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> SecureBuffer {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);
    prf(alg, pre_master_secret, LABEL_MASTER_SECRET, &seed, MASTER_SECRET_LEN)
}

/// Key material for both directions, in key block order.
pub struct KeyBlock {
    pub client_write_mac_key: SecureBuffer,
    pub server_write_mac_key: SecureBuffer,
    pub client_write_key: SecureBuffer,
    pub server_write_key: SecureBuffer,
    pub client_write_iv: SecureBuffer,
    pub server_write_iv: SecureBuffer,
}

impl std::fmt::Debug for KeyBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBlock").finish_non_exhaustive()
    }
}

/// Expand the master secret into the key block.
///
/// The seed is `server_random + client_random`, reversed relative to the
/// master secret derivation.
pub fn compute_key_block(
    params: &CipherSuiteParams,
    version: TlsVersion,
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> KeyBlock {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);

    let mac_len = params.mac_len();
    let key_len = params.key_len();
    let iv_len = params.fixed_iv_len(version);
    let block = prf(
        params.prf(version),
        master_secret,
        LABEL_KEY_EXPANSION,
        &seed,
        params.key_block_len(version),
    );

    let mut offset = 0;
    let mut take = |len: usize| {
        let part = SecureBuffer::from_slice(&block[offset..offset + len]);
        offset += len;
        part
    };
    KeyBlock {
        client_write_mac_key: take(mac_len),
        server_write_mac_key: take(mac_len),
        client_write_key: take(key_len),
        server_write_key: take(key_len),
        client_write_iv: take(iv_len),
        server_write_iv: take(iv_len),
    }
}

/// `verify_data = PRF(master_secret, finished_label, handshake_hash)[0..12]`
pub fn compute_verify_data(
    alg: PrfAlgorithm,
    master_secret: &[u8],
    label: &str,
    handshake_hash: &[u8],
) -> Vec<u8> {
    prf(alg, master_secret, label, handshake_hash, VERIFY_DATA_LEN).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CipherSuite;

    #[test]
    fn test_master_secret_is_prf_of_randoms() {
        let pms = [0x03u8; 48];
        let cr = [0x11u8; 32];
        let sr = [0x22u8; 32];
        let ms = compute_master_secret(PrfAlgorithm::Sha256, &pms, &cr, &sr);
        assert_eq!(ms.len(), MASTER_SECRET_LEN);

        let mut seed = cr.to_vec();
        seed.extend_from_slice(&sr);
        let expected = prf(PrfAlgorithm::Sha256, &pms, "master secret", &seed, 48);
        assert_eq!(ms.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_key_block_partition_cbc_tls10() {
        let params =
            CipherSuiteParams::from_suite(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA).unwrap();
        let ms = [0x5au8; 48];
        let cr = [1u8; 32];
        let sr = [2u8; 32];
        let kb = compute_key_block(&params, TlsVersion::Tls10, &ms, &cr, &sr);
        assert_eq!(kb.client_write_mac_key.len(), 20);
        assert_eq!(kb.server_write_key.len(), 16);
        assert_eq!(kb.client_write_iv.len(), 16);

        let mut seed = sr.to_vec();
        seed.extend_from_slice(&cr);
        let raw = prf(PrfAlgorithm::Legacy, &ms, "key expansion", &seed, 104);
        assert_eq!(kb.client_write_mac_key.as_slice(), &raw[..20]);
        assert_eq!(kb.server_write_mac_key.as_slice(), &raw[20..40]);
        assert_eq!(kb.client_write_key.as_slice(), &raw[40..56]);
        assert_eq!(kb.server_write_key.as_slice(), &raw[56..72]);
        assert_eq!(kb.client_write_iv.as_slice(), &raw[72..88]);
        assert_eq!(kb.server_write_iv.as_slice(), &raw[88..104]);
    }

    #[test]
    fn test_key_block_partition_gcm() {
        let params =
            CipherSuiteParams::from_suite(CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384)
                .unwrap();
        let kb = compute_key_block(&params, TlsVersion::Tls12, &[7u8; 48], &[0u8; 32], &[9u8; 32]);
        assert!(kb.client_write_mac_key.is_empty());
        assert_eq!(kb.client_write_key.len(), 32);
        assert_eq!(kb.server_write_iv.len(), 4);
    }

    #[test]
    fn test_verify_data_labels_differ() {
        let ms = [0x42u8; 48];
        let hash = [0u8; 32];
        let client = compute_verify_data(PrfAlgorithm::Sha256, &ms, LABEL_CLIENT_FINISHED, &hash);
        let server = compute_verify_data(PrfAlgorithm::Sha256, &ms, LABEL_SERVER_FINISHED, &hash);
        assert_eq!(client.len(), VERIFY_DATA_LEN);
        assert_ne!(client, server);
    }
}
