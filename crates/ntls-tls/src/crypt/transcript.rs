//! Handshake transcript.
//!
//! The hash algorithm is only known once the cipher suite and version are
//! negotiated, so the transcript buffers raw handshake messages and hashes
//! them on demand.

use zeroize::Zeroize;

use super::HashAlgorithm;

/// Concatenation of every handshake message exchanged so far, headers included.
#[derive(Debug, Default, Clone)]
pub struct TranscriptHash {
    messages: Vec<u8>,
}

impl TranscriptHash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one encoded handshake message (4-byte header plus body).
    pub fn update(&mut self, message: &[u8]) {
        self.messages.extend_from_slice(message);
    }

    /// Digest of the transcript so far.
    pub fn hash(&self, alg: HashAlgorithm) -> Vec<u8> {
        alg.digest(&self.messages)
    }

    /// The raw transcript, for signatures that hash it themselves.
    pub fn messages(&self) -> &[u8] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Wipe and empty the transcript.
    pub fn clear(&mut self) {
        self.messages.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_hash_matches_concatenation() {
        let mut t = TranscriptHash::new();
        t.update(b"hello ");
        t.update(b"world");
        assert_eq!(t.len(), 11);
        assert_eq!(
            t.hash(HashAlgorithm::Sha256),
            HashAlgorithm::Sha256.digest(b"hello world")
        );
        assert_eq!(t.messages(), b"hello world");
    }

    #[test]
    fn test_hash_does_not_consume() {
        let mut t = TranscriptHash::new();
        t.update(b"abc");
        let first = t.hash(HashAlgorithm::Md5Sha1);
        assert_eq!(first, t.hash(HashAlgorithm::Md5Sha1));
        t.update(b"d");
        assert_ne!(first, t.hash(HashAlgorithm::Md5Sha1));
    }

    #[test]
    fn test_empty_transcript() {
        let mut t = TranscriptHash::new();
        assert!(t.is_empty());
        t.update(b"x");
        t.clear();
        assert_eq!(
            hex::encode(t.hash(HashAlgorithm::Sha256)),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_clear_wipes_and_allows_reuse() {
        let mut t = TranscriptHash::new();
        t.update(b"premaster-bearing handshake");
        t.clear();
        assert!(t.is_empty());
        assert!(t.messages().is_empty());
        t.update(b"abc");
        assert_eq!(t.messages(), b"abc");
    }
}
