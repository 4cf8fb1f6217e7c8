//! Application data protection on established connections.

mod common;

use common::*;
use ntls_tls::record::MAX_FRAGMENT_SIZE;
use ntls_tls::{Alert, AlertDescription, CipherSuite, TlsContext, TlsError, TlsStatus, TlsVersion};

fn pair(version: TlsVersion, suite: CipherSuite) -> (TlsContext, TlsContext) {
    connect(
        client_builder().version(version).cipher_suites(&[suite]).build(),
        server_builder().build(),
    )
}

fn body_len(record: &[u8]) -> usize {
    u16::from_be_bytes([record[3], record[4]]) as usize
}

#[test]
fn test_large_message_is_fragmented() {
    for suite in [
        CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    ] {
        let (mut client, mut server) = pair(TlsVersion::Tls12, suite);
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        let wire = client.encrypt_message(&data).unwrap();
        let records = records(&wire);
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record[0], 23);
            assert_eq!(&record[1..3], &[0x03, 0x03]);
            assert!(body_len(record) <= MAX_FRAGMENT_SIZE);
        }

        let mut received = Vec::new();
        for record in &records {
            let (status, plaintext) = server.decrypt_message(record).unwrap();
            assert_eq!(status, TlsStatus::Ok);
            received.extend_from_slice(&plaintext);
        }
        assert_eq!(received, data);
    }
}

#[test]
fn test_empty_message() {
    let (mut client, mut server) = pair(TlsVersion::Tls12, CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256);
    let wire = client.encrypt_message(b"").unwrap();
    assert_eq!(records(&wire).len(), 1);
    assert_eq!(body_len(&wire), 24);
    let (status, plaintext) = server.decrypt_message(&wire).unwrap();
    assert_eq!(status, TlsStatus::Ok);
    assert!(plaintext.is_empty());
}

#[test]
fn test_cbc_record_sizes() {
    // TLS 1.2 AES-128/SHA1: explicit IV 16, MAC 20, padding to 16.
    let (mut client, mut server) = pair(TlsVersion::Tls12, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
    for len in [0usize, 1, 11, 12, 100, 1000] {
        let wire = client.encrypt_message(&vec![0x42; len]).unwrap();
        let body = body_len(&wire);
        assert!(body >= len + 37 && body <= len + 52, "len {len}: body {body}");
        assert_eq!(body % 16, 0);
        assert_eq!(server.decrypt_message(&wire).unwrap().1, vec![0x42; len]);
    }

    // TLS 1.0 carries no explicit IV.
    let (mut client, mut server) = pair(TlsVersion::Tls10, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
    for len in [0usize, 100, 1000] {
        let wire = client.encrypt_message(&vec![7; len]).unwrap();
        let body = body_len(&wire);
        assert!(body >= len + 21 && body <= len + 36, "len {len}: body {body}");
        assert_eq!(server.decrypt_message(&wire).unwrap().1, vec![7; len]);
    }
}

#[test]
fn test_cbc_extra_padding_blocks() {
    let (mut client, mut server) = connect(
        client_builder()
            .cipher_suites(&[CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA])
            .extra_padding_blocks(3)
            .build(),
        server_builder().build(),
    );
    let wire = client.encrypt_message(&[1u8; 100]).unwrap();
    // 16 IV + 128 (data, MAC, minimal padding) + 3 extra blocks.
    assert_eq!(body_len(&wire), 16 + 128 + 48);
    assert_eq!(server.decrypt_message(&wire).unwrap().1, vec![1u8; 100]);
}

#[test]
fn test_gcm_record_size_and_explicit_nonce() {
    let (mut client, mut server) = pair(TlsVersion::Tls12, CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256);
    let nonce = [0, 0, 0, 0, 0, 0, 0, 9];
    client.set_explicit_nonce(nonce);
    let wire = client.encrypt_message(&[5u8; 100]).unwrap();
    assert_eq!(body_len(&wire), 124);
    assert_eq!(&wire[5..13], &nonce);
    assert_eq!(server.decrypt_message(&wire).unwrap().1, vec![5u8; 100]);

    // The hook covers one record only.
    let wire = client.encrypt_message(&[5u8; 100]).unwrap();
    assert_eq!(body_len(&wire), 124);
    server.decrypt_message(&wire).unwrap();
}

#[test]
fn test_bit_flip_is_bad_record_mac() {
    for suite in [
        CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256,
        CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
    ] {
        for position in [5usize, 20, 60] {
            let (mut client, mut server) = pair(TlsVersion::Tls12, suite);
            let mut wire = client.encrypt_message(b"attack at dawn, bring snacks").unwrap();
            let position = position.min(wire.len() - 1);
            wire[position] ^= 0x80;
            let err = server.decrypt_message(&wire).unwrap_err();
            assert_eq!(err.description(), Some(AlertDescription::BadRecordMac), "{suite:?} @ {position}");
            assert!(!server.is_valid());
            assert!(server.take_alert_record().is_some());
            assert!(matches!(server.decrypt_message(&wire), Err(TlsError::Closed)));
        }
    }
}

#[test]
fn test_replayed_record_rejected() {
    let (mut client, mut server) = pair(TlsVersion::Tls12, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
    let wire = client.encrypt_message(b"once").unwrap();
    server.decrypt_message(&wire).unwrap();
    let err = server.decrypt_message(&wire).unwrap_err();
    assert_eq!(err.description(), Some(AlertDescription::BadRecordMac));
}

#[test]
fn test_wrong_record_version_after_handshake() {
    let (mut client, mut server) = pair(TlsVersion::Tls11, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
    let mut wire = client.encrypt_message(b"data").unwrap();
    wire[2] = 0x03;
    let err = server.decrypt_message(&wire).unwrap_err();
    assert_eq!(err.description(), Some(AlertDescription::ProtocolVersion));
}

#[test]
fn test_close_notify() {
    let (mut client, mut server) = pair(TlsVersion::Tls12, CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256);
    let wire = client.close().unwrap();
    assert!(!client.is_valid());
    // Encrypted alert: 2 bytes + GCM overhead.
    assert_eq!(body_len(&wire), 26);
    let (status, plaintext) = server.decrypt_message(&wire).unwrap();
    assert_eq!(status, TlsStatus::PeerClosed);
    assert!(plaintext.is_empty());
    assert!(server.peer_closed());
    assert!(server.is_valid());
}

#[test]
fn test_fatal_alert_after_handshake() {
    let (mut client, mut server) = pair(TlsVersion::Tls12, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
    let wire = server.create_alert(Alert::fatal(AlertDescription::InternalError)).unwrap();
    assert!(!server.is_valid());
    let err = client.decrypt_message(&wire).unwrap_err();
    assert!(matches!(err, TlsError::AlertReceived(a) if a.description == AlertDescription::InternalError));
    assert!(client.take_alert_record().is_none());
    assert!(matches!(client.encrypt_message(b"late"), Err(TlsError::Closed)));
}

#[test]
fn test_warning_alert_is_ignored() {
    let (mut client, mut server) = pair(TlsVersion::Tls12, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
    let wire = server.create_alert(Alert::warning(AlertDescription::UserCanceled)).unwrap();
    assert!(server.is_valid());
    let (status, _) = client.decrypt_message(&wire).unwrap();
    assert_eq!(status, TlsStatus::Continue);
    assert_eq!(transfer(&mut server, &mut client, b"still here"), b"still here");
}

#[test]
fn test_handshake_record_is_handed_back() {
    let (mut client, mut server) = pair(TlsVersion::Tls12, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
    let request = server.create_hello_request().unwrap();
    let (status, record) = client.decrypt_message(&request).unwrap();
    assert_eq!(status, TlsStatus::Renegotiate);
    assert_eq!(record, request);
}
