#![no_main]
use libfuzzer_sys::fuzz_target;

use ntls_tls::handshake::{parse_handshake_header, HandshakeMessage, HANDSHAKE_HEADER_LEN};
use ntls_tls::TlsVersion;

fuzz_target!(|data: &[u8]| {
    let Ok(Some((msg_type, len))) = parse_handshake_header(data) else {
        return;
    };
    let body = &data[HANDSHAKE_HEADER_LEN..];
    let body = &body[..len.min(body.len())];
    for version in [None, Some(TlsVersion::Tls10), Some(TlsVersion::Tls12)] {
        let _ = HandshakeMessage::decode(msg_type, body, version);
    }
});
