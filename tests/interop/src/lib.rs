//! Integration tests for ntls.
//! Cross-crate error mapping, record re-framing and TCP loopback runs.

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    use ntls_tls::record::{encode_record, split_records, ContentType};
    use ntls_tls::{
        Alert, AlertDescription, CipherSuite, CryptoError, PrivateKey, TlsConfig, TlsContext, TlsError,
        TlsStatus, TlsVersion,
    };

    const CA_CERT: &[u8] = include_bytes!("../../../crates/ntls-tls/tests/data/ca.der");
    const SERVER_CERT: &[u8] = include_bytes!("../../../crates/ntls-tls/tests/data/server.der");
    const SERVER_KEY: &[u8] = include_bytes!("../../../crates/ntls-tls/tests/data/server_key.der");

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn server_config() -> TlsConfig {
        TlsConfig::builder()
            .certificate_chain(vec![SERVER_CERT.to_vec()])
            .private_key(PrivateKey::from_pkcs8_der(SERVER_KEY).unwrap())
            .build()
    }

    fn client_config() -> TlsConfig {
        TlsConfig::builder()
            .server_name("localhost")
            .trusted_cert(CA_CERT.to_vec())
            .build()
    }

    /// Feed every record of `flight`, returning the statuses and output.
    fn feed(ctx: &mut TlsContext, flight: &[u8]) -> (Vec<TlsStatus>, Vec<u8>) {
        let (records, used) = split_records(flight);
        assert_eq!(used, flight.len());
        let mut statuses = Vec::new();
        let mut out = Vec::new();
        for record in records {
            let (status, output) = ctx.generate_next_token(Some(record)).unwrap();
            statuses.push(status);
            out.extend_from_slice(&output);
        }
        (statuses, out)
    }

    /// Concatenate the bodies of plaintext handshake records and re-frame
    /// them into records of at most `size` bytes.
    fn reframe(flight: &[u8], size: usize) -> Vec<u8> {
        let (records, _) = split_records(flight);
        let version = u16::from_be_bytes([records[0][1], records[0][2]]);
        let mut payload = Vec::new();
        for record in records {
            assert_eq!(record[0], ContentType::Handshake as u8);
            payload.extend_from_slice(&record[5..]);
        }
        payload
            .chunks(size)
            .flat_map(|chunk| encode_record(ContentType::Handshake, version, chunk))
            .collect()
    }

    // -------------------------------------------------------
    // 1. Error and alert mapping across ntls-types and ntls-tls
    // -------------------------------------------------------
    #[test]
    fn test_crypto_error_maps_to_internal_error() {
        let err: TlsError = CryptoError::AeadTagVerifyFail.into();
        assert_eq!(err.description(), Some(AlertDescription::InternalError));
        assert_eq!(err.outgoing_alert(), Some(Alert::fatal(AlertDescription::InternalError)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_alert_errors() {
        let err = TlsError::handshake_failure("no shared cipher suite");
        assert_eq!(err.outgoing_alert(), Some(Alert::fatal(AlertDescription::HandshakeFailure)));
        assert_eq!(err.to_string(), "fatal handshake_failure: no shared cipher suite");

        let received = TlsError::AlertReceived(Alert::fatal(AlertDescription::BadRecordMac));
        assert_eq!(received.outgoing_alert(), None);
        assert_eq!(received.description(), Some(AlertDescription::BadRecordMac));
        assert!(TlsError::Closed.outgoing_alert().is_none());
    }

    #[test]
    fn test_fatal_alert_record_reaches_peer() {
        init_tracing();
        let mut server = TlsContext::new_server(server_config()).unwrap();
        let garbage = encode_record(ContentType::Handshake, 0x0303, &[1, 0, 0, 2, 0xFF, 0xFF]);
        let err = server.generate_next_token(Some(&garbage)).unwrap_err();
        assert_eq!(err.description(), Some(AlertDescription::DecodeError));

        let mut client = TlsContext::new_client(client_config()).unwrap();
        client.generate_next_token(None).unwrap();
        let alert = server.take_alert_record().unwrap();
        match client.generate_next_token(Some(&alert)) {
            Err(TlsError::AlertReceived(a)) => assert_eq!(a, Alert::fatal(AlertDescription::DecodeError)),
            other => panic!("unexpected {other:?}"),
        }
    }

    // -------------------------------------------------------
    // 2. Handshake messages split across and packed into records
    // -------------------------------------------------------
    fn run_reframed(size: usize) {
        let mut client = TlsContext::new_client(client_config()).unwrap();
        let mut server = TlsContext::new_server(server_config()).unwrap();

        let (_, hello) = client.generate_next_token(None).unwrap();
        let (_, flight) = feed(&mut server, &reframe(&hello, size));
        let (_, reply) = feed(&mut client, &reframe(&flight, size));
        let (statuses, finish) = feed(&mut server, &reply);
        assert_eq!(statuses.last(), Some(&TlsStatus::Finished));
        let (statuses, _) = feed(&mut client, &finish);
        assert_eq!(statuses.last(), Some(&TlsStatus::Finished));

        let wire = client.encrypt_message(b"reframed").unwrap();
        assert_eq!(server.decrypt_message(&wire).unwrap().1, b"reframed");
    }

    #[test]
    fn test_handshake_fragmented_records() {
        init_tracing();
        for size in [1usize, 7, 100, 1000] {
            run_reframed(size);
        }
    }

    #[test]
    fn test_handshake_coalesced_records() {
        init_tracing();
        run_reframed(16384);
    }

    #[test]
    fn test_partial_records_wait_for_more_bytes() {
        let mut client = TlsContext::new_client(client_config()).unwrap();
        let mut server = TlsContext::new_server(server_config()).unwrap();
        let (_, hello) = client.generate_next_token(None).unwrap();

        // A transport delivering one byte at a time.
        let mut pending = Vec::new();
        let mut flight = Vec::new();
        for byte in hello {
            pending.push(byte);
            let (records, used) = split_records(&pending);
            let records: Vec<Vec<u8>> = records.into_iter().map(<[u8]>::to_vec).collect();
            pending.drain(..used);
            for record in records {
                let (status, out) = server.generate_next_token(Some(&record)).unwrap();
                assert_eq!(status, TlsStatus::Continue);
                flight.extend_from_slice(&out);
            }
        }
        assert!(pending.is_empty());
        assert!(!flight.is_empty());
    }

    // -------------------------------------------------------
    // 3. TCP loopback
    // -------------------------------------------------------
    struct RecordStream {
        tcp: TcpStream,
        buffered: Vec<u8>,
    }

    impl RecordStream {
        fn new(tcp: TcpStream) -> Self {
            tcp.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            tcp.set_write_timeout(Some(Duration::from_secs(5))).unwrap();
            Self {
                tcp,
                buffered: Vec::new(),
            }
        }

        fn next_record(&mut self) -> Vec<u8> {
            loop {
                let (records, _) = split_records(&self.buffered);
                if let Some(record) = records.first() {
                    let record = record.to_vec();
                    self.buffered.drain(..record.len());
                    return record;
                }
                let mut chunk = [0u8; 4096];
                let n = self.tcp.read(&mut chunk).unwrap();
                assert!(n > 0, "peer closed the socket");
                self.buffered.extend_from_slice(&chunk[..n]);
            }
        }

        fn send(&mut self, data: &[u8]) {
            if !data.is_empty() {
                self.tcp.write_all(data).unwrap();
            }
        }

        fn handshake(&mut self, ctx: &mut TlsContext) {
            if !ctx.is_server() {
                let (_, hello) = ctx.generate_next_token(None).unwrap();
                self.send(&hello);
            }
            loop {
                let record = self.next_record();
                let (status, out) = ctx.generate_next_token(Some(&record)).unwrap();
                self.send(&out);
                if status == TlsStatus::Finished {
                    return;
                }
            }
        }

        fn read_message(&mut self, ctx: &mut TlsContext) -> (TlsStatus, Vec<u8>) {
            let record = self.next_record();
            ctx.decrypt_message(&record).unwrap()
        }
    }

    fn tcp_loopback(version: TlsVersion, suite: CipherSuite) {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server_handle = thread::spawn(move || {
            let (tcp, _) = listener.accept().unwrap();
            let mut stream = RecordStream::new(tcp);
            let mut ctx = TlsContext::new_server(server_config()).unwrap();
            stream.handshake(&mut ctx);

            let (status, request) = stream.read_message(&mut ctx);
            assert_eq!(status, TlsStatus::Ok);
            assert_eq!(request, b"Hello from client!");
            let reply = ctx.encrypt_message(b"Hello from server!").unwrap();
            stream.send(&reply);

            let (status, _) = stream.read_message(&mut ctx);
            assert_eq!(status, TlsStatus::PeerClosed);
            let close = ctx.close().unwrap();
            stream.send(&close);
        });

        let tcp = TcpStream::connect_timeout(&addr, Duration::from_secs(5)).unwrap();
        let mut stream = RecordStream::new(tcp);
        let config = TlsConfig::builder()
            .server_name("localhost")
            .trusted_cert(CA_CERT.to_vec())
            .version(version)
            .cipher_suites(&[suite])
            .build();
        let mut ctx = TlsContext::new_client(config).unwrap();
        stream.handshake(&mut ctx);
        assert_eq!(ctx.negotiated_version(), Some(version));
        assert_eq!(ctx.cipher_suite(), Some(suite));

        let request = ctx.encrypt_message(b"Hello from client!").unwrap();
        stream.send(&request);
        let (status, reply) = stream.read_message(&mut ctx);
        assert_eq!(status, TlsStatus::Ok);
        assert_eq!(reply, b"Hello from server!");

        let close = ctx.close().unwrap();
        stream.send(&close);
        server_handle.join().unwrap();
        // The server's close_notify arrives after ours; our context is already closed.
        assert!(matches!(ctx.decrypt_message(&stream.next_record()), Err(TlsError::Closed)));
    }

    #[test]
    fn test_tcp_loopback_tls12_ecdhe_gcm() {
        tcp_loopback(TlsVersion::Tls12, CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256);
    }

    #[test]
    fn test_tcp_loopback_tls12_dhe_cbc() {
        tcp_loopback(TlsVersion::Tls12, CipherSuite::TLS_DHE_RSA_WITH_AES_256_CBC_SHA256);
    }

    #[test]
    fn test_tcp_loopback_tls10_rsa() {
        tcp_loopback(TlsVersion::Tls10, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
    }
}
