//! Shared fixtures and an in-memory driver for client/server context pairs.

#![allow(dead_code)]

use ntls_tls::config::TlsConfigBuilder;
use ntls_tls::record::split_records;
use ntls_tls::{PrivateKey, TlsConfig, TlsContext, TlsError, TlsStatus};

pub const CA_CERT: &[u8] = include_bytes!("../data/ca.der");
pub const SERVER_CERT: &[u8] = include_bytes!("../data/server.der");
pub const SERVER_SIGN_ONLY_CERT: &[u8] = include_bytes!("../data/server_sign_only.der");
pub const SERVER_KEY: &[u8] = include_bytes!("../data/server_key.der");
pub const CLIENT_CERT: &[u8] = include_bytes!("../data/client.der");
pub const CLIENT_KEY: &[u8] = include_bytes!("../data/client_key.der");

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn server_key() -> PrivateKey {
    PrivateKey::from_pkcs8_der(SERVER_KEY).unwrap()
}

pub fn client_key() -> PrivateKey {
    PrivateKey::from_pkcs8_der(CLIENT_KEY).unwrap()
}

/// Server with the localhost certificate.
pub fn server_builder() -> TlsConfigBuilder {
    TlsConfig::builder()
        .certificate_chain(vec![SERVER_CERT.to_vec()])
        .private_key(server_key())
        .trusted_cert(CA_CERT.to_vec())
}

/// Client trusting the test CA and expecting "localhost".
pub fn client_builder() -> TlsConfigBuilder {
    TlsConfig::builder()
        .server_name("localhost")
        .trusted_cert(CA_CERT.to_vec())
}

/// Split a flight into its records.
pub fn records(flight: &[u8]) -> Vec<Vec<u8>> {
    let (records, used) = split_records(flight);
    assert_eq!(used, flight.len(), "flight ends in a partial record");
    records.into_iter().map(<[u8]>::to_vec).collect()
}

/// Feed a flight record by record. On `NeedCredentials` the hook runs and
/// the same record is replayed once.
pub fn feed_with(
    ctx: &mut TlsContext,
    flight: &[u8],
    mut on_need_credentials: impl FnMut(&mut TlsContext),
) -> Result<(Vec<TlsStatus>, Vec<u8>), TlsError> {
    let mut statuses = Vec::new();
    let mut out = Vec::new();
    for record in records(flight) {
        let (mut status, mut output) = ctx.generate_next_token(Some(&record))?;
        if status == TlsStatus::NeedCredentials {
            statuses.push(status);
            out.extend_from_slice(&output);
            on_need_credentials(ctx);
            (status, output) = ctx.generate_next_token(Some(&record))?;
        }
        statuses.push(status);
        out.extend_from_slice(&output);
    }
    Ok((statuses, out))
}

pub fn feed(ctx: &mut TlsContext, flight: &[u8]) -> Result<(Vec<TlsStatus>, Vec<u8>), TlsError> {
    feed_with(ctx, flight, |_| {})
}

/// Which side raised a handshake error.
#[derive(Debug)]
pub enum Failure {
    Client(TlsError),
    Server(TlsError),
}

impl Failure {
    pub fn client(self) -> TlsError {
        match self {
            Failure::Client(e) => e,
            Failure::Server(e) => panic!("expected a client failure, server failed with {e}"),
        }
    }

    pub fn server(self) -> TlsError {
        match self {
            Failure::Server(e) => e,
            Failure::Client(e) => panic!("expected a server failure, client failed with {e}"),
        }
    }
}

/// Exchange flights until both sides report `Finished`. `first` is the
/// flight the client opens with (its ClientHello, or a renegotiation
/// ClientHello already produced).
pub fn drive(
    client: &mut TlsContext,
    server: &mut TlsContext,
    first: Vec<u8>,
    mut client_hook: impl FnMut(&mut TlsContext),
    mut server_hook: impl FnMut(&mut TlsContext),
) -> Result<(), Failure> {
    let mut to_server = first;
    let mut client_done = false;
    let mut server_done = false;
    for _ in 0..8 {
        let (statuses, to_client) =
            feed_with(server, &to_server, &mut server_hook).map_err(Failure::Server)?;
        server_done |= statuses.contains(&TlsStatus::Finished);
        let (statuses, next) =
            feed_with(client, &to_client, &mut client_hook).map_err(Failure::Client)?;
        client_done |= statuses.contains(&TlsStatus::Finished);
        if client_done && server_done {
            assert!(next.is_empty(), "client sent records after Finished");
            return Ok(());
        }
        to_server = next;
    }
    panic!("handshake did not converge");
}

pub fn handshake(client: &mut TlsContext, server: &mut TlsContext) -> Result<(), Failure> {
    let (status, hello) = client.generate_next_token(None).map_err(Failure::Client)?;
    assert_eq!(status, TlsStatus::Continue);
    drive(client, server, hello, |_| {}, |_| {})
}

/// Run a handshake that must succeed and return both contexts.
pub fn connect(client: TlsConfig, server: TlsConfig) -> (TlsContext, TlsContext) {
    init_tracing();
    let mut client = TlsContext::new_client(client).unwrap();
    let mut server = TlsContext::new_server(server).unwrap();
    handshake(&mut client, &mut server).unwrap();
    assert!(client.has_valid_session());
    assert!(server.has_valid_session());
    (client, server)
}

/// Encrypt on one side and decrypt every record on the other.
pub fn transfer(from: &mut TlsContext, to: &mut TlsContext, data: &[u8]) -> Vec<u8> {
    let wire = from.encrypt_message(data).unwrap();
    let mut received = Vec::new();
    for record in records(&wire) {
        let (status, plaintext) = to.decrypt_message(&record).unwrap();
        assert_eq!(status, TlsStatus::Ok);
        received.extend_from_slice(&plaintext);
    }
    received
}
