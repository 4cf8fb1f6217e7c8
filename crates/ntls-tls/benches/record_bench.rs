//! Record protection and PRF benchmarks.
//!
//! Run with: cargo bench -p ntls-tls

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ntls_tls::crypt::key_schedule::{compute_key_block, compute_master_secret};
use ntls_tls::crypt::prf::{prf, PrfAlgorithm};
use ntls_tls::crypt::CipherSuiteParams;
use ntls_tls::record::{ContentType, CryptoParameters};
use ntls_tls::{CipherSuite, TlsVersion};

/// A client writer and a server reader sharing one key block.
fn cipher_pair(version: TlsVersion, suite: CipherSuite) -> (CryptoParameters, CryptoParameters) {
    let params = CipherSuiteParams::from_suite(suite).unwrap();
    let client_random = [0x11; 32];
    let server_random = [0x22; 32];
    let master_secret = compute_master_secret(params.prf(version), &[0x33; 48], &client_random, &server_random);
    let keys = compute_key_block(&params, version, &master_secret, &client_random, &server_random);

    let mut writer = CryptoParameters::new(false, version, suite).unwrap();
    writer.initialize_cipher(&keys).unwrap();
    let mut reader = CryptoParameters::new(true, version, suite).unwrap();
    reader.initialize_cipher(&keys).unwrap();
    (writer, reader)
}

fn bench_record(c: &mut Criterion) {
    let suites = [
        ("aes128-cbc-sha", TlsVersion::Tls12, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA),
        ("aes256-cbc-sha256", TlsVersion::Tls12, CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256),
        ("aes128-cbc-sha-tls10", TlsVersion::Tls10, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA),
        ("aes128-gcm", TlsVersion::Tls12, CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256),
        ("aes256-gcm", TlsVersion::Tls12, CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384),
    ];

    let mut group = c.benchmark_group("record");
    for size in [64usize, 1024, 16 * 1024 - 64] {
        let data = vec![0x5Au8; size];
        group.throughput(Throughput::Bytes(size as u64));
        for (name, version, suite) in suites {
            group.bench_with_input(BenchmarkId::new(format!("{name}/seal"), size), &data, |b, data| {
                let (mut writer, _) = cipher_pair(version, suite);
                b.iter(|| writer.encrypt(ContentType::ApplicationData, data).unwrap());
            });
            group.bench_with_input(BenchmarkId::new(format!("{name}/roundtrip"), size), &data, |b, data| {
                let (mut writer, mut reader) = cipher_pair(version, suite);
                b.iter(|| {
                    let record = writer.encrypt(ContentType::ApplicationData, data).unwrap();
                    reader.decrypt(ContentType::ApplicationData, &record).unwrap()
                });
            });
        }
    }
    group.finish();
}

fn bench_prf(c: &mut Criterion) {
    let mut group = c.benchmark_group("prf");
    let secret = [0x42u8; 48];
    let seed = [0x17u8; 64];
    for alg in [PrfAlgorithm::Legacy, PrfAlgorithm::Sha256, PrfAlgorithm::Sha384] {
        group.bench_function(format!("{alg:?}/key_block"), |b| {
            b.iter(|| prf(alg, &secret, "key expansion", &seed, 136));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_record, bench_prf);
criterion_main!(benches);
