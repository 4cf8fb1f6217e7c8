#![no_main]
use libfuzzer_sys::fuzz_target;

use ntls_tls::record::split_records;
use ntls_tls::{TlsConfig, TlsContext, TlsError};

// Feed arbitrary records to a fresh client and server. Errors are expected;
// panics and a context that keeps working after a fatal error are not.
fuzz_target!(|data: &[u8]| {
    let (records, _) = split_records(data);
    for is_server in [false, true] {
        let config = TlsConfig::builder().verify_peer(false).build();
        let Ok(mut ctx) = TlsContext::new(config, is_server) else {
            return;
        };
        if !is_server && ctx.generate_next_token(None).is_err() {
            return;
        }
        for record in &records {
            if ctx.generate_next_token(Some(record)).is_err() {
                assert!(!ctx.is_valid());
                assert!(matches!(ctx.generate_next_token(Some(record)), Err(TlsError::Closed)));
                break;
            }
        }
    }
});
