//! NSS key log format (SSLKEYLOGFILE) for TLS 1.0-1.2.
//!
//! Each line is `CLIENT_RANDOM <client_random_hex> <master_secret_hex>`, which
//! Wireshark uses to decrypt captured sessions.

use crate::config::TlsConfig;

/// Hand one key log line to the configured callback, if any.
pub fn log_key(config: &TlsConfig, label: &str, client_random: &[u8; 32], secret: &[u8]) {
    if let Some(cb) = &config.key_log_callback {
        let line = format!("{} {} {}", label, hex::encode(client_random), hex::encode(secret));
        cb(&line);
    }
}

pub fn log_master_secret(config: &TlsConfig, client_random: &[u8; 32], master_secret: &[u8]) {
    log_key(config, "CLIENT_RANDOM", client_random, master_secret);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_log_key_no_callback() {
        let config = TlsConfig::builder().build();
        log_key(&config, "CLIENT_RANDOM", &[0u8; 32], &[1, 2, 3]);
    }

    #[test]
    fn test_log_master_secret_line_format() {
        let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let lines_clone = lines.clone();
        let config = TlsConfig::builder()
            .key_log(Arc::new(move |line: &str| {
                lines_clone.lock().unwrap().push(line.to_string());
            }))
            .build();

        log_master_secret(&config, &[0x42u8; 32], &[0xAB, 0xCD]);

        let logged = lines.lock().unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0], format!("CLIENT_RANDOM {} abcd", "42".repeat(32)));
    }
}
