#![no_main]
use libfuzzer_sys::fuzz_target;

use ntls_tls::alert::parse_alert;
use ntls_tls::buffer::TlsReader;
use ntls_tls::record::{split_records, RecordHeader};

fuzz_target!(|data: &[u8]| {
    let (records, used) = split_records(data);
    assert!(used <= data.len());
    for record in records {
        let mut reader = TlsReader::new(record);
        if RecordHeader::parse(&mut reader).is_ok() {
            let _ = parse_alert(reader.read_rest());
        }
    }
});
