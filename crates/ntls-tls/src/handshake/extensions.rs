//! Hello extensions used by TLS 1.0-1.2.

use crate::buffer::{TlsReader, TlsWriter};
use crate::crypt::{NamedGroup, SignatureScheme};
use ntls_types::TlsError;

/// TLS extension type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionType(pub u16);

impl ExtensionType {
    pub const SERVER_NAME: Self = Self(0);
    pub const SUPPORTED_GROUPS: Self = Self(10);
    pub const EC_POINT_FORMATS: Self = Self(11);
    pub const SIGNATURE_ALGORITHMS: Self = Self(13);
    pub const RENEGOTIATION_INFO: Self = Self(0xFF01);
}

/// A raw hello extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub extension_type: ExtensionType,
    pub data: Vec<u8>,
}

/// ec_point_formats value for uncompressed points.
pub const EC_POINT_FORMAT_UNCOMPRESSED: u8 = 0;

/// Encode the extension block (`u16 len || (u16 type || u16 len || data)*`).
/// Nothing is written for an empty list.
pub fn encode_extensions(w: &mut TlsWriter, exts: &[Extension]) -> Result<(), TlsError> {
    if exts.is_empty() {
        return Ok(());
    }
    w.write_nested16(|w| {
        for ext in exts {
            w.write_u16(ext.extension_type.0);
            w.write_vec16(&ext.data)?;
        }
        Ok(())
    })
}

/// Decode an optional extension block at the end of a hello message.
/// Duplicate extension types are `decode_error`.
pub fn decode_extensions(r: &mut TlsReader<'_>) -> Result<Vec<Extension>, TlsError> {
    if r.is_empty() {
        return Ok(Vec::new());
    }
    let mut block = TlsReader::new(r.read_vec16()?);
    let mut exts: Vec<Extension> = Vec::new();
    while !block.is_empty() {
        let extension_type = ExtensionType(block.read_u16()?);
        let data = block.read_vec16()?.to_vec();
        if exts.iter().any(|e| e.extension_type == extension_type) {
            return Err(TlsError::decode_error(format!(
                "duplicate extension 0x{:04x}",
                extension_type.0
            )));
        }
        exts.push(Extension {
            extension_type,
            data,
        });
    }
    Ok(exts)
}

pub fn find_extension(exts: &[Extension], ty: ExtensionType) -> Option<&Extension> {
    exts.iter().find(|e| e.extension_type == ty)
}

fn finish(w: TlsWriter, extension_type: ExtensionType) -> Extension {
    Extension {
        extension_type,
        data: w.into_vec(),
    }
}

/// `server_name` with a single host_name entry.
pub fn build_server_name(hostname: &str) -> Result<Extension, TlsError> {
    let mut w = TlsWriter::new();
    w.write_nested16(|w| {
        w.write_u8(0);
        w.write_vec16(hostname.as_bytes())
    })?;
    Ok(finish(w, ExtensionType::SERVER_NAME))
}

/// Host name of a `server_name` extension; other name types are skipped.
pub fn parse_server_name(data: &[u8]) -> Result<Option<String>, TlsError> {
    let mut r = TlsReader::new(data);
    let mut list = TlsReader::new(r.read_vec16()?);
    r.expect_end("server_name")?;
    while !list.is_empty() {
        let name_type = list.read_u8()?;
        let name = list.read_vec16()?;
        if name_type == 0 {
            let host = std::str::from_utf8(name)
                .map_err(|_| TlsError::decode_error("server_name is not UTF-8"))?;
            return Ok(Some(host.to_string()));
        }
    }
    Ok(None)
}

pub fn build_signature_algorithms(schemes: &[SignatureScheme]) -> Result<Extension, TlsError> {
    let mut w = TlsWriter::new();
    w.write_nested16(|w| {
        for s in schemes {
            w.write_u16(s.0);
        }
        Ok(())
    })?;
    Ok(finish(w, ExtensionType::SIGNATURE_ALGORITHMS))
}

pub fn parse_signature_algorithms(data: &[u8]) -> Result<Vec<SignatureScheme>, TlsError> {
    let mut r = TlsReader::new(data);
    let list = r.read_vec16()?;
    r.expect_end("signature_algorithms")?;
    if list.is_empty() || list.len() % 2 != 0 {
        return Err(TlsError::decode_error("malformed signature_algorithms"));
    }
    Ok(list
        .chunks_exact(2)
        .map(|c| SignatureScheme(u16::from_be_bytes([c[0], c[1]])))
        .collect())
}

pub fn build_supported_groups(groups: &[NamedGroup]) -> Result<Extension, TlsError> {
    let mut w = TlsWriter::new();
    w.write_nested16(|w| {
        for g in groups {
            w.write_u16(g.0);
        }
        Ok(())
    })?;
    Ok(finish(w, ExtensionType::SUPPORTED_GROUPS))
}

pub fn parse_supported_groups(data: &[u8]) -> Result<Vec<NamedGroup>, TlsError> {
    let mut r = TlsReader::new(data);
    let list = r.read_vec16()?;
    r.expect_end("supported_groups")?;
    if list.len() % 2 != 0 {
        return Err(TlsError::decode_error("malformed supported_groups"));
    }
    Ok(list
        .chunks_exact(2)
        .map(|c| NamedGroup(u16::from_be_bytes([c[0], c[1]])))
        .collect())
}

/// `ec_point_formats` advertising uncompressed points only.
pub fn build_ec_point_formats() -> Extension {
    Extension {
        extension_type: ExtensionType::EC_POINT_FORMATS,
        data: vec![0x01, EC_POINT_FORMAT_UNCOMPRESSED],
    }
}

pub fn parse_ec_point_formats(data: &[u8]) -> Result<Vec<u8>, TlsError> {
    let mut r = TlsReader::new(data);
    let list = r.read_vec8()?;
    r.expect_end("ec_point_formats")?;
    if list.is_empty() {
        return Err(TlsError::decode_error("empty ec_point_formats"));
    }
    Ok(list.to_vec())
}

/// `renegotiation_info` carrying `renegotiated_connection` (RFC 5746).
pub fn build_renegotiation_info(renegotiated_connection: &[u8]) -> Result<Extension, TlsError> {
    let mut w = TlsWriter::new();
    w.write_vec8(renegotiated_connection)?;
    Ok(finish(w, ExtensionType::RENEGOTIATION_INFO))
}

pub fn parse_renegotiation_info(data: &[u8]) -> Result<Vec<u8>, TlsError> {
    let mut r = TlsReader::new(data);
    let value = r.read_vec8()?;
    r.expect_end("renegotiation_info")?;
    Ok(value.to_vec())
}
