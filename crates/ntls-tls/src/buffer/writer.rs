use ntls_types::TlsError;

/// Growable big-endian encoder for handshake messages and records.
#[derive(Debug, Clone, Default)]
pub struct TlsWriter {
    buf: Vec<u8>,
}

impl TlsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u24(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes()[1..]);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn write_vec8(&mut self, data: &[u8]) -> Result<(), TlsError> {
        let len = u8::try_from(data.len())
            .map_err(|_| TlsError::internal_error("vector exceeds 2^8-1 bytes"))?;
        self.write_u8(len);
        self.write_bytes(data);
        Ok(())
    }

    pub fn write_vec16(&mut self, data: &[u8]) -> Result<(), TlsError> {
        let len = u16::try_from(data.len())
            .map_err(|_| TlsError::internal_error("vector exceeds 2^16-1 bytes"))?;
        self.write_u16(len);
        self.write_bytes(data);
        Ok(())
    }

    pub fn write_vec24(&mut self, data: &[u8]) -> Result<(), TlsError> {
        if data.len() > 0xFF_FFFF {
            return Err(TlsError::internal_error("vector exceeds 2^24-1 bytes"));
        }
        self.write_u24(data.len() as u32);
        self.write_bytes(data);
        Ok(())
    }

    /// Write a `u16` length prefix covering whatever `f` encodes.
    pub fn write_nested16<F>(&mut self, f: F) -> Result<(), TlsError>
    where
        F: FnOnce(&mut TlsWriter) -> Result<(), TlsError>,
    {
        let mut inner = TlsWriter::new();
        f(&mut inner)?;
        self.write_vec16(&inner.buf)
    }

    /// Write a `u24` length prefix covering whatever `f` encodes.
    pub fn write_nested24<F>(&mut self, f: F) -> Result<(), TlsError>
    where
        F: FnOnce(&mut TlsWriter) -> Result<(), TlsError>,
    {
        let mut inner = TlsWriter::new();
        f(&mut inner)?;
        self.write_vec24(&inner.buf)
    }
}
