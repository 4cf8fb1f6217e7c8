use ntls_types::TlsError;

/// Big-endian read cursor over a received byte slice.
///
/// Every read that runs past the end of the input fails with `decode_error`.
#[derive(Debug, Clone)]
pub struct TlsReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TlsReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// All bytes not yet consumed, without advancing.
    pub fn peek_rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], TlsError> {
        if self.remaining() < len {
            return Err(TlsError::decode_error(format!(
                "buffer underrun: need {len}, have {}",
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Consume everything that is left.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }

    pub fn read_u8(&mut self) -> Result<u8, TlsError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, TlsError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u24(&mut self) -> Result<u32, TlsError> {
        let b = self.read_bytes(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, TlsError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// `opaque <0..2^8-1>`
    pub fn read_vec8(&mut self) -> Result<&'a [u8], TlsError> {
        let len = self.read_u8()? as usize;
        self.read_bytes(len)
    }

    /// `opaque <0..2^16-1>`
    pub fn read_vec16(&mut self) -> Result<&'a [u8], TlsError> {
        let len = self.read_u16()? as usize;
        self.read_bytes(len)
    }

    /// `opaque <0..2^24-1>`
    pub fn read_vec24(&mut self) -> Result<&'a [u8], TlsError> {
        let len = self.read_u24()? as usize;
        self.read_bytes(len)
    }

    /// Fail with `decode_error` unless the input is fully consumed.
    pub fn expect_end(&self, what: &str) -> Result<(), TlsError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(TlsError::decode_error(format!(
                "{what}: {} trailing bytes",
                self.remaining()
            )))
        }
    }
}
