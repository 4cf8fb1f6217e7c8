/// Accumulates the outgoing records produced by one engine call.
///
/// Each segment is one complete record (header included).
#[derive(Debug, Clone, Default)]
pub struct MultiBuffer {
    segments: Vec<Vec<u8>>,
}

impl MultiBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, segment: Vec<u8>) {
        if !segment.is_empty() {
            self.segments.push(segment);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total number of bytes across all segments.
    pub fn total_len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    /// Concatenate all segments into one transmit buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        for segment in self.segments {
            out.extend_from_slice(&segment);
        }
        out
    }
}
