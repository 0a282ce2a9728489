//! Growable receive buffer for the frame parser

use crate::{
    constants::{BUF_CHUNK, MAX_BUFFER_SIZE},
    error::{EslError, EslResult},
};

/// Byte buffer with a read cursor.
///
/// Consumed bytes stay in place until [`compact`](Self::compact) moves the
/// unread tail to the front.
#[derive(Debug)]
pub(crate) struct EslBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl EslBuffer {
    pub(crate) fn new() -> Self {
        Self {
            data: Vec::with_capacity(BUF_CHUNK),
            pos: 0,
        }
    }

    /// Unread bytes.
    pub(crate) fn len(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        if self.data.capacity() - self.data.len() < bytes.len() {
            let grow = bytes
                .len()
                .div_ceil(BUF_CHUNK)
                * BUF_CHUNK;
            self.data
                .reserve(grow);
        }
        self.data
            .extend_from_slice(bytes);
    }

    pub(crate) fn check_size_limits(&self) -> EslResult<()> {
        if self.len() > MAX_BUFFER_SIZE {
            return Err(EslError::protocol_error(format!(
                "Receive buffer holds {} unparsed bytes, limit is {}",
                self.len(),
                MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Take everything up to `pattern`, consuming the pattern too.
    pub(crate) fn extract_until_pattern(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        let unread = &self.data[self.pos..];
        let idx = unread
            .windows(pattern.len())
            .position(|w| w == pattern)?;
        let out = unread[..idx].to_vec();
        self.pos += idx + pattern.len();
        Some(out)
    }

    /// Take exactly `n` bytes, or nothing if fewer are buffered.
    pub(crate) fn extract_bytes(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.len() < n {
            return None;
        }
        let out = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Some(out)
    }

    pub(crate) fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        self.data
            .drain(..self.pos);
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_until_pattern_consumes_terminator() {
        let mut buf = EslBuffer::new();
        buf.extend_from_slice(b"Content-Type: auth/request\n\nrest");
        let head = buf
            .extract_until_pattern(b"\n\n")
            .unwrap();
        assert_eq!(head, b"Content-Type: auth/request");
        assert_eq!(buf.len(), 4);
        assert!(buf
            .extract_until_pattern(b"\n\n")
            .is_none());
    }

    #[test]
    fn extract_bytes_waits_for_enough_data() {
        let mut buf = EslBuffer::new();
        buf.extend_from_slice(b"ab");
        assert!(buf
            .extract_bytes(3)
            .is_none());
        buf.extend_from_slice(b"c");
        assert_eq!(
            buf.extract_bytes(3)
                .unwrap(),
            b"abc"
        );
        buf.compact();
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn size_limit_enforced() {
        let mut buf = EslBuffer::new();
        buf.extend_from_slice(&vec![b'x'; MAX_BUFFER_SIZE + 1]);
        assert!(buf
            .check_size_limits()
            .is_err());
    }
}
