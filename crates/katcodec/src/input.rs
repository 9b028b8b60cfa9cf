use std::sync::Arc;

use crate::{chain::BufferPool, error::DecodeError, reader::Reader};

/// Pooled read-ahead window between a [`Reader`] and a tokenizer.
///
/// The window storage is drawn from the [`BufferPool`] on first use and
/// handed back on [`reset`](Input::reset), so an idle worker holds no input
/// buffer.
#[derive(Debug)]
pub(crate) struct Input {
    pool: Arc<BufferPool>,
    window: usize,
    buf: Box<[u8]>,
    pos: usize,
    end: usize,
    consumed: usize,
    eof: bool,
}

impl Input {
    pub(crate) fn new(pool: Arc<BufferPool>, window: usize) -> Self {
        Self {
            pool,
            window: window.max(1),
            buf: Box::default(),
            pos: 0,
            end: 0,
            consumed: 0,
            eof: false,
        }
    }

    /// Absolute offset of the next byte.
    pub(crate) fn offset(&self) -> usize {
        self.consumed + self.pos
    }

    fn refill(&mut self, reader: &mut dyn Reader) -> Result<bool, DecodeError> {
        if self.eof {
            return Ok(false);
        }
        if self.buf.is_empty() {
            self.buf = self.pool.alloc(self.window)?;
        }
        self.consumed += self.end;
        self.pos = 0;
        self.end = 0;
        let limit = self.window.min(self.buf.len());
        let n = reader.fill(&mut self.buf[..limit])?;
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        self.end = n;
        Ok(true)
    }

    pub(crate) fn peek(&mut self, reader: &mut dyn Reader) -> Result<Option<u8>, DecodeError> {
        if self.pos == self.end && !self.refill(reader)? {
            return Ok(None);
        }
        Ok(Some(self.buf[self.pos]))
    }

    pub(crate) fn next(&mut self, reader: &mut dyn Reader) -> Result<Option<u8>, DecodeError> {
        let b = self.peek(reader)?;
        if b.is_some() {
            self.pos += 1;
        }
        Ok(b)
    }

    /// Next byte, failing with `reason` at end of input.
    pub(crate) fn expect(&mut self, reader: &mut dyn Reader, reason: &'static str) -> Result<u8, DecodeError> {
        let offset = self.offset();
        self.next(reader)?.ok_or(DecodeError::malformed(offset, reason))
    }

    /// Skips ASCII whitespace and returns the next byte without consuming it.
    pub(crate) fn peek_non_blank(&mut self, reader: &mut dyn Reader) -> Result<Option<u8>, DecodeError> {
        while let Some(b) = self.peek(reader)? {
            if !b.is_ascii_whitespace() {
                return Ok(Some(b));
            }
            self.pos += 1;
        }
        Ok(None)
    }

    /// Drops buffered state and returns the window to the pool.
    pub(crate) fn reset(&mut self) {
        self.pos = 0;
        self.end = 0;
        self.consumed = 0;
        self.eof = false;
        let buf = core::mem::take(&mut self.buf);
        if !buf.is_empty() {
            self.pool.release(buf);
        }
    }
}

impl Drop for Input {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{options::BufferOptions, reader::SliceReader};

    #[test]
    fn reads_across_refills_and_tracks_offset() {
        let pool = Arc::new(BufferPool::new(&BufferOptions::default()).unwrap());
        let mut input = Input::new(pool.clone(), 2);
        let mut reader = SliceReader::from("  kat");

        assert_eq!(input.peek_non_blank(&mut reader).unwrap(), Some(b'k'));
        assert_eq!(input.offset(), 2);
        assert_eq!(input.next(&mut reader).unwrap(), Some(b'k'));
        assert_eq!(input.next(&mut reader).unwrap(), Some(b'a'));
        assert_eq!(input.next(&mut reader).unwrap(), Some(b't'));
        assert_eq!(input.next(&mut reader).unwrap(), None);
        assert!(matches!(
            input.expect(&mut reader, "eof"),
            Err(DecodeError::MalformedInput { offset: 5, .. })
        ));

        input.reset();
        assert_eq!(pool.retained(), 1);
    }
}
