//! Input sources a tokenizer pulls bytes from.
//!
//! A [`Reader`] hands out the next chunk of UTF-8 bytes on every
//! [`fill`](Reader::fill) call and reports the end of input with `Ok(0)`.
//! Closing a reader is how a decode is aborted: every reader reports end of
//! input once closed, which unwinds the in-flight builder nodes.

use std::io;

/// The next-chunk capability consumed by tokenizers.
pub trait Reader {
    /// Copies the next chunk into `buf` and returns how many bytes were
    /// written. `Ok(0)` marks the end of input.
    ///
    /// # Errors
    ///
    /// Propagates failures of the underlying source.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Releases the source. Later `fill` calls report end of input.
    fn close(&mut self);
}

impl<R: Reader + ?Sized> Reader for &mut R {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).fill(buf)
    }

    fn close(&mut self) {
        (**self).close();
    }
}

impl<R: Reader + ?Sized> Reader for Box<R> {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).fill(buf)
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// Reads from a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
    closed: bool,
}

impl<'a> SliceReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            closed: false,
        }
    }

    /// Bytes not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<'a> From<&'a str> for SliceReader<'a> {
    fn from(s: &'a str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for SliceReader<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::new(data)
    }
}

impl Reader for SliceReader<'_> {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Adapts any [`io::Read`]. Closing drops the inner source.
#[derive(Debug)]
pub struct IoReader<R> {
    inner: Option<R>,
}

impl<R: io::Read> IoReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner: Some(inner) }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl<R: io::Read> Reader for IoReader<R> {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(0);
        };
        loop {
            match inner.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                other => return other,
            }
        }
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

/// Transcodes UTF-16 code units to UTF-8.
///
/// Unpaired surrogates decode to `?`. A chunk never ends inside a code point
/// unless the caller's buffer is smaller than the code point itself, in which
/// case the tail is held back and delivered first on the next call.
#[derive(Debug, Clone)]
pub struct Utf16Reader<'a> {
    units: &'a [u16],
    pos: usize,
    pending: [u8; 4],
    pending_at: usize,
    pending_len: usize,
    closed: bool,
}

impl<'a> Utf16Reader<'a> {
    #[must_use]
    pub fn new(units: &'a [u16]) -> Self {
        Self {
            units,
            pos: 0,
            pending: [0; 4],
            pending_at: 0,
            pending_len: 0,
            closed: false,
        }
    }

    /// Decodes the code point at `pos` without consuming it and returns it
    /// with the number of code units it spans.
    fn peek_char(&self) -> Option<(char, usize)> {
        let first = *self.units.get(self.pos)?;
        match first {
            0xD800..=0xDBFF => match self.units.get(self.pos + 1) {
                Some(&low @ 0xDC00..=0xDFFF) => {
                    let code = 0x10000 + ((u32::from(first) - 0xD800) << 10) + (u32::from(low) - 0xDC00);
                    Some((char::from_u32(code).unwrap_or('?'), 2))
                }
                _ => Some(('?', 1)),
            },
            0xDC00..=0xDFFF => Some(('?', 1)),
            unit => Some((char::from_u32(u32::from(unit)).unwrap_or('?'), 1)),
        }
    }
}

impl Reader for Utf16Reader<'_> {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed || buf.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        if self.pending_len > 0 {
            let n = self.pending_len.min(buf.len());
            buf[..n].copy_from_slice(&self.pending[self.pending_at..self.pending_at + n]);
            self.pending_at += n;
            self.pending_len -= n;
            written = n;
        }

        while written < buf.len() {
            let Some((c, units)) = self.peek_char() else {
                break;
            };
            let mut encoded = [0u8; 4];
            let bytes = c.encode_utf8(&mut encoded).as_bytes();
            let room = buf.len() - written;
            if bytes.len() > room {
                if written > 0 {
                    break;
                }
                buf[..room].copy_from_slice(&bytes[..room]);
                self.pending[..bytes.len() - room].copy_from_slice(&bytes[room..]);
                self.pending_at = 0;
                self.pending_len = bytes.len() - room;
                self.pos += units;
                return Ok(room);
            }
            buf[written..written + bytes.len()].copy_from_slice(bytes);
            written += bytes.len();
            self.pos += units;
        }
        Ok(written)
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending_len = 0;
    }
}
