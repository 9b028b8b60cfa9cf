//! Growable byte buffer with a cached hash and pool-negotiated growth.
//!
//! A [`ByteChain`] holds `storage` (its physical capacity) and `len` (the
//! logical size). Every append funnels through [`ByteChain::reserve`], which
//! asks the chain's [`BufferPool`] for a larger array when needed instead of
//! doubling blindly. Chains without a pool (copies, chains built from
//! literals) own private storage and grow by doubling.
//!
//! The hash is the classic `31 * h + b` over the signed bytes, cached until
//! the next mutation. Zero means "not computed yet".
//!
//! Pool-managed storage never leaves the chain by value: views are borrows
//! bounded by the chain's lifetime, and [`copy`](ByteChain::copy),
//! [`sub_chain`](ByteChain::sub_chain) and [`to_vec`](ByteChain::to_vec)
//! always materialize new storage.

mod digest;
mod pool;

use core::{cell::Cell, cmp::Ordering, fmt, hash, str};
use std::{borrow::Cow, io, sync::Arc};

use bstr::{BStr, ByteSlice};
pub use pool::BufferPool;

use crate::error::DecodeError;

pub struct ByteChain {
    storage: Box<[u8]>,
    len: usize,
    hash: Cell<i32>,
    pool: Option<Arc<BufferPool>>,
}

impl ByteChain {
    /// Empty chain with private storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Box::default(),
            len: 0,
            hash: Cell::new(0),
            pool: None,
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity].into_boxed_slice(),
            len: 0,
            hash: Cell::new(0),
            pool: None,
        }
    }

    /// Empty chain whose storage is drawn from, and returned to, `pool`.
    #[must_use]
    pub fn pooled(pool: Arc<BufferPool>) -> Self {
        Self {
            storage: Box::default(),
            len: 0,
            hash: Cell::new(0),
            pool: Some(pool),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// `true` when the storage is private to this chain, i.e. not managed by
    /// a pool that may hand it to someone else once released.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.pool.is_none()
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// Ensures room for `additional` more bytes and invalidates the hash.
    ///
    /// # Errors
    ///
    /// [`DecodeError::CapacityExceeded`] when the pool refuses the size or the
    /// length would overflow.
    pub fn reserve(&mut self, additional: usize) -> Result<(), DecodeError> {
        self.hash.set(0);
        let needed = self
            .len
            .checked_add(additional)
            .ok_or(DecodeError::CapacityExceeded {
                requested: usize::MAX,
                limit: isize::MAX as usize,
            })?;
        if needed <= self.storage.len() {
            return Ok(());
        }

        match &self.pool {
            Some(pool) => pool.acquire(&mut self.storage, self.len, needed),
            None => {
                let capacity = needed.max(self.storage.len().saturating_mul(2)).max(8);
                let mut data = vec![0; capacity].into_boxed_slice();
                data[..self.len].copy_from_slice(&self.storage[..self.len]);
                self.storage = data;
                Ok(())
            }
        }
    }

    /// Appends a byte.
    ///
    /// # Errors
    ///
    /// See [`reserve`](Self::reserve).
    pub fn push(&mut self, b: u8) -> Result<(), DecodeError> {
        self.reserve(1)?;
        self.storage[self.len] = b;
        self.len += 1;
        Ok(())
    }

    /// Appends the UTF-8 encoding of `c`.
    ///
    /// # Errors
    ///
    /// See [`reserve`](Self::reserve).
    pub fn push_char(&mut self, c: char) -> Result<(), DecodeError> {
        let mut buf = [0u8; 4];
        self.extend_from_slice(c.encode_utf8(&mut buf).as_bytes())
    }

    /// Appends `num` in decimal.
    ///
    /// # Errors
    ///
    /// See [`reserve`](Self::reserve).
    pub fn push_int(&mut self, num: i64) -> Result<(), DecodeError> {
        if num < 0 {
            self.push(b'-')?;
        }
        self.push_uint(num.unsigned_abs())
    }

    /// Appends `num` in decimal.
    ///
    /// # Errors
    ///
    /// See [`reserve`](Self::reserve).
    pub fn push_uint(&mut self, mut num: u64) -> Result<(), DecodeError> {
        let mut digits = [0u8; 20];
        let mut at = digits.len();
        loop {
            at -= 1;
            // `num % 10` is a single decimal digit.
            #[allow(clippy::cast_possible_truncation)]
            let digit = (num % 10) as u8;
            digits[at] = b'0' + digit;
            num /= 10;
            if num == 0 {
                break;
            }
        }
        self.extend_from_slice(&digits[at..])
    }

    /// # Errors
    ///
    /// See [`reserve`](Self::reserve).
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        self.reserve(bytes.len())?;
        self.storage[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Appends `bytes[start..start + len]`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::OutOfRange`] when the range leaves `bytes`, otherwise as
    /// for [`reserve`](Self::reserve).
    pub fn push_bytes(&mut self, bytes: &[u8], start: usize, len: usize) -> Result<(), DecodeError> {
        let range = checked_range(bytes.len(), start, len)?;
        self.extend_from_slice(&bytes[range])
    }

    /// # Errors
    ///
    /// See [`reserve`](Self::reserve).
    pub fn push_str(&mut self, s: &str) -> Result<(), DecodeError> {
        self.extend_from_slice(s.as_bytes())
    }

    /// Appends the byte range `s[start..start + len]`, which must fall on
    /// character boundaries.
    ///
    /// # Errors
    ///
    /// [`DecodeError::OutOfRange`] for a range outside `s` or one that splits
    /// a character.
    pub fn push_str_range(&mut self, s: &str, start: usize, len: usize) -> Result<(), DecodeError> {
        let range = checked_range(s.len(), start, len)?;
        match s.get(range.clone()) {
            Some(part) => self.push_str(part),
            None => Err(DecodeError::OutOfRange {
                start: range.start,
                end: range.end,
                len: s.len(),
            }),
        }
    }

    /// Drains `source` into the chain, `chunk` bytes at a time, and returns
    /// the number of bytes read.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from `source` and growth failures.
    pub fn read_from<R: io::Read + ?Sized>(&mut self, source: &mut R, chunk: usize) -> Result<usize, DecodeError> {
        let chunk = chunk.max(1);
        let mut total = 0;
        loop {
            self.reserve(chunk)?;
            let n = match source.read(&mut self.storage[self.len..]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return Ok(total);
            }
            self.len += n;
            total += n;
        }
    }

    /// Appends `data` as uppercase hexadecimal.
    ///
    /// # Errors
    ///
    /// See [`reserve`](Self::reserve).
    pub fn upper(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        self.hex(data, digest::upper_nibble)
    }

    /// Appends `data` as lowercase hexadecimal.
    ///
    /// # Errors
    ///
    /// See [`reserve`](Self::reserve).
    pub fn lower(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        self.hex(data, digest::lower_nibble)
    }

    fn hex(&mut self, data: &[u8], nibble: fn(u8) -> u8) -> Result<(), DecodeError> {
        let width = data.len().checked_mul(2).ok_or(DecodeError::CapacityExceeded {
            requested: usize::MAX,
            limit: isize::MAX as usize,
        })?;
        self.reserve(width)?;
        let out = &mut self.storage[self.len..self.len + width];
        for (pair, b) in out.chunks_exact_mut(2).zip(data) {
            pair[0] = nibble(b >> 4);
            pair[1] = nibble(b & 0xF);
        }
        self.len += width;
        Ok(())
    }

    /// Overwrites the byte at `i`. Indices at or past `len` are ignored.
    pub fn set(&mut self, i: usize, b: u8) {
        if i < self.len {
            self.hash.set(0);
            self.storage[i] = b;
        }
    }

    /// Exchanges the bytes at `i` and `j`. Out-of-range indices are ignored.
    pub fn swap(&mut self, i: usize, j: usize) {
        if i < self.len && j < self.len {
            self.hash.set(0);
            self.storage.swap(i, j);
        }
    }

    /// Shortens or extends the logical length within the current capacity.
    ///
    /// # Errors
    ///
    /// [`DecodeError::OutOfRange`] when `len` exceeds the capacity.
    pub fn truncate(&mut self, len: usize) -> Result<(), DecodeError> {
        if len > self.storage.len() {
            return Err(DecodeError::OutOfRange {
                start: 0,
                end: len,
                len: self.storage.len(),
            });
        }
        self.hash.set(0);
        self.len = len;
        Ok(())
    }

    /// Forgets the contents but keeps the storage.
    pub fn clear(&mut self) {
        self.hash.set(0);
        self.len = 0;
    }

    /// Forgets the contents and hands pool-managed storage back to the pool.
    pub fn release(&mut self) {
        self.clear();
        if let Some(pool) = &self.pool {
            let storage = core::mem::take(&mut self.storage);
            if !storage.is_empty() {
                pool.release(storage);
            }
        }
    }

    #[must_use]
    pub fn byte_at(&self, i: usize) -> Option<u8> {
        self.as_bytes().get(i).copied()
    }

    /// Byte at `i`, counting from the end for negative indices.
    #[must_use]
    pub fn get(&self, i: isize) -> Option<u8> {
        let index = if i < 0 {
            self.len.checked_sub(i.unsigned_abs())?
        } else {
            i.unsigned_abs()
        };
        self.byte_at(index)
    }

    #[must_use]
    pub fn is(&self, s: &str) -> bool {
        self.as_bytes() == s.as_bytes()
    }

    #[must_use]
    pub fn is_byte(&self, b: u8) -> bool {
        self.as_bytes() == [b]
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.as_bytes().starts_with(prefix.as_bytes())
    }

    #[must_use]
    pub fn ends_with(&self, suffix: &str) -> bool {
        self.as_bytes().ends_with(suffix.as_bytes())
    }

    #[must_use]
    pub fn index_of(&self, needle: impl AsRef<[u8]>) -> Option<usize> {
        self.as_bytes().find(needle)
    }

    #[must_use]
    pub fn index_of_from(&self, needle: impl AsRef<[u8]>, from: usize) -> Option<usize> {
        let tail = self.as_bytes().get(from..)?;
        tail.find(needle).map(|i| i + from)
    }

    #[must_use]
    pub fn last_index_of(&self, needle: impl AsRef<[u8]>) -> Option<usize> {
        self.as_bytes().rfind(needle)
    }

    #[must_use]
    pub fn contains(&self, needle: impl AsRef<[u8]>) -> bool {
        self.index_of(needle).is_some()
    }

    /// Cached `31 * h + b` hash over the signed bytes.
    #[must_use]
    pub fn hash_code(&self) -> i32 {
        let cached = self.hash.get();
        if cached != 0 {
            return cached;
        }
        let h = self.as_bytes().iter().fold(0i32, |h, &b| {
            h.wrapping_mul(31).wrapping_add(i32::from(i8::from_ne_bytes([b])))
        });
        self.hash.set(h);
        h
    }

    /// Hashes the contents with `algorithm` and returns lowercase hex.
    ///
    /// # Errors
    ///
    /// [`DecodeError::UnsupportedAlgorithm`] for names other than `MD5`,
    /// `SHA1`, `SHA256`, `SHA384` and `SHA512`.
    pub fn digest(&self, algorithm: &str) -> Result<String, DecodeError> {
        let out = digest::digest(self.as_bytes(), algorithm)?;
        let mut hex = ByteChain::with_capacity(out.len() * 2);
        hex.lower(&out)?;
        Ok(hex.to_string())
    }

    /// MD5 of the contents as lowercase hex.
    ///
    /// # Errors
    ///
    /// Never fails in practice; see [`digest`](Self::digest).
    pub fn digest_md5(&self) -> Result<String, DecodeError> {
        self.digest("MD5")
    }

    /// Independent chain with private storage sized to the contents.
    #[must_use]
    pub fn copy(&self) -> ByteChain {
        ByteChain::from(self.as_bytes())
    }

    /// Copies `start..end` into a new private chain.
    ///
    /// # Errors
    ///
    /// [`DecodeError::OutOfRange`] for a range outside `0..len`.
    pub fn sub_chain(&self, start: usize, end: usize) -> Result<ByteChain, DecodeError> {
        match self.as_bytes().get(start..end) {
            Some(bytes) => Ok(ByteChain::from(bytes)),
            None => Err(DecodeError::OutOfRange {
                start,
                end,
                len: self.len,
            }),
        }
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Decodes the contents as UTF-8, substituting U+FFFD for invalid
    /// sequences.
    #[must_use]
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        self.as_bytes().to_str_lossy()
    }

    /// # Errors
    ///
    /// [`DecodeError::InvalidScalar`] when the contents are not UTF-8.
    pub fn to_str(&self) -> Result<&str, DecodeError> {
        str::from_utf8(self.as_bytes()).map_err(|_| DecodeError::invalid_scalar("utf-8 text", self.as_bytes()))
    }

    /// # Errors
    ///
    /// [`DecodeError::InvalidScalar`] unless the contents are an optionally
    /// signed decimal integer.
    pub fn parse_int(&self) -> Result<i64, DecodeError> {
        let text = self.to_str()?.trim();
        text.parse::<i64>()
            .map_err(|_| DecodeError::invalid_scalar("integer", self.as_bytes()))
    }

    /// # Errors
    ///
    /// [`DecodeError::InvalidScalar`] unless the contents are a float literal.
    pub fn parse_float(&self) -> Result<f64, DecodeError> {
        let text = self.to_str()?.trim();
        text.parse::<f64>()
            .map_err(|_| DecodeError::invalid_scalar("float", self.as_bytes()))
    }

    /// Accepts `true`/`false` in any case as well as `1`/`0`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::InvalidScalar`] for anything else.
    pub fn parse_bool(&self) -> Result<bool, DecodeError> {
        let bytes = self.as_bytes().trim_ascii();
        if bytes.eq_ignore_ascii_case(b"true") || bytes == b"1" {
            Ok(true)
        } else if bytes.eq_ignore_ascii_case(b"false") || bytes == b"0" {
            Ok(false)
        } else {
            Err(DecodeError::invalid_scalar("boolean", self.as_bytes()))
        }
    }
}

fn checked_range(total: usize, start: usize, len: usize) -> Result<core::ops::Range<usize>, DecodeError> {
    match start.checked_add(len) {
        Some(end) if end <= total => Ok(start..end),
        _ => Err(DecodeError::OutOfRange {
            start,
            end: start.saturating_add(len),
            len: total,
        }),
    }
}

impl Default for ByteChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ByteChain {
    fn drop(&mut self) {
        self.release();
    }
}

impl Clone for ByteChain {
    /// Clones into private storage, see [`ByteChain::copy`].
    fn clone(&self) -> Self {
        self.copy()
    }
}

impl From<&[u8]> for ByteChain {
    fn from(bytes: &[u8]) -> Self {
        Self {
            storage: bytes.into(),
            len: bytes.len(),
            hash: Cell::new(0),
            pool: None,
        }
    }
}

impl From<&str> for ByteChain {
    fn from(s: &str) -> Self {
        Self::from(s.as_bytes())
    }
}

impl From<Vec<u8>> for ByteChain {
    fn from(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            storage: bytes.into_boxed_slice(),
            len,
            hash: Cell::new(0),
            pool: None,
        }
    }
}

impl AsRef<[u8]> for ByteChain {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq for ByteChain {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ByteChain {}

impl PartialEq<[u8]> for ByteChain {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<str> for ByteChain {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for ByteChain {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialOrd for ByteChain {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Byte-wise lexicographic order, which matches code point order only for
/// single-byte content.
impl Ord for ByteChain {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl PartialOrd<str> for ByteChain {
    fn partial_cmp(&self, other: &str) -> Option<Ordering> {
        Some(self.as_bytes().cmp(other.as_bytes()))
    }
}

impl hash::Hash for ByteChain {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        state.write_i32(self.hash_code());
    }
}

impl fmt::Display for ByteChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(BStr::new(self.as_bytes()), f)
    }
}

impl fmt::Debug for ByteChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ByteChain")
            .field(&BStr::new(self.as_bytes()))
            .finish()
    }
}
