use std::sync::Arc;

use super::{Scratch, Skip, Tokenizer, Visitor};
use crate::{
    chain::{BufferPool, ByteChain},
    error::DecodeError,
    input::Input,
    reader::Reader,
};

/// Lexer for a small XML subset.
///
/// Elements with attributes or child elements open a composite
/// (`open("M", tag)`); attributes and text-only elements are scalars
/// (`emit("s", name, text)`). Declarations, comments and doctypes are
/// skipped, CDATA sections are text. The five predefined entities and
/// numeric character references are decoded; unknown entities are kept
/// verbatim.
///
/// Whether an element without attributes is a composite is only known once
/// its first child element or its end tag arrives, so such an element stays
/// *pending* until then and its text is buffered in the value chain.
#[derive(Debug)]
pub struct XmlTokenizer {
    input: Input,
    tags: Vec<Vec<u8>>,
    pending: bool,
    skip: Skip,
}

impl XmlTokenizer {
    #[must_use]
    pub fn new(pool: Arc<BufferPool>, window: usize) -> Self {
        Self {
            input: Input::new(pool, window),
            tags: Vec::new(),
            pending: false,
            skip: Skip::default(),
        }
    }

    /// Consumes input through the first occurrence of `terminator`,
    /// appending everything before it to `out` when given.
    fn until(
        &mut self,
        reader: &mut dyn Reader,
        terminator: &[u8],
        mut out: Option<&mut ByteChain>,
        reason: &'static str,
    ) -> Result<(), DecodeError> {
        let mut tail: Vec<u8> = Vec::with_capacity(terminator.len());
        loop {
            let b = self.input.expect(reader, reason)?;
            if tail.len() == terminator.len() {
                let first = tail.remove(0);
                if let Some(out) = out.as_deref_mut() {
                    out.push(first)?;
                }
            }
            tail.push(b);
            if tail == terminator {
                return Ok(());
            }
        }
    }

    /// Reads a name up to whitespace, `=`, `/` or `>`, leaving the delimiter.
    fn name(&mut self, reader: &mut dyn Reader, out: &mut ByteChain) -> Result<(), DecodeError> {
        out.clear();
        while let Some(b) = self.input.peek(reader)? {
            if b.is_ascii_whitespace() || matches!(b, b'=' | b'/' | b'>' | b'<') {
                break;
            }
            out.push(b)?;
            self.input.next(reader)?;
        }
        if out.is_empty() {
            return Err(DecodeError::malformed(self.input.offset(), "expected a name"));
        }
        Ok(())
    }

    /// Decodes the entity after `&` into `out`.
    fn entity(&mut self, reader: &mut dyn Reader, out: &mut ByteChain) -> Result<(), DecodeError> {
        let mut name = [0u8; 10];
        let mut len = 0;
        loop {
            let b = self.input.expect(reader, "unterminated entity")?;
            if b == b';' {
                break;
            }
            if len == name.len() {
                // Too long for any entity we know; keep it as text.
                out.push(b'&')?;
                out.extend_from_slice(&name)?;
                return out.push(b);
            }
            name[len] = b;
            len += 1;
        }

        let name = &name[..len];
        let decoded = match name {
            b"lt" => Some('<'),
            b"gt" => Some('>'),
            b"amp" => Some('&'),
            b"quot" => Some('"'),
            b"apos" => Some('\''),
            [b'#', b'x' | b'X', hex @ ..] => numeric(hex, 16),
            [b'#', dec @ ..] => numeric(dec, 10),
            _ => None,
        };
        match decoded {
            Some(c) => out.push_char(c),
            None => {
                out.push(b'&')?;
                out.extend_from_slice(name)?;
                out.push(b';')
            }
        }
    }

    /// Text between tags. Only buffered while the enclosing element is
    /// still pending.
    fn text(&mut self, b: u8, reader: &mut dyn Reader, scratch: &mut Scratch) -> Result<(), DecodeError> {
        if !self.pending {
            return Ok(());
        }
        if b == b'&' {
            self.entity(reader, &mut scratch.value)
        } else {
            scratch.value.push(b)
        }
    }

    /// Opens the pending element as a composite before its first child.
    fn flush(&mut self, scratch: &mut Scratch, visitor: &mut dyn Visitor) -> Result<(), DecodeError> {
        if !self.pending {
            return Ok(());
        }
        self.pending = false;
        scratch.alias.clear();
        if let Some(tag) = self.tags.last() {
            scratch.alias.extend_from_slice(tag)?;
        }
        scratch.set_space(b"M")?;
        self.skip.open(scratch, visitor)
    }

    /// Handles everything after a `<`.
    fn markup(&mut self, reader: &mut dyn Reader, scratch: &mut Scratch, visitor: &mut dyn Visitor) -> Result<(), DecodeError> {
        let offset = self.input.offset() - 1;
        match self.input.peek(reader)? {
            Some(b'?') => self.until(reader, b"?>", None, "unterminated declaration"),
            Some(b'!') => {
                self.input.next(reader)?;
                match self.input.peek(reader)? {
                    Some(b'-') => {
                        self.until(reader, b"-", None, "malformed comment")?;
                        self.until(reader, b"-->", None, "unterminated comment")
                    }
                    Some(b'[') => {
                        self.until(reader, b"[CDATA[", None, "malformed CDATA section")?;
                        let out = if self.pending { Some(&mut scratch.value) } else { None };
                        self.until(reader, b"]]>", out, "unterminated CDATA section")
                    }
                    _ => self.until(reader, b">", None, "unterminated doctype"),
                }
            }
            Some(b'/') => {
                self.input.next(reader)?;
                self.name(reader, &mut scratch.alias)?;
                if self.input.peek_non_blank(reader)? != Some(b'>') {
                    return Err(DecodeError::malformed(self.input.offset(), "expected '>'"));
                }
                self.input.next(reader)?;
                match self.tags.pop() {
                    Some(tag) if scratch.alias == *tag.as_slice() => {}
                    _ => return Err(DecodeError::malformed(offset, "mismatched end tag")),
                }
                if self.pending {
                    self.pending = false;
                    scratch.set_space(b"s")?;
                    self.skip.emit(scratch, visitor)
                } else {
                    self.skip.close(visitor)
                }
            }
            Some(_) => self.start_tag(reader, scratch, visitor),
            None => Err(DecodeError::malformed(offset, "unterminated tag")),
        }
    }

    fn start_tag(&mut self, reader: &mut dyn Reader, scratch: &mut Scratch, visitor: &mut dyn Visitor) -> Result<(), DecodeError> {
        self.flush(scratch, visitor)?;
        self.name(reader, &mut scratch.alias)?;
        let tag = scratch.alias.to_vec();
        let mut opened = false;

        let self_closing = loop {
            let offset = self.input.offset();
            match self.input.peek_non_blank(reader)? {
                Some(b'>') => {
                    self.input.next(reader)?;
                    break false;
                }
                Some(b'/') => {
                    self.input.next(reader)?;
                    if self.input.next(reader)? != Some(b'>') {
                        return Err(DecodeError::malformed(offset, "expected '/>'"));
                    }
                    break true;
                }
                Some(_) => {
                    if !opened {
                        scratch.set_space(b"M")?;
                        self.skip.open(scratch, visitor)?;
                        opened = true;
                    }
                    self.attribute(reader, scratch)?;
                    scratch.set_space(b"s")?;
                    self.skip.emit(scratch, visitor)?;
                }
                None => return Err(DecodeError::malformed(offset, "unterminated start tag")),
            }
        };

        match (self_closing, opened) {
            (true, true) => self.skip.close(visitor),
            (true, false) => {
                scratch.alias.clear();
                scratch.alias.extend_from_slice(&tag)?;
                scratch.value.clear();
                scratch.set_space(b"s")?;
                self.skip.emit(scratch, visitor)
            }
            (false, opened) => {
                self.tags.push(tag);
                self.pending = !opened;
                scratch.value.clear();
                Ok(())
            }
        }
    }

    /// Reads `name="value"` into alias and value.
    fn attribute(&mut self, reader: &mut dyn Reader, scratch: &mut Scratch) -> Result<(), DecodeError> {
        self.name(reader, &mut scratch.alias)?;
        let offset = self.input.offset();
        if self.input.peek_non_blank(reader)? != Some(b'=') {
            return Err(DecodeError::malformed(offset, "expected '=' after attribute name"));
        }
        self.input.next(reader)?;
        let offset = self.input.offset();
        let quote = match self.input.peek_non_blank(reader)? {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(DecodeError::malformed(offset, "expected quoted attribute value")),
        };
        self.input.next(reader)?;
        scratch.value.clear();
        loop {
            match self.input.expect(reader, "unterminated attribute value")? {
                b if b == quote => return Ok(()),
                b'&' => self.entity(reader, &mut scratch.value)?,
                b => scratch.value.push(b)?,
            }
        }
    }
}

fn numeric(digits: &[u8], radix: u32) -> Option<char> {
    let digits = core::str::from_utf8(digits).ok()?;
    let code = u32::from_str_radix(digits, radix).ok()?;
    Some(char::from_u32(code).unwrap_or('?'))
}

impl Tokenizer for XmlTokenizer {
    fn read(&mut self, reader: &mut dyn Reader, scratch: &mut Scratch, visitor: &mut dyn Visitor) -> Result<(), DecodeError> {
        self.tags.clear();
        self.pending = false;
        self.skip.reset();
        loop {
            match self.input.next(reader)? {
                Some(b'<') => self.markup(reader, scratch, visitor)?,
                Some(b) => self.text(b, reader, scratch)?,
                None if self.tags.is_empty() => return Ok(()),
                None => return Err(DecodeError::malformed(self.input.offset(), "unclosed element")),
            }
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.tags.clear();
        self.pending = false;
        self.skip.reset();
    }
}
