use std::sync::Arc;

use super::{Scratch, Skip, Tokenizer, Visitor};
use crate::{chain::BufferPool, error::DecodeError, input::Input, reader::Reader};

/// Lexer for the native notation:
///
/// ```text
/// item  := space [':' alias] ( '(' value ')' | '{' item* '}' )
/// ```
///
/// Whitespace between items is ignored. Inside a value, `^` escapes the
/// next byte; `^n`, `^r`, `^t` and `^s` stand for LF, CR, TAB and space.
#[derive(Debug)]
pub struct KatTokenizer {
    input: Input,
}

impl KatTokenizer {
    #[must_use]
    pub fn new(pool: Arc<BufferPool>, window: usize) -> Self {
        Self {
            input: Input::new(pool, window),
        }
    }

    /// Reads `space[:alias]` up to the opening bracket, which is returned.
    fn head(&mut self, reader: &mut dyn Reader, scratch: &mut Scratch) -> Result<u8, DecodeError> {
        scratch.space.clear();
        scratch.alias.clear();
        let mut in_alias = false;
        loop {
            let offset = self.input.offset();
            let b = self.input.expect(reader, "unexpected end of input in item name")?;
            match b {
                b'(' | b'{' => return Ok(b),
                b':' if !in_alias => in_alias = true,
                b':' | b')' | b'}' => return Err(DecodeError::malformed(offset, "unexpected delimiter in item name")),
                b if b.is_ascii_whitespace() => {
                    return Err(DecodeError::malformed(offset, "whitespace in item name"));
                }
                b if in_alias => scratch.alias.push(b)?,
                b => scratch.space.push(b)?,
            }
        }
    }

    /// Reads a value body after `(` through the closing `)`.
    fn value(&mut self, reader: &mut dyn Reader, scratch: &mut Scratch) -> Result<(), DecodeError> {
        scratch.value.clear();
        loop {
            match self.input.expect(reader, "unterminated value")? {
                b')' => return Ok(()),
                b'^' => {
                    let escaped = match self.input.expect(reader, "dangling escape")? {
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b's' => b' ',
                        other => other,
                    };
                    scratch.value.push(escaped)?;
                }
                b => scratch.value.push(b)?,
            }
        }
    }
}

impl Tokenizer for KatTokenizer {
    fn read(&mut self, reader: &mut dyn Reader, scratch: &mut Scratch, visitor: &mut dyn Visitor) -> Result<(), DecodeError> {
        let mut depth = 0usize;
        let mut skip = Skip::default();
        loop {
            let offset = self.input.offset();
            match self.input.peek_non_blank(reader)? {
                None if depth == 0 => return Ok(()),
                None => return Err(DecodeError::malformed(offset, "unterminated composite")),
                Some(b'}') => {
                    self.input.next(reader)?;
                    if depth == 0 {
                        return Err(DecodeError::malformed(self.input.offset() - 1, "unbalanced '}'"));
                    }
                    depth -= 1;
                    skip.close(visitor)?;
                }
                Some(_) => {
                    if self.head(reader, scratch)? == b'(' {
                        self.value(reader, scratch)?;
                        skip.emit(scratch, visitor)?;
                    } else {
                        depth += 1;
                        skip.open(scratch, visitor)?;
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::testing::{pool, record};

    fn tokenizer() -> KatTokenizer {
        KatTokenizer::new(pool(), 4)
    }

    #[test]
    fn user_scenario() {
        let events = record(&mut tokenizer(), "User{i:id(1)s:name(kraity)}", &[]).unwrap();
        assert_eq!(events, "open User:\nemit i:id=1\nemit s:name=kraity\nclose\n");
    }

    #[test]
    fn nested_with_whitespace_and_escapes() {
        let input = "M{\n  s:note(a^)b^^c^nd^s)\n  L:tags{ s(x) s(y) }\n}";
        let events = record(&mut tokenizer(), input, &[]).unwrap();
        assert_eq!(
            events,
            "open M:\nemit s:note=a)b^c\nd \nopen L:tags\nemit s:=x\nemit s:=y\nclose\nclose\n"
        );
    }

    #[test]
    fn declined_subtree_is_skipped() {
        let input = "M{M:skip{s:a(1)M{s:b(2)}}s:kept(3)}";
        let events = record(&mut tokenizer(), input, &["skip"]).unwrap();
        assert_eq!(events, "open M:\nskip M:skip\nemit s:kept=3\nclose\n");
    }

    #[test]
    fn grammar_violations() {
        for input in ["User{i:id(1)", "User{}}", "s:name(kraity", "User i:id(1)", "User:a:b(1)", "x^"] {
            assert!(
                matches!(record(&mut tokenizer(), input, &[]), Err(DecodeError::MalformedInput { .. })),
                "{input}"
            );
        }
    }

    #[test]
    fn tokenizer_is_reusable_after_reset() {
        let mut tokenizer = tokenizer();
        assert!(record(&mut tokenizer, "M{", &[]).is_err());
        let events = record(&mut tokenizer, "$(ok)", &[]).unwrap();
        assert_eq!(events, "emit $:=ok\n");
    }
}
