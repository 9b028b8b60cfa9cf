use std::sync::Arc;

use super::{hex4, Scratch, Skip, Tokenizer, Visitor};
use crate::{
    chain::{BufferPool, ByteChain},
    error::DecodeError,
    input::Input,
    reader::Reader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Value,
    FirstValue,
    FirstKey,
    Key,
    Next,
}

/// Position inside a number: `-? (0 | [1-9][0-9]*) (.[0-9]+)? ([eE][+-]?[0-9]+)?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Number {
    Sign,
    Zero,
    Int,
    Dot,
    Frac,
    Exp,
    ExpSign,
    ExpInt,
}

/// JSON lexer reporting the same events as the native notation.
///
/// | JSON          | event                |
/// |---------------|----------------------|
/// | object        | `open("M", key)`     |
/// | array         | `open("L", key)`     |
/// | string        | `emit("s", key, ..)` |
/// | integer       | `emit("i", key, ..)` |
/// | other number  | `emit("d", key, ..)` |
/// | `true`/`false`| `emit("b", key, ..)` |
/// | `null`        | `emit("$", key, "")` |
///
/// `key` is the member name inside objects and empty elsewhere.
#[derive(Debug)]
pub struct JsonTokenizer {
    input: Input,
    stack: Vec<Frame>,
    skip: Skip,
}

impl JsonTokenizer {
    #[must_use]
    pub fn new(pool: Arc<BufferPool>, window: usize) -> Self {
        Self {
            input: Input::new(pool, window),
            stack: Vec::new(),
            skip: Skip::default(),
        }
    }

    /// Reads a string body after the opening quote.
    fn string(&mut self, reader: &mut dyn Reader, out: &mut ByteChain) -> Result<(), DecodeError> {
        out.clear();
        let mut high: Option<u16> = None;
        loop {
            let offset = self.input.offset();
            let b = self.input.expect(reader, "unterminated string")?;
            if b == b'\\' {
                let escaped = self.input.expect(reader, "unterminated escape")?;
                if escaped == b'u' {
                    let unit = self.unit(reader, offset)?;
                    match (high.take(), unit) {
                        (Some(hi), 0xDC00..=0xDFFF) => {
                            let code = 0x10000 + ((u32::from(hi) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
                            out.push_char(char::from_u32(code).unwrap_or('?'))?;
                        }
                        (pending, 0xD800..=0xDBFF) => {
                            if pending.is_some() {
                                out.push(b'?')?;
                            }
                            high = Some(unit);
                        }
                        (pending, _) => {
                            if pending.is_some() {
                                out.push(b'?')?;
                            }
                            out.push_char(char::from_u32(u32::from(unit)).unwrap_or('?'))?;
                        }
                    }
                    continue;
                }
                if high.take().is_some() {
                    out.push(b'?')?;
                }
                let c = match escaped {
                    b'"' => b'"',
                    b'\\' => b'\\',
                    b'/' => b'/',
                    b'b' => 0x08,
                    b'f' => 0x0C,
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    _ => return Err(DecodeError::malformed(offset, "invalid escape")),
                };
                out.push(c)?;
                continue;
            }

            if high.take().is_some() {
                out.push(b'?')?;
            }
            match b {
                b'"' => return Ok(()),
                0x00..=0x1F => return Err(DecodeError::malformed(offset, "control character in string")),
                _ => out.push(b)?,
            }
        }
    }

    fn unit(&mut self, reader: &mut dyn Reader, offset: usize) -> Result<u16, DecodeError> {
        let mut digits = [0u8; 4];
        for d in &mut digits {
            *d = self.input.expect(reader, "unterminated unicode escape")?;
        }
        hex4(digits).ok_or(DecodeError::malformed(offset, "invalid unicode escape"))
    }

    /// Lexes a number whose first byte `first` was already consumed into
    /// `out` and returns whether it is an integer.
    fn number(&mut self, first: u8, reader: &mut dyn Reader, out: &mut ByteChain) -> Result<bool, DecodeError> {
        out.clear();
        out.push(first)?;
        let mut at = match first {
            b'-' => Number::Sign,
            b'0' => Number::Zero,
            _ => Number::Int,
        };
        let stop = loop {
            let Some(b) = self.input.peek(reader)? else { break None };
            let next = match (at, b) {
                (Number::Sign, b'0') => Number::Zero,
                (Number::Sign | Number::Int, b'0'..=b'9') => Number::Int,
                (Number::Zero | Number::Int, b'.') => Number::Dot,
                (Number::Dot | Number::Frac, b'0'..=b'9') => Number::Frac,
                (Number::Zero | Number::Int | Number::Frac, b'e' | b'E') => Number::Exp,
                (Number::Exp, b'+' | b'-') => Number::ExpSign,
                (Number::Exp | Number::ExpSign | Number::ExpInt, b'0'..=b'9') => Number::ExpInt,
                _ => break Some(b),
            };
            out.push(b)?;
            self.input.next(reader)?;
            at = next;
        };

        let offset = self.input.offset();
        if matches!(at, Number::Sign | Number::Dot | Number::Exp | Number::ExpSign) {
            return Err(DecodeError::malformed(offset, "incomplete number"));
        }
        if matches!(stop, Some(b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E')) {
            return Err(DecodeError::malformed(offset, "invalid number"));
        }
        Ok(matches!(at, Number::Zero | Number::Int))
    }

    fn literal(&mut self, reader: &mut dyn Reader, rest: &[u8]) -> Result<(), DecodeError> {
        for &expected in rest {
            let offset = self.input.offset();
            if self.input.expect(reader, "truncated literal")? != expected {
                return Err(DecodeError::malformed(offset, "invalid literal"));
            }
        }
        Ok(())
    }

    /// Lexes one value starting at `b` and reports it.
    fn value(
        &mut self,
        b: u8,
        reader: &mut dyn Reader,
        scratch: &mut Scratch,
        visitor: &mut dyn Visitor,
    ) -> Result<State, DecodeError> {
        let offset = self.input.offset();
        self.input.next(reader)?;
        match b {
            b'{' => {
                scratch.set_space(b"M")?;
                self.skip.open(scratch, visitor)?;
                self.stack.push(Frame::Object);
                return Ok(State::FirstKey);
            }
            b'[' => {
                scratch.set_space(b"L")?;
                self.skip.open(scratch, visitor)?;
                self.stack.push(Frame::Array);
                return Ok(State::FirstValue);
            }
            b'"' => {
                self.string(reader, &mut scratch.value)?;
                scratch.set_space(b"s")?;
            }
            b'-' | b'0'..=b'9' => {
                let integer = self.number(b, reader, &mut scratch.value)?;
                scratch.set_space(if integer { b"i" } else { b"d" })?;
            }
            b't' => {
                self.literal(reader, b"rue")?;
                scratch.value.clear();
                scratch.value.push_str("true")?;
                scratch.set_space(b"b")?;
            }
            b'f' => {
                self.literal(reader, b"alse")?;
                scratch.value.clear();
                scratch.value.push_str("false")?;
                scratch.set_space(b"b")?;
            }
            b'n' => {
                self.literal(reader, b"ull")?;
                scratch.value.clear();
                scratch.set_space(b"$")?;
            }
            _ => return Err(DecodeError::malformed(offset, "unexpected character")),
        }
        self.skip.emit(scratch, visitor)?;
        Ok(State::Next)
    }
}

impl Tokenizer for JsonTokenizer {
    fn read(&mut self, reader: &mut dyn Reader, scratch: &mut Scratch, visitor: &mut dyn Visitor) -> Result<(), DecodeError> {
        self.stack.clear();
        self.skip.reset();
        let mut state = State::Value;
        scratch.alias.clear();

        loop {
            let next = self.input.peek_non_blank(reader)?;
            let offset = self.input.offset();
            state = match state {
                State::Value => match next {
                    Some(b) => self.value(b, reader, scratch, visitor)?,
                    None if self.stack.is_empty() => return Ok(()),
                    None => return Err(DecodeError::malformed(offset, "unexpected end of input")),
                },
                State::FirstValue if next == Some(b']') => {
                    self.input.next(reader)?;
                    self.stack.pop();
                    self.skip.close(visitor)?;
                    State::Next
                }
                State::FirstValue => {
                    scratch.alias.clear();
                    State::Value
                }
                State::FirstKey if next == Some(b'}') => {
                    self.input.next(reader)?;
                    self.stack.pop();
                    self.skip.close(visitor)?;
                    State::Next
                }
                State::FirstKey | State::Key => {
                    if next != Some(b'"') {
                        return Err(DecodeError::malformed(offset, "expected member name"));
                    }
                    self.input.next(reader)?;
                    self.string(reader, &mut scratch.alias)?;
                    let colon = self.input.offset();
                    if self.input.peek_non_blank(reader)? != Some(b':') {
                        return Err(DecodeError::malformed(colon, "expected ':'"));
                    }
                    self.input.next(reader)?;
                    State::Value
                }
                State::Next => match (self.stack.last(), next) {
                    (None, _) => {
                        scratch.alias.clear();
                        State::Value
                    }
                    (Some(Frame::Object), Some(b',')) => {
                        self.input.next(reader)?;
                        State::Key
                    }
                    (Some(Frame::Array), Some(b',')) => {
                        self.input.next(reader)?;
                        scratch.alias.clear();
                        State::Value
                    }
                    (Some(Frame::Object), Some(b'}')) | (Some(Frame::Array), Some(b']')) => {
                        self.input.next(reader)?;
                        self.stack.pop();
                        self.skip.close(visitor)?;
                        State::Next
                    }
                    (Some(_), None) => return Err(DecodeError::malformed(offset, "unexpected end of input")),
                    (Some(_), Some(_)) => return Err(DecodeError::malformed(offset, "expected ',' or closing bracket")),
                },
            };
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.stack.clear();
        self.skip.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::testing::{pool, record};

    fn tokenizer() -> JsonTokenizer {
        JsonTokenizer::new(pool(), 3)
    }

    #[test]
    fn user_scenario() {
        let events = record(&mut tokenizer(), r#"{"id": 1, "name": "kraity"}"#, &[]).unwrap();
        assert_eq!(events, "open M:\nemit i:id=1\nemit s:name=kraity\nclose\n");
    }

    #[test]
    fn every_value_kind() {
        let input = r#"{"a":[1,-2.5e3,true,false,null,"x"],"o":{},"e":[]}"#;
        let events = record(&mut tokenizer(), input, &[]).unwrap();
        assert_eq!(
            events,
            "open M:\nopen L:a\nemit i:=1\nemit d:=-2.5e3\nemit b:=true\nemit b:=false\nemit $:=\nemit s:=x\nclose\nopen M:o\nclose\nopen L:e\nclose\nclose\n"
        );
    }

    #[test]
    fn escapes_and_surrogates() {
        let input = r#"["a\"b\\c\/\n", "\u00e9\ud83d\ude00", "\ud83dx", "\ude00"]"#;
        let events = record(&mut tokenizer(), input, &[]).unwrap();
        assert_eq!(events, "open L:\nemit s:=a\"b\\c/\n\nemit s:=é😀\nemit s:=?x\nemit s:=?\nclose\n");
    }

    #[test]
    fn declined_object_is_skipped() {
        let input = r#"{"skip":{"a":[1,{"b":2}]},"kept":3}"#;
        let events = record(&mut tokenizer(), input, &["skip"]).unwrap();
        assert_eq!(events, "open M:\nskip M:skip\nemit i:kept=3\nclose\n");
    }

    #[test]
    fn grammar_violations() {
        for input in [r#"{"a" 1}"#, r#"{"a":1"#, "[1 2]", "[1,]", "tru", r#""abc"#, r#"{1:2}"#, "]", r#""\x""#] {
            assert!(
                matches!(record(&mut tokenizer(), input, &[]), Err(DecodeError::MalformedInput { .. })),
                "{input}"
            );
        }
    }

    #[test]
    fn number_grammar_violations() {
        for input in ["1-2", "--", "-", "1.2.3e", "1.", "1.e5", "01", "-01", "1e", "1e+", "2E-x", ".5", "+1", r#"{"n":1-2}"#, "[0x1]"] {
            assert!(
                matches!(record(&mut tokenizer(), input, &[]), Err(DecodeError::MalformedInput { .. })),
                "{input}"
            );
        }
    }

    #[test]
    fn numbers_follow_json_grammar() {
        let events = record(&mut tokenizer(), "[0,-0,10,-7,0.5,-1.25,1e9,2E+3,3e-2,0.0e0]", &[]).unwrap();
        assert_eq!(
            events,
            "open L:\nemit i:=0\nemit i:=-0\nemit i:=10\nemit i:=-7\nemit d:=0.5\nemit d:=-1.25\nemit d:=1e9\nemit d:=2E+3\nemit d:=3e-2\nemit d:=0.0e0\nclose\n"
        );
    }

    #[test]
    fn malformed_number_points_at_offending_byte() {
        let err = record(&mut tokenizer(), "[1-2]", &[]).unwrap_err();
        assert_eq!(err.to_string(), "malformed input at byte 2: invalid number");
    }
}
