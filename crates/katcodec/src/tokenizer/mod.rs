//! Format-specific lexers that turn reader bytes into structural events.
//!
//! Every tokenizer speaks the same event contract to a [`Visitor`]:
//!
//! - `open(space, alias)` when a composite starts; returning `false` asks
//!   the tokenizer to skip that composite's whole subtree (no events, no
//!   matching `close`);
//! - `emit(space, alias, value)` for one scalar;
//! - `close()` when the innermost open composite ends.
//!
//! The three byte strings are passed through the worker's [`Scratch`]
//! chains, which tokenizers reuse for every event.

mod json;
mod kat;
mod xml;

use std::sync::Arc;

pub use json::JsonTokenizer;
pub use kat::KatTokenizer;
pub use xml::XmlTokenizer;

use crate::{
    chain::{BufferPool, ByteChain},
    error::DecodeError,
    reader::Reader,
};

/// Receiver of structural events.
pub trait Visitor {
    /// # Errors
    ///
    /// Aborts the decode with the visitor's error.
    fn open(&mut self, space: &ByteChain, alias: &ByteChain) -> Result<bool, DecodeError>;

    /// # Errors
    ///
    /// Aborts the decode with the visitor's error.
    fn emit(&mut self, space: &ByteChain, alias: &ByteChain, value: &ByteChain) -> Result<(), DecodeError>;

    /// # Errors
    ///
    /// Aborts the decode with the visitor's error.
    fn close(&mut self) -> Result<(), DecodeError>;
}

/// A reusable lexer for one input format.
pub trait Tokenizer: Send {
    /// Reads `reader` to its end, reporting every event to `visitor`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::MalformedInput`] for grammar violations, plus any
    /// reader or visitor error.
    fn read(&mut self, reader: &mut dyn Reader, scratch: &mut Scratch, visitor: &mut dyn Visitor) -> Result<(), DecodeError>;

    /// Drops all per-decode state so the tokenizer can be reused.
    fn reset(&mut self);
}

/// Input formats a worker can decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(rename_all = "lowercase"))]
pub enum Format {
    /// The compact `Space:alias(value)` / `Space{...}` notation.
    #[default]
    Kat,
    Json,
    Xml,
}

impl core::str::FromStr for Format {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kat" => Ok(Format::Kat),
            "json" => Ok(Format::Json),
            "xml" => Ok(Format::Xml),
            _ => Err(DecodeError::Configuration("unknown format")),
        }
    }
}

/// The structural-name, property-alias and scalar-value chains shared by
/// every tokenizer of a worker.
#[derive(Debug)]
pub struct Scratch {
    pub space: ByteChain,
    pub alias: ByteChain,
    pub value: ByteChain,
}

impl Scratch {
    #[must_use]
    pub fn new(pool: &Arc<BufferPool>) -> Self {
        Self {
            space: ByteChain::pooled(pool.clone()),
            alias: ByteChain::pooled(pool.clone()),
            value: ByteChain::pooled(pool.clone()),
        }
    }

    /// Hands all three chains' storage back to the pool.
    pub fn release(&mut self) {
        self.space.release();
        self.alias.release();
        self.value.release();
    }

    /// Replaces `space` with a fixed name.
    pub(crate) fn set_space(&mut self, name: &[u8]) -> Result<(), DecodeError> {
        self.space.clear();
        self.space.extend_from_slice(name)
    }
}

/// Skip depth bookkeeping shared by the tokenizers: while positive, events
/// are swallowed instead of reported.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Skip {
    depth: usize,
}

impl Skip {
    /// Reports an open, or enters skipping when the visitor declines it.
    pub(crate) fn open(&mut self, scratch: &Scratch, visitor: &mut dyn Visitor) -> Result<(), DecodeError> {
        if self.depth > 0 {
            self.depth += 1;
        } else if !visitor.open(&scratch.space, &scratch.alias)? {
            tracing::debug!(
                target: "katcodec::tokenizer",
                space = %scratch.space,
                alias = %scratch.alias,
                "skipping subtree"
            );
            self.depth = 1;
        }
        Ok(())
    }

    pub(crate) fn emit(self, scratch: &Scratch, visitor: &mut dyn Visitor) -> Result<(), DecodeError> {
        if self.depth > 0 {
            Ok(())
        } else {
            visitor.emit(&scratch.space, &scratch.alias, &scratch.value)
        }
    }

    pub(crate) fn close(&mut self, visitor: &mut dyn Visitor) -> Result<(), DecodeError> {
        if self.depth > 0 {
            self.depth -= 1;
            Ok(())
        } else {
            visitor.close()
        }
    }

    pub(crate) fn reset(&mut self) {
        self.depth = 0;
    }
}

/// Decodes four hex digits of a `\u` escape.
pub(crate) fn hex4(digits: [u8; 4]) -> Option<u16> {
    digits.iter().try_fold(0u16, |acc, &d| {
        let n = match d {
            b'0'..=b'9' => d - b'0',
            b'a'..=b'f' => d - b'a' + 10,
            b'A'..=b'F' => d - b'A' + 10,
            _ => return None,
        };
        Some((acc << 4) | u16::from(n))
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names() {
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("kat".parse::<Format>().unwrap(), Format::Kat);
        assert!("yaml".parse::<Format>().is_err());
        assert_eq!(Format::default(), Format::Kat);
    }

    #[test]
    fn hex_digits() {
        assert_eq!(hex4(*b"00e9"), Some(0xE9));
        assert_eq!(hex4(*b"D83D"), Some(0xD83D));
        assert_eq!(hex4(*b"12g4"), None);
    }
}
