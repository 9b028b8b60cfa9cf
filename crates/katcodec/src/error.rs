use thiserror::Error;

/// Everything that can abort a decode.
///
/// ```text
///   DecodeError
///   ├── Configuration        ← request/options unusable (no reader, no registry, bad sizes)
///   ├── CapacityExceeded     ← buffer or list growth past its ceiling
///   ├── UnresolvedType       ← type variable not bound anywhere in the hierarchy
///   ├── UnknownName          ← no adapter for a structural name (strict, or at the root)
///   ├── MalformedInput       ← tokenizer grammar violation
///   ├── EmptyResult          ← well-formed input that produced no root value
///   ├── ArityExceeded        ← more tuple elements than declared slots
///   ├── AlreadyBound         ← a builder node was bound twice
///   ├── InvalidScalar        ← an adapter rejected a raw scalar
///   ├── UnsupportedAlgorithm ← unknown digest name
///   ├── OutOfRange           ← byte-range argument outside the chain
///   └── Io                   ← from the reader
/// ```
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("configuration error: {0}")]
    Configuration(&'static str),

    #[error("capacity exceeded: requested {requested} bytes, limit is {limit}")]
    CapacityExceeded { requested: usize, limit: usize },

    #[error("unresolved type variable {variable} from {scope}")]
    UnresolvedType { variable: String, scope: String },

    #[error("no adapter found for {alias}<{space}>")]
    UnknownName { space: String, alias: String },

    #[error("malformed input at byte {offset}: {reason}")]
    MalformedInput { offset: usize, reason: &'static str },

    #[error("input produced no value")]
    EmptyResult,

    #[error("the number of elements exceeds the declared arity {arity}")]
    ArityExceeded { arity: usize },

    #[error("builder node is already bound to a parent")]
    AlreadyBound,

    #[error("cannot decode {raw:?} as {expected}")]
    InvalidScalar { expected: &'static str, raw: String },

    #[error("unsupported digest algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("range {start}..{end} out of bounds for length {len}")]
    OutOfRange { start: usize, end: usize, len: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub(crate) fn unknown_name(space: &[u8], alias: &[u8]) -> Self {
        DecodeError::UnknownName {
            space: String::from_utf8_lossy(space).into_owned(),
            alias: String::from_utf8_lossy(alias).into_owned(),
        }
    }

    pub(crate) fn malformed(offset: usize, reason: &'static str) -> Self {
        DecodeError::MalformedInput { offset, reason }
    }

    pub(crate) fn invalid_scalar(expected: &'static str, raw: &[u8]) -> Self {
        DecodeError::InvalidScalar {
            expected,
            raw: String::from_utf8_lossy(raw).into_owned(),
        }
    }

    /// Returns `true` for errors produced by the reader rather than by the
    /// decoder itself.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, DecodeError::Io(_))
    }
}
