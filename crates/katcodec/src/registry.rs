//! Type adapters and the explicit registry they are looked up in.
//!
//! An [`Adapter`] knows how to turn one raw scalar into a [`Value`] and, for
//! composite types, which kind of builder node collects its children. The
//! [`TypeRegistry`] maps stable type keys (`"i"`, `"s"`, `"User"`, ...) to
//! adapters and keeps the [`TypeInfo`] hierarchy records used to bind
//! generic parameters.

use core::fmt;
use std::{collections::HashMap, sync::Arc};

use crate::{
    chain::ByteChain,
    error::DecodeError,
    node::NodeSpec,
    options::DecodeFlags,
    types::{TypeInfo, TypeRef},
    value::{Map, Record, Value},
};

/// Decoding strategy for one registered type.
pub trait Adapter: fmt::Debug + Send + Sync {
    /// Decodes one raw scalar.
    ///
    /// # Errors
    ///
    /// [`DecodeError::InvalidScalar`] when `raw` is not a valid rendering of
    /// the adapter's type.
    fn decode_scalar(&self, flags: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError>;

    /// Builder to collect a composite of this type declared as `declared`.
    /// `None` for types that only exist as scalars.
    fn builder_for(&self, declared: &TypeRef, registry: &dyn Registry) -> Option<NodeSpec> {
        let _ = (declared, registry);
        None
    }
}

/// Lookup capability consumed by the decoder.
pub trait Registry: Send + Sync {
    fn lookup(&self, key: &str) -> Option<Arc<dyn Adapter>>;

    fn type_info(&self, key: &str) -> Option<&TypeInfo>;
}

impl<R: Registry + ?Sized> Registry for Arc<R> {
    fn lookup(&self, key: &str) -> Option<Arc<dyn Adapter>> {
        (**self).lookup(key)
    }

    fn type_info(&self, key: &str) -> Option<&TypeInfo> {
        (**self).type_info(key)
    }
}

/// Registry populated by explicit registration.
///
/// # Examples
///
/// ```
/// use katcodec::{Registry, TypeRef, TypeRegistry};
///
/// let mut registry = TypeRegistry::with_builtins();
/// registry.register_record("User", [("id", TypeRef::named("i")), ("name", TypeRef::named("s"))]);
/// assert!(registry.lookup("User").is_some());
/// assert!(registry.lookup("Order").is_none());
/// ```
#[derive(Debug, Default)]
pub struct TypeRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
    types: HashMap<String, TypeInfo>,
}

impl TypeRegistry {
    /// Empty registry without even the scalar adapters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in adapters:
    ///
    /// | key         | adapter                         |
    /// |-------------|---------------------------------|
    /// | `$`         | any value, empty raw is null    |
    /// | `i`, `l`    | 64-bit integer                  |
    /// | `d`, `f`    | 64-bit float                    |
    /// | `b`         | boolean                         |
    /// | `s`         | text                            |
    /// | `B`         | hex-encoded bytes               |
    /// | `L`, `A`    | list of `args[0]`               |
    /// | `T`         | tuple of `args`                 |
    /// | `M`         | string-keyed map of `args[1]`   |
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let int: Arc<dyn Adapter> = Arc::new(IntAdapter);
        let float: Arc<dyn Adapter> = Arc::new(FloatAdapter);
        let list: Arc<dyn Adapter> = Arc::new(ListAdapter);
        registry.adapters.insert("$".into(), Arc::new(AnyAdapter));
        registry.adapters.insert("i".into(), int.clone());
        registry.adapters.insert("l".into(), int);
        registry.adapters.insert("d".into(), float.clone());
        registry.adapters.insert("f".into(), float);
        registry.adapters.insert("b".into(), Arc::new(BoolAdapter));
        registry.adapters.insert("s".into(), Arc::new(TextAdapter));
        registry.adapters.insert("B".into(), Arc::new(BytesAdapter));
        registry.adapters.insert("L".into(), list.clone());
        registry.adapters.insert("A".into(), list);
        registry.adapters.insert("T".into(), Arc::new(TupleAdapter));
        registry.adapters.insert("M".into(), Arc::new(MapAdapter));
        registry
    }

    /// Registers `adapter` under `key`, replacing any earlier registration.
    pub fn register(&mut self, key: impl Into<String>, adapter: Arc<dyn Adapter>) -> &mut Self {
        self.adapters.insert(key.into(), adapter);
        self
    }

    /// Registers a record type with its declared fields.
    pub fn register_record<K, F>(&mut self, name: &str, fields: F) -> &mut Self
    where
        K: Into<String>,
        F: IntoIterator<Item = (K, TypeRef)>,
    {
        let adapter = RecordAdapter::new(name, fields);
        self.register(name, Arc::new(adapter))
    }

    /// Registers `name` as a single-value wrapper around `inner`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Configuration`] when `inner` has no adapter yet.
    pub fn register_newtype(&mut self, name: &str, inner: TypeRef) -> Result<&mut Self, DecodeError> {
        let Some(adapter) = inner.key().and_then(|key| self.lookup(key)) else {
            return Err(DecodeError::Configuration("newtype wraps an unregistered type"));
        };
        Ok(self.register(name, Arc::new(NewtypeAdapter { inner, adapter })))
    }

    /// Adds the hierarchy record used to bind type variables.
    pub fn register_type(&mut self, info: TypeInfo) -> &mut Self {
        self.types.insert(info.key.clone(), info);
        self
    }
}

impl Registry for TypeRegistry {
    fn lookup(&self, key: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(key).cloned()
    }

    fn type_info(&self, key: &str) -> Option<&TypeInfo> {
        self.types.get(key)
    }
}

/// Untyped slot: scalars become text, composites become maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyAdapter;

impl Adapter for AnyAdapter {
    fn decode_scalar(&self, _: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError> {
        if raw.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(Value::Text(raw.to_string_lossy().into_owned()))
        }
    }

    fn builder_for(&self, _: &TypeRef, _: &dyn Registry) -> Option<NodeSpec> {
        Some(NodeSpec::Map { value: TypeRef::Any })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntAdapter;

impl Adapter for IntAdapter {
    fn decode_scalar(&self, _: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError> {
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        raw.parse_int().map(Value::Int)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatAdapter;

impl Adapter for FloatAdapter {
    fn decode_scalar(&self, _: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError> {
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        raw.parse_float().map(Value::Float)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolAdapter;

impl Adapter for BoolAdapter {
    fn decode_scalar(&self, _: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError> {
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        raw.parse_bool().map(Value::Bool)
    }
}

/// Text; invalid UTF-8 decodes to U+FFFD rather than failing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextAdapter;

impl Adapter for TextAdapter {
    fn decode_scalar(&self, _: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError> {
        Ok(Value::Text(raw.to_string_lossy().into_owned()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BytesAdapter;

impl Adapter for BytesAdapter {
    fn decode_scalar(&self, _: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError> {
        let digits = raw.as_bytes();
        if digits.len() % 2 != 0 {
            return Err(DecodeError::invalid_scalar("hex bytes", digits));
        }
        digits
            .chunks_exact(2)
            .map(|pair| match (nibble(pair[0]), nibble(pair[1])) {
                (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
                _ => Err(DecodeError::invalid_scalar("hex bytes", digits)),
            })
            .collect::<Result<Vec<u8>, _>>()
            .map(Value::Bytes)
    }
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Empty raw values stand for the empty composite; anything else is not a
/// valid scalar rendering of one.
fn empty_composite(raw: &ByteChain, expected: &'static str, empty: Value) -> Result<Value, DecodeError> {
    if raw.is_empty() {
        Ok(empty)
    } else {
        Err(DecodeError::invalid_scalar(expected, raw.as_bytes()))
    }
}

/// Growable homogeneous sequence of `args[0]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListAdapter;

impl Adapter for ListAdapter {
    fn decode_scalar(&self, _: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError> {
        empty_composite(raw, "list", Value::List(Vec::new()))
    }

    fn builder_for(&self, declared: &TypeRef, _: &dyn Registry) -> Option<NodeSpec> {
        Some(NodeSpec::List {
            element: declared.arg(0).cloned().unwrap_or(TypeRef::Any),
        })
    }
}

/// Fixed-arity sequence; one slot per type argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct TupleAdapter;

impl Adapter for TupleAdapter {
    fn decode_scalar(&self, _: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError> {
        empty_composite(raw, "tuple", Value::Tuple(Vec::new()))
    }

    fn builder_for(&self, declared: &TypeRef, _: &dyn Registry) -> Option<NodeSpec> {
        Some(NodeSpec::Tuple {
            slots: declared.args().to_vec(),
        })
    }
}

/// Open record keyed by alias, values typed by `args[1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapAdapter;

impl Adapter for MapAdapter {
    fn decode_scalar(&self, _: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError> {
        empty_composite(raw, "map", Value::Map(Map::new()))
    }

    fn builder_for(&self, declared: &TypeRef, _: &dyn Registry) -> Option<NodeSpec> {
        Some(NodeSpec::Map {
            value: declared.arg(1).cloned().unwrap_or(TypeRef::Any),
        })
    }
}

/// Named record with declared fields.
#[derive(Debug, Clone)]
pub struct RecordAdapter {
    name: String,
    fields: Arc<[(String, TypeRef)]>,
}

impl RecordAdapter {
    pub fn new<K, F>(name: &str, fields: F) -> Self
    where
        K: Into<String>,
        F: IntoIterator<Item = (K, TypeRef)>,
    {
        Self {
            name: name.to_owned(),
            fields: fields.into_iter().map(|(k, t)| (k.into(), t)).collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Adapter for RecordAdapter {
    fn decode_scalar(&self, _: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError> {
        empty_composite(raw, "record", Value::Record(Record::new(self.name.as_str())))
    }

    fn builder_for(&self, _: &TypeRef, _: &dyn Registry) -> Option<NodeSpec> {
        Some(NodeSpec::Record {
            name: self.name.clone(),
            fields: self.fields.clone(),
        })
    }
}

/// Single-value wrapper: decodes like its inner type, and as a composite
/// keeps only the last value emitted into it.
#[derive(Debug, Clone)]
pub struct NewtypeAdapter {
    inner: TypeRef,
    adapter: Arc<dyn Adapter>,
}

impl Adapter for NewtypeAdapter {
    fn decode_scalar(&self, flags: DecodeFlags, raw: &ByteChain) -> Result<Value, DecodeError> {
        self.adapter.decode_scalar(flags, raw)
    }

    fn builder_for(&self, _: &TypeRef, _: &dyn Registry) -> Option<NodeSpec> {
        Some(NodeSpec::Scalar {
            inner: self.inner.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn decode(key: &str, raw: &str) -> Result<Value, DecodeError> {
        let registry = TypeRegistry::with_builtins();
        let adapter = registry.lookup(key).unwrap();
        adapter.decode_scalar(DecodeFlags::default(), &ByteChain::from(raw))
    }

    #[rstest]
    #[case("i", "1", Value::Int(1))]
    #[case("l", "-9223372036854775808", Value::Int(i64::MIN))]
    #[case("d", "2.5", Value::Float(2.5))]
    #[case("b", "true", Value::Bool(true))]
    #[case("s", "kraity", Value::from("kraity"))]
    #[case("s", "", Value::from(""))]
    #[case("$", "", Value::Null)]
    #[case("$", "kat", Value::from("kat"))]
    #[case("i", "", Value::Null)]
    #[case("B", "010b6F", Value::Bytes(vec![1, 11, 111]))]
    #[case("L", "", Value::List(vec![]))]
    fn builtin_scalars(#[case] key: &str, #[case] raw: &str, #[case] expected: Value) {
        assert_eq!(decode(key, raw).unwrap(), expected);
    }

    #[rstest]
    #[case("i", "one")]
    #[case("b", "yes")]
    #[case("B", "0g")]
    #[case("M", "x")]
    fn invalid_scalars(#[case] key: &str, #[case] raw: &str) {
        assert!(matches!(decode(key, raw), Err(DecodeError::InvalidScalar { .. })));
    }

    #[test]
    fn builders_follow_declared_arguments() {
        let registry = TypeRegistry::with_builtins();
        let list = registry.lookup("L").unwrap();
        assert_eq!(
            list.builder_for(&TypeRef::generic("L", [TypeRef::named("i")]), &registry),
            Some(NodeSpec::List { element: TypeRef::named("i") })
        );

        let tuple = registry.lookup("T").unwrap();
        let declared = TypeRef::generic("T", [TypeRef::named("i"), TypeRef::named("s")]);
        assert_eq!(
            tuple.builder_for(&declared, &registry),
            Some(NodeSpec::Tuple { slots: vec![TypeRef::named("i"), TypeRef::named("s")] })
        );

        assert!(registry.lookup("i").unwrap().builder_for(&TypeRef::named("i"), &registry).is_none());
    }

    #[test]
    fn newtype_requires_registered_inner() {
        let mut registry = TypeRegistry::with_builtins();
        assert!(registry.register_newtype("Id", TypeRef::named("i")).is_ok());
        assert!(registry.register_newtype("Ghost", TypeRef::named("Nope")).is_err());
        let id = registry.lookup("Id").unwrap();
        assert_eq!(id.decode_scalar(DecodeFlags::default(), &ByteChain::from("7")).unwrap(), Value::Int(7));
    }
}
