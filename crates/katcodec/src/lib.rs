//! Streaming, pool-backed decode core.
//!
//! A document in the compact kat notation (`User{i:id(1)s:name(kraity)}`),
//! JSON or XML is lexed into structural events by a [`Tokenizer`], and a
//! [`Cursor`] turns those events into a [`Value`] one [`NodeTree`] level at a
//! time, asking a [`Registry`] of [`Adapter`]s how every name decodes. Byte
//! storage comes from a size-classed [`BufferPool`] and whole decode
//! workers from an [`ObjectPool`], so steady-state decoding allocates little.
//!
//! ```rust
//! use katcodec::{Codec, CodecOptions, Format, TypeRef, TypeRegistry, Value};
//!
//! let mut registry = TypeRegistry::with_builtins();
//! registry.register_record("User", [("id", TypeRef::named("i")), ("name", TypeRef::named("s"))]);
//! let codec = Codec::new(CodecOptions::default(), registry).unwrap();
//!
//! let json = codec
//!     .decode_str(Format::Json, r#"{"id": 1, "name": "kraity"}"#, TypeRef::named("User"))
//!     .unwrap();
//! let kat = codec
//!     .decode_str(Format::Kat, "User{i:id(1)s:name(kraity)}", TypeRef::named("User"))
//!     .unwrap();
//! assert_eq!(json, kat);
//! assert_eq!(kat.get("id"), Some(&Value::Int(1)));
//! ```

#![allow(missing_docs)]

mod chain;
mod codec;
mod error;
mod input;
mod node;
mod options;
mod pool;
mod reader;
mod registry;
mod tokenizer;
mod types;
mod value;
mod worker;

#[cfg(test)]
mod tests;

pub use chain::{BufferPool, ByteChain};
pub use codec::Codec;
pub use error::DecodeError;
pub use node::{list, Cursor, NodeId, NodeSpec, NodeState, NodeTree, Resolver, Sink};
pub use options::{BufferOptions, CodecOptions, DecodeFlags, WorkerOptions};
pub use pool::{Lease, ObjectPool, Poolable};
pub use reader::{IoReader, Reader, SliceReader, Utf16Reader};
pub use registry::{
    Adapter, AnyAdapter, BoolAdapter, BytesAdapter, FloatAdapter, IntAdapter, ListAdapter, MapAdapter,
    NewtypeAdapter, RecordAdapter, Registry, TextAdapter, TupleAdapter, TypeRegistry,
};
pub use tokenizer::{Format, JsonTokenizer, KatTokenizer, Scratch, Tokenizer, Visitor, XmlTokenizer};
pub use types::{locate, TypeInfo, TypeRef};
pub use value::{List, Map, Record, Value};
pub use worker::{IntoReader, Request, Worker};
