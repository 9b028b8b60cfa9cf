use std::sync::Arc;

use quickcheck::QuickCheck;

use super::{
    arbitrary::{to_json, to_kat},
    chunked::Chunked,
    property_roundtrip::tests,
};
use crate::{
    chain::BufferPool,
    options::BufferOptions,
    registry::TypeRegistry,
    tokenizer::Format,
    value::Value,
    worker::{Request, Worker},
};

/// Property: a document decodes to the same value however the reader
/// splits it, and its kat and JSON renderings decode identically.
#[test]
fn partition_roundtrip_quickcheck() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(value: Value, splits: Vec<usize>, window: u8) -> bool {
        let registry = TypeRegistry::with_builtins();
        let pool = Arc::new(BufferPool::new(&BufferOptions::default()).unwrap());
        let mut worker = Worker::new(pool, 1 + usize::from(window % 16));

        [(Format::Kat, to_kat(&value)), (Format::Json, to_json(&value))]
            .into_iter()
            .all(|(format, document)| {
                let request = Request::new()
                    .reader(Chunked::new(document.as_bytes(), &splits))
                    .registry(&registry);
                match worker.decode(format, request) {
                    Ok(decoded) => decoded == value,
                    Err(err) => panic!("{format:?} {document}: {err}"),
                }
            })
    }

    QuickCheck::new()
        .tests(tests())
        .quickcheck(prop as fn(Value, Vec<usize>, u8) -> bool);
}
