#![no_main]
use std::{cell::RefCell, io, sync::OnceLock};

use arbitrary::Arbitrary;
use katcodec::{
    Codec, CodecOptions, DecodeFlags, Format, Reader, SliceReader, TypeRef, TypeRegistry, WorkerOptions,
};
use libfuzzer_sys::{fuzz_mutator, fuzz_target, fuzzer_mutate};
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};
use serde_json::{Map, Value};

const HEADER: usize = 5; // 1 flag byte + 4-byte split seed

thread_local! {
    static RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

fn with_rng<F, R>(f: F) -> R
where
    F: FnOnce(&mut SmallRng) -> R,
{
    RNG.with(|cell| f(&mut cell.borrow_mut()))
}

/// Flags: bits 0-1 pick the format, bit 2 turns on strict decoding.
fn format(flags: u8) -> Format {
    match flags & 3 {
        1 => Format::Json,
        2 => Format::Xml,
        _ => Format::Kat,
    }
}

fn mutator(data: &mut [u8], size: usize, max_size: usize, seed: u32) -> usize {
    if size < HEADER || seed.is_multiple_of(10) {
        data[0] = with_rng(|rng| rng.next_u32() as u8 & 0x07);
        data[1..5].copy_from_slice(&with_rng(|rng| rng.next_u32().to_le_bytes()));
        let limit = max_size - HEADER;
        HEADER + append_document(&mut data[HEADER..], format(data[0]), size.max(HEADER + 1), limit)
    } else {
        fuzzer_mutate(data, size, max_size)
    }
}

fn append_document(data: &mut [u8], format: Format, size: usize, limit: usize) -> usize {
    let value = loop {
        let s = with_rng(|rng| rng.random_range(size / 2..size * 2).min(limit));
        let bytes: Vec<u8> = with_rng(|rng| (0..s).map(|_| rng.random::<u8>()).collect());
        if let Ok(value) = ArbitraryValue::arbitrary(&mut arbitrary::Unstructured::new(&bytes)) {
            break value;
        }
    };

    let rendered = match format {
        Format::Json => serde_json::to_string(&value.0).unwrap_or_default(),
        Format::Kat => to_kat("", &value.0),
        Format::Xml => to_xml("root", &value.0),
    };
    let len = rendered.len().min(limit);
    data[..len].copy_from_slice(&rendered.as_bytes()[..len]);
    len
}

fn to_kat(key: &str, value: &Value) -> String {
    let sep = if key.is_empty() { "" } else { ":" };
    let escape = |s: &str| s.replace('^', "^^").replace(')', "^)");
    match value {
        Value::Null => format!("${sep}{key}()"),
        Value::Bool(b) => format!("b{sep}{key}({b})"),
        Value::Number(n) if n.is_i64() => format!("i{sep}{key}({n})"),
        Value::Number(n) => format!("d{sep}{key}({n})"),
        Value::String(s) => format!("s{sep}{key}({})", escape(s)),
        Value::Array(items) => {
            let body: String = items.iter().map(|v| to_kat("", v)).collect();
            format!("L{sep}{key}{{{body}}}")
        }
        Value::Object(map) => {
            let body: String = map.iter().map(|(k, v)| to_kat(k, v)).collect();
            format!("M{sep}{key}{{{body}}}")
        }
    }
}

fn to_xml(tag: &str, value: &Value) -> String {
    let escape = |s: &str| s.replace('&', "&amp;").replace('<', "&lt;");
    match value {
        Value::Array(items) => {
            let body: String = items.iter().map(|v| to_xml("item", v)).collect();
            format!("<{tag}>{body}</{tag}>")
        }
        Value::Object(map) => {
            let body: String = map.iter().map(|(k, v)| to_xml(k, v)).collect();
            format!("<{tag}>{body}</{tag}>")
        }
        Value::String(s) => format!("<{tag}>{}</{tag}>", escape(s)),
        other => format!("<{tag}>{other}</{tag}>"),
    }
}

fuzz_mutator!(|data: &mut [u8], size: usize, max_size: usize, seed: u32| {
    mutator(data, size, max_size, seed)
});

#[derive(Debug)]
struct ArbitraryValue(Value);

impl<'a> Arbitrary<'a> for ArbitraryValue {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let value = match u.choose_index(21)? {
            0 => Value::Null,
            1 => Value::Bool(u.arbitrary()?),
            2 => Value::Number(i64::arbitrary(u)?.into()),
            3..=10 => Value::String(u.arbitrary()?),
            11..=15 => {
                let elems: Vec<ArbitraryValue> = u.arbitrary()?;
                Value::Array(elems.into_iter().map(|v| v.0).collect())
            }
            16..=20 => {
                let m: Vec<(String, ArbitraryValue)> = u.arbitrary()?;
                Value::Object(Map::from_iter(m.into_iter().map(|(k, v)| (k, v.0))))
            }
            _ => Err(arbitrary::Error::IncorrectFormat)?,
        };
        Ok(ArbitraryValue(value))
    }
}

/// Yields the input in chunks whose sizes are derived from a seed.
struct Split<'a> {
    data: &'a [u8],
    seed: u64,
}

impl Reader for Split<'_> {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.data.is_empty() {
            return Ok(0);
        }
        self.seed = self.seed.rotate_left(7) ^ 0x9E37_79B9_7F4A_7C15;
        let n = (1 + self.seed as usize % self.data.len()).min(buf.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }

    fn close(&mut self) {
        self.data = &[];
    }
}

fn codec() -> &'static Codec {
    static CODEC: OnceLock<Codec> = OnceLock::new();
    CODEC.get_or_init(|| {
        let options = CodecOptions {
            workers: WorkerOptions { size: 2, ..WorkerOptions::default() },
            input_window: 3,
            ..CodecOptions::default()
        };
        Codec::new(options, TypeRegistry::with_builtins()).unwrap()
    })
}

fn decode(data: &[u8]) {
    if data.len() < HEADER {
        return;
    }
    let flags = data[0];
    let seed = u64::from(u32::from_le_bytes(data[1..5].try_into().unwrap()));
    let input = &data[HEADER..];
    let decode_flags = DecodeFlags { strict: flags & 4 != 0 };
    let codec = codec();

    // Chunking must never change the outcome.
    let whole = codec.decode_with(format(flags), SliceReader::new(input), TypeRef::Any, decode_flags);
    let split = codec.decode_with(format(flags), Split { data: input, seed }, TypeRef::Any, decode_flags);
    match (&whole, &split) {
        (Ok(a), Ok(b)) => assert_eq!(a, b),
        (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
        _ => panic!("chunking changed the outcome: {whole:?} vs {split:?}"),
    }
    assert!(codec.workers().idle() <= 2);
}

fuzz_target!(|data: &[u8]| decode(data));
