//! Benchmark – `katcodec::Codec` across formats and reader chunk sizes
#![allow(missing_docs)]

use std::{fmt::Write, io, time::Duration};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use katcodec::{Codec, CodecOptions, Format, Reader, TypeRef, TypeRegistry};

/// A deterministic list of `n` users rendered in the given format.
fn make_payload(format: Format, n: usize) -> String {
    let mut s = String::new();
    match format {
        Format::Kat => {
            s.push_str("L{");
            for i in 0..n {
                write!(s, "User{{i:id({i})s:name(user^s{i})}}").unwrap();
            }
            s.push('}');
        }
        Format::Json => {
            s.push('[');
            for i in 0..n {
                if i > 0 {
                    s.push(',');
                }
                write!(s, r#"{{"id":{i},"name":"user {i}"}}"#).unwrap();
            }
            s.push(']');
        }
        Format::Xml => {
            s.push_str("<users>");
            for i in 0..n {
                write!(s, "<User><id>{i}</id><name>user {i}</name></User>").unwrap();
            }
            s.push_str("</users>");
        }
    }
    s
}

/// Hands out the payload `chunk` bytes at a time.
struct Chunks<'a> {
    data: &'a [u8],
    chunk: usize,
}

impl Reader for Chunks<'_> {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.chunk.min(buf.len()).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }

    fn close(&mut self) {
        self.data = &[];
    }
}

fn codec() -> Codec {
    let mut registry = TypeRegistry::with_builtins();
    registry.register_record("User", [("id", TypeRef::named("i")), ("name", TypeRef::named("s"))]);
    Codec::new(CodecOptions::default(), registry).unwrap()
}

fn bench_decode(c: &mut Criterion) {
    let codec = codec();
    let target = TypeRef::generic("L", [TypeRef::named("User")]);
    let mut group = c.benchmark_group("decode");

    for format in [Format::Kat, Format::Json, Format::Xml] {
        let payload = make_payload(format, 1_000);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        for &chunk in &[16usize, 1_024, 65_536] {
            let name = format!("{format:?}").to_lowercase();
            group.bench_with_input(BenchmarkId::new(name, chunk), &chunk, |b, &chunk| {
                b.iter(|| {
                    let reader = Chunks {
                        data: black_box(payload.as_bytes()),
                        chunk,
                    };
                    black_box(codec.decode(format, reader, target.clone()).unwrap());
                });
            });
        }
    }
    group.finish();
}

fn criterion() -> Criterion {
    let mut c = Criterion::default();
    if cfg!(feature = "bench-fast") {
        c = c
            .warm_up_time(Duration::from_millis(10))
            .measurement_time(Duration::from_millis(100))
            .sample_size(10);
    } else {
        c = c
            .warm_up_time(Duration::from_secs(3))
            .measurement_time(Duration::from_secs(5));
    }
    c
}

criterion_group! { name = benches; config = criterion(); targets = bench_decode }
criterion_main!(benches);
