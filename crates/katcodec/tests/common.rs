#![allow(missing_docs)]
#![allow(dead_code)]

use core::fmt::Write;

use katcodec::{Codec, CodecOptions, TypeInfo, TypeRef, TypeRegistry, Value};

pub const USER_KAT: &str = "User{i:id(1)s:name(kraity)}";
pub const USER_JSON: &str = r#"{"id": 1, "name": "kraity"}"#;
pub const USER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<User>
    <id>1</id>
    <name>kraity</name>
</User>
"#;

pub const ORDER_KAT: &str = "
Order{
    i:id(7)
    User:buyer{i:id(1)s:name(kraity)}
    L:tags{s(new)s(gift)}
    d:total(19.5)
    b:paid(true)
    L:lines{
        Line{s:sku(A-1)i:qty(2)}
        Line{s:sku(B-2)i:qty(1)}
    }
    T:point{i(3)i(4)}
    B:blob(010B6F)
    s:note(a^)b^^c^sd)
    M:extra{s:gift(yes)i:priority(2)}
}";

fn s() -> TypeRef {
    TypeRef::named("s")
}

fn i() -> TypeRef {
    TypeRef::named("i")
}

/// Built-ins plus a small order domain and a generic hierarchy:
///
/// ```text
/// Box<T>            { value: T }
/// IntBox  : Box<i>
/// Tagged<K>         (interface) { tag: K }
/// Label   : Box<s>, Tagged<i>
/// ```
pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::with_builtins();
    registry
        .register_record("User", [("id", i()), ("name", s())])
        .register_record("Line", [("sku", s()), ("qty", i())])
        .register_record(
            "Order",
            [
                ("id", i()),
                ("buyer", TypeRef::named("User")),
                ("tags", TypeRef::generic("L", [s()])),
                ("total", TypeRef::named("d")),
                ("paid", TypeRef::named("b")),
                ("lines", TypeRef::generic("L", [TypeRef::named("Line")])),
                ("point", TypeRef::generic("T", [i(), i()])),
                ("blob", TypeRef::named("B")),
                ("note", s()),
                ("extra", TypeRef::generic("M", [s(), TypeRef::Any])),
            ],
        )
        .register_record("Box", [("value", TypeRef::var("Box", 0))])
        .register_record("IntBox", [("value", TypeRef::var("Box", 0))])
        .register_record(
            "Label",
            [("value", TypeRef::var("Box", 0)), ("tag", TypeRef::var("Tagged", 0))],
        )
        .register_type(TypeInfo::new("Box"))
        .register_type(TypeInfo::new("Tagged").interface())
        .register_type(TypeInfo::new("IntBox").extends(TypeRef::generic("Box", [i()])))
        .register_type(
            TypeInfo::new("Label")
                .extends(TypeRef::generic("Box", [s()]))
                .implements(TypeRef::generic("Tagged", [i()])),
        );
    registry
}

pub fn codec() -> Codec {
    let options = CodecOptions {
        input_window: 7,
        ..CodecOptions::default()
    };
    Codec::new(options, registry()).unwrap()
}

/// Compact, ordering-stable rendering for snapshots.
pub fn render(value: &Value) -> String {
    fn join<'a>(out: &mut String, items: impl Iterator<Item = (Option<&'a str>, &'a Value)>) {
        for (n, (key, value)) in items.enumerate() {
            if n > 0 {
                out.push_str(", ");
            }
            if let Some(key) = key {
                write!(out, "{key}: ").unwrap();
            }
            node(out, value);
        }
    }

    fn node(out: &mut String, value: &Value) {
        match value {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => write!(out, "{b}").unwrap(),
            Value::Int(n) => write!(out, "{n}").unwrap(),
            Value::Float(f) => write!(out, "{f:?}").unwrap(),
            Value::Text(s) => write!(out, "{s:?}").unwrap(),
            Value::Bytes(b) => write!(out, "0x{}", hex::encode(b)).unwrap(),
            Value::List(items) => {
                out.push('[');
                join(out, items.iter().map(|v| (None, v)));
                out.push(']');
            }
            Value::Tuple(items) => {
                out.push('(');
                join(out, items.iter().map(|v| (None, v)));
                out.push(')');
            }
            Value::Record(record) => {
                write!(out, "{} {{", record.name).unwrap();
                if !record.fields.is_empty() {
                    out.push(' ');
                    join(out, record.fields.iter().map(|(k, v)| (Some(k.as_str()), v)));
                    out.push(' ');
                }
                out.push('}');
            }
            Value::Map(map) => {
                out.push('{');
                join(out, map.iter().map(|(k, v)| (Some(k.as_str()), v)));
                out.push('}');
            }
        }
    }

    let mut out = String::new();
    node(&mut out, value);
    out
}
