#![expect(missing_docs)]

mod common;

use katcodec::{Format, TypeRef};

use crate::common::{codec, render, ORDER_KAT, USER_JSON, USER_KAT, USER_XML};

#[test]
fn user_is_the_same_record_in_every_format() {
    let codec = codec();
    let target = || TypeRef::named("User");
    let kat = codec.decode_str(Format::Kat, USER_KAT, target()).unwrap();
    let json = codec.decode_str(Format::Json, USER_JSON, target()).unwrap();
    let xml = codec.decode_str(Format::Xml, USER_XML, target()).unwrap();

    assert_eq!(kat, json);
    assert_eq!(kat, xml);
    insta::assert_snapshot!(render(&kat), @r#"User { id: 1, name: "kraity" }"#);
}

#[test]
fn order_in_native_notation() {
    let order = codec()
        .decode_str(Format::Kat, ORDER_KAT, TypeRef::named("Order"))
        .unwrap();
    insta::assert_snapshot!(render(&order), @r#"Order { blob: 0x010b6f, buyer: User { id: 1, name: "kraity" }, extra: {gift: "yes", priority: 2}, id: 7, lines: [Line { qty: 2, sku: "A-1" }, Line { qty: 1, sku: "B-2" }], note: "a)b^c d", paid: true, point: (3, 4), tags: ["new", "gift"], total: 19.5 }"#);
}

#[test]
fn order_from_json_uses_declared_types() {
    let json = r#"{"id": 7, "point": [3, 4], "blob": "010B6F", "lines": [{"sku": "A-1", "qty": 2}], "paid": null}"#;
    let order = codec()
        .decode_str(Format::Json, json, TypeRef::named("Order"))
        .unwrap();
    insta::assert_snapshot!(render(&order), @r#"Order { blob: 0x010b6f, id: 7, lines: [Line { qty: 2, sku: "A-1" }], paid: null, point: (3, 4) }"#);
}

#[test]
fn order_from_xml_uses_declared_types() {
    let xml = r#"<Order id="7">
        <buyer id="1"><name>kraity</name></buyer>
        <tags><tag>new</tag><tag>gift</tag></tags>
        <total>19.5</total>
    </Order>"#;
    let order = codec()
        .decode_str(Format::Xml, xml, TypeRef::named("Order"))
        .unwrap();
    insta::assert_snapshot!(render(&order), @r#"Order { buyer: User { id: 1, name: "kraity" }, id: 7, tags: ["new", "gift"], total: 19.5 }"#);
}

#[test]
fn untyped_json() {
    let json = r#"{"name": "kraity", "tags": ["a", "b"], "score": 9.75, "active": false, "parent": null, "nested": {"n": -3}}"#;
    let value = codec().decode_str(Format::Json, json, TypeRef::Any).unwrap();
    insta::assert_snapshot!(render(&value), @r#"{active: false, name: "kraity", nested: {n: -3}, parent: null, score: 9.75, tags: ["a", "b"]}"#);
}

#[test]
fn untyped_xml() {
    let xml = r#"<order id="7" state="open"><!-- note --><item sku="A-1" qty="2"/><memo>fish &amp; chips</memo><empty/></order>"#;
    let value = codec().decode_str(Format::Xml, xml, TypeRef::Any).unwrap();
    insta::assert_snapshot!(render(&value), @r#"{empty: "", id: "7", item: {qty: "2", sku: "A-1"}, memo: "fish & chips", state: "open"}"#);
}
