//! Encode/decode agreement across the three encodings.

mod common;

use common::{assert_points_eq, cfg, create_points, TestPointBuilder, T0};
use ingest_point::codec::{json, lineproto, protobuf};
use ingest_point::{Encoding, KVs, Point, Precision, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn test_line_protocol_round_trip() {
    common::init_tracing();
    let pts = create_points(20, Encoding::LineProtocol);
    let text: Vec<String> = pts.iter().map(Point::line_proto).collect();

    let decoded = lineproto::decode(&text.join("\n"), Precision::Ns, &cfg(Encoding::LineProtocol)).unwrap();
    assert_points_eq(&decoded, &pts);

    let again: Vec<String> = decoded.iter().map(Point::line_proto).collect();
    assert_eq!(again, text);
}

#[test]
fn test_protobuf_round_trip() {
    let pts = create_points(20, Encoding::Protobuf);
    let data = protobuf::marshal_batch(&pts);

    let decoded = protobuf::decode_batch(&data, &cfg(Encoding::Protobuf)).unwrap();
    assert_points_eq(&decoded, &pts);
    for (d, p) in decoded.iter().zip(&pts) {
        assert_eq!(d.pretty(), p.pretty());
    }
}

#[test]
fn test_json_round_trip_both_shapes() {
    for encoding in [Encoding::Json, Encoding::Protobuf] {
        let pts = create_points(5, encoding);
        let data = json::marshal_batch(&pts).unwrap();

        let decoded = json::decode(&data, &cfg(encoding)).unwrap();
        assert_points_eq(&decoded, &pts);
    }
}

#[test]
fn test_protobuf_shape_json_writes_integers_as_strings() {
    let pt = TestPointBuilder::new(3).build(Encoding::Protobuf);
    let doc: serde_json::Value = serde_json::from_slice(&json::marshal(&pt).unwrap()).unwrap();
    assert_eq!(doc["time"], serde_json::Value::String(T0.to_string()));

    let pt = TestPointBuilder::new(3).build(Encoding::Json);
    let doc: serde_json::Value = serde_json::from_slice(&json::marshal(&pt).unwrap()).unwrap();
    assert_eq!(doc["time"], serde_json::json!(T0));
}

#[test]
fn test_cross_encoding_agreement() {
    let pt = TestPointBuilder::new(7).with_string().extra_tags(3).build(Encoding::LineProtocol);

    let from_lp = lineproto::decode(&pt.line_proto(), Precision::Ns, &cfg(Encoding::LineProtocol)).unwrap();
    let from_pb = protobuf::decode_batch(&protobuf::marshal_batch(&[pt.clone()]), &cfg(Encoding::LineProtocol)).unwrap();
    let from_json = json::decode(&json::marshal(&pt).unwrap(), &cfg(Encoding::LineProtocol)).unwrap();

    assert_eq!(from_lp[0].line_proto(), pt.line_proto());
    assert_eq!(from_pb[0].line_proto(), pt.line_proto());
    assert_eq!(from_json[0].line_proto(), pt.line_proto());
}

#[test]
fn test_precision_scaling() {
    let pt = TestPointBuilder::new(1).build(Encoding::LineProtocol);
    let text = pt.line_proto_with(Precision::S);
    assert!(text.ends_with(" 1700000000"), "{}", text);

    let decoded = lineproto::decode(&text, Precision::S, &cfg(Encoding::LineProtocol)).unwrap();
    assert_eq!(decoded[0].time(), T0);
}

#[test]
fn test_simple_producer_json() {
    let data = br#"{"measurement": "disk", "tags": {"dev": "sda"}, "fields": {"free": 12, "pct": 0.5, "ro": false, "big": 18446744073709551615}, "time": 5}"#;
    let pts = json::decode(data, &cfg(Encoding::Json)).unwrap();

    assert_eq!(pts[0].name(), "disk");
    assert_eq!(pts[0].time(), 5);
    assert_eq!(pts[0].get_tag("dev"), Some("sda"));
    assert_eq!(pts[0].get("free"), Some(&Value::Int(12)));
    assert_eq!(pts[0].get("pct"), Some(&Value::Float(0.5)));
    assert_eq!(pts[0].get("ro"), Some(&Value::Bool(false)));
    assert_eq!(pts[0].get("big"), Some(&Value::Uint(u64::MAX)));
}

proptest! {
    #[test]
    fn prop_line_protocol_escapes_survive(
        tag in "[a-z][a-z ,=]{0,10}",
        text in "[a-z ,=\"]{0,12}",
        n in any::<i64>(),
    ) {
        let pt = Point::new(
            "m e,x",
            KVs::new().add_tag("t k", tag).add_field("f=s", text).add_field("n", n),
            &cfg(Encoding::LineProtocol),
        );
        let decoded = lineproto::decode(&pt.line_proto(), Precision::Ns, &cfg(Encoding::LineProtocol)).unwrap();
        prop_assert_eq!(decoded.len(), 1);
        prop_assert!(decoded[0].equal(&pt), "{}", decoded[0].pretty());
    }
}
