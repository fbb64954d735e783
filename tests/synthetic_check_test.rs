//! Points built the way a synthetic monitor reports check results, then
//! shipped through pooled encoders.

mod common;

use common::T0;
use ingest_point::{get_decoder, get_encoder, Cfg, CfgBuilder, DecoderOptions, EncoderOptions, Encoding, KVs, Point, Value};
use pretty_assertions::assert_eq;

struct CheckResult<'a> {
    name: &'a str,
    protocol: &'a str,
    method: &'a str,
    success: bool,
    response_time_us: i64,
    message: &'a str,
    fail_reason: &'a str,
}

fn to_point(r: &CheckResult<'_>, cfg: &Cfg) -> Point {
    let status = if r.success { "OK" } else { "FAIL" };
    let mut kvs = KVs::new()
        .add_tag("host", "monitor-01")
        .add_tag("name", r.name)
        .add_tag("status", status)
        .add_tag("protocol", r.protocol)
        .add_tag("method", r.method)
        .add_field("success", if r.success { 1 } else { -1 })
        .add_field("response_time", r.response_time_us)
        .add_field("message", r.message);
    if !r.fail_reason.is_empty() {
        kvs = kvs.add_field("fail_reason", r.fail_reason);
    }
    Point::new("http_dial_testing", kvs, cfg)
}

fn results() -> Vec<CheckResult<'static>> {
    vec![
        CheckResult {
            name: "homepage",
            protocol: "https",
            method: "GET",
            success: true,
            response_time_us: 12_345,
            message: "{\"status_code\": 200}",
            fail_reason: "",
        },
        CheckResult {
            name: "login api",
            protocol: "https",
            method: "POST",
            success: false,
            response_time_us: 30_000_000,
            message: "timeout\nafter 30s",
            fail_reason: "context deadline exceeded",
        },
    ]
}

#[test]
fn test_check_results_encode_per_region() {
    common::init_tracing();
    let cfg = CfgBuilder::new().time(T0).extra_tag("region", "eu-west").build().unwrap();
    let pts: Vec<Point> = results().iter().map(|r| to_point(r, &cfg)).collect();

    for p in &pts {
        assert!(p.warns().is_empty(), "{:?}", p.warns());
        assert_eq!(p.get_tag("region"), Some("eu-west"));
    }
    assert_eq!(
        pts[0].line_proto(),
        "http_dial_testing,host=monitor-01,method=GET,name=homepage,protocol=https,region=eu-west,status=OK \
         message=\"{\\\"status_code\\\": 200}\",response_time=12345i,success=1i 1700000000000000000"
    );

    for encoding in [Encoding::LineProtocol, Encoding::Protobuf, Encoding::Json] {
        let batches = {
            let mut enc = get_encoder(EncoderOptions::new(encoding).bytes_size(4096));
            enc.encode(&pts).unwrap()
        };
        assert_eq!(batches.len(), 1);

        let mut dec = get_decoder(DecoderOptions::new(encoding));
        let back = dec.decode(&batches[0]).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].get("fail_reason"), Some(&Value::Str("context deadline exceeded".into())));
        assert_eq!(back[1].get("message"), Some(&Value::Str("timeout\nafter 30s".into())));
        assert_eq!(back[1].get_tag("name"), Some("login api"));
    }
}

#[test]
fn test_metric_preset_drops_text_fields() {
    let cfg = CfgBuilder::from_cfg(Cfg::metric()).time(T0).build().unwrap();
    let pt = to_point(&results()[1], &cfg);

    assert!(pt.get("message").is_none());
    assert!(pt.get("fail_reason").is_none());
    assert_eq!(pt.get("success"), Some(&Value::Int(-1)));
    assert_eq!(pt.warns().len(), 2);
}
