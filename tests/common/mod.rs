//! Common test utilities and fixtures.

#![allow(dead_code)]

use ingest_point::{Cfg, CfgBuilder, Encoding, KVs, Point};
use std::sync::Once;

/// Fixed time used by fixtures: 2023-11-14T22:13:20Z
pub const T0: i64 = 1_700_000_000_000_000_000;

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn cfg(encoding: Encoding) -> Cfg {
    CfgBuilder::new().time(T0).encoding(encoding).build().unwrap()
}

/// Test fixture builder for points with sensible defaults.
pub struct TestPointBuilder {
    name: String,
    host: String,
    seq: i64,
    with_string: bool,
    extra_tags: usize,
    time: i64,
}

impl TestPointBuilder {
    pub fn new(seq: i64) -> Self {
        Self {
            name: "cpu".to_string(),
            host: "host-01".to_string(),
            seq,
            with_string: false,
            extra_tags: 0,
            time: T0,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn with_string(mut self) -> Self {
        self.with_string = true;
        self
    }

    pub fn extra_tags(mut self, n: usize) -> Self {
        self.extra_tags = n;
        self
    }

    pub fn time(mut self, ns: i64) -> Self {
        self.time = ns;
        self
    }

    pub fn build(self, encoding: Encoding) -> Point {
        let cfg = CfgBuilder::new().time(self.time).encoding(encoding).build().unwrap();

        let mut kvs = KVs::new()
            .add_tag("host", self.host)
            .add_field("seq", self.seq)
            .add_field("usage", self.seq as f64 / 4.0)
            .add_field("up", self.seq % 2 == 0);
        if self.with_string {
            kvs = kvs.add_field("msg", format!("request {} done", self.seq));
        }
        for i in 0..self.extra_tags {
            kvs = kvs.add_tag(format!("t{:02}", i), format!("v{}", i));
        }

        Point::new(&self.name, kvs, &cfg)
    }
}

/// `n` points with increasing sequence numbers
pub fn create_points(n: usize, encoding: Encoding) -> Vec<Point> {
    (0..n as i64)
        .map(|i| TestPointBuilder::new(i).with_string().build(encoding))
        .collect()
}

/// Assert two point lists match pairwise, ignoring warnings
pub fn assert_points_eq(got: &[Point], want: &[Point]) {
    assert_eq!(got.len(), want.len(), "point count");
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        if let Err(reason) = g.equal_with_reason(w) {
            panic!("point {} differs: {}\n got: {}\nwant: {}", i, reason, g.pretty(), w.pretty());
        }
    }
}
