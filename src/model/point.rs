//! The point: one named, timestamped telemetry event.

use super::field::Field;
use super::keys::Keys;
use super::kvs::KVs;
use super::value::Value;
use crate::check::Checker;
use crate::codec::{lineproto, protobuf};
use crate::core::string_intern::intern;
use crate::core::{Cfg, Encoding, PointError, Precision, Result};
use crate::pool::{self, PointPool};
use once_cell::sync::Lazy;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

static EMPTY_NAME: Lazy<Arc<str>> = Lazy::new(|| Arc::from(""));

/// Advisory record of a repair applied by the checker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warn {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "msg")]
    pub message: String,
}

impl Warn {
    pub fn new<K: Into<String>, M: Into<String>>(kind: K, message: M) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Free-form diagnostic payload; not part of a point's identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub info: String,
}

/// Point state bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointFlags(u8);

impl PointFlags {
    /// The checker has run since the last mutation
    pub const CHECKED: u8 = 1;
    /// Built for (or decoded from) protobuf; selects the typed JSON shape
    pub const PB_ENCODED: u8 = 1 << 1;
    /// u64 fields above `i64::MAX` are allowed on the wire
    pub const U64_FIELDS: u8 = 1 << 2;

    #[inline]
    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    #[inline]
    pub fn insert(&mut self, bit: u8) {
        self.0 |= bit;
    }

    #[inline]
    pub fn remove(&mut self, bit: u8) {
        self.0 &= !bit;
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }
}

/// A named, timestamped event with tags and fields.
#[derive(Debug, Clone)]
pub struct Point {
    pub(crate) name: Arc<str>,
    pub(crate) kvs: KVs,
    pub(crate) time: i64,
    pub(crate) warns: Vec<Warn>,
    pub(crate) debugs: Vec<DebugInfo>,
    pub(crate) flags: PointFlags,
}

impl Default for Point {
    fn default() -> Self {
        Self::empty()
    }
}

/// Current wall clock in nanoseconds
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

impl Point {
    /// A structurally empty point; what a pool hands out
    pub fn empty() -> Self {
        Point {
            name: Arc::clone(&EMPTY_NAME),
            kvs: KVs::new(),
            time: 0,
            warns: Vec::new(),
            debugs: Vec::new(),
            flags: PointFlags::default(),
        }
    }

    /// Build a point from a name and KVs. Uses the installed default pool,
    /// if any. Never fails: policy violations become warnings when
    /// `cfg.precheck` is set.
    pub fn new(name: &str, kvs: KVs, cfg: &Cfg) -> Self {
        let pool = pool::default_pool();
        Self::build(pool.as_deref().map(|b| &**b), name, kvs, cfg)
    }

    /// Like [`Point::new`] with an explicit pool
    pub fn with_pool(pool: &dyn PointPool, name: &str, kvs: KVs, cfg: &Cfg) -> Self {
        Self::build(Some(pool), name, kvs, cfg)
    }

    fn build(pool: Option<&dyn PointPool>, name: &str, kvs: KVs, cfg: &Cfg) -> Self {
        let mut pt = match pool {
            Some(p) => p.get(),
            None => Point::empty(),
        };

        pt.set_name(name);
        if pt.kvs.capacity() > 0 {
            for f in kvs.into_inner() {
                pt.kvs.push_raw(f);
            }
        } else {
            pt.kvs = kvs;
        }

        pt.finalize(cfg, cfg.time);
        pt
    }

    /// Legacy constructor from tag and field maps; a point without fields
    /// is rejected
    pub fn from_maps<N, T, F, TK, TV, FK, FV>(name: N, tags: T, fields: F, cfg: &Cfg) -> Result<Self>
    where
        N: AsRef<str>,
        T: IntoIterator<Item = (TK, TV)>,
        F: IntoIterator<Item = (FK, FV)>,
        TK: Into<String>,
        TV: Into<String>,
        FK: Into<String>,
        FV: Into<Value>,
    {
        let mut kvs = KVs::new();
        for (k, v) in fields {
            kvs.insert(Field::field(k, v), true);
        }
        if kvs.is_empty() {
            return Err(PointError::EmptyFields);
        }
        for (k, v) in tags {
            kvs.insert(Field::tag(k, v), true);
        }

        Ok(Self::new(name.as_ref(), kvs, cfg))
    }

    /// Apply time, ordering, flags and (optionally) the checker
    pub(crate) fn finalize(&mut self, cfg: &Cfg, time: Option<i64>) {
        self.time = time.unwrap_or_else(now_nanos);

        if cfg.key_sorted {
            self.kvs.sort();
        }
        if cfg.encoding == Encoding::Protobuf {
            self.flags.insert(PointFlags::PB_ENCODED);
        }
        if cfg.enable_u64_field {
            self.flags.insert(PointFlags::U64_FIELDS);
        }
        if cfg.precheck {
            Checker::new(cfg).check(self);
        }
    }

    /// Return to the structurally empty state keeping KV capacity
    pub(crate) fn reset(&mut self) {
        self.name = Arc::clone(&EMPTY_NAME);
        self.kvs.clear();
        self.time = 0;
        self.warns.clear();
        self.debugs.clear();
        self.flags = PointFlags::default();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        if &*self.name != name {
            self.name = intern(name);
            self.flags.remove(PointFlags::CHECKED);
        }
    }

    /// Time in nanoseconds
    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn set_time(&mut self, ns: i64) {
        self.time = ns;
        self.flags.remove(PointFlags::CHECKED);
    }

    pub fn kvs(&self) -> &KVs {
        &self.kvs
    }

    /// Mutable KV access; the point must be checked again afterwards
    pub fn kvs_mut(&mut self) -> &mut KVs {
        self.flags.remove(PointFlags::CHECKED);
        &mut self.kvs
    }

    pub fn warns(&self) -> &[Warn] {
        &self.warns
    }

    pub fn debugs(&self) -> &[DebugInfo] {
        &self.debugs
    }

    pub fn flags(&self) -> PointFlags {
        self.flags
    }

    pub fn is_checked(&self) -> bool {
        self.flags.contains(PointFlags::CHECKED)
    }

    pub(crate) fn add_warn(&mut self, kind: &str, message: String) {
        tracing::debug!(point = %self.name, kind, "{}", message);
        self.warns.push(Warn::new(kind, message));
    }

    pub fn add_debug<S: Into<String>>(&mut self, info: S) {
        self.debugs.push(DebugInfo { info: info.into() });
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.kvs.get(key).map(Field::value)
    }

    /// Tag value by key; `None` for missing keys and non-tag entries
    pub fn get_tag(&self, key: &str) -> Option<&str> {
        self.kvs
            .get(key)
            .filter(|f| f.is_tag())
            .and_then(|f| f.value().as_str())
    }

    pub fn tags(&self) -> impl Iterator<Item = &Field> {
        self.kvs.tags()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.kvs.fields()
    }

    /// Insert or overwrite a field
    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.kvs_mut().set(key, value, false);
    }

    /// Insert or overwrite a tag
    pub fn set_tag<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.kvs_mut().insert(Field::tag(key, value), true);
    }

    pub fn del(&mut self, key: &str) -> Option<Field> {
        self.kvs_mut().remove(key)
    }

    /// Schema descriptor
    pub fn keys(&self) -> Keys {
        self.kvs.keys()
    }

    /// Field-only map view
    pub fn influx_fields(&self) -> BTreeMap<&str, &Value> {
        self.kvs.influx_fields()
    }

    /// Series identity: measurement plus sorted tag pairs. Stable across
    /// processes and independent of field values.
    pub fn time_series_hash(&self) -> u64 {
        let mut tags: Vec<(&str, &str)> = self
            .kvs
            .tags()
            .map(|f| (f.key(), f.value().as_str().unwrap_or_default()))
            .collect();
        if !self.kvs.is_sorted() {
            tags.sort_unstable();
        }

        let mut h = FxHasher::default();
        self.name.hash(&mut h);
        for (k, v) in tags {
            k.hash(&mut h);
            v.hash(&mut h);
        }
        h.finish()
    }

    /// Deep equality ignoring KV order, warnings and debugs
    pub fn equal(&self, other: &Point) -> bool {
        self.equal_with_reason(other).is_ok()
    }

    /// Like [`Point::equal`] but says what differs
    pub fn equal_with_reason(&self, other: &Point) -> std::result::Result<(), String> {
        if self.name != other.name {
            return Err(format!("name mismatch: {:?} <> {:?}", self.name, other.name));
        }
        if self.time != other.time {
            return Err(format!("time mismatch: {} <> {}", self.time, other.time));
        }
        if self.kvs.len() != other.kvs.len() {
            return Err(format!(
                "kv count mismatch: {} <> {}",
                self.kvs.len(),
                other.kvs.len()
            ));
        }

        for f in &self.kvs {
            let Some(o) = other.kvs.get(f.key()) else {
                return Err(format!("key {:?} missing", f.key()));
            };
            if f.is_tag() != o.is_tag() {
                return Err(format!("key {:?}: tag flag mismatch", f.key()));
            }
            if !values_equal(f.value(), o.value()) {
                return Err(format!("key {:?}: {} <> {}", f.key(), f.value(), o.value()));
            }
            if f.unit() != o.unit() || f.metric_type() != o.metric_type() {
                return Err(format!("key {:?}: unit/type mismatch", f.key()));
            }
        }

        Ok(())
    }

    /// Multi-line human readable form
    pub fn pretty(&self) -> String {
        let mut out = String::with_capacity(64 + self.kvs.len() * 32);
        let _ = writeln!(out, "{}", self.name);
        for f in self.kvs.tags() {
            let _ = writeln!(out, "  {f}");
        }
        for f in self.kvs.fields() {
            let _ = writeln!(out, "  {f}");
        }

        let when = chrono::DateTime::from_timestamp_nanos(self.time);
        let _ = writeln!(out, "  time => {} ({})", self.time, when.to_rfc3339());

        for w in &self.warns {
            let _ = writeln!(out, "  [W] {}: {}", w.kind, w.message);
        }
        for d in &self.debugs {
            let _ = writeln!(out, "  [D] {}", d.info);
        }
        out
    }

    /// Line protocol at nanosecond precision
    pub fn line_proto(&self) -> String {
        let mut buf = String::new();
        lineproto::append_point(&mut buf, self, &lineproto::LpOptions::for_point(self));
        buf
    }

    /// Line protocol at a given precision
    pub fn line_proto_with(&self, precision: Precision) -> String {
        let mut opts = lineproto::LpOptions::for_point(self);
        opts.precision = precision;
        let mut buf = String::new();
        lineproto::append_point(&mut buf, self, &opts);
        buf
    }

    /// Exact protobuf-encoded size
    pub fn pb_size(&self) -> usize {
        protobuf::point_size(self)
    }

    /// Cheap size estimate used by the batch encoder
    pub fn size_hint(&self, encoding: Encoding) -> usize {
        match encoding {
            Encoding::Protobuf => self.pb_size(),
            Encoding::LineProtocol => lineproto::size_hint(self),
            Encoding::Json => {
                let kv: usize = self
                    .kvs
                    .iter()
                    .map(|f| f.key().len() + f.value().payload_len() + 24)
                    .sum();
                self.name.len() + kv + 48
            },
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits() || x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CfgBuilder;

    fn cfg_at(t: i64) -> Cfg {
        CfgBuilder::new().time(t).build().unwrap()
    }

    #[test]
    fn test_scenario_line_proto() {
        let pt = Point::new("abc", KVs::new().add_field("f1", 1), &cfg_at(123));
        assert_eq!(pt.line_proto(), "abc f1=1i 123");
    }

    #[test]
    fn test_from_maps_requires_fields() {
        let empty: Vec<(String, Value)> = Vec::new();
        let err = Point::from_maps("m", [("t", "v")], empty, &Cfg::default()).unwrap_err();
        assert!(matches!(err, PointError::EmptyFields));

        let pt = Point::from_maps("m", [("t", "v")], [("f", 1.5)], &cfg_at(1)).unwrap();
        assert_eq!(pt.get_tag("t"), Some("v"));
        assert_eq!(pt.get("f"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn test_time_defaults_to_now() {
        let before = now_nanos();
        let pt = Point::new("m", KVs::new().add_field("f", 1), &Cfg::default());
        assert!(pt.time() >= before);
    }

    #[test]
    fn test_equal_ignores_order_and_warns() {
        let cfg = CfgBuilder::new().time(5).key_sorted(false).precheck(false).build().unwrap();
        let a = Point::new(
            "m",
            KVs::from_unsorted(vec![Field::field("b", 1), Field::tag("a", "x")]),
            &cfg,
        );
        let mut b = Point::new(
            "m",
            KVs::from_unsorted(vec![Field::tag("a", "x"), Field::field("b", 1)]),
            &cfg,
        );
        b.add_warn("w", "ignored".to_string());
        assert!(a.equal(&b));

        b.set("b", 2);
        let reason = a.equal_with_reason(&b).unwrap_err();
        assert!(reason.contains("\"b\""));
    }

    #[test]
    fn test_series_hash_ignores_fields() {
        let cfg = cfg_at(1);
        let a = Point::new("cpu", KVs::new().add_tag("host", "h1").add_field("v", 1), &cfg);
        let b = Point::new("cpu", KVs::new().add_tag("host", "h1").add_field("v", 99), &cfg);
        let c = Point::new("cpu", KVs::new().add_tag("host", "h2").add_field("v", 1), &cfg);
        assert_eq!(a.time_series_hash(), b.time_series_hash());
        assert_ne!(a.time_series_hash(), c.time_series_hash());
    }

    #[test]
    fn test_mutation_clears_checked() {
        let mut pt = Point::new("m", KVs::new().add_field("f", 1), &cfg_at(1));
        assert!(pt.is_checked());
        pt.set_tag("host", "a");
        assert!(!pt.is_checked());
    }

    #[test]
    fn test_pretty_lists_everything() {
        let mut pt = Point::new(
            "m",
            KVs::new().add_tag("host", "a").add_field("f", 1),
            &cfg_at(0),
        );
        pt.add_debug("from test");
        let out = pt.pretty();
        assert!(out.starts_with("m\n"));
        assert!(out.contains("host => \"a\" [tag]"));
        assert!(out.contains("f => 1 [i64]"));
        assert!(out.contains("[D] from test"));
    }
}
