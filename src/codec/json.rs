//! JSON codec.
//!
//! Points serialize as
//!
//! ```text
//! {"name": "cpu",
//!  "fields": [{"key": "host", "is_tag": true, "s": "h1"},
//!             {"key": "usage", "f": 0.5, "unit": "%", "type": "GAUGE"}],
//!  "time": 1700000000000000000,
//!  "warns": [{"type": "...", "msg": "..."}],
//!  "debugs": [{"info": "..."}]}
//! ```
//!
//! with the value under one of `i`, `u`, `f`, `b`, `d` (base64), `s` or
//! `a` (`{"type_url", "value"}`). Points flagged for protobuf use the
//! protojson conventions: 64-bit integers and `time` are written as
//! strings. Decoding accepts both forms, plus the simple producer shape
//! `{"measurement", "tags": {..}, "fields": {..}, "time"}` with implicit
//! typing, as a single object or an array.

use crate::core::{Cfg, PointError, Result};
use crate::model::{AnyValue, DebugInfo, Field, KVs, MetricType, Point, PointFlags, RawValue, Value, Warn};
use crate::pool::{self, PointPool};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value as Json};

#[derive(Serialize)]
struct PointOut<'a> {
    name: &'a str,
    fields: FieldsOut<'a>,
    time: Int<i64>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    warns: &'a [Warn],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    debugs: &'a [DebugInfo],
}

/// A 64-bit integer, written as a string in the protobuf shape
struct Int<T> {
    v: T,
    typed: bool,
}

impl<T: Serialize + ToString> Serialize for Int<T> {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        if self.typed {
            s.serialize_str(&self.v.to_string())
        } else {
            self.v.serialize(s)
        }
    }
}

struct FieldsOut<'a> {
    kvs: &'a KVs,
    typed: bool,
}

impl Serialize for FieldsOut<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(self.kvs.len()))?;
        for f in self.kvs.iter() {
            seq.serialize_element(&FieldOut { f, typed: self.typed })?;
        }
        seq.end()
    }
}

struct FieldOut<'a> {
    f: &'a Field,
    typed: bool,
}

impl Serialize for FieldOut<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        let f = self.f;
        let typed = self.typed;
        let mut m = s.serialize_map(None)?;

        m.serialize_entry("key", f.key())?;
        if f.is_tag() {
            m.serialize_entry("is_tag", &true)?;
        }

        match f.value() {
            Value::Nil => {},
            Value::Int(i) => m.serialize_entry("i", &Int { v: *i, typed })?,
            Value::Uint(u) => m.serialize_entry("u", &Int { v: *u, typed })?,
            Value::Float(v) => m.serialize_entry("f", v)?,
            Value::Bool(b) => m.serialize_entry("b", b)?,
            Value::Bytes(d) => m.serialize_entry("d", &STANDARD.encode(d))?,
            Value::Str(v) => m.serialize_entry("s", v)?,
            Value::Any(a) => {
                let mut any = Map::new();
                any.insert("type_url".into(), Json::String(a.type_url.clone()));
                any.insert("value".into(), Json::String(STANDARD.encode(&a.value)));
                m.serialize_entry("a", &any)?;
            },
        }

        if f.metric_type() != MetricType::Unspecified {
            m.serialize_entry("type", f.metric_type().as_str())?;
        }
        if !f.unit().is_empty() {
            m.serialize_entry("unit", f.unit())?;
        }
        m.end()
    }
}

fn point_out(pt: &Point) -> PointOut<'_> {
    let typed = pt.flags().contains(PointFlags::PB_ENCODED);
    PointOut {
        name: pt.name(),
        fields: FieldsOut { kvs: pt.kvs(), typed },
        time: Int { v: pt.time(), typed },
        warns: pt.warns(),
        debugs: pt.debugs(),
    }
}

/// Append one point object to `buf`, returning the bytes written
pub fn append_point(buf: &mut Vec<u8>, pt: &Point) -> Result<usize> {
    let start = buf.len();
    serde_json::to_writer(&mut *buf, &point_out(pt))?;
    Ok(buf.len() - start)
}

pub fn marshal(pt: &Point) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&point_out(pt))?)
}

/// Marshal points as a JSON array
pub fn marshal_batch(pts: &[Point]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(pts.len() * 128 + 2);
    buf.push(b'[');
    for (i, pt) in pts.iter().enumerate() {
        if i > 0 {
            buf.push(b',');
        }
        append_point(&mut buf, pt)?;
    }
    buf.push(b']');
    Ok(buf)
}

fn bad(msg: impl std::fmt::Display) -> PointError {
    PointError::Json(<serde_json::Error as serde::de::Error>::custom(msg))
}

fn int_of(v: &Json, what: &str) -> Result<i64> {
    match v {
        Json::Number(n) => n.as_i64().ok_or_else(|| bad(format!("{} is not an int64", what))),
        Json::String(s) => s.parse().map_err(|_| bad(format!("{} is not an int64", what))),
        _ => Err(bad(format!("{} must be a number", what))),
    }
}

fn uint_of(v: &Json, what: &str) -> Result<u64> {
    match v {
        Json::Number(n) => n.as_u64().ok_or_else(|| bad(format!("{} is not a uint64", what))),
        Json::String(s) => s.parse().map_err(|_| bad(format!("{} is not a uint64", what))),
        _ => Err(bad(format!("{} must be a number", what))),
    }
}

fn float_of(v: &Json, what: &str) -> Result<f64> {
    match v {
        Json::Number(n) => n.as_f64().ok_or_else(|| bad(format!("{} is not a number", what))),
        Json::String(s) => s.parse().map_err(|_| bad(format!("{} is not a number", what))),
        _ => Err(bad(format!("{} must be a number", what))),
    }
}

fn b64(v: &Json, what: &str) -> Result<Vec<u8>> {
    let s = v.as_str().ok_or_else(|| bad(format!("{} must be a base64 string", what)))?;
    STANDARD.decode(s).map_err(|e| bad(format!("{}: {}", what, e)))
}

/// Typed field object from the list shape
fn typed_field(obj: &Map<String, Json>, pool: Option<&dyn PointPool>) -> Result<Field> {
    let key = obj.get("key").and_then(Json::as_str).unwrap_or_default();
    let is_tag = obj.get("is_tag").and_then(Json::as_bool).unwrap_or(false);

    let any_bytes;
    let owned_bytes;
    let raw = if let Some(v) = obj.get("i") {
        RawValue::Int(int_of(v, "i")?)
    } else if let Some(v) = obj.get("u") {
        RawValue::Uint(uint_of(v, "u")?)
    } else if let Some(v) = obj.get("f") {
        match v {
            Json::Null => RawValue::Nil,
            v => RawValue::Float(float_of(v, "f")?),
        }
    } else if let Some(v) = obj.get("b") {
        RawValue::Bool(v.as_bool().ok_or_else(|| bad("b must be a bool"))?)
    } else if let Some(v) = obj.get("d") {
        owned_bytes = b64(v, "d")?;
        RawValue::Bytes(&owned_bytes)
    } else if let Some(v) = obj.get("s") {
        RawValue::Str(v.as_str().ok_or_else(|| bad("s must be a string"))?)
    } else if let Some(v) = obj.get("a") {
        let type_url = v.get("type_url").and_then(Json::as_str).unwrap_or_default();
        any_bytes = match v.get("value") {
            Some(val) => b64(val, "a.value")?,
            None => Vec::new(),
        };
        RawValue::Any {
            type_url,
            value: &any_bytes,
        }
    } else {
        RawValue::Nil
    };

    let mut f = pool::new_field(pool, key, raw, is_tag);
    if let Some(unit) = obj.get("unit").and_then(Json::as_str) {
        f.unit.push_str(unit);
    }
    f.metric_type = match obj.get("type") {
        Some(Json::String(name)) => MetricType::from_name(name).unwrap_or_default(),
        Some(Json::Number(n)) => MetricType::from_i32(n.as_i64().unwrap_or(0) as i32),
        _ => MetricType::Unspecified,
    };
    Ok(f)
}

/// Value from the simple producer shape
fn implicit_value(v: &Json) -> Value {
    match v {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::Uint(u)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        },
        Json::String(s) => Value::Str(s.clone()),
        other => Value::Str(other.to_string()),
    }
}

fn point_from(obj: &Map<String, Json>, cfg: &Cfg, pool: Option<&dyn PointPool>) -> Result<Point> {
    let mut pt = pool::new_point(pool);

    let name = obj
        .get("name")
        .or_else(|| obj.get("measurement"))
        .and_then(Json::as_str)
        .unwrap_or_default();
    pt.set_name(name);

    if let Some(tags) = obj.get("tags").and_then(Json::as_object) {
        for (k, v) in tags {
            let s = match v {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            pt.kvs.push_raw(pool::new_field(pool, k, RawValue::Str(&s), true));
        }
    }

    match obj.get("fields") {
        Some(Json::Array(list)) => {
            for item in list {
                let fo = item.as_object().ok_or_else(|| bad("field entries must be objects"))?;
                pt.kvs.push_raw(typed_field(fo, pool)?);
            }
        },
        Some(Json::Object(map)) => {
            for (k, v) in map {
                let value = implicit_value(v);
                pt.kvs.push_raw(pool::new_field(pool, k, value.as_raw(), false));
            }
        },
        Some(Json::Null) | None => {},
        Some(_) => return Err(bad("fields must be a list or an object")),
    }

    if let Some(warns) = obj.get("warns").and_then(Json::as_array) {
        for w in warns {
            let kind = w.get("type").and_then(Json::as_str).unwrap_or_default();
            let msg = w.get("msg").and_then(Json::as_str).unwrap_or_default();
            pt.warns.push(Warn::new(kind, msg));
        }
    }
    if let Some(debugs) = obj.get("debugs").and_then(Json::as_array) {
        for d in debugs {
            let info = d.get("info").and_then(Json::as_str).unwrap_or_default();
            pt.debugs.push(DebugInfo { info: info.to_string() });
        }
    }

    let time = match obj.get("time") {
        Some(Json::Null) | None => cfg.time.unwrap_or_else(crate::model::now_nanos),
        Some(v) => int_of(v, "time")?,
    };

    pt.finalize(cfg, Some(time));
    Ok(pt)
}

/// Decode one object or an array of objects into `out`
pub fn decode_into(data: &[u8], cfg: &Cfg, pool: Option<&dyn PointPool>, out: &mut Vec<Point>) -> Result<()> {
    let doc: Json = serde_json::from_slice(data)?;
    match doc {
        Json::Array(items) => {
            out.reserve(items.len());
            for item in &items {
                let obj = item.as_object().ok_or_else(|| bad("points must be objects"))?;
                out.push(point_from(obj, cfg, pool)?);
            }
            Ok(())
        },
        Json::Object(obj) => {
            out.push(point_from(&obj, cfg, pool)?);
            Ok(())
        },
        _ => Err(bad("expected a point object or an array of points")),
    }
}

/// [`decode_into`] with the installed default pool
pub fn decode(data: &[u8], cfg: &Cfg) -> Result<Vec<Point>> {
    let pool = pool::default_pool();
    let mut out = Vec::new();
    decode_into(data, cfg, pool.as_deref().map(|b| &**b), &mut out)?;
    Ok(out)
}
