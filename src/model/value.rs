//! Typed field values.
//!
//! `Value` is the payload of a single KV. Every codec, the checker and the
//! equality predicate match on it exhaustively, so adding a variant is a
//! compile error everywhere it matters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque composite payload, wire-compatible with `google.protobuf.Any`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnyValue {
    /// Type URL identifying the packed message
    pub type_url: String,
    /// Serialized message bytes
    #[serde(default)]
    pub value: Vec<u8>,
}

impl AnyValue {
    /// Creates a composite value
    pub fn new<S: Into<String>>(type_url: S, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }
}

/// The value of a KV entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No payload. Never survives a check.
    #[default]
    Nil,
    /// Signed 64-bit integer
    Int(i64),
    /// Unsigned 64-bit integer
    Uint(u64),
    /// 64-bit float
    Float(f64),
    /// Boolean
    Bool(bool),
    /// UTF-8 string
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Composite payload
    Any(AnyValue),
}

/// Discriminant of [`Value`], used to index per-kind free lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Nil,
    Int,
    Uint,
    Float,
    Bool,
    Str,
    Bytes,
    Any,
}

impl ValueKind {
    /// Every kind, in free-list index order
    pub const ALL: [ValueKind; 8] = [
        ValueKind::Nil,
        ValueKind::Int,
        ValueKind::Uint,
        ValueKind::Float,
        ValueKind::Bool,
        ValueKind::Str,
        ValueKind::Bytes,
        ValueKind::Any,
    ];

    /// Stable index into per-kind tables
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short name used in pretty output and warnings
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Nil => "nil",
            ValueKind::Int => "i64",
            ValueKind::Uint => "u64",
            ValueKind::Float => "f64",
            ValueKind::Bool => "bool",
            ValueKind::Str => "str",
            ValueKind::Bytes => "bytes",
            ValueKind::Any => "any",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowed view of a value, produced by decoders straight out of the
/// input buffer so pooled storage can be overwritten without an
/// intermediate allocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue<'a> {
    Nil,
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Str(&'a str),
    Bytes(&'a [u8]),
    Any { type_url: &'a str, value: &'a [u8] },
}

impl RawValue<'_> {
    /// Kind of the owned value this view becomes
    pub fn kind(&self) -> ValueKind {
        match self {
            RawValue::Nil => ValueKind::Nil,
            RawValue::Int(_) => ValueKind::Int,
            RawValue::Uint(_) => ValueKind::Uint,
            RawValue::Float(_) => ValueKind::Float,
            RawValue::Bool(_) => ValueKind::Bool,
            RawValue::Str(_) => ValueKind::Str,
            RawValue::Bytes(_) => ValueKind::Bytes,
            RawValue::Any { .. } => ValueKind::Any,
        }
    }

    /// Allocate an owned copy
    pub fn to_value(self) -> Value {
        let mut v = Value::zero(self.kind());
        v.assign(self);
        v
    }
}

impl Value {
    /// The zero value of a kind
    pub fn zero(kind: ValueKind) -> Value {
        match kind {
            ValueKind::Nil => Value::Nil,
            ValueKind::Int => Value::Int(0),
            ValueKind::Uint => Value::Uint(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Str => Value::Str(String::new()),
            ValueKind::Bytes => Value::Bytes(Vec::new()),
            ValueKind::Any => Value::Any(AnyValue::default()),
        }
    }

    /// Returns the kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Int(_) => ValueKind::Int,
            Value::Uint(_) => ValueKind::Uint,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Any(_) => ValueKind::Any,
        }
    }

    /// Reset to the zero value of the current kind, keeping heap capacity
    pub fn reset(&mut self) {
        match self {
            Value::Nil => {},
            Value::Int(i) => *i = 0,
            Value::Uint(u) => *u = 0,
            Value::Float(f) => *f = 0.0,
            Value::Bool(b) => *b = false,
            Value::Str(s) => s.clear(),
            Value::Bytes(d) => d.clear(),
            Value::Any(a) => {
                a.type_url.clear();
                a.value.clear();
            },
        }
    }

    /// Overwrite in place. When the kinds match the existing string or
    /// byte buffer is reused.
    pub fn assign(&mut self, raw: RawValue<'_>) {
        match (self, raw) {
            (Value::Str(s), RawValue::Str(src)) => {
                s.clear();
                s.push_str(src);
            },
            (Value::Bytes(d), RawValue::Bytes(src)) => {
                d.clear();
                d.extend_from_slice(src);
            },
            (Value::Any(a), RawValue::Any { type_url, value }) => {
                a.type_url.clear();
                a.type_url.push_str(type_url);
                a.value.clear();
                a.value.extend_from_slice(value);
            },
            (slot, raw) => {
                *slot = match raw {
                    RawValue::Nil => Value::Nil,
                    RawValue::Int(i) => Value::Int(i),
                    RawValue::Uint(u) => Value::Uint(u),
                    RawValue::Float(f) => Value::Float(f),
                    RawValue::Bool(b) => Value::Bool(b),
                    RawValue::Str(s) => Value::Str(s.to_owned()),
                    RawValue::Bytes(d) => Value::Bytes(d.to_vec()),
                    RawValue::Any { type_url, value } => {
                        Value::Any(AnyValue::new(type_url, value.to_vec()))
                    },
                };
            },
        }
    }

    /// Borrow as a raw view
    pub fn as_raw(&self) -> RawValue<'_> {
        match self {
            Value::Nil => RawValue::Nil,
            Value::Int(i) => RawValue::Int(*i),
            Value::Uint(u) => RawValue::Uint(*u),
            Value::Float(f) => RawValue::Float(*f),
            Value::Bool(b) => RawValue::Bool(*b),
            Value::Str(s) => RawValue::Str(s),
            Value::Bytes(d) => RawValue::Bytes(d),
            Value::Any(a) => RawValue::Any {
                type_url: &a.type_url,
                value: &a.value,
            },
        }
    }

    /// Returns the string payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if any
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float payload, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the bool payload, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// True for string and byte payloads, the only kinds a tag may carry
    pub fn is_string_like(&self) -> bool {
        matches!(self, Value::Str(_) | Value::Bytes(_))
    }

    /// Length in bytes of string-like payloads, 0 otherwise
    pub fn payload_len(&self) -> usize {
        match self {
            Value::Str(s) => s.len(),
            Value::Bytes(d) => d.len(),
            Value::Any(a) => a.type_url.len() + a.value.len(),
            _ => 0,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("<nil>"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(d) => write!(f, "{:?}", String::from_utf8_lossy(d)),
            Value::Any(a) => write!(f, "<{}: {} bytes>", a.type_url, a.value.len()),
        }
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(<$cast>::from(v))
                }
            }
        )*
    };
}

impl_from! {
    i64 => Int as i64,
    i32 => Int as i64,
    i16 => Int as i64,
    i8 => Int as i64,
    u64 => Uint as u64,
    u32 => Uint as u64,
    u16 => Uint as u64,
    u8 => Uint as u64,
    f64 => Float as f64,
    f32 => Float as f64,
    bool => Bool as bool,
    String => Str as String,
    &str => Str as String,
    Vec<u8> => Bytes as Vec<u8>,
    &[u8] => Bytes as Vec<u8>,
    AnyValue => Any as AnyValue,
}

/// Metric semantics attached to a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum MetricType {
    #[default]
    Unspecified = 0,
    Count = 1,
    Rate = 2,
    Gauge = 3,
    Summary = 4,
    Histogram = 5,
}

impl MetricType {
    /// Decode from the wire enum value. Unknown values map to `Unspecified`.
    pub fn from_i32(v: i32) -> Self {
        match v {
            1 => MetricType::Count,
            2 => MetricType::Rate,
            3 => MetricType::Gauge,
            4 => MetricType::Summary,
            5 => MetricType::Histogram,
            _ => MetricType::Unspecified,
        }
    }

    /// Protobuf enum name
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Unspecified => "UNSPECIFIED",
            MetricType::Count => "COUNT",
            MetricType::Rate => "RATE",
            MetricType::Gauge => "GAUGE",
            MetricType::Summary => "SUMMARY",
            MetricType::Histogram => "HISTOGRAM",
        }
    }

    /// Parse a protobuf enum name
    pub fn from_name(name: &str) -> Option<Self> {
        let t = match name {
            "UNSPECIFIED" => MetricType::Unspecified,
            "COUNT" => MetricType::Count,
            "RATE" => MetricType::Rate,
            "GAUGE" => MetricType::Gauge,
            "SUMMARY" => MetricType::Summary,
            "HISTOGRAM" => MetricType::Histogram,
            _ => return None,
        };
        Some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_match_kind() {
        for kind in ValueKind::ALL {
            assert_eq!(Value::zero(kind).kind(), kind);
            assert_eq!(ValueKind::ALL[kind.index()], kind);
        }
    }

    #[test]
    fn test_assign_reuses_string_buffer() {
        let mut v = Value::Str(String::with_capacity(64));
        let before = match &v {
            Value::Str(s) => s.capacity(),
            _ => unreachable!(),
        };

        v.assign(RawValue::Str("hello"));
        match &v {
            Value::Str(s) => {
                assert_eq!(s, "hello");
                assert_eq!(s.capacity(), before);
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_assign_changes_kind() {
        let mut v = Value::Int(3);
        v.assign(RawValue::Bytes(b"abc"));
        assert_eq!(v, Value::Bytes(b"abc".to_vec()));
    }

    #[test]
    fn test_reset_keeps_kind() {
        let mut v = Value::from("some text");
        v.reset();
        assert_eq!(v, Value::Str(String::new()));

        let mut v = Value::Float(1.5);
        v.reset();
        assert_eq!(v, Value::Float(0.0));
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(Value::from(3i32), Value::Int(3));
        assert_eq!(Value::from(3u8), Value::Uint(3));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(&b"x"[..]), Value::Bytes(vec![b'x']));
    }

    #[test]
    fn test_metric_type_names() {
        for t in [MetricType::Count, MetricType::Gauge, MetricType::Histogram] {
            assert_eq!(MetricType::from_name(t.as_str()), Some(t));
            assert_eq!(MetricType::from_i32(t as i32), t);
        }
        assert_eq!(MetricType::from_i32(42), MetricType::Unspecified);
    }
}
