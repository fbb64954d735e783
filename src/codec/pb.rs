//! Generated-style protobuf messages for the point wire format.
//!
//! The hand-written codec in [`super::protobuf`] never uses these. They
//! exist so consumers holding a generic protobuf runtime can read and write
//! the same bytes, and so tests can check the two agree.

use crate::core::Cfg;
use crate::model::{AnyValue, DebugInfo, Field, KVs, MetricType, Point, Value, Warn};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbAny {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbField {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bool, tag = "8")]
    pub is_tag: bool,
    #[prost(int32, tag = "9")]
    pub r#type: i32,
    #[prost(string, tag = "10")]
    pub unit: String,
    #[prost(oneof = "pb_field::Val", tags = "2, 3, 4, 5, 6, 7, 11")]
    pub val: Option<pb_field::Val>,
}

pub mod pb_field {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Val {
        #[prost(int64, tag = "2")]
        I(i64),
        #[prost(uint64, tag = "3")]
        U(u64),
        #[prost(double, tag = "4")]
        F(f64),
        #[prost(bool, tag = "5")]
        B(bool),
        #[prost(bytes, tag = "6")]
        D(Vec<u8>),
        #[prost(message, tag = "7")]
        A(super::PbAny),
        #[prost(string, tag = "11")]
        S(String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbWarn {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(string, tag = "2")]
    pub msg: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbDebug {
    #[prost(string, tag = "1")]
    pub info: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbPoint {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub fields: Vec<PbField>,
    #[prost(int64, tag = "3")]
    pub time: i64,
    #[prost(message, repeated, tag = "4")]
    pub warns: Vec<PbWarn>,
    #[prost(message, repeated, tag = "5")]
    pub debugs: Vec<PbDebug>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbPoints {
    #[prost(message, repeated, tag = "1")]
    pub arr: Vec<PbPoint>,
}

impl From<&Field> for PbField {
    fn from(f: &Field) -> Self {
        use pb_field::Val;

        let val = match f.value() {
            Value::Nil => None,
            Value::Int(i) => Some(Val::I(*i)),
            Value::Uint(u) => Some(Val::U(*u)),
            Value::Float(v) => Some(Val::F(*v)),
            Value::Bool(b) => Some(Val::B(*b)),
            Value::Bytes(d) => Some(Val::D(d.clone())),
            Value::Str(s) => Some(Val::S(s.clone())),
            Value::Any(a) => Some(Val::A(PbAny {
                type_url: a.type_url.clone(),
                value: a.value.clone(),
            })),
        };

        PbField {
            key: f.key().to_string(),
            is_tag: f.is_tag(),
            r#type: f.metric_type() as i32,
            unit: f.unit().to_string(),
            val,
        }
    }
}

impl From<PbField> for Field {
    fn from(pf: PbField) -> Self {
        use pb_field::Val;

        let value = match pf.val {
            None => Value::Nil,
            Some(Val::I(i)) => Value::Int(i),
            Some(Val::U(u)) => Value::Uint(u),
            Some(Val::F(v)) => Value::Float(v),
            Some(Val::B(b)) => Value::Bool(b),
            Some(Val::D(d)) => Value::Bytes(d),
            Some(Val::S(s)) => Value::Str(s),
            Some(Val::A(a)) => Value::Any(AnyValue::new(a.type_url, a.value)),
        };

        Field::new(pf.key, value, pf.is_tag)
            .with_unit(pf.unit)
            .with_metric_type(MetricType::from_i32(pf.r#type))
    }
}

impl From<&Point> for PbPoint {
    fn from(pt: &Point) -> Self {
        PbPoint {
            name: pt.name().to_string(),
            fields: pt.kvs().iter().map(PbField::from).collect(),
            time: pt.time(),
            warns: pt
                .warns()
                .iter()
                .map(|w| PbWarn {
                    r#type: w.kind.clone(),
                    msg: w.message.clone(),
                })
                .collect(),
            debugs: pt
                .debugs()
                .iter()
                .map(|d| PbDebug { info: d.info.clone() })
                .collect(),
        }
    }
}

impl PbPoint {
    /// Convert into a point, finalized with `cfg`
    pub fn into_point(self, cfg: &Cfg) -> Point {
        let kvs = KVs::from_unsorted(self.fields.into_iter().map(Field::from).collect());
        let mut pt = Point::empty();
        pt.set_name(&self.name);
        pt.kvs = kvs;
        pt.warns = self
            .warns
            .into_iter()
            .map(|w| Warn::new(w.r#type, w.msg))
            .collect();
        pt.debugs = self
            .debugs
            .into_iter()
            .map(|d| DebugInfo { info: d.info })
            .collect();
        pt.finalize(cfg, Some(self.time));
        pt
    }
}

impl From<&[Point]> for PbPoints {
    fn from(pts: &[Point]) -> Self {
        PbPoints {
            arr: pts.iter().map(PbPoint::from).collect(),
        }
    }
}
