//! The point data model: values, KVs, schema keys and the point itself.

pub mod field;
pub mod keys;
pub mod kvs;
pub mod point;
pub mod value;

pub use field::Field;
pub use keys::{Key, KeyKind, Keys};
pub use kvs::KVs;
pub use point::{now_nanos, DebugInfo, Point, PointFlags, Warn};
pub use value::{AnyValue, MetricType, RawValue, Value, ValueKind};
