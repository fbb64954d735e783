//! A single KV entry of a point.

use super::keys::{Key, KeyKind};
use super::value::{MetricType, RawValue, Value};
use std::fmt;

/// One key-value attribute, either a tag or a field.
///
/// A tag always carries a string. Anything else handed in as a tag is
/// demoted to a plain field when the entry is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Field {
    pub(crate) key: String,
    pub(crate) value: Value,
    pub(crate) is_tag: bool,
    pub(crate) unit: String,
    pub(crate) metric_type: MetricType,
}

impl Field {
    /// Build an entry, demoting non-string tags to fields
    pub fn new<K: Into<String>, V: Into<Value>>(key: K, value: V, as_tag: bool) -> Self {
        let mut f = Field {
            key: key.into(),
            value: value.into(),
            is_tag: as_tag,
            unit: String::new(),
            metric_type: MetricType::Unspecified,
        };
        f.normalize_tag();
        f
    }

    /// Build a field (never a tag)
    pub fn field<K: Into<String>, V: Into<Value>>(key: K, value: V) -> Self {
        Self::new(key, value, false)
    }

    /// Build a tag
    pub fn tag<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self::new(key, Value::Str(value.into()), true)
    }

    /// Attach a unit
    #[must_use]
    pub fn with_unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit = unit.into();
        self
    }

    /// Attach a metric type
    #[must_use]
    pub fn with_metric_type(mut self, t: MetricType) -> Self {
        self.metric_type = t;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_tag(&self) -> bool {
        self.is_tag
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    /// Replace the value. A tag receiving a non-string value becomes a field.
    pub fn set_value<V: Into<Value>>(&mut self, value: V) {
        self.value = value.into();
        self.normalize_tag();
    }

    /// Schema kind of this entry
    pub fn key_kind(&self) -> KeyKind {
        if self.is_tag {
            KeyKind::Tag
        } else {
            KeyKind::from(self.value.kind())
        }
    }

    /// Schema descriptor of this entry
    pub fn schema_key(&self) -> Key {
        Key::new(self.key.clone(), self.key_kind())
    }

    /// Enforce the tag invariant: only strings may be tags. Bytes are
    /// converted, every other kind is demoted.
    pub(crate) fn normalize_tag(&mut self) {
        if !self.is_tag {
            return;
        }

        match &mut self.value {
            Value::Str(_) => {},
            Value::Bytes(d) => {
                let s = match String::from_utf8(std::mem::take(d)) {
                    Ok(s) => s,
                    Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
                };
                self.value = Value::Str(s);
            },
            _ => self.is_tag = false,
        }
    }

    /// Clear everything but keep the key/unit/value buffers for reuse
    pub(crate) fn reset(&mut self) {
        self.key.clear();
        self.unit.clear();
        self.is_tag = false;
        self.metric_type = MetricType::Unspecified;
        self.value.reset();
    }

    /// Fill a recycled shell from borrowed decoder output
    pub(crate) fn fill(&mut self, key: &str, raw: RawValue<'_>, is_tag: bool) {
        self.key.clear();
        self.key.push_str(key);
        self.value.assign(raw);
        self.is_tag = is_tag;
        self.normalize_tag();
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tag {
            write!(f, "{} => {} [tag]", self.key, self.value)
        } else {
            write!(f, "{} => {} [{}]", self.key, self.value, self.value.kind())?;
            if !self.unit.is_empty() {
                write!(f, " unit:{}", self.unit)?;
            }
            if self.metric_type != MetricType::Unspecified {
                write!(f, " type:{}", self.metric_type.as_str())?;
            }
            Ok(())
        }
    }
}
