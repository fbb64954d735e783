//! Per-operation configuration.
//!
//! This module provides the point options with:
//! - YAML file support
//! - Environment variable for the process default encoding
//! - Presets for the common data categories
//! - Validation and defaults

use crate::check::Checker;
use crate::core::{PointError, Result};
use crate::model::{Key, Value};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Environment variable selecting the process default encoding
pub const ENV_DEFAULT_ENCODING: &str = "POINT_DEFAULT_ENCODING";

/// Name given to points whose measurement is empty
pub const DEFAULT_MEASUREMENT: &str = "__default";

/// Wire encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[serde(alias = "line-protocol", alias = "lp")]
    LineProtocol,
    #[serde(alias = "pb")]
    Protobuf,
    Json,
}

static DEFAULT_ENCODING: Lazy<Encoding> = Lazy::new(|| {
    match std::env::var(ENV_DEFAULT_ENCODING) {
        Ok(v) => v.parse().unwrap_or_else(|e| {
            tracing::warn!("{}, falling back to line protocol", e);
            Encoding::LineProtocol
        }),
        Err(_) => Encoding::LineProtocol,
    }
});

impl Encoding {
    /// Process default, read once from `POINT_DEFAULT_ENCODING`
    pub fn process_default() -> Self {
        *DEFAULT_ENCODING
    }

    /// HTTP content type of a payload in this encoding
    pub fn content_type(self) -> &'static str {
        match self {
            Encoding::LineProtocol => "text/plain; charset=utf-8",
            Encoding::Protobuf => "application/x-protobuf",
            Encoding::Json => "application/json",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::LineProtocol => "lineprotocol",
            Encoding::Protobuf => "protobuf",
            Encoding::Json => "json",
        }
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Self::process_default()
    }
}

impl FromStr for Encoding {
    type Err = PointError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lineprotocol" | "line-protocol" | "line_protocol" | "lp" => Ok(Encoding::LineProtocol),
            "protobuf" | "pb" => Ok(Encoding::Protobuf),
            "json" => Ok(Encoding::Json),
            other => Err(PointError::config(format!("unknown encoding '{}'", other))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp precision used by line protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    #[serde(alias = "n", alias = "nanosecond")]
    Ns,
    #[serde(alias = "u", alias = "microsecond")]
    Us,
    #[serde(alias = "millisecond")]
    Ms,
    #[serde(alias = "second")]
    S,
    #[serde(alias = "minute")]
    M,
    #[serde(alias = "hour")]
    H,
}

impl Precision {
    /// Nanoseconds per unit
    pub fn nanos_per_unit(self) -> i64 {
        match self {
            Precision::Ns => 1,
            Precision::Us => 1_000,
            Precision::Ms => 1_000_000,
            Precision::S => 1_000_000_000,
            Precision::M => 60 * 1_000_000_000,
            Precision::H => 3600 * 1_000_000_000,
        }
    }

    /// Nanoseconds to this precision (truncating)
    pub fn from_nanos(self, ns: i64) -> i64 {
        ns / self.nanos_per_unit()
    }

    /// A timestamp in this precision to nanoseconds (saturating)
    pub fn to_nanos(self, v: i64) -> i64 {
        v.saturating_mul(self.nanos_per_unit())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Ns => "ns",
            Precision::Us => "us",
            Precision::Ms => "ms",
            Precision::S => "s",
            Precision::M => "m",
            Precision::H => "h",
        }
    }
}

impl FromStr for Precision {
    type Err = PointError;

    fn from_str(s: &str) -> Result<Self> {
        let p = match s.trim() {
            "ns" | "n" => Precision::Ns,
            "us" | "u" => Precision::Us,
            "ms" => Precision::Ms,
            "s" => Precision::S,
            "m" => Precision::M,
            "h" => Precision::H,
            other => return Err(PointError::config(format!("unknown precision '{}'", other))),
        };
        Ok(p)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key that must exist on every checked point, with its default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredKey {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub tag: bool,
}

impl RequiredKey {
    pub fn new<K: Into<String>, V: Into<Value>>(key: K, value: V, tag: bool) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            tag,
        }
    }
}

/// Options for point construction, checking and encoding.
///
/// Limits of 0 mean "unlimited".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cfg {
    /// Explicit point time in nanoseconds; `None` means "now"
    pub time: Option<i64>,
    /// Run the checker while constructing the point
    pub precheck: bool,
    pub max_tags: usize,
    pub max_fields: usize,
    pub max_tag_key_len: usize,
    pub max_field_key_len: usize,
    pub max_tag_val_len: usize,
    pub max_field_val_len: usize,
    pub max_measurement_len: usize,
    pub disabled_keys: Vec<Key>,
    pub required_keys: Vec<RequiredKey>,
    pub enable_dot_in_key: bool,
    pub enable_str_field: bool,
    pub enable_u64_field: bool,
    pub enable_negative_timestamp: bool,
    /// Tags added to every point unless the key already exists
    pub extra_tags: BTreeMap<String, String>,
    pub key_sorted: bool,
    pub precision: Precision,
    pub encoding: Encoding,
}

impl Default for Cfg {
    fn default() -> Self {
        Cfg {
            time: None,
            precheck: true,
            max_tags: 256,
            max_fields: 1024,
            max_tag_key_len: 256,
            max_field_key_len: 256,
            max_tag_val_len: 1024,
            max_field_val_len: 32 * 1024 * 1024,
            max_measurement_len: 1024,
            disabled_keys: Vec::new(),
            required_keys: Vec::new(),
            enable_dot_in_key: true,
            enable_str_field: true,
            enable_u64_field: true,
            enable_negative_timestamp: false,
            extra_tags: BTreeMap::new(),
            key_sorted: true,
            precision: Precision::Ns,
            encoding: Encoding::process_default(),
        }
    }
}

impl Cfg {
    /// Options for time-series metrics: numeric fields only, no dots
    pub fn metric() -> Self {
        Cfg {
            enable_str_field: false,
            enable_dot_in_key: false,
            max_field_val_len: 1024,
            ..Cfg::default()
        }
    }

    /// Options for log records: large string fields allowed
    pub fn logging() -> Self {
        Cfg {
            enable_str_field: true,
            max_field_val_len: 32 * 1024 * 1024,
            ..Cfg::default()
        }
    }

    /// Options for object snapshots
    pub fn object() -> Self {
        Cfg {
            enable_str_field: true,
            max_fields: 2048,
            ..Cfg::default()
        }
    }

    /// The option set that keeps line protocol output byte-compatible
    /// with InfluxDB 1.x consumers
    pub fn influx_compatible() -> Self {
        Cfg {
            enable_u64_field: false,
            enable_dot_in_key: true,
            key_sorted: true,
            precision: Precision::Ns,
            encoding: Encoding::LineProtocol,
            ..Cfg::default()
        }
    }

    /// True if the configured disabled keys cover this entry
    pub fn is_disabled(&self, key: &str, kind: crate::model::KeyKind) -> bool {
        self.disabled_keys.iter().any(|k| k.matches(key, kind))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for rk in &self.required_keys {
            if rk.key.is_empty() {
                return Err(PointError::config("required key with empty name"));
            }

            let kind = crate::model::Field::new(rk.key.clone(), rk.value.clone(), rk.tag).key_kind();
            if self.is_disabled(&rk.key, kind) {
                return Err(PointError::config(format!(
                    "key '{}' is both required and disabled",
                    rk.key
                )));
            }

            if let Some(reason) = Checker::new(self).reject_required(rk) {
                return Err(PointError::config(format!(
                    "default for required key '{}' would not pass checking: {}",
                    rk.key, reason
                )));
            }
        }

        for (k, v) in &self.extra_tags {
            if let Some(reason) = Checker::new(self).reject_extra_tag(k, v) {
                return Err(PointError::config(format!(
                    "extra tag '{}' would not pass checking: {}",
                    k, reason
                )));
            }
        }

        Ok(())
    }
}

/// Configuration builder for programmatic construction
pub struct CfgBuilder {
    cfg: Cfg,
}

impl Default for CfgBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CfgBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        CfgBuilder { cfg: Cfg::default() }
    }

    /// Start from a preset
    pub fn from_cfg(cfg: Cfg) -> Self {
        CfgBuilder { cfg }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.cfg = serde_yaml::from_str(yaml)
            .map_err(|e| PointError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PointError::config(format!("Failed to read {}: {}", path.display(), e)))?;
        self.from_yaml(&content)
    }

    pub fn time(mut self, ns: i64) -> Self {
        self.cfg.time = Some(ns);
        self
    }

    pub fn precheck(mut self, on: bool) -> Self {
        self.cfg.precheck = on;
        self
    }

    pub fn max_tags(mut self, n: usize) -> Self {
        self.cfg.max_tags = n;
        self
    }

    pub fn max_fields(mut self, n: usize) -> Self {
        self.cfg.max_fields = n;
        self
    }

    pub fn max_tag_key_len(mut self, n: usize) -> Self {
        self.cfg.max_tag_key_len = n;
        self
    }

    pub fn max_field_key_len(mut self, n: usize) -> Self {
        self.cfg.max_field_key_len = n;
        self
    }

    pub fn max_tag_val_len(mut self, n: usize) -> Self {
        self.cfg.max_tag_val_len = n;
        self
    }

    pub fn max_field_val_len(mut self, n: usize) -> Self {
        self.cfg.max_field_val_len = n;
        self
    }

    pub fn max_measurement_len(mut self, n: usize) -> Self {
        self.cfg.max_measurement_len = n;
        self
    }

    pub fn disabled_key(mut self, key: Key) -> Self {
        if !self.cfg.disabled_keys.contains(&key) {
            self.cfg.disabled_keys.push(key);
        }
        self
    }

    pub fn required_key(mut self, key: RequiredKey) -> Self {
        self.cfg.required_keys.retain(|k| k.key != key.key);
        self.cfg.required_keys.push(key);
        self
    }

    pub fn dot_in_key(mut self, on: bool) -> Self {
        self.cfg.enable_dot_in_key = on;
        self
    }

    pub fn str_field(mut self, on: bool) -> Self {
        self.cfg.enable_str_field = on;
        self
    }

    pub fn u64_field(mut self, on: bool) -> Self {
        self.cfg.enable_u64_field = on;
        self
    }

    pub fn negative_timestamp(mut self, on: bool) -> Self {
        self.cfg.enable_negative_timestamp = on;
        self
    }

    pub fn extra_tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.cfg.extra_tags.insert(key.into(), value.into());
        self
    }

    pub fn key_sorted(mut self, on: bool) -> Self {
        self.cfg.key_sorted = on;
        self
    }

    pub fn precision(mut self, p: Precision) -> Self {
        self.cfg.precision = p;
        self
    }

    pub fn encoding(mut self, e: Encoding) -> Self {
        self.cfg.encoding = e;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Cfg> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
