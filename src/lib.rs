//! Ingest point - the telemetry point model and its wire codecs.
//!
//! A [`Point`] is a named, timestamped event carrying ordered tags and typed
//! fields. Points move between three mutually compatible encodings and are
//! repaired, not rejected, when they break configured limits.
//!
//! # Features
//!
//! - **Fail-soft checking**: invalid input is truncated, renamed or dropped
//!   and recorded as warnings on the point
//! - **Three codecs**: InfluxDB line protocol, protobuf-compatible binary
//!   and JSON
//! - **Size-bounded batches**: encode into caller buffers with bounded
//!   trimming when estimates fall short
//! - **Pooling**: tiered lock-free reuse of points, fields and values
//!
//! # Architecture
//!
//! - `model`: points, KVs, fields and values
//! - `core`: configuration, errors and name interning
//! - `check`: the checker applying a configuration to a point
//! - `codec`: line protocol, binary and JSON encodings
//! - `batch`: streaming batch encoder and payload decoder
//! - `pool`: point pools and the process default pool
//! - `view`: mutable point view for script pipelines
//!
//! # Example
//!
//! ```
//! use ingest_point::{CfgBuilder, Encoder, EncoderOptions, Encoding, KVs, Point};
//!
//! let cfg = CfgBuilder::new().time(1_700_000_000_000_000_000).build()?;
//! let pt = Point::new("cpu", KVs::new().add_tag("host", "h1").add_field("usage", 0.5), &cfg);
//! assert_eq!(pt.line_proto(), "cpu,host=h1 usage=0.5 1700000000000000000");
//!
//! let mut enc = Encoder::new(EncoderOptions::new(Encoding::Protobuf).bytes_size(4096));
//! let batches = enc.encode(&[pt])?;
//! assert_eq!(batches.len(), 1);
//! # Ok::<(), ingest_point::PointError>(())
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod batch;
pub mod check;
pub mod codec;
pub mod core;
pub mod model;
pub mod pool;
pub mod view;

// Re-export core types for convenience
pub use crate::batch::{get_decoder, get_encoder, Decoder, DecoderOptions, Encoder, EncoderOptions};
pub use crate::check::Checker;
pub use crate::core::{Cfg, CfgBuilder, Encoding, LineProtoError, PointError, Precision, RequiredKey, Result};
pub use crate::model::{AnyValue, Field, KVs, MetricType, Point, Value};
pub use crate::pool::{PointPool, PoolTier, TieredPool};
pub use crate::view::PointView;
