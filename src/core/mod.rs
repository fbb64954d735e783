//! Ambient pieces shared by every other module: errors, configuration
//! and the measurement-name intern table.

pub mod config;
pub mod error;
pub mod string_intern;

// Re-export commonly used types
pub use config::{Cfg, CfgBuilder, Encoding, Precision, RequiredKey, DEFAULT_MEASUREMENT, ENV_DEFAULT_ENCODING};
pub use error::{LineProtoError, PointError, Result};
