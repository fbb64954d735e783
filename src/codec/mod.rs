//! Wire codecs. Each has independent encode and decode paths; the batch
//! module drives them over many points.

pub mod json;
pub mod lineproto;
pub mod pb;
pub mod protobuf;

pub use lineproto::LpOptions;
