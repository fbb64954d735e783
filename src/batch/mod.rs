//! Encoding many points at once and decoding whole payloads.

pub mod decoder;
pub mod encoder;
pub mod pooled;

pub use decoder::{DecodeCallback, Decoder, DecoderOptions};
pub use encoder::{BatchCallback, BatchIter, Encoder, EncoderOptions};
pub use pooled::{get_decoder, get_encoder, PooledDecoder, PooledEncoder};
