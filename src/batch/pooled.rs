//! Reusable encoders and decoders.
//!
//! Handles taken from [`get_encoder`] and [`get_decoder`] go back to a
//! bounded lock-free free list when dropped, keeping their scratch buffers
//! for the next caller.

use super::decoder::{Decoder, DecoderOptions};
use super::encoder::{Encoder, EncoderOptions};
use crossbeam::queue::ArrayQueue;
use once_cell::sync::Lazy;
use std::ops::{Deref, DerefMut};

static ENCODERS: Lazy<ArrayQueue<Encoder>> = Lazy::new(|| ArrayQueue::new(crate::pool::env_capacity()));

static DECODERS: Lazy<ArrayQueue<Decoder>> = Lazy::new(|| ArrayQueue::new(crate::pool::env_capacity()));

/// An encoder that returns to the shared free list on drop
pub struct PooledEncoder {
    inner: Encoder,
}

/// Take an encoder configured with `opts`
pub fn get_encoder(opts: EncoderOptions) -> PooledEncoder {
    let inner = match ENCODERS.pop() {
        Some(mut enc) => {
            enc.reconfigure(opts);
            enc
        },
        None => Encoder::new(opts),
    };
    PooledEncoder { inner }
}

impl Drop for PooledEncoder {
    fn drop(&mut self) {
        let mut enc = std::mem::replace(&mut self.inner, Encoder::new(EncoderOptions::default()));
        enc.reconfigure(EncoderOptions::default());
        let _ = ENCODERS.push(enc);
    }
}

impl Deref for PooledEncoder {
    type Target = Encoder;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for PooledEncoder {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// A decoder that returns to the shared free list on drop
pub struct PooledDecoder {
    inner: Decoder,
}

/// Take a decoder configured with `opts`
pub fn get_decoder(opts: DecoderOptions) -> PooledDecoder {
    let inner = match DECODERS.pop() {
        Some(mut dec) => {
            dec.reconfigure(opts);
            dec
        },
        None => Decoder::new(opts),
    };
    PooledDecoder { inner }
}

impl Drop for PooledDecoder {
    fn drop(&mut self) {
        let mut dec = std::mem::replace(&mut self.inner, Decoder::new(DecoderOptions::default()));
        dec.reconfigure(DecoderOptions::default());
        let _ = DECODERS.push(dec);
    }
}

impl Deref for PooledDecoder {
    type Target = Decoder;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for PooledDecoder {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
