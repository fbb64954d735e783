//! Payload decoding into points.

use crate::codec::{json, lineproto, protobuf};
use crate::core::{Cfg, Encoding, LineProtoError, PointError, Precision, Result};
use crate::model::Point;
use crate::pool::{self, PointPool};
use std::sync::Arc;

/// Called once per decoded payload; an error stops decoding
pub type DecodeCallback = Box<dyn FnMut(&[Point]) -> Result<()> + Send>;

#[derive(Debug, Clone)]
pub struct DecoderOptions {
    pub encoding: Encoding,
    /// Unit of line-protocol timestamps
    pub precision: Precision,
    /// Applied to every decoded point
    pub cfg: Cfg,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::process_default(),
            precision: Precision::Ns,
            cfg: Cfg::default(),
        }
    }
}

impl DecoderOptions {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn precision(mut self, p: Precision) -> Self {
        self.precision = p;
        self
    }

    #[must_use]
    pub fn cfg(mut self, cfg: Cfg) -> Self {
        self.cfg = cfg;
        self
    }
}

/// Decodes payloads of one encoding into points.
///
/// Points come from the decoder's own pool when one is set, otherwise from
/// the installed default pool. After a failed line-protocol decode the
/// position of the failure is available from [`Decoder::detailed_error`].
pub struct Decoder {
    opts: DecoderOptions,
    pool: Option<Arc<Box<dyn PointPool>>>,
    callback: Option<DecodeCallback>,
    detailed: Option<LineProtoError>,
}

impl Decoder {
    pub fn new(opts: DecoderOptions) -> Self {
        Self {
            opts,
            pool: None,
            callback: None,
            detailed: None,
        }
    }

    #[must_use]
    pub fn with_pool(mut self, pool: Arc<Box<dyn PointPool>>) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_callback<F>(mut self, f: F) -> Self
    where
        F: FnMut(&[Point]) -> Result<()> + Send + 'static,
    {
        self.callback = Some(Box::new(f));
        self
    }

    pub fn set_callback(&mut self, cb: Option<DecodeCallback>) {
        self.callback = cb;
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.opts
    }

    /// Line, column and snippet of the last line-protocol failure
    pub fn detailed_error(&self) -> Option<&LineProtoError> {
        self.detailed.as_ref()
    }

    pub(crate) fn reconfigure(&mut self, opts: DecoderOptions) {
        self.opts = opts;
        self.pool = None;
        self.callback = None;
        self.detailed = None;
    }

    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<Point>> {
        self.detailed = None;
        if data.is_empty() {
            return Err(PointError::EmptyInput);
        }

        let pool = self.pool.clone().or_else(pool::default_pool);
        let pool = pool.as_deref().map(|b| &**b);
        let cfg = &self.opts.cfg;
        let mut pts = Vec::new();

        match self.opts.encoding {
            Encoding::LineProtocol => {
                let text = std::str::from_utf8(data).map_err(|e| {
                    let head = &data[..e.valid_up_to()];
                    let line_start = head.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
                    let line = head.iter().filter(|b| **b == b'\n').count() + 1;
                    let snippet = String::from_utf8_lossy(&head[line_start..]);
                    let detail = LineProtoError::new(
                        line,
                        head.len() - line_start + 1,
                        &snippet,
                        "payload is not valid UTF-8",
                    );
                    let err = detail.simplified();
                    self.detailed = Some(detail);
                    err
                })?;
                lineproto::decode_into(text, self.opts.precision, cfg, pool, &mut pts).map_err(|detail| {
                    tracing::debug!(line = detail.line, column = detail.column, "line protocol rejected");
                    let err = detail.simplified();
                    self.detailed = Some(detail);
                    err
                })?;
            },
            Encoding::Protobuf => protobuf::decode_batch_into(data, cfg, pool, &mut pts)?,
            Encoding::Json => json::decode_into(data, cfg, pool, &mut pts)?,
        }

        if let Some(cb) = self.callback.as_mut() {
            if let Err(e) = cb(&pts) {
                tracing::warn!(error = %e, points = pts.len(), "decode callback failed");
                return Err(e);
            }
        }

        Ok(pts)
    }
}
