//! Size-bounded batch encoding.

use crate::codec::{json, lineproto, protobuf, LpOptions};
use crate::core::{Encoding, PointError, Precision, Result};
use crate::model::{Point, PointFlags};
use bytes::Bytes;

/// Called with the batch index and payload of every encoded batch
pub type BatchCallback = Box<dyn FnMut(usize, &[u8]) -> Result<()> + Send>;

/// How points are split into batches
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOptions {
    pub encoding: Encoding,
    /// Maximum points per batch (0 = unlimited)
    pub batch_size: usize,
    /// Maximum bytes per batch (0 = unlimited); wins over `batch_size`
    pub bytes_size: usize,
    /// Skip, and count, a point that cannot fit `bytes_size` alone instead
    /// of failing
    pub ignore_large_point: bool,
    /// Line-protocol timestamp precision
    pub precision: Precision,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::process_default(),
            batch_size: 0,
            bytes_size: 0,
            ignore_large_point: false,
            precision: Precision::Ns,
        }
    }
}

impl EncoderOptions {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    #[must_use]
    pub fn bytes_size(mut self, n: usize) -> Self {
        self.bytes_size = n;
        self
    }

    #[must_use]
    pub fn ignore_large_point(mut self, on: bool) -> Self {
        self.ignore_large_point = on;
        self
    }

    #[must_use]
    pub fn precision(mut self, p: Precision) -> Self {
        self.precision = p;
        self
    }
}

/// Batch encoder owning its scratch buffers.
///
/// One encoder serves one caller at a time; reuse it (or take one from
/// [`super::get_encoder`]) to keep its buffers warm.
pub struct Encoder {
    opts: EncoderOptions,
    callback: Option<BatchCallback>,
    text: String,
    bin: Vec<u8>,
    /// End offset in the scratch buffer of each candidate point
    ends: Vec<usize>,
    /// Whether each candidate point produced any output
    emitted: Vec<bool>,
    skipped: usize,
}

impl Encoder {
    pub fn new(opts: EncoderOptions) -> Self {
        Self {
            opts,
            callback: None,
            text: String::new(),
            bin: Vec::new(),
            ends: Vec::new(),
            emitted: Vec::new(),
            skipped: 0,
        }
    }

    #[must_use]
    pub fn with_callback<F>(mut self, f: F) -> Self
    where
        F: FnMut(usize, &[u8]) -> Result<()> + Send + 'static,
    {
        self.callback = Some(Box::new(f));
        self
    }

    pub fn set_callback(&mut self, cb: Option<BatchCallback>) {
        self.callback = cb;
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.opts
    }

    /// Points skipped so far: too large for the buffer (when ignored) or
    /// with nothing to encode
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Forget options, callback and counters; buffers are kept
    pub(crate) fn reconfigure(&mut self, opts: EncoderOptions) {
        self.opts = opts;
        self.callback = None;
        self.skipped = 0;
        self.text.clear();
        self.bin.clear();
        self.ends.clear();
        self.emitted.clear();
    }

    /// Encode all points into batches as configured
    pub fn encode(&mut self, pts: &[Point]) -> Result<Vec<Bytes>> {
        let mut out = Vec::new();
        if pts.is_empty() {
            return Ok(out);
        }

        if self.opts.bytes_size > 0 {
            let mut buf = vec![0u8; self.opts.bytes_size];
            let mut it = self.batches(pts);
            while let Some(batch) = it.next(&mut buf)? {
                if let Some(cb) = it.enc.callback.as_mut() {
                    cb(out.len(), batch)?;
                }
                out.push(Bytes::copy_from_slice(batch));
            }
            return Ok(out);
        }

        let chunk = if self.opts.batch_size > 0 {
            self.opts.batch_size
        } else {
            pts.len()
        };

        for part in pts.chunks(chunk) {
            self.encode_candidates(part)?;
            let emitted = self.emitted.iter().filter(|e| **e).count();
            self.skipped += part.len() - emitted;
            if emitted == 0 {
                continue;
            }

            let len = self.framed_len(part.len());
            let mut payload = Vec::with_capacity(len);
            payload.extend_from_slice(&self.scratch()[..self.ends[part.len() - 1]]);
            if self.opts.encoding == Encoding::Json {
                payload.push(b']');
            }

            if let Some(cb) = self.callback.as_mut() {
                cb(out.len(), &payload)?;
            }
            out.push(Bytes::from(payload));
        }

        tracing::trace!(batches = out.len(), skipped = self.skipped, "encoded points");
        Ok(out)
    }

    /// Iterate over batches of `pts`, each filled into a caller buffer
    pub fn batches<'e, 'p>(&'e mut self, pts: &'p [Point]) -> BatchIter<'e, 'p> {
        BatchIter { enc: self, pts, pos: 0 }
    }

    fn scratch(&self) -> &[u8] {
        match self.opts.encoding {
            Encoding::LineProtocol => self.text.as_bytes(),
            _ => &self.bin,
        }
    }

    /// Estimated framed size of one point, without separator
    fn estimate(&self, pt: &Point) -> usize {
        match self.opts.encoding {
            Encoding::Protobuf => protobuf::framed_size(pt),
            enc => pt.size_hint(enc),
        }
    }

    fn separator_len(&self) -> usize {
        usize::from(self.opts.encoding != Encoding::Protobuf)
    }

    /// Bytes of the first `n` candidates once framed
    fn framed_len(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let body = self.ends[n - 1];
        match self.opts.encoding {
            Encoding::Json => body + 1,
            _ => body,
        }
    }

    /// Encode candidates once into scratch, recording where each ends
    fn encode_candidates(&mut self, pts: &[Point]) -> Result<()> {
        self.begin_candidates();
        for pt in pts {
            self.append_candidate(pt)?;
        }
        Ok(())
    }

    fn begin_candidates(&mut self) {
        self.text.clear();
        self.bin.clear();
        self.ends.clear();
        self.emitted.clear();
        if self.opts.encoding == Encoding::Json {
            self.bin.push(b'[');
        }
    }

    /// Append one more candidate after the ones already in scratch
    fn append_candidate(&mut self, pt: &Point) -> Result<()> {
        match self.opts.encoding {
            Encoding::LineProtocol => {
                let mark = self.text.len();
                if !self.text.is_empty() {
                    self.text.push('\n');
                }
                let opts = LpOptions {
                    precision: self.opts.precision,
                    enable_u64_field: pt.flags().contains(PointFlags::U64_FIELDS),
                };
                let n = lineproto::append_point(&mut self.text, pt, &opts);
                if n == 0 {
                    self.text.truncate(mark);
                }
                self.emitted.push(n > 0);
                self.ends.push(self.text.len());
            },
            Encoding::Protobuf => {
                protobuf::append_framed(&mut self.bin, pt);
                self.emitted.push(true);
                self.ends.push(self.bin.len());
            },
            Encoding::Json => {
                if !self.ends.is_empty() {
                    self.bin.push(b',');
                }
                json::append_point(&mut self.bin, pt)?;
                self.emitted.push(true);
                self.ends.push(self.bin.len());
            },
        }
        Ok(())
    }
}

/// Cursor over the batches of one point slice.
///
/// The scan position only moves forward, so every call either yields a
/// batch, skips a point, fails, or reports the end.
pub struct BatchIter<'e, 'p> {
    enc: &'e mut Encoder,
    pts: &'p [Point],
    pos: usize,
}

impl BatchIter<'_, '_> {
    /// Index of the next point to encode
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Fill `buf` with the next batch and return the used prefix.
    ///
    /// Points are picked by estimated size, encoded once, then extended one
    /// at a time while the real encoded batch still fits. The overflowing
    /// tail is trimmed (1, 2, 4, ... at a time) and points the last step
    /// dropped needlessly are taken back, so a batch holds as many points
    /// as `buf` allows. A point that cannot fit alone fails with
    /// [`PointError::PointTooLarge`] unless large points are ignored.
    pub fn next<'b>(&mut self, buf: &'b mut [u8]) -> Result<Option<&'b [u8]>> {
        let cap = buf.len();
        let framing = usize::from(self.enc.opts.encoding == Encoding::Json) * 2;

        loop {
            if self.pos >= self.pts.len() {
                return Ok(None);
            }

            let start = self.pos;
            let mut end = start;
            let mut est = framing;
            while end < self.pts.len() {
                let mut sz = self.enc.estimate(&self.pts[end]);
                if end > start {
                    sz += self.enc.separator_len();
                }
                if est + sz > cap && end > start {
                    break;
                }
                est += sz;
                end += 1;
                if est > cap {
                    break;
                }
            }

            // Estimates only seed the selection; real sizes decide it
            self.enc.begin_candidates();
            for pt in &self.pts[start..end] {
                self.enc.append_candidate(pt)?;
            }
            while end < self.pts.len() && self.enc.framed_len(end - start) <= cap {
                self.enc.append_candidate(&self.pts[end])?;
                end += 1;
            }

            let total = end - start;
            let mut n = total;
            let mut step = 1;
            while n > 0 && self.enc.framed_len(n) > cap {
                n = if n > step {
                    n - step
                } else if n > 1 {
                    1
                } else {
                    0
                };
                step *= 2;
            }
            // The last doubling step may drop points that still fit
            while n > 0 && n < total && self.enc.framed_len(n + 1) <= cap {
                n += 1;
            }

            if n == 0 {
                let size = self.enc.framed_len(1);
                if !self.enc.opts.ignore_large_point {
                    return Err(PointError::PointTooLarge { size, max: cap });
                }
                tracing::warn!(
                    point = start,
                    size,
                    max = cap,
                    "skipping point larger than the batch buffer"
                );
                self.enc.skipped += 1;
                self.pos += 1;
                continue;
            }

            self.pos = start + n;
            let empty = self.enc.emitted[..n].iter().filter(|e| !**e).count();
            self.enc.skipped += empty;
            if empty == n {
                continue;
            }

            let body = self.enc.ends[n - 1];
            buf[..body].copy_from_slice(&self.enc.scratch()[..body]);
            let len = self.enc.framed_len(n);
            if len > body {
                buf[body] = b']';
            }
            return Ok(Some(&buf[..len]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Cfg, CfgBuilder};
    use crate::model::KVs;

    fn cfg() -> Cfg {
        CfgBuilder::new().time(1_000).build().unwrap()
    }

    fn points(n: usize) -> Vec<Point> {
        let c = cfg();
        (0..n)
            .map(|i| Point::new("m", KVs::new().add_field("v", (i % 10) as i64), &c))
            .collect()
    }

    #[test]
    fn test_single_batch_line_protocol() {
        let mut enc = Encoder::new(EncoderOptions::new(Encoding::LineProtocol));
        let out = enc.encode(&points(3)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], b"m v=0i 1000\nm v=1i 1000\nm v=2i 1000");
    }

    #[test]
    fn test_batch_size_split() {
        let mut enc = Encoder::new(EncoderOptions::new(Encoding::LineProtocol).batch_size(2));
        let out = enc.encode(&points(5)).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(&out[2][..], b"m v=4i 1000");
    }

    #[test]
    fn test_bytes_size_wins_over_batch_size() {
        let line = "m v=0i 1000".len();
        let opts = EncoderOptions::new(Encoding::LineProtocol)
            .batch_size(100)
            .bytes_size(line * 2 + 1);
        let mut enc = Encoder::new(opts);
        let out = enc.encode(&points(6)).unwrap();
        assert_eq!(out.len(), 3);
        for b in &out {
            assert!(b.len() <= line * 2 + 1);
        }
    }

    #[test]
    fn test_overestimated_points_still_fill_buffer() {
        // Floats are estimated far wider than "0.5"
        let c = cfg();
        let pts: Vec<Point> = (0..12)
            .map(|_| Point::new("m", KVs::new().add_field("v", 0.5), &c))
            .collect();
        let line = "m v=0.5 1000".len();
        assert!(pts[0].size_hint(Encoding::LineProtocol) > line);

        let mut enc = Encoder::new(EncoderOptions::new(Encoding::LineProtocol).bytes_size(line * 4 + 3));
        let out = enc.encode(&pts).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|b| b.len() == line * 4 + 3));
    }

    #[test]
    fn test_exact_fit_is_included() {
        let pts = points(1);
        let size = protobuf::framed_size(&pts[0]);
        let mut enc = Encoder::new(EncoderOptions::new(Encoding::Protobuf));
        let mut buf = vec![0u8; size];
        let mut it = enc.batches(&pts);
        let batch = it.next(&mut buf).unwrap().unwrap();
        assert_eq!(batch.len(), size);
        assert!(it.next(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_large_point_error_or_skip() {
        let c = cfg();
        let mut pts = points(2);
        pts.insert(1, Point::new("m", KVs::new().add_field("s", "x".repeat(500)), &c));

        let mut enc = Encoder::new(EncoderOptions::new(Encoding::Protobuf).bytes_size(64));
        let err = enc.encode(&pts).unwrap_err();
        assert!(matches!(err, PointError::PointTooLarge { max: 64, .. }));

        let mut enc = Encoder::new(
            EncoderOptions::new(Encoding::Protobuf)
                .bytes_size(64)
                .ignore_large_point(true),
        );
        let out = enc.encode(&pts).unwrap();
        assert_eq!(enc.skipped(), 1);
        let total: usize = out
            .iter()
            .map(|b| protobuf::decode_batch(b, &c).unwrap().len())
            .sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_underestimated_points_are_trimmed() {
        // Escapes are not part of the estimate
        let c = cfg();
        let pts: Vec<Point> = (0..8)
            .map(|_| Point::new("m", KVs::new().add_tag("t", ", , , , , ,").add_field("v", 1), &c))
            .collect();
        let real = pts[0].line_proto().len();

        let mut enc = Encoder::new(EncoderOptions::new(Encoding::LineProtocol));
        let mut buf = vec![0u8; real * 3 + 2];
        let buf_len = buf.len();
        let mut it = enc.batches(&pts);
        let mut seen = 0;
        let mut last = 0;
        while let Some(b) = it.next(&mut buf).unwrap() {
            assert!(b.len() <= buf_len);
            seen += b.split(|c| *c == b'\n').count();
            assert!(it.position() > last);
            last = it.position();
        }
        assert_eq!(seen, 8);
    }

    #[test]
    fn test_json_batches_are_arrays() {
        let c = CfgBuilder::new().time(5).encoding(Encoding::Json).build().unwrap();
        let pts: Vec<Point> = (0..4)
            .map(|i| Point::new("m", KVs::new().add_field("v", i), &c))
            .collect();
        let one = json::marshal(&pts[0]).unwrap().len();

        let mut enc = Encoder::new(EncoderOptions::new(Encoding::Json).bytes_size(one * 2 + 3));
        let out = enc.encode(&pts).unwrap();
        assert!(out.len() >= 2);
        let mut total = 0;
        for b in &out {
            assert_eq!(b.first(), Some(&b'['));
            assert_eq!(b.last(), Some(&b']'));
            total += json::decode(b, &c).unwrap().len();
        }
        assert_eq!(total, 4);
    }

    #[test]
    fn test_unencodable_points_counted() {
        let c = CfgBuilder::new().time(1).precheck(false).build().unwrap();
        let pts = vec![
            Point::new("m", KVs::new().add_field("v", 1), &c),
            Point::new("m", KVs::new().add_field("nan", f64::NAN), &c),
        ];
        let mut enc = Encoder::new(EncoderOptions::new(Encoding::LineProtocol));
        let out = enc.encode(&pts).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], b"m v=1i 1");
        assert_eq!(enc.skipped(), 1);
    }

    #[test]
    fn test_callback_sees_every_batch_and_can_abort() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut enc = Encoder::new(EncoderOptions::new(Encoding::LineProtocol).batch_size(1))
            .with_callback(move |_, _| {
                seen.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        enc.encode(&points(3)).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 3);

        let mut enc = Encoder::new(EncoderOptions::new(Encoding::LineProtocol).batch_size(1))
            .with_callback(|i, _| {
                if i == 1 {
                    Err(PointError::callback("stop"))
                } else {
                    Ok(())
                }
            });
        assert!(matches!(enc.encode(&points(3)), Err(PointError::Callback(_))));
    }
}
