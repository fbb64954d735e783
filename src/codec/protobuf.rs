//! Protobuf-compatible binary codec.
//!
//! Hand-written marshaling over fixed field numbers:
//!
//! ```text
//! Point  { name = 1, fields = 2 (repeated), time = 3, warns = 4, debugs = 5 }
//! Field  { key = 1, oneof { i = 2, u = 3, f = 4, b = 5, d = 6, a = 7, s = 11 },
//!          is_tag = 8, type = 9, unit = 10 }
//! Any    { type_url = 1, value = 2 }
//! Warn   { type = 1, msg = 2 }
//! Debug  { info = 1 }
//! Points { arr = 1 (repeated) }
//! ```
//!
//! Fields are written in the order a generated protobuf marshaler writes
//! them, so output is byte-identical to the prost messages in
//! [`super::pb`]. Proto3 defaults are skipped except inside the value
//! oneof, which is always written when set.

use crate::core::{Cfg, PointError, Result};
use crate::model::{AnyValue, DebugInfo, Field, MetricType, Point, RawValue, Value, ValueKind, Warn};
use crate::pool::{self, PointPool};

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Fields pulled from the pool at once when the batch path runs dry
const SLAB_CHUNK: usize = 32;

#[inline]
pub(crate) fn varint_len(v: u64) -> usize {
    ((64 - (v | 1).leading_zeros() as usize) + 6) / 7
}

#[inline]
fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

#[inline]
fn put_key(buf: &mut Vec<u8>, field: u32, wire: u8) {
    put_varint(buf, u64::from(field << 3 | u32::from(wire)));
}

#[inline]
fn put_bytes(buf: &mut Vec<u8>, field: u32, data: &[u8]) {
    put_key(buf, field, WIRE_LEN);
    put_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Size of a length-delimited entry with a one-byte key
#[inline]
fn len_entry(n: usize) -> usize {
    1 + varint_len(n as u64) + n
}

#[inline]
fn opt_str(s: &str) -> usize {
    if s.is_empty() {
        0
    } else {
        len_entry(s.len())
    }
}

fn any_size(a: &AnyValue) -> usize {
    opt_str(&a.type_url) + if a.value.is_empty() { 0 } else { len_entry(a.value.len()) }
}

fn value_size(v: &Value) -> usize {
    match v {
        Value::Nil => 0,
        Value::Int(i) => 1 + varint_len(*i as u64),
        Value::Uint(u) => 1 + varint_len(*u),
        Value::Float(_) => 1 + 8,
        Value::Bool(_) => 2,
        Value::Str(s) => len_entry(s.len()),
        Value::Bytes(d) => len_entry(d.len()),
        Value::Any(a) => len_entry(any_size(a)),
    }
}

fn field_size(f: &Field) -> usize {
    let mut n = opt_str(&f.key) + value_size(&f.value) + opt_str(&f.unit);
    if f.is_tag {
        n += 2;
    }
    if f.metric_type != MetricType::Unspecified {
        n += 1 + varint_len(f.metric_type as i32 as i64 as u64);
    }
    n
}

fn warn_size(w: &Warn) -> usize {
    opt_str(&w.kind) + opt_str(&w.message)
}

/// Exact encoded size of one point message (without any framing)
pub fn point_size(pt: &Point) -> usize {
    let mut n = opt_str(&pt.name);
    for f in pt.kvs.iter() {
        n += len_entry(field_size(f));
    }
    if pt.time != 0 {
        n += 1 + varint_len(pt.time as u64);
    }
    for w in &pt.warns {
        n += len_entry(warn_size(w));
    }
    for d in &pt.debugs {
        n += len_entry(opt_str(&d.info));
    }
    n
}

/// Size of a point framed as one `arr` entry of a points message
pub fn framed_size(pt: &Point) -> usize {
    len_entry(point_size(pt))
}

fn write_str(buf: &mut Vec<u8>, field: u32, s: &str) {
    if !s.is_empty() {
        put_bytes(buf, field, s.as_bytes());
    }
}

fn write_field(buf: &mut Vec<u8>, f: &Field) {
    write_str(buf, 1, &f.key);

    match &f.value {
        Value::Nil => {},
        Value::Int(i) => {
            put_key(buf, 2, WIRE_VARINT);
            put_varint(buf, *i as u64);
        },
        Value::Uint(u) => {
            put_key(buf, 3, WIRE_VARINT);
            put_varint(buf, *u);
        },
        Value::Float(v) => {
            put_key(buf, 4, WIRE_FIXED64);
            buf.extend_from_slice(&v.to_le_bytes());
        },
        Value::Bool(b) => {
            put_key(buf, 5, WIRE_VARINT);
            buf.push(u8::from(*b));
        },
        Value::Bytes(d) => put_bytes(buf, 6, d),
        Value::Any(a) => {
            put_key(buf, 7, WIRE_LEN);
            put_varint(buf, any_size(a) as u64);
            write_str(buf, 1, &a.type_url);
            if !a.value.is_empty() {
                put_bytes(buf, 2, &a.value);
            }
        },
        Value::Str(s) => put_bytes(buf, 11, s.as_bytes()),
    }

    if f.is_tag {
        put_key(buf, 8, WIRE_VARINT);
        buf.push(1);
    }
    if f.metric_type != MetricType::Unspecified {
        put_key(buf, 9, WIRE_VARINT);
        put_varint(buf, f.metric_type as i32 as i64 as u64);
    }
    write_str(buf, 10, &f.unit);
}

/// Append one point message to `buf` in a single forward pass, returning
/// the number of bytes written
pub fn append_point(buf: &mut Vec<u8>, pt: &Point) -> usize {
    let start = buf.len();
    write_str(buf, 1, &pt.name);

    for f in pt.kvs.iter() {
        put_key(buf, 2, WIRE_LEN);
        put_varint(buf, field_size(f) as u64);
        write_field(buf, f);
    }

    if pt.time != 0 {
        put_key(buf, 3, WIRE_VARINT);
        put_varint(buf, pt.time as u64);
    }

    for w in &pt.warns {
        put_key(buf, 4, WIRE_LEN);
        put_varint(buf, warn_size(w) as u64);
        write_str(buf, 1, &w.kind);
        write_str(buf, 2, &w.message);
    }

    for d in &pt.debugs {
        put_key(buf, 5, WIRE_LEN);
        put_varint(buf, opt_str(&d.info) as u64);
        write_str(buf, 1, &d.info);
    }

    buf.len() - start
}

/// Append a point as one `arr` entry of a points message
pub fn append_framed(buf: &mut Vec<u8>, pt: &Point) -> usize {
    let start = buf.len();
    put_key(buf, 1, WIRE_LEN);
    put_varint(buf, point_size(pt) as u64);
    append_point(buf, pt);
    buf.len() - start
}

/// Marshal a single point
pub fn marshal(pt: &Point) -> Vec<u8> {
    let mut buf = Vec::with_capacity(point_size(pt));
    append_point(&mut buf, pt);
    buf
}

/// Marshal points as one points message
pub fn marshal_batch(pts: &[Point]) -> Vec<u8> {
    let size: usize = pts.iter().map(framed_size).sum();
    let mut buf = Vec::with_capacity(size);
    for pt in pts {
        append_framed(&mut buf, pt);
    }
    buf
}

/// Cursor over wire bytes
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn varint(&mut self) -> Result<u64> {
        let mut v = 0u64;
        for shift in (0..64).step_by(7) {
            let Some(&b) = self.data.get(self.pos) else {
                return Err(PointError::protobuf("truncated varint"));
            };
            self.pos += 1;
            v |= u64::from(b & 0x7f) << shift;
            if b < 0x80 {
                return Ok(v);
            }
        }
        Err(PointError::protobuf("varint overflows 64 bits"))
    }

    fn key(&mut self) -> Result<(u32, u8)> {
        let k = self.varint()?;
        let field = (k >> 3) as u32;
        if field == 0 {
            return Err(PointError::protobuf("invalid field number 0"));
        }
        Ok((field, (k & 0x7) as u8))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| PointError::protobuf(format!("length {} overruns buffer", n)))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let n = self.varint()? as usize;
        self.take(n)
    }

    fn str(&mut self, what: &str) -> Result<&'a str> {
        let b = self.bytes()?;
        std::str::from_utf8(b).map_err(|_| PointError::protobuf(format!("invalid UTF-8 in {}", what)))
    }

    fn fixed64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn skip(&mut self, wire: u8) -> Result<()> {
        match wire {
            WIRE_VARINT => self.varint().map(drop),
            WIRE_FIXED64 => self.take(8).map(drop),
            WIRE_LEN => self.bytes().map(drop),
            WIRE_FIXED32 => self.take(4).map(drop),
            w => Err(PointError::protobuf(format!("unsupported wire type {}", w))),
        }
    }

    fn wire_is(&self, wire: u8, want: u8, field: &str) -> Result<()> {
        if wire == want {
            Ok(())
        } else {
            Err(PointError::protobuf(format!("bad wire type {} for {}", wire, field)))
        }
    }
}

/// Where decoded fields come from
enum FieldSource<'p> {
    /// One field at a time, from the pool if given
    Single(Option<&'p dyn PointPool>),
    /// Per-kind stacks refilled from the pool in chunks
    Slab(FieldSlab<'p>),
}

impl FieldSource<'_> {
    fn field(&mut self, key: &str, raw: RawValue<'_>, is_tag: bool) -> Field {
        match self {
            FieldSource::Single(pool) => pool::new_field(*pool, key, raw, is_tag),
            FieldSource::Slab(slab) => {
                let mut f = slab.take(raw.kind());
                f.fill(key, raw, is_tag);
                f
            },
        }
    }

    fn pool(&self) -> Option<&dyn PointPool> {
        match self {
            FieldSource::Single(pool) => *pool,
            FieldSource::Slab(slab) => Some(slab.pool),
        }
    }
}

/// Typed field stacks for decoding a whole buffer. Leftovers go back to
/// the pool on drop.
struct FieldSlab<'p> {
    pool: &'p dyn PointPool,
    stacks: [Vec<Field>; ValueKind::ALL.len()],
}

impl<'p> FieldSlab<'p> {
    fn new(pool: &'p dyn PointPool) -> Self {
        Self {
            pool,
            stacks: std::array::from_fn(|_| Vec::new()),
        }
    }

    fn take(&mut self, kind: ValueKind) -> Field {
        let stack = &mut self.stacks[kind.index()];
        if stack.is_empty() {
            stack.reserve(SLAB_CHUNK);
            for _ in 0..SLAB_CHUNK {
                stack.push(self.pool.get_field(kind));
            }
        }
        stack.pop().unwrap_or_default()
    }
}

impl Drop for FieldSlab<'_> {
    fn drop(&mut self) {
        for stack in &mut self.stacks {
            for f in stack.drain(..) {
                self.pool.put_field(f);
            }
        }
    }
}

fn decode_any(data: &[u8]) -> Result<(&str, &[u8])> {
    let mut r = Reader::new(data);
    let (mut url, mut value) = ("", &[][..]);
    while !r.is_empty() {
        match r.key()? {
            (1, w) => {
                r.wire_is(w, WIRE_LEN, "Any.type_url")?;
                url = r.str("Any.type_url")?;
            },
            (2, w) => {
                r.wire_is(w, WIRE_LEN, "Any.value")?;
                value = r.bytes()?;
            },
            (_, w) => r.skip(w)?,
        }
    }
    Ok((url, value))
}

fn decode_field(data: &[u8], src: &mut FieldSource<'_>) -> Result<Field> {
    let mut r = Reader::new(data);
    let mut key = "";
    let mut raw = RawValue::Nil;
    let mut is_tag = false;
    let mut metric_type = 0i32;
    let mut unit = "";

    while !r.is_empty() {
        let (num, wire) = r.key()?;
        match num {
            1 => {
                r.wire_is(wire, WIRE_LEN, "Field.key")?;
                key = r.str("Field.key")?;
            },
            2 => {
                r.wire_is(wire, WIRE_VARINT, "Field.i")?;
                raw = RawValue::Int(r.varint()? as i64);
            },
            3 => {
                r.wire_is(wire, WIRE_VARINT, "Field.u")?;
                raw = RawValue::Uint(r.varint()?);
            },
            4 => {
                r.wire_is(wire, WIRE_FIXED64, "Field.f")?;
                raw = RawValue::Float(f64::from_bits(r.fixed64()?));
            },
            5 => {
                r.wire_is(wire, WIRE_VARINT, "Field.b")?;
                raw = RawValue::Bool(r.varint()? != 0);
            },
            6 => {
                r.wire_is(wire, WIRE_LEN, "Field.d")?;
                raw = RawValue::Bytes(r.bytes()?);
            },
            7 => {
                r.wire_is(wire, WIRE_LEN, "Field.a")?;
                let (type_url, value) = decode_any(r.bytes()?)?;
                raw = RawValue::Any { type_url, value };
            },
            8 => {
                r.wire_is(wire, WIRE_VARINT, "Field.is_tag")?;
                is_tag = r.varint()? != 0;
            },
            9 => {
                r.wire_is(wire, WIRE_VARINT, "Field.type")?;
                metric_type = r.varint()? as i32;
            },
            10 => {
                r.wire_is(wire, WIRE_LEN, "Field.unit")?;
                unit = r.str("Field.unit")?;
            },
            11 => {
                r.wire_is(wire, WIRE_LEN, "Field.s")?;
                raw = RawValue::Str(r.str("Field.s")?);
            },
            _ => r.skip(wire)?,
        }
    }

    let mut f = src.field(key, raw, is_tag);
    f.unit.push_str(unit);
    f.metric_type = MetricType::from_i32(metric_type);
    Ok(f)
}

fn decode_point(data: &[u8], cfg: &Cfg, src: &mut FieldSource<'_>) -> Result<Point> {
    let mut r = Reader::new(data);
    let mut pt = pool::new_point(src.pool());
    let mut name = "";
    let mut time = 0i64;

    while !r.is_empty() {
        let (num, wire) = r.key()?;
        match num {
            1 => {
                r.wire_is(wire, WIRE_LEN, "Point.name")?;
                name = r.str("Point.name")?;
            },
            2 => {
                r.wire_is(wire, WIRE_LEN, "Point.fields")?;
                let f = decode_field(r.bytes()?, src)?;
                pt.kvs.push_raw(f);
            },
            3 => {
                r.wire_is(wire, WIRE_VARINT, "Point.time")?;
                time = r.varint()? as i64;
            },
            4 => {
                r.wire_is(wire, WIRE_LEN, "Point.warns")?;
                let mut wr = Reader::new(r.bytes()?);
                let mut w = Warn::new("", "");
                while !wr.is_empty() {
                    match wr.key()? {
                        (1, WIRE_LEN) => w.kind = wr.str("Warn.type")?.to_string(),
                        (2, WIRE_LEN) => w.message = wr.str("Warn.msg")?.to_string(),
                        (_, wt) => wr.skip(wt)?,
                    }
                }
                pt.warns.push(w);
            },
            5 => {
                r.wire_is(wire, WIRE_LEN, "Point.debugs")?;
                let mut dr = Reader::new(r.bytes()?);
                let mut d = DebugInfo { info: String::new() };
                while !dr.is_empty() {
                    match dr.key()? {
                        (1, WIRE_LEN) => d.info = dr.str("Debug.info")?.to_string(),
                        (_, wt) => dr.skip(wt)?,
                    }
                }
                pt.debugs.push(d);
            },
            _ => r.skip(wire)?,
        }
    }

    pt.set_name(name);
    pt.finalize(cfg, Some(time));
    Ok(pt)
}

/// Decode one point message, allocating one field per key (or drawing
/// from the installed default pool)
pub fn unmarshal(data: &[u8], cfg: &Cfg) -> Result<Point> {
    let pool = pool::default_pool();
    let mut src = FieldSource::Single(pool.as_deref().map(|b| &**b));
    decode_point(data, cfg, &mut src)
}

/// Decode a points message into `out`.
///
/// With a pool that recycles fields the typed slab path is used; without
/// one every field is allocated.
pub fn decode_batch_into(
    data: &[u8],
    cfg: &Cfg,
    pool: Option<&dyn PointPool>,
    out: &mut Vec<Point>,
) -> Result<()> {
    let mut src = match pool {
        Some(p) if p.tier() >= pool::PoolTier::Fields => FieldSource::Slab(FieldSlab::new(p)),
        other => FieldSource::Single(other),
    };

    let mut r = Reader::new(data);
    while !r.is_empty() {
        let (num, wire) = r.key()?;
        if num != 1 {
            r.skip(wire)?;
            continue;
        }
        r.wire_is(wire, WIRE_LEN, "Points.arr")?;
        let body = r.bytes()?;
        out.push(decode_point(body, cfg, &mut src)?);
    }
    Ok(())
}

/// [`decode_batch_into`] with the installed default pool
pub fn decode_batch(data: &[u8], cfg: &Cfg) -> Result<Vec<Point>> {
    let pool = pool::default_pool();
    let mut out = Vec::new();
    decode_batch_into(data, cfg, pool.as_deref().map(|b| &**b), &mut out)?;
    Ok(out)
}
