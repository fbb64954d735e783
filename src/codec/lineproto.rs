//! InfluxDB-style line protocol.
//!
//! `measurement[,tag=val...] field=val[,field=val...] timestamp`
//!
//! Encoding appends to a caller-owned buffer so the batch encoder can build
//! multi-point payloads without a temporary per point. Decoding is written
//! with nom and walks the payload sequentially: string field values may
//! contain raw newlines, so the input cannot simply be split on `\n`.

use crate::core::{Cfg, LineProtoError, Precision};
use crate::model::{Point, PointFlags, RawValue, Value};
use crate::pool::{self, PointPool};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, space0, space1},
    combinator::{map, map_res, opt, recognize, value as nom_value},
    error::{context, ContextError, ErrorKind, ParseError, VerboseError, VerboseErrorKind},
    multi::{many0, separated_list1},
    sequence::{pair, preceded, separated_pair, tuple},
    IResult,
};
use std::borrow::Cow;
use std::fmt::Write as _;

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

const MEASUREMENT_ESCAPES: &[char] = &[',', ' '];
const KEY_ESCAPES: &[char] = &[',', '=', ' '];

/// Encoding knobs
#[derive(Debug, Clone, Copy)]
pub struct LpOptions {
    pub precision: Precision,
    /// Emit u64 values above `i64::MAX` with the `u` suffix instead of
    /// omitting them
    pub enable_u64_field: bool,
}

impl Default for LpOptions {
    fn default() -> Self {
        Self {
            precision: Precision::Ns,
            enable_u64_field: false,
        }
    }
}

impl LpOptions {
    /// Options matching how a point was built
    pub fn for_point(pt: &Point) -> Self {
        Self {
            precision: Precision::Ns,
            enable_u64_field: pt.flags().contains(PointFlags::U64_FIELDS),
        }
    }

    pub fn from_cfg(cfg: &Cfg) -> Self {
        Self {
            precision: cfg.precision,
            enable_u64_field: cfg.enable_u64_field,
        }
    }
}

fn escape_into(buf: &mut String, s: &str, special: &[char]) {
    if !s.contains(special) {
        buf.push_str(s);
        return;
    }
    for c in s.chars() {
        if special.contains(&c) {
            buf.push('\\');
        }
        buf.push(c);
    }
}

fn quote_into(buf: &mut String, s: &str) {
    buf.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            buf.push('\\');
        }
        buf.push(c);
    }
    buf.push('"');
}

/// Write one field value; false if the value has no line-protocol form
fn write_value(buf: &mut String, v: &Value, opts: &LpOptions) -> bool {
    match v {
        Value::Int(i) => {
            let _ = write!(buf, "{}i", i);
        },
        Value::Uint(u) if *u <= i64::MAX as u64 => {
            let _ = write!(buf, "{}i", u);
        },
        Value::Uint(u) if opts.enable_u64_field => {
            let _ = write!(buf, "{}u", u);
        },
        Value::Float(f) if f.is_finite() => {
            let _ = write!(buf, "{}", f);
        },
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Str(s) => quote_into(buf, s),
        Value::Bytes(d) => quote_into(buf, &String::from_utf8_lossy(d)),
        _ => return false,
    }
    true
}

/// Append one point to `buf`, returning the number of bytes written.
///
/// Tags with empty values and fields without a line-protocol form are left
/// out. A point left with no field at all writes nothing and returns 0.
pub fn append_point(buf: &mut String, pt: &Point, opts: &LpOptions) -> usize {
    let start = buf.len();
    escape_into(buf, pt.name(), MEASUREMENT_ESCAPES);

    for t in pt.kvs().tags() {
        let Some(v) = t.value().as_str() else { continue };
        if v.is_empty() || t.key().is_empty() {
            continue;
        }
        buf.push(',');
        escape_into(buf, t.key(), KEY_ESCAPES);
        buf.push('=');
        escape_into(buf, v, KEY_ESCAPES);
    }

    let mut sep = ' ';
    let mut written = 0;
    for f in pt.kvs().fields() {
        let mark = buf.len();
        buf.push(sep);
        escape_into(buf, f.key(), KEY_ESCAPES);
        buf.push('=');
        if !write_value(buf, f.value(), opts) {
            buf.truncate(mark);
            continue;
        }
        sep = ',';
        written += 1;
    }

    if written == 0 {
        buf.truncate(start);
        return 0;
    }

    let _ = write!(buf, " {}", opts.precision.from_nanos(pt.time()));
    buf.len() - start
}

fn digits(v: u64) -> usize {
    v.checked_ilog10().map_or(1, |d| d as usize + 1)
}

fn signed_len(v: i64) -> usize {
    digits(v.unsigned_abs()) + usize::from(v < 0)
}

/// Size estimate for one encoded line. Escapes are not counted, so it may
/// fall short for keys full of separators; floats are assumed wide.
pub fn size_hint(pt: &Point) -> usize {
    let kv: usize = pt
        .kvs()
        .iter()
        .map(|f| {
            let v = match f.value() {
                Value::Int(i) => signed_len(*i) + 1,
                Value::Uint(u) => digits(*u) + 1,
                Value::Float(_) => 24,
                Value::Bool(_) => 5,
                other if f.is_tag() => other.payload_len(),
                other => other.payload_len() + 2,
            };
            f.key().len() + v + 2
        })
        .sum();
    pt.name().len() + kv + 1 + signed_len(pt.time())
}

#[derive(Debug, Clone, PartialEq)]
enum LpValue<'a> {
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Str(Cow<'a, str>),
}

impl LpValue<'_> {
    fn as_raw(&self) -> RawValue<'_> {
        match self {
            LpValue::Int(i) => RawValue::Int(*i),
            LpValue::Uint(u) => RawValue::Uint(*u),
            LpValue::Float(f) => RawValue::Float(*f),
            LpValue::Bool(b) => RawValue::Bool(*b),
            LpValue::Str(s) => RawValue::Str(s),
        }
    }
}

#[derive(Debug)]
struct Line<'a> {
    measurement: Cow<'a, str>,
    tags: Vec<(Cow<'a, str>, Cow<'a, str>)>,
    fields: Vec<(Cow<'a, str>, LpValue<'a>)>,
    timestamp: Option<i64>,
}

/// An unescaping token ending at an unescaped stop char, space or newline
fn token<'a>(stops: &'static [char]) -> impl Fn(&'a str) -> Res<'a, Cow<'a, str>> {
    move |input: &'a str| {
        let mut owned: Option<String> = None;
        let mut chars = input.char_indices().peekable();
        let mut end = input.len();

        while let Some((i, c)) = chars.next() {
            if c == '\\' {
                if let Some(&(_, next)) = chars.peek() {
                    if stops.contains(&next) || next == ' ' {
                        let buf = owned.get_or_insert_with(|| input[..i].to_string());
                        buf.push(next);
                        chars.next();
                        continue;
                    }
                }
            } else if stops.contains(&c) || c == ' ' || c == '\n' || c == '\r' {
                end = i;
                break;
            }
            if let Some(buf) = owned.as_mut() {
                buf.push(c);
            }
        }

        if end == 0 {
            return Err(nom::Err::Error(VerboseError::from_error_kind(
                input,
                ErrorKind::TakeWhile1,
            )));
        }

        let tok = match owned {
            Some(s) => Cow::Owned(s),
            None => Cow::Borrowed(&input[..end]),
        };
        Ok((&input[end..], tok))
    }
}

fn measurement(input: &str) -> Res<'_, Cow<'_, str>> {
    context("measurement", token(&[',']))(input)
}

fn key(input: &str) -> Res<'_, Cow<'_, str>> {
    token(&[',', '='])(input)
}

fn tag_pair(input: &str) -> Res<'_, (Cow<'_, str>, Cow<'_, str>)> {
    context("tag", separated_pair(key, char('='), token(&[',', '='])))(input)
}

/// Double-quoted string; `\"` and `\\` unescape, raw newlines are kept
fn quoted(input: &str) -> Res<'_, Cow<'_, str>> {
    let (body, _) = char('"')(input)?;

    let mut owned: Option<String> = None;
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                let s = match owned {
                    Some(s) => Cow::Owned(s),
                    None => Cow::Borrowed(&body[..i]),
                };
                return Ok((&body[i + 1..], s));
            },
            '\\' => {
                let buf = owned.get_or_insert_with(|| body[..i].to_string());
                match chars.next() {
                    Some((_, e @ ('"' | '\\'))) => buf.push(e),
                    Some((_, other)) => {
                        buf.push('\\');
                        buf.push(other);
                    },
                    None => break,
                }
            },
            c => {
                if let Some(buf) = owned.as_mut() {
                    buf.push(c);
                }
            },
        }
    }

    Err(nom::Err::Error(VerboseError::add_context(
        body,
        "closing quote",
        VerboseError::from_error_kind(body, ErrorKind::Char),
    )))
}

fn boolean(input: &str) -> Res<'_, bool> {
    alt((
        nom_value(true, alt((tag("true"), tag("True"), tag("TRUE"), tag("t"), tag("T")))),
        nom_value(false, alt((tag("false"), tag("False"), tag("FALSE"), tag("f"), tag("F")))),
    ))(input)
}

fn number<'a>(input: &'a str) -> Res<'a, LpValue<'a>> {
    let digits = take_while1(|c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'));
    map_res(pair(digits, opt(alt((char('i'), char('u'))))), |(n, suffix): (&str, Option<char>)| {
        match suffix {
            Some('i') => n.parse().map(LpValue::Int).map_err(|e| e.to_string()),
            Some(_) => n.parse().map(LpValue::Uint).map_err(|e| e.to_string()),
            None => n.parse().map(LpValue::Float).map_err(|e| e.to_string()),
        }
    })(input)
}

fn field_value(input: &str) -> Res<'_, LpValue<'_>> {
    context(
        "field value",
        alt((
            map(quoted, LpValue::Str),
            number,
            map(boolean, LpValue::Bool),
        )),
    )(input)
}

fn field_pair(input: &str) -> Res<'_, (Cow<'_, str>, LpValue<'_>)> {
    context("field", separated_pair(key, char('='), field_value))(input)
}

fn timestamp(input: &str) -> Res<'_, i64> {
    context(
        "timestamp",
        map_res(
            recognize(pair(opt(char('-')), take_while1(|c: char| c.is_ascii_digit()))),
            str::parse::<i64>,
        ),
    )(input)
}

fn line(input: &str) -> Res<'_, Line<'_>> {
    map(
        tuple((
            measurement,
            many0(preceded(char(','), tag_pair)),
            preceded(space1, separated_list1(char(','), field_pair)),
            opt(preceded(space1, timestamp)),
            space0,
            opt(char('\r')),
        )),
        |(measurement, tags, fields, timestamp, _, _)| Line {
            measurement,
            tags,
            fields,
            timestamp,
        },
    )(input)
}

/// Position of `rest` inside `src` as 1-based (line, column)
fn locate(src: &str, rest: &str) -> (usize, usize, usize) {
    let offset = src.len() - rest.len();
    let before = &src[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    (line, offset - line_start + 1, line_start)
}

fn to_detail(src: &str, rest: &str, reason: String) -> LineProtoError {
    let (line, column, line_start) = locate(src, rest);
    let text = src[line_start..].split('\n').next().unwrap_or_default();
    LineProtoError::new(line, column, text, reason)
}

fn explain<'a>(src: &'a str, e: VerboseError<&'a str>) -> LineProtoError {
    let ctx = e.errors.iter().find_map(|(_, k)| match k {
        VerboseErrorKind::Context(c) => Some(*c),
        _ => None,
    });
    let at = e.errors.first().map_or(src, |(i, _)| *i);
    let reason = match ctx {
        Some(c) => format!("expected {}", c),
        None => "unexpected input".to_string(),
    };
    to_detail(src, at, reason)
}

/// Decode a line-protocol payload.
///
/// Blank lines and `#` comments are skipped. Points come from the given
/// pool (or the installed default) and are finalized with `cfg`; a line
/// without timestamp takes `cfg.time` or the current time.
pub fn decode_into(
    src: &str,
    precision: Precision,
    cfg: &Cfg,
    pool: Option<&dyn PointPool>,
    out: &mut Vec<Point>,
) -> std::result::Result<(), LineProtoError> {
    let mut rest = src;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace());
        if rest.is_empty() {
            return Ok(());
        }
        if rest.starts_with('#') {
            rest = rest.find('\n').map_or("", |i| &rest[i + 1..]);
            continue;
        }

        let (after, parsed) = line(rest).map_err(|e| match e {
            nom::Err::Error(v) | nom::Err::Failure(v) => explain(src, v),
            nom::Err::Incomplete(_) => to_detail(src, rest, "incomplete input".to_string()),
        })?;

        if !(after.is_empty() || after.starts_with('\n')) {
            return Err(to_detail(src, after, "expected end of line".to_string()));
        }
        rest = after;

        let time = match parsed.timestamp {
            Some(ts) => precision.to_nanos(ts),
            None => cfg.time.unwrap_or_else(crate::model::now_nanos),
        };
        out.push(build(pool, parsed, cfg, time));
    }
}

/// [`decode_into`] with the installed default pool
pub fn decode(src: &str, precision: Precision, cfg: &Cfg) -> std::result::Result<Vec<Point>, LineProtoError> {
    let pool = pool::default_pool();
    let mut out = Vec::new();
    decode_into(src, precision, cfg, pool.as_deref().map(|b| &**b), &mut out)?;
    Ok(out)
}

fn build(pool: Option<&dyn PointPool>, l: Line<'_>, cfg: &Cfg, time: i64) -> Point {
    let mut pt = pool::new_point(pool);
    pt.set_name(&l.measurement);

    for (k, v) in &l.tags {
        pt.kvs.push_raw(pool::new_field(pool, k, RawValue::Str(v), true));
    }
    for (k, v) in &l.fields {
        pt.kvs.push_raw(pool::new_field(pool, k, v.as_raw(), false));
    }

    pt.finalize(cfg, Some(time));
    pt
}
