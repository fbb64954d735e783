//! Fail-soft point checker.
//!
//! The checker never rejects a point. Every violation is either repaired
//! in place or the offending KV is dropped, and each repair leaves a
//! [`Warn`](crate::model::Warn) on the point. Running it again on its own
//! output changes nothing and adds no warnings.

use crate::core::{Cfg, RequiredKey, DEFAULT_MEASUREMENT};
use crate::model::point::now_nanos;
use crate::model::{Field, KeyKind, Point, Value};
use rustc_hash::FxHashSet;

pub const WARN_INVALID_MEASUREMENT: &str = "invalid-measurement";
pub const WARN_MAX_MEASUREMENT_LEN: &str = "max-measurement-len";
pub const WARN_INVALID_TIMESTAMP: &str = "invalid-timestamp";
pub const WARN_INVALID_TAG_KEY: &str = "invalid-tag-key";
pub const WARN_INVALID_TAG_VALUE: &str = "invalid-tag-value";
pub const WARN_MAX_TAG_KEY_LEN: &str = "max-tag-key-len";
pub const WARN_MAX_TAG_VALUE_LEN: &str = "max-tag-value-len";
pub const WARN_INVALID_FIELD_KEY: &str = "invalid-field-key";
pub const WARN_MAX_FIELD_KEY_LEN: &str = "max-field-key-len";
pub const WARN_MAX_FIELD_VALUE_LEN: &str = "max-field-value-len";
pub const WARN_NIL_FIELD: &str = "nil-field";
pub const WARN_INVALID_FIELD_VALUE: &str = "invalid-field-value";
pub const WARN_U64_FIELD: &str = "u64-field-overflow";
pub const WARN_STR_FIELD_DISABLED: &str = "string-field-disabled";
pub const WARN_DISABLED_KEY: &str = "disabled-key";
pub const WARN_KEY_CONFLICT: &str = "key-conflict";
pub const WARN_MAX_TAGS: &str = "exceed-max-tags";
pub const WARN_MAX_FIELDS: &str = "exceed-max-fields";
pub const WARN_ADD_REQUIRED_KV: &str = "add-required-kv";

type Warns = Vec<(&'static str, String)>;

/// Checks points against one configuration.
pub struct Checker<'a> {
    cfg: &'a Cfg,
}

impl<'a> Checker<'a> {
    pub fn new(cfg: &'a Cfg) -> Self {
        Self { cfg }
    }

    /// Validate and repair a point in place
    pub fn check(&self, pt: &mut Point) {
        let mut warns: Warns = Vec::new();

        self.check_measurement(pt, &mut warns);

        if pt.time < 0 && !self.cfg.enable_negative_timestamp {
            warns.push((
                WARN_INVALID_TIMESTAMP,
                format!("negative timestamp {} replaced with current time", pt.time),
            ));
            pt.time = now_nanos();
        }

        self.check_kvs(pt, &mut warns);

        for (kind, msg) in warns {
            tracing::debug!(kind, measurement = %pt.name, %msg, "point repaired");
            pt.add_warn(kind, msg);
        }
        pt.flags.insert(crate::model::PointFlags::CHECKED);
    }

    fn check_measurement(&self, pt: &mut Point, warns: &mut Warns) {
        let mut name = pt.name.to_string();
        if clean_measurement(&mut name) {
            warns.push((
                WARN_INVALID_MEASUREMENT,
                format!("measurement {:?} has control characters or a trailing backslash", pt.name),
            ));
            pt.set_name(&name);
        }

        if pt.name.is_empty() {
            warns.push((
                WARN_INVALID_MEASUREMENT,
                format!("empty measurement, set to {:?}", DEFAULT_MEASUREMENT),
            ));
            pt.set_name(DEFAULT_MEASUREMENT);
            return;
        }

        let max = self.cfg.max_measurement_len;
        if max > 0 && pt.name.len() > max {
            name.truncate(floor_char_boundary(&name, max));
            while name.ends_with('\\') {
                name.pop();
            }
            if name.is_empty() {
                name.push_str(DEFAULT_MEASUREMENT);
            }
            warns.push((
                WARN_MAX_MEASUREMENT_LEN,
                format!("measurement exceeds {} bytes, truncated", max),
            ));
            pt.set_name(&name);
        }
    }

    fn check_kvs(&self, pt: &mut Point, warns: &mut Warns) {
        let was_sorted = pt.kvs.is_sorted();
        let entries = std::mem::take(pt.kvs.entries_mut());

        // (original index, renamed, field)
        let mut candidates: Vec<(usize, bool, Field)> = Vec::with_capacity(entries.len());
        for (idx, mut f) in entries.into_iter().enumerate() {
            let original = f.key.clone();
            if self.check_field(&mut f, warns) {
                let renamed = f.key != original;
                candidates.push((idx, renamed, f));
            }
        }

        // Untouched keys claim their names first; a renamed key that lands
        // on a taken name is dropped rather than overwriting.
        let mut taken: FxHashSet<String> = FxHashSet::default();
        let mut survivors: Vec<(usize, Field)> = Vec::with_capacity(candidates.len());
        for pass_renamed in [false, true] {
            for (idx, renamed, f) in candidates.iter_mut() {
                if *renamed != pass_renamed || f.key.is_empty() {
                    continue;
                }
                if taken.contains(&f.key) {
                    warns.push((
                        WARN_KEY_CONFLICT,
                        format!("key {:?} conflicts with an existing key, dropped", f.key),
                    ));
                    continue;
                }
                taken.insert(f.key.clone());
                survivors.push((*idx, std::mem::take(f)));
            }
        }

        if was_sorted || self.cfg.key_sorted {
            survivors.sort_by(|a, b| a.1.key.cmp(&b.1.key));
        } else {
            survivors.sort_by_key(|(idx, _)| *idx);
        }

        let kvs = pt.kvs.entries_mut();
        kvs.extend(survivors.into_iter().map(|(_, f)| f));
        if !was_sorted && self.cfg.key_sorted {
            pt.kvs.sort();
        }

        // Config-provided entries are validated by `Cfg::validate` and are
        // exempt from the tag/field caps.
        let mut exempt: FxHashSet<&str> = FxHashSet::default();
        for (k, v) in &self.cfg.extra_tags {
            exempt.insert(k.as_str());
            if !pt.kvs.has(k) {
                pt.kvs.insert(Field::tag(k.clone(), v.clone()), false);
            }
        }
        for rk in &self.cfg.required_keys {
            exempt.insert(rk.key.as_str());
            if !pt.kvs.has(&rk.key) {
                warns.push((
                    WARN_ADD_REQUIRED_KV,
                    format!("required key {:?} missing, default {} added", rk.key, rk.value),
                ));
                pt.kvs
                    .insert(Field::new(rk.key.clone(), rk.value.clone(), rk.tag), false);
            }
        }

        self.enforce_caps(pt, &exempt, warns);
    }

    fn enforce_caps(&self, pt: &mut Point, exempt: &FxHashSet<&str>, warns: &mut Warns) {
        for (tags, max, kind) in [
            (true, self.cfg.max_tags, WARN_MAX_TAGS),
            (false, self.cfg.max_fields, WARN_MAX_FIELDS),
        ] {
            if max == 0 {
                continue;
            }

            let mut seen = 0usize;
            let before = pt.kvs.len();
            pt.kvs.entries_mut().retain(|f| {
                if f.is_tag != tags || exempt.contains(f.key.as_str()) {
                    return true;
                }
                seen += 1;
                seen <= max
            });

            let dropped = before - pt.kvs.len();
            if dropped > 0 {
                warns.push((
                    kind,
                    format!("{} {} over the limit of {} dropped", dropped, if tags { "tags" } else { "fields" }, max),
                ));
            }
        }
    }

    /// Repair one KV. Returns false when it must be dropped.
    fn check_field(&self, f: &mut Field, warns: &mut Warns) -> bool {
        f.normalize_tag();

        if f.is_tag {
            self.check_tag(f, warns)
        } else {
            self.check_plain_field(f, warns)
        }
    }

    fn check_tag(&self, f: &mut Field, warns: &mut Warns) -> bool {
        let cfg = self.cfg;

        if clip(&mut f.key, cfg.max_tag_key_len) {
            warns.push((
                WARN_MAX_TAG_KEY_LEN,
                format!("tag key exceeds {} bytes, truncated", cfg.max_tag_key_len),
            ));
        }
        let original = f.key.clone();
        if clean_key(&mut f.key, cfg.enable_dot_in_key) {
            warns.push((
                WARN_INVALID_TAG_KEY,
                format!("invalid tag key {:?}, renamed to {:?}", original, f.key),
            ));
        }
        if f.key.is_empty() {
            if original.is_empty() {
                warns.push((WARN_INVALID_TAG_KEY, "empty tag key dropped".to_string()));
            }
            return false;
        }

        if cfg.is_disabled(&f.key, KeyKind::Tag) {
            warns.push((WARN_DISABLED_KEY, format!("tag {:?} is disabled, dropped", f.key)));
            return false;
        }

        if let Value::Str(s) = &mut f.value {
            if clip(s, cfg.max_tag_val_len) {
                warns.push((
                    WARN_MAX_TAG_VALUE_LEN,
                    format!("value of tag {:?} exceeds {} bytes, truncated", f.key, cfg.max_tag_val_len),
                ));
            }
            if clean_tag_value(s) {
                warns.push((
                    WARN_INVALID_TAG_VALUE,
                    format!("value of tag {:?} contained invalid characters, replaced", f.key),
                ));
            }
            // Line protocol has no form for an empty tag value
            if s.is_empty() {
                warns.push((WARN_INVALID_TAG_VALUE, format!("tag {:?} has an empty value, dropped", f.key)));
                return false;
            }
        }

        true
    }

    fn check_plain_field(&self, f: &mut Field, warns: &mut Warns) -> bool {
        let cfg = self.cfg;

        if clip(&mut f.key, cfg.max_field_key_len) {
            warns.push((
                WARN_MAX_FIELD_KEY_LEN,
                format!("field key exceeds {} bytes, truncated", cfg.max_field_key_len),
            ));
        }
        let original = f.key.clone();
        if clean_key(&mut f.key, cfg.enable_dot_in_key) {
            warns.push((
                WARN_INVALID_FIELD_KEY,
                format!("invalid field key {:?}, renamed to {:?}", original, f.key),
            ));
        }
        if f.key.is_empty() {
            if original.is_empty() {
                warns.push((WARN_INVALID_FIELD_KEY, "empty field key dropped".to_string()));
            }
            return false;
        }

        if cfg.is_disabled(&f.key, f.key_kind()) {
            warns.push((WARN_DISABLED_KEY, format!("field {:?} is disabled, dropped", f.key)));
            return false;
        }

        match &mut f.value {
            Value::Nil => {
                warns.push((WARN_NIL_FIELD, format!("field {:?} has no value, dropped", f.key)));
                return false;
            },
            Value::Uint(u) if !cfg.enable_u64_field => {
                if *u > i64::MAX as u64 {
                    warns.push((
                        WARN_U64_FIELD,
                        format!("field {:?} value {} exceeds i64::MAX, dropped", f.key, u),
                    ));
                    return false;
                }
                f.value = Value::Int(*u as i64);
            },
            Value::Float(v) if !v.is_finite() => {
                warns.push((
                    WARN_INVALID_FIELD_VALUE,
                    format!("field {:?} is not a finite number, dropped", f.key),
                ));
                return false;
            },
            Value::Str(_) | Value::Bytes(_) if !cfg.enable_str_field => {
                warns.push((
                    WARN_STR_FIELD_DISABLED,
                    format!("string field {:?} not allowed, dropped", f.key),
                ));
                return false;
            },
            Value::Str(s) => {
                if clip(s, cfg.max_field_val_len) {
                    warns.push((
                        WARN_MAX_FIELD_VALUE_LEN,
                        format!("field {:?} exceeds {} bytes, truncated", f.key, cfg.max_field_val_len),
                    ));
                }
            },
            Value::Bytes(d) => {
                let max = cfg.max_field_val_len;
                if max > 0 && d.len() > max {
                    d.truncate(max);
                    warns.push((
                        WARN_MAX_FIELD_VALUE_LEN,
                        format!("field {:?} exceeds {} bytes, truncated", f.key, max),
                    ));
                }
            },
            _ => {},
        }

        true
    }

    /// Why a required key's default would be altered by a check, if it would
    pub(crate) fn reject_required(&self, rk: &RequiredKey) -> Option<String> {
        let mut f = Field::new(rk.key.clone(), rk.value.clone(), rk.tag);
        let mut warns = Warns::new();
        let kept = self.check_field(&mut f, &mut warns);

        if !kept || !warns.is_empty() {
            let reason = warns
                .into_iter()
                .map(|(kind, _)| kind)
                .collect::<Vec<_>>()
                .join(",");
            return Some(if reason.is_empty() { "dropped".to_string() } else { reason });
        }
        if rk.tag && !f.is_tag {
            return Some("tag default must be a string".to_string());
        }
        None
    }

    /// Why an extra tag would be altered by a check, if it would
    pub(crate) fn reject_extra_tag(&self, key: &str, value: &str) -> Option<String> {
        self.reject_required(&RequiredKey::new(key, value, true))
    }
}

/// Largest char boundary `<= max`
fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Truncate to `max` bytes (0 = unlimited); true if anything was cut
fn clip(s: &mut String, max: usize) -> bool {
    if max == 0 || s.len() <= max {
        return false;
    }
    let end = floor_char_boundary(s, max);
    s.truncate(end);
    true
}

/// Control characters to space, no trailing backslash
fn clean_measurement(name: &mut String) -> bool {
    if !name.contains(char::is_control) && !name.ends_with('\\') {
        return false;
    }

    let mut out: String = name
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    while out.ends_with('\\') {
        out.pop();
    }
    *name = out;
    true
}

/// Newline to space, optional dot to underscore, no trailing backslash
fn clean_key(key: &mut String, allow_dot: bool) -> bool {
    let needs = key.contains('\n') || (!allow_dot && key.contains('.')) || key.ends_with('\\');
    if !needs {
        return false;
    }

    let mut out: String = key
        .chars()
        .map(|c| match c {
            '\n' => ' ',
            '.' if !allow_dot => '_',
            c => c,
        })
        .collect();
    while out.ends_with('\\') {
        out.pop();
    }
    *key = out;
    true
}

fn clean_tag_value(v: &mut String) -> bool {
    if !v.contains('\n') && !v.ends_with('\\') {
        return false;
    }

    if v.contains('\n') {
        *v = v.replace('\n', " ");
    }
    while v.ends_with('\\') {
        v.pop();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CfgBuilder;
    use crate::model::{Key, KVs};

    fn unchecked(name: &str, kvs: KVs) -> Point {
        let cfg = CfgBuilder::new().time(1).precheck(false).build().unwrap();
        Point::new(name, kvs, &cfg)
    }

    fn warn_kinds(pt: &Point) -> Vec<&str> {
        pt.warns().iter().map(|w| w.kind.as_str()).collect()
    }

    #[test]
    fn test_dot_in_tag_key_renamed() {
        let cfg = CfgBuilder::new().dot_in_key(false).build().unwrap();
        let mut pt = unchecked("m", KVs::new().add_tag("t.1", "v").add_field("f", 1));
        Checker::new(&cfg).check(&mut pt);

        assert_eq!(pt.get_tag("t_1"), Some("v"));
        assert!(!pt.kvs().has("t.1"));
        assert_eq!(warn_kinds(&pt), vec![WARN_INVALID_TAG_KEY]);
    }

    #[test]
    fn test_renamed_key_conflict_drops_tag() {
        let cfg = CfgBuilder::new().dot_in_key(false).build().unwrap();
        let mut pt = unchecked(
            "m",
            KVs::new().add_tag("a.b", "renamed").add_tag("a_b", "original").add_field("f", 1),
        );
        Checker::new(&cfg).check(&mut pt);

        assert_eq!(pt.get_tag("a_b"), Some("original"));
        assert_eq!(pt.tags().count(), 1);
        assert!(warn_kinds(&pt).contains(&WARN_KEY_CONFLICT));
    }

    #[test]
    fn test_u64_overflow_dropped_when_disabled() {
        let cfg = CfgBuilder::new().u64_field(false).build().unwrap();
        let mut pt = unchecked("m", KVs::new().add_field("big", u64::MAX).add_field("small", 7u64));
        Checker::new(&cfg).check(&mut pt);

        assert!(pt.get("big").is_none());
        assert_eq!(pt.get("small"), Some(&Value::Int(7)));
        assert_eq!(warn_kinds(&pt), vec![WARN_U64_FIELD]);
    }

    #[test]
    fn test_u64_kept_when_enabled() {
        let cfg = CfgBuilder::new().u64_field(true).build().unwrap();
        let mut pt = unchecked("m", KVs::new().add_field("big", u64::MAX));
        Checker::new(&cfg).check(&mut pt);
        assert_eq!(pt.get("big"), Some(&Value::Uint(u64::MAX)));
        assert!(pt.warns().is_empty());
    }

    #[test]
    fn test_empty_measurement_gets_default() {
        let cfg = Cfg::default();
        let mut pt = unchecked("", KVs::new().add_field("f", 1));
        Checker::new(&cfg).check(&mut pt);
        assert_eq!(pt.name(), DEFAULT_MEASUREMENT);
        assert_eq!(warn_kinds(&pt), vec![WARN_INVALID_MEASUREMENT]);
    }

    #[test]
    fn test_measurement_control_characters_cleaned() {
        let cfg = Cfg::default();
        let mut pt = unchecked("cpu\nload\tavg\\", KVs::new().add_field("f", 1));
        Checker::new(&cfg).check(&mut pt);
        assert_eq!(pt.name(), "cpu load avg");
        assert_eq!(warn_kinds(&pt), vec![WARN_INVALID_MEASUREMENT]);
        assert_eq!(pt.line_proto().lines().count(), 1);

        let before = pt.warns().len();
        Checker::new(&cfg).check(&mut pt);
        assert_eq!(pt.warns().len(), before);
    }

    #[test]
    fn test_empty_tag_value_dropped_with_warn() {
        let cfg = Cfg::default();
        let mut pt = unchecked("m", KVs::new().add_tag("t", "").add_tag("u", "\\").add_field("f", 1));
        Checker::new(&cfg).check(&mut pt);
        assert!(pt.get("t").is_none());
        assert!(pt.get("u").is_none());
        assert_eq!(
            warn_kinds(&pt),
            vec![WARN_INVALID_TAG_VALUE, WARN_INVALID_TAG_VALUE, WARN_INVALID_TAG_VALUE]
        );

        let text = pt.line_proto();
        let back = crate::codec::lineproto::decode(&text, crate::core::Precision::Ns, &cfg).unwrap();
        assert!(back[0].equal(&pt));
    }

    #[test]
    fn test_tag_value_newline_and_backslash() {
        let cfg = Cfg::default();
        let mut pt = unchecked("m", KVs::new().add_tag("t", "line1\nline2\\").add_field("f", 1));
        Checker::new(&cfg).check(&mut pt);
        assert_eq!(pt.get_tag("t"), Some("line1 line2"));
        assert_eq!(warn_kinds(&pt), vec![WARN_INVALID_TAG_VALUE]);
    }

    #[test]
    fn test_truncation_respects_limits() {
        let cfg = CfgBuilder::new()
            .max_tag_key_len(3)
            .max_tag_val_len(2)
            .max_field_val_len(4)
            .build()
            .unwrap();
        let mut pt = unchecked("m", KVs::new().add_tag("abcdef", "xyz").add_field("msg", "hello world"));
        Checker::new(&cfg).check(&mut pt);

        assert_eq!(pt.get_tag("abc"), Some("xy"));
        assert_eq!(pt.get("msg"), Some(&Value::Str("hell".to_string())));
        let kinds = warn_kinds(&pt);
        assert!(kinds.contains(&WARN_MAX_TAG_KEY_LEN));
        assert!(kinds.contains(&WARN_MAX_TAG_VALUE_LEN));
        assert!(kinds.contains(&WARN_MAX_FIELD_VALUE_LEN));
    }

    #[test]
    fn test_nil_and_disabled_fields_dropped() {
        let cfg = CfgBuilder::new()
            .disabled_key(Key::new("secret", KeyKind::Unknown))
            .build()
            .unwrap();
        let mut pt = unchecked(
            "m",
            KVs::new()
                .add_field("nothing", Value::Nil)
                .add_field("secret", "pw")
                .add_field("ok", 1),
        );
        Checker::new(&cfg).check(&mut pt);

        assert_eq!(pt.kvs().len(), 1);
        assert_eq!(warn_kinds(&pt), vec![WARN_NIL_FIELD, WARN_DISABLED_KEY]);
    }

    #[test]
    fn test_string_fields_disabled() {
        let cfg = Cfg::metric();
        let mut pt = unchecked("m", KVs::new().add_field("s", "x").add_field("d", vec![1u8]).add_field("f", 1.0));
        Checker::new(&cfg).check(&mut pt);
        assert_eq!(pt.kvs().len(), 1);
        assert_eq!(warn_kinds(&pt), vec![WARN_STR_FIELD_DISABLED, WARN_STR_FIELD_DISABLED]);
    }

    #[test]
    fn test_caps_and_exemptions() {
        let cfg = CfgBuilder::new()
            .max_tags(1)
            .max_fields(1)
            .extra_tag("env", "prod")
            .required_key(RequiredKey::new("status", "ok", true))
            .build()
            .unwrap();
        let mut pt = unchecked(
            "m",
            KVs::new()
                .add_tag("a", "1")
                .add_tag("b", "2")
                .add_field("x", 1)
                .add_field("y", 2),
        );
        Checker::new(&cfg).check(&mut pt);

        assert_eq!(pt.get_tag("env"), Some("prod"));
        assert_eq!(pt.get_tag("status"), Some("ok"));
        assert_eq!(pt.get_tag("a"), Some("1"));
        assert!(pt.get_tag("b").is_none());
        assert_eq!(pt.fields().count(), 1);
        assert_eq!(
            warn_kinds(&pt),
            vec![WARN_ADD_REQUIRED_KV, WARN_MAX_TAGS, WARN_MAX_FIELDS]
        );
    }

    #[test]
    fn test_extra_tags_never_override() {
        let cfg = CfgBuilder::new().extra_tag("host", "default").build().unwrap();
        let mut pt = unchecked("m", KVs::new().add_tag("host", "mine").add_field("f", 1));
        Checker::new(&cfg).check(&mut pt);
        assert_eq!(pt.get_tag("host"), Some("mine"));
        assert!(pt.warns().is_empty());
    }

    #[test]
    fn test_negative_timestamp() {
        let cfg = Cfg::default();
        let mut pt = unchecked("m", KVs::new().add_field("f", 1));
        pt.time = -5;
        Checker::new(&cfg).check(&mut pt);
        assert!(pt.time() > 0);
        assert_eq!(warn_kinds(&pt), vec![WARN_INVALID_TIMESTAMP]);

        let cfg = CfgBuilder::new().negative_timestamp(true).build().unwrap();
        let mut pt = unchecked("m", KVs::new().add_field("f", 1));
        pt.time = -5;
        Checker::new(&cfg).check(&mut pt);
        assert_eq!(pt.time(), -5);
    }

    #[test]
    fn test_duplicate_keys_from_wire_keep_first() {
        let cfg = Cfg::default();
        let mut pt = unchecked(
            "m",
            KVs::from_unsorted(vec![Field::field("f", 1), Field::field("f", 2)]),
        );
        Checker::new(&cfg).check(&mut pt);
        assert_eq!(pt.get("f"), Some(&Value::Int(1)));
        assert_eq!(warn_kinds(&pt), vec![WARN_KEY_CONFLICT]);
    }

    #[test]
    fn test_check_is_idempotent() {
        let cfg = CfgBuilder::new()
            .dot_in_key(false)
            .max_tags(2)
            .max_tag_key_len(4)
            .u64_field(false)
            .build()
            .unwrap();
        let mut pt = unchecked(
            "",
            KVs::new()
                .add_tag("a.b", "x\n")
                .add_tag("a_b", "y")
                .add_tag("longkey", "z")
                .add_tag("q", "w")
                .add_field("big", u64::MAX)
                .add_field("nil", Value::Nil),
        );

        let checker = Checker::new(&cfg);
        checker.check(&mut pt);
        let first = pt.warns().len();
        let snapshot = pt.clone();

        checker.check(&mut pt);
        assert_eq!(pt.warns().len(), first);
        assert!(pt.equal(&snapshot));
    }
}
