//! Schema identity of a point.
//!
//! A [`Keys`] set describes the "shape" of a point: which keys it carries
//! and of which kind, but not the values. Points of the same shape hash
//! to the same value regardless of their data.

use super::value::ValueKind;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Kind component of a schema key. Tags form their own kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// Matches any kind; only meaningful in disabled-key lists
    Unknown,
    Tag,
    Nil,
    Int,
    Uint,
    Float,
    Bool,
    String,
    Bytes,
    Any,
}

impl From<ValueKind> for KeyKind {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Nil => KeyKind::Nil,
            ValueKind::Int => KeyKind::Int,
            ValueKind::Uint => KeyKind::Uint,
            ValueKind::Float => KeyKind::Float,
            ValueKind::Bool => KeyKind::Bool,
            ValueKind::Str => KeyKind::String,
            ValueKind::Bytes => KeyKind::Bytes,
            ValueKind::Any => KeyKind::Any,
        }
    }
}

/// A `(key, kind)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    pub key: String,
    #[serde(default = "unknown_kind")]
    pub kind: KeyKind,
}

fn unknown_kind() -> KeyKind {
    KeyKind::Unknown
}

impl Key {
    pub fn new<S: Into<String>>(key: S, kind: KeyKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }

    /// True if `self` (a configured pattern) covers the concrete key
    pub fn matches(&self, key: &str, kind: KeyKind) -> bool {
        self.key == key && (self.kind == KeyKind::Unknown || self.kind == kind)
    }

    fn hash64(&self) -> u64 {
        let mut h = FxHasher::default();
        self.key.hash(&mut h);
        self.kind.hash(&mut h);
        h.finish()
    }
}

/// Sorted, de-duplicated set of schema keys with an incrementally
/// maintained hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keys {
    keys: Vec<Key>,
    hash: u64,
}

impl Keys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key. O(1) hash update; returns false if already present.
    pub fn add(&mut self, key: Key) -> bool {
        match self.keys.binary_search(&key) {
            Ok(_) => false,
            Err(pos) => {
                self.hash = self.hash.wrapping_add(key.hash64());
                self.keys.insert(pos, key);
                true
            },
        }
    }

    /// Remove a key. O(1) hash update; returns false if absent.
    pub fn del(&mut self, key: &Key) -> bool {
        match self.keys.binary_search(key) {
            Ok(pos) => {
                let removed = self.keys.remove(pos);
                self.hash = self.hash.wrapping_sub(removed.hash64());
                true
            },
            Err(_) => false,
        }
    }

    pub fn has(&self, key: &Key) -> bool {
        self.keys.binary_search(key).is_ok()
    }

    /// Order-independent hash of the set
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }

    /// Human readable `key:kind` list
    pub fn pretty(&self) -> String {
        self.keys
            .iter()
            .map(|k| format!("{}:{:?}", k.key, k.kind))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromIterator<Key> for Keys {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        let mut keys = Keys::new();
        for k in iter {
            keys.add(k);
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_order_independent() {
        let a: Keys = [Key::new("a", KeyKind::Tag), Key::new("b", KeyKind::Int)]
            .into_iter()
            .collect();
        let b: Keys = [Key::new("b", KeyKind::Int), Key::new("a", KeyKind::Tag)]
            .into_iter()
            .collect();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a, b);
    }

    #[test]
    fn test_incremental_hash_matches_rebuild() {
        let mut keys = Keys::new();
        keys.add(Key::new("a", KeyKind::Tag));
        keys.add(Key::new("b", KeyKind::Float));
        keys.add(Key::new("c", KeyKind::String));
        keys.del(&Key::new("b", KeyKind::Float));

        let rebuilt: Keys = [Key::new("c", KeyKind::String), Key::new("a", KeyKind::Tag)]
            .into_iter()
            .collect();
        assert_eq!(keys.hash(), rebuilt.hash());
    }

    #[test]
    fn test_duplicates_ignored() {
        let mut keys = Keys::new();
        assert!(keys.add(Key::new("a", KeyKind::Int)));
        assert!(!keys.add(Key::new("a", KeyKind::Int)));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_kind_changes_hash() {
        let a: Keys = std::iter::once(Key::new("f", KeyKind::Int)).collect();
        let b: Keys = std::iter::once(Key::new("f", KeyKind::Float)).collect();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_wildcard_match() {
        let k = Key::new("password", KeyKind::Unknown);
        assert!(k.matches("password", KeyKind::String));
        assert!(k.matches("password", KeyKind::Tag));
        assert!(!Key::new("password", KeyKind::Tag).matches("password", KeyKind::String));
    }
}
