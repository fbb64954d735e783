//! Ordered KV collection holding both tags and fields.

use super::field::Field;
use super::keys::Keys;
use super::value::Value;
use std::collections::BTreeMap;

/// The KV sequence of a point.
///
/// When `sorted` (the default) entries are kept in key order by every
/// mutation, lookups binary-search and identity hashing is deterministic.
/// KVs decoded with key sorting disabled keep their wire order and fall
/// back to linear lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct KVs {
    entries: Vec<Field>,
    sorted: bool,
}

impl Default for KVs {
    fn default() -> Self {
        Self::new()
    }
}

impl KVs {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            sorted: true,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            sorted: true,
        }
    }

    /// Wrap entries in their given order. Call [`KVs::sort`] to restore
    /// key order.
    pub fn from_unsorted(entries: Vec<Field>) -> Self {
        Self {
            entries,
            sorted: false,
        }
    }

    /// Stable sort by key; duplicate keys keep their relative order
    pub fn sort(&mut self) {
        if !self.sorted {
            self.entries.sort_by(|a, b| a.key.cmp(&b.key));
            self.sorted = true;
        }
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    fn position(&self, key: &str) -> Result<usize, usize> {
        if self.sorted {
            self.entries.binary_search_by(|f| f.key.as_str().cmp(key))
        } else {
            self.entries
                .iter()
                .position(|f| f.key == key)
                .ok_or(self.entries.len())
        }
    }

    /// Insert an entry. An existing key is overwritten only when `force`
    /// is set; returns whether the entry was stored.
    pub fn insert(&mut self, field: Field, force: bool) -> bool {
        match self.position(&field.key) {
            Ok(i) => {
                if force {
                    self.entries[i] = field;
                }
                force
            },
            Err(i) => {
                self.entries.insert(i, field);
                true
            },
        }
    }

    /// Builder-style insert
    #[must_use]
    pub fn add<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V, as_tag: bool, force: bool) -> Self {
        self.insert(Field::new(key, value, as_tag), force);
        self
    }

    /// Builder-style tag insert, never overwriting
    #[must_use]
    pub fn add_tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.insert(Field::tag(key, value), false);
        self
    }

    /// Builder-style field insert, never overwriting
    #[must_use]
    pub fn add_field<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.insert(Field::field(key, value), false);
        self
    }

    /// Builder-style removal
    #[must_use]
    pub fn del(mut self, key: &str) -> Self {
        self.remove(key);
        self
    }

    /// Insert or overwrite
    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V, as_tag: bool) {
        self.insert(Field::new(key, value, as_tag), true);
    }

    pub fn remove(&mut self, key: &str) -> Option<Field> {
        self.position(key).ok().map(|i| self.entries.remove(i))
    }

    pub fn get(&self, key: &str) -> Option<&Field> {
        self.position(key).ok().map(|i| &self.entries[i])
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Field> {
        match self.position(key) {
            Ok(i) => Some(&mut self.entries[i]),
            Err(_) => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.position(key).is_ok()
    }

    pub fn tags(&self) -> impl Iterator<Item = &Field> {
        self.entries.iter().filter(|f| f.is_tag)
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.entries.iter().filter(|f| !f.is_tag)
    }

    pub fn tag_count(&self) -> usize {
        self.tags().count()
    }

    pub fn field_count(&self) -> usize {
        self.fields().count()
    }

    /// Keep at most `n` tags; fields are untouched
    #[must_use]
    pub fn trim_tags(mut self, n: usize) -> Self {
        self.trim_kind(true, n);
        self
    }

    /// Keep at most `n` fields; tags are untouched
    #[must_use]
    pub fn trim_fields(mut self, n: usize) -> Self {
        self.trim_kind(false, n);
        self
    }

    /// Drop entries of one kind beyond the first `n`, returning how many
    /// were removed
    pub(crate) fn trim_kind(&mut self, tags: bool, n: usize) -> usize {
        let mut seen = 0;
        let before = self.entries.len();
        self.entries.retain(|f| {
            if f.is_tag != tags {
                return true;
            }
            seen += 1;
            seen <= n
        });
        before - self.entries.len()
    }

    /// Schema descriptor of the current entries
    pub fn keys(&self) -> Keys {
        self.entries.iter().map(Field::schema_key).collect()
    }

    /// Field-only map, the shape legacy consumers expect
    pub fn influx_fields(&self) -> BTreeMap<&str, &Value> {
        self.fields().map(|f| (f.key.as_str(), &f.value)).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Field] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_inner(self) -> Vec<Field> {
        self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<Field> {
        &mut self.entries
    }

    /// Append without ordering checks; the caller restores order with
    /// [`KVs::sort`] or the checker's dedup pass
    pub(crate) fn push_raw(&mut self, field: Field) {
        if self.sorted {
            if let Some(last) = self.entries.last() {
                if last.key >= field.key {
                    self.sorted = false;
                }
            }
        }
        self.entries.push(field);
    }

    /// Empty the sequence keeping its capacity
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.sorted = true;
    }

    /// Take over the entries and order of `other`, keeping this allocation
    /// when it can hold them
    pub(crate) fn refill(&mut self, other: KVs) {
        if self.entries.capacity() >= other.entries.len() {
            self.entries.clear();
            self.entries.extend(other.entries);
        } else {
            self.entries = other.entries;
        }
        self.sorted = other.sorted;
    }

    pub(crate) fn capacity(&self) -> usize {
        self.entries.capacity()
    }
}

impl From<Vec<Field>> for KVs {
    fn from(entries: Vec<Field>) -> Self {
        let mut kvs = KVs::from_unsorted(entries);
        kvs.sort();
        kvs
    }
}

impl FromIterator<Field> for KVs {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        let mut kvs = KVs::new();
        for f in iter {
            kvs.insert(f, true);
        }
        kvs
    }
}

impl<'a> IntoIterator for &'a KVs {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
