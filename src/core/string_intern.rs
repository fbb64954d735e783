//! Shared storage for measurement names.
//!
//! Ingestion sees millions of points but only a handful of distinct
//! measurement names. Interning hands every point the same `Arc<str>` for
//! the same name so decoding a batch costs one allocation per distinct
//! name instead of one per point.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bounded, lock-free (sharded) name table
pub struct StringIntern {
    table: DashMap<Arc<str>, ()>,
    limit: usize,
    misses: AtomicUsize,
}

impl StringIntern {
    /// Create a table holding at most `limit` distinct strings
    pub fn with_limit(limit: usize) -> Self {
        Self {
            table: DashMap::with_capacity(limit.min(1024)),
            limit,
            misses: AtomicUsize::new(0),
        }
    }

    /// Intern a string. Past the limit new strings are allocated and not
    /// remembered, so an unbounded name space cannot grow the table.
    #[inline]
    pub fn intern(&self, s: &str) -> Arc<str> {
        // Fast path: already interned
        if let Some(entry) = self.table.get(s) {
            return Arc::clone(entry.key());
        }

        self.intern_slow(s)
    }

    #[cold]
    fn intern_slow(&self, s: &str) -> Arc<str> {
        if self.table.len() >= self.limit {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Arc::from(s);
        }

        // Double-check under entry API to avoid races
        let entry = self.table.entry(Arc::from(s));
        match entry {
            dashmap::mapref::entry::Entry::Occupied(e) => Arc::clone(e.key()),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let key = Arc::clone(e.key());
                e.insert(());
                key
            },
        }
    }

    /// Number of interned strings
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Strings handed out without being remembered
    pub fn overflow_count(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Global measurement-name table
static GLOBAL_INTERN: Lazy<StringIntern> = Lazy::new(|| StringIntern::with_limit(10_000));

/// Intern a measurement name using the global table
#[inline]
pub fn intern(s: &str) -> Arc<str> {
    GLOBAL_INTERN.intern(s)
}
