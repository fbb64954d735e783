//! Object reuse for points and fields.
//!
//! A [`PointPool`] is passed explicitly to the constructors and decoders
//! that accept one. For ergonomic parity with code that never threads a
//! pool through, one pool can be installed as the process default; it is
//! held in an `ArcSwapOption` so it can be swapped or removed at runtime
//! without locking readers.

pub mod tiered;

pub use tiered::TieredPool;

use crate::model::{Field, Point, RawValue, ValueKind};
use arc_swap::ArcSwapOption;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Environment variable sizing the convenience pools
pub const ENV_POOL_CAPACITY: &str = "POINT_POOL_CAPACITY";

const DEFAULT_CAPACITY: usize = 1024;

/// Reuse granularity, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolTier {
    /// Point shells only
    Points = 1,
    /// Point and field shells
    Fields = 2,
    /// Point and field shells plus per-kind value storage
    Values = 3,
}

impl fmt::Display for PoolTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolTier::Points => "points",
            PoolTier::Fields => "fields",
            PoolTier::Values => "values",
        };
        f.write_str(s)
    }
}

/// Snapshot of pool counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub tier: PoolTier,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub returns: u64,
    pub field_hits: u64,
    pub field_misses: u64,
    pub idle_points: usize,
    pub idle_fields: usize,
}

impl PoolStats {
    /// Share of point gets served from the free list
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Source and sink of reusable points and fields.
///
/// `get` must return a point indistinguishable from [`Point::empty`];
/// `put` must hand every owned field back to the matching free list.
/// Implementations are shared between threads.
pub trait PointPool: Send + Sync {
    fn get(&self) -> Point;

    fn put(&self, pt: Point);

    /// A blank field whose value is the zero of `kind`
    fn get_field(&self, kind: ValueKind) -> Field;

    fn put_field(&self, f: Field);

    fn tier(&self) -> PoolTier;

    fn stats(&self) -> PoolStats;
}

static DEFAULT_POOL: Lazy<ArcSwapOption<Box<dyn PointPool>>> = Lazy::new(ArcSwapOption::empty);

/// `POINT_POOL_CAPACITY`, or 1024
pub fn env_capacity() -> usize {
    std::env::var(ENV_POOL_CAPACITY)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(DEFAULT_CAPACITY)
}

/// The installed default pool, if any
#[inline]
pub fn default_pool() -> Option<Arc<Box<dyn PointPool>>> {
    DEFAULT_POOL.load_full()
}

/// Install `pool` as the process default, returning the previous one
pub fn set_default_pool(pool: Box<dyn PointPool>) -> Option<Arc<Box<dyn PointPool>>> {
    let stats = pool.stats();
    tracing::info!(tier = %stats.tier, capacity = stats.capacity, "installed default point pool");
    DEFAULT_POOL.swap(Some(Arc::new(pool)))
}

/// Remove the process default pool
pub fn clear_default_pool() -> Option<Arc<Box<dyn PointPool>>> {
    let old = DEFAULT_POOL.swap(None);
    if old.is_some() {
        tracing::info!("removed default point pool");
    }
    old
}

/// Return a point to the default pool; without one it is dropped
pub fn release(pt: Point) {
    if let Some(pool) = default_pool() {
        pool.put(pt);
    }
}

/// [`release`] for many points
pub fn release_all<I: IntoIterator<Item = Point>>(pts: I) {
    match default_pool() {
        Some(pool) => pts.into_iter().for_each(|pt| pool.put(pt)),
        None => drop(pts),
    }
}

/// A point shell from `pool`, or a new one
#[inline]
pub(crate) fn new_point(pool: Option<&dyn PointPool>) -> Point {
    match pool {
        Some(p) => p.get(),
        None => Point::empty(),
    }
}

/// A field filled from decoder output, drawn from `pool` when given
#[inline]
pub(crate) fn new_field(pool: Option<&dyn PointPool>, key: &str, raw: RawValue<'_>, is_tag: bool) -> Field {
    let mut f = match pool {
        Some(p) => p.get_field(raw.kind()),
        None => Field::default(),
    };
    f.fill(key, raw, is_tag);
    f
}
