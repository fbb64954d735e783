//! Lock-free point pool with three reuse tiers.
//!
//! Every free list is a bounded crossbeam `ArrayQueue`, so `get`/`put`
//! never take a lock and a full list simply drops the returned object.

use super::{PointPool, PoolStats, PoolTier};
use crate::model::{Field, Point, Value, ValueKind};
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    returns: AtomicU64,
    field_hits: AtomicU64,
    field_misses: AtomicU64,
}

/// Point pool whose reuse granularity is fixed at construction.
///
/// - [`PoolTier::Points`]: point shells only; KV capacity is kept.
/// - [`PoolTier::Fields`]: also field shells, with a fresh value per get.
/// - [`PoolTier::Values`]: one field free list per value kind; values are
///   zeroed in place and their buffers reused.
pub struct TieredPool {
    tier: PoolTier,
    capacity: usize,
    points: ArrayQueue<Point>,
    /// Empty for `Points`, one shared list for `Fields`, one per kind for
    /// `Values`
    fields: Vec<ArrayQueue<Field>>,
    counters: Counters,
}

impl TieredPool {
    /// Create a pool holding up to `capacity` idle points (and as many
    /// idle fields per free list)
    pub fn new(tier: PoolTier, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let lists = match tier {
            PoolTier::Points => 0,
            PoolTier::Fields => 1,
            PoolTier::Values => ValueKind::ALL.len(),
        };

        Self {
            tier,
            capacity,
            points: ArrayQueue::new(capacity),
            fields: (0..lists).map(|_| ArrayQueue::new(capacity)).collect(),
            counters: Counters::default(),
        }
    }

    /// Size taken from `POINT_POOL_CAPACITY`
    pub fn from_env(tier: PoolTier) -> Self {
        Self::new(tier, super::env_capacity())
    }

    /// Pre-allocate idle point shells
    pub fn warm_up(&self, count: usize) {
        for _ in 0..count {
            if self.points.push(Point::empty()).is_err() {
                break;
            }
        }
    }

    fn field_list(&self, kind: ValueKind) -> Option<&ArrayQueue<Field>> {
        match self.tier {
            PoolTier::Points => None,
            PoolTier::Fields => self.fields.first(),
            PoolTier::Values => self.fields.get(kind.index()),
        }
    }
}

impl PointPool for TieredPool {
    fn get(&self) -> Point {
        match self.points.pop() {
            Some(pt) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                pt
            },
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(tier = %self.tier, "point pool miss");
                Point::empty()
            },
        }
    }

    fn put(&self, mut pt: Point) {
        if self.tier > PoolTier::Points {
            for f in pt.kvs.entries_mut().drain(..) {
                self.put_field(f);
            }
        }
        pt.reset();

        if self.points.push(pt).is_ok() {
            self.counters.returns.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn get_field(&self, kind: ValueKind) -> Field {
        let Some(list) = self.field_list(kind) else {
            return Field {
                value: Value::zero(kind),
                ..Field::default()
            };
        };

        match list.pop() {
            Some(mut f) => {
                self.counters.field_hits.fetch_add(1, Ordering::Relaxed);
                if self.tier == PoolTier::Fields {
                    f.value = Value::zero(kind);
                }
                f
            },
            None => {
                self.counters.field_misses.fetch_add(1, Ordering::Relaxed);
                Field {
                    value: Value::zero(kind),
                    ..Field::default()
                }
            },
        }
    }

    fn put_field(&self, mut f: Field) {
        let Some(list) = self.field_list(f.value.kind()) else {
            return;
        };

        f.reset();
        if self.tier == PoolTier::Fields {
            f.value = Value::Nil;
        }
        let _ = list.push(f);
    }

    fn tier(&self) -> PoolTier {
        self.tier
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            tier: self.tier,
            capacity: self.capacity,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            returns: self.counters.returns.load(Ordering::Relaxed),
            field_hits: self.counters.field_hits.load(Ordering::Relaxed),
            field_misses: self.counters.field_misses.load(Ordering::Relaxed),
            idle_points: self.points.len(),
            idle_fields: self.fields.iter().map(ArrayQueue::len).sum(),
        }
    }
}
