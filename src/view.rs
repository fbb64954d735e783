//! Mutable view of a point for script-driven transformation.
//!
//! A script runtime wraps a point, edits its KVs by key and asks for a
//! point back. The rebuilt point is checked again, so whatever a script
//! sets goes through the same repairs as freshly built points.

use crate::core::Cfg;
use crate::model::{DebugInfo, Field, KVs, Point, Value};
use crate::pool::{self, PointPool};

#[derive(Debug, Clone)]
pub struct PointView {
    name: String,
    time: i64,
    kvs: KVs,
    debugs: Vec<DebugInfo>,
}

impl PointView {
    /// Take over the contents of `pt`; its emptied shell goes back to the
    /// default pool. Warnings are not carried over.
    pub fn wrap(mut pt: Point) -> Self {
        let view = Self {
            name: pt.name().to_string(),
            time: pt.time,
            kvs: std::mem::take(&mut pt.kvs),
            debugs: std::mem::take(&mut pt.debugs),
        };
        pool::release(pt);
        view
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn set_time(&mut self, ns: i64) {
        self.time = ns;
    }

    pub fn kvs(&self) -> &KVs {
        &self.kvs
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.kvs.get(key).map(Field::value)
    }

    /// `Some(true)` when `key` is present as a tag
    pub fn is_tag(&self, key: &str) -> Option<bool> {
        self.kvs.get(key).map(Field::is_tag)
    }

    /// Insert or overwrite; a non-string value set as tag becomes a field
    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V, as_tag: bool) {
        self.kvs.set(key, value, as_tag);
    }

    /// Remove `key`, returning its value
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.kvs.remove(key).map(|f| f.value)
    }

    /// Rebuild a checked point from the current state
    pub fn point(&self, cfg: &Cfg) -> Point {
        self.clone().into_point(cfg)
    }

    /// Rebuild a checked point on a shell from the default pool
    pub fn into_point(self, cfg: &Cfg) -> Point {
        let pool = pool::default_pool();
        self.rebuild(pool.as_deref().map(|b| &**b), cfg)
    }

    fn rebuild(self, pool: Option<&dyn PointPool>, cfg: &Cfg) -> Point {
        let mut pt = pool::new_point(pool);
        pt.set_name(&self.name);
        pt.kvs.refill(self.kvs);
        pt.debugs.extend(self.debugs);
        pt.finalize(cfg, Some(self.time));
        pt
    }
}

impl From<Point> for PointView {
    fn from(pt: Point) -> Self {
        Self::wrap(pt)
    }
}
