//! Point pool integration tests.

mod common;

use common::{cfg, create_points};
use ingest_point::codec::{json, lineproto, protobuf};
use ingest_point::model::ValueKind;
use ingest_point::pool::{self, PointPool, PoolTier, TieredPool};
use ingest_point::{Encoding, Precision, Value};
use std::sync::Arc;
use std::thread;

#[test]
fn test_every_tier_decodes_identically() {
    let pts = create_points(30, Encoding::LineProtocol);
    let text = pts.iter().map(|p| p.line_proto()).collect::<Vec<_>>().join("\n");
    let data = protobuf::marshal_batch(&pts);
    let doc = json::marshal_batch(&pts).unwrap();
    let cfg = cfg(Encoding::LineProtocol);

    for tier in [PoolTier::Points, PoolTier::Fields, PoolTier::Values] {
        let pool = TieredPool::new(tier, 64);
        let p: &dyn PointPool = &pool;

        // Two passes so the second one runs on recycled objects
        for _ in 0..2 {
            let mut out = Vec::new();
            lineproto::decode_into(&text, Precision::Ns, &cfg, Some(p), &mut out).unwrap();
            protobuf::decode_batch_into(&data, &cfg, Some(p), &mut out).unwrap();
            json::decode_into(&doc, &cfg, Some(p), &mut out).unwrap();

            assert_eq!(out.len(), 90);
            for (i, got) in out.iter().enumerate() {
                let want = &pts[i % 30];
                assert!(got.equal(want), "{} tier {}: {}", i, tier, got.pretty());
            }
            out.into_iter().for_each(|p| pool.put(p));
        }

        assert!(pool.stats().hits >= 60, "{}", tier);
    }
}

#[test]
fn test_values_tier_zero_values() {
    let pool = TieredPool::new(PoolTier::Values, 16);
    for p in create_points(4, Encoding::Json) {
        pool.put(p);
    }

    for kind in [ValueKind::Int, ValueKind::Float, ValueKind::Bool, ValueKind::Str] {
        let f = pool.get_field(kind);
        assert_eq!(f.value(), &Value::zero(kind));
        assert_eq!(f.value().kind(), kind);
        assert!(f.key().is_empty());
    }
}

#[test]
fn test_shared_pool_across_threads() {
    let pool = Arc::new(TieredPool::new(PoolTier::Fields, 128));
    let data = Arc::new(protobuf::marshal_batch(&create_points(20, Encoding::Protobuf)));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let data = Arc::clone(&data);
            thread::spawn(move || {
                let cfg = cfg(Encoding::Protobuf);
                for _ in 0..50 {
                    let mut out = Vec::new();
                    protobuf::decode_batch_into(&data, &cfg, Some(pool.as_ref() as &dyn PointPool), &mut out)
                        .unwrap();
                    assert_eq!(out.len(), 20);
                    out.into_iter().for_each(|p| pool.put(p));
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let stats = pool.stats();
    assert!(stats.idle_points <= 128);
    assert!(stats.hit_rate() > 0.5, "{:?}", stats);
}

#[test]
fn test_env_capacity_default() {
    if std::env::var(pool::ENV_POOL_CAPACITY).is_err() {
        assert_eq!(pool::env_capacity(), 1024);
    }
}
