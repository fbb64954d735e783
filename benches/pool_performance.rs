//! Pool performance benchmark: allocation versus each reuse tier

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ingest_point::codec::protobuf;
use ingest_point::pool::{PointPool, PoolTier, TieredPool};
use ingest_point::{get_encoder, CfgBuilder, EncoderOptions, Encoding, KVs, Point};

fn sample(n: usize) -> Vec<Point> {
    let cfg = CfgBuilder::new().time(1).encoding(Encoding::Protobuf).build().unwrap();
    (0..n)
        .map(|i| {
            Point::new(
                "cpu",
                KVs::new()
                    .add_tag("host", format!("host-{}", i % 8))
                    .add_field("usage", i as f64 / 3.0)
                    .add_field("idle", i as i64)
                    .add_field("note", "steady"),
                &cfg,
            )
        })
        .collect()
}

fn bench_decode_by_tier(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_by_tier");
    let cfg = CfgBuilder::new().time(1).build().unwrap();

    for size in [100, 1000].iter() {
        let data = protobuf::marshal_batch(&sample(*size));

        // Regular allocation
        group.bench_with_input(BenchmarkId::new("allocation", size), &data, |b, data| {
            b.iter(|| {
                let mut out = Vec::new();
                protobuf::decode_batch_into(data, &cfg, None, &mut out).unwrap();
                black_box(&out);
            })
        });

        for tier in [PoolTier::Points, PoolTier::Fields, PoolTier::Values] {
            let pool = TieredPool::new(tier, size + 100);
            let p: &dyn PointPool = &pool;
            group.bench_with_input(BenchmarkId::new(tier.to_string(), size), &data, |b, data| {
                b.iter(|| {
                    let mut out = Vec::new();
                    protobuf::decode_batch_into(data, &cfg, Some(p), &mut out).unwrap();
                    black_box(&out);
                    // Points go back for the next iteration
                    out.into_iter().for_each(|pt| pool.put(pt));
                })
            });
        }
    }

    group.finish();
}

fn bench_get_put(c: &mut Criterion) {
    let pool = TieredPool::new(PoolTier::Values, 10_000);
    pool.warm_up(1000);

    c.bench_function("pool_get_put", |b| {
        b.iter(|| {
            let pts: Vec<Point> = (0..100).map(|_| pool.get()).collect();
            black_box(&pts);
            pts.into_iter().for_each(|pt| pool.put(pt));
        })
    });
}

fn bench_pooled_encoder(c: &mut Criterion) {
    let pts = sample(500);

    c.bench_function("pooled_encoder", |b| {
        b.iter(|| {
            let mut enc = get_encoder(EncoderOptions::new(Encoding::Protobuf).bytes_size(16 * 1024));
            black_box(enc.encode(&pts).unwrap());
        })
    });
}

criterion_group!(benches, bench_decode_by_tier, bench_get_put, bench_pooled_encoder);
criterion_main!(benches);
