//! R-Tree benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spatialindex::{
    BulkLoadOrder, DiskStore, DiskStoreConfig, Entry, IndexConfig, MemoryStore, RTree, Region,
    SplitPolicy, VecStream,
};
use std::hint::black_box;
use tempfile::tempdir;

fn entries(count: usize) -> Vec<Entry<Region>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            let x: f64 = rng.gen_range(0.0..1000.0);
            let y: f64 = rng.gen_range(0.0..1000.0);
            Entry::new(i as i64, Region::new(vec![x, y], vec![x + 1.0, y + 1.0]).unwrap())
        })
        .collect()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("RTree Insert");

    for policy in [SplitPolicy::RStar, SplitPolicy::Quadratic, SplitPolicy::Linear] {
        for size in [1000, 10000].iter() {
            let data = entries(*size);
            let id = BenchmarkId::new(format!("{:?}", policy), size);
            group.bench_with_input(id, &data, |b, data| {
                b.iter(|| {
                    let config = IndexConfig::new(2).with_split_policy(policy);
                    let mut tree = RTree::create(MemoryStore::new(), config).unwrap();
                    for entry in data {
                        tree.insert(entry.clone()).unwrap();
                    }
                    black_box(tree.len())
                });
            });
        }
    }

    group.finish();
}

fn bench_disk_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("DiskStore Insert");
    group.sample_size(10);

    for size in [1000, 10000].iter() {
        let data = entries(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter_with_setup(
                || {
                    let dir = tempdir().unwrap();
                    let path = dir.path().join("bench.idx");
                    let store = DiskStore::create(&path, DiskStoreConfig::default()).unwrap();
                    (RTree::create(store, IndexConfig::new(2)).unwrap(), dir)
                },
                |(mut tree, _dir)| {
                    for entry in data {
                        tree.insert(entry.clone()).unwrap();
                    }
                    tree.flush().unwrap();
                    black_box(tree.len())
                },
            );
        });
    }

    group.finish();
}

fn bench_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("RTree Bulk Load");
    let data = entries(100_000);

    for order in [BulkLoadOrder::SortTileRecursive, BulkLoadOrder::Hilbert] {
        group.bench_function(format!("{:?}_100k", order), |b| {
            b.iter(|| {
                let config = IndexConfig::new(2).with_bulk_load_order(order);
                let mut stream = VecStream::new(data.clone());
                let tree = RTree::bulk_load(MemoryStore::new(), config, &mut stream).unwrap();
                black_box(tree.height())
            });
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("RTree Search");

    let mut stream = VecStream::new(entries(100_000));
    let tree = RTree::bulk_load(MemoryStore::new(), IndexConfig::new(2), &mut stream).unwrap();

    group.bench_function("window_100k", |b| {
        let query = Region::new(vec![250.0, 250.0], vec![300.0, 300.0]).unwrap();
        b.iter(|| black_box(tree.count(&query).unwrap()));
    });

    group.bench_function("nearest_10_100k", |b| {
        let query = Region::point(&[500.0, 500.0]).unwrap();
        b.iter(|| black_box(tree.nearest(10, &query).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_disk_insert, bench_bulk_load, bench_search);
criterion_main!(benches);
