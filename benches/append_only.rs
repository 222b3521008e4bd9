#[macro_use]
extern crate criterion;

use catree::{
    block_on, Blake3Policy, ContentAddressedTree, Hash, HashPolicy, NodeStore, Sha256Policy,
    StoreConfig, ThreadPool, TreeConfig,
};
use criterion::{BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use tempfile::TempDir;

const DEPTH: u32 = 32;
const SMALL_BATCHES: [usize; 6] = [2, 4, 8, 16, 32, 64];
const LARGE_BATCHES: [usize; 5] = [512, 1024, 2048, 4096, 8192];

fn open_tree<P: HashPolicy>(name: &str) -> (TempDir, ContentAddressedTree<P>) {
    let dir = TempDir::new().unwrap();
    let store = NodeStore::open(StoreConfig::new(dir.path(), name).with_max_size(16 << 30)).unwrap();
    let threads = std::thread::available_parallelism().map_or(4, |n| n.get());
    let workers = Arc::new(ThreadPool::new(threads).unwrap());
    let tree =
        ContentAddressedTree::open(Arc::new(store), TreeConfig::new(name, DEPTH), workers).unwrap();
    (dir, tree)
}

fn random_leaves(rng: &mut StdRng, count: usize) -> Vec<Hash> {
    (0..count).map(|_| Hash::from_bytes(rng.gen())).collect()
}

fn append<P: HashPolicy>(tree: &ContentAddressedTree<P>, leaves: Vec<Hash>) {
    block_on(|done| tree.add_values(leaves, move |r| done.complete(r)))
        .unwrap()
        .unwrap();
}

fn commit<P: HashPolicy>(tree: &ContentAddressedTree<P>) {
    block_on(|done| tree.commit(move |r| done.complete(r)))
        .unwrap()
        .unwrap();
}

/// Hashing and staging only: every batch is rolled back
fn bench_append<P: HashPolicy>(c: &mut Criterion, sizes: &[usize], label: &str) {
    let mut group = c.benchmark_group(format!("append {} {label}", P::NAME));
    let (_dir, tree) = open_tree::<P>("append");
    let mut rng = StdRng::seed_from_u64(42);

    // Start from a non-empty tree so batches hash against existing siblings
    append(&tree, random_leaves(&mut rng, 1000));
    commit(&tree);

    for &size in sizes {
        let leaves = random_leaves(&mut rng, size);
        group.bench_with_input(BenchmarkId::new("batch", size), &leaves, |b, leaves| {
            b.iter(|| {
                append(&tree, leaves.clone());
                tree.rollback().unwrap();
            });
        });
    }
    group.finish();
}

/// Append followed by a durable commit
fn bench_append_commit<P: HashPolicy>(c: &mut Criterion, sizes: &[usize]) {
    let mut group = c.benchmark_group(format!("append+commit {}", P::NAME));
    group.sample_size(10);
    let (_dir, tree) = open_tree::<P>("commit");
    let mut rng = StdRng::seed_from_u64(7);

    for &size in sizes {
        group.bench_with_input(BenchmarkId::new("batch", size), &size, |b, &size| {
            b.iter_batched(
                || random_leaves(&mut rng, size),
                |leaves| {
                    append(&tree, leaves);
                    commit(&tree);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench(c: &mut Criterion) {
    bench_append::<Blake3Policy>(c, &SMALL_BATCHES, "small");
    bench_append::<Blake3Policy>(c, &LARGE_BATCHES, "large");
    bench_append::<Sha256Policy>(c, &SMALL_BATCHES, "small");
    bench_append::<Sha256Policy>(c, &LARGE_BATCHES, "large");

    bench_append_commit::<Blake3Policy>(c, &[64, 8192]);
    bench_append_commit::<Sha256Policy>(c, &[64, 8192]);
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench
);
criterion_main!(benches);
