use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use subseq_taxonomy::models::{CategoryId, CategoryNode};
use subseq_taxonomy::tree::{CategoryIndex, build_forest};

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

/// Random forest where every node's parent has a smaller id, so the set is
/// acyclic by construction. Roughly one node in fifty is a root.
fn synthetic_forest(node_count: usize) -> Vec<CategoryNode> {
    let mut state = 0x1234_5678_9abc_def0u64;
    (1..=node_count as i64)
        .map(|id| {
            let roll = lcg_next(&mut state);
            let parent_id = if id == 1 || roll % 50 == 0 {
                None
            } else {
                Some(CategoryId(1 + (roll % (id as u64 - 1)) as i64))
            };
            CategoryNode {
                id: CategoryId(id),
                name: format!("Category {id}"),
                slug: format!("category-{id}"),
                parent_id,
            }
        })
        .collect()
}

/// Worst case for the ancestor walk: a single chain.
fn synthetic_chain(node_count: usize) -> Vec<CategoryNode> {
    (1..=node_count as i64)
        .map(|id| CategoryNode {
            id: CategoryId(id),
            name: format!("Category {id}"),
            slug: format!("category-{id}"),
            parent_id: (id > 1).then(|| CategoryId(id - 1)),
        })
        .collect()
}

fn bench_validate_parent(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_parent");
    for nodes in [1_000usize, 10_000usize] {
        let data = synthetic_forest(nodes);
        let index = CategoryIndex::new(&data);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("random_forest", format!("{nodes}n")),
            &index,
            |b, index| {
                let mut seed = 42u64;
                b.iter(|| {
                    let node = CategoryId(1 + (lcg_next(&mut seed) % nodes as u64) as i64);
                    let parent = CategoryId(1 + (lcg_next(&mut seed) % nodes as u64) as i64);
                    black_box(index.validate_parent(Some(node), Some(parent)).is_ok());
                });
            },
        );
    }
    group.finish();
}

fn bench_ancestor_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("ancestor_walk");
    for nodes in [1_000usize, 10_000usize] {
        let data = synthetic_chain(nodes);
        let index = CategoryIndex::new(&data);
        let leaf = CategoryId(nodes as i64);

        group.throughput(Throughput::Elements(nodes as u64));
        group.bench_with_input(
            BenchmarkId::new("chain_leaf", format!("{nodes}n")),
            &index,
            |b, index| {
                b.iter(|| black_box(index.ancestors(leaf).map(|chain| chain.len())));
            },
        );
    }
    group.finish();
}

fn bench_build_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_forest");
    for nodes in [1_000usize, 10_000usize] {
        let data = synthetic_forest(nodes);

        group.throughput(Throughput::Elements(nodes as u64));
        group.bench_with_input(
            BenchmarkId::new("random_forest", format!("{nodes}n")),
            &data,
            |b, data| {
                b.iter(|| black_box(build_forest(data).len()));
            },
        );
    }
    group.finish();
}

criterion_group!(
    tree_checks,
    bench_validate_parent,
    bench_ancestor_walk,
    bench_build_forest
);
criterion_main!(tree_checks);
