//! Definition-graph freeze benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use upb::{DefPool, FieldBuilder, FieldType, Label};

fn build_chain_pool(depth: usize) -> (DefPool, Vec<upb::DefId>) {
    let mut pool = DefPool::new();
    let mut roots = Vec::with_capacity(depth);
    let mut prev: Option<upb::MsgDef> = None;

    for i in 0..depth {
        let msg = pool.new_msg(format!(".bench.Chain{i}")).unwrap();
        if let Some(prev_msg) = prev {
            let f = pool.new_field(msg, FieldBuilder::new("next", 1, Label::Optional, FieldType::Message)).unwrap();
            pool.field_set_message_subdef(f, prev_msg).unwrap();
        } else {
            pool.new_field(msg, FieldBuilder::new("leaf", 1, Label::Optional, FieldType::Int32)).unwrap();
        }
        prev = Some(msg);
        roots.push(msg.into());
    }
    (pool, roots)
}

fn bench_freeze_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("freeze_chain");
    for &depth in &[4usize, 16, 64, 256] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            b.iter_batched(
                || build_chain_pool(depth),
                |(mut pool, roots)| {
                    pool.freeze(&[*roots.last().unwrap()], depth + 8).unwrap();
                    criterion::black_box(pool);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_arena_cycle_freeze(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena_cycle_freeze");

    group.bench_function("10_node_cycle", |b| {
        b.iter_batched(
            || {
                let mut arena: upb::Arena<u32> = upb::Arena::new();
                let nodes: Vec<_> = (0..10).map(|i| arena.init(i, "bench").unwrap()).collect();
                for i in 0..nodes.len() {
                    let next = nodes[(i + 1) % nodes.len()];
                    arena.ref2(nodes[i], next).unwrap();
                }
                (arena, nodes[0])
            },
            |(mut arena, root)| {
                arena.freeze(&[root], 64).unwrap();
                criterion::black_box(arena);
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_freeze_chain, bench_arena_cycle_freeze);
criterion_main!(benches);
