use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use scenesynth::graph::{SceneGraph, SceneNode};
use scenesynth::hierarchy::Forest;
use scenesynth::mutation::{MutationEngine, NodeSpec, Operation, OperationBatch};
use scenesynth::persistence::Snapshot;

fn batch_of(size: usize) -> OperationBatch {
    let mut batch = OperationBatch::default();
    for i in 0..size {
        batch.push(Operation::add_node(
            NodeSpec::new(format!("House {}", i)).with_id(format!("h{}", i)),
        ));
        if i > 0 {
            batch.push(Operation::add_edge(
                format!("h{}", i - 1),
                format!("h{}", i),
                "next_to",
            ));
        }
    }
    batch
}

/// Build a forest with `width` expanded nodes under the root
fn wide_forest(width: usize) -> Forest {
    let mut root = SceneGraph::new("", "Province");
    for i in 0..width {
        root.add_node(SceneNode::new(format!("t{}", i), format!("Town {}", i)))
            .unwrap();
    }
    let mut forest = Forest::new(root);
    let root_id = forest.root_id().clone();

    for i in 0..width {
        let mut town = SceneGraph::new("", format!("Town {}", i));
        for j in 0..8 {
            town.add_node(SceneNode::new(format!("b{}", j), "Building"))
                .unwrap();
        }
        forest
            .attach_child(&root_id, &format!("t{}", i).into(), town)
            .unwrap();
    }
    forest
}

/// Batch application with semantic placement of every new node
fn bench_apply_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_batch");
    let engine = MutationEngine::new();

    for size in [10, 100, 500].iter() {
        let batch = batch_of(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut graph = SceneGraph::new("g1", "Bench");
                let result = engine.apply(&mut graph, &batch);
                criterion::black_box(result.applied.len());
            });
        });
    }
    group.finish();
}

/// Snapshot capture, JSON encoding and validated restore
fn bench_snapshot_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_round_trip");

    for width in [4, 32, 128].iter() {
        let forest = wide_forest(*width);
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, _| {
            b.iter(|| {
                let json = Snapshot::capture(&forest).to_json().unwrap();
                let restored = Snapshot::from_json(&json).unwrap().into_forest().unwrap();
                criterion::black_box(restored.len());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_apply_batch, bench_snapshot_round_trip);
criterion_main!(benches);
