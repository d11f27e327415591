//! Criterion benchmarks for the graph engine.
//!
//! Two axes:
//!
//! - **Compile**: type resolution, length inference, folding, and layout
//! - **Execute**: one block of a compiled context at varying vector lengths
//!
//! Run with: `cargo bench -p waviate-core -- graph/`
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use waviate_core::{
    ExecutionState, Graph, Inputs, LenQuery, NodeConfig, NodeFault, NodeId, OperatorId,
    OperatorType, RuntimeContext, SlotSpec, Value, ValueType, executor,
};

const CHAIN_LENGTHS: &[usize] = &[8, 32, 128];
const VECTOR_LENGTHS: &[usize] = &[64, 256, 1024];

fn longest(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
    Ok(q.len(0).max(q.len(1)))
}

fn mix(_: &NodeConfig, _: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
    let at = |s: &[Value], k: usize| s.get(k).map_or(0.0, |v| v.as_decimal());
    let (x, y) = (inputs.slot(0), inputs.slot(1));
    for (k, o) in out.iter_mut().enumerate() {
        *o = Value::decimal(0.5 * (at(x, k) + at(y, k)));
    }
}

/// A chain of `depth` mix nodes over two graph inputs, each mixing the
/// previous node with the second input.
fn chain(depth: usize) -> (Graph, NodeId) {
    let input = Arc::new(OperatorType::graph_input(OperatorId::builtin(2)));
    let mixer = Arc::new(
        OperatorType::builtin(OperatorId::builtin(4), "mix", longest, mix)
            .slot(SlotSpec::new("x", ValueType::Decimal))
            .slot(SlotSpec::new("y", ValueType::Decimal)),
    );

    let mut g = Graph::new();
    let a = g.add_node(Arc::clone(&input)).unwrap();
    let b = g.add_node(input).unwrap();
    g.set_placement(b, 1).unwrap();
    let mut last = a;
    for _ in 0..depth {
        let node = g.add_node(Arc::clone(&mixer)).unwrap();
        g.attach(node, 0, last).unwrap();
        g.attach(node, 1, b).unwrap();
        last = node;
    }
    (g, last)
}

fn externals(len: usize) -> Vec<Vec<Value>> {
    let ramp: Vec<Value> = (0..len).map(|k| Value::decimal(k as f64 / len as f64)).collect();
    vec![ramp.clone(), ramp]
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/compile");
    let ext = externals(256);

    for &depth in CHAIN_LENGTHS {
        let (mut g, root) = chain(depth);
        group.bench_with_input(BenchmarkId::new("chain", depth), &depth, |b, _| {
            b.iter(|| black_box(g.compile(root, &ext).unwrap()));
        });
    }

    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/execute");
    let (mut g, root) = chain(32);

    for &len in VECTOR_LENGTHS {
        let ext = externals(len);
        let context = g.compile(root, &ext).unwrap();
        let mut state = ExecutionState::new(&context);
        group.bench_with_input(BenchmarkId::new("chain32", len), &len, |b, _| {
            b.iter(|| {
                let out = executor::run(
                    &context,
                    &mut state,
                    &mut RuntimeContext::detached(),
                    &Inputs::owned(&ext),
                );
                black_box(out[0]);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_execute);
criterion_main!(benches);
