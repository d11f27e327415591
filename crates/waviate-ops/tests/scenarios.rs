//! End-to-end scenarios over the built-in catalog.
//!
//! Each test builds a graph from real operators, compiles it, and runs blocks
//! through the executor or the publication channel.

use std::sync::Arc;

use proptest::prelude::*;
use waviate_core::{
    Catalog, ExecutionState, Graph, GraphError, Inputs, MAX_NODE_LEN, NodeFault, NodeId,
    OperatorId, OperatorType, ResolvedType, RuntimeContext, Value, ValueType, executor, promote,
    publication,
};
use waviate_ops::{BlockContext, BroadcastMode, builtin_catalog, id};

fn op(catalog: &Catalog, id: OperatorId) -> Arc<OperatorType> {
    Arc::clone(catalog.lookup(id).expect("built-in operator"))
}

fn constant(graph: &mut Graph, catalog: &Catalog, value: f64) -> NodeId {
    let node = graph.add_node(op(catalog, id::CONSTANT)).unwrap();
    graph.set_number(node, "value", value).unwrap();
    node
}

fn constants(graph: &mut Graph, catalog: &Catalog, values: &[f64]) -> NodeId {
    let node = graph.add_node(op(catalog, id::CONSTANTS)).unwrap();
    let text: Vec<String> = values.iter().map(ToString::to_string).collect();
    graph.set_text(node, "values", &text.join(",")).unwrap();
    node
}

fn decimals(xs: &[f64]) -> Vec<Value> {
    xs.iter().copied().map(Value::decimal).collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn scenario_a_input_plus_constant() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let x = g.add_node(op(&catalog, id::INPUT)).unwrap();
    let two = constant(&mut g, &catalog, 2.0);
    let add = g.add_node(op(&catalog, id::ADD)).unwrap();
    let out = g.add_node(op(&catalog, id::OUTPUT)).unwrap();
    g.attach(add, 0, x).unwrap();
    g.attach(add, 1, two).unwrap();
    g.attach(out, 0, add).unwrap();

    assert_eq!(g.resolved_type(x), Some(ResolvedType::Decimal));
    assert_eq!(g.resolved_type(out), Some(ResolvedType::Decimal));

    let externals = vec![decimals(&[3.0])];
    let context = g.compile(out, &externals).unwrap();
    let mut state = ExecutionState::new(&context);
    let result = executor::run(
        &context,
        &mut state,
        &mut RuntimeContext::detached(),
        &Inputs::owned(&externals),
    );
    assert_eq!(result, decimals(&[5.0]).as_slice());
}

#[test]
fn scenario_b_outer_product() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let xs = [1.0, 2.0, 3.0];
    let ys = [10.0, 20.0, 30.0, 40.0];
    let x = constants(&mut g, &catalog, &xs);
    let y = constants(&mut g, &catalog, &ys);
    let add = g.add_node(op(&catalog, id::ADD)).unwrap();
    g.set_number(add, "op_mode", BroadcastMode::Outer.code()).unwrap();
    g.attach(add, 0, x).unwrap();
    g.attach(add, 1, y).unwrap();

    let context = g.compile(add, &[]).unwrap();
    assert_eq!(context.output_len(), 12);
    let values = context.folded_value(add).unwrap();
    for (i, xi) in xs.iter().enumerate() {
        for (j, yj) in ys.iter().enumerate() {
            assert_eq!(values[j + i * 4].as_decimal(), xi + yj);
        }
    }
}

#[test]
fn scenario_c_cycle_is_refused() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let a = g.add_node(op(&catalog, id::SIN)).unwrap();
    let b = g.add_node(op(&catalog, id::SIN)).unwrap();
    let mid = g.add_node(op(&catalog, id::FLOOR)).unwrap();
    // a <- mid <- b
    g.attach(mid, 0, b).unwrap();
    g.attach(a, 0, mid).unwrap();

    let before = g.edges();
    assert!(matches!(
        g.attach(b, 0, a),
        Err(GraphError::CycleDetected { .. })
    ));
    assert_eq!(g.edges(), before);
    assert_eq!(g.input(b, 0), None);
}

#[test]
fn scenario_d_constant_chain_folds() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let five = constant(&mut g, &catalog, 5.0);
    let three = constant(&mut g, &catalog, 3.0);
    let mul = g.add_node(op(&catalog, id::MULTIPLY)).unwrap();
    g.attach(mul, 0, five).unwrap();
    g.attach(mul, 1, three).unwrap();

    assert!(g.is_compile_time_known(mul));
    let context = g.compile(mul, &[]).unwrap();
    assert!(context.is_folded(mul));
    assert!(context.steps().is_empty());
    assert_eq!(context.folded_value(mul), Some(decimals(&[15.0]).as_slice()));
}

#[test]
fn scenario_e_promoted_graph_cannot_contain_itself() {
    let catalog = builtin_catalog();
    let mut s = Graph::new();
    let x = s.add_node(op(&catalog, id::INPUT)).unwrap();
    let sin = s.add_node(op(&catalog, id::SIN)).unwrap();
    s.attach(sin, 0, x).unwrap();

    let promoted = promote(&s, sin, OperatorId::new(7, 1), "wobble").unwrap();
    let nodes_before = s.len();
    assert!(matches!(
        s.add_node(promoted.clone()),
        Err(GraphError::RecursivePlacement(_))
    ));
    assert_eq!(s.len(), nodes_before);

    // Any other graph may host it.
    let mut host = Graph::new();
    host.add_node(promoted).unwrap();
}

// ============================================================================
// Catalog behaviour through the engine
// ============================================================================

#[test]
fn repeat_count_from_graph_input_is_folded() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let n = g.add_node(op(&catalog, id::INPUT)).unwrap();
    let value = constant(&mut g, &catalog, 0.25);
    let repeat = g.add_node(op(&catalog, id::REPEAT)).unwrap();
    g.attach(repeat, 0, value).unwrap();
    g.attach(repeat, 1, n).unwrap();

    assert_eq!(g.resolved_type(n), Some(ResolvedType::Integer));
    assert!(g.needs_compile_time_inputs(n));

    let externals = vec![vec![Value::integer(5)]];
    let context = g.compile(repeat, &externals).unwrap();
    assert_eq!(context.output_len(), 5);
    assert!(context.is_folded(repeat));

    // Noise feeding a compile-time count is refused outright.
    let noise = g.add_node(op(&catalog, id::WHITE_NOISE)).unwrap();
    assert!(matches!(
        g.attach(repeat, 1, noise),
        Err(GraphError::CompileTimeRequired { .. })
    ));
}

#[test]
fn lerp_with_one_leg_faults_without_breaking_the_rest() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let c = constant(&mut g, &catalog, 1.0);
    let lerp = g.add_node(op(&catalog, id::LERP)).unwrap();
    g.attach(lerp, 0, c).unwrap();
    let sin = g.add_node(op(&catalog, id::SIN)).unwrap();
    g.attach(sin, 0, c).unwrap();

    let broken = g.compile(lerp, &[]).unwrap();
    assert_eq!(
        broken.fault(lerp),
        Some(&NodeFault::MissingLegs {
            required: 2,
            connected: 1
        })
    );
    assert_eq!(broken.output_len(), 0);

    let healthy = g.compile(sin, &[]).unwrap();
    assert!(healthy.diagnostics().is_empty());
    assert_eq!(healthy.folded_value(sin), Some(decimals(&[1.0_f64.sin()]).as_slice()));
}

#[test]
fn where_follows_selected_branch_type() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let a = g.add_node(op(&catalog, id::SAMPLE_NUMBER)).unwrap();
    let cond = g.add_node(op(&catalog, id::BOOLEAN)).unwrap();
    let select = g.add_node(op(&catalog, id::WHERE)).unwrap();
    let out = g.add_node(op(&catalog, id::OUTPUT)).unwrap();
    g.attach(select, 0, cond).unwrap();
    g.attach(select, 1, a).unwrap();
    g.attach(out, 0, select).unwrap();

    assert_eq!(g.resolved_type(select), Some(ResolvedType::Integer));
    assert_eq!(g.resolved_type(out), Some(ResolvedType::Integer));
    let context = g.compile(out, &[]).unwrap();
    assert_eq!(context.output_type(), ValueType::Integer);
}

#[test]
fn where_converts_the_other_branch_to_its_type() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let cond = g.add_node(op(&catalog, id::BOOLEAN)).unwrap();
    let seven = constant(&mut g, &catalog, 7.9);
    let a = g.add_node(op(&catalog, id::ROUND)).unwrap();
    g.attach(a, 0, seven).unwrap();
    let b = constant(&mut g, &catalog, 5.0);
    let select = g.add_node(op(&catalog, id::WHERE)).unwrap();
    g.attach(select, 0, cond).unwrap();
    g.attach(select, 1, a).unwrap();
    g.attach(select, 2, b).unwrap();
    assert_eq!(g.resolved_type(select), Some(ResolvedType::Integer));

    let context = g.compile(select, &[]).unwrap();
    assert!(context.is_folded(select));
    assert_eq!(context.folded_value(select), Some(&[Value::integer(5)][..]));
}

#[test]
fn where_converts_a_runtime_branch_each_block() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let cond = g.add_node(op(&catalog, id::BOOLEAN)).unwrap();
    let frame = g.add_node(op(&catalog, id::SAMPLE_NUMBER)).unwrap();
    let rate = g.add_node(op(&catalog, id::SAMPLE_RATE)).unwrap();
    let select = g.add_node(op(&catalog, id::WHERE)).unwrap();
    g.attach(select, 0, cond).unwrap();
    g.attach(select, 1, frame).unwrap();
    g.attach(select, 2, rate).unwrap();
    assert_eq!(g.resolved_type(select), Some(ResolvedType::Integer));

    let context = g.compile(select, &[]).unwrap();
    let mut state = ExecutionState::new(&context);
    let mut block = BlockContext::new(44_100.0, 0);
    let out = executor::run(&context, &mut state, &mut block.runtime(), &Inputs::EMPTY);
    assert_eq!(out, [Value::integer(44_100)]);
}

#[test]
fn oversized_repeat_count_faults_the_node() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let n = constant(&mut g, &catalog, 1e15);
    let repeat = g.add_node(op(&catalog, id::REPEAT)).unwrap();
    g.attach(repeat, 1, n).unwrap();
    let sin = g.add_node(op(&catalog, id::SIN)).unwrap();
    g.attach(sin, 0, repeat).unwrap();

    let context = g.compile(sin, &[]).unwrap();
    assert!(matches!(context.fault(repeat), Some(NodeFault::InvalidConfig(_))));
    assert_eq!(context.fault(sin), Some(&NodeFault::Upstream(repeat)));
    assert_eq!(context.output_len(), 0);

    // At the limit the node still compiles.
    g.set_number(n, "value", 4096.0).unwrap();
    let context = g.compile(repeat, &[]).unwrap();
    assert!(context.diagnostics().is_empty());
    assert_eq!(context.output_len(), 4096);
}

#[test]
fn oversized_noise_length_faults_the_node() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let n = constant(&mut g, &catalog, (MAX_NODE_LEN + 1) as f64);
    let noise = g.add_node(op(&catalog, id::WHITE_NOISE)).unwrap();
    g.attach(noise, 2, n).unwrap();

    let context = g.compile(noise, &[]).unwrap();
    assert!(matches!(context.fault(noise), Some(NodeFault::InvalidConfig(_))));
}

#[test]
fn host_operators_run_through_publication() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let frame = g.add_node(op(&catalog, id::SAMPLE_NUMBER)).unwrap();
    let rate = g.add_node(op(&catalog, id::SAMPLE_RATE)).unwrap();
    let ratio = g.add_node(op(&catalog, id::DIVIDE)).unwrap();
    g.attach(ratio, 0, frame).unwrap();
    g.attach(ratio, 1, rate).unwrap();

    let (publisher, mut renderer) = publication::channel();
    publisher.publish(g.compile(ratio, &[]).unwrap());

    let mut block = BlockContext::new(100.0, 1);
    let mut seconds = Vec::new();
    for _ in 0..3 {
        let out = renderer
            .render(&mut block.runtime(), &Inputs::EMPTY)
            .unwrap();
        seconds.push(out[0].as_decimal());
        block.advance(50);
    }
    assert_eq!(seconds, vec![0.0, 0.5, 1.0]);
}

#[test]
fn noise_uses_host_generator() {
    let catalog = builtin_catalog();
    let mut g = Graph::new();
    let noise = g.add_node(op(&catalog, id::WHITE_NOISE)).unwrap();
    let count = constant(&mut g, &catalog, 8.0);
    g.attach(noise, 2, count).unwrap();

    let context = g.compile(noise, &[]).unwrap();
    assert_eq!(context.output_len(), 8);
    assert!(!context.is_folded(noise));

    let mut first = ExecutionState::new(&context);
    let mut second = ExecutionState::new(&context);
    let mut a = BlockContext::new(48_000.0, 99);
    let mut b = BlockContext::new(48_000.0, 99);
    let x = executor::run(&context, &mut first, &mut a.runtime(), &Inputs::EMPTY).to_vec();
    let y = executor::run(&context, &mut second, &mut b.runtime(), &Inputs::EMPTY).to_vec();
    assert_eq!(x, y);
    assert!(x.iter().all(|v| (0.0..=1.0).contains(&v.as_decimal())));
}

#[test]
fn promoted_graph_with_compile_time_slot() {
    let catalog = builtin_catalog();
    let mut inner = Graph::new();
    let n = inner.add_node(op(&catalog, id::INPUT)).unwrap();
    inner.set_text(n, "name", "count").unwrap();
    let value = constant(&mut inner, &catalog, 1.5);
    let repeat = inner.add_node(op(&catalog, id::REPEAT)).unwrap();
    inner.attach(repeat, 0, value).unwrap();
    inner.attach(repeat, 1, n).unwrap();
    let fill = promote(&inner, repeat, OperatorId::new(3, 1), "fill").unwrap();
    assert!(fill.slots[0].compile_time);
    assert_eq!(fill.slots[0].name, "count");

    let mut outer = Graph::new();
    let three = constant(&mut outer, &catalog, 3.0);
    let node = outer.add_node(fill).unwrap();
    outer.attach(node, 0, three).unwrap();
    let noise = outer.add_node(op(&catalog, id::WHITE_NOISE)).unwrap();
    assert!(matches!(
        outer.attach(node, 0, noise),
        Err(GraphError::CompileTimeRequired { .. })
    ));

    let context = outer.compile(node, &[]).unwrap();
    assert_eq!(context.folded_value(node), Some(decimals(&[1.5, 1.5, 1.5]).as_slice()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Folding an arithmetic chain gives the same values as running it each
    /// block from graph inputs.
    #[test]
    fn folding_matches_runtime(
        xs in prop::collection::vec(-100.0f64..100.0, 1..6),
        ys in prop::collection::vec(-100.0f64..100.0, 1..6),
        mode in 0usize..3,
    ) {
        let catalog = builtin_catalog();
        let mode = [BroadcastMode::Pad, BroadcastMode::Truncate, BroadcastMode::Outer][mode];

        let mut folded = Graph::new();
        let x = constants(&mut folded, &catalog, &xs);
        let y = constants(&mut folded, &catalog, &ys);
        let sub = folded.add_node(op(&catalog, id::SUBTRACT)).unwrap();
        folded.set_number(sub, "op_mode", mode.code()).unwrap();
        folded.attach(sub, 0, x).unwrap();
        folded.attach(sub, 1, y).unwrap();
        let folded_ctx = folded.compile(sub, &[]).unwrap();
        let expected = folded_ctx.folded_value(sub).unwrap().to_vec();

        let mut live = Graph::new();
        let x = live.add_node(op(&catalog, id::INPUT)).unwrap();
        let y = live.add_node(op(&catalog, id::INPUT)).unwrap();
        live.set_placement(y, 1).unwrap();
        let sub = live.add_node(op(&catalog, id::SUBTRACT)).unwrap();
        live.set_number(sub, "op_mode", mode.code()).unwrap();
        live.attach(sub, 0, x).unwrap();
        live.attach(sub, 1, y).unwrap();
        let externals = vec![decimals(&xs), decimals(&ys)];
        let live_ctx = live.compile(sub, &externals).unwrap();
        let mut state = ExecutionState::new(&live_ctx);
        let got = executor::run(
            &live_ctx,
            &mut state,
            &mut RuntimeContext::detached(),
            &Inputs::owned(&externals),
        );

        prop_assert_eq!(got, expected.as_slice());
    }
}
