//! Graph compiler: sizing, constant folding, ordering, and buffer layout.
//!
//! ```text
//! upstream_order ──> copy nodes ──> speculate (sizes + values, topo order)
//!                                        │
//!              fold flags ──> static prefix layout ──> step emission
//! ```
//!
//! Every node is run once ahead of time with a detached runtime context.
//! That pass discovers output lengths that depend on compile-time scalars and
//! provides the values of folded nodes. Nodes whose length function reports a
//! [`NodeFault`] get a zero-length region and a diagnostic; everything that
//! depends on them faults too, and the rest of the graph compiles normally.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CompileError, NodeFault};
use crate::executor::{self, ExecutionState};
use crate::graph::{Graph, NodeId};
use crate::operator::OperatorBody;
use crate::plan::{
    CompiledContext, CompiledNode, ContextId, Diagnostic, ExecStep, MAX_NODE_LEN, Region,
};
use crate::runtime::{Inputs, LenQuery, RuntimeContext};
use crate::value::Value;

/// Result of running one node ahead of time.
struct Speculated {
    values: Vec<Value>,
    fault: Option<NodeFault>,
    inner: Option<Arc<CompiledContext>>,
}

impl Speculated {
    fn values(values: Vec<Value>) -> Self {
        Self {
            values,
            fault: None,
            inner: None,
        }
    }

    fn fault(fault: NodeFault) -> Self {
        Self {
            values: Vec::new(),
            fault: Some(fault),
            inner: None,
        }
    }
}

/// Compiles everything upstream of `output`.
///
/// `externals` supplies the graph-input vectors used for sizing and for
/// folding graph inputs that something downstream needs at compile time.
/// The graph itself is not modified.
pub fn compile(
    graph: &Graph,
    output: NodeId,
    externals: &Inputs<'_>,
) -> Result<CompiledContext, CompileError> {
    if !graph.contains(output) {
        return Err(CompileError::NodeNotFound(output));
    }

    let order: Vec<NodeId> = graph
        .upstream_order(output)
        .into_iter()
        .filter(|&id| graph.contains(id))
        .collect();
    let index: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let external_slot: HashMap<NodeId, usize> = graph
        .input_nodes()
        .into_iter()
        .enumerate()
        .map(|(i, id)| (id, i))
        .collect();
    let fold = graph.fold_flags(&order);

    // Deep copy of the reachable subgraph, edges remapped to dense indices.
    let mut nodes: Vec<CompiledNode> = order
        .iter()
        .filter_map(|&id| {
            let data = graph.node(id)?;
            Some(CompiledNode {
                source: id,
                operator: Arc::clone(&data.operator),
                config: data.config.clone(),
                inputs: data
                    .inputs
                    .iter()
                    .map(|p| p.and_then(|p| index.get(&p).copied()))
                    .collect(),
                defaults: data.defaults.clone(),
                output_type: data.output_type(),
                input_index: external_slot.get(&id).copied(),
                fallback: data.input_fallback(),
                region: Region::EMPTY,
                folded: false,
                fault: None,
                inner: None,
            })
        })
        .collect();

    // Sizes and speculative values, producers first.
    let mut values: Vec<Vec<Value>> = Vec::with_capacity(nodes.len());
    let mut diagnostics = Vec::new();
    for i in 0..nodes.len() {
        let speculated = speculate(&nodes, i, &values, externals)?;
        let node = &mut nodes[i];
        if let Some(fault) = &speculated.fault {
            #[cfg(feature = "tracing")]
            tracing::warn!("compile: {} ({}) faulted: {fault}", node.source, node.operator.name);
            diagnostics.push(Diagnostic {
                node: node.source,
                fault: fault.clone(),
            });
        }
        node.fault = speculated.fault;
        node.inner = speculated.inner;
        node.folded = fold[i] && node.fault.is_none();
        values.push(speculated.values);
    }

    let (steps, input_regions, field) = layout(&mut nodes, &values)?;

    let output_node = index.get(&output).copied().unwrap_or(0);
    let context = CompiledContext {
        id: ContextId::next(),
        index,
        nodes,
        steps,
        input_regions,
        initial_field: field,
        output_node,
        diagnostics,
    };

    #[cfg(feature = "tracing")]
    {
        let folded = context.nodes.iter().filter(|n| n.folded).count();
        tracing::debug!(
            "compile {}: {} nodes, {folded} folded, {} steps, field {} cells, output {}",
            context.id,
            context.nodes.len(),
            context.steps.len(),
            context.initial_field.len(),
            context.output_region()
        );
        for (i, line) in context.describe().iter().enumerate() {
            tracing::debug!("  step[{i}]: {line}");
        }
    }

    Ok(context)
}

/// Sizes and evaluates node `i` from the values of its producers.
fn speculate(
    nodes: &[CompiledNode],
    i: usize,
    values: &[Vec<Value>],
    externals: &Inputs<'_>,
) -> Result<Speculated, CompileError> {
    let node = &nodes[i];

    if let Some(&p) = node
        .inputs
        .iter()
        .flatten()
        .find(|&&p| nodes[p].fault.is_some())
    {
        return Ok(Speculated::fault(NodeFault::Upstream(nodes[p].source)));
    }

    let arity = node.operator.arity();
    let mut slot_values: Vec<Vec<Value>> = Vec::with_capacity(arity);
    let mut attached: Vec<bool> = Vec::with_capacity(arity);
    for (slot, spec) in node.operator.slots.iter().enumerate() {
        match node.inputs.get(slot).copied().flatten() {
            Some(p) => {
                let produced = &values[p];
                if spec.required_len > 0 && produced.len() != spec.required_len {
                    return Err(CompileError::LengthMismatch {
                        node: node.source,
                        slot,
                        expected: spec.required_len,
                        found: produced.len(),
                    });
                }
                let (from, to) = (nodes[p].output_type, node.reader_type(slot));
                slot_values.push(produced.iter().map(|v| v.coerce(from, to)).collect());
                attached.push(true);
            }
            None => {
                let default = node.defaults.get(slot).copied().unwrap_or(spec.default);
                slot_values.push(vec![default]);
                attached.push(false);
            }
        }
    }
    let args = Inputs::owned(&slot_values);

    match &node.operator.body {
        OperatorBody::Builtin {
            output_len,
            execute,
        } => {
            let query = LenQuery::new(&node.config, args, &attached);
            match output_len(&query) {
                Ok(len) if len > MAX_NODE_LEN => Ok(Speculated::fault(NodeFault::InvalidConfig(
                    format!("output length {len} exceeds the limit of {MAX_NODE_LEN}"),
                ))),
                Ok(len) => {
                    let mut out = Vec::new();
                    if out.try_reserve_exact(len).is_err() {
                        return Ok(Speculated::fault(NodeFault::InvalidConfig(format!(
                            "cannot allocate {len} cells"
                        ))));
                    }
                    out.resize(len, Value::ZERO);
                    execute(&node.config, &mut RuntimeContext::detached(), &args, &mut out);
                    Ok(Speculated::values(out))
                }
                Err(fault) => Ok(Speculated::fault(fault)),
            }
        }
        OperatorBody::GraphInput => {
            let supplied = node.input_index.and_then(|i| externals.get(i));
            Ok(Speculated::values(
                supplied.map_or_else(|| vec![node.fallback], <[Value]>::to_vec),
            ))
        }
        OperatorBody::Subgraph(template) => {
            match compile(&template.graph, template.output, &args) {
                Ok(inner) => {
                    let mut state = ExecutionState::new(&inner);
                    let out = executor::run(&inner, &mut state, &mut RuntimeContext::detached(), &args)
                        .to_vec();
                    Ok(Speculated {
                        values: out,
                        fault: None,
                        inner: Some(Arc::new(inner)),
                    })
                }
                Err(err) => Ok(Speculated::fault(NodeFault::Subgraph(err.to_string()))),
            }
        }
    }
}

fn reserve(field: &mut Vec<Value>, len: usize) -> Result<Region, CompileError> {
    field
        .try_reserve(len)
        .map_err(|_| CompileError::FieldTooLarge {
            cells: field.len().saturating_add(len),
        })?;
    Ok(Region::new(field.len(), len))
}

fn alloc(field: &mut Vec<Value>, data: &[Value]) -> Result<Region, CompileError> {
    let region = reserve(field, data.len())?;
    field.extend_from_slice(data);
    Ok(region)
}

fn alloc_zeroed(field: &mut Vec<Value>, len: usize) -> Result<Region, CompileError> {
    let region = reserve(field, len)?;
    field.resize(field.len() + len, Value::ZERO);
    Ok(region)
}

fn runs_each_block(node: &CompiledNode) -> bool {
    !node.folded && node.fault.is_none()
}

/// Assigns regions and emits steps. Returns `(steps, input regions, field)`.
fn layout(
    nodes: &mut [CompiledNode],
    values: &[Vec<Value>],
) -> Result<(Vec<ExecStep>, Vec<Region>, Vec<Value>), CompileError> {
    let mut field: Vec<Value> = Vec::new();

    // Static prefix: folded values.
    for (node, vals) in nodes.iter_mut().zip(values) {
        if node.folded {
            node.region = alloc(&mut field, vals)?;
        }
    }

    // Static prefix: defaults and coerced folded values read by runtime nodes.
    let mut constant_slots: Vec<Vec<Option<Region>>> = vec![Vec::new(); nodes.len()];
    for i in 0..nodes.len() {
        let node = &nodes[i];
        if !runs_each_block(node) || node.operator.is_graph_input() {
            continue;
        }
        let mut slots = Vec::with_capacity(node.operator.arity());
        for (slot, spec) in node.operator.slots.iter().enumerate() {
            let region = match node.inputs.get(slot).copied().flatten() {
                None => {
                    let default = node.defaults.get(slot).copied().unwrap_or(spec.default);
                    Some(alloc(&mut field, &[default])?)
                }
                Some(p) if nodes[p].folded => {
                    let (from, to) = (nodes[p].output_type, node.reader_type(slot));
                    if from.needs_coercion_to(to) {
                        let coerced: Vec<Value> =
                            values[p].iter().map(|v| v.coerce(from, to)).collect();
                        Some(alloc(&mut field, &coerced)?)
                    } else {
                        Some(nodes[p].region)
                    }
                }
                Some(_) => None,
            };
            slots.push(region);
        }
        constant_slots[i] = slots;
    }

    // Runtime steps in topological order.
    let mut steps = Vec::new();
    let mut input_regions = Vec::new();
    for i in 0..nodes.len() {
        if !runs_each_block(&nodes[i]) {
            continue;
        }
        let len = values[i].len();

        if nodes[i].operator.is_graph_input() {
            let output = alloc(&mut field, &values[i])?;
            nodes[i].region = output;
            steps.push(ExecStep::ReadExternal {
                node: i,
                index: nodes[i].input_index,
                fallback: nodes[i].fallback,
                output,
            });
            continue;
        }

        let start = input_regions.len();
        for slot in 0..nodes[i].operator.arity() {
            let constant = constant_slots[i].get(slot).copied().flatten();
            let region = match (constant, nodes[i].inputs.get(slot).copied().flatten()) {
                (Some(region), _) => region,
                (None, Some(p)) => {
                    let source = nodes[p].region;
                    let (from, to) = (nodes[p].output_type, nodes[i].reader_type(slot));
                    if from.needs_coercion_to(to) {
                        let dest = alloc_zeroed(&mut field, source.len)?;
                        steps.push(ExecStep::Coerce {
                            source,
                            dest,
                            from,
                            to,
                        });
                        dest
                    } else {
                        source
                    }
                }
                (None, None) => Region::EMPTY,
            };
            input_regions.push(region);
        }

        let output = alloc_zeroed(&mut field, len)?;
        nodes[i].region = output;
        steps.push(ExecStep::Evaluate {
            node: i,
            inputs: start..input_regions.len(),
            output,
        });
    }

    Ok((steps, input_regions, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{NodeConfig, OperatorId, OperatorType, SlotSpec};
    use crate::value::{DeclaredType, ValueType};

    fn one(_: &LenQuery<'_>) -> Result<usize, NodeFault> {
        Ok(1)
    }

    fn longest(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
        Ok(q.len(0).max(q.len(1)))
    }

    fn two_legs(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
        if q.attached_count() < 2 {
            return Err(NodeFault::MissingLegs {
                required: 2,
                connected: q.attached_count(),
            });
        }
        Ok(1)
    }

    fn value(config: &NodeConfig, _: &mut RuntimeContext<'_>, _: &Inputs<'_>, out: &mut [Value]) {
        out.fill(Value::decimal(config.number_or("value", 0.0)));
    }

    fn add(_: &NodeConfig, _: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
        let at = |s: &[Value], k: usize| s.get(k).or(s.last()).map_or(0.0, |v| v.as_decimal());
        let (x, y) = (inputs.slot(0), inputs.slot(1));
        for (k, o) in out.iter_mut().enumerate() {
            *o = Value::decimal(at(x, k) + at(y, k));
        }
    }

    fn ticks(_: &NodeConfig, ctx: &mut RuntimeContext<'_>, _: &Inputs<'_>, out: &mut [Value]) {
        let n = ctx.host::<u64>().map_or(0, |t| {
            *t += 1;
            *t
        });
        out.fill(Value::integer(n as i64));
    }

    fn constant() -> Arc<OperatorType> {
        Arc::new(OperatorType::builtin(OperatorId::builtin(12), "constant", one, value))
    }

    fn adder() -> Arc<OperatorType> {
        Arc::new(
            OperatorType::builtin(OperatorId::builtin(4), "add", longest, add)
                .slot(SlotSpec::new("x", ValueType::Decimal))
                .slot(SlotSpec::new("y", ValueType::Decimal)),
        )
    }

    fn lerp() -> Arc<OperatorType> {
        Arc::new(
            OperatorType::builtin(OperatorId::builtin(17), "lerp", two_legs, add)
                .slot(SlotSpec::new("a", ValueType::Decimal))
                .slot(SlotSpec::new("b", ValueType::Decimal)),
        )
    }

    fn counter() -> Arc<OperatorType> {
        Arc::new(
            OperatorType::builtin(OperatorId::builtin(20), "ticks", one, ticks)
                .output(DeclaredType::INTEGER)
                .runtime_only(),
        )
    }

    fn input() -> Arc<OperatorType> {
        Arc::new(OperatorType::graph_input(OperatorId::builtin(2)))
    }

    fn enormous(_: &LenQuery<'_>) -> Result<usize, NodeFault> {
        Ok(usize::MAX / 2)
    }

    fn second(_: &NodeConfig, _: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
        let b = inputs.slot(1);
        let n = b.len().min(out.len());
        out[..n].copy_from_slice(&b[..n]);
    }

    /// Two wildcard legs, output follows the first, emits the second.
    fn pick() -> Arc<OperatorType> {
        Arc::new(
            OperatorType::builtin(OperatorId::builtin(79), "pick", one, second)
                .slot(SlotSpec::new("a", ValueType::Any))
                .slot(SlotSpec::new("b", ValueType::Any))
                .follows(0),
        )
    }

    #[test]
    fn missing_output_is_an_error() {
        let g = Graph::new();
        assert!(matches!(
            compile(&g, NodeId(3), &Inputs::EMPTY),
            Err(CompileError::NodeNotFound(_))
        ));
    }

    #[test]
    fn constants_fold_without_steps() {
        let mut g = Graph::new();
        let a = g.add_node(constant()).unwrap();
        let b = g.add_node(constant()).unwrap();
        let sum = g.add_node(adder()).unwrap();
        g.set_number(a, "value", 1.5).unwrap();
        g.set_number(b, "value", 2.0).unwrap();
        g.attach(sum, 0, a).unwrap();
        g.attach(sum, 1, b).unwrap();

        let ctx = g.compile(sum, &[]).unwrap();
        assert!(ctx.is_folded(sum));
        assert!(ctx.steps().is_empty());
        assert_eq!(ctx.folded_value(sum), Some(&[Value::decimal(3.5)][..]));
        assert_eq!(g.output_len(sum, ctx.id()), Ok(1));
    }

    #[test]
    fn runtime_nodes_get_steps_and_coercion() {
        let mut g = Graph::new();
        let t = g.add_node(counter()).unwrap();
        let sum = g.add_node(adder()).unwrap();
        g.attach(sum, 0, t).unwrap();
        g.set_default(sum, 1, Value::decimal(0.5)).unwrap();

        let ctx = g.compile(sum, &[]).unwrap();
        assert!(!ctx.is_folded(sum));
        assert_eq!(ctx.execution_order(), vec![t, sum]);
        assert!(
            ctx.steps()
                .iter()
                .any(|s| matches!(s, ExecStep::Coerce { from: ValueType::Integer, to: ValueType::Decimal, .. }))
        );

        let mut state = ExecutionState::new(&ctx);
        let mut clock = 0_u64;
        let mut rt = RuntimeContext::new(&mut clock);
        let out = executor::run(&ctx, &mut state, &mut rt, &Inputs::EMPTY);
        assert_eq!(out, &[Value::decimal(1.5)]);
        let out = executor::run(&ctx, &mut state, &mut rt, &Inputs::EMPTY);
        assert_eq!(out, &[Value::decimal(2.5)]);
    }

    #[test]
    fn regions_never_overlap() {
        let mut g = Graph::new();
        let t = g.add_node(counter()).unwrap();
        let c = g.add_node(constant()).unwrap();
        let s1 = g.add_node(adder()).unwrap();
        let s2 = g.add_node(adder()).unwrap();
        g.attach(s1, 0, t).unwrap();
        g.attach(s1, 1, c).unwrap();
        g.attach(s2, 0, s1).unwrap();
        g.attach(s2, 1, t).unwrap();

        let ctx = g.compile(s2, &[]).unwrap();
        let regions: Vec<Region> = ctx.regions().map(|(_, r)| r).collect();
        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                assert!(!a.overlaps(*b), "{a} overlaps {b}");
            }
            assert!(a.end() <= ctx.field_len());
        }
    }

    #[test]
    fn faulted_node_is_isolated() {
        let mut g = Graph::new();
        let c = g.add_node(constant()).unwrap();
        let l = g.add_node(lerp()).unwrap();
        let after = g.add_node(adder()).unwrap();
        let other = g.add_node(adder()).unwrap();
        g.attach(l, 0, c).unwrap();
        g.attach(after, 0, l).unwrap();
        g.attach(other, 0, c).unwrap();
        g.attach(other, 1, after).unwrap();

        let ctx = g.compile(other, &[]).unwrap();
        assert_eq!(
            ctx.fault(l),
            Some(&NodeFault::MissingLegs {
                required: 2,
                connected: 1
            })
        );
        assert_eq!(ctx.fault(after), Some(&NodeFault::Upstream(l)));
        assert_eq!(ctx.diagnostics().len(), 3);
        assert_eq!(ctx.output_len(), 0);

        // The healthy branch still compiles on its own.
        let healthy = g.compile(c, &[]).unwrap();
        assert!(healthy.diagnostics().is_empty());
        assert_eq!(healthy.output_len(), 1);
    }

    #[test]
    fn graph_input_reads_externals() {
        let mut g = Graph::new();
        let x = g.add_node(input()).unwrap();
        let sum = g.add_node(adder()).unwrap();
        g.attach(sum, 0, x).unwrap();
        g.set_default(sum, 1, Value::decimal(10.0)).unwrap();

        let externals = vec![vec![Value::decimal(1.0), Value::decimal(2.0)]];
        let ctx = g.compile(sum, &externals).unwrap();
        assert_eq!(ctx.output_len(), 2);

        let mut state = ExecutionState::new(&ctx);
        let out = executor::run(
            &ctx,
            &mut state,
            &mut RuntimeContext::detached(),
            &Inputs::owned(&externals),
        )
        .to_vec();
        assert_eq!(out, vec![Value::decimal(11.0), Value::decimal(12.0)]);

        // Missing externals fall back to the node default.
        let out = executor::run(&ctx, &mut state, &mut RuntimeContext::detached(), &Inputs::EMPTY);
        assert_eq!(out, &[Value::decimal(10.0), Value::decimal(10.0)]);
    }

    #[test]
    fn recompiling_forgets_previous_sizes() {
        let mut g = Graph::new();
        let c = g.add_node(constant()).unwrap();
        let first = g.compile(c, &[]).unwrap();
        assert_eq!(g.output_len(c, first.id()), Ok(1));
        let second = g.compile(c, &[]).unwrap();
        assert!(g.output_len(c, first.id()).is_err());
        assert_eq!(g.output_len(c, second.id()), Ok(1));
        assert_eq!(g.compiled_context(), Some(second.id()));
    }

    #[test]
    fn oversized_length_faults_instead_of_allocating() {
        let mut g = Graph::new();
        let huge = g.add_node(Arc::new(OperatorType::builtin(
            OperatorId::builtin(44),
            "huge",
            enormous,
            value,
        )))
        .unwrap();

        let ctx = g.compile(huge, &[]).unwrap();
        assert!(matches!(ctx.fault(huge), Some(NodeFault::InvalidConfig(_))));
        assert_eq!(ctx.output_len(), 0);
        assert!(ctx.field_len() <= MAX_NODE_LEN);
    }

    #[test]
    fn wildcard_legs_read_in_resolved_type() {
        let mut g = Graph::new();
        let t = g.add_node(counter()).unwrap();
        let c = g.add_node(constant()).unwrap();
        g.set_number(c, "value", 2.75).unwrap();
        let p = g.add_node(pick()).unwrap();
        g.attach(p, 0, t).unwrap();
        g.attach(p, 1, c).unwrap();
        assert_eq!(g.resolved_type(p), Some(crate::value::ResolvedType::Integer));

        let ctx = g.compile(p, &[]).unwrap();
        let mut state = ExecutionState::new(&ctx);
        let mut clock = 0_u64;
        let out = executor::run(&ctx, &mut state, &mut RuntimeContext::new(&mut clock), &Inputs::EMPTY);
        assert_eq!(out, &[Value::integer(2)]);
    }

    #[test]
    fn runtime_wildcard_leg_gets_a_coerce_step() {
        let mut g = Graph::new();
        let c = g.add_node(constant()).unwrap();
        let t = g.add_node(counter()).unwrap();
        let p = g.add_node(pick()).unwrap();
        g.attach(p, 0, c).unwrap();
        g.attach(p, 1, t).unwrap();
        assert_eq!(g.resolved_type(p), Some(crate::value::ResolvedType::Decimal));

        let ctx = g.compile(p, &[]).unwrap();
        assert!(
            ctx.steps()
                .iter()
                .any(|s| matches!(s, ExecStep::Coerce { from: ValueType::Integer, to: ValueType::Decimal, .. }))
        );
        let mut state = ExecutionState::new(&ctx);
        let mut clock = 6_u64;
        let out = executor::run(&ctx, &mut state, &mut RuntimeContext::new(&mut clock), &Inputs::EMPTY);
        assert_eq!(out, &[Value::decimal(7.0)]);
    }
}
