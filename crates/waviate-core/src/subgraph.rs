//! Promoting a whole graph to an operator.
//!
//! [`promote`] snapshots a graph into an immutable [`SubgraphTemplate`] and
//! wraps it in an [`OperatorType`]. Graph-input nodes become slots in
//! placement order. When a node of the promoted type is compiled, the compiler
//! compiles the template against the node's slot values and runs it once
//! ahead of time; at runtime the nested context runs inside the outer step.
//!
//! A template remembers the [`GraphId`] it was taken from. Placing a promoted
//! operator into a graph is refused if that graph's id appears anywhere in the
//! operator's nesting, which rules out unbounded self-expansion.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::GraphError;
use crate::graph::{Graph, GraphId, NodeId};
use crate::operator::{OperatorBody, OperatorId, OperatorType, SlotSpec};
use crate::value::{DeclaredType, Value, ValueType};

/// Frozen copy of a graph used as an operator body.
#[derive(Debug, Clone)]
pub struct SubgraphTemplate {
    pub(crate) graph: Graph,
    pub(crate) output: NodeId,
    source: GraphId,
}

impl SubgraphTemplate {
    /// Id of the graph this template was taken from.
    pub fn source(&self) -> GraphId {
        self.source
    }

    /// The frozen graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Output node inside the frozen graph.
    pub fn output(&self) -> NodeId {
        self.output
    }
}

/// Turns `graph` into an operator whose output is `output`.
///
/// Each slot's type is the resolved type of its graph-input node; it demands
/// a compile-time value when anything downstream of that input does, and its
/// required length is the largest required length among the input's
/// consumers. The operator is runtime-only if anything upstream of `output`
/// is.
pub fn promote(
    graph: &Graph,
    output: NodeId,
    id: OperatorId,
    name: impl Into<String>,
) -> Result<Arc<OperatorType>, GraphError> {
    if !graph.contains(output) {
        return Err(GraphError::NodeNotFound(output));
    }
    let mut frozen = graph.snapshot();
    frozen.resolve_types();

    let mut slots = Vec::new();
    for (position, input) in frozen.input_nodes().into_iter().enumerate() {
        let Some(data) = frozen.node(input) else {
            continue;
        };
        let value_type = data.output_type();
        let name = data
            .config
            .text("name")
            .map_or_else(|| format!("input{position}"), str::to_owned);
        let required_len = data
            .consumers
            .iter()
            .filter_map(|&(c, slot)| frozen.node(c)?.operator.slots.get(slot))
            .map(|s| s.required_len)
            .max()
            .unwrap_or(0);
        let mut spec = SlotSpec::new(name, value_type)
            .with_len(required_len)
            .with_default(data.input_fallback());
        spec.compile_time = frozen.needs_compile_time_inputs(input);
        slots.push(spec);
    }

    let output_type = frozen
        .resolved_type(output)
        .and_then(|t| t.value_type())
        .unwrap_or(ValueType::Any);
    let always_runtime = frozen
        .upstream_order(output)
        .iter()
        .filter_map(|&n| frozen.operator(n))
        .any(|op| op.always_runtime);

    #[cfg(feature = "tracing")]
    tracing::debug!(
        "promote {} from {}: {} slots, output {output_type}",
        id,
        graph.id(),
        slots.len()
    );

    let template = SubgraphTemplate {
        output,
        source: graph.id(),
        graph: frozen,
    };
    Ok(Arc::new(OperatorType {
        id,
        name: name.into(),
        category: "custom",
        slots,
        output: DeclaredType::Fixed(output_type),
        follow_slot: None,
        always_runtime,
        body: OperatorBody::Subgraph(Arc::new(template)),
    }))
}

/// Whether `operator` nests the graph `target` at any depth.
pub(crate) fn contains_graph(operator: &OperatorType, target: GraphId) -> bool {
    let Some(root) = operator.subgraph() else {
        return false;
    };
    let mut visited: HashSet<*const SubgraphTemplate> = HashSet::new();
    let mut stack: Vec<&SubgraphTemplate> = vec![root.as_ref()];

    while let Some(template) = stack.pop() {
        if template.source == target {
            return true;
        }
        if !visited.insert(std::ptr::from_ref(template)) {
            continue;
        }
        for id in template.graph.node_ids() {
            if let Some(nested) = template.graph.operator(id).and_then(|op| op.subgraph()) {
                stack.push(nested.as_ref());
            }
        }
    }
    false
}

/// Default slot value a promoted operator exposes for one of its inputs.
pub fn slot_default(operator: &OperatorType, slot: usize) -> Option<Value> {
    operator.slots.get(slot).map(|s| s.default)
}
