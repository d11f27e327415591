//! Wildcard type resolution.
//!
//! Nodes whose operator declares a fixed output type are resolved from the
//! start. Nodes declaring [`FollowsInput`](crate::value::DeclaredType::FollowsInput)
//! start dirty and are resolved by a fixpoint over the edges around them.
//!
//! Each pass computes a candidate for every dirty node from the state at the
//! start of the pass, then applies all candidates together. A node's candidate
//! is taken from the first of these that yields a concrete type:
//!
//! 1. the producer on its followed slot, then producers on its other
//!    `any`-typed slots in slot order
//! 2. consumers in `(node, slot)` order whose slot declares a concrete type
//! 3. consumers that are themselves resolved wildcards reading this node
//!    through their followed (or only `any`) slot
//!
//! When a pass resolves nothing while dirty nodes remain, they all collapse to
//! `any`. Because a pass never looks at candidates from the same pass and a
//! resolved node is never revisited, the result does not depend on the scan
//! order, and re-running on a resolved graph changes nothing.

use std::collections::HashMap;

use crate::value::{DeclaredType, ResolvedType, ValueType};

use super::model::Graph;
use super::node::{NodeId, initial_type};

/// Resolves every live node of `graph`, scanning `order` first.
pub(crate) fn resolve(graph: &Graph, order: &[NodeId]) -> Vec<(NodeId, ResolvedType)> {
    let mut types: HashMap<NodeId, ResolvedType> = graph
        .node_ids()
        .filter_map(|id| graph.node(id).map(|n| (id, initial_type(&n.operator))))
        .collect();

    let mut scan: Vec<NodeId> = order
        .iter()
        .copied()
        .filter(|id| types.contains_key(id))
        .collect();
    for id in graph.node_ids() {
        if !scan.contains(&id) {
            scan.push(id);
        }
    }
    let mut dirty: Vec<NodeId> = scan
        .into_iter()
        .filter(|id| types.get(id) == Some(&ResolvedType::Dirty))
        .collect();

    #[cfg(feature = "tracing")]
    let mut pass = 0usize;
    while !dirty.is_empty() {
        let found: Vec<(NodeId, ValueType)> = dirty
            .iter()
            .filter_map(|&id| candidate(graph, &types, id).map(|t| (id, t)))
            .collect();

        #[cfg(feature = "tracing")]
        {
            pass += 1;
            tracing::debug!(
                "resolve pass {pass}: {} of {} wildcard nodes resolved",
                found.len(),
                dirty.len()
            );
        }

        if found.is_empty() {
            for id in dirty.drain(..) {
                types.insert(id, ResolvedType::Any);
            }
            break;
        }
        for (id, t) in found {
            types.insert(id, t.into());
        }
        dirty.retain(|id| types.get(id) == Some(&ResolvedType::Dirty));
    }

    let mut resolved: Vec<(NodeId, ResolvedType)> = types.into_iter().collect();
    resolved.sort_unstable_by_key(|(id, _)| *id);
    resolved
}

fn concrete(types: &HashMap<NodeId, ResolvedType>, id: NodeId) -> Option<ValueType> {
    types
        .get(&id)
        .and_then(|t| t.value_type())
        .filter(|t| t.is_concrete())
}

fn candidate(graph: &Graph, types: &HashMap<NodeId, ResolvedType>, id: NodeId) -> Option<ValueType> {
    let node = graph.node(id)?;
    let op = &node.operator;

    let followed = op.follow_slot.into_iter();
    let wildcard_slots = op
        .slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.value_type == ValueType::Any)
        .map(|(i, _)| i);
    for slot in followed.chain(wildcard_slots) {
        if let Some(t) = node
            .inputs
            .get(slot)
            .copied()
            .flatten()
            .and_then(|p| concrete(types, p))
        {
            return Some(t);
        }
    }

    for &(consumer, slot) in &node.consumers {
        let declared = graph
            .node(consumer)
            .and_then(|c| c.operator.slots.get(slot))
            .map(|s| s.value_type);
        if let Some(t) = declared.filter(|t| t.is_concrete()) {
            return Some(t);
        }
    }

    for &(consumer, slot) in &node.consumers {
        let Some(c) = graph.node(consumer) else {
            continue;
        };
        let reads_followed = c.operator.output == DeclaredType::FollowsInput
            && c.operator.follow_slot.is_none_or(|f| f == slot)
            && c.operator
                .slots
                .get(slot)
                .is_some_and(|s| s.value_type == ValueType::Any);
        if reads_followed && let Some(t) = concrete(types, consumer) {
            return Some(t);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::error::NodeFault;
    use crate::operator::{NodeConfig, OperatorId, OperatorType, SlotSpec};
    use crate::runtime::{Inputs, LenQuery, RuntimeContext};
    use crate::value::Value;

    use super::*;

    fn one(_: &LenQuery<'_>) -> Result<usize, NodeFault> {
        Ok(1)
    }

    fn nop(_: &NodeConfig, _: &mut RuntimeContext<'_>, _: &Inputs<'_>, _: &mut [Value]) {}

    fn input() -> Arc<OperatorType> {
        Arc::new(OperatorType::graph_input(OperatorId::builtin(2)))
    }

    fn passthrough() -> Arc<OperatorType> {
        Arc::new(
            OperatorType::builtin(OperatorId::builtin(1), "output", one, nop)
                .slot(SlotSpec::new("audio", ValueType::Any))
                .follows(0),
        )
    }

    fn integer_sink() -> Arc<OperatorType> {
        Arc::new(
            OperatorType::builtin(OperatorId::builtin(30), "count", one, nop)
                .slot(SlotSpec::new("n", ValueType::Integer)),
        )
    }

    fn boolean_source() -> Arc<OperatorType> {
        Arc::new(
            OperatorType::builtin(OperatorId::builtin(14), "true", one, nop)
                .output(DeclaredType::BOOLEAN),
        )
    }

    #[test]
    fn input_adopts_consumer_slot_type() {
        let mut g = Graph::new();
        let x = g.add_node(input()).unwrap();
        let sink = g.add_node(integer_sink()).unwrap();
        g.attach(sink, 0, x).unwrap();
        assert_eq!(g.resolved_type(x), Some(ResolvedType::Integer));
    }

    #[test]
    fn passthrough_adopts_producer_type() {
        let mut g = Graph::new();
        let b = g.add_node(boolean_source()).unwrap();
        let out = g.add_node(passthrough()).unwrap();
        g.attach(out, 0, b).unwrap();
        assert_eq!(g.resolved_type(out), Some(ResolvedType::Boolean));
    }

    #[test]
    fn chain_of_wildcards_propagates_both_ways() {
        // input -> pass -> pass -> integer sink
        let mut g = Graph::new();
        let x = g.add_node(input()).unwrap();
        let p1 = g.add_node(passthrough()).unwrap();
        let p2 = g.add_node(passthrough()).unwrap();
        let sink = g.add_node(integer_sink()).unwrap();
        g.attach(p1, 0, x).unwrap();
        g.attach(p2, 0, p1).unwrap();
        g.attach(sink, 0, p2).unwrap();

        assert_eq!(g.resolved_type(p2), Some(ResolvedType::Integer));
        assert_eq!(g.resolved_type(p1), Some(ResolvedType::Integer));
        assert_eq!(g.resolved_type(x), Some(ResolvedType::Integer));
    }

    #[test]
    fn isolated_wildcards_collapse_to_any() {
        let mut g = Graph::new();
        let x = g.add_node(input()).unwrap();
        let out = g.add_node(passthrough()).unwrap();
        g.attach(out, 0, x).unwrap();
        assert_eq!(g.resolved_type(x), Some(ResolvedType::Any));
        assert_eq!(g.resolved_type(out), Some(ResolvedType::Any));
    }

    #[test]
    fn resolution_is_idempotent_and_order_free() {
        let mut g = Graph::new();
        let x = g.add_node(input()).unwrap();
        let p1 = g.add_node(passthrough()).unwrap();
        let b = g.add_node(boolean_source()).unwrap();
        let p2 = g.add_node(passthrough()).unwrap();
        let sink = g.add_node(integer_sink()).unwrap();
        g.attach(p1, 0, x).unwrap();
        g.attach(sink, 0, p1).unwrap();
        g.attach(p2, 0, b).unwrap();

        let snapshot: Vec<_> = g.node_ids().map(|id| g.resolved_type(id)).collect();
        g.resolve_types();
        let again: Vec<_> = g.node_ids().map(|id| g.resolved_type(id)).collect();
        assert_eq!(snapshot, again);

        let mut reversed: Vec<NodeId> = g.node_ids().collect();
        reversed.reverse();
        g.resolve_in_order(&reversed);
        let backwards: Vec<_> = g.node_ids().map(|id| g.resolved_type(id)).collect();
        assert_eq!(snapshot, backwards);
    }

    #[test]
    fn no_node_stays_dirty() {
        let mut g = Graph::new();
        for _ in 0..4 {
            g.add_node(input()).unwrap();
        }
        assert!(
            g.node_ids()
                .all(|id| g.resolved_type(id).is_some_and(ResolvedType::is_resolved))
        );
    }
}
