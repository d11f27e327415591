//! Node handles and per-node bookkeeping.
//!
//! Nodes live in an arena of `Option<NodeData>` slots addressed by [`NodeId`].
//! Edges are stored on both ends: the consumer keeps one optional producer per
//! input slot, the producer keeps the set of `(consumer, slot)` pairs reading
//! it. Removing a node clears both lists before its slot is vacated.

use core::fmt;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::operator::{NodeConfig, OperatorType};
use crate::plan::ContextId;
use crate::value::{ResolvedType, Value, ValueType};

/// Handle of a node inside one graph.
///
/// Node IDs are assigned sequentially and never reused within a graph instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a graph.
///
/// Promoted templates remember the id of the graph they were taken from, which
/// is how recursive placement is detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(u64);

impl GraphId {
    pub(crate) fn next() -> Self {
        Self(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Structural change reported to the graph's change hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    /// A node was placed.
    NodeAdded(NodeId),
    /// A node and all of its edges were removed.
    NodeRemoved(NodeId),
    /// `producer` now feeds `slot` of `node`.
    Attached {
        /// Consumer.
        node: NodeId,
        /// Consumer slot.
        slot: usize,
        /// Producer.
        producer: NodeId,
    },
    /// `slot` of `node` was emptied.
    Detached {
        /// Consumer.
        node: NodeId,
        /// Consumer slot.
        slot: usize,
    },
}

/// Callback invoked after every successful structural edit.
pub type ChangeHook = Arc<dyn Fn(&GraphEvent) + Send + Sync>;

/// Internal bookkeeping for a node in the graph.
#[derive(Clone, Debug)]
pub(crate) struct NodeData {
    pub operator: Arc<OperatorType>,
    /// Producer per input slot.
    pub inputs: Vec<Option<NodeId>>,
    /// Reverse edges: who reads this node, and through which slot.
    pub consumers: BTreeSet<(NodeId, usize)>,
    /// Scalar per slot used while unattached.
    pub defaults: Vec<Value>,
    pub config: NodeConfig,
    pub resolved: ResolvedType,
    /// Output length per compiled context.
    pub sizes: HashMap<ContextId, usize>,
    /// Orders graph inputs when the graph is promoted.
    pub placement: i32,
}

impl NodeData {
    pub fn new(operator: Arc<OperatorType>) -> Self {
        let arity = operator.arity();
        let defaults = operator.slots.iter().map(|s| s.default).collect();
        let resolved = initial_type(&operator);
        Self {
            operator,
            inputs: vec![None; arity],
            consumers: BTreeSet::new(),
            defaults,
            config: NodeConfig::default(),
            resolved,
            sizes: HashMap::new(),
            placement: 0,
        }
    }

    /// Type of the values this node writes, once resolved.
    pub fn output_type(&self) -> ValueType {
        self.resolved.value_type().unwrap_or(ValueType::Any)
    }

    /// Fallback for a graph-input node with no external vector: the `default`
    /// property read as the node's own type.
    pub fn input_fallback(&self) -> Value {
        Value::from_literal(self.config.number_or("default", 0.0), self.output_type())
    }
}

/// Declared types are resolved immediately; wildcard outputs start dirty.
pub(crate) fn initial_type(operator: &OperatorType) -> ResolvedType {
    match operator.output.fixed() {
        Some(t) => t.into(),
        None => ResolvedType::Dirty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorId;

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId(7).to_string(), "n7");
        assert_eq!(NodeId(7).index(), 7);
    }

    #[test]
    fn graph_ids_are_unique() {
        let a = GraphId::next();
        let b = GraphId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn graph_input_starts_dirty() {
        let node = NodeData::new(Arc::new(OperatorType::graph_input(OperatorId::builtin(2))));
        assert_eq!(node.resolved, ResolvedType::Dirty);
        assert!(node.inputs.is_empty());
        assert_eq!(node.input_fallback(), Value::decimal(0.0));
    }
}
