//! The editable operator graph.
//!
//! [`Graph`] owns the node arena and both edge directions. Every structural
//! edit validates first and mutates second, so a refused edit leaves the graph
//! exactly as it was. After each successful edit the type resolver is re-run
//! and the change hook (if any) is notified.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::compiler;
use crate::error::{CompileError, GraphError, NotCompiled};
use crate::operator::{NodeConfig, OperatorType};
use crate::plan::{CompiledContext, ContextId};
use crate::runtime::Inputs;
use crate::subgraph;
use crate::value::{ResolvedType, Value};

use super::node::{ChangeHook, GraphEvent, GraphId, NodeData, NodeId};
use super::resolve;

/// Directed acyclic graph of operator nodes.
///
/// # Usage
///
/// 1. Create a graph with [`new()`](Self::new)
/// 2. Place nodes with [`add_node()`](Self::add_node)
/// 3. Wire them with [`attach()`](Self::attach)
/// 4. Compile from an output node with [`compile()`](Self::compile), then run
///    the returned context with [`executor::run`](crate::executor::run) or
///    hand it to a [`Publisher`](crate::publication::Publisher)
///
/// A clone is a separate graph with its own [`GraphId`]: a promoted clone
/// can be placed in the original.
pub struct Graph {
    id: GraphId,
    pub(crate) nodes: Vec<Option<NodeData>>,
    pub(crate) node_count: usize,
    compiled: Option<ContextId>,
    hook: Option<ChangeHook>,
}

impl Clone for Graph {
    fn clone(&self) -> Self {
        Self {
            id: GraphId::next(),
            nodes: self.nodes.clone(),
            node_count: self.node_count,
            compiled: self.compiled,
            hook: self.hook.clone(),
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Graph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("nodes", &self.node_count)
            .field("compiled", &self.compiled)
            .finish_non_exhaustive()
    }
}

impl Graph {
    /// Creates an empty graph with a fresh [`GraphId`].
    pub fn new() -> Self {
        Self {
            id: GraphId::next(),
            nodes: Vec::new(),
            node_count: 0,
            compiled: None,
            hook: None,
        }
    }

    /// This graph's identity.
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.node_count
    }

    /// True if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.node_count == 0
    }

    /// True if `node` is live.
    pub fn contains(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    /// Live node handles in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| NodeId(i as u32))
    }

    /// Every edge as `(producer, consumer, slot)`.
    pub fn edges(&self) -> Vec<(NodeId, NodeId, usize)> {
        let mut edges = Vec::new();
        for consumer in self.node_ids() {
            if let Some(data) = self.node(consumer) {
                for (slot, producer) in data.inputs.iter().enumerate() {
                    if let Some(producer) = producer {
                        edges.push((*producer, consumer, slot));
                    }
                }
            }
        }
        edges
    }

    /// Copy without the change hook, under a fresh id. Used for promotion
    /// snapshots.
    pub fn snapshot(&self) -> Self {
        Self {
            hook: None,
            ..self.clone()
        }
    }

    // --- Change notification ---

    /// Installs a callback fired after every successful structural edit.
    pub fn set_change_hook(&mut self, hook: impl Fn(&GraphEvent) + Send + Sync + 'static) {
        self.hook = Some(Arc::new(hook));
    }

    /// Removes the change callback.
    pub fn clear_change_hook(&mut self) {
        self.hook = None;
    }

    fn emit(&self, event: GraphEvent) {
        if let Some(hook) = &self.hook {
            hook(&event);
        }
    }

    // --- Node access ---

    pub(crate) fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.slot())?.as_ref()
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.slot())?.as_mut()
    }

    fn get(&self, id: NodeId) -> Result<&NodeData, GraphError> {
        self.node(id).ok_or(GraphError::NodeNotFound(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeData, GraphError> {
        self.node_mut(id).ok_or(GraphError::NodeNotFound(id))
    }

    /// The operator of `node`.
    pub fn operator(&self, node: NodeId) -> Option<&Arc<OperatorType>> {
        self.node(node).map(|n| &n.operator)
    }

    /// Producer feeding `slot` of `node`.
    pub fn input(&self, node: NodeId, slot: usize) -> Option<NodeId> {
        self.node(node)?.inputs.get(slot).copied().flatten()
    }

    /// `(consumer, slot)` pairs reading `node`, in ascending order.
    pub fn consumers(&self, node: NodeId) -> Vec<(NodeId, usize)> {
        self.node(node)
            .map(|n| n.consumers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Resolved output type of `node`.
    pub fn resolved_type(&self, node: NodeId) -> Option<ResolvedType> {
        self.node(node).map(|n| n.resolved)
    }

    /// Default scalar of an input slot.
    pub fn default_value(&self, node: NodeId, slot: usize) -> Option<Value> {
        self.node(node)?.defaults.get(slot).copied()
    }

    /// Properties of `node`.
    pub fn config(&self, node: NodeId) -> Option<&NodeConfig> {
        self.node(node).map(|n| &n.config)
    }

    /// Placement key of `node`.
    pub fn placement(&self, node: NodeId) -> Option<i32> {
        self.node(node).map(|n| n.placement)
    }

    /// Graph-input nodes ordered by placement, ties broken by id.
    ///
    /// Position in this list is the index of the external vector a graph-input
    /// node reads, and the slot index it becomes when the graph is promoted.
    pub fn input_nodes(&self) -> Vec<NodeId> {
        let mut inputs: Vec<(i32, NodeId)> = self
            .node_ids()
            .filter_map(|id| {
                let n = self.node(id)?;
                n.operator.is_graph_input().then_some((n.placement, id))
            })
            .collect();
        inputs.sort_unstable();
        inputs.into_iter().map(|(_, id)| id).collect()
    }

    // --- Node configuration ---

    /// Overrides the scalar used while `slot` is unattached.
    pub fn set_default(&mut self, node: NodeId, slot: usize, value: Value) -> Result<(), GraphError> {
        let data = self.get_mut(node)?;
        let arity = data.defaults.len();
        let cell = data
            .defaults
            .get_mut(slot)
            .ok_or(GraphError::SlotOutOfRange { node, slot, arity })?;
        *cell = value;
        Ok(())
    }

    /// Sets a numeric property.
    pub fn set_number(&mut self, node: NodeId, key: &str, value: f64) -> Result<(), GraphError> {
        self.get_mut(node)?.config.numbers.insert(key.to_owned(), value);
        Ok(())
    }

    /// Sets a text property.
    pub fn set_text(
        &mut self,
        node: NodeId,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), GraphError> {
        self.get_mut(node)?.config.text.insert(key.to_owned(), value.into());
        Ok(())
    }

    /// Replaces all properties of `node`.
    pub fn set_config(&mut self, node: NodeId, config: NodeConfig) -> Result<(), GraphError> {
        self.get_mut(node)?.config = config;
        Ok(())
    }

    /// Sets the key that orders graph inputs.
    pub fn set_placement(&mut self, node: NodeId, placement: i32) -> Result<(), GraphError> {
        self.get_mut(node)?.placement = placement;
        Ok(())
    }

    // --- Structural edits ---

    /// Places a node of `operator` and returns its handle.
    ///
    /// Refused with [`GraphError::RecursivePlacement`] if `operator` is a
    /// promoted graph that contains this graph at any depth.
    pub fn add_node(&mut self, operator: Arc<OperatorType>) -> Result<NodeId, GraphError> {
        if subgraph::contains_graph(&operator, self.id) {
            #[cfg(feature = "tracing")]
            tracing::debug!("graph_add_node refused: {} contains {}", operator.id, self.id);
            return Err(GraphError::RecursivePlacement(operator.id));
        }

        let id = NodeId(self.nodes.len() as u32);
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_add_node: {id} = {} ({})", operator.name, operator.id);
        self.nodes.push(Some(NodeData::new(operator)));
        self.node_count += 1;
        self.resolve_types();
        self.emit(GraphEvent::NodeAdded(id));
        Ok(id)
    }

    /// Removes a node after severing every edge into and out of it.
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), GraphError> {
        let data = self.get(node)?;
        let producers: Vec<(usize, NodeId)> = data
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(slot, p)| p.map(|p| (slot, p)))
            .collect();
        let consumers: Vec<(NodeId, usize)> = data.consumers.iter().copied().collect();

        for (slot, producer) in producers {
            if let Some(p) = self.node_mut(producer) {
                p.consumers.remove(&(node, slot));
            }
        }
        for (consumer, slot) in consumers {
            if let Some(c) = self.node_mut(consumer)
                && let Some(input) = c.inputs.get_mut(slot)
            {
                *input = None;
            }
        }

        self.nodes[node.slot()] = None;
        self.node_count -= 1;
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_remove_node: {node}");
        self.resolve_types();
        self.emit(GraphEvent::NodeRemoved(node));
        Ok(())
    }

    /// Feeds `slot` of `node` from `producer`.
    ///
    /// Checks, in order: both nodes exist, the slot is in range, the edge
    /// would not close a cycle, a compile-time slot gets a compile-time
    /// producer (or a graph input), and a fixed-length slot gets a producer of
    /// that length. Nothing is mutated unless every check passes. An occupied
    /// slot is rewired.
    pub fn attach(&mut self, node: NodeId, slot: usize, producer: NodeId) -> Result<(), GraphError> {
        let data = self.get(node)?;
        let producer_data = self.get(producer)?;
        let arity = data.operator.arity();
        let Some(spec) = data.operator.slots.get(slot) else {
            return Err(GraphError::SlotOutOfRange { node, slot, arity });
        };

        if producer == node || self.reaches_upstream(producer, node) {
            #[cfg(feature = "tracing")]
            tracing::debug!("graph_attach refused: {producer} → {node}[{slot}] closes a cycle");
            return Err(GraphError::CycleDetected { node, producer });
        }

        let needs_compile_time = spec.compile_time || self.needs_compile_time_inputs(node);
        if needs_compile_time
            && !producer_data.operator.is_graph_input()
            && !self.is_compile_time_known(producer)
        {
            #[cfg(feature = "tracing")]
            tracing::debug!("graph_attach refused: {producer} is runtime-only, {node}[{slot}] needs a constant");
            return Err(GraphError::CompileTimeRequired {
                node,
                slot,
                producer,
            });
        }

        let expected = spec.required_len;
        if expected > 0 {
            let found = self.probe_len(producer)?;
            if found != expected {
                return Err(GraphError::LengthMismatch {
                    node,
                    slot,
                    producer,
                    expected,
                    found,
                });
            }
        }

        let previous = self.get_mut(node)?.inputs[slot].replace(producer);
        if let Some(old) = previous
            && let Some(old) = self.node_mut(old)
        {
            old.consumers.remove(&(node, slot));
        }
        self.get_mut(producer)?.consumers.insert((node, slot));

        #[cfg(feature = "tracing")]
        tracing::debug!("graph_attach: {producer} → {node}[{slot}]");
        self.resolve_types();
        self.emit(GraphEvent::Attached {
            node,
            slot,
            producer,
        });
        Ok(())
    }

    /// Empties `slot` of `node`. Does nothing if it is already empty.
    pub fn detach(&mut self, node: NodeId, slot: usize) -> Result<(), GraphError> {
        let data = self.get_mut(node)?;
        let arity = data.inputs.len();
        let input = data
            .inputs
            .get_mut(slot)
            .ok_or(GraphError::SlotOutOfRange { node, slot, arity })?;
        let Some(producer) = input.take() else {
            return Ok(());
        };
        if let Some(p) = self.node_mut(producer) {
            p.consumers.remove(&(node, slot));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("graph_detach: {producer} ↛ {node}[{slot}]");
        self.resolve_types();
        self.emit(GraphEvent::Detached { node, slot });
        Ok(())
    }

    // --- Queries ---

    /// Whether `to` is an ancestor of `from` (reachable through input edges).
    fn reaches_upstream(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            let idx = current.slot();
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;

            if let Some(node) = self.node(current) {
                stack.extend(node.inputs.iter().flatten().copied());
            }
        }
        false
    }

    /// `root` and all its ancestors, producers before consumers.
    pub(crate) fn upstream_order(&self, root: NodeId) -> Vec<NodeId> {
        let mut members: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if !members.insert(current) {
                continue;
            }
            if let Some(node) = self.node(current) {
                stack.extend(node.inputs.iter().flatten().copied());
            }
        }

        // Kahn over the member set; in-degree counts attached slots.
        let mut in_degree: HashMap<NodeId, usize> = members
            .iter()
            .map(|&id| {
                let degree = self.node(id).map_or(0, |n| n.inputs.iter().flatten().count());
                (id, degree)
            })
            .collect();
        let mut ready: Vec<NodeId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        ready.sort_unstable_by(|a, b| b.cmp(a));

        let mut sorted = Vec::with_capacity(members.len());
        while let Some(id) = ready.pop() {
            sorted.push(id);
            let Some(node) = self.node(id) else { continue };
            for &(consumer, _) in &node.consumers {
                if let Some(d) = in_degree.get_mut(&consumer) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(consumer);
                    }
                }
            }
        }
        sorted
    }

    /// Compile-time knowledge for each node of a producers-first order that is
    /// closed under inputs.
    pub(crate) fn fold_flags(&self, order: &[NodeId]) -> Vec<bool> {
        let mut known: HashMap<NodeId, bool> = HashMap::with_capacity(order.len());
        order
            .iter()
            .map(|&id| {
                let flag = self.node(id).is_some_and(|data| {
                    if data.operator.always_runtime {
                        false
                    } else if data.operator.is_graph_input() {
                        self.needs_compile_time_inputs(id)
                    } else {
                        data.inputs
                            .iter()
                            .flatten()
                            .all(|p| known.get(p).copied().unwrap_or(false))
                    }
                });
                known.insert(id, flag);
                flag
            })
            .collect()
    }

    /// Whether `node`'s output can be computed once at compile time.
    ///
    /// False for runtime-only operators. A graph input is compile-time-known
    /// exactly when something downstream needs it to be (it will be bound to a
    /// constant when the enclosing graph is compiled). Any other node is
    /// compile-time-known when every connected input is.
    pub fn is_compile_time_known(&self, node: NodeId) -> bool {
        if !self.contains(node) {
            return false;
        }
        let order = self.upstream_order(node);
        let flags = self.fold_flags(&order);
        order
            .iter()
            .position(|&id| id == node)
            .is_some_and(|i| flags[i])
    }

    /// Whether some consumer slot downstream of `node` demands a compile-time
    /// value.
    pub fn needs_compile_time_inputs(&self, node: NodeId) -> bool {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![node];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(data) = self.node(current) else {
                continue;
            };
            for &(consumer, slot) in &data.consumers {
                let demands = self
                    .node(consumer)
                    .and_then(|c| c.operator.slots.get(slot))
                    .is_some_and(|s| s.compile_time);
                if demands {
                    return true;
                }
                stack.push(consumer);
            }
        }
        false
    }

    pub(super) fn probe_len(&self, producer: NodeId) -> Result<usize, GraphError> {
        compiler::compile(self, producer, &Inputs::EMPTY)
            .map(|context| context.output_len())
            .map_err(|source| GraphError::ProbeFailed {
                producer,
                source: Box::new(source),
            })
    }

    // --- Types and compilation ---

    /// Re-runs wildcard type resolution over every node.
    pub fn resolve_types(&mut self) {
        let order: Vec<NodeId> = self.node_ids().collect();
        self.resolve_in_order(&order);
    }

    /// Re-runs resolution scanning nodes in `order`. The result does not
    /// depend on the order.
    pub fn resolve_in_order(&mut self, order: &[NodeId]) {
        let resolved = resolve::resolve(self, order);
        for (id, ty) in resolved {
            if let Some(node) = self.node_mut(id) {
                node.resolved = ty;
            }
        }
    }

    /// Compiles everything upstream of `output` against `externals` and
    /// records each node's output length for the new context.
    ///
    /// Lengths recorded for the previously compiled context are forgotten.
    pub fn compile(
        &mut self,
        output: NodeId,
        externals: &[Vec<Value>],
    ) -> Result<Arc<CompiledContext>, CompileError> {
        let context = compiler::compile(self, output, &Inputs::owned(externals))?;
        if let Some(previous) = self.compiled.replace(context.id()) {
            for node in self.nodes.iter_mut().flatten() {
                node.sizes.remove(&previous);
            }
        }
        for (id, len) in context.node_lengths() {
            if let Some(node) = self.node_mut(id) {
                node.sizes.insert(context.id(), len);
            }
        }
        Ok(Arc::new(context))
    }

    /// The context most recently produced by [`compile()`](Self::compile).
    pub fn compiled_context(&self) -> Option<ContextId> {
        self.compiled
    }

    /// Output length of `node` in a context this graph compiled.
    pub fn output_len(&self, node: NodeId, context: ContextId) -> Result<usize, NotCompiled> {
        self.node(node)
            .and_then(|n| n.sizes.get(&context).copied())
            .ok_or(NotCompiled { node, context })
    }
}
