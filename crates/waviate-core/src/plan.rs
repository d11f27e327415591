//! Compiled context types.
//!
//! A [`CompiledContext`] is the immutable result of one compile pass. It owns a
//! deep copy of the compiled nodes, the flat buffer layout, and a list of
//! [`ExecStep`] instructions that the executor runs in order once per block.
//!
//! # Buffer layout
//!
//! ```text
//! ┌─────────────── static prefix ───────────────┬──────── per step, in order ────────┐
//! │ folded values │ slot defaults │ folded+coerce │ coerce │ out │ coerce │ out │ ... │
//! └───────────────────────────────────────────────┴─────────────────────────────────────┘
//! ```
//!
//! Every region belongs to exactly one node or coercion and no two regions
//! overlap. A step only reads regions that start before its output region,
//! which is what lets the executor split the buffer at the output offset.

use core::fmt;
use core::ops::Range;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::NodeFault;
use crate::graph::NodeId;
use crate::operator::{NodeConfig, OperatorType};
use crate::value::{DeclaredType, Value, ValueType};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Longest output a single node may produce, in cells.
///
/// Length functions that derive a size from a compile-time value must fault
/// above this; the compiler faults any other node that reports more.
pub const MAX_NODE_LEN: usize = 1 << 22;

/// Process-unique identity of one compile pass.
///
/// Size caches on graph nodes are keyed by this id, never by address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// A contiguous slice of the execution buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Region {
    /// First cell.
    pub offset: usize,
    /// Number of cells.
    pub len: usize,
}

impl Region {
    /// The zero-length region at offset 0.
    pub const EMPTY: Self = Self { offset: 0, len: 0 };

    /// Creates a region.
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// One past the last cell.
    pub const fn end(self) -> usize {
        self.offset + self.len
    }

    /// Index range into the buffer.
    pub fn range(self) -> Range<usize> {
        self.offset..self.end()
    }

    /// True if both regions are non-empty and share a cell.
    pub fn overlaps(self, other: Region) -> bool {
        self.len > 0 && other.len > 0 && self.offset < other.end() && other.offset < self.end()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.offset, self.end())
    }
}

/// One instruction of a compiled context.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecStep {
    /// Copy an external vector into a graph-input node's region.
    ReadExternal {
        /// Index into the context's node list.
        node: usize,
        /// External vector index, from placement order.
        index: Option<usize>,
        /// Fills cells the external vector does not supply.
        fallback: Value,
        /// Destination.
        output: Region,
    },

    /// Reinterpret a producer's values for a consumer expecting another type.
    Coerce {
        /// Producer region.
        source: Region,
        /// Scratch region read by the consumer.
        dest: Region,
        /// Producer type.
        from: ValueType,
        /// Consumer slot type.
        to: ValueType,
    },

    /// Run an operator body.
    Evaluate {
        /// Index into the context's node list.
        node: usize,
        /// Range into the context's input region table, one per slot.
        inputs: Range<usize>,
        /// Destination.
        output: Region,
    },
}

/// A node copied into a compiled context.
#[derive(Debug, Clone)]
pub(crate) struct CompiledNode {
    pub source: NodeId,
    pub operator: Arc<OperatorType>,
    pub config: NodeConfig,
    /// Producer per slot as an index into the context's node list.
    pub inputs: Vec<Option<usize>>,
    pub defaults: Vec<Value>,
    pub output_type: ValueType,
    pub input_index: Option<usize>,
    pub fallback: Value,
    pub region: Region,
    pub folded: bool,
    pub fault: Option<NodeFault>,
    /// Nested context of a promoted graph.
    pub inner: Option<Arc<CompiledContext>>,
}

impl CompiledNode {
    /// Interpretation the node reads slot `slot` in.
    ///
    /// Wildcard slots of a `FollowsInput` operator read in the node's
    /// resolved type, so every leg reaches the operator already converted.
    pub fn reader_type(&self, slot: usize) -> ValueType {
        let declared = self
            .operator
            .slots
            .get(slot)
            .map_or(ValueType::Any, |spec| spec.value_type);
        if declared == ValueType::Any && self.operator.output == DeclaredType::FollowsInput {
            self.output_type
        } else {
            declared
        }
    }
}

/// A configuration fault recorded while compiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Faulted node.
    pub node: NodeId,
    /// What went wrong.
    pub fault: NodeFault,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, self.fault)
    }
}

/// Immutable result of one compile pass.
///
/// Shared with the executor via `Arc`. Never mutated after creation; the
/// per-block buffer lives in an [`ExecutionState`](crate::executor::ExecutionState)
/// built from [`initial_field`](Self::initial_field).
#[derive(Debug)]
pub struct CompiledContext {
    pub(crate) id: ContextId,
    pub(crate) nodes: Vec<CompiledNode>,
    pub(crate) index: HashMap<NodeId, usize>,
    pub(crate) steps: Vec<ExecStep>,
    pub(crate) input_regions: Vec<Region>,
    pub(crate) initial_field: Vec<Value>,
    pub(crate) output_node: usize,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl CompiledContext {
    /// Identity of this compile pass.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Output region of the designated output node.
    pub fn output_region(&self) -> Region {
        self.nodes
            .get(self.output_node)
            .map_or(Region::EMPTY, |n| n.region)
    }

    /// Length of the output vector.
    pub fn output_len(&self) -> usize {
        self.output_region().len
    }

    /// Resolved type of the output vector.
    pub fn output_type(&self) -> ValueType {
        self.nodes
            .get(self.output_node)
            .map_or(ValueType::Any, |n| n.output_type)
    }

    /// Total buffer size in cells.
    pub fn field_len(&self) -> usize {
        self.initial_field.len()
    }

    /// Buffer contents before the first block: folded values and defaults in
    /// the static prefix, zeros elsewhere.
    pub fn initial_field(&self) -> &[Value] {
        &self.initial_field
    }

    /// Number of compiled nodes (folded, runtime, and faulted).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Instructions in execution order.
    pub fn steps(&self) -> &[ExecStep] {
        &self.steps
    }

    /// Configuration faults, one per faulted node.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Region of every compiled node.
    pub fn regions(&self) -> impl Iterator<Item = (NodeId, Region)> + '_ {
        self.nodes.iter().map(|n| (n.source, n.region))
    }

    /// Output length of every compiled node.
    pub fn node_lengths(&self) -> impl Iterator<Item = (NodeId, usize)> + '_ {
        self.nodes.iter().map(|n| (n.source, n.region.len))
    }

    /// Region of `node`, if it was compiled.
    pub fn region(&self, node: NodeId) -> Option<Region> {
        self.index.get(&node).map(|&i| self.nodes[i].region)
    }

    /// Whether `node` was evaluated once at compile time.
    pub fn is_folded(&self, node: NodeId) -> bool {
        self.index.get(&node).is_some_and(|&i| self.nodes[i].folded)
    }

    /// Value of a folded node, available without running a single block.
    pub fn folded_value(&self, node: NodeId) -> Option<&[Value]> {
        let n = &self.nodes[*self.index.get(&node)?];
        n.folded.then(|| &self.initial_field[n.region.range()])
    }

    /// The fault recorded for `node`.
    pub fn fault(&self, node: NodeId) -> Option<&NodeFault> {
        self.nodes[*self.index.get(&node)?].fault.as_ref()
    }

    /// Nodes that run every block, in execution order.
    pub fn execution_order(&self) -> Vec<NodeId> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                ExecStep::ReadExternal { node, .. } | ExecStep::Evaluate { node, .. } => {
                    Some(self.nodes[*node].source)
                }
                ExecStep::Coerce { .. } => None,
            })
            .collect()
    }

    /// Human-readable step listing.
    pub fn describe(&self) -> Vec<String> {
        self.steps.iter().map(|step| self.format_step(step)).collect()
    }

    fn format_step(&self, step: &ExecStep) -> String {
        match step {
            ExecStep::ReadExternal {
                node,
                index,
                output,
                ..
            } => {
                let source = index.map_or_else(|| "-".to_owned(), |i| i.to_string());
                format!("ReadExternal {} ext[{source}] → {output}", self.nodes[*node].source)
            }
            ExecStep::Coerce {
                source,
                dest,
                from,
                to,
            } => format!("Coerce {source} {from} → {dest} {to}"),
            ExecStep::Evaluate {
                node,
                inputs,
                output,
            } => {
                let n = &self.nodes[*node];
                let reads: Vec<String> = self.input_regions[inputs.clone()]
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                format!(
                    "Evaluate {} {} ({}) → {output}",
                    n.source,
                    n.operator.name,
                    reads.join(", ")
                )
            }
        }
    }
}
