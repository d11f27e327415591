//! Error types for graph editing, compilation, and the operator catalog.
//!
//! Structural errors ([`GraphError`], [`CompileError`]) are returned by the
//! operation that detected them and never leave the graph half-modified.
//! Configuration problems inside a single node are [`NodeFault`]s: they are
//! recorded as per-node diagnostics on the compiled context instead of
//! aborting the compile.

use thiserror::Error;

use crate::graph::NodeId;
use crate::operator::OperatorId;
use crate::plan::ContextId;

/// A refused edit or an invalid graph structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The node handle does not refer to a live node.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// The slot index is past the operator's arity.
    #[error("slot {slot} out of range for node {node} ({arity} slots)")]
    SlotOutOfRange {
        /// Consumer node.
        node: NodeId,
        /// Requested slot.
        slot: usize,
        /// Number of slots the operator declares.
        arity: usize,
    },

    /// The edge would close a loop.
    #[error("connecting {producer} into {node} would create a cycle")]
    CycleDetected {
        /// Consumer node.
        node: NodeId,
        /// Producer node.
        producer: NodeId,
    },

    /// The slot needs a compile-time value and the producer is runtime-only.
    #[error("slot {slot} of node {node} needs a compile-time value, {producer} is runtime-only")]
    CompileTimeRequired {
        /// Consumer node.
        node: NodeId,
        /// Consumer slot.
        slot: usize,
        /// Producer node.
        producer: NodeId,
    },

    /// The slot declares a fixed length that the producer does not have.
    #[error("slot {slot} of node {node} expects length {expected}, {producer} has length {found}")]
    LengthMismatch {
        /// Consumer node.
        node: NodeId,
        /// Consumer slot.
        slot: usize,
        /// Producer node.
        producer: NodeId,
        /// Declared slot length.
        expected: usize,
        /// Measured producer length.
        found: usize,
    },

    /// The producer's length could not be measured.
    #[error("could not measure {producer}: {source}")]
    ProbeFailed {
        /// Producer node.
        producer: NodeId,
        /// Why the probe compile failed.
        #[source]
        source: Box<CompileError>,
    },

    /// The promoted operator transitively contains this graph.
    #[error("operator {0} contains this graph and cannot be placed in it")]
    RecursivePlacement(OperatorId),

    /// A persisted record names an operator the catalog does not know.
    #[error("unknown operator {0}")]
    UnknownOperator(OperatorId),

    /// A persisted record is malformed.
    #[error("invalid record {index}: {reason}")]
    InvalidRecord {
        /// Position of the record in the document.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },
}

/// A size was queried for a context the node was never compiled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("node {node} has no compiled size for context {context}")]
pub struct NotCompiled {
    /// The queried node.
    pub node: NodeId,
    /// The queried context.
    pub context: ContextId,
}

/// A configuration problem local to one node.
///
/// Faulted nodes compile to a zero-length region and are skipped at
/// execution; nodes downstream of them fault with [`NodeFault::Upstream`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeFault {
    /// Fewer data legs are connected than the operator needs.
    #[error("needs at least {required} connected inputs, found {connected}")]
    MissingLegs {
        /// Minimum number of connected legs.
        required: usize,
        /// Legs actually connected.
        connected: usize,
    },

    /// A property or input value is out of the operator's domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A producer of this node is itself faulted.
    #[error("upstream node {0} is faulted")]
    Upstream(NodeId),

    /// The nested graph of a promoted operator failed to compile.
    #[error("sub-graph failed to compile: {0}")]
    Subgraph(String),
}

/// A structural error that stops a compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The designated output node does not exist.
    #[error("output node {0} not found")]
    NodeNotFound(NodeId),

    /// A fixed-length slot is fed a vector of a different length.
    #[error("slot {slot} of node {node} expects length {expected}, got {found}")]
    LengthMismatch {
        /// Consumer node.
        node: NodeId,
        /// Consumer slot.
        slot: usize,
        /// Declared slot length.
        expected: usize,
        /// Actual producer length.
        found: usize,
    },

    /// The execution buffer could not be allocated.
    #[error("cannot allocate an execution buffer of {cells} cells")]
    FieldTooLarge {
        /// Cells requested when allocation failed.
        cells: usize,
    },
}

/// Errors from operator registration and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// An operator with this id is already registered.
    #[error("operator {0} is already registered")]
    Duplicate(OperatorId),

    /// No operator is registered under this id.
    #[error("unknown operator {0}")]
    Unknown(OperatorId),
}
