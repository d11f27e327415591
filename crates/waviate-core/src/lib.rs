//! Waviate Core - typed dataflow graphs compiled for block-based audio
//!
//! This crate holds the engine behind a node-graph audio editor: a catalog of
//! operator types, a mutable graph of operator instances, a type resolver, a
//! compiler that turns one output node into a flat execution plan, and an
//! executor that runs the plan once per audio block.
//!
//! # Core Abstractions
//!
//! ## Values
//!
//! - [`Value`] - 64-bit cell read as decimal, integer, or boolean
//! - [`ValueType`], [`DeclaredType`], [`ResolvedType`] - the type lattice
//!
//! ## Operators
//!
//! - [`OperatorType`] - slots, output type, and body of one operator
//! - [`Catalog`] - operator types keyed by [`OperatorId`]
//! - [`LenQuery`], [`Inputs`], [`RuntimeContext`] - what operator bodies see
//!
//! ## Graph
//!
//! - [`Graph`] - nodes, edges, defaults, and properties (acyclic at all times)
//! - [`GraphDocument`] - flat records for persistence
//!
//! ## Compilation and Execution
//!
//! - [`compile`](compiler::compile) - fold constants, size and lay out the buffer
//! - [`CompiledContext`] - immutable plan shared via `Arc`
//! - [`run`](executor::run) - execute one block against an [`ExecutionState`]
//! - [`publication::channel`] - atomic handoff from editor to audio thread
//!
//! ## Hierarchy
//!
//! - [`promote`] - expose a whole graph as an operator
//!
//! # Example
//!
//! ```rust,ignore
//! use waviate_core::{Graph, Inputs, RuntimeContext, executor, ExecutionState};
//!
//! let mut graph = Graph::new();
//! let out = graph.add_node(add_operator)?;
//! let context = graph.compile(out, &[])?;
//!
//! let mut state = ExecutionState::new(&context);
//! let block = executor::run(&context, &mut state, &mut RuntimeContext::detached(), &Inputs::EMPTY);
//! ```
//!
//! # Design Principles
//!
//! - **Edits are atomic**: refused edits leave the graph untouched
//! - **Plans are immutable**: the audio side never sees a half-built plan
//! - **No allocation per block**: the executor only writes into its buffer

pub mod catalog;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod graph;
pub mod operator;
pub mod plan;
pub mod publication;
pub mod runtime;
pub mod subgraph;
pub mod value;

pub use catalog::Catalog;
pub use error::{CatalogError, CompileError, GraphError, NodeFault, NotCompiled};
pub use executor::ExecutionState;
pub use graph::{ChangeHook, Graph, GraphDocument, GraphEvent, GraphId, NodeId, NodeRecord};
pub use operator::{
    ExecuteFn, NodeConfig, OperatorBody, OperatorId, OperatorType, OutputLenFn, SlotSpec,
};
pub use plan::{CompiledContext, ContextId, Diagnostic, ExecStep, MAX_NODE_LEN, Region};
pub use publication::{Publisher, Renderer};
pub use runtime::{Inputs, LenQuery, RuntimeContext};
pub use subgraph::{SubgraphTemplate, promote};
pub use value::{DeclaredType, ResolvedType, Value, ValueType};
