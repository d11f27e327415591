//! Operator graph: node arena, edge bookkeeping, and type resolution.
//!
//! # Architecture
//!
//! ```text
//! Graph (editor thread)                    Executor (audio thread)
//! ┌──────────────────────────────┐         ┌──────────────────────────┐
//! │ add_node / attach / detach   │         │                          │
//! │ resolve_types (every edit)   │         │ run(context, state, ...) │
//! │ compile() ───────────────────┼─ Arc ──>│ flat field, step list    │
//! └──────────────────────────────┘         └──────────────────────────┘
//! ```
//!
//! - [`Graph`]: arena of nodes addressed by [`NodeId`], forward and reverse
//!   edges, per-node defaults and properties, per-context size cache
//! - [`GraphEvent`]: structural change notification for editors
//! - [`GraphDocument`]: flat records for persistence

mod document;
mod model;
mod node;
mod resolve;

pub use document::{GraphDocument, NodeRecord};
pub use model::Graph;
pub use node::{ChangeHook, GraphEvent, GraphId, NodeId};
