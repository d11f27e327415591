//! Operator descriptors.
//!
//! An [`OperatorType`] describes one kind of node: its input slots, declared
//! output type, and its body. Bodies are an explicit sum type:
//!
//! - [`OperatorBody::Builtin`]: a pair of plain function pointers, one that
//!   computes the output length and one that fills the output region.
//! - [`OperatorBody::GraphInput`]: reads an externally supplied vector. The
//!   engine implements it directly.
//! - [`OperatorBody::Subgraph`]: a whole graph promoted to an operator. The
//!   engine compiles and runs the nested graph.
//!
//! Descriptors are immutable once built and shared behind `Arc` by the
//! catalog, every node that uses them, and every compiled context.

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::NodeFault;
use crate::runtime::{Inputs, LenQuery, RuntimeContext};
use crate::subgraph::SubgraphTemplate;
use crate::value::{DeclaredType, Value, ValueType};

/// Stable identity of an operator: owning scope plus a local number.
///
/// Built-in operators use owner `0`. Promoted sub-graphs use the owner of
/// whoever promoted them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperatorId {
    /// Owning scope.
    pub owner: u64,
    /// Number within the owning scope.
    pub local: u32,
}

impl OperatorId {
    /// Creates an id in the given scope.
    pub const fn new(owner: u64, local: u32) -> Self {
        Self { owner, local }
    }

    /// Creates a built-in id (owner 0).
    pub const fn builtin(local: u32) -> Self {
        Self { owner: 0, local }
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.local)
    }
}

/// Describes one input slot of an operator.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotSpec {
    /// Display name.
    pub name: String,
    /// Interpretation the operator expects.
    pub value_type: ValueType,
    /// Required vector length, or 0 for any length.
    pub required_len: usize,
    /// Whether the value must be known at compile time.
    pub compile_time: bool,
    /// Scalar used while the slot is unattached.
    pub default: Value,
}

impl SlotSpec {
    /// Creates a slot of any length with a zero default.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required_len: 0,
            compile_time: false,
            default: Value::ZERO,
        }
    }

    /// Requires the producer to have exactly `len` elements.
    #[must_use]
    pub fn with_len(mut self, len: usize) -> Self {
        self.required_len = len;
        self
    }

    /// Marks the slot as requiring a compile-time value.
    #[must_use]
    pub fn compile_time(mut self) -> Self {
        self.compile_time = true;
        self
    }

    /// Sets the default scalar.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }
}

/// Per-node configuration: free-form text and numeric properties.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeConfig {
    /// Numeric properties (`op_mode`, `value`, ...).
    #[cfg_attr(feature = "serde", serde(default))]
    pub numbers: BTreeMap<String, f64>,
    /// Text properties (`name`, `values`, ...).
    #[cfg_attr(feature = "serde", serde(default))]
    pub text: BTreeMap<String, String>,
}

impl NodeConfig {
    /// Returns a numeric property.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.numbers.get(key).copied()
    }

    /// Returns a numeric property or `default` when absent.
    pub fn number_or(&self, key: &str, default: f64) -> f64 {
        self.number(key).unwrap_or(default)
    }

    /// Returns a text property.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.text.get(key).map(String::as_str)
    }

    /// True if no property is set.
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty() && self.text.is_empty()
    }
}

/// Computes a node's output length from its configuration and inputs.
///
/// The query carries the speculative input values computed so far, so length
/// functions may depend on compile-time scalars such as a repeat count.
pub type OutputLenFn = fn(&LenQuery<'_>) -> Result<usize, NodeFault>;

/// Fills a node's output region.
///
/// Must be safe to call during compilation with a detached runtime context:
/// the compiler runs every body once ahead of time to fold constants.
pub type ExecuteFn = fn(&NodeConfig, &mut RuntimeContext<'_>, &Inputs<'_>, &mut [Value]);

/// What a node of this operator actually does.
#[derive(Clone, Debug)]
pub enum OperatorBody {
    /// Function-pointer body registered by an operator library.
    Builtin {
        /// Output length.
        output_len: OutputLenFn,
        /// Output values.
        execute: ExecuteFn,
    },
    /// External input of the graph, selected by placement order.
    GraphInput,
    /// A promoted graph.
    Subgraph(Arc<SubgraphTemplate>),
}

/// Immutable descriptor of one operator kind.
#[derive(Clone, Debug)]
pub struct OperatorType {
    /// Stable identity.
    pub id: OperatorId,
    /// Display name.
    pub name: String,
    /// Grouping used by listings.
    pub category: &'static str,
    /// Input slots in order.
    pub slots: Vec<SlotSpec>,
    /// Declared output type.
    pub output: DeclaredType,
    /// Slot whose producer a `FollowsInput` output tracks first.
    pub follow_slot: Option<usize>,
    /// Output can never be folded at compile time.
    pub always_runtime: bool,
    /// Behaviour.
    pub body: OperatorBody,
}

impl OperatorType {
    /// Starts a function-pointer operator with no slots and a decimal output.
    pub fn builtin(
        id: OperatorId,
        name: impl Into<String>,
        output_len: OutputLenFn,
        execute: ExecuteFn,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            category: "misc",
            slots: Vec::new(),
            output: DeclaredType::DECIMAL,
            follow_slot: None,
            always_runtime: false,
            body: OperatorBody::Builtin {
                output_len,
                execute,
            },
        }
    }

    /// The graph-input operator. Its type follows whatever consumes it.
    pub fn graph_input(id: OperatorId) -> Self {
        Self {
            id,
            name: "input".to_owned(),
            category: "io",
            slots: Vec::new(),
            output: DeclaredType::FollowsInput,
            follow_slot: None,
            always_runtime: false,
            body: OperatorBody::GraphInput,
        }
    }

    /// Sets the listing category.
    #[must_use]
    pub fn category(mut self, category: &'static str) -> Self {
        self.category = category;
        self
    }

    /// Appends an input slot.
    #[must_use]
    pub fn slot(mut self, slot: SlotSpec) -> Self {
        self.slots.push(slot);
        self
    }

    /// Sets the declared output type.
    #[must_use]
    pub fn output(mut self, output: DeclaredType) -> Self {
        self.output = output;
        self
    }

    /// Declares a `FollowsInput` output tracking `slot`.
    #[must_use]
    pub fn follows(mut self, slot: usize) -> Self {
        self.output = DeclaredType::FollowsInput;
        self.follow_slot = Some(slot);
        self
    }

    /// Marks the output as never foldable.
    #[must_use]
    pub fn runtime_only(mut self) -> Self {
        self.always_runtime = true;
        self
    }

    /// Number of input slots.
    pub fn arity(&self) -> usize {
        self.slots.len()
    }

    /// True for the graph-input operator.
    pub fn is_graph_input(&self) -> bool {
        matches!(self.body, OperatorBody::GraphInput)
    }

    /// The nested template of a promoted operator.
    pub fn subgraph(&self) -> Option<&Arc<SubgraphTemplate>> {
        match &self.body {
            OperatorBody::Subgraph(template) => Some(template),
            _ => None,
        }
    }
}
