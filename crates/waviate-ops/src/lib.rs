//! Built-in operators for waviate graphs.
//!
//! This crate registers the operator bodies the engine hosts: graph input and
//! output, constants, arithmetic with broadcast modes, a few elementwise
//! functions, vector construction, comparison and selection, and the
//! host-backed operators that read the running block (sample position, sample
//! rate, noise, held notes).
//!
//! # Features
//!
//! - **Catalog**: [`builtin_catalog`] returns a [`Catalog`] with every operator
//! - **Category System**: operators are grouped by [`OperatorCategory`]
//! - **Host State**: [`BlockContext`] is the per-stream state host-backed
//!   operators read through the runtime context
//!
//! # Example
//!
//! ```rust
//! use waviate_core::{Graph, Value};
//! use waviate_ops::{builtin_catalog, id};
//!
//! let catalog = builtin_catalog();
//! let mut graph = Graph::new();
//! let a = graph.add_node(catalog.lookup(id::CONSTANT).unwrap().clone()).unwrap();
//! let b = graph.add_node(catalog.lookup(id::CONSTANT).unwrap().clone()).unwrap();
//! let product = graph.add_node(catalog.lookup(id::MULTIPLY).unwrap().clone()).unwrap();
//! graph.set_number(a, "value", 5.0).unwrap();
//! graph.set_number(b, "value", 3.0).unwrap();
//! graph.attach(product, 0, a).unwrap();
//! graph.attach(product, 1, b).unwrap();
//!
//! let context = graph.compile(product, &[]).unwrap();
//! assert_eq!(context.folded_value(product), Some(&[Value::decimal(15.0)][..]));
//! ```

pub mod arithmetic;
pub mod host;
pub mod logic;
pub mod vector;

use waviate_core::{Catalog, OperatorType};

pub use arithmetic::BroadcastMode;
pub use host::BlockContext;

/// Stable ids of the built-in operators (owner 0).
pub mod id {
    use waviate_core::OperatorId;

    /// Pass-through sink.
    pub const OUTPUT: OperatorId = OperatorId::builtin(1);
    /// Graph input.
    pub const INPUT: OperatorId = OperatorId::builtin(2);
    /// `x + y`.
    pub const ADD: OperatorId = OperatorId::builtin(4);
    /// `x - y`.
    pub const SUBTRACT: OperatorId = OperatorId::builtin(5);
    /// `x * y`.
    pub const MULTIPLY: OperatorId = OperatorId::builtin(6);
    /// `x / y`, zero where `y` is zero.
    pub const DIVIDE: OperatorId = OperatorId::builtin(7);
    /// Elementwise sine.
    pub const SIN: OperatorId = OperatorId::builtin(8);
    /// One decimal literal.
    pub const CONSTANT: OperatorId = OperatorId::builtin(12);
    /// A list of decimal literals.
    pub const CONSTANTS: OperatorId = OperatorId::builtin(13);
    /// One boolean literal.
    pub const BOOLEAN: OperatorId = OperatorId::builtin(14);
    /// Linear blend of two legs.
    pub const LERP: OperatorId = OperatorId::builtin(17);
    /// Held MIDI notes.
    pub const NOTE_ON: OperatorId = OperatorId::builtin(34);
    /// Arithmetic sequence.
    pub const RANGE: OperatorId = OperatorId::builtin(43);
    /// Scalar repeated `n` times.
    pub const REPEAT: OperatorId = OperatorId::builtin(44);
    /// Truncation toward zero.
    pub const ROUND: OperatorId = OperatorId::builtin(50);
    /// Elementwise floor.
    pub const FLOOR: OperatorId = OperatorId::builtin(51);
    /// Elementwise select.
    pub const WHERE: OperatorId = OperatorId::builtin(79);
    /// `x > y`.
    pub const GREATER: OperatorId = OperatorId::builtin(80);
    /// `x < y`.
    pub const LESS: OperatorId = OperatorId::builtin(81);
    /// Uniform random values.
    pub const WHITE_NOISE: OperatorId = OperatorId::builtin(105);
    /// Index of the block's first frame.
    pub const SAMPLE_NUMBER: OperatorId = OperatorId::builtin(110);
    /// Stream sample rate.
    pub const SAMPLE_RATE: OperatorId = OperatorId::builtin(111);
}

/// Category of a built-in operator, used for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorCategory {
    /// Graph inputs and outputs
    Io,
    /// Literal values
    Constants,
    /// Broadcasting arithmetic and elementwise functions
    Arithmetic,
    /// Vector construction
    Vector,
    /// Comparison and selection
    Logic,
    /// Values read from the running stream
    Host,
}

impl OperatorCategory {
    /// All categories in listing order.
    pub const ALL: [Self; 6] = [
        Self::Io,
        Self::Constants,
        Self::Arithmetic,
        Self::Vector,
        Self::Logic,
        Self::Host,
    ];

    /// Key stored in [`OperatorType::category`].
    pub const fn name(&self) -> &'static str {
        match self {
            OperatorCategory::Io => "io",
            OperatorCategory::Constants => "constants",
            OperatorCategory::Arithmetic => "arithmetic",
            OperatorCategory::Vector => "vector",
            OperatorCategory::Logic => "logic",
            OperatorCategory::Host => "host",
        }
    }

    /// Returns a description of the category.
    pub const fn description(&self) -> &'static str {
        match self {
            OperatorCategory::Io => "Graph inputs and the output sink",
            OperatorCategory::Constants => "Decimal and boolean literals",
            OperatorCategory::Arithmetic => "Add, subtract, multiply, divide, and elementwise math",
            OperatorCategory::Vector => "Ranges and repeats sized at compile time",
            OperatorCategory::Logic => "Comparisons and elementwise selection",
            OperatorCategory::Host => "Sample position, sample rate, noise, and MIDI notes",
        }
    }

    /// Looks a category up by its key.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// Every built-in operator type.
pub fn builtin_operators() -> Vec<OperatorType> {
    let mut operators = Vec::with_capacity(24);
    operators.extend(vector::operators());
    operators.extend(arithmetic::operators());
    operators.extend(logic::operators());
    operators.extend(host::operators());
    operators
}

/// A catalog holding every built-in operator.
pub fn builtin_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    register_builtins(&mut catalog);
    catalog
}

/// Registers the built-ins into an existing catalog, skipping ids that are
/// already present.
pub fn register_builtins(catalog: &mut Catalog) {
    for operator in builtin_operators() {
        if catalog.contains(operator.id) {
            continue;
        }
        // Ids were checked above, so registration cannot collide.
        let _ = catalog.register(operator);
    }
}
