//! Sample values and the type lattice used by the engine.
//!
//! Every buffer cell is a [`Value`]: 64 bits that are read either as an `f64`
//! (decimal) or as an `i64` (integer and boolean). The bits are never tagged at
//! runtime; which view is valid is decided statically by the resolved type of
//! the node that wrote them.
//!
//! Three related enums describe types at different stages:
//!
//! - [`ValueType`]: the interpretation of a slot or value (`any` is the
//!   wildcard).
//! - [`DeclaredType`]: what an operator declares for its output. Adds
//!   [`FollowsInput`](DeclaredType::FollowsInput), meaning the type is inferred
//!   from the graph.
//! - [`ResolvedType`]: the per-node result of type resolution. Adds the
//!   transient [`Dirty`](ResolvedType::Dirty) marker.

use core::fmt;

/// One cell of the execution buffer.
///
/// Decimal values are stored as IEEE-754 bits; integer and boolean values are
/// stored as two's complement `i64` (boolean is 0 or 1).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Value {
    /// The all-zero cell. Reads as `0.0`, `0`, and `false`.
    pub const ZERO: Self = Self(0);

    /// Creates a decimal value.
    #[inline]
    pub const fn decimal(x: f64) -> Self {
        Self(x.to_bits())
    }

    /// Creates an integer value.
    #[inline]
    pub const fn integer(i: i64) -> Self {
        Self(i as u64)
    }

    /// Creates a boolean value (stored as integer 0 or 1).
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self(b as u64)
    }

    /// Reads the cell as a decimal.
    #[inline]
    pub const fn as_decimal(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Reads the cell as an integer.
    #[inline]
    pub const fn as_integer(self) -> i64 {
        self.0 as i64
    }

    /// Reads the cell as a boolean (any nonzero integer is true).
    #[inline]
    pub const fn as_boolean(self) -> bool {
        self.0 != 0
    }

    /// Returns the raw bit pattern.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Rebuilds a value from a raw bit pattern.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Builds a value of type `ty` from a decimal literal.
    ///
    /// Integers round to nearest, booleans threshold at 0.5. Used for
    /// property-supplied defaults, which are always entered as decimals.
    pub fn from_literal(x: f64, ty: ValueType) -> Self {
        match ty {
            ValueType::Decimal | ValueType::Any => Self::decimal(x),
            ValueType::Integer => Self::integer(x.round() as i64),
            ValueType::Boolean => Self::boolean(x > 0.5),
        }
    }

    /// Reinterprets a value written as `from` for a reader expecting `to`.
    ///
    /// Decimal to integer truncates toward zero; anything to boolean is a
    /// truthiness test; integer and boolean to decimal convert exactly.
    /// When either side is [`ValueType::Any`] the bits pass through.
    #[inline]
    pub fn coerce(self, from: ValueType, to: ValueType) -> Self {
        use ValueType::{Any, Boolean, Decimal, Integer};
        match (from, to) {
            (Any, _) | (_, Any) => self,
            (Decimal, Decimal) | (Integer, Integer) | (Boolean, Boolean) => self,
            (Decimal, Integer) => Self::integer(self.as_decimal() as i64),
            (Decimal, Boolean) => Self::boolean(self.as_decimal() != 0.0),
            (Integer, Decimal) | (Boolean, Decimal) => Self::decimal(self.as_integer() as f64),
            (Integer, Boolean) => Self::boolean(self.as_integer() != 0),
            (Boolean, Integer) => Self::integer(i64::from(self.as_boolean())),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::decimal(x)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::boolean(b)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({} | {:#x})", self.as_decimal(), self.0)
    }
}

/// Interpretation of a slot or a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ValueType {
    /// `f64` view.
    Decimal,
    /// `i64` view restricted to 0 and 1.
    Boolean,
    /// `i64` view.
    Integer,
    /// Wildcard: accepts any interpretation, performs no coercion.
    Any,
}

impl ValueType {
    /// Returns a short lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            ValueType::Decimal => "decimal",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Any => "any",
        }
    }

    /// True for decimal, boolean, and integer.
    pub const fn is_concrete(self) -> bool {
        !matches!(self, ValueType::Any)
    }

    /// Returns whether a value written as `self` must be coerced before a
    /// reader expecting `reader` sees it.
    pub fn needs_coercion_to(self, reader: ValueType) -> bool {
        self.is_concrete() && reader.is_concrete() && self != reader
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output type as declared by an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DeclaredType {
    /// A fixed interpretation.
    Fixed(ValueType),
    /// Same as whatever the type resolver infers from neighbouring edges.
    FollowsInput,
}

impl DeclaredType {
    /// Shorthand for `Fixed(ValueType::Decimal)`.
    pub const DECIMAL: Self = Self::Fixed(ValueType::Decimal);
    /// Shorthand for `Fixed(ValueType::Boolean)`.
    pub const BOOLEAN: Self = Self::Fixed(ValueType::Boolean);
    /// Shorthand for `Fixed(ValueType::Integer)`.
    pub const INTEGER: Self = Self::Fixed(ValueType::Integer);
    /// Shorthand for `Fixed(ValueType::Any)`.
    pub const ANY: Self = Self::Fixed(ValueType::Any);

    /// Returns the fixed type, or `None` for `FollowsInput`.
    pub const fn fixed(self) -> Option<ValueType> {
        match self {
            DeclaredType::Fixed(t) => Some(t),
            DeclaredType::FollowsInput => None,
        }
    }
}

/// Per-node result of type resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResolvedType {
    /// Resolved to decimal.
    Decimal,
    /// Resolved to boolean.
    Boolean,
    /// Resolved to integer.
    Integer,
    /// Resolved to the wildcard (stalemate or declared).
    Any,
    /// Not resolved yet. Never observed by the executor.
    #[default]
    Dirty,
}

impl ResolvedType {
    /// Returns the value type, or `None` while dirty.
    pub const fn value_type(self) -> Option<ValueType> {
        match self {
            ResolvedType::Decimal => Some(ValueType::Decimal),
            ResolvedType::Boolean => Some(ValueType::Boolean),
            ResolvedType::Integer => Some(ValueType::Integer),
            ResolvedType::Any => Some(ValueType::Any),
            ResolvedType::Dirty => None,
        }
    }

    /// True once resolution has assigned a type.
    pub const fn is_resolved(self) -> bool {
        !matches!(self, ResolvedType::Dirty)
    }
}

impl From<ValueType> for ResolvedType {
    fn from(t: ValueType) -> Self {
        match t {
            ValueType::Decimal => ResolvedType::Decimal,
            ValueType::Boolean => ResolvedType::Boolean,
            ValueType::Integer => ResolvedType::Integer,
            ValueType::Any => ResolvedType::Any,
        }
    }
}
