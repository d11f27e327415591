//! Broadcasting arithmetic and elementwise math.
//!
//! Binary operators read the numeric property `op_mode` to decide how inputs
//! of different lengths combine:
//!
//! | mode | name     | length            | cell `k`                            |
//! |------|----------|-------------------|-------------------------------------|
//! | 0    | pad      | `max(|x|, |y|)`   | `x[k] op y[k]`, then the longer leg |
//! | 1    | truncate | `min(|x|, |y|)`   | `x[k] op y[k]`                      |
//! | 2    | outer    | `|x| * |y|`       | `x[i] op y[j]` at `j + i * |y|`     |
//!
//! In pad mode each operator decides what the longer leg contributes past the
//! end of the shorter one: subtract negates a longer `y`, divide keeps a
//! longer `x` and writes zeros for a longer `y`.

use waviate_core::{
    DeclaredType, ExecuteFn, Inputs, LenQuery, NodeConfig, NodeFault, OperatorId, OperatorType,
    RuntimeContext, SlotSpec, Value, ValueType,
};

use crate::{OperatorCategory, id};

/// How a binary operator combines inputs of different lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastMode {
    /// Combine the common prefix, then copy the rest of the longer input.
    #[default]
    Pad,
    /// Combine the common prefix only.
    Truncate,
    /// Every pair, `x` major.
    Outer,
}

impl BroadcastMode {
    /// Reads `op_mode` from a node's properties. Absent means [`Pad`](Self::Pad).
    pub fn from_config(config: &NodeConfig) -> Result<Self, NodeFault> {
        match config.number("op_mode") {
            None => Ok(Self::Pad),
            Some(m) if m == 0.0 => Ok(Self::Pad),
            Some(m) if m == 1.0 => Ok(Self::Truncate),
            Some(m) if m == 2.0 => Ok(Self::Outer),
            Some(m) => Err(NodeFault::InvalidConfig(format!("op_mode {m} is not 0, 1, or 2"))),
        }
    }

    /// Numeric value stored in `op_mode`.
    pub const fn code(self) -> f64 {
        match self {
            Self::Pad => 0.0,
            Self::Truncate => 1.0,
            Self::Outer => 2.0,
        }
    }

    /// Output length for inputs of length `x` and `y`.
    pub fn output_len(self, x: usize, y: usize) -> usize {
        match self {
            Self::Pad => x.max(y),
            Self::Truncate => x.min(y),
            Self::Outer => x * y,
        }
    }
}

/// A binary elementwise operator.
trait Binary {
    fn apply(x: f64, y: f64) -> f64;

    /// Contribution of a longer `x` in pad mode.
    fn pad_x(x: f64) -> f64 {
        x
    }

    /// Contribution of a longer `y` in pad mode.
    fn pad_y(y: f64) -> f64 {
        y
    }
}

struct Add;
struct Subtract;
struct Multiply;
struct Divide;

impl Binary for Add {
    fn apply(x: f64, y: f64) -> f64 {
        x + y
    }
}

impl Binary for Subtract {
    fn apply(x: f64, y: f64) -> f64 {
        x - y
    }

    fn pad_y(y: f64) -> f64 {
        -y
    }
}

impl Binary for Multiply {
    fn apply(x: f64, y: f64) -> f64 {
        x * y
    }
}

impl Binary for Divide {
    fn apply(x: f64, y: f64) -> f64 {
        if y == 0.0 { 0.0 } else { x / y }
    }

    fn pad_y(_: f64) -> f64 {
        0.0
    }
}

fn broadcast_len(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
    let mode = BroadcastMode::from_config(q.config())?;
    Ok(mode.output_len(q.len(0), q.len(1)))
}

fn broadcast<B: Binary>(
    config: &NodeConfig,
    _: &mut RuntimeContext<'_>,
    inputs: &Inputs<'_>,
    out: &mut [Value],
) {
    let (x, y) = (inputs.slot(0), inputs.slot(1));
    let mode = BroadcastMode::from_config(config).unwrap_or_default();
    match mode {
        BroadcastMode::Pad | BroadcastMode::Truncate => {
            for (k, o) in out.iter_mut().enumerate() {
                let v = match (x.get(k), y.get(k)) {
                    (Some(a), Some(b)) => B::apply(a.as_decimal(), b.as_decimal()),
                    (Some(a), None) => B::pad_x(a.as_decimal()),
                    (None, Some(b)) => B::pad_y(b.as_decimal()),
                    (None, None) => 0.0,
                };
                *o = Value::decimal(v);
            }
        }
        BroadcastMode::Outer => {
            let width = y.len();
            for (i, a) in x.iter().enumerate() {
                for (j, b) in y.iter().enumerate() {
                    if let Some(o) = out.get_mut(j + i * width) {
                        *o = Value::decimal(B::apply(a.as_decimal(), b.as_decimal()));
                    }
                }
            }
        }
    }
}

fn binary(id: OperatorId, name: &str, execute: ExecuteFn) -> OperatorType {
    OperatorType::builtin(id, name, broadcast_len, execute)
        .category(OperatorCategory::Arithmetic.name())
        .slot(SlotSpec::new("x", ValueType::Decimal))
        .slot(SlotSpec::new("y", ValueType::Decimal))
}

fn same_len(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
    Ok(q.len(0))
}

fn map(inputs: &Inputs<'_>, out: &mut [Value], f: impl Fn(f64) -> Value) {
    for (o, v) in out.iter_mut().zip(inputs.slot(0)) {
        *o = f(v.as_decimal());
    }
}

fn sin(_: &NodeConfig, _: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
    map(inputs, out, |x| Value::decimal(x.sin()));
}

fn round(_: &NodeConfig, _: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
    map(inputs, out, |x| Value::integer(x.trunc() as i64));
}

fn floor(_: &NodeConfig, _: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
    map(inputs, out, |x| Value::decimal(x.floor()));
}

fn unary(id: OperatorId, name: &str, execute: ExecuteFn) -> OperatorType {
    OperatorType::builtin(id, name, same_len, execute)
        .category(OperatorCategory::Arithmetic.name())
        .slot(SlotSpec::new("x", ValueType::Decimal))
}

fn lerp_len(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
    let legs = usize::from(q.is_attached(0)) + usize::from(q.is_attached(1));
    if legs < 2 {
        return Err(NodeFault::MissingLegs {
            required: 2,
            connected: legs,
        });
    }
    Ok(q.len(0).max(q.len(1)))
}

fn lerp(_: &NodeConfig, _: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
    out.fill(Value::decimal(0.0));
    let t = inputs.scalar(2).clamp(0.0, 1.0);
    for ((o, a), b) in out.iter_mut().zip(inputs.slot(0)).zip(inputs.slot(1)) {
        *o = Value::decimal(a.as_decimal() * (1.0 - t) + b.as_decimal() * t);
    }
}

/// Arithmetic operators.
pub(crate) fn operators() -> Vec<OperatorType> {
    vec![
        binary(id::ADD, "add", broadcast::<Add>),
        binary(id::SUBTRACT, "subtract", broadcast::<Subtract>),
        binary(id::MULTIPLY, "multiply", broadcast::<Multiply>),
        binary(id::DIVIDE, "divide", broadcast::<Divide>),
        unary(id::SIN, "sin", sin),
        unary(id::ROUND, "round toward zero", round).output(DeclaredType::INTEGER),
        unary(id::FLOOR, "floor", floor),
        OperatorType::builtin(id::LERP, "lerp", lerp_len, lerp)
            .category(OperatorCategory::Arithmetic.name())
            .slot(SlotSpec::new("a", ValueType::Decimal))
            .slot(SlotSpec::new("b", ValueType::Decimal))
            .slot(SlotSpec::new("s", ValueType::Decimal).with_len(1)),
    ]
}
