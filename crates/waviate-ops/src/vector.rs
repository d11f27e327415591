//! Graph endpoints, literals, and vectors sized at compile time.

use waviate_core::{
    DeclaredType, Inputs, LenQuery, MAX_NODE_LEN, NodeConfig, NodeFault, OperatorType,
    RuntimeContext, SlotSpec, Value, ValueType,
};

use crate::{OperatorCategory, id};

fn one(_: &LenQuery<'_>) -> Result<usize, NodeFault> {
    Ok(1)
}

fn same_len(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
    Ok(q.len(0))
}

fn passthrough(_: &NodeConfig, _: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
    let x = inputs.slot(0);
    let n = x.len().min(out.len());
    out[..n].copy_from_slice(&x[..n]);
}

fn constant(config: &NodeConfig, _: &mut RuntimeContext<'_>, _: &Inputs<'_>, out: &mut [Value]) {
    out.fill(Value::decimal(config.number_or("value", 0.0)));
}

fn boolean(config: &NodeConfig, _: &mut RuntimeContext<'_>, _: &Inputs<'_>, out: &mut [Value]) {
    out.fill(Value::from_literal(config.number_or("value", 0.0), ValueType::Boolean));
}

/// Parses the comma-separated `values` property of a constants node.
pub fn parse_values(config: &NodeConfig) -> Result<Vec<f64>, NodeFault> {
    let Some(text) = config.text("values") else {
        return Ok(vec![0.0]);
    };
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| NodeFault::InvalidConfig(format!("`{t}` is not a finite number")))
        })
        .collect()
}

fn constants_len(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
    parse_values(q.config()).map(|v| v.len())
}

fn constants(config: &NodeConfig, _: &mut RuntimeContext<'_>, _: &Inputs<'_>, out: &mut [Value]) {
    if let Ok(values) = parse_values(config) {
        for (o, v) in out.iter_mut().zip(values) {
            *o = Value::decimal(v);
        }
    }
}

/// Length read from a compile-time count slot, at least 1.
///
/// Counts above [`MAX_NODE_LEN`] fault instead of sizing a buffer.
pub fn count(q: &LenQuery<'_>, slot: usize) -> Result<usize, NodeFault> {
    let n = q.inputs().integer(slot).max(1);
    usize::try_from(n)
        .ok()
        .filter(|&n| n <= MAX_NODE_LEN)
        .ok_or_else(|| {
            NodeFault::InvalidConfig(format!("count {n} exceeds the limit of {MAX_NODE_LEN}"))
        })
}

fn range_len(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
    count(q, 1)
}

fn range(_: &NodeConfig, _: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
    let start = inputs.scalar(0);
    let step = inputs.scalar(2);
    for (k, o) in out.iter_mut().enumerate() {
        *o = Value::decimal(start + step * k as f64);
    }
}

fn repeat_len(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
    count(q, 1)
}

fn repeat(_: &NodeConfig, _: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
    out.fill(Value::decimal(inputs.scalar(0)));
}

/// Endpoint and vector operators.
pub(crate) fn operators() -> Vec<OperatorType> {
    vec![
        OperatorType::graph_input(id::INPUT).category(OperatorCategory::Io.name()),
        OperatorType::builtin(id::OUTPUT, "output", same_len, passthrough)
            .category(OperatorCategory::Io.name())
            .slot(SlotSpec::new("audio", ValueType::Any))
            .follows(0),
        OperatorType::builtin(id::CONSTANT, "constant decimal", one, constant)
            .category(OperatorCategory::Constants.name()),
        OperatorType::builtin(id::CONSTANTS, "constant decimals", constants_len, constants)
            .category(OperatorCategory::Constants.name()),
        OperatorType::builtin(id::BOOLEAN, "constant boolean", one, boolean)
            .category(OperatorCategory::Constants.name())
            .output(DeclaredType::BOOLEAN),
        OperatorType::builtin(id::RANGE, "range", range_len, range)
            .category(OperatorCategory::Vector.name())
            .slot(SlotSpec::new("start", ValueType::Decimal).with_len(1))
            .slot(
                SlotSpec::new("step count", ValueType::Integer)
                    .with_len(1)
                    .compile_time()
                    .with_default(1_i64),
            )
            .slot(
                SlotSpec::new("step size", ValueType::Decimal)
                    .with_len(1)
                    .with_default(1.0),
            ),
        OperatorType::builtin(id::REPEAT, "repeat", repeat_len, repeat)
            .category(OperatorCategory::Vector.name())
            .slot(SlotSpec::new("x", ValueType::Decimal).with_len(1))
            .slot(
                SlotSpec::new("n", ValueType::Integer)
                    .with_len(1)
                    .compile_time()
                    .with_default(1_i64),
            ),
    ]
}
