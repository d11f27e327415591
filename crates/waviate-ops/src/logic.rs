//! Comparison and elementwise selection.

use waviate_core::{
    DeclaredType, ExecuteFn, Inputs, LenQuery, NodeConfig, NodeFault, OperatorId, OperatorType,
    RuntimeContext, SlotSpec, Value, ValueType,
};

use crate::{OperatorCategory, id};

/// Longest input, at least 1.
fn widest(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
    Ok(q.inputs().iter().map(<[Value]>::len).max().unwrap_or(0).max(1))
}

/// `out[k] = cond[k] ? a[k] : b[k]`. A missing condition cell selects `a`,
/// a missing data cell reads zero.
fn select(_: &NodeConfig, _: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
    let (cond, a, b) = (inputs.slot(0), inputs.slot(1), inputs.slot(2));
    for (k, o) in out.iter_mut().enumerate().take(a.len().max(b.len())) {
        let pick_a = cond.get(k).is_none_or(|c| c.as_boolean());
        let source = if pick_a { a } else { b };
        *o = source.get(k).copied().unwrap_or(Value::ZERO);
    }
}

trait Compare {
    fn holds(x: f64, y: f64) -> bool;
}

struct Greater;
struct Less;

impl Compare for Greater {
    fn holds(x: f64, y: f64) -> bool {
        x > y
    }
}

impl Compare for Less {
    fn holds(x: f64, y: f64) -> bool {
        x < y
    }
}

/// Missing cells of the shorter input read zero.
fn compare<C: Compare>(
    _: &NodeConfig,
    _: &mut RuntimeContext<'_>,
    inputs: &Inputs<'_>,
    out: &mut [Value],
) {
    let (x, y) = (inputs.slot(0), inputs.slot(1));
    let at = |s: &[Value], k: usize| s.get(k).map_or(0.0, |v| v.as_decimal());
    for (k, o) in out.iter_mut().enumerate() {
        *o = Value::boolean(C::holds(at(x, k), at(y, k)));
    }
}

fn comparison(id: OperatorId, name: &str, execute: ExecuteFn) -> OperatorType {
    OperatorType::builtin(id, name, widest, execute)
        .category(OperatorCategory::Logic.name())
        .slot(SlotSpec::new("x", ValueType::Decimal))
        .slot(SlotSpec::new("y", ValueType::Decimal))
        .output(DeclaredType::BOOLEAN)
}

/// Logic operators.
pub(crate) fn operators() -> Vec<OperatorType> {
    vec![
        OperatorType::builtin(id::WHERE, "where", widest, select)
            .category(OperatorCategory::Logic.name())
            .slot(SlotSpec::new("cond", ValueType::Boolean))
            .slot(SlotSpec::new("a", ValueType::Any))
            .slot(SlotSpec::new("b", ValueType::Any))
            .follows(1),
        comparison(id::GREATER, "greater", compare::<Greater>),
        comparison(id::LESS, "less", compare::<Less>),
    ]
}
