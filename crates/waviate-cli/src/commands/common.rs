//! Shared CLI helpers used across multiple commands.

use std::path::PathBuf;
use std::sync::Arc;

use waviate_config::{Patch, find_patch};
use waviate_core::{CompiledContext, Graph, Value, ValueType};

/// Load a patch by path or by name from the user patches directory.
pub fn load_patch(name: &str) -> anyhow::Result<Patch> {
    let path = find_patch(name).map_or_else(|| PathBuf::from(name), |p| p);
    if !path.exists() {
        anyhow::bail!("Patch '{name}' not found");
    }
    tracing::debug!(path = %path.display(), "loading patch");
    Ok(Patch::load(&path)?)
}

/// A patch rebuilt and compiled against the built-in catalog.
pub struct Compiled {
    pub patch: Patch,
    pub graph: Graph,
    pub externals: Vec<Vec<Value>>,
    pub context: Arc<CompiledContext>,
}

/// Loads, validates, builds, and compiles a patch.
pub fn compile_patch(name: &str) -> anyhow::Result<Compiled> {
    let patch = load_patch(name)?;
    let catalog = waviate_ops::builtin_catalog();
    let (mut graph, output) = patch.build(&catalog)?;
    let externals = patch.external_values(&graph);
    let context = graph.compile(output, &externals)?;

    for diagnostic in context.diagnostics() {
        tracing::warn!(%diagnostic, "node fault");
    }
    Ok(Compiled {
        patch,
        graph,
        externals,
        context,
    })
}

/// Renders one cell as its type reads it.
pub fn format_value(value: Value, ty: ValueType) -> String {
    match ty {
        ValueType::Decimal | ValueType::Any => value.as_decimal().to_string(),
        ValueType::Integer => value.as_integer().to_string(),
        ValueType::Boolean => value.as_boolean().to_string(),
    }
}

/// One cell as a JSON value.
pub fn json_value(value: Value, ty: ValueType) -> serde_json::Value {
    match ty {
        ValueType::Decimal | ValueType::Any => serde_json::json!(value.as_decimal()),
        ValueType::Integer => serde_json::json!(value.as_integer()),
        ValueType::Boolean => serde_json::json!(value.as_boolean()),
    }
}
