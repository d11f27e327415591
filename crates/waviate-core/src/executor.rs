//! Per-block execution of a compiled context.
//!
//! [`run`] walks the step list once. Each step writes one region that starts
//! after every region it reads, so the buffer is split at the output offset
//! and the inputs are borrowed immutably while the output is borrowed
//! mutably. No allocation happens inside [`run`].

use crate::operator::OperatorBody;
use crate::plan::{CompiledContext, ContextId, ExecStep};
use crate::runtime::{Inputs, RuntimeContext};
use crate::value::Value;

/// Mutable per-block state for one compiled context.
///
/// Owned by whoever executes the context (the audio side). Holds the flat
/// buffer and the states of nested promoted graphs.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    context: ContextId,
    field: Vec<Value>,
    children: Vec<Option<ExecutionState>>,
}

impl ExecutionState {
    /// Allocates state for `context`, seeded with its static prefix.
    pub fn new(context: &CompiledContext) -> Self {
        let mut children: Vec<Option<ExecutionState>> = vec![None; context.nodes.len()];
        for step in &context.steps {
            if let ExecStep::Evaluate { node, .. } = step
                && let Some(inner) = &context.nodes[*node].inner
            {
                children[*node] = Some(ExecutionState::new(inner));
            }
        }
        Self {
            context: context.id,
            field: context.initial_field.clone(),
            children,
        }
    }

    /// The context this state was built for.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// The whole buffer as of the last block.
    pub fn field(&self) -> &[Value] {
        &self.field
    }
}

/// Runs one block and returns the output region.
///
/// `externals` supplies one vector per graph input, indexed by placement
/// order. Missing vectors and missing cells read the input node's fallback.
pub fn run<'s>(
    context: &CompiledContext,
    state: &'s mut ExecutionState,
    runtime: &mut RuntimeContext<'_>,
    externals: &Inputs<'_>,
) -> &'s [Value] {
    debug_assert_eq!(state.context, context.id, "state belongs to another context");
    let ExecutionState {
        field, children, ..
    } = state;

    for step in &context.steps {
        match step {
            ExecStep::ReadExternal {
                index,
                fallback,
                output,
                ..
            } => {
                let dest = &mut field[output.range()];
                let source = index.and_then(|i| externals.get(i)).unwrap_or(&[]);
                let n = source.len().min(dest.len());
                dest[..n].copy_from_slice(&source[..n]);
                dest[n..].fill(*fallback);
            }
            ExecStep::Coerce {
                source,
                dest,
                from,
                to,
            } => {
                let (read, write) = field.split_at_mut(dest.offset);
                for (d, s) in write[..dest.len].iter_mut().zip(&read[source.range()]) {
                    *d = s.coerce(*from, *to);
                }
            }
            ExecStep::Evaluate {
                node,
                inputs,
                output,
            } => {
                let (read, write) = field.split_at_mut(output.offset);
                let args = Inputs::field(read, &context.input_regions[inputs.clone()]);
                let out = &mut write[..output.len];
                let compiled = &context.nodes[*node];
                match &compiled.operator.body {
                    OperatorBody::Builtin { execute, .. } => {
                        execute(&compiled.config, runtime, &args, out);
                    }
                    OperatorBody::Subgraph(_) => {
                        if let (Some(inner), Some(child)) =
                            (&compiled.inner, children[*node].as_mut())
                        {
                            let result = run(inner, child, runtime, &args);
                            let n = result.len().min(out.len());
                            out[..n].copy_from_slice(&result[..n]);
                        }
                    }
                    OperatorBody::GraphInput => {}
                }
            }
        }
    }

    &field[context.output_region().range()]
}
