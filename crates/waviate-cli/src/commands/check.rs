//! Patch validation command.

use clap::Args;

use super::common::compile_patch;

#[derive(Args)]
pub struct CheckArgs {
    /// Patch name or path
    #[arg(value_name = "PATCH")]
    patch: String,

    /// Print the compiled step listing
    #[arg(long)]
    steps: bool,

    /// Fail if any node is faulted
    #[arg(long)]
    strict: bool,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let compiled = compile_patch(&args.patch)?;
    let context = &compiled.context;

    println!("Patch: {}", compiled.patch.name);
    if let Some(description) = &compiled.patch.description {
        println!("  {description}");
    }
    println!("Nodes:       {}", compiled.graph.len());
    println!("Graph inputs: {}", compiled.graph.input_nodes().len());
    println!("Compiled:    {} nodes, {} steps", context.node_count(), context.steps().len());
    println!("Output:      {} x {}", context.output_len(), context.output_type());
    println!("Buffer:      {} cells", context.field_len());

    if args.steps {
        println!();
        println!("Steps:");
        for line in context.describe() {
            println!("  {line}");
        }
    }

    let diagnostics = context.diagnostics();
    if !diagnostics.is_empty() {
        println!();
        println!("Faults:");
        for diagnostic in diagnostics {
            println!("  {diagnostic}");
        }
        if args.strict {
            anyhow::bail!("{} faulted node(s)", diagnostics.len());
        }
    }
    Ok(())
}
