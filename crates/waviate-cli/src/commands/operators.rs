//! Operator listing command.

#![allow(clippy::print_literal)] // Table headers use literal strings intentionally

use clap::Args;
use waviate_core::DeclaredType;
use waviate_ops::{OperatorCategory, builtin_catalog};

#[derive(Args)]
pub struct OperatorsArgs {
    /// Show slots for a specific operator
    #[arg(value_name = "OPERATOR")]
    operator: Option<String>,

    /// Only list one category
    #[arg(long, short)]
    category: Option<String>,
}

fn output_name(output: DeclaredType) -> String {
    output
        .fixed()
        .map_or_else(|| "follows input".to_string(), |t| t.to_string())
}

pub fn run(args: OperatorsArgs) -> anyhow::Result<()> {
    let catalog = builtin_catalog();

    if let Some(name) = &args.operator {
        let op = catalog
            .iter()
            .find(|op| op.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow::anyhow!("Unknown operator: {name}"))?;

        println!("{} ({})", op.name, op.id);
        println!("{}", "=".repeat(op.name.len()));
        println!();
        println!("Category: {}", op.category);
        println!("Output:   {}", output_name(op.output));
        if op.always_runtime {
            println!("Runs every block (never folded)");
        }
        println!();

        if op.slots.is_empty() {
            println!("No input slots.");
            return Ok(());
        }
        println!("  {:4}  {:12}  {:8}  {:6}  {}", "Slot", "Name", "Type", "Length", "Flags");
        println!("  {:4}  {:12}  {:8}  {:6}  {}", "----", "----", "----", "------", "-----");
        for (i, slot) in op.slots.iter().enumerate() {
            let len = if slot.required_len == 0 {
                "any".to_string()
            } else {
                slot.required_len.to_string()
            };
            let flags = if slot.compile_time { "compile-time" } else { "" };
            println!(
                "  {:4}  {:12}  {:8}  {:6}  {}",
                i,
                slot.name,
                slot.value_type.to_string(),
                len,
                flags
            );
        }
        return Ok(());
    }

    let categories: Vec<OperatorCategory> = match &args.category {
        Some(name) => vec![
            OperatorCategory::from_name(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown category: {name}"))?,
        ],
        None => OperatorCategory::ALL.to_vec(),
    };

    println!("Available Operators");
    println!("===================");
    for category in categories {
        let mut ops: Vec<_> = catalog
            .iter()
            .filter(|op| op.category == category.name())
            .collect();
        if ops.is_empty() {
            continue;
        }
        ops.sort_by_key(|op| op.id);
        println!();
        println!("{} - {}", category.name(), category.description());
        for op in ops {
            println!("  {:6}  {:24}  -> {}", op.id.to_string(), op.name, output_name(op.output));
        }
    }
    Ok(())
}
