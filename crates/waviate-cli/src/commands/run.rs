//! Block rendering command.

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use waviate_config::EngineConfig;
use waviate_core::{Inputs, Value, publication};
use waviate_ops::BlockContext;

use super::common::{compile_patch, format_value, json_value};

#[derive(Args)]
pub struct RunArgs {
    /// Patch name or path
    #[arg(value_name = "PATCH")]
    patch: String,

    /// Number of blocks to render
    #[arg(long, short = 'n', default_value = "1")]
    blocks: usize,

    /// Override the engine block size (frames advanced per block)
    #[arg(long)]
    block_size: Option<usize>,

    /// Override the engine sample rate
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Override the noise seed
    #[arg(long)]
    seed: Option<u64>,

    /// Hold a MIDI note for the whole run (repeatable)
    #[arg(long = "note", value_name = "NOTE")]
    notes: Vec<u8>,

    /// Print each block as a JSON array
    #[arg(long)]
    json: bool,

    /// Render silently and show a progress bar
    #[arg(long)]
    quiet: bool,
}

pub fn run(args: RunArgs, mut engine: EngineConfig) -> anyhow::Result<()> {
    if let Some(block_size) = args.block_size {
        engine.block_size = block_size;
    }
    if let Some(sample_rate) = args.sample_rate {
        engine.sample_rate = sample_rate;
    }
    if let Some(seed) = args.seed {
        engine.seed = seed;
    }
    engine.validate()?;

    let compiled = compile_patch(&args.patch)?;
    let ty = compiled.context.output_type();
    tracing::info!(
        patch = %compiled.patch.name,
        sample_rate = engine.sample_rate,
        block_size = engine.block_size,
        blocks = args.blocks,
        "rendering"
    );

    let (publisher, mut renderer) = publication::channel();
    publisher.publish(compiled.context);

    let mut block = BlockContext::new(engine.sample_rate_hz(), engine.seed);
    for &note in &args.notes {
        block.note_on(note);
    }
    let inputs = Inputs::owned(&compiled.externals);

    let progress = args.quiet.then(|| {
        let bar = ProgressBar::new(args.blocks as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("{bar:40} {pos}/{len} blocks") {
            bar.set_style(style);
        }
        bar
    });

    for _ in 0..args.blocks {
        let out: &[Value] = renderer.render(&mut block.runtime(), &inputs).unwrap_or(&[]);
        if let Some(bar) = &progress {
            bar.inc(1);
        } else if args.json {
            let cells: Vec<serde_json::Value> = out.iter().map(|&v| json_value(v, ty)).collect();
            println!("{}", serde_json::Value::Array(cells));
        } else {
            let cells: Vec<String> = out.iter().map(|&v| format_value(v, ty)).collect();
            println!("{}", cells.join(" "));
        }
        block.advance(engine.block_size);
    }

    if let Some(bar) = progress {
        bar.finish();
    }
    Ok(())
}
