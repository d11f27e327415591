//! waviate CLI - inspect, validate, and run waviate patches.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use waviate_config::{EngineConfig, engine_config_path};

#[derive(Parser)]
#[command(name = "waviate")]
#[command(author, version, about = "waviate dataflow graph CLI", long_about = None)]
struct Cli {
    /// Engine settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available operators
    Operators(commands::operators::OperatorsArgs),

    /// Validate and compile a patch without running it
    Check(commands::check::CheckArgs),

    /// Compile a patch and render blocks
    Run(commands::run::RunArgs),
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(engine_config_path);
    let engine = EngineConfig::load_or_default(&config_path)?;
    init_tracing(&engine.log_filter);
    tracing::debug!(path = %config_path.display(), "engine config");

    match cli.command {
        Commands::Operators(args) => commands::operators::run(args),
        Commands::Check(args) => commands::check::run(args),
        Commands::Run(args) => commands::run::run(args, engine),
    }
}
