//! Hip-Hop CLI - inspect, render and hot-reload WebAssembly DSP guests

mod cli;
mod commands;
mod context;
mod error;
mod host;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use context::CliContext;

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.output;
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Info { binary } => {
            let ctx = CliContext::load(config, binary.as_deref())?;
            commands::info::run(&ctx, format)
        }

        Commands::Render {
            binary,
            frames,
            block_size,
            sample_rate,
            tone,
            set,
        } => {
            let ctx = CliContext::load(config, binary.as_deref())?;
            let options = commands::render::RenderOptions {
                frames,
                block_size,
                sample_rate,
                tone,
                assignments: set,
            };
            commands::render::run(&ctx, &options, format)
        }

        Commands::Watch {
            binary,
            debounce_ms,
        } => {
            let ctx = CliContext::load(config, binary.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::watch::run(&ctx, debounce_ms, format))
        }
    }
}
