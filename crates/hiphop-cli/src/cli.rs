//! CLI command definitions using clap

use crate::output::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hip-Hop CLI - run WebAssembly DSP guests outside a plugin host
#[derive(Parser)]
#[command(name = "hiphop")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Host configuration file (TOML, JSON or YAML)
    #[arg(short = 'c', long, global = true, env = "HIPHOP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Load a guest binary and print its metadata
    Info {
        /// Guest binary, overrides the configured path
        binary: Option<PathBuf>,
    },

    /// Process a generated test signal through a guest
    Render {
        /// Guest binary, overrides the configured path
        binary: Option<PathBuf>,

        /// Total frames to render
        #[arg(short, long, default_value_t = 48000)]
        frames: usize,

        /// Frames per block
        #[arg(short, long, default_value_t = 256)]
        block_size: usize,

        /// Sample rate reported to the guest
        #[arg(long, default_value_t = 48000.0)]
        sample_rate: f64,

        /// Test tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        tone: f32,

        /// Parameter assignments applied before rendering, as INDEX=VALUE
        #[arg(short = 's', long = "set", value_parser = parse_assignment)]
        set: Vec<(u32, f32)>,
    },

    /// Keep a guest loaded and reload it whenever the binary changes
    Watch {
        /// Guest binary, overrides the configured path
        binary: Option<PathBuf>,

        /// Quiet period before a burst of file events triggers a reload
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
}

fn parse_assignment(s: &str) -> Result<(u32, f32), String> {
    let (index, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=VALUE, got '{}'", s))?;
    let index = index
        .trim()
        .parse()
        .map_err(|e| format!("invalid parameter index '{}': {}", index, e))?;
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid parameter value '{}': {}", value, e))?;
    Ok((index, value))
}
