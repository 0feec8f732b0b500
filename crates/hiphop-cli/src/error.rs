use std::path::PathBuf;

use hiphop_kernel::config::ConfigError;
use hiphop_plugins::WasmError;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Guest binary not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    #[error("Failed to load {}: {source}", path.display())]
    Load { path: PathBuf, source: WasmError },

    #[error("Runtime error: {0}")]
    Wasm(#[from] WasmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type CliResult<T> = Result<T, CliError>;
