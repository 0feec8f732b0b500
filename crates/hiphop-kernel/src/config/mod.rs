//! Host configuration
//!
//! [`HostConfig`] describes where the guest DSP binary lives, the shape the
//! host SDK glue was compiled with, sandbox limits and hot-reload settings.
//! With the `config` feature it can be loaded from TOML, JSON or YAML files
//! with `${VAR}` / `$VAR` environment substitution.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::plugin::PluginInfo;

#[cfg(feature = "config")]
mod loader;
#[cfg(feature = "config")]
pub use loader::{detect_format, from_str, load_config, load_with_env, substitute_env_vars};
#[cfg(feature = "config")]
pub use config::FileFormat;

/// Location of the guest binary relative to the plugin library directory
pub const DEFAULT_BINARY_PATH: &str = "dsp/optimized.wasm";

/// Configuration error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Hot-reload settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadSettings {
    /// Watch the guest binary on disk and reload it when it changes
    pub watch: bool,
    /// Quiet period before a burst of file events triggers a reload
    pub debounce_ms: u64,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            watch: false,
            debounce_ms: 250,
        }
    }
}

/// Host configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Guest binary, relative paths resolve against the plugin library directory
    pub binary_path: PathBuf,
    /// Channel and slot counts of the host SDK glue
    pub plugin: PluginInfo,
    /// Upper bound for guest linear memory, in 64KiB pages
    pub max_memory_pages: u32,
    /// Upper bound when reading null-terminated strings out of guest memory
    pub max_string_len: usize,
    pub reload: ReloadSettings,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from(DEFAULT_BINARY_PATH),
            plugin: PluginInfo::default(),
            max_memory_pages: 256,
            max_string_len: 4096,
            reload: ReloadSettings::default(),
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.binary_path = path.into();
        self
    }

    pub fn with_plugin_info(mut self, info: PluginInfo) -> Self {
        self.plugin = info;
        self
    }

    pub fn with_max_memory_pages(mut self, pages: u32) -> Self {
        self.max_memory_pages = pages;
        self
    }

    pub fn with_reload(mut self, reload: ReloadSettings) -> Self {
        self.reload = reload;
        self
    }

    /// Absolute location of the guest binary for a plugin installed in `library_dir`
    pub fn resolve_binary_path(&self, library_dir: &Path) -> PathBuf {
        if self.binary_path.is_absolute() {
            self.binary_path.clone()
        } else {
            library_dir.join(&self.binary_path)
        }
    }

    /// Reject configurations the adapter cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_memory_pages == 0 {
            return Err(ConfigError::Invalid(
                "max_memory_pages must be at least 1".to_string(),
            ));
        }
        if self.max_string_len == 0 {
            return Err(ConfigError::Invalid(
                "max_string_len must be at least 1".to_string(),
            ));
        }
        if self.binary_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("binary_path is empty".to_string()));
        }
        Ok(())
    }
}
