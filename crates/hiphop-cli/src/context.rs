//! Configuration and guest loading shared by the commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hiphop_kernel::PluginHost;
use hiphop_kernel::config::{HostConfig, load_with_env};
use hiphop_plugins::WasmHostPlugin;
use hiphop_plugins::wasm_runtime::RuntimeConfig;
use tracing::debug;

use crate::error::{CliError, CliResult};

/// Prefix for `HIPHOP_SECTION__KEY` overrides of the config file
pub const ENV_PREFIX: &str = "HIPHOP";

/// Host configuration together with the guest binary it points at
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: HostConfig,
    pub binary: PathBuf,
}

impl CliContext {
    /// Load `config_path` (or defaults) and resolve the guest binary.
    ///
    /// The configured binary path is relative to the config file's
    /// directory; `binary` overrides it and is taken as given.
    pub fn load(config_path: Option<&Path>, binary: Option<&Path>) -> CliResult<Self> {
        let (config, library_dir) = match config_path {
            Some(path) => {
                debug!("Loading host configuration from {:?}", path);
                let config: HostConfig = load_with_env(path, ENV_PREFIX)?;
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                (config, dir)
            }
            None => (HostConfig::default(), std::env::current_dir()?),
        };
        config.validate()?;

        let binary = match binary {
            Some(path) => path.to_path_buf(),
            None => config.resolve_binary_path(&library_dir),
        };
        if !binary.is_file() {
            return Err(CliError::BinaryNotFound(binary));
        }

        Ok(Self { config, binary })
    }

    /// Adapter with the guest binary loaded
    pub fn load_plugin(&self, host: Arc<dyn PluginHost>) -> CliResult<WasmHostPlugin> {
        let plugin = WasmHostPlugin::new(
            self.config.plugin,
            RuntimeConfig::from_host_config(&self.config),
            host,
        )?;
        plugin
            .load_wasm_file(&self.binary)
            .map_err(|source| CliError::Load {
                path: self.binary.clone(),
                source,
            })?;
        Ok(plugin)
    }
}
