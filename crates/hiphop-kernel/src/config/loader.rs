//! File loading for [`HostConfig`](super::HostConfig) and friends

use config::builder::DefaultState;
use config::{Config as Cfg, ConfigBuilder, Environment, File, FileFormat};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use super::{ConfigError, ConfigResult};

// `${NAME}` or `$NAME`
static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)\b")
        .expect("env var pattern is valid")
});

/// Detect configuration format from the file extension
///
/// `.toml`, `.json`, `.yaml`/`.yml` are supported.
pub fn detect_format<P: AsRef<Path>>(path: P) -> ConfigResult<FileFormat> {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Replace `${VAR}` and `$VAR` with the value of the environment variable.
/// Unset variables are left untouched.
pub fn substitute_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn build<T: DeserializeOwned>(builder: ConfigBuilder<DefaultState>) -> ConfigResult<T> {
    builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load configuration from a string with an explicit format
pub fn from_str<T: DeserializeOwned>(content: &str, format: FileFormat) -> ConfigResult<T> {
    let content = substitute_env_vars(content);
    build(Cfg::builder().add_source(File::from_str(&content, format)))
}

/// Load configuration from a file, format detected from the extension
pub fn load_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> ConfigResult<T> {
    let format = detect_format(&path)?;
    debug!("Loading config from {:?} as {:?}", path.as_ref(), format);
    let content = std::fs::read_to_string(&path)?;
    from_str(&content, format)
}

/// Load configuration from a file, then apply `PREFIX_SECTION__KEY`
/// environment overrides on top.
pub fn load_with_env<T: DeserializeOwned, P: AsRef<Path>>(
    path: P,
    env_prefix: &str,
) -> ConfigResult<T> {
    let format = detect_format(&path)?;
    debug!(
        "Loading config from {:?} as {:?} with {}_* overrides",
        path.as_ref(),
        format,
        env_prefix
    );
    let content = substitute_env_vars(&std::fs::read_to_string(&path)?);
    build(
        Cfg::builder()
            .add_source(File::from_str(&content, format))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__"),
            ),
    )
}
