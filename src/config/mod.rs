//! Configuration file loading.

pub use cowatch_core::config::{Config, SourceConfig, SyncConfig};

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./cowatch.toml",
        "~/.config/cowatch/config.toml",
        "/etc/cowatch/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Write `config` as TOML, creating parent directories.
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

/// Reject unusable values; log questionable ones.
fn validate_config(config: &Config) -> Result<()> {
    let sync = &config.sync;
    if !(sync.hard_threshold_secs.is_finite() && sync.hard_threshold_secs > 0.0) {
        anyhow::bail!("sync.hard_threshold_secs must be a positive number");
    }
    if sync.tick_interval_ms == 0 {
        anyhow::bail!("sync.tick_interval_ms cannot be 0");
    }
    if config.source.base_url.trim().is_empty() {
        anyhow::bail!("source.base_url cannot be empty");
    }

    for warning in config.validate() {
        tracing::warn!("Config: {}", warning);
    }

    Ok(())
}
