//! CLI defaults loaded from `~/.config/gdl/config.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Tunable defaults. Command-line flags always win over these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GdlConfig {
    /// Default segment count for `gdl download`.
    pub download_concurrency: usize,
    /// Default segment count per file in `gdl batch` (files themselves run
    /// one at a time).
    pub batch_concurrency: usize,
}

impl Default for GdlConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 16,
            batch_concurrency: 8,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("gdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load the config, writing a default file on first run.
pub fn load_or_init() -> Result<GdlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = GdlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: GdlConfig = toml::from_str(&data)?;
    Ok(cfg)
}
