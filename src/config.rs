//! Engine configuration - defaults, YAML config files and lookup order
//!
//! Lookup order: an explicit path, then `./jobflow.yml`, then
//! `~/.jobflow/config.yml`. Missing files fall through to defaults; a file that
//! exists but does not parse is an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LOCAL_CONFIG: &str = "jobflow.yml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default timeout for API call jobs
    pub api_timeout_ms: u64,
    /// Default timeout for script jobs
    pub script_timeout_ms: u64,
    /// Interpreter used for `shell` scripts
    pub shell: String,
    pub user_agent: String,
    /// Where run reports are written
    pub runs_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_timeout_ms: 30_000,
            script_timeout_ms: 30_000,
            shell: "sh".to_string(),
            user_agent: format!("jobflow/{}", env!("CARGO_PKG_VERSION")),
            runs_dir: PathBuf::from(".jobflow/runs"),
        }
    }
}

impl EngineConfig {
    /// Per-user config path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".jobflow")
            .join("config.yml")
    }

    /// Resolve configuration using the lookup order
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        for candidate in [PathBuf::from(LOCAL_CONFIG), Self::default_path()] {
            if candidate.exists() {
                log::debug!("Using config {}", candidate.display());
                return Self::load_from(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Load from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}
