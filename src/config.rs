//! Operator-facing configuration.
//!
//! Loaded from `.anvil/config.yaml` when present; every field has a default
//! so a missing or partial file is never fatal.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Project configuration with conservative defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnvilConfig {
    /// Hard dollar cap for the whole project.
    pub per_project_cap: f64,
    /// Rolling 24h dollar cap across projects.
    pub daily_cap: f64,
    /// Default model identifier for backend calls.
    pub model: String,
    /// Whether the shaping phase runs between interview and decompose.
    pub shaping: bool,
    /// Fraction of the project cap the shape phase may consume.
    pub shape_budget_pct: f64,
    /// Parallel attempts per component when competition is enabled (1 = off).
    pub competitive_attempts: u32,
    /// Seconds between daemon health sweeps.
    pub health_check_interval_secs: u64,
    /// Idle seconds before a run is flagged as stalled.
    pub max_idle_secs: u64,
}

impl Default for AnvilConfig {
    fn default() -> Self {
        Self {
            per_project_cap: 10.0,
            daily_cap: 50.0,
            model: "gpt-4o-mini".to_string(),
            shaping: false,
            shape_budget_pct: 0.2,
            competitive_attempts: 1,
            health_check_interval_secs: 30,
            max_idle_secs: 600,
        }
    }
}

impl AnvilConfig {
    /// Load the config from disk, falling back to defaults when the file
    /// does not exist. A file that exists but fails to parse is an error;
    /// silently ignoring a typo'd cap would defeat the point of having one.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config = serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid config at {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("failed to serialize config")?;
        fs::write(path, yaml)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// True when more than one attempt per component is configured.
    pub fn competitive_enabled(&self) -> bool {
        self.competitive_attempts > 1
    }
}
