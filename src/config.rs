// ⚙️ Configuration - JSON file, then environment overrides
// Precedence: env > file > defaults

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const ENV_DATABASE: &str = "POLICY_DEDUP_DB";
pub const ENV_BIND: &str = "POLICY_DEDUP_BIND";
pub const ENV_DEBOUNCE_MS: &str = "POLICY_DEDUP_DEBOUNCE_MS";
pub const ENV_LOG: &str = "POLICY_DEDUP_LOG";

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "policy-dedup.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database holding the per-type policy tables
    pub database_path: PathBuf,

    /// HTTP listen address for the server binary
    pub bind_addr: String,

    /// Quiet period before a keystroke triggers a duplicate check
    pub debounce_ms: u64,

    /// tracing EnvFilter directive (RUST_LOG still wins when set)
    pub log_filter: String,

    /// Where the TUI writes its logs
    pub log_file: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("policies.db"),
            bind_addr: "0.0.0.0:3000".to_string(),
            debounce_ms: 300,
            log_filter: "info".to_string(),
            log_file: PathBuf::from("policy-dedup.log"),
        }
    }
}

impl AppConfig {
    /// Load config from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {:?}", path.as_ref()))?;

        Ok(config)
    }

    /// File if present (defaults otherwise), then environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE) {
            self.database_path = PathBuf::from(path);
        }

        if let Some(addr) = lookup(ENV_BIND) {
            self.bind_addr = addr;
        }

        if let Some(raw) = lookup(ENV_DEBOUNCE_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.debounce_ms = ms,
                Err(_) => warn!(
                    value = %raw,
                    "ignoring {}: not a number of milliseconds", ENV_DEBOUNCE_MS
                ),
            }
        }

        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
