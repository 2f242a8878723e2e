//! Server-side configuration.
//!
//! Reads `/etc/planwerk/<name>.toml` (or an explicit path).

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Storage section.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding all persistent state.
    pub data_dir: String,
}

/// Scheduler section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long an unconfirmed reservation holds its machine (seconds).
    pub reservation_ttl_secs: i64,
    /// How often the watchdog sweeps for lapsed reservations (seconds).
    pub expiry_check_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: 900,
            expiry_check_interval_secs: 30,
        }
    }
}

/// Server configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl ServerConfig {
    /// Resolve a context name or path to a config file path.
    ///
    /// A value containing `/` or `.` is used as a path directly; otherwise
    /// it resolves to `/etc/planwerk/<name>.toml`.
    pub fn resolve_path(name_or_path: &str) -> PathBuf {
        if name_or_path.contains('/') || name_or_path.contains('.') {
            PathBuf::from(name_or_path)
        } else {
            PathBuf::from("/etc/planwerk").join(format!("{name_or_path}.toml"))
        }
    }

    /// Load and validate configuration from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        let config: ServerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.storage.data_dir.is_empty() {
            anyhow::bail!("storage.data_dir is empty in configuration");
        }
        if self.scheduler.reservation_ttl_secs <= 0 {
            anyhow::bail!("scheduler.reservation_ttl_secs must be positive");
        }
        Ok(())
    }
}
