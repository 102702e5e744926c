//! Configuration schema for Stratus
//!
//! Configuration is stored at `~/.config/stratus/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache engine settings
    pub cache: CacheSettings,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Cache engine settings, one set per engine instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Root of the local staging directory (required)
    pub local_dir: PathBuf,

    /// Namespace prepended to every remote key
    pub key_prefix: String,

    /// Objects smaller than this many bytes are not uploaded
    pub min_upload_size: u64,

    /// Maximum concurrent background uploads (0 = number of CPUs)
    pub upload_concurrency: usize,

    /// Module adapter fault-in and write-back concurrency (0 = number of CPUs)
    pub max_tasks: usize,

    /// Emit per-request B/E/F/W trace lines
    pub log_requests: bool,

    /// Remove staged files older than this many days at close (0 = disabled)
    pub expiration_days: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::new(),
            key_prefix: String::new(),
            min_upload_size: 0,
            upload_concurrency: 0,
            max_tasks: 0,
            log_requests: false,
            expiration_days: 0,
        }
    }
}

impl CacheSettings {
    /// Cleanup age derived from `expiration_days`, `None` when disabled
    pub fn expiration(&self) -> Option<Duration> {
        if self.expiration_days == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.expiration_days) * 24 * 3600))
        }
    }
}
