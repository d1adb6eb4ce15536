//! Configuration schema for flagcache
//!
//! Configuration is stored at `~/.config/flagcache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Persistent asset cache settings
    pub cache: CacheConfig,

    /// Asset download settings
    pub fetch: FetchConfig,

    /// Mutation batching settings
    pub batcher: BatcherConfig,

    /// Generated markup settings
    pub markup: MarkupConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Persistent asset cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries older than this many days are pruned on load
    pub ttl_days: u32,

    /// Name of the single persisted record holding all entries
    pub record_key: String,

    /// Store directory (defaults to the state directory)
    pub dir: Option<PathBuf>,
}

impl CacheConfig {
    /// TTL as a chrono duration
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.ttl_days))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: 14,
            record_key: "flag_asset_cache".to_string(),
            dir: None,
        }
    }
}

/// Asset download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// URL prefix; the resource key and extension are appended
    pub base_url: String,

    /// File extension appended after the resource key
    pub extension: String,
}

impl FetchConfig {
    /// Build the download URL for a resource key
    pub fn asset_url(&self, key: &str) -> String {
        format!("{}{}{}", self.base_url, key, self.extension)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cdn.jsdelivr.net/gh/jdecked/twemoji@16.0.1/assets/svg/".to_string(),
            extension: ".svg".to_string(),
        }
    }
}

/// Mutation batching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Notification batches rescanned immediately before debouncing kicks in
    pub debounce_threshold: usize,

    /// Quiet period before a debounced batch is rescanned
    pub debounce_delay_ms: u64,
}

impl BatcherConfig {
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            debounce_threshold: 50,
            debounce_delay_ms: 10,
        }
    }
}

/// Generated markup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkupConfig {
    /// Class applied to placeholders awaiting resolution
    pub marker_class: String,
}

impl MarkupConfig {
    /// Class applied once a placeholder shows its resolved asset
    pub fn resolved_class(&self) -> String {
        format!("P-{}", self.marker_class)
    }
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            marker_class: "fc-flag".to_string(),
        }
    }
}
