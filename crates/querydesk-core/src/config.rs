use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// Top-level configuration for querydesk.
///
/// Loaded from `~/.querydesk/config.toml` by default. Every section is
/// optional in the file; missing sections and keys take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuerydeskConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

impl QuerydeskConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: QuerydeskConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Query construction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Row limit applied when the entities carry none.
    pub default_limit: u32,
    /// Upper bound for entity-supplied limits.
    pub max_limit: u32,
    /// Model identifier used only when the schema document omits one.
    pub fallback_model: String,
    /// View identifier used only when the schema document omits one.
    pub fallback_view: String,
    /// Offset from UTC, in minutes, that decides "today" for relative
    /// timeframes such as `yesterday` or `mtd`.
    pub utc_offset_minutes: i32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 500,
            fallback_model: "default_model".to_string(),
            fallback_view: "default_explore".to_string(),
            utc_offset_minutes: 0,
        }
    }
}

/// Per-user conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of turns retained per user; older turns are evicted first.
    pub capacity: usize,
    /// Users idle for longer than this are dropped by `evict_idle`.
    pub idle_timeout_minutes: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            idle_timeout_minutes: 60,
        }
    }
}

/// Intent router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Whether the router accepts turns at all.
    pub enabled: bool,
    /// Timeout applied to each backend call.
    pub backend_timeout_secs: u64,
    /// Rows copied into a result summary as a preview.
    pub summary_preview_rows: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend_timeout_secs: 30,
            summary_preview_rows: 5,
        }
    }
}
