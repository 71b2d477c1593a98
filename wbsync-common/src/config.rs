//! Bootstrap configuration
//!
//! Settings sources, highest priority first:
//!
//! 1. Command-line arguments / environment variables (applied by the binary
//!    through [`BootstrapOverrides`])
//! 2. TOML configuration file
//! 3. Built-in defaults (code constants)
//!
//! A missing TOML file is not an error: the service logs a warning and starts
//! with defaults. A file that exists but cannot be parsed is a `Config` error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default Wildberries card API host
pub const DEFAULT_CATALOG_BASE_URL: &str = "https://card.wb.ru";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime; restart to pick up changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Bind address for the HTTP server
    pub host: String,

    /// HTTP server port
    pub port: u16,

    /// Path to SQLite database file
    pub database_path: PathBuf,

    pub catalog: CatalogConfig,

    pub scheduler: SchedulerConfig,

    pub bot: BotConfig,

    pub logging: LoggingConfig,
}

/// Upstream catalog API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Scheme + host of the card API, without trailing slash
    pub base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Total attempts per fetch (first try included)
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay_secs: u64,
}

/// Recurring refresh settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub refresh_interval_secs: u64,
}

/// Chat bot settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Telegram bot token; the bot is disabled when absent
    pub token: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            database_path: default_database_path(),
            catalog: CatalogConfig::default(),
            scheduler: SchedulerConfig::default(),
            bot: BotConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            timeout_secs: 10,
            max_attempts: 3,
            retry_delay_secs: 2,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30 * 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl SchedulerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct BootstrapOverrides {
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
    pub bot_token: Option<String>,
}

impl TomlConfig {
    /// Load configuration from `path`, or from the platform default location
    /// when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => {
                    warn!("Could not determine config directory, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI/env values on top of file values
    pub fn apply_overrides(&mut self, overrides: BootstrapOverrides) {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(path) = overrides.database_path {
            self.database_path = path;
        }
        if let Some(token) = overrides.bot_token {
            self.bot.token = Some(token);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.catalog.max_attempts == 0 {
            return Err(Error::Config(
                "catalog.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.scheduler.refresh_interval_secs == 0 {
            return Err(Error::Config(
                "scheduler.refresh_interval_secs must be positive".to_string(),
            ));
        }
        if self.catalog.base_url.trim().is_empty() {
            return Err(Error::Config("catalog.base_url is empty".to_string()));
        }
        Ok(())
    }
}

/// `~/.config/wbsync/config.toml` (or the platform equivalent)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wbsync").join("config.toml"))
}

/// `~/.local/share/wbsync/wbsync.db` (or the platform equivalent)
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("wbsync"))
        .unwrap_or_else(|| PathBuf::from("./wbsync_data"))
        .join("wbsync.db")
}
