use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for mirrorcache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Prefix of transport channel names (`<prefix>:<cache name>`)
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,

    /// Client mirror configuration
    #[serde(default)]
    pub mirror: MirrorConfig,

    /// In-process cache service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_channel_prefix() -> String {
    "cache".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_prefix: default_channel_prefix(),
            mirror: MirrorConfig::default(),
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Client mirror configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MirrorConfig {
    /// Inbound backlog size above which the mirror logs a warning
    #[serde(default = "default_mailbox_warn_depth")]
    pub mailbox_warn_depth: usize,
}

const fn default_mailbox_warn_depth() -> usize {
    1024
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            mailbox_warn_depth: default_mailbox_warn_depth(),
        }
    }
}

/// Cache service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServiceConfig {
    /// Answer a fetch for an unknown key with an `expiring` message
    #[serde(default = "default_true")]
    pub reply_expiring_on_miss: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            reply_expiring_on_miss: default_true(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
