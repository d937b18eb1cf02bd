//! Configuration management for the mailbox discovery API
//!
//! Loaded with figment: serialized defaults, then an optional `Config.toml`,
//! then `MAILFINDER_`-prefixed environment variables with `__` separating
//! nested keys (`MAILFINDER_PROBE__SMTP_PORT=2525`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use mailfinder_core::ProbeConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "MAILFINDER_";
pub const CONFIG_FILE: &str = "Config.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub probe: ProbeConfig,
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Upper bound accepted for a request's per-candidate timeout
    pub max_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_timeout_secs: 120,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable JSON structured logging
    pub json_logs: bool,
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            log_level: "debug".to_string(),
        }
    }
}

/// Figment with every configuration source layered in order
pub fn figment() -> Figment {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if Path::new(CONFIG_FILE).exists() {
        figment = figment.merge(Toml::file(CONFIG_FILE));
    }

    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load application configuration from environment and files
pub fn load_config() -> Result<AppConfig, figment::Error> {
    figment().extract()
}
