//! Server configuration: TOML file plus serde-level defaults.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use carebridge_bulk::BulkConfig;
use carebridge_store::{BreakerConfig, ClientConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub bulk: BulkConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.store.failure_threshold == 0 {
            return Err("store.failure_threshold must be > 0".into());
        }
        if self.store.open_duration_secs == 0 {
            return Err("store.open_duration_secs must be > 0".into());
        }
        if self.store.call_timeout_secs == 0 {
            return Err("store.call_timeout_secs must be > 0".into());
        }
        let level = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&level.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        self.bulk.validate()?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Settings for the resilient access client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Consecutive infrastructure failures before the circuit opens.
    pub failure_threshold: u32,
    /// Circuit cool-down in seconds.
    pub open_duration_secs: u64,
    /// TTL for cached search results, in seconds.
    pub cache_ttl_secs: u64,
    /// Per-call deadline, in seconds.
    pub call_timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration_secs: 60,
            cache_ttl_secs: 300,
            call_timeout_secs: 30,
        }
    }
}

impl StoreSettings {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            breaker: BreakerConfig {
                failure_threshold: self.failure_threshold,
                open_duration: Duration::from_secs(self.open_duration_secs),
            },
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load configuration from a TOML file.
///
/// With an explicit path the file must exist; without one, a missing
/// default file just yields the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, String> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            toml::from_str(&raw).map_err(|e| format!("invalid config {}: {e}", path.display()))?
        }
        None => AppConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
