use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub prober: ProberConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis endpoint; absent means the in-process TTL cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_upstream_timeout")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub default_retry_attempts: u32,
    /// Token estimation ratio used when upstream omits usage counts.
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_multiplier")]
    pub default_multiplier: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProberConfig {
    #[serde(default = "default_prober_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_sweeper_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_sweeper_batch")]
    pub batch_size: i64,
    /// Records younger than this are left for the request path to settle.
    #[serde(default = "default_sweeper_grace")]
    pub grace_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_database_url() -> String {
    "sqlite://gateway.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_busy_timeout() -> u64 {
    30
}

fn default_run_migrations() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    120
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_chars_per_token() -> u32 {
    4
}

fn default_multiplier() -> Decimal {
    Decimal::new(15, 1)
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_prober_interval() -> u64 {
    15
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_sweeper_interval() -> u64 {
    60
}

fn default_sweeper_batch() -> i64 {
    100
}

fn default_sweeper_grace() -> i64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
            run_migrations: default_run_migrations(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_upstream_timeout(),
            default_retry_attempts: default_retry_attempts(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_multiplier: default_multiplier(),
            currency: default_currency(),
        }
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_prober_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweeper_interval(),
            batch_size: default_sweeper_batch(),
            grace_secs: default_sweeper_grace(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            server: ServerConfig::default(),
            proxy: ProxyConfig::default(),
            pricing: PricingConfig::default(),
            prober: ProberConfig::default(),
            sweeper: SweeperConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides; used when no file is given.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Environment variables override file values.
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("GATEWAY_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(url) = std::env::var("GATEWAY_REDIS_URL") {
            self.cache.redis_url = Some(url);
        }
        if let Ok(bind) = std::env::var("GATEWAY_BIND") {
            self.server.bind = bind;
        }
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(level) = std::env::var("GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}
