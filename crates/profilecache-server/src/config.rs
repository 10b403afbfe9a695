use profilecache_core::{HashSchema, KeySpace};
use profilecache_storage::RedisOptions;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Profile record store selection and layout
    #[serde(default)]
    pub store: StoreConfig,
    /// Redis configuration (used when `store.backend = "redis"`)
    #[serde(default)]
    pub redis: RedisConfig,
    /// Identity provider used to populate cache misses
    #[serde(default)]
    pub identity_provider: IdentityProviderConfig,
    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        // Store validations
        if self.store.key_prefix.is_empty() {
            return Err("store.key_prefix must not be empty".into());
        }
        self.store
            .fields
            .validate()
            .map_err(|e| format!("store.fields: {e}"))?;
        if self.store.backend == StoreBackend::Redis {
            if self.redis.url.is_empty() {
                return Err("redis.url must not be empty".into());
            }
            if self.redis.pool_size == 0 {
                return Err("redis.pool_size must be > 0".into());
            }
        }
        // Identity provider validation
        let url = &self.identity_provider.profile_url;
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err("identity_provider.profile_url must be an http(s) URL".into());
        }
        if !url.contains("{subject}") {
            return Err("identity_provider.profile_url must contain the {subject} placeholder".into());
        }
        // Leaderboard validation
        if self.leaderboard.limit == 0 {
            return Err("leaderboard.limit must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deadline for a whole request, including store and provider round trips
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}
fn default_request_timeout_ms() -> u64 {
    15_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Which [`KvStore`](profilecache_storage::KvStore) backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    /// Process-local map, lost on restart
    Memory,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Redis => write!(f, "redis"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Prefix of every profile key; a subject lives at `{key_prefix}{subject}`
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Hash field names of a stored profile
    #[serde(default)]
    pub fields: HashSchema,
}

fn default_key_prefix() -> String {
    "user:".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            key_prefix: default_key_prefix(),
            fields: HashSchema::default(),
        }
    }
}

impl StoreConfig {
    pub fn key_space(&self) -> KeySpace {
        KeySpace::new(self.key_prefix.clone())
    }
}

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

impl RedisConfig {
    pub fn options(&self) -> RedisOptions {
        RedisOptions {
            url: self.url.clone(),
            pool_size: self.pool_size,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Identity provider (user directory) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
    /// User document URL; `{subject}` is replaced by the percent-encoded subject
    #[serde(default = "default_profile_url")]
    pub profile_url: String,

    /// Bearer token sent with every request.
    /// For security, prefer PROFILECACHE__IDENTITY_PROVIDER__TOKEN or TOKEN env vars
    #[serde(default)]
    pub token: Option<String>,
}

fn default_profile_url() -> String {
    "https://tenant.auth0.com/api/v2/users/{subject}".into()
}

impl Default for IdentityProviderConfig {
    fn default() -> Self {
        Self {
            profile_url: default_profile_url(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    /// Number of entries returned by /top-scores
    #[serde(default = "default_leaderboard_limit")]
    pub limit: usize,
}

fn default_leaderboard_limit() -> usize {
    10
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            limit: default_leaderboard_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Deployment variables predating the `PROFILECACHE__` scheme, mapped to config keys.
    ///
    /// `REDIS_HOSTNAME`, `REDIS_PORT` and `REDIS_PASSWORD` compose `redis.url`.
    pub fn legacy_overrides(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Vec<(&'static str, String)> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let mut overrides = Vec::new();

        if let Some(port) = get("PORT") {
            overrides.push(("server.port", port));
        }
        if let Some(host) = get("REDIS_HOSTNAME") {
            let port = get("REDIS_PORT").unwrap_or_else(|| "6379".to_string());
            let url = match get("REDIS_PASSWORD") {
                Some(password) => format!(
                    "redis://:{}@{host}:{port}",
                    urlencoding::encode(&password)
                ),
                None => format!("redis://{host}:{port}"),
            };
            overrides.push(("redis.url", url));
        }
        if let Some(token) = get("TOKEN") {
            overrides.push(("identity_provider.token", token));
        }
        overrides
    }

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("profilecache.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., PROFILECACHE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("PROFILECACHE")
                .try_parsing(true)
                .separator("__"),
        );
        // Legacy deployment variables win when present
        for (key, value) in legacy_overrides(|name| std::env::var(name).ok()) {
            builder = builder
                .set_override(key, value)
                .map_err(|e| format!("config override error for {key}: {e}"))?;
        }
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::loader::legacy_overrides;
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.store.key_prefix, "user:");
        assert_eq!(cfg.leaderboard.limit, 10);
        assert_eq!(cfg.store.backend, StoreBackend::Redis);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = AppConfig::default();
        cfg.leaderboard.limit = 0;
        assert!(cfg.validate().unwrap_err().contains("leaderboard.limit"));

        let mut cfg = AppConfig::default();
        cfg.identity_provider.profile_url = "https://idp.example/users".into();
        assert!(cfg.validate().unwrap_err().contains("{subject}"));

        let mut cfg = AppConfig::default();
        cfg.store.key_prefix = String::new();
        assert!(cfg.validate().unwrap_err().contains("key_prefix"));

        let mut cfg = AppConfig::default();
        cfg.store.fields.score = "nickname".into();
        assert!(cfg.validate().unwrap_err().contains("store.fields"));

        let mut cfg = AppConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().unwrap_err().contains("logging.level"));
    }

    #[test]
    fn redis_settings_are_ignored_for_memory_backend() {
        let mut cfg = AppConfig::default();
        cfg.store.backend = StoreBackend::Memory;
        cfg.redis.pool_size = 0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn legacy_overrides_compose_redis_url() {
        let overrides = legacy_overrides(lookup(&[
            ("PORT", "8080"),
            ("REDIS_HOSTNAME", "cache.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "p@ss word"),
            ("TOKEN", "secret"),
        ]));
        assert_eq!(
            overrides,
            vec![
                ("server.port", "8080".to_string()),
                ("redis.url", "redis://:p%40ss%20word@cache.internal:6380".to_string()),
                ("identity_provider.token", "secret".to_string()),
            ]
        );
    }

    #[test]
    fn legacy_overrides_skip_unset_and_empty_values() {
        assert!(legacy_overrides(lookup(&[])).is_empty());
        assert!(legacy_overrides(lookup(&[("PORT", ""), ("REDIS_PORT", "6380")])).is_empty());

        let overrides = legacy_overrides(lookup(&[("REDIS_HOSTNAME", "localhost")]));
        assert_eq!(
            overrides,
            vec![("redis.url", "redis://localhost:6379".to_string())]
        );
    }
}
