// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - HTTP listener and admin token
// - Outbound auth scheme and replay window
// - Throttle, cache and lifecycle timing
// - Storage backend and seeded daemon configs
// - Logging

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::auth::AuthScheme;
use crate::domain::daemon::DaemonConfig;
use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "exapp-gateway/v1";
pub const KIND: &str = "GatewayConfig";
pub const CONFIG_PATH_ENV: &str = "EXAPP_GATEWAY_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "exapp-gateway/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GatewayConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    /// Daemon configs registered at startup
    #[serde(default)]
    pub daemons: Vec<DaemonConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_port() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Scheme used to sign outbound requests; inbound accepts both.
    #[serde(default = "default_outbound_scheme")]
    pub outbound_scheme: AuthScheme,

    /// Maximum age of an HMAC sign time
    #[serde(default = "default_replay_window", with = "humantime_serde")]
    pub replay_window: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { outbound_scheme: default_outbound_scheme(), replay_window: default_replay_window() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_throttle_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    #[serde(default = "default_throttle_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Failed attempts within `window` after which a client is rejected outright
    #[serde(default = "default_throttle_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_throttle_window", with = "humantime_serde")]
    pub window: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_delay: default_throttle_base_delay(),
            max_delay: default_throttle_max_delay(),
            max_attempts: default_throttle_max_attempts(),
            window: default_throttle_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, ttl: default_cache_ttl(), capacity: default_cache_capacity() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_heartbeat_interval", with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    #[serde(default = "default_heartbeat_max_attempts")]
    pub heartbeat_max_attempts: u32,

    /// Initialization older than this is failed by the timeout monitor
    #[serde(default = "default_init_timeout", with = "humantime_serde")]
    pub init_timeout: Duration,

    #[serde(default = "default_init_check_interval", with = "humantime_serde")]
    pub init_check_interval: Duration,

    #[serde(default = "default_init_workers")]
    pub init_workers: usize,

    #[serde(default = "default_init_queue_capacity")]
    pub init_queue_capacity: usize,

    #[serde(default = "default_init_retry_attempts")]
    pub init_retry_attempts: u32,

    #[serde(default = "default_init_retry_delay", with = "humantime_serde")]
    pub init_retry_delay: Duration,

    /// Default timeout for proxied calls
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Timeout for `PUT /enabled`
    #[serde(default = "default_enable_timeout", with = "humantime_serde")]
    pub enable_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            heartbeat_max_attempts: default_heartbeat_max_attempts(),
            init_timeout: default_init_timeout(),
            init_check_interval: default_init_check_interval(),
            init_workers: default_init_workers(),
            init_queue_capacity: default_init_queue_capacity(),
            init_retry_attempts: default_init_retry_attempts(),
            init_retry_delay: default_init_retry_delay(),
            request_timeout: default_request_timeout(),
            enable_timeout: default_enable_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "in_memory" or "postgres"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl StorageConfig {
    pub fn to_backend(&self) -> anyhow::Result<StorageBackend> {
        match self.backend.as_str() {
            "in_memory" => Ok(StorageBackend::InMemory),
            "postgres" => {
                let url = self
                    .database_url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("spec.storage.database_url is required for postgres"))?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: url,
                    max_connections: self.max_connections,
                }))
            }
            other => anyhow::bail!("Unknown storage backend '{}'. Use 'in_memory' or 'postgres'", other),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Bearer token for the admin API; the admin API is disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8780
}

fn default_outbound_scheme() -> AuthScheme {
    AuthScheme::Hmac
}

fn default_replay_window() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_throttle_base_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_throttle_max_delay() -> Duration {
    Duration::from_secs(25)
}

fn default_throttle_max_attempts() -> u32 {
    10
}

fn default_throttle_window() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_heartbeat_max_attempts() -> u32 {
    600
}

fn default_init_timeout() -> Duration {
    Duration::from_secs(40 * 60)
}

fn default_init_check_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_init_workers() -> usize {
    4
}

fn default_init_queue_capacity() -> usize {
    64
}

fn default_init_retry_attempts() -> u32 {
    3
}

fn default_init_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_enable_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_storage_backend() -> String {
    "in_memory".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata { name: "exapp-gateway".to_string(), labels: None },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. EXAPP_GATEWAY_CONFIG environment variable
    /// 2. ./exapp-gateway.yaml (working directory)
    /// 3. ~/.exapp-gateway/config.yaml (user home)
    /// 4. /etc/exapp-gateway/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./exapp-gateway.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".exapp-gateway").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/exapp-gateway/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("EXAPP_GATEWAY_DATABASE_URL") {
            tracing::info!("Environment override: EXAPP_GATEWAY_DATABASE_URL (storage backend -> postgres)");
            self.spec.storage.backend = "postgres".to_string();
            self.spec.storage.database_url = Some(url);
        }

        if let Ok(token) = std::env::var("EXAPP_GATEWAY_ADMIN_TOKEN") {
            tracing::info!("Environment override: EXAPP_GATEWAY_ADMIN_TOKEN");
            self.spec.admin.token = Some(token);
        }

        if let Ok(val) = std::env::var("EXAPP_GATEWAY_OUTBOUND_SCHEME") {
            match val.to_lowercase().as_str() {
                "simple" => self.spec.auth.outbound_scheme = AuthScheme::Simple,
                "hmac" => self.spec.auth.outbound_scheme = AuthScheme::Hmac,
                _ => tracing::warn!(
                    "Invalid value for EXAPP_GATEWAY_OUTBOUND_SCHEME: '{}'. Expected simple/hmac. Ignoring.",
                    val
                ),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        self.spec.storage.to_backend()?;

        if self.spec.auth.replay_window.is_zero() {
            anyhow::bail!("spec.auth.replay_window must be greater than zero");
        }

        if self.spec.throttle.max_attempts == 0 {
            anyhow::bail!("spec.throttle.max_attempts must be at least 1");
        }

        let lifecycle = &self.spec.lifecycle;
        if lifecycle.init_workers == 0 {
            anyhow::bail!("spec.lifecycle.init_workers must be at least 1");
        }
        if lifecycle.init_queue_capacity == 0 {
            anyhow::bail!("spec.lifecycle.init_queue_capacity must be at least 1");
        }
        if lifecycle.heartbeat_max_attempts == 0 {
            anyhow::bail!("spec.lifecycle.heartbeat_max_attempts must be at least 1");
        }

        if let Some(token) = &self.spec.admin.token {
            if token.len() < 16 {
                anyhow::bail!("spec.admin.token must be at least 16 characters");
            }
        }

        for daemon in &self.spec.daemons {
            if daemon.name.is_empty() {
                anyhow::bail!("Daemon name cannot be empty");
            }
            if daemon.protocol != "http" && daemon.protocol != "https" {
                anyhow::bail!("Daemon '{}' protocol must be http or https", daemon.name);
            }
        }

        match self.spec.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("Invalid logging format '{}'. Use 'text' or 'json'", other),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
apiVersion: exapp-gateway/v1
kind: GatewayConfig
metadata:
  name: edge-1
spec:
  server:
    port: 9000
  auth:
    outbound_scheme: simple
    replay_window: 2m
  lifecycle:
    init_timeout: 10m
    init_workers: 2
  storage:
    backend: in_memory
  daemons:
    - name: docker_local
      protocol: http
      host: /var/run/docker.sock
      deploy_config:
        net: host
"#;

    #[test]
    fn parses_manifest_with_defaults() {
        let config = GatewayConfigManifest::from_yaml_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.spec.server.port, 9000);
        assert_eq!(config.spec.server.bind_address, "0.0.0.0");
        assert_eq!(config.spec.auth.outbound_scheme, AuthScheme::Simple);
        assert_eq!(config.spec.auth.replay_window, Duration::from_secs(120));
        assert_eq!(config.spec.lifecycle.init_timeout, Duration::from_secs(600));
        assert_eq!(config.spec.lifecycle.heartbeat_max_attempts, 600);
        assert_eq!(config.spec.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.spec.daemons[0].deploy_config.net.as_deref(), Some("host"));
    }

    #[test]
    fn default_manifest_is_valid() {
        GatewayConfigManifest::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_kind_and_backend() {
        let mut config = GatewayConfigManifest::default();
        config.kind = "NodeConfig".into();
        assert!(config.validate().is_err());

        let mut config = GatewayConfigManifest::default();
        config.spec.storage.backend = "postgres".into();
        assert!(config.validate().is_err());
        config.spec.storage.database_url = Some("postgres://localhost/gw".into());
        config.validate().unwrap();
    }

    #[test]
    fn yaml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.yaml");
        let mut config = GatewayConfigManifest::default();
        config.spec.server.port = 1234;
        config.to_yaml_file(&path).unwrap();
        let loaded = GatewayConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.spec.server.port, 1234);
    }

    #[test]
    fn explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GatewayConfigManifest::load_or_default(Some(dir.path().join("nope.yaml"))).is_err());
    }
}
