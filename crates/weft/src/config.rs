//! Fabric configuration, loaded from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{WeftError, WeftResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 64-hex-character shared signing secret. Empty means a fresh random
    /// key is generated at startup (tokens then die with the process).
    #[serde(default)]
    pub shared_secret_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEndpointConfig {
    #[serde(default = "default_registry_bind")]
    pub bind: String,

    #[serde(default = "default_registry_name")]
    pub server_name: String,

    /// Records older than this many seconds vanish from lookups.
    #[serde(default)]
    pub max_record_age_secs: Option<u64>,
}

fn default_registry_bind() -> String {
    "127.0.0.1:50050".to_string()
}

fn default_registry_name() -> String {
    "RegistryServer".to_string()
}

impl Default for RegistryEndpointConfig {
    fn default() -> Self {
        Self {
            bind: default_registry_bind(),
            server_name: default_registry_name(),
            max_record_age_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEndpointConfig {
    #[serde(default = "default_context_bind")]
    pub bind: String,

    #[serde(default = "default_context_name")]
    pub server_name: String,

    #[serde(default = "default_context_scope")]
    pub context_scope: String,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    #[serde(default = "default_breaker_recovery")]
    pub breaker_recovery_secs: u64,

    #[serde(default = "default_queue_depth")]
    pub stream_queue_depth: usize,

    /// Sqlite file backing the context store; in-memory when absent.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

fn default_context_bind() -> String {
    "127.0.0.1:50051".to_string()
}

fn default_context_name() -> String {
    "ContextToolServer".to_string()
}

fn default_context_scope() -> String {
    "db:inventory:read".to_string()
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_cache_max_entries() -> usize {
    1024
}

fn default_breaker_threshold() -> u32 {
    3
}

fn default_breaker_recovery() -> u64 {
    30
}

fn default_queue_depth() -> usize {
    64
}

impl Default for ContextEndpointConfig {
    fn default() -> Self {
        Self {
            bind: default_context_bind(),
            server_name: default_context_name(),
            context_scope: default_context_scope(),
            cache_ttl_secs: default_cache_ttl(),
            cache_max_entries: default_cache_max_entries(),
            breaker_threshold: default_breaker_threshold(),
            breaker_recovery_secs: default_breaker_recovery(),
            stream_queue_depth: default_queue_depth(),
            store_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEndpointConfig {
    #[serde(default = "default_bus_bind")]
    pub bind: String,

    #[serde(default = "default_bus_name")]
    pub server_name: String,

    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_bus_bind() -> String {
    "127.0.0.1:50052".to_string()
}

fn default_bus_name() -> String {
    "EventBusServer".to_string()
}

impl Default for BusEndpointConfig {
    fn default() -> Self {
        Self {
            bind: default_bus_bind(),
            server_name: default_bus_name(),
            queue_depth: default_queue_depth(),
        }
    }
}

/// Top-level configuration for the weft binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeftConfig {
    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub registry: RegistryEndpointConfig,

    #[serde(default)]
    pub context: ContextEndpointConfig,

    #[serde(default)]
    pub bus: BusEndpointConfig,

    /// Seed demo context data and run the demo telemetry publisher.
    #[serde(default)]
    pub demo: bool,
}

impl WeftConfig {
    /// Load configuration from a TOML file. A missing file yields the
    /// default configuration.
    pub fn load(path: &Path) -> WeftResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(WeftError::Io)?;
        let config: WeftConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> WeftResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| WeftError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(WeftError::Io)?;
        }
        std::fs::write(path, contents).map_err(WeftError::Io)?;
        Ok(())
    }

    pub fn validate(&self) -> WeftResult<()> {
        if !self.auth.shared_secret_hex.is_empty()
            && weft_cred::SigningKey::from_hex(&self.auth.shared_secret_hex).is_err()
        {
            return Err(WeftError::Config(
                "shared_secret_hex must be 64 hex characters".into(),
            ));
        }
        if self.context.cache_ttl_secs == 0 {
            return Err(WeftError::Config("cache_ttl_secs must be > 0".into()));
        }
        if self.context.breaker_threshold == 0 {
            return Err(WeftError::Config("breaker_threshold must be > 0".into()));
        }
        for (name, bind) in [
            ("registry", &self.registry.bind),
            ("context", &self.context.bind),
            ("bus", &self.bus.bind),
        ] {
            if bind.is_empty() {
                return Err(WeftError::Config(format!("{} bind must not be empty", name)));
            }
        }
        Ok(())
    }

    /// Default config file location: `$HOME/.weft/config.toml`.
    pub fn default_config_path() -> PathBuf {
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".weft/config.toml"))
            .unwrap_or_else(|_| PathBuf::from(".weft/config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WeftConfig::default();
        assert_eq!(config.registry.bind, "127.0.0.1:50050");
        assert_eq!(config.registry.server_name, "RegistryServer");
        assert_eq!(config.context.server_name, "ContextToolServer");
        assert_eq!(config.context.context_scope, "db:inventory:read");
        assert_eq!(config.context.cache_ttl_secs, 60);
        assert_eq!(config.context.breaker_threshold, 3);
        assert_eq!(config.bus.server_name, "EventBusServer");
        assert!(!config.demo);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
demo = true

[auth]
shared_secret_hex = "4242424242424242424242424242424242424242424242424242424242424242"

[registry]
bind = "0.0.0.0:6000"
max_record_age_secs = 600

[context]
bind = "0.0.0.0:6001"
server_name = "InventoryDB_Primary"
cache_ttl_secs = 30

[bus]
bind = "0.0.0.0:6002"
"#;
        let config: WeftConfig = toml::from_str(toml_str).unwrap();
        assert!(config.demo);
        assert_eq!(config.registry.bind, "0.0.0.0:6000");
        assert_eq!(config.registry.max_record_age_secs, Some(600));
        assert_eq!(config.context.server_name, "InventoryDB_Primary");
        assert_eq!(config.context.cache_ttl_secs, 30);
        // Unspecified fields keep their defaults.
        assert_eq!(config.context.breaker_threshold, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_secret() {
        let mut config = WeftConfig::default();
        config.auth.shared_secret_hex = "abc".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_ttl() {
        let mut config = WeftConfig::default();
        config.context.cache_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_threshold() {
        let mut config = WeftConfig::default();
        config.context.breaker_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_bind() {
        let mut config = WeftConfig::default();
        config.bus.bind = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = WeftConfig::load(Path::new("/nonexistent/weft.toml")).unwrap();
        assert_eq!(config.registry.server_name, "RegistryServer");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join("weft-test-config");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("config.toml");

        let mut config = WeftConfig::default();
        config.context.server_name = "InventoryDB_Primary".into();
        config.save(&path).unwrap();

        let loaded = WeftConfig::load(&path).unwrap();
        assert_eq!(loaded.context.server_name, "InventoryDB_Primary");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
