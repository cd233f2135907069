//! Configuration management for Relish.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (RELISH_ prefix, `__` section separator)
//! 2. Config file (relish.toml)
//! 3. Defaults

use serde::Deserialize;

/// Top-level Relish configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelishConfig {
    /// Database connection settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Object graph mapper defaults.
    #[serde(default)]
    pub mapper: MapperConfig,
}

/// Connection settings for the graph database backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Mapper defaults applied when the caller does not specify them.
#[derive(Debug, Clone, Deserialize)]
pub struct MapperConfig {
    /// Default load horizon in relationship hops.
    #[serde(default = "default_depth")]
    pub default_depth: u32,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_depth() -> u32 {
    1
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: String::new(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
        }
    }
}

impl RelishConfig {
    /// Load configuration from `relish.toml` (if present) and `RELISH_*`
    /// environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("relish.toml")
    }

    /// Load configuration from an explicit file path plus the environment.
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("RELISH").separator("__"))
            .build()?;
        let parsed: Self = cfg.try_deserialize()?;
        tracing::debug!(uri = %parsed.backend.uri, "Loaded Relish configuration");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = RelishConfig::default();
        assert_eq!(cfg.backend.uri, "bolt://localhost:7687");
        assert_eq!(cfg.backend.user, "neo4j");
        assert_eq!(cfg.backend.max_connections, 16);
        assert_eq!(cfg.mapper.default_depth, 1);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let cfg = RelishConfig::load_from("does-not-exist.toml").unwrap();
        assert_eq!(cfg.backend.fetch_size, 256);
    }
}
