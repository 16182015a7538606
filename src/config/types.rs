//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/lobstream/) and project (.lobstream/) level configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::constants::{lob, pool, registry};
use crate::lob::TextEncoding;
use crate::types::{LobError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Data source name resolution
    pub registry: RegistryConfig,

    /// Connection pool settings shared by every data source
    pub pool: PoolConfig,

    /// Streaming defaults
    pub transfer: TransferConfig,

    /// Named data sources
    pub data_sources: BTreeMap<String, DataSourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            registry: RegistryConfig::default(),
            pool: PoolConfig::default(),
            transfer: TransferConfig::default(),
            data_sources: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `LobError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 {
            return Err(LobError::Config(
                "transfer.chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.pool.max_size == 0 {
            return Err(LobError::Config(
                "pool.max_size must be greater than 0".to_string(),
            ));
        }

        if self.pool.min_idle > self.pool.max_size {
            return Err(LobError::Config(format!(
                "pool.min_idle ({}) cannot exceed pool.max_size ({})",
                self.pool.min_idle, self.pool.max_size
            )));
        }

        if self.pool.connection_timeout_secs == 0 {
            return Err(LobError::Config(
                "pool.connection_timeout_secs must be greater than 0".to_string(),
            ));
        }

        for (name, source) in &self.data_sources {
            if source.path.as_os_str().is_empty() {
                return Err(LobError::Config(format!(
                    "data source '{}' has an empty path",
                    name
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Registry Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Prefix tried after the bare name fails to resolve
    pub container_prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            container_prefix: registry::CONTAINER_PREFIX.to_string(),
        }
    }
}

// =============================================================================
// Pool Configuration
// =============================================================================

/// Connection pool configuration
///
/// Pool size is dynamically calculated based on CPU cores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections per data source
    pub max_size: u32,
    /// Minimum idle connections to keep ready
    pub min_idle: u32,
    /// Timeout for acquiring a connection (seconds)
    pub connection_timeout_secs: u64,
    /// SQLite busy timeout (milliseconds)
    pub busy_timeout_ms: u64,
}

impl PoolConfig {
    /// Calculate pool size based on available CPU cores
    ///
    /// Formula: clamp(cores, MIN, MAX)
    pub fn optimal_pool_size() -> u32 {
        let cores = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);

        cores.clamp(pool::MIN_POOL_SIZE, pool::MAX_POOL_SIZE)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: Self::optimal_pool_size(),
            min_idle: 0,
            connection_timeout_secs: pool::CONNECTION_TIMEOUT_SECS,
            busy_timeout_ms: pool::BUSY_TIMEOUT_MS,
        }
    }
}

// =============================================================================
// Transfer Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size hint handed out by begin_write/begin_read
    pub chunk_size: usize,
    /// Byte encoding of text payloads on the stream side
    pub text_encoding: TextEncoding,
    /// Module tag used when the caller does not supply one
    pub default_module: String,
    /// Data source used when the caller does not supply one
    pub default_data_source: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: lob::RECOMMENDED_CHUNK_SIZE,
            text_encoding: TextEncoding::default(),
            default_module: registry::DEFAULT_MODULE.to_string(),
            default_data_source: registry::DEFAULT_DATA_SOURCE.to_string(),
        }
    }
}

// =============================================================================
// Data Source Configuration
// =============================================================================

/// One named SQLite database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSourceConfig {
    /// Database file
    pub path: PathBuf,
    /// Create the file when it does not exist
    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,
}

fn default_create_if_missing() -> bool {
    true
}

impl DataSourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create_if_missing: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transfer.chunk_size, 32_768);
        assert_eq!(config.registry.container_prefix, "java:comp/env/");
    }

    #[test]
    fn test_validate_rejects_zero_chunk() {
        let mut config = Config::default();
        config.transfer.chunk_size = 0;
        assert!(matches!(config.validate(), Err(LobError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_min_idle_above_max() {
        let mut config = Config::default();
        config.pool.max_size = 2;
        config.pool.min_idle = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_size_bounds() {
        let size = PoolConfig::optimal_pool_size();
        assert!(size >= pool::MIN_POOL_SIZE);
        assert!(size <= pool::MAX_POOL_SIZE);
    }

    #[test]
    fn test_data_source_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [data_sources.defaultDataSource]
            path = "/tmp/app.db"

            [transfer]
            text_encoding = "latin1"
            "#,
        )
        .unwrap();
        let source = &config.data_sources["defaultDataSource"];
        assert_eq!(source.path, PathBuf::from("/tmp/app.db"));
        assert!(source.create_if_missing);
        assert_eq!(config.transfer.text_encoding, TextEncoding::Latin1);
    }
}
