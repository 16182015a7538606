//! Connection Pool
//!
//! Resolves a named data source to a live connection:
//! - Thread-safe name → data source cache (insert-if-absent, no eviction)
//! - Registry lookup by bare name, then by container-prefixed name
//! - One r2d2 pool per resolved data source

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use super::connection::DbConnection;
use super::registry::{ResourceRegistry, StaticRegistry};
use crate::config::{Config, DataSourceConfig, PoolConfig};
use crate::types::{DataSourceName, LobError, Result};

/// Resolved data source: a pool of connections to one database.
#[derive(Clone)]
pub struct DataSource {
    registry_name: String,
    pool: Pool<SqliteConnectionManager>,
}

impl DataSource {
    /// Name under which the registry knew this data source
    pub fn registry_name(&self) -> &str {
        &self.registry_name
    }

    /// Connections currently open (idle + checked out)
    pub fn connections(&self) -> u32 {
        self.pool.state().connections
    }

    /// Connections sitting in the pool, not checked out by any context
    pub fn idle_connections(&self) -> u32 {
        self.pool.state().idle_connections
    }
}

pub struct ConnectionPool {
    registry: Arc<dyn ResourceRegistry>,
    container_prefix: String,
    settings: PoolConfig,
    data_sources: DashMap<String, DataSource>,
}

impl ConnectionPool {
    pub fn new(
        registry: Arc<dyn ResourceRegistry>,
        container_prefix: impl Into<String>,
        settings: PoolConfig,
    ) -> Self {
        Self {
            registry,
            container_prefix: container_prefix.into(),
            settings,
            data_sources: DashMap::new(),
        }
    }

    /// Build a pool whose registry is the configuration's `data_sources` table
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(StaticRegistry::from_config(config)),
            config.registry.container_prefix.clone(),
            config.pool.clone(),
        )
    }

    /// Open a connection with auto-commit off
    pub fn create_connection(&self, name: &str) -> Result<DbConnection> {
        self.create_connection_with(name, false)
    }

    /// Open a connection with the requested auto-commit mode
    pub fn create_connection_with(&self, name: &str, auto_commit: bool) -> Result<DbConnection> {
        tracing::trace!("BEGIN create_connection({})", name);

        let data_source = self.resolve(name)?;
        let conn = data_source.pool.get().map_err(|e| {
            tracing::error!("Connection creation error for '{}': {}", name, e);
            LobError::Connection {
                data_source: name.to_string(),
                source: e,
            }
        })?;

        tracing::trace!("END create_connection({})", name);
        Ok(DbConnection::new(conn, name, auto_commit))
    }

    /// Resolve a name through the cache, falling back to the registry
    pub fn resolve(&self, name: &str) -> Result<DataSource> {
        if let Some(cached) = self.data_sources.get(name) {
            return Ok(cached.clone());
        }

        let (registry_name, source) = self.lookup(name)?;
        let data_source = DataSource {
            pool: self.build_pool(name, &source)?,
            registry_name,
        };

        // A concurrent caller may have won the race; keep whichever landed first.
        let entry = self
            .data_sources
            .entry(name.to_string())
            .or_insert(data_source);
        Ok(entry.clone())
    }

    fn lookup(&self, name: &str) -> Result<(String, DataSourceConfig)> {
        if let Some(source) = self.registry.lookup(name) {
            tracing::trace!("Successful lookup for {}", name);
            return Ok((name.to_string(), source));
        }

        let prefixed = DataSourceName::from(name).prefixed(&self.container_prefix);
        tracing::trace!("Failed lookup for '{}', try now '{}'", name, prefixed);
        match self.registry.lookup(&prefixed) {
            Some(source) => {
                tracing::trace!("Successful lookup for {}", prefixed);
                Ok((prefixed, source))
            }
            None => {
                tracing::error!("DataSource '{}' not found", name);
                Err(LobError::Configuration(name.to_string()))
            }
        }
    }

    fn build_pool(
        &self,
        name: &str,
        source: &DataSourceConfig,
    ) -> Result<Pool<SqliteConnectionManager>> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if source.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let busy_timeout_ms = self.settings.busy_timeout_ms;
        let manager = SqliteConnectionManager::file(&source.path)
            .with_flags(flags)
            .with_init(move |conn| Self::configure_connection(conn, busy_timeout_ms));

        Pool::builder()
            .max_size(self.settings.max_size)
            .min_idle(Some(self.settings.min_idle))
            .connection_timeout(Duration::from_secs(self.settings.connection_timeout_secs))
            .build(manager)
            .map_err(|e| {
                tracing::error!("Failed to create connection pool for '{}': {}", name, e);
                LobError::Connection {
                    data_source: name.to_string(),
                    source: e,
                }
            })
    }

    /// Configure a new connection with production-ready settings.
    fn configure_connection(
        conn: &mut Connection,
        busy_timeout_ms: u64,
    ) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = {};
            "#,
            busy_timeout_ms
        ))?;
        Ok(())
    }

    /// Names currently held in the resolution cache
    pub fn cached_data_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .data_sources
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("container_prefix", &self.container_prefix)
            .field("cached", &self.cached_data_sources())
            .finish()
    }
}
