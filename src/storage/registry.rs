//! Named-resource registry
//!
//! Maps logical data source names to concrete database locations. The
//! connection pool consults it once per name and caches the result.

use std::collections::BTreeMap;

use crate::config::{Config, DataSourceConfig};

/// Directory service that resolves logical names to data sources.
pub trait ResourceRegistry: Send + Sync {
    /// Look up an exact registry name
    fn lookup(&self, name: &str) -> Option<DataSourceConfig>;

    /// Registered names, for diagnostics
    fn names(&self) -> Vec<String>;
}

/// Registry backed by the `data_sources` section of the configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    entries: BTreeMap<String, DataSourceConfig>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            entries: config.data_sources.clone(),
        }
    }

    /// Register (or replace) an entry
    pub fn with_entry(mut self, name: impl Into<String>, source: DataSourceConfig) -> Self {
        self.entries.insert(name.into(), source);
        self
    }
}

impl ResourceRegistry for StaticRegistry {
    fn lookup(&self, name: &str) -> Option<DataSourceConfig> {
        self.entries.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}
