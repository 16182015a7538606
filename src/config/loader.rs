//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/lobstream/config.toml)
//! 3. Project config (.lobstream/config.toml)
//! 4. Environment variables (LOBSTREAM_* prefix, `__` separates sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{LobError, Result};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .map_err(|e| LobError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Build the layered figment without extracting it
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // e.g. LOBSTREAM_TRANSFER__CHUNK_SIZE -> transfer.chunk_size
        figment.merge(Env::prefixed("LOBSTREAM_").split("__").lowercase(true))
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| LobError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/lobstream/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("lobstream"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".lobstream")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Render the effective configuration as JSON or TOML
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            serde_json::to_string_pretty(config).map_err(|e| LobError::Config(e.to_string()))
        } else {
            toml::to_string_pretty(config).map_err(|e| LobError::Config(e.to_string()))
        }
    }

    /// Show current effective configuration
    pub fn show_config(as_json: bool) -> Result<()> {
        let config = Self::load()?;
        println!("{}", Self::render(&config, as_json)?);
        Ok(())
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize project configuration
    pub fn init_project(force: bool) -> Result<PathBuf> {
        let project_dir = Self::project_dir();
        fs::create_dir_all(&project_dir)?;

        let config_path = Self::project_config_path();
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_project_config())?;
            info!("Created project config: {}", config_path.display());
        } else {
            info!("Project config exists: {}", config_path.display());
        }

        Ok(project_dir)
    }

    /// Generate default project config content (TOML)
    fn default_project_config() -> String {
        r#"# lobstream project configuration
# Environment variables (LOBSTREAM_SECTION__KEY) override these values.

version = "1.0"

[registry]
container_prefix = "java:comp/env/"

[transfer]
chunk_size = 32768
text_encoding = "utf-8"
default_module = "lobstream"
default_data_source = "defaultDataSource"

[data_sources.defaultDataSource]
path = ".lobstream/data.db"
create_if_missing = true
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lob::TextEncoding;
    use figment::Jail;

    #[test]
    fn test_load_default_config() {
        Jail::expect_with(|jail| {
            jail.set_env("XDG_CONFIG_HOME", jail.directory().display().to_string());
            let config = ConfigLoader::load().expect("defaults should load");
            assert_eq!(config.version, "1.0");
            assert!(config.data_sources.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_project_file_and_env_override() {
        Jail::expect_with(|jail| {
            jail.set_env("XDG_CONFIG_HOME", jail.directory().display().to_string());
            jail.create_dir(".lobstream")?;
            jail.create_file(
                ".lobstream/config.toml",
                r#"
                [transfer]
                chunk_size = 4096
                text_encoding = "iso-8859-1"

                [data_sources.reports]
                path = "reports.db"
                "#,
            )?;
            jail.set_env("LOBSTREAM_TRANSFER__CHUNK_SIZE", "1024");

            let config = ConfigLoader::load().expect("layered config should load");
            assert_eq!(config.transfer.chunk_size, 1024);
            assert_eq!(config.transfer.text_encoding, TextEncoding::Latin1);
            assert_eq!(
                config.data_sources["reports"].path,
                PathBuf::from("reports.db")
            );
            Ok(())
        });
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("XDG_CONFIG_HOME", jail.directory().display().to_string());
            jail.set_env("LOBSTREAM_TRANSFER__CHUNK_SIZE", "0");
            assert!(matches!(ConfigLoader::load(), Err(LobError::Config(_))));
            Ok(())
        });
    }

    #[test]
    fn test_init_project_writes_loadable_file() {
        Jail::expect_with(|jail| {
            jail.set_env("XDG_CONFIG_HOME", jail.directory().display().to_string());
            let dir = ConfigLoader::init_project(false).expect("init should succeed");
            assert!(dir.join("config.toml").exists());

            let config = ConfigLoader::load_from_file(&dir.join("config.toml"))
                .expect("generated config should parse");
            assert!(config.data_sources.contains_key("defaultDataSource"));
            Ok(())
        });
    }

    #[test]
    fn test_render_formats() {
        let config = Config::default();
        let json = ConfigLoader::render(&config, true).unwrap();
        assert!(json.contains("\"chunk_size\": 32768"));
        let toml = ConfigLoader::render(&config, false).unwrap();
        assert!(toml.contains("chunk_size = 32768"));
    }
}
