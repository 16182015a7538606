//! Config Command
//!
//! Manage lobstream configuration.
//!
//! Usage:
//!   lobstream config show [-f json]
//!   lobstream config path
//!   lobstream config init [--force]

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Show the merged effective configuration
pub fn show(format: &str) -> Result<()> {
    ConfigLoader::show_config(format == "json")
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Initialize project configuration
pub fn init(force: bool) -> Result<()> {
    let dir = ConfigLoader::init_project(force)?;
    let output = Output::new();
    output.success("Initialized project configuration");
    output.detail("Directory", &dir.display().to_string());
    output.detail(
        "Config",
        &ConfigLoader::project_config_path().display().to_string(),
    );
    Ok(())
}
