//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/lobstream/config.toml)
//! 3. Project config (.lobstream/config.toml)
//! 4. Environment variables (LOBSTREAM_*)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
