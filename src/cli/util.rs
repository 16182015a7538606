//! CLI Common Utilities
//!
//! Shared setup for the transfer commands: configuration, the stream
//! adapters built from it, and stdio-aware file handles.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::config::{Config, ConfigLoader};
use crate::lob::{KeyValue, LobDescriptor, LobKind, RowLocator, TextEncoding};
use crate::stream::{LobStreams, TransferScope};
use crate::types::{LobError, Result, ResultExt};

/// Path meaning stdin or stdout
pub const STDIO: &str = "-";

/// Command execution context
///
/// Loaded configuration plus the stream adapters over its data sources.
pub struct CommandContext {
    pub config: Config,
    pub streams: LobStreams,
}

impl CommandContext {
    pub fn load() -> Result<Self> {
        let config = ConfigLoader::load()?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        let streams = LobStreams::from_config(&config);
        Self { config, streams }
    }

    /// Transactional scope, falling back to configured defaults
    pub fn scope(&self, data_source: Option<&str>, module: Option<&str>) -> TransferScope<'static> {
        TransferScope::transactional(
            data_source.unwrap_or(&self.config.transfer.default_data_source),
            module.unwrap_or(&self.config.transfer.default_module),
        )
    }
}

/// Where the large object lives, as given on the command line
#[derive(Debug, Clone, Default)]
pub struct LobTarget {
    pub table: String,
    pub column: String,
    /// `name=value` pairs
    pub keys: Vec<String>,
    pub predicate: Option<String>,
    pub text: bool,
    pub encoding: Option<TextEncoding>,
}

impl LobTarget {
    pub fn locator(&self) -> Result<RowLocator> {
        match (&self.predicate, self.keys.is_empty()) {
            (Some(_), false) => Err(LobError::InvalidDescriptor(
                "use either --key or --where, not both".to_string(),
            )),
            (Some(predicate), true) => Ok(RowLocator::predicate(predicate.clone())),
            (None, false) => {
                let pairs = self
                    .keys
                    .iter()
                    .map(|raw| parse_key(raw))
                    .collect::<Result<Vec<_>>>()?;
                Ok(RowLocator::PrimaryKey(pairs))
            }
            (None, true) => Err(LobError::InvalidDescriptor(
                "a row locator is required (--key or --where)".to_string(),
            )),
        }
    }

    pub fn descriptor(&self, config: &Config) -> Result<LobDescriptor> {
        let kind = if self.text {
            LobKind::Text(self.encoding.unwrap_or(config.transfer.text_encoding))
        } else {
            LobKind::Binary
        };
        Ok(
            LobDescriptor::new(&self.table, &self.column, self.locator()?, kind)?
                .with_chunk_size(config.transfer.chunk_size),
        )
    }

    pub fn label(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

/// Parse `name=value` into a typed key pair
pub fn parse_key(raw: &str) -> Result<(String, KeyValue)> {
    let (name, value) = raw.split_once('=').ok_or_else(|| {
        LobError::InvalidDescriptor(format!("key '{}' must look like name=value", raw))
    })?;
    Ok((name.trim().to_string(), KeyValue::parse(value.trim())))
}

/// Open a file for reading, or stdin for `-`
pub fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if path.as_os_str() == STDIO {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context_fn(|| format!("Failed to open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Create a file for writing, or stdout for `-`
pub fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if path.as_os_str() == STDIO {
        return Ok(Box::new(io::stdout().lock()));
    }
    let file =
        File::create(path).with_context_fn(|| format!("Failed to create {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}
