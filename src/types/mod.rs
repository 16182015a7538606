pub mod error;
pub mod utils;

pub use error::{ErrorCategory, LobError, Result, ResultExt};
pub use utils::suppress;

// =============================================================================
// Domain Newtypes
// =============================================================================

use std::fmt;

/// Logical data source name, e.g. `defaultDataSource`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataSourceName(String);

impl DataSourceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name as seen through a container-prefixed registry entry
    pub fn prefixed(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0)
    }
}

impl fmt::Display for DataSourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DataSourceName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DataSourceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for DataSourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Diagnostic session tag: module name plus current action
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionTag {
    pub module: String,
    pub action: Option<String>,
}

impl SessionTag {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            Some(action) => write!(f, "{}/{}", self.module, action),
            None => write!(f, "{}", self.module),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_prefixed() {
        let name = DataSourceName::from("jdbc/Main");
        assert_eq!(name.prefixed("java:comp/env/"), "java:comp/env/jdbc/Main");
        assert_eq!(name.to_string(), "jdbc/Main");
    }

    #[test]
    fn test_session_tag_display() {
        let tag = SessionTag::new("Orders");
        assert_eq!(tag.to_string(), "Orders");
        assert_eq!(tag.with_action("UploadBLOB").to_string(), "Orders/UploadBLOB");
    }
}
