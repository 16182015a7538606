//! Row locators
//!
//! Identify the single row that holds a large object value, either by
//! primary key columns or by a raw predicate composed by the caller.

use std::fmt;

use super::descriptor::validate_identifier;
use crate::types::{LobError, Result};

/// Primary key value as it appears in the rendered predicate
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl KeyValue {
    /// Render as a SQL literal: text quoted, numbers bare
    pub fn to_literal(&self) -> String {
        match self {
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Integer(i) => i.to_string(),
            Self::Real(r) => r.to_string(),
        }
    }

    /// Infer the value type from command-line text
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            Self::Integer(i)
        } else if let Ok(r) = raw.parse::<f64>()
            && r.is_finite()
        {
            Self::Real(r)
        } else {
            Self::Text(raw.to_string())
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal())
    }
}

impl From<&str> for KeyValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for KeyValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for KeyValue {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for KeyValue {
    fn from(r: f64) -> Self {
        Self::Real(r)
    }
}

/// Condition selecting the row that holds the large object
#[derive(Debug, Clone, PartialEq)]
pub enum RowLocator {
    /// Column name → value pairs, joined with `AND` in insertion order
    PrimaryKey(Vec<(String, KeyValue)>),
    /// Raw predicate supplied by the caller
    Predicate(String),
}

impl RowLocator {
    pub fn primary_key<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<KeyValue>,
    {
        Self::PrimaryKey(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn predicate(clause: impl Into<String>) -> Self {
        Self::Predicate(clause.into())
    }

    /// Check the locator can produce a non-empty predicate
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::PrimaryKey(pairs) => {
                if pairs.is_empty() {
                    return Err(LobError::InvalidDescriptor(
                        "Key field name should be specified".to_string(),
                    ));
                }
                for (name, _) in pairs {
                    validate_identifier("key field", name)?;
                }
                Ok(())
            }
            Self::Predicate(clause) => {
                if clause.trim().is_empty() {
                    return Err(LobError::InvalidDescriptor(
                        "Where clause should not be blank".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Render the `WHERE` body
    pub fn where_clause(&self) -> String {
        match self {
            Self::PrimaryKey(pairs) => pairs
                .iter()
                .map(|(name, value)| format!("{} = {}", name, value.to_literal()))
                .collect::<Vec<_>>()
                .join(" AND "),
            Self::Predicate(clause) => format!("({})", clause.trim()),
        }
    }
}

impl fmt::Display for RowLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryKey(pairs) => {
                let rendered: Vec<String> = pairs
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect();
                write!(f, "id '{}'", rendered.join(", "))
            }
            Self::Predicate(clause) => write!(f, "condition '{}'", clause.trim()),
        }
    }
}
