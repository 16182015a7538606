//! Large Object Descriptor
//!
//! Names one large object value: table, column, row locator and kind.
//! Construction validates every identifier and precomputes the statements
//! used by the upload and download protocols:
//!
//! | Statement    | Purpose                                               |
//! |--------------|-------------------------------------------------------|
//! | `clear_sql`  | Reset the value to the empty sentinel (takes the write lock) |
//! | `write_sql`  | Locate the row to stream into, inside the locked transaction |
//! | `read_sql`   | Locate the row to stream from, plus its length in bytes |
//! | `resize_sql` | Pre-size the value before staged chunks are copied in |
//! | `retype_sql` | Restore the text type after a text value is assembled |
//! | `length_sql` | Measure the located row's value in bytes              |
//!
//! SQLite has no row-level `FOR UPDATE`. The clear `UPDATE` runs inside the
//! connection's transaction and holds the database write lock until the
//! transaction ends, which covers the whole write.
//!
//! Lengths use `octet_length`: `length` stops counting text at the first
//! NUL character.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::encoding::TextEncoding;
use super::locator::RowLocator;
use crate::constants::lob;
use crate::types::{LobError, Result};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$#]*(\.[A-Za-z_][A-Za-z0-9_$#]*)?$")
        .expect("identifier pattern is valid")
});

/// Reject anything that is not a plain (optionally schema-qualified) identifier
pub(crate) fn validate_identifier(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LobError::InvalidDescriptor(format!(
            "{} name should be specified",
            what
        )));
    }
    if !IDENTIFIER.is_match(value) {
        return Err(LobError::InvalidDescriptor(format!(
            "{} name '{}' is not a valid identifier",
            what, value
        )));
    }
    Ok(())
}

/// Storage class of the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobKind {
    /// Raw bytes; chunks count bytes
    Binary,
    /// Characters; chunks count characters. The encoding applies to the
    /// stream side of a transfer.
    Text(TextEncoding),
}

impl LobKind {
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary)
    }

    /// Literal written by the clear step
    pub fn empty_sentinel(&self) -> &'static str {
        match self {
            Self::Binary => lob::EMPTY_BLOB,
            Self::Text(_) => lob::EMPTY_CLOB,
        }
    }

    pub fn upload_action(&self) -> &'static str {
        match self {
            Self::Binary => lob::ACTION_UPLOAD_BLOB,
            Self::Text(_) => lob::ACTION_UPLOAD_CLOB,
        }
    }

    pub fn download_action(&self) -> &'static str {
        match self {
            Self::Binary => lob::ACTION_DOWNLOAD_BLOB,
            Self::Text(_) => lob::ACTION_DOWNLOAD_CLOB,
        }
    }

    /// Unit counted by chunk sizes and offsets
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Binary => "bytes",
            Self::Text(_) => "chars",
        }
    }
}

impl fmt::Display for LobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => write!(f, "BLOB"),
            Self::Text(encoding) => write!(f, "CLOB({})", encoding),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LobDescriptor {
    table: String,
    column: String,
    locator: RowLocator,
    kind: LobKind,
    chunk_size: usize,
    clear_sql: String,
    write_sql: String,
    read_sql: String,
    resize_sql: String,
    retype_sql: Option<String>,
    length_sql: String,
}

impl LobDescriptor {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        locator: RowLocator,
        kind: LobKind,
    ) -> Result<Self> {
        let table = table.into();
        let column = column.into();

        validate_identifier("Table", &table)?;
        validate_identifier("Lob field", &column)?;
        locator.validate()?;

        let predicate = locator.where_clause();

        let clear_sql = format!(
            "UPDATE {} SET {} = {} WHERE {}",
            table,
            column,
            kind.empty_sentinel(),
            predicate
        );
        let write_sql = format!("SELECT rowid FROM {} WHERE {}", table, predicate);
        let read_sql = format!(
            "SELECT rowid, octet_length({}) FROM {} WHERE {}",
            column, table, predicate
        );
        let resize_sql = format!(
            "UPDATE {} SET {} = zeroblob(?1) WHERE rowid = ?2",
            table, column
        );
        let retype_sql = match kind {
            LobKind::Binary => None,
            LobKind::Text(_) => Some(format!(
                "UPDATE {} SET {c} = CAST({c} AS TEXT) WHERE rowid = ?1",
                table,
                c = column
            )),
        };
        let length_sql = format!(
            "SELECT octet_length({}) FROM {} WHERE rowid = ?1",
            column, table
        );

        Ok(Self {
            table,
            column,
            locator,
            kind,
            chunk_size: lob::RECOMMENDED_CHUNK_SIZE,
            clear_sql,
            write_sql,
            read_sql,
            resize_sql,
            retype_sql,
            length_sql,
        })
    }

    pub fn binary(
        table: impl Into<String>,
        column: impl Into<String>,
        locator: RowLocator,
    ) -> Result<Self> {
        Self::new(table, column, locator, LobKind::Binary)
    }

    pub fn text(
        table: impl Into<String>,
        column: impl Into<String>,
        locator: RowLocator,
        encoding: TextEncoding,
    ) -> Result<Self> {
        Self::new(table, column, locator, LobKind::Text(encoding))
    }

    /// Override the chunk size hint (never below one unit)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn locator(&self) -> &RowLocator {
        &self.locator
    }

    pub fn kind(&self) -> LobKind {
        self.kind
    }

    /// Advisory buffer size in units of the kind (bytes or characters)
    pub fn recommended_chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn clear_sql(&self) -> &str {
        &self.clear_sql
    }

    pub fn write_sql(&self) -> &str {
        &self.write_sql
    }

    pub fn read_sql(&self) -> &str {
        &self.read_sql
    }

    /// Pre-size the located row's value to a zero-filled blob
    pub fn resize_sql(&self) -> &str {
        &self.resize_sql
    }

    /// Turn the assembled bytes back into a text value (text kinds only)
    pub fn retype_sql(&self) -> Option<&str> {
        self.retype_sql.as_deref()
    }

    /// Current length of the located row's value, in bytes
    pub fn length_sql(&self) -> &str {
        &self.length_sql
    }

    /// Schema and table name as incremental blob I/O expects them
    pub(crate) fn storage_table(&self) -> (&str, &str) {
        self.table
            .split_once('.')
            .unwrap_or(("main", self.table.as_str()))
    }

    pub(crate) fn not_found(&self) -> LobError {
        LobError::not_found(&self.table, self.locator.to_string())
    }
}

impl fmt::Display for LobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{} where {}",
            self.kind,
            self.table,
            self.column,
            self.locator.where_clause()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lob::KeyValue;

    fn by_id(id: i64) -> RowLocator {
        RowLocator::primary_key([("id", KeyValue::Integer(id))])
    }

    #[test]
    fn test_binary_statements() {
        let d = LobDescriptor::binary("documents", "payload", by_id(7)).unwrap();
        assert_eq!(d.clear_sql(), "UPDATE documents SET payload = X'' WHERE id = 7");
        assert_eq!(d.write_sql(), "SELECT rowid FROM documents WHERE id = 7");
        assert_eq!(
            d.read_sql(),
            "SELECT rowid, octet_length(payload) FROM documents WHERE id = 7"
        );
        assert_eq!(
            d.resize_sql(),
            "UPDATE documents SET payload = zeroblob(?1) WHERE rowid = ?2"
        );
        assert_eq!(d.retype_sql(), None);
        assert_eq!(d.storage_table(), ("main", "documents"));
        assert_eq!(d.recommended_chunk_size(), 32_768);
        assert_eq!(d.kind().upload_action(), "UploadBLOB");
    }

    #[test]
    fn test_text_statements() {
        let d = LobDescriptor::text(
            "app.notes",
            "body",
            RowLocator::predicate("owner = 'x'"),
            TextEncoding::Utf8,
        )
        .unwrap();
        assert_eq!(d.clear_sql(), "UPDATE app.notes SET body = '' WHERE (owner = 'x')");
        assert_eq!(
            d.length_sql(),
            "SELECT octet_length(body) FROM app.notes WHERE rowid = ?1"
        );
        assert_eq!(
            d.retype_sql(),
            Some("UPDATE app.notes SET body = CAST(body AS TEXT) WHERE rowid = ?1")
        );
        assert_eq!(d.storage_table(), ("app", "notes"));
        assert_eq!(d.kind().download_action(), "DownloadCLOB");
        assert_eq!(d.kind().to_string(), "CLOB(utf-8)");
    }

    #[test]
    fn test_invalid_identifiers_rejected() {
        assert!(matches!(
            LobDescriptor::binary("", "payload", by_id(1)),
            Err(LobError::InvalidDescriptor(_))
        ));
        assert!(LobDescriptor::binary("documents", "payload; --", by_id(1)).is_err());
        assert!(LobDescriptor::binary("1table", "payload", by_id(1)).is_err());
        assert!(LobDescriptor::binary("documents", "payload", RowLocator::PrimaryKey(vec![])).is_err());
    }

    #[test]
    fn test_chunk_size_override() {
        let d = LobDescriptor::binary("documents", "payload", by_id(1))
            .unwrap()
            .with_chunk_size(0);
        assert_eq!(d.recommended_chunk_size(), 1);
    }

    #[test]
    fn test_not_found_message() {
        let d = LobDescriptor::binary("documents", "payload", by_id(404)).unwrap();
        assert_eq!(
            d.not_found().to_string(),
            "Record of table 'documents' with id 'id=404' was not found"
        );
    }
}
