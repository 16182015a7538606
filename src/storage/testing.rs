//! Shared fixtures for storage and streaming tests.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};
use tempfile::TempDir;

use super::pool::ConnectionPool;
use super::registry::StaticRegistry;
use crate::config::{DataSourceConfig, PoolConfig};

const SCHEMA: &str = r#"
CREATE TABLE documents (
    id      INTEGER PRIMARY KEY,
    title   TEXT NOT NULL,
    payload BLOB,
    body    TEXT
);
INSERT INTO documents (id, title, payload, body) VALUES
    (1, 'null lob', NULL, NULL),
    (2, 'empty lob', X'', ''),
    (3, 'filled', X'010203', 'héllo');

CREATE TABLE attachments (
    owner   TEXT NOT NULL,
    seq     INTEGER NOT NULL,
    content BLOB,
    PRIMARY KEY (owner, seq)
);
INSERT INTO attachments (owner, seq, content) VALUES ('O''Brien', 1, NULL);
"#;

/// Temporary on-disk database registered as `defaultDataSource` and
/// `java:comp/env/jdbc/Prefixed`.
pub(crate) struct TestDatabase {
    _dir: TempDir,
    pub path: PathBuf,
    pub pool: Arc<ConnectionPool>,
}

impl TestDatabase {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("lob.db");

        let conn = Connection::open(&path).expect("open database");
        conn.execute_batch(SCHEMA).expect("create schema");
        drop(conn);

        let registry = StaticRegistry::new()
            .with_entry("defaultDataSource", DataSourceConfig::new(&path))
            .with_entry("java:comp/env/jdbc/Prefixed", DataSourceConfig::new(&path));
        let settings = PoolConfig {
            max_size: 4,
            min_idle: 0,
            connection_timeout_secs: 5,
            busy_timeout_ms: 5_000,
        };
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(registry),
            "java:comp/env/",
            settings,
        ));

        Self {
            _dir: dir,
            path,
            pool,
        }
    }

    /// Rows inserted into `documents` by the schema
    pub fn seeded_rows(&self) -> i64 {
        3
    }

    /// Committed state of `documents.payload`, read outside the pool
    pub fn payload(&self, id: i64) -> Option<Vec<u8>> {
        let conn = Connection::open(&self.path).expect("open database");
        conn.query_row("SELECT payload FROM documents WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()
        .expect("query payload")
        .flatten()
    }

    /// Committed state of `documents.body`, read outside the pool
    pub fn body(&self, id: i64) -> Option<String> {
        let conn = Connection::open(&self.path).expect("open database");
        conn.query_row("SELECT body FROM documents WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()
        .expect("query body")
        .flatten()
    }

    /// Run arbitrary setup SQL outside the pool
    pub fn execute(&self, sql: &str) {
        let conn = Connection::open(&self.path).expect("open database");
        conn.execute_batch(sql).expect("execute setup");
    }
}
