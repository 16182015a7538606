//! Pooled connection with explicit auto-commit control.
//!
//! With auto-commit off, a deferred transaction is opened lazily before the
//! first statement and stays open until `commit` or `rollback`. Closing a
//! connection rolls back whatever is still pending before the connection
//! goes back to the pool.

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{CachedStatement, Connection};

use crate::types::{LobError, Result, SessionTag};

pub struct DbConnection {
    conn: Option<PooledConnection<SqliteConnectionManager>>,
    data_source: String,
    auto_commit: bool,
    tag: Option<SessionTag>,
}

impl DbConnection {
    pub(crate) fn new(
        conn: PooledConnection<SqliteConnectionManager>,
        data_source: impl Into<String>,
        auto_commit: bool,
    ) -> Self {
        Self {
            conn: Some(conn),
            data_source: data_source.into(),
            auto_commit,
            tag: None,
        }
    }

    fn raw(&self) -> Result<&Connection> {
        self.conn
            .as_deref()
            .ok_or_else(|| LobError::illegal_state("connection is closed"))
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Whether a transaction is currently open on the underlying connection
    pub fn in_transaction(&self) -> bool {
        self.conn.as_deref().is_some_and(|c| !c.is_autocommit())
    }

    /// Switch auto-commit mode. Turning it on commits any pending work.
    pub fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        if auto_commit && !self.auto_commit {
            self.commit()?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn ensure_transaction(&self) -> Result<()> {
        let conn = self.raw()?;
        if !self.auto_commit && conn.is_autocommit() {
            conn.execute_batch("BEGIN DEFERRED")?;
            tracing::trace!("Opened transaction on '{}'", self.data_source);
        }
        Ok(())
    }

    /// Borrow the connection for statement work, opening a transaction if needed
    pub fn connection(&self) -> Result<&Connection> {
        self.ensure_transaction()?;
        self.raw()
    }

    /// Prepare (or reuse) a cached statement on this connection
    pub fn prepare_cached(&self, sql: &str) -> Result<CachedStatement<'_>> {
        Ok(self.connection()?.prepare_cached(sql)?)
    }

    pub fn commit(&mut self) -> Result<()> {
        let conn = self.raw()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
            tracing::trace!("Committed transaction on '{}'", self.data_source);
        }
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        let conn = self.raw()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
            tracing::trace!("Rolled back transaction on '{}'", self.data_source);
        }
        Ok(())
    }

    /// Record the module/action tag for diagnostics
    pub fn set_module(&mut self, tag: SessionTag) {
        tracing::debug!("Session tag on '{}': {}", self.data_source, tag);
        self.tag = Some(tag);
    }

    pub fn session_tag(&self) -> Option<&SessionTag> {
        self.tag.as_ref()
    }

    /// Finalize every cached statement
    pub fn close_statements(&self) {
        if let Some(conn) = self.conn.as_deref() {
            conn.flush_prepared_statement_cache();
        }
    }

    /// Release the connection back to the pool.
    ///
    /// Pending work is rolled back first. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.flush_prepared_statement_cache();
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
            tracing::debug!(
                "Rolled back uncommitted work while closing '{}'",
                self.data_source
            );
        }
        Ok(())
    }
}

impl Drop for DbConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close connection to '{}': {}", self.data_source, e);
        }
    }
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("data_source", &self.data_source)
            .field("auto_commit", &self.auto_commit)
            .field("closed", &self.is_closed())
            .field("tag", &self.tag)
            .finish()
    }
}
