//! Call Context
//!
//! Explicit per-operation stack of open connections. Each entry carries the
//! connection, the data source it came from and the module tag used for
//! session tagging. Only the top entry is used for new statements.
//!
//! A context is created per logical operation and passed by `&mut` down the
//! call chain. It is `Send` so it may move between threads, but it is never
//! shared: two operations never observe each other's stack.
//!
//! `end` is the terminal teardown. It force-closes every tracked statement,
//! closes every connection bottom-to-top and returns the failures it had to
//! suppress. Dropping a context that still holds connections runs `end`.

use std::sync::Arc;

use rusqlite::CachedStatement;
use uuid::Uuid;

use super::connection::DbConnection;
use super::pool::ConnectionPool;
use crate::types::{LobError, Result, SessionTag, suppress};

fn empty_stack() -> LobError {
    LobError::illegal_state("no connection has been begun on this context")
}

/// One nested session on the context stack
#[derive(Debug)]
struct ContextEntry {
    connection: DbConnection,
    data_source: String,
    module: String,
}

/// Statement prepared through the context, kept for forced teardown
#[derive(Debug, Clone)]
struct TrackedStatement {
    sql: String,
    depth: usize,
}

pub struct CallContext {
    id: Uuid,
    pool: Arc<ConnectionPool>,
    stack: Vec<ContextEntry>,
    statements: Vec<TrackedStatement>,
}

impl CallContext {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pool,
            stack: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of open connections on the stack
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_active(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Open a connection and push it as the new top entry.
    ///
    /// Outer entries are left untouched: their transactions stay open.
    pub fn begin(&mut self, data_source: &str, module: &str) -> Result<()> {
        tracing::debug!(
            context = %self.id,
            depth = self.stack.len(),
            "Begin on '{}' for module '{}'",
            data_source,
            module
        );

        let mut connection = self.pool.create_connection(data_source)?;
        connection.set_module(SessionTag::new(module));

        self.stack.push(ContextEntry {
            connection,
            data_source: data_source.to_string(),
            module: module.to_string(),
        });
        Ok(())
    }

    fn top(&self) -> Result<&ContextEntry> {
        self.stack.last().ok_or_else(empty_stack)
    }

    fn top_mut(&mut self) -> Result<&mut ContextEntry> {
        self.stack.last_mut().ok_or_else(empty_stack)
    }

    /// The active (top) connection
    pub fn connection(&self) -> Result<&DbConnection> {
        Ok(&self.top()?.connection)
    }

    pub fn connection_mut(&mut self) -> Result<&mut DbConnection> {
        Ok(&mut self.top_mut()?.connection)
    }

    /// Data source of the active entry
    pub fn data_source(&self) -> Result<&str> {
        Ok(&self.top()?.data_source)
    }

    /// Module tag of the active entry
    pub fn module(&self) -> Result<&str> {
        Ok(&self.top()?.module)
    }

    /// Tag the active session with the action currently running
    pub fn set_action(&mut self, action: &str) -> Result<()> {
        let entry = self.top_mut()?;
        let tag = SessionTag::new(entry.module.clone()).with_action(action);
        entry.connection.set_module(tag);
        Ok(())
    }

    /// Prepare a statement on the top connection and run `f` with it.
    ///
    /// The statement is recorded so `end` can finalize it even if the
    /// caller never does.
    pub fn prepare_statement<T, F>(&mut self, sql: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut CachedStatement<'_>) -> Result<T>,
    {
        let depth = self.stack.len();
        let entry = self.stack.last().ok_or_else(empty_stack)?;
        let mut statement = entry.connection.prepare_cached(sql)?;

        if !self
            .statements
            .iter()
            .any(|s| s.depth == depth && s.sql == sql)
        {
            self.statements.push(TrackedStatement {
                sql: sql.to_string(),
                depth,
            });
        }

        f(&mut statement)
    }

    /// Statements prepared so far and not yet torn down
    pub fn tracked_statements(&self) -> usize {
        self.statements.len()
    }

    /// Commit the top connection.
    ///
    /// Failures are logged and handed back so the caller can keep them.
    pub fn commit(&mut self) -> Result<()> {
        let id = self.id;
        let result = self.connection_mut().and_then(|c| c.commit());
        if let Err(e) = &result {
            tracing::warn!(context = %id, "Commit failed: {}", e);
        }
        result
    }

    /// Roll back the top connection. Failures are logged and returned.
    pub fn rollback(&mut self) -> Result<()> {
        let id = self.id;
        let result = self.connection_mut().and_then(|c| c.rollback());
        if let Err(e) = &result {
            tracing::warn!(context = %id, "Rollback failed: {}", e);
        }
        result
    }

    /// Pop and close the top connection only
    pub fn close(&mut self) -> Result<()> {
        let depth = self.stack.len();
        let mut entry = self.stack.pop().ok_or_else(empty_stack)?;

        self.statements.retain(|s| s.depth != depth);
        entry.connection.close_statements();
        tracing::debug!(context = %self.id, depth, "Closing '{}'", entry.data_source);
        entry.connection.close()
    }

    /// Tear the whole context down.
    ///
    /// Returns the failures encountered on the way. A context that was never
    /// begun (or has already ended) returns an empty list.
    pub fn end(&mut self) -> Vec<LobError> {
        let mut suppressed = Vec::new();
        if self.stack.is_empty() && self.statements.is_empty() {
            return suppressed;
        }

        let statements = std::mem::take(&mut self.statements);
        for entry in &self.stack {
            entry.connection.close_statements();
        }
        if !statements.is_empty() {
            tracing::trace!(
                context = %self.id,
                "Finalized {} tracked statement(s)",
                statements.len()
            );
        }

        let entries = std::mem::take(&mut self.stack);
        let depth = entries.len();
        for mut entry in entries {
            let context = format!("close connection to '{}'", entry.data_source);
            suppress(entry.connection.close(), &context, &mut suppressed);
        }

        tracing::debug!(
            context = %self.id,
            "Ended after closing {} connection(s), {} suppressed failure(s)",
            depth,
            suppressed.len()
        );
        suppressed
    }
}

impl Drop for CallContext {
    fn drop(&mut self) {
        if self.is_active() {
            tracing::warn!(context = %self.id, "Context dropped without end()");
            self.end();
        }
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("id", &self.id)
            .field("stack", &self.stack)
            .field("statements", &self.statements.len())
            .finish()
    }
}
