//! Statement Execution Service
//!
//! The parameterized-statement facility the LOB layer calls for its clear
//! step and for session tagging. Kept behind a trait so callers can route
//! statements through their own execution layer.

use rusqlite::ToSql;

use super::context::CallContext;
use crate::types::Result;

pub trait StatementService: Send + Sync {
    /// Execute `sql` on the context's top connection, returning affected rows
    fn execute(&self, ctx: &mut CallContext, sql: &str, params: &[&dyn ToSql]) -> Result<usize>;

    /// Tag the context's active session with an action name
    fn set_module(&self, ctx: &mut CallContext, action: &str) -> Result<()>;
}

/// Default service: prepared statements on the context's top connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteStatements;

impl StatementService for SqliteStatements {
    fn execute(&self, ctx: &mut CallContext, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
        tracing::trace!("Executing: {}", sql);
        ctx.prepare_statement(sql, |stmt| Ok(stmt.execute(params)?))
    }

    fn set_module(&self, ctx: &mut CallContext, action: &str) -> Result<()> {
        ctx.set_action(action)
    }
}
