//! Upload protocol: clear, lock, stage chunks, assemble on end or cancel.

use rusqlite::OptionalExtension;

use super::descriptor::{LobDescriptor, LobKind};
use super::handle::WriteHandle;
use super::state::TransferState;
use crate::storage::{CallContext, StatementService};
use crate::types::{LobError, Result};

/// Single-use writer for one large object value.
///
/// The object never commits or rolls back on its own. Its cancelled flag is
/// what the owner inspects to pick the transaction outcome.
#[derive(Debug)]
pub struct LobUpload {
    descriptor: LobDescriptor,
    state: TransferState,
    handle: Option<WriteHandle>,
    chunks: u64,
    units: u64,
}

impl LobUpload {
    pub fn new(descriptor: LobDescriptor) -> Self {
        Self {
            descriptor,
            state: TransferState::New,
            handle: None,
            chunks: 0,
            units: 0,
        }
    }

    pub fn descriptor(&self) -> &LobDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == TransferState::Cancelled
    }

    /// Chunks appended so far
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Bytes (binary) or characters (text) appended so far
    pub fn units(&self) -> u64 {
        self.units
    }

    /// Erase the current value, lock the row and open the write handle.
    ///
    /// Returns the recommended chunk size. On failure the context's top
    /// connection is rolled back and the upload is cancelled; a missing row
    /// surfaces as `NotFound`, driver failures as streaming failures.
    pub fn begin_write(
        &mut self,
        ctx: &mut CallContext,
        statements: &dyn StatementService,
    ) -> Result<usize> {
        self.state.require_new("begin_write")?;

        match self.open_handle(ctx, statements) {
            Ok(handle) => {
                tracing::debug!("Opened {} for writing", self.descriptor);
                self.handle = Some(handle);
                self.state = TransferState::Open;
                Ok(self.descriptor.recommended_chunk_size())
            }
            Err(e) => {
                if let Err(rollback) = ctx.rollback() {
                    tracing::warn!("Rollback after failed begin_write: {}", rollback);
                }
                self.cancel();
                Err(e.into_space("Large object begin write error"))
            }
        }
    }

    fn open_handle(
        &self,
        ctx: &mut CallContext,
        statements: &dyn StatementService,
    ) -> Result<WriteHandle> {
        statements.set_module(ctx, self.descriptor.kind().upload_action())?;
        statements.execute(ctx, self.descriptor.clear_sql(), &[])?;

        let rowid: Option<i64> = ctx.prepare_statement(self.descriptor.write_sql(), |stmt| {
            Ok(stmt.query_row([], |row| row.get(0)).optional()?)
        })?;

        let rowid = rowid.ok_or_else(|| self.descriptor.not_found())?;
        WriteHandle::open(ctx, rowid)
    }

    /// Append one binary chunk
    pub fn continue_write(&mut self, ctx: &mut CallContext, data: &[u8]) -> Result<()> {
        self.state.require_streamable("continue_write")?;
        if !self.descriptor.kind().is_binary() {
            return Err(LobError::illegal_state(
                "continue_write called on a text large object",
            ));
        }
        if data.is_empty() {
            return Ok(());
        }

        let result = match self.handle.as_mut() {
            Some(handle) => handle.stage(ctx, data),
            None => Err(LobError::illegal_state("write handle is not open")),
        };
        self.after_append(result.map(|()| data.len() as u64))
    }

    /// Append one text chunk
    pub fn continue_write_text(&mut self, ctx: &mut CallContext, text: &str) -> Result<()> {
        self.state.require_streamable("continue_write_text")?;
        if !matches!(self.descriptor.kind(), LobKind::Text(_)) {
            return Err(LobError::illegal_state(
                "continue_write_text called on a binary large object",
            ));
        }
        if text.is_empty() {
            return Ok(());
        }

        let result = match self.handle.as_mut() {
            Some(handle) => handle.stage(ctx, text.as_bytes()),
            None => Err(LobError::illegal_state("write handle is not open")),
        };
        self.after_append(result.map(|()| text.chars().count() as u64))
    }

    fn after_append(&mut self, result: Result<u64>) -> Result<()> {
        match result {
            Ok(units) => {
                self.chunks += 1;
                self.units += units;
                self.state = TransferState::Streaming;
                Ok(())
            }
            Err(e) => {
                self.cancel();
                Err(e.into_space("Large object continue write error"))
            }
        }
    }

    /// Assemble the staged chunks into the row and close the write handle.
    ///
    /// The stored byte length is checked against what was staged. Any
    /// failure here, including a constraint on the final value, cancels the
    /// upload. Ending a cancelled upload is a no-op.
    pub fn end_write(&mut self, ctx: &mut CallContext) -> Result<()> {
        if self.is_cancelled() {
            return Ok(());
        }
        self.state.require_streamable("end_write")?;

        let Some(handle) = self.handle.take() else {
            return Err(LobError::illegal_state("write handle is not open"));
        };

        let verified = handle
            .flush(ctx, &self.descriptor)
            .and_then(|()| handle.stored_len(ctx, &self.descriptor))
            .and_then(|stored| {
                if stored == handle.staged() {
                    Ok(())
                } else {
                    Err(LobError::space(
                        "Large object end write error",
                        format!(
                            "stored {} bytes but {} were written",
                            stored,
                            handle.staged()
                        ),
                    ))
                }
            });

        match verified {
            Ok(()) => {
                self.state = TransferState::Ended;
                tracing::debug!(
                    "Closed {} after {} chunk(s), {} {}",
                    self.descriptor,
                    self.chunks,
                    self.units,
                    self.descriptor.kind().unit()
                );
                Ok(())
            }
            Err(e) => {
                self.cancel();
                Err(e.into_space("Large object end write error"))
            }
        }
    }

    /// Mark the upload cancelled and release the write handle.
    ///
    /// Does not touch the transaction.
    pub fn cancel(&mut self) {
        if self.state == TransferState::Ended {
            return;
        }
        if self.state != TransferState::Cancelled {
            tracing::debug!("Cancelled upload of {} in state {}", self.descriptor, self.state);
        }
        self.handle = None;
        self.state = TransferState::Cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lob::{KeyValue, RowLocator, TextEncoding};
    use crate::storage::SqliteStatements;
    use crate::storage::testing::TestDatabase;
    use rusqlite::ToSql;
    use std::sync::Arc;

    fn blob(id: i64) -> LobDescriptor {
        LobDescriptor::binary("documents", "payload", RowLocator::primary_key([("id", id)])).unwrap()
    }

    struct FailingClear;

    impl StatementService for FailingClear {
        fn execute(&self, _: &mut CallContext, _: &str, _: &[&dyn ToSql]) -> Result<usize> {
            Err(LobError::Database(rusqlite::Error::InvalidQuery))
        }

        fn set_module(&self, ctx: &mut CallContext, action: &str) -> Result<()> {
            ctx.set_action(action)
        }
    }

    #[test]
    fn test_write_then_commit() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let mut upload = LobUpload::new(blob(1));
        assert_eq!(upload.begin_write(&mut ctx, &SqliteStatements).unwrap(), 32_768);
        assert_eq!(upload.state(), TransferState::Open);

        upload.continue_write(&mut ctx, b"hello ").unwrap();
        upload.continue_write(&mut ctx, &[0, 1, 2]).unwrap();
        upload.continue_write(&mut ctx, &[]).unwrap();
        upload.end_write(&mut ctx).unwrap();
        assert_eq!(upload.state(), TransferState::Ended);
        assert_eq!((upload.chunks(), upload.units()), (2, 9));

        ctx.commit().unwrap();
        ctx.end();
        assert_eq!(db.payload(1).unwrap(), b"hello \x00\x01\x02".to_vec());
    }

    #[test]
    fn test_text_write() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let descriptor = LobDescriptor::text(
            "documents",
            "body",
            RowLocator::primary_key([("id", 3)]),
            TextEncoding::Utf8,
        )
        .unwrap();
        let mut upload = LobUpload::new(descriptor);
        upload.begin_write(&mut ctx, &SqliteStatements).unwrap();
        assert!(matches!(
            upload.continue_write(&mut ctx, b"bytes"),
            Err(LobError::IllegalState(_))
        ));
        upload.continue_write_text(&mut ctx, "naïve ").unwrap();
        upload.continue_write_text(&mut ctx, "✓").unwrap();
        upload.end_write(&mut ctx).unwrap();
        assert_eq!(upload.units(), 7);

        ctx.commit().unwrap();
        ctx.end();
        assert_eq!(db.body(3).unwrap(), "naïve ✓");
    }

    #[test]
    fn test_missing_row_is_not_found() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let mut upload = LobUpload::new(blob(404));
        let err = upload.begin_write(&mut ctx, &SqliteStatements).unwrap_err();
        assert!(err.is_not_found());
        assert!(upload.is_cancelled());
        assert!(!ctx.connection().unwrap().in_transaction());
        ctx.end();
    }

    #[test]
    fn test_clear_failure_is_space_error() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let mut upload = LobUpload::new(blob(1));
        let err = upload.begin_write(&mut ctx, &FailingClear).unwrap_err();
        assert!(err.is_recoverable());
        assert!(upload.is_cancelled());
        ctx.end();
    }

    #[test]
    fn test_chunk_failure_cancels() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let mut upload = LobUpload::new(blob(1));
        upload.begin_write(&mut ctx, &SqliteStatements).unwrap();
        upload.continue_write(&mut ctx, b"abc").unwrap();

        // Losing the staging table makes the next chunk fail
        ctx.prepare_statement("DROP TABLE temp.lob_chunks", |stmt| Ok(stmt.execute([])?))
            .unwrap();
        let err = upload.continue_write(&mut ctx, b"defg").unwrap_err();
        assert!(err.is_recoverable());
        assert!(upload.is_cancelled());

        // Ending a cancelled upload is a no-op; further chunks are refused
        upload.end_write(&mut ctx).unwrap();
        assert!(matches!(
            upload.continue_write(&mut ctx, b"x"),
            Err(LobError::IllegalState(_))
        ));
        ctx.rollback().unwrap();
        ctx.end();
    }

    #[test]
    fn test_oversized_value_fails_at_end() {
        let db = TestDatabase::new();
        db.execute(
            "CREATE TABLE limited (id INTEGER PRIMARY KEY, data BLOB CHECK (length(data) <= 4));
             INSERT INTO limited (id, data) VALUES (1, NULL);",
        );
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let descriptor = LobDescriptor::binary(
            "limited",
            "data",
            RowLocator::primary_key([("id", KeyValue::Integer(1))]),
        )
        .unwrap();
        let mut upload = LobUpload::new(descriptor);
        upload.begin_write(&mut ctx, &SqliteStatements).unwrap();
        upload.continue_write(&mut ctx, b"abc").unwrap();
        upload.continue_write(&mut ctx, b"defg").unwrap();

        let err = upload.end_write(&mut ctx).unwrap_err();
        assert!(err.is_recoverable());
        assert!(upload.is_cancelled());
        ctx.rollback().unwrap();
        ctx.end();
    }

    #[test]
    fn test_text_with_nul_keeps_every_byte() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let descriptor = LobDescriptor::text(
            "documents",
            "body",
            RowLocator::primary_key([("id", 1)]),
            TextEncoding::Utf8,
        )
        .unwrap();
        let mut upload = LobUpload::new(descriptor);
        upload.begin_write(&mut ctx, &SqliteStatements).unwrap();
        upload.continue_write_text(&mut ctx, "before\0").unwrap();
        upload.continue_write_text(&mut ctx, "after").unwrap();
        upload.end_write(&mut ctx).unwrap();
        assert_eq!(upload.units(), 12);

        ctx.commit().unwrap();
        ctx.end();
        assert_eq!(db.body(1).unwrap(), "before\0after");
    }

    #[test]
    fn test_interleaved_uploads_on_one_connection() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let mut first = LobUpload::new(blob(1));
        let mut second = LobUpload::new(blob(2));
        first.begin_write(&mut ctx, &SqliteStatements).unwrap();
        second.begin_write(&mut ctx, &SqliteStatements).unwrap();
        first.continue_write(&mut ctx, b"one-").unwrap();
        second.continue_write(&mut ctx, b"two-").unwrap();
        first.continue_write(&mut ctx, b"1").unwrap();
        second.continue_write(&mut ctx, b"2").unwrap();
        second.end_write(&mut ctx).unwrap();
        first.end_write(&mut ctx).unwrap();

        ctx.commit().unwrap();
        ctx.end();
        assert_eq!(db.payload(1).unwrap(), b"one-1".to_vec());
        assert_eq!(db.payload(2).unwrap(), b"two-2".to_vec());
    }

    #[test]
    fn test_out_of_order_calls() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let mut upload = LobUpload::new(blob(1));
        assert!(matches!(
            upload.continue_write(&mut ctx, b"early"),
            Err(LobError::IllegalState(_))
        ));
        assert!(upload.end_write(&mut ctx).is_err());

        upload.begin_write(&mut ctx, &SqliteStatements).unwrap();
        assert!(matches!(
            upload.begin_write(&mut ctx, &SqliteStatements),
            Err(LobError::IllegalState(_))
        ));
        upload.end_write(&mut ctx).unwrap();
        upload.cancel();
        assert_eq!(upload.state(), TransferState::Ended);
        ctx.end();
    }
}
