//! Download protocol: locate, read windows, end or cancel.
//!
//! Windows are read through an incremental blob handle. A [`LobReader`]
//! keeps that handle open across windows; the `continue_*` methods open one
//! per call.

use rusqlite::blob::Blob;
use rusqlite::{Connection, OptionalExtension};

use super::descriptor::{LobDescriptor, LobKind};
use super::handle::ReadHandle;
use super::state::TransferState;
use crate::storage::{CallContext, StatementService};
use crate::types::{LobError, Result};

/// Single-use reader for one large object value.
///
/// A NULL value and a zero-length value both open as an empty handle.
#[derive(Debug)]
pub struct LobDownload {
    descriptor: LobDescriptor,
    state: TransferState,
    handle: Option<ReadHandle>,
    length: u64,
    chunks: u64,
    units: u64,
}

impl LobDownload {
    pub fn new(descriptor: LobDescriptor) -> Self {
        Self {
            descriptor,
            state: TransferState::New,
            handle: None,
            length: 0,
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

    /// Length of the value in bytes when the read began
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn units(&self) -> u64 {
        self.units
    }

    /// Locate the row and open the read handle. Returns the recommended
    /// chunk size.
    pub fn begin_read(
        &mut self,
        ctx: &mut CallContext,
        statements: &dyn StatementService,
    ) -> Result<usize> {
        self.state.require_new("begin_read")?;

        match self.open_handle(ctx, statements) {
            Ok(handle) => {
                tracing::debug!(
                    "Opened {} for reading ({} bytes)",
                    self.descriptor,
                    self.length
                );
                self.handle = Some(handle);
                self.state = TransferState::Open;
                Ok(self.descriptor.recommended_chunk_size())
            }
            Err(e) => {
                if let Err(rollback) = ctx.rollback() {
                    tracing::warn!("Rollback after failed begin_read: {}", rollback);
                }
                self.cancel();
                Err(e.into_space("Large object begin read error"))
            }
        }
    }

    fn open_handle(
        &mut self,
        ctx: &mut CallContext,
        statements: &dyn StatementService,
    ) -> Result<ReadHandle> {
        statements.set_module(ctx, self.descriptor.kind().download_action())?;

        let located: Option<(i64, Option<i64>)> =
            ctx.prepare_statement(self.descriptor.read_sql(), |stmt| {
                Ok(stmt
                    .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))
                    .optional()?)
            })?;

        let (rowid, length) = located.ok_or_else(|| self.descriptor.not_found())?;
        self.length = length.unwrap_or(0).max(0) as u64;
        Ok(ReadHandle::new(rowid, self.length))
    }

    /// Reader that keeps the value open for as long as it lives.
    ///
    /// It borrows the context, so the context cannot run other statements
    /// until the reader is dropped.
    pub fn reader<'c>(&mut self, ctx: &'c CallContext) -> Result<LobReader<'_, 'c>> {
        let conn = ctx.connection()?.connection()?;
        Ok(LobReader {
            download: self,
            conn,
            blob: None,
        })
    }

    /// Read up to `buf.len()` bytes. `None` marks the end of the value.
    pub fn continue_read(&mut self, ctx: &mut CallContext, buf: &mut [u8]) -> Result<Option<usize>> {
        self.reader(ctx)?.read(buf)
    }

    /// Append up to `max_chars` bytes' worth of characters to `out`.
    /// Returns the number of characters read, or `None` at the end of the
    /// value.
    pub fn continue_read_text(
        &mut self,
        ctx: &mut CallContext,
        out: &mut String,
        max_chars: usize,
    ) -> Result<Option<usize>> {
        self.reader(ctx)?.read_text(out, max_chars)
    }

    fn record_chunk(&mut self, units: u64) {
        self.chunks += 1;
        self.units += units;
        self.state = TransferState::Streaming;
    }

    /// Close the read handle. Ending a cancelled download is a no-op.
    pub fn end_read(&mut self) -> Result<()> {
        if self.is_cancelled() {
            return Ok(());
        }
        self.state.require_streamable("end_read")?;
        self.handle = None;
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

    /// Mark the download cancelled and release the read handle
    pub fn cancel(&mut self) {
        if self.state == TransferState::Ended {
            return;
        }
        if self.state != TransferState::Cancelled {
            tracing::debug!("Cancelled download of {} in state {}", self.descriptor, self.state);
        }
        self.handle = None;
        self.state = TransferState::Cancelled;
    }
}

/// Windowed reads over one open blob handle
pub struct LobReader<'d, 'c> {
    download: &'d mut LobDownload,
    conn: &'c Connection,
    blob: Option<Blob<'c>>,
}

impl LobReader<'_, '_> {
    fn open(&mut self) -> Result<()> {
        if self.blob.is_some() {
            return Ok(());
        }
        let Some(handle) = self.download.handle.as_ref() else {
            return Err(LobError::illegal_state("read handle is not open"));
        };
        self.blob = handle.open(self.conn, &self.download.descriptor)?;
        Ok(())
    }

    fn fail(&mut self, e: LobError) -> LobError {
        self.blob = None;
        self.download.cancel();
        e.into_space("Large object continue read error")
    }

    /// Read up to `buf.len()` bytes. `None` marks the end of the value.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        self.download.state.require_streamable("continue_read")?;
        if !self.download.descriptor.kind().is_binary() {
            return Err(LobError::illegal_state(
                "continue_read called on a text large object",
            ));
        }
        if buf.is_empty() {
            return Ok(Some(0));
        }

        let result = match self.open() {
            Ok(()) => match self.download.handle.as_mut() {
                Some(handle) => handle.read_bytes(self.blob.as_ref(), buf),
                None => Err(LobError::illegal_state("read handle is not open")),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(Some(n)) => {
                self.download.record_chunk(n as u64);
                Ok(Some(n))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Decode up to `max_chars` stored bytes into `out`.
    ///
    /// A window that ends inside a character yields the partial character
    /// on the next call, so a call can report zero characters before the
    /// end of the value.
    pub fn read_text(&mut self, out: &mut String, max_chars: usize) -> Result<Option<usize>> {
        self.download.state.require_streamable("continue_read_text")?;
        if !matches!(self.download.descriptor.kind(), LobKind::Text(_)) {
            return Err(LobError::illegal_state(
                "continue_read_text called on a binary large object",
            ));
        }
        if max_chars == 0 {
            return Ok(Some(0));
        }

        let result = match self.open() {
            Ok(()) => match self.download.handle.as_mut() {
                Some(handle) => handle.read_text(self.blob.as_ref(), max_chars),
                None => Err(LobError::illegal_state("read handle is not open")),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(Some((text, chars))) => {
                out.push_str(&text);
                self.download.record_chunk(chars as u64);
                Ok(Some(chars))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(self.fail(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lob::{RowLocator, TextEncoding};
    use crate::storage::SqliteStatements;
    use crate::storage::testing::TestDatabase;
    use std::sync::Arc;

    fn read_all(ctx: &mut CallContext, download: &mut LobDownload, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        while let Some(n) = download.continue_read(ctx, &mut buf).unwrap() {
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    fn blob(id: i64) -> LobDescriptor {
        LobDescriptor::binary("documents", "payload", RowLocator::primary_key([("id", id)])).unwrap()
    }

    #[test]
    fn test_read_in_small_windows() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let mut download = LobDownload::new(blob(3));
        download.begin_read(&mut ctx, &SqliteStatements).unwrap();
        assert_eq!(download.length(), 3);
        assert_eq!(read_all(&mut ctx, &mut download, 2), vec![1, 2, 3]);
        assert_eq!(download.chunks(), 2);
        download.end_read().unwrap();
        assert_eq!(download.state(), TransferState::Ended);
        ctx.end();
    }

    #[test]
    fn test_null_and_empty_values_read_as_empty() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        for id in [1, 2] {
            let mut download = LobDownload::new(blob(id));
            download.begin_read(&mut ctx, &SqliteStatements).unwrap();
            assert!(read_all(&mut ctx, &mut download, 16).is_empty());
            download.end_read().unwrap();
        }
        ctx.end();
    }

    #[test]
    fn test_text_windows_count_characters() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let descriptor = LobDescriptor::text(
            "documents",
            "body",
            RowLocator::predicate("title = 'filled'"),
            TextEncoding::Utf8,
        )
        .unwrap();
        let mut download = LobDownload::new(descriptor);
        download.begin_read(&mut ctx, &SqliteStatements).unwrap();
        assert_eq!(download.length(), 6);

        let mut out = String::new();
        assert_eq!(download.continue_read_text(&mut ctx, &mut out, 3).unwrap(), Some(2));
        assert_eq!(out, "hé");
        while download.continue_read_text(&mut ctx, &mut out, 2).unwrap().is_some() {}
        assert_eq!(out, "héllo");

        let mut buf = [0u8; 4];
        assert!(matches!(
            download.continue_read(&mut ctx, &mut buf),
            Err(LobError::IllegalState(_))
        ));
        download.end_read().unwrap();
        ctx.end();
    }

    #[test]
    fn test_reader_keeps_value_open_across_windows() {
        let db = TestDatabase::new();
        db.execute("UPDATE documents SET payload = zeroblob(10000) WHERE id = 1");
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let mut download = LobDownload::new(blob(1));
        download.begin_read(&mut ctx, &SqliteStatements).unwrap();
        let mut reader = download.reader(&ctx).unwrap();
        let mut buf = [0xFFu8; 4096];
        let mut total = 0;
        while let Some(n) = reader.read(&mut buf).unwrap() {
            assert!(buf[..n].iter().all(|&b| b == 0));
            total += n;
        }
        drop(reader);

        assert_eq!(total, 10_000);
        assert_eq!(download.chunks(), 3);
        download.end_read().unwrap();
        ctx.end();
    }

    #[test]
    fn test_split_character_yields_empty_window() {
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
        let mut download = LobDownload::new(descriptor);
        download.begin_read(&mut ctx, &SqliteStatements).unwrap();

        let mut out = String::new();
        assert_eq!(download.continue_read_text(&mut ctx, &mut out, 1).unwrap(), Some(1));
        // Only the first byte of 'é'
        assert_eq!(download.continue_read_text(&mut ctx, &mut out, 1).unwrap(), Some(0));
        assert_eq!(download.continue_read_text(&mut ctx, &mut out, 1).unwrap(), Some(1));
        assert_eq!(out, "hé");
        download.end_read().unwrap();
        ctx.end();
    }

    #[test]
    fn test_missing_row_is_not_found() {
        let db = TestDatabase::new();
        let mut ctx = CallContext::new(Arc::clone(&db.pool));
        ctx.begin("defaultDataSource", "Test").unwrap();

        let mut download = LobDownload::new(blob(404));
        let err = download.begin_read(&mut ctx, &SqliteStatements).unwrap_err();
        assert!(err.is_not_found());
        assert!(download.is_cancelled());
        assert!(download.end_read().is_ok());
        ctx.end();
    }
}
