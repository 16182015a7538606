//! Positioned handles over one located row.
//!
//! Writes are staged chunk by chunk in a per-connection temp table. When
//! the upload ends the value is pre-sized once and every staged chunk is
//! copied into it through incremental blob I/O, so each byte is written
//! twice no matter how large the value grows. Reads go through an open
//! blob handle at an absolute byte offset.
//!
//! Text is stored as UTF-8. Offsets and lengths count bytes for both kinds.

use rusqlite::blob::Blob;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::descriptor::LobDescriptor;
use super::encoding::{TextDecoder, TextEncoding};
use crate::storage::CallContext;
use crate::types::{LobError, Result};

const CREATE_STAGING: &str = "CREATE TEMP TABLE IF NOT EXISTS lob_chunks (
    stage TEXT NOT NULL,
    seq   INTEGER NOT NULL,
    chunk BLOB NOT NULL,
    PRIMARY KEY (stage, seq)
)";
const STAGE_CHUNK: &str = "INSERT INTO temp.lob_chunks (stage, seq, chunk) VALUES (?1, ?2, ?3)";
const STAGED_CHUNKS: &str = "SELECT chunk FROM temp.lob_chunks WHERE stage = ?1 ORDER BY seq";
const DISCARD_STAGE: &str = "DELETE FROM temp.lob_chunks WHERE stage = ?1";

fn open_blob<'c>(
    conn: &'c Connection,
    descriptor: &LobDescriptor,
    rowid: i64,
    read_only: bool,
) -> Result<Blob<'c>> {
    let (schema, table) = descriptor.storage_table();
    Ok(conn.blob_open(schema, table, descriptor.column(), rowid, read_only)?)
}

fn to_offset(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| LobError::illegal_state("offset exceeds address space"))
}

#[derive(Debug)]
pub(crate) struct WriteHandle {
    rowid: i64,
    stage: String,
    seq: i64,
    staged: u64,
}

impl WriteHandle {
    /// Prepare staging for the row. Staged rows live in the connection's
    /// transaction and vanish with a rollback.
    pub fn open(ctx: &mut CallContext, rowid: i64) -> Result<Self> {
        ctx.prepare_statement(CREATE_STAGING, |stmt| Ok(stmt.execute([])?))?;
        Ok(Self {
            rowid,
            stage: Uuid::new_v4().to_string(),
            seq: 0,
            staged: 0,
        })
    }

    pub fn stage(&mut self, ctx: &mut CallContext, bytes: &[u8]) -> Result<()> {
        ctx.prepare_statement(STAGE_CHUNK, |stmt| {
            Ok(stmt.execute(params![self.stage, self.seq, bytes])?)
        })?;
        self.seq += 1;
        self.staged += bytes.len() as u64;
        Ok(())
    }

    /// Assemble the staged chunks into the row and drop the stage
    pub fn flush(&self, ctx: &mut CallContext, descriptor: &LobDescriptor) -> Result<()> {
        if self.staged > 0 {
            let size = i64::try_from(self.staged)
                .map_err(|_| LobError::illegal_state("staged value is too large"))?;
            ctx.prepare_statement(descriptor.resize_sql(), |stmt| {
                Ok(stmt.execute(params![size, self.rowid])?)
            })?;
            self.copy_staged(ctx.connection()?.connection()?, descriptor)?;
            if let Some(sql) = descriptor.retype_sql() {
                ctx.prepare_statement(sql, |stmt| Ok(stmt.execute([self.rowid])?))?;
            }
        }
        ctx.prepare_statement(DISCARD_STAGE, |stmt| Ok(stmt.execute([&self.stage])?))?;
        Ok(())
    }

    fn copy_staged(&self, conn: &Connection, descriptor: &LobDescriptor) -> Result<()> {
        let mut blob = open_blob(conn, descriptor, self.rowid, false)?;
        let mut stmt = conn.prepare_cached(STAGED_CHUNKS)?;
        let mut rows = stmt.query([&self.stage])?;

        let mut offset = 0usize;
        while let Some(row) = rows.next()? {
            let chunk: Vec<u8> = row.get(0)?;
            blob.write_at(&chunk, offset)?;
            offset += chunk.len();
        }
        drop(rows);
        blob.close()?;
        Ok(())
    }

    /// Bytes the stored value holds right now
    pub fn stored_len(&self, ctx: &mut CallContext, descriptor: &LobDescriptor) -> Result<u64> {
        let rowid = self.rowid;
        let len: Option<i64> = ctx.prepare_statement(descriptor.length_sql(), |stmt| {
            Ok(stmt
                .query_row([rowid], |row| row.get::<_, Option<i64>>(0))
                .optional()?
                .flatten())
        })?;
        Ok(len.unwrap_or(0).max(0) as u64)
    }

    /// Bytes staged so far
    pub fn staged(&self) -> u64 {
        self.staged
    }
}

#[derive(Debug)]
pub(crate) struct ReadHandle {
    rowid: i64,
    /// Byte offset of the next read
    position: u64,
    length: u64,
    /// Stored text is UTF-8 whatever the stream-side encoding is
    decoder: TextDecoder,
    window: Vec<u8>,
}

impl ReadHandle {
    pub fn new(rowid: i64, length: u64) -> Self {
        Self {
            rowid,
            position: 0,
            length,
            decoder: TextEncoding::Utf8.decoder(),
            window: Vec::new(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.length
    }

    /// Open the value for reading. An exhausted handle needs no blob.
    pub fn open<'c>(
        &self,
        conn: &'c Connection,
        descriptor: &LobDescriptor,
    ) -> Result<Option<Blob<'c>>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        open_blob(conn, descriptor, self.rowid, true).map(Some)
    }

    pub fn read_bytes(&mut self, blob: Option<&Blob<'_>>, buf: &mut [u8]) -> Result<Option<usize>> {
        let Some(blob) = blob else {
            self.position = self.length;
            return Ok(None);
        };
        if self.is_exhausted() {
            return Ok(None);
        }

        let remaining = to_offset(self.length - self.position)?;
        let want = buf.len().min(remaining);
        let n = blob.read_at(&mut buf[..want], to_offset(self.position)?)?;
        if n == 0 {
            // The value shrank under us; stop at what was there
            self.position = self.length;
            return Ok(None);
        }
        self.position += n as u64;
        Ok(Some(n))
    }

    /// Read up to `max_chars` bytes and decode them.
    ///
    /// A window that ends inside a character carries the partial sequence
    /// into the next call, so a call may yield fewer characters than bytes.
    pub fn read_text(
        &mut self,
        blob: Option<&Blob<'_>>,
        max_chars: usize,
    ) -> Result<Option<(String, usize)>> {
        let mut window = std::mem::take(&mut self.window);
        window.resize(max_chars, 0);

        let read = self.read_bytes(blob, &mut window);
        let decoded = match read {
            Ok(Some(n)) => self.decoder.decode(&window[..n]).map(|text| {
                let chars = text.chars().count();
                Some((text, chars))
            }),
            Ok(None) => self.decoder.finish().map(|()| None),
            Err(e) => Err(e),
        };

        self.window = window;
        decoded
    }
}
