//! Stream Adapters
//!
//! Blocking `Read`/`Write` adapters over the upload and download protocols.
//! A transactional call owns its whole lifecycle in one scope:
//!
//! 1. open a fresh [`CallContext`] and begin on the data source
//! 2. begin the protocol, copy chunks until the stream is exhausted
//! 3. end the protocol
//! 4. commit, or roll back when the protocol was cancelled
//! 5. end the context, whatever happened above
//!
//! The commit/rollback decision looks only at the cancelled flag. Failures
//! after the first one are collected as suppressed errors and returned
//! with it.

mod download;
mod report;
mod upload;

pub use report::{Outcome, TransferFailure, TransferReport, TransferResult};

use std::io;
use std::sync::Arc;

use crate::config::Config;
use crate::storage::{CallContext, ConnectionPool, SqliteStatements, StatementService};
use crate::types::{ErrorCategory, LobError, Result, suppress};

/// Where a transfer runs
pub enum TransferScope<'a> {
    /// Own context and transaction on the named data source
    Transactional { data_source: String, module: String },
    /// Inside the caller's context; the caller commits and ends it
    Enlisted(&'a mut CallContext),
}

impl TransferScope<'_> {
    pub fn transactional(data_source: impl Into<String>, module: impl Into<String>) -> Self {
        TransferScope::Transactional {
            data_source: data_source.into(),
            module: module.into(),
        }
    }
}

impl std::fmt::Debug for TransferScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transactional {
                data_source,
                module,
            } => write!(f, "Transactional({}, {})", data_source, module),
            Self::Enlisted(ctx) => write!(f, "Enlisted({})", ctx.id()),
        }
    }
}

/// Result of the body of a scoped transfer
pub(crate) struct Attempt<T> {
    pub result: Result<T>,
    pub cancelled: bool,
    pub suppressed: Vec<LobError>,
}

/// Entry point for streaming large objects in and out of the database
pub struct LobStreams {
    pool: Arc<ConnectionPool>,
    statements: Arc<dyn StatementService>,
}

impl LobStreams {
    pub fn new(pool: Arc<ConnectionPool>, statements: Arc<dyn StatementService>) -> Self {
        Self { pool, statements }
    }

    /// Streams over the configured data sources with the default statement service
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(ConnectionPool::from_config(config)),
            Arc::new(SqliteStatements),
        )
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Fresh context over this instance's pool, for enlisted transfers
    pub fn context(&self) -> CallContext {
        CallContext::new(Arc::clone(&self.pool))
    }

    fn scoped<T>(
        &self,
        scope: TransferScope<'_>,
        body: impl FnOnce(&mut CallContext) -> Attempt<T>,
    ) -> std::result::Result<(T, Outcome, Vec<LobError>), TransferFailure> {
        match scope {
            TransferScope::Enlisted(ctx) => {
                let Attempt {
                    result, suppressed, ..
                } = body(ctx);
                match result {
                    Ok(value) => Ok((value, Outcome::Deferred, suppressed)),
                    Err(error) => Err(TransferFailure {
                        error,
                        outcome: Outcome::Deferred,
                        suppressed,
                    }),
                }
            }
            TransferScope::Transactional {
                data_source,
                module,
            } => {
                let mut ctx = CallContext::new(Arc::clone(&self.pool));
                if let Err(error) = ctx.begin(&data_source, &module) {
                    return Err(TransferFailure {
                        error,
                        outcome: Outcome::RolledBack,
                        suppressed: ctx.end(),
                    });
                }

                let Attempt {
                    mut result,
                    cancelled,
                    mut suppressed,
                } = body(&mut ctx);

                let outcome = if cancelled {
                    suppress(
                        ctx.rollback(),
                        "Rollback after cancelled transfer",
                        &mut suppressed,
                    );
                    Outcome::RolledBack
                } else {
                    match ctx.commit() {
                        Ok(()) => Outcome::Committed,
                        Err(e) if result.is_ok() => {
                            result = Err(e);
                            Outcome::RolledBack
                        }
                        Err(e) => {
                            suppressed.push(e);
                            Outcome::RolledBack
                        }
                    }
                };

                suppressed.extend(ctx.end());
                match &result {
                    Err(e) if e.category() == ErrorCategory::Fatal => tracing::error!(
                        %outcome,
                        suppressed = suppressed.len(),
                        "Transfer failed: {}",
                        e
                    ),
                    Err(e) => tracing::warn!(
                        %outcome,
                        suppressed = suppressed.len(),
                        "Transfer failed: {}",
                        e
                    ),
                    Ok(_) => {}
                }

                match result {
                    Ok(value) => Ok((value, outcome, suppressed)),
                    Err(error) => Err(TransferFailure {
                        error,
                        outcome,
                        suppressed,
                    }),
                }
            }
        }
    }
}

/// Fill as much of `buf` as one read gives, retrying interrupted reads
pub(crate) fn read_chunk<R: io::Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match source.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lob::{KeyValue, LobDescriptor, RowLocator, TextEncoding};
    use crate::storage::testing::TestDatabase;
    use proptest::prelude::*;
    use rand::Rng;

    fn streams(db: &TestDatabase) -> LobStreams {
        LobStreams::new(Arc::clone(&db.pool), Arc::new(SqliteStatements))
    }

    fn scope() -> TransferScope<'static> {
        TransferScope::transactional("defaultDataSource", "Test")
    }

    fn blob(id: i64) -> LobDescriptor {
        LobDescriptor::binary("documents", "payload", RowLocator::primary_key([("id", id)])).unwrap()
    }

    fn round_trip(streams: &LobStreams, descriptor: &LobDescriptor, payload: &[u8]) -> Vec<u8> {
        let up = streams.upload_bytes(payload, descriptor, scope()).unwrap();
        assert_eq!(up.outcome, Outcome::Committed);
        let (bytes, down) = streams.download_bytes(descriptor, scope()).unwrap();
        assert_eq!(up.sha256, down.sha256);
        bytes
    }

    #[test]
    fn test_round_trip_at_chunk_boundaries() {
        let db = TestDatabase::new();
        let streams = streams(&db);
        let chunk = 64;
        let descriptor = blob(1).with_chunk_size(chunk);
        let mut rng = rand::rng();

        for len in [0, 1, chunk - 1, chunk, chunk + 1, 3 * chunk, 3 * chunk + 1] {
            let payload: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            assert_eq!(round_trip(&streams, &descriptor, &payload), payload, "len {}", len);
        }
    }

    #[test]
    fn test_round_trip_default_chunk_size() {
        let db = TestDatabase::new();
        let streams = streams(&db);
        let descriptor = blob(2);
        let chunk = descriptor.recommended_chunk_size();
        let mut rng = rand::rng();

        for len in [chunk - 1, chunk, chunk + 1] {
            let payload: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            assert_eq!(round_trip(&streams, &descriptor, &payload), payload);
        }
    }

    #[test]
    fn test_text_round_trip_across_split_characters() {
        let db = TestDatabase::new();
        let streams = streams(&db);
        // 3-byte characters never align with a 4-byte chunk
        let descriptor = LobDescriptor::text(
            "documents",
            "body",
            RowLocator::primary_key([("id", 2)]),
            TextEncoding::Utf8,
        )
        .unwrap()
        .with_chunk_size(4);

        let text = "✓✓✓ mixed ascii and ✓";
        assert_eq!(round_trip(&streams, &descriptor, text.as_bytes()), text.as_bytes());
        assert_eq!(db.body(2).unwrap(), text);
    }

    #[test]
    fn test_text_round_trip_with_nul() {
        let db = TestDatabase::new();
        let streams = streams(&db);
        let descriptor = LobDescriptor::text(
            "documents",
            "body",
            RowLocator::primary_key([("id", 1)]),
            TextEncoding::Utf8,
        )
        .unwrap()
        .with_chunk_size(4);

        let report = streams
            .upload_bytes(b"before\0after", &descriptor, scope())
            .unwrap();
        assert_eq!(report.units, 12);
        assert_eq!(
            streams.download_string(&descriptor, scope()).unwrap(),
            "before\0after"
        );
        assert_eq!(db.body(1).unwrap(), "before\0after");
    }

    #[test]
    fn test_multi_megabyte_round_trip() {
        let db = TestDatabase::new();
        let streams = streams(&db);
        let descriptor = blob(1);
        let mut rng = rand::rng();
        let payload: Vec<u8> = (0..8 << 20).map(|_| rng.random()).collect();

        // Each chunk is staged once and copied once, so this stays linear
        let up = streams.upload_bytes(&payload, &descriptor, scope()).unwrap();
        assert_eq!(up.chunks, 256);

        let (bytes, down) = streams.download_bytes(&descriptor, scope()).unwrap();
        assert!(bytes == payload);
        assert_eq!(down.chunks, 256);
        assert_eq!(up.sha256, down.sha256);
    }

    #[test]
    fn test_composite_key_round_trip() {
        let db = TestDatabase::new();
        let streams = streams(&db);
        let descriptor = LobDescriptor::binary(
            "attachments",
            "content",
            RowLocator::primary_key([
                ("owner", KeyValue::from("O'Brien")),
                ("seq", KeyValue::from(1)),
            ]),
        )
        .unwrap();

        assert_eq!(round_trip(&streams, &descriptor, b"quoted key"), b"quoted key");
    }

    #[test]
    fn test_rejected_value_restores_previous_state() {
        let db = TestDatabase::new();
        db.execute(
            "CREATE TABLE limited (id INTEGER PRIMARY KEY, data BLOB CHECK (length(data) <= 10));
             INSERT INTO limited (id, data) VALUES (1, X'CAFE');",
        );
        let descriptor = LobDescriptor::binary(
            "limited",
            "data",
            RowLocator::predicate("id = 1"),
        )
        .unwrap()
        .with_chunk_size(4);

        let streams = streams(&db);
        let failure = streams
            .upload_bytes(&[7u8; 16], &descriptor, scope())
            .unwrap_err();
        assert_eq!(failure.outcome, Outcome::RolledBack);
        assert!(failure.error.is_recoverable());

        let (bytes, _) = streams.download_bytes(&descriptor, scope()).unwrap();
        assert_eq!(bytes, vec![0xCA, 0xFE]);
    }

    #[test]
    fn test_concurrent_uploads_are_isolated() {
        let db = TestDatabase::new();
        let streams = Arc::new(streams(&db));

        let handles: Vec<_> = [(1i64, 0x11u8), (2, 0x22)]
            .into_iter()
            .map(|(id, fill)| {
                let streams = Arc::clone(&streams);
                std::thread::spawn(move || {
                    let descriptor = blob(id).with_chunk_size(1024);
                    let payload = vec![fill; 10_000];
                    let report = streams.upload_bytes(&payload, &descriptor, scope()).unwrap();
                    assert_eq!(report.outcome, Outcome::Committed);
                    assert!(report.suppressed.is_empty());
                    payload
                })
            })
            .collect();

        let payloads: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(db.payload(1).unwrap(), payloads[0]);
        assert_eq!(db.payload(2).unwrap(), payloads[1]);
    }

    #[test]
    fn test_enlisted_transfers_share_caller_transaction() {
        let db = TestDatabase::new();
        let streams = streams(&db);
        let mut ctx = streams.context();
        ctx.begin("defaultDataSource", "Batch").unwrap();

        streams
            .upload_bytes(b"one", &blob(1), TransferScope::Enlisted(&mut ctx))
            .unwrap();
        streams
            .upload_bytes(b"two", &blob(2), TransferScope::Enlisted(&mut ctx))
            .unwrap();
        let (read_back, report) = streams
            .download_bytes(&blob(1), TransferScope::Enlisted(&mut ctx))
            .unwrap();
        assert_eq!(read_back, b"one");
        assert_eq!(report.outcome, Outcome::Deferred);

        ctx.commit().unwrap();
        assert!(ctx.end().is_empty());
        assert_eq!(db.payload(2).unwrap(), b"two".to_vec());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..2048), chunk in 1usize..300) {
            let db = TestDatabase::new();
            let streams = streams(&db);
            let descriptor = blob(3).with_chunk_size(chunk);
            prop_assert_eq!(round_trip(&streams, &descriptor, &payload), payload);
        }
    }
}
