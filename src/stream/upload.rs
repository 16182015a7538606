use std::io::Read;

use tracing::{info, instrument};

use super::report::{Tally, TransferReport, TransferResult};
use super::{Attempt, LobStreams, TransferScope, read_chunk};
use crate::lob::{LobDescriptor, LobKind, LobUpload, TextEncoding};
use crate::storage::{CallContext, StatementService};
use crate::types::{LobError, Result};

impl LobStreams {
    /// Replace a large object value with everything `source` yields.
    ///
    /// Text values are decoded from the descriptor's encoding. Either the
    /// whole stream is stored or, in a transactional scope, nothing is.
    #[instrument(skip_all, fields(table = %descriptor.table(), column = %descriptor.column(), scope = ?scope))]
    pub fn upload_file<R: Read>(
        &self,
        source: R,
        descriptor: &LobDescriptor,
        scope: TransferScope<'_>,
    ) -> TransferResult {
        let mut upload = LobUpload::new(descriptor.clone());
        let statements = self.statements.as_ref();

        let ((bytes, sha256), outcome, suppressed) = self.scoped(scope, |ctx| {
            let mut tally = Tally::default();
            let mut suppressed = Vec::new();

            let mut result = write_all(ctx, &mut upload, statements, source, &mut tally);
            if result.is_err() {
                upload.cancel();
            }

            // A failed end cancels the upload; it only surfaces when nothing failed before it
            match upload.end_write(ctx) {
                Err(e) if result.is_ok() => result = Err(e),
                Err(e) => suppressed.push(e),
                Ok(()) => {}
            }

            Attempt {
                result: result.map(|()| tally.finish()),
                cancelled: upload.is_cancelled(),
                suppressed,
            }
        })?;

        info!(
            %outcome,
            chunks = upload.chunks(),
            units = upload.units(),
            bytes,
            "Upload finished"
        );
        Ok(TransferReport {
            outcome,
            chunks: upload.chunks(),
            units: upload.units(),
            bytes,
            sha256,
            suppressed,
        })
    }

    /// Upload an in-memory payload
    pub fn upload_bytes(
        &self,
        payload: &[u8],
        descriptor: &LobDescriptor,
        scope: TransferScope<'_>,
    ) -> TransferResult {
        self.upload_file(payload, descriptor, scope)
    }

    /// Reset a value to the empty sentinel
    pub fn clear_lob(&self, descriptor: &LobDescriptor, scope: TransferScope<'_>) -> TransferResult {
        self.upload_file(std::io::empty(), descriptor, scope)
    }
}

fn write_all<R: Read>(
    ctx: &mut CallContext,
    upload: &mut LobUpload,
    statements: &dyn StatementService,
    mut source: R,
    tally: &mut Tally,
) -> Result<()> {
    let chunk_size = upload.begin_write(ctx, statements)?;
    let mut buf = vec![0u8; chunk_size];

    match upload.descriptor().kind() {
        LobKind::Binary => loop {
            let n = read_source(&mut source, &mut buf)?;
            if n == 0 {
                return Ok(());
            }
            tally.record(&buf[..n]);
            upload.continue_write(ctx, &buf[..n])?;
        },
        LobKind::Text(encoding) => write_text(ctx, upload, encoding, source, &mut buf, tally),
    }
}

fn write_text<R: Read>(
    ctx: &mut CallContext,
    upload: &mut LobUpload,
    encoding: TextEncoding,
    mut source: R,
    buf: &mut [u8],
    tally: &mut Tally,
) -> Result<()> {
    let mut decoder = encoding.decoder();
    loop {
        let n = read_source(&mut source, buf)?;
        if n == 0 {
            return decoder.finish();
        }
        tally.record(&buf[..n]);
        let text = decoder.decode(&buf[..n])?;
        upload.continue_write_text(ctx, &text)?;
    }
}

fn read_source<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    read_chunk(source, buf).map_err(|e| LobError::space("Upload source read error", e))
}
