use std::io::Write;

use tracing::{info, instrument};

use super::report::{Tally, TransferReport, TransferResult};
use super::{Attempt, LobStreams, TransferFailure, TransferScope};
use crate::lob::{LobDescriptor, LobDownload, LobKind};
use crate::storage::{CallContext, StatementService};
use crate::types::{LobError, Result};

impl LobStreams {
    /// Copy a large object value into `destination`.
    ///
    /// A NULL value and an empty value both produce no output. Text values
    /// are encoded with the descriptor's encoding.
    #[instrument(skip_all, fields(table = %descriptor.table(), column = %descriptor.column(), scope = ?scope))]
    pub fn download_file<W: Write>(
        &self,
        destination: W,
        descriptor: &LobDescriptor,
        scope: TransferScope<'_>,
    ) -> TransferResult {
        let mut download = LobDownload::new(descriptor.clone());
        let statements = self.statements.as_ref();

        let ((bytes, sha256), outcome, suppressed) = self.scoped(scope, |ctx| {
            let mut tally = Tally::default();
            let mut suppressed = Vec::new();

            let mut result = read_all(ctx, &mut download, statements, destination, &mut tally);
            if result.is_err() {
                download.cancel();
            }

            match download.end_read() {
                Err(e) if result.is_ok() => {
                    download.cancel();
                    result = Err(e);
                }
                Err(e) => suppressed.push(e),
                Ok(()) => {}
            }

            Attempt {
                result: result.map(|()| tally.finish()),
                cancelled: download.is_cancelled(),
                suppressed,
            }
        })?;

        info!(
            %outcome,
            chunks = download.chunks(),
            units = download.units(),
            bytes,
            "Download finished"
        );
        Ok(TransferReport {
            outcome,
            chunks: download.chunks(),
            units: download.units(),
            bytes,
            sha256,
            suppressed,
        })
    }

    /// Download a value into memory
    pub fn download_bytes(
        &self,
        descriptor: &LobDescriptor,
        scope: TransferScope<'_>,
    ) -> std::result::Result<(Vec<u8>, TransferReport), TransferFailure> {
        let mut out = Vec::new();
        let report = self.download_file(&mut out, descriptor, scope)?;
        Ok((out, report))
    }

    /// Download a text value as a string, decoded with its encoding
    pub fn download_string(
        &self,
        descriptor: &LobDescriptor,
        scope: TransferScope<'_>,
    ) -> Result<String> {
        let LobKind::Text(encoding) = descriptor.kind() else {
            return Err(LobError::InvalidDescriptor(format!(
                "{} is not a text large object",
                descriptor
            )));
        };
        let (bytes, _) = self.download_bytes(descriptor, scope)?;

        let mut decoder = encoding.decoder();
        let text = decoder.decode(&bytes)?;
        decoder.finish()?;
        Ok(text)
    }
}

fn read_all<W: Write>(
    ctx: &mut CallContext,
    download: &mut LobDownload,
    statements: &dyn StatementService,
    mut destination: W,
    tally: &mut Tally,
) -> Result<()> {
    let chunk_size = download.begin_read(ctx, statements)?;
    let kind = download.descriptor().kind();
    let mut reader = download.reader(ctx)?;

    match kind {
        LobKind::Binary => {
            let mut buf = vec![0u8; chunk_size];
            while let Some(n) = reader.read(&mut buf)? {
                write_destination(&mut destination, &buf[..n])?;
                tally.record(&buf[..n]);
            }
        }
        LobKind::Text(encoding) => {
            let mut text = String::with_capacity(chunk_size);
            while reader.read_text(&mut text, chunk_size)?.is_some() {
                let bytes = encoding.encode(&text);
                write_destination(&mut destination, &bytes)?;
                tally.record(&bytes);
                text.clear();
            }
        }
    }

    destination
        .flush()
        .map_err(|e| LobError::space("Download destination write error", e))
}

fn write_destination<W: Write>(destination: &mut W, bytes: &[u8]) -> Result<()> {
    destination
        .write_all(bytes)
        .map_err(|e| LobError::space("Download destination write error", e))
}
