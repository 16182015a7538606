//! Transfer Commands
//!
//! Stream files into and out of large object columns.
//!
//! Usage:
//!   lobstream upload   -t TABLE -c COLUMN (--key k=v ... | --where SQL) FILE
//!   lobstream download -t TABLE -c COLUMN (--key k=v ... | --where SQL) FILE
//!   lobstream clear    -t TABLE -c COLUMN (--key k=v ... | --where SQL)
//!
//! `FILE` may be `-` for stdin/stdout.

use std::path::Path;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, LobTarget, STDIO, open_input, open_output};
use crate::stream::{TransferReport, TransferResult};
use crate::types::{LobError, Result};

/// Session options shared by every transfer command
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub data_source: Option<String>,
    pub module: Option<String>,
    pub json: bool,
}

pub fn upload(target: &LobTarget, file: &Path, session: &SessionOptions) -> Result<()> {
    let ctx = CommandContext::load()?;
    let descriptor = target.descriptor(&ctx.config)?;
    let source = open_input(file)?;

    let result = ctx.streams.upload_file(
        source,
        &descriptor,
        ctx.scope(session.data_source.as_deref(), session.module.as_deref()),
    );
    finish("Uploaded", target, result, session.json, false)
}

pub fn download(target: &LobTarget, file: &Path, session: &SessionOptions) -> Result<()> {
    let ctx = CommandContext::load()?;
    let descriptor = target.descriptor(&ctx.config)?;
    let destination = open_output(file)?;

    let result = ctx.streams.download_file(
        destination,
        &descriptor,
        ctx.scope(session.data_source.as_deref(), session.module.as_deref()),
    );
    finish(
        "Downloaded",
        target,
        result,
        session.json,
        file.as_os_str() == STDIO,
    )
}

pub fn clear(target: &LobTarget, session: &SessionOptions) -> Result<()> {
    let ctx = CommandContext::load()?;
    let descriptor = target.descriptor(&ctx.config)?;

    let result = ctx.streams.clear_lob(
        &descriptor,
        ctx.scope(session.data_source.as_deref(), session.module.as_deref()),
    );
    finish("Cleared", target, result, session.json, false)
}

fn finish(
    verb: &str,
    target: &LobTarget,
    result: TransferResult,
    json: bool,
    stdout_busy: bool,
) -> Result<()> {
    let output = Output::new();
    match result {
        Ok(report) => {
            if json {
                print_json(&report, stdout_busy)?;
            } else {
                output.report(verb, &target.label(), &report);
            }
            Ok(())
        }
        Err(failure) => {
            output.failure(&failure);
            Err(failure.into_error())
        }
    }
}

fn print_json(report: &TransferReport, stdout_busy: bool) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(report).map_err(|e| LobError::System(e.to_string()))?;
    if stdout_busy {
        eprintln!("{}", rendered);
    } else {
        println!("{}", rendered);
    }
    Ok(())
}
