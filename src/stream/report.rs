//! Transfer outcomes
//!
//! Every stream adapter call ends with an explicit outcome value: what
//! happened to the transaction, how much moved, and which secondary
//! failures were suppressed on the way out.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

use crate::types::LobError;

/// What happened to the transaction that carried the transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Committed,
    RolledBack,
    /// Enlisted in the caller's context; the caller decides
    Deferred,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransferReport {
    pub outcome: Outcome,
    /// Chunks handed to or taken from the protocol object
    pub chunks: u64,
    /// Bytes (binary) or characters (text) stored in the column
    pub units: u64,
    /// Bytes read from the source or written to the destination
    pub bytes: u64,
    /// SHA-256 of the stream-side bytes, lowercase hex
    pub sha256: String,
    /// Teardown failures that did not affect the outcome
    #[serde(skip)]
    pub suppressed: Vec<LobError>,
}

/// Failed transfer: the primary error plus everything suppressed after it
#[derive(Debug, Error)]
#[error("{error}")]
pub struct TransferFailure {
    #[source]
    pub error: LobError,
    pub outcome: Outcome,
    pub suppressed: Vec<LobError>,
}

impl TransferFailure {
    pub fn new(error: LobError, outcome: Outcome) -> Self {
        Self {
            error,
            outcome,
            suppressed: Vec::new(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.error.is_not_found()
    }

    pub fn into_error(self) -> LobError {
        self.error
    }
}

impl From<TransferFailure> for LobError {
    fn from(failure: TransferFailure) -> Self {
        failure.error
    }
}

pub type TransferResult = std::result::Result<TransferReport, TransferFailure>;

/// Running totals for the stream side of a transfer
#[derive(Default)]
pub(crate) struct Tally {
    pub bytes: u64,
    digest: Sha256,
}

impl Tally {
    pub fn record(&mut self, bytes: &[u8]) {
        self.bytes += bytes.len() as u64;
        self.digest.update(bytes);
    }

    pub fn finish(self) -> (u64, String) {
        (self.bytes, format!("{:x}", self.digest.finalize()))
    }
}
