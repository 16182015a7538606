use std::fmt;

use crate::types::{LobError, Result};

/// Lifecycle of one upload or download.
///
/// `New → Open → Streaming* → Ended`, or any non-terminal state → `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    New,
    Open,
    Streaming,
    Ended,
    Cancelled,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Cancelled)
    }

    /// Whether chunks may be transferred in this state
    pub fn is_streamable(&self) -> bool {
        matches!(self, Self::Open | Self::Streaming)
    }

    pub(crate) fn require_new(&self, op: &str) -> Result<()> {
        match self {
            Self::New => Ok(()),
            other => Err(LobError::illegal_state(format!(
                "{} called in state {}",
                op, other
            ))),
        }
    }

    pub(crate) fn require_streamable(&self, op: &str) -> Result<()> {
        if self.is_streamable() {
            Ok(())
        } else {
            Err(LobError::illegal_state(format!(
                "{} called in state {}",
                op, self
            )))
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Open => write!(f, "OPEN"),
            Self::Streaming => write!(f, "STREAMING"),
            Self::Ended => write!(f, "ENDED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}
