//! Unified Error Type System
//!
//! Centralized error type for the LOB streaming stack.
//! Classifies failures so callers can tell business failures from
//! infrastructure ones without knowing the driver's error hierarchy.
//!
//! ## Error Categories
//!
//! - **NotFound**: The locator matched no row (abort, no retry)
//! - **Recoverable**: Streaming failed after the row was located (cancel + rollback)
//! - **Invalid**: Caller supplied a malformed descriptor or called out of order
//! - **Fatal**: Configuration, connection or teardown failures

use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories used for propagation and rollback decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Locator matched zero rows
    NotFound,
    /// Application-level streaming failure
    Recoverable,
    /// Malformed request or protocol misuse
    Invalid,
    /// Infrastructure failure
    Fatal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Recoverable => write!(f, "RECOVERABLE"),
            Self::Invalid => write!(f, "INVALID"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

impl ErrorCategory {
    /// Whether the failure is meaningful to the business caller
    pub fn is_application(&self) -> bool {
        matches!(self, Self::NotFound | Self::Recoverable)
    }

    /// Whether locked content may exist that must be rolled back
    pub fn requires_rollback(&self) -> bool {
        !matches!(self, Self::NotFound | Self::Invalid)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum LobError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // -------------------------------------------------------------------------
    // Application Errors
    // -------------------------------------------------------------------------
    /// The row locator matched nothing
    #[error("Record of table '{table}' with {locator} was not found")]
    NotFound { table: String, locator: String },

    /// Failure while bytes were being streamed; always cancels the transfer
    #[error("{message}: {source}")]
    Space {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid large object descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    // -------------------------------------------------------------------------
    // Infrastructure Errors
    // -------------------------------------------------------------------------
    /// Data source name could not be resolved in the registry
    #[error("DataSource '{0}' not found")]
    Configuration(String),

    #[error("Connection creation error for '{data_source}' dataSource: {source}")]
    Connection {
        data_source: String,
        #[source]
        source: r2d2::Error,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("System error: {0}")]
    System(String),
}

pub type Result<T> = std::result::Result<T, LobError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl LobError {
    /// Create a streaming failure wrapping its cause
    pub fn space<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Space {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Create a not-found error for a table and rendered locator
    pub fn not_found(table: impl Into<String>, locator: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            locator: locator.into(),
        }
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Space { .. } => ErrorCategory::Recoverable,
            Self::InvalidDescriptor(_) | Self::IllegalState(_) => ErrorCategory::Invalid,
            Self::Io(_)
            | Self::Database(_)
            | Self::Configuration(_)
            | Self::Connection { .. }
            | Self::Config(_)
            | Self::System(_) => ErrorCategory::Fatal,
        }
    }

    /// Check if this error is a recoverable application failure
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Recoverable
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Wrap driver-level failures raised mid-stream as streaming failures.
    ///
    /// Errors that already carry a business meaning pass through unchanged.
    pub fn into_space(self, message: &str) -> Self {
        match self {
            Self::Database(e) => Self::space(message, e),
            Self::Io(e) => Self::space(message, e),
            other => other,
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| LobError::System(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| LobError::System(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
