//! lobstream - Transactional Large Object Streaming
//!
//! Streams arbitrarily large binary and text column values into and out of a
//! database in bounded chunks, inside a transaction that commits on success
//! and rolls back whenever the transfer is cancelled.
//!
//! ## Core Features
//!
//! - **Chunked Protocol**: begin / continue / end state machines for upload and download
//! - **Call Context**: explicit per-call connection stack with statement tracking
//! - **Scoped Transfers**: commit or rollback decided by the cancelled flag, cleanup errors returned
//! - **Text Encodings**: UTF-8 and ISO-8859-1 byte streams over text columns
//!
//! ## Quick Start
//!
//! ```ignore
//! use lobstream::{Config, LobDescriptor, LobStreams, RowLocator, TransferScope};
//!
//! let streams = LobStreams::from_config(&Config::default());
//! let descriptor = LobDescriptor::binary("documents", "payload", RowLocator::primary_key([("id", 7)]))?;
//! let report = streams.upload_file(
//!     std::fs::File::open("scan.pdf")?,
//!     &descriptor,
//!     TransferScope::transactional("defaultDataSource", "Archive"),
//! )?;
//! println!("{} bytes, {}", report.bytes, report.outcome);
//! ```
//!
//! ## Modules
//!
//! - [`lob`]: descriptors, row locators and the upload/download protocols
//! - [`stream`]: blocking `Read`/`Write` adapters with transaction scoping
//! - [`storage`]: data source resolution, connection pooling and call contexts
//! - [`config`]: layered configuration

pub mod cli;
pub mod config;
pub mod constants;
pub mod lob;
pub mod storage;
pub mod stream;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, LobError, Result, ResultExt};

// Storage
pub use storage::{CallContext, ConnectionPool, StatementService};

// =============================================================================
// Protocol Re-exports
// =============================================================================

pub use lob::{
    KeyValue, LobDescriptor, LobDownload, LobKind, LobReader, LobUpload, RowLocator,
    TextEncoding, TransferState,
};

pub use stream::{LobStreams, Outcome, TransferFailure, TransferReport, TransferScope};
