//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Large object transfer constants
pub mod lob {
    /// Recommended chunk size returned when a stream begins (bytes or characters)
    pub const RECOMMENDED_CHUNK_SIZE: usize = 32_768;

    /// Empty binary sentinel
    pub const EMPTY_BLOB: &str = "X''";

    /// Empty text sentinel
    pub const EMPTY_CLOB: &str = "''";

    /// Session actions reported while streaming
    pub const ACTION_UPLOAD_BLOB: &str = "UploadBLOB";
    pub const ACTION_UPLOAD_CLOB: &str = "UploadCLOB";
    pub const ACTION_DOWNLOAD_BLOB: &str = "DownloadBLOB";
    pub const ACTION_DOWNLOAD_CLOB: &str = "DownloadCLOB";
}

/// Data source resolution constants
pub mod registry {
    /// Prefix tried when the bare data source name is not registered
    pub const CONTAINER_PREFIX: &str = "java:comp/env/";

    /// Data source name used when the caller does not pick one
    pub const DEFAULT_DATA_SOURCE: &str = "defaultDataSource";

    /// Module tag used when the caller does not pick one
    pub const DEFAULT_MODULE: &str = "lobstream";
}

/// Connection pool constants
pub mod pool {
    /// Minimum pool size regardless of CPU count
    pub const MIN_POOL_SIZE: u32 = 2;

    /// Maximum pool size regardless of CPU count
    pub const MAX_POOL_SIZE: u32 = 16;

    /// Timeout for checking a connection out of the pool (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

    /// How long SQLite waits on a locked database before failing (milliseconds)
    pub const BUSY_TIMEOUT_MS: u64 = 5_000;
}
