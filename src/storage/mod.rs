pub mod connection;
pub mod context;
pub mod pool;
pub mod registry;
pub mod statement;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::DbConnection;
pub use context::CallContext;
pub use pool::{ConnectionPool, DataSource};
pub use registry::{ResourceRegistry, StaticRegistry};
pub use statement::{SqliteStatements, StatementService};
