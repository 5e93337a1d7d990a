//! Database module: connection, execution and catalog introspection

pub mod connection;
pub mod executor;
pub mod introspect;
pub mod result;

pub use connection::{init_pool, DbPool};
pub use executor::{QueryExecutor, SqlBackend};
pub use introspect::SchemaIntrospector;
pub use result::{QueryResult, RowSet};
