/// Database Module
///
/// This module provides the execution layer of the mapper, organized into
/// focused submodules.
///
/// ## Architecture
///
/// - **Driver Capability** (`driver.rs`): the traits a database driver implements
/// - **SQLite Driver** (`sqlite.rs`): the bundled driver over rusqlite
/// - **Connection Management** (`connection.rs`): connection, cursor pool and reconnect policy
/// - **Schema Introspection** (`schema.rs`): column metadata and its per-session cache
/// - **DDL Specs** (`ddl.rs`): column and index definitions and their validation
/// - **Query Building** (`query.rs`): statement assembly for table operations
/// - **Row Decoding** (`decode.rs`): result rows to nested mappings
///
/// ## Error Handling
///
/// All database operations use the shared `MapperError` type for consistent error propagation.
pub mod connection;
pub mod ddl;
pub mod decode;
pub mod driver;
pub mod query;
pub mod schema;
pub mod sqlite;

pub use connection::{ConnectionManager, PlaceholderStyle, PooledCursor};
pub use ddl::{ColumnSpec, IndexSpec};
pub use decode::{JoinSlot, RowDecoder};
pub use driver::{DriverConnection, DriverCursor, ResultSet, SqlDriver};
pub use query::{Find, QueryBuilder, Statement, StatementType};
pub use schema::{ColumnDescriptor, SchemaCache};
pub use sqlite::SqliteDriver;
