// Core infrastructure modules
pub mod core;

// Configuration, dialects and the session facade
pub mod config;
pub mod dialect;
pub mod session;
pub mod table;

// Async facade over a session on a worker thread
pub mod aio;

#[cfg(test)]
mod test_utils;

pub use crate::aio::{AsyncSession, AsyncTable};
pub use crate::config::{Config, DatabaseConfig};
pub use crate::core::db::{ColumnDescriptor, ColumnSpec, Find, IndexSpec, ResultSet, SqlDriver};
pub use crate::core::sql::Filter;
pub use crate::core::{Field, MapperError, Result, Row, Value};
pub use crate::dialect::EngineKind;
pub use crate::session::{Database, Session};
pub use crate::table::Table;
