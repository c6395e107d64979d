/// Core Module
///
/// This module contains the building blocks the session facade is made of:
/// values and rows, SQL text helpers, the execution layer, commit/rollback
/// hooks and the shared error type.

pub mod db;
pub mod error;
pub mod events;
pub mod sql;
pub mod value;

// Re-export commonly used types for convenience
pub use error::{MapperError, Result};
pub use value::{Field, Row, Value};
