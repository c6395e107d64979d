/// Error Module
///
/// This module defines the error type shared by every layer of the mapper:
/// validation of identifiers and filters, DDL specs, driver failures and
/// commit/rollback hook failures.
use thiserror::Error;

/// Error type for all mapper operations.
///
/// Validation variants (`InvalidIdentifier`, `InvalidColumnSpec`,
/// `InvalidIndexSpec`, `InvalidJoin`, `InvalidQuery`,
/// `UnsupportedFilterType`) are raised before any SQL reaches the driver.
#[derive(Error, Debug)]
pub enum MapperError {
    /// A table or column name contains characters outside `[A-Za-z0-9_]`
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A column definition passed to `add_column` is inconsistent
    #[error("Invalid column spec: {0}")]
    InvalidColumnSpec(String),

    /// An index definition passed to `create_index` is inconsistent
    #[error("Invalid index spec: {0}")]
    InvalidIndexSpec(String),

    /// A join expression does not follow `table.col=local` or `table AS alias.col=local`
    #[error("Invalid join: {0}")]
    InvalidJoin(String),

    /// Mutually exclusive query options were combined
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The filter shape cannot be compiled into a WHERE clause
    #[error("Unsupported filter type: {0}")]
    UnsupportedFilterType(String),

    /// A primary-key filter was used on a table without a primary key
    #[error("No primary key on table `{0}`")]
    NoPrimaryKey(String),

    /// Constraint violation reported by the database, message kept verbatim
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The driver connection went away
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The configured database does not exist yet
    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    /// More than one commit/rollback hook failed
    #[error("{} hooks failed: {}", .0.len(), join_messages(.0))]
    AggregateHookFailure(Vec<MapperError>),

    /// Database-related errors from SQLite operations
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// SQL execution errors reported by a driver
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The operation is not available on this dialect or driver
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl MapperError {
    /// Whether this error means the connection is gone and may be re-established.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, MapperError::ConnectionLost(_))
    }
}

fn join_messages(errors: &[MapperError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Type alias for Result to use MapperError as the error type.
pub type Result<T> = std::result::Result<T, MapperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let db_err = MapperError::Database(rusqlite::Error::ExecuteReturnedResults);
        assert!(db_err.to_string().contains("Database error"));

        let ident_err = MapperError::InvalidIdentifier("a b".to_string());
        assert!(ident_err.to_string().contains("Invalid identifier"));

        let pk_err = MapperError::NoPrimaryKey("book".to_string());
        assert_eq!(pk_err.to_string(), "No primary key on table `book`");
    }

    #[test]
    fn test_aggregate_lists_every_failure() {
        let err = MapperError::AggregateHookFailure(vec![
            MapperError::Query("first".to_string()),
            MapperError::Query("second".to_string()),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 hooks failed"));
        assert!(msg.contains("first"));
        assert!(msg.contains("second"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MapperError = io_err.into();
        match err {
            MapperError::Io(_) => {}
            _ => panic!("Expected IO error"),
        }

        let json_err: std::result::Result<serde_json::Value, serde_json::Error> =
            serde_json::from_str("{ invalid json }");
        let err: MapperError = json_err.unwrap_err().into();
        match err {
            MapperError::Json(_) => {}
            _ => panic!("Expected JSON error"),
        }
    }

    #[test]
    fn test_connection_lost_classification() {
        assert!(MapperError::ConnectionLost("gone".to_string()).is_connection_lost());
        assert!(!MapperError::ConstraintViolation("dup".to_string()).is_connection_lost());
    }
}
