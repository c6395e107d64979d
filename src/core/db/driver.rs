/// Driver Capability
///
/// The mapper never talks to a database directly. A driver opens
/// connections, a connection hands out cursors, and a cursor executes one
/// statement at a time and exposes its result. The SQLite driver in
/// `core::db::sqlite` implements these traits over rusqlite; MySQL and
/// PostgreSQL drivers are supplied by the application.
use crate::core::value::Value;
use crate::core::{MapperError, Result};

/// Opens connections to one configured database.
pub trait SqlDriver: Send + Sync {
    fn connect(&self) -> Result<Box<dyn DriverConnection>>;

    /// Creates the configured database; used when `autocreate` is enabled and
    /// `connect` failed with `UnknownDatabase`.
    fn create_database(&self) -> Result<()> {
        Err(MapperError::Unsupported(
            "this driver cannot create databases".to_string(),
        ))
    }
}

/// A live connection.
pub trait DriverConnection {
    fn cursor(&mut self) -> Result<Box<dyn DriverCursor>>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Executes statements and holds the result of the last one.
///
/// Drivers report a dropped connection as `MapperError::ConnectionLost` and
/// constraint failures as `MapperError::ConstraintViolation`.
pub trait DriverCursor {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()>;

    /// Column names of the last result, in order.
    fn description(&self) -> &[String];

    fn fetch_one(&mut self) -> Result<Option<Vec<Value>>>;

    fn fetch_all(&mut self) -> Result<Vec<Vec<Value>>>;

    /// Rows affected (DML) or returned (queries) by the last statement.
    fn rowcount(&self) -> i64;

    fn last_insert_id(&self) -> Option<i64>;

    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// A fully fetched statement result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    /// Column names from the query result
    pub columns: Vec<String>,
    /// Rows of values, one entry per column
    pub rows: Vec<Vec<Value>>,
    /// Rows affected or returned
    pub rowcount: i64,
    /// Id generated by the last insert, if the driver reports one
    pub last_insert_id: Option<i64>,
}

impl ResultSet {
    /// Reads everything the cursor holds.
    pub fn from_cursor(cursor: &mut dyn DriverCursor) -> Result<Self> {
        let columns = cursor.description().to_vec();
        let rows = if columns.is_empty() {
            Vec::new()
        } else {
            cursor.fetch_all()?
        };
        Ok(ResultSet {
            columns,
            rows,
            rowcount: cursor.rowcount(),
            last_insert_id: cursor.last_insert_id(),
        })
    }

    /// First column of the first row.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}
