/// SQLite Driver
///
/// Implements the driver traits over rusqlite. rusqlite runs in autocommit
/// mode, so the connection opens a transaction before the first statement
/// and `commit`/`rollback` end it, giving the same explicit-commit model as
/// the network drivers. Cursors share the connection and buffer their rows.
use super::driver::{DriverConnection, DriverCursor, SqlDriver};
use crate::core::value::Value;
use crate::core::{MapperError, Result};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, ToSql};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::debug;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

/// Maps rusqlite failures onto the mapper's error taxonomy.
fn classify(err: rusqlite::Error) -> MapperError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
            MapperError::ConstraintViolation(msg.clone().unwrap_or_else(|| e.to_string()))
        }
        _ => MapperError::Database(err),
    }
}

/// Opens rusqlite connections to a file or to `:memory:`.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    path: String,
}

impl SqliteDriver {
    pub fn new(path: impl Into<String>) -> Self {
        SqliteDriver { path: path.into() }
    }

    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SqlDriver for SqliteDriver {
    fn connect(&self) -> Result<Box<dyn DriverConnection>> {
        let conn = if self.path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(&self.path)?
        };
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        debug!(path = %self.path, "opened sqlite connection");
        Ok(Box::new(SqliteConnection {
            conn: Rc::new(RefCell::new(Some(conn))),
        }))
    }
}

type SharedConnection = Rc<RefCell<Option<Connection>>>;

struct SqliteConnection {
    conn: SharedConnection,
}

fn closed() -> MapperError {
    MapperError::ConnectionLost("sqlite connection is closed".to_string())
}

impl SqliteConnection {
    fn finish(&mut self, statement: &str) -> Result<()> {
        let guard = self.conn.borrow();
        let conn = guard.as_ref().ok_or_else(closed)?;
        if !conn.is_autocommit() {
            conn.execute_batch(statement).map_err(classify)?;
        }
        Ok(())
    }
}

impl DriverConnection for SqliteConnection {
    fn cursor(&mut self) -> Result<Box<dyn DriverCursor>> {
        if self.conn.borrow().is_none() {
            return Err(closed());
        }
        Ok(Box::new(SqliteCursor {
            conn: self.conn.clone(),
            columns: Vec::new(),
            rows: VecDeque::new(),
            rowcount: -1,
            last_insert_id: None,
            closed: false,
        }))
    }

    fn commit(&mut self) -> Result<()> {
        self.finish("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.finish("ROLLBACK")
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.borrow_mut().take() {
            conn.close().map_err(|(_, e)| MapperError::Database(e))?;
        }
        Ok(())
    }
}

struct SqliteCursor {
    conn: SharedConnection,
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
    rowcount: i64,
    last_insert_id: Option<i64>,
    closed: bool,
}

impl DriverCursor for SqliteCursor {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        if self.closed {
            return Err(MapperError::Query("cursor is closed".to_string()));
        }
        let guard = self.conn.borrow();
        let conn = guard.as_ref().ok_or_else(closed)?;
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN").map_err(classify)?;
        }

        let mut stmt = conn.prepare(sql).map_err(classify)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let params = rusqlite::params_from_iter(params.iter());

        self.rows.clear();
        if columns.is_empty() {
            let changed = stmt.execute(params).map_err(classify)?;
            self.rowcount = changed as i64;
            self.last_insert_id = Some(conn.last_insert_rowid());
        } else {
            let width = columns.len();
            let mut rows = stmt.query(params).map_err(classify)?;
            while let Some(row) = rows.next().map_err(classify)? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(Value::from(row.get_ref(i).map_err(classify)?));
                }
                self.rows.push_back(values);
            }
            self.rowcount = self.rows.len() as i64;
            self.last_insert_id = None;
        }
        self.columns = columns;
        Ok(())
    }

    fn description(&self) -> &[String] {
        &self.columns
    }

    fn fetch_one(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.rows.pop_front())
    }

    fn fetch_all(&mut self) -> Result<Vec<Vec<Value>>> {
        Ok(self.rows.drain(..).collect())
    }

    fn rowcount(&self) -> i64 {
        self.rowcount
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    fn close(&mut self) {
        self.closed = true;
        self.rows.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
