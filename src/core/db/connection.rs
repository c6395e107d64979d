/// Connection Management Module
///
/// This module owns the driver connection of one session, its pool of idle
/// cursors, and the single reconnect-and-retry policy applied when the
/// connection is lost.

use super::driver::{DriverConnection, DriverCursor, ResultSet, SqlDriver};
use crate::core::value::Value;
use crate::core::{MapperError, Result};
use std::borrow::Cow;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How bound parameters are written in the SQL sent to the driver.
///
/// Statements are always built with `?`; `Numbered` rewrites them as `$1`, `$2`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    #[default]
    Question,
    Numbered,
}

impl PlaceholderStyle {
    /// Rewrites `?` placeholders, leaving quoted literals and identifiers alone.
    pub fn render<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        match self {
            PlaceholderStyle::Question => Cow::Borrowed(sql),
            PlaceholderStyle::Numbered => {
                if !sql.contains('?') {
                    return Cow::Borrowed(sql);
                }
                let mut out = String::with_capacity(sql.len() + 8);
                let mut quote: Option<char> = None;
                let mut n = 0;
                for c in sql.chars() {
                    match quote {
                        Some(q) if c == q => quote = None,
                        Some(_) => {}
                        None if c == '\'' || c == '"' || c == '`' => quote = Some(c),
                        None if c == '?' => {
                            n += 1;
                            out.push('$');
                            out.push_str(&n.to_string());
                            continue;
                        }
                        None => {}
                    }
                    out.push(c);
                }
                Cow::Owned(out)
            }
        }
    }
}

/// A cursor checked out of the pool, tagged with the connection it belongs to.
pub struct PooledCursor {
    generation: u64,
    cursor: Box<dyn DriverCursor>,
}

impl PooledCursor {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Deref for PooledCursor {
    type Target = dyn DriverCursor;

    fn deref(&self) -> &Self::Target {
        &*self.cursor
    }
}

impl DerefMut for PooledCursor {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.cursor
    }
}

/// Connection manager for one session
pub struct ConnectionManager {
    driver: Arc<dyn SqlDriver>,
    connection: Option<Box<dyn DriverConnection>>,
    idle: Vec<PooledCursor>,
    /// Statements run once on every newly opened cursor
    setup: Vec<String>,
    placeholders: PlaceholderStyle,
    autocreate: bool,
    /// Bumped on every (re)connect; cursors from older generations are never reused
    generation: u64,
}

impl ConnectionManager {
    /// Creates a manager that connects lazily on first use
    pub fn new(driver: Arc<dyn SqlDriver>) -> Self {
        ConnectionManager {
            driver,
            connection: None,
            idle: Vec::new(),
            setup: Vec::new(),
            placeholders: PlaceholderStyle::default(),
            autocreate: false,
            generation: 0,
        }
    }

    pub fn with_setup(mut self, setup: Vec<String>) -> Self {
        self.setup = setup;
        self
    }

    pub fn with_placeholders(mut self, style: PlaceholderStyle) -> Self {
        self.placeholders = style;
        self
    }

    pub fn with_autocreate(mut self, autocreate: bool) -> Self {
        self.autocreate = autocreate;
        self
    }

    /// Opens a fresh driver connection, replacing the current one
    ///
    /// # Returns
    ///
    /// `Ok(())` on success. With autocreate enabled, an `UnknownDatabase`
    /// failure creates the database and connects again.
    pub fn connect(&mut self) -> Result<()> {
        let conn = match self.driver.connect() {
            Ok(conn) => conn,
            Err(MapperError::UnknownDatabase(name)) if self.autocreate => {
                info!(database = %name, "database missing, creating it");
                self.driver.create_database()?;
                self.driver.connect()?
            }
            Err(e) => return Err(e),
        };
        self.connection = Some(conn);
        self.generation += 1;
        info!(generation = self.generation, "connected");
        Ok(())
    }

    /// Checks if there's an active database connection
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Number of (re)connects so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of cursors waiting in the pool
    pub fn idle_cursors(&self) -> usize {
        self.idle.len()
    }

    /// Pops an idle cursor or opens a new one
    ///
    /// A new cursor runs the setup statements (isolation level, search path)
    /// before it is handed out.
    pub fn acquire_cursor(&mut self) -> Result<PooledCursor> {
        if let Some(cursor) = self.idle.pop() {
            return Ok(cursor);
        }
        if self.connection.is_none() {
            self.connect()?;
        }
        let conn = self
            .connection
            .as_mut()
            .ok_or_else(|| MapperError::ConnectionLost("no connection".to_string()))?;
        let mut cursor = conn.cursor()?;
        for statement in &self.setup {
            debug!(sql = %statement, "cursor setup");
            cursor.execute(statement, &[])?;
        }
        Ok(PooledCursor {
            generation: self.generation,
            cursor,
        })
    }

    /// Returns a cursor to the pool unless it is closed or belongs to a replaced connection
    pub fn release_cursor(&mut self, mut cursor: PooledCursor) {
        if cursor.is_closed() {
            return;
        }
        if cursor.generation != self.generation {
            cursor.close();
            return;
        }
        self.idle.push(cursor);
    }

    /// Executes a statement and returns the cursor holding its result
    ///
    /// # Arguments
    ///
    /// * `sql` - Statement with `?` placeholders
    /// * `params` - Values bound in placeholder order
    ///
    /// # Returns
    ///
    /// The executed cursor; the caller hands it back with `release_cursor`.
    ///
    /// # Errors
    ///
    /// A `ConnectionLost` failure triggers one reconnect and one retry with a
    /// fresh cursor. Any other error, and a second failure, is returned as is.
    pub fn try_execute(&mut self, sql: &str, params: &[Value]) -> Result<PooledCursor> {
        let sql = self.placeholders.render(sql);
        debug!(sql = %sql, params = params.len(), "execute");
        match self.attempt(&sql, params) {
            Err(e) if e.is_connection_lost() => {
                warn!(error = %e, "connection lost, reconnecting and retrying once");
                self.reconnect()?;
                self.attempt(&sql, params)
            }
            other => other,
        }
    }

    fn attempt(&mut self, sql: &str, params: &[Value]) -> Result<PooledCursor> {
        let mut cursor = self.acquire_cursor()?;
        match cursor.execute(sql, params) {
            Ok(()) => Ok(cursor),
            Err(e) => {
                self.release_cursor(cursor);
                Err(e)
            }
        }
    }

    /// Executes a statement and reads its whole result
    pub fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let mut cursor = self.try_execute(sql, params)?;
        let result = ResultSet::from_cursor(&mut *cursor);
        self.release_cursor(cursor);
        result
    }

    /// Drops the connection and every pooled cursor, then connects again
    pub fn reconnect(&mut self) -> Result<()> {
        if let Err(e) = self.shutdown() {
            debug!(error = %e, "error while closing the lost connection");
        }
        self.connect()
    }

    pub fn commit(&mut self) -> Result<()> {
        match self.connection.as_mut() {
            Some(conn) => conn.commit(),
            None => Ok(()),
        }
    }

    pub fn rollback(&mut self) -> Result<()> {
        match self.connection.as_mut() {
            Some(conn) => conn.rollback(),
            None => Ok(()),
        }
    }

    /// Closes pooled cursors and the connection; the next use reconnects
    pub fn close(&mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        for mut cursor in self.idle.drain(..) {
            cursor.close();
        }
        match self.connection.take() {
            Some(mut conn) => conn.close(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connected", &self.connection.is_some())
            .field("idle", &self.idle.len())
            .field("setup", &self.setup)
            .field("placeholders", &self.placeholders)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
