//! Database handle and per-thread sessions.
//!
//! A [`Database`] holds the configuration, the driver and the dialect and can
//! be shared between threads. Each thread opens its own [`Session`]: one
//! logical connection with its cursor pool, schema cache and pending
//! commit/rollback hooks.

use crate::aio::AsyncSession;
use crate::config::DatabaseConfig;
use crate::core::db::schema::primary_key_of;
use crate::core::db::{
    ColumnDescriptor, ConnectionManager, ResultSet, SchemaCache, SqlDriver, SqliteDriver,
    Statement, StatementType,
};
use crate::core::events::EventHandle;
use crate::core::sql::{CompiledFilter, Filter, FilterCompiler, PrimaryKeySource};
use crate::core::value::Value;
use crate::core::{MapperError, Result};
use crate::dialect::{self, Dialect, EngineKind};
use crate::table::Table;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shareable factory for sessions.
#[derive(Clone)]
pub struct Database {
    config: DatabaseConfig,
    driver: Arc<dyn SqlDriver>,
    dialect: Arc<dyn Dialect>,
}

impl Database {
    /// Opens a database served by the bundled SQLite driver.
    ///
    /// MySQL and PostgreSQL need an application driver, see [`Database::with_driver`].
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        if config.engine != EngineKind::Sqlite {
            return Err(MapperError::Unsupported(format!(
                "no bundled driver for {}; use Database::with_driver",
                config.engine
            )));
        }
        let driver = SqliteDriver::new(config.path.clone());
        Self::with_driver(config, Arc::new(driver))
    }

    pub fn with_driver(config: DatabaseConfig, driver: Arc<dyn SqlDriver>) -> Result<Self> {
        config.validate()?;
        let dialect = dialect::for_config(&config);
        Ok(Database {
            config,
            driver,
            dialect,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Starts a session; it connects on first use.
    pub fn session(&self) -> Session {
        let conn = ConnectionManager::new(self.driver.clone())
            .with_setup(self.dialect.session_setup())
            .with_placeholders(self.dialect.placeholders())
            .with_autocreate(self.config.autocreate);
        Session {
            dialect: self.dialect.clone(),
            conn,
            schema: SchemaCache::new(),
            events: EventHandle::new(),
            depth: 0,
            generation: 0,
        }
    }

    /// Starts a session on its own worker thread, driven from async code.
    pub fn async_session(&self) -> Result<AsyncSession> {
        AsyncSession::spawn(self)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("engine", &self.config.engine)
            .field("dialect", &self.dialect)
            .finish()
    }
}

/// One logical connection and its state; used from one thread.
#[derive(Debug)]
pub struct Session {
    dialect: Arc<dyn Dialect>,
    conn: ConnectionManager,
    schema: SchemaCache,
    events: EventHandle,
    depth: usize,
    /// Connection generation the schema cache was filled under
    generation: u64,
}

/// Closes one `transaction` scope when dropped, also during unwinding.
struct ScopeGuard<'a> {
    session: &'a mut Session,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.session.depth -= 1;
    }
}

impl Session {
    /// A view of one table. The name is validated here.
    pub fn table(&mut self, name: &str) -> Result<Table<'_>> {
        self.dialect.quoter().quote(name)?;
        Ok(Table::new(self, name))
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Tables of the current database (schema on PostgreSQL).
    pub fn tables(&mut self) -> Result<Vec<String>> {
        let Statement { sql, params } = self.dialect.list_tables();
        let result = self.fetch(&sql, &params)?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| match row.into_iter().next() {
                Some(Value::Text(name)) => Some(name),
                Some(Value::Blob(bytes)) => String::from_utf8(bytes).ok(),
                _ => None,
            })
            .collect())
    }

    /// Answered from the schema cache when possible.
    pub fn has_table(&mut self, name: &str) -> Result<bool> {
        if self.schema.contains(name) {
            return Ok(true);
        }
        Ok(self.tables()?.iter().any(|t| t == name))
    }

    /// Column metadata, introspected once and cached until DDL touches the table.
    pub fn describe(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        if let Some(columns) = self.schema.get(table) {
            return Ok(columns);
        }
        let columns = self.dialect.describe(&mut self.conn, table);
        self.track_reconnect();
        let columns = columns?;
        self.schema.insert(table, columns.clone());
        Ok(columns)
    }

    pub fn primary_key(&mut self, table: &str) -> Result<Option<String>> {
        let columns = self.describe(table)?;
        Ok(primary_key_of(&columns).map(String::from))
    }

    /// Runs caller-written SQL with `?` placeholders.
    ///
    /// DDL run this way clears the whole schema cache.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let result = self.fetch(sql, params)?;
        if StatementType::from_sql(sql).is_ddl() {
            self.schema.clear();
        }
        Ok(result)
    }

    /// Commits, then fires the commit hooks.
    ///
    /// Hook errors are returned after the commit happened.
    pub fn commit(&mut self) -> Result<()> {
        self.conn.commit()?;
        debug!("committed");
        self.events.fire(true)
    }

    /// Rolls back, then fires the rollback hooks.
    pub fn rollback(&mut self) -> Result<()> {
        self.conn.rollback()?;
        debug!("rolled back");
        self.events.fire(false)
    }

    /// Closes the connection; the next operation reconnects.
    pub fn close(&mut self) -> Result<()> {
        self.schema.clear();
        self.conn.close()
    }

    pub fn on_commit<F>(&self, hook: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.events.on_commit(hook);
    }

    pub fn on_rollback<F>(&self, hook: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.events.on_rollback(hook);
    }

    /// Handle for registering hooks from inside other hooks.
    pub fn events(&self) -> EventHandle {
        self.events.clone()
    }

    /// Runs `f` as a transaction scope.
    ///
    /// Scopes nest: only the outermost one commits when `f` returns `Ok` or
    /// rolls back when it returns `Err`. A failed rollback is logged and the
    /// scope's own error is returned.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Session) -> Result<T>,
    {
        self.depth += 1;
        let result = {
            let mut scope = ScopeGuard { session: self };
            f(&mut *scope.session)
        };
        if self.depth > 0 {
            return result;
        }
        match result {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    warn!(error = %rollback, "rollback after failed transaction failed");
                }
                Err(e)
            }
        }
    }

    /// Depth of nested `transaction` scopes currently open.
    pub fn transaction_depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn compile(&mut self, table: &str, filter: &Filter) -> Result<CompiledFilter> {
        let compiler = FilterCompiler::new(self.dialect.quoter());
        compiler.compile(table, filter, self)
    }

    pub(crate) fn run(&mut self, statement: &Statement) -> Result<ResultSet> {
        self.fetch(&statement.sql, &statement.params)
    }

    /// Runs DDL for `table` and drops its cache entry, whether or not the DDL succeeded.
    pub(crate) fn run_ddl(&mut self, table: &str, sql: &str) -> Result<()> {
        let result = self.fetch(sql, &[]);
        self.schema.invalidate(table);
        result.map(|_| ())
    }

    pub(crate) fn has_index(&mut self, table: &str, name: &str) -> Result<bool> {
        let found = self.dialect.has_index(&mut self.conn, table, name);
        self.track_reconnect();
        found
    }

    fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let result = self.conn.fetch(sql, params);
        self.track_reconnect();
        result
    }

    /// Forgets cached schema once the connection was replaced; a new
    /// connection may not see the tables the old one created.
    fn track_reconnect(&mut self) {
        let generation = self.conn.generation();
        if generation == self.generation {
            return;
        }
        if self.generation > 0 {
            debug!(from = self.generation, to = generation, "reconnected, clearing schema cache");
        }
        self.schema.clear();
        self.generation = generation;
    }
}

impl PrimaryKeySource for Session {
    fn primary_key(&mut self, table: &str) -> Result<Option<String>> {
        let columns = self.describe(table)?;
        Ok(primary_key_of(&columns).map(String::from))
    }
}
