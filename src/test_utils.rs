/// # Test Utilities Module
///
/// Fixtures shared by the unit tests:
/// - `FlakyDriver`: wraps a real driver and injects lost connections
/// - `RecordingDriver`: records statements and answers with canned results,
///   standing in for MySQL/PostgreSQL servers
/// - `init_tracing`: routes `tracing` output to the test harness

use crate::core::db::{DriverConnection, DriverCursor, ResultSet, SqlDriver};
use crate::core::value::Value;
use crate::core::{MapperError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Installs a fmt subscriber writing through the test harness; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Counters and switches shared by a `FlakyDriver` and everything it opened
#[derive(Debug, Default)]
pub struct FaultPlan {
    fail_executes: AtomicUsize,
    connects: AtomicUsize,
    cursors: AtomicUsize,
    require_database: AtomicBool,
    database_created: AtomicBool,
    statements: Mutex<Vec<String>>,
}

impl FaultPlan {
    /// Makes the next `n` executes fail with `ConnectionLost`
    pub fn fail_next_executes(&self, n: usize) {
        self.fail_executes.store(n, Ordering::SeqCst);
    }

    /// Makes `connect` fail with `UnknownDatabase` until `create_database` runs
    pub fn require_database(&self) {
        self.require_database.store(true, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn cursors_opened(&self) -> usize {
        self.cursors.load(Ordering::SeqCst)
    }

    pub fn database_created(&self) -> bool {
        self.database_created.load(Ordering::SeqCst)
    }

    /// Every statement executed so far, including failed ones
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn take_failure(&self) -> bool {
        self.fail_executes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Driver wrapper that injects faults into a real driver
#[derive(Clone)]
pub struct FlakyDriver {
    inner: Arc<dyn SqlDriver>,
    plan: Arc<FaultPlan>,
}

impl FlakyDriver {
    pub fn new(inner: impl SqlDriver + 'static) -> Self {
        FlakyDriver {
            inner: Arc::new(inner),
            plan: Arc::new(FaultPlan::default()),
        }
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.plan
    }
}

impl SqlDriver for FlakyDriver {
    fn connect(&self) -> Result<Box<dyn DriverConnection>> {
        self.plan.connects.fetch_add(1, Ordering::SeqCst);
        if self.plan.require_database.load(Ordering::SeqCst) && !self.plan.database_created() {
            return Err(MapperError::UnknownDatabase("unittest".to_string()));
        }
        Ok(Box::new(FlakyConnection {
            inner: self.inner.connect()?,
            plan: self.plan.clone(),
        }))
    }

    fn create_database(&self) -> Result<()> {
        self.plan.database_created.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FlakyConnection {
    inner: Box<dyn DriverConnection>,
    plan: Arc<FaultPlan>,
}

impl DriverConnection for FlakyConnection {
    fn cursor(&mut self) -> Result<Box<dyn DriverCursor>> {
        self.plan.cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FlakyCursor {
            inner: self.inner.cursor()?,
            plan: self.plan.clone(),
        }))
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.inner.rollback()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

struct FlakyCursor {
    inner: Box<dyn DriverCursor>,
    plan: Arc<FaultPlan>,
}

impl DriverCursor for FlakyCursor {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        if let Ok(mut log) = self.plan.statements.lock() {
            log.push(sql.to_string());
        }
        if self.plan.take_failure() {
            return Err(MapperError::ConnectionLost("injected fault".to_string()));
        }
        self.inner.execute(sql, params)
    }

    fn description(&self) -> &[String] {
        self.inner.description()
    }

    fn fetch_one(&mut self) -> Result<Option<Vec<Value>>> {
        self.inner.fetch_one()
    }

    fn fetch_all(&mut self) -> Result<Vec<Vec<Value>>> {
        self.inner.fetch_all()
    }

    fn rowcount(&self) -> i64 {
        self.inner.rowcount()
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.inner.last_insert_id()
    }

    fn close(&mut self) {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[derive(Debug, Default)]
struct Recording {
    responses: Vec<(String, ResultSet)>,
    statements: Vec<(String, Vec<Value>)>,
    commits: usize,
    rollbacks: usize,
}

/// Driver that records statements and answers them from canned results.
///
/// A statement gets the result registered under the longest matching SQL
/// prefix; anything else succeeds with rowcount 1 and no rows.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    state: Arc<Mutex<Recording>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &str, result: ResultSet) {
        if let Ok(mut state) = self.state.lock() {
            state.responses.push((prefix.to_string(), result));
        }
    }

    /// Executed statements with their parameters, in order
    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.state
            .lock()
            .map(|s| s.statements.clone())
            .unwrap_or_default()
    }

    /// Number of (commits, rollbacks)
    pub fn transactions(&self) -> (usize, usize) {
        self.state
            .lock()
            .map(|s| (s.commits, s.rollbacks))
            .unwrap_or_default()
    }

    fn answer(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| MapperError::Query(e.to_string()))?;
        state.statements.push((sql.to_string(), params.to_vec()));
        let canned = state
            .responses
            .iter()
            .filter(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, result)| result.clone());
        Ok(canned.unwrap_or(ResultSet {
            columns: Vec::new(),
            rows: Vec::new(),
            rowcount: 1,
            last_insert_id: Some(1),
        }))
    }
}

impl SqlDriver for RecordingDriver {
    fn connect(&self) -> Result<Box<dyn DriverConnection>> {
        Ok(Box::new(RecordingConnection {
            driver: self.clone(),
        }))
    }
}

struct RecordingConnection {
    driver: RecordingDriver,
}

impl DriverConnection for RecordingConnection {
    fn cursor(&mut self) -> Result<Box<dyn DriverCursor>> {
        Ok(Box::new(RecordingCursor {
            driver: self.driver.clone(),
            result: ResultSet::default(),
            closed: false,
        }))
    }

    fn commit(&mut self) -> Result<()> {
        if let Ok(mut state) = self.driver.state.lock() {
            state.commits += 1;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if let Ok(mut state) = self.driver.state.lock() {
            state.rollbacks += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct RecordingCursor {
    driver: RecordingDriver,
    result: ResultSet,
    closed: bool,
}

impl DriverCursor for RecordingCursor {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        self.result = self.driver.answer(sql, params)?;
        Ok(())
    }

    fn description(&self) -> &[String] {
        &self.result.columns
    }

    fn fetch_one(&mut self) -> Result<Option<Vec<Value>>> {
        if self.result.rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.result.rows.remove(0)))
    }

    fn fetch_all(&mut self) -> Result<Vec<Vec<Value>>> {
        Ok(std::mem::take(&mut self.result.rows))
    }

    fn rowcount(&self) -> i64 {
        self.result.rowcount
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.result.last_insert_id
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
