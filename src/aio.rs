//! Async access to a session.
//!
//! A [`Session`] stays on the thread that opened it, so [`AsyncSession`] opens
//! one on a dedicated worker thread and ships closures to it over a channel.
//! Every call awaits its own reply; calls run in the order they were made.

use crate::core::db::{ColumnDescriptor, ColumnSpec, Find, IndexSpec, ResultSet};
use crate::core::sql::{Filter, IdentifierQuoter};
use crate::core::value::{Row, Value};
use crate::core::{MapperError, Result};
use crate::session::{Database, Session};
use crate::table::{pairs, Table};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce(&mut Session) + Send>;

fn worker_stopped() -> MapperError {
    MapperError::ConnectionLost("session worker stopped".to_string())
}

/// Handle to a session running on its own thread.
///
/// Dropping the handle stops the worker; uncommitted work is discarded with
/// the connection.
#[derive(Debug)]
pub struct AsyncSession {
    jobs: mpsc::UnboundedSender<Job>,
    quoter: IdentifierQuoter,
}

impl AsyncSession {
    pub(crate) fn spawn(db: &Database) -> Result<Self> {
        let (jobs, mut inbox) = mpsc::unbounded_channel::<Job>();
        let quoter = db.dialect().quoter();
        let db = db.clone();
        thread::Builder::new()
            .name("tablemapper-session".to_string())
            .spawn(move || {
                let mut session = db.session();
                while let Some(job) = inbox.blocking_recv() {
                    job(&mut session);
                }
                if let Err(e) = session.close() {
                    warn!(error = %e, "closing worker session failed");
                }
                debug!("session worker stopped");
            })?;
        Ok(AsyncSession { jobs, quoter })
    }

    /// Runs `f` against the session on the worker thread.
    ///
    /// A panic inside `f` stops the worker; this call and every later one
    /// fail with `ConnectionLost`.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Session) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let job: Job = Box::new(move |session| {
            // The caller may have stopped waiting.
            let _ = reply.send(f(session));
        });
        self.jobs.send(job).map_err(|_| worker_stopped())?;
        response.await.map_err(|_| worker_stopped())?
    }

    /// A view of one table. The name is validated here.
    pub fn table(&self, name: &str) -> Result<AsyncTable<'_>> {
        self.quoter.quote(name)?;
        Ok(AsyncTable {
            session: self,
            name: name.to_string(),
        })
    }

    pub async fn tables(&self) -> Result<Vec<String>> {
        self.call(|s| s.tables()).await
    }

    pub async fn has_table(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.call(move |s| s.has_table(&name)).await
    }

    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<ResultSet> {
        let sql = sql.to_string();
        self.call(move |s| s.execute(&sql, &params)).await
    }

    pub async fn commit(&self) -> Result<()> {
        self.call(|s| s.commit()).await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.call(|s| s.rollback()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.call(|s| s.close()).await
    }

    /// Registers a hook that runs on the worker thread after the next commit.
    pub async fn on_commit<H>(&self, hook: H) -> Result<()>
    where
        H: FnOnce() -> Result<()> + Send + 'static,
    {
        self.call(move |s| {
            s.on_commit(hook);
            Ok(())
        })
        .await
    }

    pub async fn on_rollback<H>(&self, hook: H) -> Result<()>
    where
        H: FnOnce() -> Result<()> + Send + 'static,
    {
        self.call(move |s| {
            s.on_rollback(hook);
            Ok(())
        })
        .await
    }

    /// Runs `f` as a [`Session::transaction`] scope on the worker thread.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Session) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.call(move |s| s.transaction(f)).await
    }
}

/// Async counterpart of [`Table`].
#[derive(Debug)]
pub struct AsyncTable<'a> {
    session: &'a AsyncSession,
    name: String,
}

impl AsyncTable<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn with_table<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Table<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let name = self.name.clone();
        self.session
            .call(move |s| f(&mut s.table(&name)?))
            .await
    }

    pub async fn describe(&self) -> Result<Vec<ColumnDescriptor>> {
        self.with_table(|t| t.describe()).await
    }

    pub async fn get_column(&self, column: &str) -> Result<Option<ColumnDescriptor>> {
        let column = column.to_string();
        self.with_table(move |t| t.get_column(&column)).await
    }

    pub async fn primary_key(&self) -> Result<Option<String>> {
        self.with_table(|t| t.primary_key()).await
    }

    pub async fn insert<K, V, I>(&self, data: I) -> Result<Option<i64>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let data = pairs(data);
        self.with_table(move |t| t.insert(data)).await
    }

    pub async fn find(&self, find: Find) -> Result<Vec<Row>> {
        self.with_table(move |t| t.find(find)).await
    }

    pub async fn find_one(&self, find: Find) -> Result<Option<Row>> {
        self.with_table(move |t| t.find_one(find)).await
    }

    pub async fn get(&self, filter: impl Into<Filter>) -> Result<Option<Row>> {
        let filter = filter.into();
        self.with_table(move |t| t.get(filter)).await
    }

    pub async fn count(&self, filter: impl Into<Filter>) -> Result<i64> {
        let filter = filter.into();
        self.with_table(move |t| t.count(filter)).await
    }

    pub async fn update<K, V, I>(&self, filter: impl Into<Filter>, set: I) -> Result<u64>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let filter = filter.into();
        let set = pairs(set);
        self.with_table(move |t| t.update(filter, set)).await
    }

    pub async fn update_one<K, V, I>(&self, filter: impl Into<Filter>, set: I) -> Result<u64>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let filter = filter.into();
        let set = pairs(set);
        self.with_table(move |t| t.update_one(filter, set)).await
    }

    pub async fn delete(&self, filter: impl Into<Filter>) -> Result<u64> {
        let filter = filter.into();
        self.with_table(move |t| t.delete(filter)).await
    }

    pub async fn drop(&self, if_exists: bool) -> Result<()> {
        self.with_table(move |t| t.drop(if_exists)).await
    }

    pub async fn add_column(&self, spec: ColumnSpec) -> Result<bool> {
        self.with_table(move |t| t.add_column(spec)).await
    }

    pub async fn create_index(&self, spec: IndexSpec) -> Result<bool> {
        self.with_table(move |t| t.create_index(spec)).await
    }

    pub async fn has_index(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.with_table(move |t| t.has_index(&name)).await
    }
}
