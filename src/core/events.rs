/// Commit / Rollback Hooks
///
/// A session collects zero-argument callbacks to run after its next commit or
/// rollback. Each commit/rollback takes both lists at once, runs the matching
/// one and drops the other, so a hook fires at most once.
use crate::core::{MapperError, Result};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::warn;

/// A commit or rollback callback.
pub type Hook = Box<dyn FnOnce() -> Result<()>>;

/// Hooks waiting for the end of the current transaction.
#[derive(Default)]
pub struct PendingEvents {
    on_commit: Vec<Hook>,
    on_rollback: Vec<Hook>,
}

impl PendingEvents {
    pub fn is_empty(&self) -> bool {
        self.on_commit.is_empty() && self.on_rollback.is_empty()
    }

    /// Runs the commit hooks (`success`) or the rollback hooks, in registration order.
    ///
    /// Every hook runs even if an earlier one failed. One failure is returned
    /// as is; several are wrapped in `AggregateHookFailure`.
    pub fn fire(self, success: bool) -> Result<()> {
        let hooks = if success { self.on_commit } else { self.on_rollback };
        let mut errors = Vec::new();
        for hook in hooks {
            if let Err(e) = hook() {
                warn!(error = %e, success, "transaction hook failed");
                errors.push(e);
            }
        }
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(MapperError::AggregateHookFailure(errors)),
        }
    }
}

impl fmt::Debug for PendingEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEvents")
            .field("on_commit", &self.on_commit.len())
            .field("on_rollback", &self.on_rollback.len())
            .finish()
    }
}

/// Per-session hook registry.
#[derive(Debug, Default)]
pub struct TransactionContext {
    pending: PendingEvents,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_commit(&mut self, hook: Hook) {
        self.pending.on_commit.push(hook);
    }

    pub fn on_rollback(&mut self, hook: Hook) {
        self.pending.on_rollback.push(hook);
    }

    /// Whether any hook is waiting.
    pub fn is_armed(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of (commit, rollback) hooks waiting.
    pub fn pending(&self) -> (usize, usize) {
        (self.pending.on_commit.len(), self.pending.on_rollback.len())
    }

    /// Swaps out both lists, leaving the context idle.
    pub fn take(&mut self) -> PendingEvents {
        std::mem::take(&mut self.pending)
    }
}

/// Shared handle to a session's hooks.
///
/// Hooks can capture a clone to register follow-up hooks while they run;
/// those land in the fresh lists and wait for the next commit or rollback.
#[derive(Debug, Clone, Default)]
pub struct EventHandle {
    inner: Rc<RefCell<TransactionContext>>,
}

impl EventHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_commit<F>(&self, hook: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.inner.borrow_mut().on_commit(Box::new(hook));
    }

    pub fn on_rollback<F>(&self, hook: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.inner.borrow_mut().on_rollback(Box::new(hook));
    }

    pub fn is_armed(&self) -> bool {
        self.inner.borrow().is_armed()
    }

    pub fn pending(&self) -> (usize, usize) {
        self.inner.borrow().pending()
    }

    /// Takes the pending hooks and fires them.
    ///
    /// The registry borrow ends before any hook runs.
    pub fn fire(&self, success: bool) -> Result<()> {
        let pending = self.inner.borrow_mut().take();
        pending.fire(success)
    }
}
