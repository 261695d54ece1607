//! Run context: the state shared by every step of one workflow run.
//!
//! The active [`RunContext`] lives in a task-local slot that travels with the
//! orchestration future. Two runs polled on the same worker thread each see
//! only their own context, and futures joined inside a run share it. Work
//! handed to a separately spawned task must be wrapped with
//! [`RunContext::scope`] to stay part of the run.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use sagaflow_locator::{ResolveError, SharedResolver};
use serde::Serialize;
use tokio::task::futures::TaskLocalFuture;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::error::{BoxError, ContextError};

tokio::task_local! {
    static CURRENT_RUN: RunContext;
}

/// Retrieve the run context of the workflow run executing the current task.
///
/// # Errors
///
/// Returns [`ContextError::NoActiveRun`] when called outside of a run.
pub fn current() -> Result<RunContext, ContextError> {
    CURRENT_RUN
        .try_with(RunContext::clone)
        .map_err(|_| ContextError::NoActiveRun)
}

/// Whether the current task is executing inside a workflow run.
#[must_use]
pub fn is_active() -> bool {
    CURRENT_RUN.try_with(|_| ()).is_ok()
}

/// Unique identifier of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub(crate) type Undo = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// A registered rollback thunk.
pub(crate) struct Compensation {
    pub(crate) sequence: u64,
    pub(crate) step: String,
    pub(crate) description: String,
    pub(crate) record: usize,
    pub(crate) undo: Undo,
}

#[derive(Default)]
struct Ledger {
    next_sequence: u64,
    compensations: Vec<Compensation>,
    audit: AuditLog,
    failed_step: Option<String>,
    sealed: bool,
}

struct RunState {
    run_id: RunId,
    workflow: Arc<str>,
    resolver: SharedResolver,
    ledger: Mutex<Ledger>,
}

/// Per-run state: the resolver, the compensation stack and the audit log.
///
/// Cloning is cheap and yields a handle to the same run.
#[derive(Clone)]
pub struct RunContext {
    inner: Arc<RunState>,
}

impl RunContext {
    pub(crate) fn new(workflow: Arc<str>, resolver: SharedResolver) -> Self {
        Self {
            inner: Arc::new(RunState {
                run_id: RunId::new(),
                workflow,
                resolver,
                ledger: Mutex::new(Ledger::default()),
            }),
        }
    }

    /// Run `future` with this context as the ambient run context.
    ///
    /// The returned future owns its own handle to the run, so it can be handed
    /// to `tokio::spawn` to keep spawned work part of this run.
    pub fn scope<F>(&self, future: F) -> TaskLocalFuture<RunContext, F>
    where
        F: Future,
    {
        CURRENT_RUN.scope(self.clone(), future)
    }

    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.inner.run_id
    }

    #[must_use]
    pub fn workflow_name(&self) -> &str {
        &self.inner.workflow
    }

    #[must_use]
    pub fn resolver(&self) -> &SharedResolver {
        &self.inner.resolver
    }

    /// Number of compensations currently registered for this run.
    #[must_use]
    pub fn pending_compensations(&self) -> usize {
        self.ledger().compensations.len()
    }

    /// Whether rollback has started and no further compensations are accepted.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.ledger().sealed
    }

    /// Snapshot of the audit log so far.
    #[must_use]
    pub fn audit(&self) -> AuditLog {
        self.ledger().audit.clone()
    }

    pub(crate) fn step_context(&self, step: &str) -> StepContext {
        StepContext {
            run_id: self.inner.run_id,
            step: Arc::from(step),
            resolver: Arc::clone(&self.inner.resolver),
        }
    }

    pub(crate) fn begin_step(&self, step: &str) -> usize {
        self.ledger().audit.record_start(step)
    }

    /// Mark a step as failed and remember it as the cause of the run's
    /// failure until another step succeeds.
    pub(crate) fn fail_step(&self, record: usize, step: &str) {
        let mut ledger = self.ledger();
        ledger.audit.record_failure(record);
        if !ledger.sealed {
            ledger.failed_step = Some(step.to_string());
        }
    }

    /// Step whose error is the most recent one not followed by a successful step.
    pub(crate) fn failed_step(&self) -> Option<String> {
        self.ledger().failed_step.clone()
    }

    pub(crate) fn take_failed_step(&self) -> Option<String> {
        self.ledger().failed_step.take()
    }

    pub(crate) fn set_failed_step(&self, step: Option<String>) {
        self.ledger().failed_step = step;
    }

    /// Mark a step's forward phase as done and push its compensation, if any.
    ///
    /// Both happen under one lock so concurrent steps never interleave
    /// partial registrations.
    pub(crate) fn complete_step(
        &self,
        record: usize,
        step: &str,
        description: String,
        undo: Option<Undo>,
    ) {
        let mut ledger = self.ledger();
        if !ledger.sealed {
            ledger.failed_step = None;
        }

        let Some(undo) = undo else {
            ledger.audit.record_success(record, None);
            return;
        };

        if ledger.sealed {
            warn!(
                step,
                "step finished after rollback started; compensation not registered"
            );
            ledger.audit.record_finished_after_rollback(record);
            return;
        }

        let sequence = ledger.next_sequence;
        ledger.next_sequence += 1;
        ledger
            .audit
            .record_success(record, Some(description.clone()));
        ledger.compensations.push(Compensation {
            sequence,
            step: step.to_string(),
            description,
            record,
            undo,
        });
        debug!(step, sequence, "registered compensation");
    }

    /// Stop accepting compensations and take the stack as it stands.
    ///
    /// The returned stack is ordered by registration; pop from the back for
    /// LIFO rollback.
    pub(crate) fn seal(&self) -> Vec<Compensation> {
        let mut ledger = self.ledger();
        ledger.sealed = true;
        mem::take(&mut ledger.compensations)
    }

    pub(crate) fn record_compensated(&self, record: usize) {
        self.ledger().audit.record_compensated(record);
    }

    pub(crate) fn record_compensation_failed(&self, record: usize) {
        self.ledger().audit.record_compensation_failed(record);
    }

    /// Seal the run and hand out its final audit log.
    pub(crate) fn finish(&self) -> AuditLog {
        let mut ledger = self.ledger();
        ledger.sealed = true;
        mem::take(&mut ledger.audit)
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.inner
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.inner.run_id)
            .field("workflow", &self.inner.workflow)
            .field("pending_compensations", &self.pending_compensations())
            .finish_non_exhaustive()
    }
}

/// What a forward or compensate operation gets to work with.
#[derive(Clone)]
pub struct StepContext {
    run_id: RunId,
    step: Arc<str>,
    resolver: SharedResolver,
}

impl StepContext {
    /// Resolve a domain service registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] if `key` is unknown or holds another type.
    pub fn resolve<T>(&self, key: &str) -> Result<Arc<T>, ResolveError>
    where
        T: Any + Send + Sync,
    {
        self.resolver.resolve(key)
    }

    #[must_use]
    pub fn resolver(&self) -> &SharedResolver {
        &self.resolver
    }

    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.step
    }
}

impl fmt::Debug for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("run_id", &self.run_id)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}
