//! In-memory domain services the create-issue workflow talks to.
//!
//! Every service is shared by all runs of one invocation, so concurrent runs
//! observe each other's side effects here while their compensation stacks
//! stay separate.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sagaflow::Container;
use serde::Serialize;
use tracing::debug;

use crate::error::IssueError;
use crate::workflow::StepName;

pub(crate) const ISSUE_STORE: &str = "issue_store";
pub(crate) const AUDIT_TRAIL: &str = "audit_trail";
pub(crate) const EVENT_BUS: &str = "event_bus";
pub(crate) const NOTIFIER: &str = "notifier";
pub(crate) const FAULTS: &str = "faults";

pub(crate) type IssueId = u64;
pub(crate) type AuditEntryId = u64;
pub(crate) type NotificationId = u64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn next(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Issue {
    pub(crate) id: IssueId,
    pub(crate) title: String,
    pub(crate) assignee: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct IssueStore {
    next_id: AtomicU64,
    issues: Mutex<BTreeMap<IssueId, Issue>>,
}

impl IssueStore {
    pub(crate) fn create(&self, title: &str, assignee: Option<&str>) -> Result<Issue, IssueError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(IssueError::EmptyTitle);
        }
        let issue = Issue {
            id: next(&self.next_id),
            title: title.to_string(),
            assignee: assignee.map(str::to_string),
        };
        lock(&self.issues).insert(issue.id, issue.clone());
        debug!(issue = issue.id, "issue created");
        Ok(issue)
    }

    pub(crate) fn delete(&self, id: IssueId) -> Result<Issue, IssueError> {
        let removed = lock(&self.issues)
            .remove(&id)
            .ok_or(IssueError::IssueNotFound(id))?;
        debug!(issue = id, "issue deleted");
        Ok(removed)
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.issues).len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AuditEntry {
    pub(crate) id: AuditEntryId,
    pub(crate) issue: IssueId,
    pub(crate) action: String,
}

#[derive(Debug, Default)]
pub(crate) struct AuditTrail {
    next_id: AtomicU64,
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditTrail {
    pub(crate) fn append(&self, issue: IssueId, action: impl Into<String>) -> AuditEntryId {
        let entry = AuditEntry {
            id: next(&self.next_id),
            issue,
            action: action.into(),
        };
        let id = entry.id;
        lock(&self.entries).push(entry);
        id
    }

    pub(crate) fn retract(&self, id: AuditEntryId) -> Result<(), IssueError> {
        let mut entries = lock(&self.entries);
        let position = entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(IssueError::AuditEntryNotFound(id))?;
        entries.remove(position);
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct IssueEvent {
    pub(crate) kind: &'static str,
    pub(crate) issue: IssueId,
    pub(crate) title: String,
}

impl IssueEvent {
    pub(crate) fn created(issue: &Issue) -> Self {
        Self {
            kind: "issue.created",
            issue: issue.id,
            title: issue.title.clone(),
        }
    }
}

/// Publishing is fire-and-forget; a published event cannot be recalled.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    published: Mutex<Vec<IssueEvent>>,
}

impl EventBus {
    pub(crate) fn publish(&self, event: IssueEvent) {
        debug!(kind = event.kind, issue = event.issue, "event published");
        lock(&self.published).push(event);
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.published).len()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Notifier {
    next_id: AtomicU64,
    sent: Mutex<BTreeMap<NotificationId, String>>,
}

impl Notifier {
    pub(crate) fn send(&self, recipient: &str, message: String) -> NotificationId {
        let id = next(&self.next_id);
        debug!(recipient, notification = id, "notification sent");
        lock(&self.sent).insert(id, message);
        id
    }

    pub(crate) fn recall(&self, id: NotificationId) -> Result<(), IssueError> {
        lock(&self.sent)
            .remove(&id)
            .map(|_| ())
            .ok_or(IssueError::NotificationNotFound(id))
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.sent).len()
    }
}

/// Steps whose forward phase or compensation should fail on purpose.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Faults {
    pub(crate) fail_at: Option<StepName>,
    pub(crate) fail_compensation: Option<StepName>,
}

impl Faults {
    pub(crate) fn check_forward(&self, step: StepName) -> Result<(), IssueError> {
        if self.fail_at == Some(step) {
            return Err(IssueError::InjectedForward { step });
        }
        Ok(())
    }

    pub(crate) fn check_compensation(&self, step: StepName) -> Result<(), IssueError> {
        if self.fail_compensation == Some(step) {
            return Err(IssueError::InjectedCompensation { step });
        }
        Ok(())
    }
}

/// What is left in the services after all runs finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct ServiceTotals {
    pub(crate) issues: usize,
    pub(crate) audit_entries: usize,
    pub(crate) events: usize,
    pub(crate) notifications: usize,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Services {
    pub(crate) store: Arc<IssueStore>,
    pub(crate) audit: Arc<AuditTrail>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) notifier: Arc<Notifier>,
}

impl Services {
    /// A container exposing these services and `faults` to workflow steps.
    pub(crate) fn container(&self, faults: Faults) -> Container {
        let mut container = Container::new().with(FAULTS, faults);
        container.register_shared(ISSUE_STORE, Arc::clone(&self.store));
        container.register_shared(AUDIT_TRAIL, Arc::clone(&self.audit));
        container.register_shared(EVENT_BUS, Arc::clone(&self.events));
        container.register_shared(NOTIFIER, Arc::clone(&self.notifier));
        container
    }

    pub(crate) fn totals(&self) -> ServiceTotals {
        ServiceTotals {
            issues: self.store.len(),
            audit_entries: self.audit.len(),
            events: self.events.len(),
            notifications: self.notifier.len(),
        }
    }
}
