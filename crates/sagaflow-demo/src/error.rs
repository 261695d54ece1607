use sagaflow::{ContextError, ResolveError};
use thiserror::Error;

use crate::services::{AuditEntryId, IssueId, NotificationId};
use crate::workflow::StepName;

/// Error type of every step and compensation in the create-issue workflow.
#[derive(Debug, Error)]
pub(crate) enum IssueError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("service lookup failed")]
    Service(#[from] ResolveError),

    #[error("issue title must not be empty")]
    EmptyTitle,

    #[error("issue #{0} not found")]
    IssueNotFound(IssueId),

    #[error("audit entry {0} not found")]
    AuditEntryNotFound(AuditEntryId),

    #[error("notification {0} not found")]
    NotificationNotFound(NotificationId),

    #[error("injected failure in {step}")]
    InjectedForward { step: StepName },

    #[error("injected failure while undoing {step}")]
    InjectedCompensation { step: StepName },
}

#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("invalid log filter")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to install log subscriber")]
    LogInit(#[from] tracing_subscriber::util::TryInitError),

    #[error("workflow run panicked")]
    Join(#[from] tokio::task::JoinError),

    #[error("failed to render report")]
    Render(#[from] serde_json::Error),
}
