use std::fmt;
use std::sync::Arc;

use clap::ValueEnum;
use sagaflow::{Step, StepContext, StepResponse, Workflow, WorkflowResponse, transform, when};
use serde::Serialize;

use crate::error::IssueError;
use crate::services::{
    AUDIT_TRAIL, AuditEntryId, AuditTrail, EVENT_BUS, EventBus, FAULTS, Faults, ISSUE_STORE, Issue,
    IssueEvent, IssueId, IssueStore, NOTIFIER, NotificationId, Notifier,
};

pub(crate) const WORKFLOW_NAME: &str = "create-issue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum StepName {
    CreateIssue,
    LogAudit,
    NotifyAssignee,
    EmitEvent,
}

impl StepName {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::CreateIssue => "create_issue",
            Self::LogAudit => "log_audit",
            Self::NotifyAssignee => "notify_assignee",
            Self::EmitEvent => "emit_event",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NewIssue {
    pub(crate) title: String,
    pub(crate) assignee: Option<String>,
    pub(crate) notify: bool,
}

fn faults(ctx: &StepContext) -> Result<Arc<Faults>, IssueError> {
    Ok(ctx.resolve::<Faults>(FAULTS)?)
}

async fn create_issue(
    request: NewIssue,
    ctx: StepContext,
) -> Result<StepResponse<Issue, IssueId>, IssueError> {
    faults(&ctx)?.check_forward(StepName::CreateIssue)?;
    let issue = ctx
        .resolve::<IssueStore>(ISSUE_STORE)?
        .create(&request.title, request.assignee.as_deref())?;
    let id = issue.id;
    Ok(StepResponse::with_compensation_input(issue, id))
}

async fn delete_issue(id: IssueId, ctx: StepContext) -> Result<(), IssueError> {
    faults(&ctx)?.check_compensation(StepName::CreateIssue)?;
    ctx.resolve::<IssueStore>(ISSUE_STORE)?.delete(id)?;
    Ok(())
}

async fn log_audit(issue: Issue, ctx: StepContext) -> Result<StepResponse<AuditEntryId>, IssueError> {
    faults(&ctx)?.check_forward(StepName::LogAudit)?;
    let entry = ctx
        .resolve::<AuditTrail>(AUDIT_TRAIL)?
        .append(issue.id, format!("created '{}'", issue.title));
    Ok(StepResponse::new(entry))
}

async fn retract_audit(entry: AuditEntryId, ctx: StepContext) -> Result<(), IssueError> {
    faults(&ctx)?.check_compensation(StepName::LogAudit)?;
    ctx.resolve::<AuditTrail>(AUDIT_TRAIL)?.retract(entry)
}

async fn notify_assignee(
    issue: Issue,
    ctx: StepContext,
) -> Result<StepResponse<NotificationId>, IssueError> {
    faults(&ctx)?.check_forward(StepName::NotifyAssignee)?;
    let recipient = issue.assignee.as_deref().unwrap_or_default();
    let id = ctx.resolve::<Notifier>(NOTIFIER)?.send(
        recipient,
        format!("issue #{} '{}' was assigned to you", issue.id, issue.title),
    );
    Ok(StepResponse::new(id))
}

async fn recall_notification(id: NotificationId, ctx: StepContext) -> Result<(), IssueError> {
    faults(&ctx)?.check_compensation(StepName::NotifyAssignee)?;
    ctx.resolve::<Notifier>(NOTIFIER)?.recall(id)
}

async fn emit_event(event: IssueEvent, ctx: StepContext) -> Result<StepResponse<()>, IssueError> {
    faults(&ctx)?.check_forward(StepName::EmitEvent)?;
    ctx.resolve::<EventBus>(EVENT_BUS)?.publish(event);
    Ok(StepResponse::new(()))
}

/// Create an issue, audit it, optionally notify its assignee, then announce it.
///
/// The event is the last step and has no compensation: once published it
/// cannot be taken back, so everything before it must already have succeeded.
pub(crate) fn create_issue_workflow() -> Workflow<NewIssue, Issue, IssueError> {
    let create = Step::new(StepName::CreateIssue.as_str(), create_issue)
        .with_compensation(delete_issue)
        .with_description("delete the created issue");
    let audit = Step::new(StepName::LogAudit.as_str(), log_audit)
        .with_compensation(retract_audit)
        .with_description("retract the audit entry");
    let notify = Step::new(StepName::NotifyAssignee.as_str(), notify_assignee)
        .with_compensation(recall_notification)
        .with_description("recall the assignment notification");
    let emit = Step::new(StepName::EmitEvent.as_str(), emit_event);

    Workflow::new(WORKFLOW_NAME, move |request: NewIssue| {
        let (create, audit, notify, emit) =
            (create.clone(), audit.clone(), notify.clone(), emit.clone());
        async move {
            let issue = create.call(request.clone()).await?;
            audit.call(issue.clone()).await?;

            let wants_notification = request.notify && issue.assignee.is_some();
            when(wants_notification, || notify.call(issue.clone()))
                .await
                .transpose()?;

            emit.call(transform(&issue, IssueEvent::created)).await?;
            Ok(WorkflowResponse::new(issue))
        }
    })
}
