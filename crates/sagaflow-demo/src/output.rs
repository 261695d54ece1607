use clap::ValueEnum;
use sagaflow::{RollbackStatus, RunId, StepStatus, TransactionStatus, WorkflowResult};
use serde::Serialize;

use crate::error::{CliError, IssueError};
use crate::services::{Issue, ServiceTotals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Format {
    Plain,
    Json,
}

impl Format {
    pub(crate) fn formatter(self) -> Box<dyn ReportFormatter> {
        match self {
            Self::Plain => Box::new(PlainFormatter),
            Self::Json => Box::new(JsonFormatter),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StepReport {
    pub(crate) name: String,
    pub(crate) status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) compensation: Option<String>,
}

/// Everything worth showing about one run.
#[derive(Debug, Serialize)]
pub(crate) struct RunReport {
    pub(crate) run_id: RunId,
    pub(crate) workflow: String,
    pub(crate) transaction_status: TransactionStatus,
    pub(crate) rollback_status: RollbackStatus,
    pub(crate) issue: Option<Issue>,
    pub(crate) failed_step: Option<String>,
    pub(crate) errors: Vec<String>,
    pub(crate) steps: Vec<StepReport>,
    #[serde(skip)]
    pub(crate) summary: String,
}

impl RunReport {
    pub(crate) fn new(result: &WorkflowResult<Issue, IssueError>) -> Self {
        let steps = result
            .audit()
            .records()
            .iter()
            .map(|record| StepReport {
                name: record.name.clone(),
                status: record.status,
                compensation: record.compensation_description.clone(),
            })
            .collect();

        Self {
            run_id: result.run_id(),
            workflow: result.workflow_name().to_string(),
            transaction_status: result.transaction_status(),
            rollback_status: result.rollback_status(),
            issue: result.result().cloned(),
            failed_step: result.failed_step().map(str::to_string),
            errors: result.errors().iter().map(ToString::to_string).collect(),
            steps,
            summary: result.audit().summary(),
        }
    }

    fn headline(&self) -> &'static str {
        match (self.transaction_status, self.rollback_status) {
            (TransactionStatus::Done, _) => "done",
            (TransactionStatus::Reverted, RollbackStatus::Incomplete) => {
                "reverted (rollback incomplete)"
            }
            (TransactionStatus::Reverted, _) => "reverted",
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    runs: &'a [RunReport],
    totals: &'a ServiceTotals,
}

pub(crate) trait ReportFormatter {
    fn format(&self, runs: &[RunReport], totals: &ServiceTotals) -> Result<String, CliError>;
}

pub(crate) struct PlainFormatter;

impl ReportFormatter for PlainFormatter {
    fn format(&self, runs: &[RunReport], totals: &ServiceTotals) -> Result<String, CliError> {
        let mut output = String::new();

        for run in runs {
            output.push_str(&format!(
                "run {} ({}): {}\n",
                run.run_id,
                run.workflow,
                run.headline()
            ));
            for line in run.summary.lines() {
                output.push_str(&format!("  {line}\n"));
            }
            if let Some(issue) = &run.issue {
                output.push_str(&format!("  created issue #{} '{}'\n", issue.id, issue.title));
            }
            for error in &run.errors {
                output.push_str(&format!("  error: {error}\n"));
            }
        }

        output.push_str(&format!(
            "totals: {} issue(s), {} audit entr(ies), {} event(s), {} notification(s)",
            totals.issues, totals.audit_entries, totals.events, totals.notifications
        ));
        Ok(output)
    }
}

pub(crate) struct JsonFormatter;

impl ReportFormatter for JsonFormatter {
    fn format(&self, runs: &[RunReport], totals: &ServiceTotals) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&Report { runs, totals })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{Faults, Services};
    use crate::workflow::{NewIssue, StepName, create_issue_workflow};

    async fn report(faults: Faults) -> (RunReport, ServiceTotals) {
        let services = Services::default();
        let runner = create_issue_workflow().bind(services.container(faults).into_shared());
        let result = runner
            .run(NewIssue {
                title: "Broken link".to_string(),
                assignee: None,
                notify: false,
            })
            .await;
        (RunReport::new(&result), services.totals())
    }

    #[tokio::test]
    async fn plain_report_lists_steps_and_totals() -> anyhow::Result<()> {
        let (run, totals) = report(Faults::default()).await;

        let text = PlainFormatter.format(&[run], &totals)?;

        assert!(text.contains("(create-issue): done"));
        assert!(text.contains("  ✓ create_issue"));
        assert!(text.contains("created issue #1 'Broken link'"));
        assert!(text.ends_with("totals: 1 issue(s), 1 audit entr(ies), 1 event(s), 0 notification(s)"));
        Ok(())
    }

    #[tokio::test]
    async fn plain_report_shows_incomplete_rollback() -> anyhow::Result<()> {
        let (run, totals) = report(Faults {
            fail_at: Some(StepName::EmitEvent),
            fail_compensation: Some(StepName::LogAudit),
        })
        .await;

        let text = PlainFormatter.format(&[run], &totals)?;

        assert!(text.contains("reverted (rollback incomplete)"));
        assert!(text.contains("  ⚠ log_audit"));
        assert!(text.contains("error: injected failure in emit_event"));
        Ok(())
    }

    #[tokio::test]
    async fn json_report_uses_snake_case_statuses() -> anyhow::Result<()> {
        let (run, totals) = report(Faults {
            fail_at: Some(StepName::LogAudit),
            ..Faults::default()
        })
        .await;

        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format(&[run], &totals)?)?;

        let run = &json["runs"][0];
        assert_eq!(run["transaction_status"], "reverted");
        assert_eq!(run["rollback_status"], "complete");
        assert_eq!(run["failed_step"], "log_audit");
        assert_eq!(run["steps"][0]["status"], "compensated");
        assert_eq!(run["steps"][0]["compensation"], "delete the created issue");
        assert!(run["issue"].is_null());
        assert_eq!(json["totals"]["issues"], 0);
        Ok(())
    }

    #[test]
    fn plain_report_without_runs_prints_only_totals() -> anyhow::Result<()> {
        let totals = Services::default().totals();

        let text = PlainFormatter.format(&[], &totals)?;

        assert_eq!(
            text,
            "totals: 0 issue(s), 0 audit entr(ies), 0 event(s), 0 notification(s)"
        );
        Ok(())
    }
}
