use std::time::{Duration, Instant};

use serde::Serialize;

/// Status of a step in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum StepStatus {
    /// Forward phase still in flight.
    Running,
    /// Step executed successfully.
    Executed,
    /// Step failed during execution.
    Failed,
    /// Step was compensated successfully.
    Compensated,
    /// Step compensation failed.
    CompensationFailed,
    /// Forward phase finished after rollback had started, so its compensation
    /// was never registered.
    FinishedAfterRollback,
}

/// Record of a step's execution in a workflow run.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Name of the step.
    pub name: String,
    /// Current status.
    pub status: StepStatus,
    /// When the step started executing.
    pub started_at: Instant,
    /// When the step completed (execution or compensation).
    pub completed_at: Option<Instant>,
    /// Description of compensation, if the step registered one.
    pub compensation_description: Option<String>,
}

impl StepRecord {
    /// Time between start and the last status change, if the step finished.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.completed_at
            .map(|completed| completed.saturating_duration_since(self.started_at))
    }
}

/// Audit log tracking all step executions in a workflow run.
///
/// Records are indexed by the position returned from `record_start`, so
/// concurrently running steps never overwrite each other's entries.
#[derive(Debug, Default, Clone)]
pub struct AuditLog {
    records: Vec<StepRecord>,
}

impl AuditLog {
    /// Create a new empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step execution starting, returning its record index.
    pub(crate) fn record_start(&mut self, name: &str) -> usize {
        self.records.push(StepRecord {
            name: name.to_string(),
            status: StepStatus::Running,
            started_at: Instant::now(),
            completed_at: None,
            compensation_description: None,
        });
        self.records.len() - 1
    }

    pub(crate) fn record_failure(&mut self, index: usize) {
        self.update(index, StepStatus::Failed);
    }

    pub(crate) fn record_success(&mut self, index: usize, compensation_description: Option<String>) {
        if let Some(record) = self.records.get_mut(index) {
            record.compensation_description = compensation_description;
        }
        self.update(index, StepStatus::Executed);
    }

    pub(crate) fn record_finished_after_rollback(&mut self, index: usize) {
        self.update(index, StepStatus::FinishedAfterRollback);
    }

    pub(crate) fn record_compensated(&mut self, index: usize) {
        self.update(index, StepStatus::Compensated);
    }

    pub(crate) fn record_compensation_failed(&mut self, index: usize) {
        self.update(index, StepStatus::CompensationFailed);
    }

    fn update(&mut self, index: usize, status: StepStatus) {
        if let Some(record) = self.records.get_mut(index) {
            record.status = status;
            record.completed_at = Some(Instant::now());
        }
    }

    /// Get all records in the audit log, in the order steps started.
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Get a summary of the run for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StepStatus::Running => "…",
                StepStatus::Executed => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Compensated => "↩",
                StepStatus::CompensationFailed => "⚠",
                StepStatus::FinishedAfterRollback => "⌛",
            };
            lines.push(format!("{status} {}", record.name));
        }
        lines.join("\n")
    }
}
