use std::fmt::{self, Debug, Display};

use thiserror::Error;

/// Type-erased error returned by compensations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Misuse of the run context: a programmer error, never a business failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ContextError {
    /// `context::current()` was called outside of any workflow run.
    #[error("no active workflow run in this task")]
    NoActiveRun,

    /// A step was called outside of any workflow run.
    #[error("step '{step}' was called outside of an active workflow run")]
    StepOutsideRun {
        /// Name of the step that was called.
        step: String,
    },
}

/// Error from a failed compensation operation.
#[derive(Debug, thiserror::Error)]
#[error("compensation failed for step '{step}': {description}")]
pub struct CompensationError {
    /// Name of the step whose compensation failed.
    pub step: String,
    /// Description of what the compensation was trying to do.
    pub description: String,
    /// Registration sequence number of the compensation within its run.
    pub sequence: u64,
    /// The underlying error.
    #[source]
    pub error: BoxError,
}

/// One entry of a run's error list.
///
/// The primary error always comes first, followed by compensation failures in
/// the order the compensations ran.
#[derive(Debug)]
pub enum RunError<'a, E> {
    /// The error that made the orchestration function fail.
    Step(&'a E),
    /// A compensation that failed during rollback.
    Compensation(&'a CompensationError),
}

impl<E> RunError<'_, E> {
    #[must_use]
    pub fn is_compensation(&self) -> bool {
        matches!(self, Self::Compensation(_))
    }
}

impl<E: Display> Display for RunError<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(error) => write!(f, "{error}"),
            Self::Compensation(error) => write!(f, "{error}"),
        }
    }
}

/// Error form of a reverted run, for callers that prefer `?`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkflowError<E: Debug> {
    /// The run failed and every compensation succeeded.
    #[error("workflow '{workflow}' reverted after step '{}' failed", .step.as_deref().unwrap_or("<orchestration>"))]
    StepFailed {
        /// Name of the workflow.
        workflow: String,
        /// Name of the step that failed, if the failure came from a step.
        step: Option<String>,
        /// The error that caused the run to fail.
        #[source]
        source: E,
    },

    /// The run failed and some compensations also failed.
    #[error("workflow '{workflow}' failed at step '{}', and {} compensation(s) also failed", .step.as_deref().unwrap_or("<orchestration>"), .compensation_errors.len())]
    CompensationFailed {
        /// Name of the workflow.
        workflow: String,
        /// Name of the step that failed, if the failure came from a step.
        step: Option<String>,
        /// The error from the failed step.
        step_error: E,
        /// Errors from failed compensations, in the order they ran.
        compensation_errors: Vec<CompensationError>,
    },
}
