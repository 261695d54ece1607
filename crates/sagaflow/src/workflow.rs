use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use sagaflow_locator::SharedResolver;
use serde::Serialize;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::audit::AuditLog;
use crate::context::{RunContext, RunId};
use crate::error::{CompensationError, RunError, WorkflowError};
use crate::response::WorkflowResponse;

type OrchestrationFn<I, O, E> =
    dyn Fn(I) -> BoxFuture<'static, Result<WorkflowResponse<O>, E>> + Send + Sync;

/// Terminal outcome of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// The orchestration function completed.
    Done,
    /// The orchestration function failed and rollback ran.
    Reverted,
}

/// How far rollback got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// The run completed, nothing was rolled back.
    NotRequired,
    /// Every registered compensation succeeded.
    Complete,
    /// At least one compensation failed; its step's side effects remain.
    Incomplete,
}

/// A named orchestration function.
///
/// The workflow itself holds no state; [`bind`](Self::bind) pairs it with a
/// resolver to produce a runner.
pub struct Workflow<I, O, E> {
    name: Arc<str>,
    orchestration: Arc<OrchestrationFn<I, O, E>>,
}

impl<I, O, E> Clone for Workflow<I, O, E> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            orchestration: Arc::clone(&self.orchestration),
        }
    }
}

impl<I, O, E> Workflow<I, O, E>
where
    I: Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    pub fn new<F, Fut>(name: impl Into<String>, orchestration: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<WorkflowResponse<O>, E>> + Send + 'static,
    {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            orchestration: Arc::new(
                move |input: I| -> BoxFuture<'static, Result<WorkflowResponse<O>, E>> {
                    Box::pin(orchestration(input))
                },
            ),
        }
    }
}

impl<I, O, E> Workflow<I, O, E> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind the workflow to the resolver its steps will use.
    #[must_use]
    pub fn bind(&self, resolver: SharedResolver) -> WorkflowRunner<I, O, E> {
        WorkflowRunner {
            workflow: self.clone(),
            resolver,
        }
    }
}

impl<I, O, E> Debug for Workflow<I, O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A workflow bound to a resolver, ready to run.
pub struct WorkflowRunner<I, O, E> {
    workflow: Workflow<I, O, E>,
    resolver: SharedResolver,
}

impl<I, O, E> Clone for WorkflowRunner<I, O, E> {
    fn clone(&self) -> Self {
        Self {
            workflow: self.workflow.clone(),
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<I, O, E> WorkflowRunner<I, O, E> {
    #[must_use]
    pub fn workflow_name(&self) -> &str {
        self.workflow.name()
    }

    /// Execute the workflow once, in a fresh run context.
    ///
    /// Never fails: a failing orchestration function yields a reverted
    /// [`WorkflowResult`] after every registered compensation has been
    /// attempted, newest first.
    pub async fn run(&self, input: I) -> WorkflowResult<O, E> {
        let run = RunContext::new(Arc::clone(&self.workflow.name), Arc::clone(&self.resolver));
        let span = info_span!("workflow", workflow = %self.workflow.name, run_id = %run.run_id());
        self.execute(run, input).instrument(span).await
    }

    async fn execute(&self, run: RunContext, input: I) -> WorkflowResult<O, E> {
        debug!("starting workflow run");
        let outcome = run.scope((self.workflow.orchestration)(input)).await;

        match outcome {
            Ok(response) => {
                let audit = run.finish();
                info!(steps = audit.records().len(), "workflow done");
                WorkflowResult {
                    run_id: run.run_id(),
                    workflow: self.workflow.name.to_string(),
                    outcome: Outcome::Done(response.into_inner()),
                    audit,
                }
            }
            Err(error) => {
                let failed_step = run.failed_step();
                let compensation_errors = rollback(&run).await;
                let audit = run.finish();
                if compensation_errors.is_empty() {
                    info!(failed_step = ?failed_step, "workflow reverted");
                } else {
                    warn!(
                        failed_step = ?failed_step,
                        failed_compensations = compensation_errors.len(),
                        "workflow reverted with incomplete rollback"
                    );
                }
                WorkflowResult {
                    run_id: run.run_id(),
                    workflow: self.workflow.name.to_string(),
                    outcome: Outcome::Reverted {
                        error,
                        failed_step,
                        compensation_errors,
                    },
                    audit,
                }
            }
        }
    }
}

/// Compensate everything registered so far, newest first, one at a time.
async fn rollback(run: &RunContext) -> Vec<CompensationError> {
    let mut stack = run.seal();
    let mut errors = Vec::new();
    debug!(count = stack.len(), "rolling back");

    while let Some(compensation) = stack.pop() {
        debug!(
            step = %compensation.step,
            sequence = compensation.sequence,
            "running compensation"
        );
        match (compensation.undo)().await {
            Ok(()) => run.record_compensated(compensation.record),
            Err(error) => {
                warn!(step = %compensation.step, error = %error, "compensation failed");
                run.record_compensation_failed(compensation.record);
                errors.push(CompensationError {
                    step: compensation.step,
                    description: compensation.description,
                    sequence: compensation.sequence,
                    error,
                });
            }
        }
    }

    errors
}

impl<I, O, E> Debug for WorkflowRunner<I, O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRunner")
            .field("workflow", &self.workflow.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Outcome<O, E> {
    Done(O),
    Reverted {
        error: E,
        failed_step: Option<String>,
        compensation_errors: Vec<CompensationError>,
    },
}

/// Structured result of one workflow run.
///
/// A `Done` run always carries a result and no errors. A `Reverted` run never
/// carries a result and always carries at least the primary error.
#[derive(Debug)]
pub struct WorkflowResult<O, E> {
    run_id: RunId,
    workflow: String,
    outcome: Outcome<O, E>,
    audit: AuditLog,
}

impl<O, E> WorkflowResult<O, E> {
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    #[must_use]
    pub fn workflow_name(&self) -> &str {
        &self.workflow
    }

    #[must_use]
    pub fn transaction_status(&self) -> TransactionStatus {
        match self.outcome {
            Outcome::Done(_) => TransactionStatus::Done,
            Outcome::Reverted { .. } => TransactionStatus::Reverted,
        }
    }

    #[must_use]
    pub fn rollback_status(&self) -> RollbackStatus {
        match &self.outcome {
            Outcome::Done(_) => RollbackStatus::NotRequired,
            Outcome::Reverted {
                compensation_errors,
                ..
            } if compensation_errors.is_empty() => RollbackStatus::Complete,
            Outcome::Reverted { .. } => RollbackStatus::Incomplete,
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, Outcome::Done(_))
    }

    /// The orchestration function's final value, for a `Done` run.
    #[must_use]
    pub fn result(&self) -> Option<&O> {
        match &self.outcome {
            Outcome::Done(output) => Some(output),
            Outcome::Reverted { .. } => None,
        }
    }

    #[must_use]
    pub fn into_output(self) -> Option<O> {
        match self.outcome {
            Outcome::Done(output) => Some(output),
            Outcome::Reverted { .. } => None,
        }
    }

    /// The error that made the run fail.
    #[must_use]
    pub fn primary_error(&self) -> Option<&E> {
        match &self.outcome {
            Outcome::Done(_) => None,
            Outcome::Reverted { error, .. } => Some(error),
        }
    }

    /// Name of the step whose error made the run fail.
    ///
    /// A step error stops counting once a later step succeeds, so a failure the
    /// orchestration caught and recovered from is not reported. `None` when
    /// the run failed outside any step.
    #[must_use]
    pub fn failed_step(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Done(_) => None,
            Outcome::Reverted { failed_step, .. } => failed_step.as_deref(),
        }
    }

    /// Compensations that failed during rollback, in the order they ran.
    #[must_use]
    pub fn compensation_errors(&self) -> &[CompensationError] {
        match &self.outcome {
            Outcome::Done(_) => &[],
            Outcome::Reverted {
                compensation_errors,
                ..
            } => compensation_errors,
        }
    }

    /// All errors of the run: the primary error first, then compensation failures.
    #[must_use]
    pub fn errors(&self) -> Vec<RunError<'_, E>> {
        match &self.outcome {
            Outcome::Done(_) => Vec::new(),
            Outcome::Reverted {
                error,
                compensation_errors,
                ..
            } => std::iter::once(RunError::Step(error))
                .chain(compensation_errors.iter().map(RunError::Compensation))
                .collect(),
        }
    }

    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Convert into a `Result`, for callers that prefer `?`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::StepFailed`] if the run reverted cleanly and
    /// [`WorkflowError::CompensationFailed`] if some compensation also failed.
    pub fn into_result(self) -> Result<O, WorkflowError<E>>
    where
        E: Debug,
    {
        match self.outcome {
            Outcome::Done(output) => Ok(output),
            Outcome::Reverted {
                error,
                failed_step,
                compensation_errors,
            } if compensation_errors.is_empty() => Err(WorkflowError::StepFailed {
                workflow: self.workflow,
                step: failed_step,
                source: error,
            }),
            Outcome::Reverted {
                error,
                failed_step,
                compensation_errors,
            } => Err(WorkflowError::CompensationFailed {
                workflow: self.workflow,
                step: failed_step,
                step_error: error,
                compensation_errors,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use sagaflow_locator::Container;

    use super::*;
    use crate::audit::StepStatus;
    use crate::error::ContextError;
    use crate::response::StepResponse;
    use crate::step::Step;

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum TestError {
        #[error(transparent)]
        Context(#[from] ContextError),
        #[error("{0}")]
        Failed(String),
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn push(log: &Log, entry: String) {
        log.lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry);
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn add_step(name: &'static str, value: i32, log: &Log) -> Step<i32, i32, i32, TestError> {
        let log = Arc::clone(log);
        Step::new(name, move |input: i32, _ctx| async move {
            Ok(StepResponse::with_compensation_input(input + value, input))
        })
        .with_compensation(move |input: i32, _ctx| {
            let log = Arc::clone(&log);
            async move {
                push(&log, format!("compensate {name}: input was {input}"));
                Ok(())
            }
        })
    }

    fn failing_step(message: &'static str) -> Step<i32, i32, i32, TestError> {
        Step::new("failing", move |_input: i32, _ctx| async move {
            Err(TestError::Failed(message.to_string()))
        })
    }

    fn three_step_workflow(log: &Log, fail: bool) -> Workflow<i32, i32, TestError> {
        let add_10 = add_step("add_10", 10, log);
        let add_20 = add_step("add_20", 20, log);
        let boom = failing_step("boom");
        Workflow::new("adder", move |input: i32| {
            let (add_10, add_20, boom) = (add_10.clone(), add_20.clone(), boom.clone());
            async move {
                let value = add_10.call(input).await?;
                let value = add_20.call(value).await?;
                if fail {
                    boom.call(value).await?;
                }
                Ok(WorkflowResponse::new(value))
            }
        })
    }

    #[tokio::test]
    async fn successful_run_is_done_without_compensation() {
        let log = Log::default();
        let runner = three_step_workflow(&log, false).bind(Container::new().into_shared());

        let result = runner.run(1).await;

        assert_eq!(result.transaction_status(), TransactionStatus::Done);
        assert_eq!(result.rollback_status(), RollbackStatus::NotRequired);
        assert_eq!(result.result(), Some(&31));
        assert!(result.errors().is_empty());
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn failed_run_compensates_in_reverse_order() {
        let log = Log::default();
        let runner = three_step_workflow(&log, true).bind(Container::new().into_shared());

        let result = runner.run(1).await;

        assert_eq!(result.transaction_status(), TransactionStatus::Reverted);
        assert_eq!(result.rollback_status(), RollbackStatus::Complete);
        assert!(result.result().is_none());
        assert_eq!(result.primary_error(), Some(&TestError::Failed("boom".to_string())));
        assert_eq!(result.failed_step(), Some("failing"));
        assert_eq!(
            entries(&log),
            vec![
                "compensate add_20: input was 11".to_string(),
                "compensate add_10: input was 1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn into_result_maps_clean_revert_to_step_failed() {
        let log = Log::default();
        let runner = three_step_workflow(&log, true).bind(Container::new().into_shared());

        let err = runner.run(1).await.into_result().expect_err("run reverted");

        assert!(matches!(
            err,
            WorkflowError::StepFailed { workflow, step, .. }
                if workflow == "adder" && step.as_deref() == Some("failing")
        ));
    }

    #[tokio::test]
    async fn into_result_returns_output_when_done() -> anyhow::Result<()> {
        let log = Log::default();
        let runner = three_step_workflow(&log, false).bind(Container::new().into_shared());

        let value = runner.run(5).await.into_result()?;

        assert_eq!(value, 35);
        Ok(())
    }

    #[tokio::test]
    async fn orchestration_error_outside_steps_still_rolls_back() {
        let log = Log::default();
        let add_10 = add_step("add_10", 10, &log);
        let workflow: Workflow<i32, i32, TestError> = Workflow::new("validate", move |input| {
            let add_10 = add_10.clone();
            async move {
                let value = add_10.call(input).await?;
                if value > 5 {
                    return Err(TestError::Failed("too large".to_string()));
                }
                Ok(WorkflowResponse::new(value))
            }
        });

        let result = workflow.bind(Container::new().into_shared()).run(0).await;

        assert_eq!(result.transaction_status(), TransactionStatus::Reverted);
        assert_eq!(result.failed_step(), None);
        assert_eq!(entries(&log), vec!["compensate add_10: input was 0".to_string()]);
    }

    #[tokio::test]
    async fn recovered_step_error_is_not_reported_as_failed_step() {
        let log = Log::default();
        let lookup = failing_step("not found");
        let add_10 = add_step("add_10", 10, &log);
        let workflow: Workflow<i32, i32, TestError> = Workflow::new("lookup", move |input| {
            let (lookup, add_10) = (lookup.clone(), add_10.clone());
            async move {
                let base = lookup.call(input).await.unwrap_or(input);
                let value = add_10.call(base).await?;
                if value > 5 {
                    return Err(TestError::Failed("validation failed".to_string()));
                }
                Ok(WorkflowResponse::new(value))
            }
        });

        let result = workflow.bind(Container::new().into_shared()).run(0).await;

        assert_eq!(
            result.primary_error(),
            Some(&TestError::Failed("validation failed".to_string()))
        );
        assert_eq!(result.failed_step(), None);
        assert_eq!(result.audit().records()[0].status, StepStatus::Failed);
        assert!(matches!(
            result.into_result(),
            Err(WorkflowError::StepFailed { step: None, .. })
        ));
    }

    #[tokio::test]
    async fn failing_step_after_recovery_is_reported() {
        let log = Log::default();
        let lookup = failing_step("not found");
        let add_10 = add_step("add_10", 10, &log);
        let boom: Step<i32, i32, i32, TestError> =
            Step::new("boom", |_input: i32, _ctx| async move {
                Err(TestError::Failed("boom".to_string()))
            });
        let workflow: Workflow<i32, i32, TestError> = Workflow::new("lookup", move |input| {
            let (lookup, add_10, boom) = (lookup.clone(), add_10.clone(), boom.clone());
            async move {
                let base = lookup.call(input).await.unwrap_or(input);
                let value = add_10.call(base).await?;
                Ok(WorkflowResponse::new(boom.call(value).await?))
            }
        });

        let result = workflow.bind(Container::new().into_shared()).run(0).await;

        assert_eq!(result.failed_step(), Some("boom"));
    }

    #[tokio::test]
    async fn each_run_gets_a_fresh_context() {
        let log = Log::default();
        let runner = three_step_workflow(&log, false).bind(Container::new().into_shared());

        let first = runner.run(1).await;
        let second = runner.run(1).await;

        assert_ne!(first.run_id(), second.run_id());
        assert_eq!(first.audit().records().len(), 2);
        assert_eq!(second.audit().records().len(), 2);
    }

    #[test]
    fn status_serializes_as_lowercase_words() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&TransactionStatus::Done)?, r#""done""#);
        assert_eq!(
            serde_json::to_string(&TransactionStatus::Reverted)?,
            r#""reverted""#
        );
        assert_eq!(
            serde_json::to_string(&RollbackStatus::NotRequired)?,
            r#""not_required""#
        );
        Ok(())
    }
}
