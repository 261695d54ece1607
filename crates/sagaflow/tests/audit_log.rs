//! Integration tests for run audit logging.

use std::sync::Arc;

use sagaflow::{
    Container, ContextError, Step, StepResponse, StepStatus, Workflow, WorkflowResponse,
    WorkflowResult,
};

#[derive(Debug, thiserror::Error)]
enum TestError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("{0}")]
    Failed(String),
}

fn simple_step(name: &'static str) -> Step<i32, i32, i32, TestError> {
    Step::new(name, |input: i32, _ctx| async move {
        Ok(StepResponse::new(input + 1))
    })
    .with_compensation(|_input: i32, _ctx| async move { Ok(()) })
}

fn read_only_step(name: &'static str) -> Step<i32, i32, i32, TestError> {
    Step::new(name, |input: i32, _ctx| async move { Ok(StepResponse::new(input)) })
}

fn failing_step() -> Step<i32, i32, i32, TestError> {
    Step::new("failing_step", |_input: i32, _ctx| async move {
        Err(TestError::Failed("intentional failure".to_string()))
    })
}

fn failing_compensation_step(name: &'static str) -> Step<i32, i32, i32, TestError> {
    Step::new(name, |input: i32, _ctx| async move {
        Ok(StepResponse::new(input + 1))
    })
    .with_compensation(|_input: i32, _ctx| async move {
        Err(TestError::Failed("compensation failed".to_string()))
    })
}

async fn run_chain(steps: Vec<Step<i32, i32, i32, TestError>>) -> WorkflowResult<i32, TestError> {
    let steps = Arc::new(steps);
    let workflow: Workflow<i32, i32, TestError> = Workflow::new("audited", move |input: i32| {
        let steps = Arc::clone(&steps);
        async move {
            let mut value = input;
            for step in steps.iter() {
                value = step.call(value).await?;
            }
            Ok(WorkflowResponse::new(value))
        }
    });
    workflow.bind(Container::new().into_shared()).run(0).await
}

fn statuses(result: &WorkflowResult<i32, TestError>) -> Vec<(String, StepStatus)> {
    result
        .audit()
        .records()
        .iter()
        .map(|record| (record.name.clone(), record.status))
        .collect()
}

#[tokio::test]
async fn successful_run_logs_all_steps_as_executed() {
    let result = run_chain(vec![
        simple_step("step_a"),
        simple_step("step_b"),
        simple_step("step_c"),
    ])
    .await;

    assert_eq!(result.result(), Some(&3));
    assert_eq!(
        statuses(&result),
        vec![
            ("step_a".to_string(), StepStatus::Executed),
            ("step_b".to_string(), StepStatus::Executed),
            ("step_c".to_string(), StepStatus::Executed),
        ]
    );
}

#[tokio::test]
async fn failed_run_logs_failed_and_compensated_steps() {
    let result = run_chain(vec![
        simple_step("step_a"),
        simple_step("step_b"),
        failing_step(),
    ])
    .await;

    assert_eq!(
        statuses(&result),
        vec![
            ("step_a".to_string(), StepStatus::Compensated),
            ("step_b".to_string(), StepStatus::Compensated),
            ("failing_step".to_string(), StepStatus::Failed),
        ]
    );
    assert_eq!(result.failed_step(), Some("failing_step"));
}

#[tokio::test]
async fn compensation_failure_is_logged() {
    let result = run_chain(vec![
        simple_step("step_a"),
        failing_compensation_step("step_b"),
        failing_step(),
    ])
    .await;

    assert_eq!(
        statuses(&result),
        vec![
            ("step_a".to_string(), StepStatus::Compensated),
            ("step_b".to_string(), StepStatus::CompensationFailed),
            ("failing_step".to_string(), StepStatus::Failed),
        ]
    );
}

#[tokio::test]
async fn audit_log_records_compensation_descriptions() {
    let described = simple_step("described").with_description("delete the draft");
    let result = run_chain(vec![
        described,
        simple_step("default"),
        read_only_step("read_only"),
    ])
    .await;

    let descriptions: Vec<Option<&str>> = result
        .audit()
        .records()
        .iter()
        .map(|record| record.compensation_description.as_deref())
        .collect();
    assert_eq!(
        descriptions,
        vec![Some("delete the draft"), Some("undo default"), None]
    );
}

#[tokio::test]
async fn audit_log_timing_is_populated() {
    let result = run_chain(vec![simple_step("step_a"), failing_step()]).await;

    for record in result.audit().records() {
        let completed = record.completed_at.expect("step finished");
        assert!(completed >= record.started_at);
        assert!(record.elapsed().is_some());
    }
}

#[tokio::test]
async fn audit_log_summary_contains_all_step_names() {
    let result = run_chain(vec![
        simple_step("first_step"),
        simple_step("second_step"),
        simple_step("third_step"),
    ])
    .await;

    let summary = result.audit().summary();

    assert!(summary.contains("first_step"));
    assert!(summary.contains("second_step"));
    assert!(summary.contains("third_step"));
}

#[tokio::test]
async fn audit_log_summary_shows_status_indicators() {
    let result = run_chain(vec![
        simple_step("compensated"),
        failing_compensation_step("stuck"),
        failing_step(),
    ])
    .await;

    let summary = result.audit().summary();

    assert!(summary.contains("↩ compensated"));
    assert!(summary.contains("⚠ stuck"));
    assert!(summary.contains("✗ failing_step"));
}

#[tokio::test]
async fn single_step_failure_shows_only_that_step() {
    let result = run_chain(vec![failing_step()]).await;

    assert_eq!(
        statuses(&result),
        vec![("failing_step".to_string(), StepStatus::Failed)]
    );
    assert!(result.compensation_errors().is_empty());
}

#[tokio::test]
async fn read_only_steps_are_logged_but_not_compensated() {
    let result = run_chain(vec![
        simple_step("tracked"),
        read_only_step("read_only"),
        failing_step(),
    ])
    .await;

    assert_eq!(
        statuses(&result),
        vec![
            ("tracked".to_string(), StepStatus::Compensated),
            ("read_only".to_string(), StepStatus::Executed),
            ("failing_step".to_string(), StepStatus::Failed),
        ]
    );
}

#[tokio::test]
async fn step_records_serialize_status_names() -> anyhow::Result<()> {
    let result = run_chain(vec![simple_step("step_a"), failing_step()]).await;

    let names: Vec<String> = result
        .audit()
        .records()
        .iter()
        .map(|record| serde_json::to_string(&record.status))
        .collect::<Result<_, _>>()?;

    assert_eq!(names, vec![r#""compensated""#, r#""failed""#]);
    Ok(())
}
