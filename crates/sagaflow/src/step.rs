//! Steps: named forward operations with optional compensations.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::context::{self, StepContext, Undo};
use crate::error::{BoxError, ContextError};
use crate::response::StepResponse;

type ForwardFn<I, O, C, E> =
    dyn Fn(I, StepContext) -> BoxFuture<'static, Result<StepResponse<O, C>, E>> + Send + Sync;

type CompensateFn<C, E> = dyn Fn(C, StepContext) -> BoxFuture<'static, Result<(), E>> + Send + Sync;

/// A named, optionally reversible unit of work.
///
/// A step pairs a forward operation with an optional compensation. Calling it
/// inside a workflow run executes the forward operation once and, if a
/// compensation was declared, registers it with the run so a later failure
/// can undo the step.
///
/// # Type Parameters
///
/// - `I`: input passed to the forward operation
/// - `O`: output returned to the caller of the step
/// - `C`: data the compensation needs (often a small identifier)
/// - `E`: error type of both operations
pub struct Step<I, O, C, E> {
    name: Arc<str>,
    description: Option<String>,
    forward: Arc<ForwardFn<I, O, C, E>>,
    compensate: Option<Arc<CompensateFn<C, E>>>,
}

impl<I, O, C, E> Clone for Step<I, O, C, E> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            description: self.description.clone(),
            forward: Arc::clone(&self.forward),
            compensate: self.compensate.clone(),
        }
    }
}

impl<I, O, C, E> Step<I, O, C, E>
where
    I: Send + 'static,
    O: Send + 'static,
    C: Send + 'static,
    E: Send + 'static,
{
    /// Create a step from its forward operation.
    pub fn new<F, Fut>(name: impl Into<String>, forward: F) -> Self
    where
        F: Fn(I, StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepResponse<O, C>, E>> + Send + 'static,
    {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            description: None,
            forward: Arc::new(
                move |input: I, ctx: StepContext| -> BoxFuture<'static, Result<StepResponse<O, C>, E>> {
                    Box::pin(forward(input, ctx))
                },
            ),
            compensate: None,
        }
    }

    /// Declare the operation that undoes this step.
    #[must_use]
    pub fn with_compensation<F, Fut>(mut self, compensate: F) -> Self
    where
        F: Fn(C, StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.compensate = Some(Arc::new(
            move |input: C, ctx: StepContext| -> BoxFuture<'static, Result<(), E>> {
                Box::pin(compensate(input, ctx))
            },
        ));
        self
    }

    /// Human-readable description of what compensation will do.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl<I, O, C, E> Step<I, O, C, E> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn has_compensation(&self) -> bool {
        self.compensate.is_some()
    }

    #[must_use]
    pub fn compensation_description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("undo {}", self.name))
    }
}

impl<I, O, C, E> Step<I, O, C, E>
where
    I: Send + 'static,
    O: Send + 'static,
    C: Send + 'static,
    E: From<ContextError> + Into<BoxError> + Send + 'static,
{
    /// Execute the step inside the active workflow run.
    ///
    /// # Errors
    ///
    /// Returns the forward operation's error unchanged, or
    /// [`ContextError::StepOutsideRun`] (converted into `E`) when no workflow
    /// run is active. In both cases no compensation is registered.
    pub async fn call(&self, input: I) -> Result<O, E> {
        let run = context::current().map_err(|_| ContextError::StepOutsideRun {
            step: self.name.to_string(),
        })?;

        let record = run.begin_step(&self.name);
        let ctx = run.step_context(&self.name);
        debug!(step = %self.name, run_id = %run.run_id(), "executing step");

        let response = match (self.forward)(input, ctx.clone()).await {
            Ok(response) => response,
            Err(error) => {
                warn!(step = %self.name, "step failed");
                run.fail_step(record, &self.name);
                return Err(error);
            }
        };

        let (output, compensation_input) = response.into_parts();
        let undo = self.compensate.as_ref().map(|compensate| {
            let compensate = Arc::clone(compensate);
            let undo: Undo = Box::new(move || -> BoxFuture<'static, Result<(), BoxError>> {
                Box::pin(async move {
                    compensate(compensation_input, ctx)
                        .await
                        .map_err(Into::into)
                })
            });
            undo
        });

        run.complete_step(record, &self.name, self.compensation_description(), undo);
        debug!(step = %self.name, "step executed");
        Ok(output)
    }
}

impl<I, O, C, E> fmt::Debug for Step<I, O, C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("has_compensation", &self.has_compensation())
            .finish_non_exhaustive()
    }
}
