//! Helpers for writing orchestration functions.

use std::future::Future;

use futures::future::join_all;

use crate::context;

/// Reshape `value` with `f`.
///
/// Purely synchronous and side-effect free; it only names a data-shaping
/// stage inside orchestration code.
pub fn transform<T, R>(value: T, f: impl FnOnce(T) -> R) -> R {
    f(value)
}

/// Await `f()` only if `condition` holds.
///
/// Registers nothing on its own: when `f` calls a step, that step's
/// compensation is registered as usual.
pub async fn when<F, Fut>(condition: bool, f: F) -> Option<Fut::Output>
where
    F: FnOnce() -> Fut,
    Fut: Future,
{
    if condition { Some(f().await) } else { None }
}

/// Run several step calls concurrently within the current workflow run.
///
/// Every call is driven to completion, so each launched step either fails or
/// registers its compensation before this returns. Outputs are returned in
/// call order; on failure the first error in call order is returned.
///
/// Compensations of parallelized steps are registered in completion order and
/// rolled back in reverse completion order. Steps whose rollback order matters
/// must not be parallelized.
///
/// The step blamed for the run's failure is the one behind the returned
/// error, not whichever call happened to fail last.
///
/// # Errors
///
/// Returns the first error, in call order, among the failed calls.
pub async fn parallelize<I, Fut, T, E>(calls: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    let run = context::current().ok();
    if let Some(run) = &run {
        run.take_failed_step();
    }

    let outcomes = join_all(calls.into_iter().map(|call| {
        let run = run.clone();
        async move {
            let outcome = call.await;
            let failed_step = match (&outcome, &run) {
                (Err(_), Some(run)) => run.take_failed_step(),
                _ => None,
            };
            (outcome, failed_step)
        }
    }))
    .await;

    let mut outputs = Vec::with_capacity(outcomes.len());
    for (outcome, failed_step) in outcomes {
        match outcome {
            Ok(output) => outputs.push(output),
            Err(error) => {
                if let Some(run) = &run {
                    run.set_failed_step(failed_step);
                }
                return Err(error);
            }
        }
    }
    Ok(outputs)
}
