//! Saga-style workflow orchestration.
//!
//! A workflow is ordinary async code that calls [`Step`]s. Each step may
//! declare a compensation; when the workflow fails, the compensations of the
//! steps that already completed run in reverse order. Steps find the run they
//! belong to through a task-local [`RunContext`], so orchestration code never
//! threads a context parameter through its calls.
//!
//! ```no_run
//! use sagaflow::{ContextError, Step, StepResponse, Workflow, WorkflowResponse};
//! use sagaflow_locator::Container;
//!
//! #[derive(Debug, thiserror::Error)]
//! enum Error {
//!     #[error(transparent)]
//!     Context(#[from] ContextError),
//!     #[error("out of stock")]
//!     OutOfStock,
//! }
//!
//! # async fn demo() {
//! let reserve: Step<u32, u32, u32, Error> =
//!     Step::new("reserve", |qty: u32, _ctx| async move { Ok(StepResponse::new(qty)) })
//!         .with_compensation(|qty: u32, _ctx| async move {
//!             println!("releasing {qty}");
//!             Ok(())
//!         });
//!
//! let workflow: Workflow<u32, u32, Error> = Workflow::new("order", move |qty: u32| {
//!     let reserve = reserve.clone();
//!     async move {
//!         let reserved = reserve.call(qty).await?;
//!         if reserved > 10 {
//!             return Err(Error::OutOfStock);
//!         }
//!         Ok(WorkflowResponse::new(reserved))
//!     }
//! });
//!
//! let result = workflow.bind(Container::new().into_shared()).run(3).await;
//! assert!(result.is_done());
//! # }
//! ```

mod audit;
mod combinators;
pub mod context;
mod error;
mod response;
mod step;
mod workflow;

pub use audit::{AuditLog, StepRecord, StepStatus};
pub use combinators::{parallelize, transform, when};
pub use context::{RunContext, RunId, StepContext};
pub use error::{BoxError, CompensationError, ContextError, RunError, WorkflowError};
pub use response::{StepResponse, WorkflowResponse};
pub use sagaflow_locator::{Container, ResolveError, Resolver, SharedResolver};
pub use step::Step;
pub use workflow::{RollbackStatus, TransactionStatus, Workflow, WorkflowResult, WorkflowRunner};
