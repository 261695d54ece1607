//! Service-locator contract for sagaflow.
//!
//! Workflow steps never construct their collaborators. They ask a [`Resolver`]
//! for a service registered under a string key and get back a shared handle.
//! [`Container`] is a simple in-memory registry implementing the contract.

mod container;
mod error;
mod resolver;

pub use container::Container;
pub use error::ResolveError;
pub use resolver::{Resolver, SharedResolver};
