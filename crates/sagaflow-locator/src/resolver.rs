use std::any::{Any, type_name};
use std::sync::Arc;

use crate::error::ResolveError;

/// A registry of domain services looked up by key.
///
/// Implementations only need to hand out type-erased shared handles; the
/// typed `resolve` accessor on `dyn Resolver` performs the downcast.
pub trait Resolver: Send + Sync {
    /// Look up the service registered under `key`.
    fn resolve_any(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>>;

    /// Whether a service is registered under `key`.
    fn contains(&self, key: &str) -> bool {
        self.resolve_any(key).is_some()
    }
}

/// A resolver shared between a workflow runner and every step it runs.
pub type SharedResolver = Arc<dyn Resolver>;

impl dyn Resolver + '_ {
    /// Resolve the service registered under `key` as a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotRegistered`] if nothing is registered under
    /// `key`, or [`ResolveError::TypeMismatch`] if the registered service is
    /// not a `T`.
    pub fn resolve<T>(&self, key: &str) -> Result<Arc<T>, ResolveError>
    where
        T: Any + Send + Sync,
    {
        let service = self
            .resolve_any(key)
            .ok_or_else(|| ResolveError::NotRegistered {
                key: key.to_string(),
            })?;

        service
            .downcast::<T>()
            .map_err(|_| ResolveError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }
}
