use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::resolver::{Resolver, SharedResolver};

/// In-memory service registry.
///
/// Services are registered once while wiring the application and then shared
/// read-only with every workflow run.
#[derive(Default)]
pub struct Container {
    services: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Container {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under `key`, replacing any previous registration.
    ///
    /// Returns `true` if a previous registration was replaced.
    pub fn register<T>(&mut self, key: impl Into<String>, service: T) -> bool
    where
        T: Any + Send + Sync,
    {
        self.register_shared(key, Arc::new(service))
    }

    /// Register an already shared service under `key`.
    ///
    /// Returns `true` if a previous registration was replaced.
    pub fn register_shared<T>(&mut self, key: impl Into<String>, service: Arc<T>) -> bool
    where
        T: Any + Send + Sync,
    {
        let key = key.into();
        debug!(key = %key, service = std::any::type_name::<T>(), "registering service");
        self.services.insert(key, service).is_some()
    }

    /// Builder-style variant of [`register`](Self::register).
    #[must_use]
    pub fn with<T>(mut self, key: impl Into<String>, service: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.register(key, service);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Freeze the container into a resolver that can be shared across runs.
    #[must_use]
    pub fn into_shared(self) -> SharedResolver {
        Arc::new(self)
    }
}

impl Resolver for Container {
    fn resolve_any(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.services.get(key).cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.services.contains_key(key)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.services.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Container").field("keys", &keys).finish()
    }
}
