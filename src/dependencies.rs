//! Dependency injection store.
//!
//! Routers often need to hand application services (an auth client, an API
//! handle) to guards, middleware, and the default-route callbacks without
//! threading them through every call site. [`Dependencies`] is a small typed
//! store over `Any`: values are registered by name and recovered by name plus
//! concrete type.
//!
//! # Example
//!
//! ```
//! use wayfarer::dependencies::Dependencies;
//!
//! struct ApiClient {
//!     base: String,
//! }
//!
//! let mut deps = Dependencies::new(16);
//! deps.set("api", ApiClient { base: "/v1".into() }).unwrap();
//!
//! let api = deps.get::<ApiClient>("api").unwrap();
//! assert_eq!(api.base, "/v1");
//! assert!(deps.get::<String>("api").is_none());
//! ```

use crate::error::{ErrorCode, RouterError, RouterResult};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Named, typed store of shared application services.
pub struct Dependencies {
    limit: usize,
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Dependencies {
    /// Create a store accepting at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: HashMap::new(),
        }
    }

    /// Register a value under a name, replacing any previous value.
    ///
    /// Fails with `INVALID_OPTION` once the store is full.
    pub fn set<T: Send + Sync + 'static>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> RouterResult<()> {
        self.set_shared(name, Arc::new(value))
    }

    /// Register an already-shared value under a name.
    pub fn set_shared(
        &mut self,
        name: impl Into<String>,
        value: Arc<dyn Any + Send + Sync>,
    ) -> RouterResult<()> {
        let name = name.into();
        if !self.entries.contains_key(&name) && self.entries.len() >= self.limit {
            return Err(RouterError::new(ErrorCode::InvalidOption)
                .with_message(format!("dependency limit of {} exceeded", self.limit)));
        }
        self.entries.insert(name, value);
        Ok(())
    }

    /// Recover a value by name and type.
    ///
    /// Returns `None` when the name is unknown or registered under a
    /// different concrete type.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .get(name)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Remove a value by name.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Whether a value is registered under the name.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Dependencies")
            .field("limit", &self.limit)
            .field("names", &names)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
