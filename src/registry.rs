//! Factory registration with atomic batch semantics.
//!
//! Plugins and middleware register through factories, in batches. A batch is
//! all-or-nothing:
//!
//! 1. the whole batch is rejected if it would exceed the configured size
//!    limit, or if any factory is already registered (factories are keyed by
//!    identity);
//! 2. factories run in order; if one fails, instances produced earlier in the
//!    same batch are discarded and nothing is recorded — side effects of the
//!    factories that already ran persist, but the registry is unchanged;
//! 3. on success the batch's instances are appended in definition order and a
//!    batch id is returned for later removal.
//!
//! Passing the same factory twice **within** one batch counts once.
//! Execution order of instances is always definition order across all
//! batches. Removal by batch id is idempotent and never affects other
//! batches.
//!
//! The [`Unsubscribe`] handle wraps a removal closure so callers can undo a
//! registration (or a subscription) without holding onto the router's
//! internals; calling it more than once is a no-op.

use crate::error::{ErrorCode, RouterError, RouterResult};
use std::sync::Mutex;

/// Identity key of a registered factory.
pub type FactoryKey = usize;

/// Identifier of one successfully registered batch.
pub type BatchId = u64;

struct Entry<T> {
    key: FactoryKey,
    batch: BatchId,
    instance: T,
}

/// Ordered store of factory-produced instances.
pub struct FactoryRegistry<T> {
    label: &'static str,
    limit: usize,
    next_batch: BatchId,
    entries: Vec<Entry<T>>,
}

impl<T: Clone> FactoryRegistry<T> {
    /// Create a registry labelled for diagnostics, with a size limit.
    pub fn new(label: &'static str, limit: usize) -> Self {
        Self {
            label,
            limit,
            next_batch: 0,
            entries: Vec::new(),
        }
    }

    /// Register a batch of keyed factories atomically.
    ///
    /// Each element is the factory's identity key plus a closure producing
    /// the instance (the caller binds whatever context the factory needs).
    pub fn add_batch(
        &mut self,
        batch: Vec<(FactoryKey, Box<dyn FnOnce() -> RouterResult<T> + '_>)>,
    ) -> RouterResult<BatchId> {
        // In-batch dedup: the same factory given twice counts once.
        let mut deduped: Vec<(FactoryKey, Box<dyn FnOnce() -> RouterResult<T> + '_>)> =
            Vec::new();
        for (key, factory) in batch {
            if deduped.iter().any(|(existing, _)| *existing == key) {
                continue;
            }
            deduped.push((key, factory));
        }

        if self.entries.len() + deduped.len() > self.limit {
            return Err(RouterError::new(ErrorCode::InvalidOption).with_message(format!(
                "{} limit of {} exceeded ({} registered, {} in batch)",
                self.label,
                self.limit,
                self.entries.len(),
                deduped.len()
            )));
        }

        for (key, _) in &deduped {
            if self.entries.iter().any(|entry| entry.key == *key) {
                return Err(RouterError::new(ErrorCode::InvalidOption)
                    .with_message(format!("{} factory is already registered", self.label)));
            }
        }

        // Invoke in order; a failure drops everything produced so far in
        // this batch without touching the registry.
        let batch_id = self.next_batch;
        let mut produced = Vec::with_capacity(deduped.len());
        for (key, factory) in deduped {
            let instance = factory()?;
            produced.push(Entry {
                key,
                batch: batch_id,
                instance,
            });
        }

        self.next_batch += 1;
        self.entries.extend(produced);
        Ok(batch_id)
    }

    /// Remove every instance registered under the given batch id.
    ///
    /// Returns the removed instances in definition order; empty on repeat
    /// calls. Callers run teardown on what comes back.
    pub fn remove_batch(&mut self, batch: BatchId) -> Vec<T> {
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            if entry.batch == batch {
                removed.push(entry.instance.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Remove everything, returning the instances in definition order.
    pub fn clear(&mut self) -> Vec<T> {
        self.entries.drain(..).map(|entry| entry.instance).collect()
    }

    /// Instances in definition order across all batches.
    pub fn instances(&self) -> Vec<T> {
        self.entries
            .iter()
            .map(|entry| entry.instance.clone())
            .collect()
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Unsubscribe
// ============================================================================

/// A one-shot removal handle.
///
/// Calling [`call`](Unsubscribe::call) removes exactly what the originating
/// registration added. Subsequent calls are no-ops and report `false`.
pub struct Unsubscribe {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Unsubscribe {
    /// Wrap a removal closure.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// A handle that does nothing.
    pub fn noop() -> Self {
        Self {
            action: Mutex::new(None),
        }
    }

    /// Run the removal. Returns `false` when it already ran.
    pub fn call(&self) -> bool {
        let action = self.action.lock().expect("unsubscribe poisoned").take();
        match action {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let spent = self
            .action
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true);
        f.debug_struct("Unsubscribe").field("spent", &spent).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
