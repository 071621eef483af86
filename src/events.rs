//! Router lifecycle events and subscriptions.
//!
//! Subscribers receive every event the router emits, in registration order:
//!
//! | Event | When |
//! |-------|------|
//! | `ROUTER_START` | `start()` committed its initial transition |
//! | `ROUTER_STOP` | `stop()` was called |
//! | `TRANSITION_START` | a transition entered the pipeline |
//! | `TRANSITION_SUCCESS` | a transition committed; the router state already points at the new state |
//! | `TRANSITION_ERROR` | a transition failed with a [`RouterError`] |
//! | `TRANSITION_CANCEL` | a transition was superseded or the router stopped |
//!
//! Subscribing returns an [`Unsubscribe`](crate::registry::Unsubscribe)
//! handle. A panicking subscriber is caught and logged by the router's
//! fan-out; it never breaks the navigation that emitted the event.

use crate::error::{ErrorCode, RouterError, RouterResult};
use crate::state::{NavigationOptions, State};
use std::sync::Arc;

/// One router lifecycle event.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    /// The router started and committed its initial state.
    RouterStart,
    /// The router stopped.
    RouterStop,
    /// A transition entered the pipeline.
    TransitionStart {
        /// Target state.
        to: State,
        /// State being left, if any.
        from: Option<State>,
    },
    /// A transition committed.
    TransitionSuccess {
        /// The committed state.
        to: State,
        /// The previous state, if any.
        from: Option<State>,
        /// Options the navigation was requested with.
        options: NavigationOptions,
    },
    /// A transition failed.
    TransitionError {
        /// The state the transition was aiming at, when one was built.
        to: Option<State>,
        /// The state it was leaving.
        from: Option<State>,
        /// The failure.
        error: RouterError,
    },
    /// A transition was cancelled.
    TransitionCancel {
        /// The state the cancelled transition was aiming at.
        to: State,
        /// The state it was leaving.
        from: Option<State>,
    },
}

impl RouterEvent {
    /// The event's wire-stable name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RouterStart => "ROUTER_START",
            Self::RouterStop => "ROUTER_STOP",
            Self::TransitionStart { .. } => "TRANSITION_START",
            Self::TransitionSuccess { .. } => "TRANSITION_SUCCESS",
            Self::TransitionError { .. } => "TRANSITION_ERROR",
            Self::TransitionCancel { .. } => "TRANSITION_CANCEL",
        }
    }
}

/// Callback receiving router events.
pub type Listener = Arc<dyn Fn(&RouterEvent) + Send + Sync>;

/// Ordered set of subscribers with a size limit.
pub struct SubscriberRegistry {
    limit: usize,
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

impl SubscriberRegistry {
    /// Create a registry with the given listener limit.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    /// Add a listener; fails when the limit is reached.
    pub fn add(&mut self, listener: Listener) -> RouterResult<u64> {
        if self.listeners.len() >= self.limit {
            return Err(RouterError::new(ErrorCode::InvalidOption)
                .with_message(format!("listener limit of {} exceeded", self.limit)));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, listener));
        Ok(id)
    }

    /// Remove a listener by id; `false` when it was already gone.
    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Snapshot of the listeners in registration order.
    pub fn snapshot(&self) -> Vec<Listener> {
        self.listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
