//! Navigation engine: current state, id allocation, and cancellation.
//!
//! The engine owns the single cell holding the router's current [`State`]
//! and the two counters every transition depends on:
//!
//! - a monotonically increasing **state id**, assigned when a state value is
//!   built and preserved when history entries round-trip through popstate;
//! - a **navigation generation**, bumped when a new navigation begins. Each
//!   transition captures a [`CancellationToken`] snapshotting the generation;
//!   the pipeline polls it before every hook, so starting a new navigation
//!   (or stopping the router) cancels the one in flight.
//!
//! Commit is atomic: the pipeline's final state replaces the current state
//! only if the committing transition's token is still the latest generation.
//! A superseded transition never touches the cell, so cancellation can never
//! leave a half-applied state behind.

use crate::error::{ErrorCode, RouterError, RouterResult};
use crate::params::Params;
use crate::state::{NavigationOptions, State, StateMeta};
use crate::tree::{BuildOptions, RouteTree};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Snapshot of the navigation generation held by one transition.
///
/// Cheap to clone; all clones observe the same counters.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    generation: u64,
    counter: Arc<AtomicU64>,
}

impl CancellationToken {
    /// Whether a newer navigation has started since this token was issued.
    pub fn is_cancelled(&self) -> bool {
        self.counter.load(Ordering::SeqCst) != self.generation
    }

    /// The error a cancelled transition resolves to.
    pub fn cancellation_error(&self) -> RouterError {
        RouterError::new(ErrorCode::TransitionCancelled)
    }
}

/// Owner of the current state and the navigation counters.
#[derive(Debug)]
pub struct Navigation {
    current: Mutex<Option<State>>,
    next_state_id: AtomicU64,
    generation: Arc<AtomicU64>,
}

impl Navigation {
    /// Create an engine with no current state.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            next_state_id: AtomicU64::new(1),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A copy of the current state, if the router has committed one.
    pub fn current(&self) -> Option<State> {
        self.current.lock().expect("state cell poisoned").clone()
    }

    /// Allocate the id for a state being built.
    pub fn allocate_state_id(&self) -> u64 {
        self.next_state_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Begin a navigation: supersede any in-flight transition and return the
    /// token the new one must carry.
    pub fn begin(&self) -> CancellationToken {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        CancellationToken {
            generation,
            counter: Arc::clone(&self.generation),
        }
    }

    /// Cancel whatever is in flight without starting anything new.
    /// Used by `stop()`.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Atomically publish a committed state.
    ///
    /// Fails with `TRANSITION_CANCELLED` when the committing transition has
    /// been superseded; the current state is left untouched in that case.
    pub fn commit(&self, state: State, token: &CancellationToken) -> RouterResult<State> {
        let mut cell = self.current.lock().expect("state cell poisoned");
        if token.is_cancelled() {
            return Err(token.cancellation_error());
        }
        *cell = Some(state.clone());
        Ok(state)
    }

    /// Drop the current state. Used by `stop()`.
    pub fn reset(&self) {
        *self.current.lock().expect("state cell poisoned") = None;
    }
}

impl Default for Navigation {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a navigation state for a named route.
///
/// Resolves `forward_to` chains, renders the path, and attaches metadata
/// (id, per-segment parameter sources, options). Pure with respect to the
/// router: no transition runs and nothing is committed.
pub fn build_state(
    tree: &RouteTree,
    build_options: &BuildOptions,
    name: &str,
    params: Params,
    id: u64,
    options: NavigationOptions,
    source: Option<String>,
    redirected: bool,
) -> RouterResult<State> {
    let resolved = tree.resolve_forward(name)?;

    let segment_sources = tree
        .param_sources_for(&resolved)
        .ok_or_else(|| RouterError::route_not_found(&resolved))?;

    let path = tree.build_path(&resolved, &params, build_options)?;

    Ok(State::new(resolved, params, path).with_meta(StateMeta {
        id,
        params: segment_sources,
        options,
        redirected,
        source,
    }))
}

// ============================================================================
// Tests
// ============================================================================
