//! Activation and deactivation guards.
//!
//! Guards decide whether a segment may be entered or left. They run inside
//! the transition pipeline **before** middleware, keyed by segment name: at
//! most one activation guard and one deactivation guard per segment, with
//! re-registration replacing the previous one.
//!
//! A guard returns a [`HookCheck`] — either an immediate decision or a boxed
//! future resolving to one. The same shape is shared by middleware.
//!
//! | Decision | Effect in a guard |
//! |----------|-------------------|
//! | [`Allow`](Decision::Allow) | the phase continues |
//! | [`Deny`](Decision::Deny) | the transition fails with the phase's error code |
//! | [`Redirect`](Decision::Redirect) with the same route name | refined params are merged into the target state |
//! | [`Redirect`](Decision::Redirect) with a different name | rejected — guards cannot redirect, use middleware |
//!
//! # Example
//!
//! ```
//! use wayfarer::guards::{guard_fn, Decision, Guard};
//! use wayfarer::params::Params;
//! use wayfarer::state::State;
//!
//! let guard = guard_fn(|to: &State, _from: Option<&State>| to.params.contains("id"));
//!
//! let to = State::new("users.view", Params::new(), "/users/view");
//! assert!(matches!(
//!     guard.check(&to, None).sync_decision(),
//!     Some(Ok(Decision::Deny))
//! ));
//! ```

use crate::error::{RouterError, RouterResult};
use crate::state::State;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Decisions
// ============================================================================

/// Outcome of a guard or middleware hook.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Let the transition proceed unchanged.
    Allow,
    /// Block the transition.
    Deny,
    /// Replace the target state. Guards may only refine parameters of the
    /// same route; middleware with a different route name triggers a
    /// pipeline restart.
    Redirect(State),
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Self::Allow
        } else {
            Self::Deny
        }
    }
}

impl From<State> for Decision {
    fn from(state: State) -> Self {
        Self::Redirect(state)
    }
}

/// Future form of a hook result.
pub type HookFuture = BoxFuture<'static, RouterResult<Decision>>;

/// A hook's return value: an immediate decision or a future resolving to one.
pub enum HookCheck {
    /// Decided synchronously.
    Ready(RouterResult<Decision>),
    /// Decision pending; the pipeline awaits it.
    Future(HookFuture),
}

impl HookCheck {
    /// An immediate allow.
    pub fn allow() -> Self {
        Self::Ready(Ok(Decision::Allow))
    }

    /// An immediate deny.
    pub fn deny() -> Self {
        Self::Ready(Ok(Decision::Deny))
    }

    /// An immediate redirect.
    pub fn redirect(state: State) -> Self {
        Self::Ready(Ok(Decision::Redirect(state)))
    }

    /// An immediate failure.
    pub fn fail(error: RouterError) -> Self {
        Self::Ready(Err(error))
    }

    /// The synchronous decision, if there is one. Pending checks return `None`.
    pub fn sync_decision(&self) -> Option<&RouterResult<Decision>> {
        match self {
            Self::Ready(result) => Some(result),
            Self::Future(_) => None,
        }
    }

    /// Resolve the check, awaiting the future form when necessary.
    pub async fn resolve(self) -> RouterResult<Decision> {
        match self {
            Self::Ready(result) => result,
            Self::Future(future) => future.await,
        }
    }
}

impl From<bool> for HookCheck {
    fn from(allowed: bool) -> Self {
        Self::Ready(Ok(Decision::from(allowed)))
    }
}

impl From<Decision> for HookCheck {
    fn from(decision: Decision) -> Self {
        Self::Ready(Ok(decision))
    }
}

impl From<State> for HookCheck {
    fn from(state: State) -> Self {
        Self::Ready(Ok(Decision::Redirect(state)))
    }
}

impl From<RouterResult<Decision>> for HookCheck {
    fn from(result: RouterResult<Decision>) -> Self {
        Self::Ready(result)
    }
}

// ============================================================================
// Guard trait
// ============================================================================

/// A predicate attached to a segment, controlling activation or deactivation.
///
/// Implement directly for named guards, or use [`guard_fn`] /
/// [`async_guard_fn`] for one-off closures.
pub trait Guard: Send + Sync + 'static {
    /// Decide whether the transition may proceed.
    ///
    /// Receives the target state and the state being left, if any.
    fn check(&self, to: &State, from: Option<&State>) -> HookCheck;

    /// Guard name for diagnostics.
    fn name(&self) -> &'static str {
        "Guard"
    }
}

/// Create a guard from a synchronous closure.
///
/// The closure may return anything convertible into a [`HookCheck`]:
/// `bool`, [`Decision`], a [`State`] (parameter refinement), or a full
/// `RouterResult<Decision>`.
pub fn guard_fn<F, C>(f: F) -> FnGuard<F>
where
    F: Fn(&State, Option<&State>) -> C + Send + Sync + 'static,
    C: Into<HookCheck>,
{
    FnGuard { f }
}

/// Guard created from a synchronous closure.
pub struct FnGuard<F> {
    f: F,
}

impl<F, C> Guard for FnGuard<F>
where
    F: Fn(&State, Option<&State>) -> C + Send + Sync + 'static,
    C: Into<HookCheck>,
{
    fn check(&self, to: &State, from: Option<&State>) -> HookCheck {
        (self.f)(to, from).into()
    }
}

/// Create a guard from an async closure.
///
/// The returned future is boxed; the pipeline polls cancellation before
/// awaiting it.
pub fn async_guard_fn<F, Fut>(f: F) -> AsyncFnGuard<F>
where
    F: Fn(&State, Option<&State>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = RouterResult<Decision>> + Send + 'static,
{
    AsyncFnGuard { f }
}

/// Guard created from an async closure.
pub struct AsyncFnGuard<F> {
    f: F,
}

impl<F, Fut> Guard for AsyncFnGuard<F>
where
    F: Fn(&State, Option<&State>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = RouterResult<Decision>> + Send + 'static,
{
    fn check(&self, to: &State, from: Option<&State>) -> HookCheck {
        HookCheck::Future(Box::pin((self.f)(to, from)))
    }
}

// ============================================================================
// Guard registry
// ============================================================================

/// Which lifecycle a guard participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    /// Checked when the segment is being entered.
    Activate,
    /// Checked when the segment is being left.
    Deactivate,
}

/// Guards keyed by segment name, one per kind per segment.
#[derive(Default)]
pub struct GuardRegistry {
    activate: HashMap<String, Arc<dyn Guard>>,
    deactivate: HashMap<String, Arc<dyn Guard>>,
}

impl GuardRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: GuardKind) -> &HashMap<String, Arc<dyn Guard>> {
        match kind {
            GuardKind::Activate => &self.activate,
            GuardKind::Deactivate => &self.deactivate,
        }
    }

    /// Register a guard, replacing any previous guard of the same kind on
    /// the same segment.
    pub fn insert(&mut self, kind: GuardKind, segment: impl Into<String>, guard: Arc<dyn Guard>) {
        let table = match kind {
            GuardKind::Activate => &mut self.activate,
            GuardKind::Deactivate => &mut self.deactivate,
        };
        table.insert(segment.into(), guard);
    }

    /// Remove the guard of the given kind from a segment.
    pub fn remove(&mut self, kind: GuardKind, segment: &str) -> bool {
        let table = match kind {
            GuardKind::Activate => &mut self.activate,
            GuardKind::Deactivate => &mut self.deactivate,
        };
        table.remove(segment).is_some()
    }

    /// The guard registered for a segment, if any.
    pub fn get(&self, kind: GuardKind, segment: &str) -> Option<Arc<dyn Guard>> {
        self.table(kind).get(segment).cloned()
    }

    /// A clone of one kind's table, used to snapshot guards per transition.
    pub fn snapshot(&self, kind: GuardKind) -> HashMap<String, Arc<dyn Guard>> {
        self.table(kind).clone()
    }

    /// Number of registered guards of a kind.
    pub fn len(&self, kind: GuardKind) -> usize {
        self.table(kind).len()
    }

    /// Whether no guards are registered at all.
    pub fn is_empty(&self) -> bool {
        self.activate.is_empty() && self.deactivate.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
