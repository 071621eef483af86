//! Transition middleware.
//!
//! Middleware observes and may reshape a pending navigation. It runs after
//! all guards have passed, in registration order across every batch, and may:
//!
//! - pass the transition through ([`Decision::Allow`]),
//! - fail it ([`Decision::Deny`] or an error → `TRANSITION_ERR`),
//! - refine the target ([`Decision::Redirect`] with the same route name —
//!   parameters are merged), or
//! - redirect it ([`Decision::Redirect`] with a different route name — the
//!   pipeline restarts from the guard phases with the `redirected` flag set).
//!
//! Middleware is produced by factories registered through the router, so each
//! registration can capture the router handle and its own state. See the
//! registry module for the atomic-batch semantics.
//!
//! # Example
//!
//! ```
//! use wayfarer::middleware::{middleware_fn, Middleware};
//! use wayfarer::guards::Decision;
//! use wayfarer::params::Params;
//! use wayfarer::state::State;
//!
//! let logger = middleware_fn(|to: &State, _from: Option<&State>| {
//!     println!("navigating to {}", to.name);
//!     true
//! });
//!
//! let to = State::new("home", Params::new(), "/home");
//! assert!(matches!(
//!     logger.run(&to, None).sync_decision(),
//!     Some(Ok(Decision::Allow))
//! ));
//! ```

use crate::error::RouterResult;
use crate::guards::{Decision, HookCheck};
use crate::state::State;

/// An observer that may refine or redirect a pending navigation.
///
/// Implement directly for named middleware, or use [`middleware_fn`] /
/// [`async_middleware_fn`] for one-off closures.
pub trait Middleware: Send + Sync + 'static {
    /// Process the pending transition.
    fn run(&self, to: &State, from: Option<&State>) -> HookCheck;

    /// Middleware name for diagnostics.
    fn name(&self) -> &'static str {
        "Middleware"
    }
}

/// Create middleware from a synchronous closure.
///
/// The closure may return anything convertible into a [`HookCheck`]: `bool`,
/// [`Decision`], a [`State`] (refinement or redirect), or a full
/// `RouterResult<Decision>`.
pub fn middleware_fn<F, C>(f: F) -> FnMiddleware<F>
where
    F: Fn(&State, Option<&State>) -> C + Send + Sync + 'static,
    C: Into<HookCheck>,
{
    FnMiddleware { f }
}

/// Middleware created from a synchronous closure.
pub struct FnMiddleware<F> {
    f: F,
}

impl<F, C> Middleware for FnMiddleware<F>
where
    F: Fn(&State, Option<&State>) -> C + Send + Sync + 'static,
    C: Into<HookCheck>,
{
    fn run(&self, to: &State, from: Option<&State>) -> HookCheck {
        (self.f)(to, from).into()
    }
}

/// Create middleware from an async closure.
pub fn async_middleware_fn<F, Fut>(f: F) -> AsyncFnMiddleware<F>
where
    F: Fn(&State, Option<&State>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = RouterResult<Decision>> + Send + 'static,
{
    AsyncFnMiddleware { f }
}

/// Middleware created from an async closure.
pub struct AsyncFnMiddleware<F> {
    f: F,
}

impl<F, Fut> Middleware for AsyncFnMiddleware<F>
where
    F: Fn(&State, Option<&State>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = RouterResult<Decision>> + Send + 'static,
{
    fn run(&self, to: &State, from: Option<&State>) -> HookCheck {
        HookCheck::Future(Box::pin((self.f)(to, from)))
    }
}

// ============================================================================
// Tests
// ============================================================================
