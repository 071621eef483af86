//! Router plugins.
//!
//! A plugin is a factory-produced observer of the router's lifecycle. The
//! factory receives the router handle, so a plugin can keep a clone for
//! navigation (the browser plugin does exactly that), and registration is
//! batch-atomic with guaranteed rollback — see the registry module.
//!
//! Observer methods default to no-ops; implement only what the plugin needs.
//! A panicking observer is caught and logged by the router's fan-out and
//! never affects the navigation that triggered it. `teardown` runs when the
//! plugin's batch is unsubscribed or the router stops.

use crate::error::RouterError;
use crate::events::RouterEvent;
use crate::state::{NavigationOptions, State};

/// Observer of router lifecycle events.
#[allow(unused_variables)]
pub trait Plugin: Send + Sync + 'static {
    /// Plugin name for diagnostics and the double-install guard.
    fn name(&self) -> &'static str {
        "Plugin"
    }

    /// The router started.
    fn on_start(&self) {}

    /// The router stopped.
    fn on_stop(&self) {}

    /// A transition entered the pipeline.
    fn on_transition_start(&self, to: &State, from: Option<&State>) {}

    /// A transition committed; the router already points at `to`.
    fn on_transition_success(&self, to: &State, from: Option<&State>, options: &NavigationOptions) {
    }

    /// A transition failed.
    fn on_transition_error(&self, to: Option<&State>, from: Option<&State>, error: &RouterError) {}

    /// A transition was superseded or stopped.
    fn on_transition_cancel(&self, to: &State, from: Option<&State>) {}

    /// The plugin is being removed; release external resources here.
    fn teardown(&self) {}
}

/// Dispatch one event to the matching observer method.
pub fn notify(plugin: &dyn Plugin, event: &RouterEvent) {
    match event {
        RouterEvent::RouterStart => plugin.on_start(),
        RouterEvent::RouterStop => plugin.on_stop(),
        RouterEvent::TransitionStart { to, from } => {
            plugin.on_transition_start(to, from.as_ref());
        }
        RouterEvent::TransitionSuccess { to, from, options } => {
            plugin.on_transition_success(to, from.as_ref(), options);
        }
        RouterEvent::TransitionError { to, from, error } => {
            plugin.on_transition_error(to.as_ref(), from.as_ref(), error);
        }
        RouterEvent::TransitionCancel { to, from } => {
            plugin.on_transition_cancel(to, from.as_ref());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
