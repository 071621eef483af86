//! Navigation state values and transition-path computation.
//!
//! A [`State`] is the immutable value a committed navigation produces: route
//! name, parameters, the rendered path, and bookkeeping metadata. States are
//! plain data — cloning is cheap enough, serde round-trips let history
//! drivers persist them into the browser's per-entry state slot, and nothing
//! holds references into the router.
//!
//! [`transition_path`] computes what actually changes when moving between two
//! states: the deepest common prefix whose declared parameters are unchanged
//! (the *intersection*), the segments to activate (shallowest first), and the
//! segments to deactivate (deepest first).
//!
//! # Example
//!
//! ```
//! use wayfarer::params::Params;
//! use wayfarer::state::{transition_path, State};
//!
//! let from = State::new("users.view", Params::new(), "/users/view/1");
//! let to = State::new("users.list", Params::new(), "/users/list");
//!
//! let path = transition_path(&to, Some(&from));
//! assert_eq!(path.intersection, "users");
//! assert_eq!(path.to_activate, ["users.list"]);
//! assert_eq!(path.to_deactivate, ["users.view"]);
//! ```

use crate::params::{ParamSource, Params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options attached to a navigation request and recorded on the resulting
/// state's metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationOptions {
    /// Replace the current history entry instead of pushing a new one.
    #[serde(default)]
    pub replace: bool,
    /// Force full deactivation and re-activation regardless of the computed
    /// intersection.
    #[serde(default)]
    pub reload: bool,
    /// Proceed even when the target equals the current state.
    #[serde(default)]
    pub force: bool,
}

/// Per-segment record of declared parameters and where their values travel.
pub type SegmentParamSources = BTreeMap<String, BTreeMap<String, ParamSource>>;

/// Bookkeeping metadata attached to a built state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMeta {
    /// Monotonically increasing id assigned at state creation; preserved when
    /// history entries round-trip through popstate.
    pub id: u64,
    /// Declared parameters per segment in the name chain, used by
    /// transition-path diffing.
    #[serde(default)]
    pub params: SegmentParamSources,
    /// The options the navigation was requested with.
    #[serde(default)]
    pub options: NavigationOptions,
    /// Whether this state was reached through a middleware redirect.
    #[serde(default)]
    pub redirected: bool,
    /// Origin of the navigation (e.g. `"popstate"`), when not programmatic.
    #[serde(default)]
    pub source: Option<String>,
}

/// An immutable navigation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Dot-qualified route name.
    pub name: String,
    /// Parameters the state was built with.
    pub params: Params,
    /// The rendered path, query string included.
    pub path: String,
    /// Bookkeeping metadata; absent on externally constructed states.
    #[serde(default)]
    pub meta: Option<StateMeta>,
}

impl State {
    /// Create a bare state without metadata.
    pub fn new(name: impl Into<String>, params: Params, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params,
            path: path.into(),
            meta: None,
        }
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: StateMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// The state's id, when metadata is present.
    pub fn id(&self) -> Option<u64> {
        self.meta.as_ref().map(|meta| meta.id)
    }

    /// Whether this state was reached through a redirect.
    pub fn is_redirected(&self) -> bool {
        self.meta.as_ref().is_some_and(|meta| meta.redirected)
    }

    /// Core equality: same name and parameters, metadata ignored.
    ///
    /// Used for the same-state check before a transition and by the browser
    /// plugin when deciding whether a popstate needs servicing.
    pub fn same_as(&self, other: &State) -> bool {
        self.name == other.name && self.params == other.params
    }
}

/// The computed difference between two states.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransitionPath {
    /// Deepest common dot-qualified prefix with unchanged parameters; empty
    /// when the states share nothing.
    pub intersection: String,
    /// Segments to activate, shallowest first.
    pub to_activate: Vec<String>,
    /// Segments to deactivate, deepest first.
    pub to_deactivate: Vec<String>,
}

/// Cumulative segment names of a dot-qualified route name:
/// `"a.b.c"` → `["a", "a.b", "a.b.c"]`.
fn segment_chain(name: &str) -> Vec<String> {
    if name.is_empty() {
        return Vec::new();
    }
    let mut chain = Vec::new();
    let mut current = String::new();
    for part in name.split('.') {
        if !current.is_empty() {
            current.push('.');
        }
        current.push_str(part);
        chain.push(current.clone());
    }
    chain
}

/// Compute the transition path from `from` to `to`.
///
/// Follows the diff rules: no `from` activates everything; `reload` (or two
/// states that cannot be diffed because neither carries segment metadata)
/// forces a full path; otherwise segments are compared pairwise by name and
/// by their declared parameters under string coercion, with null values
/// treated as absent.
pub fn transition_path(to: &State, from: Option<&State>) -> TransitionPath {
    let to_chain = segment_chain(&to.name);

    let Some(from) = from else {
        return TransitionPath {
            intersection: String::new(),
            to_activate: to_chain,
            to_deactivate: Vec::new(),
        };
    };

    let from_chain = segment_chain(&from.name);
    let reload = to
        .meta
        .as_ref()
        .is_some_and(|meta| meta.options.reload);
    let undiffable = to.meta.is_none() && from.meta.is_none();

    if reload || undiffable {
        let mut to_deactivate = from_chain;
        to_deactivate.reverse();
        return TransitionPath {
            intersection: String::new(),
            to_activate: to_chain,
            to_deactivate,
        };
    }

    let common = to_chain.len().min(from_chain.len());
    let mut divergence = 0usize;
    while divergence < common {
        let segment = &to_chain[divergence];
        if segment != &from_chain[divergence] || !segment_params_equal(to, from, segment) {
            break;
        }
        divergence += 1;
    }

    let intersection = if divergence == 0 {
        String::new()
    } else {
        to_chain[divergence - 1].clone()
    };

    let to_activate = to_chain[divergence..].to_vec();
    let mut to_deactivate = from_chain[divergence..].to_vec();
    to_deactivate.reverse();

    TransitionPath {
        intersection,
        to_activate,
        to_deactivate,
    }
}

/// Compare the declared parameters of one segment across two states.
///
/// Parameter order is irrelevant; only declared parameters influence the
/// result; null-valued entries are skipped on the declaring side.
fn segment_params_equal(to: &State, from: &State, segment: &str) -> bool {
    let mut declared: Vec<&String> = Vec::new();
    for state in [to, from] {
        if let Some(meta) = &state.meta {
            if let Some(sources) = meta.params.get(segment) {
                for name in sources.keys() {
                    if !declared.contains(&name) {
                        declared.push(name);
                    }
                }
            }
        }
    }

    declared.into_iter().all(|name| {
        let left = to.params.get(name).filter(|value| !value.is_null());
        let right = from.params.get(name).filter(|value| !value.is_null());
        match (left, right) {
            (Some(left), Some(right)) => left.coerced_eq(right),
            (None, None) => true,
            _ => false,
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
