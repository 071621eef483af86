//! Browser history synchronization.
//!
//! This module bridges the router and an external mutable surface — the
//! browser URL and its history entries — under concurrent user input.
//! Three pieces cooperate:
//!
//! - [`HistoryDriver`] — the environment abstraction: read the location,
//!   push/replace entries, listen for popstate, and schedule async work.
//!   A wasm binding implements this over the History API; servers and tests
//!   use [`MemoryHistory`], which touches no global state.
//! - [`MemoryHistory`] — an in-memory entry stack with back/forward and a
//!   deterministic future queue ([`drive`](MemoryHistory::drive)).
//! - [`BrowserPlugin`] — the router plugin: pushes or replaces entries on
//!   committed transitions, services popstate events (deferring all but the
//!   latest while a transition is in flight), and restores the URL when a
//!   history-initiated transition is blocked.
//!
//! The plugin also installs the router's [`BrowserNavigator`] capability
//! (`build_url`, `match_url`, `replace_history_state`).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wayfarer::browser::{BrowserPlugin, BrowserPluginOptions, MemoryHistory};
//! use wayfarer::options::RouterOptions;
//! use wayfarer::params::Params;
//! use wayfarer::router::Router;
//! use wayfarer::tree::RouteDefinition;
//!
//! let history = Arc::new(MemoryHistory::new());
//! let router = Router::new(
//!     vec![RouteDefinition::new("home", "/home")],
//!     RouterOptions::builder().default_route("home").build().unwrap(),
//! )
//! .unwrap();
//! router
//!     .use_plugin(vec![BrowserPlugin::factory(
//!         history.clone(),
//!         BrowserPluginOptions::default(),
//!     )])
//!     .unwrap();
//!
//! pollster::block_on(router.start(&history.current_path())).unwrap();
//! assert_eq!(history.current_url(), "/home");
//! ```

use crate::error::{ErrorCode, RouterError, RouterResult};
use crate::params::Params;
use crate::plugin::Plugin;
use crate::registry::Unsubscribe;
use crate::router::{BrowserNavigator, PluginFactory, Router};
use crate::state::{NavigationOptions, State};
use crate::{debug_log, trace_log};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Origin tag stamped on states produced by history events.
pub const POPSTATE_SOURCE: &str = "popstate";

// ============================================================================
// Location
// ============================================================================

/// A decomposed URL: path, query string, and fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// The path portion, always with a leading slash.
    pub path: String,
    /// The query string including its `?`, or empty.
    pub search: String,
    /// The fragment including its `#`, or empty.
    pub hash: String,
}

impl Location {
    /// Split a relative URL (`/path?query#hash`) into its parts.
    pub fn parse(url: &str) -> Self {
        let (rest, hash) = match url.find('#') {
            Some(position) => (&url[..position], url[position..].to_string()),
            None => (url, String::new()),
        };
        let (path, search) = match rest.find('?') {
            Some(position) => (&rest[..position], rest[position..].to_string()),
            None => (rest, String::new()),
        };
        let path = if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        };
        Self { path, search, hash }
    }

    /// Reassemble the URL.
    pub fn full(&self) -> String {
        format!("{}{}{}", self.path, self.search, self.hash)
    }
}

// ============================================================================
// HistoryDriver
// ============================================================================

/// A history event delivered to the plugin's listener.
#[derive(Debug, Clone)]
pub struct PopstateEvent {
    /// The per-entry state slot, when the entry carries one.
    pub state: Option<Value>,
    /// The location at the moment of the event.
    pub location: Location,
}

/// Callback invoked on every popstate; returns the future that services the
/// event. The environment drives it (spawn_local in a browser, the pending
/// queue in [`MemoryHistory`]).
pub type PopstateCallback = Arc<dyn Fn(PopstateEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Environment abstraction over the History API.
///
/// All methods are infallible by design: a missing environment (SSR) is
/// expressed by a driver whose mutating methods do nothing.
pub trait HistoryDriver: Send + Sync + 'static {
    /// The current location, or `None` when no environment is present.
    fn location(&self) -> Option<Location>;

    /// The current entry's state slot.
    fn state(&self) -> Option<Value>;

    /// Push a new entry.
    fn push_state(&self, payload: Value, title: &str, url: &str);

    /// Replace the current entry.
    fn replace_state(&self, payload: Value, title: &str, url: &str);

    /// Install the popstate listener; the handle removes it. At most one
    /// listener is active at a time.
    fn listen(&self, callback: PopstateCallback) -> Unsubscribe;

    /// Schedule a future produced outside an async context (deferred
    /// popstate servicing).
    fn spawn(&self, future: BoxFuture<'static, ()>);
}

// ============================================================================
// MemoryHistory
// ============================================================================

struct MemoryEntry {
    url: String,
    payload: Value,
}

struct MemoryHistoryState {
    entries: Vec<MemoryEntry>,
    index: usize,
}

/// In-memory [`HistoryDriver`]: an entry stack with explicit back/forward
/// and a deterministic queue for scheduled futures.
///
/// Serves as the SSR-safe shim and as the test environment. Entry payloads
/// round-trip through JSON exactly like the browser's structured clone.
pub struct MemoryHistory {
    state: Mutex<MemoryHistoryState>,
    listener: Arc<Mutex<Option<PopstateCallback>>>,
    pending: Mutex<VecDeque<BoxFuture<'static, ()>>>,
}

impl MemoryHistory {
    /// Create a history whose single entry is `/`.
    pub fn new() -> Self {
        Self::with_initial("/")
    }

    /// Create a history whose single entry is the given URL.
    pub fn with_initial(url: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryHistoryState {
                entries: vec![MemoryEntry {
                    url: url.into(),
                    payload: Value::Null,
                }],
                index: 0,
            }),
            listener: Arc::new(Mutex::new(None)),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, MemoryHistoryState> {
        self.state.lock().expect("history poisoned")
    }

    /// The current entry's URL.
    pub fn current_url(&self) -> String {
        let state = self.locked();
        state.entries[state.index].url.clone()
    }

    /// The current entry's path component (hash-mode URLs are returned
    /// whole, which is what `start` expects).
    pub fn current_path(&self) -> String {
        self.current_url()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.locked().entries.len()
    }

    /// Whether the stack holds only the initial entry.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Simulate the user pressing Back. Fires the popstate listener.
    pub fn back(&self) {
        let event = {
            let mut state = self.locked();
            if state.index == 0 {
                return;
            }
            state.index -= 1;
            Self::event_for(&state)
        };
        self.fire(event);
    }

    /// Simulate the user pressing Forward. Fires the popstate listener.
    pub fn forward(&self) {
        let event = {
            let mut state = self.locked();
            if state.index + 1 >= state.entries.len() {
                return;
            }
            state.index += 1;
            Self::event_for(&state)
        };
        self.fire(event);
    }

    /// Fire a popstate for the current entry without moving, the way a
    /// browser does for hashchange-style events.
    pub fn emit_current(&self) {
        let event = {
            let state = self.locked();
            Self::event_for(&state)
        };
        self.fire(event);
    }

    fn event_for(state: &MemoryHistoryState) -> PopstateEvent {
        let entry = &state.entries[state.index];
        PopstateEvent {
            state: match &entry.payload {
                Value::Null => None,
                other => Some(other.clone()),
            },
            location: Location::parse(&entry.url),
        }
    }

    fn fire(&self, event: PopstateEvent) {
        let callback = self.listener.lock().expect("listener poisoned").clone();
        if let Some(callback) = callback {
            let future = callback(event);
            self.spawn(future);
        }
    }

    /// Drain and run every scheduled future in order.
    pub fn drive(&self) {
        loop {
            let next = self.pending.lock().expect("pending poisoned").pop_front();
            match next {
                Some(future) => futures::executor::block_on(future),
                None => break,
            }
        }
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryDriver for MemoryHistory {
    fn location(&self) -> Option<Location> {
        Some(Location::parse(&self.current_url()))
    }

    fn state(&self) -> Option<Value> {
        let state = self.locked();
        match &state.entries[state.index].payload {
            Value::Null => None,
            other => Some(other.clone()),
        }
    }

    fn push_state(&self, payload: Value, _title: &str, url: &str) {
        let mut state = self.locked();
        let keep = state.index + 1;
        state.entries.truncate(keep);
        state.entries.push(MemoryEntry {
            url: url.to_string(),
            payload,
        });
        state.index += 1;
    }

    fn replace_state(&self, payload: Value, _title: &str, url: &str) {
        let mut state = self.locked();
        let index = state.index;
        state.entries[index] = MemoryEntry {
            url: url.to_string(),
            payload,
        };
    }

    fn listen(&self, callback: PopstateCallback) -> Unsubscribe {
        *self.listener.lock().expect("listener poisoned") = Some(callback);
        let slot = Arc::clone(&self.listener);
        Unsubscribe::new(move || {
            *slot.lock().expect("listener poisoned") = None;
        })
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) {
        self.pending.lock().expect("pending poisoned").push_back(future);
    }
}

// ============================================================================
// Plugin options
// ============================================================================

/// Configuration of the [`BrowserPlugin`].
#[derive(Debug, Clone, Default)]
pub struct BrowserPluginOptions {
    /// Keep the router path in the URL fragment instead of the path.
    pub use_hash: bool,
    /// Prefix inside the fragment (hash mode only), e.g. `!` for `#!/users`.
    pub hash_prefix: String,
    /// Base path the application is hosted under; normalized to a leading
    /// slash and no trailing slash. Empty means root hosting.
    pub base: String,
    /// Re-append the current fragment to pushed URLs (history mode only).
    pub preserve_hash: bool,
    /// Shallow-merge the router's entry payload over whatever the host
    /// application stored in the entry.
    pub merge_state: bool,
}

impl BrowserPluginOptions {
    /// Resolve conflicting options, logging what was dropped, and normalize
    /// the base path.
    fn sanitized(mut self, logger: &crate::logging::Logger) -> Self {
        if !self.use_hash && !self.hash_prefix.is_empty() {
            logger.warn("browser", "hash_prefix is ignored in history mode; dropping it");
            self.hash_prefix.clear();
        }
        if self.use_hash && self.preserve_hash {
            logger.warn("browser", "preserve_hash is meaningless in hash mode; dropping it");
            self.preserve_hash = false;
        }
        if !self.base.is_empty() {
            if !self.base.starts_with('/') {
                self.base.insert(0, '/');
            }
            while self.base.len() > 1 && self.base.ends_with('/') {
                self.base.pop();
            }
            if self.base == "/" {
                self.base.clear();
            }
        }
        self
    }
}

// ============================================================================
// BrowserPlugin
// ============================================================================

/// Router plugin bridging the History API.
pub struct BrowserPlugin {
    router: Router,
    driver: Arc<dyn HistoryDriver>,
    options: BrowserPluginOptions,
    weak_self: Weak<BrowserPlugin>,
    /// Transitions currently in the pipeline. Popstate events arriving while
    /// this is non-zero are deferred (latest only).
    in_flight: AtomicUsize,
    deferred: Mutex<Option<PopstateEvent>>,
    listener: Mutex<Option<Unsubscribe>>,
    last_known: Mutex<Option<State>>,
}

impl BrowserPlugin {
    /// Produce the plugin factory for [`Router::use_plugin`].
    pub fn factory(driver: Arc<dyn HistoryDriver>, options: BrowserPluginOptions) -> PluginFactory {
        Arc::new(move |router: &Router| {
            router.claim_plugin_flag("BrowserPlugin")?;
            let options = options.clone().sanitized(&router.logger());
            let plugin = Arc::new_cyclic(|weak: &Weak<BrowserPlugin>| BrowserPlugin {
                router: router.clone(),
                driver: Arc::clone(&driver),
                options,
                weak_self: weak.clone(),
                in_flight: AtomicUsize::new(0),
                deferred: Mutex::new(None),
                listener: Mutex::new(None),
                last_known: Mutex::new(None),
            });
            router.install_browser_navigator(plugin.clone());
            Ok(plugin as Arc<dyn Plugin>)
        })
    }

    /// The most recently committed state, as last seen by the plugin.
    pub fn last_known_state(&self) -> Option<State> {
        self.last_known.lock().expect("last_known poisoned").clone()
    }

    // --- URL translation ---

    /// Full URL (base, hash prefix, preserved fragment) for a router path.
    fn full_url(&self, router_path: &str) -> String {
        if self.options.use_hash {
            format!(
                "{}#{}{}",
                self.options.base, self.options.hash_prefix, router_path
            )
        } else {
            let preserved = if self.options.preserve_hash {
                self.driver
                    .location()
                    .map(|location| location.hash)
                    .unwrap_or_default()
            } else {
                String::new()
            };
            format!("{}{}{}", self.options.base, router_path, preserved)
        }
    }

    /// Router path for a location, stripping base and hash prefix.
    fn router_path(&self, location: &Location) -> String {
        if self.options.use_hash {
            let raw = location.hash.strip_prefix('#').unwrap_or("");
            let raw = raw
                .strip_prefix(self.options.hash_prefix.as_str())
                .unwrap_or(raw);
            if raw.is_empty() {
                "/".to_string()
            } else {
                raw.to_string()
            }
        } else {
            let path = if self.options.base.is_empty() {
                location.path.as_str()
            } else {
                location
                    .path
                    .strip_prefix(self.options.base.as_str())
                    .unwrap_or(location.path.as_str())
            };
            let path = if path.is_empty() { "/" } else { path };
            format!("{path}{}", location.search)
        }
    }

    // --- History entry payloads ---

    fn entry_payload(&self, state: &State) -> Value {
        let own = serde_json::to_value(state).unwrap_or(Value::Null);
        if !self.options.merge_state {
            return own;
        }
        // Shallow merge: router keys replace same-named host keys wholesale.
        match (self.driver.state(), own) {
            (Some(Value::Object(mut host)), Value::Object(ours)) => {
                for (key, value) in ours {
                    host.insert(key, value);
                }
                Value::Object(host)
            }
            (_, own) => own,
        }
    }

    // --- Popstate servicing ---

    fn on_popstate(self: Arc<Self>, event: PopstateEvent) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if self.in_flight.load(Ordering::SeqCst) > 0 {
                trace_log!("popstate deferred while a transition is in flight");
                *self.deferred.lock().expect("deferred poisoned") = Some(event);
                return;
            }
            self.service_popstate(event).await;
        })
    }

    async fn service_popstate(&self, event: PopstateEvent) {
        let Some(candidate) = self.candidate_from(&event) else {
            debug_log!("popstate for unroutable URL; restoring");
            self.restore_url();
            return;
        };

        if let Some(current) = self.router.get_state() {
            if current.same_as(&candidate) {
                trace_log!("popstate matches current state; skipping");
                return;
            }
        }

        let outcome = self
            .router
            .navigate_to_state(
                candidate,
                NavigationOptions::default(),
                Some(POPSTATE_SOURCE.to_string()),
            )
            .await;

        match outcome {
            Ok(_) => {}
            Err(error) if error.code == ErrorCode::TransitionCancelled => {}
            Err(_) => self.restore_url(),
        }
    }

    /// Build the candidate state: the entry payload when valid, else a match
    /// of the event's URL.
    fn candidate_from(&self, event: &PopstateEvent) -> Option<State> {
        if let Some(payload) = &event.state {
            if let Ok(state) = serde_json::from_value::<State>(payload.clone()) {
                if !state.name.is_empty() {
                    return Some(state);
                }
            }
        }
        let path = self.router_path(&event.location);
        self.router.match_path(&path)
    }

    /// Best-effort: make the browser URL match the router's current state.
    fn restore_url(&self) {
        let Some(current) = self.router.get_state() else {
            return;
        };
        let attempt = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let payload = self.entry_payload(&current);
            self.driver
                .replace_state(payload, "", &self.full_url(&current.path));
        }));
        if attempt.is_err() {
            self.router
                .logger()
                .error("browser", "URL restoration failed; giving up");
        }
    }

    fn service_deferred(&self) {
        if self.deferred.lock().expect("deferred poisoned").take().is_none() {
            return;
        }
        // The stored event may predate further history movement; reconcile
        // against where the browser actually is now.
        let Some(location) = self.driver.location() else {
            return;
        };
        if let Some(plugin) = self.weak_self.upgrade() {
            debug_log!("servicing deferred popstate against current location");
            let event = PopstateEvent {
                state: self.driver.state(),
                location,
            };
            self.driver.spawn(plugin.on_popstate(event));
        }
    }

    fn settle(&self) {
        let previous = self.in_flight.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |count| Some(count.saturating_sub(1)),
        );
        if previous == Ok(1) {
            self.service_deferred();
        }
    }

    /// Push or replace the history entry after a committed transition.
    fn sync_history(&self, to: &State, from: Option<&State>, options: &NavigationOptions) {
        let url = self.full_url(&to.path);
        let payload = self.entry_payload(to);
        let replace = options.replace
            || from.is_none()
            || from.is_some_and(|from| from.same_as(to) && options.reload);
        if replace {
            self.driver.replace_state(payload, "", &url);
        } else {
            self.driver.push_state(payload, "", &url);
        }
    }
}

impl Plugin for BrowserPlugin {
    fn name(&self) -> &'static str {
        "BrowserPlugin"
    }

    fn on_start(&self) {
        let mut listener = self.listener.lock().expect("listener poisoned");
        if listener.is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        let callback: PopstateCallback = Arc::new(move |event| match weak.upgrade() {
            Some(plugin) => plugin.on_popstate(event),
            None => Box::pin(async {}),
        });
        *listener = Some(self.driver.listen(callback));
    }

    fn on_stop(&self) {
        if let Some(handle) = self.listener.lock().expect("listener poisoned").take() {
            handle.call();
        }
        *self.deferred.lock().expect("deferred poisoned") = None;
        self.in_flight.store(0, Ordering::SeqCst);
    }

    fn on_transition_start(&self, _to: &State, _from: Option<&State>) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    fn on_transition_success(&self, to: &State, from: Option<&State>, options: &NavigationOptions) {
        let from_popstate = to
            .meta
            .as_ref()
            .and_then(|meta| meta.source.as_deref())
            == Some(POPSTATE_SOURCE);
        if !from_popstate {
            self.sync_history(to, from, options);
        }
        *self.last_known.lock().expect("last_known poisoned") = Some(to.clone());
        self.settle();
    }

    fn on_transition_error(
        &self,
        _to: Option<&State>,
        _from: Option<&State>,
        _error: &RouterError,
    ) {
        self.settle();
    }

    fn on_transition_cancel(&self, _to: &State, _from: Option<&State>) {
        self.settle();
    }

    fn teardown(&self) {
        if let Some(handle) = self.listener.lock().expect("listener poisoned").take() {
            handle.call();
        }
        self.router.uninstall_browser_navigator();
        *self.deferred.lock().expect("deferred poisoned") = None;
        *self.last_known.lock().expect("last_known poisoned") = None;
    }
}

impl BrowserNavigator for BrowserPlugin {
    fn build_url(&self, name: &str, params: &Params) -> RouterResult<String> {
        let path = self.router.build_path(name, params.clone())?;
        Ok(self.full_url(&path))
    }

    fn match_url(&self, url: &str) -> RouterResult<Option<State>> {
        let location = parse_absolute_url(url)?;
        let path = self.router_path(&location);
        Ok(self.router.match_path(&path))
    }

    fn replace_history_state(
        &self,
        name: &str,
        params: &Params,
        title: &str,
    ) -> RouterResult<()> {
        let Some(state) = self.router.build_state(name, params.clone()) else {
            return Err(RouterError::route_not_found(name));
        };
        let payload = self.entry_payload(&state);
        self.driver
            .replace_state(payload, title, &self.full_url(&state.path));
        *self.last_known.lock().expect("last_known poisoned") = Some(state);
        Ok(())
    }
}

/// Split an absolute URL, accepting only `http` and `https` schemes.
fn parse_absolute_url(url: &str) -> RouterResult<Location> {
    let scheme_end = url.find("://").ok_or_else(|| bad_url(url, "not an absolute URL"))?;
    let scheme = url[..scheme_end].to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(bad_url(url, "only http and https URLs are accepted"));
    }
    let after_scheme = &url[scheme_end + 3..];
    let relative = match after_scheme.find(['/', '?', '#']) {
        Some(position) => &after_scheme[position..],
        None => "/",
    };
    Ok(Location::parse(relative))
}

fn bad_url(url: &str, reason: &str) -> RouterError {
    RouterError::new(ErrorCode::InvalidOption)
        .with_path(url.to_string())
        .with_message(reason.to_string())
}

// ============================================================================
// Tests
// ============================================================================
