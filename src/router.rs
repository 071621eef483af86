//! The router facade.
//!
//! [`Router`] composes the route tree, the matcher service, the navigation
//! engine, the transition pipeline, and the plugin/middleware/subscriber
//! registries behind one stable surface. The handle is a thin clone over a
//! shared inner value, so plugins and hooks can keep their own copies and
//! call back into the router reentrantly — no lock is ever held while user
//! code runs or a hook is awaited.
//!
//! # Example
//!
//! ```
//! use wayfarer::params::Params;
//! use wayfarer::options::RouterOptions;
//! use wayfarer::router::Router;
//! use wayfarer::tree::RouteDefinition;
//!
//! let router = Router::new(
//!     vec![
//!         RouteDefinition::new("home", "/home"),
//!         RouteDefinition::new("users", "/users")
//!             .with_children(vec![RouteDefinition::new("view", "/view/:id")]),
//!     ],
//!     RouterOptions::builder().default_route("home").build().unwrap(),
//! )
//! .unwrap();
//!
//! let state = pollster::block_on(router.start("/")).unwrap();
//! assert_eq!(state.name, "home");
//!
//! let mut params = Params::new();
//! params.insert("id", "42");
//! let state = pollster::block_on(router.navigate("users.view", params)).unwrap();
//! assert_eq!(state.path, "/users/view/42");
//! ```

use crate::dependencies::Dependencies;
use crate::error::{ErrorCode, RouterError, RouterResult};
use crate::events::{Listener, RouterEvent, SubscriberRegistry};
use crate::guards::{Guard, GuardKind, GuardRegistry};
use crate::logging::Logger;
use crate::matcher::Matcher;
use crate::middleware::Middleware;
use crate::navigation::{build_state, Navigation};
use crate::options::{DefaultParams, DefaultRoute, RouterOptions, NOT_FOUND_PARAM, NOT_FOUND_ROUTE};
use crate::params::Params;
use crate::plugin::{notify, Plugin};
use crate::registry::{FactoryRegistry, Unsubscribe};
use crate::state::{NavigationOptions, State, StateMeta};
use crate::transition::{run_transition, TransitionEnv};
use crate::tree::{RouteDefinition, RouteTree};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Factory producing a middleware instance; receives the router handle.
pub type MiddlewareFactory =
    Arc<dyn Fn(&Router) -> RouterResult<Arc<dyn Middleware>> + Send + Sync>;

/// Factory producing a plugin instance; receives the router handle.
pub type PluginFactory = Arc<dyn Fn(&Router) -> RouterResult<Arc<dyn Plugin>> + Send + Sync>;

/// Decorator applied to caller parameters before path and state building.
///
/// Registered by identity; the persistent-params plugin injects its sticky
/// mapping through one of these.
pub type ParamsDecorator = Arc<dyn Fn(&str, Params) -> Params + Send + Sync>;

// ============================================================================
// Browser capability slot
// ============================================================================

/// Capability interface installed by the browser plugin.
///
/// Before the plugin installs, the slot holds a stub whose every method
/// fails with a diagnostic error.
pub trait BrowserNavigator: Send + Sync {
    /// Build a full URL (base and hash prefix included) for a route.
    fn build_url(&self, name: &str, params: &Params) -> RouterResult<String>;

    /// Match an absolute URL against the route tree.
    ///
    /// Only `http` and `https` URLs are accepted.
    fn match_url(&self, url: &str) -> RouterResult<Option<State>>;

    /// Replace the current history entry with a state built from the given
    /// route, without running a transition.
    fn replace_history_state(&self, name: &str, params: &Params, title: &str)
        -> RouterResult<()>;
}

struct BrowserNavigatorStub;

impl BrowserNavigator for BrowserNavigatorStub {
    fn build_url(&self, _name: &str, _params: &Params) -> RouterResult<String> {
        Err(stub_error("build_url"))
    }

    fn match_url(&self, _url: &str) -> RouterResult<Option<State>> {
        Err(stub_error("match_url"))
    }

    fn replace_history_state(
        &self,
        _name: &str,
        _params: &Params,
        _title: &str,
    ) -> RouterResult<()> {
        Err(stub_error("replace_history_state"))
    }
}

fn stub_error(method: &str) -> RouterError {
    RouterError::new(ErrorCode::InvalidOption).with_message(format!(
        "'{method}' requires the browser plugin; install it with use_plugin"
    ))
}

/// Extension capabilities plugins attach to the router.
pub struct Extensions {
    browser: Arc<dyn BrowserNavigator>,
}

impl Extensions {
    fn new() -> Self {
        Self {
            browser: Arc::new(BrowserNavigatorStub),
        }
    }

    /// The installed browser capability, or the diagnostic stub.
    pub fn browser(&self) -> Arc<dyn BrowserNavigator> {
        Arc::clone(&self.browser)
    }
}

// ============================================================================
// Router
// ============================================================================

struct RouterInner {
    options: Arc<RouterOptions>,
    logger: Logger,
    tree: Mutex<Arc<RouteTree>>,
    matcher: Matcher,
    navigation: Navigation,
    guards: Mutex<GuardRegistry>,
    middleware: Mutex<FactoryRegistry<Arc<dyn Middleware>>>,
    plugins: Mutex<FactoryRegistry<Arc<dyn Plugin>>>,
    subscribers: Mutex<SubscriberRegistry>,
    dependencies: Mutex<Dependencies>,
    decorators: Mutex<Vec<(usize, ParamsDecorator)>>,
    extensions: Mutex<Extensions>,
    plugin_init_flags: Mutex<HashSet<&'static str>>,
    active: AtomicBool,
    emit_depth: AtomicUsize,
}

/// The client-side router.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Construct a router from route definitions and validated options.
    pub fn new(routes: Vec<RouteDefinition>, options: RouterOptions) -> RouterResult<Self> {
        options.validate()?;
        let tree = RouteTree::new(routes)?;
        let logger = Logger::new(options.logger.clone());
        let matcher = Matcher::new(options.match_options());
        let limits = options.limits;

        Ok(Self {
            inner: Arc::new(RouterInner {
                options: Arc::new(options),
                logger,
                tree: Mutex::new(Arc::new(tree)),
                matcher,
                navigation: Navigation::new(),
                guards: Mutex::new(GuardRegistry::new()),
                middleware: Mutex::new(FactoryRegistry::new("middleware", limits.max_middleware)),
                plugins: Mutex::new(FactoryRegistry::new("plugin", limits.max_plugins)),
                subscribers: Mutex::new(SubscriberRegistry::new(limits.max_listeners)),
                dependencies: Mutex::new(Dependencies::new(limits.max_dependencies)),
                decorators: Mutex::new(Vec::new()),
                extensions: Mutex::new(Extensions::new()),
                plugin_init_flags: Mutex::new(HashSet::new()),
                active: AtomicBool::new(false),
                emit_depth: AtomicUsize::new(0),
            }),
        })
    }

    /// The frozen options; every call returns the same shared value.
    pub fn get_options(&self) -> Arc<RouterOptions> {
        Arc::clone(&self.inner.options)
    }

    /// The router's log sink.
    pub fn logger(&self) -> Logger {
        self.inner.logger.clone()
    }

    /// Whether `start` has run and `stop` has not.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// A copy of the current state, if one has been committed.
    pub fn get_state(&self) -> Option<State> {
        self.inner.navigation.current()
    }

    fn tree(&self) -> Arc<RouteTree> {
        Arc::clone(&self.inner.tree.lock().expect("tree poisoned"))
    }

    fn swap_tree(&self, tree: RouteTree) {
        *self.inner.tree.lock().expect("tree poisoned") = Arc::new(tree);
        self.inner.matcher.clear_cache();
    }

    // ========================================================================
    // Routes
    // ========================================================================

    /// Add route definitions to the tree.
    pub fn add_route(&self, definitions: Vec<RouteDefinition>) -> RouterResult<()> {
        let next = self.tree().with_added(definitions)?;
        self.swap_tree(next);
        Ok(())
    }

    /// Replace the named route's path.
    pub fn update_route(&self, name: &str, path: impl Into<String>) -> RouterResult<()> {
        let next = self.tree().with_updated(name, path)?;
        self.swap_tree(next);
        Ok(())
    }

    /// Remove the named route and its subtree.
    pub fn remove_route(&self, name: &str) -> RouterResult<()> {
        let next = self.tree().with_removed(name)?;
        self.swap_tree(next);
        Ok(())
    }

    /// Replace the query parameters declared on the tree root.
    pub(crate) fn set_root_query_params(&self, keys: Vec<String>) -> RouterResult<()> {
        let next = self.tree().with_root_params(keys)?;
        self.swap_tree(next);
        Ok(())
    }

    /// Query parameters currently declared on the tree root.
    pub(crate) fn root_query_params(&self) -> Vec<String> {
        self.tree().root_query_params().to_vec()
    }

    // ========================================================================
    // Path and state building
    // ========================================================================

    fn decorate_params(&self, name: &str, params: Params) -> Params {
        let decorators: Vec<ParamsDecorator> = {
            let held = self.inner.decorators.lock().expect("decorators poisoned");
            held.iter().map(|(_, decorator)| Arc::clone(decorator)).collect()
        };
        let mut params = params;
        for decorator in decorators {
            params = decorator(name, params);
        }
        params
    }

    /// Register a parameter decorator; the handle removes it by identity.
    pub fn add_params_decorator(&self, decorator: ParamsDecorator) -> Unsubscribe {
        let key = Arc::as_ptr(&decorator).cast::<()>() as usize;
        self.inner
            .decorators
            .lock()
            .expect("decorators poisoned")
            .push((key, decorator));

        let weak = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .decorators
                    .lock()
                    .expect("decorators poisoned")
                    .retain(|(existing, _)| *existing != key);
            }
        })
    }

    /// Reject malformed public-surface arguments unless `no_validate` is on.
    fn validate_route_name(&self, name: &str) -> RouterResult<()> {
        if self.inner.options.no_validate {
            return Ok(());
        }
        if name.is_empty() || name.split('.').any(str::is_empty) {
            return Err(RouterError::new(ErrorCode::InvalidRoute)
                .with_message(format!("malformed route name '{name}'")));
        }
        Ok(())
    }

    /// Build a path for a route, decorators applied.
    pub fn build_path(&self, name: &str, params: Params) -> RouterResult<String> {
        self.validate_route_name(name)?;
        let params = self.decorate_params(name, params);
        self.tree()
            .build_path(name, &params, &self.inner.options.build_options())
    }

    /// Build a navigation state without running a transition.
    ///
    /// Returns `None` when the route name does not resolve.
    pub fn build_state(&self, name: &str, params: Params) -> Option<State> {
        self.make_state(name, params, NavigationOptions::default(), None, false)
            .ok()
    }

    fn make_state(
        &self,
        name: &str,
        params: Params,
        options: NavigationOptions,
        source: Option<String>,
        redirected: bool,
    ) -> RouterResult<State> {
        let params = self.decorate_params(name, params);
        build_state(
            &self.tree(),
            &self.inner.options.build_options(),
            name,
            params,
            self.inner.navigation.allocate_state_id(),
            options,
            source,
            redirected,
        )
    }

    /// Match a path against the route tree, producing a state value.
    pub fn match_path(&self, path: &str) -> Option<State> {
        let tree = self.tree();
        let matched = self.inner.matcher.match_path(&tree, path)?;

        let canonical = if self.inner.options.rewrite_path_on_match {
            tree.build_path(
                &matched.name,
                &matched.params,
                &self.inner.options.build_options(),
            )
            .unwrap_or_else(|_| path.to_string())
        } else {
            path.to_string()
        };

        let sources = tree.param_sources_for(&matched.name)?;
        Some(
            State::new(matched.name, matched.params, canonical).with_meta(StateMeta {
                id: self.inner.navigation.allocate_state_id(),
                params: sources,
                options: NavigationOptions::default(),
                redirected: false,
                source: None,
            }),
        )
    }

    fn not_found_state(&self, path: &str, source: Option<String>) -> State {
        let mut params = Params::new();
        params.insert(NOT_FOUND_PARAM, path);
        State::new(NOT_FOUND_ROUTE, params, path.to_string()).with_meta(StateMeta {
            id: self.inner.navigation.allocate_state_id(),
            params: Default::default(),
            options: NavigationOptions::default(),
            redirected: false,
            source,
        })
    }

    // ========================================================================
    // Guards
    // ========================================================================

    fn add_guard(
        &self,
        kind: GuardKind,
        segment: &str,
        guard: Arc<dyn Guard>,
    ) -> RouterResult<Unsubscribe> {
        let segment = segment.to_string();
        {
            let mut guards = self.inner.guards.lock().expect("guards poisoned");
            let total = guards.len(GuardKind::Activate) + guards.len(GuardKind::Deactivate);
            if total >= self.inner.options.limits.max_lifecycle_handlers {
                return Err(RouterError::new(ErrorCode::InvalidOption).with_message(format!(
                    "lifecycle handler limit of {} exceeded",
                    self.inner.options.limits.max_lifecycle_handlers
                )));
            }
            guards.insert(kind, segment.clone(), guard);
        }

        let weak = Arc::downgrade(&self.inner);
        Ok(Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .guards
                    .lock()
                    .expect("guards poisoned")
                    .remove(kind, &segment);
            }
        }))
    }

    /// Attach an activation guard to a segment, replacing any existing one.
    pub fn add_activate_guard(
        &self,
        segment: &str,
        guard: impl Guard,
    ) -> RouterResult<Unsubscribe> {
        self.add_guard(GuardKind::Activate, segment, Arc::new(guard))
    }

    /// Attach a deactivation guard to a segment, replacing any existing one.
    pub fn add_deactivate_guard(
        &self,
        segment: &str,
        guard: impl Guard,
    ) -> RouterResult<Unsubscribe> {
        self.add_guard(GuardKind::Deactivate, segment, Arc::new(guard))
    }

    /// Synchronously evaluate whether navigation to a route could succeed.
    ///
    /// Only synchronous guards are consulted; pending (async) guards are
    /// conservatively treated as passing.
    pub fn can_navigate_to(&self, name: &str, params: Params) -> bool {
        let Ok(to) = self.make_state(name, params, NavigationOptions::default(), None, false)
        else {
            return false;
        };
        let from = self.get_state();
        let path = crate::state::transition_path(&to, from.as_ref());

        let activate = self.snapshot_guards(GuardKind::Activate);
        let deactivate = self.snapshot_guards(GuardKind::Deactivate);
        let check = |kind: GuardKind, segment: &String| -> bool {
            let table = match kind {
                GuardKind::Activate => &activate,
                GuardKind::Deactivate => &deactivate,
            };
            match table.get(segment) {
                None => true,
                Some(guard) => match guard.check(&to, from.as_ref()).sync_decision() {
                    None => true,
                    Some(Ok(crate::guards::Decision::Deny)) => false,
                    Some(Ok(_)) => true,
                    Some(Err(_)) => false,
                },
            }
        };

        path.to_deactivate
            .iter()
            .all(|segment| check(GuardKind::Deactivate, segment))
            && path
                .to_activate
                .iter()
                .all(|segment| check(GuardKind::Activate, segment))
    }

    // ========================================================================
    // Middleware and plugins
    // ========================================================================

    fn factory_key<T: ?Sized>(factory: &Arc<T>) -> usize {
        Arc::as_ptr(factory).cast::<()>() as usize
    }

    /// Register middleware factories as one atomic batch.
    pub fn use_middleware(&self, factories: Vec<MiddlewareFactory>) -> RouterResult<Unsubscribe> {
        let batch: Vec<_> = factories
            .iter()
            .map(|factory| {
                let factory = Arc::clone(factory);
                let router = self.clone();
                (
                    Self::factory_key(&factory),
                    Box::new(move || factory(&router))
                        as Box<dyn FnOnce() -> RouterResult<Arc<dyn Middleware>>>,
                )
            })
            .collect();

        let batch_id = self
            .inner
            .middleware
            .lock()
            .expect("middleware registry poisoned")
            .add_batch(batch)?;

        let weak = Arc::downgrade(&self.inner);
        let logger = self.inner.logger.clone();
        Ok(Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner
                    .middleware
                    .lock()
                    .expect("middleware registry poisoned")
                    .remove_batch(batch_id);
                if removed.is_empty() {
                    logger.warn("registry", "middleware batch already unsubscribed");
                }
            }
        }))
    }

    /// Remove every registered middleware regardless of batch.
    pub fn clear_middleware(&self) {
        self.inner
            .middleware
            .lock()
            .expect("middleware registry poisoned")
            .clear();
    }

    /// Register plugin factories as one atomic batch.
    ///
    /// Instances receive lifecycle events in registration order; removing
    /// the batch runs each instance's `teardown`.
    pub fn use_plugin(&self, factories: Vec<PluginFactory>) -> RouterResult<Unsubscribe> {
        let batch: Vec<_> = factories
            .iter()
            .map(|factory| {
                let factory = Arc::clone(factory);
                let router = self.clone();
                (
                    Self::factory_key(&factory),
                    Box::new(move || factory(&router))
                        as Box<dyn FnOnce() -> RouterResult<Arc<dyn Plugin>>>,
                )
            })
            .collect();

        let batch_id = self
            .inner
            .plugins
            .lock()
            .expect("plugin registry poisoned")
            .add_batch(batch)?;

        let weak = Arc::downgrade(&self.inner);
        Ok(Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner
                    .plugins
                    .lock()
                    .expect("plugin registry poisoned")
                    .remove_batch(batch_id);
                {
                    let mut flags = inner
                        .plugin_init_flags
                        .lock()
                        .expect("plugin flags poisoned");
                    for plugin in &removed {
                        flags.remove(plugin.name());
                    }
                }
                for plugin in removed {
                    plugin.teardown();
                }
            }
        }))
    }

    /// One-shot initialization guard for named plugins.
    ///
    /// Returns an error when a plugin of the same name already claimed the
    /// flag; the flag is released by the plugin batch's unsubscribe.
    pub(crate) fn claim_plugin_flag(&self, name: &'static str) -> RouterResult<()> {
        let mut flags = self
            .inner
            .plugin_init_flags
            .lock()
            .expect("plugin flags poisoned");
        if !flags.insert(name) {
            return Err(RouterError::new(ErrorCode::InvalidOption)
                .with_message(format!("plugin '{name}' is already installed")));
        }
        Ok(())
    }

    /// Install the browser capability. Called by the browser plugin.
    pub(crate) fn install_browser_navigator(&self, navigator: Arc<dyn BrowserNavigator>) {
        self.inner
            .extensions
            .lock()
            .expect("extensions poisoned")
            .browser = navigator;
    }

    /// Reset the browser capability back to the diagnostic stub.
    pub(crate) fn uninstall_browser_navigator(&self) {
        self.inner
            .extensions
            .lock()
            .expect("extensions poisoned")
            .browser = Arc::new(BrowserNavigatorStub);
    }

    /// The browser capability, or a stub that fails with a diagnostic error.
    pub fn browser(&self) -> Arc<dyn BrowserNavigator> {
        self.inner
            .extensions
            .lock()
            .expect("extensions poisoned")
            .browser()
    }

    // ========================================================================
    // Subscriptions and events
    // ========================================================================

    /// Subscribe to router events. The handle unsubscribes idempotently.
    pub fn subscribe(&self, listener: Listener) -> RouterResult<Unsubscribe> {
        let id = self
            .inner
            .subscribers
            .lock()
            .expect("subscribers poisoned")
            .add(listener)?;

        let weak = Arc::downgrade(&self.inner);
        let logger = self.inner.logger.clone();
        Ok(Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner
                    .subscribers
                    .lock()
                    .expect("subscribers poisoned")
                    .remove(id);
                if !removed {
                    logger.warn("registry", "listener already unsubscribed");
                }
            }
        }))
    }

    /// Subscribe with a plain closure.
    pub fn subscribe_fn<F>(&self, listener: F) -> RouterResult<Unsubscribe>
    where
        F: Fn(&RouterEvent) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(listener))
    }

    fn emit(&self, event: &RouterEvent) {
        let depth = self.inner.emit_depth.fetch_add(1, Ordering::SeqCst);
        if depth >= self.inner.options.limits.max_event_depth {
            self.inner.emit_depth.fetch_sub(1, Ordering::SeqCst);
            self.inner.logger.error(
                "events",
                format!("event depth limit reached; dropping {}", event.name()),
            );
            return;
        }

        let plugins = self
            .inner
            .plugins
            .lock()
            .expect("plugin registry poisoned")
            .instances();
        for plugin in plugins {
            let outcome = catch_unwind(AssertUnwindSafe(|| notify(plugin.as_ref(), event)));
            if outcome.is_err() {
                self.inner.logger.error(
                    "events",
                    format!("plugin '{}' panicked on {}", plugin.name(), event.name()),
                );
            }
        }

        let listeners = self
            .inner
            .subscribers
            .lock()
            .expect("subscribers poisoned")
            .snapshot();
        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(event)));
            if outcome.is_err() {
                self.inner
                    .logger
                    .error("events", format!("subscriber panicked on {}", event.name()));
            }
        }

        self.inner.emit_depth.fetch_sub(1, Ordering::SeqCst);
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    /// Register a dependency under a name.
    pub fn set_dependency<T: Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        value: T,
    ) -> RouterResult<()> {
        self.inner
            .dependencies
            .lock()
            .expect("dependencies poisoned")
            .set(name, value)
    }

    /// Recover a dependency by name and type.
    pub fn get_dependency<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.inner
            .dependencies
            .lock()
            .expect("dependencies poisoned")
            .get::<T>(name)
    }

    /// Register an already-shared dependency value.
    pub fn set_dependency_shared(
        &self,
        name: impl Into<String>,
        value: Arc<dyn Any + Send + Sync>,
    ) -> RouterResult<()> {
        self.inner
            .dependencies
            .lock()
            .expect("dependencies poisoned")
            .set_shared(name, value)
    }

    fn with_dependencies<R>(&self, f: impl FnOnce(&Dependencies) -> R) -> R {
        let deps = self
            .inner
            .dependencies
            .lock()
            .expect("dependencies poisoned");
        f(&deps)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the router with the given path (the browser plugin passes the
    /// current location) and run the initial activation transition.
    pub async fn start(&self, path: &str) -> RouterResult<State> {
        if self.is_active() {
            return Err(RouterError::new(ErrorCode::InvalidOption)
                .with_message("router is already started"));
        }
        self.inner.active.store(true, Ordering::SeqCst);
        self.emit(&RouterEvent::RouterStart);

        // The initial transition is always a full activation, even when a
        // state retained across stop()/start() matches the start path.
        let start_options = NavigationOptions {
            replace: false,
            reload: true,
            force: true,
        };

        let mut state = match self.match_path(path) {
            Some(state) => state,
            None => match self.resolve_default() {
                Some((name, params)) => {
                    self.make_state(&name, params, start_options, None, false)?
                }
                None if self.inner.options.allow_not_found => {
                    self.not_found_state(path, None)
                }
                None => {
                    return Err(RouterError::new(ErrorCode::RouteNotFound)
                        .with_path(path.to_string())
                        .with_message("no route matches the start path and no default is set"))
                }
            },
        };
        if let Some(meta) = state.meta.as_mut() {
            meta.options = start_options;
        }
        self.run_navigation(state, start_options).await
    }

    /// Stop the router: cancel any in-flight transition and mark inactive.
    ///
    /// The current state is kept so a later `start` can diff against it.
    pub fn stop(&self) {
        if !self.is_active() {
            return;
        }
        self.inner.navigation.invalidate();
        self.inner.active.store(false, Ordering::SeqCst);
        self.emit(&RouterEvent::RouterStop);
    }

    fn resolve_default(&self) -> Option<(String, Params)> {
        let name = match &self.inner.options.default_route {
            DefaultRoute::None => return None,
            DefaultRoute::Name(name) => name.clone(),
            DefaultRoute::Compute(compute) => {
                self.with_dependencies(|deps| compute(deps))?
            }
        };
        let params = match &self.inner.options.default_params {
            DefaultParams::Static(params) => params.clone(),
            DefaultParams::Compute(compute) => self.with_dependencies(|deps| compute(deps)),
        };
        Some((name, params))
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Navigate to a named route with parameters.
    pub async fn navigate(&self, name: &str, params: Params) -> RouterResult<State> {
        self.navigate_with(name, params, NavigationOptions::default())
            .await
    }

    /// Navigate with explicit options.
    pub async fn navigate_with(
        &self,
        name: &str,
        params: Params,
        options: NavigationOptions,
    ) -> RouterResult<State> {
        if !self.is_active() {
            return Err(RouterError::new(ErrorCode::RouterNotStarted)
                .with_message("call start() before navigating"));
        }
        self.validate_route_name(name)?;
        let state = self.make_state(name, params, options, None, false)?;
        self.run_navigation(state, options).await
    }

    /// Navigate to the configured default route.
    pub async fn navigate_to_default(&self) -> RouterResult<State> {
        self.navigate_to_default_with(NavigationOptions::default())
            .await
    }

    /// Navigate to the configured default route with explicit options.
    pub async fn navigate_to_default_with(
        &self,
        options: NavigationOptions,
    ) -> RouterResult<State> {
        let Some((name, params)) = self.resolve_default() else {
            return Err(RouterError::new(ErrorCode::RouteNotFound)
                .with_message("no default route configured"));
        };
        self.navigate_with(&name, params, options).await
    }

    /// Navigate to a pre-built state. Plugin-facing: the browser plugin uses
    /// this to service popstate events, preserving the state's original id.
    pub async fn navigate_to_state(
        &self,
        state: State,
        options: NavigationOptions,
        source: Option<String>,
    ) -> RouterResult<State> {
        if !self.is_active() {
            return Err(RouterError::new(ErrorCode::RouterNotStarted)
                .with_message("call start() before navigating"));
        }
        let mut state = state;
        if state.meta.is_none() {
            let params = self
                .tree()
                .param_sources_for(&state.name)
                .unwrap_or_default();
            state = state.with_meta(StateMeta {
                id: self.inner.navigation.allocate_state_id(),
                params,
                options,
                redirected: false,
                source: source.clone(),
            });
        } else if let Some(meta) = state.meta.as_mut() {
            meta.options = options;
            meta.source = source;
        }
        self.run_navigation(state, options).await
    }

    async fn run_navigation(
        &self,
        to: State,
        options: NavigationOptions,
    ) -> RouterResult<State> {
        let from = self.get_state();

        if let Some(from_state) = &from {
            if !options.force && !options.reload && from_state.same_as(&to) {
                return Err(RouterError::new(ErrorCode::SameState)
                    .with_path(to.path.clone())
                    .with_message("already at the requested state"));
            }
        }

        let token = self.inner.navigation.begin();
        self.emit(&RouterEvent::TransitionStart {
            to: to.clone(),
            from: from.clone(),
        });

        let env = TransitionEnv {
            token: token.clone(),
            activate_guards: self.snapshot_guards(GuardKind::Activate),
            deactivate_guards: self.snapshot_guards(GuardKind::Deactivate),
            middleware: self
                .inner
                .middleware
                .lock()
                .expect("middleware registry poisoned")
                .instances(),
            logger: self.inner.logger.clone(),
        };

        let router = self.clone();
        let redirect_options = options;
        let build_redirect = move |partial: &State| {
            router.make_state(
                &partial.name,
                partial.params.clone(),
                redirect_options,
                None,
                true,
            )
        };

        let outcome = run_transition(to.clone(), from.as_ref(), &env, build_redirect).await;

        match outcome {
            Ok(state) => match self.inner.navigation.commit(state, &token) {
                Ok(committed) => {
                    self.emit(&RouterEvent::TransitionSuccess {
                        to: committed.clone(),
                        from: from.clone(),
                        options,
                    });
                    Ok(committed)
                }
                Err(error) => {
                    self.emit(&RouterEvent::TransitionCancel {
                        to: to.clone(),
                        from: from.clone(),
                    });
                    Err(error)
                }
            },
            Err(error) if error.code == ErrorCode::TransitionCancelled => {
                self.emit(&RouterEvent::TransitionCancel {
                    to: to.clone(),
                    from: from.clone(),
                });
                Err(error)
            }
            Err(error) => {
                self.emit(&RouterEvent::TransitionError {
                    to: Some(to.clone()),
                    from: from.clone(),
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    fn snapshot_guards(&self, kind: GuardKind) -> HashMap<String, Arc<dyn Guard>> {
        self.inner
            .guards
            .lock()
            .expect("guards poisoned")
            .snapshot(kind)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("active", &self.is_active())
            .field("state", &self.get_state().map(|state| state.name))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guards::guard_fn;
    use crate::middleware::middleware_fn;
    use crate::options::Limits;
    use pollster::block_on;
    use std::sync::atomic::AtomicUsize;

    fn sample_routes() -> Vec<RouteDefinition> {
        vec![
            RouteDefinition::new("home", "/home"),
            RouteDefinition::new("users", "/users").with_children(vec![
                RouteDefinition::new("view", "/view/:id"),
                RouteDefinition::new("list", "/list"),
            ]),
        ]
    }

    fn started_router() -> Router {
        let router = Router::new(
            sample_routes(),
            RouterOptions::builder().default_route("home").build().unwrap(),
        )
        .unwrap();
        block_on(router.start("/")).unwrap();
        router
    }

    fn id_params(id: &str) -> Params {
        let mut params = Params::new();
        params.insert("id", id);
        params
    }

    #[test]
    fn test_start_falls_back_to_default_route() {
        let router = started_router();
        let state = router.get_state().unwrap();
        assert_eq!(state.name, "home");
        assert_eq!(state.path, "/home");
        assert!(router.is_active());
    }

    #[test]
    fn test_start_twice_fails() {
        let router = started_router();
        let err = block_on(router.start("/")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOption);
    }

    #[test]
    fn test_navigate_before_start_fails() {
        let router = Router::new(sample_routes(), RouterOptions::default()).unwrap();
        let err = block_on(router.navigate("home", Params::new())).unwrap_err();
        assert_eq!(err.code, ErrorCode::RouterNotStarted);
    }

    #[test]
    fn test_navigate_commits_state() {
        let router = started_router();
        let state = block_on(router.navigate("users.view", id_params("42"))).unwrap();
        assert_eq!(state.name, "users.view");
        assert_eq!(state.path, "/users/view/42");
        assert_eq!(router.get_state().unwrap().name, "users.view");
    }

    #[test]
    fn test_navigate_to_same_state_fails() {
        let router = started_router();
        let err = block_on(router.navigate("home", Params::new())).unwrap_err();
        assert_eq!(err.code, ErrorCode::SameState);

        // reload overrides the check.
        let state = block_on(router.navigate_with(
            "home",
            Params::new(),
            NavigationOptions {
                reload: true,
                ..NavigationOptions::default()
            },
        ))
        .unwrap();
        assert_eq!(state.name, "home");
    }

    #[test]
    fn test_subscriber_sees_start_then_success_once() {
        let router = started_router();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let _sub = router
            .subscribe_fn(move |event| sink.lock().unwrap().push(event.name()))
            .unwrap();

        block_on(router.navigate("users.view", id_params("42"))).unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["TRANSITION_START", "TRANSITION_SUCCESS"]
        );
    }

    #[test]
    fn test_subscribers_notified_after_state_update() {
        let router = started_router();
        let observed = Arc::new(Mutex::new(None));
        let sink = observed.clone();
        let probe = router.clone();
        let _sub = router
            .subscribe_fn(move |event| {
                if let RouterEvent::TransitionSuccess { .. } = event {
                    *sink.lock().unwrap() = probe.get_state().map(|state| state.name);
                }
            })
            .unwrap();

        block_on(router.navigate("users.list", Params::new())).unwrap();
        assert_eq!(observed.lock().unwrap().as_deref(), Some("users.list"));
    }

    #[test]
    fn test_options_are_shared_and_stable() {
        let router = started_router();
        let first = router.get_options();
        let second = router.get_options();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_activation_guard_blocks_navigation() {
        let router = started_router();
        let _guard = router
            .add_activate_guard("users.view", guard_fn(|_: &State, _: Option<&State>| false))
            .unwrap();

        let err = block_on(router.navigate("users.view", id_params("42"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::CannotActivate);
        assert_eq!(router.get_state().unwrap().name, "home");
    }

    #[test]
    fn test_guard_unsubscribe_restores_navigation() {
        let router = started_router();
        let guard = router
            .add_activate_guard("users.view", guard_fn(|_: &State, _: Option<&State>| false))
            .unwrap();
        guard.call();

        assert!(block_on(router.navigate("users.view", id_params("42"))).is_ok());
    }

    #[test]
    fn test_can_navigate_to_consults_sync_guards() {
        let router = started_router();
        assert!(router.can_navigate_to("users.view", id_params("42")));

        let _guard = router
            .add_activate_guard("users.view", guard_fn(|_: &State, _: Option<&State>| false))
            .unwrap();
        assert!(!router.can_navigate_to("users.view", id_params("42")));
        assert!(router.can_navigate_to("users.list", Params::new()));
    }

    #[test]
    fn test_middleware_redirect_commits_redirect_target() {
        let router = started_router();
        block_on(router.navigate("users.view", id_params("42"))).unwrap();

        let _mw = router
            .use_middleware(vec![Arc::new(|_router: &Router| {
                Ok(Arc::new(middleware_fn(|to: &State, _: Option<&State>| {
                    if to.name == "users.list" {
                        let redirect = State::new("home", Params::new(), String::new());
                        crate::guards::Decision::Redirect(redirect)
                    } else {
                        crate::guards::Decision::Allow
                    }
                })) as Arc<dyn Middleware>)
            })])
            .unwrap();

        let state = block_on(router.navigate("users.list", Params::new())).unwrap();
        assert_eq!(state.name, "home");
        assert_eq!(state.path, "/home");
        assert!(state.is_redirected());
    }

    #[test]
    fn test_middleware_batch_atomicity() {
        let router = started_router();
        let side_effects = Arc::new(AtomicUsize::new(0));

        let make_counting = |counter: Arc<AtomicUsize>| -> MiddlewareFactory {
            Arc::new(move |_router: &Router| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(middleware_fn(|_: &State, _: Option<&State>| true))
                    as Arc<dyn Middleware>)
            })
        };

        let failing: MiddlewareFactory = Arc::new(|_router: &Router| {
            Err(RouterError::new(ErrorCode::InvalidOption).with_message("factory broke"))
        });

        let result = router.use_middleware(vec![
            make_counting(side_effects.clone()),
            make_counting(side_effects.clone()),
            failing,
            make_counting(side_effects.clone()),
        ]);

        assert!(result.is_err());
        // The first two factories ran; their side effects persist.
        assert_eq!(side_effects.load(Ordering::SeqCst), 2);

        // A subsequent valid registration works.
        assert!(router
            .use_middleware(vec![make_counting(side_effects.clone())])
            .is_ok());
    }

    #[test]
    fn test_middleware_unsubscribe_idempotent() {
        let router = started_router();
        let handle = router
            .use_middleware(vec![Arc::new(|_router: &Router| {
                Ok(Arc::new(middleware_fn(|_: &State, _: Option<&State>| true))
                    as Arc<dyn Middleware>)
            })])
            .unwrap();

        assert!(handle.call());
        assert!(!handle.call());
    }

    #[test]
    fn test_add_update_remove_route() {
        let router = started_router();
        router
            .add_route(vec![RouteDefinition::new("about", "/about")])
            .unwrap();
        assert_eq!(router.build_path("about", Params::new()).unwrap(), "/about");

        router.update_route("about", "/about-us").unwrap();
        assert_eq!(
            router.build_path("about", Params::new()).unwrap(),
            "/about-us"
        );

        router.remove_route("about").unwrap();
        assert_eq!(
            router.build_path("about", Params::new()).unwrap_err().code,
            ErrorCode::RouteNotFound
        );
    }

    #[test]
    fn test_match_path_round_trips_build_path() {
        let router = started_router();
        let path = router.build_path("users.view", id_params("42")).unwrap();
        let state = router.match_path(&path).unwrap();
        assert_eq!(state.name, "users.view");
        assert_eq!(state.params.get_str("id"), Some("42"));
    }

    #[test]
    fn test_dependencies_round_trip() {
        let router = started_router();
        router.set_dependency("flag", 7u32).unwrap();
        assert_eq!(*router.get_dependency::<u32>("flag").unwrap(), 7);
        assert!(router.get_dependency::<String>("flag").is_none());
    }

    #[test]
    fn test_stop_cancels_and_deactivates() {
        let router = started_router();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let _sub = router
            .subscribe_fn(move |event| sink.lock().unwrap().push(event.name()))
            .unwrap();

        router.stop();
        assert!(!router.is_active());
        assert_eq!(*events.lock().unwrap(), vec!["ROUTER_STOP"]);

        let err = block_on(router.navigate("home", Params::new())).unwrap_err();
        assert_eq!(err.code, ErrorCode::RouterNotStarted);
    }

    #[test]
    fn test_panicking_subscriber_is_contained() {
        let router = started_router();
        let seen = Arc::new(AtomicUsize::new(0));

        let _bad = router
            .subscribe_fn(|_event| panic!("subscriber exploded"))
            .unwrap();
        let counter = seen.clone();
        let _good = router
            .subscribe_fn(move |_event| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(block_on(router.navigate("users.list", Params::new())).is_ok());
        // start + success both reached the later subscriber.
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_browser_stub_reports_missing_plugin() {
        let router = started_router();
        let err = router.browser().build_url("home", &Params::new()).unwrap_err();
        assert!(err.message.unwrap().contains("browser plugin"));
    }

    #[test]
    fn test_listener_limit_enforced() {
        let router = Router::new(
            sample_routes(),
            RouterOptions::builder()
                .limits(Limits {
                    max_listeners: 1,
                    ..Limits::default()
                })
                .build()
                .unwrap(),
        )
        .unwrap();

        let _first = router.subscribe_fn(|_event| {}).unwrap();
        assert!(router.subscribe_fn(|_event| {}).is_err());
    }

    #[test]
    fn test_allow_not_found_start() {
        let router = Router::new(
            sample_routes(),
            RouterOptions::builder().allow_not_found(true).build().unwrap(),
        )
        .unwrap();

        let state = block_on(router.start("/definitely/missing")).unwrap();
        assert_eq!(state.name, NOT_FOUND_ROUTE);
        assert_eq!(
            state.params.get_str(NOT_FOUND_PARAM),
            Some("/definitely/missing")
        );
    }

    #[test]
    fn test_route_name_validation_toggle() {
        let router = started_router();
        let err = router.build_path("users..view", Params::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRoute);

        let relaxed = Router::new(
            sample_routes(),
            RouterOptions::builder().no_validate(true).build().unwrap(),
        )
        .unwrap();
        let err = relaxed.build_path("users..view", Params::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RouteNotFound);
    }

    #[test]
    fn test_computed_default_route_reads_dependencies() {
        let router = Router::new(
            sample_routes(),
            RouterOptions::builder()
                .default_route_with(|deps| {
                    deps.get::<String>("landing").map(|name| (*name).clone())
                })
                .build()
                .unwrap(),
        )
        .unwrap();
        router
            .set_dependency("landing", "users.list".to_string())
            .unwrap();

        let state = block_on(router.start("/")).unwrap();
        assert_eq!(state.name, "users.list");
    }
}
