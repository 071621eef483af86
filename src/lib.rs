//! # wayfarer
//!
//! A client-side URL router for single-page applications.
//!
//! wayfarer owns the four problems every SPA router ends up solving:
//!
//! 1. **The route tree** — a named hierarchy of path patterns with
//!    pre-computed caches: O(1) name lookup, constraint-checked path
//!    building, and stable segment traversal ([`tree`]).
//! 2. **The transition pipeline** — an async state machine carrying a
//!    navigation through deactivation guards, activation guards, and
//!    middleware to an atomic commit, with cancellation and redirect
//!    semantics ([`transition`], [`navigation`]).
//! 3. **Plugin and middleware composition** — atomic batch registration of
//!    factory-produced observers with guaranteed rollback and idempotent
//!    unsubscription ([`registry`], [`plugin`]).
//! 4. **Browser synchronization** — a popstate/pushState bridge reconciling
//!    the browser URL with router state under concurrent user input
//!    ([`browser`], behind the `browser` feature).
//!
//! # Quick start
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
//!         RouteDefinition::new("users", "/users").with_children(vec![
//!             RouteDefinition::new("view", "/view/:id<\\d+>"),
//!             RouteDefinition::new("list", "/list?page"),
//!         ]),
//!     ],
//!     RouterOptions::builder().default_route("home").build().unwrap(),
//! )
//! .unwrap();
//!
//! pollster::block_on(async {
//!     router.start("/").await.unwrap();
//!
//!     let mut params = Params::new();
//!     params.insert("id", "42");
//!     let state = router.navigate("users.view", params).await.unwrap();
//!     assert_eq!(state.path, "/users/view/42");
//! });
//! ```
//!
//! # Feature flags
//!
//! | Feature | Default | Effect |
//! |---------|---------|--------|
//! | `log` | yes | route log output through the [`log`](https://docs.rs/log) crate |
//! | `tracing` | no | route log output through [`tracing`](https://docs.rs/tracing) instead |
//! | `cache` | yes | LRU memoization of path matching (the [`lru`](https://docs.rs/lru) crate) |
//! | `browser` | yes | the history synchronization plugin |
//! | `persistent-params` | yes | the sticky query parameter plugin |

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod logging;

pub mod dependencies;
pub mod error;
pub mod events;
pub mod guards;
pub mod matcher;
pub mod middleware;
pub mod navigation;
pub mod options;
pub mod params;
pub mod pattern;
pub mod plugin;
pub mod query;
pub mod registry;
pub mod router;
pub mod state;
pub mod transition;
pub mod tree;

#[cfg(feature = "cache")]
#[cfg_attr(docsrs, doc(cfg(feature = "cache")))]
pub mod cache;

#[cfg(feature = "browser")]
#[cfg_attr(docsrs, doc(cfg(feature = "browser")))]
pub mod browser;

#[cfg(feature = "persistent-params")]
#[cfg_attr(docsrs, doc(cfg(feature = "persistent-params")))]
pub mod persistent;

pub use error::{ErrorCode, RouterError, RouterResult};
pub use events::RouterEvent;
pub use guards::{async_guard_fn, guard_fn, Decision, Guard, HookCheck};
pub use middleware::{async_middleware_fn, middleware_fn, Middleware};
pub use options::{Limits, RouterOptions};
pub use params::{ParamSource, ParamValue, Params};
pub use plugin::Plugin;
pub use registry::Unsubscribe;
pub use router::{BrowserNavigator, MiddlewareFactory, PluginFactory, Router};
pub use state::{transition_path, NavigationOptions, State, StateMeta, TransitionPath};
pub use tree::{RouteDefinition, RouteTree, TrailingSlashMode};

#[cfg(feature = "browser")]
pub use browser::{BrowserPlugin, BrowserPluginOptions, HistoryDriver, MemoryHistory};

#[cfg(feature = "persistent-params")]
pub use persistent::PersistentParamsPlugin;
