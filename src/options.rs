//! Router configuration.
//!
//! [`RouterOptions`] is assembled with a builder, validated once at router
//! construction, and frozen behind an `Arc` afterwards — every call to the
//! router's `get_options` returns the same shared value, and nothing can
//! mutate it.
//!
//! | Option | Effect |
//! |--------|--------|
//! | `trailing_slash` | trailing-slash discipline for built paths |
//! | `case_sensitive` / `strict_trailing_slash` / `strong_matching` | path-matching discipline |
//! | `query_params_mode` | policy for undeclared query keys |
//! | `url_params_encoding` | parameter encoding strategy |
//! | `query_params` | query-string codec conventions |
//! | `allow_not_found` | emit a not-found state instead of failing the transition |
//! | `rewrite_path_on_match` | canonicalize a matched request path |
//! | `default_route` / `default_params` | target of `navigate_to_default`, literal or computed |
//! | `limits` | registry size limits |
//! | `no_validate` | skip public-surface argument validation on hot paths |
//! | `logger` | level filter and callback of the router's log sink |

use crate::dependencies::Dependencies;
use crate::error::{ErrorCode, RouterError, RouterResult};
use crate::logging::LoggerOptions;
use crate::params::Params;
use crate::pattern::{MatchOptions, QueryParamsMode, UrlParamsEncoding};
use crate::query::QueryOptions;
use crate::tree::{BuildOptions, TrailingSlashMode};
use std::fmt;
use std::sync::Arc;

/// Name used for the synthetic state emitted when `allow_not_found` is set
/// and a path matches nothing.
pub const NOT_FOUND_ROUTE: &str = "@@not-found";

/// Parameter carrying the unmatched path on the not-found state.
pub const NOT_FOUND_PARAM: &str = "path";

/// Registry size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of registered plugins.
    pub max_plugins: usize,
    /// Maximum number of registered middleware.
    pub max_middleware: usize,
    /// Maximum number of dependency entries.
    pub max_dependencies: usize,
    /// Maximum number of event subscribers.
    pub max_listeners: usize,
    /// Maximum nesting depth of reentrant event emission.
    pub max_event_depth: usize,
    /// Maximum number of guards across both kinds.
    pub max_lifecycle_handlers: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_plugins: 50,
            max_middleware: 50,
            max_dependencies: 100,
            max_listeners: 100,
            max_event_depth: 25,
            max_lifecycle_handlers: 200,
        }
    }
}

/// Target of `navigate_to_default`: absent, a literal route name, or a
/// callback reading the dependency store.
#[derive(Clone, Default)]
pub enum DefaultRoute {
    /// No default route configured.
    #[default]
    None,
    /// A literal route name.
    Name(String),
    /// Computed at call time from the dependency store.
    Compute(Arc<dyn Fn(&Dependencies) -> Option<String> + Send + Sync>),
}

impl fmt::Debug for DefaultRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "DefaultRoute::None"),
            Self::Name(name) => write!(f, "DefaultRoute::Name({name:?})"),
            Self::Compute(_) => write!(f, "DefaultRoute::Compute(<fn>)"),
        }
    }
}

/// Parameters paired with the default route, literal or computed.
#[derive(Clone)]
pub enum DefaultParams {
    /// Literal parameters (possibly empty).
    Static(Params),
    /// Computed at call time from the dependency store.
    Compute(Arc<dyn Fn(&Dependencies) -> Params + Send + Sync>),
}

impl Default for DefaultParams {
    fn default() -> Self {
        Self::Static(Params::new())
    }
}

impl fmt::Debug for DefaultParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(params) => write!(f, "DefaultParams::Static({params:?})"),
            Self::Compute(_) => write!(f, "DefaultParams::Compute(<fn>)"),
        }
    }
}

/// Frozen router configuration.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Trailing-slash discipline for built paths.
    pub trailing_slash: TrailingSlashMode,
    /// Compare literal path segments case-sensitively.
    pub case_sensitive: bool,
    /// Require the trailing-slash shape of path and pattern to agree.
    pub strict_trailing_slash: bool,
    /// Require parameters to consume full non-empty segments.
    pub strong_matching: bool,
    /// Policy for undeclared query keys.
    pub query_params_mode: QueryParamsMode,
    /// Parameter encoding strategy.
    pub url_params_encoding: UrlParamsEncoding,
    /// Query-string codec conventions.
    pub query_params: QueryOptions,
    /// Emit a `@@not-found` state instead of failing unmatched transitions.
    pub allow_not_found: bool,
    /// Replace a request path with its canonicalized match.
    pub rewrite_path_on_match: bool,
    /// Target of `navigate_to_default`.
    pub default_route: DefaultRoute,
    /// Parameters for the default route.
    pub default_params: DefaultParams,
    /// Registry size limits.
    pub limits: Limits,
    /// Skip public-surface argument validation on hot paths.
    pub no_validate: bool,
    /// Log sink configuration.
    pub logger: LoggerOptions,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            trailing_slash: TrailingSlashMode::default(),
            case_sensitive: false,
            strict_trailing_slash: false,
            strong_matching: true,
            query_params_mode: QueryParamsMode::default(),
            url_params_encoding: UrlParamsEncoding::default(),
            query_params: QueryOptions::default(),
            allow_not_found: false,
            rewrite_path_on_match: false,
            default_route: DefaultRoute::default(),
            default_params: DefaultParams::default(),
            limits: Limits::default(),
            no_validate: false,
            logger: LoggerOptions::default(),
        }
    }
}

impl RouterOptions {
    /// Start building options from the defaults.
    pub fn builder() -> RouterOptionsBuilder {
        RouterOptionsBuilder {
            options: Self::default(),
        }
    }

    /// Validate the assembled options.
    ///
    /// Every limit must be non-zero; a literal default route name must be
    /// non-empty.
    pub fn validate(&self) -> RouterResult<()> {
        let limits = [
            ("max_plugins", self.limits.max_plugins),
            ("max_middleware", self.limits.max_middleware),
            ("max_dependencies", self.limits.max_dependencies),
            ("max_listeners", self.limits.max_listeners),
            ("max_event_depth", self.limits.max_event_depth),
            ("max_lifecycle_handlers", self.limits.max_lifecycle_handlers),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(RouterError::new(ErrorCode::InvalidOption)
                    .with_message(format!("limit '{name}' must be non-zero")));
            }
        }
        if let DefaultRoute::Name(name) = &self.default_route {
            if name.is_empty() {
                return Err(RouterError::new(ErrorCode::InvalidOption)
                    .with_message("default route name must not be empty"));
            }
        }
        Ok(())
    }

    /// The matcher options these router options imply.
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: self.case_sensitive,
            strict_trailing_slash: self.strict_trailing_slash,
            strong_matching: self.strong_matching,
            query_params_mode: self.query_params_mode,
            url_params_encoding: self.url_params_encoding,
            query_options: self.query_params,
        }
    }

    /// The path-building options these router options imply.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            trailing_slash: self.trailing_slash,
            url_params_encoding: self.url_params_encoding,
            query_params_mode: self.query_params_mode,
            query_options: self.query_params,
        }
    }
}

/// Builder for [`RouterOptions`].
#[must_use]
pub struct RouterOptionsBuilder {
    options: RouterOptions,
}

impl RouterOptionsBuilder {
    /// Set the trailing-slash discipline.
    pub fn trailing_slash(mut self, mode: TrailingSlashMode) -> Self {
        self.options.trailing_slash = mode;
        self
    }

    /// Toggle case-sensitive matching.
    pub fn case_sensitive(mut self, value: bool) -> Self {
        self.options.case_sensitive = value;
        self
    }

    /// Toggle strict trailing-slash matching.
    pub fn strict_trailing_slash(mut self, value: bool) -> Self {
        self.options.strict_trailing_slash = value;
        self
    }

    /// Toggle strong matching.
    pub fn strong_matching(mut self, value: bool) -> Self {
        self.options.strong_matching = value;
        self
    }

    /// Set the undeclared-query-key policy.
    pub fn query_params_mode(mut self, mode: QueryParamsMode) -> Self {
        self.options.query_params_mode = mode;
        self
    }

    /// Set the parameter encoding strategy.
    pub fn url_params_encoding(mut self, encoding: UrlParamsEncoding) -> Self {
        self.options.url_params_encoding = encoding;
        self
    }

    /// Set the query codec conventions.
    pub fn query_params(mut self, options: QueryOptions) -> Self {
        self.options.query_params = options;
        self
    }

    /// Emit a not-found state instead of failing unmatched transitions.
    pub fn allow_not_found(mut self, value: bool) -> Self {
        self.options.allow_not_found = value;
        self
    }

    /// Canonicalize request paths on match.
    pub fn rewrite_path_on_match(mut self, value: bool) -> Self {
        self.options.rewrite_path_on_match = value;
        self
    }

    /// Set a literal default route.
    pub fn default_route(mut self, name: impl Into<String>) -> Self {
        self.options.default_route = DefaultRoute::Name(name.into());
        self
    }

    /// Compute the default route from the dependency store at call time.
    pub fn default_route_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Dependencies) -> Option<String> + Send + Sync + 'static,
    {
        self.options.default_route = DefaultRoute::Compute(Arc::new(f));
        self
    }

    /// Set literal default-route parameters.
    pub fn default_params(mut self, params: Params) -> Self {
        self.options.default_params = DefaultParams::Static(params);
        self
    }

    /// Compute default-route parameters from the dependency store.
    pub fn default_params_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Dependencies) -> Params + Send + Sync + 'static,
    {
        self.options.default_params = DefaultParams::Compute(Arc::new(f));
        self
    }

    /// Override the registry limits.
    pub fn limits(mut self, limits: Limits) -> Self {
        self.options.limits = limits;
        self
    }

    /// Skip public-surface argument validation.
    pub fn no_validate(mut self, value: bool) -> Self {
        self.options.no_validate = value;
        self
    }

    /// Configure the log sink.
    pub fn logger(mut self, logger: LoggerOptions) -> Self {
        self.options.logger = logger;
        self
    }

    /// Validate and finish.
    pub fn build(self) -> RouterResult<RouterOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

// ============================================================================
// Tests
// ============================================================================
