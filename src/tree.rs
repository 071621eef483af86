//! The route tree.
//!
//! Routes form a named hierarchy: each node owns one path fragment, and the
//! dot-joined chain of local names (`users.view`) addresses a node. The tree
//! is built once from a list of [`RouteDefinition`]s and is immutable
//! afterwards; `add_route` / `update_route` / `remove_route` produce a brand
//! new tree.
//!
//! Nodes live in a flat arena owned by the tree. A node refers to its parent
//! and children by [`NodeId`] index, which keeps the structure cycle-free and
//! cheap to clone.
//!
//! Construction happens in three passes:
//!
//! 1. allocate nodes for nested definitions, preserving definition order;
//! 2. resolve dot-qualified flat names into their nested positions;
//! 3. compute the per-node caches: full name, children-by-name index,
//!    non-absolute child list, parameter sources, and the pre-built static
//!    path for chains that declare no parameters.
//!
//! # Example
//!
//! ```
//! use wayfarer::params::Params;
//! use wayfarer::tree::{BuildOptions, RouteDefinition, RouteTree};
//!
//! let tree = RouteTree::new(vec![
//!     RouteDefinition::new("users", "/users").with_children(vec![
//!         RouteDefinition::new("view", "/view/:id"),
//!         RouteDefinition::new("list", "/list"),
//!     ]),
//! ]).unwrap();
//!
//! let mut params = Params::new();
//! params.insert("id", "42");
//! let path = tree.build_path("users.view", &params, &BuildOptions::default()).unwrap();
//! assert_eq!(path, "/users/view/42");
//! ```

use crate::error::{ErrorCode, RouterError, RouterResult};
use crate::params::{ParamSource, Params};
use crate::pattern::{PathPattern, QueryParamsMode, UrlParamsEncoding};
use crate::query::{build_query, QueryOptions};
use std::collections::{BTreeMap, HashMap};

/// Index of a node in the tree's arena.
pub type NodeId = usize;

/// Maximum length of a `forward_to` chain before it is declared cyclic.
const MAX_FORWARD_DEPTH: usize = 100;

/// Trailing-slash discipline applied to built paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingSlashMode {
    /// Leave the built path as the patterns render it.
    #[default]
    Preserve,
    /// Normalize to no trailing slash.
    Strict,
    /// Always append a trailing slash.
    Always,
    /// Strip any trailing slash.
    Never,
}

/// Options for [`RouteTree::build_path`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Trailing-slash discipline.
    pub trailing_slash: TrailingSlashMode,
    /// Parameter encoding strategy.
    pub url_params_encoding: UrlParamsEncoding,
    /// Policy for parameters not declared by any segment.
    pub query_params_mode: QueryParamsMode,
    /// Query-string codec options.
    pub query_options: QueryOptions,
}

impl BuildOptions {
    fn is_default(&self) -> bool {
        self.trailing_slash == TrailingSlashMode::Preserve
            && self.url_params_encoding == UrlParamsEncoding::Default
            && self.query_params_mode == QueryParamsMode::Default
            && self.query_options == QueryOptions::default()
    }
}

/// User-supplied description of one route.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    /// Local name, or a dot-qualified name resolved during construction.
    pub name: String,
    /// Path fragment pattern; a leading `~` marks the segment absolute.
    pub path: String,
    /// Nested child definitions.
    pub children: Vec<RouteDefinition>,
    /// Name of a route this one forwards to at state-build time.
    pub forward_to: Option<String>,
}

impl RouteDefinition {
    /// Create a definition with the given name and path.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            children: Vec::new(),
            forward_to: None,
        }
    }

    /// Attach child definitions.
    #[must_use]
    pub fn with_children(mut self, children: Vec<RouteDefinition>) -> Self {
        self.children = children;
        self
    }

    /// Forward navigations targeting this route to another route.
    #[must_use]
    pub fn with_forward_to(mut self, target: impl Into<String>) -> Self {
        self.forward_to = Some(target.into());
        self
    }
}

/// One built route node.
#[derive(Debug, Clone)]
pub struct RouteNode {
    name: String,
    full_name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    child_index: HashMap<String, NodeId>,
    non_absolute_children: Vec<NodeId>,
    pattern: PathPattern,
    param_sources: BTreeMap<String, ParamSource>,
    static_path: Option<String>,
    forward_to: Option<String>,
}

impl RouteNode {
    /// Local name of this node.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dot-joined name from the root.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Parent node, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Children whose paths do not carry the absolute marker.
    pub fn non_absolute_children(&self) -> &[NodeId] {
        &self.non_absolute_children
    }

    /// The parsed path pattern of this segment.
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Whether this segment's path replaces the accumulated parent prefix.
    pub fn is_absolute(&self) -> bool {
        self.pattern.is_absolute()
    }

    /// Parameters this segment declares, mapped to their source.
    pub fn param_sources(&self) -> &BTreeMap<String, ParamSource> {
        &self.param_sources
    }

    /// Pre-built path, present iff no segment up to the root declares a parameter.
    pub fn static_path(&self) -> Option<&str> {
        self.static_path.as_deref()
    }

    /// Forwarding target, if declared.
    pub fn forward_to(&self) -> Option<&str> {
        self.forward_to.as_deref()
    }

    /// Child id by local name.
    pub fn child_by_name(&self, name: &str) -> Option<NodeId> {
        self.child_index.get(name).copied()
    }
}

/// The immutable route tree.
#[derive(Debug, Clone)]
pub struct RouteTree {
    nodes: Vec<RouteNode>,
    name_index: HashMap<String, NodeId>,
    definitions: Vec<RouteDefinition>,
    root_query_params: Vec<String>,
}

impl RouteTree {
    /// Id of the synthetic root node.
    pub const ROOT: NodeId = 0;

    /// Build a tree from route definitions.
    pub fn new(definitions: Vec<RouteDefinition>) -> RouterResult<Self> {
        Self::with_root_query_params(definitions, Vec::new())
    }

    /// Build a tree whose synthetic root declares the given query parameters.
    ///
    /// Used by the persistent-params plugin to make the routing engine
    /// recognize its tracked keys on every route.
    pub fn with_root_query_params(
        definitions: Vec<RouteDefinition>,
        root_query_params: Vec<String>,
    ) -> RouterResult<Self> {
        let root_pattern = if root_query_params.is_empty() {
            PathPattern::parse("")?
        } else {
            PathPattern::parse(&format!("?{}", root_query_params.join("&")))?
        };

        let mut root_sources = BTreeMap::new();
        for key in &root_query_params {
            root_sources.insert(key.clone(), ParamSource::Query);
        }

        let root = RouteNode {
            name: String::new(),
            full_name: String::new(),
            parent: None,
            children: Vec::new(),
            child_index: HashMap::new(),
            non_absolute_children: Vec::new(),
            pattern: root_pattern,
            param_sources: root_sources,
            static_path: Some(String::new()),
            forward_to: None,
        };

        let mut tree = Self {
            nodes: vec![root],
            name_index: HashMap::new(),
            definitions: definitions.clone(),
            root_query_params,
        };

        // Pass 1: nested definitions in order; dotted names are set aside.
        let mut deferred: Vec<RouteDefinition> = Vec::new();
        for definition in definitions {
            if definition.name.contains('.') {
                deferred.push(definition);
            } else {
                tree.insert(Self::ROOT, definition)?;
            }
        }

        // Pass 2: dotted names attach once their parents exist; no progress
        // in a full sweep means a parent is missing.
        while !deferred.is_empty() {
            let before = deferred.len();
            let mut remaining = Vec::new();
            for definition in deferred {
                let (parent_name, local) = definition
                    .name
                    .rsplit_once('.')
                    .expect("deferred names contain a dot");
                match tree.name_index.get(parent_name).copied() {
                    Some(parent) => {
                        let mut resolved = definition.clone();
                        resolved.name = local.to_string();
                        tree.insert(parent, resolved)?;
                    }
                    None => remaining.push(definition),
                }
            }
            if remaining.len() == before {
                let missing = remaining
                    .iter()
                    .map(|definition| definition.name.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(RouterError::new(ErrorCode::InvalidRoute)
                    .with_message(format!("missing parent for route(s): {missing}")));
            }
            deferred = remaining;
        }

        // Pass 3: caches that need the whole tree in place.
        tree.compute_static_paths();
        Ok(tree)
    }

    fn insert(&mut self, parent: NodeId, definition: RouteDefinition) -> RouterResult<NodeId> {
        if definition.name.is_empty() || definition.name.contains('.') {
            return Err(RouterError::new(ErrorCode::InvalidRoute)
                .with_message(format!("invalid route name '{}'", definition.name)));
        }

        let pattern = PathPattern::parse(&definition.path)?;

        let full_name = if self.nodes[parent].full_name.is_empty() {
            definition.name.clone()
        } else {
            format!("{}.{}", self.nodes[parent].full_name, definition.name)
        };

        // Sibling invariants.
        for &sibling in &self.nodes[parent].children {
            let sibling = &self.nodes[sibling];
            if sibling.name == definition.name {
                return Err(RouterError::new(ErrorCode::DuplicateRoute)
                    .with_segment(full_name)
                    .with_message("sibling with the same name already exists"));
            }
            if sibling.pattern.raw() == definition.path {
                return Err(RouterError::new(ErrorCode::DuplicateRoute)
                    .with_segment(full_name)
                    .with_path(definition.path.clone())
                    .with_message("sibling with the same path already exists"));
            }
        }

        // An absolute path may not sit under a parameterized prefix.
        if pattern.is_absolute() {
            let mut ancestor = Some(parent);
            while let Some(id) = ancestor {
                if !self.nodes[id].pattern.url_params().is_empty() {
                    return Err(RouterError::new(ErrorCode::InvalidRoute)
                        .with_segment(full_name)
                        .with_message(
                            "absolute path under a segment that declares URL parameters",
                        ));
                }
                ancestor = self.nodes[id].parent;
            }
        }

        let mut param_sources = BTreeMap::new();
        for name in pattern.url_params() {
            param_sources.insert(name.to_string(), ParamSource::Url);
        }
        for name in pattern.splat_params() {
            param_sources.insert(name.to_string(), ParamSource::Url);
        }
        for name in pattern.query_params() {
            param_sources.insert(name.clone(), ParamSource::Query);
        }

        let id = self.nodes.len();
        let absolute = pattern.is_absolute();
        self.nodes.push(RouteNode {
            name: definition.name.clone(),
            full_name: full_name.clone(),
            parent: Some(parent),
            children: Vec::new(),
            child_index: HashMap::new(),
            non_absolute_children: Vec::new(),
            pattern,
            param_sources,
            static_path: None,
            forward_to: definition.forward_to.clone(),
        });

        self.nodes[parent].children.push(id);
        self.nodes[parent]
            .child_index
            .insert(definition.name.clone(), id);
        if !absolute {
            self.nodes[parent].non_absolute_children.push(id);
        }
        self.name_index.insert(full_name, id);

        for child in definition.children {
            self.insert(id, child)?;
        }
        Ok(id)
    }

    /// Pre-build static paths for chains without parameters.
    fn compute_static_paths(&mut self) {
        // Parents always precede their children in the arena, so a single
        // in-order sweep sees every parent's cache before its children.
        for id in 1..self.nodes.len() {
            let parent = self.nodes[id].parent.unwrap_or(Self::ROOT);
            let absolute = self.nodes[id].pattern.is_absolute();
            let own = if self.nodes[id].pattern.has_params() {
                None
            } else {
                self.nodes[id].pattern.static_path()
            };

            let computed = match own {
                None => None,
                Some(own) if absolute => Some(own),
                Some(own) => self.nodes[parent]
                    .static_path
                    .as_ref()
                    .map(|prefix| format!("{prefix}{own}")),
            };
            self.nodes[id].static_path = computed;
        }
    }

    /// Node by arena id.
    pub fn node(&self, id: NodeId) -> &RouteNode {
        &self.nodes[id]
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no routes besides the synthetic root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Node id for a dot-qualified name.
    pub fn get_by_name(&self, full_name: &str) -> Option<NodeId> {
        self.name_index.get(full_name).copied()
    }

    /// Query parameters declared on the synthetic root.
    pub fn root_query_params(&self) -> &[String] {
        &self.root_query_params
    }

    /// The definitions this tree was built from.
    pub fn definitions(&self) -> &[RouteDefinition] {
        &self.definitions
    }

    /// Ordered chain of nodes from the root child down to the named node.
    ///
    /// Returns `None` if any segment along the way is missing.
    pub fn get_segments_by_name(&self, full_name: &str) -> Option<Vec<NodeId>> {
        if full_name.is_empty() {
            return None;
        }
        let mut chain = Vec::new();
        let mut current = Self::ROOT;
        for segment in full_name.split('.') {
            current = self.nodes[current].child_by_name(segment)?;
            chain.push(current);
        }
        Some(chain)
    }

    /// Resolve `forward_to` chains starting at `name`.
    ///
    /// Returns the final route name. Fails with `INVALID_ROUTE` when the
    /// chain exceeds [`MAX_FORWARD_DEPTH`] (a cycle).
    pub fn resolve_forward(&self, name: &str) -> RouterResult<String> {
        let mut current = name.to_string();
        for _ in 0..MAX_FORWARD_DEPTH {
            let Some(id) = self.get_by_name(&current) else {
                return Ok(current);
            };
            match self.nodes[id].forward_to() {
                Some(target) => current = target.to_string(),
                None => return Ok(current),
            }
        }
        Err(RouterError::new(ErrorCode::InvalidRoute)
            .with_segment(name.to_string())
            .with_message(format!(
                "forward_to chain exceeds {MAX_FORWARD_DEPTH} hops"
            )))
    }

    /// Parameter sources for every segment of the named chain.
    pub fn param_sources_for(&self, full_name: &str) -> Option<BTreeMap<String, BTreeMap<String, ParamSource>>> {
        let chain = self.get_segments_by_name(full_name)?;
        let mut out = BTreeMap::new();
        let mut root_sources = self.nodes[Self::ROOT].param_sources.clone();
        for id in chain {
            let node = &self.nodes[id];
            let mut sources = node.param_sources.clone();
            // Root-declared query params belong to the first segment.
            if !root_sources.is_empty() {
                sources.append(&mut root_sources);
            }
            out.insert(node.full_name.clone(), sources);
        }
        Some(out)
    }

    /// Build a path for the named route.
    ///
    /// Follows the contract of the path-building operation: a pre-computed
    /// static path is returned directly when no parameters are involved and
    /// the options are the defaults; otherwise each segment's pattern is
    /// filled in, absolute segments replace the accumulated prefix, declared
    /// query parameters are appended, and the trailing-slash mode is applied.
    pub fn build_path(
        &self,
        full_name: &str,
        params: &Params,
        options: &BuildOptions,
    ) -> RouterResult<String> {
        let chain = self
            .get_segments_by_name(full_name)
            .ok_or_else(|| RouterError::route_not_found(full_name))?;

        if params.is_empty() && options.is_default() {
            if let Some(static_path) = self.nodes[*chain.last().expect("non-empty chain")]
                .static_path
                .as_ref()
            {
                return Ok(normalize_built(static_path.clone(), options.trailing_slash));
            }
        }

        let mut path = String::new();
        let mut declared_query: Vec<&str> = self
            .root_query_params
            .iter()
            .map(String::as_str)
            .collect();
        let mut declared_url: Vec<&str> = Vec::new();

        for &id in &chain {
            let node = &self.nodes[id];
            let pattern = node.pattern();

            pattern.validate_constraints(params)?;

            let mut segment_values = Params::new();
            for name in pattern.url_params().into_iter().chain(pattern.splat_params()) {
                declared_url.push(name);
                if let Some(value) = params.get(name) {
                    if !value.is_null() {
                        let rendered = value
                            .coerced()
                            .and_then(|mut v| v.pop())
                            .unwrap_or_default();
                        segment_values
                            .insert(name, options.url_params_encoding.encode(&rendered));
                    }
                }
            }
            declared_query.extend(pattern.query_params().iter().map(String::as_str));

            let fragment = pattern.build(&segment_values);
            if node.is_absolute() {
                path = fragment;
            } else {
                path.push_str(&fragment);
            }
        }

        let mut query_values = params.subset(declared_query.iter().copied());
        if options.query_params_mode == QueryParamsMode::Loose {
            for (key, value) in params.iter() {
                let declared = declared_query.iter().any(|name| name == key)
                    || declared_url.iter().any(|name| name == key);
                if !declared && !value.is_null() {
                    query_values.insert(key.clone(), value.clone());
                }
            }
        }

        let mut path = normalize_built(path, options.trailing_slash);
        let query = build_query(&query_values, &options.query_options);
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query);
        }
        Ok(path)
    }

    /// A new tree with additional top-level (or dot-qualified) definitions.
    pub fn with_added(&self, definitions: Vec<RouteDefinition>) -> RouterResult<Self> {
        let mut all = self.definitions.clone();
        all.extend(definitions);
        Self::with_root_query_params(all, self.root_query_params.clone())
    }

    /// A new tree with the named route's path replaced.
    pub fn with_updated(&self, full_name: &str, path: impl Into<String>) -> RouterResult<Self> {
        let mut all = self.definitions.clone();
        if !update_definition(&mut all, full_name, &path.into()) {
            return Err(RouterError::route_not_found(full_name));
        }
        Self::with_root_query_params(all, self.root_query_params.clone())
    }

    /// A new tree without the named route (and its subtree).
    pub fn with_removed(&self, full_name: &str) -> RouterResult<Self> {
        let mut all = self.definitions.clone();
        if !remove_definition(&mut all, full_name) {
            return Err(RouterError::route_not_found(full_name));
        }
        Self::with_root_query_params(all, self.root_query_params.clone())
    }

    /// A new tree with different root-declared query parameters.
    pub fn with_root_params(&self, keys: Vec<String>) -> RouterResult<Self> {
        Self::with_root_query_params(self.definitions.clone(), keys)
    }
}

/// Apply the trailing-slash discipline to a built path.
fn normalize_built(path: String, mode: TrailingSlashMode) -> String {
    let path = if path.is_empty() { "/".to_string() } else { path };
    match mode {
        TrailingSlashMode::Preserve => path,
        TrailingSlashMode::Strict | TrailingSlashMode::Never => {
            if path.len() > 1 && path.ends_with('/') {
                path.trim_end_matches('/').to_string()
            } else {
                path
            }
        }
        TrailingSlashMode::Always => {
            if path.ends_with('/') {
                path
            } else {
                format!("{path}/")
            }
        }
    }
}

/// Walk nested definitions by dotted name and update the path in place.
fn update_definition(definitions: &mut [RouteDefinition], full_name: &str, path: &str) -> bool {
    let (head, rest) = match full_name.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (full_name, None),
    };
    for definition in definitions.iter_mut() {
        // Flat dotted definitions match on their full name directly.
        if definition.name == full_name {
            definition.path = path.to_string();
            return true;
        }
        if definition.name == head {
            match rest {
                None => {
                    definition.path = path.to_string();
                    return true;
                }
                Some(rest) => {
                    if update_definition(&mut definition.children, rest, path) {
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Remove the definition addressed by the dotted name.
fn remove_definition(definitions: &mut Vec<RouteDefinition>, full_name: &str) -> bool {
    if let Some(position) = definitions
        .iter()
        .position(|definition| definition.name == full_name)
    {
        definitions.remove(position);
        return true;
    }
    let (head, rest) = match full_name.split_once('.') {
        Some((head, rest)) => (head, rest),
        None => return false,
    };
    for definition in definitions.iter_mut() {
        if definition.name == head && remove_definition(&mut definition.children, rest) {
            return true;
        }
    }
    false
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> RouteTree {
        RouteTree::new(vec![
            RouteDefinition::new("home", "/home"),
            RouteDefinition::new("users", "/users").with_children(vec![
                RouteDefinition::new("view", "/view/:id"),
                RouteDefinition::new("list", "/list"),
            ]),
        ])
        .unwrap()
    }

    #[test]
    fn test_full_names_and_index() {
        let tree = sample_tree();
        let view = tree.get_by_name("users.view").unwrap();
        assert_eq!(tree.node(view).full_name(), "users.view");
        assert_eq!(tree.node(view).name(), "view");

        let parent = tree.node(view).parent().unwrap();
        assert_eq!(tree.node(parent).full_name(), "users");
    }

    #[test]
    fn test_segments_by_name() {
        let tree = sample_tree();
        let chain = tree.get_segments_by_name("users.view").unwrap();
        let names: Vec<&str> = chain.iter().map(|&id| tree.node(id).full_name()).collect();
        assert_eq!(names, ["users", "users.view"]);

        assert!(tree.get_segments_by_name("users.missing").is_none());
        assert!(tree.get_segments_by_name("").is_none());
    }

    #[test]
    fn test_flat_dotted_names_resolve() {
        let tree = RouteTree::new(vec![
            RouteDefinition::new("users.view", "/view/:id"),
            RouteDefinition::new("users", "/users"),
        ])
        .unwrap();
        assert!(tree.get_by_name("users.view").is_some());

        let chain = tree.get_segments_by_name("users.view").unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_missing_parent_fails() {
        let err = RouteTree::new(vec![RouteDefinition::new("users.view", "/view/:id")])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRoute);
        assert!(err.message.unwrap().contains("users.view"));
    }

    #[test]
    fn test_duplicate_sibling_name_fails() {
        let err = RouteTree::new(vec![
            RouteDefinition::new("home", "/home"),
            RouteDefinition::new("home", "/other"),
        ])
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateRoute);
    }

    #[test]
    fn test_duplicate_sibling_path_fails() {
        let err = RouteTree::new(vec![
            RouteDefinition::new("home", "/home"),
            RouteDefinition::new("start", "/home"),
        ])
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateRoute);
    }

    #[test]
    fn test_absolute_under_parameterized_ancestor_fails() {
        let err = RouteTree::new(vec![RouteDefinition::new("users", "/users/:id")
            .with_children(vec![RouteDefinition::new("settings", "~/settings")])])
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRoute);
    }

    #[test]
    fn test_static_paths() {
        let tree = sample_tree();
        let list = tree.get_by_name("users.list").unwrap();
        assert_eq!(tree.node(list).static_path(), Some("/users/list"));

        // A parameterized segment poisons the chain below it.
        let view = tree.get_by_name("users.view").unwrap();
        assert!(tree.node(view).static_path().is_none());
    }

    #[test]
    fn test_build_path_static_fast_path() {
        let tree = sample_tree();
        let path = tree
            .build_path("users.list", &Params::new(), &BuildOptions::default())
            .unwrap();
        assert_eq!(path, "/users/list");
    }

    #[test]
    fn test_build_path_with_params() {
        let tree = sample_tree();
        let mut params = Params::new();
        params.insert("id", "42");
        let path = tree
            .build_path("users.view", &params, &BuildOptions::default())
            .unwrap();
        assert_eq!(path, "/users/view/42");
    }

    #[test]
    fn test_build_path_encodes_values() {
        let tree = sample_tree();
        let mut params = Params::new();
        params.insert("id", "a/b");
        let path = tree
            .build_path("users.view", &params, &BuildOptions::default())
            .unwrap();
        assert_eq!(path, "/users/view/a%2Fb");
    }

    #[test]
    fn test_build_path_unknown_name() {
        let tree = sample_tree();
        let err = tree
            .build_path("nowhere", &Params::new(), &BuildOptions::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RouteNotFound);
    }

    #[test]
    fn test_build_path_query_params() {
        let tree = RouteTree::new(vec![
            RouteDefinition::new("search", "/search?q&page"),
        ])
        .unwrap();
        let mut params = Params::new();
        params.insert("q", "rust");
        params.insert("page", "2");
        let path = tree
            .build_path("search", &params, &BuildOptions::default())
            .unwrap();
        assert_eq!(path, "/search?page=2&q=rust");
    }

    #[test]
    fn test_build_path_constraint_violation() {
        let tree =
            RouteTree::new(vec![RouteDefinition::new("user", "/users/:id<\\d+>")]).unwrap();
        let mut params = Params::new();
        params.insert("id", "abc");
        let err = tree
            .build_path("user", &params, &BuildOptions::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConstraintViolation);
    }

    #[test]
    fn test_build_path_absolute_replaces_prefix() {
        let tree = RouteTree::new(vec![RouteDefinition::new("app", "/app").with_children(
            vec![RouteDefinition::new("login", "~/login")],
        )])
        .unwrap();
        let path = tree
            .build_path("app.login", &Params::new(), &BuildOptions::default())
            .unwrap();
        assert_eq!(path, "/login");
    }

    #[test]
    fn test_trailing_slash_modes() {
        let tree = sample_tree();
        let mut options = BuildOptions::default();

        options.trailing_slash = TrailingSlashMode::Always;
        assert_eq!(
            tree.build_path("home", &Params::new(), &options).unwrap(),
            "/home/"
        );

        options.trailing_slash = TrailingSlashMode::Never;
        assert_eq!(
            tree.build_path("home", &Params::new(), &options).unwrap(),
            "/home"
        );
    }

    #[test]
    fn test_forward_resolution() {
        let tree = RouteTree::new(vec![
            RouteDefinition::new("old", "/old").with_forward_to("new"),
            RouteDefinition::new("new", "/new"),
        ])
        .unwrap();
        assert_eq!(tree.resolve_forward("old").unwrap(), "new");
        assert_eq!(tree.resolve_forward("new").unwrap(), "new");
    }

    #[test]
    fn test_forward_cycle_detected() {
        let tree = RouteTree::new(vec![
            RouteDefinition::new("a", "/a").with_forward_to("b"),
            RouteDefinition::new("b", "/b").with_forward_to("a"),
        ])
        .unwrap();
        let err = tree.resolve_forward("a").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRoute);
    }

    #[test]
    fn test_tree_edits_produce_new_trees() {
        let tree = sample_tree();

        let added = tree
            .with_added(vec![RouteDefinition::new("about", "/about")])
            .unwrap();
        assert!(added.get_by_name("about").is_some());
        assert!(tree.get_by_name("about").is_none());

        let updated = added.with_updated("about", "/about-us").unwrap();
        assert_eq!(
            updated
                .build_path("about", &Params::new(), &BuildOptions::default())
                .unwrap(),
            "/about-us"
        );

        let removed = updated.with_removed("users").unwrap();
        assert!(removed.get_by_name("users").is_none());
        assert!(removed.get_by_name("users.view").is_none());
    }

    #[test]
    fn test_root_query_params_recognized() {
        let tree = RouteTree::new(vec![RouteDefinition::new("home", "/home")])
            .unwrap()
            .with_root_params(vec!["lang".to_string()])
            .unwrap();

        let mut params = Params::new();
        params.insert("lang", "en");
        let path = tree
            .build_path("home", &params, &BuildOptions::default())
            .unwrap();
        assert_eq!(path, "/home?lang=en");
    }

    #[test]
    fn test_param_sources_for() {
        let tree = RouteTree::new(vec![RouteDefinition::new("users", "/users")
            .with_children(vec![RouteDefinition::new("view", "/view/:id?tab")])])
        .unwrap();

        let sources = tree.param_sources_for("users.view").unwrap();
        let view = sources.get("users.view").unwrap();
        assert_eq!(view.get("id"), Some(&ParamSource::Url));
        assert_eq!(view.get("tab"), Some(&ParamSource::Query));
    }
}
