//! The matcher service.
//!
//! Dispatches a URL to the single matching node in a [`RouteTree`]. Traversal
//! is depth-first across children in declaration order: each node's pattern
//! matches a prefix of the remaining segments, and the walk recurses with the
//! rest. A matched absolute descendant restarts consumption from the start of
//! the path, mirroring how absolute segments replace the accumulated prefix
//! when building.
//!
//! The service precomputes its [`MatchOptions`] from the router configuration
//! once, so per-call matching allocates no option objects. With the `cache`
//! feature enabled, outcomes are memoized per path in an LRU
//! [`MatchCache`](crate::cache::MatchCache); the router clears the cache
//! whenever the tree is replaced.
//!
//! # Example
//!
//! ```
//! use wayfarer::matcher::Matcher;
//! use wayfarer::pattern::MatchOptions;
//! use wayfarer::tree::{RouteDefinition, RouteTree};
//!
//! let tree = RouteTree::new(vec![
//!     RouteDefinition::new("users", "/users")
//!         .with_children(vec![RouteDefinition::new("view", "/view/:id")]),
//! ]).unwrap();
//!
//! let matcher = Matcher::new(MatchOptions::standard());
//! let matched = matcher.match_path(&tree, "/users/view/42").unwrap();
//! assert_eq!(matched.name, "users.view");
//! assert_eq!(matched.params.get_str("id"), Some("42"));
//! ```

#[cfg(feature = "cache")]
use crate::cache::MatchCache;
use crate::params::Params;
use crate::pattern::{MatchOptions, QueryParamsMode};
use crate::query::parse_query;
use crate::tree::{NodeId, RouteTree};
#[cfg(feature = "cache")]
use std::sync::Mutex;

/// Outcome of matching a path against the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Matched {
    /// Full name of the matched node.
    pub name: String,
    /// Chain of node ids from the root child down to the matched node.
    pub segments: Vec<NodeId>,
    /// Parameters accumulated along the chain, query values included.
    pub params: Params,
}

/// Path→node dispatch over a route tree.
#[derive(Debug)]
pub struct Matcher {
    options: MatchOptions,
    #[cfg(feature = "cache")]
    cache: Mutex<MatchCache>,
}

impl Matcher {
    /// Create a matcher with precomputed options.
    pub fn new(options: MatchOptions) -> Self {
        Self {
            options,
            #[cfg(feature = "cache")]
            cache: Mutex::new(MatchCache::new()),
        }
    }

    /// The options this matcher was built with.
    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// Drop all memoized outcomes. Must be called when the tree changes.
    pub fn clear_cache(&self) {
        #[cfg(feature = "cache")]
        self.cache.lock().expect("match cache poisoned").clear();
    }

    /// Match a path (optionally with a query string) against the tree.
    pub fn match_path(&self, tree: &RouteTree, path: &str) -> Option<Matched> {
        #[cfg(feature = "cache")]
        {
            let mut cache = self.cache.lock().expect("match cache poisoned");
            if let Some(cached) = cache.lookup(path) {
                return cached.and_then(|(name, params)| {
                    let segments = tree.get_segments_by_name(&name)?;
                    Some(Matched {
                        name,
                        segments,
                        params,
                    })
                });
            }
        }

        let outcome = self.match_uncached(tree, path);

        #[cfg(feature = "cache")]
        {
            let mut cache = self.cache.lock().expect("match cache poisoned");
            cache.store(
                path.to_string(),
                outcome
                    .as_ref()
                    .map(|matched| (matched.name.clone(), matched.params.clone())),
            );
        }

        outcome
    }

    fn match_uncached(&self, tree: &RouteTree, path: &str) -> Option<Matched> {
        let (path_part, query_part) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };

        if self.options.strict_trailing_slash
            && path_part.len() > 1
            && path_part.ends_with('/')
        {
            // Under strict trailing slashes only patterns that themselves end
            // in a slash may match such a path; segment patterns never do.
            return None;
        }

        let segments: Vec<&str> = path_part
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        let mut chain = Vec::new();
        let mut params = Params::new();
        let matched =
            self.descend(tree, RouteTree::ROOT, &segments, 0, &mut chain, &mut params)?;

        let mut matched = Matched {
            name: tree.node(matched).full_name().to_string(),
            segments: chain,
            params,
        };

        self.apply_query(tree, query_part, &mut matched)?;
        Some(matched)
    }

    /// Depth-first walk. Returns the matched leaf node on success; `chain`
    /// and `params` are left holding that chain's accumulated state.
    fn descend(
        &self,
        tree: &RouteTree,
        node: NodeId,
        segments: &[&str],
        consumed: usize,
        chain: &mut Vec<NodeId>,
        params: &mut Params,
    ) -> Option<NodeId> {
        for &child_id in tree.node(node).children() {
            let child = tree.node(child_id);

            // An absolute child restarts from the beginning of the path.
            let base = if child.is_absolute() { 0 } else { consumed };

            let Some((child_params, used)) =
                child.pattern().match_prefix(&segments[base..], &self.options)
            else {
                continue;
            };

            let next_consumed = base + used;
            chain.push(child_id);
            let before = params.clone();
            *params = Params::merge(params, &child_params);

            if next_consumed == segments.len() {
                return Some(child_id);
            }
            if let Some(found) =
                self.descend(tree, child_id, segments, next_consumed, chain, params)
            {
                return Some(found);
            }

            chain.pop();
            *params = before;
        }
        None
    }

    /// Fold the query string into the matched params per the configured mode.
    fn apply_query(
        &self,
        tree: &RouteTree,
        query_part: Option<&str>,
        matched: &mut Matched,
    ) -> Option<()> {
        let Some(query_part) = query_part else {
            return Some(());
        };
        let parsed = parse_query(query_part, &self.options.query_options);
        if parsed.is_empty() {
            return Some(());
        }

        let mut declared: Vec<&str> = tree
            .root_query_params()
            .iter()
            .map(String::as_str)
            .collect();
        for &id in &matched.segments {
            declared.extend(tree.node(id).pattern().query_params().iter().map(String::as_str));
        }

        for (key, value) in parsed.iter() {
            if declared.iter().any(|name| name == key) {
                matched.params.insert(key.clone(), value.clone());
            } else {
                match self.options.query_params_mode {
                    QueryParamsMode::Default => {}
                    QueryParamsMode::Strict => return None,
                    QueryParamsMode::Loose => matched.params.insert(key.clone(), value.clone()),
                }
            }
        }
        Some(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::RouteDefinition;

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

    fn matcher() -> Matcher {
        Matcher::new(MatchOptions::standard())
    }

    #[test]
    fn test_match_top_level() {
        let tree = sample_tree();
        let matched = matcher().match_path(&tree, "/home").unwrap();
        assert_eq!(matched.name, "home");
        assert_eq!(matched.segments.len(), 1);
    }

    #[test]
    fn test_match_nested_with_params() {
        let tree = sample_tree();
        let matched = matcher().match_path(&tree, "/users/view/42").unwrap();
        assert_eq!(matched.name, "users.view");
        assert_eq!(matched.params.get_str("id"), Some("42"));
        assert_eq!(matched.segments.len(), 2);
    }

    #[test]
    fn test_match_intermediate_node() {
        let tree = sample_tree();
        let matched = matcher().match_path(&tree, "/users").unwrap();
        assert_eq!(matched.name, "users");
    }

    #[test]
    fn test_no_match() {
        let tree = sample_tree();
        assert!(matcher().match_path(&tree, "/nowhere").is_none());
        assert!(matcher().match_path(&tree, "/users/view").is_none());
    }

    #[test]
    fn test_declaration_order_wins() {
        let tree = RouteTree::new(vec![
            RouteDefinition::new("first", "/items/:id"),
            RouteDefinition::new("second", "/items/special"),
        ])
        .unwrap();
        let matched = matcher().match_path(&tree, "/items/special").unwrap();
        assert_eq!(matched.name, "first");
    }

    #[test]
    fn test_backtracking_across_siblings() {
        let tree = RouteTree::new(vec![
            RouteDefinition::new("docs", "/docs")
                .with_children(vec![RouteDefinition::new("api", "/api")]),
            RouteDefinition::new("fallback", "/docs/guide"),
        ])
        .unwrap();
        // "docs" matches the prefix but has no child for "guide"; the walk
        // must back out and try the flat sibling.
        let matched = matcher().match_path(&tree, "/docs/guide").unwrap();
        assert_eq!(matched.name, "fallback");
    }

    #[test]
    fn test_absolute_child_short_circuits() {
        let tree = RouteTree::new(vec![RouteDefinition::new("app", "/app")
            .with_children(vec![RouteDefinition::new("login", "~/login")])])
        .unwrap();
        let matched = matcher().match_path(&tree, "/login").unwrap();
        assert_eq!(matched.name, "app.login");
    }

    #[test]
    fn test_query_params_folded_in() {
        let tree = RouteTree::new(vec![RouteDefinition::new("search", "/search?q")]).unwrap();
        let matched = matcher().match_path(&tree, "/search?q=rust&other=1").unwrap();
        assert_eq!(matched.params.get_str("q"), Some("rust"));
        assert!(!matched.params.contains("other"));
    }

    #[test]
    fn test_strict_query_mode_rejects_unknown_keys() {
        let tree = RouteTree::new(vec![RouteDefinition::new("search", "/search?q")]).unwrap();
        let mut options = MatchOptions::standard();
        options.query_params_mode = QueryParamsMode::Strict;
        let matcher = Matcher::new(options);

        assert!(matcher.match_path(&tree, "/search?q=rust").is_some());
        assert!(matcher.match_path(&tree, "/search?q=rust&other=1").is_none());
    }

    #[test]
    fn test_param_inheritance_along_chain() {
        let tree = RouteTree::new(vec![RouteDefinition::new("org", "/orgs/:org")
            .with_children(vec![RouteDefinition::new("repo", "/repos/:repo")])])
        .unwrap();
        let matched = matcher().match_path(&tree, "/orgs/acme/repos/site").unwrap();
        assert_eq!(matched.params.get_str("org"), Some("acme"));
        assert_eq!(matched.params.get_str("repo"), Some("site"));
    }

    #[cfg(feature = "cache")]
    #[test]
    fn test_cache_round_trip() {
        let tree = sample_tree();
        let matcher = matcher();

        let first = matcher.match_path(&tree, "/users/view/42").unwrap();
        let second = matcher.match_path(&tree, "/users/view/42").unwrap();
        assert_eq!(first, second);

        matcher.clear_cache();
        assert!(matcher.match_path(&tree, "/users/view/42").is_some());
    }
}
