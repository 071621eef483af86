//! Route parameter values and collections.
//!
//! Parameters flow through every layer of the router: extracted from matched
//! paths, substituted into patterns when building, diffed when computing
//! transition paths, and serialized into query strings. [`Params`] is the
//! shared collection type; [`ParamValue`] models the value shapes a URL can
//! carry:
//!
//! - [`Str`](ParamValue::Str) — the common single value.
//! - [`List`](ParamValue::List) — repeated query keys (`?tag=a&tag=b`).
//! - [`Bool`](ParamValue::Bool) — rendered per the query codec's boolean format.
//! - [`Null`](ParamValue::Null) — an explicitly absent value. A `Null` entry
//!   is skipped by path building and transition diffing, and instructs the
//!   persistent-params plugin to drop a tracked key.
//!
//! # Example
//!
//! ```
//! use wayfarer::params::Params;
//!
//! let mut params = Params::new();
//! params.insert("id", "42");
//! params.insert("archived", true);
//!
//! assert_eq!(params.get_str("id"), Some("42"));
//! assert_eq!(params.get_as::<u32>("id"), Some(42));
//! assert!(params.contains("archived"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a declared parameter's value travels in a URL.
///
/// Recorded per segment in state metadata and consulted by transition-path
/// diffing, which only compares declared parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamSource {
    /// The value occupies a path segment.
    Url,
    /// The value travels in the query string.
    Query,
}

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Explicitly absent value.
    Null,
    /// Boolean value; its query-string rendering depends on the codec options.
    Bool(bool),
    /// Plain string value.
    Str(String),
    /// Multiple values for the same key.
    List(Vec<String>),
}

impl ParamValue {
    /// Whether this value is the explicit-absence marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The value as a single string, if it has one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Normalized representation used for coerced comparison: `None` for
    /// [`Null`](Self::Null), otherwise the list of rendered strings.
    pub fn coerced(&self) -> Option<Vec<String>> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(vec![b.to_string()]),
            Self::Str(s) => Some(vec![s.clone()]),
            Self::List(items) => Some(items.clone()),
        }
    }

    /// Elementwise equality under string coercion. `Null` values are treated
    /// as "no value" and never equal a present value.
    pub fn coerced_eq(&self, other: &Self) -> bool {
        match (self.coerced(), other.coerced()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Str(value.to_string())
    }
}

/// Ordered collection of named parameters.
///
/// Iteration order is the lexicographic key order, which keeps built paths
/// and query strings deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    entries: BTreeMap<String, ParamValue>,
}

impl Params {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Mark a key explicitly absent. Path building skips it; the
    /// persistent-params plugin treats it as a removal instruction.
    pub fn unset(&mut self, key: impl Into<String>) {
        self.entries.insert(key.into(), ParamValue::Null);
    }

    /// Remove a key entirely.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.entries.remove(key)
    }

    /// Get a parameter value by key.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key)
    }

    /// Get a parameter's single-string value by key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(ParamValue::as_str)
    }

    /// Get a parameter and parse it as a specific type.
    ///
    /// Returns `None` if the parameter is missing, not a single string, or
    /// cannot be parsed.
    pub fn get_as<T>(&self, key: &str) -> Option<T>
    where
        T: std::str::FromStr,
    {
        self.get_str(key)?.parse().ok()
    }

    /// Return `true` if the key is present with a non-null value.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|v| !v.is_null())
    }

    /// Return `true` if the key is present at all, including null entries.
    pub fn has_entry(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over all `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.entries.iter()
    }

    /// Iterate over all keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Return `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the number of entries, null entries included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Merge two collections; `overlay` values win on collision.
    ///
    /// Used by nested segments inheriting parent parameters and by the
    /// persistent-params plugin (caller values overlay sticky values).
    pub fn merge(base: &Params, overlay: &Params) -> Params {
        let mut merged = base.clone();
        for (key, value) in overlay.iter() {
            merged.entries.insert(key.clone(), value.clone());
        }
        merged
    }

    /// A copy restricted to the given keys, dropping null entries.
    pub fn subset<'a, I>(&self, keys: I) -> Params
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = Params::new();
        for key in keys {
            if let Some(value) = self.entries.get(key) {
                if !value.is_null() {
                    out.entries.insert(key.to_string(), value.clone());
                }
            }
        }
        out
    }

    /// Drop all null entries in place.
    pub fn prune_nulls(&mut self) {
        self.entries.retain(|_, value| !value.is_null());
    }
}

impl FromIterator<(String, ParamValue)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a String, &'a ParamValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
