//! Path pattern parsing, matching, and building.
//!
//! A pattern describes one route segment's path fragment. Supported syntax:
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `/users/list` | literal segments |
//! | `:id` | named parameter |
//! | `:id?` | optional parameter |
//! | `:id<\d+>` | parameter with an inline regex constraint |
//! | `*rest` | named splat, matches the remainder |
//! | `*` | unnamed splat, exposed under the key `wild` |
//! | `?offset&limit` | declared query parameters (suffix) |
//! | `~/login` | absolute marker: replaces the accumulated parent prefix |
//!
//! Matching is segment-wise: consecutive slashes collapse, `/` is the empty
//! path. Parameter values are percent-decoded according to the configured
//! [`UrlParamsEncoding`]; building expects caller-encoded values.
//!
//! # Example
//!
//! ```
//! use wayfarer::pattern::{MatchOptions, PathPattern};
//!
//! let pattern = PathPattern::parse("/users/view/:id<\\d+>?tab").unwrap();
//! let params = pattern.match_path("/users/view/42?tab=posts", &MatchOptions::default()).unwrap();
//! assert_eq!(params.get_str("id"), Some("42"));
//! assert_eq!(params.get_str("tab"), Some("posts"));
//!
//! assert!(pattern.match_path("/users/view/abc", &MatchOptions::default()).is_none());
//! ```

use crate::error::{ErrorCode, RouterError, RouterResult};
use crate::params::Params;
use crate::query::{parse_query, QueryOptions};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use std::fmt;

/// Key unnamed splats are exposed under.
pub const WILD_KEY: &str = "wild";

/// Policy for query keys a pattern did not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryParamsMode {
    /// Undeclared keys are ignored.
    #[default]
    Default,
    /// Undeclared keys fail the match.
    Strict,
    /// Undeclared keys are absorbed into the matched params.
    Loose,
}

/// Percent-encoding strategy for URL path parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlParamsEncoding {
    /// Component encoding on build, tolerant decoding on match.
    #[default]
    Default,
    /// Encode only characters illegal anywhere in a URI; reserved characters pass through.
    Uri,
    /// Full component encoding, reserved characters included.
    UriComponent,
    /// No encoding or decoding.
    None,
}

/// Everything non-alphanumeric except unreserved marks.
const COMPONENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Like [`COMPONENT_SET`] but reserved URI characters also pass through.
const URI_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'#')
    .remove(b'[')
    .remove(b']')
    .remove(b'@')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=');

impl UrlParamsEncoding {
    /// Encode a raw parameter value for inclusion in a path.
    pub fn encode(self, raw: &str) -> String {
        match self {
            Self::Default | Self::UriComponent => {
                utf8_percent_encode(raw, COMPONENT_SET).to_string()
            }
            Self::Uri => utf8_percent_encode(raw, URI_SET).to_string(),
            Self::None => raw.to_string(),
        }
    }

    /// Decode a matched path segment back into a parameter value.
    pub fn decode(self, raw: &str) -> String {
        match self {
            Self::None => raw.to_string(),
            _ => percent_decode_str(raw)
                .decode_utf8()
                .map_or_else(|_| raw.to_string(), |decoded| decoded.into_owned()),
        }
    }
}

/// Options controlling [`PathPattern::match_path`].
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    /// Compare literal segments case-sensitively.
    pub case_sensitive: bool,
    /// Require the trailing-slash shape of path and pattern to agree.
    pub strict_trailing_slash: bool,
    /// Require every parameter to consume a full non-empty segment.
    /// Defaults to on; see [`MatchOptions::default`].
    pub strong_matching: bool,
    /// Policy for undeclared query keys.
    pub query_params_mode: QueryParamsMode,
    /// Parameter decoding strategy.
    pub url_params_encoding: UrlParamsEncoding,
    /// Codec options for the query-string portion.
    pub query_options: QueryOptions,
}

impl MatchOptions {
    /// The defaults used when no per-call options are supplied:
    /// case-insensitive, lenient trailing slash, strong matching.
    pub fn standard() -> Self {
        Self {
            strong_matching: true,
            ..Self::default()
        }
    }
}

/// One parsed path token, covering exactly one segment (splats cover the rest).
#[derive(Debug, Clone)]
enum Token {
    Static(String),
    Param {
        name: String,
        optional: bool,
        constraint: Option<Regex>,
    },
    Splat {
        name: String,
    },
}

/// A parsed path pattern with its parameter metadata.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    absolute: bool,
    trailing_slash: bool,
    tokens: Vec<Token>,
    query_params: Vec<String>,
}

impl PathPattern {
    /// Parse a pattern string.
    ///
    /// Fails with `INVALID_ROUTE` on malformed constraints, empty parameter
    /// names, or tokens after a splat.
    pub fn parse(pattern: &str) -> RouterResult<Self> {
        let raw = pattern.to_string();
        let (absolute, rest) = match pattern.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };

        let (path_part, query_part) = split_query_declarations(rest);

        let query_params = query_part
            .map(|query| {
                query
                    .split('&')
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let trailing_slash = path_part.len() > 1 && path_part.ends_with('/');

        let mut tokens = Vec::new();
        for segment in path_part.split('/').filter(|segment| !segment.is_empty()) {
            if !tokens.is_empty() && matches!(tokens.last(), Some(Token::Splat { .. })) {
                return Err(invalid(pattern, "splat must be the last segment"));
            }
            if let Some(rest) = segment.strip_prefix(':') {
                tokens.push(parse_param_token(pattern, rest)?);
            } else if let Some(rest) = segment.strip_prefix('*') {
                let name = if rest.is_empty() { WILD_KEY } else { rest };
                tokens.push(Token::Splat {
                    name: name.to_string(),
                });
            } else {
                tokens.push(Token::Static(segment.to_string()));
            }
        }

        Ok(Self {
            raw,
            absolute,
            trailing_slash,
            tokens,
            query_params,
        })
    }

    /// The original pattern string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern carried the `~` absolute marker.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Names of URL-carried parameters, splats excluded, in pattern order.
    pub fn url_params(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|token| match token {
                Token::Param { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Names of splat parameters (at most one).
    pub fn splat_params(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|token| match token {
                Token::Splat { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Declared query parameter names.
    pub fn query_params(&self) -> &[String] {
        &self.query_params
    }

    /// `(name, pattern)` pairs for parameters with inline constraints.
    pub fn constraints(&self) -> Vec<(&str, &str)> {
        self.tokens
            .iter()
            .filter_map(|token| match token {
                Token::Param {
                    name,
                    constraint: Some(regex),
                    ..
                } => Some((name.as_str(), regex.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Whether the pattern declares any parameter at all, query included.
    pub fn has_params(&self) -> bool {
        !self.query_params.is_empty()
            || self
                .tokens
                .iter()
                .any(|token| !matches!(token, Token::Static(_)))
    }

    /// Render the static form of the pattern. `None` when any path
    /// parameter is present.
    pub fn static_path(&self) -> Option<String> {
        let mut segments = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            match token {
                Token::Static(text) => segments.push(text.as_str()),
                _ => return None,
            }
        }
        Some(join_segments(&segments))
    }

    /// Substitute values into the pattern.
    ///
    /// Values are expected pre-encoded. Optional and splat parameters with a
    /// missing or null value are omitted; a missing required value leaves the
    /// `:name` placeholder in place, which callers treat as a programmer
    /// error surfaced by the route tree's constraint validation.
    pub fn build(&self, values: &Params) -> String {
        let mut segments: Vec<String> = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            match token {
                Token::Static(text) => segments.push(text.clone()),
                Token::Param { name, optional, .. } => match values.get(name) {
                    Some(value) if !value.is_null() => {
                        if let Some(rendered) = value.coerced().and_then(|mut v| v.pop()) {
                            segments.push(rendered);
                        }
                    }
                    _ if *optional => {}
                    _ => segments.push(format!(":{name}")),
                },
                Token::Splat { name } => {
                    if let Some(value) = values.get(name) {
                        if let Some(rendered) = value.coerced().and_then(|mut v| v.pop()) {
                            if !rendered.is_empty() {
                                segments.push(rendered);
                            }
                        }
                    }
                }
            }
        }
        join_segments(&segments.iter().map(String::as_str).collect::<Vec<_>>())
    }

    /// Match a path (optionally carrying a query string) against the pattern.
    ///
    /// Returns the extracted parameters, or `None` when the path does not
    /// match. Declared query parameters present in the query string are
    /// included; undeclared keys follow
    /// [`query_params_mode`](MatchOptions::query_params_mode).
    pub fn match_path(&self, path: &str, options: &MatchOptions) -> Option<Params> {
        let (path_part, query_part) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };

        if options.strict_trailing_slash && path_part.len() > 1 {
            let path_trailing = path_part.ends_with('/');
            if path_trailing != self.trailing_slash {
                return None;
            }
        }

        let segments: Vec<&str> = path_part
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        let mut params = self.match_segments(&segments, options)?;
        self.match_query(query_part, options, &mut params)?;
        Some(params)
    }

    /// Match the pattern against a prefix of `segments`.
    ///
    /// Returns the extracted parameters and the number of segments consumed.
    /// Used by the matcher service when walking the route tree; the full-path
    /// entry point is [`match_path`](Self::match_path).
    pub(crate) fn match_prefix(
        &self,
        segments: &[&str],
        options: &MatchOptions,
    ) -> Option<(Params, usize)> {
        let mut params = Params::new();
        let mut cursor = 0usize;

        for (index, token) in self.tokens.iter().enumerate() {
            match token {
                Token::Static(text) => {
                    let segment = segments.get(cursor)?;
                    let equal = if options.case_sensitive {
                        *segment == text.as_str()
                    } else {
                        segment.eq_ignore_ascii_case(text)
                    };
                    if !equal {
                        return None;
                    }
                    cursor += 1;
                }
                Token::Param {
                    name,
                    optional,
                    constraint,
                } => {
                    let available = segments.len() - cursor;
                    let needed_after = self.min_segments_after(index);
                    if *optional && available <= needed_after {
                        continue;
                    }
                    let segment = segments.get(cursor)?;
                    if let Some(regex) = constraint {
                        if !full_match(regex, segment) {
                            return None;
                        }
                    }
                    params.insert(name.clone(), options.url_params_encoding.decode(segment));
                    cursor += 1;
                }
                Token::Splat { name } => {
                    let remainder = segments[cursor..].join("/");
                    if remainder.is_empty() && options.strong_matching {
                        return None;
                    }
                    params.insert(name.clone(), options.url_params_encoding.decode(&remainder));
                    cursor = segments.len();
                }
            }
        }

        Some((params, cursor))
    }

    fn match_segments(&self, segments: &[&str], options: &MatchOptions) -> Option<Params> {
        let (params, consumed) = self.match_prefix(segments, options)?;
        if consumed != segments.len() {
            return None;
        }
        Some(params)
    }

    fn match_query(
        &self,
        query_part: Option<&str>,
        options: &MatchOptions,
        params: &mut Params,
    ) -> Option<()> {
        let Some(query_part) = query_part else {
            return Some(());
        };
        let parsed = parse_query(query_part, &options.query_options);
        for (key, value) in parsed.iter() {
            if self.query_params.iter().any(|declared| declared == key) {
                params.insert(key.clone(), value.clone());
            } else {
                match options.query_params_mode {
                    QueryParamsMode::Default => {}
                    QueryParamsMode::Strict => return None,
                    QueryParamsMode::Loose => params.insert(key.clone(), value.clone()),
                }
            }
        }
        Some(())
    }

    /// Minimum number of segments the tokens after `index` must consume.
    fn min_segments_after(&self, index: usize) -> usize {
        self.tokens[index + 1..]
            .iter()
            .map(|token| match token {
                Token::Static(_) => 1,
                Token::Param { optional, .. } => usize::from(!optional),
                Token::Splat { .. } => 0,
            })
            .sum()
    }

    /// Validate parameter values against the pattern's inline constraints.
    ///
    /// Fails with `CONSTRAINT_VIOLATION` naming the offending parameter, the
    /// actual value, and the required pattern.
    pub fn validate_constraints(&self, values: &Params) -> RouterResult<()> {
        for token in &self.tokens {
            if let Token::Param {
                name,
                constraint: Some(regex),
                ..
            } = token
            {
                if let Some(value) = values.get(name) {
                    if value.is_null() {
                        continue;
                    }
                    let rendered = value.coerced().and_then(|mut v| v.pop()).unwrap_or_default();
                    if !full_match(regex, &rendered) {
                        return Err(RouterError::new(ErrorCode::ConstraintViolation)
                            .with_path(self.raw.clone())
                            .with_message(format!(
                                "param '{name}' value '{rendered}' does not match '{}'",
                                regex.as_str()
                            ))
                            .with_metadata("param", name.clone())
                            .with_metadata("value", rendered)
                            .with_metadata("pattern", regex.as_str().to_string()));
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_param_token(pattern: &str, body: &str) -> RouterResult<Token> {
    let mut name = body.to_string();
    let mut constraint = None;

    if let Some(open) = name.find('<') {
        let Some(close) = name.rfind('>') else {
            return Err(invalid(pattern, "unterminated constraint"));
        };
        let expr = name[open + 1..close].to_string();
        let regex = Regex::new(&expr).map_err(|err| {
            invalid(pattern, &format!("bad constraint '{expr}': {err}"))
        })?;
        constraint = Some(regex);
        name.replace_range(open..=close, "");
    }

    let optional = name.ends_with('?');
    if optional {
        name.pop();
    }

    if name.is_empty() {
        return Err(invalid(pattern, "empty parameter name"));
    }

    Ok(Token::Param {
        name,
        optional,
        constraint,
    })
}

/// Split a pattern into its path part and query declarations.
///
/// A `?` starts the query declarations only when it is outside a `<…>`
/// constraint and the remainder holds no further path segment. This keeps
/// `:section?` in `/users/:section?/list` an optional-param marker, and a
/// trailing `?` (empty declaration list) one as well.
fn split_query_declarations(pattern: &str) -> (&str, Option<&str>) {
    let mut constraint_depth = 0usize;
    for (index, ch) in pattern.char_indices() {
        match ch {
            '<' => constraint_depth += 1,
            '>' => constraint_depth = constraint_depth.saturating_sub(1),
            '?' if constraint_depth == 0 => {
                let after = &pattern[index + 1..];
                if !after.is_empty() && !after.contains('/') {
                    return (&pattern[..index], Some(after));
                }
            }
            _ => {}
        }
    }
    (pattern, None)
}

fn invalid(pattern: &str, reason: &str) -> RouterError {
    RouterError::new(ErrorCode::InvalidRoute)
        .with_path(pattern.to_string())
        .with_message(reason.to_string())
}

/// Anchor a constraint to the whole value.
fn full_match(regex: &Regex, value: &str) -> bool {
    regex
        .find(value)
        .is_some_and(|found| found.start() == 0 && found.end() == value.len())
}

/// Join rendered segments into a path; no segments is the empty path.
fn join_segments(segments: &[&str]) -> String {
    if segments.is_empty() {
        String::new()
    } else {
        format!("/{}", segments.join("/"))
    }
}

// ============================================================================
// Tests
// ============================================================================
