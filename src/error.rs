//! Error handling for the router.
//!
//! This module defines [`RouterError`] — the single error type returned by
//! every fallible router operation — and [`ErrorCode`], the closed set of
//! string-constant codes callers can match on:
//!
//! | Code | Meaning |
//! |------|---------|
//! | `ROUTE_NOT_FOUND` | name→path or path→state lookup failed |
//! | `CANNOT_DEACTIVATE` | a deactivation guard blocked or threw |
//! | `CANNOT_ACTIVATE` | an activation guard blocked or threw |
//! | `TRANSITION_ERR` | middleware failed |
//! | `TRANSITION_CANCELLED` | superseded by another navigation or `stop()` |
//! | `CONSTRAINT_VIOLATION` | a param value failed its inline constraint |
//! | `INVALID_OPTION` | bad configuration at construction |
//! | `DUPLICATE_ROUTE` | sibling name or path collision |
//! | `INVALID_ROUTE` | malformed route definition |
//! | `SAME_STATE` | navigation to the current state without reload |
//! | `ROUTER_NOT_STARTED` | navigation before `start()` |
//!
//! # Examples
//!
//! ```
//! use wayfarer::error::{ErrorCode, RouterError};
//!
//! let err = RouterError::new(ErrorCode::CannotDeactivate).with_segment("users.view");
//! assert_eq!(err.code, ErrorCode::CannotDeactivate);
//! assert_eq!(err.segment.as_deref(), Some("users.view"));
//! assert!(err.to_string().contains("CANNOT_DEACTIVATE"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Result alias used across the crate.
pub type RouterResult<T> = Result<T, RouterError>;

/// Closed set of router error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Route name or path lookup failed.
    RouteNotFound,
    /// A deactivation guard returned false or failed.
    CannotDeactivate,
    /// An activation guard returned false or failed.
    CannotActivate,
    /// Middleware failed or returned an error.
    TransitionErr,
    /// The transition was superseded or the router stopped.
    TransitionCancelled,
    /// A parameter value failed its inline constraint during path building.
    ConstraintViolation,
    /// Invalid configuration value.
    InvalidOption,
    /// Two sibling routes share a name or a path.
    DuplicateRoute,
    /// Malformed route definition.
    InvalidRoute,
    /// Navigation target equals the current state and reload was not requested.
    SameState,
    /// Navigation was attempted before `start()`.
    RouterNotStarted,
}

impl ErrorCode {
    /// The wire-stable string constant for this code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RouteNotFound => "ROUTE_NOT_FOUND",
            Self::CannotDeactivate => "CANNOT_DEACTIVATE",
            Self::CannotActivate => "CANNOT_ACTIVATE",
            Self::TransitionErr => "TRANSITION_ERR",
            Self::TransitionCancelled => "TRANSITION_CANCELLED",
            Self::ConstraintViolation => "CONSTRAINT_VIOLATION",
            Self::InvalidOption => "INVALID_OPTION",
            Self::DuplicateRoute => "DUPLICATE_ROUTE",
            Self::InvalidRoute => "INVALID_ROUTE",
            Self::SameState => "SAME_STATE",
            Self::RouterNotStarted => "ROUTER_NOT_STARTED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata keys owned by the error itself; foreign metadata under these
/// names is dropped when wrapping.
const RESERVED_KEYS: &[&str] = &["code", "segment", "path", "redirect"];

/// Structured router error.
///
/// Carries a [code](ErrorCode), optional location fields, a human-readable
/// message, an optional source error, and free-form metadata. Cloneable so
/// it can fan out to every subscriber of a failed transition.
#[derive(Clone)]
pub struct RouterError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Dot-qualified segment the error is attached to, if any.
    pub segment: Option<String>,
    /// Path involved in the failure, if any.
    pub path: Option<String>,
    /// Redirect target recorded by the pipeline, if any.
    pub redirect: Option<String>,
    /// Human-readable description.
    pub message: Option<String>,
    /// Underlying error, when this error wraps a foreign one.
    pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    /// Free-form metadata; reserved keys are filtered out on insertion.
    pub metadata: BTreeMap<String, String>,
}

impl RouterError {
    /// Create an error with the given code and no further context.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            segment: None,
            path: None,
            redirect: None,
            message: None,
            cause: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach the segment name the error belongs to.
    #[must_use]
    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = Some(segment.into());
        self
    }

    /// Attach the path involved in the failure.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach a redirect target.
    #[must_use]
    pub fn with_redirect(mut self, redirect: impl Into<String>) -> Self {
        self.redirect = Some(redirect.into());
        self
    }

    /// Attach a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach a metadata entry. Reserved keys (`code`, `segment`, `path`,
    /// `redirect`) are silently dropped.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if !RESERVED_KEYS.contains(&key.as_str()) {
            self.metadata.insert(key, value.into());
        }
        self
    }

    /// Replace the code, keeping all other context. Used by the transition
    /// pipeline to stamp phase codes onto re-thrown errors.
    #[must_use]
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    /// Wrap a foreign error into a `TRANSITION_ERR`, preserving its message
    /// and keeping it reachable through [`std::error::Error::source`].
    pub fn wrap<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let message = error.to_string();
        Self::new(ErrorCode::TransitionErr)
            .with_message(message)
            .with_cause(Arc::new(error))
    }

    /// Attach an already-shared source error.
    #[must_use]
    pub fn with_cause(mut self, cause: Arc<dyn std::error::Error + Send + Sync>) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Shorthand for a `ROUTE_NOT_FOUND` error naming the missing route.
    pub fn route_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorCode::RouteNotFound).with_message(format!("no route named '{name}'"))
    }
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(segment) = &self.segment {
            write!(f, " at '{segment}'")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path '{path}')")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterError")
            .field("code", &self.code)
            .field("segment", &self.segment)
            .field("path", &self.path)
            .field("redirect", &self.redirect)
            .field("message", &self.message)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl std::error::Error for RouterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl PartialEq for RouterError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.segment == other.segment
            && self.path == other.path
            && self.redirect == other.redirect
            && self.message == other.message
    }
}

// ============================================================================
// Tests
// ============================================================================
