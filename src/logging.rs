//! Logging abstraction layer.
//!
//! Provides macros that dispatch to either the [`log`](https://docs.rs/log)
//! or [`tracing`](https://docs.rs/tracing) crate depending on which feature
//! is enabled. The two features are **mutually exclusive** — enable at most one.
//!
//! | Feature    | Backend         | Default |
//! |------------|-----------------|---------|
//! | `log`      | `log` crate     | yes     |
//! | `tracing`  | `tracing` crate | no      |
//!
//! On top of the backend macros, the router carries its own [`Logger`] sink.
//! Non-fatal anomalies (a subscriber panicking, a conflicting plugin option,
//! a hook mutating state in place) go through the sink, which filters by
//! [`LogLevel`] and optionally forwards every record to a user callback.
//!
//! ```
//! use wayfarer::logging::{Logger, LogLevel, LoggerOptions};
//!
//! let logger = Logger::new(LoggerOptions::default().with_level(LogLevel::WarnError));
//! logger.warn("browser", "hashPrefix ignored in history mode");
//! ```

use std::fmt;
use std::sync::Arc;

/// Emit a **debug**-level log message.
///
/// Dispatches to `log::debug!` or `tracing::debug!` depending on the
/// enabled feature flag. Accepts `format!`-style arguments.
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        ::tracing::debug!($($arg)*);
        #[cfg(feature = "log")]
        ::log::debug!($($arg)*);
    }};
}

/// Emit a **trace**-level log message.
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        ::tracing::trace!($($arg)*);
        #[cfg(feature = "log")]
        ::log::trace!($($arg)*);
    }};
}

/// Emit an **info**-level log message.
#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        ::tracing::info!($($arg)*);
        #[cfg(feature = "log")]
        ::log::info!($($arg)*);
    }};
}

/// Emit a **warn**-level log message.
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        ::tracing::warn!($($arg)*);
        #[cfg(feature = "log")]
        ::log::warn!($($arg)*);
    }};
}

/// Emit an **error**-level log message.
#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        ::tracing::error!($($arg)*);
        #[cfg(feature = "log")]
        ::log::error!($($arg)*);
    }};
}

// ============================================================================
// Logger sink
// ============================================================================

/// Severity of a single [`Logger`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    /// Informational message.
    Log,
    /// Potentially harmful situation.
    Warn,
    /// Error event the router recovered from.
    Error,
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Which severities the [`Logger`] lets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Everything passes the filter.
    #[default]
    All,
    /// Only warnings and errors.
    WarnError,
    /// Only errors.
    ErrorOnly,
    /// Nothing passes.
    None,
}

impl LogLevel {
    /// Whether a record of the given severity passes this filter.
    pub fn admits(self, severity: LogSeverity) -> bool {
        match self {
            Self::All => true,
            Self::WarnError => severity >= LogSeverity::Warn,
            Self::ErrorOnly => severity == LogSeverity::Error,
            Self::None => false,
        }
    }
}

/// Callback receiving every record that reaches the sink.
pub type LogCallback = Arc<dyn Fn(LogSeverity, &str, &str) + Send + Sync>;

/// Configuration for the router's [`Logger`] sink.
#[derive(Clone, Default)]
pub struct LoggerOptions {
    /// Severity filter applied before emitting.
    pub level: LogLevel,
    /// Optional callback invoked alongside the backend macros.
    pub callback: Option<LogCallback>,
    /// When set, the callback receives records the level filter rejected.
    pub callback_ignores_level: bool,
}

impl LoggerOptions {
    /// Set the severity filter.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Install a callback receiving `(severity, context, message)`.
    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(LogSeverity, &str, &str) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Deliver records to the callback even when the level filter drops them.
    #[must_use]
    pub fn with_callback_ignores_level(mut self, ignore: bool) -> Self {
        self.callback_ignores_level = ignore;
        self
    }
}

impl fmt::Debug for LoggerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerOptions")
            .field("level", &self.level)
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .field("callback_ignores_level", &self.callback_ignores_level)
            .finish()
    }
}

/// Level-filtering sink for non-fatal router anomalies.
///
/// Cheap to clone; clones share the same options.
#[derive(Clone, Debug, Default)]
pub struct Logger {
    options: Arc<LoggerOptions>,
}

impl Logger {
    /// Create a sink from the given options.
    pub fn new(options: LoggerOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    /// Create a sink that drops everything.
    pub fn silent() -> Self {
        Self::new(LoggerOptions::default().with_level(LogLevel::None))
    }

    fn emit(&self, severity: LogSeverity, context: &str, message: &str) {
        let admitted = self.options.level.admits(severity);
        if admitted {
            match severity {
                LogSeverity::Log => info_log!("[{}] {}", context, message),
                LogSeverity::Warn => warn_log!("[{}] {}", context, message),
                LogSeverity::Error => error_log!("[{}] {}", context, message),
            }
        }
        if let Some(callback) = &self.options.callback {
            if admitted || self.options.callback_ignores_level {
                callback(severity, context, message);
            }
        }
    }

    /// Emit an informational record.
    pub fn log(&self, context: &str, message: impl AsRef<str>) {
        self.emit(LogSeverity::Log, context, message.as_ref());
    }

    /// Emit a warning record.
    pub fn warn(&self, context: &str, message: impl AsRef<str>) {
        self.emit(LogSeverity::Warn, context, message.as_ref());
    }

    /// Emit an error record.
    pub fn error(&self, context: &str, message: impl AsRef<str>) {
        self.emit(LogSeverity::Error, context, message.as_ref());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_logger(level: LogLevel, ignores: bool) -> (Logger, Arc<Mutex<Vec<String>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = records.clone();
        let logger = Logger::new(
            LoggerOptions::default()
                .with_level(level)
                .with_callback(move |severity, context, message| {
                    sink.lock()
                        .unwrap()
                        .push(format!("{severity}:{context}:{message}"));
                })
                .with_callback_ignores_level(ignores),
        );
        (logger, records)
    }

    #[test]
    fn test_level_admits() {
        assert!(LogLevel::All.admits(LogSeverity::Log));
        assert!(LogLevel::WarnError.admits(LogSeverity::Warn));
        assert!(!LogLevel::WarnError.admits(LogSeverity::Log));
        assert!(LogLevel::ErrorOnly.admits(LogSeverity::Error));
        assert!(!LogLevel::ErrorOnly.admits(LogSeverity::Warn));
        assert!(!LogLevel::None.admits(LogSeverity::Error));
    }

    #[test]
    fn test_callback_receives_admitted_records() {
        let (logger, records) = recording_logger(LogLevel::All, false);
        logger.log("core", "started");
        logger.warn("browser", "conflicting option");

        let log = records.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], "log:core:started");
        assert_eq!(log[1], "warn:browser:conflicting option");
    }

    #[test]
    fn test_level_filter_drops_records() {
        let (logger, records) = recording_logger(LogLevel::ErrorOnly, false);
        logger.log("core", "ignored");
        logger.warn("core", "ignored");
        logger.error("core", "kept");

        let log = records.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0], "error:core:kept");
    }

    #[test]
    fn test_callback_ignores_level() {
        let (logger, records) = recording_logger(LogLevel::None, true);
        logger.warn("core", "still delivered");

        assert_eq!(records.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_silent_logger() {
        let logger = Logger::silent();
        logger.error("core", "dropped");
    }
}
