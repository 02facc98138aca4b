//! Logging infrastructure - structured tracing for marshalling events
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log level, overridable through `RUST_LOG`
//! - Zero-cost when no subscriber is installed
//! - Console or daily-rolling file output, human-readable or JSON

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use tracing::{debug, error, info, trace, warn};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path; console output when unset
    pub log_path: Option<String>,
    /// JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span enter/close events
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // TYPTHON_MARSHAL_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("TYPTHON_MARSHAL_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        if let Ok(path) = std::env::var("TYPTHON_MARSHAL_LOG_FILE") {
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("TYPTHON_MARSHAL_LOG_JSON").is_ok();
        config.show_spans = std::env::var("TYPTHON_MARSHAL_LOG_SPANS").is_ok();

        config
    }

    /// Verbose config for debugging ownership problems
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: None,
            json_format: false,
            show_spans: true,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_json(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging from the environment
pub fn init() -> Option<WorkerGuard> {
    init_with_config(LogConfig::from_env())
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber. File output returns a guard
/// that must stay alive until shutdown so buffered lines are flushed.
pub fn init_with_config(config: LogConfig) -> Option<WorkerGuard> {
    let mut guard = None;
    LOGGER_INITIALIZED.get_or_init(|| {
        guard = install(&config);
    });
    guard
}

fn install(config: &LogConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "typthon_marshal={}",
            config.level.as_str().to_lowercase()
        ))
    });

    let span_events = if config.show_spans {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let (writer, guard) = match &config.log_path {
        Some(path) => {
            let path = std::path::Path::new(path);
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let prefix = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "typthon_marshal.log".to_string());
            let (writer, guard) =
                tracing_appender::non_blocking(rolling::daily(directory, prefix));
            (writer, Some(guard))
        }
        None => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            (writer, Some(guard))
        }
    };

    let layer = if config.json_format {
        fmt::layer()
            .with_writer(writer)
            .json()
            .with_span_events(span_events)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_ids(cfg!(debug_assertions))
            .with_line_number(cfg!(debug_assertions))
            .boxed()
    };

    // Another subscriber may already be installed by the embedding program
    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .ok()?;

    guard
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Marshalling events
// ============================================================================

/// Log a value conversion
#[inline]
pub fn log_conversion(direction: &str, tag: &str) {
    trace!(event = "conversion", direction, tag, "value converted");
}

/// Log a transfer mode that is accepted but probably wrong
#[inline]
pub fn log_transfer_warning(tag: &str, transfer: &str, detail: &str) {
    warn!(
        event = "transfer_warning",
        tag,
        transfer,
        detail,
        "suspicious ownership transfer"
    );
}

/// Log a release decision
#[inline]
pub fn log_release(tag: &str, direction: &str, transfer: &str) {
    trace!(event = "release", tag, direction, transfer, "slot released");
}

/// Log trampoline creation
pub fn log_trampoline_created(id: u64, callback: &str, scope: &str) {
    debug!(
        event = "trampoline_created",
        id,
        callback,
        scope,
        "trampoline created"
    );
}

/// Log trampoline release
pub fn log_trampoline_freed(id: u64, reason: &str) {
    debug!(event = "trampoline_freed", id, reason, "trampoline freed");
}

/// Log a failure inside a host callback
pub fn log_callback_error(callback: &str, error: &str) {
    error!(
        event = "callback_error",
        callback,
        error,
        "host callback failed"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            debug!(
                operation = self.operation,
                duration_us = self.start.elapsed().as_micros() as u64,
                "operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(config.log_path.is_none());

        let debug_config = LogConfig::debug();
        assert_eq!(debug_config.level, Level::TRACE);
        assert!(debug_config.show_spans);

        let custom = LogConfig::default()
            .with_level(Level::WARN)
            .with_file("/tmp/marshal.log")
            .with_json(true);
        assert_eq!(custom.level, Level::WARN);
        assert!(custom.json_format);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn test_init_idempotent() {
        let _guard = init();
        let _again = init();
        assert!(is_initialized());
    }

    #[test]
    fn test_logging_functions() {
        log_conversion("to_host", "int32");
        log_transfer_warning("utf8", "everything", "test");
        log_release("array", "in", "nothing");
        log_trampoline_created(1, "Test.callback", "call");
        log_trampoline_freed(1, "call scope");
        log_callback_error("Test.callback", "boom");
        let _t = perf::track("noop");
    }
}
