//! Logging infrastructure - structured tracing for resolution, layout and callbacks
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels per module
//! - Zero-cost when disabled
//! - Optional JSON output
//! - Console or non-blocking file output

use crate::error::MarshalError;
use crate::types::{CallbackSignature, SignatureType};
use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Global logging state; holds the file writer's flush guard
static LOGGER_INITIALIZED: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
    /// Enable performance tracking
    pub track_performance: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
            track_performance: cfg!(debug_assertions),
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // NATIVECALL_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("NATIVECALL_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        // NATIVECALL_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("NATIVECALL_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("NATIVECALL_LOG_JSON").is_ok();
        config.show_spans = std::env::var("NATIVECALL_LOG_SPANS").is_ok();

        if let Ok(val) = std::env::var("NATIVECALL_LOG_PERF") {
            config.track_performance = val == "1" || val.to_lowercase() == "true";
        }

        config
    }

    /// Create high-performance config (minimal logging)
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
            track_performance: false,
        }
    }

    /// Create debug config (verbose logging)
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("nativecall.log".to_string()),
            json_format: false,
            show_spans: true,
            track_performance: true,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with default configuration
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration.
///
/// Only the first call installs a subscriber. If the host application already
/// installed one, ours is skipped.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        perf::set_enabled(config.track_performance);

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("nativecall={}", config.level.as_str().to_lowercase())));

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let (writer, guard) = match config.log_path.as_deref() {
            Some(path) if config.file_output => {
                let path = Path::new(path);
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .map(|name| name.to_os_string())
                    .unwrap_or_else(|| "nativecall.log".into());
                let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
                (BoxMakeWriter::new(writer), Some(guard))
            }
            _ => (BoxMakeWriter::new(io::stdout), None),
        };

        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_ids(cfg!(debug_assertions))
            .with_line_number(cfg!(debug_assertions));

        let registry = tracing_subscriber::registry().with(env_filter);
        let installed = if config.json_format {
            registry.with(layer.json()).try_init()
        } else {
            registry.with(layer).try_init()
        };
        if installed.is_err() {
            tracing::debug!(event = "logging_skipped", "global subscriber already installed");
        }

        guard
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Engine-specific logging functions
// ============================================================================

/// Log native memory allocation
#[inline]
pub fn log_allocation(size: usize, ptr: *const u8) {
    use tracing::trace;
    trace!(
        event = "allocation",
        size_bytes = size,
        address = ?ptr,
        "Native memory allocated"
    );
}

/// Log native memory deallocation
#[inline]
pub fn log_deallocation(size: usize, ptr: *const u8) {
    use tracing::trace;
    trace!(
        event = "deallocation",
        size_bytes = size,
        address = ?ptr,
        "Native memory released"
    );
}

/// Log a freshly computed aggregate layout
pub fn log_layout_computed(name: &str, size: usize, alignment: usize, fields: usize) {
    use tracing::debug;
    debug!(
        event = "layout_computed",
        aggregate = name,
        size_bytes = size,
        alignment = alignment,
        fields = fields,
        "Aggregate layout computed"
    );
}

/// Log a signature resolution (not cache hits)
pub fn log_resolution(direction: &str, ty: &SignatureType, rule: Option<&str>) {
    use tracing::trace;
    trace!(
        event = "resolution",
        direction = direction,
        signature = %ty,
        rule = rule.unwrap_or("none"),
        "Signature type resolved"
    );
}

/// Log a callable bound to a new closure record
pub fn log_closure_bound(id: usize, address: usize, signature: &CallbackSignature) {
    use tracing::debug;
    debug!(
        event = "closure_bound",
        closure_id = id,
        address = format_args!("{:#x}", address),
        signature = %signature,
        "Closure record created"
    );
}

/// Log a closure record being unregistered
pub fn log_closure_disposed(id: usize, address: usize) {
    use tracing::debug;
    debug!(
        event = "closure_disposed",
        closure_id = id,
        address = format_args!("{:#x}", address),
        "Closure record disposed"
    );
}

/// Log a callback that returned an error to native code
pub fn log_callback_failed(address: usize, error: &MarshalError) {
    use tracing::error;
    error!(
        event = "callback_failed",
        address = format_args!("{:#x}", address),
        error = %error,
        "Callback failed, returning zero to native caller"
    );
}

/// Log a callback that panicked
pub fn log_callback_panicked(address: usize, message: &str) {
    use tracing::error;
    error!(
        event = "callback_panicked",
        address = format_args!("{:#x}", address),
        panic = message,
        "Callback panicked, returning zero to native caller"
    );
}

/// Log a thread entering its outermost callback
pub fn log_thread_attached() {
    use tracing::trace;
    trace!(event = "thread_attached", "Thread attached for callback");
}

/// Log a thread leaving its outermost callback
pub fn log_thread_detached() {
    use tracing::trace;
    trace!(event = "thread_detached", "Thread detached after callback");
}

/// Performance tracking utilities
pub mod perf {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;
    use tracing::debug;

    // Until logging is initialized, follow the `LogConfig` default
    static ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));

    /// Turn duration events on or off (`LogConfig::track_performance`)
    pub fn set_enabled(enabled: bool) {
        ENABLED.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled() -> bool {
        ENABLED.load(Ordering::Relaxed)
    }

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        track_when(operation, is_enabled())
    }

    /// Like [`track`], with tracking decided by the caller
    #[must_use]
    pub fn track_when(operation: &'static str, enabled: bool) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: enabled.then(Instant::now),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Option<Instant>,
    }

    impl PerformanceGuard {
        /// Whether dropping the guard emits a duration event
        pub fn is_active(&self) -> bool {
            self.start.is_some()
        }
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let Some(start) = self.start else {
                return;
            };
            debug!(
                operation = self.operation,
                duration_us = start.elapsed().as_micros() as u64,
                "operation completed"
            );
        }
    }
}
