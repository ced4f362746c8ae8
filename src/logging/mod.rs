//! Logging infrastructure - structured tracing for the FFI core
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log level, overridable through `RUST_LOG`
//! - Human-readable or JSON console output
//! - Optional file output through `tracing-appender`
//! - Span-based performance tracking
//!
//! The marshaler and decoder run once per call, so they only emit `trace!`.

use std::io;
use std::path::Path;

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::abi::Abi;
use crate::error::FfiError;

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

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

        // RVFFI_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("RVFFI_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        if let Ok(path) = std::env::var("RVFFI_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("RVFFI_LOG_JSON").is_ok();
        config.show_spans = std::env::var("RVFFI_LOG_SPANS").is_ok();

        if let Ok(val) = std::env::var("RVFFI_LOG_PERF") {
            config.track_performance = is_truthy(&val);
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
            log_path: Some("rvffi.log".to_string()),
            json_format: false,
            show_spans: true,
            track_performance: true,
        }
    }
}

/// Parse a level name, case-insensitive
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn is_truthy(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

/// Initialize logging from the runtime configuration
pub fn init() {
    init_with_config(crate::config::runtime_config().log_config());
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber. A subscriber installed by the
/// host application wins over ours.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        perf::set_enabled(config.track_performance);

        let default_directive = format!("rvffi={}", config.level.as_str().to_lowercase());
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);

        let console = fmt::layer()
            .with_writer(io::stdout)
            .with_span_events(span_events.clone())
            .with_target(true)
            .with_thread_ids(cfg!(debug_assertions))
            .with_line_number(cfg!(debug_assertions));
        layers.push(if config.json_format { console.json().boxed() } else { console.boxed() });

        if let Some(path) = config.log_path.as_deref().filter(|_| config.file_output) {
            let path = Path::new(path);
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| "rvffi.log".as_ref());
            let appender = tracing_appender::rolling::never(directory, file_name);

            let file = fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_span_events(span_events);
            layers.push(if config.json_format { file.json().boxed() } else { file.boxed() });
        }

        let _ = tracing_subscriber::registry()
            .with(layers)
            .with(env_filter)
            .try_init();
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// FFI event helpers
// ============================================================================

/// Log a freshly classified signature
#[inline]
pub fn log_cif_prepared(abi: Abi, nargs: usize, flags: u32, bytes: usize) {
    use tracing::debug;
    debug!(
        event = "cif_prepared",
        abi = %abi,
        nargs = nargs,
        flags = format_args!("{flags:#x}"),
        bytes = bytes,
        "Call interface prepared"
    );
}

/// Log closure trampoline installation
pub fn log_closure_prepared(abi: Abi, codeloc: usize, long_form: bool) {
    use tracing::debug;
    debug!(
        event = "closure_prepared",
        abi = %abi,
        codeloc = format_args!("{codeloc:#x}"),
        long_form = long_form,
        "Closure trampoline written"
    );
}

/// Log an outgoing call
#[inline]
pub fn log_ffi_call(abi: Abi, nargs: usize, bytes: usize) {
    use tracing::trace;
    trace!(
        event = "ffi_call",
        abi = %abi,
        nargs = nargs,
        bytes = bytes,
        "Foreign call dispatched"
    );
}

/// Log argument marshaling
#[inline]
pub fn log_args_marshaled(nargs: usize, bytes: usize) {
    use tracing::trace;
    trace!(
        event = "args_marshaled",
        nargs = nargs,
        bytes = bytes,
        "Argument image written"
    );
}

/// Log closure argument decoding
#[inline]
pub fn log_args_decoded(nargs: usize, return_flags: u32) {
    use tracing::trace;
    trace!(
        event = "args_decoded",
        nargs = nargs,
        return_flags = format_args!("{return_flags:#x}"),
        "Closure arguments decoded"
    );
}

/// Log a rejected construction request
pub fn log_abi_error(operation: &str, error: &FfiError) {
    use tracing::warn;
    warn!(
        event = "ffi_error",
        operation = operation,
        status = error.status() as u32,
        error = %error,
        "FFI construction failed"
    );
}

/// Log a broken runtime invariant right before aborting
pub fn log_invariant_violation(what: &str) {
    use tracing::error;
    error!(
        event = "invariant_violation",
        violation = what,
        "FFI invariant violated, aborting"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;
    use tracing::debug;

    static ENABLED: AtomicBool = AtomicBool::new(false);

    /// Switch duration events on or off; `init_with_config` sets this
    pub fn set_enabled(enabled: bool) {
        ENABLED.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_enabled() -> bool {
        ENABLED.load(Ordering::Relaxed)
    }

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        track_if(operation, is_enabled())
    }

    /// Guard that only measures when `enabled`
    #[must_use]
    pub fn track_if(operation: &'static str, enabled: bool) -> PerformanceGuard {
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
        #[inline]
        pub fn is_active(&self) -> bool {
            self.start.is_some()
        }
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            if let Some(start) = self.start {
                debug!(
                    operation = self.operation,
                    duration_us = start.elapsed().as_micros() as u64,
                    "operation completed"
                );
            }
        }
    }
}
