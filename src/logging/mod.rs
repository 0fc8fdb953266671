//! Logging infrastructure - structured tracing across the bridge
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable level, overridable from the environment
//! - Zero-cost when disabled
//! - Console output (compact or JSON) plus an optional log file

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use tracing::{debug, error, info, trace, warn};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    /// Log file path, in addition to stdout
    pub log_path: Option<String>,
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: Level::INFO, log_path: None, json_format: false }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `TYPTHON_EXT_LOG_*` variables on top of this config
    pub fn with_env_overrides(mut self) -> Self {
        // TYPTHON_EXT_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("TYPTHON_EXT_LOG_LEVEL") {
            self.level = parse_level(&level).unwrap_or(self.level);
        }

        if let Ok(path) = std::env::var("TYPTHON_EXT_LOG_FILE") {
            self.log_path = Some(path);
        }

        if std::env::var("TYPTHON_EXT_LOG_JSON").is_ok() {
            self.json_format = true;
        }

        self
    }

    /// Verbose config for debugging extension modules
    pub fn debug() -> Self {
        Self { level: Level::TRACE, log_path: None, json_format: false }
    }
}

/// Parse a level name, case-insensitively
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging once; later calls are ignored
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("typthon_ext={}", config.level.as_str().to_lowercase()))
        });

        let console = if config.json_format {
            fmt::layer().json().with_writer(io::stdout).with_target(true).boxed()
        } else {
            fmt::layer()
                .compact()
                .with_writer(io::stdout)
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .boxed()
        };

        let file = config.log_path.as_deref().map(|path| {
            let path = Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "typthon_ext.log".into());
            fmt::layer()
                .with_ansi(false)
                .with_writer(tracing_appender::rolling::never(dir, name))
                .boxed()
        });

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .with(file)
            .try_init();
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Bridge-specific logging functions
// ============================================================================

#[inline]
pub fn log_allocation(size: usize, ptr: *const u8) {
    trace!(target: "allocator", size, ptr = ?ptr, "allocated block");
}

#[inline]
pub fn log_deallocation(size: usize, ptr: *const u8) {
    trace!(target: "allocator", size, ptr = ?ptr, "freed block");
}

#[inline]
pub fn log_dispatch_call(key: &str, args_count: usize) {
    debug!(target: "dispatch", key, args_count, "dispatching into native code");
}

#[inline]
pub fn log_dispatch_error(key: &str, error: &str) {
    debug!(target: "dispatch", key, error, "native call raised");
}

/// Descriptor skipped during shim generation
pub fn log_unsupported_method(qualified_name: &str, flags: i32) {
    warn!(
        target: "dispatch",
        method = qualified_name,
        flags,
        "unsupported method flags; ignoring"
    );
}

pub fn log_sweep_complete(visited: usize, strong: usize, collected: usize) {
    debug!(target: "bridge", visited, strong, collected, "bridged strength sweep complete");
}
