// RUNTIME PREFERENCES (User Experience)

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalPreferences {
    /// Whether to log a token summary after each scan
    pub log_token_statistics: bool,
}

impl Default for LexicalPreferences {
    fn default() -> Self {
        Self {
            log_token_statistics: env::var("HEARTH_LEXICAL_LOG_STATISTICS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinePreferences {
    /// Whether the scanner runs on its own thread feeding a bounded queue
    pub concurrent_scanning: bool,

    /// Capacity of the token queue between scanner and parser (clamped to >= 1)
    pub queue_capacity: usize,
}

impl Default for PipelinePreferences {
    fn default() -> Self {
        use crate::config::compile_time::pipeline::DEFAULT_QUEUE_CAPACITY;

        Self {
            concurrent_scanning: env::var("HEARTH_PIPELINE_CONCURRENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            queue_capacity: env::var("HEARTH_PIPELINE_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_QUEUE_CAPACITY)
                .max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationPreferences {
    /// Whether every evaluated statement is logged at debug level
    pub trace_statements: bool,

    /// Upper bound on devices a single path match may address
    pub max_matches_per_path: usize,
}

impl Default for EvaluationPreferences {
    fn default() -> Self {
        use crate::config::compile_time::evaluation::MAX_MATCHES_PER_PATH;

        Self {
            trace_statements: env::var("HEARTH_EVALUATION_TRACE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            // Users may lower the bound but never raise it past the compile-time limit
            max_matches_per_path: env::var("HEARTH_EVALUATION_MAX_MATCHES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .map(|v| v.min(MAX_MATCHES_PER_PATH))
                .unwrap_or(MAX_MATCHES_PER_PATH),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchPreferences {
    /// Number of worker threads running trigger firings
    pub worker_threads: usize,

    /// How long a worker waits for one firing before abandoning it
    pub firing_timeout_ms: u64,
}

impl Default for DispatchPreferences {
    fn default() -> Self {
        use crate::config::compile_time::dispatch::{
            DEFAULT_FIRING_TIMEOUT_MS, MAX_WORKER_THREADS,
        };

        Self {
            worker_threads: env::var("HEARTH_DISPATCH_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(num_cpus::get)
                .clamp(1, MAX_WORKER_THREADS),
            firing_timeout_ms: env::var("HEARTH_DISPATCH_FIRING_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_FIRING_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingPreferences {
    /// Whether to use structured JSON logging
    pub use_structured_logging: bool,

    /// Whether to enable console output
    pub enable_console_logging: bool,

    /// Minimum level that reaches the logger
    pub min_log_level: LogLevel,
}

impl Default for LoggingPreferences {
    fn default() -> Self {
        Self {
            use_structured_logging: env::var("HEARTH_LOGGING_USE_STRUCTURED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            enable_console_logging: env::var("HEARTH_LOGGING_ENABLE_CONSOLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            min_log_level: env::var("HEARTH_LOGGING_MIN_LEVEL")
                .ok()
                .and_then(|v| parse_log_level(&v))
                .unwrap_or(LogLevel::Warning),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Error = 0,
    Warning = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    /// Convert to events::LogLevel for compatibility
    pub fn to_events_log_level(&self) -> crate::logging::events::LogLevel {
        match self {
            LogLevel::Error => crate::logging::events::LogLevel::Error,
            LogLevel::Warning => crate::logging::events::LogLevel::Warning,
            LogLevel::Info => crate::logging::events::LogLevel::Info,
            LogLevel::Debug => crate::logging::events::LogLevel::Debug,
        }
    }
}

/// Parse log level from string (used for environment variables and the CLI)
pub fn parse_log_level(level: &str) -> Option<LogLevel> {
    match level.to_lowercase().as_str() {
        "error" | "0" => Some(LogLevel::Error),
        "warning" | "warn" | "1" => Some(LogLevel::Warning),
        "info" | "2" => Some(LogLevel::Info),
        "debug" | "3" => Some(LogLevel::Debug),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub lexical: LexicalPreferences,
    pub pipeline: PipelinePreferences,
    pub evaluation: EvaluationPreferences,
    pub dispatch: DispatchPreferences,
    pub logging: LoggingPreferences,
}

/// Environment variable names for configuration
pub mod env_vars {
    // Lexical
    pub const LEXICAL_LOG_STATISTICS: &str = "HEARTH_LEXICAL_LOG_STATISTICS";

    // Pipeline
    pub const PIPELINE_CONCURRENT: &str = "HEARTH_PIPELINE_CONCURRENT";
    pub const PIPELINE_QUEUE_CAPACITY: &str = "HEARTH_PIPELINE_QUEUE_CAPACITY";

    // Evaluation
    pub const EVALUATION_TRACE: &str = "HEARTH_EVALUATION_TRACE";
    pub const EVALUATION_MAX_MATCHES: &str = "HEARTH_EVALUATION_MAX_MATCHES";

    // Dispatch
    pub const DISPATCH_WORKERS: &str = "HEARTH_DISPATCH_WORKERS";
    pub const DISPATCH_FIRING_TIMEOUT_MS: &str = "HEARTH_DISPATCH_FIRING_TIMEOUT_MS";

    // Logging
    pub const LOGGING_USE_STRUCTURED: &str = "HEARTH_LOGGING_USE_STRUCTURED";
    pub const LOGGING_ENABLE_CONSOLE: &str = "HEARTH_LOGGING_ENABLE_CONSOLE";
    pub const LOGGING_MIN_LEVEL: &str = "HEARTH_LOGGING_MIN_LEVEL";
}
