//! Global logging module for hearth
//!
//! Provides thread-safe global logging with a clean macro interface. Logging
//! before initialization is a silent no-op, so library code can log freely.

pub mod codes;
pub mod config;
pub mod events;
pub mod macros;
pub mod service;

use std::sync::{Arc, OnceLock};

// Re-export main types
pub use codes::Code;
pub use events::{LogEvent, LogLevel};
pub use service::{ConsoleLogger, Logger, LoggingService, MemoryLogger, StructuredLogger};

use crate::utils::Position;

// ============================================================================
// GLOBAL STATE
// ============================================================================

static GLOBAL_LOGGER: OnceLock<Arc<LoggingService>> = OnceLock::new();
static CAPTURE_LOGGER: OnceLock<Arc<MemoryLogger>> = OnceLock::new();

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Initialize global logging system from the runtime preferences
pub fn init_global_logging() -> Result<(), String> {
    let logging_service = Arc::new(service::create_configured_service());

    GLOBAL_LOGGER
        .set(logging_service.clone())
        .map_err(|_| "Global logger already initialized")?;

    logging_service.log_event(LogEvent::success(
        codes::success::SYSTEM_INITIALIZATION_COMPLETED,
        "Global logging system initialized",
    ));

    Ok(())
}

/// Install preferences and initialize in one step (used by the CLI)
pub fn init_with_preferences(
    preferences: crate::config::runtime::LoggingPreferences,
) -> Result<(), String> {
    config::init_runtime_preferences(preferences)?;
    init_global_logging()
}

/// Initialize with custom service (primarily for testing)
pub fn init_global_logging_with_service(service: Arc<LoggingService>) -> Result<(), String> {
    GLOBAL_LOGGER
        .set(service)
        .map_err(|_| "Global logger already initialized")?;

    Ok(())
}

/// Route all global logging into a shared memory logger at debug level.
///
/// The first call installs it; later calls return the same logger. If some
/// other service was installed first, the returned logger receives nothing.
pub fn capture_global_logging() -> Arc<MemoryLogger> {
    CAPTURE_LOGGER
        .get_or_init(|| {
            let memory = Arc::new(MemoryLogger::new());
            let service = LoggingService::new(memory.clone(), LogLevel::Debug);
            let _ = GLOBAL_LOGGER.set(Arc::new(service));
            memory
        })
        .clone()
}

/// Check if global logging is initialized
pub fn is_initialized() -> bool {
    GLOBAL_LOGGER.get().is_some()
}

// ============================================================================
// GLOBAL ACCESS
// ============================================================================

/// Safe access to global logger
pub fn try_get_global_logger() -> Option<&'static LoggingService> {
    GLOBAL_LOGGER.get().map(|service| service.as_ref())
}

// ============================================================================
// MACRO SUPPORT FUNCTIONS
// ============================================================================

/// Log error with context (used by log_error! macro)
pub fn log_error_with_context(
    code: Code,
    message: &str,
    position: Option<Position>,
    context: Vec<(&str, &str)>,
) {
    let Some(logger) = try_get_global_logger() else {
        return;
    };

    let mut event = LogEvent::error(code, message);
    if let Some(p) = position {
        event = event.with_position(p);
    }
    for (key, value) in context {
        event = event.with_context(key, value);
    }

    logger.log_event(event);
}

/// Log success with context (used by log_success! macro)
pub fn log_success_with_context(code: Code, message: &str, context: Vec<(&str, &str)>) {
    let Some(logger) = try_get_global_logger() else {
        return;
    };

    let mut event = LogEvent::success(code, message);
    for (key, value) in context {
        event = event.with_context(key, value);
    }

    logger.log_event(event);
}

/// Log info with context (used by log_info! macro)
pub fn log_info_with_context(message: &str, context: Vec<(&str, &str)>) {
    let Some(logger) = try_get_global_logger() else {
        return;
    };

    let mut event = LogEvent::info(message);
    for (key, value) in context {
        event = event.with_context(key, value);
    }

    logger.log_event(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_reach_captured_logger() {
        let memory = capture_global_logging();
        assert!(is_initialized());

        crate::log_error!(
            codes::dispatch::FIRING_FAILED,
            "macro error",
            position = Position::new(0, 1, 1),
            "trigger" => 7
        );
        crate::log_success!(codes::success::TRIGGER_FIRED, "macro success", "trigger" => 7);
        crate::log_debug!("macro debug", "trigger" => 7);

        let errors = memory.get_events_with_code(codes::dispatch::FIRING_FAILED);
        assert!(errors
            .iter()
            .any(|e| e.message == "macro error"
                && e.position == Some(Position::new(0, 1, 1))
                && e.context.get("trigger").map(String::as_str) == Some("7")));
        assert!(!memory
            .get_events_with_code(codes::success::TRIGGER_FIRED)
            .is_empty());
    }

    #[test]
    fn test_capture_is_idempotent() {
        let first = capture_global_logging();
        let second = capture_global_logging();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
