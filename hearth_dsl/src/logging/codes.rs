//! Consolidated error codes and classification system
//!
//! Single source of truth for all error codes, their metadata, and classification functions.
//! This module combines code constants with their behavioral metadata in one place.

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// CODE WRAPPER TYPE
// ============================================================================

/// Universal code wrapper for both error and success codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(&'static str);

impl Code {
    pub const fn new(code: &'static str) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ERROR CLASSIFICATION TYPES
// ============================================================================

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }
}

/// Complete metadata for an error code
#[derive(Debug, Clone)]
pub struct ErrorMetadata {
    pub code: &'static str,
    pub category: &'static str,
    pub severity: Severity,
    pub recoverable: bool,
    pub description: &'static str,
    pub recommended_action: &'static str,
}

impl ErrorMetadata {
    pub fn new(
        code: &'static str,
        category: &'static str,
        severity: Severity,
        recoverable: bool,
        description: &'static str,
        recommended_action: &'static str,
    ) -> Self {
        Self {
            code,
            category,
            severity,
            recoverable,
            description,
            recommended_action,
        }
    }
}

// ============================================================================
// ERROR CODE CONSTANTS
// ============================================================================

/// System error codes
pub mod system {
    use super::Code;

    pub const INTERNAL_ERROR: Code = Code::new("ERR001");
    pub const INITIALIZATION_FAILURE: Code = Code::new("ERR002");
}

/// Lexical error codes
pub mod lexical {
    use super::Code;

    pub const INVALID_CHARACTER: Code = Code::new("E020");
    pub const SCAN_FAILED: Code = Code::new("E021");
    pub const MALFORMED_LITERAL: Code = Code::new("E022");
    pub const WORD_TOO_LONG: Code = Code::new("E023");
    pub const TOO_MANY_TOKENS: Code = Code::new("E027");
}

/// Syntax error codes
pub mod syntax {
    use super::Code;

    pub const INVALID_LITERAL: Code = Code::new("E043");
    pub const UNEXPECTED_TOKEN: Code = Code::new("E050");
    pub const MAX_NESTING_DEPTH: Code = Code::new("E087");
}

/// Runtime (evaluation) error codes
pub mod runtime {
    use super::Code;

    pub const UNKNOWN_PATH: Code = Code::new("E110");
    pub const UNBOUND_VARIABLE: Code = Code::new("E111");
    pub const TYPE_MISMATCH: Code = Code::new("E180");
    pub const TOO_MANY_MATCHES: Code = Code::new("E181");
    pub const REGISTRATION_FAILURE: Code = Code::new("E190");
    pub const STORE_UNAVAILABLE: Code = Code::new("E191");
    pub const UNKNOWN_NODE: Code = Code::new("E199");
}

/// Trigger firing and dispatch codes
pub mod dispatch {
    use super::Code;

    pub const FIRING_FAILED: Code = Code::new("E300");
    pub const FIRING_TIMEOUT: Code = Code::new("E301");
    pub const DEVICE_FILE_ERROR: Code = Code::new("E310");
}

/// Success codes
pub mod success {
    use super::Code;

    pub const SYSTEM_INITIALIZATION_COMPLETED: Code = Code::new("I001");
    pub const SCAN_COMPLETE: Code = Code::new("I010");
    pub const PARSE_COMPLETE: Code = Code::new("I020");
    pub const EVALUATION_COMPLETE: Code = Code::new("I030");
    pub const TRIGGER_REGISTERED: Code = Code::new("I040");
    pub const TRIGGER_FIRED: Code = Code::new("I041");
    pub const DEVICES_LOADED: Code = Code::new("I050");
}

// ============================================================================
// ERROR METADATA REGISTRY
// ============================================================================

/// Error metadata registry using OnceLock for thread safety
static ERROR_REGISTRY: OnceLock<HashMap<&'static str, ErrorMetadata>> = OnceLock::new();

/// Initialize and get the error registry
fn get_error_registry() -> &'static HashMap<&'static str, ErrorMetadata> {
    ERROR_REGISTRY.get_or_init(|| {
        let entries = [
            // System errors
            ErrorMetadata::new(
                "ERR001",
                "System",
                Severity::Critical,
                false,
                "Internal invariant violated",
                "File a bug report with the input that triggered it",
            ),
            ErrorMetadata::new(
                "ERR002",
                "System",
                Severity::Critical,
                false,
                "System initialization failure",
                "Check configuration and environment variables",
            ),
            // Lexical errors
            ErrorMetadata::new(
                "E020",
                "Lexical",
                Severity::Medium,
                true,
                "Unrecognized character in input",
                "Remove or replace the character",
            ),
            ErrorMetadata::new(
                "E021",
                "Lexical",
                Severity::Medium,
                true,
                "Scanning halted on malformed input",
                "Fix the input at the reported position and resubmit",
            ),
            ErrorMetadata::new(
                "E022",
                "Lexical",
                Severity::Medium,
                true,
                "Malformed number, time or duration literal",
                "Write times as HH:MM and durations as a number followed by s, m, h or d",
            ),
            ErrorMetadata::new(
                "E023",
                "Lexical",
                Severity::Medium,
                true,
                "Word exceeds the maximum length",
                "Use a shorter device or variable name",
            ),
            ErrorMetadata::new(
                "E027",
                "Lexical",
                Severity::High,
                true,
                "Input produced too many tokens",
                "Split the program into smaller inputs",
            ),
            // Syntax errors
            ErrorMetadata::new(
                "E043",
                "Syntax",
                Severity::Medium,
                true,
                "Literal is well-formed but not valid in this position",
                "Use a 12-hour clock value with am/pm, or drop the suffix",
            ),
            ErrorMetadata::new(
                "E050",
                "Syntax",
                Severity::Medium,
                true,
                "Unexpected token",
                "Check the statement against the grammar: set, get, var, at, when",
            ),
            ErrorMetadata::new(
                "E087",
                "Syntax",
                Severity::High,
                true,
                "Blocks nested too deeply",
                "Flatten nested at/when blocks",
            ),
            // Runtime errors
            ErrorMetadata::new(
                "E110",
                "Runtime",
                Severity::Medium,
                true,
                "Device path does not match any device",
                "Check the device name with a wildcard get",
            ),
            ErrorMetadata::new(
                "E111",
                "Runtime",
                Severity::Medium,
                true,
                "Variable referenced before it was bound",
                "Bind the variable with var earlier in the same program",
            ),
            ErrorMetadata::new(
                "E180",
                "Runtime",
                Severity::Medium,
                true,
                "Value kind incompatible with target",
                "Use a value of the same kind the device already holds",
            ),
            ErrorMetadata::new(
                "E181",
                "Runtime",
                Severity::Medium,
                true,
                "Path matched more devices than allowed",
                "Narrow the wildcard or raise HEARTH_EVALUATION_MAX_MATCHES",
            ),
            ErrorMetadata::new(
                "E190",
                "Runtime",
                Severity::High,
                true,
                "Trigger registration failed",
                "Check that the device store scheduler is running",
            ),
            ErrorMetadata::new(
                "E191",
                "Runtime",
                Severity::High,
                true,
                "Device store unavailable",
                "Check the device store connection",
            ),
            ErrorMetadata::new(
                "E199",
                "Runtime",
                Severity::Critical,
                false,
                "Evaluator received a node it cannot execute",
                "File a bug report: grammar and evaluator disagree",
            ),
            // Dispatch errors
            ErrorMetadata::new(
                "E300",
                "Dispatch",
                Severity::Medium,
                true,
                "Trigger body failed while firing",
                "Inspect the trigger body and the devices it addresses",
            ),
            ErrorMetadata::new(
                "E301",
                "Dispatch",
                Severity::High,
                true,
                "Trigger firing exceeded its timeout",
                "Avoid long-running work in trigger bodies or raise the firing timeout",
            ),
            ErrorMetadata::new(
                "E310",
                "Dispatch",
                Severity::High,
                true,
                "Device file could not be loaded",
                "Check the device file path and its TOML syntax",
            ),
        ];

        entries.into_iter().map(|meta| (meta.code, meta)).collect()
    })
}

// ============================================================================
// CLASSIFICATION FUNCTIONS
// ============================================================================

/// Get error metadata for a specific error code
pub fn get_error_metadata(code: &str) -> Option<&'static ErrorMetadata> {
    get_error_registry().get(code)
}

/// Get error severity from error code
pub fn get_severity(code: &str) -> Severity {
    get_error_registry()
        .get(code)
        .map(|metadata| metadata.severity)
        .unwrap_or(Severity::Medium)
}

/// Check if error is recoverable
pub fn is_recoverable(code: &str) -> bool {
    get_error_registry()
        .get(code)
        .map(|metadata| metadata.recoverable)
        .unwrap_or(true)
}

/// Get human-readable description for error code
pub fn get_description(code: &str) -> &'static str {
    get_error_registry()
        .get(code)
        .map(|metadata| metadata.description)
        .unwrap_or("Unknown error")
}

/// Get recommended action for error code
pub fn get_action(code: &str) -> &'static str {
    get_error_registry()
        .get(code)
        .map(|metadata| metadata.recommended_action)
        .unwrap_or("No specific action available")
}

/// Get error category from error code
pub fn get_category(code: &str) -> &'static str {
    get_error_registry()
        .get(code)
        .map(|metadata| metadata.category)
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_error_code_has_metadata() {
        let codes = [
            system::INTERNAL_ERROR,
            system::INITIALIZATION_FAILURE,
            lexical::INVALID_CHARACTER,
            lexical::SCAN_FAILED,
            lexical::MALFORMED_LITERAL,
            lexical::WORD_TOO_LONG,
            lexical::TOO_MANY_TOKENS,
            syntax::INVALID_LITERAL,
            syntax::UNEXPECTED_TOKEN,
            syntax::MAX_NESTING_DEPTH,
            runtime::UNKNOWN_PATH,
            runtime::UNBOUND_VARIABLE,
            runtime::TYPE_MISMATCH,
            runtime::TOO_MANY_MATCHES,
            runtime::REGISTRATION_FAILURE,
            runtime::STORE_UNAVAILABLE,
            runtime::UNKNOWN_NODE,
            dispatch::FIRING_FAILED,
            dispatch::FIRING_TIMEOUT,
            dispatch::DEVICE_FILE_ERROR,
        ];

        for code in codes {
            assert!(
                get_error_metadata(code.as_str()).is_some(),
                "missing metadata for {}",
                code
            );
        }
    }

    #[test]
    fn test_unknown_code_fallbacks() {
        assert_eq!(get_description("NOPE"), "Unknown error");
        assert_eq!(get_category("NOPE"), "Unknown");
        assert_eq!(get_severity("NOPE"), Severity::Medium);
        assert!(is_recoverable("NOPE"));
    }

    #[test]
    fn test_unknown_node_is_not_recoverable() {
        assert!(!is_recoverable(runtime::UNKNOWN_NODE.as_str()));
        assert_eq!(get_severity(runtime::UNKNOWN_NODE.as_str()), Severity::Critical);
    }
}
