//! Runtime error types with logging code mapping

use super::store::StoreError;
use crate::grammar::ast::nodes::ValueKind;
use crate::logging::{codes, Code};
use crate::utils::Position;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// A path without wildcards matched no device
    #[error("{position}: unknown device path '{path}'")]
    UnknownPath { position: Position, path: String },

    #[error("{position}: type mismatch: {message}")]
    TypeMismatch { position: Position, message: String },

    #[error("{position}: unbound variable '${name}'")]
    UnboundVariable { position: Position, name: String },

    /// The store refused an `at` or `when` registration
    #[error("{position}: {keyword} registration failed: {reason}")]
    Registration {
        position: Position,
        keyword: &'static str,
        reason: String,
    },

    #[error("{position}: '{path}' matched {count} devices, limit is {limit}")]
    TooManyMatches {
        position: Position,
        path: String,
        count: usize,
        limit: usize,
    },

    #[error("{position}: {source}")]
    Store {
        position: Position,
        source: StoreError,
    },

    /// A node the evaluator has no rule for; the parser never produces one
    /// at statement level
    #[error("{position}: internal error: cannot evaluate {node}")]
    UnknownNode { position: Position, node: &'static str },
}

impl RuntimeError {
    /// Attach a position to a store failure, keeping the specific variants
    /// for the failures users can act on
    pub fn from_store(position: Position, error: StoreError) -> Self {
        match error {
            StoreError::NotFound { address } => Self::UnknownPath {
                position,
                path: address,
            },
            StoreError::TypeMismatch {
                address,
                expected,
                found,
            } => Self::TypeMismatch {
                position,
                message: format!("device '{}' holds a {}, not a {}", address, expected, found),
            },
            other => Self::Store {
                position,
                source: other,
            },
        }
    }

    pub fn kind_mismatch(
        position: Position,
        context: &str,
        expected: ValueKind,
        found: ValueKind,
    ) -> Self {
        Self::TypeMismatch {
            position,
            message: format!("{} expects a {}, found a {}", context, expected, found),
        }
    }

    pub fn error_code(&self) -> Code {
        match self {
            Self::UnknownPath { .. } => codes::runtime::UNKNOWN_PATH,
            Self::TypeMismatch { .. } => codes::runtime::TYPE_MISMATCH,
            Self::UnboundVariable { .. } => codes::runtime::UNBOUND_VARIABLE,
            Self::Registration { .. } => codes::runtime::REGISTRATION_FAILURE,
            Self::TooManyMatches { .. } => codes::runtime::TOO_MANY_MATCHES,
            Self::Store { source, .. } => source.error_code(),
            Self::UnknownNode { .. } => codes::runtime::UNKNOWN_NODE,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Self::UnknownPath { position, .. }
            | Self::TypeMismatch { position, .. }
            | Self::UnboundVariable { position, .. }
            | Self::Registration { position, .. }
            | Self::TooManyMatches { position, .. }
            | Self::Store { position, .. }
            | Self::UnknownNode { position, .. } => *position,
        }
    }

    /// Internal invariant violations, as opposed to user errors
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::UnknownNode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_store_not_found_becomes_unknown_path() {
        let error = RuntimeError::from_store(
            Position::new(4, 1, 5),
            StoreError::NotFound {
                address: "porch.lamp".to_string(),
            },
        );
        assert_matches!(&error, RuntimeError::UnknownPath { path, .. } if path == "porch.lamp");
        assert_eq!(error.to_string(), "1:5: unknown device path 'porch.lamp'");
        assert_eq!(error.error_code(), codes::runtime::UNKNOWN_PATH);
    }

    #[test]
    fn test_unavailable_store_keeps_its_code() {
        let error = RuntimeError::from_store(
            Position::start(),
            StoreError::Unavailable {
                reason: "shut down".to_string(),
            },
        );
        assert_matches!(error, RuntimeError::Store { .. });
        assert_eq!(error.error_code(), codes::runtime::STORE_UNAVAILABLE);
    }

    #[test]
    fn test_unknown_node_is_internal() {
        let error = RuntimeError::UnknownNode {
            position: Position::start(),
            node: "ValueNode",
        };
        assert!(error.is_internal());
        assert_eq!(
            codes::get_severity(error.error_code().as_str()),
            codes::Severity::Critical
        );
    }
}
