//! The device-store collaborator
//!
//! The evaluator only knows this interface. Implementations guarantee atomic
//! read and write per individual address, and deliver registered callbacks
//! for `at` and `when` triggers on their own threads.

use super::value::Value;
use crate::grammar::ast::nodes::{ComparisonOperator, PathMatchNode, PathSegment, ValueKind};
use crate::logging::{codes, Code};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// ADDRESSES AND PATTERNS
// ============================================================================

/// Concrete address of one device, e.g. `living_room.light`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceAddress(Vec<String>);

impl DeviceAddress {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Split a dotted address; `None` if any segment is empty
    pub fn parse(text: &str) -> Option<Self> {
        let segments: Vec<String> = text.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Address pattern handed to `resolve`: literal segments and `*`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathPattern {
    segments: Vec<PathSegment>,
}

impl PathPattern {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, PathSegment::Wildcard))
    }

    /// Segment-exact, case-sensitive match of a full address
    pub fn matches(&self, address: &DeviceAddress) -> bool {
        self.segments.len() == address.segments().len()
            && self
                .segments
                .iter()
                .zip(address.segments())
                .all(|(pattern, actual)| match pattern {
                    PathSegment::Wildcard => true,
                    PathSegment::Literal(word) => word == actual,
                })
    }
}

impl From<&PathMatchNode> for PathPattern {
    fn from(node: &PathMatchNode) -> Self {
        Self::new(node.segments.clone())
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

// ============================================================================
// REGISTRATIONS
// ============================================================================

/// Store-issued id of a scheduled or subscribed trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationId(pub u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A `when` condition with its value already resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub pattern: PathPattern,
    pub operator: ComparisonOperator,
    pub value: Value,
}

impl Condition {
    pub fn is_satisfied_by(&self, current: &Value) -> bool {
        current
            .compare(self.operator, &self.value)
            .unwrap_or(false)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.pattern, self.operator, self.value)
    }
}

/// Why a callback runs
#[derive(Debug, Clone, PartialEq)]
pub enum FiringCause {
    /// An `at` deadline was reached
    Scheduled { at: NaiveTime },
    /// A `when` condition became true for `address`
    ConditionMet { address: DeviceAddress, value: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub registration: RegistrationId,
    pub cause: FiringCause,
}

pub type TriggerCallback = Arc<dyn Fn(&Firing) + Send + Sync>;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("no device at '{address}'")]
    NotFound { address: String },

    #[error("device '{address}' holds a {expected}, not a {found}")]
    TypeMismatch {
        address: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("registration failed: {reason}")]
    Registration { reason: String },

    #[error("device store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StoreError {
    pub fn error_code(&self) -> Code {
        match self {
            Self::NotFound { .. } => codes::runtime::UNKNOWN_PATH,
            Self::TypeMismatch { .. } => codes::runtime::TYPE_MISMATCH,
            Self::Registration { .. } => codes::runtime::REGISTRATION_FAILURE,
            Self::Unavailable { .. } => codes::runtime::STORE_UNAVAILABLE,
        }
    }
}

// ============================================================================
// INTERFACE
// ============================================================================

pub trait DeviceStore: Send + Sync {
    /// Every address matching `pattern`, in a stable order
    fn resolve(&self, pattern: &PathPattern) -> Result<Vec<DeviceAddress>, StoreError>;

    fn read(&self, address: &DeviceAddress) -> Result<Value, StoreError>;

    fn write(&self, address: &DeviceAddress, value: Value) -> Result<(), StoreError>;

    /// Run `callback` once at the next occurrence of `time`
    fn schedule_at(
        &self,
        time: NaiveTime,
        callback: TriggerCallback,
    ) -> Result<RegistrationId, StoreError>;

    /// Run `callback` each time `condition` becomes satisfied for a matching address
    fn subscribe_when(
        &self,
        condition: Condition,
        callback: TriggerCallback,
    ) -> Result<RegistrationId, StoreError>;

    /// Remove a pending registration
    fn cancel(&self, registration: RegistrationId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(text: &str) -> PathPattern {
        PathPattern::new(
            text.split('.')
                .map(|s| match s {
                    "*" => PathSegment::Wildcard,
                    other => PathSegment::Literal(other.to_string()),
                })
                .collect(),
        )
    }

    #[test]
    fn test_pattern_matching_is_segment_exact() {
        let address = DeviceAddress::parse("room.kitchen.light").unwrap();
        assert!(pattern("room.kitchen.light").matches(&address));
        assert!(pattern("room.*.light").matches(&address));
        assert!(!pattern("room.*").matches(&address));
        assert!(!pattern("room.kit.light").matches(&address));
        assert!(!pattern("Room.kitchen.light").matches(&address));
    }

    #[test]
    fn test_address_parsing() {
        assert_eq!(
            DeviceAddress::parse("porch.light").unwrap().to_string(),
            "porch.light"
        );
        assert!(DeviceAddress::parse("porch.").is_none());
        assert!(DeviceAddress::parse("").is_none());
    }

    #[test]
    fn test_condition_satisfaction() {
        let condition = Condition {
            pattern: pattern("hall.temperature"),
            operator: ComparisonOperator::Greater,
            value: Value::Number(25.0),
        };
        assert!(condition.is_satisfied_by(&Value::Number(26.0)));
        assert!(!condition.is_satisfied_by(&Value::Number(25.0)));
        assert!(!condition.is_satisfied_by(&Value::word("hot")));
        assert_eq!(condition.to_string(), "hall.temperature > 25");
    }

    #[test]
    fn test_store_error_codes() {
        let error = StoreError::TypeMismatch {
            address: "porch.light".to_string(),
            expected: ValueKind::Word,
            found: ValueKind::Number,
        };
        assert_eq!(error.error_code(), codes::runtime::TYPE_MISMATCH);
        assert_eq!(
            error.to_string(),
            "device 'porch.light' holds a word, not a number"
        );
    }
}
