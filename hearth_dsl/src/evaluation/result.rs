//! Structured evaluation results
//!
//! The evaluator never prints. Callers decide how to show a result;
//! `render()` is the plain-text form the REPL uses.

use super::store::DeviceAddress;
use super::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One device's value as seen by a wildcard `get`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub address: DeviceAddress,
    pub value: Value,
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.address, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EvalResult {
    /// `set`, `var`, `at`, `when`, or an empty program
    Unit { summary: String },
    /// Non-wildcard `get`
    Value { value: Value },
    /// Wildcard `get`, one entry per matched device
    Readings { readings: Vec<Reading> },
}

impl EvalResult {
    pub fn unit() -> Self {
        Self::Unit {
            summary: String::new(),
        }
    }

    pub fn summary(text: impl Into<String>) -> Self {
        Self::Unit {
            summary: text.into(),
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Self::Unit { .. })
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value { value } => Some(value),
            _ => None,
        }
    }

    /// Human-readable form, `None` when there is nothing to show
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Unit { summary } if summary.is_empty() => None,
            Self::Unit { summary } => Some(summary.clone()),
            Self::Value { value } => Some(value.to_string()),
            Self::Readings { readings } if readings.is_empty() => None,
            Self::Readings { readings } => Some(
                readings
                    .iter()
                    .map(Reading::to_string)
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(EvalResult::unit().render(), None);
        assert_eq!(
            EvalResult::summary("scheduled #1 at 17:30").render().as_deref(),
            Some("scheduled #1 at 17:30")
        );
        assert_eq!(
            EvalResult::Value {
                value: Value::word("on")
            }
            .render()
            .as_deref(),
            Some("on")
        );

        let readings = vec![
            Reading {
                address: DeviceAddress::parse("room.a.light").unwrap(),
                value: Value::word("off"),
            },
            Reading {
                address: DeviceAddress::parse("room.b.light").unwrap(),
                value: Value::Number(40.0),
            },
        ];
        assert_eq!(
            EvalResult::Readings { readings }.render().as_deref(),
            Some("room.a.light = off\nroom.b.light = 40")
        );
        assert_eq!(EvalResult::Readings { readings: vec![] }.render(), None);
    }
}
