//! Runtime values held by devices and variables

use crate::grammar::ast::nodes::{ComparisonOperator, ValueKind};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Time(NaiveTime),
    Duration(Duration),
    Word(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Time(_) => ValueKind::Time,
            Self::Duration(_) => ValueKind::Duration,
            Self::Word(_) => ValueKind::Word,
        }
    }

    pub fn word(text: impl Into<String>) -> Self {
        Self::Word(text.into())
    }

    /// Interpret a literal of a known kind. Variables have no literal value.
    pub fn from_literal(kind: ValueKind, literal: &str) -> Result<Self, String> {
        match kind {
            ValueKind::Number => literal
                .parse::<f64>()
                .map(Self::Number)
                .map_err(|_| format!("'{}' is not a number", literal)),
            ValueKind::Time => parse_clock(literal)
                .map(Self::Time)
                .ok_or_else(|| format!("'{}' is not a time of day", literal)),
            ValueKind::Duration => parse_duration(literal)
                .map(Self::Duration)
                .ok_or_else(|| format!("'{}' is not a duration", literal)),
            ValueKind::Word => Ok(Self::Word(literal.to_string())),
            ValueKind::Variable => Err(format!("'{}' is a variable, not a literal", literal)),
        }
    }

    /// Whether the kind supports `< <= > >=`
    pub fn is_ordered(&self) -> bool {
        !matches!(self, Self::Word(_))
    }

    fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            (Self::Duration(a), Self::Duration(b)) => Some(a.cmp(b)),
            (Self::Word(a), Self::Word(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Evaluate `self OPERATOR other`.
    ///
    /// Returns `None` when the comparison is meaningless: differing kinds, or
    /// an ordering operator applied to words.
    pub fn compare(&self, operator: ComparisonOperator, other: &Value) -> Option<bool> {
        if self.kind() != other.kind() {
            return None;
        }

        match operator {
            ComparisonOperator::Equal => Some(self == other),
            ComparisonOperator::NotEqual => Some(self != other),
            _ if !self.is_ordered() => None,
            ComparisonOperator::Less => Some(self.partial_compare(other)? == Ordering::Less),
            ComparisonOperator::LessOrEqual => {
                Some(self.partial_compare(other)? != Ordering::Greater)
            }
            ComparisonOperator::Greater => {
                Some(self.partial_compare(other)? == Ordering::Greater)
            }
            ComparisonOperator::GreaterOrEqual => {
                Some(self.partial_compare(other)? != Ordering::Less)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M")),
            Self::Duration(d) => write!(f, "{}", format_duration(*d)),
            Self::Word(w) => f.write_str(w),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

const UNITS: [(u64, &str); 4] = [(86_400, "d"), (3_600, "h"), (60, "m"), (1, "s")];

/// Render in the largest unit that divides the duration exactly
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() != 0 {
        return format!("{}ms", duration.as_millis());
    }

    let secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    UNITS
        .iter()
        .find(|(size, _)| secs % size == 0)
        .map(|(size, unit)| format!("{}{}", secs / size, unit))
        .unwrap_or_else(|| format!("{}s", secs))
}

/// `<count><s|m|h|d>`
pub fn parse_duration(text: &str) -> Option<Duration> {
    let unit = text.chars().last()?;
    let count: u64 = text[..text.len() - unit.len_utf8()].parse().ok()?;
    let size = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return None,
    };
    count.checked_mul(size).map(Duration::from_secs)
}

/// `H:MM` or `HH:MM`, 24-hour
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    let (hour, minute) = text.split_once(':')?;
    NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
}
