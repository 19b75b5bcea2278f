//! Syntax error types with logging code mapping
//!
//! The parser stops at the first failure, so each error describes exactly one
//! offending token and never comes with a partial tree.

use crate::lexical::LexError;
use crate::logging::{codes, Code};
use crate::tokens::TokenKind;
use crate::utils::Position;

pub type SyntaxResult<T> = Result<T, SyntaxError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyntaxError {
    /// The scanner produced an `Error` token; surfaced verbatim
    #[error("{0}")]
    Lexical(#[from] LexError),

    #[error("{position}: unexpected {}, expected {}", describe_found(.found, .text), describe_expected(.expected))]
    UnexpectedToken {
        position: Position,
        found: TokenKind,
        text: String,
        expected: Vec<TokenKind>,
    },

    #[error("{position}: invalid literal {literal:?}: {reason}")]
    InvalidLiteral {
        position: Position,
        literal: String,
        reason: String,
    },

    #[error("{position}: blocks nested deeper than {max_depth}")]
    NestingTooDeep { position: Position, max_depth: usize },
}

fn describe_found(kind: &TokenKind, text: &str) -> String {
    if text.is_empty() || kind.is_terminal() {
        kind.to_string()
    } else {
        format!("{} '{}'", kind, text)
    }
}

fn describe_expected(expected: &[TokenKind]) -> String {
    let names: Vec<&str> = expected.iter().map(|kind| kind.describe()).collect();
    match names.as_slice() {
        [] => "nothing".to_string(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} or {}", init.join(", "), last),
    }
}

impl SyntaxError {
    pub fn unexpected(
        position: Position,
        found: TokenKind,
        text: impl Into<String>,
        expected: &[TokenKind],
    ) -> Self {
        Self::UnexpectedToken {
            position,
            found,
            text: text.into(),
            expected: expected.to_vec(),
        }
    }

    /// Get error code for global logging system
    pub fn error_code(&self) -> Code {
        match self {
            Self::Lexical(error) => error.error_code(),
            Self::UnexpectedToken { .. } => codes::syntax::UNEXPECTED_TOKEN,
            Self::InvalidLiteral { .. } => codes::syntax::INVALID_LITERAL,
            Self::NestingTooDeep { .. } => codes::syntax::MAX_NESTING_DEPTH,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Self::Lexical(error) => error.position,
            Self::UnexpectedToken { position, .. }
            | Self::InvalidLiteral { position, .. }
            | Self::NestingTooDeep { position, .. } => *position,
        }
    }

    pub fn is_lexical(&self) -> bool {
        matches!(self, Self::Lexical(_))
    }

    /// Get recommended action
    pub fn recommended_action(&self) -> &'static str {
        codes::get_action(self.error_code().as_str())
    }
}
