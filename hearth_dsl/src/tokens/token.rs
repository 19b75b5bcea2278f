//! Token types produced by the scanner
//!
//! A token is an immutable `{position, kind, text}` value. The kind set is closed:
//! every lexical form of the language maps to exactly one `TokenKind`.
use crate::utils::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Lexical failure; `text` holds the message and the sequence ends here
    Error,
    /// Normal end of the sequence
    EndOfInput,

    // === KEYWORDS ===
    Set,
    Get,
    Var,
    At,
    When,

    // === LITERALS ===
    Word,
    Number,
    Time,
    /// `am` / `pm` suffix directly after a time
    Meridiem,
    Duration,

    // === PUNCTUATION ===
    /// `.` between path segments
    PathSeparator,
    /// `*` path segment
    Wildcard,
    /// `== != < <= > >=`
    Operator,
    /// `=` in `var name = value`
    Assign,
    /// `$name`
    Variable,
    BlockOpen,
    BlockClose,
    /// `;`
    Terminator,
}

impl TokenKind {
    /// Human-readable name used in syntax error messages
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::EndOfInput => "end of input",
            Self::Set => "'set'",
            Self::Get => "'get'",
            Self::Var => "'var'",
            Self::At => "'at'",
            Self::When => "'when'",
            Self::Word => "word",
            Self::Number => "number",
            Self::Time => "time",
            Self::Meridiem => "am/pm",
            Self::Duration => "duration",
            Self::PathSeparator => "'.'",
            Self::Wildcard => "'*'",
            Self::Operator => "comparison operator",
            Self::Assign => "'='",
            Self::Variable => "variable",
            Self::BlockOpen => "'{'",
            Self::BlockClose => "'}'",
            Self::Terminator => "';'",
        }
    }

    /// Whether this kind ends a token sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::EndOfInput)
    }

    /// Whether this kind starts a statement
    pub fn is_statement_keyword(&self) -> bool {
        matches!(
            self,
            Self::Set | Self::Get | Self::Var | Self::At | Self::When
        )
    }

    /// Kinds that may start a value
    pub fn value_kinds() -> &'static [TokenKind] {
        &[
            Self::Number,
            Self::Time,
            Self::Duration,
            Self::Word,
            Self::Variable,
        ]
    }

    /// Kinds that may start a statement
    pub fn statement_kinds() -> &'static [TokenKind] {
        &[Self::Set, Self::Get, Self::Var, Self::At, Self::When]
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Look up the keyword kind for a word, if it is one.
///
/// Keywords are lowercase only; `Set` is an ordinary word.
pub fn keyword_kind(word: &str) -> Option<TokenKind> {
    match word {
        "set" => Some(TokenKind::Set),
        "get" => Some(TokenKind::Get),
        "var" => Some(TokenKind::Var),
        "at" => Some(TokenKind::At),
        "when" => Some(TokenKind::When),
        _ => None,
    }
}

/// A positioned token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub position: Position,
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(position: Position, kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            position,
            kind,
            text: text.into(),
        }
    }

    /// Create an error token carrying a message
    pub fn error(position: Position, message: impl Into<String>) -> Self {
        Self::new(position, TokenKind::Error, message)
    }

    /// Create the end-of-input token
    pub fn end_of_input(position: Position) -> Self {
        Self::new(position, TokenKind::EndOfInput, "")
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::EndOfInput => write!(f, "end of input"),
            TokenKind::Error => write!(f, "error: {}", self.text),
            _ => write!(f, "{} '{}'", self.kind, self.text),
        }
    }
}
