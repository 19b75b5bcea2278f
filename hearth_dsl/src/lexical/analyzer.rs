//! State-function lexer
//!
//! Each lexing context is a plain function `fn(&mut Lexer) -> Option<StateFn>`.
//! A state consumes runes between `start` and `pos`, emits zero or more tokens
//! into the pending queue, and returns the next state, or `None` to halt.

use crate::config::compile_time::lexical::{MAX_TOKEN_COUNT, MAX_WORD_LENGTH};
use crate::logging::codes;
use crate::tokens::{keyword_kind, Token, TokenKind};
use crate::utils::Position;
use std::collections::VecDeque;

/// A state of the lexing machine. Wrapped in a newtype so a state can name
/// the type of the state it returns.
#[derive(Clone, Copy)]
pub struct StateFn(pub fn(&mut Lexer<'_>) -> Option<StateFn>);

/// Essential lexical metrics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LexicalMetrics {
    pub total_tokens: usize,
    pub keyword_tokens: usize,
    pub word_tokens: usize,
    pub literal_tokens: usize,
    pub punctuation_tokens: usize,
    pub comment_count: usize,
}

impl LexicalMetrics {
    fn record_token(&mut self, kind: TokenKind) {
        self.total_tokens += 1;

        match kind {
            TokenKind::Set | TokenKind::Get | TokenKind::Var | TokenKind::At | TokenKind::When => {
                self.keyword_tokens += 1
            }
            TokenKind::Word | TokenKind::Variable => self.word_tokens += 1,
            TokenKind::Number
            | TokenKind::Time
            | TokenKind::Meridiem
            | TokenKind::Duration => self.literal_tokens += 1,
            TokenKind::Error | TokenKind::EndOfInput => {}
            _ => self.punctuation_tokens += 1,
        }
    }
}

/// Cursor state shared by all state functions
pub struct Lexer<'a> {
    input: &'a str,
    /// Byte offset where the current token starts
    start: usize,
    /// Byte offset of the next unread rune
    pos: usize,
    start_position: Position,
    cursor: Position,
    pending: VecDeque<Token>,
    halted: bool,
    metrics: LexicalMetrics,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            start: 0,
            pos: 0,
            start_position: Position::start(),
            cursor: Position::start(),
            pending: VecDeque::new(),
            halted: false,
            metrics: LexicalMetrics::default(),
        }
    }

    // === CURSOR ===

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(n)
    }

    fn next(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        self.cursor = self.cursor.advance(ch);
        Some(ch)
    }

    fn accept_while(&mut self, pred: impl Fn(char) -> bool) -> usize {
        let mut count = 0;
        while self.peek().is_some_and(&pred) {
            self.next();
            count += 1;
        }
        count
    }

    /// Drop everything read since the last emit
    fn ignore(&mut self) {
        self.start = self.pos;
        self.start_position = self.cursor;
    }

    fn current(&self) -> &'a str {
        &self.input[self.start..self.pos]
    }

    // === OUTPUT ===

    fn emit(&mut self, kind: TokenKind) {
        let text = self.current().to_string();
        self.emit_text(kind, text);
    }

    fn emit_text(&mut self, kind: TokenKind, text: String) {
        if self.halted {
            return;
        }

        if !kind.is_terminal() && self.metrics.total_tokens >= MAX_TOKEN_COUNT {
            crate::log_debug!("Token limit reached",
                "code" => codes::lexical::TOO_MANY_TOKENS,
                "limit" => MAX_TOKEN_COUNT
            );
            self.halt_with(format!(
                "too many tokens: input exceeds the limit of {}",
                MAX_TOKEN_COUNT
            ));
            return;
        }

        self.metrics.record_token(kind);
        self.pending
            .push_back(Token::new(self.start_position, kind, text));
        if kind.is_terminal() {
            self.halted = true;
        }
        self.ignore();
    }

    fn halt_with(&mut self, message: String) {
        self.pending
            .push_back(Token::error(self.start_position, message));
        self.halted = true;
    }

    /// Emit an error token at the start of the current token and stop
    fn error(&mut self, code: crate::logging::Code, message: String) -> Option<StateFn> {
        if !self.halted {
            crate::log_debug!("Scanner halted",
                "code" => code,
                "position" => self.start_position,
                "message" => message.as_str()
            );
            self.halt_with(message);
        }
        None
    }

    // === ACCESSORS USED BY THE SCANNER ===

    pub(crate) fn pop_pending(&mut self) -> Option<Token> {
        self.pending.pop_front()
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.halted
    }

    pub(crate) fn end_position(&self) -> Position {
        self.cursor
    }

    pub fn metrics(&self) -> &LexicalMetrics {
        &self.metrics
    }
}

// ============================================================================
// CHARACTER CLASSES
// ============================================================================

fn is_word_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

fn is_duration_unit(ch: char) -> bool {
    matches!(ch, 's' | 'm' | 'h' | 'd')
}

fn unit_seconds(unit: char) -> u64 {
    match unit {
        'd' => 86_400,
        'h' => 3_600,
        'm' => 60,
        _ => 1,
    }
}

/// Whether `<count><unit>` fits in a whole number of seconds
fn duration_in_range(count: &str, unit: char) -> bool {
    count
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit_seconds(unit)))
        .is_some()
}

fn is_inline_space(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

// ============================================================================
// STATE FUNCTIONS
// ============================================================================

/// Entry state: skip whitespace and dispatch on the first rune of a token
pub fn lex_token(l: &mut Lexer<'_>) -> Option<StateFn> {
    l.accept_while(char::is_whitespace);
    l.ignore();

    let Some(ch) = l.peek() else {
        l.emit(TokenKind::EndOfInput);
        return None;
    };

    match ch {
        '#' => return Some(StateFn(lex_comment)),
        '$' => return Some(StateFn(lex_variable)),
        c if is_word_start(c) => return Some(StateFn(lex_word)),
        c if c.is_ascii_digit() => return Some(StateFn(lex_number_or_time_or_duration)),
        '-' if l.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
            return Some(StateFn(lex_number_or_time_or_duration))
        }
        _ => {}
    }

    l.next();
    match ch {
        '.' => l.emit(TokenKind::PathSeparator),
        '*' => l.emit(TokenKind::Wildcard),
        '{' => l.emit(TokenKind::BlockOpen),
        '}' => l.emit(TokenKind::BlockClose),
        ';' => l.emit(TokenKind::Terminator),
        '=' => {
            if l.peek() == Some('=') {
                l.next();
                l.emit(TokenKind::Operator);
            } else {
                l.emit(TokenKind::Assign);
            }
        }
        '<' | '>' => {
            if l.peek() == Some('=') {
                l.next();
            }
            l.emit(TokenKind::Operator);
        }
        '!' => {
            if l.peek() != Some('=') {
                return l.error(
                    codes::lexical::INVALID_CHARACTER,
                    "expected '=' after '!'".to_string(),
                );
            }
            l.next();
            l.emit(TokenKind::Operator);
        }
        other => {
            return l.error(
                codes::lexical::INVALID_CHARACTER,
                format!("unrecognized character {:?}", other),
            )
        }
    }

    Some(StateFn(lex_token))
}

/// `#` to end of line; nothing is emitted
pub fn lex_comment(l: &mut Lexer<'_>) -> Option<StateFn> {
    l.accept_while(|c| c != '\n');
    l.metrics.comment_count += 1;
    l.ignore();
    Some(StateFn(lex_token))
}

/// Keyword or plain word
pub fn lex_word(l: &mut Lexer<'_>) -> Option<StateFn> {
    l.accept_while(is_word_char);

    let word = l.current();
    let length = word.chars().count();
    if length > MAX_WORD_LENGTH {
        return l.error(
            codes::lexical::WORD_TOO_LONG,
            format!(
                "word is {} characters long (max {})",
                length, MAX_WORD_LENGTH
            ),
        );
    }

    l.emit(keyword_kind(word).unwrap_or(TokenKind::Word));
    Some(StateFn(lex_token))
}

/// `$name`; the emitted text keeps the `$`
pub fn lex_variable(l: &mut Lexer<'_>) -> Option<StateFn> {
    l.next();
    if !l.peek().is_some_and(is_word_start) {
        return l.error(
            codes::lexical::INVALID_CHARACTER,
            "expected a variable name after '$'".to_string(),
        );
    }
    l.accept_while(is_word_char);

    let length = l.current().chars().count() - 1;
    if length > MAX_WORD_LENGTH {
        return l.error(
            codes::lexical::WORD_TOO_LONG,
            format!(
                "variable name is {} characters long (max {})",
                length, MAX_WORD_LENGTH
            ),
        );
    }

    l.emit(TokenKind::Variable);
    Some(StateFn(lex_token))
}

/// Digit run, then one rune of lookahead decides the literal kind:
/// `:` makes a time, a unit letter a duration, anything else a number.
pub fn lex_number_or_time_or_duration(l: &mut Lexer<'_>) -> Option<StateFn> {
    let negative = l.peek() == Some('-');
    if negative {
        l.next();
    }
    l.accept_while(|c| c.is_ascii_digit());

    if l.peek() == Some(':') {
        if negative {
            return l.error(
                codes::lexical::MALFORMED_LITERAL,
                format!("malformed time {:?}: times cannot be negative", l.current()),
            );
        }
        return Some(StateFn(lex_time_digits));
    }

    let mut fractional = false;
    if l.peek() == Some('.') && l.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
        fractional = true;
        l.next();
        l.accept_while(|c| c.is_ascii_digit());
    }

    match l.peek() {
        Some(unit)
            if is_duration_unit(unit) && !l.peek_nth(1).is_some_and(is_word_char) =>
        {
            if negative || fractional {
                l.next();
                return l.error(
                    codes::lexical::MALFORMED_LITERAL,
                    format!(
                        "malformed duration {:?}: durations take a whole, non-negative count",
                        l.current()
                    ),
                );
            }
            l.next();
            if !duration_in_range(&l.current()[..l.current().len() - 1], unit) {
                return l.error(
                    codes::lexical::MALFORMED_LITERAL,
                    format!("duration {:?} is out of range", l.current()),
                );
            }
            l.emit(TokenKind::Duration);
        }
        Some(c) if is_word_char(c) => {
            l.accept_while(is_word_char);
            return l.error(
                codes::lexical::MALFORMED_LITERAL,
                format!("malformed literal {:?}", l.current()),
            );
        }
        _ => l.emit(TokenKind::Number),
    }

    Some(StateFn(lex_token))
}

/// Absorbs `:MM` after the hour digits and validates the clock value
pub fn lex_time_digits(l: &mut Lexer<'_>) -> Option<StateFn> {
    let hour_text = l.current();
    l.next(); // ':'
    let minute_digits = l.accept_while(|c| c.is_ascii_digit());

    if minute_digits != 2 || l.peek().is_some_and(|c| c.is_ascii_digit()) {
        return l.error(
            codes::lexical::MALFORMED_LITERAL,
            format!("malformed time {:?}: expected HH:MM", l.current()),
        );
    }
    if hour_text.is_empty() || hour_text.len() > 2 {
        return l.error(
            codes::lexical::MALFORMED_LITERAL,
            format!("malformed time {:?}: expected HH:MM", l.current()),
        );
    }

    let text = l.current();
    let (hour, minute) = match text.split_once(':') {
        Some((h, m)) => (h.parse::<u32>().ok(), m.parse::<u32>().ok()),
        None => (None, None),
    };
    match (hour, minute) {
        (Some(h), Some(m)) if h <= 23 && m <= 59 => {}
        _ => {
            return l.error(
                codes::lexical::MALFORMED_LITERAL,
                format!("time {:?} is out of range", text),
            )
        }
    }

    // A letter glued to the minutes must be the meridiem
    if l.peek().is_some_and(is_word_char) && !at_meridiem(l) {
        l.accept_while(is_word_char);
        return l.error(
            codes::lexical::MALFORMED_LITERAL,
            format!("malformed time {:?}", l.current()),
        );
    }

    l.emit(TokenKind::Time);

    // Space between the time and am/pm is skipped, never emitted
    l.accept_while(is_inline_space);
    l.ignore();
    Some(StateFn(lex_meridiem))
}

fn at_meridiem(l: &Lexer<'_>) -> bool {
    let first = l.peek().map(|c| c.to_ascii_lowercase());
    let second = l.peek_nth(1).map(|c| c.to_ascii_lowercase());
    matches!(first, Some('a') | Some('p'))
        && second == Some('m')
        && !l.peek_nth(2).is_some_and(is_word_char)
}

/// Optional `am`/`pm` directly after a time
pub fn lex_meridiem(l: &mut Lexer<'_>) -> Option<StateFn> {
    if at_meridiem(l) {
        l.next();
        l.next();
        l.emit(TokenKind::Meridiem);
    }
    Some(StateFn(lex_token))
}
