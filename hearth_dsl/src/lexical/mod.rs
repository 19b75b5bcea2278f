//! Lexical analysis
//!
//! `scan` turns source text into a lazy, finite token sequence terminated by
//! exactly one `EndOfInput` or `Error` token. `scan_concurrent` runs the same
//! machine on its own thread behind a bounded queue.

pub mod analyzer;
pub mod concurrent;

use crate::config::runtime::LexicalPreferences;
use crate::logging::codes;
use crate::tokens::{Token, TokenKind};
use crate::utils::Position;

pub use analyzer::{LexicalMetrics, Lexer, StateFn};
pub use concurrent::{scan_concurrent, CancellationToken, ConcurrentTokens};

/// Lexical failure: a malformed literal or an unrecognized character
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{position}: {message}")]
pub struct LexError {
    pub position: Position,
    pub message: String,
}

impl LexError {
    pub fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }

    /// Build from the `Error` token that ended a scan
    pub fn from_token(token: &Token) -> Self {
        Self::new(token.position, token.text.clone())
    }

    pub fn error_code(&self) -> crate::logging::Code {
        codes::lexical::SCAN_FAILED
    }

    pub fn position(&self) -> Position {
        self.position
    }
}

/// Lazy token iterator over one input.
///
/// Not restartable; scan the input again for a fresh sequence.
pub struct Scanner<'a> {
    lexer: Lexer<'a>,
    state: Option<StateFn>,
    finished: bool,
    preferences: LexicalPreferences,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str, preferences: LexicalPreferences) -> Self {
        Self {
            lexer: Lexer::new(input),
            state: Some(StateFn(analyzer::lex_token)),
            finished: false,
            preferences,
        }
    }

    pub fn metrics(&self) -> &LexicalMetrics {
        self.lexer.metrics()
    }

    fn report(&self, terminal: &Token) {
        let metrics = self.lexer.metrics();
        if terminal.kind == TokenKind::EndOfInput && self.preferences.log_token_statistics {
            crate::log_success!(codes::success::SCAN_COMPLETE, "Scan complete",
                "tokens" => metrics.total_tokens,
                "keywords" => metrics.keyword_tokens,
                "words" => metrics.word_tokens,
                "literals" => metrics.literal_tokens,
                "comments" => metrics.comment_count
            );
        } else {
            crate::log_debug!("Scan finished",
                "terminal" => terminal.kind,
                "tokens" => metrics.total_tokens
            );
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if let Some(token) = self.lexer.pop_pending() {
                if token.is_terminal() {
                    self.finished = true;
                    self.report(&token);
                }
                return Some(token);
            }

            if self.finished {
                return None;
            }

            if self.lexer.is_halted() {
                self.state = None;
            }

            match self.state.take() {
                Some(StateFn(step)) => self.state = step(&mut self.lexer),
                None if self.lexer.is_halted() => {}
                None => {
                    // A state returned None without emitting a terminal token
                    self.finished = true;
                    let token = Token::end_of_input(self.lexer.end_position());
                    self.report(&token);
                    return Some(token);
                }
            }
        }
    }
}

impl std::iter::FusedIterator for Scanner<'_> {}

/// Scan `input` with the default preferences
pub fn scan(input: &str) -> Scanner<'_> {
    Scanner::new(input, LexicalPreferences::default())
}

/// Scan `input` with explicit preferences
pub fn scan_with_preferences(input: &str, preferences: LexicalPreferences) -> Scanner<'_> {
    Scanner::new(input, preferences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::compile_time::lexical::MAX_WORD_LENGTH;

    fn kinds(input: &str) -> Vec<TokenKind> {
        scan(input).map(|t| t.kind).collect()
    }

    fn texts(input: &str) -> Vec<String> {
        scan(input).map(|t| t.text).collect()
    }

    fn last(input: &str) -> Token {
        scan(input).last().unwrap()
    }

    #[test]
    fn test_set_statement_tokens() {
        assert_eq!(
            kinds("set living_room.light on"),
            vec![
                TokenKind::Set,
                TokenKind::Word,
                TokenKind::PathSeparator,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::EndOfInput,
            ]
        );
        assert_eq!(
            texts("set living_room.light on"),
            vec!["set", "living_room", ".", "light", "on", ""]
        );
    }

    #[test]
    fn test_time_is_never_a_number() {
        let tokens: Vec<Token> = scan("12:30").collect();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::Time);
        assert_eq!(tokens[0].text, "12:30");
        assert_eq!(tokens[1].kind, TokenKind::EndOfInput);
    }

    #[test]
    fn test_single_digit_hour() {
        assert_eq!(texts("at 7:05"), vec!["at", "7:05", ""]);
    }

    #[test]
    fn test_meridiem_after_skipped_space() {
        let tokens: Vec<Token> = scan("at 5:30   PM {").collect();
        assert_eq!(tokens[1].kind, TokenKind::Time);
        assert_eq!(tokens[2].kind, TokenKind::Meridiem);
        assert_eq!(tokens[2].text, "PM");
        assert_eq!(tokens[2].position.column, 12);
        assert_eq!(tokens[3].kind, TokenKind::BlockOpen);
    }

    #[test]
    fn test_meridiem_glued_to_time() {
        assert_eq!(
            kinds("5:30am"),
            vec![TokenKind::Time, TokenKind::Meridiem, TokenKind::EndOfInput]
        );
    }

    #[test]
    fn test_word_after_time_is_not_meridiem() {
        assert_eq!(
            kinds("7:30 amber"),
            vec![TokenKind::Time, TokenKind::Word, TokenKind::EndOfInput]
        );
    }

    #[test]
    fn test_durations_and_numbers() {
        assert_eq!(
            kinds("15m 90s 2h 1d 42 -3 21.5"),
            vec![
                TokenKind::Duration,
                TokenKind::Duration,
                TokenKind::Duration,
                TokenKind::Duration,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::EndOfInput,
            ]
        );
        assert_eq!(texts("21.5")[0], "21.5");
        assert_eq!(texts("-3")[0], "-3");
    }

    #[test]
    fn test_duration_count_must_fit() {
        let tokens: Vec<Token> = scan("set a.b 99999999999999999999m").collect();
        let error = tokens.last().unwrap();
        assert_eq!(error.kind, TokenKind::Error);
        assert_eq!(error.position.column, 9);
        assert!(error.text.contains("out of range"), "{}", error.text);

        // Fits as a count but not once scaled to seconds
        assert_eq!(last("213503982334602d").kind, TokenKind::Error);
        assert_eq!(kinds("18446744073709551615s")[0], TokenKind::Duration);
    }

    #[test]
    fn test_operators_and_punctuation() {
        assert_eq!(
            kinds("== != < <= > >= = * { } ;"),
            vec![
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Assign,
                TokenKind::Wildcard,
                TokenKind::BlockOpen,
                TokenKind::BlockClose,
                TokenKind::Terminator,
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn test_variables_keep_their_sigil() {
        let tokens: Vec<Token> = scan("var level = 3; set x $level").collect();
        assert_eq!(tokens[0].kind, TokenKind::Var);
        assert_eq!(tokens[2].kind, TokenKind::Assign);
        let variable = tokens.iter().find(|t| t.kind == TokenKind::Variable).unwrap();
        assert_eq!(variable.text, "$level");
    }

    #[test]
    fn test_comments_and_whitespace_are_not_emitted() {
        assert_eq!(
            kinds("# lights\nget porch.light # trailing\n"),
            vec![
                TokenKind::Get,
                TokenKind::Word,
                TokenKind::PathSeparator,
                TokenKind::Word,
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn test_positions_track_lines_and_columns() {
        let tokens: Vec<Token> = scan("get a\n  set b on").collect();
        assert_eq!(tokens[0].position, Position::new(0, 1, 1));
        assert_eq!(tokens[2].position, Position::new(8, 2, 3));
        assert_eq!(tokens[3].position.column, 7);
    }

    #[test]
    fn test_keywords_are_lowercase_only() {
        assert_eq!(
            kinds("SET"),
            vec![TokenKind::Word, TokenKind::EndOfInput]
        );
    }

    #[test]
    fn test_malformed_literals_emit_one_error() {
        for input in ["12:", "12:3", "25:00", "12:60", "123:00", "5x", "10min", "-5:00", "1.5h", "!", "@", "$"] {
            let tokens: Vec<Token> = scan(input).collect();
            assert_eq!(tokens.len(), 1, "input {:?} gave {:?}", input, tokens);
            assert_eq!(tokens[0].kind, TokenKind::Error, "input {:?}", input);
        }
    }

    #[test]
    fn test_error_halts_the_sequence() {
        let tokens: Vec<Token> = scan("set porch.light @ on").collect();
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Error);
        assert_eq!(
            tokens.iter().filter(|t| t.is_terminal()).count(),
            1
        );
        assert_eq!(tokens.last().unwrap().position.column, 17);
    }

    #[test]
    fn test_exactly_one_terminal_token() {
        for input in ["", "   ", "get a.b", "set a 5x", "at 7:30 pm { set a on }"] {
            let tokens: Vec<Token> = scan(input).collect();
            let terminals = tokens.iter().filter(|t| t.is_terminal()).count();
            assert_eq!(terminals, 1, "input {:?}", input);
            assert!(tokens.last().unwrap().is_terminal());
        }
    }

    #[test]
    fn test_scanner_is_fused() {
        let mut scanner = scan("get a");
        while scanner.next().is_some() {}
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_word_length_limit() {
        let long = "w".repeat(MAX_WORD_LENGTH + 1);
        assert_eq!(last(&long).kind, TokenKind::Error);

        let fits = "w".repeat(MAX_WORD_LENGTH);
        assert_eq!(kinds(&fits), vec![TokenKind::Word, TokenKind::EndOfInput]);
    }

    #[test]
    fn test_lex_error_from_token() {
        let error = LexError::from_token(&last("set a 5x"));
        assert_eq!(error.position.column, 7);
        assert!(error.message.contains("5x"));
        assert_eq!(error.error_code(), codes::lexical::SCAN_FAILED);
    }

    #[test]
    fn test_metrics_count_tokens() {
        let mut scanner = scan("set a.b on # note");
        for _ in scanner.by_ref() {}
        let metrics = scanner.metrics();
        assert_eq!(metrics.keyword_tokens, 1);
        assert_eq!(metrics.word_tokens, 3);
        assert_eq!(metrics.punctuation_tokens, 1);
        assert_eq!(metrics.comment_count, 1);
    }
}
