//! One-token lookahead over any token source
//!
//! The parser reads through a `TokenStream`, which works the same whether the
//! tokens come straight from a `Scanner` or across the concurrent pipeline.

use crate::tokens::token::{Token, TokenKind};
use crate::utils::Position;

/// Token stream with a single token of lookahead.
///
/// Once the terminal token (`EndOfInput` or `Error`) has been read, every
/// further read returns that same token. A source that stops without a
/// terminal token is closed with a synthetic `EndOfInput`.
pub struct TokenStream<I>
where
    I: Iterator<Item = Token>,
{
    source: I,
    peeked: Option<Token>,
    terminal: Option<Token>,
    last_position: Position,
    consumed: usize,
}

impl<I> TokenStream<I>
where
    I: Iterator<Item = Token>,
{
    pub fn new(source: I) -> Self {
        Self {
            source,
            peeked: None,
            terminal: None,
            last_position: Position::start(),
            consumed: 0,
        }
    }

    fn pull(&mut self) -> Token {
        if let Some(terminal) = &self.terminal {
            return terminal.clone();
        }

        let token = self
            .source
            .next()
            .unwrap_or_else(|| Token::end_of_input(self.last_position));
        self.last_position = token.position;

        if token.is_terminal() {
            self.terminal = Some(token.clone());
        }
        token
    }

    /// Look at the next token without consuming it
    pub fn peek(&mut self) -> &Token {
        if self.peeked.is_none() {
            let token = self.pull();
            self.peeked = Some(token);
        }
        // The branch above guarantees the slot is filled
        match &self.peeked {
            Some(token) => token,
            None => unreachable!("peek slot filled above"),
        }
    }

    /// Consume and return the next token
    pub fn next_token(&mut self) -> Token {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.pull(),
        };
        if !token.is_terminal() {
            self.consumed += 1;
        }
        token
    }

    /// Whether the next token has the given kind
    pub fn check(&mut self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    /// Whether the next token has any of the given kinds
    pub fn check_any(&mut self, kinds: &[TokenKind]) -> bool {
        let next = self.peek().kind;
        kinds.contains(&next)
    }

    /// Number of non-terminal tokens consumed so far
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(kind: TokenKind, text: &str, column: u32) -> Token {
        Token::new(Position::new(column as usize - 1, 1, column), kind, text)
    }

    #[test]
    fn test_peek_does_not_consume() {
        let tokens = vec![
            token(TokenKind::Get, "get", 1),
            token(TokenKind::Word, "porch", 5),
            Token::end_of_input(Position::new(9, 1, 10)),
        ];
        let mut stream = TokenStream::new(tokens.into_iter());

        assert!(stream.check(TokenKind::Get));
        assert_eq!(stream.peek().text, "get");
        assert_eq!(stream.next_token().kind, TokenKind::Get);
        assert_eq!(stream.next_token().text, "porch");
        assert_eq!(stream.consumed(), 2);
    }

    #[test]
    fn test_terminal_token_repeats() {
        let tokens = vec![Token::error(Position::start(), "boom")];
        let mut stream = TokenStream::new(tokens.into_iter());

        assert_eq!(stream.next_token().kind, TokenKind::Error);
        assert_eq!(stream.next_token().kind, TokenKind::Error);
        assert!(stream.check(TokenKind::Error));
        assert_eq!(stream.consumed(), 0);
    }

    #[test]
    fn test_exhausted_source_is_closed_with_end_of_input() {
        let tokens = vec![token(TokenKind::Word, "porch", 3)];
        let mut stream = TokenStream::new(tokens.into_iter());

        stream.next_token();
        let end = stream.next_token();
        assert_eq!(end.kind, TokenKind::EndOfInput);
        assert_eq!(end.position.column, 3);
    }

    #[test]
    fn test_check_any() {
        let tokens = vec![token(TokenKind::Wildcard, "*", 1)];
        let mut stream = TokenStream::new(tokens.into_iter());
        assert!(stream.check_any(&[TokenKind::Word, TokenKind::Wildcard]));
        assert!(!stream.check_any(&[TokenKind::Word]));
    }
}
