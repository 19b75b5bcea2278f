//! Recursive-descent parser with one token of lookahead
//!
//! Grammar:
//!
//! ```text
//! program   := (statement | ';')* EOF
//! statement := set | get | var | at | when
//! set       := 'set' path value
//! get       := 'get' path
//! var       := 'var' WORD '=' value
//! at        := 'at' time block
//! when      := 'when' condition block
//! condition := path OPERATOR value
//! block     := '{' (statement | ';')* '}' | statement
//! path      := segment ('.' segment)*
//! segment   := WORD | '*'
//! value     := NUMBER | time | DURATION | WORD | VARIABLE
//! time      := TIME MERIDIEM?
//! ```
//!
//! The first unexpected token aborts the parse; no partial tree escapes.

use crate::config::compile_time::syntax::MAX_BLOCK_DEPTH;
use crate::grammar::ast::nodes::*;
use crate::lexical::LexError;
use crate::syntax::error::{SyntaxError, SyntaxResult};
use crate::tokens::{Token, TokenKind, TokenStream};
use crate::utils::Position;

const SEGMENT_KINDS: &[TokenKind] = &[TokenKind::Word, TokenKind::Wildcard];

const PROGRAM_LEVEL_KINDS: &[TokenKind] = &[
    TokenKind::Set,
    TokenKind::Get,
    TokenKind::Var,
    TokenKind::At,
    TokenKind::When,
    TokenKind::Terminator,
    TokenKind::EndOfInput,
];

const BLOCK_LEVEL_KINDS: &[TokenKind] = &[
    TokenKind::Set,
    TokenKind::Get,
    TokenKind::Var,
    TokenKind::At,
    TokenKind::When,
    TokenKind::Terminator,
    TokenKind::BlockClose,
];

pub struct Parser<I>
where
    I: Iterator<Item = Token>,
{
    tokens: TokenStream<I>,
    depth: usize,
    max_depth: usize,
}

impl<I> Parser<I>
where
    I: Iterator<Item = Token>,
{
    pub fn new(tokens: I) -> Self {
        Self::with_max_depth(tokens, MAX_BLOCK_DEPTH)
    }

    pub fn with_max_depth(tokens: I, max_depth: usize) -> Self {
        Self {
            tokens: TokenStream::new(tokens),
            depth: 0,
            max_depth,
        }
    }

    /// Number of tokens consumed so far
    pub fn consumed(&self) -> usize {
        self.tokens.consumed()
    }

    // === TOKEN HANDLING ===

    /// Consume the next token if it has one of `kinds`, fail otherwise
    fn expect(&mut self, kinds: &[TokenKind]) -> SyntaxResult<Token> {
        let token = self.tokens.next_token();
        if token.kind == TokenKind::Error {
            return Err(SyntaxError::Lexical(LexError::from_token(&token)));
        }
        if kinds.contains(&token.kind) {
            return Ok(token);
        }
        Err(unexpected(token, kinds))
    }

    /// Fail on the lookahead token
    fn unexpected_next<T>(&mut self, expected: &[TokenKind]) -> SyntaxResult<T> {
        let token = self.tokens.next_token();
        if token.kind == TokenKind::Error {
            return Err(SyntaxError::Lexical(LexError::from_token(&token)));
        }
        Err(unexpected(token, expected))
    }

    // === PROGRAM AND BLOCKS ===

    pub fn parse_program(&mut self) -> SyntaxResult<ProgramNode> {
        let position = self.tokens.peek().position;
        let mut statements = Vec::new();

        loop {
            match self.tokens.peek().kind {
                TokenKind::EndOfInput => break,
                TokenKind::Terminator => {
                    self.tokens.next_token();
                }
                kind if kind.is_statement_keyword() => statements.push(self.statement()?),
                _ => return self.unexpected_next(PROGRAM_LEVEL_KINDS),
            }
        }

        Ok(ProgramNode {
            position,
            statements,
        })
    }

    fn block(&mut self) -> SyntaxResult<BlockNode> {
        let position = self.tokens.peek().position;

        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(SyntaxError::NestingTooDeep {
                position,
                max_depth: self.max_depth,
            });
        }

        let result = if self.tokens.check(TokenKind::BlockOpen) {
            self.braced_block(position)
        } else {
            self.statement().map(|statement| BlockNode {
                position,
                statements: vec![statement],
            })
        };

        self.depth -= 1;
        result
    }

    fn braced_block(&mut self, position: Position) -> SyntaxResult<BlockNode> {
        self.expect(&[TokenKind::BlockOpen])?;
        let mut statements = Vec::new();

        loop {
            match self.tokens.peek().kind {
                TokenKind::BlockClose => {
                    self.tokens.next_token();
                    break;
                }
                TokenKind::Terminator => {
                    self.tokens.next_token();
                }
                kind if kind.is_statement_keyword() => statements.push(self.statement()?),
                _ => return self.unexpected_next(BLOCK_LEVEL_KINDS),
            }
        }

        Ok(BlockNode {
            position,
            statements,
        })
    }

    // === STATEMENTS ===

    fn statement(&mut self) -> SyntaxResult<Statement> {
        match self.tokens.peek().kind {
            TokenKind::Set => self.set_statement().map(Statement::Set),
            TokenKind::Get => self.get_statement().map(Statement::Get),
            TokenKind::Var => self.var_statement().map(Statement::Var),
            TokenKind::At => self.at_statement().map(Statement::At),
            TokenKind::When => self.when_statement().map(Statement::When),
            _ => self.unexpected_next(TokenKind::statement_kinds()),
        }
    }

    fn set_statement(&mut self) -> SyntaxResult<SetStatementNode> {
        let keyword = self.expect(&[TokenKind::Set])?;
        let device_match = self.path_match()?;
        let value = self.value()?;
        Ok(SetStatementNode {
            position: keyword.position,
            device_match,
            value,
        })
    }

    fn get_statement(&mut self) -> SyntaxResult<GetStatementNode> {
        let keyword = self.expect(&[TokenKind::Get])?;
        let device_match = self.path_match()?;
        Ok(GetStatementNode {
            position: keyword.position,
            device_match,
        })
    }

    fn var_statement(&mut self) -> SyntaxResult<VarStatementNode> {
        let keyword = self.expect(&[TokenKind::Var])?;
        let name = self.expect(&[TokenKind::Word])?;
        self.expect(&[TokenKind::Assign])?;
        let value = self.value()?;
        Ok(VarStatementNode {
            position: keyword.position,
            name: name.text,
            value,
        })
    }

    fn at_statement(&mut self) -> SyntaxResult<AtStatementNode> {
        let keyword = self.expect(&[TokenKind::At])?;
        let time_token = self.expect(&[TokenKind::Time])?;
        let time = self.time_literal(time_token)?;
        let body = self.block()?;
        Ok(AtStatementNode {
            position: keyword.position,
            time,
            body,
        })
    }

    fn when_statement(&mut self) -> SyntaxResult<WhenStatementNode> {
        let keyword = self.expect(&[TokenKind::When])?;
        let condition = self.condition()?;
        let body = self.block()?;
        Ok(WhenStatementNode {
            position: keyword.position,
            condition,
            body,
        })
    }

    // === CONDITIONS, PATHS, VALUES ===

    fn condition(&mut self) -> SyntaxResult<ConditionNode> {
        let device_match = self.path_match()?;
        let operator_token = self.expect(&[TokenKind::Operator])?;
        let operator = ComparisonOperator::from_symbol(&operator_token.text).ok_or_else(|| {
            SyntaxError::unexpected(
                operator_token.position,
                operator_token.kind,
                operator_token.text.clone(),
                &[TokenKind::Operator],
            )
        })?;
        let value = self.value()?;
        Ok(ConditionNode {
            position: device_match.position,
            device_match,
            operator,
            value,
        })
    }

    fn path_match(&mut self) -> SyntaxResult<PathMatchNode> {
        let first = self.expect(SEGMENT_KINDS)?;
        let position = first.position;
        let mut segments = vec![segment(first)];

        while self.tokens.check(TokenKind::PathSeparator) {
            self.tokens.next_token();
            segments.push(segment(self.expect(SEGMENT_KINDS)?));
        }

        Ok(PathMatchNode { position, segments })
    }

    fn value(&mut self) -> SyntaxResult<ValueNode> {
        let token = self.expect(TokenKind::value_kinds())?;
        let kind = match token.kind {
            TokenKind::Time => return self.time_literal(token),
            TokenKind::Number => ValueKind::Number,
            TokenKind::Duration => ValueKind::Duration,
            TokenKind::Variable => ValueKind::Variable,
            _ => ValueKind::Word,
        };
        Ok(ValueNode::new(token.position, kind, token.text))
    }

    /// Normalise `TIME MERIDIEM?` to a 24-hour `HH:MM` literal
    fn time_literal(&mut self, token: Token) -> SyntaxResult<ValueNode> {
        let (hour, minute) = split_clock(&token)?;

        let hour = if self.tokens.check(TokenKind::Meridiem) {
            let meridiem = self.tokens.next_token();
            if !(1..=12).contains(&hour) {
                return Err(SyntaxError::InvalidLiteral {
                    position: token.position,
                    literal: format!("{} {}", token.text, meridiem.text),
                    reason: "12-hour times need an hour from 1 to 12".to_string(),
                });
            }
            let pm = meridiem.text.eq_ignore_ascii_case("pm");
            match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            }
        } else {
            hour
        };

        Ok(ValueNode::new(
            token.position,
            ValueKind::Time,
            format!("{:02}:{:02}", hour, minute),
        ))
    }
}

fn unexpected(token: Token, expected: &[TokenKind]) -> SyntaxError {
    SyntaxError::UnexpectedToken {
        position: token.position,
        found: token.kind,
        text: token.text,
        expected: expected.to_vec(),
    }
}

fn segment(token: Token) -> PathSegment {
    match token.kind {
        TokenKind::Wildcard => PathSegment::Wildcard,
        _ => PathSegment::Literal(token.text),
    }
}

fn split_clock(token: &Token) -> SyntaxResult<(u32, u32)> {
    let parsed = token
        .text
        .split_once(':')
        .and_then(|(h, m)| Some((h.parse::<u32>().ok()?, m.parse::<u32>().ok()?)));

    parsed.ok_or_else(|| SyntaxError::InvalidLiteral {
        position: token.position,
        literal: token.text.clone(),
        reason: "expected HH:MM".to_string(),
    })
}

/// Parse a full token sequence into a program
pub fn parse<T>(tokens: T) -> SyntaxResult<ProgramNode>
where
    T: IntoIterator<Item = Token>,
{
    Parser::new(tokens.into_iter()).parse_program()
}

/// Parse with an explicit block nesting limit
pub fn parse_with_max_depth<T>(tokens: T, max_depth: usize) -> SyntaxResult<ProgramNode>
where
    T: IntoIterator<Item = Token>,
{
    Parser::with_max_depth(tokens.into_iter(), max_depth).parse_program()
}
