//! Syntax analysis - token sequence to AST
//!
//! `parse` pulls tokens on demand from any token iterator, so the same parser
//! serves the in-thread `Scanner` and the concurrent pipeline.

mod error;
mod parser;

pub use error::{SyntaxError, SyntaxResult};
pub use parser::{parse, parse_with_max_depth, Parser};

use crate::grammar::ast::nodes::ProgramNode;
use crate::logging::codes;
use crate::tokens::Token;
use crate::{log_debug, log_success};

/// Parse with logging of the outcome
pub fn parse_logged<T>(tokens: T) -> SyntaxResult<ProgramNode>
where
    T: IntoIterator<Item = Token>,
{
    let result = parse(tokens);

    match &result {
        Ok(program) => {
            log_success!(
                codes::success::PARSE_COMPLETE,
                "Syntax analysis completed successfully",
                "statements" => program.statements.len()
            );
        }
        Err(error) => {
            log_debug!("Syntax analysis failed",
                "code" => error.error_code(),
                "position" => error.position(),
                "error" => error
            );
        }
    }

    result
}
