//! Pipeline - source text through scanner, parser and evaluator
//!
//! Two front ends produce the same tree: `parse_source` scans on the calling
//! thread, `parse_source_concurrent` runs the scanner on its own thread behind
//! a bounded queue. Dropping the token stream on a syntax error cancels the
//! scanner.

mod error;

pub use error::{PipelineError, PipelineResult};

use crate::config::runtime::PipelinePreferences;
use crate::evaluation::{EvalResult, Evaluator, Scope};
use crate::grammar::ast::nodes::ProgramNode;
use crate::lexical::{scan, scan_concurrent};
use crate::syntax::parse_logged;

/// Scan and parse on the calling thread
pub fn parse_source(text: &str) -> PipelineResult<ProgramNode> {
    Ok(parse_logged(scan(text))?)
}

/// Scan on a dedicated thread feeding a queue of `capacity` tokens
pub fn parse_source_concurrent(text: &str, capacity: usize) -> PipelineResult<ProgramNode> {
    let tokens = scan_concurrent(text, capacity)?;
    Ok(parse_logged(tokens)?)
}

/// Pick the front end from preferences
pub fn parse_with_preferences(
    text: &str,
    preferences: &PipelinePreferences,
) -> PipelineResult<ProgramNode> {
    if preferences.concurrent_scanning {
        parse_source_concurrent(text, preferences.queue_capacity)
    } else {
        parse_source(text)
    }
}

/// Parse then evaluate with a fresh scope
pub fn run_source(text: &str, evaluator: &Evaluator) -> PipelineResult<EvalResult> {
    let program = parse_source(text)?;
    Ok(evaluator.evaluate_program(&program)?)
}

/// Parse then evaluate against caller-owned bindings
pub fn run_source_with_scope(
    text: &str,
    evaluator: &Evaluator,
    scope: &mut Scope,
    preferences: &PipelinePreferences,
) -> PipelineResult<EvalResult> {
    let program = parse_with_preferences(text, preferences)?;
    Ok(evaluator.program_with_scope(&program, scope)?)
}
