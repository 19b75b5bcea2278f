//! Hearth device command language
//!
//! Scanner, parser and tree-walking evaluator for commands such as
//! `set living_room.light on`, `get porch.light`, `at 17:30 { ... }` and
//! `when hall.motion == on { ... }`. Device state lives behind the
//! `evaluation::DeviceStore` trait.

pub mod config;
pub mod evaluation;
pub mod grammar;
pub mod lexical;
#[macro_use]
pub mod logging;
pub mod pipeline;
pub mod syntax;
pub mod tokens;
pub mod utils;

// Re-export key types for library consumers
pub use evaluation::{DeviceStore, EvalResult, Evaluator, RuntimeError, Value};
pub use grammar::ast::nodes::{Node, ProgramNode};
pub use lexical::{scan, LexError};
pub use pipeline::{parse_source, run_source, PipelineError, PipelineResult};
pub use syntax::{parse, SyntaxError};
pub use utils::Position;
