//! Grammar definitions for the hearth language

pub mod ast;

// Re-export AST types
pub use ast::nodes::*;
