//! Shared utilities

pub mod span;

pub use span::Position;
