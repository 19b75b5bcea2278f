//! # Hearth REPL
//!
//! Line-oriented shell over the hearth language. The read loop lives in
//! `session`; `main.rs` only wires flags, logging and the device store.

pub mod session;

pub use session::{LineOutcome, Session};
