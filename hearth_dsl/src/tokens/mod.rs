//! Token system for hearth lexical analysis
//!
//! - **[`Token`]** - immutable `{position, kind, text}` value
//! - **[`TokenKind`]** - closed set of token kinds
//! - **[`TokenStream`]** - one-token lookahead used by the parser

pub mod token;
pub mod token_stream;

pub use token::{keyword_kind, Token, TokenKind};
pub use token_stream::TokenStream;
