//! Turning text into index terms.

pub mod analyzer;
pub mod filter;
pub mod filters;
pub mod termgen;
pub mod token;
pub mod tokenizer;

pub use analyzer::Analyzer;
pub use termgen::{StemStrategy, TermGenerator};
pub use token::{Token, TokenKind};
