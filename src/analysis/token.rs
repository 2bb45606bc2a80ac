use serde::{Deserialize, Serialize};

use crate::core::types::TermPos;

/// One word of the input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    /// 1-based, counting every word the tokenizer saw.
    pub position: TermPos,
    /// Byte offset in the original text.
    pub offset: usize,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Word,
    /// Starts with a digit; never stemmed.
    Number,
}

impl Token {
    pub fn new(text: String, position: TermPos, offset: usize) -> Self {
        let kind = if text.starts_with(|c: char| c.is_numeric()) { TokenKind::Number } else { TokenKind::Word };
        Token { text, position, offset, kind }
    }
}
