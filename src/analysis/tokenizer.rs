use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::token::Token;
use crate::core::types::TermPos;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn name(&self) -> &str;

    fn clone_box(&self) -> Box<dyn Tokenizer>;
}

/// Splits on Unicode word boundaries. Words longer than
/// `max_token_length` bytes are dropped but still take up a position.
#[derive(Debug, Clone)]
pub struct StandardTokenizer {
    pub max_token_length: usize,
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        // Longest term the postlist key format can carry.
        StandardTokenizer { max_token_length: 245 }
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        for (i, (offset, word)) in text.unicode_word_indices().enumerate() {
            if word.len() <= self.max_token_length {
                tokens.push(Token::new(word.to_string(), i as TermPos + 1, offset));
            }
        }
        tokens
    }

    fn name(&self) -> &str {
        "standard"
    }

    fn clone_box(&self) -> Box<dyn Tokenizer> {
        Box::new(self.clone())
    }
}
