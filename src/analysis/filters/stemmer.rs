use rust_stemmers::{Algorithm, Stemmer};

use crate::analysis::filter::TokenFilter;
use crate::analysis::token::{Token, TokenKind};

/// Replaces words by their stems. Numbers pass through.
pub struct StemmerFilter {
    pub algorithm: Algorithm,
}

impl StemmerFilter {
    pub fn new(algorithm: Algorithm) -> Self {
        StemmerFilter { algorithm }
    }

    pub fn stem(&self, word: &str) -> String {
        Stemmer::create(self.algorithm).stem(word).into_owned()
    }
}

impl TokenFilter for StemmerFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        let stemmer = Stemmer::create(self.algorithm);
        tokens
            .into_iter()
            .map(|mut token| {
                if token.kind == TokenKind::Word {
                    token.text = stemmer.stem(&token.text).into_owned();
                }
                token
            })
            .collect()
    }

    fn name(&self) -> &str {
        "stemmer"
    }

    fn clone_box(&self) -> Box<dyn TokenFilter> {
        Box::new(StemmerFilter { algorithm: self.algorithm })
    }
}
