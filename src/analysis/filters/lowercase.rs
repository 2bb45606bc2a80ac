use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

/// Folds words to lower case so `Fox` and `fox` index as one term.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowercaseFilter;

impl LowercaseFilter {
    pub fn fold(text: &str) -> Option<String> {
        text.chars().any(char::is_uppercase).then(|| text.to_lowercase())
    }
}

impl TokenFilter for LowercaseFilter {
    fn filter(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        for token in &mut tokens {
            if let Some(folded) = LowercaseFilter::fold(&token.text) {
                token.text = folded;
            }
        }
        tokens
    }

    fn name(&self) -> &str {
        "lowercase"
    }

    fn clone_box(&self) -> Box<dyn TokenFilter> {
        Box::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_only_when_needed() {
        assert_eq!(LowercaseFilter::fold("already"), None);
        assert_eq!(LowercaseFilter::fold("ÉCOLE").as_deref(), Some("école"));
    }
}
