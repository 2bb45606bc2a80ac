use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::lowercase::LowercaseFilter;
use crate::analysis::filters::stopword::StopWordFilter;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer};
use crate::core::types::TermPos;

/// A tokenizer followed by a chain of filters.
pub struct Analyzer {
    pub tokenizer: Box<dyn Tokenizer>,
    pub filters: Vec<Box<dyn TokenFilter>>,
    pub name: String,
}

impl Clone for Analyzer {
    fn clone(&self) -> Self {
        Analyzer {
            tokenizer: self.tokenizer.clone_box(),
            filters: self.filters.iter().map(|f| f.clone_box()).collect(),
            name: self.name.clone(),
        }
    }
}

impl Analyzer {
    pub fn new(name: impl Into<String>, tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer { tokenizer, filters: Vec::new(), name: name.into() }
    }

    pub fn add_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);
        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }
        tokens
    }

    /// Like `analyze`, also returning how many positions the text took up,
    /// counting words the filters dropped.
    pub fn analyze_with_span(&self, text: &str) -> (Vec<Token>, TermPos) {
        let mut tokens = self.tokenizer.tokenize(text);
        let span = tokens.last().map_or(0, |t| t.position);
        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }
        (tokens, span)
    }

    /// Lowercased words with no stopwords removed.
    pub fn simple() -> Self {
        Analyzer::new("simple", Box::new(StandardTokenizer::default())).add_filter(Box::new(LowercaseFilter))
    }

    /// Lowercased words without English stopwords.
    pub fn standard_english() -> Self {
        Analyzer::simple().add_filter(Box::new(StopWordFilter::english()))
    }

    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_pipeline() {
        let analyzer = Analyzer::standard_english();
        let tokens = analyzer.analyze("The Cat sat on the Mat");
        let words: Vec<(&str, u32)> = tokens.iter().map(|t| (t.text.as_str(), t.position)).collect();
        assert_eq!(words, vec![("cat", 2), ("sat", 3), ("mat", 6)]);
        assert_eq!(analyzer.filter_names(), vec!["lowercase", "stop_words"]);
    }
}
