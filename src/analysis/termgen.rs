use std::collections::BTreeMap;

use log::debug;
use rust_stemmers::Algorithm;

use crate::analysis::analyzer::Analyzer;
use crate::analysis::filters::stemmer::StemmerFilter;
use crate::analysis::filters::stopword::StopWordFilter;
use crate::analysis::token::TokenKind;
use crate::core::database::WritableDatabase;
use crate::core::error::Result;
use crate::core::types::{DocCount, Document, TermCount, TermPos};

/// Which forms of each word get indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StemStrategy {
    /// Only the word itself.
    None,
    /// The word with its position, plus its stem prefixed with `Z` and
    /// no position.
    #[default]
    Some,
    /// Only the stem, with the word's position.
    All,
}

/// Indexes text into a `Document`.
///
/// Positions carry on from one `index_text` call to the next so several
/// fields can go into one document without phrases matching across them
/// (see `increase_termpos`).
pub struct TermGenerator {
    analyzer: Analyzer,
    stemmer: Option<StemmerFilter>,
    strategy: StemStrategy,
    termpos: TermPos,
    spellings: Option<BTreeMap<String, DocCount>>,
}

impl Default for TermGenerator {
    fn default() -> Self {
        TermGenerator::new()
    }
}

impl TermGenerator {
    pub fn new() -> Self {
        TermGenerator::with_analyzer(Analyzer::simple())
    }

    pub fn with_analyzer(analyzer: Analyzer) -> Self {
        TermGenerator { analyzer, stemmer: None, strategy: StemStrategy::default(), termpos: 0, spellings: None }
    }

    pub fn set_stemmer(&mut self, algorithm: Algorithm) {
        self.stemmer = Some(StemmerFilter::new(algorithm));
    }

    pub fn set_stemming_strategy(&mut self, strategy: StemStrategy) {
        self.strategy = strategy;
    }

    /// Words in `stopper` are no longer indexed, though they still take up
    /// a position.
    pub fn set_stopper(&mut self, stopper: StopWordFilter) {
        self.analyzer.filters.push(Box::new(stopper));
    }

    /// Collect indexed words for the spelling table.
    pub fn enable_spelling(&mut self) {
        self.spellings.get_or_insert_with(BTreeMap::new);
    }

    pub fn termpos(&self) -> TermPos {
        self.termpos
    }

    /// Start a new document.
    pub fn set_termpos(&mut self, termpos: TermPos) {
        self.termpos = termpos;
    }

    pub fn increase_termpos(&mut self, delta: TermPos) {
        self.termpos = self.termpos.saturating_add(delta);
    }

    /// Index `text` into `doc`, each occurrence adding `wdf_inc` to the
    /// wdf. `prefix` goes in front of every term.
    pub fn index_text(&mut self, doc: &mut Document, text: &str, wdf_inc: TermCount, prefix: &str) -> Result<()> {
        self.index(doc, text, wdf_inc, prefix, true)
    }

    pub fn index_text_without_positions(
        &mut self,
        doc: &mut Document,
        text: &str,
        wdf_inc: TermCount,
        prefix: &str,
    ) -> Result<()> {
        self.index(doc, text, wdf_inc, prefix, false)
    }

    fn index(&mut self, doc: &mut Document, text: &str, wdf_inc: TermCount, prefix: &str, positions: bool) -> Result<()> {
        let (tokens, span) = self.analyzer.analyze_with_span(text);
        for token in &tokens {
            let pos = self.termpos + token.position;
            let stem = match (&self.stemmer, token.kind) {
                (Some(stemmer), TokenKind::Word) => Some(stemmer.stem(&token.text)),
                _ => None,
            };

            let plain = format!("{}{}", prefix, token.text);
            match (self.strategy, stem) {
                (StemStrategy::All, Some(stem)) => {
                    add(doc, &format!("{}{}", prefix, stem), pos, wdf_inc, positions)?;
                }
                (StemStrategy::Some, Some(stem)) => {
                    add(doc, &plain, pos, wdf_inc, positions)?;
                    doc.add_term(&format!("Z{}{}", prefix, stem), wdf_inc)?;
                }
                _ => add(doc, &plain, pos, wdf_inc, positions)?,
            }

            if prefix.is_empty() {
                if let Some(spellings) = &mut self.spellings {
                    *spellings.entry(token.text.clone()).or_insert(0) += 1;
                }
            }
        }
        self.termpos += span;
        Ok(())
    }

    /// Words collected for the spelling table since the last flush.
    pub fn spellings(&self) -> impl Iterator<Item = (&str, DocCount)> {
        self.spellings.iter().flatten().map(|(w, f)| (w.as_str(), *f))
    }

    /// Add the collected words to `db`'s spelling table.
    pub fn flush_spellings(&mut self, db: &mut WritableDatabase) -> Result<()> {
        let Some(spellings) = &mut self.spellings else {
            return Ok(());
        };
        debug!("adding {} words to the spelling table", spellings.len());
        for (word, freq) in std::mem::take(spellings) {
            db.add_spelling(&word, freq)?;
        }
        Ok(())
    }
}

fn add(doc: &mut Document, term: &str, pos: TermPos, wdf_inc: TermCount, positions: bool) -> Result<()> {
    if positions {
        doc.add_posting(term, pos, wdf_inc)
    } else {
        doc.add_term(term, wdf_inc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn some_strategy_adds_stems() {
        let mut tg = TermGenerator::new();
        tg.set_stemmer(Algorithm::English);
        let mut doc = Document::new();
        tg.index_text(&mut doc, "Running dogs ran 42", 1, "").unwrap();
        assert_eq!(doc.term("running").unwrap().positions, vec![1]);
        assert_eq!(doc.term("Zrun").unwrap().wdf, 1);
        assert!(doc.term("Zrun").unwrap().positions.is_empty());
        assert!(doc.term("Zdog").is_some());
        assert!(doc.term("42").is_some());
        assert!(doc.term("Z42").is_none());
        assert_eq!(tg.termpos(), 4);
    }

    #[test]
    fn positions_continue_across_fields() {
        let mut tg = TermGenerator::new();
        tg.set_stopper(StopWordFilter::english());
        let mut doc = Document::new();
        tg.index_text(&mut doc, "the fox", 1, "").unwrap();
        tg.increase_termpos(100);
        tg.index_text(&mut doc, "jumps over the fox", 2, "S").unwrap();
        assert!(doc.term("the").is_none());
        assert_eq!(doc.term("fox").unwrap().positions, vec![2]);
        assert_eq!(doc.term("Sjumps").unwrap().positions, vec![103]);
        assert_eq!(doc.term("Sfox").unwrap().wdf, 2);
        assert_eq!(doc.term("Sfox").unwrap().positions, vec![106]);
    }

    #[test]
    fn all_strategy_and_spelling() {
        let mut tg = TermGenerator::new();
        tg.set_stemmer(Algorithm::English);
        tg.set_stemming_strategy(StemStrategy::All);
        tg.enable_spelling();
        let mut doc = Document::new();
        tg.index_text(&mut doc, "cats cats", 1, "").unwrap();
        assert_eq!(doc.term("cat").unwrap().positions, vec![1, 2]);
        assert!(doc.term("cats").is_none());
        assert_eq!(tg.spellings().collect::<Vec<_>>(), vec![("cats", 2)]);
    }
}
