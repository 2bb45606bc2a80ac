use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

pub type DocId = u32;
pub type DocCount = u32;
pub type TermCount = u32;
pub type TermPos = u32;
pub type ValueSlot = u32;
pub type Revision = u32;
pub type BlockNumber = u32;

/// Slot number meaning "no slot".
pub const BAD_VALUENO: ValueSlot = u32::MAX;

/// Occurrence information for one term of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTerm {
    pub wdf: TermCount,
    pub positions: Vec<TermPos>,    // strictly increasing
}

/// A document as seen by indexing: data blob, terms with positions, values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    data: Vec<u8>,
    terms: BTreeMap<String, DocTerm>,
    values: BTreeMap<ValueSlot, Vec<u8>>,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) {
        self.data = data.into();
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Add `inc` to the wdf of `term` without recording a position.
    pub fn add_term(&mut self, term: &str, inc: TermCount) -> Result<()> {
        check_term(term)?;
        let entry = self.terms.entry(term.to_string()).or_default();
        entry.wdf = bump_wdf(term, entry.wdf, inc)?;
        Ok(())
    }

    /// Boolean terms have wdf 0 and never count towards the document length.
    pub fn add_boolean_term(&mut self, term: &str) -> Result<()> {
        self.add_term(term, 0)
    }

    pub fn add_posting(&mut self, term: &str, pos: TermPos, inc: TermCount) -> Result<()> {
        check_term(term)?;
        let entry = self.terms.entry(term.to_string()).or_default();
        entry.wdf = bump_wdf(term, entry.wdf, inc)?;
        if let Err(idx) = entry.positions.binary_search(&pos) {
            entry.positions.insert(idx, pos);
        }
        Ok(())
    }

    pub fn remove_term(&mut self, term: &str) -> Result<()> {
        match self.terms.remove(term) {
            Some(_) => Ok(()),
            None => Err(Error::invalid_argument(format!(
                "term '{}' is not present in the document", term
            ))),
        }
    }

    pub fn clear_terms(&mut self) {
        self.terms.clear();
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &DocTerm)> {
        self.terms.iter().map(|(t, d)| (t.as_str(), d))
    }

    pub fn term(&self, term: &str) -> Option<&DocTerm> {
        self.terms.get(term)
    }

    pub fn termlist_count(&self) -> usize {
        self.terms.len()
    }

    /// Sum of wdf over all terms.
    pub fn doclength(&self) -> TermCount {
        self.terms.values().map(|t| t.wdf).sum()
    }

    pub fn add_value(&mut self, slot: ValueSlot, value: impl Into<Vec<u8>>) {
        let value = value.into();
        if value.is_empty() {
            self.values.remove(&slot);
        } else {
            self.values.insert(slot, value);
        }
    }

    pub fn value(&self, slot: ValueSlot) -> Option<&[u8]> {
        self.values.get(&slot).map(|v| v.as_slice())
    }

    pub fn values(&self) -> impl Iterator<Item = (ValueSlot, &[u8])> {
        self.values.iter().map(|(s, v)| (*s, v.as_slice()))
    }

    pub fn clear_values(&mut self) {
        self.values.clear();
    }

    pub(crate) fn insert_term(&mut self, term: String, info: DocTerm) {
        self.terms.insert(term, info);
    }
}

/// A term must fit in a postlist chunk key once zero bytes are escaped.
fn check_term(term: &str) -> Result<()> {
    if term.is_empty() {
        return Err(Error::invalid_argument("empty termnames aren't allowed"));
    }
    let key_len = crate::index::posting::postlist_key(term.as_bytes()).len() + 4;
    if key_len > crate::storage::block::MAX_KEY_LEN {
        return Err(Error::invalid_argument(format!(
            "term too long ({} bytes, {} as a key): {:?}", term.len(), key_len, term
        )));
    }
    Ok(())
}

fn bump_wdf(term: &str, wdf: TermCount, inc: TermCount) -> Result<TermCount> {
    wdf.checked_add(inc).ok_or_else(|| {
        Error::invalid_argument(format!("wdf of term {:?} would overflow", term))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postings_accumulate_wdf_and_sorted_positions() {
        let mut doc = Document::new();
        doc.add_posting("fox", 5, 1).unwrap();
        doc.add_posting("fox", 2, 1).unwrap();
        doc.add_posting("fox", 5, 1).unwrap();
        doc.add_term("dog", 2).unwrap();

        let fox = doc.term("fox").unwrap();
        assert_eq!(fox.wdf, 3);
        assert_eq!(fox.positions, vec![2, 5]);
        assert_eq!(doc.doclength(), 5);
    }

    #[test]
    fn empty_term_is_rejected() {
        let mut doc = Document::new();
        let err = doc.add_term("", 1).unwrap_err();
        assert!(err.is(crate::core::error::ErrorKind::InvalidArgument));
    }

    #[test]
    fn terms_are_measured_as_escaped_keys() {
        let mut doc = Document::new();
        let zeros = "\0".repeat(200);
        let err = doc.add_term(&zeros, 1).unwrap_err();
        assert!(err.is(crate::core::error::ErrorKind::InvalidArgument));
        assert!(doc.add_posting(&zeros, 1, 1).is_err());
        assert_eq!(doc.termlist_count(), 0);

        // 246 plain bytes, two terminator bytes and a docid make 252.
        let longest = "x".repeat(246);
        doc.add_term(&longest, 1).unwrap();
        assert!(doc.add_term(&"x".repeat(247), 1).is_err());
        assert!(doc.add_term(&format!("{}\0", "x".repeat(245)), 1).is_err());
    }

    #[test]
    fn wdf_overflow_is_rejected() {
        let mut doc = Document::new();
        doc.add_term("big", TermCount::MAX - 1).unwrap();
        doc.add_term("big", 1).unwrap();
        let err = doc.add_term("big", 1).unwrap_err();
        assert!(err.is(crate::core::error::ErrorKind::InvalidArgument));
        assert!(doc.add_posting("big", 3, 1).is_err());
        assert_eq!(doc.term("big").unwrap().wdf, TermCount::MAX);
        assert!(doc.term("big").unwrap().positions.is_empty());
    }
}
