//! Storage backends and the capability set the matcher relies on.
//!
//! The matcher and query compiler only ever talk to `DatabaseInternal`;
//! `brass` reads the on-disk format, `inmemory` keeps everything in maps.

pub mod brass;
pub mod brass_check;
pub mod brass_writer;
pub mod const_wrapper;
pub mod inmemory;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocCount, DocId, Document, TermCount, TermPos, ValueSlot};

/// Raw postings of one term.
///
/// A fresh cursor sits before its first entry; `next()` moves onto it. An
/// absent term gives a cursor with a termfreq of 0 which goes straight to
/// the end. The postings of the empty term list every document, with the
/// document length as the wdf.
pub trait TermCursor: Send {
    fn term(&self) -> &str;
    fn termfreq(&self) -> DocCount;
    fn collection_freq(&self) -> u64;
    /// 0 before the first `next()`.
    fn docid(&self) -> DocId;
    fn wdf(&self) -> TermCount;
    fn at_end(&self) -> bool;
    fn next(&mut self) -> Result<()>;
    /// Move to the first entry with docid >= `did`; never moves backwards.
    fn skip_to(&mut self, did: DocId) -> Result<()>;
    /// Open another term's postings sharing this cursor's storage handles.
    fn open_nearby(&self, term: &str) -> Result<Box<dyn TermCursor>>;
}

/// Positions of one term in one document, ascending.
pub trait PositionList: Send {
    fn size(&self) -> TermCount;
    fn position(&self) -> TermPos;
    fn at_end(&self) -> bool;
    /// Returns false once past the last position.
    fn next(&mut self) -> Result<bool>;
    /// Move to the first position >= `pos`; never moves backwards.
    fn skip_to(&mut self, pos: TermPos) -> Result<bool>;
}

/// Documents with a value in one slot, in docid order.
pub trait ValueCursor: Send {
    fn docid(&self) -> DocId;
    fn value(&self) -> &[u8];
    fn at_end(&self) -> bool;
    fn next(&mut self) -> Result<()>;
    fn skip_to(&mut self, did: DocId) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermListEntry {
    pub term: String,
    pub wdf: TermCount,
}

/// Frequency and bounds of the values stored in one slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueStats {
    pub freq: DocCount,
    pub lower_bound: Vec<u8>,
    pub upper_bound: Vec<u8>,
}

fn read_only(what: &str) -> Error {
    Error::new(ErrorKind::InvalidOperation, format!("{} is read-only", what))
}

pub trait DatabaseInternal: Send + Sync {
    fn doccount(&self) -> DocCount;
    fn last_docid(&self) -> DocId;
    fn total_length(&self) -> u64;

    fn avlength(&self) -> f64 {
        match self.doccount() {
            0 => 0.0,
            n => self.total_length() as f64 / n as f64,
        }
    }

    fn doclength_lower_bound(&self) -> TermCount;
    fn doclength_upper_bound(&self) -> TermCount;
    /// Upper bound on the wdf of `term` in any one document.
    fn wdf_upper_bound(&self, term: &str) -> Result<TermCount>;

    fn termfreq(&self, term: &str) -> Result<DocCount>;
    fn collection_freq(&self, term: &str) -> Result<u64>;

    fn term_exists(&self, term: &str) -> Result<bool> {
        if term.is_empty() {
            return Ok(self.doccount() > 0);
        }
        Ok(self.termfreq(term)? > 0)
    }

    /// `DocNotFound` if there's no such document.
    fn doclength(&self, did: DocId) -> Result<TermCount>;
    fn unique_terms(&self, did: DocId) -> Result<TermCount>;

    /// Largest wdf of any term in the document.
    fn wdf_doc_max(&self, did: DocId) -> Result<TermCount> {
        Ok(self.open_term_list(did)?.iter().map(|e| e.wdf).max().unwrap_or(0))
    }

    fn open_post_list(&self, term: &str) -> Result<Box<dyn TermCursor>>;
    fn open_term_list(&self, did: DocId) -> Result<Vec<TermListEntry>>;
    /// Empty if the document has no positions for the term.
    fn open_position_list(&self, did: DocId, term: &str) -> Result<Box<dyn PositionList>>;
    fn has_positions(&self) -> bool;

    fn get_value(&self, did: DocId, slot: ValueSlot) -> Result<Option<Vec<u8>>>;
    fn open_value_stream(&self, slot: ValueSlot) -> Result<Box<dyn ValueCursor>>;
    fn value_stats(&self, slot: ValueSlot) -> Result<ValueStats>;

    fn get_metadata(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn metadata_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Terms starting with `prefix`, in byte order.
    fn all_terms(&self, prefix: &str) -> Result<Vec<String>>;

    fn open_document(&self, did: DocId) -> Result<Document>;

    fn synonyms(&self, term: &str) -> Result<Vec<String>>;
    fn synonym_keys(&self, prefix: &str) -> Result<Vec<String>>;

    fn spelling_frequency(&self, word: &str) -> Result<DocCount>;
    /// Every word in the spelling table with its frequency.
    fn spelling_words(&self) -> Result<Vec<(String, DocCount)>>;

    fn description(&self) -> String;

    fn add_document(&mut self, _doc: &Document) -> Result<DocId> {
        Err(read_only(&self.description()))
    }

    fn replace_document(&mut self, _did: DocId, _doc: &Document) -> Result<()> {
        Err(read_only(&self.description()))
    }

    fn delete_document(&mut self, _did: DocId) -> Result<()> {
        Err(read_only(&self.description()))
    }

    fn set_metadata(&mut self, _key: &[u8], _value: &[u8]) -> Result<()> {
        Err(read_only(&self.description()))
    }

    fn commit(&mut self) -> Result<()> {
        Err(read_only(&self.description()))
    }
}

pub(crate) fn doc_not_found(did: DocId) -> Error {
    Error::new(ErrorKind::DocNotFound, format!("document {} not found", did))
}

/// Position list held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecPositionList {
    positions: Vec<TermPos>,
    /// Index of the current position, None before the first.
    idx: Option<usize>,
}

impl VecPositionList {
    pub fn new(positions: Vec<TermPos>) -> Self {
        VecPositionList { positions, idx: None }
    }
}

impl PositionList for VecPositionList {
    fn size(&self) -> TermCount {
        self.positions.len() as TermCount
    }

    fn position(&self) -> TermPos {
        self.idx.and_then(|i| self.positions.get(i).copied()).unwrap_or(0)
    }

    fn at_end(&self) -> bool {
        matches!(self.idx, Some(i) if i >= self.positions.len())
    }

    fn next(&mut self) -> Result<bool> {
        let i = self.idx.map_or(0, |i| i + 1).min(self.positions.len());
        self.idx = Some(i);
        Ok(i < self.positions.len())
    }

    fn skip_to(&mut self, pos: TermPos) -> Result<bool> {
        let start = self.idx.unwrap_or(0).min(self.positions.len());
        let i = start + self.positions[start..].partition_point(|&p| p < pos);
        self.idx = Some(i);
        Ok(i < self.positions.len())
    }
}

/// Postings held in memory, shared with the database that built them.
pub struct VecTermCursor {
    term: String,
    postings: std::sync::Arc<Vec<(DocId, TermCount)>>,
    collection_freq: u64,
    idx: Option<usize>,
    nearby: Option<std::sync::Arc<dyn Fn(&str) -> Result<Box<dyn TermCursor>> + Send + Sync>>,
}

impl VecTermCursor {
    pub fn new(term: &str, postings: std::sync::Arc<Vec<(DocId, TermCount)>>, collection_freq: u64) -> Self {
        VecTermCursor { term: term.to_string(), postings, collection_freq, idx: None, nearby: None }
    }

    /// Let `open_nearby` go back to the owning database.
    pub fn with_opener(
        mut self,
        opener: std::sync::Arc<dyn Fn(&str) -> Result<Box<dyn TermCursor>> + Send + Sync>,
    ) -> Self {
        self.nearby = Some(opener);
        self
    }
}

impl TermCursor for VecTermCursor {
    fn term(&self) -> &str {
        &self.term
    }

    fn termfreq(&self) -> DocCount {
        self.postings.len() as DocCount
    }

    fn collection_freq(&self) -> u64 {
        self.collection_freq
    }

    fn docid(&self) -> DocId {
        match self.idx {
            Some(i) => self.postings.get(i).map_or(0, |p| p.0),
            None => 0,
        }
    }

    fn wdf(&self) -> TermCount {
        self.idx.and_then(|i| self.postings.get(i)).map_or(0, |p| p.1)
    }

    fn at_end(&self) -> bool {
        matches!(self.idx, Some(i) if i >= self.postings.len())
    }

    fn next(&mut self) -> Result<()> {
        self.idx = Some(self.idx.map_or(0, |i| i + 1).min(self.postings.len()));
        Ok(())
    }

    fn skip_to(&mut self, did: DocId) -> Result<()> {
        let start = self.idx.unwrap_or(0).min(self.postings.len());
        let i = start + self.postings[start..].partition_point(|p| p.0 < did);
        self.idx = Some(i);
        Ok(())
    }

    fn open_nearby(&self, term: &str) -> Result<Box<dyn TermCursor>> {
        match &self.nearby {
            Some(opener) => opener(term),
            None => Err(Error::unimplemented("this postlist can't open other terms")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn vec_position_list_skips_forward_only() {
        let mut pl = VecPositionList::new(vec![2, 5, 9]);
        assert!(!pl.at_end());
        assert!(pl.skip_to(4).unwrap());
        assert_eq!(pl.position(), 5);
        assert!(pl.skip_to(1).unwrap());
        assert_eq!(pl.position(), 5);
        assert!(pl.next().unwrap());
        assert_eq!(pl.position(), 9);
        assert!(!pl.next().unwrap());
        assert!(pl.at_end());
    }

    #[test]
    fn vec_term_cursor_starts_before_first() {
        let mut tc = VecTermCursor::new("t", Arc::new(vec![(1, 2), (4, 1), (7, 3)]), 6);
        assert_eq!(tc.docid(), 0);
        tc.skip_to(2).unwrap();
        assert_eq!((tc.docid(), tc.wdf()), (4, 1));
        tc.next().unwrap();
        assert_eq!(tc.docid(), 7);
        tc.next().unwrap();
        assert!(tc.at_end());
    }
}
