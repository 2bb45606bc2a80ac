//! Database held entirely in memory.
//!
//! Postings are kept per term as shared vectors so cursors can be handed
//! out without copying; a mutation clones a list only while a cursor still
//! holds the old one. The empty term's list is the document length stream.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::{
    doc_not_found, DatabaseInternal, PositionList, TermCursor, TermListEntry, ValueCursor,
    ValueStats, VecPositionList, VecTermCursor,
};
use crate::core::error::{Error, Result};
use crate::core::types::{DocCount, DocId, Document, TermCount, ValueSlot};
use crate::index::metadata::check_metadata_key;
use crate::index::synonym::insert_sorted;

#[derive(Debug, Clone, Default)]
struct TermEntry {
    postings: Arc<Vec<(DocId, TermCount)>>,
    collection_freq: u64,
}

type TermMap = BTreeMap<String, TermEntry>;

#[derive(Default)]
pub struct InMemoryDatabase {
    terms: Arc<TermMap>,
    docs: BTreeMap<DocId, Document>,
    last_docid: DocId,
    total_length: u64,
    metadata: BTreeMap<Vec<u8>, Vec<u8>>,
    synonyms: BTreeMap<String, Vec<String>>,
    spellings: BTreeMap<String, DocCount>,
}

fn open_cursor(terms: &Arc<TermMap>, term: &str) -> Box<dyn TermCursor> {
    let (postings, cf) = match terms.get(term) {
        Some(entry) => (entry.postings.clone(), entry.collection_freq),
        None => (Arc::new(Vec::new()), 0),
    };
    let snapshot = terms.clone();
    let opener = Arc::new(move |t: &str| -> Result<Box<dyn TermCursor>> { Ok(open_cursor(&snapshot, t)) });
    Box::new(VecTermCursor::new(term, postings, cf).with_opener(opener))
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        InMemoryDatabase::default()
    }

    fn document(&self, did: DocId) -> Result<&Document> {
        self.docs.get(&did).ok_or_else(|| doc_not_found(did))
    }

    fn insert_postings(&mut self, did: DocId, doc: &Document) {
        let terms = Arc::make_mut(&mut self.terms);
        let doclen = doc.doclength();
        let mut stream = doc.terms().map(|(t, info)| (t, info.wdf)).collect::<Vec<_>>();
        stream.push(("", doclen));
        for (term, wdf) in stream {
            let entry = terms.entry(term.to_string()).or_default();
            let list = Arc::make_mut(&mut entry.postings);
            match list.binary_search_by_key(&did, |p| p.0) {
                Ok(i) => list[i].1 = wdf,
                Err(i) => list.insert(i, (did, wdf)),
            }
            entry.collection_freq += wdf as u64;
        }
        self.total_length += doclen as u64;
    }

    fn remove_postings(&mut self, did: DocId, doc: &Document) {
        let terms = Arc::make_mut(&mut self.terms);
        let mut stream = doc.terms().map(|(t, _)| t).collect::<Vec<_>>();
        stream.push("");
        for term in stream {
            let Some(entry) = terms.get_mut(term) else { continue };
            let list = Arc::make_mut(&mut entry.postings);
            if let Ok(i) = list.binary_search_by_key(&did, |p| p.0) {
                entry.collection_freq -= list[i].1 as u64;
                list.remove(i);
            }
            if list.is_empty() {
                terms.remove(term);
            }
        }
        self.total_length -= doc.doclength() as u64;
    }

    pub fn add_synonym(&mut self, term: &str, synonym: &str) -> Result<()> {
        if term.is_empty() || synonym.is_empty() {
            return Err(Error::invalid_argument("empty synonym"));
        }
        insert_sorted(self.synonyms.entry(term.to_string()).or_default(), synonym);
        Ok(())
    }

    pub fn add_spelling(&mut self, word: &str, inc: DocCount) -> Result<()> {
        if word.is_empty() {
            return Err(Error::invalid_argument("empty spelling word"));
        }
        *self.spellings.entry(word.to_string()).or_default() += inc;
        Ok(())
    }
}

impl DatabaseInternal for InMemoryDatabase {
    fn doccount(&self) -> DocCount {
        self.docs.len() as DocCount
    }

    fn last_docid(&self) -> DocId {
        self.last_docid
    }

    fn total_length(&self) -> u64 {
        self.total_length
    }

    fn doclength_lower_bound(&self) -> TermCount {
        self.docs.values().map(|d| d.doclength()).min().unwrap_or(0)
    }

    fn doclength_upper_bound(&self) -> TermCount {
        self.docs.values().map(|d| d.doclength()).max().unwrap_or(0)
    }

    fn wdf_upper_bound(&self, term: &str) -> Result<TermCount> {
        Ok(self.terms.get(term).and_then(|e| e.postings.iter().map(|p| p.1).max()).unwrap_or(0))
    }

    fn termfreq(&self, term: &str) -> Result<DocCount> {
        Ok(self.terms.get(term).map_or(0, |e| e.postings.len() as DocCount))
    }

    fn collection_freq(&self, term: &str) -> Result<u64> {
        Ok(self.terms.get(term).map_or(0, |e| e.collection_freq))
    }

    fn doclength(&self, did: DocId) -> Result<TermCount> {
        Ok(self.document(did)?.doclength())
    }

    fn unique_terms(&self, did: DocId) -> Result<TermCount> {
        Ok(self.document(did)?.termlist_count() as TermCount)
    }

    fn wdf_doc_max(&self, did: DocId) -> Result<TermCount> {
        Ok(self.document(did)?.terms().map(|(_, t)| t.wdf).max().unwrap_or(0))
    }

    fn open_post_list(&self, term: &str) -> Result<Box<dyn TermCursor>> {
        Ok(open_cursor(&self.terms, term))
    }

    fn open_term_list(&self, did: DocId) -> Result<Vec<TermListEntry>> {
        Ok(self.document(did)?
            .terms()
            .map(|(term, info)| TermListEntry { term: term.to_string(), wdf: info.wdf })
            .collect())
    }

    fn open_position_list(&self, did: DocId, term: &str) -> Result<Box<dyn PositionList>> {
        let positions = self.docs.get(&did)
            .and_then(|d| d.term(term))
            .map(|t| t.positions.clone())
            .unwrap_or_default();
        Ok(Box::new(VecPositionList::new(positions)))
    }

    fn has_positions(&self) -> bool {
        self.docs.values().any(|d| d.terms().any(|(_, t)| !t.positions.is_empty()))
    }

    fn get_value(&self, did: DocId, slot: ValueSlot) -> Result<Option<Vec<u8>>> {
        Ok(self.docs.get(&did).and_then(|d| d.value(slot)).map(|v| v.to_vec()))
    }

    fn open_value_stream(&self, slot: ValueSlot) -> Result<Box<dyn ValueCursor>> {
        let entries = self.docs.iter()
            .filter_map(|(did, d)| d.value(slot).map(|v| (*did, v.to_vec())))
            .collect();
        Ok(Box::new(VecValueCursor { entries, idx: None }))
    }

    fn value_stats(&self, slot: ValueSlot) -> Result<ValueStats> {
        let mut stats = ValueStats::default();
        for doc in self.docs.values() {
            if let Some(v) = doc.value(slot) {
                stats.add(v);
            }
        }
        Ok(stats)
    }

    fn get_metadata(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        check_metadata_key(key)?;
        Ok(self.metadata.get(key).cloned())
    }

    fn metadata_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self.metadata.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    fn all_terms(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self.terms.keys()
            .filter(|t| !t.is_empty() && t.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn open_document(&self, did: DocId) -> Result<Document> {
        self.document(did).cloned()
    }

    fn synonyms(&self, term: &str) -> Result<Vec<String>> {
        Ok(self.synonyms.get(term).cloned().unwrap_or_default())
    }

    fn synonym_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self.synonyms.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    fn spelling_frequency(&self, word: &str) -> Result<DocCount> {
        Ok(self.spellings.get(word).copied().unwrap_or(0))
    }

    fn spelling_words(&self) -> Result<Vec<(String, DocCount)>> {
        Ok(self.spellings.iter().map(|(w, f)| (w.clone(), *f)).collect())
    }

    fn description(&self) -> String {
        format!("InMemory({} documents)", self.docs.len())
    }

    fn add_document(&mut self, doc: &Document) -> Result<DocId> {
        let did = self.last_docid + 1;
        self.replace_document(did, doc)?;
        Ok(did)
    }

    fn replace_document(&mut self, did: DocId, doc: &Document) -> Result<()> {
        if did == 0 {
            return Err(Error::invalid_argument("docid 0 is invalid"));
        }
        if let Some(old) = self.docs.remove(&did) {
            self.remove_postings(did, &old);
        }
        self.insert_postings(did, doc);
        self.docs.insert(did, doc.clone());
        self.last_docid = self.last_docid.max(did);
        Ok(())
    }

    fn delete_document(&mut self, did: DocId) -> Result<()> {
        let old = self.docs.remove(&did).ok_or_else(|| doc_not_found(did))?;
        self.remove_postings(did, &old);
        Ok(())
    }

    fn set_metadata(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        check_metadata_key(key)?;
        if value.is_empty() {
            self.metadata.remove(key);
        } else {
            self.metadata.insert(key.to_vec(), value.to_vec());
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

struct VecValueCursor {
    entries: Vec<(DocId, Vec<u8>)>,
    idx: Option<usize>,
}

impl VecValueCursor {
    fn current(&self) -> Option<&(DocId, Vec<u8>)> {
        self.idx.and_then(|i| self.entries.get(i))
    }
}

impl ValueCursor for VecValueCursor {
    fn docid(&self) -> DocId {
        self.current().map_or(0, |e| e.0)
    }

    fn value(&self) -> &[u8] {
        self.current().map_or(&[], |e| e.1.as_slice())
    }

    fn at_end(&self) -> bool {
        matches!(self.idx, Some(i) if i >= self.entries.len())
    }

    fn next(&mut self) -> Result<()> {
        self.idx = Some(self.idx.map_or(0, |i| i + 1).min(self.entries.len()));
        Ok(())
    }

    fn skip_to(&mut self, did: DocId) -> Result<()> {
        let start = self.idx.unwrap_or(0).min(self.entries.len());
        self.idx = Some(start + self.entries[start..].partition_point(|e| e.0 < did));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> InMemoryDatabase {
        let mut db = InMemoryDatabase::new();
        let mut a = Document::new();
        a.add_term("cat", 1).unwrap();
        a.add_term("dog", 2).unwrap();
        a.add_value(0, b"b".to_vec());
        db.add_document(&a).unwrap();
        let mut b = Document::new();
        b.add_term("cat", 3).unwrap();
        b.add_value(0, b"a".to_vec());
        db.add_document(&b).unwrap();
        db
    }

    #[test]
    fn statistics_follow_mutations() {
        let mut db = db();
        assert_eq!(db.doccount(), 2);
        assert_eq!(db.termfreq("cat").unwrap(), 2);
        assert_eq!(db.collection_freq("cat").unwrap(), 4);
        assert_eq!(db.total_length(), 6);
        assert_eq!(db.all_terms("").unwrap(), vec!["cat".to_string(), "dog".to_string()]);
        db.delete_document(1).unwrap();
        assert_eq!(db.termfreq("dog").unwrap(), 0);
        assert_eq!(db.total_length(), 3);
        assert_eq!(db.value_stats(0).unwrap().lower_bound, b"a".to_vec());
    }

    #[test]
    fn cursors_survive_later_writes() {
        let mut db = db();
        let mut pl = db.open_post_list("cat").unwrap();
        db.delete_document(1).unwrap();
        pl.next().unwrap();
        assert_eq!(pl.docid(), 1);
        let mut nearby = pl.open_nearby("dog").unwrap();
        nearby.next().unwrap();
        assert_eq!((nearby.docid(), nearby.wdf()), (1, 2));
    }

    #[test]
    fn doclength_stream_is_the_empty_term() {
        let db = db();
        let mut pl = db.open_post_list("").unwrap();
        pl.next().unwrap();
        assert_eq!((pl.docid(), pl.wdf()), (1, 3));
        assert_eq!(pl.termfreq(), 2);
    }
}
