use std::sync::Arc;

use crate::backend::{DatabaseInternal, TermCursor};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{Advance, DocLengths, PostList};
use crate::weight::Weight;

/// One term's postings with the weight bound to it.
///
/// Without a weight every document weighs 0. Document lengths and unique
/// term counts are only looked up when the weight asks for them.
pub struct LeafPostList {
    cursor: Box<dyn TermCursor>,
    db: Arc<dyn DatabaseInternal>,
    weight: Option<Box<dyn Weight>>,
    lengths: Option<DocLengths>,
    need_unique: bool,
    need_wdf_max: bool,
}

impl LeafPostList {
    pub fn open(db: &Arc<dyn DatabaseInternal>, term: &str) -> Result<Self> {
        Ok(Self::from_cursor(db, db.open_post_list(term)?))
    }

    pub fn from_cursor(db: &Arc<dyn DatabaseInternal>, cursor: Box<dyn TermCursor>) -> Self {
        LeafPostList { cursor, db: db.clone(), weight: None, lengths: None, need_unique: false, need_wdf_max: false }
    }

    /// Another term's leaf sharing this one's storage handles.
    pub fn open_nearby(&self, term: &str) -> Result<Self> {
        Ok(Self::from_cursor(&self.db, self.cursor.open_nearby(term)?))
    }

    pub fn term(&self) -> &str {
        self.cursor.term()
    }

    pub fn collection_freq(&self) -> u64 {
        self.cursor.collection_freq()
    }

    /// Bind the weight. Only allowed once.
    pub fn set_termweight(&mut self, weight: Box<dyn Weight>) -> Result<()> {
        if self.weight.is_some() {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("term weight for '{}' already set", self.cursor.term()),
            ));
        }
        self.need_unique = weight.needs_unique_terms();
        self.need_wdf_max = weight.needs_wdf_doc_max();
        if weight.needs_doclength() || self.need_unique || self.need_wdf_max {
            self.lengths = Some(DocLengths::new(self.db.clone()));
        }
        self.weight = Some(weight);
        Ok(())
    }

    fn exhausted(&self) -> Advance {
        if self.cursor.at_end() { Advance::Exhausted } else { Advance::Unchanged }
    }
}

impl PostList for LeafPostList {
    fn termfreq_min(&self) -> DocCount {
        self.cursor.termfreq()
    }

    fn termfreq_max(&self) -> DocCount {
        self.cursor.termfreq()
    }

    fn termfreq_est(&self) -> DocCount {
        self.cursor.termfreq()
    }

    fn maxweight(&self) -> f64 {
        self.weight.as_ref().map_or(0.0, |w| w.maxpart())
    }

    fn recalc_maxweight(&mut self) -> f64 {
        self.maxweight()
    }

    fn docid(&self) -> DocId {
        self.cursor.docid()
    }

    fn weight(&mut self) -> Result<f64> {
        let Some(weight) = &self.weight else {
            return Ok(0.0);
        };
        let did = self.cursor.docid();
        let (doclen, unique, wdf_max) = match &mut self.lengths {
            Some(lengths) => {
                let doclen = lengths.doclength(did)?;
                let unique = if self.need_unique { lengths.unique_terms(did)? } else { 0 };
                let wdf_max = if self.need_wdf_max { lengths.wdf_doc_max(did)? } else { 0 };
                (doclen, unique, wdf_max)
            }
            None => (0, 0, 0),
        };
        Ok(weight.sumpart(self.cursor.wdf(), doclen, unique, wdf_max))
    }

    fn wdf(&self) -> TermCount {
        self.cursor.wdf()
    }

    fn at_end(&self) -> bool {
        self.cursor.at_end()
    }

    fn next(&mut self, _w_min: f64) -> Result<Advance> {
        self.cursor.next()?;
        Ok(self.exhausted())
    }

    fn skip_to(&mut self, did: DocId, _w_min: f64) -> Result<Advance> {
        if did > self.cursor.docid() {
            self.cursor.skip_to(did)?;
        }
        Ok(self.exhausted())
    }

    fn description(&self) -> String {
        format!("Leaf({})", self.cursor.term())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postlist::testing::{db, drain, drain_weights};
    use crate::weight::{Bm25Weight, BoolWeight, TfIdfWeight, WeightStats};

    #[test]
    fn walks_the_postings() {
        let db = db(&[&["a", "b"], &["b"], &["a"]]);
        let pl = LeafPostList::open(&db, "a").unwrap();
        assert_eq!(pl.termfreq_est(), 2);
        assert_eq!(drain(Box::new(pl)), vec![1, 3]);
        assert!(drain(Box::new(LeafPostList::open(&db, "zzz").unwrap())).is_empty());
    }

    #[test]
    fn weight_binds_once() {
        let db = db(&[&["a"]]);
        let mut pl = LeafPostList::open(&db, "a").unwrap();
        pl.set_termweight(Box::new(BoolWeight)).unwrap();
        let err = pl.set_termweight(Box::new(BoolWeight)).unwrap_err();
        assert!(err.is(ErrorKind::InvalidOperation));
    }

    #[test]
    fn weights_use_document_lengths() {
        let db = db(&[&["a", "x", "y", "z"], &["a"], &["b"]]);
        let mut w = Bm25Weight::default();
        let stats = WeightStats {
            collection_size: 3,
            average_length: db.avlength(),
            doclength_lower_bound: 1,
            doclength_upper_bound: 4,
            wdf_upper_bound: 1,
            termfreq: 2,
            collection_freq: 2,
            query_length: 1,
            wqf: 1,
            ..WeightStats::default()
        };
        w.init(&stats, 1.0);
        let mut pl = LeafPostList::open(&db, "a").unwrap();
        pl.set_termweight(Box::new(w)).unwrap();
        let weights = drain_weights(Box::new(pl), 0.0);
        assert_eq!(weights.len(), 2);
        // The shorter document scores higher.
        assert!(weights[1].1 > weights[0].1);
    }

    #[test]
    fn max_wdf_normalisation_reads_the_termlist() {
        // "a" once beside "x" three times, then "a" twice on its own.
        let db = db(&[&["a", "x", "x", "x"], &["a", "a"]]);
        let mut w = TfIdfWeight::new("mnn").unwrap();
        let stats = WeightStats { collection_size: 2, termfreq: 2, wdf_upper_bound: 2, wqf: 1, ..WeightStats::default() };
        w.init(&stats, 1.0);
        let mut pl = LeafPostList::open(&db, "a").unwrap();
        pl.set_termweight(Box::new(w)).unwrap();
        let weights = drain_weights(Box::new(pl), 0.0);
        assert_eq!(weights.len(), 2);
        assert!((weights[0].1 - 1.0 / 3.0).abs() < 1e-12);
        assert!((weights[1].1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn nearby_leaves_share_the_database() {
        let db = db(&[&["a"], &["b"]]);
        let pl = LeafPostList::open(&db, "a").unwrap();
        let other = pl.open_nearby("b").unwrap();
        assert_eq!(other.term(), "b");
        assert_eq!(drain(Box::new(other)), vec![2]);
    }
}
