use std::sync::Arc;

use crate::backend::DatabaseInternal;
use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{next_child, skip_child, Advance, DocLengths, PostList, PruneSignal};
use crate::weight::Weight;

/// Treats the union of its children as occurrences of one term: the wdfs
/// of the matching children are summed and weighed together.
///
/// The children carry no weight of their own.
pub struct SynonymPostList {
    subtree: Box<dyn PostList>,
    weight: Box<dyn Weight>,
    lengths: Option<DocLengths>,
    need_unique: bool,
    need_wdf_max: bool,
    signal: PruneSignal,
}

impl SynonymPostList {
    pub fn new(
        subtree: Box<dyn PostList>,
        weight: Box<dyn Weight>,
        db: &Arc<dyn DatabaseInternal>,
        signal: PruneSignal,
    ) -> Self {
        let need_unique = weight.needs_unique_terms();
        let need_wdf_max = weight.needs_wdf_doc_max();
        let lengths = (weight.needs_doclength() || need_unique || need_wdf_max).then(|| DocLengths::new(db.clone()));
        SynonymPostList { subtree, weight, lengths, need_unique, need_wdf_max, signal }
    }

    fn state(&self) -> Advance {
        if self.subtree.at_end() { Advance::Exhausted } else { Advance::Unchanged }
    }
}

impl PostList for SynonymPostList {
    fn termfreq_min(&self) -> DocCount {
        self.subtree.termfreq_min()
    }

    fn termfreq_max(&self) -> DocCount {
        self.subtree.termfreq_max()
    }

    fn termfreq_est(&self) -> DocCount {
        self.subtree.termfreq_est()
    }

    fn maxweight(&self) -> f64 {
        self.weight.maxpart()
    }

    fn recalc_maxweight(&mut self) -> f64 {
        self.subtree.recalc_maxweight();
        self.weight.maxpart()
    }

    fn docid(&self) -> DocId {
        self.subtree.docid()
    }

    fn weight(&mut self) -> Result<f64> {
        let did = self.subtree.docid();
        let (doclen, unique, wdf_max) = match &mut self.lengths {
            Some(lengths) => {
                let doclen = lengths.doclength(did)?;
                let unique = if self.need_unique { lengths.unique_terms(did)? } else { 0 };
                let wdf_max = if self.need_wdf_max { lengths.wdf_doc_max(did)? } else { 0 };
                (doclen, unique, wdf_max)
            }
            None => (0, 0, 0),
        };
        // A synonym of several terms can't be more frequent in a document
        // than the document is long.
        let wdf = if self.lengths.is_some() { self.subtree.wdf().min(doclen) } else { self.subtree.wdf() };
        Ok(self.weight.sumpart(wdf, doclen, unique, wdf_max))
    }

    fn wdf(&self) -> TermCount {
        self.subtree.wdf()
    }

    fn at_end(&self) -> bool {
        self.subtree.at_end()
    }

    fn next(&mut self, _w_min: f64) -> Result<Advance> {
        next_child(&mut self.subtree, 0.0, &self.signal)?;
        Ok(self.state())
    }

    fn skip_to(&mut self, did: DocId, _w_min: f64) -> Result<Advance> {
        if did > self.subtree.docid() {
            skip_child(&mut self.subtree, did, 0.0, &self.signal)?;
        }
        Ok(self.state())
    }

    fn description(&self) -> String {
        format!("SYNONYM{}", self.subtree.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postlist::testing::{db, drain_weights, leaf};
    use crate::postlist::OrPostList;
    use crate::weight::{TfIdfWeight, WeightStats};

    #[test]
    fn weighs_the_summed_wdf() {
        let db = db(&[&["car", "auto"], &["car"], &["bus"]]);
        let signal = PruneSignal::new();
        let subtree = OrPostList::tree(vec![leaf(&db, "car"), leaf(&db, "auto")], 3, signal.clone());
        let mut w = TfIdfWeight::new("nnn").unwrap();
        w.init(&WeightStats { collection_size: 3, termfreq: 2, wdf_upper_bound: 2, wqf: 1, ..WeightStats::default() }, 1.0);
        let pl = SynonymPostList::new(subtree, Box::new(w), &db, signal);
        let got = drain_weights(Box::new(pl), 0.0);
        assert_eq!(got, vec![(1, 2.0), (2, 1.0)]);
    }
}
