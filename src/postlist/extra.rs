use std::sync::Arc;

use crate::backend::DatabaseInternal;
use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{next_child, skip_child, Advance, DocLengths, PostList, PruneSignal};
use crate::weight::Weight;

/// Adds the scheme's per-document extra part to every match of the tree
/// below it.
pub struct ExtraWeightPostList {
    pl: Box<dyn PostList>,
    extra: Box<dyn Weight>,
    max_extra: f64,
    lengths: DocLengths,
    need_unique: bool,
    signal: PruneSignal,
}

impl ExtraWeightPostList {
    pub fn new(pl: Box<dyn PostList>, extra: Box<dyn Weight>, db: &Arc<dyn DatabaseInternal>, signal: PruneSignal) -> Self {
        let max_extra = extra.maxextra();
        let need_unique = extra.needs_unique_terms();
        ExtraWeightPostList { pl, extra, max_extra, lengths: DocLengths::new(db.clone()), need_unique, signal }
    }

    fn state(&self) -> Advance {
        if self.pl.at_end() { Advance::Exhausted } else { Advance::Unchanged }
    }
}

impl PostList for ExtraWeightPostList {
    fn termfreq_min(&self) -> DocCount {
        self.pl.termfreq_min()
    }

    fn termfreq_max(&self) -> DocCount {
        self.pl.termfreq_max()
    }

    fn termfreq_est(&self) -> DocCount {
        self.pl.termfreq_est()
    }

    fn maxweight(&self) -> f64 {
        self.pl.maxweight() + self.max_extra
    }

    fn recalc_maxweight(&mut self) -> f64 {
        self.pl.recalc_maxweight() + self.max_extra
    }

    fn docid(&self) -> DocId {
        self.pl.docid()
    }

    fn weight(&mut self) -> Result<f64> {
        let did = self.pl.docid();
        let doclen = self.lengths.doclength(did)?;
        let unique = if self.need_unique { self.lengths.unique_terms(did)? } else { 0 };
        Ok(self.pl.weight()? + self.extra.sumextra(doclen, unique))
    }

    fn wdf(&self) -> TermCount {
        self.pl.wdf()
    }

    fn at_end(&self) -> bool {
        self.pl.at_end()
    }

    fn next(&mut self, w_min: f64) -> Result<Advance> {
        next_child(&mut self.pl, w_min - self.max_extra, &self.signal)?;
        Ok(self.state())
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Advance> {
        skip_child(&mut self.pl, did, w_min - self.max_extra, &self.signal)?;
        Ok(self.state())
    }

    fn description(&self) -> String {
        format!("Extra({})", self.pl.description())
    }
}
