use log::debug;

use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{
    decay_target, head, next_child, skip_child, Advance, EmptyPostList, MultiAndPostList, PostList, PruneSignal,
};

/// Documents the left side matches, with the right side's weight added
/// where it matches too.
pub struct AndMaybePostList {
    l: Box<dyn PostList>,
    r: Box<dyn PostList>,
    lmax: f64,
    rmax: f64,
    dbsize: DocCount,
    signal: PruneSignal,
}

impl AndMaybePostList {
    pub fn new(l: Box<dyn PostList>, r: Box<dyn PostList>, dbsize: DocCount, signal: PruneSignal) -> Self {
        let (lmax, rmax) = (l.maxweight(), r.maxweight());
        AndMaybePostList { l, r, lmax, rmax, dbsize, signal }
    }

    fn take_left(&mut self) -> Box<dyn PostList> {
        std::mem::replace(&mut self.l, Box::new(EmptyPostList::new()))
    }

    /// Once the left side alone can't reach `w_min` the right side must
    /// match too.
    fn decay(&mut self, w_min: f64, target: DocId) -> Result<Advance> {
        debug!("AND_MAYBE decays to AND at w_min {}", w_min);
        let l = self.take_left();
        let r = std::mem::replace(&mut self.r, Box::new(EmptyPostList::new()));
        let mut pl: Box<dyn PostList> = Box::new(MultiAndPostList::new(vec![l, r], self.dbsize, self.signal.clone()));
        if let Advance::Replace(next) = pl.skip_to(target, w_min)? {
            pl = next;
        }
        Ok(Advance::Replace(pl))
    }

    /// Bring the right side up to the left's document.
    fn sync_right(&mut self, w_min: f64) -> Result<Advance> {
        if self.l.at_end() {
            return Ok(Advance::Exhausted);
        }
        let did = self.l.docid();
        if self.r.docid() < did {
            skip_child(&mut self.r, did, w_min - self.lmax, &self.signal)?;
        }
        if self.r.at_end() {
            return Ok(Advance::Replace(self.take_left()));
        }
        Ok(Advance::Unchanged)
    }

    fn can_decay(&self, w_min: f64) -> bool {
        w_min > 0.0 && w_min > self.lmax
    }
}

impl PostList for AndMaybePostList {
    fn termfreq_min(&self) -> DocCount {
        self.l.termfreq_min()
    }

    fn termfreq_max(&self) -> DocCount {
        self.l.termfreq_max()
    }

    fn termfreq_est(&self) -> DocCount {
        self.l.termfreq_est()
    }

    fn maxweight(&self) -> f64 {
        self.lmax + self.rmax
    }

    fn recalc_maxweight(&mut self) -> f64 {
        self.lmax = self.l.recalc_maxweight();
        self.rmax = self.r.recalc_maxweight();
        self.lmax + self.rmax
    }

    fn docid(&self) -> DocId {
        self.l.docid()
    }

    fn weight(&mut self) -> Result<f64> {
        let mut w = self.l.weight()?;
        if head(self.r.as_ref()) == Some(self.l.docid()) {
            w += self.r.weight()?;
        }
        Ok(w)
    }

    fn wdf(&self) -> TermCount {
        let mut wdf = self.l.wdf();
        if head(self.r.as_ref()) == Some(self.l.docid()) {
            wdf += self.r.wdf();
        }
        wdf
    }

    fn at_end(&self) -> bool {
        self.l.at_end()
    }

    fn next(&mut self, w_min: f64) -> Result<Advance> {
        if self.can_decay(w_min) {
            let target = self.l.docid() + 1;
            return self.decay(w_min, target);
        }
        next_child(&mut self.l, w_min - self.rmax, &self.signal)?;
        self.sync_right(w_min)
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Advance> {
        if self.can_decay(w_min) {
            let target = decay_target(self.l.docid(), did);
            return self.decay(w_min, target);
        }
        if self.l.docid() < did {
            skip_child(&mut self.l, did, w_min - self.rmax, &self.signal)?;
        }
        self.sync_right(w_min)
    }

    fn description(&self) -> String {
        format!("({} AND_MAYBE {})", self.l.description(), self.r.description())
    }
}
