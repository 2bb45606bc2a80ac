use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{head, next_child, skip_child, Advance, EmptyPostList, PostList, PruneSignal};

/// Documents the left side matches and the right side doesn't. Only the
/// left side weighs.
pub struct AndNotPostList {
    l: Box<dyn PostList>,
    r: Box<dyn PostList>,
    dbsize: DocCount,
    signal: PruneSignal,
}

impl AndNotPostList {
    pub fn new(l: Box<dyn PostList>, r: Box<dyn PostList>, dbsize: DocCount, signal: PruneSignal) -> Self {
        AndNotPostList { l, r, dbsize, signal }
    }

    /// Step the left side past anything the right side also matches.
    fn find_next_match(&mut self, w_min: f64) -> Result<Advance> {
        loop {
            if self.l.at_end() {
                return Ok(Advance::Exhausted);
            }
            let did = self.l.docid();
            if self.r.docid() < did {
                skip_child(&mut self.r, did, 0.0, &self.signal)?;
            }
            if self.r.at_end() {
                let l = std::mem::replace(&mut self.l, Box::new(EmptyPostList::new()));
                return Ok(Advance::Replace(l));
            }
            if head(self.r.as_ref()) != Some(did) {
                return Ok(Advance::Unchanged);
            }
            next_child(&mut self.l, w_min, &self.signal)?;
        }
    }
}

impl PostList for AndNotPostList {
    fn termfreq_min(&self) -> DocCount {
        self.l.termfreq_min().saturating_sub(self.r.termfreq_max())
    }

    fn termfreq_max(&self) -> DocCount {
        self.l.termfreq_max()
    }

    fn termfreq_est(&self) -> DocCount {
        if self.dbsize == 0 {
            return 0;
        }
        let l = self.l.termfreq_est() as f64;
        let r = self.r.termfreq_est() as f64;
        (l * (1.0 - r / self.dbsize as f64)).round().max(0.0) as DocCount
    }

    fn maxweight(&self) -> f64 {
        self.l.maxweight()
    }

    fn recalc_maxweight(&mut self) -> f64 {
        self.l.recalc_maxweight()
    }

    fn docid(&self) -> DocId {
        self.l.docid()
    }

    fn weight(&mut self) -> Result<f64> {
        self.l.weight()
    }

    fn wdf(&self) -> TermCount {
        self.l.wdf()
    }

    fn at_end(&self) -> bool {
        self.l.at_end()
    }

    fn next(&mut self, w_min: f64) -> Result<Advance> {
        next_child(&mut self.l, w_min, &self.signal)?;
        self.find_next_match(w_min)
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Advance> {
        if self.l.docid() < did {
            skip_child(&mut self.l, did, w_min, &self.signal)?;
        }
        self.find_next_match(w_min)
    }

    fn description(&self) -> String {
        format!("({} AND_NOT {})", self.l.description(), self.r.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postlist::testing::{db, drain, leaf};

    #[test]
    fn subtracts() {
        let db = db(&[&["a", "b"], &["a"], &["b"], &["a", "b"], &["a"]]);
        let pl = AndNotPostList::new(leaf(&db, "a"), leaf(&db, "b"), 5, PruneSignal::new());
        assert_eq!(drain(Box::new(pl)), vec![2, 5]);
    }

    #[test]
    fn nothing_to_subtract() {
        let db = db(&[&["a"], &["a"]]);
        let pl = AndNotPostList::new(leaf(&db, "a"), leaf(&db, "b"), 2, PruneSignal::new());
        assert_eq!(drain(Box::new(pl)), vec![1, 2]);
    }
}
