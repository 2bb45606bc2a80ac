use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{head, next_child, or_estimate, skip_child, Advance, PostList, PruneSignal};

/// Documents any child matches, weighed by the best matching child alone.
pub struct MaxPostList {
    children: Vec<Box<dyn PostList>>,
    max_wt: f64,
    did: DocId,
    dbsize: DocCount,
    signal: PruneSignal,
}

impl MaxPostList {
    pub fn new(children: Vec<Box<dyn PostList>>, dbsize: DocCount, signal: PruneSignal) -> Self {
        let max_wt = children.iter().map(|c| c.maxweight()).fold(0.0, f64::max);
        MaxPostList { children, max_wt, did: 0, dbsize, signal }
    }

    fn settle(&mut self) -> Advance {
        self.children.retain(|c| !c.at_end());
        match self.children.len() {
            0 => Advance::Exhausted,
            1 => self.children.pop().map_or(Advance::Exhausted, Advance::Replace),
            _ => {
                self.did = self.children.iter().map(|c| c.docid()).min().unwrap_or(0);
                Advance::Unchanged
            }
        }
    }
}

impl PostList for MaxPostList {
    fn termfreq_min(&self) -> DocCount {
        self.children.iter().map(|c| c.termfreq_min()).max().unwrap_or(0)
    }

    fn termfreq_max(&self) -> DocCount {
        let total: u64 = self.children.iter().map(|c| c.termfreq_max() as u64).sum();
        total.min(self.dbsize as u64) as DocCount
    }

    fn termfreq_est(&self) -> DocCount {
        self.children.iter().fold(0, |acc, c| or_estimate(acc, c.termfreq_est(), self.dbsize))
    }

    fn maxweight(&self) -> f64 {
        self.max_wt
    }

    fn recalc_maxweight(&mut self) -> f64 {
        self.max_wt = self.children.iter_mut().map(|c| c.recalc_maxweight()).fold(0.0, f64::max);
        self.max_wt
    }

    fn docid(&self) -> DocId {
        self.did
    }

    fn weight(&mut self) -> Result<f64> {
        let did = self.did;
        let mut best: f64 = 0.0;
        for child in self.children.iter_mut() {
            if head(child.as_ref()) == Some(did) {
                best = best.max(child.weight()?);
            }
        }
        Ok(best)
    }

    fn wdf(&self) -> TermCount {
        self.children.iter().filter(|c| head(c.as_ref()) == Some(self.did)).map(|c| c.wdf()).sum()
    }

    fn at_end(&self) -> bool {
        self.children.is_empty()
    }

    fn next(&mut self, w_min: f64) -> Result<Advance> {
        let did = self.did;
        for child in self.children.iter_mut() {
            if child.docid() == did {
                next_child(child, w_min, &self.signal)?;
            }
        }
        Ok(self.settle())
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Advance> {
        if did <= self.did {
            return Ok(Advance::Unchanged);
        }
        for child in self.children.iter_mut() {
            if child.docid() < did {
                skip_child(child, did, w_min, &self.signal)?;
            }
        }
        Ok(self.settle())
    }

    fn description(&self) -> String {
        let parts: Vec<String> = self.children.iter().map(|c| c.description()).collect();
        format!("({})", parts.join(" MAX "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postlist::testing::{db, drain, leaf};

    #[test]
    fn unites_like_or() {
        let db = db(&[&["a"], &["b"], &["a", "b"], &["c"]]);
        let pl = MaxPostList::new(vec![leaf(&db, "a"), leaf(&db, "b")], 4, PruneSignal::new());
        assert_eq!(drain(Box::new(pl)), vec![1, 2, 3]);
    }
}
