use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{and_estimate, next_child, skip_child, Advance, PostList, PruneSignal};

/// Documents every child matches; the weight is the sum of theirs.
///
/// Children are kept rarest first so the list most likely to skip far
/// leads the search.
pub struct MultiAndPostList {
    children: Vec<Box<dyn PostList>>,
    max_wt: Vec<f64>,
    max_total: f64,
    did: DocId,
    at_end: bool,
    dbsize: DocCount,
    signal: PruneSignal,
}

impl MultiAndPostList {
    pub fn new(mut children: Vec<Box<dyn PostList>>, dbsize: DocCount, signal: PruneSignal) -> Self {
        children.sort_by_key(|c| c.termfreq_est());
        let max_wt: Vec<f64> = children.iter().map(|c| c.maxweight()).collect();
        let max_total = max_wt.iter().sum();
        MultiAndPostList { children, max_wt, max_total, did: 0, at_end: false, dbsize, signal }
    }

    /// The least weight child `i` needs for a document to reach `w_min`.
    fn child_min(&self, w_min: f64, i: usize) -> f64 {
        if w_min <= 0.0 { 0.0 } else { w_min - (self.max_total - self.max_wt[i]) }
    }

    fn finish(&mut self) -> Advance {
        self.at_end = true;
        Advance::Exhausted
    }

    /// With the first child on a candidate, pull the others up to it until
    /// they all agree.
    fn find_next_match(&mut self, w_min: f64) -> Result<Advance> {
        'candidate: loop {
            if self.children[0].at_end() {
                return Ok(self.finish());
            }
            let did = self.children[0].docid();
            for i in 1..self.children.len() {
                let min = self.child_min(w_min, i);
                skip_child(&mut self.children[i], did, min, &self.signal)?;
                if self.children[i].at_end() {
                    return Ok(self.finish());
                }
                let new_did = self.children[i].docid();
                if new_did != did {
                    let min = self.child_min(w_min, 0);
                    skip_child(&mut self.children[0], new_did, min, &self.signal)?;
                    continue 'candidate;
                }
            }
            self.did = did;
            return Ok(Advance::Unchanged);
        }
    }
}

impl PostList for MultiAndPostList {
    fn termfreq_min(&self) -> DocCount {
        // Inclusion-exclusion lower bound.
        let total: u64 = self.children.iter().map(|c| c.termfreq_min() as u64).sum();
        let slack = self.dbsize as u64 * (self.children.len() as u64 - 1);
        total.saturating_sub(slack) as DocCount
    }

    fn termfreq_max(&self) -> DocCount {
        self.children.iter().map(|c| c.termfreq_max()).min().unwrap_or(0)
    }

    fn termfreq_est(&self) -> DocCount {
        let mut iter = self.children.iter().map(|c| c.termfreq_est());
        let first = iter.next().unwrap_or(0);
        iter.fold(first, |acc, tf| and_estimate(acc, tf, self.dbsize))
    }

    fn maxweight(&self) -> f64 {
        self.max_total
    }

    fn recalc_maxweight(&mut self) -> f64 {
        for (i, child) in self.children.iter_mut().enumerate() {
            self.max_wt[i] = child.recalc_maxweight();
        }
        self.max_total = self.max_wt.iter().sum();
        self.max_total
    }

    fn docid(&self) -> DocId {
        self.did
    }

    fn weight(&mut self) -> Result<f64> {
        let mut total = 0.0;
        for child in &mut self.children {
            total += child.weight()?;
        }
        Ok(total)
    }

    fn wdf(&self) -> TermCount {
        self.children.iter().map(|c| c.wdf()).sum()
    }

    fn at_end(&self) -> bool {
        self.at_end
    }

    fn next(&mut self, w_min: f64) -> Result<Advance> {
        if self.at_end {
            return Ok(Advance::Exhausted);
        }
        let min = self.child_min(w_min, 0);
        next_child(&mut self.children[0], min, &self.signal)?;
        self.find_next_match(w_min)
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Advance> {
        if self.at_end {
            return Ok(Advance::Exhausted);
        }
        if did <= self.did {
            return Ok(Advance::Unchanged);
        }
        let min = self.child_min(w_min, 0);
        skip_child(&mut self.children[0], did, min, &self.signal)?;
        self.find_next_match(w_min)
    }

    fn description(&self) -> String {
        let parts: Vec<String> = self.children.iter().map(|c| c.description()).collect();
        format!("({})", parts.join(" AND "))
    }
}
