use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{head, next_child, skip_child, Advance, PostList, PruneSignal};

/// Documents exactly one child matches, weighed by that child.
pub struct XorPostList {
    children: Vec<Box<dyn PostList>>,
    max_wt: f64,
    did: DocId,
    dbsize: DocCount,
    signal: PruneSignal,
}

impl XorPostList {
    pub fn new(children: Vec<Box<dyn PostList>>, dbsize: DocCount, signal: PruneSignal) -> Self {
        let max_wt = children.iter().map(|c| c.maxweight()).fold(0.0, f64::max);
        XorPostList { children, max_wt, did: 0, dbsize, signal }
    }

    fn matching(&self) -> Option<&Box<dyn PostList>> {
        self.children.iter().find(|c| head(c.as_ref()) == Some(self.did))
    }

    /// Drop spent children and settle on the lowest document exactly one
    /// child is on, stepping every child past documents shared by several.
    fn find_next_match(&mut self) -> Result<Advance> {
        loop {
            self.children.retain(|c| !c.at_end());
            match self.children.len() {
                0 => return Ok(Advance::Exhausted),
                1 => {
                    let mut rest = std::mem::take(&mut self.children);
                    return Ok(rest.pop().map_or(Advance::Exhausted, Advance::Replace));
                }
                _ => {}
            }
            let Some(min) = self.children.iter().map(|c| c.docid()).min() else {
                return Ok(Advance::Exhausted);
            };
            let count = self.children.iter().filter(|c| c.docid() == min).count();
            self.did = min;
            if count == 1 {
                return Ok(Advance::Unchanged);
            }
            for child in self.children.iter_mut().filter(|c| c.docid() == min) {
                next_child(child, 0.0, &self.signal)?;
            }
        }
    }
}

impl PostList for XorPostList {
    fn termfreq_min(&self) -> DocCount {
        0
    }

    fn termfreq_max(&self) -> DocCount {
        let total: u64 = self.children.iter().map(|c| c.termfreq_max() as u64).sum();
        total.min(self.dbsize as u64) as DocCount
    }

    fn termfreq_est(&self) -> DocCount {
        if self.dbsize == 0 {
            return 0;
        }
        // Chance a document is in exactly one child, assuming independence.
        let n = self.dbsize as f64;
        let probs: Vec<f64> = self.children.iter().map(|c| c.termfreq_est() as f64 / n).collect();
        let none: f64 = probs.iter().map(|p| 1.0 - p).product();
        let exactly_one: f64 = probs
            .iter()
            .map(|&p| if p >= 1.0 { 0.0 } else { p * none / (1.0 - p) })
            .sum();
        (exactly_one * n).round() as DocCount
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
        match self.children.iter_mut().find(|c| head(c.as_ref()) == Some(did)) {
            Some(child) => child.weight(),
            None => Ok(0.0),
        }
    }

    fn wdf(&self) -> TermCount {
        self.matching().map_or(0, |c| c.wdf())
    }

    fn at_end(&self) -> bool {
        self.children.is_empty()
    }

    fn next(&mut self, _w_min: f64) -> Result<Advance> {
        let did = self.did;
        for child in self.children.iter_mut() {
            if did == 0 || child.docid() == did {
                next_child(child, 0.0, &self.signal)?;
            }
        }
        self.find_next_match()
    }

    fn skip_to(&mut self, did: DocId, _w_min: f64) -> Result<Advance> {
        if did <= self.did {
            return Ok(Advance::Unchanged);
        }
        for child in self.children.iter_mut() {
            if child.docid() < did {
                skip_child(child, did, 0.0, &self.signal)?;
            }
        }
        self.find_next_match()
    }

    fn description(&self) -> String {
        let parts: Vec<String> = self.children.iter().map(|c| c.description()).collect();
        format!("({})", parts.join(" XOR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postlist::testing::{db, drain, leaf};

    #[test]
    fn exactly_one_child_matches() {
        let db = db(&[&["a", "b"], &["a"], &["b"], &["a", "b", "c"], &["c"], &["a", "c"]]);
        let pl = XorPostList::new(vec![leaf(&db, "a"), leaf(&db, "b"), leaf(&db, "c")], 6, PruneSignal::new());
        assert_eq!(drain(Box::new(pl)), vec![2, 3, 5]);
    }

    #[test]
    fn two_way() {
        let db = db(&[&["a", "b"], &["a"], &["b"], &["b"]]);
        let pl = XorPostList::new(vec![leaf(&db, "a"), leaf(&db, "b")], 4, PruneSignal::new());
        assert_eq!(drain(Box::new(pl)), vec![2, 3, 4]);
    }
}
