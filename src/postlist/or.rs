use log::debug;

use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{
    decay_target, head, next_child, or_estimate, skip_child, Advance, AndMaybePostList, MultiAndPostList,
    PostList, PruneSignal,
};

/// Documents either side matches; the weight is the sum over the sides
/// that match.
///
/// Once the threshold exceeds what one side can reach alone, a document
/// must match the other side, so the node turns itself into an AND_MAYBE,
/// or an AND when neither side suffices alone.
pub struct OrPostList {
    l: Box<dyn PostList>,
    r: Box<dyn PostList>,
    lmax: f64,
    rmax: f64,
    dbsize: DocCount,
    signal: PruneSignal,
}

impl OrPostList {
    pub fn new(l: Box<dyn PostList>, r: Box<dyn PostList>, dbsize: DocCount, signal: PruneSignal) -> Self {
        let (lmax, rmax) = (l.maxweight(), r.maxweight());
        OrPostList { l, r, lmax, rmax, dbsize, signal }
    }

    /// Combine `children` into a tree of binary ORs, always pairing the
    /// two sparsest lists so the densest ones sit nearest the root.
    pub fn tree(mut children: Vec<Box<dyn PostList>>, dbsize: DocCount, signal: PruneSignal) -> Box<dyn PostList> {
        while children.len() > 1 {
            children.sort_by_key(|c| std::cmp::Reverse(c.termfreq_est()));
            let (Some(a), Some(b)) = (children.pop(), children.pop()) else {
                break;
            };
            children.push(Box::new(OrPostList::new(a, b, dbsize, signal.clone())));
        }
        match children.pop() {
            Some(pl) => pl,
            None => Box::new(crate::postlist::EmptyPostList::new()),
        }
    }

    fn current(&self) -> DocId {
        match (head(self.l.as_ref()), head(self.r.as_ref())) {
            (Some(l), Some(r)) => l.min(r),
            (Some(d), None) | (None, Some(d)) => d,
            (None, None) => 0,
        }
    }

    /// Swap in a stricter operator and position it at `target`.
    fn decay(&mut self, w_min: f64, target: DocId) -> Result<Advance> {
        let l = std::mem::replace(&mut self.l, Box::new(crate::postlist::EmptyPostList::new()));
        let r = std::mem::replace(&mut self.r, Box::new(crate::postlist::EmptyPostList::new()));
        let mut pl: Box<dyn PostList> = if w_min > self.lmax && w_min > self.rmax {
            debug!("OR decays to AND at w_min {}", w_min);
            Box::new(MultiAndPostList::new(vec![l, r], self.dbsize, self.signal.clone()))
        } else if w_min > self.lmax {
            debug!("OR decays to AND_MAYBE (right required) at w_min {}", w_min);
            Box::new(AndMaybePostList::new(r, l, self.dbsize, self.signal.clone()))
        } else {
            debug!("OR decays to AND_MAYBE (left required) at w_min {}", w_min);
            Box::new(AndMaybePostList::new(l, r, self.dbsize, self.signal.clone()))
        };
        if let Advance::Replace(next) = pl.skip_to(target, w_min)? {
            pl = next;
        }
        Ok(Advance::Replace(pl))
    }

    /// Hand over to the surviving side once one runs out.
    fn settle(&mut self) -> Advance {
        let side = match (self.l.at_end(), self.r.at_end()) {
            (false, false) => return Advance::Unchanged,
            (true, true) => return Advance::Exhausted,
            (true, false) => &mut self.r,
            (false, true) => &mut self.l,
        };
        let survivor = std::mem::replace(side, Box::new(crate::postlist::EmptyPostList::new()));
        Advance::Replace(survivor)
    }

    fn can_decay(&self, w_min: f64) -> bool {
        w_min > 0.0 && w_min > self.lmax.min(self.rmax)
    }
}

impl PostList for OrPostList {
    fn termfreq_min(&self) -> DocCount {
        self.l.termfreq_min().max(self.r.termfreq_min())
    }

    fn termfreq_max(&self) -> DocCount {
        self.l.termfreq_max().saturating_add(self.r.termfreq_max()).min(self.dbsize)
    }

    fn termfreq_est(&self) -> DocCount {
        or_estimate(self.l.termfreq_est(), self.r.termfreq_est(), self.dbsize)
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
        self.current()
    }

    fn weight(&mut self) -> Result<f64> {
        let did = self.current();
        let mut w = 0.0;
        if head(self.l.as_ref()) == Some(did) {
            w += self.l.weight()?;
        }
        if head(self.r.as_ref()) == Some(did) {
            w += self.r.weight()?;
        }
        Ok(w)
    }

    fn wdf(&self) -> TermCount {
        let did = self.current();
        let mut wdf = 0;
        if head(self.l.as_ref()) == Some(did) {
            wdf += self.l.wdf();
        }
        if head(self.r.as_ref()) == Some(did) {
            wdf += self.r.wdf();
        }
        wdf
    }

    fn at_end(&self) -> bool {
        self.l.at_end() && self.r.at_end()
    }

    fn next(&mut self, w_min: f64) -> Result<Advance> {
        if self.can_decay(w_min) {
            let target = self.current() + 1;
            return self.decay(w_min, target);
        }
        let (lh, rh) = (self.l.docid(), self.r.docid());
        if lh <= rh {
            next_child(&mut self.l, w_min - self.rmax, &self.signal)?;
        }
        if rh <= lh {
            next_child(&mut self.r, w_min - self.lmax, &self.signal)?;
        }
        Ok(self.settle())
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Advance> {
        if self.can_decay(w_min) {
            let target = decay_target(self.current(), did);
            return self.decay(w_min, target);
        }
        if self.l.docid() < did {
            skip_child(&mut self.l, did, w_min - self.rmax, &self.signal)?;
        }
        if self.r.docid() < did {
            skip_child(&mut self.r, did, w_min - self.lmax, &self.signal)?;
        }
        Ok(self.settle())
    }

    fn description(&self) -> String {
        format!("({} OR {})", self.l.description(), self.r.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postlist::testing::{db, drain, drain_weights, leaf, settle_bound};
    use std::sync::Arc;

    use crate::backend::DatabaseInternal;
    use crate::postlist::LeafPostList;
    use crate::weight::{TradWeight, Weight, WeightStats};

    #[test]
    fn unites() {
        let db = db(&[&["cat", "dog"], &["cat"], &["eel"], &["dog"]]);
        let pl = OrPostList::new(leaf(&db, "cat"), leaf(&db, "dog"), 4, PruneSignal::new());
        assert_eq!(drain(Box::new(pl)), vec![1, 2, 4]);
    }

    #[test]
    fn tree_of_many() {
        let db = db(&[&["a"], &["b"], &["c"], &["a", "c"], &["d"]]);
        let children = vec![leaf(&db, "a"), leaf(&db, "b"), leaf(&db, "c"), leaf(&db, "zz")];
        let pl = OrPostList::tree(children, 5, PruneSignal::new());
        assert_eq!(drain(pl), vec![1, 2, 3, 4]);
    }

    fn weighted(db: &Arc<dyn DatabaseInternal>, term: &str, factor: f64) -> Box<dyn PostList> {
        let mut pl = LeafPostList::open(db, term).unwrap();
        let mut w = TradWeight::new(0.0).unwrap();
        let stats = WeightStats {
            collection_size: db.doccount(),
            average_length: db.avlength(),
            wdf_upper_bound: 1,
            termfreq: db.termfreq(term).unwrap(),
            wqf: 1,
            ..WeightStats::default()
        };
        w.init(&stats, factor);
        pl.set_termweight(Box::new(w)).unwrap();
        Box::new(pl)
    }

    #[test]
    fn high_threshold_turns_into_and() {
        let db = db(&[&["a", "b"], &["a"], &["b"], &["a", "b"], &["c"], &["c"], &["c"], &["c"]]);
        let l = weighted(&db, "a", 1.0);
        let r = weighted(&db, "b", 1.0);
        let single = l.maxweight().max(r.maxweight());
        let pl = OrPostList::new(l, r, 8, PruneSignal::new());
        let got: Vec<DocId> = drain_weights(Box::new(pl), single + 1e-6).into_iter().map(|(d, _)| d).collect();
        assert_eq!(got, vec![1, 4]);
    }

    #[test]
    fn unbalanced_threshold_requires_the_heavy_side() {
        let db = db(&[&["a", "b"], &["a"], &["b"], &["b"], &["c"], &["c"], &["c"], &["c"]]);
        let l = weighted(&db, "a", 3.0);
        let r = weighted(&db, "b", 1.0);
        let w_min = r.maxweight() + 1e-6;
        assert!(w_min < l.maxweight());
        let pl = OrPostList::new(l, r, 8, PruneSignal::new());
        let got: Vec<DocId> = drain_weights(Box::new(pl), w_min).into_iter().map(|(d, _)| d).collect();
        assert_eq!(got, vec![1, 2]);
    }

    #[test]
    fn bound_only_falls_as_threshold_rises() {
        let db = db(&[&["a", "b", "c"], &["a"], &["b"], &["c", "c"], &["a", "c"], &["b", "c"], &["d"], &["a", "b"]]);
        let children = vec![weighted(&db, "a", 1.0), weighted(&db, "b", 2.0), weighted(&db, "c", 0.5)];
        let mut pl = OrPostList::tree(children, 8, PruneSignal::new());
        let mut bound = pl.recalc_maxweight();
        let mut w_min = 0.0;
        loop {
            if let Advance::Replace(new) = pl.next(w_min).unwrap() {
                pl = new;
            }
            if pl.at_end() {
                break;
            }
            settle_bound(&mut pl, &mut bound);
            assert!(pl.weight().unwrap() <= bound + 1e-9);
            w_min += bound / 6.0;
        }
    }
}
