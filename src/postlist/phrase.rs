use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::DatabaseInternal;
use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount, TermPos};
use crate::postlist::{next_child, skip_child, Advance, PostList, PruneSignal};

/// Documents where the terms of an AND occur close together.
///
/// A phrase needs them in query order within `window` positions of the
/// first one; NEAR accepts any order.
pub struct PhrasePostList {
    and: Box<dyn PostList>,
    terms: Vec<String>,
    window: TermPos,
    ordered: bool,
    db: Arc<dyn DatabaseInternal>,
    signal: PruneSignal,
}

impl PhrasePostList {
    pub fn phrase(
        and: Box<dyn PostList>,
        terms: Vec<String>,
        window: TermPos,
        db: Arc<dyn DatabaseInternal>,
        signal: PruneSignal,
    ) -> Self {
        PhrasePostList { and, terms, window, ordered: true, db, signal }
    }

    pub fn near(
        and: Box<dyn PostList>,
        terms: Vec<String>,
        window: TermPos,
        db: Arc<dyn DatabaseInternal>,
        signal: PruneSignal,
    ) -> Self {
        PhrasePostList { and, terms, window, ordered: false, db, signal }
    }

    fn positions(&self, did: DocId, term: &str) -> Result<Vec<TermPos>> {
        let mut pl = self.db.open_position_list(did, term)?;
        let mut out = Vec::with_capacity(pl.size() as usize);
        while pl.next()? {
            out.push(pl.position());
        }
        Ok(out)
    }

    fn test_doc(&self) -> Result<bool> {
        let did = self.and.docid();
        if self.ordered {
            let mut lists = Vec::with_capacity(self.terms.len());
            for term in &self.terms {
                let positions = self.positions(did, term)?;
                if positions.is_empty() {
                    return Ok(false);
                }
                lists.push(positions);
            }
            Ok(ordered_match(&lists, self.window))
        } else {
            let mut wanted: BTreeMap<&str, usize> = BTreeMap::new();
            for term in &self.terms {
                *wanted.entry(term.as_str()).or_default() += 1;
            }
            let mut events = Vec::new();
            let mut need = Vec::with_capacity(wanted.len());
            for (group, (term, count)) in wanted.into_iter().enumerate() {
                let positions = self.positions(did, term)?;
                if positions.len() < count {
                    return Ok(false);
                }
                events.extend(positions.into_iter().map(|p| (p, group)));
                need.push(count);
            }
            events.sort_unstable();
            Ok(unordered_match(&events, &need, self.window))
        }
    }

    /// Advance past documents whose positions don't fit.
    fn settle(&mut self, w_min: f64) -> Result<Advance> {
        loop {
            if self.and.at_end() {
                return Ok(Advance::Exhausted);
            }
            if self.test_doc()? {
                return Ok(Advance::Unchanged);
            }
            next_child(&mut self.and, w_min, &self.signal)?;
        }
    }
}

/// Whether one position from each list, in list order and strictly
/// increasing, spans fewer than `window` positions.
fn ordered_match(lists: &[Vec<TermPos>], window: TermPos) -> bool {
    let Some((first, rest)) = lists.split_first() else {
        return false;
    };
    'start: for &start in first {
        let mut prev = start;
        for list in rest {
            let i = list.partition_point(|&p| p <= prev);
            let Some(&next) = list.get(i) else {
                // No later start can do better.
                return false;
            };
            prev = next;
            if prev - start >= window {
                continue 'start;
            }
        }
        return true;
    }
    false
}

/// Whether a run of `(position, group)` events spanning fewer than
/// `window` positions holds at least `need[g]` events of every group.
fn unordered_match(events: &[(TermPos, usize)], need: &[usize], window: TermPos) -> bool {
    let mut have = vec![0usize; need.len()];
    let mut short = need.iter().filter(|&&n| n > 0).count();
    let mut left = 0;
    for &(pos, group) in events {
        have[group] += 1;
        if have[group] == need[group] {
            short -= 1;
        }
        while short == 0 {
            let (first, g) = events[left];
            if pos - first < window {
                return true;
            }
            if have[g] == need[g] {
                short += 1;
            }
            have[g] -= 1;
            left += 1;
        }
    }
    false
}

impl PostList for PhrasePostList {
    fn termfreq_min(&self) -> DocCount {
        0
    }

    fn termfreq_max(&self) -> DocCount {
        self.and.termfreq_max()
    }

    fn termfreq_est(&self) -> DocCount {
        // Guess half the AND's documents pass the position check.
        self.and.termfreq_est() / 2
    }

    fn maxweight(&self) -> f64 {
        self.and.maxweight()
    }

    fn recalc_maxweight(&mut self) -> f64 {
        self.and.recalc_maxweight()
    }

    fn docid(&self) -> DocId {
        self.and.docid()
    }

    fn weight(&mut self) -> Result<f64> {
        self.and.weight()
    }

    fn wdf(&self) -> TermCount {
        self.and.wdf()
    }

    fn at_end(&self) -> bool {
        self.and.at_end()
    }

    fn next(&mut self, w_min: f64) -> Result<Advance> {
        next_child(&mut self.and, w_min, &self.signal)?;
        self.settle(w_min)
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Advance> {
        if did <= self.and.docid() {
            return Ok(Advance::Unchanged);
        }
        skip_child(&mut self.and, did, w_min, &self.signal)?;
        self.settle(w_min)
    }

    fn description(&self) -> String {
        let op = if self.ordered { "PHRASE" } else { "NEAR" };
        format!("({} {} {})", op, self.window, self.terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postlist::testing::{db, drain, leaf};
    use crate::postlist::MultiAndPostList;

    fn build(db: &Arc<dyn DatabaseInternal>, terms: &[&str], window: TermPos, ordered: bool) -> Box<dyn PostList> {
        let signal = PruneSignal::new();
        let and = MultiAndPostList::new(
            terms.iter().map(|t| leaf(db, t)).collect(),
            db.doccount(),
            signal.clone(),
        );
        let terms = terms.iter().map(|t| t.to_string()).collect();
        if ordered {
            Box::new(PhrasePostList::phrase(Box::new(and), terms, window, db.clone(), signal))
        } else {
            Box::new(PhrasePostList::near(Box::new(and), terms, window, db.clone(), signal))
        }
    }

    #[test]
    fn phrase_respects_order_and_window() {
        let db = db(&[
            &["the", "fox", "jumps"],
            &["jumps", "the", "fox"],
            &["fox", "quickly", "jumps"],
            &["fox", "a", "b", "jumps"],
        ]);
        assert_eq!(drain(build(&db, &["fox", "jumps"], 2, true)), vec![1]);
        assert_eq!(drain(build(&db, &["fox", "jumps"], 3, true)), vec![1, 3]);
    }

    #[test]
    fn near_ignores_order() {
        let db = db(&[&["fox", "jumps"], &["jumps", "fox"], &["fox", "x", "y", "jumps"]]);
        assert_eq!(drain(build(&db, &["fox", "jumps"], 2, false)), vec![1, 2]);
        assert_eq!(drain(build(&db, &["fox", "jumps"], 4, false)), vec![1, 2, 3]);
    }

    #[test]
    fn repeated_terms_need_distinct_positions() {
        assert!(ordered_match(&[vec![1, 4], vec![1, 4]], 4));
        assert!(!ordered_match(&[vec![1], vec![1]], 10));
        assert!(unordered_match(&[(1, 0), (3, 0)], &[2], 3));
        assert!(!unordered_match(&[(1, 0), (3, 0)], &[2], 2));
    }
}
