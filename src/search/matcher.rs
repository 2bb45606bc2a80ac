//! Runs a compiled postlist tree and keeps the best documents.
//!
//! Once the candidate heap is full its worst weight becomes the threshold
//! handed to the tree, which lets operators skip documents and decay into
//! cheaper forms. The match stops as soon as the tree's bound drops below
//! that threshold.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use log::{debug, trace};

use crate::backend::DatabaseInternal;
use crate::core::error::{Error, Result};
use crate::core::types::{DocCount, DocId, ValueSlot};
use crate::postlist::{Advance, PruneSignal};
use crate::query::{Query, QueryOptimiser};
use crate::search::mset::{MSet, MSetItem};
use crate::search::rset::RSet;
use crate::weight::Weight;

/// How documents of equal weight are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocidOrder {
    #[default]
    Ascending,
    Descending,
}

/// What the ranking is by. Values compare as raw bytes, smallest first
/// unless `reverse` is set; a missing value sorts as empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Relevance,
    Value { slot: ValueSlot, reverse: bool },
    ValueThenRelevance { slot: ValueSlot, reverse: bool },
    RelevanceThenValue { slot: ValueSlot, reverse: bool },
}

impl SortBy {
    fn slot(self) -> Option<ValueSlot> {
        match self {
            SortBy::Relevance => None,
            SortBy::Value { slot, .. }
            | SortBy::ValueThenRelevance { slot, .. }
            | SortBy::RelevanceThenValue { slot, .. } => Some(slot),
        }
    }

    /// Whether a document's weight decides whether it can make the cut.
    fn ranks_by_weight_first(self) -> bool {
        matches!(self, SortBy::Relevance | SortBy::RelevanceThenValue { .. })
    }
}

/// Keep at most `max` matches for each distinct value in `slot`. Documents
/// without a value there are never collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collapse {
    pub slot: ValueSlot,
    pub max: DocCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ranking {
    sort_by: SortBy,
    docid_order: DocidOrder,
}

#[derive(Debug, Clone)]
struct Candidate {
    did: DocId,
    weight: f64,
    sort_key: Vec<u8>,
    collapse_key: Vec<u8>,
    ranking: Ranking,
}

impl Candidate {
    fn by_value(&self, other: &Self, reverse: bool) -> Ordering {
        let ord = self.sort_key.cmp(&other.sort_key);
        if reverse { ord.reverse() } else { ord }
    }

    fn by_weight(&self, other: &Self) -> Ordering {
        other.weight.total_cmp(&self.weight)
    }
}

// Better candidates order first; the last one is the next to go.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        let primary = match self.ranking.sort_by {
            SortBy::Relevance => self.by_weight(other),
            SortBy::Value { reverse, .. } => self.by_value(other, reverse),
            SortBy::ValueThenRelevance { reverse, .. } => {
                self.by_value(other, reverse).then_with(|| self.by_weight(other))
            }
            SortBy::RelevanceThenValue { reverse, .. } => {
                self.by_weight(other).then_with(|| self.by_value(other, reverse))
            }
        };
        primary.then_with(|| match self.ranking.docid_order {
            DocidOrder::Ascending => self.did.cmp(&other.did),
            DocidOrder::Descending => other.did.cmp(&self.did),
        })
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    pub docid_order: DocidOrder,
    /// Documents weighing less than this don't match at all.
    pub weight_cutoff: f64,
    /// Documents scoring below this percentage of the best weight don't
    /// match. 0 turns it off.
    pub percent_cutoff: u32,
    pub collapse: Option<Collapse>,
    pub sort_by: SortBy,
}

impl MatchOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.weight_cutoff.is_finite() || self.weight_cutoff < 0.0 {
            return Err(Error::invalid_argument(format!(
                "weight cutoff must be finite and >= 0, got {}", self.weight_cutoff
            )));
        }
        if self.percent_cutoff > 100 {
            return Err(Error::invalid_argument(format!(
                "percent cutoff must be at most 100, got {}", self.percent_cutoff
            )));
        }
        if self.collapse.is_some_and(|c| c.max == 0) {
            return Err(Error::invalid_argument("collapse must keep at least one document per key"));
        }
        Ok(())
    }
}

/// The best `max` candidates seen for one collapse key.
#[derive(Default)]
struct CollapseBucket {
    kept: BTreeSet<Candidate>,
    collapsed: DocCount,
}

/// The running result set: the best `wanted` candidates plus the
/// collapse buckets.
struct Proto {
    wanted: usize,
    best: BTreeSet<Candidate>,
    buckets: HashMap<Vec<u8>, CollapseBucket>,
    collapse_max: usize,
    collapsed: DocCount,
}

impl Proto {
    fn full(&self) -> bool {
        self.best.len() >= self.wanted
    }

    fn worst_weight(&self) -> f64 {
        self.best.last().map_or(0.0, |c| c.weight)
    }

    fn offer(&mut self, candidate: Candidate) {
        if self.collapse_max > 0 && !candidate.collapse_key.is_empty() {
            let bucket = self.buckets.entry(candidate.collapse_key.clone()).or_default();
            if bucket.kept.len() >= self.collapse_max {
                let beaten = bucket.kept.last().is_some_and(|worst| candidate < *worst);
                bucket.collapsed += 1;
                self.collapsed += 1;
                if !beaten {
                    return;
                }
                if let Some(worst) = bucket.kept.pop_last() {
                    trace!("doc {} collapsed by doc {}", worst.did, candidate.did);
                    self.best.remove(&worst);
                }
            }
            bucket.kept.insert(candidate.clone());
        }
        if !self.full() {
            self.best.insert(candidate);
        } else if self.best.last().is_some_and(|worst| candidate < *worst) {
            self.best.pop_last();
            self.best.insert(candidate);
        }
    }

    fn collapse_count(&self, key: &[u8]) -> DocCount {
        if key.is_empty() {
            return 0;
        }
        self.buckets.get(key).map_or(0, |b| b.collapsed)
    }
}

pub struct Matcher<'a> {
    db: Arc<dyn DatabaseInternal>,
    weight: &'a dyn Weight,
    options: MatchOptions,
}

impl<'a> Matcher<'a> {
    pub fn new(db: Arc<dyn DatabaseInternal>, weight: &'a dyn Weight, options: MatchOptions) -> Self {
        Matcher { db, weight, options }
    }

    fn value(&self, did: DocId, slot: Option<ValueSlot>) -> Result<Vec<u8>> {
        match slot {
            Some(slot) => Ok(self.db.get_value(did, slot)?.unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    /// Ranks matches and returns those at ranks `first..first + maxitems`.
    /// At least `check_at_least` documents are looked at, when there are
    /// that many, to firm up the match counts.
    pub fn get_mset(
        &self,
        query: &Query,
        first: DocCount,
        maxitems: DocCount,
        check_at_least: DocCount,
        rset: &RSet,
    ) -> Result<MSet> {
        self.options.validate()?;
        let signal = PruneSignal::new();
        let mut optimiser = QueryOptimiser::new(self.db.clone(), self.weight, rset, signal.clone(), query.query_length());
        let mut pl = optimiser.compile(query)?;
        debug!("matching {}", pl.description());

        let max_possible = pl.recalc_maxweight();
        let (tf_min, tf_est, tf_max) = (pl.termfreq_min(), pl.termfreq_est(), pl.termfreq_max());
        let wanted = first.saturating_add(maxitems) as usize;
        let check_at_least = (check_at_least as usize).max(wanted);

        let mut mset = MSet { first, max_possible, terms: optimiser.term_info().clone(), ..MSet::default() };
        if check_at_least == 0 {
            mset.matches_lower_bound = tf_min;
            mset.matches_estimated = tf_est;
            mset.matches_upper_bound = tf_max;
            return Ok(mset);
        }

        let ranking = Ranking { sort_by: self.options.sort_by, docid_order: self.options.docid_order };
        let sort_slot = self.options.sort_by.slot();
        let collapse_slot = self.options.collapse.map(|c| c.slot);
        let prune_by_heap = self.options.sort_by.ranks_by_weight_first();
        let percent_factor = match self.options.percent_cutoff {
            0 => 0.0,
            pct => pct as f64 / 100.0 - f64::EPSILON,
        };
        let cutoff = self.options.weight_cutoff;

        let mut proto = Proto {
            wanted,
            best: BTreeSet::new(),
            buckets: HashMap::new(),
            collapse_max: self.options.collapse.map_or(0, |c| c.max as usize),
            collapsed: 0,
        };
        let mut seen: usize = 0;
        let mut maxweight = max_possible;
        // Set once a document that would have matched may have been skipped.
        let mut heap_pruned = false;
        // Set once every remaining document is known not to match.
        let mut finished = false;

        loop {
            // The best weight only ever rises, so a floor relative to it
            // never rules out a document that would survive.
            let floor = cutoff.max(mset.max_attained * percent_factor);
            let mut threshold = floor;
            if prune_by_heap && proto.full() && seen >= check_at_least {
                threshold = threshold.max(proto.worst_weight());
            }
            if threshold > 0.0 && maxweight < threshold {
                debug!("stopping early: bound {} below threshold {}", maxweight, threshold);
                finished = maxweight < floor;
                break;
            }
            if wanted == 0 && seen >= check_at_least {
                break;
            }
            if threshold > floor {
                heap_pruned = true;
            }

            let adv = pl.next(threshold)?;
            let replaced = matches!(adv, Advance::Replace(_));
            if let Advance::Replace(new) = adv {
                pl = new;
            }
            if signal.take() || replaced {
                maxweight = pl.recalc_maxweight();
                trace!("tree now {} with bound {}", pl.description(), maxweight);
            }
            if pl.at_end() {
                finished = true;
                break;
            }

            let did = pl.docid();
            let weight = pl.weight()?;
            if weight < cutoff || weight < mset.max_attained * percent_factor {
                continue;
            }
            seen += 1;
            mset.max_attained = mset.max_attained.max(weight);
            trace!("doc {} weighs {}", did, weight);
            if wanted == 0 && collapse_slot.is_none() {
                continue;
            }

            let candidate = Candidate {
                did,
                weight,
                sort_key: self.value(did, sort_slot)?,
                collapse_key: self.value(did, collapse_slot)?,
                ranking,
            };
            proto.offer(candidate);
        }

        let floor = mset.max_attained * percent_factor;
        let before = proto.best.len();
        proto.best.retain(|c| c.weight >= floor);
        let dropped = (before - proto.best.len()) as DocCount;

        let seen = seen as DocCount;
        let matched = seen - proto.collapsed.min(seen);
        let counted_all = finished && !heap_pruned;
        if counted_all && dropped == 0 && percent_factor == 0.0 {
            mset.matches_lower_bound = matched;
            mset.matches_estimated = matched;
            mset.matches_upper_bound = matched;
        } else {
            // Under a percent cutoff only the documents still held are
            // known to clear the final floor.
            let lower = if percent_factor > 0.0 { proto.best.len() as DocCount } else { matched };
            let upper = if counted_all { matched } else { tf_max.saturating_sub(proto.collapsed).max(matched) };
            mset.matches_lower_bound = lower;
            mset.matches_upper_bound = upper;
            mset.matches_estimated = tf_est.saturating_sub(proto.collapsed + dropped).clamp(lower, upper);
        }
        if proto.collapsed > 0 {
            debug!("collapsed {} documents", proto.collapsed);
        }

        let items: Vec<MSetItem> = proto
            .best
            .iter()
            .skip(first as usize)
            .enumerate()
            .map(|(i, c)| MSetItem {
                docid: c.did,
                weight: c.weight,
                rank: first + i as DocCount,
                collapse_key: c.collapse_key.clone(),
                collapse_count: proto.collapse_count(&c.collapse_key),
                sort_key: c.sort_key.clone(),
            })
            .collect();
        mset.items = items;
        Ok(mset)
    }
}
