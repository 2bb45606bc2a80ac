//! The runtime postlist tree the matcher pulls documents from.
//!
//! Every node is a cursor over docids in ascending order. A fresh node sits
//! before its first document; `next` moves onto it. Advancing may hand back
//! a replacement node which the caller must put in place of the old one,
//! already positioned where the old node would have been.

pub mod alldocs;
pub mod and;
pub mod andmaybe;
pub mod andnot;
pub mod empty;
pub mod external;
pub mod extra;
pub mod leaf;
pub mod max;
pub mod or;
pub mod phrase;
pub mod synonym;
pub mod valuerange;
pub mod xor;

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use log::trace;

pub use alldocs::AllDocsPostList;
pub use and::MultiAndPostList;
pub use andmaybe::AndMaybePostList;
pub use andnot::AndNotPostList;
pub use empty::EmptyPostList;
pub use external::ExternalPostList;
pub use extra::ExtraWeightPostList;
pub use leaf::LeafPostList;
pub use max::MaxPostList;
pub use or::OrPostList;
pub use phrase::PhrasePostList;
pub use synonym::SynonymPostList;
pub use valuerange::ValueRangePostList;
pub use xor::XorPostList;

use crate::backend::{doc_not_found, DatabaseInternal, TermCursor};
use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};

/// What advancing a node did to its identity.
pub enum Advance {
    Unchanged,
    /// The node decayed; use this one from now on.
    Replace(Box<dyn PostList>),
    /// The node moved past its last document.
    Exhausted,
}

pub trait PostList {
    fn termfreq_min(&self) -> DocCount;
    fn termfreq_max(&self) -> DocCount;
    fn termfreq_est(&self) -> DocCount;

    /// Bound on any weight still to come, as of the last recalculation.
    fn maxweight(&self) -> f64;
    /// Recompute the bound from the current children. Never increases it.
    fn recalc_maxweight(&mut self) -> f64;

    /// 0 before the first `next`.
    fn docid(&self) -> DocId;
    fn weight(&mut self) -> Result<f64>;
    /// Summed wdf of the terms matching at the current document.
    fn wdf(&self) -> TermCount;
    fn at_end(&self) -> bool;

    /// Move to the next document that could weigh at least `w_min`.
    fn next(&mut self, w_min: f64) -> Result<Advance>;
    /// Move to the first document >= `did` that could weigh at least
    /// `w_min`. A target at or before the current document leaves it put.
    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Advance>;

    fn description(&self) -> String;
}

/// Raised when a node somewhere in the tree swaps a child for a
/// replacement, so the matcher knows cached bounds went stale.
#[derive(Clone, Default, Debug)]
pub struct PruneSignal(Rc<Cell<bool>>);

impl PruneSignal {
    pub fn new() -> Self {
        PruneSignal::default()
    }

    pub fn raise(&self) {
        self.0.set(true);
    }

    /// Returns whether the signal was raised, clearing it.
    pub fn take(&self) -> bool {
        self.0.replace(false)
    }
}

fn settle(child: &mut Box<dyn PostList>, adv: Advance, signal: &PruneSignal) {
    if let Advance::Replace(new) = adv {
        trace!("pruned {} to {}", child.description(), new.description());
        *child = new;
        signal.raise();
    }
}

pub(crate) fn next_child(child: &mut Box<dyn PostList>, w_min: f64, signal: &PruneSignal) -> Result<()> {
    let adv = child.next(w_min)?;
    settle(child, adv, signal);
    Ok(())
}

pub(crate) fn skip_child(
    child: &mut Box<dyn PostList>,
    did: DocId,
    w_min: f64,
    signal: &PruneSignal,
) -> Result<()> {
    let adv = child.skip_to(did, w_min)?;
    settle(child, adv, signal);
    Ok(())
}

/// The docid a child is on, or None once it has run out.
pub(crate) fn head(pl: &dyn PostList) -> Option<DocId> {
    if pl.at_end() { None } else { Some(pl.docid()) }
}

/// Where a node that decayed into `replacement` should land so it is
/// positioned as the old node would be after a `skip_to(did)`.
pub(crate) fn decay_target(current: DocId, did: DocId) -> DocId {
    did.max(current).max(1)
}

/// Lazily opened document length lookups for weights that need them.
pub(crate) struct DocLengths {
    db: Arc<dyn DatabaseInternal>,
    cursor: Option<Box<dyn TermCursor>>,
}

impl DocLengths {
    pub(crate) fn new(db: Arc<dyn DatabaseInternal>) -> Self {
        DocLengths { db, cursor: None }
    }

    /// Lookups must come in ascending docid order.
    pub(crate) fn doclength(&mut self, did: DocId) -> Result<TermCount> {
        let cursor = match self.cursor.take() {
            Some(cursor) => cursor,
            None => self.db.open_post_list("")?,
        };
        let cursor = self.cursor.insert(cursor);
        cursor.skip_to(did)?;
        if cursor.at_end() || cursor.docid() != did {
            return Err(doc_not_found(did));
        }
        Ok(cursor.wdf())
    }

    pub(crate) fn unique_terms(&self, did: DocId) -> Result<TermCount> {
        self.db.unique_terms(did)
    }

    pub(crate) fn wdf_doc_max(&self, did: DocId) -> Result<TermCount> {
        self.db.wdf_doc_max(did)
    }
}

/// Estimate for the union of two lists drawn independently from `dbsize`
/// documents.
pub(crate) fn or_estimate(a: DocCount, b: DocCount, dbsize: DocCount) -> DocCount {
    if dbsize == 0 {
        return 0;
    }
    let (a, b, n) = (a as f64, b as f64, dbsize as f64);
    (a + b - a * b / n).round().min(n) as DocCount
}

pub(crate) fn and_estimate(a: DocCount, b: DocCount, dbsize: DocCount) -> DocCount {
    if dbsize == 0 {
        return 0;
    }
    (a as f64 * b as f64 / dbsize as f64).round() as DocCount
}
