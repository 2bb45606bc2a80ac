use std::collections::HashMap;

use crate::core::types::{DocCount, DocId};
use crate::query::TermInfo;

/// One ranked match.
#[derive(Debug, Clone, PartialEq)]
pub struct MSetItem {
    pub docid: DocId,
    pub weight: f64,
    /// Position in the full ranking, counting from 0.
    pub rank: DocCount,
    /// Value in the collapse slot, empty when not collapsing.
    pub collapse_key: Vec<u8>,
    /// How many documents with the same collapse key were dropped.
    pub collapse_count: DocCount,
    /// Value in the sort slot, empty when ranking by relevance only.
    pub sort_key: Vec<u8>,
}

/// A page of ranked matches with statistics about the whole match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MSet {
    pub first: DocCount,
    pub items: Vec<MSetItem>,
    pub matches_lower_bound: DocCount,
    pub matches_estimated: DocCount,
    pub matches_upper_bound: DocCount,
    /// Bound on the weight any document could have got.
    pub max_possible: f64,
    /// Highest weight any document did get.
    pub max_attained: f64,
    pub(crate) terms: HashMap<String, TermInfo>,
}

impl MSet {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MSetItem> {
        self.items.iter()
    }

    pub fn docids(&self) -> Vec<DocId> {
        self.items.iter().map(|i| i.docid).collect()
    }

    /// Docs indexed by a query term, or 0 for a term not in the query.
    pub fn termfreq(&self, term: &str) -> DocCount {
        self.terms.get(term).map_or(0, |t| t.termfreq)
    }

    /// Most a query term could contribute to a document's weight.
    pub fn termweight(&self, term: &str) -> f64 {
        self.terms.get(term).map_or(0.0, |t| t.maxweight)
    }

    /// The item at `rank`, if it's on this page.
    pub fn at_rank(&self, rank: DocCount) -> Option<&MSetItem> {
        rank.checked_sub(self.first).and_then(|i| self.items.get(i as usize))
    }

    /// `weight` as a percentage of the best weight attained.
    pub fn percent(&self, weight: f64) -> u32 {
        if self.max_attained <= 0.0 {
            return 100;
        }
        ((weight / self.max_attained) * 100.0).round().clamp(0.0, 100.0) as u32
    }
}

impl<'a> IntoIterator for &'a MSet {
    type Item = &'a MSetItem;
    type IntoIter = std::slice::Iter<'a, MSetItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
