use crate::core::database::Database;
use crate::core::error::{Error, Result};
use crate::core::types::{DocCount, DocId, ValueSlot};
use crate::query::Query;
use crate::search::matcher::{Collapse, DocidOrder, MatchOptions, Matcher, SortBy};
use crate::search::mset::MSet;
use crate::search::rset::RSet;
use crate::weight::{Bm25Weight, Weight};

/// Runs queries against one database.
pub struct Enquire {
    db: Database,
    query: Query,
    weight: Box<dyn Weight>,
    options: MatchOptions,
}

impl Enquire {
    /// BM25 with default parameters until told otherwise.
    pub fn new(db: &Database) -> Self {
        Enquire {
            db: db.clone(),
            query: Query::MatchNothing,
            weight: Box::new(Bm25Weight::default()),
            options: MatchOptions::default(),
        }
    }

    pub fn set_query(&mut self, query: Query) {
        self.query = query;
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn set_weighting_scheme(&mut self, weight: Box<dyn Weight>) {
        self.weight = weight;
    }

    pub fn set_docid_order(&mut self, order: DocidOrder) {
        self.options.docid_order = order;
    }

    /// Documents weighing less than `cutoff` don't match.
    pub fn set_weight_cutoff(&mut self, cutoff: f64) -> Result<()> {
        if !cutoff.is_finite() || cutoff < 0.0 {
            return Err(Error::invalid_argument(format!("weight cutoff must be finite and >= 0, got {}", cutoff)));
        }
        self.options.weight_cutoff = cutoff;
        Ok(())
    }

    /// Drop documents scoring under `percent` of the best weight, and those
    /// weighing under `weight`.
    pub fn set_cutoff(&mut self, percent: u32, weight: f64) -> Result<()> {
        if percent > 100 {
            return Err(Error::invalid_argument(format!("percent cutoff must be at most 100, got {}", percent)));
        }
        self.set_weight_cutoff(weight)?;
        self.options.percent_cutoff = percent;
        Ok(())
    }

    /// Keep only the best `max` documents for each value in `slot`.
    pub fn set_collapse_key(&mut self, slot: ValueSlot, max: DocCount) -> Result<()> {
        if max == 0 {
            return Err(Error::invalid_argument("collapse must keep at least one document per key"));
        }
        self.options.collapse = Some(Collapse { slot, max });
        Ok(())
    }

    pub fn clear_collapse_key(&mut self) {
        self.options.collapse = None;
    }

    pub fn set_sort_by_relevance(&mut self) {
        self.options.sort_by = SortBy::Relevance;
    }

    pub fn set_sort_by_value(&mut self, slot: ValueSlot, reverse: bool) {
        self.options.sort_by = SortBy::Value { slot, reverse };
    }

    pub fn set_sort_by_value_then_relevance(&mut self, slot: ValueSlot, reverse: bool) {
        self.options.sort_by = SortBy::ValueThenRelevance { slot, reverse };
    }

    pub fn set_sort_by_relevance_then_value(&mut self, slot: ValueSlot, reverse: bool) {
        self.options.sort_by = SortBy::RelevanceThenValue { slot, reverse };
    }

    pub fn get_mset(
        &self,
        first: DocCount,
        maxitems: DocCount,
        check_at_least: DocCount,
        rset: Option<&RSet>,
    ) -> Result<MSet> {
        let empty = RSet::new();
        let matcher = Matcher::new(self.db.internal().clone(), self.weight.as_ref(), self.options);
        matcher.get_mset(&self.query, first, maxitems, check_at_least, rset.unwrap_or(&empty))
    }

    /// The query's terms which index `did`, in query order.
    pub fn matching_terms(&self, did: DocId) -> Result<Vec<String>> {
        let termlist = self.db.termlist(did)?;
        Ok(self
            .query
            .terms()
            .into_iter()
            .filter(|t| termlist.binary_search_by(|e| e.term.as_str().cmp(t)).is_ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::inmemory::InMemoryDatabase;
    use crate::backend::DatabaseInternal;
    use crate::core::types::Document;
    use crate::postlist::testing::db;
    use crate::query::Op;
    use crate::weight::{BoolWeight, TfIdfWeight, TradWeight};
    use std::sync::Arc;

    /// Documents of (wdf of "x", value in slot 0).
    fn valued(docs: &[(u32, &str)]) -> Database {
        let mut db = InMemoryDatabase::new();
        for (wdf, value) in docs {
            let mut doc = Document::new();
            doc.add_term("x", *wdf).unwrap();
            doc.add_term("pad", 3).unwrap();
            doc.add_value(0, *value);
            db.add_document(&doc).unwrap();
        }
        let db: Arc<dyn DatabaseInternal> = Arc::new(db);
        Database::from_internal(db)
    }

    #[test]
    fn end_to_end_over_memory() {
        let db = Database::from_internal(db(&[&["cat", "dog"], &["cat"], &["eel"]]));
        let mut enquire = Enquire::new(&db);
        enquire.set_query(Query::new(Op::And, [Query::term("cat"), Query::term("dog")]).unwrap());
        assert_eq!(enquire.get_mset(0, 10, 0, None).unwrap().docids(), vec![1]);

        enquire.set_query(Query::new(Op::Or, [Query::term("cat"), Query::term("dog")]).unwrap());
        enquire.set_weighting_scheme(Box::new(BoolWeight));
        assert_eq!(enquire.get_mset(0, 10, 0, None).unwrap().docids(), vec![1, 2]);
        assert_eq!(enquire.matching_terms(1).unwrap(), vec!["cat", "dog"]);
        assert_eq!(enquire.matching_terms(2).unwrap(), vec!["cat"]);
        assert!(enquire.set_weight_cutoff(-1.0).is_err());
    }

    #[test]
    fn relevance_set_changes_weights() {
        let db = Database::from_internal(db(&[&["a", "b"], &["a"], &["b"], &["c"], &["a", "c"]]));
        let mut enquire = Enquire::new(&db);
        enquire.set_weighting_scheme(Box::new(TradWeight::default()));
        enquire.set_query(Query::term("a"));
        let plain = enquire.get_mset(0, 10, 0, None).unwrap();
        let rset: RSet = [1, 2].into_iter().collect();
        let fed = enquire.get_mset(0, 10, 0, Some(&rset)).unwrap();
        assert_eq!(plain.len(), fed.len());
        assert!(fed.termweight("a") != plain.termweight("a"));
    }

    #[test]
    fn sorts_by_value_ignoring_weight() {
        let db = valued(&[(1, "b"), (4, "c"), (2, "a"), (3, ""), (5, "b")]);
        let mut enquire = Enquire::new(&db);
        enquire.set_query(Query::term("x"));
        enquire.set_sort_by_value(0, false);
        let mset = enquire.get_mset(0, 3, 0, None).unwrap();
        assert_eq!(mset.docids(), vec![4, 3, 1]);
        assert_eq!(mset.items[1].sort_key, b"a".to_vec());
        assert_eq!(mset.matches_estimated, 5);

        enquire.set_sort_by_value(0, true);
        assert_eq!(enquire.get_mset(0, 2, 0, None).unwrap().docids(), vec![2, 1]);

        // Ties on value fall back to weight, so doc 5 beats doc 1.
        enquire.set_sort_by_value_then_relevance(0, false);
        assert_eq!(enquire.get_mset(0, 10, 0, None).unwrap().docids(), vec![4, 3, 5, 1, 2]);

        enquire.set_sort_by_relevance_then_value(0, false);
        enquire.set_weighting_scheme(Box::new(BoolWeight));
        assert_eq!(enquire.get_mset(0, 10, 0, None).unwrap().docids(), vec![4, 3, 1, 5, 2]);

        enquire.set_sort_by_relevance();
        assert_eq!(enquire.get_mset(0, 10, 0, None).unwrap().docids(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn collapse_keeps_the_best_per_key() {
        let db = valued(&[(1, "red"), (4, "blue"), (2, "red"), (3, ""), (5, "blue"), (6, "red")]);
        let mut enquire = Enquire::new(&db);
        enquire.set_query(Query::term("x"));
        enquire.set_weighting_scheme(Box::new(TfIdfWeight::new("nnn").unwrap()));
        assert!(enquire.set_collapse_key(0, 0).is_err());
        enquire.set_collapse_key(0, 1).unwrap();
        let mset = enquire.get_mset(0, 10, 0, None).unwrap();
        assert_eq!(mset.docids(), vec![6, 5, 4]);
        assert_eq!(mset.items[0].collapse_key, b"red".to_vec());
        assert_eq!(mset.items[0].collapse_count, 2);
        assert_eq!(mset.items[1].collapse_count, 1);
        assert_eq!(mset.items[2].collapse_count, 0);
        assert_eq!(mset.matches_estimated, 3);

        enquire.set_collapse_key(0, 2).unwrap();
        assert_eq!(enquire.get_mset(0, 10, 0, None).unwrap().docids(), vec![6, 5, 2, 4, 3]);

        enquire.clear_collapse_key();
        assert_eq!(enquire.get_mset(0, 10, 0, None).unwrap().len(), 6);
    }

    #[test]
    fn percent_cutoff_is_relative_to_the_best() {
        let db = valued(&[(1, ""), (4, ""), (2, ""), (8, ""), (6, "")]);
        let mut enquire = Enquire::new(&db);
        enquire.set_query(Query::term("x"));
        enquire.set_weighting_scheme(Box::new(TfIdfWeight::new("nnn").unwrap()));
        enquire.set_cutoff(50, 0.0).unwrap();
        let mset = enquire.get_mset(0, 10, 0, None).unwrap();
        assert_eq!(mset.docids(), vec![4, 5, 2]);
        assert!(mset.iter().all(|i| mset.percent(i.weight) >= 50));
        assert!(mset.matches_lower_bound <= 3 && mset.matches_upper_bound >= 3);

        enquire.set_cutoff(100, 0.0).unwrap();
        assert_eq!(enquire.get_mset(0, 10, 0, None).unwrap().docids(), vec![4]);
        assert!(enquire.set_cutoff(101, 0.0).is_err());
    }
}
