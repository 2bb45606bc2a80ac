//! Compiles a query tree into the postlist tree the matcher runs.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::backend::{DatabaseInternal, TermCursor};
use crate::core::error::{Error, Result};
use crate::core::types::{DocCount, TermCount, TermPos, ValueSlot};
use crate::postlist::{
    AllDocsPostList, AndMaybePostList, AndNotPostList, EmptyPostList, ExternalPostList, ExtraWeightPostList,
    LeafPostList, MaxPostList, MultiAndPostList, OrPostList, PhrasePostList, PostList, PruneSignal,
    SynonymPostList, ValueRangePostList, XorPostList,
};
use crate::query::ast::{Op, Query};
use crate::search::rset::RSet;
use crate::weight::{Weight, WeightStats};

/// What the compiled tree knows about one query term.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermInfo {
    pub termfreq: DocCount,
    /// Sum of the weight bounds of every occurrence of the term in the query.
    pub maxweight: f64,
}

pub struct QueryOptimiser<'a> {
    db: Arc<dyn DatabaseInternal>,
    weight: &'a dyn Weight,
    rset: &'a RSet,
    signal: PruneSignal,
    query_length: TermCount,
    dbsize: DocCount,
    /// First cursor opened; later terms are opened next to it.
    hint: Option<Box<dyn TermCursor>>,
    terms: HashMap<String, TermInfo>,
}

impl<'a> QueryOptimiser<'a> {
    pub fn new(
        db: Arc<dyn DatabaseInternal>,
        weight: &'a dyn Weight,
        rset: &'a RSet,
        signal: PruneSignal,
        query_length: TermCount,
    ) -> Self {
        let dbsize = db.doccount();
        QueryOptimiser { db, weight, rset, signal, query_length, dbsize, hint: None, terms: HashMap::new() }
    }

    /// Statistics gathered about each term while compiling.
    pub fn term_info(&self) -> &HashMap<String, TermInfo> {
        &self.terms
    }

    /// Build the tree for `query`, wrapped so it also carries the scheme's
    /// per-document extra weight when there is one.
    pub fn compile(&mut self, query: &Query) -> Result<Box<dyn PostList>> {
        let pl = self.build(query, 1.0)?;
        let mut extra = self.weight.clone_box();
        extra.init(&self.collection_stats(), 0.0);
        if extra.maxextra() > 0.0 {
            return Ok(Box::new(ExtraWeightPostList::new(pl, extra, &self.db, self.signal.clone())));
        }
        Ok(pl)
    }

    fn collection_stats(&self) -> WeightStats {
        WeightStats {
            collection_size: self.dbsize,
            rset_size: self.rset.len(),
            average_length: self.db.avlength(),
            doclength_lower_bound: self.db.doclength_lower_bound(),
            doclength_upper_bound: self.db.doclength_upper_bound(),
            query_length: self.query_length,
            ..WeightStats::default()
        }
    }

    fn open_cursor(&mut self, term: &str) -> Result<Box<dyn TermCursor>> {
        if self.hint.is_none() {
            self.hint = Some(self.db.open_post_list(term)?);
        }
        match &self.hint {
            Some(hint) => hint.open_nearby(term),
            None => self.db.open_post_list(term),
        }
    }

    fn build(&mut self, query: &Query, factor: f64) -> Result<Box<dyn PostList>> {
        match query {
            Query::MatchNothing => Ok(Box::new(EmptyPostList::new())),
            Query::Term { term, wqf, .. } => self.leaf(term, *wqf, factor),
            Query::Compound { op, subqs, param } => self.compound(*op, subqs, *param, factor),
            Query::ScaleWeight { factor: scale, subq } => self.build(subq, factor * scale),
            Query::ValueRange { slot, lo, hi } => self.value_range(*slot, Some(lo), Some(hi)),
            Query::ValueGe { slot, lo } => self.value_range(*slot, Some(lo), None),
            Query::ValueLe { slot, hi } => self.value_range(*slot, None, Some(hi)),
            Query::External(source) => {
                let mut source = source.0.clone_box();
                source.init(&self.db)?;
                Ok(Box::new(ExternalPostList::new(source, factor)))
            }
        }
    }

    fn leaf(&mut self, term: &str, wqf: TermCount, factor: f64) -> Result<Box<dyn PostList>> {
        if term.is_empty() {
            return Ok(Box::new(AllDocsPostList::open(self.db.as_ref())?));
        }
        let cursor = self.open_cursor(term)?;
        let termfreq = cursor.termfreq();
        let mut leaf = LeafPostList::from_cursor(&self.db, cursor);
        let mut maxpart = 0.0;
        if factor != 0.0 {
            let stats = WeightStats {
                wdf_upper_bound: self.db.wdf_upper_bound(term)?,
                termfreq,
                reltermfreq: self.rset.reltermfreq(self.db.as_ref(), term)?,
                collection_freq: leaf.collection_freq(),
                wqf,
                ..self.collection_stats()
            };
            let mut weight = self.weight.clone_box();
            weight.init(&stats, factor);
            maxpart = weight.maxpart();
            leaf.set_termweight(weight)?;
        }
        let info = self.terms.entry(term.to_string()).or_default();
        info.termfreq = termfreq;
        info.maxweight += maxpart;
        Ok(Box::new(leaf))
    }

    fn build_all(&mut self, subqs: &[Query], factor: f64) -> Result<Vec<Box<dyn PostList>>> {
        subqs.iter().map(|q| self.build(q, factor)).collect()
    }

    fn pair(&mut self, subqs: &[Query], lfactor: f64, rfactor: f64) -> Result<(Box<dyn PostList>, Box<dyn PostList>)> {
        let [l, r] = subqs else {
            return Err(Error::invalid_argument(format!("expected 2 subqueries, got {}", subqs.len())));
        };
        Ok((self.build(l, lfactor)?, self.build(r, rfactor)?))
    }

    fn compound(&mut self, op: Op, subqs: &[Query], param: TermCount, factor: f64) -> Result<Box<dyn PostList>> {
        let (dbsize, signal) = (self.dbsize, self.signal.clone());
        Ok(match op {
            Op::And => Box::new(MultiAndPostList::new(self.build_all(subqs, factor)?, dbsize, signal)),
            Op::Filter => {
                let mut children = Vec::with_capacity(subqs.len());
                for (i, q) in subqs.iter().enumerate() {
                    children.push(self.build(q, if i == 0 { factor } else { 0.0 })?);
                }
                Box::new(MultiAndPostList::new(children, dbsize, signal))
            }
            Op::Or => OrPostList::tree(self.build_all(subqs, factor)?, dbsize, signal),
            Op::AndNot => {
                let (l, r) = self.pair(subqs, factor, 0.0)?;
                Box::new(AndNotPostList::new(l, r, dbsize, signal))
            }
            Op::AndMaybe => {
                let (l, r) = self.pair(subqs, factor, factor)?;
                Box::new(AndMaybePostList::new(l, r, dbsize, signal))
            }
            Op::Xor => Box::new(XorPostList::new(self.build_all(subqs, factor)?, dbsize, signal)),
            Op::Max => Box::new(MaxPostList::new(self.build_all(subqs, factor)?, dbsize, signal)),
            Op::Phrase | Op::Near => self.positional(op, subqs, param, factor)?,
            Op::EliteSet => {
                let mut children = self.build_all(subqs, factor)?;
                let size = (param as usize).max(1);
                if children.len() > size {
                    children.sort_by(|a, b| b.maxweight().total_cmp(&a.maxweight()));
                    children.truncate(size);
                    debug!("ELITE_SET kept {} of {} subqueries", size, subqs.len());
                }
                OrPostList::tree(children, dbsize, signal)
            }
            Op::Synonym => self.synonym(subqs, factor)?,
        })
    }

    fn positional(&mut self, op: Op, subqs: &[Query], window: TermCount, factor: f64) -> Result<Box<dyn PostList>> {
        let mut terms = Vec::with_capacity(subqs.len());
        for q in subqs {
            match q {
                Query::Term { term, .. } if !term.is_empty() => terms.push(term.clone()),
                _ => return Err(Error::unimplemented(format!("{} over anything but terms", q))),
            }
        }
        let and: Box<dyn PostList> =
            Box::new(MultiAndPostList::new(self.build_all(subqs, factor)?, self.dbsize, self.signal.clone()));
        if !self.db.has_positions() {
            debug!("no positional data, running {:?} as AND", op);
            return Ok(and);
        }
        let window = window as TermPos;
        Ok(Box::new(if op == Op::Phrase {
            PhrasePostList::phrase(and, terms, window, self.db.clone(), self.signal.clone())
        } else {
            PhrasePostList::near(and, terms, window, self.db.clone(), self.signal.clone())
        }))
    }

    /// The union of the subqueries weighed as one term, using combined
    /// statistics for the weight.
    fn synonym(&mut self, subqs: &[Query], factor: f64) -> Result<Box<dyn PostList>> {
        let subtree = OrPostList::tree(self.build_all(subqs, 0.0)?, self.dbsize, self.signal.clone());
        if factor == 0.0 {
            return Ok(subtree);
        }

        let mut collection_freq = 0u64;
        let mut wdf_upper_bound: TermCount = 0;
        let mut wqf: TermCount = 0;
        for q in subqs {
            for term in q.terms() {
                collection_freq += self.db.collection_freq(&term)?;
                wdf_upper_bound = wdf_upper_bound.saturating_add(self.db.wdf_upper_bound(&term)?);
            }
            wqf = wqf.saturating_add(q.query_length().max(1));
        }
        let stats = WeightStats {
            wdf_upper_bound: wdf_upper_bound.min(self.db.doclength_upper_bound()),
            termfreq: subtree.termfreq_est(),
            collection_freq,
            wqf,
            ..self.collection_stats()
        };
        let mut weight = self.weight.clone_box();
        weight.init(&stats, factor);
        Ok(Box::new(SynonymPostList::new(subtree, weight, &self.db, self.signal.clone())))
    }

    fn value_range(&mut self, slot: ValueSlot, lo: Option<&Vec<u8>>, hi: Option<&Vec<u8>>) -> Result<Box<dyn PostList>> {
        let stats = self.db.value_stats(slot)?;
        let outside = lo.is_some_and(|lo| *lo > stats.upper_bound) || hi.is_some_and(|hi| *hi < stats.lower_bound);
        if stats.freq == 0 || outside {
            return Ok(Box::new(EmptyPostList::new()));
        }
        let covers = lo.is_none_or(|lo| *lo <= stats.lower_bound) && hi.is_none_or(|hi| *hi >= stats.upper_bound);
        let cursor = self.db.open_value_stream(slot)?;
        Ok(Box::new(ValueRangePostList::new(cursor, slot, lo.cloned(), hi.cloned(), stats.freq, covers)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::inmemory::InMemoryDatabase;
    use crate::core::types::Document;
    use crate::postlist::testing::{db, drain, drain_weights};
    use crate::weight::{BoolWeight, Bm25Weight};

    fn compile(db: &Arc<dyn DatabaseInternal>, q: &Query) -> Box<dyn PostList> {
        let rset = RSet::new();
        let weight = Bm25Weight::default();
        let mut opt = QueryOptimiser::new(db.clone(), &weight, &rset, PruneSignal::new(), q.query_length());
        opt.compile(q).unwrap()
    }

    #[test]
    fn boolean_operators() {
        let db = db(&[&["cat", "dog"], &["cat"], &["dog", "eel"], &["eel"]]);
        let t = Query::term;
        let and = Query::new(Op::And, [t("cat"), t("dog")]).unwrap();
        assert_eq!(drain(compile(&db, &and)), vec![1]);
        let or = Query::new(Op::Or, [t("cat"), t("dog")]).unwrap();
        assert_eq!(drain(compile(&db, &or)), vec![1, 2, 3]);
        let not = Query::new(Op::AndNot, [t("dog"), t("cat")]).unwrap();
        assert_eq!(drain(compile(&db, &not)), vec![3]);
        let xor = Query::new(Op::Xor, [t("cat"), t("dog")]).unwrap();
        assert_eq!(drain(compile(&db, &xor)), vec![2, 3]);
        let filter = Query::new(Op::Filter, [t("eel"), t("dog")]).unwrap();
        assert_eq!(drain(compile(&db, &filter)), vec![3]);
        assert_eq!(drain(compile(&db, &Query::match_all())), vec![1, 2, 3, 4]);
        assert!(drain(compile(&db, &Query::MatchNothing)).is_empty());
    }

    #[test]
    fn phrase_respects_window() {
        let db = db(&[&["the", "fox", "jumps"], &["fox", "a", "b", "c", "jumps"], &["jumps", "fox"]]);
        let q = Query::with_param(Op::Phrase, [Query::term("fox"), Query::term("jumps")], 2).unwrap();
        assert_eq!(drain(compile(&db, &q)), vec![1]);
        let q = Query::with_param(Op::Near, [Query::term("fox"), Query::term("jumps")], 2).unwrap();
        assert_eq!(drain(compile(&db, &q)), vec![1, 3]);
    }

    #[test]
    fn filter_side_adds_no_weight() {
        let db = db(&[&["a", "b"], &["a"], &["b"]]);
        let plain = drain_weights(compile(&db, &Query::term("a")), 0.0);
        let q = Query::new(Op::Filter, [Query::term("a"), Query::term("b")]).unwrap();
        let filtered = drain_weights(compile(&db, &q), 0.0);
        assert_eq!(filtered.len(), 1);
        assert!((filtered[0].1 - plain[0].1).abs() < 1e-12);
    }

    #[test]
    fn scale_weight_multiplies() {
        let db = db(&[&["a"], &["b"], &["a", "b"]]);
        let base = drain_weights(compile(&db, &Query::term("a")), 0.0);
        let scaled = drain_weights(compile(&db, &Query::scale_weight(2.5, Query::term("a")).unwrap()), 0.0);
        for (b, s) in base.iter().zip(&scaled) {
            assert_eq!(b.0, s.0);
            assert!((s.1 - 2.5 * b.1).abs() < 1e-9);
        }
    }

    #[test]
    fn value_ranges() {
        let mut mem = InMemoryDatabase::new();
        for v in ["apple", "kiwi", "pear", ""] {
            let mut doc = Document::new();
            doc.add_term("x", 1).unwrap();
            if !v.is_empty() {
                doc.add_value(0, v);
            }
            mem.add_document(&doc).unwrap();
        }
        let db: Arc<dyn DatabaseInternal> = Arc::new(mem);
        assert_eq!(drain(compile(&db, &Query::value_range(0, "b", "p"))), vec![2]);
        assert_eq!(drain(compile(&db, &Query::value_ge(0, "kiwi"))), vec![2, 3]);
        assert_eq!(drain(compile(&db, &Query::value_le(0, "kiwi"))), vec![1, 2]);
        assert!(drain(compile(&db, &Query::value_ge(0, "zzz"))).is_empty());
        assert!(drain(compile(&db, &Query::value_ge(7, "a"))).is_empty());
    }

    #[test]
    fn elite_set_keeps_the_heaviest() {
        let mut docs: Vec<Vec<String>> = (0..40).map(|_| vec!["common".to_string()]).collect();
        docs[0].push("rare".to_string());
        docs[1].push("mid".to_string());
        docs[2].push("mid".to_string());
        let refs: Vec<Vec<&str>> = docs.iter().map(|d| d.iter().map(String::as_str).collect()).collect();
        let slices: Vec<&[&str]> = refs.iter().map(Vec::as_slice).collect();
        let db = db(&slices);
        let q = Query::with_param(Op::EliteSet, ["common", "rare", "mid"].map(Query::term), 2).unwrap();
        assert_eq!(drain(compile(&db, &q)), vec![1, 2, 3]);
    }

    #[test]
    fn synonym_weighs_as_one_term() {
        let db = db(&[&["car", "auto"], &["car"], &["bus"], &["auto"]]);
        let q = Query::new(Op::Synonym, [Query::term("car"), Query::term("auto")]).unwrap();
        let got = drain_weights(compile(&db, &q), 0.0);
        assert_eq!(got.iter().map(|(d, _)| *d).collect::<Vec<_>>(), vec![1, 2, 4]);
        assert!(got.iter().all(|(_, w)| *w > 0.0));
    }

    #[test]
    fn term_info_is_recorded() {
        let db = db(&[&["a", "b"], &["a"]]);
        let rset = RSet::new();
        let weight = BoolWeight;
        let q = Query::new(Op::Or, [Query::term("a"), Query::term("b")]).unwrap();
        let mut opt = QueryOptimiser::new(db.clone(), &weight, &rset, PruneSignal::new(), 2);
        opt.compile(&q).unwrap();
        assert_eq!(opt.term_info()["a"].termfreq, 2);
        assert_eq!(opt.term_info()["b"].termfreq, 1);
        assert_eq!(opt.term_info()["a"].maxweight, 0.0);
    }
}
