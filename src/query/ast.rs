use std::fmt;

use crate::core::error::{Error, Result};
use crate::core::types::{TermCount, TermPos, ValueSlot};
use crate::query::source::PostingSource;

/// Operators combining subqueries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Every subquery matches.
    And,
    /// Any subquery matches.
    Or,
    /// The first subquery matches and the second doesn't.
    AndNot,
    /// Exactly one subquery matches.
    Xor,
    /// The first subquery matches; the second only adds weight.
    AndMaybe,
    /// Like AND, but only the first subquery weighs.
    Filter,
    /// The terms occur within a window, in any order.
    Near,
    /// The terms occur in order within a window.
    Phrase,
    /// OR of the subqueries which could weigh the most.
    EliteSet,
    /// The subqueries are weighed as if they were one term.
    Synonym,
    /// Any subquery matches, weighed by the best one.
    Max,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::And => "AND",
            Op::Or => "OR",
            Op::AndNot => "AND_NOT",
            Op::Xor => "XOR",
            Op::AndMaybe => "AND_MAYBE",
            Op::Filter => "FILTER",
            Op::Near => "NEAR",
            Op::Phrase => "PHRASE",
            Op::EliteSet => "ELITE_SET",
            Op::Synonym => "SYNONYM",
            Op::Max => "MAX",
        }
    }

    fn is_positional(self) -> bool {
        matches!(self, Op::Near | Op::Phrase)
    }
}

/// A posting source inside a query. Two are equal when they have the
/// same name and parameters.
#[derive(Debug)]
pub struct ExternalSource(pub Box<dyn PostingSource>);

impl Clone for ExternalSource {
    fn clone(&self) -> Self {
        ExternalSource(self.0.clone_box())
    }
}

impl PartialEq for ExternalSource {
    fn eq(&self, other: &Self) -> bool {
        self.0.name() == other.0.name() && self.0.serialise() == other.0.serialise()
    }
}

/// A query tree. Build compound queries with `Query::new` or
/// `Query::with_param`, which simplify as they go: the tree you get back
/// is final.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Query {
    #[default]
    MatchNothing,
    /// A term, or every document when the term is empty.
    Term { term: String, wqf: TermCount, pos: TermPos },
    /// `param` is the window of NEAR and PHRASE and the set size of
    /// ELITE_SET; other operators ignore it.
    Compound { op: Op, subqs: Vec<Query>, param: TermCount },
    ScaleWeight { factor: f64, subq: Box<Query> },
    ValueRange { slot: ValueSlot, lo: Vec<u8>, hi: Vec<u8> },
    ValueGe { slot: ValueSlot, lo: Vec<u8> },
    ValueLe { slot: ValueSlot, hi: Vec<u8> },
    External(ExternalSource),
}

impl Query {
    pub fn term(term: impl Into<String>) -> Query {
        Query::Term { term: term.into(), wqf: 1, pos: 0 }
    }

    pub fn term_at(term: impl Into<String>, wqf: TermCount, pos: TermPos) -> Query {
        Query::Term { term: term.into(), wqf, pos }
    }

    pub fn match_all() -> Query {
        Query::term("")
    }

    pub fn match_nothing() -> Query {
        Query::MatchNothing
    }

    pub fn new(op: Op, subqs: impl IntoIterator<Item = Query>) -> Result<Query> {
        Query::with_param(op, subqs, 0)
    }

    pub fn with_param(op: Op, subqs: impl IntoIterator<Item = Query>, param: TermCount) -> Result<Query> {
        end_construction(op, subqs.into_iter().collect(), param)
    }

    pub fn scale_weight(factor: f64, subq: Query) -> Result<Query> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(Error::invalid_argument(format!("scale factor must be finite and >= 0, got {}", factor)));
        }
        Ok(match subq {
            Query::MatchNothing => Query::MatchNothing,
            subq if factor == 1.0 => subq,
            Query::ScaleWeight { factor: inner, subq } => Query::ScaleWeight { factor: factor * inner, subq },
            subq => Query::ScaleWeight { factor, subq: Box::new(subq) },
        })
    }

    /// Documents whose value in `slot` lies in `lo..=hi`.
    pub fn value_range(slot: ValueSlot, lo: impl Into<Vec<u8>>, hi: impl Into<Vec<u8>>) -> Query {
        let (lo, hi) = (lo.into(), hi.into());
        if lo > hi {
            return Query::MatchNothing;
        }
        if lo.is_empty() {
            return Query::ValueLe { slot, hi };
        }
        Query::ValueRange { slot, lo, hi }
    }

    pub fn value_ge(slot: ValueSlot, lo: impl Into<Vec<u8>>) -> Query {
        Query::ValueGe { slot, lo: lo.into() }
    }

    pub fn value_le(slot: ValueSlot, hi: impl Into<Vec<u8>>) -> Query {
        Query::ValueLe { slot, hi: hi.into() }
    }

    pub fn external(source: Box<dyn PostingSource>) -> Query {
        Query::External(ExternalSource(source))
    }

    pub fn is_match_nothing(&self) -> bool {
        matches!(self, Query::MatchNothing)
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Query::Term { term, .. } if term.is_empty())
    }

    /// Distinct terms in the order they first appear.
    pub fn terms(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        self.visit_terms(&mut |term, _| {
            if !out.iter().any(|t| t == term) {
                out.push(term.to_string());
            }
        });
        out
    }

    /// Sum of the wqfs of every term in the query.
    pub fn query_length(&self) -> TermCount {
        let mut len: TermCount = 0;
        self.visit_terms(&mut |_, wqf| len = len.saturating_add(wqf));
        len
    }

    fn visit_terms(&self, f: &mut dyn FnMut(&str, TermCount)) {
        match self {
            Query::Term { term, wqf, .. } if !term.is_empty() => f(term, *wqf),
            Query::Compound { subqs, .. } => subqs.iter().for_each(|q| q.visit_terms(f)),
            Query::ScaleWeight { subq, .. } => subq.visit_terms(f),
            _ => {}
        }
    }
}

fn end_construction(op: Op, subqs: Vec<Query>, param: TermCount) -> Result<Query> {
    if matches!(op, Op::AndNot | Op::AndMaybe) {
        if subqs.len() != 2 {
            return Err(Error::invalid_argument(format!(
                "{} takes 2 subqueries, got {}", op.name(), subqs.len()
            )));
        }
        let mut it = subqs.into_iter();
        let (Some(l), Some(r)) = (it.next(), it.next()) else {
            return Ok(Query::MatchNothing);
        };
        return Ok(match (l, r) {
            (Query::MatchNothing, _) => Query::MatchNothing,
            (l, Query::MatchNothing) => l,
            (l, r) => Query::Compound { op, subqs: vec![l, r], param: 0 },
        });
    }

    // An ELITE_SET that can keep every subquery is just an OR, and must be
    // simplified as one.
    let (op, param) = match op {
        Op::EliteSet => {
            let live = subqs.iter().filter(|q| !q.is_match_nothing()).count();
            let size = if param == 0 { ((live as f64).sqrt().ceil() as TermCount).max(10) } else { param };
            if size as usize >= live { (Op::Or, 0) } else { (Op::EliteSet, size) }
        }
        op if op.is_positional() => (op, param),
        op => (op, 0),
    };

    // Splice in children using the same associative operator.
    let mut flat = Vec::with_capacity(subqs.len());
    for q in subqs {
        match q {
            Query::Compound { op: child_op, subqs, .. }
                if child_op == op && matches!(op, Op::And | Op::Or | Op::Synonym | Op::Max) =>
            {
                flat.extend(subqs)
            }
            q => flat.push(q),
        }
    }

    let strict = matches!(op, Op::And | Op::Filter | Op::Near | Op::Phrase);
    if strict {
        if flat.iter().any(Query::is_match_nothing) {
            return Ok(Query::MatchNothing);
        }
    } else {
        flat.retain(|q| !q.is_match_nothing());
    }
    if flat.is_empty() {
        return Ok(Query::MatchNothing);
    }

    if op.is_positional() {
        return positional(op, flat, param);
    }

    if matches!(op, Op::And | Op::Or | Op::Xor | Op::Synonym) {
        flat = collapse_terms(flat);
    }
    if op == Op::And && flat.len() > 1 {
        // Every document already matches and it adds no weight.
        flat.retain(|q| !q.is_match_all());
        if flat.is_empty() {
            return Ok(Query::match_all());
        }
    }

    if flat.len() == 1 {
        let only = matches!(op, Op::Synonym) && !matches!(flat[0], Query::Term { .. });
        if !only {
            return Ok(flat.pop().unwrap_or_default());
        }
    }
    Ok(Query::Compound { op, subqs: flat, param })
}

/// Merge repeated terms at the same position, summing their wqf.
fn collapse_terms(subqs: Vec<Query>) -> Vec<Query> {
    let mut out: Vec<Query> = Vec::with_capacity(subqs.len());
    for q in subqs {
        if let Query::Term { term, wqf, pos } = &q {
            let seen = out.iter_mut().find_map(|o| match o {
                Query::Term { term: t, wqf: w, pos: p } if t == term && p == pos => Some(w),
                _ => None,
            });
            if let Some(w) = seen {
                *w = w.saturating_add(*wqf);
                continue;
            }
        }
        out.push(q);
    }
    out
}

/// PHRASE and NEAR distribute over AND, OR and XOR children, so
/// `a NEAR (b AND c)` becomes `(a NEAR b) AND (a NEAR c)`.
fn positional(op: Op, subqs: Vec<Query>, window: TermCount) -> Result<Query> {
    if subqs.iter().any(|q| matches!(q, Query::Compound { op, .. } if op.is_positional())) {
        return Err(Error::unimplemented(format!("{} inside PHRASE or NEAR", op.name())));
    }
    let split = subqs
        .iter()
        .position(|q| matches!(q, Query::Compound { op: Op::And | Op::Or | Op::Xor, .. }));
    if let Some(i) = split {
        let mut subqs = subqs;
        let Query::Compound { op: inner, subqs: alternatives, .. } = subqs.remove(i) else {
            return Err(Error::invalid_argument("positional split on a non-compound subquery"));
        };
        let mut parts = Vec::with_capacity(alternatives.len());
        for alt in alternatives {
            let mut branch = subqs.clone();
            branch.insert(i, alt);
            parts.push(Query::with_param(op, branch, window)?);
        }
        return Query::new(inner, parts);
    }

    if subqs.len() == 1 {
        return Ok(subqs.into_iter().next().unwrap_or_default());
    }
    let window = window.max(subqs.len() as TermCount);
    Ok(Query::Compound { op, subqs, param: window })
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::MatchNothing => write!(f, "<nothing>"),
            Query::Term { term, .. } if term.is_empty() => write!(f, "<alldocuments>"),
            Query::Term { term, wqf, pos } => {
                write!(f, "{}", term)?;
                if *wqf != 1 {
                    write!(f, "#{}", wqf)?;
                }
                if *pos != 0 {
                    write!(f, "@{}", pos)?;
                }
                Ok(())
            }
            Query::Compound { op, subqs, param } => {
                let sep = if matches!(op, Op::Near | Op::Phrase | Op::EliteSet) {
                    format!(" {} {} ", op.name(), param)
                } else {
                    format!(" {} ", op.name())
                };
                let parts: Vec<String> = subqs.iter().map(|q| q.to_string()).collect();
                write!(f, "({})", parts.join(&sep))
            }
            Query::ScaleWeight { factor, subq } => write!(f, "{} * {}", factor, subq),
            Query::ValueRange { slot, lo, hi } => write!(
                f, "VALUE_RANGE {} {} {}", slot, String::from_utf8_lossy(lo), String::from_utf8_lossy(hi)
            ),
            Query::ValueGe { slot, lo } => write!(f, "VALUE_GE {} {}", slot, String::from_utf8_lossy(lo)),
            Query::ValueLe { slot, hi } => write!(f, "VALUE_LE {} {}", slot, String::from_utf8_lossy(hi)),
            Query::External(source) => write!(f, "{}", source.0.description()),
        }
    }
}
