//! Weighting schemes.
//!
//! A scheme is cloned once per query term and `init`ialised with that
//! term's statistics and the factor it is scaled by. One more clone is
//! initialised with a factor of 0 to supply the per-document extra part.

pub mod bm25;
pub mod bm25plus;
pub mod boolean;
pub mod pl2;
pub mod tfidf;
pub mod traditional;

use std::fmt::Debug;

pub use bm25::Bm25Weight;
pub use bm25plus::Bm25PlusWeight;
pub use boolean::BoolWeight;
pub use pl2::Pl2Weight;
pub use tfidf::TfIdfWeight;
pub use traditional::TradWeight;

use crate::core::error::{Error, Result};
use crate::core::types::{DocCount, TermCount};

/// Collection and term statistics a scheme is initialised from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightStats {
    pub collection_size: DocCount,
    pub rset_size: DocCount,
    pub average_length: f64,
    pub doclength_lower_bound: TermCount,
    pub doclength_upper_bound: TermCount,
    /// Bound on the wdf of this term in any document.
    pub wdf_upper_bound: TermCount,
    pub termfreq: DocCount,
    pub reltermfreq: DocCount,
    pub collection_freq: u64,
    pub query_length: TermCount,
    pub wqf: TermCount,
}

pub trait Weight: Send + Sync + Debug {
    /// Name the scheme is registered under.
    fn name(&self) -> &'static str;

    fn clone_box(&self) -> Box<dyn Weight>;

    /// Parameters only, not any `init` state.
    fn serialise(&self) -> Vec<u8>;

    /// A fresh scheme with the parameters in `data`.
    fn unserialise(&self, data: &[u8]) -> Result<Box<dyn Weight>>;

    fn init(&mut self, stats: &WeightStats, factor: f64);

    /// `wdf_doc_max` is the largest wdf of any term in the document, and is
    /// only filled in for schemes that ask for it.
    fn sumpart(&self, wdf: TermCount, doclen: TermCount, unique_terms: TermCount, wdf_doc_max: TermCount) -> f64;

    /// Never less than any value `sumpart` returns.
    fn maxpart(&self) -> f64;

    fn sumextra(&self, _doclen: TermCount, _unique_terms: TermCount) -> f64 {
        0.0
    }

    fn maxextra(&self) -> f64 {
        0.0
    }

    fn needs_doclength(&self) -> bool {
        false
    }

    fn needs_unique_terms(&self) -> bool {
        false
    }

    fn needs_wdf(&self) -> bool {
        true
    }

    fn needs_wdf_doc_max(&self) -> bool {
        false
    }
}

impl Clone for Box<dyn Weight> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// The Robertson/Sparck Jones term weight shared by the probabilistic
/// schemes: uses the relevance set when there is one, and squashes small
/// values towards 1 instead of letting common terms go negative.
pub(crate) fn probabilistic_idf(stats: &WeightStats) -> f64 {
    let n = stats.collection_size as f64;
    let tf = stats.termfreq as f64;
    let mut tw = if stats.rset_size != 0 {
        let r = stats.reltermfreq as f64;
        let big_r = stats.rset_size as f64;
        ((r + 0.5) * (n - big_r - tf + r + 0.5)) / ((big_r - r + 0.5) * (tf - r + 0.5))
    } else {
        (n - tf + 0.5) / (tf + 0.5)
    };
    if tw < 2.0 {
        tw = tw * 0.5 + 1.0;
    }
    tw.ln()
}

pub(crate) fn put_params(params: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(params.len() * 8);
    for p in params {
        out.extend_from_slice(&p.to_be_bytes());
    }
    out
}

pub(crate) fn get_params<const N: usize>(scheme: &str, data: &[u8]) -> Result<[f64; N]> {
    if data.len() != N * 8 {
        return Err(Error::serialisation(format!(
            "{} parameters should be {} bytes, got {}", scheme, N * 8, data.len()
        )));
    }
    let mut out = [0.0; N];
    for (i, chunk) in data.chunks_exact(8).enumerate() {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        out[i] = f64::from_be_bytes(raw);
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn stats(n: DocCount, tf: DocCount) -> WeightStats {
        WeightStats {
            collection_size: n,
            average_length: 10.0,
            doclength_lower_bound: 2,
            doclength_upper_bound: 40,
            wdf_upper_bound: 6,
            termfreq: tf,
            collection_freq: tf as u64 * 2,
            query_length: 2,
            wqf: 1,
            ..WeightStats::default()
        }
    }

    /// Every sumpart over a grid of wdf and doclength stays within
    /// [0, maxpart].
    pub fn assert_bounded(w: &dyn Weight, stats: &WeightStats) {
        let max = w.maxpart();
        for wdf in 0..=stats.wdf_upper_bound {
            for len in stats.doclength_lower_bound.max(wdf)..=stats.doclength_upper_bound {
                let uniq = len.clamp(1, 5);
                let s = w.sumpart(wdf, len, uniq, wdf.max(len / uniq));
                assert!(s >= 0.0, "{}: sumpart({}, {}) = {} < 0", w.name(), wdf, len, s);
                assert!(s <= max + 1e-9, "{}: sumpart({}, {}) = {} > max {}", w.name(), wdf, len, s, max);
            }
        }
    }
}
