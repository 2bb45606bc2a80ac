use crate::core::error::{Error, Result};
use crate::core::types::TermCount;
use crate::weight::{get_params, probabilistic_idf, put_params, Weight, WeightStats};

/// BM25+: BM25 with a floor of `delta` on each matching term's
/// normalised wdf, so very long documents still get credit for a match.
#[derive(Debug, Clone)]
pub struct Bm25PlusWeight {
    k1: f64,
    k3: f64,
    b: f64,
    min_normlen: f64,
    delta: f64,

    termweight: f64,
    len_factor: f64,
    max_part: f64,
}

impl Default for Bm25PlusWeight {
    fn default() -> Self {
        Bm25PlusWeight::with_params(1.0, 1.0, 0.5, 0.5, 1.0)
    }
}

impl Bm25PlusWeight {
    pub fn new(k1: f64, k3: f64, b: f64, min_normlen: f64, delta: f64) -> Result<Self> {
        if k1 < 0.0 || k3 < 0.0 || !(0.0..=1.0).contains(&b) || min_normlen < 0.0 || delta < 0.0 {
            return Err(Error::invalid_argument(format!(
                "bad BM25+ parameters k1={} k3={} b={} min_normlen={} delta={}", k1, k3, b, min_normlen, delta
            )));
        }
        Ok(Self::with_params(k1, k3, b, min_normlen, delta))
    }

    fn with_params(k1: f64, k3: f64, b: f64, min_normlen: f64, delta: f64) -> Self {
        Bm25PlusWeight { k1, k3, b, min_normlen, delta, termweight: 0.0, len_factor: 0.0, max_part: 0.0 }
    }

    fn part(&self, wdf: f64, normlen: f64) -> f64 {
        let k = self.k1 * (normlen * self.b + 1.0 - self.b);
        let denom = k + wdf;
        let tf_part = if denom > 0.0 { (self.k1 + 1.0) * wdf / denom } else { 0.0 };
        self.termweight * (tf_part + self.delta)
    }
}

impl Weight for Bm25PlusWeight {
    fn name(&self) -> &'static str {
        "bm25+"
    }

    fn clone_box(&self) -> Box<dyn Weight> {
        Box::new(self.clone())
    }

    fn serialise(&self) -> Vec<u8> {
        put_params(&[self.k1, self.k3, self.b, self.min_normlen, self.delta])
    }

    fn unserialise(&self, data: &[u8]) -> Result<Box<dyn Weight>> {
        let [k1, k3, b, min_normlen, delta] = get_params::<5>("bm25+", data)?;
        Ok(Box::new(Bm25PlusWeight::new(k1, k3, b, min_normlen, delta)?))
    }

    fn init(&mut self, stats: &WeightStats, factor: f64) {
        self.len_factor = if stats.average_length > 0.0 && self.b != 0.0 && self.k1 != 0.0 {
            1.0 / stats.average_length
        } else {
            0.0
        };
        if factor == 0.0 || stats.termfreq == 0 {
            self.termweight = 0.0;
            self.max_part = 0.0;
            return;
        }

        // Without a relevance set this idf is never negative, so no squashing
        // is needed.
        let idf = if stats.rset_size != 0 {
            probabilistic_idf(stats)
        } else {
            ((stats.collection_size as f64 + 1.0) / stats.termfreq as f64).ln()
        };
        let mut tw = idf * factor;
        if self.k3 != 0.0 {
            let wqf = stats.wqf as f64;
            tw *= (self.k3 + 1.0) * wqf / (self.k3 + wqf);
        }
        self.termweight = tw;

        let wdf_max = stats.wdf_upper_bound as f64;
        self.max_part = if wdf_max == 0.0 {
            0.0
        } else {
            let lb = (wdf_max.max(stats.doclength_lower_bound as f64) * self.len_factor).max(self.min_normlen);
            self.part(wdf_max, lb)
        };
    }

    fn sumpart(
        &self,
        wdf: TermCount,
        doclen: TermCount,
        _unique_terms: TermCount,
        _wdf_doc_max: TermCount,
    ) -> f64 {
        if wdf == 0 || self.termweight == 0.0 {
            return 0.0;
        }
        let normlen = (doclen as f64 * self.len_factor).max(self.min_normlen);
        self.part(wdf as f64, normlen)
    }

    fn maxpart(&self) -> f64 {
        self.max_part
    }

    fn needs_doclength(&self) -> bool {
        self.len_factor != 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weight::testing::{assert_bounded, stats};

    #[test]
    fn long_documents_keep_the_delta_floor() {
        let mut w = Bm25PlusWeight::default();
        let mut s = stats(100, 10);
        s.doclength_upper_bound = 1_000_000;
        w.init(&s, 1.0);
        let idf = (101.0f64 / 10.0).ln();
        let long = w.sumpart(1, 1_000_000, 1, 1);
        assert!(long > idf * 1.0 * 0.99);
        assert_eq!(w.sumpart(0, 10, 1, 0), 0.0);
    }

    #[test]
    fn parts_stay_within_bounds() {
        let s = stats(300, 299);
        let mut w = Bm25PlusWeight::default();
        w.init(&s, 1.0);
        assert!(w.maxpart() > 0.0);
        assert_bounded(&w, &s);
    }
}
