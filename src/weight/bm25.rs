use crate::core::error::{Error, Result};
use crate::core::types::TermCount;
use crate::weight::{get_params, probabilistic_idf, put_params, Weight, WeightStats};

/// Okapi BM25.
///
/// `k1` controls wdf saturation, `b` length normalisation, `k3` the wqf
/// effect and `k2` an extra per-document part favouring documents close
/// to the average length. Normalised lengths are floored at `min_normlen`.
#[derive(Debug, Clone)]
pub struct Bm25Weight {
    k1: f64,
    k2: f64,
    k3: f64,
    b: f64,
    min_normlen: f64,

    termweight: f64,
    len_factor: f64,
    max_part: f64,
    extra_num: f64,
    normlen_lb: f64,
}

impl Default for Bm25Weight {
    fn default() -> Self {
        Bm25Weight::with_params(1.0, 0.0, 1.0, 0.5, 0.5)
    }
}

impl Bm25Weight {
    pub fn new(k1: f64, k2: f64, k3: f64, b: f64, min_normlen: f64) -> Result<Self> {
        if k1 < 0.0 || k2 < 0.0 || k3 < 0.0 || !(0.0..=1.0).contains(&b) || min_normlen < 0.0 {
            return Err(Error::invalid_argument(format!(
                "bad BM25 parameters k1={} k2={} k3={} b={} min_normlen={}", k1, k2, k3, b, min_normlen
            )));
        }
        Ok(Self::with_params(k1, k2, k3, b, min_normlen))
    }

    fn with_params(k1: f64, k2: f64, k3: f64, b: f64, min_normlen: f64) -> Self {
        Bm25Weight {
            k1, k2, k3, b, min_normlen,
            termweight: 0.0, len_factor: 0.0, max_part: 0.0, extra_num: 0.0, normlen_lb: 0.0,
        }
    }

    fn normlen(&self, doclen: TermCount) -> f64 {
        (doclen as f64 * self.len_factor).max(self.min_normlen)
    }
}

impl Weight for Bm25Weight {
    fn name(&self) -> &'static str {
        "bm25"
    }

    fn clone_box(&self) -> Box<dyn Weight> {
        Box::new(self.clone())
    }

    fn serialise(&self) -> Vec<u8> {
        put_params(&[self.k1, self.k2, self.k3, self.b, self.min_normlen])
    }

    fn unserialise(&self, data: &[u8]) -> Result<Box<dyn Weight>> {
        let [k1, k2, k3, b, min_normlen] = get_params::<5>("bm25", data)?;
        Ok(Box::new(Bm25Weight::new(k1, k2, k3, b, min_normlen)?))
    }

    fn init(&mut self, stats: &WeightStats, factor: f64) {
        self.len_factor = if stats.average_length > 0.0 { 1.0 / stats.average_length } else { 0.0 };
        if self.k2 == 0.0 && (self.b == 0.0 || self.k1 == 0.0) {
            self.len_factor = 0.0;
        }
        self.normlen_lb = (stats.doclength_lower_bound as f64 * self.len_factor).max(self.min_normlen);
        self.extra_num = 2.0 * self.k2 * stats.query_length as f64;

        if factor == 0.0 {
            self.termweight = 0.0;
            self.max_part = 0.0;
            return;
        }

        let mut tw = probabilistic_idf(stats) * factor;
        if self.k3 != 0.0 {
            let wqf = stats.wqf as f64;
            tw *= (self.k3 + 1.0) * wqf / (self.k3 + wqf);
        }
        self.termweight = tw * (self.k1 + 1.0);

        let wdf_max = stats.wdf_upper_bound;
        self.max_part = if self.termweight == 0.0 || wdf_max == 0 {
            0.0
        } else {
            let wdf_max = wdf_max as f64;
            let lb = (wdf_max.max(stats.doclength_lower_bound as f64) * self.len_factor).max(self.min_normlen);
            let denom = self.k1 * (lb * self.b + 1.0 - self.b) + wdf_max;
            self.termweight * wdf_max / denom
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
        let wdf = wdf as f64;
        let denom = self.k1 * (self.normlen(doclen) * self.b + 1.0 - self.b) + wdf;
        self.termweight * wdf / denom
    }

    fn maxpart(&self) -> f64 {
        self.max_part
    }

    fn sumextra(&self, doclen: TermCount, _unique_terms: TermCount) -> f64 {
        if self.k2 == 0.0 {
            return 0.0;
        }
        self.extra_num / (1.0 + self.normlen(doclen))
    }

    fn maxextra(&self) -> f64 {
        if self.k2 == 0.0 {
            return 0.0;
        }
        self.extra_num / (1.0 + self.normlen_lb)
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
    fn term_in_every_document_still_scores_positive() {
        let mut w = Bm25Weight::default();
        let mut s = stats(100, 100);
        s.average_length = 1.0;
        w.init(&s, 1.0);
        let part = w.sumpart(1, 1, 1, 1);
        assert!(part > 0.0);
        // (0.5 / 100.5) * 0.5 + 1, then the k1 + 1 and k3 factors.
        let tw = ((0.5f64 / 100.5) * 0.5 + 1.0).ln() * 2.0;
        let expected = tw * 1.0 / (1.0 * (1.0 * 0.5 + 0.5) + 1.0);
        assert!((part - expected).abs() < 1e-12);
    }

    #[test]
    fn rare_terms_outweigh_common_ones() {
        let mut rare = Bm25Weight::default();
        rare.init(&stats(1000, 3), 1.0);
        let mut common = Bm25Weight::default();
        common.init(&stats(1000, 400), 1.0);
        assert!(rare.sumpart(2, 10, 5, 2) > common.sumpart(2, 10, 5, 2));
    }

    #[test]
    fn parts_stay_within_bounds() {
        for (k1, k2, b) in [(1.0, 0.0, 0.5), (1.2, 1.0, 0.75), (0.0, 0.0, 1.0), (2.0, 0.0, 0.0)] {
            let mut w = Bm25Weight::new(k1, k2, 1.0, b, 0.5).unwrap();
            let s = stats(500, 20);
            w.init(&s, 1.0);
            assert_bounded(&w, &s);
            let mut extra = w.clone();
            extra.init(&s, 0.0);
            for len in s.doclength_lower_bound..=s.doclength_upper_bound {
                assert!(extra.sumextra(len, 1) <= extra.maxextra() + 1e-12);
            }
        }
    }

    #[test]
    fn length_is_only_needed_when_it_matters() {
        let mut w = Bm25Weight::new(1.0, 0.0, 1.0, 0.0, 0.5).unwrap();
        w.init(&stats(10, 2), 1.0);
        assert!(!w.needs_doclength());
        let mut w = Bm25Weight::default();
        w.init(&stats(10, 2), 1.0);
        assert!(w.needs_doclength());
    }

    #[test]
    fn parameters_survive_serialisation() {
        let w = Bm25Weight::new(1.5, 0.25, 7.0, 0.6, 0.3).unwrap();
        let back = w.unserialise(&w.serialise()).unwrap();
        assert_eq!(back.serialise(), w.serialise());
        assert!(w.unserialise(&[1, 2, 3]).is_err());
        assert!(Bm25Weight::new(1.0, 0.0, 1.0, 1.5, 0.5).is_err());
    }
}
