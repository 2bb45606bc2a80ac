use crate::core::error::{Error, Result};
use crate::core::types::TermCount;
use crate::weight::{get_params, probabilistic_idf, put_params, Weight, WeightStats};

/// The traditional probabilistic formula BM25 grew out of.
///
/// `k` scales the length normalisation; 0 turns it off and every matching
/// document gets the plain term weight.
#[derive(Debug, Clone)]
pub struct TradWeight {
    k: f64,
    termweight: f64,
    len_factor: f64,
    max_part: f64,
}

impl Default for TradWeight {
    fn default() -> Self {
        TradWeight { k: 1.0, termweight: 0.0, len_factor: 0.0, max_part: 0.0 }
    }
}

impl TradWeight {
    pub fn new(k: f64) -> Result<Self> {
        if k < 0.0 {
            return Err(Error::invalid_argument(format!("traditional weight k must be >= 0, got {}", k)));
        }
        Ok(TradWeight { k, ..TradWeight::default() })
    }
}

impl Weight for TradWeight {
    fn name(&self) -> &'static str {
        "trad"
    }

    fn clone_box(&self) -> Box<dyn Weight> {
        Box::new(self.clone())
    }

    fn serialise(&self) -> Vec<u8> {
        put_params(&[self.k])
    }

    fn unserialise(&self, data: &[u8]) -> Result<Box<dyn Weight>> {
        let [k] = get_params::<1>("trad", data)?;
        Ok(Box::new(TradWeight::new(k)?))
    }

    fn init(&mut self, stats: &WeightStats, factor: f64) {
        self.len_factor = if stats.average_length > 0.0 { self.k / stats.average_length } else { 0.0 };
        if factor == 0.0 {
            self.termweight = 0.0;
            self.max_part = 0.0;
            return;
        }
        self.termweight = probabilistic_idf(stats) * factor;
        let wdf_max = stats.wdf_upper_bound as f64;
        self.max_part = if wdf_max == 0.0 {
            0.0
        } else {
            let len = wdf_max.max(stats.doclength_lower_bound as f64);
            self.termweight * wdf_max / (len * self.len_factor + wdf_max)
        };
    }

    fn sumpart(
        &self,
        wdf: TermCount,
        doclen: TermCount,
        _unique_terms: TermCount,
        _wdf_doc_max: TermCount,
    ) -> f64 {
        if wdf == 0 {
            return 0.0;
        }
        let wdf = wdf as f64;
        self.termweight * wdf / (doclen as f64 * self.len_factor + wdf)
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
    fn zero_k_ignores_length() {
        let mut w = TradWeight::new(0.0).unwrap();
        w.init(&stats(50, 5), 1.0);
        assert!(!w.needs_doclength());
        assert_eq!(w.sumpart(1, 3, 1, 1), w.sumpart(4, 40, 1, 4));
        assert!((w.sumpart(1, 3, 1, 1) - w.maxpart()).abs() < 1e-12);
    }

    #[test]
    fn parts_stay_within_bounds() {
        for k in [0.0, 1.0, 3.5] {
            let s = stats(80, 70);
            let mut w = TradWeight::new(k).unwrap();
            w.init(&s, 2.0);
            assert_bounded(&w, &s);
        }
    }
}
