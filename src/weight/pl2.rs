use std::f64::consts::{LN_2, PI};

use crate::core::error::{Error, Result};
use crate::core::types::TermCount;
use crate::weight::{get_params, put_params, Weight, WeightStats};

/// PL2 from the Divergence From Randomness family: Poisson randomness
/// model, Laplace after-effect and length normalisation H2.
///
/// `c` scales the normalised wdf; larger values reduce the length effect.
#[derive(Debug, Clone)]
pub struct Pl2Weight {
    c: f64,

    cl: f64,
    factor: f64,
    p1: f64,
    p2: f64,
    max_part: f64,
}

impl Default for Pl2Weight {
    fn default() -> Self {
        Pl2Weight { c: 1.0, cl: 0.0, factor: 0.0, p1: 0.0, p2: 0.0, max_part: 0.0 }
    }
}

impl Pl2Weight {
    pub fn new(c: f64) -> Result<Self> {
        if c <= 0.0 {
            return Err(Error::invalid_argument(format!("PL2 parameter c must be > 0, got {}", c)));
        }
        Ok(Pl2Weight { c, ..Pl2Weight::default() })
    }

    fn score(&self, wdfn: f64) -> f64 {
        (self.p1 + (wdfn + 0.5) * wdfn.log2() - self.p2 * wdfn) / (wdfn + 1.0)
    }
}

impl Weight for Pl2Weight {
    fn name(&self) -> &'static str {
        "pl2"
    }

    fn clone_box(&self) -> Box<dyn Weight> {
        Box::new(self.clone())
    }

    fn serialise(&self) -> Vec<u8> {
        put_params(&[self.c])
    }

    fn unserialise(&self, data: &[u8]) -> Result<Box<dyn Weight>> {
        let [c] = get_params::<1>("pl2", data)?;
        Ok(Box::new(Pl2Weight::new(c)?))
    }

    fn init(&mut self, stats: &WeightStats, factor: f64) {
        self.factor = stats.wqf as f64 * factor;
        self.cl = self.c * stats.average_length;
        self.max_part = 0.0;
        self.p1 = 0.0;
        self.p2 = 0.0;
        if factor == 0.0 || stats.collection_size == 0 || stats.collection_freq == 0 {
            return;
        }

        let mean = stats.collection_freq as f64 / stats.collection_size as f64;
        self.p1 = mean / LN_2 + 0.5 * (2.0 * PI).log2();
        self.p2 = mean.log2() + 1.0 / LN_2;

        let wdf_ub = stats.wdf_upper_bound as f64;
        if stats.doclength_upper_bound == 0 || wdf_ub == 0.0 {
            return;
        }
        // Bound each term of the score separately over the range the
        // normalised wdf can take.
        let lo = (1.0 + self.cl / stats.doclength_upper_bound as f64).log2();
        let hi = wdf_ub * (1.0 + self.cl / wdf_ub.max(stats.doclength_lower_bound as f64)).log2();

        let p1_part = self.p1 / (lo + 1.0);
        let log_hi = hi.log2();
        let log_part = if log_hi >= 0.0 {
            (hi + 0.5) / (hi + 1.0) * log_hi
        } else {
            (lo + 0.5) / (lo + 1.0) * log_hi
        };
        let p2_part = if self.p2 >= 0.0 {
            -self.p2 * lo / (lo + 1.0)
        } else {
            -self.p2 * hi / (hi + 1.0)
        };
        self.max_part = ((p1_part + log_part + p2_part) * self.factor).max(0.0);
    }

    fn sumpart(
        &self,
        wdf: TermCount,
        doclen: TermCount,
        _unique_terms: TermCount,
        _wdf_doc_max: TermCount,
    ) -> f64 {
        if wdf == 0 || doclen == 0 || self.p1 == 0.0 {
            return 0.0;
        }
        let wdfn = wdf as f64 * (1.0 + self.cl / doclen as f64).log2();
        if wdfn <= 0.0 {
            return 0.0;
        }
        (self.score(wdfn) * self.factor).max(0.0)
    }

    fn maxpart(&self) -> f64 {
        self.max_part
    }

    fn needs_doclength(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weight::testing::{assert_bounded, stats};

    #[test]
    fn parts_stay_within_bounds() {
        for c in [0.5, 1.0, 7.0] {
            for tf in [1, 10, 90] {
                let s = stats(100, tf);
                let mut w = Pl2Weight::new(c).unwrap();
                w.init(&s, 1.0);
                assert_bounded(&w, &s);
            }
        }
    }

    #[test]
    fn rare_terms_score_higher() {
        let mut rare = Pl2Weight::default();
        rare.init(&stats(1000, 2), 1.0);
        let mut common = Pl2Weight::default();
        common.init(&stats(1000, 300), 1.0);
        assert!(rare.sumpart(3, 10, 3, 3) > common.sumpart(3, 10, 3, 3));
    }

    #[test]
    fn zero_factor_gives_nothing() {
        let mut w = Pl2Weight::default();
        w.init(&stats(100, 5), 0.0);
        assert_eq!(w.sumpart(3, 10, 1, 3), 0.0);
        assert_eq!(w.maxpart(), 0.0);
        assert!(Pl2Weight::new(0.0).is_err());
    }
}
