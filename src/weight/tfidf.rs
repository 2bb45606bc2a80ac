use crate::core::error::{Error, Result};
use crate::core::types::TermCount;
use crate::weight::{get_params, put_params, Weight, WeightStats};

const DEFAULT_SLOPE: f64 = 0.2;
const DEFAULT_DELTA: f64 = 1.0;

/// How the wdf is turned into a term frequency component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WdfNorm {
    /// `n`: the wdf itself.
    None,
    /// `b`: 1 for any match.
    Boolean,
    /// `s`: wdf squared.
    Square,
    /// `l`: 1 + ln(wdf).
    Log,
    /// `P`: (1 + ln(1 + ln(wdf))) / (1 - slope + slope * doclen / avlen)
    /// + delta.
    Pivoted,
    /// `L`: 1 + ln(wdf) over 1 + ln of the mean wdf in the document.
    LogAverage,
    /// `m`: wdf over the largest wdf in the document.
    Max,
    /// `a`: 0.5 + 0.5 * wdf over the largest wdf in the document.
    Aug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdfNorm {
    /// `n`
    None,
    /// `t`: ln(N / tf).
    Tfidf,
    /// `p`: ln((N - tf) / tf).
    Prob,
    /// `f`: 1 / tf.
    Freq,
    /// `s`: ln(N / tf) squared.
    Squared,
    /// `P`: ln((N + 1) / tf).
    Pivoted,
}

/// TF-IDF selected by a three letter code: wdf normalisation, idf
/// normalisation, then whole-weight normalisation, e.g. `ntn` or `ltn`.
///
/// `slope` and `delta` only affect the pivoted wdf normalisation.
#[derive(Debug, Clone)]
pub struct TfIdfWeight {
    code: [u8; 3],
    wdf_norm: WdfNorm,
    idf_norm: IdfNorm,
    slope: f64,
    delta: f64,
    idf: f64,
    factor: f64,
    average_length: f64,
    max_part: f64,
}

impl Default for TfIdfWeight {
    fn default() -> Self {
        TfIdfWeight {
            code: *b"ntn",
            wdf_norm: WdfNorm::None,
            idf_norm: IdfNorm::Tfidf,
            slope: DEFAULT_SLOPE,
            delta: DEFAULT_DELTA,
            idf: 0.0,
            factor: 0.0,
            average_length: 1.0,
            max_part: 0.0,
        }
    }
}

impl TfIdfWeight {
    pub fn new(code: &str) -> Result<Self> {
        Self::with_params(code, DEFAULT_SLOPE, DEFAULT_DELTA)
    }

    /// `slope` must be in (0, 1] so the length divisor stays positive, and
    /// `delta` must be positive.
    pub fn with_params(code: &str, slope: f64, delta: f64) -> Result<Self> {
        if !(slope > 0.0 && slope <= 1.0) {
            return Err(Error::invalid_argument(format!("TF-IDF slope {} is outside (0, 1]", slope)));
        }
        if !(delta > 0.0 && delta.is_finite()) {
            return Err(Error::invalid_argument(format!("TF-IDF delta {} must be positive", delta)));
        }
        let bytes = code.as_bytes();
        if bytes.len() != 3 {
            return Err(Error::invalid_argument(format!("TF-IDF code '{}' must be three letters", code)));
        }
        let wdf_norm = match bytes[0] {
            b'n' => WdfNorm::None,
            b'b' => WdfNorm::Boolean,
            b's' => WdfNorm::Square,
            b'l' => WdfNorm::Log,
            b'P' => WdfNorm::Pivoted,
            b'L' => WdfNorm::LogAverage,
            b'm' => WdfNorm::Max,
            b'a' => WdfNorm::Aug,
            other => {
                return Err(Error::invalid_argument(format!(
                    "unknown TF-IDF wdf normalisation '{}'", other as char
                )))
            }
        };
        let idf_norm = match bytes[1] {
            b'n' => IdfNorm::None,
            b't' => IdfNorm::Tfidf,
            b'p' => IdfNorm::Prob,
            b'f' => IdfNorm::Freq,
            b's' => IdfNorm::Squared,
            b'P' => IdfNorm::Pivoted,
            other => {
                return Err(Error::invalid_argument(format!(
                    "unknown TF-IDF idf normalisation '{}'", other as char
                )))
            }
        };
        if bytes[2] != b'n' {
            return Err(Error::invalid_argument(format!(
                "unsupported TF-IDF weight normalisation '{}'", bytes[2] as char
            )));
        }
        Ok(TfIdfWeight {
            code: [bytes[0], bytes[1], bytes[2]],
            wdf_norm,
            idf_norm,
            slope,
            delta,
            ..TfIdfWeight::default()
        })
    }

    fn wdfn(&self, wdf: TermCount, doclen: TermCount, unique_terms: TermCount, wdf_doc_max: TermCount) -> f64 {
        if wdf == 0 {
            return 0.0;
        }
        let w = wdf as f64;
        match self.wdf_norm {
            WdfNorm::None => w,
            WdfNorm::Boolean => 1.0,
            WdfNorm::Square => w * w,
            WdfNorm::Log => 1.0 + w.ln(),
            WdfNorm::Pivoted => {
                let normlen = doclen as f64 / self.average_length;
                (1.0 + (1.0 + w.ln()).ln()) / (1.0 - self.slope + self.slope * normlen) + self.delta
            }
            WdfNorm::LogAverage => {
                let mean = if unique_terms == 0 { 1.0 } else { doclen as f64 / unique_terms as f64 };
                // Boolean terms can pull the mean below 1.
                (1.0 + w.ln()) / (1.0 + mean.max(1.0).ln())
            }
            // A synonym's summed wdf can exceed the largest single wdf.
            WdfNorm::Max => w / w.max(wdf_doc_max as f64),
            WdfNorm::Aug => 0.5 + 0.5 * w / w.max(wdf_doc_max as f64),
        }
    }

    fn idfn(&self, stats: &WeightStats) -> f64 {
        let n = stats.collection_size as f64;
        let tf = stats.termfreq as f64;
        if stats.termfreq == 0 {
            return 0.0;
        }
        match self.idf_norm {
            IdfNorm::None => 1.0,
            IdfNorm::Tfidf => (n / tf).ln(),
            IdfNorm::Prob => {
                if stats.collection_size <= stats.termfreq {
                    0.0
                } else {
                    ((n - tf) / tf).ln()
                }
            }
            IdfNorm::Freq => 1.0 / tf,
            IdfNorm::Squared => (n / tf).ln().powi(2),
            IdfNorm::Pivoted => ((n + 1.0) / tf).ln(),
        }
    }
}

impl Weight for TfIdfWeight {
    fn name(&self) -> &'static str {
        "tfidf"
    }

    fn clone_box(&self) -> Box<dyn Weight> {
        Box::new(self.clone())
    }

    /// Slope and delta, then the three letter code.
    fn serialise(&self) -> Vec<u8> {
        let mut out = put_params(&[self.slope, self.delta]);
        out.extend_from_slice(&self.code);
        out
    }

    fn unserialise(&self, data: &[u8]) -> Result<Box<dyn Weight>> {
        if data.len() != 19 {
            return Err(Error::serialisation(format!(
                "TF-IDF parameters should be 19 bytes, got {}", data.len()
            )));
        }
        let [slope, delta] = get_params::<2>("TF-IDF", &data[..16])?;
        let code = std::str::from_utf8(&data[16..])
            .map_err(|_| Error::serialisation("TF-IDF code isn't UTF-8"))?;
        let weight = TfIdfWeight::with_params(code, slope, delta)
            .map_err(|e| Error::serialisation(e.to_string()))?;
        Ok(Box::new(weight))
    }

    fn init(&mut self, stats: &WeightStats, factor: f64) {
        self.idf = self.idfn(stats);
        self.factor = stats.wqf as f64 * factor;
        self.average_length = if stats.average_length > 0.0 { stats.average_length } else { 1.0 };
        // Every wdf normalisation grows with the wdf. The log average one is
        // largest when the document's mean wdf is at most 1, and the pivoted
        // one in the shortest document.
        let wdf_max = stats.wdf_upper_bound;
        let top = match self.wdf_norm {
            WdfNorm::LogAverage => {
                if wdf_max == 0 { 0.0 } else { 1.0 + (wdf_max as f64).ln() }
            }
            _ => self.wdfn(wdf_max, stats.doclength_lower_bound.max(1), 0, wdf_max),
        };
        self.max_part = (top * self.idf * self.factor).max(0.0);
    }

    fn sumpart(&self, wdf: TermCount, doclen: TermCount, unique_terms: TermCount, wdf_doc_max: TermCount) -> f64 {
        (self.wdfn(wdf, doclen, unique_terms, wdf_doc_max) * self.idf * self.factor).max(0.0)
    }

    fn maxpart(&self) -> f64 {
        self.max_part
    }

    fn needs_doclength(&self) -> bool {
        matches!(self.wdf_norm, WdfNorm::LogAverage | WdfNorm::Pivoted)
    }

    fn needs_unique_terms(&self) -> bool {
        self.wdf_norm == WdfNorm::LogAverage
    }

    fn needs_wdf(&self) -> bool {
        self.wdf_norm != WdfNorm::Boolean
    }

    fn needs_wdf_doc_max(&self) -> bool {
        matches!(self.wdf_norm, WdfNorm::Max | WdfNorm::Aug)
    }
}
