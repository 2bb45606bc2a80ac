use std::collections::HashMap;

use crate::core::error::{Error, Result};
use crate::query::source::{FixedWeightPostingSource, PostingSource, ValueWeightPostingSource};
use crate::weight::{Bm25PlusWeight, Bm25Weight, BoolWeight, Pl2Weight, TfIdfWeight, TradWeight, Weight};

/// Prototypes of weighting schemes and posting sources by name, used to
/// turn serialised forms back into objects.
pub struct Registry {
    weights: HashMap<&'static str, Box<dyn Weight>>,
    sources: HashMap<&'static str, Box<dyn PostingSource>>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Registry::empty();
        registry.register_weight(Box::new(Bm25Weight::default()));
        registry.register_weight(Box::new(Bm25PlusWeight::default()));
        registry.register_weight(Box::new(BoolWeight));
        registry.register_weight(Box::new(Pl2Weight::default()));
        registry.register_weight(Box::new(TfIdfWeight::default()));
        registry.register_weight(Box::new(TradWeight::default()));
        registry.register_source(Box::new(FixedWeightPostingSource::new(0.0)));
        registry.register_source(Box::new(ValueWeightPostingSource::new(0)));
        registry
    }
}

impl Registry {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Registry { weights: HashMap::new(), sources: HashMap::new() }
    }

    /// Replaces any scheme already registered under the same name.
    pub fn register_weight(&mut self, weight: Box<dyn Weight>) {
        self.weights.insert(weight.name(), weight);
    }

    pub fn register_source(&mut self, source: Box<dyn PostingSource>) {
        self.sources.insert(source.name(), source);
    }

    pub fn weight(&self, name: &str) -> Option<&dyn Weight> {
        self.weights.get(name).map(|w| w.as_ref())
    }

    pub fn source(&self, name: &str) -> Option<&dyn PostingSource> {
        self.sources.get(name).map(|s| s.as_ref())
    }

    pub fn unserialise_weight(&self, name: &str, data: &[u8]) -> Result<Box<dyn Weight>> {
        self.weight(name)
            .ok_or_else(|| Error::serialisation(format!("weighting scheme '{}' not registered", name)))?
            .unserialise(data)
    }

    pub fn unserialise_source(&self, name: &str, data: &[u8]) -> Result<Box<dyn PostingSource>> {
        self.source(name)
            .ok_or_else(|| Error::serialisation(format!("posting source '{}' not registered", name)))?
            .unserialise(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn builtins_round_trip() {
        let registry = Registry::default();
        let bm25 = Bm25Weight::new(1.2, 0.0, 1.0, 0.75, 0.5).unwrap();
        let back = registry.unserialise_weight("bm25", &bm25.serialise()).unwrap();
        assert_eq!(back.serialise(), bm25.serialise());
        assert!(registry.weight("tfidf").is_some());
        assert!(registry.source("value_weight").is_some());
        let err = registry.unserialise_weight("nope", b"").unwrap_err();
        assert!(err.is(ErrorKind::Serialisation));
    }
}
