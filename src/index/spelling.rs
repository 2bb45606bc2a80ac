//! Spelling dictionary: `W ++ word` maps to the word's frequency.

use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder, DFA};

use crate::compression::vbyte::{Unpacker, VByteEncoder};
use crate::core::error::{Error, Result};
use crate::core::types::DocCount;

const WORD_PREFIX: u8 = b'W';

pub fn spelling_key(word: &str) -> Result<Vec<u8>> {
    if word.is_empty() {
        return Err(Error::invalid_argument("empty spelling word"));
    }
    let mut key = Vec::with_capacity(word.len() + 1);
    key.push(WORD_PREFIX);
    key.extend_from_slice(word.as_bytes());
    Ok(key)
}

pub fn words_prefix() -> [u8; 1] {
    [WORD_PREFIX]
}

pub fn parse_spelling_key(key: &[u8]) -> Option<String> {
    match key.split_first() {
        Some((&WORD_PREFIX, word)) => String::from_utf8(word.to_vec()).ok(),
        _ => None,
    }
}

pub fn encode_freq(freq: DocCount) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    VByteEncoder::encode_u32(&mut out, freq);
    out
}

pub fn decode_freq(tag: &[u8]) -> Result<DocCount> {
    Unpacker::new(tag).uint()
}

/// Edit-distance matcher for one misspelt word.
pub struct SpellingAutomaton {
    word: String,
    max_edits: u8,
    dfa: DFA,
}

impl SpellingAutomaton {
    pub fn new(word: &str, max_edits: u8) -> Self {
        // Transpositions count as a single edit ("teh" -> "the").
        let builder = LevenshteinAutomatonBuilder::new(max_edits, true);
        SpellingAutomaton { word: word.to_string(), max_edits, dfa: builder.build_dfa(word) }
    }

    /// Edit distance to `candidate`, if within the limit.
    pub fn distance(&self, candidate: &str) -> Option<u8> {
        let mut state = self.dfa.initial_state();
        for &byte in candidate.as_bytes() {
            state = self.dfa.transition(state, byte);
        }
        match self.dfa.distance(state) {
            Distance::Exact(d) if d <= self.max_edits => Some(d),
            _ => None,
        }
    }

    /// Best correction among `words`: the closest word, then the most
    /// frequent, then the first in byte order. A candidate must be more
    /// frequent than the word itself (`own_freq`).
    pub fn best<I>(&self, words: I, own_freq: DocCount) -> Option<String>
    where
        I: IntoIterator<Item = (String, DocCount)>,
    {
        let mut best: Option<(u8, DocCount, String)> = None;
        for (candidate, freq) in words {
            if candidate == self.word || freq <= own_freq {
                continue;
            }
            let Some(d) = self.distance(&candidate) else { continue };
            let better = match &best {
                None => true,
                Some((bd, bf, bw)) => d < *bd || (d == *bd && (freq > *bf || (freq == *bf && candidate < *bw))),
            };
            if better {
                best = Some((d, freq, candidate));
            }
        }
        best.map(|(_, _, word)| word)
    }
}
