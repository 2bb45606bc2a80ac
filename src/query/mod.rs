//! Query trees: building, text serialisation and compilation into
//! postlists.

pub mod ast;
pub mod optimiser;
pub mod serialise;
pub mod source;

pub use ast::{Op, Query};
pub use optimiser::{QueryOptimiser, TermInfo};
pub use source::{FixedWeightPostingSource, PostingSource, ValueWeightPostingSource};
