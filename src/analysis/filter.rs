use crate::analysis::token::Token;

/// One stage of an `Analyzer`. Filters may drop tokens but must leave the
/// survivors' positions alone.
pub trait TokenFilter: Send + Sync {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token>;

    fn name(&self) -> &str;

    fn clone_box(&self) -> Box<dyn TokenFilter>;
}
