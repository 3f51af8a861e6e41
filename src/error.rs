use thiserror::Error;

/// Errors raised by the grammar/induction/evaluation components.
///
/// Parse failure is *not* represented here: `Parser::recognized()` /
/// `Parser::best()` report it through return values, per the "not an
/// exception" design of the chart parser.
#[derive(Debug, Error)]
pub enum HybridGrammarError {
  #[error("malformed grammar: {0}")]
  MalformedGrammar(String),

  #[error("induction violation: {0}")]
  InductionViolation(String),

  #[error("evaluation failure: {0}")]
  EvaluationFailure(String),

  #[error("grammar text format error: {0}")]
  TextFormat(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HybridGrammarError>;
