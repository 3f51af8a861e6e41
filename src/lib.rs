#[macro_use]
extern crate lazy_static;

pub mod accuracy;
pub mod chart;
pub mod error;
pub mod evaluate;
pub mod grammar;
pub mod induction;
pub mod partitioning;
pub mod symbols;
pub mod terminal_labeling;
pub mod text_format;
pub mod tree;

pub use crate::accuracy::{ParseAccuracy, ParseAccuracyPenalizeFailures, Scores};
pub use crate::chart::{ChartParser, Derivation};
pub use crate::error::{HybridGrammarError, Result};
pub use crate::evaluate::{evaluate_derivation, labelled_spans};
pub use crate::grammar::{Grammar, Rule, RuleId};
pub use crate::text_format::{read_grammar, read_grammar_file, read_grammar_str, write_grammar, write_grammar_file};
pub use crate::tree::{ConstituentTree, DependencyTree, HybridNode, HybridTree, NodeId, Token, Tree};
