//! Parse accuracy scorer (spec §4.G): precision/recall/F1 over sets of
//! labelled spans, grounded in original `constituent/parse_accuracy.py`'s
//! `ParseAccuracy`/`ParseAccuracyPenalizeFailures`.

use std::collections::HashSet;
use std::hash::Hash;

/// One sentence's precision/recall/F1 against a gold span set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Scores {
  pub precision: f64,
  pub recall: f64,
  pub f1: f64,
}

fn score<T: Eq + Hash>(found: &HashSet<T>, gold: &HashSet<T>) -> Scores {
  let overlap = found.intersection(gold).count() as f64;
  let precision = if found.is_empty() { 0.0 } else { overlap / found.len() as f64 };
  let recall = if gold.is_empty() { 0.0 } else { overlap / gold.len() as f64 };
  let f1 = if precision + recall == 0.0 {
    0.0
  } else {
    2.0 * precision * recall / (precision + recall)
  };
  Scores { precision, recall, f1 }
}

/// Accumulates precision/recall/F1 across sentences, averaging over the
/// sentences actually scored. Sentences that failed to parse are simply
/// never added (spec's "silent failure" policy).
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseAccuracy {
  sentences: usize,
  precision_sum: f64,
  recall_sum: f64,
  f1_sum: f64,
}

impl ParseAccuracy {
  pub fn new() -> Self {
    Self::default()
  }

  /// Scores one sentence's `found` spans against `gold` and folds the
  /// result into the running totals.
  pub fn add<T: Eq + Hash>(&mut self, found: &HashSet<T>, gold: &HashSet<T>) -> Scores {
    let s = score(found, gold);
    self.sentences += 1;
    self.precision_sum += s.precision;
    self.recall_sum += s.recall;
    self.f1_sum += s.f1;
    s
  }

  pub fn sentences(&self) -> usize {
    self.sentences
  }

  fn avg(&self, sum: f64) -> f64 {
    if self.sentences == 0 {
      0.0
    } else {
      sum / self.sentences as f64
    }
  }

  pub fn precision(&self) -> f64 {
    self.avg(self.precision_sum)
  }

  pub fn recall(&self) -> f64 {
    self.avg(self.recall_sum)
  }

  pub fn f1(&self) -> f64 {
    self.avg(self.f1_sum)
  }
}

/// Like [`ParseAccuracy`], but a failed parse still counts a sentence
/// against the averages, scored as if nothing had been found (spec's
/// "penalizing failure" policy).
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseAccuracyPenalizeFailures(ParseAccuracy);

impl ParseAccuracyPenalizeFailures {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add<T: Eq + Hash>(&mut self, found: &HashSet<T>, gold: &HashSet<T>) -> Scores {
    self.0.add(found, gold)
  }

  /// Records a failed parse attempt: scored as an empty `found` set.
  pub fn add_failure<T: Eq + Hash + Clone>(&mut self, gold: &HashSet<T>) -> Scores {
    self.0.add(&HashSet::new(), gold)
  }

  pub fn sentences(&self) -> usize {
    self.0.sentences()
  }

  pub fn precision(&self) -> f64 {
    self.0.precision()
  }

  pub fn recall(&self) -> f64 {
    self.0.recall()
  }

  pub fn f1(&self) -> f64 {
    self.0.f1()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  type Span = (String, usize, usize);

  fn span(label: &str, low: usize, high: usize) -> Span {
    (label.to_string(), low, high)
  }

  #[test]
  fn perfect_match_scores_one() {
    let mut acc = ParseAccuracy::new();
    let gold: HashSet<Span> = [span("NP", 0, 2), span("VP", 2, 4)].into_iter().collect();
    let found = gold.clone();
    let s = acc.add(&found, &gold);
    assert_eq!(s, Scores { precision: 1.0, recall: 1.0, f1: 1.0 });
  }

  #[test]
  fn partial_overlap_computes_precision_recall_f1() {
    let mut acc = ParseAccuracy::new();
    let gold: HashSet<Span> = [span("NP", 0, 2), span("VP", 2, 4)].into_iter().collect();
    let found: HashSet<Span> = [span("NP", 0, 2), span("PP", 4, 6)].into_iter().collect();
    let s = acc.add(&found, &gold);
    assert!((s.precision - 0.5).abs() < 1e-9);
    assert!((s.recall - 0.5).abs() < 1e-9);
    assert!((s.f1 - 0.5).abs() < 1e-9);
  }

  #[test]
  fn empty_found_scores_zero_not_nan() {
    let mut acc = ParseAccuracy::new();
    let gold: HashSet<Span> = [span("NP", 0, 2)].into_iter().collect();
    let found: HashSet<Span> = HashSet::new();
    let s = acc.add(&found, &gold);
    assert_eq!(s, Scores { precision: 0.0, recall: 0.0, f1: 0.0 });
  }

  #[test]
  fn silent_failures_are_excluded_from_the_average() {
    let mut acc = ParseAccuracy::new();
    let gold: HashSet<Span> = [span("NP", 0, 2)].into_iter().collect();
    acc.add(&gold.clone(), &gold);
    // A failed sentence is simply never added.
    assert_eq!(acc.sentences(), 1);
    assert!((acc.f1() - 1.0).abs() < 1e-9);
  }

  #[test]
  fn penalizing_failures_drags_the_average_down() {
    let mut acc = ParseAccuracyPenalizeFailures::new();
    let gold: HashSet<Span> = [span("NP", 0, 2)].into_iter().collect();
    acc.add(&gold.clone(), &gold);
    acc.add_failure(&gold);
    assert_eq!(acc.sentences(), 2);
    assert!((acc.f1() - 0.5).abs() < 1e-9);
  }
}
