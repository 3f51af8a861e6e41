//! LCFRS+DCP rule and grammar store (spec §3, §4.B).
//!
//! Rules are kept in a flat arena (`Vec<Rule>`) indexed by `usize`, the same
//! index-over-owned-data style the teacher uses for feature-structure nodes,
//! rather than `Rc`/`RefCell` sharing — this keeps `Grammar` plain owned data
//! and therefore `Send + Sync` with no interior mutability once built.

use std::collections::HashMap;
use std::fmt;

use crate::error::{HybridGrammarError, Result};
use crate::symbols::{DcpRule, LcfrsElement, LcfrsVar, dcp_rules_to_string};

pub type RuleId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
  pub id: RuleId,
  pub lhs_nont: String,
  pub args: Vec<Vec<LcfrsElement>>,
  pub rhs_nonts: Vec<String>,
  pub weight: f64,
  pub dcp: Vec<DcpRule>,
}

impl Rule {
  pub fn fanout(&self) -> usize {
    self.args.len()
  }

  /// Canonical textual key used for dedup: two rules with the same key
  /// accumulate weight rather than being stored twice.
  pub fn key(&self) -> String {
    let args = self
      .args
      .iter()
      .map(|arg| {
        arg
          .iter()
          .map(|e| e.to_string())
          .collect::<Vec<_>>()
          .join(" ")
      })
      .collect::<Vec<_>>()
      .join(";");
    format!(
      "{}({}) -> {} :: {}",
      self.lhs_nont,
      args,
      self.rhs_nonts.join(" "),
      dcp_rules_to_string(&self.dcp)
    )
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let args = self
      .args
      .iter()
      .map(|arg| {
        arg
          .iter()
          .map(|e| e.to_string())
          .collect::<Vec<_>>()
          .join(" ")
      })
      .collect::<Vec<_>>()
      .join(";");
    write!(
      f,
      "[{}] {}({}) -> {}",
      self.weight,
      self.lhs_nont,
      args,
      self.rhs_nonts.join(" ")
    )?;
    if !self.dcp.is_empty() {
      write!(f, "\n:: {}", dcp_rules_to_string(&self.dcp))?;
    }
    Ok(())
  }
}

fn check_monotone(args: &[Vec<LcfrsElement>]) -> Result<()> {
  let mut next_expected: HashMap<i32, usize> = HashMap::new();
  for arg in args {
    for elem in arg {
      if let LcfrsElement::Var(LcfrsVar { mem, arg: j }) = elem {
        let expect = next_expected.entry(*mem).or_insert(0);
        if *j != *expect {
          return Err(HybridGrammarError::MalformedGrammar(format!(
            "rule not monotone: variable <{},{}> out of order, expected <{},{}>",
            mem, j, mem, expect
          )));
        }
        *expect += 1;
      }
    }
  }
  Ok(())
}

fn first_terminal(args: &[Vec<LcfrsElement>]) -> Option<&str> {
  for arg in args {
    for elem in arg {
      if let LcfrsElement::Terminal(t) = elem {
        return Some(t);
      }
    }
  }
  None
}

fn is_epsilon(args: &[Vec<LcfrsElement>]) -> bool {
  args.iter().all(|arg| arg.is_empty())
}

/// Holds LCFRS+DCP rules and the indices the chart parser needs: fanout
/// table, rules by first RHS nonterminal, lexical rules by first terminal,
/// and epsilon rules (spec §3 "Grammar").
#[derive(Debug, Default)]
pub struct Grammar {
  rules: Vec<Rule>,
  start: Option<String>,
  fanout: HashMap<String, usize>,
  by_first_rhs_nont: HashMap<String, Vec<RuleId>>,
  lex_by_first_terminal: HashMap<String, Vec<RuleId>>,
  epsilon_rule_ids: Vec<RuleId>,
  key_to_id: HashMap<String, RuleId>,
}

impl Grammar {
  pub fn new() -> Self {
    Self::default()
  }

  /// Like [`Grammar::new`], but fixes the start nonterminal up front
  /// instead of letting it default to the first rule's LHS.
  pub fn with_start(start: impl Into<String>) -> Self {
    let start = start.into();
    let mut g = Self::default();
    g.fanout.insert(start.clone(), 1);
    g.start = Some(start);
    g
  }

  pub fn start(&self) -> Option<&str> {
    self.start.as_deref()
  }

  /// Adds a rule, returning its id. If an equal rule (by canonical key)
  /// already exists, its weight is increased instead of inserting a
  /// duplicate (spec §4.B).
  pub fn add_rule(
    &mut self,
    lhs_nont: impl Into<String>,
    args: Vec<Vec<LcfrsElement>>,
    rhs_nonts: Vec<String>,
    weight: f64,
    dcp: Vec<DcpRule>,
  ) -> Result<RuleId> {
    let lhs_nont = lhs_nont.into();
    if args.is_empty() {
      return Err(HybridGrammarError::MalformedGrammar(format!(
        "nonterminal {} has zero fanout",
        lhs_nont
      )));
    }
    let fanout = args.len();
    if let Some(&existing) = self.fanout.get(&lhs_nont) {
      if existing != fanout {
        return Err(HybridGrammarError::MalformedGrammar(format!(
          "nonterminal {} used with fanout {} and {}",
          lhs_nont, existing, fanout
        )));
      }
    }
    if self.start.is_none() {
      if fanout != 1 {
        return Err(HybridGrammarError::MalformedGrammar(format!(
          "start nonterminal {} must have fanout 1, has {}",
          lhs_nont, fanout
        )));
      }
      self.start = Some(lhs_nont.clone());
    }
    check_monotone(&args)?;
    for elem in args.iter().flatten() {
      if let LcfrsElement::Var(v) = elem {
        if v.mem < 0 || v.mem as usize >= rhs_nonts.len() {
          return Err(HybridGrammarError::MalformedGrammar(format!(
            "rule for {} references RHS member {} but has only {} RHS nonterminals",
            lhs_nont,
            v.mem,
            rhs_nonts.len()
          )));
        }
      }
    }

    let rule = Rule {
      id: 0,
      lhs_nont: lhs_nont.clone(),
      args,
      rhs_nonts,
      weight,
      dcp,
    };
    let key = rule.key();
    if let Some(&existing_id) = self.key_to_id.get(&key) {
      self.rules[existing_id].weight += weight;
      return Ok(existing_id);
    }

    let id = self.rules.len();
    let mut rule = rule;
    rule.id = id;
    self.fanout.insert(lhs_nont.clone(), fanout);
    if !rule.rhs_nonts.is_empty() {
      self
        .by_first_rhs_nont
        .entry(rule.rhs_nonts[0].clone())
        .or_default()
        .push(id);
    } else if let Some(t) = first_terminal(&rule.args) {
      self
        .lex_by_first_terminal
        .entry(t.to_string())
        .or_default()
        .push(id);
    } else if is_epsilon(&rule.args) {
      self.epsilon_rule_ids.push(id);
    }
    self.key_to_id.insert(key, id);
    self.rules.push(rule);
    tracing::debug!(rule_count = self.rules.len(), lhs = %lhs_nont, "added rule to grammar");
    Ok(id)
  }

  pub fn rule(&self, id: RuleId) -> &Rule {
    &self.rules[id]
  }

  pub fn rules(&self) -> &[Rule] {
    &self.rules
  }

  pub fn fanout(&self, nont: &str) -> Option<usize> {
    self.fanout.get(nont).copied()
  }

  pub fn lex_rules(&self, terminal: &str) -> &[RuleId] {
    self
      .lex_by_first_terminal
      .get(terminal)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  pub fn nont_corner_of(&self, nont: &str) -> &[RuleId] {
    self
      .by_first_rhs_nont
      .get(nont)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  pub fn epsilon_rules(&self) -> &[RuleId] {
    &self.epsilon_rule_ids
  }

  /// Normalizes, per LHS nonterminal, rule weights to sum to 1.
  pub fn make_proper(&mut self) {
    let mut sums: HashMap<String, f64> = HashMap::new();
    for rule in &self.rules {
      *sums.entry(rule.lhs_nont.clone()).or_insert(0.0) += rule.weight;
    }
    for rule in &mut self.rules {
      let sum = sums[&rule.lhs_nont];
      if sum > 0.0 {
        rule.weight /= sum;
      }
    }
  }

  /// Merges another grammar's rules into this one.
  pub fn add_gram(&mut self, other: Grammar) -> Result<()> {
    for rule in other.rules {
      self.add_rule(rule.lhs_nont, rule.args, rule.rhs_nonts, rule.weight, rule.dcp)?;
    }
    Ok(())
  }

  /// Checks that every rule's RHS member `i` contributes exactly the
  /// variables `0..fanout(rhs[i])`.
  pub fn well_formed(&self) -> Result<()> {
    for rule in &self.rules {
      for (i, rhs_nont) in rule.rhs_nonts.iter().enumerate() {
        let expected_fanout = self.fanout(rhs_nont).ok_or_else(|| {
          let msg = format!(
            "rule for {} references unknown nonterminal {}",
            rule.lhs_nont, rhs_nont
          );
          tracing::warn!(lhs = %rule.lhs_nont, rhs = %rhs_nont, "well-formedness check failed: {}", msg);
          HybridGrammarError::MalformedGrammar(msg)
        })?;
        let mut seen: Vec<bool> = vec![false; expected_fanout];
        for elem in rule.args.iter().flatten() {
          if let LcfrsElement::Var(v) = elem {
            if v.mem as usize == i {
              seen[v.arg] = true;
            }
          }
        }
        if seen.iter().any(|&s| !s) {
          let msg = format!(
            "rule for {} does not bind all {} arguments of RHS member {} ({})",
            rule.lhs_nont, expected_fanout, i, rhs_nont
          );
          tracing::warn!(lhs = %rule.lhs_nont, rhs = %rhs_nont, "well-formedness check failed: {}", msg);
          return Err(HybridGrammarError::MalformedGrammar(msg));
        }
      }
    }
    tracing::debug!(rule_count = self.rules.len(), "grammar is well-formed");
    Ok(())
  }
}

impl fmt::Display for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let start = self.start.as_deref().unwrap_or("");
    let (start_rules, rest): (Vec<&Rule>, Vec<&Rule>) =
      self.rules.iter().partition(|r| r.lhs_nont == start);
    for rule in start_rules.into_iter().chain(rest) {
      writeln!(f, "{}", rule)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbols::DcpTermOrRef;

  fn dummy_dcp(lhs_arg: usize) -> Vec<DcpRule> {
    vec![DcpRule::new(
      crate::symbols::DcpVar::new(-1, lhs_arg),
      vec![DcpTermOrRef::Index(crate::symbols::DcpIndex::new(0, None))],
    )]
  }

  #[test]
  fn add_rule_accumulates_weight_on_dedup() {
    let mut g = Grammar::new();
    let args = vec![vec![LcfrsElement::Terminal("c".into())]];
    g.add_rule("A", args.clone(), vec![], 0.4, dummy_dcp(0)).unwrap();
    assert_eq!(g.rules().len(), 1);
    g.add_rule("A", args, vec![], 0.6, dummy_dcp(0)).unwrap();
    assert_eq!(g.rules().len(), 1);
    assert!((g.rule(0).weight - 1.0).abs() < 1e-9);
  }

  #[test]
  fn make_proper_normalizes_to_one() {
    let mut g = Grammar::new();
    g.add_rule(
      "A",
      vec![vec![LcfrsElement::Terminal("c".into())]],
      vec![],
      0.4,
      dummy_dcp(0),
    )
    .unwrap();
    g.add_rule(
      "A",
      vec![vec![LcfrsElement::Terminal("d".into())]],
      vec![],
      0.6,
      dummy_dcp(0),
    )
    .unwrap();
    g.make_proper();
    let sum: f64 = g.rules().iter().map(|r| r.weight).sum();
    assert!((sum - 1.0).abs() < 1e-9);
  }

  #[test]
  fn zero_fanout_lhs_rejected() {
    let mut g = Grammar::new();
    assert!(g.add_rule("A", vec![], vec![], 1.0, vec![]).is_err());
  }

  #[test]
  fn fanout_mismatch_rejected() {
    let mut g = Grammar::new();
    g.add_rule(
      "A",
      vec![vec![LcfrsElement::Terminal("c".into())]],
      vec![],
      1.0,
      dummy_dcp(0),
    )
    .unwrap();
    let two_arg = vec![
      vec![LcfrsElement::Terminal("c".into())],
      vec![LcfrsElement::Terminal("d".into())],
    ];
    assert!(g.add_rule("A", two_arg, vec![], 1.0, vec![]).is_err());
  }

  #[test]
  fn start_must_have_fanout_one() {
    let mut g = Grammar::new();
    let two_arg = vec![
      vec![LcfrsElement::Terminal("c".into())],
      vec![LcfrsElement::Terminal("d".into())],
    ];
    assert!(g.add_rule("S", two_arg, vec![], 1.0, vec![]).is_err());
  }

  #[test]
  fn non_monotone_rule_rejected() {
    let mut g = Grammar::new();
    let args = vec![vec![
      LcfrsElement::Var(LcfrsVar::new(0, 1)),
      LcfrsElement::Var(LcfrsVar::new(0, 0)),
    ]];
    assert!(g.add_rule("S", args, vec!["A".into()], 1.0, vec![]).is_err());
  }

  #[test]
  fn well_formed_catches_unbound_argument() {
    let mut g = Grammar::with_start("S");
    g.add_rule(
      "A",
      vec![
        vec![LcfrsElement::Terminal("a".into())],
        vec![LcfrsElement::Terminal("b".into())],
      ],
      vec![],
      1.0,
      vec![],
    )
    .unwrap();
    // S only binds <0,0>, leaving A's second argument unbound.
    let args = vec![vec![LcfrsElement::Var(LcfrsVar::new(0, 0))]];
    g.add_rule("S", args, vec!["A".into()], 1.0, vec![]).unwrap();
    assert!(g.well_formed().is_err());
  }

  #[test]
  fn well_formed_accepts_fully_bound_rule() {
    let mut g = Grammar::with_start("S");
    g.add_rule(
      "A",
      vec![
        vec![LcfrsElement::Terminal("a".into())],
        vec![LcfrsElement::Terminal("b".into())],
      ],
      vec![],
      1.0,
      vec![],
    )
    .unwrap();
    let args = vec![vec![
      LcfrsElement::Var(LcfrsVar::new(0, 0)),
      LcfrsElement::Var(LcfrsVar::new(0, 1)),
    ]];
    g.add_rule("S", args, vec!["A".into()], 1.0, vec![]).unwrap();
    assert!(g.well_formed().is_ok());
  }
}
