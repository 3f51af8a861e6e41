//! Derivation evaluator (spec §4.F): recomputes spans from a derivation's
//! shape alone, then evaluates its synchronized DCP component top-down,
//! demand-driven, folding the result into a [`HybridTree`]. Grounded in
//! `parsing.py`'s `add_lengths_to_derivation`/`add_spans_to_derivation_recur`
//! and `eval_dcp`/`eval_dcp_term`/`position_of_terminal`.

use std::collections::{BTreeSet, HashMap};

use crate::chart::Derivation;
use crate::error::{HybridGrammarError, Result};
use crate::grammar::{Grammar, Rule};
use crate::symbols::{DcpHead, DcpPos, DcpTermOrRef, DcpValue, DcpValueHead, LcfrsElement};
use crate::tree::{HybridNode, HybridTree, Token};

/// Derivation node annotated with the argument lengths implied by its
/// rule's LCFRS shape, computed bottom-up (`add_lengths_to_derivation`).
struct LenNode {
  rule_id: crate::grammar::RuleId,
  lengths: Vec<usize>,
  children: Vec<LenNode>,
}

fn add_lengths(grammar: &Grammar, der: &Derivation) -> LenNode {
  let children: Vec<LenNode> = der.children.iter().map(|c| add_lengths(grammar, c)).collect();
  let rule = grammar.rule(der.rule_id);
  let lengths = rule
    .args
    .iter()
    .map(|arg| {
      arg
        .iter()
        .map(|mem| match mem {
          LcfrsElement::Terminal(_) => 1,
          LcfrsElement::Var(v) => children[v.mem as usize].lengths[v.arg],
        })
        .sum()
    })
    .collect();
  LenNode {
    rule_id: der.rule_id,
    lengths,
    children,
  }
}

/// Derivation node with each argument's `[low, high]` input span resolved
/// (`add_spans_to_derivation_recur`). Spans are inclusive on both ends.
struct SpanNode {
  rule_id: crate::grammar::RuleId,
  spans: Vec<(usize, usize)>,
  children: Vec<SpanNode>,
}

fn add_spans_recur(grammar: &Grammar, len: &LenNode, starts: &[usize]) -> SpanNode {
  let rule = grammar.rule(len.rule_id);
  let mut spans = Vec::with_capacity(rule.args.len());
  let mut start_map: HashMap<(i32, usize), usize> = HashMap::new();
  for (k, arg) in rule.args.iter().enumerate() {
    let mut pos = starts[k];
    for mem in arg {
      match mem {
        LcfrsElement::Terminal(_) => pos += 1,
        LcfrsElement::Var(v) => {
          start_map.insert((v.mem, v.arg), pos);
          pos += len.children[v.mem as usize].lengths[v.arg];
        }
      }
    }
    spans.push((starts[k], pos.saturating_sub(1)));
  }
  let children = len
    .children
    .iter()
    .enumerate()
    .map(|(i, child_len)| {
      let child_starts: Vec<usize> = (0..child_len.lengths.len())
        .map(|j| start_map[&(i as i32, j)])
        .collect();
      add_spans_recur(grammar, child_len, &child_starts)
    })
    .collect();
  SpanNode {
    rule_id: len.rule_id,
    spans,
    children,
  }
}

fn add_spans(grammar: &Grammar, der: &Derivation) -> SpanNode {
  let len = add_lengths(grammar, der);
  add_spans_recur(grammar, &len, &[0])
}

/// Position of the `index`-th terminal consumed by `rule`'s LCFRS
/// component, given the resolved spans of `rule` and its children
/// (`position_of_terminal`).
fn position_of_terminal(rule: &Rule, spans: &[(usize, usize)], children: &[SpanNode], index: usize) -> Option<usize> {
  let mut n_terms = 0;
  for (arg_idx, arg) in rule.args.iter().enumerate() {
    let mut pos = spans[arg_idx].0;
    for mem in arg {
      match mem {
        LcfrsElement::Terminal(_) => {
          if n_terms == index {
            return Some(pos);
          }
          n_terms += 1;
          pos += 1;
        }
        LcfrsElement::Var(v) => {
          let (_, high) = children[v.mem as usize].spans[v.arg];
          pos = high + 1;
        }
      }
    }
  }
  None
}

/// `(der, mem)`: while resolving an RHS member's inherited attribute, the
/// frame one must climb back up to for `DcpVar`s with `mem < 0`.
type Ancestor<'a> = (&'a SpanNode, i32);

fn eval_dcp<'a>(
  grammar: &Grammar,
  der: &'a SpanNode,
  ancestors: &[Ancestor<'a>],
  mem: i32,
  arg: usize,
) -> Result<Vec<DcpValue>> {
  let rule = grammar.rule(der.rule_id);
  for dcp_rule in &rule.dcp {
    if dcp_rule.lhs.mem == mem && dcp_rule.lhs.arg == arg {
      let mut out = Vec::new();
      for term in &dcp_rule.rhs {
        out.extend(eval_dcp_term(grammar, term, der, ancestors)?);
      }
      return Ok(out);
    }
  }
  Ok(Vec::new())
}

fn eval_dcp_term<'a>(
  grammar: &Grammar,
  term: &DcpTermOrRef,
  der: &'a SpanNode,
  ancestors: &[Ancestor<'a>],
) -> Result<Vec<DcpValue>> {
  match term {
    DcpTermOrRef::Term(t) => {
      let mut ground = Vec::new();
      for child_term in &t.children {
        ground.extend(eval_dcp_term(grammar, child_term, der, ancestors)?);
      }
      let head = match &t.head {
        DcpHead::Label(s) => DcpValueHead::Label(s.clone()),
        DcpHead::Index(idx) => {
          let rule = grammar.rule(der.rule_id);
          let pos = position_of_terminal(rule, &der.spans, &der.children, idx.index).ok_or_else(|| {
            HybridGrammarError::EvaluationFailure(format!("missing terminal {} in rule {}", idx.index, rule))
          })?;
          DcpValueHead::Pos(DcpPos(pos))
        }
      };
      Ok(vec![DcpValue::Term {
        head,
        edge_label: t.edge_label.clone(),
        children: ground,
      }])
    }
    DcpTermOrRef::Var(v) => {
      if v.mem >= 0 {
        let child = &der.children[v.mem as usize];
        let mut new_ancestors = ancestors.to_vec();
        new_ancestors.push((der, v.mem));
        eval_dcp(grammar, child, &new_ancestors, -1, v.arg)
      } else if let Some((last, prefix)) = ancestors.split_last() {
        let (last_der, last_mem) = *last;
        eval_dcp(grammar, last_der, prefix, last_mem, v.arg)
      } else {
        Err(HybridGrammarError::EvaluationFailure(format!(
          "DCP value {} requested outside any derivation",
          v
        )))
      }
    }
    DcpTermOrRef::Index(idx) => {
      let rule = grammar.rule(der.rule_id);
      let pos = position_of_terminal(rule, &der.spans, &der.children, idx.index).ok_or_else(|| {
        HybridGrammarError::EvaluationFailure(format!("missing terminal {} in rule {}", idx.index, rule))
      })?;
      Ok(vec![DcpValue::Pos(DcpPos(pos))])
    }
  }
}

/// Folds an evaluated `DcpValue` into a `HybridNode`, resolving
/// `DcpValueHead::Pos`/`DcpValue::Pos` leaves against the original input
/// tokens (`dcp_to_hybridtree_recur`).
fn value_to_node(value: &DcpValue, tokens: &[Token]) -> HybridNode {
  match value {
    DcpValue::Pos(p) => {
      let tok = &tokens[p.0];
      HybridNode::Leaf {
        position: p.0,
        label: tok.pos.clone(),
        edge_label: tok.edge_label.clone(),
      }
    }
    DcpValue::Term {
      head,
      edge_label,
      children,
    } => {
      let label = match head {
        DcpValueHead::Label(s) => s.clone(),
        DcpValueHead::Pos(p) => tokens[p.0].pos.clone(),
      };
      HybridNode::Internal {
        label,
        edge_label: edge_label.clone(),
        children: children.iter().map(|c| value_to_node(c, tokens)).collect(),
      }
    }
  }
}

/// Evaluates a parsed derivation's DCP component against `tokens`,
/// producing the output `HybridTree`. Input positions the tree's root
/// value never covers (e.g. punctuation excluded by the grammar) are
/// reported as disconnected leaves rather than an error.
pub fn evaluate_derivation(grammar: &Grammar, der: &Derivation, tokens: &[Token]) -> Result<HybridTree> {
  let spans = add_spans(grammar, der);
  let values = eval_dcp(grammar, &spans, &[], -1, 0)?;
  if values.len() != 1 {
    return Err(HybridGrammarError::EvaluationFailure(format!(
      "DCP evaluation produced {} roots, expected exactly 1",
      values.len()
    )));
  }
  let root = value_to_node(&values[0], tokens);
  let mut covered = Vec::new();
  root.leaves_into(&mut covered);
  let covered: BTreeSet<usize> = covered.into_iter().collect();
  let disconnected = (0..tokens.len()).filter(|p| !covered.contains(p)).collect();
  Ok(HybridTree {
    top_level: vec![root],
    disconnected_leaves: disconnected,
  })
}

/// Labelled spans of every rule instance in the derivation, root first
/// (`labelled_spans_recur`); useful for debugging and tests.
pub fn labelled_spans(grammar: &Grammar, der: &Derivation) -> Vec<(String, Vec<(usize, usize)>)> {
  let spans = add_spans(grammar, der);
  let mut out = Vec::new();
  labelled_spans_recur(grammar, &spans, &mut out);
  out
}

fn labelled_spans_recur(grammar: &Grammar, der: &SpanNode, out: &mut Vec<(String, Vec<(usize, usize)>)>) {
  let rule = grammar.rule(der.rule_id);
  out.push((rule.lhs_nont.clone(), der.spans.clone()));
  for child in &der.children {
    labelled_spans_recur(grammar, child, out);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::chart::ChartParser;
  use crate::symbols::{DcpIndex, DcpRule, DcpTerm, DcpVar};

  fn leaf_rule(g: &mut Grammar, nont: &str, terminal: &str) {
    g.add_rule(
      nont,
      vec![vec![LcfrsElement::Terminal(terminal.into())]],
      vec![],
      1.0,
      vec![DcpRule::new(
        DcpVar::new(-1, 0),
        vec![DcpTermOrRef::Index(DcpIndex::new(0, None))],
      )],
    )
    .unwrap();
  }

  #[test]
  fn evaluates_simple_np_vp_derivation() {
    let mut g = Grammar::new();
    // S(x y) -> NP VP, DCP: S's value is NP("S", [np-val, vp-val])
    g.add_rule(
      "S",
      vec![vec![
        LcfrsElement::Var(crate::symbols::LcfrsVar::new(0, 0)),
        LcfrsElement::Var(crate::symbols::LcfrsVar::new(1, 0)),
      ]],
      vec!["NP".into(), "VP".into()],
      1.0,
      vec![DcpRule::new(
        DcpVar::new(-1, 0),
        vec![DcpTermOrRef::Term(DcpTerm::new(
          "S",
          vec![DcpTermOrRef::Var(DcpVar::new(0, 0)), DcpTermOrRef::Var(DcpVar::new(1, 0))],
        ))],
      )],
    )
    .unwrap();
    leaf_rule(&mut g, "NP", "Piet");
    leaf_rule(&mut g, "VP", "walks");

    let inp = vec!["Piet".to_string(), "walks".to_string()];
    let parser = ChartParser::new(&g, inp);
    assert!(parser.recognized());
    let der = parser.best_derivation().unwrap();

    let tokens = vec![Token::new("Piet", "N"), Token::new("walks", "V")];
    let tree = evaluate_derivation(&g, &der, &tokens).unwrap();
    assert_eq!(tree.top_level.len(), 1);
    assert!(tree.disconnected_leaves().is_empty());
    match &tree.top_level[0] {
      HybridNode::Internal { label, children, .. } => {
        assert_eq!(label, "S");
        assert_eq!(children.len(), 2);
      }
      _ => panic!("expected internal node"),
    }
  }

  #[test]
  fn leaf_dcp_index_head_resolves_to_position() {
    // A dependency-style leaf rule whose DCP head is itself a DCP_index,
    // as produced by `induction::create_leaf_dcp_rule`.
    let mut g = Grammar::new();
    g.add_rule(
      "ROOT",
      vec![vec![LcfrsElement::Terminal("sat".into())]],
      vec![],
      1.0,
      vec![DcpRule::new(
        DcpVar::new(-1, 0),
        vec![DcpTermOrRef::Term(DcpTerm::new(DcpIndex::new(0, Some("root".into())), vec![]))],
      )],
    )
    .unwrap();

    let parser = ChartParser::new(&g, vec!["sat".to_string()]);
    assert!(parser.recognized());
    let der = parser.best_derivation().unwrap();
    let tokens = vec![Token::new("sat", "V")];
    let tree = evaluate_derivation(&g, &der, &tokens).unwrap();
    match &tree.top_level[0] {
      HybridNode::Internal { label, children, .. } => {
        assert_eq!(label, "V"); // DcpValueHead::Pos resolved via token.pos
        assert!(children.is_empty());
      }
      _ => panic!("expected internal node"),
    }
  }
}
