//! Grammar induction: walk a tree and a recursive partitioning of its
//! yield, emitting LCFRS+DCP rules that re-derive the tree (spec §4.D).
//!
//! Grounded in `constituent/induction.py` (`fringe_extract_lcfrs`,
//! `direct_extract_lcfrs`) for constituent trees and
//! `dependency/induction.py` (`add_rules_to_grammar_rec`,
//! `create_dcp_rule`) for dependency trees.

use std::collections::{BTreeSet, HashMap};

use crate::error::{HybridGrammarError, Result};
use crate::grammar::Grammar;
use crate::partitioning::{join_spans, Partitioning};
use crate::symbols::{DcpRule, DcpTerm, DcpTermOrRef, DcpVar, LcfrsElement, LcfrsVar};
use crate::terminal_labeling::TerminalLabeling;
use crate::tree::{bottom_max, top_max, ConstituentTree, DependencyTree, NodeId, Tree};

pub const START_NONT: &str = "START";

// ---------------------------------------------------------------------
// Constituent induction
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
  Strict,
  Child,
}

fn id_nont_strict(id_seqs: &[Vec<NodeId>], tree: &ConstituentTree) -> String {
  let mut s = String::new();
  for (i, seq) in id_seqs.iter().enumerate() {
    for (j, &id) in seq.iter().enumerate() {
      s += tree.node_label(id);
      if j < seq.len() - 1 {
        s.push('/');
      }
    }
    if i < id_seqs.len() - 1 {
      s.push('-');
    }
  }
  s
}

fn id_nont_child(id_seqs: &[Vec<NodeId>], tree: &ConstituentTree) -> String {
  let mut s = String::new();
  for (i, seq) in id_seqs.iter().enumerate() {
    if seq.len() == 1 {
      s += tree.node_label(seq[0]);
    } else {
      let parent = tree
        .parent(seq[0])
        .expect("a sequence of more than one sibling must have a parent");
      s += &format!("children_of_{}", tree.node_label(parent));
    }
    if i < id_seqs.len() - 1 {
      s.push('-');
    }
  }
  s
}

fn id_nont(id_seqs: &[Vec<NodeId>], tree: &ConstituentTree, naming: Naming) -> String {
  match naming {
    Naming::Strict => id_nont_strict(id_seqs, tree),
    Naming::Child => id_nont_child(id_seqs, tree),
  }
}

/// Maximal sequences of adjacent nodes whose fringes lie entirely within
/// `fringe`, found by descending from `id`.
fn make_id_seq(tree: &ConstituentTree, id: NodeId, fringe: &BTreeSet<usize>) -> Vec<Vec<NodeId>> {
  let node_fringe = tree.fringe(id);
  if node_fringe.is_subset(fringe) {
    return vec![vec![id]];
  }
  let mut seqs = Vec::new();
  let mut seq = Vec::new();
  for &child in tree.children(id) {
    let child_fringe = tree.fringe(child);
    if child_fringe.is_subset(fringe) {
      seq.push(child);
    } else if !child_fringe.is_disjoint(fringe) {
      if !seq.is_empty() {
        seqs.push(std::mem::take(&mut seq));
      }
      seqs.extend(make_id_seq(tree, child, fringe));
    } else if !seq.is_empty() {
      seqs.push(std::mem::take(&mut seq));
    }
  }
  if !seq.is_empty() {
    seqs.push(seq);
  }
  seqs
}

fn span_to_arg(
  span: (usize, usize),
  children_spans: &[Vec<(usize, usize)>],
  tree: &ConstituentTree,
  term_to_pos: &mut HashMap<usize, usize>,
  term_labeling: &dyn TerminalLabeling,
) -> Vec<LcfrsElement> {
  let (low, high) = span;
  let mut arg = Vec::new();
  let mut k = low;
  while k <= high {
    let mut matched = false;
    'outer: for (i, child_spans) in children_spans.iter().enumerate() {
      for (j, &(child_low, child_high)) in child_spans.iter().enumerate() {
        if child_low == k {
          arg.push(LcfrsElement::Var(LcfrsVar::new(i as i32, j)));
          k = child_high + 1;
          matched = true;
          break 'outer;
        }
      }
    }
    if !matched {
      let token = tree.token_yield()[k];
      arg.push(LcfrsElement::Terminal(term_labeling.token_label(token)));
      term_to_pos.insert(k, term_to_pos.len());
      k += 1;
    }
  }
  arg
}

enum SeqElem {
  Node(NodeId),
  Var(DcpVar),
}

fn sublist_index(needle: &[NodeId], haystack: &[SeqElem]) -> Option<usize> {
  if needle.is_empty() || needle.len() > haystack.len() {
    return None;
  }
  'outer: for k in 0..=(haystack.len() - needle.len()) {
    for (offset, &want) in needle.iter().enumerate() {
      match &haystack[k + offset] {
        SeqElem::Node(id) if *id == want => {}
        _ => continue 'outer,
      }
    }
    return Some(k);
  }
  None
}

fn make_fringe_terms(
  tree: &ConstituentTree,
  seq: Vec<SeqElem>,
  child_seqss: &[Vec<Vec<NodeId>>],
  term_to_pos: &HashMap<usize, usize>,
) -> Vec<DcpTermOrRef> {
  let mut seq = seq;
  for (i, child_seqs) in child_seqss.iter().enumerate() {
    for (j, child_seq) in child_seqs.iter().enumerate() {
      if let Some(k) = sublist_index(child_seq, &seq) {
        seq.splice(k..k + child_seq.len(), [SeqElem::Var(DcpVar::new(i as i32, j))]);
      }
    }
  }
  let mut terms = Vec::new();
  for elem in seq {
    match elem {
      SeqElem::Var(v) => terms.push(DcpTermOrRef::Var(v)),
      SeqElem::Node(id) => {
        if tree.is_leaf(id) {
          let k = tree.leaf_index(id).unwrap();
          let pos = term_to_pos[&k];
          let edge = tree.edge_label(id).map(str::to_string);
          terms.push(DcpTermOrRef::Index(crate::symbols::DcpIndex::new(pos, edge)));
        } else {
          let label = tree.node_label(id).to_string();
          let children: Vec<SeqElem> = tree.children(id).iter().map(|&c| SeqElem::Node(c)).collect();
          let arg = make_fringe_terms(tree, children, child_seqss, term_to_pos);
          let edge = tree.edge_label(id).map(str::to_string);
          terms.push(DcpTermOrRef::Term(DcpTerm::new(label, arg).with_edge_label(edge)));
        }
      }
    }
  }
  terms
}

fn fringe_extract_lcfrs_recur(
  tree: &ConstituentTree,
  fringes: &Partitioning,
  grammar: &mut Grammar,
  naming: Naming,
  term_labeling: &dyn TerminalLabeling,
) -> Result<(String, Vec<(usize, usize)>, Vec<Vec<NodeId>>)> {
  let mut nonts = Vec::new();
  let mut child_spans = Vec::new();
  let mut child_seqs = Vec::new();
  for child in &fringes.children {
    let (n, s, seq) = fringe_extract_lcfrs_recur(tree, child, grammar, naming, term_labeling)?;
    nonts.push(n);
    child_spans.push(s);
    child_seqs.push(seq);
  }

  let spans = join_spans(&fringes.positions);
  let mut term_to_pos = HashMap::new();
  let args: Vec<Vec<LcfrsElement>> = spans
    .iter()
    .map(|&span| span_to_arg(span, &child_spans, tree, &mut term_to_pos, term_labeling))
    .collect();

  let id_seq = make_id_seq(tree, tree.root(), &fringes.positions);

  let dcp_rules: Vec<DcpRule> = id_seq
    .iter()
    .enumerate()
    .map(|(i, seq)| {
      let seq_elems: Vec<SeqElem> = seq.iter().map(|&id| SeqElem::Node(id)).collect();
      let rhs = make_fringe_terms(tree, seq_elems, &child_seqs, &term_to_pos);
      DcpRule::new(DcpVar::new(-1, i), rhs)
    })
    .collect();

  let nont = format!("{}/{}", id_nont(&id_seq, tree, naming), spans.len());
  grammar.add_rule(nont.clone(), args, nonts, 1.0, dcp_rules)?;
  Ok((nont, spans, id_seq))
}

/// Induces an LCFRS+DCP grammar from `tree` using the partitioning
/// `fringes` over its yield positions.
pub fn fringe_extract_lcfrs(
  tree: &ConstituentTree,
  fringes: &Partitioning,
  naming: Naming,
  term_labeling: &dyn TerminalLabeling,
) -> Result<Grammar> {
  let mut grammar = Grammar::with_start(START_NONT);
  let (first, _, _) = fringe_extract_lcfrs_recur(tree, fringes, &mut grammar, naming, term_labeling)?;
  grammar.add_rule(
    START_NONT,
    vec![vec![LcfrsElement::Var(LcfrsVar::new(0, 0))]],
    vec![first],
    1.0,
    vec![DcpRule::new(
      DcpVar::new(-1, 0),
      vec![DcpTermOrRef::Var(DcpVar::new(0, 0))],
    )],
  )?;
  Ok(grammar)
}

fn tree_to_partitioning(tree: &ConstituentTree, id: NodeId) -> Partitioning {
  let positions = tree.fringe(id);
  if tree.is_leaf(id) {
    return Partitioning::node(positions, Vec::new());
  }
  let children = tree
    .children(id)
    .iter()
    .map(|&c| tree_to_partitioning(tree, c))
    .collect();
  Partitioning::node(positions, children)
}

/// Induces directly from `tree`'s own child structure, with no explicit
/// partitioning argument: a convenience entry point over
/// [`fringe_extract_lcfrs`] fed the partitioning that mirrors the tree.
pub fn direct_extract_lcfrs(tree: &ConstituentTree, term_labeling: &dyn TerminalLabeling) -> Result<Grammar> {
  let fringes = tree_to_partitioning(tree, tree.root());
  fringe_extract_lcfrs(tree, &fringes, Naming::Strict, term_labeling)
}

// ---------------------------------------------------------------------
// Dependency induction
// ---------------------------------------------------------------------

/// Builds the nonterminal label for a dependency-induced rule from its
/// node's `top_max`/`bottom_max` attribute sequences (spec §4.D). The
/// stock [`TopBottomLabeling`] concatenates the POS tags of each
/// sequence's head node.
pub trait DependencyNontLabeling {
  fn label(
    &self,
    tree: &DependencyTree,
    t_max: &[Vec<usize>],
    b_max: &[Vec<usize>],
    fanout: usize,
  ) -> String;
}

pub struct TopBottomLabeling;

impl DependencyNontLabeling for TopBottomLabeling {
  fn label(&self, tree: &DependencyTree, t_max: &[Vec<usize>], b_max: &[Vec<usize>], fanout: usize) -> String {
    let part = |seqs: &[Vec<usize>]| -> String {
      seqs
        .iter()
        .map(|seq| {
          seq
            .iter()
            .map(|&p| tree.node_token(NodeId(p as u32)).pos.clone())
            .collect::<Vec<_>>()
            .join("/")
        })
        .collect::<Vec<_>>()
        .join("-")
    };
    format!("{}#{}/{}", part(b_max), part(t_max), fanout)
  }
}

fn create_dcp_rule(
  mem: i32,
  arg: usize,
  top_max: &[Vec<usize>],
  bottom_max: &[Vec<usize>],
  children: &[(Vec<Vec<usize>>, Vec<Vec<usize>>)],
) -> Result<DcpRule> {
  let lhs = DcpVar::new(mem, arg);
  let mut conseq_ids: Vec<usize> = if mem < 0 {
    top_max[arg - bottom_max.len()].clone()
  } else {
    children[mem as usize].1[arg].clone()
  };
  let mut rhs = Vec::new();
  while !conseq_ids.is_empty() {
    let id = conseq_ids[0];
    let mut c_index: i32 = if mem >= 0 { -1 } else { 0 };
    let mut matched = false;
    while (c_index as isize) < children.len() as isize && !matched {
      let (child_top, child_bottom_len): (&[Vec<usize>], usize) = if c_index >= 0 {
        let c = &children[c_index as usize];
        (&c.0, c.1.len())
      } else {
        (bottom_max, 0)
      };
      for (t_seq_index, t_seq) in child_top.iter().enumerate() {
        if !t_seq.is_empty() && id == t_seq[0] {
          if conseq_ids[..t_seq.len().min(conseq_ids.len())] != t_seq[..] {
            return Err(HybridGrammarError::InductionViolation(format!(
              "malformed partitioning: attribute sequence does not match at id {}",
              id
            )));
          }
          rhs.push(DcpTermOrRef::Var(DcpVar::new(c_index, child_bottom_len + t_seq_index)));
          conseq_ids.drain(0..t_seq.len());
          matched = true;
          break;
        }
      }
      c_index += 1;
    }
    if !matched {
      return Err(HybridGrammarError::InductionViolation(format!(
        "expected ingredient for synthesized or inherited argument was not found for id {}",
        id
      )));
    }
  }
  Ok(DcpRule::new(lhs, rhs))
}

fn create_leaf_dcp_rule(bottom_max: &[Vec<usize>], dependency_label: String) -> DcpRule {
  let has_bottom = !bottom_max.is_empty();
  let lhs = DcpVar::new(-1, if has_bottom { 1 } else { 0 });
  let head = crate::symbols::DcpIndex::new(0, Some(dependency_label));
  let term_arg = if has_bottom {
    vec![DcpTermOrRef::Var(DcpVar::new(-1, 0))]
  } else {
    Vec::new()
  };
  let term = DcpTerm::new(head, term_arg);
  DcpRule::new(lhs, vec![DcpTermOrRef::Term(term)])
}

fn dependency_lcfrs_args(node_ids: &BTreeSet<usize>, children: &[&BTreeSet<usize>]) -> Result<Vec<Vec<LcfrsElement>>> {
  let spans = join_spans(node_ids);
  let children_spans: Vec<Vec<(usize, usize)>> = children.iter().map(|ids| join_spans(ids)).collect();
  let mut args = Vec::new();
  for (low, high) in spans {
    let mut arg = Vec::new();
    let mut i = low;
    while i <= high {
      let mut matched = false;
      'outer: for (mem, child_spans) in children_spans.iter().enumerate() {
        for (mem_arg, &(child_low, child_high)) in child_spans.iter().enumerate() {
          if child_low == i {
            arg.push(LcfrsElement::Var(LcfrsVar::new(mem as i32, mem_arg)));
            i = child_high + 1;
            matched = true;
            break 'outer;
          }
        }
      }
      if !matched {
        return Err(HybridGrammarError::InductionViolation(
          "expected ingredient for LCFRS argument was not found".to_string(),
        ));
      }
    }
    args.push(arg);
  }
  Ok(args)
}

fn add_rules_to_grammar_rec(
  tree: &DependencyTree,
  rec_par: &Partitioning,
  grammar: &mut Grammar,
  nont_labelling: &dyn DependencyNontLabeling,
  term_labelling: &dyn TerminalLabeling,
) -> Result<(Vec<Vec<usize>>, Vec<Vec<usize>>, String)> {
  let node_ids = &rec_par.positions;
  if !rec_par.children.is_empty() && node_ids.len() == 1 {
    return Err(HybridGrammarError::InductionViolation(
      "a singleton in a recursive partitioning must not have children".to_string(),
    ));
  }

  if node_ids.len() == 1 {
    let pos = *node_ids.iter().next().unwrap();
    let t_max = top_max(tree, node_ids);
    let b_max = bottom_max(tree, node_ids);
    let token = tree.node_token(NodeId(pos as u32));
    let dependency_label = token.edge_label.clone().unwrap_or_default();
    let dcp = vec![create_leaf_dcp_rule(&b_max, dependency_label)];
    let nont = nont_labelling.label(tree, &t_max, &b_max, 1);
    let arg = vec![LcfrsElement::Terminal(term_labelling.token_label(token))];
    grammar.add_rule(nont.clone(), vec![arg], vec![], 1.0, dcp)?;
    return Ok((t_max, b_max, nont));
  }

  let mut child_results = Vec::new();
  for child in &rec_par.children {
    child_results.push(add_rules_to_grammar_rec(tree, child, grammar, nont_labelling, term_labelling)?);
  }

  let t_max = top_max(tree, node_ids);
  let b_max = bottom_max(tree, node_ids);
  let children_tb: Vec<(Vec<Vec<usize>>, Vec<Vec<usize>>)> =
    child_results.iter().map(|(t, b, _)| (t.clone(), b.clone())).collect();

  let mut dcp = Vec::new();
  for arg in 0..t_max.len() {
    dcp.push(create_dcp_rule(-1, b_max.len() + arg, &t_max, &b_max, &children_tb)?);
  }
  for (c_i, (_, cb, _)) in child_results.iter().enumerate() {
    for arg in 0..cb.len() {
      dcp.push(create_dcp_rule(c_i as i32, arg, &t_max, &b_max, &children_tb)?);
    }
  }

  let child_refs: Vec<&BTreeSet<usize>> = rec_par.children.iter().map(|c| &c.positions).collect();
  let args = dependency_lcfrs_args(node_ids, &child_refs)?;
  let nont = nont_labelling.label(tree, &t_max, &b_max, args.len());
  let rhs: Vec<String> = child_results.iter().map(|(_, _, name)| name.clone()).collect();
  grammar.add_rule(nont.clone(), args, rhs, 1.0, dcp)?;
  Ok((t_max, b_max, nont))
}

/// Top-level dependency induction driver (spec §4.D), grounded in
/// `dependency/induction.py`'s `induce_grammar`.
pub fn induce_dependency_grammar(
  trees: &[DependencyTree],
  nont_labelling: &dyn DependencyNontLabeling,
  term_labelling: &dyn TerminalLabeling,
  partitioning_fn: impl Fn(&DependencyTree) -> Partitioning,
  start_nont: &str,
) -> Result<Grammar> {
  let mut grammar = Grammar::with_start(start_nont);
  for (i, tree) in trees.iter().enumerate() {
    let rec_par = partitioning_fn(tree);
    let (_, _, nont_name) = add_rules_to_grammar_rec(tree, &rec_par, &mut grammar, nont_labelling, term_labelling)
      .inspect_err(|e| {
        tracing::warn!(tree_index = i, error = %e, "skipping tree: induction violation");
      })?;
    grammar.add_rule(
      start_nont,
      vec![vec![LcfrsElement::Var(LcfrsVar::new(0, 0))]],
      vec![nont_name],
      1.0,
      vec![DcpRule::new(
        DcpVar::new(-1, 0),
        vec![DcpTermOrRef::Var(DcpVar::new(0, 0))],
      )],
    )?;
  }
  grammar.make_proper();
  Ok(grammar)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::chart::ChartParser;
  use crate::evaluate::evaluate_derivation;
  use crate::partitioning::{fanout_k_limit, left_branching, FanoutKPolicy};
  use crate::terminal_labeling::PosTerminals;
  use crate::tree::{ConstituentTreeBuilder, HybridNode, Token};

  fn cross_serial_tree() -> ConstituentTree {
    // (S (NP Piet) (VP helpen (VP lezen (NP Marie))))
    // with cross-serial yield order Piet Marie helpen lezen (positions 0..3).
    let mut b = ConstituentTreeBuilder::new();
    let piet = b.leaf(Token::new("Piet", "N"), 0);
    let np1 = b.internal("NP", None, vec![piet]);
    let marie = b.leaf(Token::new("Marie", "N"), 1);
    let np2 = b.internal("NP", None, vec![marie]);
    let helpen = b.leaf(Token::new("helpen", "V"), 2);
    let lezen = b.leaf(Token::new("lezen", "V"), 3);
    let vp_inner = b.internal("VP", None, vec![lezen, np2]);
    let vp_outer = b.internal("VP", None, vec![helpen, vp_inner]);
    let root = b.internal("S", None, vec![np1, vp_outer]);
    b.build(root)
  }

  #[test]
  fn direct_extraction_recognizes_its_own_tree() {
    let tree = cross_serial_tree();
    let grammar = direct_extract_lcfrs(&tree, &PosTerminals).unwrap();
    assert!(grammar.well_formed().is_ok());
    assert_eq!(grammar.start(), Some(START_NONT));
  }

  /// Checks that `node` has the same category/POS labels and child
  /// ordering as `tree` rooted at `id` (induction soundness, spec §8).
  fn assert_isomorphic(tree: &ConstituentTree, id: NodeId, node: &HybridNode) {
    if tree.is_leaf(id) {
      match node {
        HybridNode::Leaf { position, label, .. } => {
          assert_eq!(*position, tree.leaf_index(id).unwrap());
          assert_eq!(label, tree.node_label(id));
        }
        HybridNode::Internal { .. } => panic!("expected leaf at {:?}, got internal node", id),
      }
    } else {
      match node {
        HybridNode::Internal { label, children, .. } => {
          assert_eq!(label, tree.node_label(id));
          let tree_children = tree.children(id);
          assert_eq!(children.len(), tree_children.len());
          for (child_node, &child_id) in children.iter().zip(tree_children) {
            assert_isomorphic(tree, child_id, child_node);
          }
        }
        HybridNode::Leaf { .. } => panic!("expected internal node at {:?}, got leaf", id),
      }
    }
  }

  #[test]
  fn direct_extraction_round_trips_through_parse_and_evaluation() {
    let tree = cross_serial_tree();
    let grammar = direct_extract_lcfrs(&tree, &PosTerminals).unwrap();

    let tokens: Vec<Token> = tree.token_yield().into_iter().cloned().collect();
    let input = PosTerminals.prepare_parser_input(&tokens);
    let parser = ChartParser::new(&grammar, input);
    assert!(parser.recognized());

    let derivation = parser.best_derivation().expect("recognized input has a best derivation");
    let hybrid = evaluate_derivation(&grammar, &derivation, &tokens).unwrap();

    assert!(hybrid.disconnected_leaves().is_empty());
    assert_eq!(hybrid.top_level.len(), 1);
    assert_isomorphic(&tree, tree.root(), &hybrid.top_level[0]);
  }

  #[test]
  fn disconnected_punctuation_leaf_survives_as_a_separate_entry() {
    // Scenario 2: the induced grammar only ever sees the four-token
    // cross-serial sentence, but the evaluator is handed a fifth token
    // (a period) that no rule consumes; it must come back as disconnected
    // rather than failing evaluation, with the rest of the tree unchanged.
    let tree = cross_serial_tree();
    let grammar = direct_extract_lcfrs(&tree, &PosTerminals).unwrap();

    let mut tokens: Vec<Token> = tree.token_yield().into_iter().cloned().collect();
    tokens.push(Token::new(".", "Punc"));

    let input = PosTerminals.prepare_parser_input(&tokens[..4]);
    let parser = ChartParser::new(&grammar, input);
    assert!(parser.recognized());

    let derivation = parser.best_derivation().expect("recognized input has a best derivation");
    let hybrid = evaluate_derivation(&grammar, &derivation, &tokens).unwrap();

    assert_eq!(hybrid.disconnected_leaves(), &BTreeSet::from([4]));
    assert_isomorphic(&tree, tree.root(), &hybrid.top_level[0]);
  }

  #[test]
  fn fringe_extraction_with_fanout_k_partitioning() {
    let tree = cross_serial_tree();
    let mirror = tree_to_partitioning(&tree, tree.root());
    let limited = fanout_k_limit(&mirror, 2, &FanoutKPolicy::RightmostFirst);
    let grammar = fringe_extract_lcfrs(&tree, &limited, Naming::Strict, &PosTerminals).unwrap();
    assert!(grammar.well_formed().is_ok());
  }

  fn dependency_sample() -> DependencyTree {
    use crate::tree::Token;
    let tokens = vec![
      Token::new("the", "Det").with_edge("det"),
      Token::new("cat", "N").with_edge("obj"),
      Token::new("sat", "V").with_edge("root"),
      Token::new("quickly", "Adv").with_edge("adv"),
    ];
    DependencyTree::new(tokens, vec![Some(2), Some(2), None, Some(2)])
  }

  #[test]
  fn dependency_induction_with_cfg_partitioning_recognizes() {
    let tree = dependency_sample();
    let labelling = TopBottomLabeling;
    let trees = vec![tree];
    let grammar = induce_dependency_grammar(
      &trees,
      &labelling,
      &PosTerminals,
      |t| crate::partitioning::cfg(&left_branching(t.id_yield().len())),
      "START",
    )
    .unwrap();
    assert!(grammar.well_formed().is_ok());
  }
}
