//! Weighted chart parser for LCFRS+DCP grammars (spec §4.E), grounded in
//! the original `parsing.py`'s `LHS_instance`/`Rule_instance`/
//! `LCFRS_parser`, generalizing the teacher's CFG-only Earley recognizer
//! in `earley.rs` to fanout > 1 argument tuples and weighted agenda items.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::grammar::{Grammar, RuleId};
use crate::symbols::{LcfrsElement, LcfrsVar};

/// Input positions `i+1..=j`, i.e. `[low, high)` over token indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
  pub low: usize,
  pub high: usize,
}

impl fmt::Display for Span {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}-{}]", self.low, self.high)
  }
}

/// Like an LCFRS argument element, but terminals (and, after a combine
/// step, some variables) have been replaced by concrete spans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ArgMember {
  Span(Span),
  Var(LcfrsVar),
}

impl fmt::Display for ArgMember {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Span(s) => write!(f, "{}", s),
      Self::Var(v) => write!(f, "{}", v),
    }
  }
}

/// An LCFRS left-hand side with some or all variables resolved to spans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LhsInstance {
  nont: String,
  args: Vec<Vec<ArgMember>>,
}

impl LhsInstance {
  fn new(nont: impl Into<String>) -> Self {
    Self {
      nont: nont.into(),
      args: Vec::new(),
    }
  }

  fn add_arg(&mut self) {
    self.args.push(Vec::new());
  }

  fn add_mem(&mut self, mem: ArgMember) {
    self.args.last_mut().expect("add_mem before add_arg").push(mem);
  }

  fn fanout(&self) -> usize {
    self.args.len()
  }

  fn arg(&self, i: usize) -> &[ArgMember] {
    &self.args[i]
  }

  /// Spans within an argument must be increasing and contiguous.
  fn consistent(&self) -> bool {
    let mut pos = 0usize;
    for arg in &self.args {
      let mut gap = true;
      for mem in arg {
        match mem {
          ArgMember::Span(s) => {
            if s.low < pos || (!gap && s.low != pos) {
              return false;
            }
            pos = s.high;
            gap = false;
          }
          ArgMember::Var(_) => gap = true,
        }
      }
    }
    true
  }

  /// Minimum/maximum first position the `i`-th RHS member's first
  /// argument could start at, given the spans resolved so far.
  fn next_member_bounds(&self, i: usize, inp_len: usize) -> (usize, usize) {
    let mut pos = 0usize;
    let mut low: Option<usize> = None;
    for arg in &self.args {
      let mut gap = true;
      for mem in arg {
        match mem {
          ArgMember::Span(s) => {
            if let Some(low) = low {
              return (low, s.low);
            }
            pos = s.high;
            gap = false;
          }
          ArgMember::Var(v) => {
            if v.mem as usize == i && v.arg == 0 {
              if gap {
                low = Some(pos);
              } else {
                return (pos, pos);
              }
            }
            gap = true;
          }
        }
      }
    }
    match low {
      Some(low) => (low, inp_len),
      None => (0, inp_len),
    }
  }

  /// Replaces the variable referring to RHS member `i`'s argument `j`
  /// with `span`, in every argument it occurs in.
  fn replace(&mut self, i: usize, j: usize, span: Span) {
    for arg in &mut self.args {
      for mem in arg.iter_mut() {
        if let ArgMember::Var(v) = mem {
          if v.mem as usize == i && v.arg == j {
            *mem = ArgMember::Span(span);
          }
        }
      }
    }
  }

  /// Left-most position, valid once all variables are resolved.
  fn left_position(&self) -> usize {
    match self.args[0][0] {
      ArgMember::Span(s) => s.low,
      ArgMember::Var(_) => panic!("left_position on unresolved LHS instance"),
    }
  }

  /// Collapses each argument's member spans into a single concatenated
  /// span, valid once all variables are resolved.
  fn collapse(&mut self) {
    for arg in &mut self.args {
      let low = match arg[0] {
        ArgMember::Span(s) => s.low,
        ArgMember::Var(_) => panic!("collapse on unresolved LHS instance"),
      };
      let high = match arg[arg.len() - 1] {
        ArgMember::Span(s) => s.high,
        ArgMember::Var(_) => panic!("collapse on unresolved LHS instance"),
      };
      *arg = vec![ArgMember::Span(Span { low, high })];
    }
  }
}

impl fmt::Display for LhsInstance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}(", self.nont)?;
    for (i, arg) in self.args.iter().enumerate() {
      for (j, mem) in arg.iter().enumerate() {
        write!(f, "{}", mem)?;
        if j + 1 < arg.len() {
          write!(f, " ")?;
        }
      }
      if i + 1 < self.args.len() {
        write!(f, "; ")?;
      }
    }
    write!(f, ")")
  }
}

/// A rule with terminals replaced by spans, some variables still
/// unresolved, and a dot marking how many RHS members have been matched.
#[derive(Debug, Clone)]
struct RuleInstance {
  rule_id: RuleId,
  lhs: LhsInstance,
  dot: usize,
}

impl RuleInstance {
  fn complete(&self, grammar: &Grammar) -> bool {
    self.dot == grammar.rule(self.rule_id).rhs_nonts.len()
  }

  fn consistent(&self) -> bool {
    self.lhs.consistent()
  }

  fn next_member_bounds(&self, grammar: &Grammar, inp_len: usize) -> (usize, usize) {
    let _ = grammar;
    self.lhs.next_member_bounds(self.dot, inp_len)
  }

  fn next_nont<'g>(&self, grammar: &'g Grammar) -> &'g str {
    &grammar.rule(self.rule_id).rhs_nonts[self.dot]
  }

  /// Short key identifying lhs/rhs-nonts/dot, ignoring weight — used for
  /// agenda dedup and as a trace lookup key.
  fn key(&self, grammar: &Grammar) -> String {
    let rule = grammar.rule(self.rule_id);
    let mut s = format!("{}->", self.lhs);
    let n = rule.rhs_nonts.len();
    for i in 0..n {
      if self.dot == i {
        s.push('*');
      }
      s.push_str(&rule.rhs_nonts[i]);
      if i + 1 < n {
        s.push(' ');
      }
    }
    if self.dot == n {
      s.push('*');
    }
    s
  }
}

/// For a rule and tokenized input, replace terminals by spans in all
/// consistent ways (`make_rule_instances`/`make_rule_instances_from_args`/
/// `make_rule_instances_from_members`).
fn make_rule_instances(grammar: &Grammar, rule_id: RuleId, inp: &[String]) -> Vec<RuleInstance> {
  let rule = grammar.rule(rule_id);
  let empty = LhsInstance::new(rule.lhs_nont.clone());
  instances_from_args(empty, &rule.args, inp, 0)
    .into_iter()
    .filter(|lhs| lhs.consistent())
    .map(|lhs| RuleInstance { rule_id, lhs, dot: 0 })
    .collect()
}

fn instances_from_args(
  instance: LhsInstance,
  args: &[Vec<LcfrsElement>],
  inp: &[String],
  pos: usize,
) -> Vec<LhsInstance> {
  let Some((first_arg, rest_args)) = args.split_first() else {
    return vec![instance];
  };
  let mut instance = instance;
  instance.add_arg();
  if first_arg.is_empty() {
    let mut out = Vec::new();
    for i in pos..=inp.len() {
      let mut new_instance = instance.clone();
      new_instance.add_mem(ArgMember::Span(Span { low: i, high: i }));
      out.extend(instances_from_args(new_instance, rest_args, inp, i));
    }
    out
  } else {
    instances_from_members(instance, first_arg, rest_args, inp, pos)
  }
}

fn instances_from_members(
  instance: LhsInstance,
  members: &[LcfrsElement],
  args: &[Vec<LcfrsElement>],
  inp: &[String],
  pos: usize,
) -> Vec<LhsInstance> {
  let Some((mem, rest_mems)) = members.split_first() else {
    return instances_from_args(instance, args, inp, pos);
  };
  match mem {
    LcfrsElement::Terminal(t) => {
      let mut out = Vec::new();
      for i in pos..inp.len() {
        if &inp[i] == t {
          let mut new_instance = instance.clone();
          new_instance.add_mem(ArgMember::Span(Span { low: i, high: i + 1 }));
          if new_instance.consistent() {
            out.extend(instances_from_members(new_instance, rest_mems, args, inp, i + 1));
          }
        }
      }
      out
    }
    LcfrsElement::Var(v) => {
      let mut instance = instance;
      instance.add_mem(ArgMember::Var(*v));
      instances_from_members(instance, rest_mems, args, inp, pos)
    }
  }
}

enum AgendaItem {
  Complete(LhsInstance),
  Partial(RuleInstance),
}

/// The rule side of a `Combine` trace entry: either a previously
/// recorded partial item (look up its own trace further) or a brand
/// new rule instance at dot 0, which is its own base case (weighted by
/// the rule itself, per original `__combine`'s `rule_trace` argument
/// being either a trace key or the bare rule).
#[derive(Debug, Clone)]
enum RuleTrace {
  Key(String),
  Fresh(RuleId),
}

/// Provenance of a recorded item: either a lexical/epsilon seed (the
/// base case, weighted by the rule itself) or the combination of an
/// earlier rule instance with a completed nonterminal item, both
/// identified by their own trace keys.
#[derive(Debug, Clone)]
enum TraceEntry {
  Seed(RuleId),
  Combine(RuleTrace, String),
}

/// One node of a best derivation: a grammar rule together with the
/// subderivations for each of its RHS members, in order. Spans are not
/// stored here — they are fully determined by rule structure and are
/// recomputed by `evaluate` from the shape of this tree alone.
#[derive(Debug, Clone)]
pub struct Derivation {
  pub rule_id: RuleId,
  pub children: Vec<Derivation>,
}

/// Parses `inp` (already terminal-labeled, e.g. via
/// `TerminalLabeling::prepare_parser_input`) against `grammar`, building
/// the full chart eagerly on construction (spec §4.E).
pub struct ChartParser<'g> {
  grammar: &'g Grammar,
  inp: Vec<String>,
  nont_items: HashMap<String, Vec<LhsInstance>>,
  rule_items: HashMap<String, Vec<RuleInstance>>,
  agenda: Vec<AgendaItem>,
  agenda_set: HashSet<String>,
  trace: HashMap<String, Vec<TraceEntry>>,
}

impl<'g> ChartParser<'g> {
  pub fn new(grammar: &'g Grammar, inp: Vec<String>) -> Self {
    let mut parser = Self {
      grammar,
      inp,
      nont_items: HashMap::new(),
      rule_items: HashMap::new(),
      agenda: Vec::new(),
      agenda_set: HashSet::new(),
      trace: HashMap::new(),
    };
    parser.parse();
    parser
  }

  fn parse(&mut self) {
    let inp = self.inp.clone();
    for &rule_id in self.grammar.epsilon_rules() {
      for inst in make_rule_instances(self.grammar, rule_id, &inp) {
        self.record_item(inst, TraceEntry::Seed(rule_id));
      }
    }
    let terms: HashSet<&str> = inp.iter().map(String::as_str).collect();
    for term in terms {
      for &rule_id in self.grammar.lex_rules(term) {
        for inst in make_rule_instances(self.grammar, rule_id, &inp) {
          self.record_item(inst, TraceEntry::Seed(rule_id));
        }
      }
    }
    let mut popped = 0usize;
    while let Some(item) = self.agenda.pop() {
      popped += 1;
      if popped % 1000 == 0 {
        tracing::debug!(popped, agenda_len = self.agenda.len(), "agenda milestone");
      }
      match item {
        AgendaItem::Complete(lhs) => {
          let low = lhs.left_position();
          let nont = lhs.nont.clone();
          let key = format!("{} {}", low, nont);
          self.nont_items.entry(key.clone()).or_default().push(lhs.clone());
          if let Some(rule_items) = self.rule_items.get(&key) {
            for rule_item in rule_items.clone() {
              let rule_trace = RuleTrace::Key(rule_item.key(self.grammar));
              self.combine(&rule_item, &lhs, rule_trace);
            }
          }
          for &rule_id in self.grammar.nont_corner_of(&nont) {
            for inst in make_rule_instances(self.grammar, rule_id, &inp) {
              self.combine(&inst, &lhs, RuleTrace::Fresh(rule_id));
            }
          }
        }
        AgendaItem::Partial(item) => {
          let inp_len = inp.len();
          let (low, high) = item.next_member_bounds(self.grammar, inp_len);
          let nont = item.next_nont(self.grammar).to_string();
          for pos in low..=high {
            let key = format!("{} {}", pos, nont);
            self.rule_items.entry(key.clone()).or_default().push(item.clone());
            if let Some(nont_items) = self.nont_items.get(&key) {
              for nont_item in nont_items.clone() {
                let rule_trace = RuleTrace::Key(item.key(self.grammar));
                self.combine(&item, &nont_item, rule_trace);
              }
            }
          }
        }
      }
    }
  }

  /// Advances `rule_item`'s dot past its next member using `nont_item`'s
  /// spans, recording the result if the resolved variables stay
  /// consistent (`__combine`).
  fn combine(&mut self, rule_item: &RuleInstance, nont_item: &LhsInstance, rule_trace: RuleTrace) {
    let mut lhs = rule_item.lhs.clone();
    let dot = rule_item.dot;
    for i in 0..nont_item.fanout() {
      let span = match nont_item.arg(i)[0] {
        ArgMember::Span(s) => s,
        ArgMember::Var(_) => panic!("combine against unresolved nont item"),
      };
      lhs.replace(dot, i, span);
    }
    let advanced = RuleInstance {
      rule_id: rule_item.rule_id,
      lhs,
      dot: dot + 1,
    };
    if advanced.consistent() {
      let nont_trace = nont_item.to_string();
      self.record_item(advanced, TraceEntry::Combine(rule_trace, nont_trace));
    }
  }

  fn record_item(&mut self, item: RuleInstance, trace: TraceEntry) {
    if item.complete(self.grammar) {
      let mut lhs = item.lhs;
      lhs.collapse();
      let key = lhs.to_string();
      if key == self.start_key() {
        tracing::debug!(%key, "goal found");
      }
      if self.agenda_set.insert(key.clone()) {
        self.agenda.push(AgendaItem::Complete(lhs));
      }
      self.trace.entry(key).or_default().push(trace);
    } else {
      let key = item.key(self.grammar);
      if self.agenda_set.insert(key.clone()) {
        self.agenda.push(AgendaItem::Partial(item));
      }
      self.trace.entry(key).or_default().push(trace);
    }
  }

  fn start_key(&self) -> String {
    let nont = self.grammar.start().unwrap_or("");
    format!("{}([{}-{}])", nont, 0, self.inp.len())
  }

  /// Whether the whole input derives from the grammar's start symbol.
  pub fn recognized(&self) -> bool {
    self
      .trace
      .get(&self.start_key())
      .is_some_and(|entries| !entries.is_empty())
  }

  fn entry_weight(&self, entry: &TraceEntry, memo: &mut HashMap<String, f64>) -> f64 {
    match entry {
      TraceEntry::Seed(rule_id) => -self.grammar.rule(*rule_id).weight.ln(),
      TraceEntry::Combine(rule_trace, nont_key) => {
        let rule_weight = match rule_trace {
          RuleTrace::Key(key) => self.find_best_from(key, memo),
          RuleTrace::Fresh(rule_id) => -self.grammar.rule(*rule_id).weight.ln(),
        };
        rule_weight + self.find_best_from(nont_key, memo)
      }
    }
  }

  /// Weight (negative log probability) of the best subderivation rooted
  /// at `key`, top-down with a cycle-safe infinity sentinel
  /// (`__find_best_from`).
  fn find_best_from(&self, key: &str, memo: &mut HashMap<String, f64>) -> f64 {
    if let Some(&w) = memo.get(key) {
      return w;
    }
    memo.insert(key.to_string(), f64::MAX);
    let best = self
      .trace
      .get(key)
      .into_iter()
      .flatten()
      .map(|entry| self.entry_weight(entry, memo))
      .fold(f64::MAX, f64::min);
    memo.insert(key.to_string(), best);
    best
  }

  /// Weight of the best derivation, or `None` if the input is not
  /// recognized.
  pub fn best_weight(&self) -> Option<f64> {
    if !self.recognized() {
      return None;
    }
    let mut memo = HashMap::new();
    Some(self.find_best_from(&self.start_key(), &mut memo))
  }

  fn der_tree(&self, key: &str, children: Vec<Derivation>, w: f64, memo: &mut HashMap<String, f64>) -> Derivation {
    let entries = self.trace.get(key).expect("backtrace failed: missing trace");
    for entry in entries {
      if self.entry_weight(entry, memo) == w {
        return match entry {
          TraceEntry::Seed(rule_id) => Derivation {
            rule_id: *rule_id,
            children,
          },
          TraceEntry::Combine(rule_trace, nont_key) => {
            let w2 = self.find_best_from(nont_key, memo);
            let child = self.der_tree(nont_key, Vec::new(), w2, memo);
            let mut combined = vec![child];
            combined.extend(children);
            match rule_trace {
              RuleTrace::Key(key) => {
                let w1 = self.find_best_from(key, memo);
                self.der_tree(key, combined, w1, memo)
              }
              RuleTrace::Fresh(rule_id) => Derivation {
                rule_id: *rule_id,
                children: combined,
              },
            }
          }
        };
      }
    }
    panic!("backtrace failed for {}", key)
  }

  /// Reconstructs the best derivation, or `None` if unrecognized.
  pub fn best_derivation(&self) -> Option<Derivation> {
    if !self.recognized() {
      return None;
    }
    let mut memo = HashMap::new();
    let w = self.find_best_from(&self.start_key(), &mut memo);
    Some(self.der_tree(&self.start_key(), Vec::new(), w, &mut memo))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbols::{DcpRule, DcpTermOrRef, DcpVar};

  fn push_lex(g: &mut Grammar, nont: &str, terminal: &str) {
    g.add_rule(
      nont,
      vec![vec![LcfrsElement::Terminal(terminal.into())]],
      vec![],
      1.0,
      vec![DcpRule::new(
        DcpVar::new(-1, 0),
        vec![DcpTermOrRef::Index(crate::symbols::DcpIndex::new(0, None))],
      )],
    )
    .unwrap();
  }

  /// `S -> A` where `A` has fanout 2, `B`/`C` fanout 1 each, so that
  /// combining `A`'s two RHS children exercises `next_member_bounds`
  /// across a genuinely discontinuous argument tuple.
  #[test]
  fn fanout_two_recognizes_discontinuous_yield() {
    let mut g = Grammar::new();
    g.add_rule(
      "S",
      vec![vec![
        LcfrsElement::Var(LcfrsVar::new(0, 0)),
        LcfrsElement::Var(LcfrsVar::new(0, 1)),
      ]],
      vec!["A".into()],
      1.0,
      vec![],
    )
    .unwrap();
    g.add_rule(
      "A",
      vec![
        vec![LcfrsElement::Var(LcfrsVar::new(0, 0))],
        vec![LcfrsElement::Var(LcfrsVar::new(1, 0))],
      ],
      vec!["B".into(), "C".into()],
      1.0,
      vec![],
    )
    .unwrap();
    push_lex(&mut g, "B", "a");
    push_lex(&mut g, "C", "b");

    let inp = vec!["a".to_string(), "b".to_string()];
    let parser = ChartParser::new(&g, inp);
    assert!(parser.recognized());
  }

  #[test]
  fn mismatched_input_not_recognized() {
    let mut g = Grammar::new();
    g.add_rule(
      "S",
      vec![vec![LcfrsElement::Var(LcfrsVar::new(0, 0))]],
      vec!["A".into()],
      1.0,
      vec![],
    )
    .unwrap();
    push_lex(&mut g, "A", "a");
    let parser = ChartParser::new(&g, vec!["b".to_string()]);
    assert!(!parser.recognized());
    assert!(parser.best_weight().is_none());
  }

  /// Fanout-3 LHS: `S -> A B` where `A` alone supplies three
  /// discontinuous arguments that must interleave with `B`'s single
  /// span, directly testing substitution across three-way argument
  /// tuples (spec open question on fanout > 2 coverage).
  #[test]
  fn fanout_three_combine_and_best_weight() {
    let mut g = Grammar::new();
    g.add_rule(
      "S",
      vec![vec![
        LcfrsElement::Var(LcfrsVar::new(0, 0)),
        LcfrsElement::Terminal("x".into()),
        LcfrsElement::Var(LcfrsVar::new(0, 1)),
        LcfrsElement::Var(LcfrsVar::new(0, 2)),
      ]],
      vec!["A".into()],
      1.0,
      vec![],
    )
    .unwrap();
    g.add_rule(
      "A",
      vec![
        vec![LcfrsElement::Terminal("a".into())],
        vec![LcfrsElement::Terminal("b".into())],
        vec![LcfrsElement::Terminal("c".into())],
      ],
      vec![],
      0.5,
      vec![],
    )
    .unwrap();
    assert_eq!(g.fanout("A"), Some(3));

    let inp = vec![
      "a".to_string(),
      "x".to_string(),
      "b".to_string(),
      "c".to_string(),
    ];
    let parser = ChartParser::new(&g, inp);
    assert!(parser.recognized());
    let w = parser.best_weight().unwrap();
    assert!((w - (-(0.5f64).ln())).abs() < 1e-9);

    let der = parser.best_derivation().unwrap();
    assert_eq!(g.rule(der.rule_id).lhs_nont, "S");
    assert_eq!(der.children.len(), 1);
    assert_eq!(g.rule(der.children[0].rule_id).lhs_nont, "A");
  }

  #[test]
  fn best_derivation_picks_cheaper_alternative() {
    let mut g = Grammar::new();
    g.add_rule(
      "S",
      vec![vec![LcfrsElement::Var(LcfrsVar::new(0, 0))]],
      vec!["A".into()],
      1.0,
      vec![],
    )
    .unwrap();
    g.add_rule(
      "A",
      vec![vec![LcfrsElement::Terminal("a".into())]],
      vec![],
      0.9,
      vec![],
    )
    .unwrap();
    // A second way to recognize "a" under A, but less likely.
    g.add_rule(
      "A",
      vec![vec![LcfrsElement::Var(LcfrsVar::new(0, 0))]],
      vec!["A2".into()],
      0.1,
      vec![],
    )
    .unwrap();
    g.add_rule(
      "A2",
      vec![vec![LcfrsElement::Terminal("a".into())]],
      vec![],
      1.0,
      vec![],
    )
    .unwrap();

    let parser = ChartParser::new(&g, vec!["a".to_string()]);
    let der = parser.best_derivation().unwrap();
    assert_eq!(g.rule(der.rule_id).lhs_nont, "S");
    assert_eq!(g.rule(der.children[0].rule_id).lhs_nont, "A");
    assert!(der.children[0].children.is_empty(), "should pick the direct 0.9 rule, not the 0.1*1.0 chain");
  }
}
