//! Typed symbols used by LCFRS rules and the DCP component synchronized
//! with them (spec §4.A).

use std::fmt;

/// `<i,j>` — the j-th argument of the i-th RHS nonterminal in an LCFRS
/// rule. `i == -1` is reserved for the LHS and only occurs inside DCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LcfrsVar {
  pub mem: i32,
  pub arg: usize,
}

impl LcfrsVar {
  pub fn new(mem: i32, arg: usize) -> Self {
    Self { mem, arg }
  }
}

impl fmt::Display for LcfrsVar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<{},{}>", self.mem, self.arg)
  }
}

/// One element of an LCFRS argument sequence: either a literal terminal
/// or a reference to an RHS member's argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LcfrsElement {
  Terminal(String),
  Var(LcfrsVar),
}

impl fmt::Display for LcfrsElement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Terminal(s) => write!(f, "{}", s),
      Self::Var(v) => write!(f, "{}", v),
    }
  }
}

/// `<i,j>` in DCP: i = -1 is the LHS attribute, i >= 0 is the attribute of
/// the i-th RHS nonterminal, j indexes the attribute within that member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DcpVar {
  pub mem: i32,
  pub arg: usize,
}

impl DcpVar {
  pub fn new(mem: i32, arg: usize) -> Self {
    Self { mem, arg }
  }

  pub fn is_lhs(&self) -> bool {
    self.mem < 0
  }
}

impl fmt::Display for DcpVar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.mem < 0 {
      write!(f, "<{}>", self.arg)
    } else {
      write!(f, "<{},{}>", self.mem, self.arg)
    }
  }
}

/// Reference to the k-th terminal consumed by the LCFRS component of the
/// same rule, counted left-to-right. An optional edge label is carried
/// through to the evaluated output tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DcpIndex {
  pub index: usize,
  pub edge_label: Option<String>,
}

impl DcpIndex {
  pub fn new(index: usize, edge_label: Option<String>) -> Self {
    Self { index, edge_label }
  }
}

impl fmt::Display for DcpIndex {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}]", self.index)
  }
}

/// A `DcpIndex` resolved to a concrete input position during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DcpPos(pub usize);

impl fmt::Display for DcpPos {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}]", self.0)
  }
}

/// The head of a `DcpTerm`: either a plain label (the common case, a
/// category or string constant) or a `DcpIndex` — used by dependency
/// induction's leaf rule, where a terminal position doubles as the head
/// of a node carrying the word's already-evaluated dependents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DcpHead {
  Label(String),
  Index(DcpIndex),
}

impl fmt::Display for DcpHead {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Label(s) => write!(f, "{}", s),
      Self::Index(i) => write!(f, "{}", i),
    }
  }
}

impl From<String> for DcpHead {
  fn from(s: String) -> Self {
    Self::Label(s)
  }
}

impl From<&str> for DcpHead {
  fn from(s: &str) -> Self {
    Self::Label(s.to_string())
  }
}

impl From<DcpIndex> for DcpHead {
  fn from(i: DcpIndex) -> Self {
    Self::Index(i)
  }
}

/// A labeled tree node being built by the DCP component. Children may
/// themselves be terms, variables (to be substituted), or indices (to be
/// resolved to input positions).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DcpTerm {
  pub head: DcpHead,
  pub edge_label: Option<String>,
  pub children: Vec<DcpTermOrRef>,
}

impl DcpTerm {
  pub fn new(head: impl Into<DcpHead>, children: Vec<DcpTermOrRef>) -> Self {
    Self {
      head: head.into(),
      edge_label: None,
      children,
    }
  }

  pub fn with_edge_label(mut self, edge_label: Option<String>) -> Self {
    self.edge_label = edge_label;
    self
  }
}

impl fmt::Display for DcpTerm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}(", self.head)?;
    for (i, c) in self.children.iter().enumerate() {
      if i > 0 {
        write!(f, " ")?;
      }
      write!(f, "{}", c)?;
    }
    write!(f, ")")
  }
}

/// An element on the RHS of a `DcpRule`, or a child of a `DcpTerm`: any of
/// the three DCP building blocks before evaluation resolves variables and
/// indices away.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DcpTermOrRef {
  Term(DcpTerm),
  Var(DcpVar),
  Index(DcpIndex),
}

impl fmt::Display for DcpTermOrRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Term(t) => write!(f, "{}", t),
      Self::Var(v) => write!(f, "{}", v),
      Self::Index(i) => write!(f, "{}", i),
    }
  }
}

/// Defines the value of one DCP attribute: `lhs = rhs…`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DcpRule {
  pub lhs: DcpVar,
  pub rhs: Vec<DcpTermOrRef>,
}

impl DcpRule {
  pub fn new(lhs: DcpVar, rhs: Vec<DcpTermOrRef>) -> Self {
    Self { lhs, rhs }
  }
}

impl fmt::Display for DcpRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}=", self.lhs)?;
    for (i, t) in self.rhs.iter().enumerate() {
      if i > 0 {
        write!(f, " ")?;
      }
      write!(f, "{}", t)?;
    }
    Ok(())
  }
}

pub fn dcp_rules_to_string(rules: &[DcpRule]) -> String {
  rules
    .iter()
    .map(|r| r.to_string())
    .collect::<Vec<_>>()
    .join("; ")
}

/// Head of an evaluated `DcpValue::Term`: a plain label, or a position
/// resolved from a `DcpHead::Index` (dependency leaf rules).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DcpValueHead {
  Label(String),
  Pos(DcpPos),
}

/// A value produced by evaluating the DCP component: either an internal
/// node of the output tree, or a leaf resolved to an input position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DcpValue {
  Term {
    head: DcpValueHead,
    edge_label: Option<String>,
    children: Vec<DcpValue>,
  },
  Pos(DcpPos),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_matches_grammar_text_format() {
    assert_eq!(LcfrsVar::new(0, 1).to_string(), "<0,1>");
    assert_eq!(DcpVar::new(-1, 0).to_string(), "<0>");
    assert_eq!(DcpVar::new(2, 3).to_string(), "<2,3>");
    assert_eq!(DcpIndex::new(4, None).to_string(), "[4]");

    let term = DcpTerm::new(
      "NP",
      vec![
        DcpTermOrRef::Index(DcpIndex::new(0, None)),
        DcpTermOrRef::Var(DcpVar::new(0, 0)),
      ],
    );
    assert_eq!(term.to_string(), "NP([0] <0,0>)");
  }
}
