//! Tree contract consumed by induction (spec §6 "Tree contract"), concrete
//! constituent/dependency trees, and the evaluator's output `HybridTree`.

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

/// Form/POS-or-category/edge-label/morph carried by one tree node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Token {
  pub form: String,
  pub pos: String,
  pub edge_label: Option<String>,
  pub morph: Option<String>,
}

impl Token {
  pub fn new(form: impl Into<String>, pos: impl Into<String>) -> Self {
    Self {
      form: form.into(),
      pos: pos.into(),
      edge_label: None,
      morph: None,
    }
  }

  pub fn with_edge(mut self, edge_label: impl Into<String>) -> Self {
    self.edge_label = Some(edge_label.into());
    self
  }
}

/// Id-addressable tree, consumed by the inducer (spec §6).
pub trait Tree {
  fn root(&self) -> NodeId;
  fn children(&self, id: NodeId) -> &[NodeId];
  fn parent(&self, id: NodeId) -> Option<NodeId>;
  fn node_token(&self, id: NodeId) -> &Token;
  /// Category/nonterminal label if internal, or the leaf's POS.
  fn node_label(&self, id: NodeId) -> &str;
  fn fringe(&self, id: NodeId) -> BTreeSet<usize>;
  fn id_yield(&self) -> Vec<NodeId>;
  fn token_yield(&self) -> Vec<&Token>;
  fn is_leaf(&self, id: NodeId) -> bool;
  fn leaf_index(&self, id: NodeId) -> Option<usize>;
}

#[derive(Debug, Clone)]
enum ConstituentNode {
  Internal {
    category: String,
    edge_label: Option<String>,
    children: Vec<NodeId>,
  },
  Leaf {
    token: Token,
    position: usize,
  },
}

/// A phrase-structure tree: internal nodes labeled by category, leaves
/// carrying a terminal token, both addressable by [`NodeId`].
#[derive(Debug, Clone)]
pub struct ConstituentTree {
  nodes: Vec<ConstituentNode>,
  root: NodeId,
  parents: Vec<Option<NodeId>>,
  leaf_order: Vec<NodeId>,
}

#[derive(Default)]
pub struct ConstituentTreeBuilder {
  nodes: Vec<ConstituentNode>,
  parents: Vec<Option<NodeId>>,
}

impl ConstituentTreeBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn leaf(&mut self, token: Token, position: usize) -> NodeId {
    let id = NodeId(self.nodes.len() as u32);
    self.nodes.push(ConstituentNode::Leaf { token, position });
    self.parents.push(None);
    id
  }

  pub fn internal(
    &mut self,
    category: impl Into<String>,
    edge_label: Option<String>,
    children: Vec<NodeId>,
  ) -> NodeId {
    let id = NodeId(self.nodes.len() as u32);
    for &c in &children {
      self.parents[c.0 as usize] = Some(id);
    }
    self.nodes.push(ConstituentNode::Internal {
      category: category.into(),
      edge_label,
      children,
    });
    self.parents.push(None);
    id
  }

  pub fn build(self, root: NodeId) -> ConstituentTree {
    let mut leaves: Vec<(usize, NodeId)> = self
      .nodes
      .iter()
      .enumerate()
      .filter_map(|(i, n)| match n {
        ConstituentNode::Leaf { position, .. } => Some((*position, NodeId(i as u32))),
        _ => None,
      })
      .collect();
    leaves.sort_by_key(|&(pos, _)| pos);
    let leaf_order = leaves.into_iter().map(|(_, id)| id).collect();
    ConstituentTree {
      nodes: self.nodes,
      root,
      parents: self.parents,
      leaf_order,
    }
  }
}

impl ConstituentTree {
  fn fringe_recur(&self, id: NodeId, out: &mut BTreeSet<usize>) {
    match &self.nodes[id.0 as usize] {
      ConstituentNode::Leaf { position, .. } => {
        out.insert(*position);
      }
      ConstituentNode::Internal { children, .. } => {
        for &c in children {
          self.fringe_recur(c, out);
        }
      }
    }
  }

  pub fn edge_label(&self, id: NodeId) -> Option<&str> {
    match &self.nodes[id.0 as usize] {
      ConstituentNode::Internal { edge_label, .. } => edge_label.as_deref(),
      ConstituentNode::Leaf { token, .. } => token.edge_label.as_deref(),
    }
  }
}

impl Tree for ConstituentTree {
  fn root(&self) -> NodeId {
    self.root
  }

  fn children(&self, id: NodeId) -> &[NodeId] {
    match &self.nodes[id.0 as usize] {
      ConstituentNode::Internal { children, .. } => children,
      ConstituentNode::Leaf { .. } => &[],
    }
  }

  fn parent(&self, id: NodeId) -> Option<NodeId> {
    self.parents[id.0 as usize]
  }

  fn node_token(&self, id: NodeId) -> &Token {
    match &self.nodes[id.0 as usize] {
      ConstituentNode::Leaf { token, .. } => token,
      ConstituentNode::Internal { .. } => panic!("node_token called on internal node"),
    }
  }

  fn node_label(&self, id: NodeId) -> &str {
    match &self.nodes[id.0 as usize] {
      ConstituentNode::Internal { category, .. } => category,
      ConstituentNode::Leaf { token, .. } => &token.pos,
    }
  }

  fn fringe(&self, id: NodeId) -> BTreeSet<usize> {
    let mut out = BTreeSet::new();
    self.fringe_recur(id, &mut out);
    out
  }

  fn id_yield(&self) -> Vec<NodeId> {
    self.leaf_order.clone()
  }

  fn token_yield(&self) -> Vec<&Token> {
    self
      .leaf_order
      .iter()
      .map(|&id| self.node_token(id))
      .collect()
  }

  fn is_leaf(&self, id: NodeId) -> bool {
    matches!(self.nodes[id.0 as usize], ConstituentNode::Leaf { .. })
  }

  fn leaf_index(&self, id: NodeId) -> Option<usize> {
    match &self.nodes[id.0 as usize] {
      ConstituentNode::Leaf { position, .. } => Some(*position),
      ConstituentNode::Internal { .. } => None,
    }
  }
}

/// A dependency tree: node ids are yield positions (0-based), each with a
/// token and a parent (`None` for the root).
#[derive(Debug, Clone)]
pub struct DependencyTree {
  tokens: Vec<Token>,
  parents: Vec<Option<NodeId>>,
  children: Vec<Vec<NodeId>>,
  root: NodeId,
}

impl DependencyTree {
  /// `edges` maps a node position to its parent position (`None` for
  /// root); `tokens[i]` is the token at position `i`.
  pub fn new(tokens: Vec<Token>, edges: Vec<Option<usize>>) -> Self {
    assert_eq!(tokens.len(), edges.len());
    let n = tokens.len();
    let parents: Vec<Option<NodeId>> = edges.iter().map(|e| e.map(|p| NodeId(p as u32))).collect();
    let mut children = vec![Vec::new(); n];
    let mut root = None;
    for (i, p) in parents.iter().enumerate() {
      match p {
        Some(parent) => children[parent.0 as usize].push(NodeId(i as u32)),
        None => root = Some(NodeId(i as u32)),
      }
    }
    for c in &mut children {
      c.sort();
    }
    Self {
      tokens,
      parents,
      children,
      root: root.expect("dependency tree must have exactly one root"),
    }
  }
}

impl Tree for DependencyTree {
  fn root(&self) -> NodeId {
    self.root
  }

  fn children(&self, id: NodeId) -> &[NodeId] {
    &self.children[id.0 as usize]
  }

  fn parent(&self, id: NodeId) -> Option<NodeId> {
    self.parents[id.0 as usize]
  }

  fn node_token(&self, id: NodeId) -> &Token {
    &self.tokens[id.0 as usize]
  }

  fn node_label(&self, id: NodeId) -> &str {
    &self.tokens[id.0 as usize].pos
  }

  fn fringe(&self, id: NodeId) -> BTreeSet<usize> {
    let mut out = BTreeSet::new();
    let mut stack = vec![id];
    while let Some(n) = stack.pop() {
      out.insert(n.0 as usize);
      stack.extend(self.children[n.0 as usize].iter().copied());
    }
    out
  }

  fn id_yield(&self) -> Vec<NodeId> {
    (0..self.tokens.len()).map(|i| NodeId(i as u32)).collect()
  }

  fn token_yield(&self) -> Vec<&Token> {
    self.tokens.iter().collect()
  }

  fn is_leaf(&self, id: NodeId) -> bool {
    self.children[id.0 as usize].is_empty()
  }

  fn leaf_index(&self, id: NodeId) -> Option<usize> {
    Some(id.0 as usize)
  }
}

/// Groups `node ids` in `positions` that are "exposed" (their test
/// predicate holds) into maximal runs of consecutive ids, mirroring
/// `partitioning::join_spans` but over node ids rather than positions.
fn group_consecutive(mut ids: Vec<usize>) -> Vec<Vec<usize>> {
  ids.sort_unstable();
  let mut groups: Vec<Vec<usize>> = Vec::new();
  for id in ids {
    match groups.last_mut() {
      Some(last) if *last.last().unwrap() + 1 == id => last.push(id),
      _ => groups.push(vec![id]),
    }
  }
  groups
}

/// `top_max(T, P)`: maximal id-sequences of nodes in `P` whose parent lies
/// outside `P` (the exposed tops of the fragment).
pub fn top_max(tree: &DependencyTree, positions: &BTreeSet<usize>) -> Vec<Vec<usize>> {
  let exposed: Vec<usize> = positions
    .iter()
    .copied()
    .filter(|&p| match tree.parent(NodeId(p as u32)) {
      Some(parent) => !positions.contains(&(parent.0 as usize)),
      None => true,
    })
    .collect();
  group_consecutive(exposed)
}

/// `bottom_max(T, P)`: maximal id-sequences of children of `P`-nodes that
/// themselves lie outside `P` (the exposed bottoms of the fragment).
pub fn bottom_max(tree: &DependencyTree, positions: &BTreeSet<usize>) -> Vec<Vec<usize>> {
  let mut outside_children = Vec::new();
  for &p in positions {
    for &c in tree.children(NodeId(p as u32)) {
      if !positions.contains(&(c.0 as usize)) {
        outside_children.push(c.0 as usize);
      }
    }
  }
  group_consecutive(outside_children)
}

/// Output tree built by the DCP evaluator (spec §3 "HybridTree").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HybridNode {
  Internal {
    label: String,
    edge_label: Option<String>,
    children: Vec<HybridNode>,
  },
  Leaf {
    position: usize,
    label: String,
    edge_label: Option<String>,
  },
}

impl HybridNode {
  pub(crate) fn leaves_into(&self, out: &mut Vec<usize>) {
    match self {
      HybridNode::Leaf { position, .. } => out.push(*position),
      HybridNode::Internal { children, .. } => {
        for c in children {
          c.leaves_into(out);
        }
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HybridTree {
  pub top_level: Vec<HybridNode>,
  pub disconnected_leaves: BTreeSet<usize>,
}

impl HybridTree {
  pub fn disconnected_leaves(&self) -> &BTreeSet<usize> {
    &self.disconnected_leaves
  }

  /// Full yield order (main tree leaves plus disconnected leaves),
  /// preserving total position order.
  pub fn yield_positions(&self) -> Vec<usize> {
    let mut main = Vec::new();
    for n in &self.top_level {
      n.leaves_into(&mut main);
    }
    let mut all: BTreeSet<usize> = main.into_iter().collect();
    all.extend(self.disconnected_leaves.iter().copied());
    all.into_iter().collect()
  }
}

impl fmt::Display for HybridNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      HybridNode::Leaf { position, label, .. } => write!(f, "{}@{}", label, position),
      HybridNode::Internal { label, children, .. } => {
        write!(f, "{}(", label)?;
        for (i, c) in children.iter().enumerate() {
          if i > 0 {
            write!(f, " ")?;
          }
          write!(f, "{}", c)?;
        }
        write!(f, ")")
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_constituent_tree() -> ConstituentTree {
    let mut b = ConstituentTreeBuilder::new();
    let piet = b.leaf(Token::new("Piet", "N"), 0);
    let np = b.internal("NP", None, vec![piet]);
    let root = b.internal("S", None, vec![np]);
    b.build(root)
  }

  #[test]
  fn constituent_tree_fringe_and_yield() {
    let t = sample_constituent_tree();
    assert_eq!(t.fringe(t.root()), BTreeSet::from([0]));
    assert_eq!(t.token_yield().len(), 1);
    assert_eq!(t.token_yield()[0].form, "Piet");
  }

  fn sample_dependency_tree() -> DependencyTree {
    let tokens = vec![
      Token::new("the", "Det"),
      Token::new("cat", "N"),
      Token::new("sat", "V"),
      Token::new("quickly", "Adv"),
    ];
    // root = 2 ("sat"), children 0, 1, 3
    DependencyTree::new(tokens, vec![Some(2), Some(2), None, Some(2)])
  }

  #[test]
  fn top_max_groups_exposed_nodes() {
    let t = sample_dependency_tree();
    let p: BTreeSet<usize> = [0, 1].into_iter().collect();
    let tops = top_max(&t, &p);
    assert_eq!(tops, vec![vec![0, 1]]);
  }

  #[test]
  fn bottom_max_groups_external_children() {
    let t = sample_dependency_tree();
    let p: BTreeSet<usize> = [2].into_iter().collect();
    let bottoms = bottom_max(&t, &p);
    assert_eq!(bottoms, vec![vec![0, 1], vec![3]]);
  }
}
