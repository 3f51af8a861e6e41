//! Recursive partitioning of a tree's yield positions (spec §4.C).
//!
//! A partitioning is a finite tree over `{0,...,n-1}` whose children's
//! root-sets are pairwise disjoint and union back to the parent's. It
//! drives rule extraction in `induction`.

use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitioning {
  pub positions: BTreeSet<usize>,
  pub children: Vec<Partitioning>,
}

impl Partitioning {
  pub fn leaf(pos: usize) -> Self {
    Self {
      positions: BTreeSet::from([pos]),
      children: Vec::new(),
    }
  }

  pub fn node(positions: BTreeSet<usize>, children: Vec<Partitioning>) -> Self {
    Self { positions, children }
  }

  pub fn is_leaf(&self) -> bool {
    self.children.is_empty()
  }

  pub fn fanout(&self) -> usize {
    join_spans(&self.positions).len()
  }
}

/// Returns the sorted list of maximal contiguous `[low, high]` spans
/// covering `positions`. Idempotent: `join_spans(flatten(join_spans(p)))
/// == join_spans(p)`.
pub fn join_spans(positions: &BTreeSet<usize>) -> Vec<(usize, usize)> {
  let mut spans = Vec::new();
  let mut iter = positions.iter().copied();
  let Some(first) = iter.next() else {
    return spans;
  };
  let mut low = first;
  let mut high = first;
  for p in iter {
    if p == high + 1 {
      high = p;
    } else {
      spans.push((low, high));
      low = p;
      high = p;
    }
  }
  spans.push((low, high));
  spans
}

/// Left-branching partitioning of `{0,...,n-1}`.
pub fn left_branching(n: usize) -> Partitioning {
  fn build(low: usize, high: usize) -> Partitioning {
    let positions: BTreeSet<usize> = (low..=high).collect();
    if low == high {
      return Partitioning::node(positions, Vec::new());
    }
    let left = Partitioning::node(BTreeSet::from([low]), Vec::new());
    let rest = build(low + 1, high);
    Partitioning::node(positions, vec![left, rest])
  }
  build(0, n - 1)
}

/// Right-branching partitioning of `{0,...,n-1}`.
pub fn right_branching(n: usize) -> Partitioning {
  fn build(low: usize, high: usize) -> Partitioning {
    let positions: BTreeSet<usize> = (low..=high).collect();
    if low == high {
      return Partitioning::node(positions, Vec::new());
    }
    let right = Partitioning::node(BTreeSet::from([high]), Vec::new());
    let rest = build(low, high - 1);
    Partitioning::node(positions, vec![rest, right])
  }
  build(0, n - 1)
}

/// Builds a partitioning node directly from a tree's own children: each
/// element of `child_positions` becomes one child partitioning, recursed
/// the same way. Used by "direct extraction".
pub fn from_children(positions: BTreeSet<usize>, children: Vec<Partitioning>) -> Partitioning {
  Partitioning::node(positions, children)
}

/// Tie-break policy used when a node's children must be merged to bring
/// every child's fanout down to the limit.
pub enum FanoutKPolicy<'a> {
  RightmostFirst,
  LeftToRight,
  Argmax,
  Random(u64),
  /// Prefers merging siblings whose combined position set, named by
  /// `namer`, already denotes a nonterminal in `existing`. Falls back to
  /// `RightmostFirst` if no candidate qualifies.
  NoNewNonterminal {
    namer: &'a dyn Fn(&BTreeSet<usize>) -> String,
    existing: &'a std::collections::HashSet<String>,
  },
}

struct Xorshift64(u64);

impl Xorshift64 {
  fn next(&mut self) -> u64 {
    let mut x = self.0;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    self.0 = x;
    x
  }
}

/// Rewrites `p` so that every node's fanout (including the root) is at
/// most `k`, merging siblings as needed per `policy`.
pub fn fanout_k_limit(p: &Partitioning, k: usize, policy: &FanoutKPolicy) -> Partitioning {
  let mut rng_state = Xorshift64(match policy {
    FanoutKPolicy::Random(seed) => *seed | 1,
    _ => 1,
  });
  limit_node(p, k, policy, &mut rng_state)
}

fn limit_node(
  p: &Partitioning,
  k: usize,
  policy: &FanoutKPolicy,
  rng: &mut Xorshift64,
) -> Partitioning {
  if p.is_leaf() {
    return p.clone();
  }
  let mut children = p.children.clone();
  while let Some(i) = children.iter().position(|c| c.fanout() > k) {
    let j = choose_merge_partner(&children, i, policy, rng);
    let (lo, hi) = if i < j { (i, j) } else { (j, i) };
    let merged_positions: BTreeSet<usize> = children[lo]
      .positions
      .union(&children[hi].positions)
      .copied()
      .collect();
    let mut merged_children = children[lo].children.clone();
    merged_children.extend(children[hi].children.clone());
    let merged = Partitioning::node(merged_positions, merged_children);
    children.remove(hi);
    children.remove(lo);
    children.insert(lo, merged);
  }
  let children = children
    .into_iter()
    .map(|c| limit_node(&c, k, policy, rng))
    .collect();
  Partitioning::node(p.positions.clone(), children)
}

fn choose_merge_partner(
  children: &[Partitioning],
  i: usize,
  policy: &FanoutKPolicy,
  rng: &mut Xorshift64,
) -> usize {
  let candidates: Vec<usize> = (0..children.len()).filter(|&j| j != i).collect();
  let score = |j: usize| -> usize {
    let merged: BTreeSet<usize> = children[i]
      .positions
      .union(&children[j].positions)
      .copied()
      .collect();
    join_spans(&merged).len()
  };
  match policy {
    FanoutKPolicy::RightmostFirst => *candidates.iter().max().unwrap(),
    FanoutKPolicy::LeftToRight => *candidates.iter().min().unwrap(),
    FanoutKPolicy::Argmax => *candidates
      .iter()
      .min_by_key(|&&j| score(j))
      .unwrap(),
    FanoutKPolicy::Random(_) => {
      let idx = (rng.next() as usize) % candidates.len();
      candidates[idx]
    }
    FanoutKPolicy::NoNewNonterminal { namer, existing } => {
      candidates
        .iter()
        .find(|&&j| {
          let merged: BTreeSet<usize> = children[i]
            .positions
            .union(&children[j].positions)
            .copied()
            .collect();
          existing.contains(&namer(&merged))
        })
        .copied()
        .unwrap_or_else(|| *candidates.iter().max().unwrap())
    }
  }
}

/// Fanout-1 limit: every partitioning node covers a contiguous span.
pub fn cfg(p: &Partitioning) -> Partitioning {
  fanout_k_limit(p, 1, &FanoutKPolicy::RightmostFirst)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn join_spans_is_idempotent_sorted_and_maximal() {
    let positions: BTreeSet<usize> = [0, 1, 2, 5, 6, 9].into_iter().collect();
    let spans = join_spans(&positions);
    assert_eq!(spans, vec![(0, 2), (5, 6), (9, 9)]);
    let flattened: BTreeSet<usize> = spans
      .iter()
      .flat_map(|&(lo, hi)| lo..=hi)
      .collect();
    assert_eq!(join_spans(&flattened), spans);
  }

  #[test]
  fn left_branching_shape() {
    let p = left_branching(3);
    assert_eq!(p.positions, BTreeSet::from([0, 1, 2]));
    assert_eq!(p.children.len(), 2);
    assert_eq!(p.children[0].positions, BTreeSet::from([0]));
    assert_eq!(p.children[1].positions, BTreeSet::from([1, 2]));
  }

  #[test]
  fn right_branching_shape() {
    let p = right_branching(3);
    assert_eq!(p.children[1].positions, BTreeSet::from([2]));
    assert_eq!(p.children[0].positions, BTreeSet::from([0, 1]));
  }

  #[test]
  fn cfg_limit_merges_discontinuous_children() {
    // Root covers {0,1,2,3}; children {0,2} and {1,3} are each fanout-2.
    let a = Partitioning::node(BTreeSet::from([0, 2]), Vec::new());
    let b = Partitioning::node(BTreeSet::from([1, 3]), Vec::new());
    let root = Partitioning::node(BTreeSet::from([0, 1, 2, 3]), vec![a, b]);
    let limited = cfg(&root);
    for c in &limited.children {
      assert!(c.fanout() <= 1, "child fanout {} exceeds 1", c.fanout());
    }
  }

  #[test]
  fn fanout_k_limit_respects_k() {
    let a = Partitioning::node(BTreeSet::from([0, 2, 4]), Vec::new());
    let b = Partitioning::node(BTreeSet::from([1, 3]), Vec::new());
    let c = Partitioning::node(BTreeSet::from([5]), Vec::new());
    let root = Partitioning::node(BTreeSet::from([0, 1, 2, 3, 4, 5]), vec![a, b, c]);
    let limited = fanout_k_limit(&root, 2, &FanoutKPolicy::RightmostFirst);
    for child in &limited.children {
      assert!(child.fanout() <= 2);
    }
  }
}
