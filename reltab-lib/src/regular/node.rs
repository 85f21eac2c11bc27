/*!

Nodes of the regular tableau.

A regular node owns a frozen, canonically renamed and sorted cube. Two cubes
that are equal up to event renaming canonicalize to the same node, which is
how the regular tableau detects subsumption. Edges carry the renaming
linking the parent's event namespace to the child's canonical one; epsilon
edges are the inconsistency-fix shortcuts.

*/

use std::collections::{BTreeMap, BTreeSet};

use crate::{
  literal::{validate_normalized_cube, Cube},
  term::renaming::Renaming,
};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RegularNodeId(pub(crate) u32);

impl RegularNodeId {
  #[inline(always)]
  pub(crate) fn index(self) -> usize {
    self.0 as usize
  }

  /// The raw arena index, stable for the run. Display/export only.
  #[inline(always)]
  pub fn raw(self) -> u32 {
    self.0
  }
}

pub type EdgeLabel = Renaming;

pub struct RegularNode {
  pub(crate) cube: Cube, // canonical: renamed onto 0..n-1 and sorted
  pub(crate) children        : BTreeSet<RegularNodeId>,
  pub(crate) epsilon_children: BTreeSet<RegularNodeId>,
  pub(crate) parents         : BTreeMap<RegularNodeId, EdgeLabel>,
  pub(crate) epsilon_parents : BTreeMap<RegularNodeId, EdgeLabel>,

  pub(crate) closed: bool,
  /// Parent in the dynamic spanning forest rooted at the root-node set.
  pub(crate) reachability_tree_parent: Option<RegularNodeId>,
  /// Inconsistent children already fixed, keyed by child.
  pub(crate) inconsistent_children_checked: BTreeMap<RegularNodeId, EdgeLabel>,
}

impl RegularNode {
  pub(crate) fn new(cube: Cube) -> RegularNode {
    RegularNode {
      cube,
      children: BTreeSet::new(),
      epsilon_children: BTreeSet::new(),
      parents: BTreeMap::new(),
      epsilon_parents: BTreeMap::new(),
      closed: false,
      reachability_tree_parent: None,
      inconsistent_children_checked: BTreeMap::new(),
    }
  }

  #[inline(always)]
  pub fn cube(&self) -> &Cube {
    &self.cube
  }

  #[inline(always)]
  pub fn children(&self) -> &BTreeSet<RegularNodeId> {
    &self.children
  }

  #[inline(always)]
  pub fn epsilon_children(&self) -> &BTreeSet<RegularNodeId> {
    &self.epsilon_children
  }

  #[inline(always)]
  pub fn parents(&self) -> &BTreeMap<RegularNodeId, EdgeLabel> {
    &self.parents
  }

  #[inline(always)]
  pub fn epsilon_parents(&self) -> &BTreeMap<RegularNodeId, EdgeLabel> {
    &self.epsilon_parents
  }

  #[inline(always)]
  pub fn is_closed(&self) -> bool {
    self.closed
  }

  #[inline(always)]
  pub fn reachability_tree_parent(&self) -> Option<RegularNodeId> {
    self.reachability_tree_parent
  }

  pub fn is_open_leaf(&self) -> bool {
    self.children.is_empty() && self.epsilon_children.is_empty() && !self.closed
  }
}

/// Computes the canonical form of a cube: the positive literals are sorted
/// deterministically by printed form, events are collected in first
/// occurrence order and packed onto `0..n-1`, and the renamed cube is
/// sorted. Returns the canonical cube together with the renaming that maps
/// the caller's events onto it.
pub(crate) fn canonicalize(mut cube: Cube) -> (Cube, Renaming) {
  debug_assert!(validate_normalized_cube(&cube));

  let mut sorted: Vec<&crate::literal::Literal> =
      cube.iter().filter(|literal| !literal.negated).collect();
  sorted.sort_by_cached_key(|literal| {
    let text = literal.to_string();
    (text.len(), text)
  });

  let mut events = Vec::new();
  for literal in &sorted {
    for event in literal.events().iter() {
      if !events.contains(&event) {
        events.push(event);
      }
    }
  }
  // Events witnessed only by negated literals (cubes without a positive
  // part) still must land in the canonical interval; collect them in the
  // same deterministic printed-form order after the positively-owned ones.
  let mut negated: Vec<&crate::literal::Literal> =
      cube.iter().filter(|literal| literal.negated).collect();
  negated.sort_by_cached_key(|literal| {
    let text = literal.to_string();
    (text.len(), text)
  });
  for literal in &negated {
    for event in literal.events().iter() {
      if !events.contains(&event) {
        events.push(event);
      }
    }
  }

  let renaming = Renaming::minimal(&events);
  for literal in cube.iter_mut() {
    *literal = literal.renamed(&renaming);
  }
  cube.sort();
  cube.dedup();

  debug_assert!({
    // All events must form the interval 0..n-1 after renaming.
    let mut all = crate::abstractions::EventSet::default();
    for literal in &cube {
      all.union_with(&literal.events());
    }
    all.iter().max().map_or(true, |max| max + 1 == all.len()) && all.len() == events.len()
  });

  (cube, renaming)
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    abstractions::IString,
    literal::Literal,
    term::set,
  };

  #[test]
  fn canonicalization_is_renaming_invariant() {
    let a = IString::from("a");
    let cube1 = vec![
      Literal::edge(set::event(4), set::event(7), a),
      Literal::equality(true, set::event(4), set::event(7)),
    ];
    let cube2 = vec![
      Literal::edge(set::event(2), set::event(9), a),
      Literal::equality(true, set::event(2), set::event(9)),
    ];
    let (canonical1, renaming1) = canonicalize(cube1);
    let (canonical2, _) = canonicalize(cube2);
    assert_eq!(canonical1, canonical2);
    assert_eq!(renaming1.rename(4), 0);
    assert_eq!(renaming1.rename(7), 1);
  }

  #[test]
  fn canonical_events_form_an_interval() {
    let a = IString::from("a");
    let cube = vec![Literal::edge(set::event(11), set::event(3), a)];
    let (canonical, _) = canonicalize(cube);
    let events = canonical[0].events();
    assert_eq!(events.iter().collect::<Vec<_>>(), vec![0, 1]);
  }
}
