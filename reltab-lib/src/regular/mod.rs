/*!

The regular tableau: a finite-state graph of canonical cubes.

Expansion pops an open leaf, strips its positive edge literals (they witness
the model but drive no rule), performs one positive modal step on the
minimal occurring active event, and normalizes the successor through a fresh
local tableau. Children are canonicalized, shared by cube, and connected
with renaming-labelled edges.

A dynamic spanning forest from the root set (the reachability tree) tracks
which nodes still matter; inconsistencies discovered between a parent's cube
and a child's renamed cube are repaired lazily by epsilon edges. An open
leaf that is not spurious under the model extracted from its
reachability-tree ancestry refutes the goal.

*/

pub mod node;

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use crate::{
  literal::{
    cube_has_positive_edge_predicate, gather_active_events, gather_minimal_occurring_active_event,
    is_literal_active, is_subset, print_cube, remove_useless_literals, validate_normalized_cube,
    Cube, Dnf,
  },
  regular::node::{canonicalize, EdgeLabel, RegularNode, RegularNodeId},
  stats,
  tableau::Tableau,
  term::renaming::Renaming,
};

pub struct RegularTableau {
  nodes: Vec<RegularNode>,
  index: HashMap<Cube, RegularNodeId>,
  roots: Vec<RegularNodeId>,
  unreduced: Vec<RegularNodeId>,
  counterexample: Option<RegularNodeId>,
}

impl RegularTableau {
  pub fn new(initial: &Cube) -> RegularTableau {
    let mut tableau = RegularTableau {
      nodes: Vec::new(),
      index: HashMap::new(),
      roots: Vec::new(),
      unreduced: Vec::new(),
      counterexample: None,
    };
    let mut local = Tableau::new(initial);
    tableau.expand_node(None, &mut local);
    tableau
  }

  // ================== Accessors ==================

  #[inline]
  pub fn node(&self, id: RegularNodeId) -> &RegularNode {
    &self.nodes[id.index()]
  }

  #[inline]
  fn node_mut(&mut self, id: RegularNodeId) -> &mut RegularNode {
    &mut self.nodes[id.index()]
  }

  pub fn node_ids(&self) -> impl Iterator<Item = RegularNodeId> + '_ {
    (0..self.nodes.len()).map(|index| RegularNodeId(index as u32))
  }

  pub fn roots(&self) -> &[RegularNodeId] {
    &self.roots
  }

  /// The open leaf refuting the goal, once `solve` returned `false`.
  pub fn counterexample(&self) -> Option<RegularNodeId> {
    self.counterexample
  }

  /// The edge renaming: maps the parent's event namespace onto the child's
  /// canonical events. Its inverse embeds the child back into the parent.
  pub fn label_for_child(&self, parent: RegularNodeId, child: RegularNodeId) -> &EdgeLabel {
    &self.node(child).parents[&parent]
  }

  fn epsilon_label_for_child(&self, parent: RegularNodeId, child: RegularNodeId) -> &EdgeLabel {
    &self.node(child).epsilon_parents[&parent]
  }

  pub fn is_reachable_from_roots(&self, id: RegularNodeId) -> bool {
    self.node(id).reachability_tree_parent.is_some() || self.roots.contains(&id)
  }

  // ================== Node management ==================

  // Canonicalizes and deduplicates. The returned renaming maps the caller's
  // events onto the canonical node.
  fn new_node(&mut self, cube: Cube) -> (RegularNodeId, Renaming) {
    debug_assert!(validate_normalized_cube(&cube));
    let (canonical, renaming) = canonicalize(cube);

    if let Some(&existing) = self.index.get(&canonical) {
      self.unreduced.push(existing);
      return (existing, renaming);
    }
    let id = RegularNodeId(self.nodes.len() as u32);
    self.nodes.push(RegularNode::new(canonical.clone()));
    self.index.insert(canonical, id);
    self.unreduced.push(id);
    stats::count("regular nodes");
    (id, renaming)
  }

  // parent == None -> child becomes a root
  fn add_edge(&mut self, parent: RegularNodeId, child: RegularNodeId, label: &EdgeLabel) {
    if self.node(child).parents.contains_key(&parent) {
      // Duplicate edges are suppressed. Inconsistency of the edge is
      // checked lazily, not here.
      return;
    }

    let inserted = self.node_mut(parent).children.insert(child);
    self.node_mut(child).parents.insert(parent, label.clone());
    if !inserted {
      return;
    }
    self.add_edge_update_reachability_tree(parent, child);

    // A child with epsilon children shares them with all of its parents.
    let epsilon_children: Vec<RegularNodeId> =
        self.node(child).epsilon_children.iter().copied().collect();
    for epsilon_child in epsilon_children {
      let child_renaming = self.epsilon_label_for_child(child, epsilon_child).clone();
      self.add_edge(parent, epsilon_child, &label.compose(&child_renaming));
    }
  }

  fn add_epsilon_edge(&mut self, parent: RegularNodeId, child: RegularNodeId, label: &EdgeLabel) {
    let inserted = self.node_mut(parent).epsilon_children.insert(child);
    self.node_mut(child).epsilon_parents.insert(parent, label.clone());
    if !inserted {
      return;
    }

    // Install shortcut edges from all grandparents.
    let grandparents: Vec<(RegularNodeId, EdgeLabel)> = self
        .node(parent)
        .parents
        .iter()
        .map(|(&grandparent, grandparent_label)| (grandparent, grandparent_label.clone()))
        .collect();
    for (grandparent, grandparent_label) in grandparents {
      self.add_edge(grandparent, child, &grandparent_label.compose(label));
    }
    let epsilon_grandparents: Vec<(RegularNodeId, EdgeLabel)> = self
        .node(parent)
        .epsilon_parents
        .iter()
        .map(|(&grandparent, grandparent_label)| (grandparent, grandparent_label.clone()))
        .collect();
    for (grandparent, grandparent_label) in epsilon_grandparents {
      self.add_epsilon_edge(grandparent, child, &grandparent_label.compose(label));
    }

    // Epsilon children of a root are themselves roots.
    if self.roots.contains(&parent) && !self.roots.contains(&child) {
      self.roots.push(child);
    }
  }

  fn remove_edge(&mut self, parent: RegularNodeId, child: RegularNodeId) {
    self.node_mut(parent).children.remove(&child);
    self.node_mut(child).parents.remove(&parent);
    self.remove_edge_update_reachability_tree(parent, child);
  }

  // ================== Reachability tree ==================

  fn add_edge_update_reachability_tree(&mut self, parent: RegularNodeId, child: RegularNodeId) {
    if self.is_reachable_from_roots(child) || !self.is_reachable_from_roots(parent) {
      return;
    }
    self.node_mut(child).reachability_tree_parent = Some(parent);

    // Adopt previously unreachable descendants; re-queue open leaves.
    let mut worklist = VecDeque::from([child]);
    while let Some(current) = worklist.pop_front() {
      if self.node(current).is_open_leaf() {
        self.unreduced.push(current);
      }
      let children: Vec<RegularNodeId> = self.node(current).children.iter().copied().collect();
      for node_child in children {
        if !self.is_reachable_from_roots(node_child) {
          self.node_mut(node_child).reachability_tree_parent = Some(current);
          worklist.push_back(node_child);
        }
      }
    }
  }

  fn remove_edge_update_reachability_tree(&mut self, parent: RegularNodeId, child: RegularNodeId) {
    if self.node(child).reachability_tree_parent != Some(parent) {
      return;
    }

    // Rebuild the forest from the root set.
    for node in self.nodes.iter_mut() {
      node.reachability_tree_parent = None;
    }
    let mut visited: HashSet<RegularNodeId> = self.roots.iter().copied().collect();
    let mut worklist: VecDeque<RegularNodeId> = self.roots.iter().copied().collect();
    while let Some(current) = worklist.pop_front() {
      let children: Vec<RegularNodeId> = self.node(current).children.iter().copied().collect();
      for node_child in children {
        if visited.insert(node_child) {
          self.node_mut(node_child).reachability_tree_parent = Some(current);
          worklist.push_back(node_child);
        }
      }
    }
    debug_assert!(self.validate_reachability_tree());
  }

  fn validate_reachability_tree(&self) -> bool {
    // The tree is a forest: following parents from any node terminates.
    for id in 0..self.nodes.len() {
      let mut visited = HashSet::new();
      let mut cursor = Some(RegularNodeId(id as u32));
      while let Some(current) = cursor {
        if !visited.insert(current) {
          return false;
        }
        cursor = self.node(current).reachability_tree_parent;
      }
    }
    true
  }

  // ================== Solving ==================

  /// Explores the graph until every open leaf is closed, subsumed, or
  /// epsilon-repaired (returns `true`), or a genuine counter-example leaf
  /// is found (returns `false`).
  pub fn solve(&mut self) -> bool {
    while let Some(current) = self.unreduced.pop() {
      if !self.node(current).is_open_leaf() || !self.is_reachable_from_roots(current) {
        continue;
      }
      debug!("expanding node {:?}: {}", current, print_cube(&self.node(current).cube));

      let mut current_cube = self.node(current).cube.clone();

      // Positive edge literals only witness the model; they drive no rule.
      if cube_has_positive_edge_predicate(&current_cube) {
        current_cube.retain(|literal| !literal.is_positive_edge_predicate());
        remove_useless_literals(&mut current_cube);
      }

      let mut tableau = Tableau::new(&current_cube);
      let minimal_event = gather_minimal_occurring_active_event(&current_cube);
      if let Some(minimal_event) = minimal_event {
        if tableau.try_apply_modal_rule_once(minimal_event) {
          self.expand_node(Some(current), &mut tableau);
          continue;
        }
      }

      // No modal rule fires: the leaf is final unless its model is spurious
      // and some path to a root can be repaired.
      if self.is_spurious(current) && self.is_inconsistent_lazy(current) {
        continue;
      }

      self.counterexample = Some(current);
      info!("Answer: False");
      return false;
    }
    info!("Answer: True");
    true
  }

  // node == None -> the cubes become roots.
  fn expand_node(&mut self, node: Option<RegularNodeId>, tableau: &mut Tableau) {
    let dnf = tableau.compute_dnf();
    if dnf.is_empty() {
      if let Some(id) = node {
        self.node_mut(id).closed = true;
      }
      return;
    }

    for cube in dnf {
      let (child, label) = self.new_node(cube);
      match node {
        None => {
          if !self.roots.contains(&child) {
            self.roots.push(child);
          }
        }
        Some(parent) => self.add_edge(parent, child, &label),
      }
    }
  }

  // ================== Lazy inconsistency ==================

  // Tests whether the child's cube, renamed backward through the edge label
  // and restricted to the parent's events, adds genuinely new literals to
  // the parent. If so, installs fixed nodes as epsilon children.
  fn is_inconsistent(
    &mut self,
    parent: RegularNodeId,
    child: RegularNodeId,
    label: &EdgeLabel,
  ) -> bool {
    if self.node(parent).inconsistent_children_checked.contains_key(&child) {
      return true; // already fixed
    }
    if self.node(child).cube.is_empty() {
      return false;
    }

    // Rename the child cube into the parent's namespace. Literals whose
    // events the renaming cannot strictly map produce no new obligations.
    let inverted = label.inverted();
    let mut renamed_child: Cube = self
        .node(child)
        .cube
        .iter()
        .filter(|literal| {
          let renameable = inverted.is_strictly_renameable(literal.events().iter());
          let relevant = literal.is_positive_edge_predicate() || literal.negated;
          renameable && relevant
        })
        .map(|literal| literal.renamed(&inverted))
        .collect();
    debug_assert!(validate_normalized_cube(&renamed_child));
    renamed_child.sort();
    renamed_child.dedup();

    let Some(fixed_dnf) = self.fixed_dnf(parent, &renamed_child) else {
      return false;
    };

    stats::count("lazy inconsistencies");
    for cube in fixed_dnf {
      let (fixed_node, renaming) = self.new_node(cube);
      self.add_epsilon_edge(parent, fixed_node, &renaming);
    }
    self
        .node_mut(parent)
        .inconsistent_children_checked
        .insert(child, label.clone());
    true
  }

  // The local DNF of the parent's cube extended by the renamed child
  // literals, restricted to the parent's events; `None` when the extension
  // adds nothing new.
  fn fixed_dnf(&self, parent: RegularNodeId, new_literals: &Cube) -> Option<Dnf> {
    let parent_cube = &self.node(parent).cube;
    let mut merged = parent_cube.clone();
    for literal in new_literals {
      if !merged.contains(literal) {
        merged.push(literal.clone());
      }
    }
    if merged.len() == parent_cube.len() {
      return None;
    }
    debug_assert!(validate_normalized_cube(&merged));

    let mut tableau = Tableau::new(&merged);
    let mut dnf = tableau.compute_dnf();

    let parent_active_events = gather_active_events(parent_cube);
    for cube in dnf.iter_mut() {
      cube.retain(|literal| is_literal_active(literal, &parent_active_events));
    }

    if dnf.iter().any(|cube| is_subset(cube, parent_cube)) {
      // The extension collapses back onto the parent: consistent.
      return None;
    }
    Some(dnf)
  }

  fn find_all_paths_to_roots(
    &self,
    node: RegularNodeId,
    current_path: &mut Vec<RegularNodeId>,
    all_paths: &mut Vec<Vec<RegularNodeId>>,
  ) {
    if current_path.contains(&node) {
      return;
    }
    current_path.push(node);

    if self.roots.contains(&node) {
      all_paths.push(current_path.clone());
    }
    let parents: Vec<RegularNodeId> = self.node(node).parents.keys().copied().collect();
    for parent in parents {
      self.find_all_paths_to_roots(parent, current_path, all_paths);
    }

    current_path.pop();
  }

  // Repairs, per path from the open leaf to a root, the first inconsistent
  // edge. A leaf all of whose paths admit a repair is closed for now.
  fn is_inconsistent_lazy(&mut self, open_leaf: RegularNodeId) -> bool {
    debug_assert!(!self.node(open_leaf).closed);
    debug_assert!(self.node(open_leaf).children.is_empty());

    let mut all_paths = Vec::new();
    let mut initial_path = Vec::new();
    self.find_all_paths_to_roots(open_leaf, &mut initial_path, &mut all_paths);

    while let Some(path) = all_paths.pop() {
      let mut path_inconsistent = false;

      for i in (1..path.len()).rev() {
        let parent = path[i];
        let child = path[i - 1];
        let Some(renaming) = self.node(child).parents.get(&parent).cloned() else {
          continue; // edge already removed by an earlier repair
        };
        if self.is_inconsistent(parent, child, &renaming) {
          path_inconsistent = true;
          self.remove_edge(parent, child);
          if self.node(parent).children.is_empty() && self.node(parent).epsilon_children.is_empty()
          {
            self.node_mut(parent).closed = true;
          }

          // Drop every remaining path crossing the removed edge.
          all_paths.retain(|other| {
            !other
                .windows(2)
                .any(|window| window[0] == child && window[1] == parent)
          });
          break; // only fix the first inconsistency on the path
        }
      }

      if !path_inconsistent {
        return false;
      }
    }
    true
  }

  // ================== Model extraction ==================

  /// The positive edge literals along the leaf's reachability-tree
  /// ancestry, renamed back into the root's namespace.
  pub fn model_cube(&self, open_leaf: RegularNodeId) -> Cube {
    let mut edges: Cube = Vec::new();
    let mut cursor = Some(open_leaf);
    while let Some(current) = cursor {
      for literal in &self.node(current).cube {
        if literal.is_positive_edge_predicate() && !edges.contains(literal) {
          edges.push(literal.clone());
        }
      }
      if let Some(tree_parent) = self.node(current).reachability_tree_parent {
        let renaming = self.label_for_child(tree_parent, current).inverted();
        for literal in edges.iter_mut() {
          *literal = literal.renamed(&renaming);
        }
        cursor = Some(tree_parent);
      } else {
        cursor = None;
      }
    }
    edges
  }

  /// The composed inverse renaming from this node back to its tree root.
  pub fn root_renaming(&self, node: RegularNodeId) -> Renaming {
    debug_assert!(self.is_reachable_from_roots(node));
    let Some(tree_parent) = self.node(node).reachability_tree_parent else {
      return Renaming::identity(&gather_active_events(&self.node(node).cube));
    };

    let mut root_renaming = self.label_for_child(tree_parent, node).inverted();
    let mut cursor = tree_parent;
    while let Some(next_parent) = self.node(cursor).reachability_tree_parent {
      let current_renaming = self.label_for_child(next_parent, cursor).inverted();
      root_renaming = root_renaming.total_compose(&current_renaming);
      cursor = next_parent;
    }
    root_renaming
  }

  /// The tree root above this node.
  pub fn tree_root(&self, node: RegularNodeId) -> RegularNodeId {
    let mut cursor = node;
    while let Some(parent) = self.node(cursor).reachability_tree_parent {
      cursor = parent;
    }
    cursor
  }

  // A leaf is spurious when the model from its tree ancestry cannot satisfy
  // the root's negated literals.
  fn is_spurious(&self, open_leaf: RegularNodeId) -> bool {
    let model = self.model_cube(open_leaf);
    let root = self.tree_root(open_leaf);

    let mut checked = model;
    for literal in &self.node(root).cube {
      if literal.negated && !checked.contains(literal) {
        checked.push(literal.clone());
      }
    }
    let mut finite_tableau = Tableau::new(&checked);
    let spurious = finite_tableau.compute_dnf().is_empty();
    stats::boolean("spurious open leaf", spurious);
    spurious
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    abstractions::IString,
    annotation::annotated,
    assumption,
    literal::Literal,
    tableau::rules,
    term::{relation, set},
  };

  fn relation_goal(lhs: relation::RelationId, rhs: relation::RelationId) -> Cube {
    let e1 = set::fresh_event();
    let e2 = set::fresh_event();
    let positive = set::intersection(set::image(e1, lhs), e2);
    let negative = set::intersection(set::image(e1, rhs), e2);
    let bound = rules::saturation_bound();
    vec![
      Literal::set_nonempty(positive),
      Literal::negated_set_nonempty((
        negative,
        annotated::make_with_value(negative, (bound, bound)),
      )),
    ]
  }

  #[test]
  fn singleton_event_with_equality_is_provable() {
    assumption::clear();
    // { e != 0, e = 0 }: the equality renames e away and the singleton
    // collapses; nothing refutable remains.
    let e = set::fresh_event();
    let cube = vec![
      Literal::set_nonempty(e),
      Literal::equality(false, e, set::event(0)),
    ];
    let mut tableau = RegularTableau::new(&cube);
    assert!(tableau.solve());
  }

  #[test]
  fn empty_initial_cube_is_provable() {
    assumption::clear();
    let mut tableau = RegularTableau::new(&Vec::new());
    assert!(tableau.solve());
  }

  #[test]
  fn bottom_only_cube_is_provable() {
    assumption::clear();
    let mut tableau = RegularTableau::new(&vec![Literal::bottom()]);
    assert!(tableau.solve());
  }

  #[test]
  fn positive_full_set_cube_is_provable() {
    assumption::clear();
    let mut tableau = RegularTableau::new(&vec![Literal::set_nonempty(set::full_set())]);
    assert!(tableau.solve());
  }

  #[test]
  fn base_relation_reflexivity_is_provable() {
    assumption::clear();
    let a = relation::base_relation(IString::from("a"));
    let mut tableau = RegularTableau::new(&relation_goal(a, a));
    assert!(tableau.solve());
  }

  #[test]
  fn union_reflexivity_is_provable() {
    assumption::clear();
    let a = relation::base_relation(IString::from("a"));
    let b = relation::base_relation(IString::from("b"));
    let union = relation::union(a, b);
    let mut tableau = RegularTableau::new(&relation_goal(union, union));
    assert!(tableau.solve());
  }

  #[test]
  fn transitive_closure_reflexivity_is_provable() {
    assumption::clear();
    let r = relation::base_relation(IString::from("r"));
    let star = relation::transitive_closure(r);
    let mut tableau = RegularTableau::new(&relation_goal(star, star));
    assert!(tableau.solve());
  }

  #[test]
  fn distinct_base_relations_are_refuted_with_counterexample() {
    assumption::clear();
    let a = relation::base_relation(IString::from("a"));
    let b = relation::base_relation(IString::from("b"));
    let mut tableau = RegularTableau::new(&relation_goal(a, b));
    assert!(!tableau.solve());
    let leaf = tableau.counterexample().unwrap();
    let model = tableau.model_cube(leaf);
    // One witnessing edge in `a`.
    assert!(model.iter().any(|literal| {
      literal.is_positive_edge_predicate() && literal.identifier == Some(IString::from("a"))
    }));
  }

  #[test]
  fn counterexample_model_satisfies_the_refuted_cube() {
    assumption::clear();
    let a = relation::base_relation(IString::from("a"));
    let b = relation::base_relation(IString::from("b"));
    let goal = relation_goal(a, b);
    let mut tableau = RegularTableau::new(&goal);
    assert!(!tableau.solve());

    // Feeding the extracted model back: it satisfies every literal of the
    // refuted root cube, so the refutation is genuine.
    let leaf = tableau.counterexample().unwrap();
    let mut model = crate::model::Model::new(&tableau.model_cube(leaf));
    crate::model::saturate_model(&mut model);
    let root = tableau.tree_root(leaf);
    for literal in tableau.node(root).cube() {
      assert!(model.evaluate_literal(literal), "unsatisfied literal {literal}");
    }
  }

  #[test]
  fn base_assumption_makes_inclusion_provable() {
    assumption::clear();
    let r = relation::base_relation(IString::from("r"));
    let s = relation::base_relation(IString::from("s"));
    assumption::add_base_assumption(IString::from("s"), r);

    let mut tableau = RegularTableau::new(&relation_goal(r, s));
    assert!(tableau.solve());
    assumption::clear();

    // Without budget the same goal is refuted by a one-edge model.
    rules::set_saturation_bound(0);
    assumption::add_base_assumption(IString::from("s"), r);
    let mut refuted = RegularTableau::new(&relation_goal(r, s));
    assert!(!refuted.solve());
    let leaf = refuted.counterexample().unwrap();
    assert_eq!(refuted.model_cube(leaf).len(), 1);
    rules::set_saturation_bound(1);
    assumption::clear();
  }

  #[test]
  fn irreflexivity_axiom_refutes_diagonal_edges() {
    assumption::clear();
    // irreflexive(a), goal a ∩ id ⊆ 0. The axiom arrives as an emptiness
    // literal on the goal cube and closes the diagonal witness.
    let a = relation::base_relation(IString::from("a"));
    let a_and_id = relation::intersection(a, relation::id_relation());
    let axiom_set = set::image(set::full_set(), a_and_id);
    let bound = rules::saturation_bound();

    let mut goal = relation_goal(a_and_id, relation::empty_relation());
    goal.push(Literal::negated_set_nonempty((
      axiom_set,
      annotated::make_with_value(axiom_set, (bound, bound)),
    )));

    let mut tableau = RegularTableau::new(&goal);
    assert!(tableau.solve());
  }
}
