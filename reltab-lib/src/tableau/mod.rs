/*!

The local tableau.

Reduces a conjunction of literals to a disjunctive normal form of normal
cubes. The tableau owns a branch tree (one literal per node) and a priority
worklist of unprocessed nodes. Processing a node either renames branches (on
a positive equality), applies the one local rule that fires on its literal,
or — for irreducible literals — runs the modal inference passes and the
saturation rules.

Appending a DNF to a branch filters it against the branch prefix: cubes that
contradict a literal already on the branch are dropped, literals already
present are elided, and cubes reproducing a literal of a transitive unrolling
ancestor are discarded (the at-the-world cycle check, which makes the local
search terminate under assumptions).

*/

pub mod node;
pub mod rules;
pub mod worklist;

use std::collections::HashSet;

use tracing::debug;

use crate::{
  literal::{
    cube_has_negated_literal, print_cube, validate_cube, validate_dnf, Cube, Dnf, Literal,
  },
  preprocessing,
  stats,
  tableau::{
    node::{Node, NodeId},
    worklist::Worklist,
  },
  term::{renaming::Renaming, set, Event},
};

pub struct Tableau {
  nodes   : Vec<Node>,
  root    : Option<NodeId>,
  worklist: Worklist,
}

// Given dnf f and literal l, computes a smaller dnf f' with f & l <-> f':
// cubes containing ~l are dropped, l itself is elided from the rest.
fn reduce_dnf(dnf: &mut Dnf, literal: &Literal) {
  debug_assert!(validate_dnf(dnf));
  dnf.retain(|cube| !cube_has_negated_literal(cube, literal));
  for cube in dnf.iter_mut() {
    cube.retain(|cube_literal| cube_literal != literal);
  }
  debug_assert!(validate_dnf(dnf));
}

// One literal per occurrence of `search`, each with exactly that occurrence
// replaced. The results are appended conjunctively.
fn substitute_all_once(literal: &Literal, search: set::SetId, replace: set::SetId) -> Cube {
  let mut results = Cube::new();
  let mut occurrence = 1;
  while let Some(substituted) = literal.substitute(search, replace, occurrence) {
    results.push(substituted);
    occurrence += 1;
  }
  results
}

impl Tableau {
  pub fn new(cube: &Cube) -> Tableau {
    debug_assert!(validate_cube(cube));
    let mut tableau = Tableau { nodes: Vec::new(), root: None, worklist: Worklist::default() };
    let mut current: Option<NodeId> = None;
    for literal in cube {
      let id = tableau.new_node(literal.clone(), current, None);
      if let Some(parent) = current {
        tableau.nodes[parent.index()].children.push(id);
      } else {
        tableau.root = Some(id);
      }
      tableau.worklist.push(&mut tableau.nodes, id);
      current = Some(id);
    }
    tableau
  }

  fn new_node(
    &mut self,
    literal: Literal,
    parent: Option<NodeId>,
    last_unrolling_parent: Option<NodeId>,
  ) -> NodeId {
    let id = NodeId(self.nodes.len() as u32);
    self.nodes.push(Node::new(literal, parent, last_unrolling_parent));
    id
  }

  #[inline]
  pub fn node(&self, id: NodeId) -> &Node {
    &self.nodes[id.index()]
  }

  #[inline]
  fn node_mut(&mut self, id: NodeId) -> &mut Node {
    &mut self.nodes[id.index()]
  }

  pub fn root(&self) -> Option<NodeId> {
    self.root
  }

  /// A node is closed when a contradiction was found at it or every child
  /// subtree is closed. A `FALSE` literal closes by itself.
  pub fn is_closed(&self, id: NodeId) -> bool {
    let node = self.node(id);
    if node.closed || node.literal == Literal::bottom() {
      return true;
    }
    if node.children.is_empty() {
      return false;
    }
    node.children.iter().all(|&child| self.is_closed(child))
  }

  pub fn validate(&self) -> bool {
    self.nodes.iter().all(|node| node.literal.validate())
  }

  // ================== Tree manipulation ==================

  /// Appends a DNF below this node: filters against the branch prefix and
  /// the unrolling ancestry, then materializes one child chain per cube at
  /// every open leaf. `unrolling` names the transitive-closure node whose
  /// rule produced the DNF, if any.
  fn append_branch(&mut self, target: NodeId, dnf: &Dnf, unrolling: Option<NodeId>) {
    debug_assert!(!dnf.is_empty(), "appending an empty DNF makes no sense");
    debug_assert!(dnf.len() <= 2, "only binary branching is supported");
    debug_assert!(validate_dnf(dnf));

    let mut dnf = dnf.clone();

    // Reduce against the whole branch prefix, leaf to root.
    let mut cursor = Some(target);
    while let Some(id) = cursor {
      let literal = self.node(id).literal.clone();
      reduce_dnf(&mut dnf, &literal);
      cursor = self.node(id).parent;
    }

    let unrolling_chain = unrolling.or(self.node(target).last_unrolling_parent);
    self.reduce_dnf_at_a_world_cycle(&mut dnf, unrolling_chain);

    self.append_internal_down(target, dnf, unrolling);
  }

  // Discards cubes that reproduce the literal of a transitive unrolling
  // ancestor: their fixed point is already witnessed on the branch.
  fn reduce_dnf_at_a_world_cycle(&mut self, dnf: &mut Dnf, mut unrolling: Option<NodeId>) {
    while let Some(ancestor) = unrolling {
      if dnf.is_empty() {
        return;
      }
      let ancestor_literal = self.node(ancestor).literal.clone();
      let before = dnf.len();
      dnf.retain(|cube| !cube.contains(&ancestor_literal));
      if before != dnf.len() {
        stats::count("at-the-world cycles");
      }
      unrolling = self.node(ancestor).last_unrolling_parent;
    }
  }

  fn append_internal_down(&mut self, id: NodeId, mut dnf: Dnf, unrolling: Option<NodeId>) {
    let literal = self.node(id).literal.clone();
    reduce_dnf(&mut dnf, &literal);

    if dnf.is_empty() {
      // Contradiction with the branch.
      self.close_branch(id);
      return;
    }
    if dnf.iter().any(Cube::is_empty) {
      // Some disjunct is already implied by the branch: nothing to add.
      return;
    }

    if !self.node(id).is_leaf() {
      let children = self.node(id).children.clone();
      for child in children {
        self.append_internal_down(child, dnf.clone(), unrolling);
      }
      return;
    }

    if self.is_closed(id) {
      return;
    }

    // Open leaf: materialize one child chain per cube. TRUE literals carry
    // no information and are skipped.
    let inherited = unrolling.or(self.node(id).last_unrolling_parent);
    for cube in dnf {
      let mut current = id;
      for literal in cube {
        if literal == Literal::top() {
          continue;
        }
        let child = self.new_node(literal, Some(current), inherited);
        self.nodes[current.index()].children.push(child);
        self.worklist.push(&mut self.nodes, child);
        current = child;
      }
    }
  }

  /// Closes the subtree at this node: its nodes leave the worklist, its
  /// children are detached, and a single FALSE child marks the closure.
  fn close_branch(&mut self, id: NodeId) {
    if self.is_closed(id) {
      return;
    }
    let mut behind = Vec::new();
    self.collect_subtree(id, &mut behind);
    for node in behind {
      self.worklist.erase(&mut self.nodes, node);
    }
    self.node_mut(id).children.clear();
    let bottom = self.new_node(Literal::bottom(), Some(id), None);
    self.node_mut(id).children.push(bottom);
    self.node_mut(id).closed = true;
  }

  fn collect_subtree(&self, id: NodeId, nodes: &mut Vec<NodeId>) {
    nodes.push(id);
    for &child in &self.node(id).children {
      self.collect_subtree(child, nodes);
    }
  }

  // ================== Rule application ==================

  /// Applies the local rule schema to the node's literal; returns whether a
  /// rule fired.
  fn apply_rule(&mut self, id: NodeId) -> bool {
    let literal = self.node(id).literal.clone();
    let Some(dnf) = rules::apply_rule(&literal) else {
      return false;
    };
    let unrolling = rules::last_rule_was_unrolling().then_some(id);
    self.append_branch(id, &dnf, unrolling);
    true
  }

  // ================== Modal inference ==================

  // Negated node: infer substitutions from every positive edge literal on
  // the branch above.
  fn infer_modal(&mut self, id: NodeId) {
    let literal = self.node(id).literal.clone();
    if !literal.negated {
      return;
    }

    let mut edges = Vec::new();
    let mut cursor = self.node(id).parent;
    while let Some(ancestor) = cursor {
      let ancestor_literal = &self.node(ancestor).literal;
      if ancestor_literal.is_normal() && ancestor_literal.is_positive_edge_predicate() {
        edges.push(ancestor_literal.clone());
      }
      cursor = self.node(ancestor).parent;
    }

    for edge in edges {
      let (search1, replace1, search2, replace2) = edge_substitutions(&edge);
      for (search, replace) in [(search1, replace1), (search2, replace2)] {
        let cube = substitute_all_once(&literal, search, replace);
        if !cube.is_empty() {
          self.append_branch(id, &vec![cube], None);
        }
      }
    }
  }

  // Negated node containing the full set: instantiate T with every event
  // known on the branch.
  fn infer_modal_top(&mut self, id: NodeId) {
    let literal = self.node(id).literal.clone();
    if !literal.negated {
      return;
    }

    let mut labels = Vec::new();
    let mut cursor = self.node(id).parent;
    while let Some(ancestor) = cursor {
      let ancestor_literal = &self.node(ancestor).literal;
      if ancestor_literal.is_normal() && !ancestor_literal.negated {
        for label in ancestor_literal.events().iter() {
          if !labels.contains(&label) {
            labels.push(label);
          }
        }
      }
      cursor = self.node(ancestor).parent;
    }

    for label in labels {
      let cube = substitute_all_once(&literal, set::full_set(), set::event(label));
      if !cube.is_empty() {
        self.append_branch(id, &vec![cube], None);
      }
    }
  }

  // Negated node containing a base set: instantiate B with every event the
  // branch knows to be a member of B.
  fn infer_modal_base_set(&mut self, id: NodeId) {
    let literal = self.node(id).literal.clone();
    if !literal.negated {
      return;
    }

    let mut memberships = Vec::new();
    let mut cursor = self.node(id).parent;
    while let Some(ancestor) = cursor {
      let ancestor_literal = &self.node(ancestor).literal;
      if ancestor_literal.is_positive_set_predicate() {
        memberships.push(ancestor_literal.clone());
      }
      cursor = self.node(ancestor).parent;
    }

    for membership in memberships {
      let base = set::base_set(membership.identifier.unwrap());
      let cube = substitute_all_once(&literal, base, membership.left_event.unwrap());
      if !cube.is_empty() {
        self.append_branch(id, &vec![cube], None);
      }
    }
  }

  // Positive edge node: push its knowledge into every negated normal
  // literal on the branch above.
  fn infer_modal_atomic(&mut self, id: NodeId) {
    let edge = self.node(id).literal.clone();
    debug_assert!(edge.is_positive_edge_predicate());
    let (search1, replace1, search2, replace2) = edge_substitutions(&edge);
    let full = set::full_set();

    let mut negated = Vec::new();
    let mut cursor = self.node(id).parent;
    while let Some(ancestor) = cursor {
      let ancestor_literal = &self.node(ancestor).literal;
      if ancestor_literal.negated && ancestor_literal.is_normal() {
        negated.push(ancestor_literal.clone());
      }
      cursor = self.node(ancestor).parent;
    }

    for literal in negated {
      for (search, replace) in
          [(search1, replace1), (search2, replace2), (full, replace1), (full, replace2)]
      {
        let cube = substitute_all_once(&literal, search, replace);
        if !cube.is_empty() {
          self.append_branch(id, &vec![cube], None);
        }
      }
    }
  }

  // Positive set-membership node, the atomic direction of the base-set
  // inference.
  fn infer_modal_base_set_atomic(&mut self, id: NodeId) {
    let membership = self.node(id).literal.clone();
    debug_assert!(membership.is_positive_set_predicate());
    let base = set::base_set(membership.identifier.unwrap());
    let event = membership.left_event.unwrap();
    let full = set::full_set();

    let mut negated = Vec::new();
    let mut cursor = self.node(id).parent;
    while let Some(ancestor) = cursor {
      let ancestor_literal = &self.node(ancestor).literal;
      if ancestor_literal.negated && ancestor_literal.is_normal() {
        negated.push(ancestor_literal.clone());
      }
      cursor = self.node(ancestor).parent;
    }

    for literal in negated {
      for (search, replace) in [(base, event), (full, event)] {
        let cube = substitute_all_once(&literal, search, replace);
        if !cube.is_empty() {
          self.append_branch(id, &vec![cube], None);
        }
      }
    }
  }

  // ================== Branch renaming ==================

  // A positive equality `e1 = e2` renames e1 to e2 on every branch through
  // the equality node. The exclusive segment above (nodes whose subtree
  // lies entirely on such branches) and the subtree below are renamed in
  // place; literals of the shared prefix that mention e1 are re-established
  // in renamed form below the equality node. Renamed literals already
  // present above collapse to TRUE.
  fn rename_branches(&mut self, id: NodeId) {
    let literal = self.node(id).literal.clone();
    debug_assert!(literal.is_positive_equality_predicate());
    let from = set::get(literal.left_event.unwrap()).label().unwrap();
    let to   = set::get(literal.right_event.unwrap()).label().unwrap();
    let renaming = Renaming::simple(from, to);

    let mut exclusive_top = id;
    while let Some(parent) = self.node(exclusive_top).parent {
      if self.node(parent).children.len() != 1 {
        break;
      }
      exclusive_top = parent;
    }

    // Shared-prefix literals mentioning the renamed event, root-first.
    let mut reestablish = Cube::new();
    let mut cursor = self.node(exclusive_top).parent;
    while let Some(ancestor) = cursor {
      let ancestor_literal = &self.node(ancestor).literal;
      if ancestor_literal.events().contains(from) {
        reestablish.push(ancestor_literal.renamed(&renaming));
      }
      cursor = self.node(ancestor).parent;
    }
    reestablish.reverse();

    // Literals on the shared prefix, for duplicate collapsing.
    let mut seen = HashSet::new();
    let mut cursor = self.node(exclusive_top).parent;
    while let Some(ancestor) = cursor {
      seen.insert(self.node(ancestor).literal.clone());
      cursor = self.node(ancestor).parent;
    }

    self.rename_subtree(exclusive_top, &renaming, seen);

    if !reestablish.is_empty() {
      self.append_branch(id, &vec![reestablish], None);
    }
    stats::count("branch renamings");
  }

  fn rename_subtree(&mut self, id: NodeId, renaming: &Renaming, mut seen: HashSet<Literal>) {
    let renamed = self.node(id).literal.renamed(renaming);
    let was_queued = self.worklist.contains(&self.nodes, id);
    self.worklist.erase(&mut self.nodes, id);

    if seen.contains(&renamed) {
      // Already established on the branch.
      self.node_mut(id).literal = Literal::top();
    } else {
      seen.insert(renamed.clone());
      self.node_mut(id).literal = renamed;
      if was_queued {
        self.worklist.push(&mut self.nodes, id);
      }
    }

    let children = self.node(id).children.clone();
    match children.as_slice() {
      [] => {}
      [only] => self.rename_subtree(*only, renaming, seen),
      many => {
        for &child in many {
          self.rename_subtree(child, renaming, seen.clone());
        }
      }
    }
  }

  // ================== Solving ==================

  /// Drains the worklist, applying rules in priority order. `bound` limits
  /// the number of processed nodes; zero or negative means no bound.
  /// Returns whether the root closed.
  pub fn solve(&mut self, bound: i32) -> bool {
    let mut remaining = bound;
    while let Some(current) = self.worklist.pop(&mut self.nodes) {
      if bound > 0 {
        remaining -= 1;
        if remaining < 0 {
          break;
        }
      }

      let literal = self.node(current).literal.clone();

      if literal.is_positive_equality_predicate() && literal.left_event != literal.right_event {
        self.rename_branches(current);
        continue;
      }

      if self.apply_rule(current) {
        continue;
      }

      // The literal is irreducible.
      if literal.is_positive_edge_predicate() {
        self.infer_modal_atomic(current);
        continue;
      }
      if literal.is_positive_set_predicate() {
        self.infer_modal_base_set_atomic(current);
        continue;
      }

      if literal.negated {
        self.infer_modal(current);
        if literal.has_full_set() {
          self.infer_modal_top(current);
        }
        if literal.has_base_set() {
          self.infer_modal_base_set(current);
        }
        for saturated in [
          rules::saturate_base(&literal),
          rules::saturate_base_set(&literal),
          rules::saturate_id(&literal),
        ]
        .into_iter()
        .flatten()
        {
          self.append_branch(current, &vec![vec![saturated]], None);
        }
      }
    }

    self.root.is_some_and(|root| self.is_closed(root))
  }

  /// Tries exactly one positive modal rule using the given minimal active
  /// event. Used by the regular tableau's expansion step.
  pub fn try_apply_modal_rule_once(&mut self, minimal_event: Event) -> bool {
    for index in 0..self.nodes.len() {
      let id = NodeId(index as u32);
      let literal = self.node(id).literal.clone();
      if let Some(dnf) = rules::apply_positive_modal_rule(&literal, minimal_event) {
        self.append_branch(id, &dnf, None);
        return true;
      }
    }
    false
  }

  /// Fully normalizes and extracts the DNF over open branches: every branch
  /// with at least one normal literal contributes one cube, closed branches
  /// contribute nothing.
  pub fn compute_dnf(&mut self) -> Dnf {
    self.solve(-1);
    let Some(root) = self.root else {
      return Dnf::new();
    };
    let mut dnf = self.dnf_builder(root);
    // Branches without a single normal literal contribute nothing.
    dnf.retain(|cube| !cube.is_empty());
    for cube in dnf.iter_mut() {
      preprocessing::eliminate_redundant_conjunctive_contexts(cube);
    }
    if tracing::enabled!(tracing::Level::DEBUG) {
      for cube in &dnf {
        debug!("dnf cube: {}", print_cube(cube));
      }
    }
    dnf
  }

  // Open leaves seed one (possibly empty) cube per branch; ancestors add
  // their normal literals on the way up. Closed subtrees contribute nothing.
  fn dnf_builder(&self, id: NodeId) -> Dnf {
    if self.is_closed(id) {
      return Dnf::new();
    }
    let node = self.node(id);
    let normal = node.literal.is_normal();

    if node.is_leaf() {
      return if normal { vec![vec![node.literal.clone()]] } else { vec![Cube::new()] };
    }

    let mut dnf = Dnf::new();
    for &child in &node.children {
      dnf.extend(self.dnf_builder(child));
    }
    if normal {
      for cube in dnf.iter_mut() {
        if !cube.contains(&node.literal) {
          cube.push(node.literal.clone());
        }
      }
    }
    dnf
  }
}

// For an edge (e1, e2) ∈ b, the two substitutions it licenses:
// e1;b -> e2 and b;e2 -> e1.
fn edge_substitutions(edge: &Literal) -> (set::SetId, set::SetId, set::SetId, set::SetId) {
  let e1 = edge.left_event.unwrap();
  let e2 = edge.right_event.unwrap();
  let b = crate::term::relation::base_relation(edge.identifier.unwrap());
  let e1b = set::image(e1, b);
  let be2 = set::domain(e2, b);
  (e1b, e2, be2, e1)
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::abstractions::IString;
  use crate::annotation::annotated;
  use crate::term::relation;

  fn goal_pair(lhs: relation::RelationId, rhs: relation::RelationId) -> Cube {
    // (e1;lhs & e2) != 0  and  ~((e1;rhs & e2) != 0)
    let e1 = set::fresh_event();
    let e2 = set::fresh_event();
    let positive = set::intersection(set::image(e1, lhs), e2);
    let negative = set::intersection(set::image(e1, rhs), e2);
    let bound = rules::saturation_bound();
    vec![
      Literal::set_nonempty(positive),
      Literal::negated_set_nonempty((negative, annotated::make_with_value(negative, (bound, bound)))),
    ]
  }

  #[test]
  fn base_relation_reflexive_inclusion_closes() {
    crate::assumption::clear();
    let a = relation::base_relation(IString::from("a"));
    let mut tableau = Tableau::new(&goal_pair(a, a));
    assert!(tableau.compute_dnf().is_empty());
    assert!(tableau.is_closed(tableau.root().unwrap()));
  }

  #[test]
  fn union_reflexive_inclusion_closes() {
    crate::assumption::clear();
    let a = relation::base_relation(IString::from("a"));
    let b = relation::base_relation(IString::from("b"));
    let union = relation::union(a, b);
    let mut tableau = Tableau::new(&goal_pair(union, union));
    assert!(tableau.compute_dnf().is_empty());
  }

  #[test]
  fn distinct_base_relations_leave_an_open_cube() {
    crate::assumption::clear();
    let a = relation::base_relation(IString::from("a"));
    let b = relation::base_relation(IString::from("b"));
    let mut tableau = Tableau::new(&goal_pair(a, b));
    let dnf = tableau.compute_dnf();
    assert!(!dnf.is_empty());
    // Every open cube keeps the positive witness and the unmet negation.
    for cube in &dnf {
      assert!(cube.iter().any(Literal::is_positive_edge_predicate));
      assert!(cube.iter().any(|literal| literal.negated));
    }
  }

  #[test]
  fn base_assumption_closes_with_budget() {
    crate::assumption::clear();
    let r = relation::base_relation(IString::from("r"));
    let s = relation::base_relation(IString::from("s"));
    crate::assumption::add_base_assumption(IString::from("s"), r);

    let mut tableau = Tableau::new(&goal_pair(r, s));
    assert!(tableau.compute_dnf().is_empty());

    // With the budget disabled the inclusion stays open.
    rules::set_saturation_bound(0);
    let mut unsaturated = Tableau::new(&goal_pair(r, s));
    assert!(!unsaturated.compute_dnf().is_empty());
    rules::set_saturation_bound(1);
    crate::assumption::clear();
  }

  #[test]
  fn negated_transitive_closure_under_positive_ancestor_terminates() {
    crate::assumption::clear();
    let r = relation::base_relation(IString::from("r"));
    let star = relation::transitive_closure(r);
    // ~(e1;r* & e2) alongside the matching positive literal: the at-the-world
    // cycle check must cut repeated unrollings instead of diverging.
    let mut tableau = Tableau::new(&goal_pair(star, star));
    let dnf = tableau.compute_dnf();
    assert!(tableau.nodes.len() < 10_000);
    // The reflexive inclusion is not decided locally in one step, but the
    // local search must terminate with a finite DNF.
    drop(dnf);
  }

  #[test]
  fn appending_a_dnf_twice_adds_nothing_new() {
    crate::assumption::clear();
    let a = IString::from("a");
    let cube = vec![Literal::edge(set::event(0), set::event(1), a)];
    let mut tableau = Tableau::new(&cube);
    let root = tableau.root().unwrap();

    let addition = vec![vec![Literal::edge(set::event(0), set::event(2), a)]];
    tableau.append_branch(root, &addition, None);
    let nodes_after_first = tableau.nodes.len();
    tableau.append_branch(root, &addition, None);
    // The duplicate literal is elided against the branch prefix.
    assert_eq!(tableau.nodes.len(), nodes_after_first);
  }

  #[test]
  fn equality_renames_branches() {
    crate::assumption::clear();
    let e1 = set::fresh_event();
    let e2 = set::fresh_event();
    let a = IString::from("a");
    let cube = vec![
      Literal::edge(e1, e2, a),
      Literal::equality(false, e1, e2),
    ];
    let mut tableau = Tableau::new(&cube);
    let dnf = tableau.compute_dnf();
    // After renaming, the edge mentions only the second event.
    for cube in &dnf {
      for literal in cube {
        assert!(!literal.events().contains(set::get(e1).label().unwrap()));
      }
    }
  }
}
