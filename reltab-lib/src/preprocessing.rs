/*!

Redundancy elimination on goal cubes.

Positive literals are scanned for conjunctive contexts around base
relations: intersections, compositions, and unions of set-identities. For
each base relation the longest chain of unique enclosing contexts is its
greatest common conjunctive context. Negated literals then try to replace
each such context by the bare base relation; since the base relation names
the context uniquely in the positive part, the replacement preserves
semantics while shrinking the literal.

*/

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::{
  abstractions::IString,
  literal::{Cube, PredicateOperation},
  stats,
  term::{
    relation::{self, RelationId, RelationOperation},
    set::{self, SetId, SetOperation},
  },
};

type CanonicalParents = BTreeMap<RelationId, BTreeSet<RelationId>>;
type ReplaceMap = HashMap<IString, Vec<RelationId>>;

fn update_parent_map_relation(rel: RelationId, parent_map: &mut CanonicalParents) {
  let entry = relation::get(rel);
  match entry.operation() {
    RelationOperation::Intersection | RelationOperation::Composition => {
      let left = entry.left().unwrap();
      let right = entry.right().unwrap();
      // Only contexts pinned by a set identity restrict their operands.
      if relation::get(left).operation() == RelationOperation::SetIdentity
          || relation::get(right).operation() == RelationOperation::SetIdentity
      {
        parent_map.entry(left).or_default().insert(rel);
        parent_map.entry(right).or_default().insert(rel);
      }
      update_parent_map_relation(left, parent_map);
      update_parent_map_relation(right, parent_map);
    }
    RelationOperation::Union => {
      let left = entry.left().unwrap();
      let right = entry.right().unwrap();
      // A union is conjunctive only when both branches are set identities.
      if relation::get(left).operation() == RelationOperation::SetIdentity
          && relation::get(right).operation() == RelationOperation::SetIdentity
      {
        parent_map.entry(left).or_default().insert(rel);
        parent_map.entry(right).or_default().insert(rel);
      }
      update_parent_map_relation(left, parent_map);
      update_parent_map_relation(right, parent_map);
    }
    RelationOperation::Converse | RelationOperation::TransitiveClosure => {
      update_parent_map_relation(entry.left().unwrap(), parent_map);
    }
    RelationOperation::BaseRelation
    | RelationOperation::Id
    | RelationOperation::Empty
    | RelationOperation::Full
    | RelationOperation::SetIdentity => {}
    RelationOperation::CartesianProduct => unreachable!("cartesian products are not supported"),
  }
}

fn update_parent_map_set(set_id: SetId, parent_map: &mut CanonicalParents) {
  let entry = set::get(set_id);
  match entry.operation() {
    SetOperation::Event | SetOperation::BaseSet | SetOperation::FullSet | SetOperation::EmptySet => {
    }
    SetOperation::Image | SetOperation::Domain => {
      update_parent_map_relation(entry.relation().unwrap(), parent_map);
      update_parent_map_set(entry.left().unwrap(), parent_map);
    }
    SetOperation::Intersection | SetOperation::Union => {
      update_parent_map_set(entry.left().unwrap(), parent_map);
      update_parent_map_set(entry.right().unwrap(), parent_map);
    }
  }
}

fn greatest_common_conjunctive_context(cube: &Cube) -> ReplaceMap {
  let mut parent_map = CanonicalParents::new();
  for literal in cube.iter().filter(|literal| !literal.negated) {
    if literal.operation == PredicateOperation::SetNonEmptiness {
      update_parent_map_set(literal.set.unwrap(), &mut parent_map);
    }
  }

  let mut common_contexts = ReplaceMap::new();
  for &rel in parent_map.keys() {
    if relation::get(rel).operation() != RelationOperation::BaseRelation {
      continue;
    }
    let name = relation::get(rel).identifier().unwrap();
    let mut current = rel;
    while let Some(parents) = parent_map.get(&current) {
      if parents.len() != 1 {
        break;
      }
      current = *parents.iter().next().unwrap();
      common_contexts.entry(name).or_default().push(current);
    }
    // Largest context first: try to replace the outermost chain link before
    // its sub-contexts.
    if let Some(contexts) = common_contexts.get_mut(&name) {
      contexts.reverse();
    }
  }
  common_contexts
}

/// Replaces, in every negated literal, each greatest common conjunctive
/// context by the base relation it canonicalizes into, whenever the
/// substitution yields a strictly smaller literal.
pub fn eliminate_redundant_conjunctive_contexts(cube: &mut Cube) {
  let common_contexts = greatest_common_conjunctive_context(cube);
  if common_contexts.is_empty() {
    return;
  }

  for literal in cube.iter_mut().filter(|literal| literal.negated) {
    if literal.operation != PredicateOperation::SetNonEmptiness {
      continue;
    }
    for (&base_relation, contexts) in &common_contexts {
      for &context in contexts {
        let replaced =
            literal.substitute_all_relation(context, relation::base_relation(base_relation));
        let accepted = match &replaced {
          Some(smaller) => {
            set::get(smaller.set.unwrap()).text().len()
                < set::get(literal.set.unwrap()).text().len()
          }
          None => false,
        };
        stats::boolean("reduced literals - preprocessing", accepted);
        if accepted {
          *literal = replaced.unwrap();
        }
      }
    }
  }
}

/// Runs the goal-level preprocessing pass.
pub fn preprocess(cube: &mut Cube) {
  eliminate_redundant_conjunctive_contexts(cube);
  debug!("preprocessing done");
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    annotation::annotated,
    literal::Literal,
  };

  #[test]
  fn replaces_identity_guarded_context_in_negated_literal() {
    // Positive part uses ([W];b), so a negated occurrence of ([W];b) may be
    // collapsed to b.
    let w = set::base_set(IString::from("W"));
    let b = relation::base_relation(IString::from("b"));
    let guarded = relation::composition(relation::set_identity(w), b);

    let e1 = set::event(0);
    let e2 = set::event(1);
    let positive = set::intersection(set::image(e1, guarded), e2);
    let negative = set::intersection(set::image(e1, guarded), e2);

    let mut cube = vec![
      Literal::set_nonempty(positive),
      Literal::negated_set_nonempty((negative, annotated::make_with_value(negative, (1, 1)))),
    ];
    let original_len = set::get(cube[1].set.unwrap()).text().len();

    eliminate_redundant_conjunctive_contexts(&mut cube);

    let reduced = &cube[1];
    assert!(set::get(reduced.set.unwrap()).text().len() < original_len);
    assert!(set::get(reduced.set.unwrap()).text().contains('b'));
    assert!(!set::get(reduced.set.unwrap()).text().contains('W'));
    // The positive literal is untouched.
    assert_eq!(cube[0].set, Some(positive));
  }

  #[test]
  fn unguarded_contexts_are_left_alone() {
    let a = relation::base_relation(IString::from("a"));
    let b = relation::base_relation(IString::from("b"));
    let composed = relation::composition(a, b);

    let e1 = set::event(0);
    let e2 = set::event(1);
    let positive = set::intersection(set::image(e1, composed), e2);
    let negative = set::intersection(set::image(e1, composed), e2);

    let mut cube = vec![
      Literal::set_nonempty(positive),
      Literal::negated_set_nonempty((negative, annotated::make_with_value(negative, (1, 1)))),
    ];
    let before = cube.clone();
    eliminate_redundant_conjunctive_contexts(&mut cube);
    assert_eq!(cube, before);
  }
}
