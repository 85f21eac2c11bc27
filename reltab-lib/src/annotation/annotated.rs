/*!

Operations on annotated terms: a set or relation term paired with a
saturation annotation whose shape tracks the term's branching structure.

Descent happens in lock-step. Binary term operators move the annotation to
its left/right child; unary relation operators (`converse`, transitive
closure) and the set-identity embedding do *not* move the annotation, since
the annotation tree reflects branching only.

*/

use crate::{
  annotation::{self, AnnotationId, Saturation},
  term::{
    relation::{self, RelationId, RelationOperation},
    set::{self, SetId, SetOperation},
  },
};

pub type AnnotatedSet = (SetId, AnnotationId);
pub type AnnotatedRelation = (RelationId, AnnotationId);

pub fn get_left(annotated_set: AnnotatedSet) -> AnnotatedSet {
  let (set, annotation) = annotated_set;
  let entry = set::get(set);
  debug_assert!(entry.left().is_some());
  (entry.left().unwrap(), annotation::get_left(annotation))
}

pub fn get_right_set(annotated_set: AnnotatedSet) -> AnnotatedSet {
  let (set, annotation) = annotated_set;
  let entry = set::get(set);
  match entry.operation() {
    SetOperation::Union | SetOperation::Intersection => {
      (entry.right().unwrap(), annotation::get_right(annotation))
    }
    _ => unreachable!("right set operand of a non-binary set term"),
  }
}

pub fn get_right_relation(annotated_set: AnnotatedSet) -> AnnotatedRelation {
  let (set, annotation) = annotated_set;
  let entry = set::get(set);
  match entry.operation() {
    SetOperation::Image | SetOperation::Domain => {
      (entry.relation().unwrap(), annotation::get_right(annotation))
    }
    _ => unreachable!("relation operand of a non-modal set term"),
  }
}

pub fn relation_get_left(annotated_relation: AnnotatedRelation) -> AnnotatedRelation {
  let (rel, annotation) = annotated_relation;
  let entry = relation::get(rel);
  match entry.operation() {
    // On unary operators the left move does not descend the annotation.
    RelationOperation::Converse | RelationOperation::TransitiveClosure => {
      (entry.left().unwrap(), annotation)
    }
    RelationOperation::Union | RelationOperation::Intersection | RelationOperation::Composition => {
      (entry.left().unwrap(), annotation::get_left(annotation))
    }
    RelationOperation::CartesianProduct => unreachable!("cartesian products are not supported"),
    _ => unreachable!("left operand of a nullary relation term"),
  }
}

/// Set operand of `[S]`. Transparent to the annotation.
pub fn relation_get_set(annotated_relation: AnnotatedRelation) -> AnnotatedSet {
  let (rel, annotation) = annotated_relation;
  let entry = relation::get(rel);
  debug_assert_eq!(entry.operation(), RelationOperation::SetIdentity);
  (entry.set().unwrap(), annotation)
}

pub fn relation_get_right(annotated_relation: AnnotatedRelation) -> AnnotatedRelation {
  let (rel, annotation) = annotated_relation;
  let entry = relation::get(rel);
  debug_assert!(entry.right().is_some());
  (entry.right().unwrap(), annotation::get_right(annotation))
}

// Wrapped term constructors keeping the annotation in shape.

pub fn new_set(
  operation: SetOperation,
  left: AnnotatedSet,
  right: AnnotatedSet,
) -> AnnotatedSet {
  (
    set::binary(operation, left.0, right.0),
    annotation::meet_annotation(left.1, right.1),
  )
}

pub fn new_modal_set(
  operation: SetOperation,
  left: AnnotatedSet,
  rel: AnnotatedRelation,
) -> AnnotatedSet {
  (
    set::modal(operation, left.0, rel.0),
    annotation::meet_annotation(left.1, rel.1),
  )
}

pub fn new_relation(operation: RelationOperation, left: AnnotatedRelation) -> AnnotatedRelation {
  (relation::unary(operation, left.0), left.1)
}

pub fn new_relation_binary(
  operation: RelationOperation,
  left: AnnotatedRelation,
  right: AnnotatedRelation,
) -> AnnotatedRelation {
  (
    relation::binary(operation, left.0, right.0),
    annotation::meet_annotation(left.1, right.1),
  )
}

/// Builds an annotation shaped like the term's base-leaf skeleton with the
/// given value on every base leaf.
pub fn make_with_value(set: SetId, value: Saturation) -> AnnotationId {
  let entry = set::get(set);
  match entry.operation() {
    SetOperation::Event | SetOperation::EmptySet | SetOperation::FullSet => annotation::none(),
    SetOperation::BaseSet => annotation::leaf(value),
    SetOperation::Union | SetOperation::Intersection => {
      let left  = make_with_value(entry.left().unwrap(), value);
      let right = make_with_value(entry.right().unwrap(), value);
      annotation::meet_annotation(left, right)
    }
    SetOperation::Image | SetOperation::Domain => {
      let left  = make_with_value(entry.left().unwrap(), value);
      let right = make_with_value_relation(entry.relation().unwrap(), value);
      annotation::meet_annotation(left, right)
    }
  }
}

pub fn make_with_value_relation(rel: RelationId, value: Saturation) -> AnnotationId {
  let entry = relation::get(rel);
  match entry.operation() {
    RelationOperation::Id | RelationOperation::Empty | RelationOperation::Full => annotation::none(),
    RelationOperation::BaseRelation => annotation::leaf(value),
    RelationOperation::SetIdentity => make_with_value(entry.set().unwrap(), value),
    RelationOperation::Union | RelationOperation::Intersection | RelationOperation::Composition => {
      let left  = make_with_value_relation(entry.left().unwrap(), value);
      let right = make_with_value_relation(entry.right().unwrap(), value);
      annotation::meet_annotation(left, right)
    }
    RelationOperation::Converse | RelationOperation::TransitiveClosure => {
      make_with_value_relation(entry.left().unwrap(), value)
    }
    RelationOperation::CartesianProduct => unreachable!("cartesian products are not supported"),
  }
}

/// Replaces every occurrence of `search` in the set expression, rebuilding
/// the annotation in lock-step. Replacements carry a zero annotation.
pub fn substitute_all(
  annotated_set: AnnotatedSet,
  search: SetId,
  replace: SetId,
) -> AnnotatedSet {
  let (set, _) = annotated_set;
  if set == search {
    return (replace, make_with_value(replace, (0, 0)));
  }
  let entry = set::get(set);
  match entry.operation() {
    SetOperation::Event | SetOperation::BaseSet | SetOperation::EmptySet | SetOperation::FullSet => {
      annotated_set
    }
    SetOperation::Image | SetOperation::Domain => {
      let left = substitute_all(get_left(annotated_set), search, replace);
      new_modal_set(entry.operation(), left, get_right_relation(annotated_set))
    }
    SetOperation::Union | SetOperation::Intersection => {
      let left  = substitute_all(get_left(annotated_set), search, replace);
      let right = substitute_all(get_right_set(annotated_set), search, replace);
      new_set(entry.operation(), left, right)
    }
  }
}

/// Replaces the `n`-th occurrence (in left-to-right order) of `search`.
/// `n` counts down as occurrences pass; the caller detects a hit by
/// comparing ids.
pub fn substitute(
  annotated_set: AnnotatedSet,
  search: SetId,
  replace: SetId,
  n: &mut i32,
) -> AnnotatedSet {
  debug_assert!(*n >= 0, "negative occurrence counter");
  let (set, _) = annotated_set;
  if *n == 0 {
    return annotated_set;
  }

  if set == search {
    if *n == 1 {
      return (replace, make_with_value(replace, (0, 0)));
    }
    *n -= 1;
    return annotated_set;
  }

  let entry = set::get(set);
  if entry.left().is_some() {
    let left = substitute(get_left(annotated_set), search, replace, n);
    if left.0 != entry.left().unwrap() {
      return match entry.operation() {
        SetOperation::Union | SetOperation::Intersection => {
          new_set(entry.operation(), left, get_right_set(annotated_set))
        }
        SetOperation::Image | SetOperation::Domain => {
          new_modal_set(entry.operation(), left, get_right_relation(annotated_set))
        }
        _ => unreachable!("left operand on a nullary set term"),
      };
    }
  }
  if entry.right().is_some() {
    let right = substitute(get_right_set(annotated_set), search, replace, n);
    if right.0 != entry.right().unwrap() {
      return new_set(entry.operation(), get_left(annotated_set), right);
    }
  }
  annotated_set
}

/// Replaces every occurrence of a relation sub-term inside a set expression.
pub fn substitute_all_relation(
  annotated_set: AnnotatedSet,
  search: RelationId,
  replace: RelationId,
) -> AnnotatedSet {
  let (set, _) = annotated_set;
  let entry = set::get(set);
  match entry.operation() {
    SetOperation::Event | SetOperation::BaseSet | SetOperation::EmptySet | SetOperation::FullSet => {
      annotated_set
    }
    SetOperation::Union | SetOperation::Intersection => {
      let left  = substitute_all_relation(get_left(annotated_set), search, replace);
      let right = substitute_all_relation(get_right_set(annotated_set), search, replace);
      new_set(entry.operation(), left, right)
    }
    SetOperation::Image | SetOperation::Domain => {
      let left = substitute_all_relation(get_left(annotated_set), search, replace);
      let rel  = substitute_all_relation_in_relation(get_right_relation(annotated_set), search, replace);
      new_modal_set(entry.operation(), left, rel)
    }
  }
}

fn substitute_all_relation_in_relation(
  annotated_relation: AnnotatedRelation,
  search: RelationId,
  replace: RelationId,
) -> AnnotatedRelation {
  let (rel, _) = annotated_relation;
  if rel == search {
    return (replace, make_with_value_relation(replace, (0, 0)));
  }
  let entry = relation::get(rel);
  match entry.operation() {
    RelationOperation::Union | RelationOperation::Intersection | RelationOperation::Composition => {
      let left  = substitute_all_relation_in_relation(relation_get_left(annotated_relation), search, replace);
      let right = substitute_all_relation_in_relation(relation_get_right(annotated_relation), search, replace);
      new_relation_binary(entry.operation(), left, right)
    }
    RelationOperation::Converse | RelationOperation::TransitiveClosure => {
      let left = substitute_all_relation_in_relation(relation_get_left(annotated_relation), search, replace);
      new_relation(entry.operation(), left)
    }
    RelationOperation::CartesianProduct => unreachable!("cartesian products are not supported"),
    _ => annotated_relation,
  }
}

/// Checks that the annotation is shaped consistently with the term: base
/// leaves carry a value, other leaves carry none.
pub fn validate(annotated_set: AnnotatedSet) -> bool {
  let (set, annotation) = annotated_set;
  let entry = set::get(set);
  match entry.operation() {
    SetOperation::BaseSet => {
      annotation::is_leaf(annotation) && annotation::value(annotation).is_some()
    }
    SetOperation::Event | SetOperation::EmptySet | SetOperation::FullSet => {
      annotation::is_leaf(annotation) && annotation::value(annotation).is_none()
    }
    SetOperation::Image | SetOperation::Domain => {
      validate(get_left(annotated_set)) && validate_relation(get_right_relation(annotated_set))
    }
    SetOperation::Union | SetOperation::Intersection => {
      validate(get_left(annotated_set)) && validate(get_right_set(annotated_set))
    }
  }
}

pub fn validate_relation(annotated_relation: AnnotatedRelation) -> bool {
  let (rel, annotation) = annotated_relation;
  let entry = relation::get(rel);
  match entry.operation() {
    RelationOperation::BaseRelation => {
      annotation::is_leaf(annotation) && annotation::value(annotation).is_some()
    }
    RelationOperation::Id | RelationOperation::Empty | RelationOperation::Full => {
      annotation::is_leaf(annotation) && annotation::value(annotation).is_none()
    }
    RelationOperation::Union | RelationOperation::Intersection | RelationOperation::Composition => {
      validate_relation(relation_get_left(annotated_relation))
          && validate_relation(relation_get_right(annotated_relation))
    }
    RelationOperation::Converse | RelationOperation::TransitiveClosure => {
      validate_relation(relation_get_left(annotated_relation))
    }
    RelationOperation::SetIdentity => validate(relation_get_set(annotated_relation)),
    RelationOperation::CartesianProduct => false,
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::abstractions::IString;

  #[test]
  fn make_with_value_tracks_base_leaf_skeleton() {
    let b = relation::base_relation(IString::from("b"));
    let term = set::intersection(set::image(set::event(0), b), set::event(1));
    let annotation = make_with_value(term, (1, 2));
    assert!(validate((term, annotation)));
    assert_eq!(annotation::value(annotation), Some((1, 2)));

    // Descending to the event side loses the annotation value.
    let right = get_right_set((term, annotation));
    assert_eq!(annotation::value(right.1), None);
    // Descending to the relation side keeps it.
    let left = get_left((term, annotation));
    let rel  = get_right_relation(left);
    assert_eq!(annotation::value(rel.1), Some((1, 2)));
  }

  #[test]
  fn unary_relation_operators_do_not_descend() {
    let b  = relation::base_relation(IString::from("b"));
    let tc = relation::transitive_closure(b);
    let annotation = make_with_value_relation(tc, (0, 1));
    let inner = relation_get_left((tc, annotation));
    assert_eq!(inner.1, annotation);
    assert_eq!(inner.0, b);
  }

  #[test]
  fn substitute_nth_occurrence() {
    let b = relation::base_relation(IString::from("b"));
    let e = set::event(0);
    let term = set::intersection(set::image(e, b), set::image(e, b));
    let annotation = make_with_value(term, (0, 1));

    let mut n = 2;
    let (substituted, _) = substitute((term, annotation), e, set::event(5), &mut n);
    let entry = set::get(substituted);
    // Only the second occurrence changed.
    let left  = set::get(entry.left().unwrap());
    let right = set::get(entry.right().unwrap());
    assert_eq!(left.left().unwrap(), e);
    assert_eq!(right.left().unwrap(), set::event(5));
  }

  #[test]
  fn substitute_all_replaces_everywhere() {
    let b = relation::base_relation(IString::from("b"));
    let e = set::event(0);
    let term = set::union(set::image(e, b), e);
    let annotation = make_with_value(term, (1, 1));
    let (substituted, substituted_annotation) =
        substitute_all((term, annotation), e, set::event(3));
    assert!(set::get(substituted).events().contains(3));
    assert!(!set::get(substituted).events().contains(0));
    assert!(validate((substituted, substituted_annotation)));
  }
}
