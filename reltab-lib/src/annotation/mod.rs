/*!

Hash-consed leaf annotations for binary tree-shaped terms.

Let T be a binary tree-like structure. A leaf annotation maps each leaf of T
to a value in a lattice, or to a special empty value. The `Annotation` DAG is
a summarized representation:

 1. If all leaves of a subtree carry the same (possibly empty) value, the
    whole subtree collapses to a single node carrying that value. A lone
    valueless leaf therefore represents the constant empty annotation of
    *any* tree shape.
 2. A non-leaf node's value is the meet of its children's values, i.e. the
    least annotation found below it. The empty value is the top of the meet.
 3. Nodes are always binary; unary moves on T are not reflected in the
    annotation at all.

Traversing T and its annotation therefore happens in lock-step, where only
*branching* moves on T move the annotation (see [`crate::annotation::annotated`]).

The annotation values used by the engine are saturation budgets: pairs
`(id, base)` of remaining id-saturations and base-saturations.

*/

pub mod annotated;

use std::cell::RefCell;
use std::collections::HashMap;

/// Remaining saturation budget `(id, base)`.
pub type Saturation = (i32, i32);

/// Canonical id of an annotation node.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct AnnotationId(u32);

#[derive(Clone, PartialEq, Eq, Hash)]
struct AnnotationNode {
  value: Option<Saturation>,
  left : Option<AnnotationId>,
  right: Option<AnnotationId>,
}

struct AnnotationUniverse {
  entries: Vec<AnnotationNode>,
  cache  : HashMap<AnnotationNode, AnnotationId>,
}

thread_local! {
  static UNIVERSE: RefCell<AnnotationUniverse> = RefCell::new(AnnotationUniverse {
    entries: Vec::new(),
    cache  : HashMap::new(),
  });
}

fn intern(node: AnnotationNode) -> AnnotationId {
  // No value => leaf.
  debug_assert!(node.value.is_some() || (node.left.is_none() && node.right.is_none()));
  // Binary or leaf.
  debug_assert!(node.left.is_none() == node.right.is_none());
  UNIVERSE.with(|universe| {
    let mut universe = universe.borrow_mut();
    if let Some(&id) = universe.cache.get(&node) {
      return id;
    }
    let id = AnnotationId(universe.entries.len() as u32);
    universe.entries.push(node.clone());
    universe.cache.insert(node, id);
    id
  })
}

fn node(id: AnnotationId) -> AnnotationNode {
  UNIVERSE.with(|universe| universe.borrow().entries[id.0 as usize].clone())
}

/// The meet of two budget values; the empty value is the top. Complex terms
/// should indicate if some subterm can still be saturated, hence the
/// componentwise maximum.
fn meet(a: Option<Saturation>, b: Option<Saturation>) -> Option<Saturation> {
  match (a, b) {
    (None, None)       => None,
    (None, some)       => some,
    (some, None)       => some,
    (Some(x), Some(y)) => Some((x.0.max(y.0), x.1.max(y.1))),
  }
}

/// The singleton "no annotation anywhere" leaf.
pub fn none() -> AnnotationId {
  intern(AnnotationNode { value: None, left: None, right: None })
}

pub fn leaf(value: Saturation) -> AnnotationId {
  intern(AnnotationNode { value: Some(value), left: None, right: None })
}

pub fn value(id: AnnotationId) -> Option<Saturation> {
  node(id).value
}

pub fn is_leaf(id: AnnotationId) -> bool {
  let entry = node(id);
  entry.left.is_none() && entry.right.is_none()
}

/// A non-present child returns the node itself, keeping traversal in
/// lock-step with the annotated tree.
pub fn get_left(id: AnnotationId) -> AnnotationId {
  node(id).left.unwrap_or(id)
}

pub fn get_right(id: AnnotationId) -> AnnotationId {
  node(id).right.unwrap_or(id)
}

/// Combines two annotations below a fresh binary node. Two identical constant
/// annotations combine to themselves, so `meet_annotation(none(), none())`
/// stays `none()`.
pub fn meet_annotation(left: AnnotationId, right: AnnotationId) -> AnnotationId {
  if left == right && is_leaf(left) {
    return left;
  }
  let met = meet(value(left), value(right));
  debug_assert!(met.is_some(), "meet of distinct annotations without value");
  intern(AnnotationNode { value: met, left: Some(left), right: Some(right) })
}

/// The pointwise smaller annotation (relative to remaining budgets). Used to
/// bound saturation cost on cache lookups.
pub fn min(first: AnnotationId, second: AnnotationId) -> AnnotationId {
  if is_leaf(first) && value(first) <= value(second) {
    return first;
  }
  if is_leaf(second) && value(second) <= value(first) {
    return second;
  }
  let min_left  = min(get_left(first), get_left(second));
  let min_right = min(get_right(first), get_right(second));
  meet_annotation(min_left, min_right)
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn none_is_a_singleton() {
    assert_eq!(none(), none());
    assert!(is_leaf(none()));
    assert_eq!(value(none()), None);
    assert_eq!(meet_annotation(none(), none()), none());
  }

  #[test]
  fn lockstep_children_of_leaf_are_self() {
    let leaf = leaf((1, 2));
    assert_eq!(get_left(leaf), leaf);
    assert_eq!(get_right(leaf), leaf);
  }

  #[test]
  fn meet_takes_componentwise_maximum() {
    let combined = meet_annotation(leaf((0, 2)), leaf((1, 0)));
    assert_eq!(value(combined), Some((1, 2)));
    assert_eq!(value(get_left(combined)), Some((0, 2)));
    assert_eq!(value(get_right(combined)), Some((1, 0)));
  }

  #[test]
  fn meet_is_commutative_and_idempotent_up_to_sharing() {
    let a = leaf((1, 1));
    let b = meet_annotation(leaf((0, 0)), leaf((2, 2)));
    assert_eq!(meet_annotation(a, a), a);
    assert_eq!(value(meet_annotation(a, b)), value(meet_annotation(b, a)));
  }

  #[test]
  fn min_is_pointwise_smaller() {
    let left  = meet_annotation(leaf((0, 1)), leaf((1, 0)));
    let right = meet_annotation(leaf((1, 1)), leaf((0, 0)));
    let minimum = min(left, right);
    assert_eq!(value(get_left(minimum)), Some((0, 1)));
    assert_eq!(value(get_right(minimum)), Some((0, 0)));
  }
}
