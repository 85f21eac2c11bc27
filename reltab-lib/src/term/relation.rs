/*!

Canonical relation terms.

Relations are opaque to event labels: renaming a set term does not descend
into its relation operands, and relation terms carry no event data. The
`SetIdentity` operator `[S]` embeds a set term; `CartesianProduct` can be
constructed but every rule rejects it.

*/

use std::cell::RefCell;
use std::collections::HashMap;

use crate::{
  abstractions::IString,
  term::set::{self, SetId},
};

/// Canonical id of a relation term. Equality and hashing go through the id.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RelationId(u32);

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RelationOperation {
  BaseRelation,      // nullary constant: named base relation
  Id,                // nullary constant
  Empty,             // nullary constant
  Full,              // nullary constant
  Union,             // binary
  Intersection,      // binary
  Composition,       // binary
  TransitiveClosure, // unary
  Converse,          // unary
  SetIdentity,       // [S]
  CartesianProduct,  // rejected at rule time
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct RelationNode {
  operation : RelationOperation,
  left      : Option<RelationId>,
  right     : Option<RelationId>,
  identifier: Option<IString>,
  set       : Option<SetId>,
}

pub struct RelationEntry {
  node: RelationNode,
  text: String,
}

impl RelationEntry {
  #[inline(always)]
  pub fn operation(&self) -> RelationOperation { self.node.operation }

  #[inline(always)]
  pub fn left(&self) -> Option<RelationId> { self.node.left }

  #[inline(always)]
  pub fn right(&self) -> Option<RelationId> { self.node.right }

  #[inline(always)]
  pub fn identifier(&self) -> Option<IString> { self.node.identifier }

  #[inline(always)]
  pub fn set(&self) -> Option<SetId> { self.node.set }

  /// Cached printed form.
  #[inline(always)]
  pub fn text(&self) -> &str { &self.text }
}

struct RelationUniverse {
  entries: Vec<&'static RelationEntry>,
  cache  : HashMap<RelationNode, RelationId>,
}

thread_local! {
  static UNIVERSE: RefCell<RelationUniverse> = RefCell::new(RelationUniverse {
    entries: Vec::new(),
    cache  : HashMap::new(),
  });
}

#[inline]
pub fn get(id: RelationId) -> &'static RelationEntry {
  UNIVERSE.with(|universe| universe.borrow().entries[id.0 as usize])
}

fn intern(node: RelationNode) -> RelationId {
  if let Some(id) = UNIVERSE.with(|universe| universe.borrow().cache.get(&node).copied()) {
    return id;
  }
  validate_node(&node);
  let text = render(&node);
  let entry: &'static RelationEntry = Box::leak(Box::new(RelationEntry { node: node.clone(), text }));
  UNIVERSE.with(|universe| {
    let mut universe = universe.borrow_mut();
    let id = RelationId(universe.entries.len() as u32);
    universe.entries.push(entry);
    universe.cache.insert(node, id);
    id
  })
}

fn validate_node(node: &RelationNode) {
  match node.operation {
    RelationOperation::BaseRelation => {
      debug_assert!(node.identifier.is_some() && node.left.is_none() && node.right.is_none() && node.set.is_none());
    }
    RelationOperation::Id | RelationOperation::Empty | RelationOperation::Full => {
      debug_assert!(node.identifier.is_none() && node.left.is_none() && node.right.is_none() && node.set.is_none());
    }
    RelationOperation::Union
    | RelationOperation::Intersection
    | RelationOperation::Composition
    | RelationOperation::CartesianProduct => {
      debug_assert!(node.left.is_some() && node.right.is_some() && node.identifier.is_none() && node.set.is_none());
    }
    RelationOperation::TransitiveClosure | RelationOperation::Converse => {
      debug_assert!(node.left.is_some() && node.right.is_none() && node.identifier.is_none() && node.set.is_none());
    }
    RelationOperation::SetIdentity => {
      debug_assert!(node.set.is_some() && node.left.is_none() && node.right.is_none() && node.identifier.is_none());
    }
  }
}

fn render(node: &RelationNode) -> String {
  match node.operation {
    RelationOperation::BaseRelation => node.identifier.unwrap().to_string(),
    RelationOperation::Id    => "id".to_string(),
    RelationOperation::Empty => "0".to_string(),
    RelationOperation::Full  => "T".to_string(),
    RelationOperation::Union => {
      format!("({} | {})", get(node.left.unwrap()).text(), get(node.right.unwrap()).text())
    }
    RelationOperation::Intersection => {
      format!("({} & {})", get(node.left.unwrap()).text(), get(node.right.unwrap()).text())
    }
    RelationOperation::Composition => {
      format!("({};{})", get(node.left.unwrap()).text(), get(node.right.unwrap()).text())
    }
    RelationOperation::CartesianProduct => {
      format!("({} x {})", get(node.left.unwrap()).text(), get(node.right.unwrap()).text())
    }
    RelationOperation::TransitiveClosure => format!("{}^*", get(node.left.unwrap()).text()),
    RelationOperation::Converse => format!("{}^-1", get(node.left.unwrap()).text()),
    RelationOperation::SetIdentity => format!("[{}]", set::get(node.set.unwrap()).text()),
  }
}

fn simple(operation: RelationOperation, identifier: Option<IString>) -> RelationId {
  intern(RelationNode { operation, left: None, right: None, identifier, set: None })
}

pub fn base_relation(identifier: IString) -> RelationId {
  simple(RelationOperation::BaseRelation, Some(identifier))
}

pub fn id_relation() -> RelationId { simple(RelationOperation::Id, None) }

pub fn empty_relation() -> RelationId { simple(RelationOperation::Empty, None) }

pub fn full_relation() -> RelationId { simple(RelationOperation::Full, None) }

pub fn set_identity(set: SetId) -> RelationId {
  intern(RelationNode {
    operation: RelationOperation::SetIdentity,
    left: None,
    right: None,
    identifier: None,
    set: Some(set),
  })
}

pub fn binary(operation: RelationOperation, left: RelationId, right: RelationId) -> RelationId {
  debug_assert!(matches!(
    operation,
    RelationOperation::Union
      | RelationOperation::Intersection
      | RelationOperation::Composition
      | RelationOperation::CartesianProduct
  ));
  intern(RelationNode {
    operation,
    left: Some(left),
    right: Some(right),
    identifier: None,
    set: None,
  })
}

pub fn unary(operation: RelationOperation, left: RelationId) -> RelationId {
  debug_assert!(matches!(
    operation,
    RelationOperation::TransitiveClosure | RelationOperation::Converse
  ));
  intern(RelationNode { operation, left: Some(left), right: None, identifier: None, set: None })
}

pub fn union(left: RelationId, right: RelationId) -> RelationId {
  binary(RelationOperation::Union, left, right)
}

pub fn intersection(left: RelationId, right: RelationId) -> RelationId {
  binary(RelationOperation::Intersection, left, right)
}

pub fn composition(left: RelationId, right: RelationId) -> RelationId {
  binary(RelationOperation::Composition, left, right)
}

pub fn converse(left: RelationId) -> RelationId { unary(RelationOperation::Converse, left) }

pub fn transitive_closure(left: RelationId) -> RelationId {
  unary(RelationOperation::TransitiveClosure, left)
}

pub fn cartesian_product(left: RelationId, right: RelationId) -> RelationId {
  binary(RelationOperation::CartesianProduct, left, right)
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_is_canonical() {
    let a = base_relation(IString::from("a"));
    let b = base_relation(IString::from("b"));
    assert_eq!(a, base_relation(IString::from("a")));
    assert_ne!(a, b);
    assert_eq!(composition(a, b), composition(a, b));
    assert_ne!(composition(a, b), composition(b, a));
  }

  #[test]
  fn printed_forms() {
    let a = base_relation(IString::from("a"));
    assert_eq!(get(transitive_closure(a)).text(), "a^*");
    assert_eq!(get(converse(a)).text(), "a^-1");
    assert_eq!(get(union(a, id_relation())).text(), "(a | id)");
    let s = set::base_set(IString::from("W"));
    assert_eq!(get(set_identity(s)).text(), "[W]");
  }
}
