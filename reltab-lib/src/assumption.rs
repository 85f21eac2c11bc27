/*!

The process-wide assumption store.

Assumptions arrive from the parsed proof file before the first goal is
solved and stay fixed for the run:

 - base-relation assumptions `R ≤ b` keyed by the base relation name,
 - base-set assumptions `S ≤ B` keyed by the base set name,
 - id assumptions `R ≤ id`,
 - emptiness assumptions `R ≤ 0` (axioms land here after rewriting).

`master_id_relation()` is the union of all id-bounded relations, built once
on first use.

*/

use std::cell::RefCell;
use std::collections::HashMap;

use crate::{
  abstractions::IString,
  term::relation::{self, RelationId},
  term::set::SetId,
};

#[derive(Default)]
struct Store {
  base_assumptions    : HashMap<IString, RelationId>,
  base_set_assumptions: HashMap<IString, SetId>,
  id_assumptions      : Vec<RelationId>,
  emptiness_assumptions: Vec<RelationId>,
  master_id           : Option<RelationId>,
}

thread_local! {
  static STORE: RefCell<Store> = RefCell::new(Store::default());
}

pub fn add_base_assumption(base_relation: IString, relation: RelationId) {
  STORE.with(|store| {
    store.borrow_mut().base_assumptions.insert(base_relation, relation);
  });
}

pub fn base_assumption(base_relation: IString) -> Option<RelationId> {
  STORE.with(|store| store.borrow().base_assumptions.get(&base_relation).copied())
}

pub fn base_assumptions() -> Vec<(IString, RelationId)> {
  STORE.with(|store| {
    let mut assumptions: Vec<_> = store
        .borrow()
        .base_assumptions
        .iter()
        .map(|(&name, &relation)| (name, relation))
        .collect();
    assumptions.sort_by_key(|&(name, _)| name);
    assumptions
  })
}

pub fn add_base_set_assumption(base_set: IString, set: SetId) {
  STORE.with(|store| {
    store.borrow_mut().base_set_assumptions.insert(base_set, set);
  });
}

pub fn base_set_assumption(base_set: IString) -> Option<SetId> {
  STORE.with(|store| store.borrow().base_set_assumptions.get(&base_set).copied())
}

pub fn base_set_assumptions() -> Vec<(IString, SetId)> {
  STORE.with(|store| {
    let mut assumptions: Vec<_> = store
        .borrow()
        .base_set_assumptions
        .iter()
        .map(|(&name, &set)| (name, set))
        .collect();
    assumptions.sort_by_key(|&(name, _)| name);
    assumptions
  })
}

pub fn add_id_assumption(relation: RelationId) {
  STORE.with(|store| {
    let mut store = store.borrow_mut();
    store.id_assumptions.push(relation);
    store.master_id = None;
  });
}

pub fn id_assumptions() -> Vec<RelationId> {
  STORE.with(|store| store.borrow().id_assumptions.clone())
}

pub fn has_id_assumptions() -> bool {
  STORE.with(|store| !store.borrow().id_assumptions.is_empty())
}

pub fn add_emptiness_assumption(relation: RelationId) {
  STORE.with(|store| store.borrow_mut().emptiness_assumptions.push(relation));
}

pub fn emptiness_assumptions() -> Vec<RelationId> {
  STORE.with(|store| store.borrow().emptiness_assumptions.clone())
}

pub fn assumption_count() -> usize {
  STORE.with(|store| {
    let store = store.borrow();
    store.base_assumptions.len()
        + store.base_set_assumptions.len()
        + store.id_assumptions.len()
        + store.emptiness_assumptions.len()
  })
}

/// The union of all id-bounded relations, constructed once.
pub fn master_id_relation() -> RelationId {
  STORE.with(|store| {
    let mut store = store.borrow_mut();
    if let Some(master_id) = store.master_id {
      return master_id;
    }
    let master_id = store
        .id_assumptions
        .iter()
        .copied()
        .reduce(relation::union)
        .unwrap_or_else(relation::empty_relation);
    store.master_id = Some(master_id);
    master_id
  })
}

/// Drops every assumption. Test support; production runs populate the store
/// once and never clear it.
pub fn clear() {
  STORE.with(|store| *store.borrow_mut() = Store::default());
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn master_id_is_cached_union() {
    clear();
    let r = relation::base_relation(IString::from("r"));
    let s = relation::base_relation(IString::from("s"));
    add_id_assumption(r);
    assert_eq!(master_id_relation(), r);
    add_id_assumption(s);
    assert_eq!(master_id_relation(), relation::union(r, s));
    assert_eq!(master_id_relation(), master_id_relation());
    clear();
  }

  #[test]
  fn base_assumptions_are_keyed_by_name() {
    clear();
    let r = relation::base_relation(IString::from("r"));
    add_base_assumption(IString::from("s"), r);
    assert_eq!(base_assumption(IString::from("s")), Some(r));
    assert_eq!(base_assumption(IString::from("t")), None);
    clear();
  }
}
