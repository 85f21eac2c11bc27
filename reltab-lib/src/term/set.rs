/*!

Canonical set terms.

A set term is one of: a base set, a single event, the empty or full set, a
union or intersection of two set terms, or the image/domain of a set term
under a relation term (`image(S, r)` prints as `(S;r)`, `domain(S, r)` as
`(r;S)`).

A set term is *normal* if every base relation below it occurs only inside a
minimal `event.baseRelation` or `baseRelation.event` sub-term, every base set
occurs unqualified, and unions appear only above events. Normality is the
contract on literals handed from the local to the regular tableau.

*/

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use enumflags2::{bitflags, BitFlags};

use crate::{
  abstractions::{event_set_of, event_set_union, EventSet, IString},
  term::{
    relation::{self, RelationId, RelationOperation},
    renaming::Renaming,
    Event,
  },
};

/// Canonical id of a set term. Equality and hashing go through the id.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SetId(u32);

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum SetOperation {
  BaseSet,      // nullary constant: named base set
  Event,        // nullary constant: single labelled event
  EmptySet,     // nullary constant
  FullSet,      // nullary constant
  Union,        // binary
  Intersection, // binary
  Image,        // set ; relation
  Domain,       // relation ; set
}

impl SetOperation {
  /// Swaps `Image` and `Domain`; identity on everything else.
  pub fn opposite(self) -> SetOperation {
    match self {
      SetOperation::Image  => SetOperation::Domain,
      SetOperation::Domain => SetOperation::Image,
      other => other,
    }
  }
}

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SetProperty {
  /// Every base symbol occurs in a canonical event context.
  Normal,
  HasFullSet,
  HasBaseSet,
}
pub type SetProperties = BitFlags<SetProperty>;

/// The structural part of a set node. Operand slots are populated exactly as
/// the operator demands; the factory validates this.
#[derive(Clone, PartialEq, Eq, Hash)]
struct SetNode {
  operation : SetOperation,
  left      : Option<SetId>,
  right     : Option<SetId>,
  relation  : Option<RelationId>,
  label     : Option<Event>,
  identifier: Option<IString>,
}

/// An interned set term together with its cached derived data.
pub struct SetEntry {
  node: SetNode,

  properties      : SetProperties,
  events          : EventSet,
  normal_events   : EventSet,
  event_base_pairs: Vec<SetId>,
  text            : String,
}

impl SetEntry {
  #[inline(always)]
  pub fn operation(&self) -> SetOperation { self.node.operation }

  #[inline(always)]
  pub fn left(&self) -> Option<SetId> { self.node.left }

  #[inline(always)]
  pub fn right(&self) -> Option<SetId> { self.node.right }

  #[inline(always)]
  pub fn relation(&self) -> Option<RelationId> { self.node.relation }

  #[inline(always)]
  pub fn label(&self) -> Option<Event> { self.node.label }

  #[inline(always)]
  pub fn identifier(&self) -> Option<IString> { self.node.identifier }

  #[inline(always)]
  pub fn is_event(&self) -> bool { self.node.operation == SetOperation::Event }

  #[inline(always)]
  pub fn is_normal(&self) -> bool { self.properties.contains(SetProperty::Normal) }

  #[inline(always)]
  pub fn has_full_set(&self) -> bool { self.properties.contains(SetProperty::HasFullSet) }

  #[inline(always)]
  pub fn has_base_set(&self) -> bool { self.properties.contains(SetProperty::HasBaseSet) }

  /// All event labels occurring in the term, ascending.
  #[inline(always)]
  pub fn events(&self) -> &EventSet { &self.events }

  /// Events of the unique event form that root a normal sub-literal.
  #[inline(always)]
  pub fn normal_events(&self) -> &EventSet { &self.normal_events }

  /// The minimal normal sub-terms `e.b` / `b.e` below this term.
  #[inline(always)]
  pub fn event_base_pairs(&self) -> &[SetId] { &self.event_base_pairs }

  /// Cached printed form. Used for the content-based literal order.
  #[inline(always)]
  pub fn text(&self) -> &str { &self.text }
}

struct SetUniverse {
  entries: Vec<&'static SetEntry>,
  cache  : HashMap<SetNode, SetId>,
}

thread_local! {
  static UNIVERSE: RefCell<SetUniverse> = RefCell::new(SetUniverse {
    entries: Vec::new(),
    cache  : HashMap::new(),
  });
  // Monotonic counter for globally fresh events.
  static MAX_EVENT: Cell<Event> = const { Cell::new(0) };
}

/// Resolves a set id. Entries are interned for the lifetime of the process,
/// so the reference is `'static`.
#[inline]
pub fn get(id: SetId) -> &'static SetEntry {
  UNIVERSE.with(|universe| universe.borrow().entries[id.0 as usize])
}

fn intern(node: SetNode) -> SetId {
  if let Some(id) = UNIVERSE.with(|universe| universe.borrow().cache.get(&node).copied()) {
    return id;
  }
  // First insertion: populate the derived-data cache eagerly. The id is fixed
  // before initialization so the entry can refer to itself (minimal `e.b`
  // pairs are their own witness).
  let id = UNIVERSE.with(|universe| SetId(universe.borrow().entries.len() as u32));
  let entry: &'static SetEntry = Box::leak(Box::new(complete_initialization(node.clone(), id)));
  UNIVERSE.with(|universe| {
    let mut universe = universe.borrow_mut();
    debug_assert_eq!(universe.entries.len(), id.0 as usize);
    universe.entries.push(entry);
    universe.cache.insert(node, id);
  });
  id
}

fn validate_node(node: &SetNode) {
  let is_simple = node.left.is_none() && node.right.is_none() && node.relation.is_none();
  let has_label_or_id = node.label.is_some() || node.identifier.is_some();
  match node.operation {
    SetOperation::BaseSet => {
      debug_assert!(node.identifier.is_some() && node.label.is_none() && is_simple);
    }
    SetOperation::Event => {
      debug_assert!(node.label.is_some() && node.identifier.is_none() && is_simple);
    }
    SetOperation::EmptySet | SetOperation::FullSet => {
      debug_assert!(!has_label_or_id && is_simple);
    }
    SetOperation::Union | SetOperation::Intersection => {
      debug_assert!(!has_label_or_id);
      debug_assert!(node.left.is_some() && node.right.is_some() && node.relation.is_none());
    }
    SetOperation::Image | SetOperation::Domain => {
      debug_assert!(!has_label_or_id);
      debug_assert!(node.left.is_some() && node.relation.is_some() && node.right.is_none());
    }
  }
}

fn complete_initialization(node: SetNode, self_id: SetId) -> SetEntry {
  validate_node(&node);

  let left      = node.left.map(get);
  let right     = node.right.map(get);
  let rel_entry = node.relation.map(relation::get);

  let is_normal = match node.operation {
    SetOperation::FullSet | SetOperation::BaseSet => true,
    SetOperation::Event | SetOperation::Union | SetOperation::EmptySet => false,
    SetOperation::Intersection => left.unwrap().is_normal() && right.unwrap().is_normal(),
    SetOperation::Image | SetOperation::Domain => {
      if left.unwrap().is_event() {
        rel_entry.unwrap().operation() == RelationOperation::BaseRelation
      } else {
        left.unwrap().is_normal()
      }
    }
  };

  let events = match node.operation {
    SetOperation::Union | SetOperation::Intersection => {
      event_set_union(left.unwrap().events(), right.unwrap().events())
    }
    SetOperation::Image | SetOperation::Domain => left.unwrap().events().clone(),
    SetOperation::Event => event_set_of(node.label.unwrap()),
    _ => EventSet::default(),
  };

  let normal_events = match node.operation {
    SetOperation::Intersection => {
      event_set_union(left.unwrap().normal_events(), right.unwrap().normal_events())
    }
    SetOperation::Image | SetOperation::Domain => {
      if left.unwrap().is_event()
          && rel_entry.unwrap().operation() == RelationOperation::BaseRelation
      {
        event_set_of(left.unwrap().label().unwrap())
      } else {
        left.unwrap().normal_events().clone()
      }
    }
    _ => EventSet::default(),
  };

  let has_full_set = match node.operation {
    SetOperation::FullSet => true,
    SetOperation::Union | SetOperation::Intersection => {
      left.unwrap().has_full_set() || right.unwrap().has_full_set()
    }
    SetOperation::Image | SetOperation::Domain => left.unwrap().has_full_set(),
    _ => false,
  };

  let has_base_set = match node.operation {
    SetOperation::BaseSet => true,
    SetOperation::Union | SetOperation::Intersection => {
      left.unwrap().has_base_set() || right.unwrap().has_base_set()
    }
    SetOperation::Image | SetOperation::Domain => left.unwrap().has_base_set(),
    _ => false,
  };

  let text = render(&node);

  let mut properties = SetProperties::empty();
  if is_normal     { properties |= SetProperty::Normal; }
  if has_full_set  { properties |= SetProperty::HasFullSet; }
  if has_base_set  { properties |= SetProperty::HasBaseSet; }

  let event_base_pairs = calc_event_base_pairs(&node, self_id);

  SetEntry {
    node,
    properties,
    events,
    normal_events,
    event_base_pairs,
    text,
  }
}

fn calc_event_base_pairs(node: &SetNode, self_id: SetId) -> Vec<SetId> {
  let mut pairs: Vec<SetId> = match node.operation {
    SetOperation::Union | SetOperation::Intersection => {
      let mut left = get(node.left.unwrap()).event_base_pairs().to_vec();
      left.extend_from_slice(get(node.right.unwrap()).event_base_pairs());
      left
    }
    SetOperation::Image | SetOperation::Domain => {
      let left = get(node.left.unwrap());
      if left.is_event()
          && relation::get(node.relation.unwrap()).operation() == RelationOperation::BaseRelation
      {
        vec![self_id]
      } else {
        left.event_base_pairs().to_vec()
      }
    }
    _ => Vec::new(),
  };
  pairs.sort_unstable();
  pairs.dedup();
  pairs
}

fn render(node: &SetNode) -> String {
  match node.operation {
    SetOperation::Event   => node.label.unwrap().to_string(),
    SetOperation::BaseSet => node.identifier.unwrap().to_string(),
    SetOperation::EmptySet => "0".to_string(),
    SetOperation::FullSet  => "T".to_string(),
    SetOperation::Image => {
      format!("({};{})", get(node.left.unwrap()).text(), relation::get(node.relation.unwrap()).text())
    }
    SetOperation::Domain => {
      format!("({};{})", relation::get(node.relation.unwrap()).text(), get(node.left.unwrap()).text())
    }
    SetOperation::Intersection => {
      format!("({} & {})", get(node.left.unwrap()).text(), get(node.right.unwrap()).text())
    }
    SetOperation::Union => {
      format!("({} | {})", get(node.left.unwrap()).text(), get(node.right.unwrap()).text())
    }
  }
}

fn simple(operation: SetOperation, label: Option<Event>, identifier: Option<IString>) -> SetId {
  intern(SetNode { operation, left: None, right: None, relation: None, label, identifier })
}

pub fn empty_set() -> SetId { simple(SetOperation::EmptySet, None, None) }

pub fn full_set() -> SetId { simple(SetOperation::FullSet, None, None) }

pub fn base_set(identifier: IString) -> SetId {
  simple(SetOperation::BaseSet, None, Some(identifier))
}

pub fn event(label: Event) -> SetId {
  // Keep the fresh-event counter above every label ever mentioned, so fresh
  // events are strictly greater than all existing ones.
  MAX_EVENT.with(|max_event| {
    if max_event.get() <= label {
      max_event.set(label + 1);
    }
  });
  simple(SetOperation::Event, Some(label), None)
}

/// Allocates a globally unique event, strictly greater than every previously
/// mentioned event label.
pub fn fresh_event() -> SetId {
  let label = MAX_EVENT.with(|max_event| max_event.get());
  event(label)
}

/// `Union` or `Intersection` of two set terms.
pub fn binary(operation: SetOperation, left: SetId, right: SetId) -> SetId {
  debug_assert!(matches!(operation, SetOperation::Union | SetOperation::Intersection));
  intern(SetNode {
    operation,
    left: Some(left),
    right: Some(right),
    relation: None,
    label: None,
    identifier: None,
  })
}

/// `Image` or `Domain` of a set term under a relation.
pub fn modal(operation: SetOperation, left: SetId, relation: RelationId) -> SetId {
  debug_assert!(matches!(operation, SetOperation::Image | SetOperation::Domain));
  intern(SetNode {
    operation,
    left: Some(left),
    right: None,
    relation: Some(relation),
    label: None,
    identifier: None,
  })
}

pub fn union(left: SetId, right: SetId) -> SetId { binary(SetOperation::Union, left, right) }

pub fn intersection(left: SetId, right: SetId) -> SetId {
  binary(SetOperation::Intersection, left, right)
}

pub fn image(left: SetId, relation: RelationId) -> SetId {
  modal(SetOperation::Image, left, relation)
}

pub fn domain(left: SetId, relation: RelationId) -> SetId {
  modal(SetOperation::Domain, left, relation)
}

/// Rewrites event labels through `renaming`. Base terms and nullary constants
/// are fixed; relations are opaque to events and are not descended into.
pub fn rename(id: SetId, renaming: &Renaming) -> SetId {
  let entry = get(id);
  match entry.operation() {
    SetOperation::Event => {
      let label = entry.label().unwrap();
      let renamed = renaming.rename(label);
      if renamed == label { id } else { event(renamed) }
    }
    SetOperation::BaseSet | SetOperation::EmptySet | SetOperation::FullSet => id,
    SetOperation::Union | SetOperation::Intersection => {
      let left  = rename(entry.left().unwrap(), renaming);
      let right = rename(entry.right().unwrap(), renaming);
      if left == entry.left().unwrap() && right == entry.right().unwrap() {
        id
      } else {
        binary(entry.operation(), left, right)
      }
    }
    SetOperation::Image | SetOperation::Domain => {
      let left = rename(entry.left().unwrap(), renaming);
      if left == entry.left().unwrap() {
        id
      } else {
        modal(entry.operation(), left, entry.relation().unwrap())
      }
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::term::relation;

  #[test]
  fn interning_is_canonical() {
    let a1 = base_set(IString::from("A"));
    let a2 = base_set(IString::from("A"));
    assert_eq!(a1, a2);

    let r = relation::base_relation(IString::from("b"));
    let left  = image(event(0), r);
    let right = image(event(0), r);
    assert_eq!(left, right);
    assert_ne!(left, domain(event(0), r));
  }

  #[test]
  fn derived_data_for_event_base_pair() {
    let r = relation::base_relation(IString::from("b"));
    let eb = image(event(3), r);
    let entry = get(eb);
    assert!(entry.is_normal());
    assert_eq!(entry.events().iter().collect::<Vec<_>>(), vec![3]);
    assert_eq!(entry.normal_events().iter().collect::<Vec<_>>(), vec![3]);
    assert_eq!(entry.event_base_pairs(), &[eb]);
    assert_eq!(entry.text(), "(3;b)");
  }

  #[test]
  fn unions_above_events_are_not_normal() {
    let u = union(event(0), event(1));
    assert!(!get(u).is_normal());
    let full = full_set();
    assert!(get(full).is_normal());
    assert!(get(full).has_full_set());
  }

  #[test]
  fn rename_rewrites_events_only() {
    let r = relation::base_relation(IString::from("b"));
    let term = intersection(image(event(0), r), event(1));
    let renaming = Renaming::simple(0, 7);
    let renamed = rename(term, &renaming);
    let entry = get(renamed);
    assert_eq!(entry.events().iter().collect::<Vec<_>>(), vec![1, 7]);
    // Renaming with no matching events is the identity on ids.
    assert_eq!(rename(term, &Renaming::simple(9, 10)), term);
  }

  #[test]
  fn fresh_events_are_monotonic() {
    let first  = get(fresh_event()).label().unwrap();
    let second = get(fresh_event()).label().unwrap();
    assert!(second > first);
  }
}
