/*!

Literals, cubes, and disjunctive normal forms.

A literal is one of five predicate kinds over the term universe:

 - `edge`:            `(e1, e2) ∈ b` for a base relation `b`
 - `set`:             `e ∈ B` for a base set `B`
 - `equality`:        `e1 = e2`
 - `setNonEmptiness`: `S ≠ 0`
 - `constant`:        `TRUE` / `FALSE`

each positive or negated. Negated literals carry a saturation annotation: a
leaf budget for the atomic kinds, a full annotation tree for
`setNonEmptiness`. Equality of literals deliberately ignores the annotation,
mirroring the term-level identity the tableau reasons with.

A *cube* is a conjunction of literals; a *DNF* is a disjunction of cubes.

*/

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use crate::{
  abstractions::{event_set_union, join_iter, EventSet, IString},
  annotation::{self, annotated, annotated::AnnotatedSet, AnnotationId, Saturation},
  term::{
    renaming::Renaming,
    set::{self, SetId},
    Event,
  },
};

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum PredicateOperation {
  Edge,
  Set,
  Equality,
  SetNonEmptiness,
  Constant,
}

impl PredicateOperation {
  fn tag(self) -> u8 {
    match self {
      PredicateOperation::Edge            => 0,
      PredicateOperation::Set             => 1,
      PredicateOperation::Equality        => 2,
      PredicateOperation::SetNonEmptiness => 3,
      PredicateOperation::Constant        => 4,
    }
  }
}

#[derive(Clone, Debug)]
pub struct Literal {
  pub negated   : bool,
  pub operation : PredicateOperation,
  /// Populated iff `SetNonEmptiness`.
  pub set       : Option<SetId>,
  /// Saturation annotation; `none()` unless negated and annotated.
  pub annotation: AnnotationId,
  /// Event term; populated for `Edge`, `Set`, `Equality`.
  pub left_event: Option<SetId>,
  /// Event term; populated for `Edge`, `Equality`.
  pub right_event: Option<SetId>,
  /// Base symbol name; populated for `Edge`, `Set`.
  pub identifier: Option<IString>,
}

fn event_label(event: SetId) -> Event {
  set::get(event).label().expect("event term without label")
}

impl Literal {
  // ================== Constructors ==================

  pub fn constant(negated: bool) -> Literal {
    Literal {
      negated,
      operation: PredicateOperation::Constant,
      set: None,
      annotation: annotation::none(),
      left_event: None,
      right_event: None,
      identifier: None,
    }
  }

  /// The false constant.
  pub fn bottom() -> Literal { Literal::constant(true) }

  /// The true constant.
  pub fn top() -> Literal { Literal::constant(false) }

  pub fn set_nonempty(set: SetId) -> Literal {
    Literal {
      negated: false,
      operation: PredicateOperation::SetNonEmptiness,
      set: Some(set),
      annotation: annotation::none(),
      left_event: None,
      right_event: None,
      identifier: None,
    }
  }

  pub fn negated_set_nonempty(annotated_set: AnnotatedSet) -> Literal {
    debug_assert!(annotated::validate(annotated_set));
    Literal {
      negated: true,
      operation: PredicateOperation::SetNonEmptiness,
      set: Some(annotated_set.0),
      annotation: annotated_set.1,
      left_event: None,
      right_event: None,
      identifier: None,
    }
  }

  pub fn set_membership(event: SetId, identifier: IString) -> Literal {
    debug_assert!(set::get(event).is_event());
    Literal {
      negated: false,
      operation: PredicateOperation::Set,
      set: None,
      annotation: annotation::none(),
      left_event: Some(event),
      right_event: None,
      identifier: Some(identifier),
    }
  }

  pub fn negated_set_membership(event: SetId, identifier: IString, value: Saturation) -> Literal {
    debug_assert!(set::get(event).is_event());
    Literal {
      negated: true,
      operation: PredicateOperation::Set,
      set: None,
      annotation: annotation::leaf(value),
      left_event: Some(event),
      right_event: None,
      identifier: Some(identifier),
    }
  }

  pub fn edge(left_event: SetId, right_event: SetId, identifier: IString) -> Literal {
    debug_assert!(set::get(left_event).is_event());
    debug_assert!(set::get(right_event).is_event());
    Literal {
      negated: false,
      operation: PredicateOperation::Edge,
      set: None,
      annotation: annotation::none(),
      left_event: Some(left_event),
      right_event: Some(right_event),
      identifier: Some(identifier),
    }
  }

  pub fn negated_edge(
    left_event: SetId,
    right_event: SetId,
    identifier: IString,
    value: Saturation,
  ) -> Literal {
    debug_assert!(set::get(left_event).is_event());
    debug_assert!(set::get(right_event).is_event());
    Literal {
      negated: true,
      operation: PredicateOperation::Edge,
      set: None,
      annotation: annotation::leaf(value),
      left_event: Some(left_event),
      right_event: Some(right_event),
      identifier: Some(identifier),
    }
  }

  pub fn equality(negated: bool, left_event: SetId, right_event: SetId) -> Literal {
    debug_assert!(set::get(left_event).is_event());
    debug_assert!(set::get(right_event).is_event());
    Literal {
      negated,
      operation: PredicateOperation::Equality,
      set: None,
      annotation: annotation::none(),
      left_event: Some(left_event),
      right_event: Some(right_event),
      identifier: None,
    }
  }

  // ================== Accessors ==================

  /// Checks that exactly the right fields are populated for the operation.
  pub fn validate(&self) -> bool {
    match self.operation {
      PredicateOperation::Constant => {
        self.set.is_none()
            && self.left_event.is_none()
            && self.right_event.is_none()
            && self.identifier.is_none()
            && self.annotation == annotation::none()
      }
      PredicateOperation::Edge => {
        self.set.is_none()
            && self.left_event.is_some_and(|e| set::get(e).is_event())
            && self.right_event.is_some_and(|e| set::get(e).is_event())
            && self.identifier.is_some()
            && (!self.negated || self.annotation != annotation::none())
      }
      PredicateOperation::Equality => {
        self.set.is_none()
            && self.left_event.is_some_and(|e| set::get(e).is_event())
            && self.right_event.is_some_and(|e| set::get(e).is_event())
            && self.identifier.is_none()
            && self.annotation == annotation::none()
      }
      PredicateOperation::Set => {
        self.set.is_none()
            && self.left_event.is_some_and(|e| set::get(e).is_event())
            && self.right_event.is_none()
            && self.identifier.is_some()
      }
      PredicateOperation::SetNonEmptiness => {
        self.set.is_some()
            && self.left_event.is_none()
            && self.right_event.is_none()
            && self.identifier.is_none()
      }
    }
  }

  pub fn is_negated_of(&self, other: &Literal) -> bool {
    self.operation == other.operation
        && self.negated != other.negated
        && self.set == other.set
        && self.left_event == other.left_event
        && self.right_event == other.right_event
        && self.identifier == other.identifier
  }

  /// A literal is normal if it cannot be simplified locally.
  pub fn is_normal(&self) -> bool {
    match self.operation {
      PredicateOperation::SetNonEmptiness => set::get(self.set.unwrap()).is_normal(),
      PredicateOperation::Constant => false,
      PredicateOperation::Equality => {
        self.negated && self.left_event != self.right_event
      }
      PredicateOperation::Set | PredicateOperation::Edge => true,
    }
  }

  #[inline(always)]
  pub fn is_positive_edge_predicate(&self) -> bool {
    !self.negated && self.operation == PredicateOperation::Edge
  }

  #[inline(always)]
  pub fn is_positive_set_predicate(&self) -> bool {
    !self.negated && self.operation == PredicateOperation::Set
  }

  #[inline(always)]
  pub fn is_positive_equality_predicate(&self) -> bool {
    !self.negated && self.operation == PredicateOperation::Equality
  }

  #[inline(always)]
  pub fn is_positive_atomic(&self) -> bool {
    !self.negated && self.operation != PredicateOperation::SetNonEmptiness
  }

  pub fn has_full_set(&self) -> bool {
    self.operation == PredicateOperation::SetNonEmptiness
        && set::get(self.set.unwrap()).has_full_set()
  }

  pub fn has_base_set(&self) -> bool {
    self.operation == PredicateOperation::SetNonEmptiness
        && set::get(self.set.unwrap()).has_base_set()
  }

  pub fn events(&self) -> EventSet {
    match self.operation {
      PredicateOperation::Constant => EventSet::default(),
      PredicateOperation::SetNonEmptiness => set::get(self.set.unwrap()).events().clone(),
      PredicateOperation::Edge | PredicateOperation::Equality => event_set_union(
        set::get(self.left_event.unwrap()).events(),
        set::get(self.right_event.unwrap()).events(),
      ),
      PredicateOperation::Set => set::get(self.left_event.unwrap()).events().clone(),
    }
  }

  pub fn normal_events(&self) -> EventSet {
    match self.operation {
      PredicateOperation::Constant => EventSet::default(),
      PredicateOperation::SetNonEmptiness => set::get(self.set.unwrap()).normal_events().clone(),
      PredicateOperation::Edge | PredicateOperation::Equality => {
        if self.is_normal() {
          self.events()
        } else {
          EventSet::default()
        }
      }
      PredicateOperation::Set => set::get(self.left_event.unwrap()).events().clone(),
    }
  }

  pub fn annotated_set(&self) -> AnnotatedSet {
    debug_assert_eq!(self.operation, PredicateOperation::SetNonEmptiness);
    (self.set.unwrap(), self.annotation)
  }

  // ================== Rewriting ==================

  /// Replaces the set expression of a `setNonEmptiness` literal, keeping the
  /// sign. Positive literals drop the annotation.
  pub fn substitute_set(&self, annotated_set: AnnotatedSet) -> Literal {
    debug_assert_eq!(self.operation, PredicateOperation::SetNonEmptiness);
    if self.negated {
      Literal::negated_set_nonempty(annotated_set)
    } else {
      Literal::set_nonempty(annotated_set.0)
    }
  }

  /// Replaces every occurrence of `search` by `replace`. For the atomic
  /// kinds both must be events. Returns `None` when nothing changed.
  pub fn substitute_all(&self, search: SetId, replace: SetId) -> Option<Literal> {
    match self.operation {
      PredicateOperation::Constant => None,
      PredicateOperation::SetNonEmptiness => {
        let substituted = annotated::substitute_all(self.annotated_set(), search, replace);
        if substituted.0 != self.set.unwrap() {
          Some(self.substitute_set(substituted))
        } else {
          None
        }
      }
      PredicateOperation::Edge | PredicateOperation::Equality | PredicateOperation::Set => {
        if !set::get(search).is_event() || !set::get(replace).is_event() {
          return None;
        }
        let left  = if self.left_event == Some(search) { Some(replace) } else { self.left_event };
        let right = if self.right_event == Some(search) { Some(replace) } else { self.right_event };
        if left == self.left_event && right == self.right_event {
          return None;
        }
        let mut substituted = self.clone();
        substituted.left_event  = left;
        substituted.right_event = right;
        Some(substituted)
      }
    }
  }

  /// Replaces the `n`-th occurrence of `search` in the set expression.
  /// Only `setNonEmptiness` literals have occurrences to count.
  pub fn substitute(&self, search: SetId, replace: SetId, n: i32) -> Option<Literal> {
    if self.operation != PredicateOperation::SetNonEmptiness {
      return None;
    }
    let mut n = n;
    let substituted = annotated::substitute(self.annotated_set(), search, replace, &mut n);
    if substituted.0 != self.set.unwrap() {
      Some(self.substitute_set(substituted))
    } else {
      None
    }
  }

  /// Replaces every occurrence of a relation sub-term in the set expression.
  pub fn substitute_all_relation(
    &self,
    search: crate::term::relation::RelationId,
    replace: crate::term::relation::RelationId,
  ) -> Option<Literal> {
    if self.operation != PredicateOperation::SetNonEmptiness {
      return None;
    }
    let substituted = annotated::substitute_all_relation(self.annotated_set(), search, replace);
    if substituted.0 != self.set.unwrap() {
      Some(self.substitute_set(substituted))
    } else {
      None
    }
  }

  pub fn renamed(&self, renaming: &Renaming) -> Literal {
    let mut renamed = self.clone();
    match self.operation {
      PredicateOperation::Constant => {}
      PredicateOperation::SetNonEmptiness => {
        renamed.set = Some(set::rename(self.set.unwrap(), renaming));
      }
      PredicateOperation::Edge | PredicateOperation::Equality => {
        renamed.left_event  = Some(set::rename(self.left_event.unwrap(), renaming));
        renamed.right_event = Some(set::rename(self.right_event.unwrap(), renaming));
      }
      PredicateOperation::Set => {
        renamed.left_event = Some(set::rename(self.left_event.unwrap(), renaming));
      }
    }
    renamed
  }
}

// Equality and hashing ignore the annotation: two literals that differ only
// in remaining saturation budget are the same literal.
impl PartialEq for Literal {
  fn eq(&self, other: &Self) -> bool {
    self.negated == other.negated
        && self.operation == other.operation
        && self.set == other.set
        && self.left_event == other.left_event
        && self.right_event == other.right_event
        && self.identifier == other.identifier
  }
}
impl Eq for Literal {}

impl Hash for Literal {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.negated.hash(state);
    self.operation.hash(state);
    self.set.hash(state);
    self.left_event.hash(state);
    self.right_event.hash(state);
    self.identifier.hash(state);
  }
}

impl PartialOrd for Literal {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

// Positive literals order before negated ones; within a sign, by operation
// tag, then by concrete fields. Set expressions compare by their printed
// form (length first, then lexicographic) so the order is content-based and
// reproducible across processes.
impl Ord for Literal {
  fn cmp(&self, other: &Self) -> Ordering {
    let ordering = self
        .negated
        .cmp(&other.negated)
        .then_with(|| self.operation.tag().cmp(&other.operation.tag()));
    if ordering != Ordering::Equal {
      return ordering;
    }

    match self.operation {
      PredicateOperation::Edge => {
        event_label(self.left_event.unwrap())
            .cmp(&event_label(other.left_event.unwrap()))
            .then_with(|| {
              event_label(self.right_event.unwrap()).cmp(&event_label(other.right_event.unwrap()))
            })
            .then_with(|| self.identifier.unwrap().as_str().cmp(other.identifier.unwrap().as_str()))
      }
      PredicateOperation::Set => {
        event_label(self.left_event.unwrap())
            .cmp(&event_label(other.left_event.unwrap()))
            .then_with(|| self.identifier.unwrap().as_str().cmp(other.identifier.unwrap().as_str()))
      }
      PredicateOperation::Equality => {
        event_label(self.left_event.unwrap())
            .cmp(&event_label(other.left_event.unwrap()))
            .then_with(|| {
              event_label(self.right_event.unwrap()).cmp(&event_label(other.right_event.unwrap()))
            })
      }
      PredicateOperation::SetNonEmptiness => {
        let self_text  = set::get(self.set.unwrap()).text();
        let other_text = set::get(other.set.unwrap()).text();
        self_text
            .len()
            .cmp(&other_text.len())
            .then_with(|| self_text.cmp(other_text))
      }
      PredicateOperation::Constant => Ordering::Equal,
    }
  }
}

impl Display for Literal {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if self.negated && self.operation != PredicateOperation::Constant {
      write!(f, "~")?;
    }
    match self.operation {
      PredicateOperation::Constant => {
        write!(f, "{}", if self.negated { "FALSE" } else { "TRUE" })
      }
      PredicateOperation::Edge => write!(
        f,
        "{}({},{})",
        self.identifier.unwrap(),
        set::get(self.left_event.unwrap()).text(),
        set::get(self.right_event.unwrap()).text()
      ),
      PredicateOperation::Set => write!(
        f,
        "{}({})",
        self.identifier.unwrap(),
        set::get(self.left_event.unwrap()).text()
      ),
      PredicateOperation::Equality => write!(
        f,
        "{} = {}",
        set::get(self.left_event.unwrap()).text(),
        set::get(self.right_event.unwrap()).text()
      ),
      PredicateOperation::SetNonEmptiness => {
        write!(f, "{}", set::get(self.set.unwrap()).text())
      }
    }
  }
}

// ================== Cubes and DNF ==================

/// A conjunction of literals.
pub type Cube = Vec<Literal>;
/// A disjunction of cubes.
pub type Dnf = Vec<Cube>;

pub fn validate_cube(cube: &Cube) -> bool {
  cube.iter().all(Literal::validate)
}

pub fn validate_normalized_cube(cube: &Cube) -> bool {
  validate_cube(cube) && cube.iter().all(Literal::is_normal)
}

pub fn validate_dnf(dnf: &Dnf) -> bool {
  dnf.iter().all(validate_cube)
}

pub fn cube_has_negated_literal(cube: &Cube, literal: &Literal) -> bool {
  cube.iter().any(|cube_literal| literal.is_negated_of(cube_literal))
}

pub fn cube_has_positive_edge_predicate(cube: &Cube) -> bool {
  cube.iter().any(Literal::is_positive_edge_predicate)
}

pub fn rename_cube(renaming: &Renaming, cube: &mut Cube) {
  for literal in cube.iter_mut() {
    *literal = literal.renamed(renaming);
  }
}

/// Events appearing in the cube's positive literals. Existential events are
/// witnessed positively; a negated literal over other events constrains
/// nothing the cube can still produce.
pub fn gather_active_events(cube: &Cube) -> EventSet {
  let mut active = EventSet::default();
  for literal in cube.iter().filter(|literal| !literal.negated) {
    active.union_with(&literal.events());
  }
  active
}

pub fn is_literal_active(literal: &Literal, active_events: &EventSet) -> bool {
  literal.events().is_subset(active_events)
}

/// The active event with the fewest literal occurrences, ties broken by the
/// smaller label. Preferring events that occur once over events that occur
/// several times keeps the number of events used in a cube minimal.
pub fn gather_minimal_occurring_active_event(cube: &Cube) -> Option<Event> {
  let active = gather_active_events(cube);
  let mut best: Option<(usize, Event)> = None;
  for event in active.iter() {
    let occurrences = cube
        .iter()
        .filter(|literal| literal.events().contains(event))
        .count();
    let candidate = (occurrences, event);
    if best.is_none() || candidate < best.unwrap() {
      best = Some(candidate);
    }
  }
  best.map(|(_, event)| event)
}

/// Drops literals whose events are not all active in the cube.
pub fn remove_useless_literals(cube: &mut Cube) {
  let active = gather_active_events(cube);
  cube.retain(|literal| is_literal_active(literal, &active));
}

pub fn is_subset(small: &Cube, big: &Cube) -> bool {
  small.iter().all(|literal| big.contains(literal))
}

pub fn print_cube(cube: &Cube) -> String {
  let literals: String =
      join_iter(cube.iter().map(Literal::to_string), |_| ", ".to_string()).collect();
  format!("{{ {literals} }}")
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::term::relation;

  fn edge_literal(left: Event, right: Event, name: &str) -> Literal {
    Literal::edge(set::event(left), set::event(right), IString::from(name))
  }

  #[test]
  fn negation_pairs() {
    let positive = edge_literal(0, 1, "a");
    let negative = Literal::negated_edge(set::event(0), set::event(1), IString::from("a"), (1, 1));
    assert!(positive.is_negated_of(&negative));
    assert!(negative.is_negated_of(&positive));
    assert!(!positive.is_negated_of(&positive));
    // Annotation is ignored by equality.
    let other = Literal::negated_edge(set::event(0), set::event(1), IString::from("a"), (0, 0));
    assert_eq!(negative, other);
  }

  #[test]
  fn normality() {
    let b = relation::base_relation(IString::from("b"));
    assert!(edge_literal(0, 1, "a").is_normal());
    assert!(!Literal::top().is_normal());
    assert!(!Literal::equality(false, set::event(0), set::event(1)).is_normal());
    assert!(Literal::equality(true, set::event(0), set::event(1)).is_normal());
    assert!(!Literal::equality(true, set::event(0), set::event(0)).is_normal());
    assert!(Literal::set_nonempty(set::image(set::event(0), b)).is_normal());
    assert!(!Literal::set_nonempty(set::event(0)).is_normal());
  }

  #[test]
  fn ordering_puts_positives_first_then_shorter_text() {
    let b = relation::base_relation(IString::from("b"));
    let positive = Literal::set_nonempty(set::image(set::event(0), b));
    let annotated = (
      set::intersection(set::image(set::event(0), b), set::event(1)),
      annotated::make_with_value(set::intersection(set::image(set::event(0), b), set::event(1)), (1, 1)),
    );
    let negative = Literal::negated_set_nonempty(annotated);
    assert!(positive < negative);

    let short = Literal::set_nonempty(set::image(set::event(0), b));
    let long  = Literal::set_nonempty(set::intersection(set::image(set::event(0), b), set::event(1)));
    assert!(short < long);
  }

  #[test]
  fn rename_round_trip_on_bijection() {
    let literal = edge_literal(0, 1, "a");
    let renaming = Renaming::minimal(&[1, 0]);
    let renamed = literal.renamed(&renaming);
    assert_eq!(renamed.renamed(&renaming.inverted()), literal);
  }

  #[test]
  fn substitution_on_atomic_literals_requires_events() {
    let b = relation::base_relation(IString::from("b"));
    let literal = edge_literal(0, 1, "a");
    assert!(literal.substitute_all(set::image(set::event(0), b), set::event(2)).is_none());
    let substituted = literal.substitute_all(set::event(0), set::event(2)).unwrap();
    assert_eq!(event_label(substituted.left_event.unwrap()), 2);
  }

  #[test]
  fn minimal_occurring_active_event_prefers_rare_events() {
    let cube = vec![edge_literal(0, 1, "a"), edge_literal(0, 2, "a")];
    // 0 occurs twice, 1 and 2 once; 1 is the smaller rare label.
    assert_eq!(gather_minimal_occurring_active_event(&cube), Some(1));
  }
}
