/*!

Finite witness models and their evaluator.

A `Model` holds base-relation edges, base-set memberships, and undirected
equality edges over a finite event universe, each carrying a saturation cost
`(id, base)`: how many assumption applications of each kind were needed to
justify the fact. The model of a branch starts with all costs at zero and is
*saturated* by closing under the assumption store; each closure step pays one
on the matching component. Events in one equivalence class always carry the
same edges, which keeps naive evaluation of expressions correct in the
presence of explicit equalities.

Evaluation of a set or relation expression produces its extension together
with a per-element cost: the cheapest way the model justifies that element.

*/

use std::collections::{BTreeSet, HashMap};

use crate::{
  abstractions::{EventSet, IString},
  annotation::Saturation,
  assumption,
  literal::{gather_active_events, Cube, Literal, PredicateOperation},
  term::{
    relation::{self, RelationId, RelationOperation},
    set::{self, SetId, SetOperation},
    Event,
  },
};

pub type EventPair = (Event, Event);

/// A relation extension with per-pair saturation costs.
#[derive(Clone, Default, Debug)]
pub struct SatRelationValue {
  pub pairs: BTreeSet<EventPair>,
  pub costs: HashMap<EventPair, Saturation>,
}

/// A set extension with per-event saturation costs.
#[derive(Clone, Default, Debug)]
pub struct SatSetValue {
  pub events: BTreeSet<Event>,
  pub costs: HashMap<Event, Saturation>,
}

/// An equality edge, stored undirected.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct UndirectedEdge {
  pub e1: Event,
  pub e2: Event,
}

impl UndirectedEdge {
  pub fn new(e1: Event, e2: Event) -> UndirectedEdge {
    if e1 <= e2 {
      UndirectedEdge { e1, e2 }
    } else {
      UndirectedEdge { e1: e2, e2: e1 }
    }
  }

  pub fn contains(&self, event: Event) -> bool {
    self.e1 == event || self.e2 == event
  }

  pub fn neighbour(&self, event: Event) -> Option<Event> {
    if !self.contains(event) {
      return None;
    }
    Some(if event == self.e1 { self.e2 } else { self.e1 })
  }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Edge {
  pub base_relation: IString,
  pub pair: EventPair,
}

impl Edge {
  pub fn from(&self) -> Event {
    self.pair.0
  }

  pub fn to(&self) -> Event {
    self.pair.1
  }
}

fn add_costs(a: Saturation, b: Saturation) -> Saturation {
  (a.0 + b.0, a.1 + b.1)
}

#[derive(Default)]
pub struct Model {
  events: EventSet,
  base_sets: HashMap<IString, SatSetValue>,
  base_relations: HashMap<IString, SatRelationValue>,
  equalities: BTreeSet<UndirectedEdge>,
  equality_costs: HashMap<UndirectedEdge, Saturation>,
}

impl Model {
  /// Builds the model of a cube from its positive atomic literals: events,
  /// equalities, set memberships, and edges, all at cost zero.
  pub fn new(cube: &Cube) -> Model {
    let mut model = Model { events: gather_active_events(cube), ..Model::default() };

    for equality in cube.iter().filter(|literal| literal.is_positive_equality_predicate()) {
      let e1 = set::get(equality.left_event.unwrap()).label().unwrap();
      let e2 = set::get(equality.right_event.unwrap()).label().unwrap();
      model.add_identity(e1, e2, (0, 0));
    }
    for membership in cube.iter().filter(|literal| literal.is_positive_set_predicate()) {
      let base_set = membership.identifier.unwrap();
      let event = set::get(membership.left_event.unwrap()).label().unwrap();
      model.add_set_membership(base_set, event, (0, 0));
    }
    for edge in cube.iter().filter(|literal| literal.is_positive_edge_predicate()) {
      let base_relation = edge.identifier.unwrap();
      let from = set::get(edge.left_event.unwrap()).label().unwrap();
      let to = set::get(edge.right_event.unwrap()).label().unwrap();
      model.add_edge(Edge { base_relation, pair: (from, to) }, (0, 0));
    }
    model
  }

  pub fn events(&self) -> &EventSet {
    &self.events
  }

  pub fn base_sets(&self) -> &HashMap<IString, SatSetValue> {
    &self.base_sets
  }

  pub fn base_relations(&self) -> &HashMap<IString, SatRelationValue> {
    &self.base_relations
  }

  pub fn contains_edge(&self, edge: &Edge) -> bool {
    self
        .base_relations
        .get(&edge.base_relation)
        .is_some_and(|value| value.pairs.contains(&edge.pair))
  }

  pub fn contains_membership(&self, base_set: IString, event: Event) -> bool {
    self.base_sets.get(&base_set).is_some_and(|value| value.events.contains(&event))
  }

  pub fn same_equivalence_class(&self, e1: Event, e2: Event) -> bool {
    e1 == e2 || self.equalities.contains(&UndirectedEdge::new(e1, e2))
  }

  pub fn equivalence_class(&self, event: Event) -> Vec<Event> {
    let mut class = vec![event];
    for equality in &self.equalities {
      if let Some(neighbour) = equality.neighbour(event) {
        if !class.contains(&neighbour) {
          class.push(neighbour);
        }
      }
    }
    class
  }

  pub fn equality_cost(&self, e1: Event, e2: Event) -> Option<Saturation> {
    self.equality_costs.get(&UndirectedEdge::new(e1, e2)).copied()
  }

  pub fn edge_cost(&self, edge: &Edge) -> Option<Saturation> {
    self.base_relations.get(&edge.base_relation)?.costs.get(&edge.pair).copied()
  }

  fn incident_edges(&self, event: Event) -> Vec<Edge> {
    let mut incident = Vec::new();
    for (&base_relation, value) in &self.base_relations {
      for &pair in &value.pairs {
        if pair.0 == event || pair.1 == event {
          incident.push(Edge { base_relation, pair });
        }
      }
    }
    incident
  }

  // ================== Mutation ==================
  // Each addition propagates through the equivalence classes so that equal
  // events always carry the same facts; propagated copies pay the equality's
  // cost on top. Returns whether the model changed.

  pub fn add_set_membership(&mut self, base_set: IString, event: Event, cost: Saturation) -> bool {
    let value = self.base_sets.entry(base_set).or_default();
    let known = value.costs.get(&event).copied();
    if known.is_some_and(|existing| existing <= cost) {
      return false;
    }
    value.events.insert(event);
    value.costs.insert(event, cost);
    self.events.insert(event);

    for class_event in self.equivalence_class(event) {
      if class_event == event {
        continue;
      }
      let equality_cost = self.equality_cost(event, class_event).unwrap_or((0, 0));
      self.add_set_membership(base_set, class_event, add_costs(cost, equality_cost));
    }
    true
  }

  pub fn add_edge(&mut self, edge: Edge, cost: Saturation) -> bool {
    let value = self.base_relations.entry(edge.base_relation).or_default();
    let known = value.costs.get(&edge.pair).copied();
    if known.is_some_and(|existing| existing <= cost) {
      return false;
    }
    value.pairs.insert(edge.pair);
    value.costs.insert(edge.pair, cost);
    self.events.insert(edge.from());
    self.events.insert(edge.to());

    for e1 in self.equivalence_class(edge.from()) {
      for e2 in self.equivalence_class(edge.to()) {
        if (e1, e2) == edge.pair {
          continue;
        }
        let mut propagated = cost;
        if e1 != edge.from() {
          propagated = add_costs(propagated, self.equality_cost(edge.from(), e1).unwrap_or((0, 0)));
        }
        if e2 != edge.to() {
          propagated = add_costs(propagated, self.equality_cost(edge.to(), e2).unwrap_or((0, 0)));
        }
        self.add_edge(Edge { base_relation: edge.base_relation, pair: (e1, e2) }, propagated);
      }
    }
    true
  }

  pub fn add_identity(&mut self, e1: Event, e2: Event, cost: Saturation) -> bool {
    if e1 == e2 {
      return false;
    }
    let equality = UndirectedEdge::new(e1, e2);
    let known = self.equality_costs.get(&equality).copied();
    if known.is_some_and(|existing| existing <= cost) {
      return false;
    }
    self.equalities.insert(equality);
    self.equality_costs.insert(equality, cost);
    self.events.insert(e1);
    self.events.insert(e2);

    // Transitive closure of the equivalence.
    let existing: Vec<UndirectedEdge> = self.equalities.iter().copied().collect();
    for other in existing {
      let other_cost = self.equality_costs[&other];
      let combined = add_costs(cost, other_cost);
      if let Some(e3) = other.neighbour(e1) {
        self.add_identity(e2, e3, combined);
      }
      if let Some(e3) = other.neighbour(e2) {
        self.add_identity(e1, e3, combined);
      }
    }

    // Copy incident edges across the merged classes.
    for (source, class_source) in [(e2, e1), (e1, e2)] {
      for class_event in self.equivalence_class(class_source) {
        for edge in self.incident_edges(source) {
          let edge_cost = add_costs(cost, self.edge_cost(&edge).unwrap_or((0, 0)));
          if edge.from() == source {
            self.add_edge(
              Edge { base_relation: edge.base_relation, pair: (class_event, edge.to()) },
              edge_cost,
            );
          }
          if edge.to() == source {
            self.add_edge(
              Edge { base_relation: edge.base_relation, pair: (edge.from(), class_event) },
              edge_cost,
            );
          }
        }
      }
    }

    // Memberships follow the merged classes too.
    for (source, class_source) in [(e2, e1), (e1, e2)] {
      let memberships: Vec<(IString, Saturation)> = self
          .base_sets
          .iter()
          .filter_map(|(&name, value)| value.costs.get(&source).map(|&c| (name, c)))
          .collect();
      for class_event in self.equivalence_class(class_source) {
        for &(name, membership_cost) in &memberships {
          self.add_set_membership(name, class_event, add_costs(cost, membership_cost));
        }
      }
    }
    true
  }

  // ================== Evaluation ==================

  pub fn evaluate_literal(&self, literal: &Literal) -> bool {
    match literal.operation {
      PredicateOperation::Constant => !literal.negated,
      PredicateOperation::Edge => {
        let edge = Edge {
          base_relation: literal.identifier.unwrap(),
          pair: (
            set::get(literal.left_event.unwrap()).label().unwrap(),
            set::get(literal.right_event.unwrap()).label().unwrap(),
          ),
        };
        self.contains_edge(&edge) ^ literal.negated
      }
      PredicateOperation::Equality => {
        let e1 = set::get(literal.left_event.unwrap()).label().unwrap();
        let e2 = set::get(literal.right_event.unwrap()).label().unwrap();
        self.same_equivalence_class(e1, e2) ^ literal.negated
      }
      PredicateOperation::Set => {
        let event = set::get(literal.left_event.unwrap()).label().unwrap();
        self.contains_membership(literal.identifier.unwrap(), event) ^ literal.negated
      }
      PredicateOperation::SetNonEmptiness => {
        let value = self.evaluate_set(literal.set.unwrap());
        !value.events.is_empty() ^ literal.negated
      }
    }
  }

  pub fn evaluate_relation(&self, rel: RelationId) -> SatRelationValue {
    let entry = relation::get(rel);
    match entry.operation() {
      RelationOperation::BaseRelation => self
          .base_relations
          .get(&entry.identifier().unwrap())
          .cloned()
          .unwrap_or_default(),
      RelationOperation::Id => {
        let mut value = SatRelationValue::default();
        for event in self.events.iter() {
          value.pairs.insert((event, event));
          value.costs.insert((event, event), (0, 0));
        }
        value
      }
      RelationOperation::Empty => SatRelationValue::default(),
      RelationOperation::Full => {
        let mut value = SatRelationValue::default();
        for e1 in self.events.iter() {
          for e2 in self.events.iter() {
            value.pairs.insert((e1, e2));
            value.costs.insert((e1, e2), (0, 0));
          }
        }
        value
      }
      RelationOperation::Union => {
        let left = self.evaluate_relation(entry.left().unwrap());
        let right = self.evaluate_relation(entry.right().unwrap());
        let mut value = SatRelationValue::default();
        for &pair in left.pairs.union(&right.pairs) {
          value.pairs.insert(pair);
          let left_cost = left.costs.get(&pair).copied().unwrap_or((i32::MAX, i32::MAX));
          let right_cost = right.costs.get(&pair).copied().unwrap_or((i32::MAX, i32::MAX));
          value.costs.insert(pair, left_cost.min(right_cost));
        }
        value
      }
      RelationOperation::Intersection => {
        let left = self.evaluate_relation(entry.left().unwrap());
        let right = self.evaluate_relation(entry.right().unwrap());
        let mut value = SatRelationValue::default();
        for &pair in left.pairs.intersection(&right.pairs) {
          value.pairs.insert(pair);
          value.costs.insert(pair, add_costs(left.costs[&pair], right.costs[&pair]));
        }
        value
      }
      RelationOperation::Composition => {
        let left = self.evaluate_relation(entry.left().unwrap());
        let right = self.evaluate_relation(entry.right().unwrap());
        let mut value = SatRelationValue::default();
        for &(a, b) in &left.pairs {
          for &(c, d) in &right.pairs {
            if b == c {
              let pair = (a, d);
              let cost = add_costs(left.costs[&(a, b)], right.costs[&(c, d)]);
              let known = value.costs.get(&pair).copied();
              if known.map_or(true, |existing| cost < existing) {
                value.pairs.insert(pair);
                value.costs.insert(pair, cost);
              }
            }
          }
        }
        value
      }
      RelationOperation::Converse => {
        let left = self.evaluate_relation(entry.left().unwrap());
        let mut value = SatRelationValue::default();
        for &(a, b) in &left.pairs {
          value.pairs.insert((b, a));
          value.costs.insert((b, a), left.costs[&(a, b)]);
        }
        value
      }
      RelationOperation::TransitiveClosure => {
        let underlying = self.evaluate_relation(entry.left().unwrap());
        let mut value = SatRelationValue::default();
        // Iterate to fixpoint starting from the identity on the events.
        for event in self.events.iter() {
          value.pairs.insert((event, event));
          value.costs.insert((event, event), (0, 0));
        }
        loop {
          let mut new_pairs = Vec::new();
          for &(a, b) in &value.pairs {
            for &(c, d) in &underlying.pairs {
              if b == c && !value.pairs.contains(&(a, d)) {
                new_pairs.push(((a, d), add_costs(value.costs[&(a, b)], underlying.costs[&(c, d)])));
              }
            }
          }
          if new_pairs.is_empty() {
            break;
          }
          for (pair, cost) in new_pairs {
            value.pairs.insert(pair);
            value.costs.entry(pair).or_insert(cost);
          }
        }
        value
      }
      RelationOperation::SetIdentity => {
        let inner = self.evaluate_set(entry.set().unwrap());
        let mut value = SatRelationValue::default();
        for &event in &inner.events {
          value.pairs.insert((event, event));
          value.costs.insert((event, event), inner.costs[&event]);
        }
        value
      }
      RelationOperation::CartesianProduct => unreachable!("cartesian products are not supported"),
    }
  }

  pub fn evaluate_set(&self, set_id: SetId) -> SatSetValue {
    let entry = set::get(set_id);
    match entry.operation() {
      SetOperation::Event => {
        let event = entry.label().unwrap();
        let mut value = SatSetValue::default();
        value.events.insert(event);
        value.costs.insert(event, (0, 0));
        value
      }
      SetOperation::BaseSet => {
        self.base_sets.get(&entry.identifier().unwrap()).cloned().unwrap_or_default()
      }
      SetOperation::EmptySet => SatSetValue::default(),
      SetOperation::FullSet => {
        let mut value = SatSetValue::default();
        for event in self.events.iter() {
          value.events.insert(event);
          value.costs.insert(event, (0, 0));
        }
        value
      }
      SetOperation::Union => {
        let left = self.evaluate_set(entry.left().unwrap());
        let right = self.evaluate_set(entry.right().unwrap());
        let mut value = SatSetValue::default();
        for &event in left.events.union(&right.events) {
          value.events.insert(event);
          let left_cost = left.costs.get(&event).copied().unwrap_or((i32::MAX, i32::MAX));
          let right_cost = right.costs.get(&event).copied().unwrap_or((i32::MAX, i32::MAX));
          value.costs.insert(event, left_cost.min(right_cost));
        }
        value
      }
      SetOperation::Intersection => {
        let left = self.evaluate_set(entry.left().unwrap());
        let right = self.evaluate_set(entry.right().unwrap());
        let mut value = SatSetValue::default();
        for &event in left.events.intersection(&right.events) {
          value.events.insert(event);
          value.costs.insert(event, add_costs(left.costs[&event], right.costs[&event]));
        }
        value
      }
      SetOperation::Image => {
        let left = self.evaluate_set(entry.left().unwrap());
        let rel = self.evaluate_relation(entry.relation().unwrap());
        let mut value = SatSetValue::default();
        for &(from, to) in &rel.pairs {
          if left.events.contains(&from) {
            let cost = add_costs(left.costs[&from], rel.costs[&(from, to)]);
            let known = value.costs.get(&to).copied();
            if known.map_or(true, |existing| cost < existing) {
              value.events.insert(to);
              value.costs.insert(to, cost);
            }
          }
        }
        value
      }
      SetOperation::Domain => {
        let left = self.evaluate_set(entry.left().unwrap());
        let rel = self.evaluate_relation(entry.relation().unwrap());
        let mut value = SatSetValue::default();
        for &(from, to) in &rel.pairs {
          if left.events.contains(&to) {
            let cost = add_costs(left.costs[&to], rel.costs[&(from, to)]);
            let known = value.costs.get(&from).copied();
            if known.map_or(true, |existing| cost < existing) {
              value.events.insert(from);
              value.costs.insert(from, cost);
            }
          }
        }
        value
      }
    }
  }
}

// ================== Saturation ==================

// Returns whether the model changed.
fn saturate_id_assumptions(model: &mut Model) -> bool {
  let mut changed = false;
  for id_assumption in assumption::id_assumptions() {
    let value = model.evaluate_relation(id_assumption);
    for &pair in &value.pairs {
      let mut cost = value.costs[&pair];
      cost.0 += 1;
      changed |= model.add_identity(pair.0, pair.1, cost);
    }
  }
  changed
}

fn saturate_base_relation_assumptions(model: &mut Model) -> bool {
  let mut changed = false;
  for (base_relation, assumed) in assumption::base_assumptions() {
    let value = model.evaluate_relation(assumed);
    for &pair in &value.pairs {
      let mut cost = value.costs[&pair];
      cost.1 += 1;
      changed |= model.add_edge(Edge { base_relation, pair }, cost);
    }
  }
  changed
}

fn saturate_base_set_assumptions(model: &mut Model) -> bool {
  let mut changed = false;
  for (base_set, assumed) in assumption::base_set_assumptions() {
    let value = model.evaluate_set(assumed);
    for &event in &value.events {
      let mut cost = value.costs[&event];
      cost.1 += 1;
      changed |= model.add_set_membership(base_set, event, cost);
    }
  }
  changed
}

/// Closes the model under the assumption store. The event universe is
/// finite and costs only decrease on overwrite, so the fixpoint terminates.
pub fn saturate_model(model: &mut Model) {
  loop {
    let changed = saturate_id_assumptions(model)
        | saturate_base_relation_assumptions(model)
        | saturate_base_set_assumptions(model);
    if !changed {
      break;
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::assumption;

  fn edge_cube(edges: &[(&str, Event, Event)]) -> Cube {
    edges
        .iter()
        .map(|&(name, from, to)| {
          Literal::edge(set::event(from), set::event(to), IString::from(name))
        })
        .collect()
  }

  #[test]
  fn composition_and_closure_evaluate() {
    assumption::clear();
    let model = Model::new(&edge_cube(&[("a", 0, 1), ("a", 1, 2)]));

    let a = relation::base_relation(IString::from("a"));
    let composed = model.evaluate_relation(relation::composition(a, a));
    assert!(composed.pairs.contains(&(0, 2)));
    assert_eq!(composed.pairs.len(), 1);

    let closure = model.evaluate_relation(relation::transitive_closure(a));
    // Reflexive pairs plus the reachable ones.
    for event in [0, 1, 2] {
      assert!(closure.pairs.contains(&(event, event)));
    }
    assert!(closure.pairs.contains(&(0, 2)));
  }

  #[test]
  fn equalities_propagate_edges_with_cost() {
    assumption::clear();
    let mut model = Model::new(&edge_cube(&[("a", 0, 1)]));
    model.add_identity(1, 2, (1, 0));

    // 0 -> 2 is implied by 0 -> 1 and 1 = 2, paying the equality cost.
    assert!(model.contains_edge(&Edge { base_relation: IString::from("a"), pair: (0, 2) }));
    let cost = model.edge_cost(&Edge { base_relation: IString::from("a"), pair: (0, 2) }).unwrap();
    assert_eq!(cost, (1, 0));
  }

  #[test]
  fn saturation_closes_under_base_assumptions() {
    assumption::clear();
    let r = relation::base_relation(IString::from("r"));
    assumption::add_base_assumption(IString::from("s"), r);

    let mut model = Model::new(&edge_cube(&[("r", 0, 1)]));
    saturate_model(&mut model);

    let s_edge = Edge { base_relation: IString::from("s"), pair: (0, 1) };
    assert!(model.contains_edge(&s_edge));
    assert_eq!(model.edge_cost(&s_edge), Some((0, 1)));

    // Saturation is idempotent once the fixpoint is reached.
    assert!(!saturate_base_relation_assumptions(&mut model));
    assumption::clear();
  }

  #[test]
  fn literal_evaluation_respects_sign() {
    assumption::clear();
    let model = Model::new(&edge_cube(&[("a", 0, 1)]));
    let positive = Literal::edge(set::event(0), set::event(1), IString::from("a"));
    let negative =
        Literal::negated_edge(set::event(0), set::event(1), IString::from("a"), (0, 0));
    assert!(model.evaluate_literal(&positive));
    assert!(!model.evaluate_literal(&negative));

    let b = set::image(set::event(0), relation::base_relation(IString::from("a")));
    assert!(model.evaluate_literal(&Literal::set_nonempty(b)));
  }
}
