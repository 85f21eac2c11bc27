/*!

The local rule schema.

Every rule rewrites one literal into a disjunction of conjunctions. Rules on
sub-terms produce a `PartialDnf`: positions are either finished literals or
annotated set *holes* still to be embedded into the enclosing
`setNonEmptiness` context. Recursive cases rebuild the holes while unwinding;
`to_dnf` finally wraps each remaining hole with the context literal's sign.

Saturation rules are the negated-only, budget-limited family: they substitute
assumption left-hand sides into negated literals, decrementing the matching
budget component on the rewritten annotation.

*/

use std::cell::Cell;

use tracing::error;

use crate::{
  annotation::{
    self,
    annotated::{self, AnnotatedSet},
  },
  assumption,
  literal::{Cube, Dnf, Literal, PredicateOperation},
  stats,
  term::{
    relation::{self, RelationOperation},
    set::{self, SetId, SetOperation},
    Event,
  },
};

/// A position in a rule result: a finished literal, or an annotated sub-set
/// still to be embedded back into the calling context.
#[derive(Clone)]
pub enum PartialLiteral {
  Lit(Literal),
  Hole(AnnotatedSet),
}

pub type PartialCube = Vec<PartialLiteral>;
pub type PartialDnf = Vec<PartialCube>;

thread_local! {
  static SATURATION_BOUND: Cell<i32> = const { Cell::new(1) };
  static LAST_RULE_WAS_UNROLLING: Cell<bool> = const { Cell::new(false) };
}

/// The process-wide saturation bound (default 1). Zero or negative disables
/// saturation.
pub fn saturation_bound() -> i32 {
  SATURATION_BOUND.with(|bound| bound.get())
}

pub fn set_saturation_bound(bound: i32) {
  SATURATION_BOUND.with(|cell| cell.set(bound));
}

/// Raised when the last applied rule unrolled a transitive closure, so the
/// tableau can track unrolling ancestry for at-the-world cycle detection.
pub fn last_rule_was_unrolling() -> bool {
  LAST_RULE_WAS_UNROLLING.with(|flag| flag.get())
}

fn set_unrolling(value: bool) {
  LAST_RULE_WAS_UNROLLING.with(|flag| flag.set(value));
}

fn hole(set: SetId) -> PartialLiteral {
  PartialLiteral::Hole((set, annotation::none()))
}

fn saturation_value(annotation: annotation::AnnotationId) -> annotation::Saturation {
  annotation::value(annotation).expect("saturation annotation without value")
}

/// Lifts a `PartialDnf` into a proper DNF by substituting every hole back
/// into the enclosing `setNonEmptiness` literal.
fn to_dnf(context: &Literal, partial: PartialDnf) -> Dnf {
  partial
      .into_iter()
      .map(|partial_cube| {
        partial_cube
            .into_iter()
            .map(|partial_literal| match partial_literal {
              PartialLiteral::Lit(literal) => literal,
              PartialLiteral::Hole(annotated_set) => context.substitute_set(annotated_set),
            })
            .collect::<Cube>()
      })
      .collect()
}

/// Rebuilds every hole `s` as `other ∩ s` (or `s ∩ other`), meeting the
/// annotations in the same orientation.
fn substitute_intersection_operand(
  substitute_right: bool,
  disjunction: PartialDnf,
  other_operand: AnnotatedSet,
) -> PartialDnf {
  let (other_set, other_annotation) = other_operand;
  disjunction
      .into_iter()
      .map(|conjunction| {
        conjunction
            .into_iter()
            .map(|partial_literal| match partial_literal {
              PartialLiteral::Lit(literal) => PartialLiteral::Lit(literal),
              PartialLiteral::Hole((s, a)) => {
                let substituted = if substitute_right {
                  (
                    set::intersection(other_set, s),
                    annotation::meet_annotation(other_annotation, a),
                  )
                } else {
                  (
                    set::intersection(s, other_set),
                    annotation::meet_annotation(a, other_annotation),
                  )
                };
                PartialLiteral::Hole(substituted)
              }
            })
            .collect()
      })
      .collect()
}

/// Intersects every hole with the event and closes the result into a DNF.
fn event_intersection_with_partial_dnf(
  is_left_rule: bool,
  context: &Literal,
  event: SetId,
  partial: PartialDnf,
) -> Dnf {
  partial
      .into_iter()
      .map(|partial_cube| {
        partial_cube
            .into_iter()
            .map(|partial_literal| match partial_literal {
              PartialLiteral::Lit(literal) => literal,
              PartialLiteral::Hole((s, a)) => {
                let (e_and_s, e_and_s_annotation) = if is_left_rule {
                  (
                    set::intersection(event, s),
                    annotation::meet_annotation(annotation::none(), a),
                  )
                } else {
                  (
                    set::intersection(s, event),
                    annotation::meet_annotation(a, annotation::none()),
                  )
                };
                context.substitute_set((e_and_s, e_and_s_annotation))
              }
            })
            .collect::<Cube>()
      })
      .collect()
}

// ---------------------- Literal rules ----------------------

/// Applies the one applicable local rule to the literal, if any.
pub fn apply_rule(literal: &Literal) -> Option<Dnf> {
  set_unrolling(false);
  match literal.operation {
    PredicateOperation::Edge | PredicateOperation::Constant | PredicateOperation::Set => None,
    PredicateOperation::Equality => {
      // ~(e = e) -> FALSE, (e = e) -> TRUE
      if literal.left_event == literal.right_event {
        Some(if literal.negated {
          vec![vec![Literal::bottom()]]
        } else {
          vec![vec![Literal::top()]]
        })
      } else {
        None
      }
    }
    PredicateOperation::SetNonEmptiness => {
      let entry = set::get(literal.set.unwrap());
      if entry.operation() == SetOperation::Intersection
          && (set::get(entry.left().unwrap()).is_event()
              || set::get(entry.right().unwrap()).is_event())
      {
        // e & s != 0
        return handle_intersection_with_event(literal);
      }
      let partial = apply_set_rule(literal, literal.annotated_set())?;
      stats::count("rule applications");
      Some(to_dnf(literal, partial))
    }
  }
}

/// The atomization table for `e ∩ S ≠ ∅` (or symmetrically `S ∩ e ≠ ∅`) at
/// the root of a set-nonemptiness literal.
fn handle_intersection_with_event(literal: &Literal) -> Option<Dnf> {
  let root = set::get(literal.set.unwrap());
  let left_rule = set::get(root.left().unwrap()).is_event();
  let (e, s) = if left_rule {
    (root.left().unwrap(), root.right().unwrap())
  } else {
    (root.right().unwrap(), root.left().unwrap())
  };
  let s_annotation = if left_rule {
    annotation::get_right(literal.annotation)
  } else {
    annotation::get_left(literal.annotation)
  };
  let annotated_s: AnnotatedSet = (s, s_annotation);
  debug_assert!(set::get(e).is_event());

  let s_entry = set::get(s);
  match s_entry.operation() {
    SetOperation::BaseSet => {
      // e & A != 0  ->  e ∈ A
      let identifier = s_entry.identifier().unwrap();
      if !literal.negated {
        return Some(vec![vec![Literal::set_membership(e, identifier)]]);
      }
      let value = saturation_value(s_annotation);
      Some(vec![vec![Literal::negated_set_membership(e, identifier, value)]])
    }
    SetOperation::Event => {
      // e & f != 0  ->  e = f
      Some(vec![vec![Literal::equality(literal.negated, e, s)]])
    }
    SetOperation::EmptySet => Some(if literal.negated {
      vec![vec![Literal::top()]]
    } else {
      vec![vec![Literal::bottom()]]
    }),
    SetOperation::FullSet => Some(if literal.negated {
      vec![vec![Literal::bottom()]]
    } else {
      vec![vec![Literal::top()]]
    }),
    SetOperation::Intersection => {
      // e & (s1 & s2) -> e & s1 , e & s2
      let s1 = s_entry.left().unwrap();
      let s2 = s_entry.right().unwrap();
      let e_and_s1 = if left_rule { set::intersection(e, s1) } else { set::intersection(s1, e) };
      let e_and_s2 = if left_rule { set::intersection(e, s2) } else { set::intersection(s2, e) };

      if !literal.negated {
        return Some(vec![vec![
          literal.substitute_set((e_and_s1, annotation::none())),
          literal.substitute_set((e_and_s2, annotation::none())),
        ]]);
      }

      let orient = |inner: annotation::AnnotationId| {
        if left_rule {
          annotation::meet_annotation(annotation::none(), inner)
        } else {
          annotation::meet_annotation(inner, annotation::none())
        }
      };
      let e_and_s1_annotation = orient(annotation::get_left(s_annotation));
      let e_and_s2_annotation = orient(annotation::get_right(s_annotation));
      Some(vec![
        vec![literal.substitute_set((e_and_s1, e_and_s1_annotation))],
        vec![literal.substitute_set((e_and_s2, e_and_s2_annotation))],
      ])
    }
    SetOperation::Union => {
      let s_result = apply_set_rule(literal, annotated_s).expect("union rule always applies");
      Some(event_intersection_with_partial_dnf(left_rule, literal, e, s_result))
    }
    SetOperation::Image | SetOperation::Domain => {
      let sp = s_entry.left().unwrap();
      let r = s_entry.relation().unwrap();

      if !set::get(sp).is_event() {
        // e & s'r -> re & s'    (and the three symmetric variants)
        let swapped = set::modal(s_entry.operation().opposite(), e, r);
        let swapped_and_sp = if left_rule {
          set::intersection(swapped, sp)
        } else {
          set::intersection(sp, swapped)
        };

        if !literal.negated {
          return Some(vec![vec![
            literal.substitute_set((swapped_and_sp, annotation::none()))
          ]]);
        }

        let sp_annotation = annotation::get_left(s_annotation);
        let r_annotation  = annotation::get_right(s_annotation);
        let swapped_annotation = annotation::meet_annotation(annotation::none(), r_annotation);
        let swapped_and_sp_annotation = if left_rule {
          annotation::meet_annotation(swapped_annotation, sp_annotation)
        } else {
          annotation::meet_annotation(sp_annotation, swapped_annotation)
        };
        return Some(vec![vec![
          literal.substitute_set((swapped_and_sp, swapped_and_sp_annotation))
        ]]);
      }

      if relation::get(r).operation() == RelationOperation::BaseRelation {
        // e & (f;b), e & (b;f) and symmetric variants shortcut to an edge.
        let b = relation::get(r).identifier().unwrap();
        let (first, second) = if s_entry.operation() == SetOperation::Image {
          (sp, e)
        } else {
          (e, sp)
        };

        if !literal.negated {
          return Some(vec![vec![Literal::edge(first, second, b)]]);
        }
        let r_annotation = annotation::get_right(s_annotation);
        debug_assert!(annotation::is_leaf(r_annotation));
        let value = saturation_value(r_annotation);
        return Some(vec![vec![Literal::negated_edge(first, second, b, value)]]);
      }

      // r is not base: apply some rule to the inner modal term. A rule may
      // not exist, since rules deriving TRUE are omitted.
      let s_result = apply_set_rule(literal, annotated_s)?;
      Some(event_intersection_with_partial_dnf(left_rule, literal, e, s_result))
    }
  }
}

// ---------------------- Set rules ----------------------

fn apply_set_rule(context: &Literal, annotated_set: AnnotatedSet) -> Option<PartialDnf> {
  let (set, set_annotation) = annotated_set;
  let entry = set::get(set);
  match entry.operation() {
    SetOperation::Event => {
      // No rule applicable to a single event constant.
      Some(if context.negated {
        vec![vec![PartialLiteral::Lit(Literal::bottom())]]
      } else {
        vec![vec![PartialLiteral::Lit(Literal::top())]]
      })
    }
    SetOperation::EmptySet => Some(if context.negated {
      vec![vec![PartialLiteral::Lit(Literal::top())]]
    } else {
      vec![vec![PartialLiteral::Lit(Literal::bottom())]]
    }),
    SetOperation::FullSet => {
      if context.negated {
        // Handled by the atomic-top modal inference on the branch.
        return None;
      }
      // [T] -> { [f] }
      let f = set::fresh_event();
      Some(vec![vec![hole(f)]])
    }
    SetOperation::Union => {
      // [A | B] -> { [A] }, { [B] };   ~[A | B] -> { ~[A], ~[B] }
      if !context.negated {
        return Some(vec![
          vec![hole(entry.left().unwrap())],
          vec![hole(entry.right().unwrap())],
        ]);
      }
      Some(vec![vec![
        PartialLiteral::Hole(annotated::get_left(annotated_set)),
        PartialLiteral::Hole(annotated::get_right_set(annotated_set)),
      ]])
    }
    SetOperation::Intersection => {
      let left_is_event  = set::get(entry.left().unwrap()).is_event();
      let right_is_event = set::get(entry.right().unwrap()).is_event();

      if !left_is_event && !right_is_event {
        // [S1 & S2]: recurse into the side a rule fires on.
        if let Some(left_result) = apply_set_rule(context, annotated::get_left(annotated_set)) {
          return Some(substitute_intersection_operand(
            false,
            left_result,
            annotated::get_right_set(annotated_set),
          ));
        }
        if let Some(right_result) = apply_set_rule(context, annotated::get_right_set(annotated_set)) {
          return Some(substitute_intersection_operand(
            true,
            right_result,
            annotated::get_left(annotated_set),
          ));
        }
        return None;
      }

      // The root case `e & s != 0` lives in handle_intersection_with_event.
      debug_assert!(context.set != Some(set), "root intersection reached the sub-term rule");

      // [e & s] -> { [e], e∈s };   ~[e & s] -> { ~[e] }, { ~(e∈s) }
      let intersection = annotated::new_set(
        SetOperation::Intersection,
        annotated::get_left(annotated_set),
        annotated::get_right_set(annotated_set),
      );
      let e = if left_is_event { entry.left().unwrap() } else { entry.right().unwrap() };
      let substitute = context.substitute_set(intersection);

      Some(if context.negated {
        vec![vec![hole(e)], vec![PartialLiteral::Lit(substitute)]]
      } else {
        vec![vec![hole(e), PartialLiteral::Lit(substitute)]]
      })
    }
    SetOperation::BaseSet => {
      if context.negated {
        // Requires context; handled by the base-set modal inference.
        return None;
      }
      // [B] -> { [f], f ∈ B }
      let f = set::fresh_event();
      Some(vec![vec![
        hole(f),
        PartialLiteral::Lit(Literal::set_membership(f, entry.identifier().unwrap())),
      ]])
    }
    SetOperation::Image | SetOperation::Domain => {
      if set::get(entry.left().unwrap()).is_event() {
        return apply_relational_rule(context, annotated_set);
      }

      let set_result = apply_set_rule(context, annotated::get_left(annotated_set))?;
      let annotated_relation = annotated::get_right_relation(annotated_set);
      Some(
        set_result
            .into_iter()
            .map(|partial_cube| {
              partial_cube
                  .into_iter()
                  .map(|partial_literal| match partial_literal {
                    PartialLiteral::Lit(literal) => PartialLiteral::Lit(literal),
                    PartialLiteral::Hole(inner) => PartialLiteral::Hole(annotated::new_modal_set(
                      entry.operation(),
                      inner,
                      annotated_relation,
                    )),
                  })
                  .collect()
            })
            .collect(),
      )
    }
  }
}

// ---------------------- Relational rules ----------------------

// The leading sub-term is an event followed by a relation, either as image
// `e;r` or domain `r;e`. Variable names below reflect the image case; the
// domain case is symmetric.
fn apply_relational_rule(context: &Literal, annotated_set: AnnotatedSet) -> Option<PartialDnf> {
  let (set, set_annotation) = annotated_set;
  let entry = set::get(set);
  let event = entry.left().unwrap();
  let rel = entry.relation().unwrap();
  let relation_annotation = annotation::get_right(set_annotation);
  let operation = entry.operation();
  debug_assert!(matches!(operation, SetOperation::Image | SetOperation::Domain));

  let rel_entry = relation::get(rel);
  match rel_entry.operation() {
    RelationOperation::BaseRelation => {
      // Positive form is deferred to modal expansion, negated form to the
      // atomic inference.
      None
    }
    RelationOperation::SetIdentity => {
      // [e[S]] -> { e & S, [e] };   ~[e[S]] -> { ~[e & S] }, { ~[e] }
      let e_and_s = set::intersection(event, rel_entry.set().unwrap());

      if !context.negated {
        return Some(vec![vec![
          PartialLiteral::Lit(Literal::set_nonempty(e_and_s)),
          hole(event),
        ]]);
      }
      // The image annotation has the same branching shape as `e & S`.
      Some(vec![
        vec![PartialLiteral::Lit(Literal::negated_set_nonempty((e_and_s, set_annotation)))],
        vec![hole(event)],
      ])
    }
    RelationOperation::CartesianProduct => {
      error!("Cartesian products are currently not supported.");
      panic!("unsupported operator: cartesian product");
    }
    RelationOperation::Full => {
      error!("Full relations are currently not supported.");
      panic!("unsupported operator: full relation in modal position");
    }
    RelationOperation::Empty => Some(if context.negated {
      vec![vec![PartialLiteral::Lit(Literal::top())]]
    } else {
      vec![vec![PartialLiteral::Lit(Literal::bottom())]]
    }),
    RelationOperation::Id => {
      // [e.id] -> { [e] }
      Some(vec![vec![hole(event)]])
    }
    RelationOperation::Union => {
      // [e.(r1 | r2)] -> { [e.r1] }, { [e.r2] }
      // ~[e.(r1 | r2)] -> { ~[e.r1], ~[e.r2] }
      let er1 = set::modal(operation, event, rel_entry.left().unwrap());
      let er2 = set::modal(operation, event, rel_entry.right().unwrap());

      if !context.negated {
        return Some(vec![vec![hole(er1)], vec![hole(er2)]]);
      }
      let er1_annotation = annotation::meet_annotation(
        annotation::none(),
        annotation::get_left(relation_annotation),
      );
      let er2_annotation = annotation::meet_annotation(
        annotation::none(),
        annotation::get_right(relation_annotation),
      );
      Some(vec![vec![
        PartialLiteral::Hole((er1, er1_annotation)),
        PartialLiteral::Hole((er2, er2_annotation)),
      ]])
    }
    RelationOperation::Composition => {
      // [e(a.b)] -> { [(e.a)b] };  for the domain form [(b.a)e] -> { [b(a.e)] }
      let (a, b) = if operation == SetOperation::Image {
        (rel_entry.left().unwrap(), rel_entry.right().unwrap())
      } else {
        (rel_entry.right().unwrap(), rel_entry.left().unwrap())
      };
      let ea = set::modal(operation, event, a);
      let ea_b = set::modal(operation, ea, b);

      if !context.negated {
        return Some(vec![vec![hole(ea_b)]]);
      }

      let (a_annotation, b_annotation) = if operation == SetOperation::Image {
        (
          annotation::get_left(relation_annotation),
          annotation::get_right(relation_annotation),
        )
      } else {
        (
          annotation::get_right(relation_annotation),
          annotation::get_left(relation_annotation),
        )
      };
      let ea_annotation = annotation::meet_annotation(annotation::none(), a_annotation);
      let ea_b_annotation = annotation::meet_annotation(ea_annotation, b_annotation);
      Some(vec![vec![PartialLiteral::Hole((ea_b, ea_b_annotation))]])
    }
    RelationOperation::Converse => {
      // [e.(r^-1)] -> { [r.e] }
      let re = set::modal(operation.opposite(), event, rel_entry.left().unwrap());

      if !context.negated {
        return Some(vec![vec![hole(re)]]);
      }
      let re_annotation = annotation::meet_annotation(annotation::none(), relation_annotation);
      Some(vec![vec![PartialLiteral::Hole((re, re_annotation))]])
    }
    RelationOperation::Intersection => {
      // [e.(r1 & r2)] -> { [e.r1 & e.r2] }
      let er1 = set::modal(operation, event, rel_entry.left().unwrap());
      let er2 = set::modal(operation, event, rel_entry.right().unwrap());
      let er1_and_er2 = set::intersection(er1, er2);

      if !context.negated {
        return Some(vec![vec![hole(er1_and_er2)]]);
      }
      let er1_annotation = annotation::meet_annotation(
        annotation::none(),
        annotation::get_left(relation_annotation),
      );
      let er2_annotation = annotation::meet_annotation(
        annotation::none(),
        annotation::get_right(relation_annotation),
      );
      let er1_and_er2_annotation = annotation::meet_annotation(er1_annotation, er2_annotation);
      Some(vec![vec![PartialLiteral::Hole((er1_and_er2, er1_and_er2_annotation))]])
    }
    RelationOperation::TransitiveClosure => {
      set_unrolling(true);
      // [e.r*] -> { [(e.r)r*] }, { [e] };   ~[e.r*] -> { ~[(e.r)r*], ~[e] }
      let er = set::modal(operation, event, rel_entry.left().unwrap());
      let err_star = set::modal(operation, er, rel);

      if !context.negated {
        return Some(vec![vec![hole(err_star)], vec![hole(event)]]);
      }
      let er_annotation = annotation::meet_annotation(annotation::none(), relation_annotation);
      let err_star_annotation = annotation::meet_annotation(er_annotation, relation_annotation);
      Some(vec![vec![
        PartialLiteral::Hole((err_star, err_star_annotation)),
        hole(event),
      ]])
    }
  }
}

// ---------------------- Modal rules ----------------------

/// The one-step positive modal rule. Applied only during regular-tableau
/// expansion; rewrites `e0;b` (or `b;e0`) for the minimal active event `e0`
/// to a fresh event plus a witnessing edge.
pub fn apply_positive_modal_rule(literal: &Literal, minimal_event: Event) -> Option<Dnf> {
  if literal.negated || literal.operation != PredicateOperation::SetNonEmptiness {
    return None;
  }
  let partial = apply_positive_modal_set_rule(literal.annotated_set(), minimal_event)?;
  Some(to_dnf(literal, partial))
}

fn apply_positive_modal_set_rule(
  annotated_set: AnnotatedSet,
  minimal_event: Event,
) -> Option<PartialDnf> {
  let (set, _) = annotated_set;
  let entry = set::get(set);
  match entry.operation() {
    SetOperation::Event
    | SetOperation::EmptySet
    | SetOperation::FullSet
    | SetOperation::Union
    | SetOperation::BaseSet => None,
    SetOperation::Intersection => {
      if let Some(left_result) =
          apply_positive_modal_set_rule(annotated::get_left(annotated_set), minimal_event)
      {
        return Some(substitute_intersection_operand(
          false,
          left_result,
          annotated::get_right_set(annotated_set),
        ));
      }
      if let Some(right_result) =
          apply_positive_modal_set_rule(annotated::get_right_set(annotated_set), minimal_event)
      {
        return Some(substitute_intersection_operand(
          true,
          right_result,
          annotated::get_left(annotated_set),
        ));
      }
      None
    }
    SetOperation::Image | SetOperation::Domain => {
      let left = set::get(entry.left().unwrap());
      if left.is_event() && left.label() == Some(minimal_event) {
        if relation::get(entry.relation().unwrap()).operation() != RelationOperation::BaseRelation {
          return None;
        }
        // [e.b] -> { [f], (e,f) ∈ b };   [b.e] -> { [f], (f,e) ∈ b }
        let e = entry.left().unwrap();
        let f = set::fresh_event();
        let b = relation::get(entry.relation().unwrap()).identifier().unwrap();
        let (first, second) = if entry.operation() == SetOperation::Image { (e, f) } else { (f, e) };

        stats::count("modal expansions");
        return Some(vec![vec![hole(f), PartialLiteral::Lit(Literal::edge(first, second, b))]]);
      }

      let set_result = apply_positive_modal_set_rule(annotated::get_left(annotated_set), minimal_event)?;
      let annotated_relation = annotated::get_right_relation(annotated_set);
      Some(
        set_result
            .into_iter()
            .map(|partial_cube| {
              partial_cube
                  .into_iter()
                  .map(|partial_literal| match partial_literal {
                    PartialLiteral::Lit(literal) => PartialLiteral::Lit(literal),
                    PartialLiteral::Hole(inner) => PartialLiteral::Hole(annotated::new_modal_set(
                      entry.operation(),
                      inner,
                      annotated_relation,
                    )),
                  })
                  .collect()
            })
            .collect(),
      )
    }
  }
}

// ---------------------- Saturation rules ----------------------

/// Base-relation saturation `(e1,e2) ∈ b` with `R ≤ b`: substitutes `R` for
/// `b`, paying one base budget.
pub fn saturate_base(literal: &Literal) -> Option<Literal> {
  if !literal.negated {
    return None;
  }
  match annotation::value(literal.annotation) {
    Some((_, base)) if base > 0 => {}
    _ => return None, // bound reached everywhere, or nothing to saturate
  }

  match literal.operation {
    PredicateOperation::Edge => {
      debug_assert!(annotation::is_leaf(literal.annotation));
      let assumed = assumption::base_assumption(literal.identifier.unwrap())?;

      // (e1, e2) ∈ b, R ≤ b  ->  e1R & e2
      let e1 = literal.left_event.unwrap();
      let e2 = literal.right_event.unwrap();
      let e1_r = set::image(e1, assumed);
      let e1_r_and_e2 = set::intersection(e1_r, e2);
      let (id_budget, base_budget) = saturation_value(literal.annotation);
      stats::count("base saturations");
      Some(Literal::negated_set_nonempty((
        e1_r_and_e2,
        annotated::make_with_value(e1_r_and_e2, (id_budget, base_budget - 1)),
      )))
    }
    PredicateOperation::SetNonEmptiness => {
      let saturated = saturate_base_annotated(literal.annotated_set())?;
      stats::count("base saturations");
      Some(Literal::negated_set_nonempty(saturated))
    }
    // Set membership is handled by saturate_base_set.
    _ => None,
  }
}

fn saturate_base_annotated(annotated_set: AnnotatedSet) -> Option<AnnotatedSet> {
  let (set, set_annotation) = annotated_set;
  match annotation::value(set_annotation) {
    Some((_, base)) if base > 0 => {}
    _ => return None,
  }

  let entry = set::get(set);
  match entry.operation() {
    SetOperation::Event
    | SetOperation::BaseSet
    | SetOperation::EmptySet
    | SetOperation::FullSet
    | SetOperation::Union => None, // saturate only inside intersection/domain/image
    SetOperation::Intersection => {
      let left_operand  = annotated::get_left(annotated_set);
      let right_operand = annotated::get_right_set(annotated_set);
      let left_saturated  = saturate_base_annotated(left_operand);
      let right_saturated = saturate_base_annotated(right_operand);
      if left_saturated.is_none() && right_saturated.is_none() {
        return None;
      }
      Some(annotated::new_set(
        entry.operation(),
        left_saturated.unwrap_or(left_operand),
        right_saturated.unwrap_or(right_operand),
      ))
    }
    SetOperation::Image | SetOperation::Domain => {
      let left_operand = annotated::get_left(annotated_set);

      if !set::get(entry.left().unwrap()).is_event() {
        let left_saturated = saturate_base_annotated(left_operand)?;
        return Some(annotated::new_modal_set(
          entry.operation(),
          left_saturated,
          annotated::get_right_relation(annotated_set),
        ));
      }

      let rel = entry.relation().unwrap();
      if relation::get(rel).operation() == RelationOperation::BaseRelation {
        let assumed = assumption::base_assumption(relation::get(rel).identifier().unwrap())?;
        let (id_budget, base_budget) =
            saturation_value(annotation::get_right(set_annotation));
        let saturated_relation = (
          assumed,
          annotated::make_with_value_relation(assumed, (id_budget, base_budget - 1)),
        );
        return Some(annotated::new_modal_set(entry.operation(), left_operand, saturated_relation));
      }
      None
    }
  }
}

/// Base-set saturation `e ∈ B` with `S ≤ B`: substitutes `S` for `B`.
pub fn saturate_base_set(literal: &Literal) -> Option<Literal> {
  if !literal.negated {
    return None;
  }
  match annotation::value(literal.annotation) {
    Some((_, base)) if base > 0 => {}
    _ => return None,
  }

  match literal.operation {
    PredicateOperation::Set => {
      debug_assert!(annotation::is_leaf(literal.annotation));
      // e ∈ B, S ≤ B  ->  e & S
      let assumed = assumption::base_set_assumption(literal.identifier.unwrap())?;
      let e = literal.left_event.unwrap();
      let e_and_s = set::intersection(e, assumed);
      let (id_budget, base_budget) = saturation_value(literal.annotation);
      stats::count("base set saturations");
      Some(Literal::negated_set_nonempty((
        e_and_s,
        annotated::make_with_value(e_and_s, (id_budget, base_budget - 1)),
      )))
    }
    PredicateOperation::SetNonEmptiness => {
      let saturated = saturate_base_set_annotated(literal.annotated_set())?;
      stats::count("base set saturations");
      Some(Literal::negated_set_nonempty(saturated))
    }
    // Edges are handled by saturate_base.
    _ => None,
  }
}

fn saturate_base_set_annotated(annotated_set: AnnotatedSet) -> Option<AnnotatedSet> {
  let (set, set_annotation) = annotated_set;
  match annotation::value(set_annotation) {
    Some((_, base)) if base > 0 => {}
    _ => return None,
  }

  let entry = set::get(set);
  match entry.operation() {
    SetOperation::BaseSet => {
      let assumed = assumption::base_set_assumption(entry.identifier().unwrap())?;
      let (id_budget, base_budget) = saturation_value(set_annotation);
      Some((assumed, annotated::make_with_value(assumed, (id_budget, base_budget - 1))))
    }
    SetOperation::Event | SetOperation::EmptySet | SetOperation::FullSet | SetOperation::Union => {
      None
    }
    SetOperation::Intersection => {
      let left_operand  = annotated::get_left(annotated_set);
      let right_operand = annotated::get_right_set(annotated_set);
      let left_saturated  = saturate_base_set_annotated(left_operand);
      let right_saturated = saturate_base_set_annotated(right_operand);
      if left_saturated.is_none() && right_saturated.is_none() {
        return None;
      }
      Some(annotated::new_set(
        entry.operation(),
        left_saturated.unwrap_or(left_operand),
        right_saturated.unwrap_or(right_operand),
      ))
    }
    SetOperation::Image | SetOperation::Domain => {
      let left_saturated = saturate_base_set_annotated(annotated::get_left(annotated_set))?;
      Some(annotated::new_modal_set(
        entry.operation(),
        left_saturated,
        annotated::get_right_relation(annotated_set),
      ))
    }
  }
}

/// Id saturation: rewrites `e;b` to `(e;R*);b` for the master id relation,
/// and saturates negated equalities once.
pub fn saturate_id(literal: &Literal) -> Option<Literal> {
  if !literal.negated || !assumption::has_id_assumptions() {
    return None;
  }
  let budget_left = matches!(annotation::value(literal.annotation), Some((id, _)) if id > 0);
  // Negated equality predicates can be saturated but carry no budget.
  if !budget_left && literal.operation != PredicateOperation::Equality {
    return None;
  }

  match literal.operation {
    PredicateOperation::Equality => {
      // ~(e1 = e2) -> ~(e1R & e2)
      let e1 = literal.left_event.unwrap();
      let e2 = literal.right_event.unwrap();
      let e1_r = set::image(e1, assumption::master_id_relation());
      let e1_r_and_e2 = set::intersection(e1_r, e2);
      stats::count("id saturations");
      Some(Literal::negated_set_nonempty((
        e1_r_and_e2,
        annotated::make_with_value(e1_r_and_e2, (0, 0)),
      )))
    }
    PredicateOperation::Edge => {
      // ~(e1, e2) ∈ b, R ≤ id -> ~(e1R & b.Re2)
      let e1 = literal.left_event.unwrap();
      let e2 = literal.right_event.unwrap();
      let b = relation::base_relation(literal.identifier.unwrap());
      let master = assumption::master_id_relation();
      let e1_r = set::image(e1, master);
      let r_e2 = set::domain(e2, master);
      let b_r_e2 = set::domain(r_e2, b);
      let e1_r_and_b_r_e2 = set::intersection(e1_r, b_r_e2);
      debug_assert!(annotation::is_leaf(literal.annotation));
      stats::count("id saturations");
      Some(Literal::negated_set_nonempty((
        e1_r_and_b_r_e2,
        annotated::make_with_value(e1_r_and_b_r_e2, (0, 0)),
      )))
    }
    PredicateOperation::SetNonEmptiness => {
      let saturated = saturate_id_annotated(literal.annotated_set())?;
      stats::count("id saturations");
      Some(Literal::negated_set_nonempty(saturated))
    }
    _ => None,
  }
}

fn saturate_id_annotated(annotated_set: AnnotatedSet) -> Option<AnnotatedSet> {
  let (set, set_annotation) = annotated_set;
  match annotation::value(set_annotation) {
    Some((id, _)) if id > 0 => {}
    _ => return None,
  }

  let entry = set::get(set);
  match entry.operation() {
    SetOperation::Event
    | SetOperation::BaseSet
    | SetOperation::EmptySet
    | SetOperation::FullSet
    | SetOperation::Union => None,
    SetOperation::Intersection => {
      let left_operand  = annotated::get_left(annotated_set);
      let right_operand = annotated::get_right_set(annotated_set);
      if let Some(left_saturated) = saturate_id_annotated(left_operand) {
        return Some(annotated::new_set(entry.operation(), left_saturated, right_operand));
      }
      let right_saturated = saturate_id_annotated(right_operand)?;
      Some(annotated::new_set(entry.operation(), left_operand, right_saturated))
    }
    SetOperation::Image | SetOperation::Domain => {
      let left_operand = annotated::get_left(annotated_set);

      if !set::get(entry.left().unwrap()).is_event() {
        let left_saturated = saturate_id_annotated(left_operand)?;
        return Some(annotated::new_modal_set(
          entry.operation(),
          left_saturated,
          annotated::get_right_relation(annotated_set),
        ));
      }

      if relation::get(entry.relation().unwrap()).operation() == RelationOperation::BaseRelation {
        // e.b -> (e.R).b
        let master = assumption::master_id_relation();
        let saturated_relation = (master, annotated::make_with_value_relation(master, (0, 0)));
        let e_r = annotated::new_modal_set(SetOperation::Image, left_operand, saturated_relation);
        let b = annotated::get_right_relation(annotated_set);
        return Some(annotated::new_modal_set(entry.operation(), e_r, b));
      }
      None
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::abstractions::IString;
  use crate::literal::print_cube;

  fn positive_nonempty(set: SetId) -> Literal {
    Literal::set_nonempty(set)
  }

  fn negated_nonempty(set: SetId) -> Literal {
    Literal::negated_set_nonempty((set, annotated::make_with_value(set, (1, 1))))
  }

  #[test]
  fn union_rule_splits_positive_and_conjoins_negated() {
    let a = set::base_set(IString::from("A"));
    let b = set::base_set(IString::from("B"));
    let union = set::union(a, b);

    let positive = apply_rule(&positive_nonempty(union)).unwrap();
    assert_eq!(positive.len(), 2);
    assert_eq!(positive[0].len(), 1);

    let negated = apply_rule(&negated_nonempty(union)).unwrap();
    assert_eq!(negated.len(), 1);
    assert_eq!(negated[0].len(), 2);
    assert!(negated[0].iter().all(|literal| literal.negated));
  }

  #[test]
  fn event_base_intersection_atomizes_to_edge() {
    let b = relation::base_relation(IString::from("b"));
    let goal = set::intersection(set::image(set::event(0), b), set::event(1));

    let positive = apply_rule(&positive_nonempty(goal)).unwrap();
    assert_eq!(positive, vec![vec![Literal::edge(set::event(0), set::event(1), IString::from("b"))]]);

    let negated = apply_rule(&negated_nonempty(goal)).unwrap();
    assert_eq!(negated.len(), 1);
    assert!(negated[0][0].is_negated_of(&positive[0][0]));
  }

  #[test]
  fn event_event_intersection_atomizes_to_equality() {
    let goal = set::intersection(set::event(0), set::event(1));
    let result = apply_rule(&positive_nonempty(goal)).unwrap();
    assert_eq!(result, vec![vec![Literal::equality(false, set::event(0), set::event(1))]]);
  }

  #[test]
  fn transitive_closure_raises_unrolling_flag() {
    let r = relation::base_relation(IString::from("r"));
    let star = relation::transitive_closure(r);
    let goal = set::image(set::event(0), star);

    let result = apply_rule(&positive_nonempty(goal)).unwrap();
    assert!(last_rule_was_unrolling());
    assert_eq!(result.len(), 2, "{}", print_cube(&result[0]));

    let _ = apply_rule(&positive_nonempty(set::event(0)));
    assert!(!last_rule_was_unrolling());
  }

  #[test]
  fn modal_rule_requires_minimal_event_and_base_relation() {
    let b = relation::base_relation(IString::from("b"));
    let literal = positive_nonempty(set::image(set::event(0), b));

    assert!(apply_positive_modal_rule(&literal, 1).is_none());
    let result = apply_positive_modal_rule(&literal, 0).unwrap();
    assert_eq!(result.len(), 1);
    // One fresh-event literal, one witnessing edge.
    assert_eq!(result[0].len(), 2);
    let edge = result[0].iter().find(|l| l.operation == PredicateOperation::Edge).unwrap();
    assert_eq!(edge.left_event, Some(set::event(0)));
  }

  #[test]
  fn base_saturation_decrements_budget_and_respects_bound() {
    crate::assumption::clear();
    let r = relation::base_relation(IString::from("r"));
    crate::assumption::add_base_assumption(IString::from("s"), r);

    let exhausted =
        Literal::negated_edge(set::event(0), set::event(1), IString::from("s"), (0, 0));
    assert!(saturate_base(&exhausted).is_none());

    let fresh = Literal::negated_edge(set::event(0), set::event(1), IString::from("s"), (1, 1));
    let saturated = saturate_base(&fresh).unwrap();
    assert!(saturated.negated);
    assert_eq!(annotation::value(saturated.annotation), Some((1, 0)));
    // A second saturation is blocked by the spent base budget.
    let again = apply_rule(&saturated).unwrap();
    let inner = &again[0][0];
    assert!(saturate_base(inner).is_none());
    crate::assumption::clear();
  }

  #[test]
  fn id_saturation_of_negated_equality_fires_once() {
    crate::assumption::clear();
    let r = relation::base_relation(IString::from("r"));
    crate::assumption::add_id_assumption(r);

    let inequality = Literal::equality(true, set::event(0), set::event(1));
    let saturated = saturate_id(&inequality).unwrap();
    assert!(saturated.negated);
    assert_eq!(saturated.operation, PredicateOperation::SetNonEmptiness);
    // The result carries a zero budget, so it cannot saturate again.
    assert!(saturate_id(&saturated).is_none());
    crate::assumption::clear();
  }
}
