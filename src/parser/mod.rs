/*!

Parser and lowering driver for the proof language.

A proof file is a sequence of declarations:

 - `let name = e` binds a name to a relation or set expression;
 - `assume lhs <= rhs` records an assumption, classified by the right-hand
   side: a base relation name, `id`, `0`, or a base set;
 - `empty e`, `irreflexive e`, `acyclic e` declare constraint axioms, which
   are rewritten into emptiness form (`irreflexive e` ⇝ `e ∩ id = 0`,
   `acyclic e` ⇝ `(e;e^*) ∩ id = 0`);
 - `assert lhs <= rhs` states a proof obligation.

Lowering populates the process-wide assumption store and produces one goal
cube per assertion: a positive witness literal for the left-hand side and a
negated, saturation-annotated literal for the right-hand side, over two
fresh events. Every emptiness assumption contributes one additional negated
literal per goal cube.

*/

pub mod ast;

use std::collections::HashMap;

use simple_error::{bail, SimpleError};
use tracing::info;

use reltab_lib::{
  annotation::annotated,
  assumption,
  literal::{Cube, Literal},
  tableau::rules,
  term::{
    relation::{self, RelationId, RelationOperation},
    set::{self, SetId},
  },
  IString,
};

use self::ast::{AxiomKind, Expr, Proof, Statement};

lalrpop_util::lalrpop_mod!(
  #[allow(clippy::all, unused_parens, unused_imports, dead_code)]
  logic,
  "/parser/logic.rs"
);

/// A name can stand for a relation or a set; `let` bindings remember which.
#[derive(Copy, Clone)]
enum CanonicalExpr {
  Relation(RelationId),
  Set(SetId),
}

#[derive(Default)]
pub struct ParsedProof {
  pub goals: Vec<Cube>,
}

pub fn parse_file(path: &str) -> Result<ParsedProof, SimpleError> {
  info!("parsing {path}");
  let text = std::fs::read_to_string(path)
      .map_err(|error| SimpleError::new(format!("cannot read {path}: {error}")))?;
  parse_text(&text)
}

pub fn parse_text(text: &str) -> Result<ParsedProof, SimpleError> {
  let proof: Proof = logic::ProofParser::new()
      .parse(text)
      .map_err(|error| SimpleError::new(format!("parse error: {error}")))?;
  lower(proof)
}

fn lower(proof: Proof) -> Result<ParsedProof, SimpleError> {
  let mut environment: HashMap<IString, CanonicalExpr> = HashMap::new();
  let mut assertions: Vec<(Literal, Literal)> = Vec::new();

  for statement in proof.statements {
    match statement {
      Statement::Let(name, expr) => {
        let lowered = match lower_relation(&expr, &environment) {
          Ok(rel) => CanonicalExpr::Relation(rel),
          Err(_) => CanonicalExpr::Set(lower_set(&expr, &environment)?),
        };
        environment.insert(IString::from(name.as_str()), lowered);
      }
      Statement::Axiom(kind, expr) => {
        let rel = lower_relation(&expr, &environment)?;
        let rewritten = match kind {
          AxiomKind::Empty => rel,
          AxiomKind::Irreflexive => relation::intersection(rel, relation::id_relation()),
          AxiomKind::Acyclic => relation::intersection(
            relation::composition(rel, relation::transitive_closure(rel)),
            relation::id_relation(),
          ),
        };
        assumption::add_emptiness_assumption(rewritten);
      }
      Statement::Assume(lhs, rhs) => lower_assumption(&lhs, &rhs, &environment)?,
      Statement::Assert(lhs, rhs) => {
        assertions.push(lower_assertion(&lhs, &rhs, &environment)?);
      }
    }
  }

  // Emptiness assumptions hold in every goal.
  let bound = rules::saturation_bound();
  let emptiness_literals: Cube = assumption::emptiness_assumptions()
      .into_iter()
      .map(|rel| {
        let witness = set::image(set::full_set(), rel);
        Literal::negated_set_nonempty((witness, annotated::make_with_value(witness, (bound, bound))))
      })
      .collect();

  let goals = assertions
      .into_iter()
      .map(|(positive, negative)| {
        let mut cube = vec![positive, negative];
        cube.extend(emptiness_literals.iter().cloned());
        cube
      })
      .collect();

  Ok(ParsedProof { goals })
}

// An assumption `lhs <= rhs` lands in the store slot picked by its
// right-hand side.
fn lower_assumption(
  lhs: &Expr,
  rhs: &Expr,
  environment: &HashMap<IString, CanonicalExpr>,
) -> Result<(), SimpleError> {
  if let Ok(bound) = lower_relation(rhs, environment) {
    let entry = relation::get(bound);
    return match entry.operation() {
      RelationOperation::BaseRelation => {
        let lowered = lower_relation(lhs, environment)?;
        assumption::add_base_assumption(entry.identifier().unwrap(), lowered);
        Ok(())
      }
      RelationOperation::Id => {
        let lowered = lower_relation(lhs, environment)?;
        assumption::add_id_assumption(lowered);
        Ok(())
      }
      RelationOperation::Empty => {
        let lowered = lower_relation(lhs, environment)?;
        assumption::add_emptiness_assumption(lowered);
        Ok(())
      }
      _ => bail!("unsupported assumption shape: rhs must be a base relation, id, 0, or a base set"),
    };
  }

  let bound = lower_set(rhs, environment)?;
  let entry = set::get(bound);
  if entry.operation() == set::SetOperation::BaseSet {
    let lowered = lower_set(lhs, environment)?;
    assumption::add_base_set_assumption(entry.identifier().unwrap(), lowered);
    return Ok(());
  }
  bail!("unsupported assumption shape: rhs must be a base relation, id, 0, or a base set")
}

// `assert lhs <= rhs` becomes the cube { (e1;lhs & e2) != 0, ~((e1;rhs & e2) != 0) }
// over fresh events; set assertions use a single fresh event membership.
fn lower_assertion(
  lhs: &Expr,
  rhs: &Expr,
  environment: &HashMap<IString, CanonicalExpr>,
) -> Result<(Literal, Literal), SimpleError> {
  let bound = rules::saturation_bound();

  if let (Ok(left), Ok(right)) = (lower_relation(lhs, environment), lower_relation(rhs, environment))
  {
    let e1 = set::fresh_event();
    let e2 = set::fresh_event();
    let positive = set::intersection(set::image(e1, left), e2);
    let negative = set::intersection(set::image(e1, right), e2);
    return Ok((
      Literal::set_nonempty(positive),
      Literal::negated_set_nonempty((
        negative,
        annotated::make_with_value(negative, (bound, bound)),
      )),
    ));
  }

  let left = lower_set(lhs, environment)?;
  let right = lower_set(rhs, environment)?;
  let e1 = set::fresh_event();
  let positive = set::intersection(left, e1);
  let negative = set::intersection(right, e1);
  Ok((
    Literal::set_nonempty(positive),
    Literal::negated_set_nonempty((negative, annotated::make_with_value(negative, (bound, bound)))),
  ))
}

fn lower_relation(
  expr: &Expr,
  environment: &HashMap<IString, CanonicalExpr>,
) -> Result<RelationId, SimpleError> {
  match expr {
    Expr::Name(name) => match name.as_str() {
      "id" => Ok(relation::id_relation()),
      "0" => Ok(relation::empty_relation()),
      _ => match environment.get(&IString::from(name.as_str())) {
        Some(CanonicalExpr::Relation(rel)) => Ok(*rel),
        Some(CanonicalExpr::Set(_)) => bail!("{name} names a set, not a relation"),
        None if name == "E" => bail!("E is the full set, not a relation"),
        None => Ok(relation::base_relation(IString::from(name.as_str()))),
      },
    },
    Expr::SetIdentity(inner) => Ok(relation::set_identity(lower_set(inner, environment)?)),
    Expr::Union(left, right) => Ok(relation::union(
      lower_relation(left, environment)?,
      lower_relation(right, environment)?,
    )),
    Expr::Intersection(left, right) => Ok(relation::intersection(
      lower_relation(left, environment)?,
      lower_relation(right, environment)?,
    )),
    Expr::Composition(left, right) => Ok(relation::composition(
      lower_relation(left, environment)?,
      lower_relation(right, environment)?,
    )),
    Expr::CartesianProduct(left, right) => Ok(relation::cartesian_product(
      lower_relation(left, environment)?,
      lower_relation(right, environment)?,
    )),
    Expr::Converse(inner) => Ok(relation::converse(lower_relation(inner, environment)?)),
    Expr::TransitiveClosure(inner) => {
      Ok(relation::transitive_closure(lower_relation(inner, environment)?))
    }
    Expr::TransitiveStep(inner) => {
      let rel = lower_relation(inner, environment)?;
      Ok(relation::composition(rel, relation::transitive_closure(rel)))
    }
    Expr::Optional(inner) => {
      Ok(relation::union(lower_relation(inner, environment)?, relation::id_relation()))
    }
  }
}

fn lower_set(
  expr: &Expr,
  environment: &HashMap<IString, CanonicalExpr>,
) -> Result<SetId, SimpleError> {
  match expr {
    Expr::Name(name) => match name.as_str() {
      "0" => Ok(set::empty_set()),
      "E" => Ok(set::full_set()),
      _ => match environment.get(&IString::from(name.as_str())) {
        Some(CanonicalExpr::Set(lowered)) => Ok(*lowered),
        Some(CanonicalExpr::Relation(_)) => bail!("{name} names a relation, not a set"),
        None => Ok(set::base_set(IString::from(name.as_str()))),
      },
    },
    Expr::Union(left, right) => {
      Ok(set::union(lower_set(left, environment)?, lower_set(right, environment)?))
    }
    Expr::Intersection(left, right) => {
      Ok(set::intersection(lower_set(left, environment)?, lower_set(right, environment)?))
    }
    _ => bail!("expression is not a set"),
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_assertion_into_two_literal_goal() {
    assumption::clear();
    let proof = parse_text("assert a <= a").unwrap();
    assert_eq!(proof.goals.len(), 1);
    let cube = &proof.goals[0];
    assert_eq!(cube.len(), 2);
    assert!(!cube[0].negated);
    assert!(cube[1].negated);
    assumption::clear();
  }

  #[test]
  fn classifies_assumptions_by_right_hand_side() {
    assumption::clear();
    let _ = parse_text(
      "assume r <= s\n\
       assume t <= id\n\
       assume u <= 0\n",
    )
    .unwrap();
    assert!(assumption::base_assumption(IString::from("s")).is_some());
    assert!(assumption::has_id_assumptions());
    assert_eq!(assumption::emptiness_assumptions().len(), 1);
    assumption::clear();
  }

  #[test]
  fn axioms_are_rewritten_into_emptiness_form() {
    assumption::clear();
    let proof = parse_text("irreflexive a\nassert a <= a").unwrap();
    let empties = assumption::emptiness_assumptions();
    assert_eq!(empties.len(), 1);
    let entry = relation::get(empties[0]);
    assert_eq!(entry.operation(), RelationOperation::Intersection);
    // The axiom shows up as a third literal on the goal cube.
    assert_eq!(proof.goals[0].len(), 3);
    assert!(proof.goals[0][2].negated);
    assumption::clear();
  }

  #[test]
  fn let_bindings_resolve_in_later_expressions() {
    assumption::clear();
    let proof = parse_text("let rs = r | s\nassert rs <= rs").unwrap();
    assert_eq!(proof.goals.len(), 1);
    assumption::clear();
  }

  #[test]
  fn operator_sugar_lowers_to_core_constructors() {
    assumption::clear();
    let env = HashMap::new();
    let plus = lower_relation(
      &Expr::TransitiveStep(Box::new(Expr::Name("r".to_string()))),
      &env,
    )
    .unwrap();
    let r = relation::base_relation(IString::from("r"));
    assert_eq!(plus, relation::composition(r, relation::transitive_closure(r)));

    let optional =
        lower_relation(&Expr::Optional(Box::new(Expr::Name("r".to_string()))), &env).unwrap();
    assert_eq!(optional, relation::union(r, relation::id_relation()));
    assumption::clear();
  }
}
