/*!

The parse tree of the proof language. An intermediate AST keeps the grammar
free of term construction: expressions stay uninterpreted names and
operators until the driver lowers them into the hash-consed universe, where
`let` bindings and the set/relation distinction are resolved.

*/

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
  /// A base symbol, a `let`-bound name, or one of the builtin names
  /// (`id`, `0`, `E`).
  Name(String),
  /// `[S]`
  SetIdentity(Box<Expr>),
  /// `e1 | e2`
  Union(Box<Expr>, Box<Expr>),
  /// `e1 & e2`
  Intersection(Box<Expr>, Box<Expr>),
  /// `e1 ; e2`
  Composition(Box<Expr>, Box<Expr>),
  /// `e1 * e2`
  CartesianProduct(Box<Expr>, Box<Expr>),
  /// `e^-1`
  Converse(Box<Expr>),
  /// `e^*` — reflexive-transitive closure
  TransitiveClosure(Box<Expr>),
  /// `e^+` — one mandatory step, then the closure
  TransitiveStep(Box<Expr>),
  /// `e?` — reflexive optional
  Optional(Box<Expr>),
}

impl Expr {
  pub fn union(left: Expr, right: Expr) -> Expr {
    Expr::Union(Box::new(left), Box::new(right))
  }

  pub fn intersection(left: Expr, right: Expr) -> Expr {
    Expr::Intersection(Box::new(left), Box::new(right))
  }

  pub fn composition(left: Expr, right: Expr) -> Expr {
    Expr::Composition(Box::new(left), Box::new(right))
  }

  pub fn cartesian_product(left: Expr, right: Expr) -> Expr {
    Expr::CartesianProduct(Box::new(left), Box::new(right))
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AxiomKind {
  Empty,
  Irreflexive,
  Acyclic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
  /// `let name = e`
  Let(String, Expr),
  /// `assume lhs <= rhs`
  Assume(Expr, Expr),
  /// `assert lhs <= rhs`
  Assert(Expr, Expr),
  /// `empty e`, `irreflexive e`, `acyclic e`
  Axiom(AxiomKind, Expr),
}

#[derive(Clone, Debug, Default)]
pub struct Proof {
  pub statements: Vec<Statement>,
}
