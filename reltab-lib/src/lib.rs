/*!

`reltab-lib` decides validity of inclusions between expressions of a
relation algebra with transitive closure, extended with assumptions
(base-relation inequalities, identity-bounded relations, base-set
inequalities) and emptiness-style axioms.

An inclusion `L ⊆ R` is rejected iff a finite witness model exists
satisfying `L ∧ ¬R` together with the assumptions; otherwise it is proved by
exhausting a cyclic proof search. The engine is layered as:

 - a hash-consed term universe for sets, relations, and saturation
   annotations ([`term`], [`annotation`]);
 - a local tableau reducing conjunctions of literals to disjunctive normal
   form of event-typed normal cubes ([`tableau`]);
 - a regular tableau exploring a finite-state graph of such cubes with
   subsumption, renaming canonicalization, lazy inconsistency repair, and
   counter-example extraction ([`regular`]);
 - a witness evaluator over finite relational models ([`model`]).

The engine is single-threaded and purely synchronous. All interned storage
(terms, annotations, assumptions, the fresh-event counter, the saturation
bound) is thread-local and append-only for the run: initialize once before
the first goal, persist across goals.

*/

pub mod abstractions;
pub mod annotation;
pub mod assumption;
pub mod literal;
pub mod model;
pub mod preprocessing;
pub mod regular;
pub mod stats;
pub mod tableau;
pub mod term;

pub use abstractions::IString;
pub use literal::{Cube, Dnf, Literal};
