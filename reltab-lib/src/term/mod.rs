/*!

The hash-consed term universe.

Set and relation expressions are immutable DAGs stored in append-only arenas,
one per operator family. The factory functions return a typed id (`SetId`,
`RelationId`); structurally identical construction requests return the same
id, so equality of terms is equality of ids and hashing a term hashes its id.

Derived facts (normality, occurring events, printed form, ...) are computed
once when a node is first interned and cached on the arena entry.

*/

pub mod relation;
pub mod renaming;
pub mod set;

/// An existentially quantified point, referenced by its integer label.
pub type Event = usize;
