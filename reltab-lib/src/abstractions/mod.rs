/*!

Small shared abstractions over backend crates: interned strings and sets of
events. Everything here is a thin alias or helper so the rest of the engine
can stay backend-agnostic.

*/

use std::iter::once;

use ustr::Ustr;

/// Interned strings. Create an interned string with `IString::from(..)`.
/// Base-relation and base-set names are interned so that identifier
/// comparison is a pointer comparison.
pub type IString = Ustr;

/// A sorted set of (small) event labels. Iteration is in ascending order.
pub type EventSet = bit_set::BitSet;

/// Union of two event sets, leaving the operands untouched.
pub fn event_set_union(left: &EventSet, right: &EventSet) -> EventSet {
  let mut result = left.clone();
  result.union_with(right);
  result
}

/// The single event `{label}`.
pub fn event_set_of(label: usize) -> EventSet {
  let mut result = EventSet::default();
  result.insert(label);
  result
}

/**
Join an iterator of strings, which doesn't exist in the stdlib. (C.f. `Vec::join(…)`)

Usage:

```text
let iter = ["Hello", "World"].iter().cloned();
let sep = ", ";
println!("{:?}", join_iter(iter, |_| sep).collect::<String>());
// "Hello, World"
```
*/
pub fn join_iter<T>(mut iter: impl Iterator<Item = T>, sep: impl Fn(&T) -> T) -> impl Iterator<Item = T> {
  iter
      .next()
      .into_iter()
      .chain(iter.flat_map(move |s| once(sep(&s)).chain(once(s))))
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn event_set_iteration_is_sorted() {
    let mut set = EventSet::default();
    set.insert(7);
    set.insert(1);
    set.insert(4);
    let collected: Vec<usize> = set.iter().collect();
    assert_eq!(collected, vec![1, 4, 7]);
  }

  #[test]
  fn join_iter_separates() {
    let iter = ["a", "b", "c"].iter().cloned();
    let joined: String = join_iter(iter, |_| ",").collect();
    assert_eq!(joined, "a,b,c");
  }
}
