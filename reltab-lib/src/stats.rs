/*!

A tiny process-wide statistics registry: named counters and yes/no tallies,
incremented on hot paths and dumped at debug level.

*/

use std::cell::RefCell;
use std::collections::BTreeMap;

use tracing::debug;

#[derive(Default)]
struct Registry {
  counters: BTreeMap<&'static str, u64>,
  booleans: BTreeMap<&'static str, (u64, u64)>, // (yes, no)
}

thread_local! {
  static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

pub fn count(name: &'static str) {
  REGISTRY.with(|registry| {
    *registry.borrow_mut().counters.entry(name).or_insert(0) += 1;
  });
}

pub fn boolean(name: &'static str, value: bool) {
  REGISTRY.with(|registry| {
    let mut registry = registry.borrow_mut();
    let entry = registry.booleans.entry(name).or_insert((0, 0));
    if value {
      entry.0 += 1;
    } else {
      entry.1 += 1;
    }
  });
}

pub fn dump() {
  REGISTRY.with(|registry| {
    let registry = registry.borrow();
    for (name, value) in &registry.counters {
      debug!("{name}: {value}");
    }
    for (name, (yes, no)) in &registry.booleans {
      debug!("{name}: yes {yes}, no {no}");
    }
  });
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counters_accumulate() {
    count("test counter");
    count("test counter");
    boolean("test boolean", true);
    boolean("test boolean", false);
    REGISTRY.with(|registry| {
      let registry = registry.borrow();
      assert_eq!(registry.counters["test counter"], 2);
      assert_eq!(registry.booleans["test boolean"], (1, 1));
    });
  }
}
