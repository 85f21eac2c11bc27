/*!

A `Renaming` is a strict partial permutation on event labels, kept as a
vector of `(from, to)` pairs sorted by domain. The domain has no duplicates
and the range has no duplicates, so a renaming is injective where defined.

*/

use smallvec::SmallVec;

use crate::{abstractions::EventSet, term::Event};

type Mapping = SmallVec<[(Event, Event); 4]>;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Renaming {
  mapping: Mapping,
}

impl Renaming {
  fn new(mut mapping: Mapping) -> Renaming {
    mapping.sort_unstable_by_key(|&(from, _)| from);
    debug_assert!(
      mapping.windows(2).all(|w| w[0].0 < w[1].0),
      "duplicates in renaming domain"
    );
    debug_assert!(
      {
        let mut range: Vec<Event> = mapping.iter().map(|&(_, to)| to).collect();
        range.sort_unstable();
        range.windows(2).all(|w| w[0] < w[1])
      },
      "duplicates in renaming range"
    );
    Renaming { mapping }
  }

  /// Packs the listed labels onto `0..n-1` in list order.
  pub fn minimal(from: &[Event]) -> Renaming {
    let mapping: Mapping = from.iter().enumerate().map(|(i, &label)| (label, i)).collect();
    Renaming::new(mapping)
  }

  /// The single pair `from -> to`.
  pub fn simple(from: Event, to: Event) -> Renaming {
    Renaming::new(SmallVec::from_slice(&[(from, to)]))
  }

  /// The identity on the given events.
  pub fn identity(events: &EventSet) -> Renaming {
    let mapping: Mapping = events.iter().map(|event| (event, event)).collect();
    Renaming::new(mapping)
  }

  pub fn inverted(&self) -> Renaming {
    let mapping: Mapping = self.mapping.iter().map(|&(from, to)| (to, from)).collect();
    Renaming::new(mapping)
  }

  /// Strict composition: pairs whose target is undefined in `other` are
  /// dropped.
  pub fn compose(&self, other: &Renaming) -> Renaming {
    let mapping: Mapping = self
        .mapping
        .iter()
        .filter_map(|&(a, b)| other.rename_strict(b).map(|c| (a, c)))
        .collect();
    Renaming::new(mapping)
  }

  /// Total composition: unknown targets pass through `other` unchanged.
  pub fn total_compose(&self, other: &Renaming) -> Renaming {
    let mapping: Mapping = self.mapping.iter().map(|&(a, b)| (a, other.rename(b))).collect();
    Renaming::new(mapping)
  }

  #[inline(always)]
  pub fn size(&self) -> usize { self.mapping.len() }

  #[inline(always)]
  pub fn mapping(&self) -> &[(Event, Event)] { &self.mapping }

  pub fn rename_strict(&self, n: Event) -> Option<Event> {
    self
        .mapping
        .binary_search_by_key(&n, |&(from, _)| from)
        .ok()
        .map(|index| self.mapping[index].1)
  }

  #[inline]
  pub fn rename(&self, n: Event) -> Event {
    self.rename_strict(n).unwrap_or(n)
  }

  pub fn is_strictly_renameable(&self, to_rename: impl IntoIterator<Item = Event>) -> bool {
    to_rename.into_iter().all(|event| self.rename_strict(event).is_some())
  }
}


#[cfg(test)]
mod tests {
  use rand::seq::SliceRandom;

  use super::*;
  use crate::abstractions::event_set_of;

  #[test]
  fn minimal_packs_in_list_order() {
    let renaming = Renaming::minimal(&[7, 2, 5]);
    assert_eq!(renaming.rename(7), 0);
    assert_eq!(renaming.rename(2), 1);
    assert_eq!(renaming.rename(5), 2);
    assert_eq!(renaming.rename(9), 9);
    assert_eq!(renaming.rename_strict(9), None);
  }

  #[test]
  fn inverted_composes_to_identity_on_domain() {
    let renaming = Renaming::minimal(&[4, 1, 8]);
    let composed = renaming.compose(&renaming.inverted());
    for &(from, to) in composed.mapping() {
      assert_eq!(from, to);
    }
    assert_eq!(composed.size(), renaming.size());
  }

  #[test]
  fn strict_compose_drops_undefined_targets() {
    let first  = Renaming::simple(0, 5);
    let second = Renaming::simple(6, 7);
    assert_eq!(first.compose(&second).size(), 0);
    assert_eq!(first.total_compose(&second).rename(0), 5);
  }

  #[test]
  fn identity_is_identity() {
    let mut events = event_set_of(3);
    events.insert(11);
    let renaming = Renaming::identity(&events);
    assert_eq!(renaming.rename(3), 3);
    assert_eq!(renaming.rename(11), 11);
    assert_eq!(renaming.size(), 2);
  }

  #[test]
  fn random_bijections_round_trip() {
    let mut rng = rand::thread_rng();
    for _ in 0..32 {
      let mut labels: Vec<Event> = (0..12).collect();
      labels.shuffle(&mut rng);
      let renaming = Renaming::minimal(&labels);
      let inverted = renaming.inverted();
      for &label in &labels {
        assert_eq!(inverted.rename(renaming.rename(label)), label);
      }
    }
  }
}
