//! Provides the `ObservedAggregates` struct: a slot-scoped set of aggregate
//! attestation roots, used both to drop gossip repeats and to suppress
//! re-publishing aggregates that arrived inside an imported block.

use std::collections::{BTreeMap, HashSet};
use types::{Hash256, Slot};

#[derive(Debug, PartialEq)]
pub enum ObserveOutcome {
    New,
    AlreadyKnown,
}

#[derive(Debug, Default)]
pub struct ObservedAggregates {
    /// Aggregate roots keyed by attestation slot, so pruning is a range cut.
    items: BTreeMap<Slot, HashSet<Hash256>>,
    lowest_permissible_slot: Slot,
}

impl ObservedAggregates {
    pub fn observe_root(&mut self, slot: Slot, root: Hash256) -> ObserveOutcome {
        if slot < self.lowest_permissible_slot {
            // Too old to matter; treat as known so it is never re-published.
            return ObserveOutcome::AlreadyKnown;
        }
        if self.items.entry(slot).or_default().insert(root) {
            ObserveOutcome::New
        } else {
            ObserveOutcome::AlreadyKnown
        }
    }

    pub fn is_known(&self, slot: Slot, root: Hash256) -> bool {
        slot < self.lowest_permissible_slot
            || self
                .items
                .get(&slot)
                .is_some_and(|roots| roots.contains(&root))
    }

    pub fn prune(&mut self, lowest_permissible_slot: Slot) {
        if lowest_permissible_slot <= self.lowest_permissible_slot {
            return;
        }
        self.lowest_permissible_slot = lowest_permissible_slot;
        self.items = self.items.split_off(&lowest_permissible_slot);
    }

    pub fn len(&self) -> usize {
        self.items.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::FixedBytesExtended;

    fn root(i: u64) -> Hash256 {
        Hash256::from_low_u64_be(i)
    }

    #[test]
    fn observe_then_known() {
        let mut cache = ObservedAggregates::default();
        assert_eq!(cache.observe_root(Slot::new(3), root(1)), ObserveOutcome::New);
        assert_eq!(
            cache.observe_root(Slot::new(3), root(1)),
            ObserveOutcome::AlreadyKnown
        );
        assert!(cache.is_known(Slot::new(3), root(1)));
        assert!(!cache.is_known(Slot::new(3), root(2)));
    }

    #[test]
    fn prune_cuts_below_and_marks_old_as_known() {
        let mut cache = ObservedAggregates::default();
        cache.observe_root(Slot::new(1), root(1));
        cache.observe_root(Slot::new(64), root(2));
        cache.prune(Slot::new(32));

        assert_eq!(cache.len(), 1);
        assert!(cache.is_known(Slot::new(1), root(99)), "below the floor");
        assert!(cache.is_known(Slot::new(64), root(2)));
    }
}
