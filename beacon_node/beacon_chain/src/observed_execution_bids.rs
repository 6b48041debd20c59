//! Provides the `ObservedExecutionBids` struct: duplicate and equivocation
//! tracking for Gloas ePBS execution payload bids.
//!
//! A builder gets one bid per slot. Seeing the same bid twice is a repeat;
//! seeing a different bid for the same `(builder, slot)` is equivocation.

use std::collections::HashMap;
use std::marker::PhantomData;
use types::{EthSpec, Hash256, Slot};

#[derive(Debug, PartialEq)]
pub enum Error {
    FinalizedSlot { slot: Slot, finalized_slot: Slot },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BidObservation {
    New,
    Duplicate,
    /// The builder already bid differently this slot. Carries the root of
    /// the first bid, the evidence for a slashing report.
    Equivocation(Hash256),
}

#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
struct BidKey {
    builder_index: u64,
    slot: Slot,
}

pub struct ObservedExecutionBids<E: EthSpec> {
    finalized_slot: Slot,
    items: HashMap<BidKey, Hash256>,
    _phantom: PhantomData<E>,
}

impl<E: EthSpec> Default for ObservedExecutionBids<E> {
    fn default() -> Self {
        Self {
            finalized_slot: Slot::new(0),
            items: HashMap::new(),
            _phantom: PhantomData,
        }
    }
}

impl<E: EthSpec> ObservedExecutionBids<E> {
    pub fn observe_bid(
        &mut self,
        builder_index: u64,
        slot: Slot,
        bid_root: Hash256,
    ) -> Result<BidObservation, Error> {
        if slot <= self.finalized_slot && self.finalized_slot > Slot::new(0) {
            return Err(Error::FinalizedSlot {
                slot,
                finalized_slot: self.finalized_slot,
            });
        }

        let key = BidKey {
            builder_index,
            slot,
        };
        match self.items.get(&key) {
            None => {
                self.items.insert(key, bid_root);
                Ok(BidObservation::New)
            }
            Some(existing) if *existing == bid_root => Ok(BidObservation::Duplicate),
            Some(existing) => Ok(BidObservation::Equivocation(*existing)),
        }
    }

    pub fn prune(&mut self, finalized_slot: Slot) {
        if finalized_slot <= self.finalized_slot {
            return;
        }
        self.finalized_slot = finalized_slot;
        self.items.retain(|key, _| key.slot > finalized_slot);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{FixedBytesExtended, MainnetEthSpec};

    type E = MainnetEthSpec;

    #[test]
    fn duplicate_and_equivocation_are_distinguished() {
        let mut cache = ObservedExecutionBids::<E>::default();
        let first = Hash256::from_low_u64_be(1);
        let second = Hash256::from_low_u64_be(2);

        assert_eq!(
            cache.observe_bid(42, Slot::new(9), first),
            Ok(BidObservation::New)
        );
        assert_eq!(
            cache.observe_bid(42, Slot::new(9), first),
            Ok(BidObservation::Duplicate)
        );
        assert_eq!(
            cache.observe_bid(42, Slot::new(9), second),
            Ok(BidObservation::Equivocation(first)),
            "the first root is the evidence"
        );
        // A different builder in the same slot is independent.
        assert_eq!(
            cache.observe_bid(43, Slot::new(9), second),
            Ok(BidObservation::New)
        );
    }

    #[test]
    fn finalized_slots_are_rejected_after_prune() {
        let mut cache = ObservedExecutionBids::<E>::default();
        cache
            .observe_bid(1, Slot::new(10), Hash256::from_low_u64_be(1))
            .unwrap();
        cache
            .observe_bid(1, Slot::new(40), Hash256::from_low_u64_be(2))
            .unwrap();

        cache.prune(Slot::new(32));
        assert_eq!(cache.len(), 1);
        assert!(matches!(
            cache.observe_bid(1, Slot::new(10), Hash256::from_low_u64_be(1)),
            Err(Error::FinalizedSlot { .. })
        ));
    }
}
