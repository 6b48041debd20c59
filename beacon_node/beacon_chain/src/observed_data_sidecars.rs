//! Provides the `ObservedDataSidecars` struct: per-tuple uniqueness for blob
//! and data-column sidecars.
//!
//! The tuple is `(slot, proposer_index, sidecar_index)`. The first sidecar
//! for a tuple wins; an identical repeat is benign (IGNORE), a *different*
//! sidecar under the same tuple is provable misbehaviour (REJECT).

use std::collections::HashMap;
use std::marker::PhantomData;
use types::{EthSpec, Hash256, Slot};

#[derive(Debug, PartialEq)]
pub enum Error {
    FinalizedSidecar { slot: Slot, finalized_slot: Slot },
}

/// What a new observation means for the gossip pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SidecarObservation {
    /// First sidecar for the tuple.
    New,
    /// Byte-identical to the sidecar already held for the tuple.
    Duplicate,
    /// A different sidecar already occupies the tuple.
    ConflictsWithExisting,
}

#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
struct SidecarKey {
    slot: Slot,
    proposer_index: u64,
    index: u64,
}

pub struct ObservedDataSidecars<E: EthSpec> {
    finalized_slot: Slot,
    /// Maps the tuple to the hash-tree-root of the first sidecar seen for it.
    items: HashMap<SidecarKey, Hash256>,
    _phantom: PhantomData<E>,
}

impl<E: EthSpec> Default for ObservedDataSidecars<E> {
    fn default() -> Self {
        Self {
            finalized_slot: Slot::new(0),
            items: HashMap::new(),
            _phantom: PhantomData,
        }
    }
}

impl<E: EthSpec> ObservedDataSidecars<E> {
    /// Observe a sidecar identified by its tuple and content root.
    pub fn observe_sidecar(
        &mut self,
        slot: Slot,
        proposer_index: u64,
        index: u64,
        sidecar_root: Hash256,
    ) -> Result<SidecarObservation, Error> {
        self.sanitize_slot(slot)?;

        let key = SidecarKey {
            slot,
            proposer_index,
            index,
        };
        match self.items.get(&key) {
            None => {
                self.items.insert(key, sidecar_root);
                Ok(SidecarObservation::New)
            }
            Some(existing) if *existing == sidecar_root => Ok(SidecarObservation::Duplicate),
            Some(_) => Ok(SidecarObservation::ConflictsWithExisting),
        }
    }

    /// The root already occupying the tuple, without mutating the cache.
    ///
    /// Validators peek before running the expensive checks and only commit
    /// the observation once the sidecar fully validates, so an invalid
    /// sidecar can never squat on a tuple.
    pub fn observation(&self, slot: Slot, proposer_index: u64, index: u64) -> Option<Hash256> {
        self.items
            .get(&SidecarKey {
                slot,
                proposer_index,
                index,
            })
            .copied()
    }

    pub fn is_known(&self, slot: Slot, proposer_index: u64, index: u64) -> bool {
        self.observation(slot, proposer_index, index).is_some()
    }

    fn sanitize_slot(&self, slot: Slot) -> Result<(), Error> {
        if slot <= self.finalized_slot && self.finalized_slot > Slot::new(0) {
            Err(Error::FinalizedSidecar {
                slot,
                finalized_slot: self.finalized_slot,
            })
        } else {
            Ok(())
        }
    }

    pub fn prune(&mut self, finalized_slot: Slot) {
        if finalized_slot <= self.finalized_slot {
            return;
        }
        self.finalized_slot = finalized_slot;
        self.items.retain(|key, _| key.slot > finalized_slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{FixedBytesExtended, MainnetEthSpec};

    type E = MainnetEthSpec;

    fn root(i: u64) -> Hash256 {
        Hash256::from_low_u64_be(i)
    }

    #[test]
    fn tuple_uniqueness() {
        let mut cache = ObservedDataSidecars::<E>::default();
        assert_eq!(
            cache.observe_sidecar(Slot::new(1), 7, 0, root(1)),
            Ok(SidecarObservation::New)
        );
        assert_eq!(
            cache.observe_sidecar(Slot::new(1), 7, 0, root(1)),
            Ok(SidecarObservation::Duplicate)
        );
        assert_eq!(
            cache.observe_sidecar(Slot::new(1), 7, 0, root(2)),
            Ok(SidecarObservation::ConflictsWithExisting),
            "different sidecar under an occupied tuple"
        );
        // A different index is a fresh tuple.
        assert_eq!(
            cache.observe_sidecar(Slot::new(1), 7, 1, root(2)),
            Ok(SidecarObservation::New)
        );
    }

    #[test]
    fn pruning_is_slot_scoped() {
        let mut cache = ObservedDataSidecars::<E>::default();
        cache.observe_sidecar(Slot::new(5), 0, 0, root(1)).unwrap();
        cache.observe_sidecar(Slot::new(40), 0, 0, root(2)).unwrap();
        cache.prune(Slot::new(32));

        assert!(!cache.is_known(Slot::new(5), 0, 0));
        assert!(cache.is_known(Slot::new(40), 0, 0));
        assert!(matches!(
            cache.observe_sidecar(Slot::new(5), 0, 0, root(1)),
            Err(Error::FinalizedSidecar { .. })
        ));
    }
}
