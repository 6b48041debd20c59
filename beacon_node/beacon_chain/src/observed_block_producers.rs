//! Provides the `ObservedBlockProducers` struct: first-block-per-proposer
//! tracking plus the proposer-signature reuse cache sidecar validation
//! borrows from block validation.

use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use types::{EthSpec, Hash256, Slot};

/// Verified proposer signatures are remembered per block root so each of a
/// block's many sidecars can skip re-verification.
const PROPOSER_SIGNATURE_CACHE_SIZE: NonZeroUsize = NonZeroUsize::new(64).expect("non-zero");

#[derive(Debug, PartialEq)]
pub enum Error {
    /// The slot is finalized and the cache no longer tracks it.
    FinalizedBlock { slot: Slot, finalized_slot: Slot },
}

#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
struct ProposalKey {
    slot: Slot,
    proposer_index: u64,
}

/// Remembers the first valid block seen for each `(slot, proposer)`.
///
/// Pruned at finalization; a block at or before the finalized slot is an
/// error, matching the gossip pipeline which drops those earlier.
pub struct ObservedBlockProducers<E: EthSpec> {
    finalized_slot: Slot,
    items: HashMap<ProposalKey, HashSet<Hash256>>,
    /// Block roots whose proposer signature has already been verified.
    verified_proposer_signatures: LruCache<Hash256, ()>,
    _phantom: PhantomData<E>,
}

impl<E: EthSpec> Default for ObservedBlockProducers<E> {
    fn default() -> Self {
        Self {
            finalized_slot: Slot::new(0),
            items: HashMap::new(),
            verified_proposer_signatures: LruCache::new(PROPOSER_SIGNATURE_CACHE_SIZE),
            _phantom: PhantomData,
        }
    }
}

impl<E: EthSpec> ObservedBlockProducers<E> {
    /// Observe that a valid block for `(slot, proposer_index)` with `block_root`
    /// was seen.
    ///
    /// Returns `true` if a *different* block was already observed for the
    /// pair (an equivocation, or simply a repeat proposal to be ignored).
    pub fn observe_proposal(
        &mut self,
        slot: Slot,
        proposer_index: u64,
        block_root: Hash256,
    ) -> Result<bool, Error> {
        self.sanitize_slot(slot)?;

        let roots = self
            .items
            .entry(ProposalKey {
                slot,
                proposer_index,
            })
            .or_default();
        let newly_observed = roots.insert(block_root);
        Ok(!newly_observed || roots.len() > 1)
    }

    /// Has any block for `(slot, proposer_index)` been seen?
    pub fn proposer_has_been_observed(
        &self,
        slot: Slot,
        proposer_index: u64,
    ) -> Result<bool, Error> {
        self.sanitize_slot(slot)?;
        Ok(self.items.contains_key(&ProposalKey {
            slot,
            proposer_index,
        }))
    }

    /// Has a block *other than* `block_root` been seen for the pair? This
    /// is the equivocation question; an identical repeat is not one.
    pub fn proposer_has_equivocated(
        &self,
        slot: Slot,
        proposer_index: u64,
        block_root: Hash256,
    ) -> bool {
        self.items
            .get(&ProposalKey {
                slot,
                proposer_index,
            })
            .is_some_and(|roots| roots.iter().any(|root| *root != block_root))
    }

    pub fn register_verified_proposer_signature(&mut self, block_root: Hash256) {
        self.verified_proposer_signatures.put(block_root, ());
    }

    pub fn proposer_signature_has_been_verified(&mut self, block_root: Hash256) -> bool {
        self.verified_proposer_signatures.get(&block_root).is_some()
    }

    fn sanitize_slot(&self, slot: Slot) -> Result<(), Error> {
        if slot <= self.finalized_slot && self.finalized_slot > Slot::new(0) {
            Err(Error::FinalizedBlock {
                slot,
                finalized_slot: self.finalized_slot,
            })
        } else {
            Ok(())
        }
    }

    /// Remove all entries at or before the finalized slot.
    pub fn prune(&mut self, finalized_slot: Slot) {
        if finalized_slot <= self.finalized_slot {
            return;
        }
        self.finalized_slot = finalized_slot;
        self.items.retain(|key, _| key.slot > finalized_slot);
    }
}
