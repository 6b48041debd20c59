//! The concrete `ForkChoiceStore`, wired to the state cache so justified
//! balances refresh when the justified checkpoint advances.

use crate::state_cache::StateCache;
use fork_choice::ForkChoiceStore;
use proto_array::JustifiedBalances;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use types::{Checkpoint, EthSpec, Hash256, Slot};

#[derive(Debug)]
pub enum Error {
    UnknownJustifiedState(Hash256),
}

pub struct BeaconForkChoiceStore<E: EthSpec> {
    current_slot: Slot,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    justified_balances: JustifiedBalances,
    proposer_boost_root: Hash256,
    equivocating_indices: BTreeSet<u64>,
    state_cache: Arc<StateCache<E>>,
}

impl<E: EthSpec> BeaconForkChoiceStore<E> {
    pub fn new(
        anchor_checkpoint: Checkpoint,
        justified_balances: JustifiedBalances,
        state_cache: Arc<StateCache<E>>,
    ) -> Self {
        Self {
            current_slot: anchor_checkpoint.epoch.start_slot(E::slots_per_epoch()),
            justified_checkpoint: anchor_checkpoint,
            finalized_checkpoint: anchor_checkpoint,
            justified_balances,
            proposer_boost_root: Hash256::ZERO,
            equivocating_indices: BTreeSet::new(),
            state_cache,
        }
    }
}

impl<E: EthSpec> ForkChoiceStore for BeaconForkChoiceStore<E> {
    type Error = Error;

    fn get_current_slot(&self) -> Slot {
        self.current_slot
    }

    fn set_current_slot(&mut self, slot: Slot) {
        // Monotone by construction: `ForkChoice::on_tick` only moves forward.
        if slot > self.current_slot {
            self.current_slot = slot;
        }
    }

    fn after_block(&mut self, _block_root: Hash256) -> Result<(), Error> {
        Ok(())
    }

    fn justified_checkpoint(&self) -> &Checkpoint {
        &self.justified_checkpoint
    }

    fn justified_balances(&self) -> &JustifiedBalances {
        &self.justified_balances
    }

    fn finalized_checkpoint(&self) -> &Checkpoint {
        &self.finalized_checkpoint
    }

    fn set_finalized_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.finalized_checkpoint = checkpoint;
    }

    fn set_justified_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<(), Error> {
        self.justified_checkpoint = checkpoint;

        // Balances come from the justified state when we still hold it; a
        // cache miss keeps the previous balances rather than halting import.
        if let Some(state) = self.state_cache.get(&checkpoint.root) {
            self.justified_balances =
                JustifiedBalances::from_effective_balances(state.justified_balances());
        } else {
            debug!(
                root = ?checkpoint.root,
                "Justified state not cached; keeping previous balances"
            );
        }
        Ok(())
    }

    fn proposer_boost_root(&self) -> Hash256 {
        self.proposer_boost_root
    }

    fn set_proposer_boost_root(&mut self, proposer_boost_root: Hash256) {
        self.proposer_boost_root = proposer_boost_root;
    }

    fn equivocating_indices(&self) -> &BTreeSet<u64> {
        &self.equivocating_indices
    }

    fn extend_equivocating_indices(&mut self, indices: impl IntoIterator<Item = u64>) {
        self.equivocating_indices.extend(indices);
    }
}
