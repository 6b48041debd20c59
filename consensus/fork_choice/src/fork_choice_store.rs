use proto_array::JustifiedBalances;
use std::collections::BTreeSet;
use types::{Checkpoint, Hash256, Slot};

/// Approximates the `Store` in the fork-choice specification.
///
/// The store is not exposed to mutation by the `ForkChoice` consumer;
/// `ForkChoice` drives every write through this trait between its
/// suspension-free critical sections.
pub trait ForkChoiceStore {
    type Error: std::fmt::Debug;

    /// The last slot provided via `set_current_slot`. Must never decrease.
    fn get_current_slot(&self) -> Slot;

    /// Called by `ForkChoice` on each time update; implementations must keep
    /// the slot monotone.
    fn set_current_slot(&mut self, slot: Slot);

    /// Invoked whenever `on_block` completes, so persistent stores can
    /// checkpoint themselves.
    fn after_block(&mut self, block_root: Hash256) -> Result<(), Self::Error>;

    fn justified_checkpoint(&self) -> &Checkpoint;

    fn justified_balances(&self) -> &JustifiedBalances;

    fn finalized_checkpoint(&self) -> &Checkpoint;

    fn set_finalized_checkpoint(&mut self, checkpoint: Checkpoint);

    /// Implementations refresh `justified_balances` from the corresponding
    /// state when the checkpoint advances.
    fn set_justified_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<(), Self::Error>;

    fn proposer_boost_root(&self) -> Hash256;

    fn set_proposer_boost_root(&mut self, proposer_boost_root: Hash256);

    fn equivocating_indices(&self) -> &BTreeSet<u64>;

    fn extend_equivocating_indices(&mut self, indices: impl IntoIterator<Item = u64>);
}
