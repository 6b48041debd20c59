use crate::ForkChoiceStore;
use proto_array::{
    Block as ProtoBlock, ExecutionStatus, InvalidationOperation, ProtoArrayForkChoice, ProtoNode,
    calculate_committee_fraction,
};
use std::marker::PhantomData;
use std::time::Duration;
use tracing::debug;
use types::{BeaconBlockRef, BeaconState, ChainSpec, Checkpoint, Epoch, EthSpec, Hash256, Slot};

#[derive(Debug)]
pub enum Error<T> {
    InvalidAttestation(InvalidAttestation),
    InvalidBlock(InvalidBlock),
    ProtoArrayError(proto_array::Error),
    MissingProtoArrayBlock(Hash256),
    InconsistentOnTick { previous_slot: Slot, time: Slot },
    ForkChoiceStoreError(T),
    UnableToSetJustifiedCheckpoint(T),
    AfterBlockFailed(T),
}

impl<T> From<InvalidAttestation> for Error<T> {
    fn from(e: InvalidAttestation) -> Self {
        Error::InvalidAttestation(e)
    }
}

impl<T> From<proto_array::Error> for Error<T> {
    fn from(e: proto_array::Error) -> Self {
        Error::ProtoArrayError(e)
    }
}

#[derive(Debug)]
pub enum InvalidBlock {
    UnknownParent(Hash256),
    FutureSlot {
        current_slot: Slot,
        block_slot: Slot,
    },
    FinalizedSlot {
        finalized_slot: Slot,
        block_slot: Slot,
    },
    NotFinalizedDescendant {
        finalized_root: Hash256,
        block_ancestor: Option<Hash256>,
    },
}

#[derive(Debug, PartialEq)]
pub enum InvalidAttestation {
    /// The attestation's aggregation bits were empty when they shouldn't be.
    EmptyAggregationBitfield,
    /// The `attestation.data.beacon_block_root` block is unknown.
    UnknownHeadBlock { beacon_block_root: Hash256 },
    /// The `attestation.data.slot` is not from the same epoch as `data.target.epoch`.
    BadTargetEpoch { target: Epoch, slot: Slot },
    /// The target is from a future epoch.
    FutureEpoch {
        attestation_epoch: Epoch,
        current_epoch: Epoch,
    },
    /// The target is from before the previous epoch.
    PastEpoch {
        attestation_epoch: Epoch,
        current_epoch: Epoch,
    },
    /// The attestation references a block later than itself.
    AttestsToFutureBlock { block: Slot, attestation: Slot },
}

/// Whether the execution layer has vouched for the block's payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PayloadVerificationStatus {
    /// An EL has declared the execution payload valid.
    Verified,
    /// An EL has not yet made a determination (it may be syncing).
    Optimistic,
    /// The block is either pre-merge or has no payload to verify.
    Irrelevant,
}

impl PayloadVerificationStatus {
    pub fn is_optimistic(&self) -> bool {
        matches!(self, PayloadVerificationStatus::Optimistic)
    }
}

/// Whether the block's data-availability requirement was satisfied and how.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DataAvailabilityStatus {
    /// Pre-Deneb: nothing to check.
    PreData,
    /// Blobs or custody columns observed and verified.
    Available,
}

/// Values cached from the last head computation for the next
/// `forkchoiceUpdated` call to the execution layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForkchoiceUpdateParameters {
    pub head_root: Hash256,
    pub head_hash: Option<types::ExecutionBlockHash>,
    pub justified_hash: Option<types::ExecutionBlockHash>,
    pub finalized_hash: Option<types::ExecutionBlockHash>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForkChoiceView {
    pub head_block_root: Hash256,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}

/// An attestation seen at or ahead of its application slot, parked until
/// the clock catches up.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedAttestation {
    pub slot: Slot,
    pub attesting_indices: Vec<u64>,
    pub block_root: Hash256,
    pub target_epoch: Epoch,
}

pub struct ForkChoice<T, E> {
    /// The underlying representation of the Store from the specification.
    fc_store: T,
    /// The arena of blocks, weights and head links.
    proto_array: ProtoArrayForkChoice,
    /// Attestations that arrived at or ahead of their slot.
    queued_attestations: Vec<QueuedAttestation>,
    /// Cached after every `get_head` call.
    forkchoice_update_parameters: ForkchoiceUpdateParameters,
    _phantom: PhantomData<E>,
}

impl<T, E> ForkChoice<T, E>
where
    T: ForkChoiceStore,
    E: EthSpec,
{
    /// Instantiate from the anchor (genesis or checkpoint-sync) block.
    pub fn from_anchor(
        fc_store: T,
        anchor_block_root: Hash256,
        anchor_block_slot: Slot,
        anchor_state_root: Hash256,
        execution_status: ExecutionStatus,
    ) -> Result<Self, Error<T::Error>> {
        let justified_checkpoint = *fc_store.justified_checkpoint();
        let finalized_checkpoint = *fc_store.finalized_checkpoint();

        let proto_array = ProtoArrayForkChoice::new::<E>(
            anchor_block_slot,
            anchor_block_root,
            anchor_state_root,
            justified_checkpoint,
            finalized_checkpoint,
            execution_status,
        )?;

        Ok(Self {
            fc_store,
            proto_array,
            queued_attestations: Vec::new(),
            forkchoice_update_parameters: ForkchoiceUpdateParameters {
                head_root: anchor_block_root,
                head_hash: None,
                justified_hash: None,
                finalized_hash: None,
            },
            _phantom: PhantomData,
        })
    }

    /// Advance the store clock, applying any attestation whose slot arrived.
    pub fn update_time(&mut self, current_slot: Slot) -> Result<Slot, Error<T::Error>> {
        while self.fc_store.get_current_slot() < current_slot {
            let previous_slot = self.fc_store.get_current_slot();
            self.on_tick(previous_slot + 1)?;
        }
        Ok(self.fc_store.get_current_slot())
    }

    fn on_tick(&mut self, time: Slot) -> Result<(), Error<T::Error>> {
        let previous_slot = self.fc_store.get_current_slot();
        if time > previous_slot + 1 {
            return Err(Error::InconsistentOnTick {
                previous_slot,
                time,
            });
        }

        self.fc_store.set_current_slot(time);

        // The proposer boost only lasts for the slot in which it was set.
        self.fc_store.set_proposer_boost_root(Hash256::default());

        self.process_attestation_queue()?;
        Ok(())
    }

    fn process_attestation_queue(&mut self) -> Result<(), Error<T::Error>> {
        let current_slot = self.fc_store.get_current_slot();
        let mut remaining = Vec::new();
        for attestation in std::mem::take(&mut self.queued_attestations) {
            if attestation.slot < current_slot {
                for validator_index in &attestation.attesting_indices {
                    self.proto_array.process_attestation(
                        *validator_index as usize,
                        attestation.block_root,
                        attestation.target_epoch,
                    )?;
                }
            } else {
                remaining.push(attestation);
            }
        }
        self.queued_attestations = remaining;
        Ok(())
    }

    /// Run the fork choice rule to determine the head.
    pub fn get_head(
        &mut self,
        system_time_current_slot: Slot,
        spec: &ChainSpec,
    ) -> Result<Hash256, Error<T::Error>> {
        let current_slot = self.update_time(system_time_current_slot)?;

        let store = &self.fc_store;
        let head_root = self.proto_array.find_head::<E>(
            *store.justified_checkpoint(),
            *store.finalized_checkpoint(),
            store.justified_balances(),
            store.proposer_boost_root(),
            store.equivocating_indices(),
            current_slot,
            spec.proposer_score_boost,
        )?;

        // Cache some values for the next forkchoiceUpdate call to the
        // execution layer.
        let block_hash_of = |root: &Hash256| {
            self.proto_array
                .get_block(root)
                .and_then(|block| block.execution_status.block_hash())
        };
        self.forkchoice_update_parameters = ForkchoiceUpdateParameters {
            head_root,
            head_hash: block_hash_of(&head_root),
            justified_hash: block_hash_of(&self.fc_store.justified_checkpoint().root),
            finalized_hash: block_hash_of(&self.fc_store.finalized_checkpoint().root),
        };

        Ok(head_root)
    }

    /// Add `block` to the fork choice DAG.
    ///
    /// The supplied block **must** already have passed the state-transition
    /// function; it is not re-run here.
    #[allow(clippy::too_many_arguments)]
    pub fn on_block(
        &mut self,
        system_time_current_slot: Slot,
        block: BeaconBlockRef<'_, E>,
        block_root: Hash256,
        block_delay: Duration,
        state: &BeaconState<E>,
        payload_verification_status: PayloadVerificationStatus,
        data_availability_status: DataAvailabilityStatus,
        spec: &ChainSpec,
    ) -> Result<(), Error<T::Error>> {
        // If this block has already been processed we do not reprocess it:
        // doing so could mutate the proposer boost or checkpoints.
        if self.proto_array.contains_block(&block_root) {
            return Ok(());
        }

        let current_slot = self.update_time(system_time_current_slot)?;

        let block_slot = block.slot();
        if block_slot > current_slot {
            return Err(Error::InvalidBlock(InvalidBlock::FutureSlot {
                current_slot,
                block_slot,
            }));
        }

        let finalized_slot = self
            .fc_store
            .finalized_checkpoint()
            .epoch
            .start_slot(E::slots_per_epoch());
        if block_slot <= finalized_slot {
            return Err(Error::InvalidBlock(InvalidBlock::FinalizedSlot {
                finalized_slot,
                block_slot,
            }));
        }

        let parent_root = block.parent_root();
        if !self.proto_array.contains_block(&parent_root) {
            return Err(Error::InvalidBlock(InvalidBlock::UnknownParent(parent_root)));
        }

        // The block must descend from the finalized block.
        let finalized_root = self.fc_store.finalized_checkpoint().root;
        if finalized_slot > Slot::new(0)
            && !self.proto_array.is_descendant(finalized_root, parent_root)
        {
            return Err(Error::InvalidBlock(InvalidBlock::NotFinalizedDescendant {
                finalized_root,
                block_ancestor: self
                    .proto_array
                    .ancestor_at_slot(parent_root, finalized_slot),
            }));
        }

        // Update justified/finalized checkpoints from the block's post-state.
        if state.current_justified_checkpoint.epoch > self.fc_store.justified_checkpoint().epoch {
            self.fc_store
                .set_justified_checkpoint(state.current_justified_checkpoint)
                .map_err(Error::UnableToSetJustifiedCheckpoint)?;
        }
        if state.finalized_checkpoint.epoch > self.fc_store.finalized_checkpoint().epoch {
            self.fc_store
                .set_finalized_checkpoint(state.finalized_checkpoint);
            self.proto_array.maybe_prune(state.finalized_checkpoint.root)?;
        }

        // Timely blocks for the current slot earn the proposer boost.
        let is_before_attesting_interval =
            block_delay < Duration::from_secs(spec.seconds_per_slot / spec.intervals_per_slot);
        if current_slot == block_slot && is_before_attesting_interval {
            self.fc_store.set_proposer_boost_root(block_root);
        }

        let target_slot = block_slot
            .epoch(E::slots_per_epoch())
            .start_slot(E::slots_per_epoch());
        let target_root = if block_slot == target_slot {
            block_root
        } else {
            self.proto_array
                .ancestor_at_slot(parent_root, target_slot)
                .unwrap_or(parent_root)
        };

        let block_hash = block.body().execution_payload().block_hash;
        let execution_status = match payload_verification_status {
            PayloadVerificationStatus::Verified => ExecutionStatus::Valid(block_hash),
            PayloadVerificationStatus::Optimistic => ExecutionStatus::Optimistic(block_hash),
            PayloadVerificationStatus::Irrelevant => ExecutionStatus::Irrelevant,
        };

        self.proto_array.process_block::<E>(ProtoBlock {
            slot: block_slot,
            root: block_root,
            parent_root: Some(parent_root),
            state_root: block.state_root(),
            target_root,
            justified_checkpoint: state.current_justified_checkpoint,
            finalized_checkpoint: state.finalized_checkpoint,
            proposer_index: block.proposer_index(),
            execution_status,
            data_available: matches!(
                data_availability_status,
                DataAvailabilityStatus::Available | DataAvailabilityStatus::PreData
            ),
        })?;

        debug!(
            slot = %block_slot,
            root = ?block_root,
            delay = ?block_delay,
            ?payload_verification_status,
            "Block added to fork choice"
        );

        self.fc_store
            .after_block(block_root)
            .map_err(Error::AfterBlockFailed)?;

        Ok(())
    }

    /// Register an attestation with the fork choice.
    ///
    /// Attestations for the current slot are queued and applied at the start
    /// of the next slot; attestations unpacked from blocks apply at once.
    pub fn on_attestation(
        &mut self,
        system_time_current_slot: Slot,
        attestation: &types::IndexedAttestation<E>,
        is_from_block: bool,
    ) -> Result<(), Error<T::Error>> {
        let current_slot = self.update_time(system_time_current_slot)?;

        if attestation.attesting_indices.is_empty() {
            return Err(InvalidAttestation::EmptyAggregationBitfield.into());
        }

        let target = attestation.data.target;
        let current_epoch = current_slot.epoch(E::slots_per_epoch());

        if target.epoch > current_epoch {
            return Err(InvalidAttestation::FutureEpoch {
                attestation_epoch: target.epoch,
                current_epoch,
            }
            .into());
        }
        if target.epoch + 1 < current_epoch {
            return Err(InvalidAttestation::PastEpoch {
                attestation_epoch: target.epoch,
                current_epoch,
            }
            .into());
        }
        if target.epoch != attestation.data.slot.epoch(E::slots_per_epoch()) {
            return Err(InvalidAttestation::BadTargetEpoch {
                target: target.epoch,
                slot: attestation.data.slot,
            }
            .into());
        }

        let block = self
            .proto_array
            .get_block(&attestation.data.beacon_block_root)
            .ok_or(InvalidAttestation::UnknownHeadBlock {
                beacon_block_root: attestation.data.beacon_block_root,
            })?;
        if block.slot > attestation.data.slot {
            return Err(InvalidAttestation::AttestsToFutureBlock {
                block: block.slot,
                attestation: attestation.data.slot,
            }
            .into());
        }

        if !is_from_block && attestation.data.slot >= current_slot {
            self.queued_attestations.push(QueuedAttestation {
                slot: attestation.data.slot,
                attesting_indices: attestation.attesting_indices.to_vec(),
                block_root: attestation.data.beacon_block_root,
                target_epoch: target.epoch,
            });
        } else {
            for validator_index in attestation.attesting_indices.iter() {
                self.proto_array.process_attestation(
                    *validator_index as usize,
                    attestation.data.beacon_block_root,
                    target.epoch,
                )?;
            }
        }

        Ok(())
    }

    /// Mark the validators in a slashing as equivocating: their weight is
    /// removed and their future votes ignored.
    pub fn on_attester_slashing(&mut self, slashing: &types::AttesterSlashing<E>) {
        let first = &slashing.attestation_1;
        let second = &slashing.attestation_2;
        if !first.is_double_vote(second) && !first.is_surround_vote(second) {
            return;
        }
        self.fc_store
            .extend_equivocating_indices(slashing.intersecting_indices());
    }

    /// Ask whether the next `forkchoiceUpdated` should be suppressed because
    /// the freshly imported head is weak and likely to be reorged by our own
    /// next-slot proposal.
    ///
    /// Conditions (all must hold):
    /// - the head is the block of the current or previous slot;
    /// - the head is a single-slot child of its parent;
    /// - finalization is recent;
    /// - the head's own attestation weight (sans boost) is below the re-org
    ///   threshold fraction of one committee.
    pub fn should_override_forkchoice_update(
        &self,
        current_slot: Slot,
        spec: &ChainSpec,
    ) -> Result<bool, Error<T::Error>> {
        let head_root = self.forkchoice_update_parameters.head_root;
        let head = self
            .proto_array
            .get_block(&head_root)
            .ok_or(Error::MissingProtoArrayBlock(head_root))?;

        let head_is_fresh = head.slot == current_slot || head.slot + 1 == current_slot;
        if !head_is_fresh {
            return Ok(false);
        }

        let single_slot_reorg = self
            .proto_array
            .get_parent(&head_root)
            .map(|parent| parent.slot + 1 == head.slot)
            .unwrap_or(false);
        if !single_slot_reorg {
            return Ok(false);
        }

        let current_epoch = current_slot.epoch(E::slots_per_epoch());
        let epochs_since_finalization =
            current_epoch.saturating_sub(self.fc_store.finalized_checkpoint().epoch);
        if epochs_since_finalization > spec.reorg_max_epochs_since_finalization {
            return Ok(false);
        }

        // The head's own weight, excluding any proposer boost it carries.
        let head_weight = self
            .proto_array
            .get_weight(&head_root)
            .ok_or(Error::MissingProtoArrayBlock(head_root))?;
        let boost = if self.fc_store.proposer_boost_root() == head_root {
            calculate_committee_fraction::<E>(
                self.fc_store.justified_balances(),
                spec.proposer_score_boost,
            )
        } else {
            0
        };
        let unboosted_weight = head_weight.saturating_sub(boost);

        let weak_threshold = calculate_committee_fraction::<E>(
            self.fc_store.justified_balances(),
            spec.reorg_head_weight_threshold,
        );

        Ok(unboosted_weight < weak_threshold)
    }

    /// See `ProtoArrayForkChoice::process_execution_payload_validation`.
    pub fn on_valid_execution_payload(
        &mut self,
        block_root: Hash256,
    ) -> Result<(), Error<T::Error>> {
        self.proto_array
            .process_execution_payload_validation(block_root)
            .map_err(Into::into)
    }

    /// See `ProtoArrayForkChoice::process_execution_payload_invalidation`.
    pub fn on_invalid_execution_payload(
        &mut self,
        op: &InvalidationOperation,
    ) -> Result<(), Error<T::Error>> {
        self.proto_array
            .process_execution_payload_invalidation(op)
            .map_err(Into::into)
    }

    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.proto_array.contains_block(block_root)
    }

    pub fn get_block(&self, block_root: &Hash256) -> Option<ProtoNode> {
        self.proto_array.get_block(block_root).cloned()
    }

    pub fn is_optimistic_block(&self, block_root: &Hash256) -> Option<bool> {
        self.proto_array
            .get_block(block_root)
            .map(|block| block.execution_status.is_strictly_optimistic())
    }

    /// The LCA of two heads and the reorg depth in slots from `old_root`.
    pub fn common_ancestor(&self, old_root: Hash256, new_root: Hash256) -> Option<(Hash256, u64)> {
        self.proto_array.common_ancestor(old_root, new_root)
    }

    /// The duty shuffling decision root of `epoch` on the chain of `root`.
    pub fn get_dependent_root(&self, root: Hash256, epoch: Epoch) -> Option<Hash256> {
        self.proto_array.dependent_root::<E>(root, epoch)
    }

    pub fn justified_checkpoint(&self) -> Checkpoint {
        *self.fc_store.justified_checkpoint()
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        *self.fc_store.finalized_checkpoint()
    }

    pub fn forkchoice_update_parameters(&self) -> ForkchoiceUpdateParameters {
        self.forkchoice_update_parameters
    }

    pub fn cached_fork_choice_view(&self) -> ForkChoiceView {
        ForkChoiceView {
            head_block_root: self.forkchoice_update_parameters.head_root,
            justified_checkpoint: self.justified_checkpoint(),
            finalized_checkpoint: self.finalized_checkpoint(),
        }
    }

    pub fn fc_store(&self) -> &T {
        &self.fc_store
    }

    pub fn queued_attestations(&self) -> &[QueuedAttestation] {
        &self.queued_attestations
    }

    pub fn proto_array(&self) -> &ProtoArrayForkChoice {
        &self.proto_array
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fork_choice_store::ForkChoiceStore;
    use proto_array::JustifiedBalances;
    use std::collections::BTreeSet;
    use types::{
        BeaconBlock, FixedBytesExtended, ForkName, MainnetEthSpec, SignedBeaconBlock, Validator,
    };

    type E = MainnetEthSpec;

    #[derive(Debug, Default)]
    struct TestStore {
        current_slot: Slot,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
        justified_balances: JustifiedBalances,
        proposer_boost_root: Hash256,
        equivocating_indices: BTreeSet<u64>,
    }

    impl ForkChoiceStore for TestStore {
        type Error = String;

        fn get_current_slot(&self) -> Slot {
            self.current_slot
        }

        fn set_current_slot(&mut self, slot: Slot) {
            self.current_slot = slot;
        }

        fn after_block(&mut self, _block_root: Hash256) -> Result<(), String> {
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

        fn set_justified_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<(), String> {
            self.justified_checkpoint = checkpoint;
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

    fn genesis_root() -> Hash256 {
        Hash256::from_low_u64_be(0xdead)
    }

    fn new_fork_choice(validators: usize) -> ForkChoice<TestStore, E> {
        let store = TestStore {
            justified_balances: JustifiedBalances::from_effective_balances(vec![
                32_000_000_000;
                validators
            ]),
            ..TestStore::default()
        };
        ForkChoice::from_anchor(
            store,
            genesis_root(),
            Slot::new(0),
            Hash256::default(),
            ExecutionStatus::Irrelevant,
        )
        .unwrap()
    }

    fn state() -> BeaconState<E> {
        let validators = (0..32)
            .map(|_| Validator::new(bls::PublicKeyBytes::empty(), 32_000_000_000))
            .collect();
        BeaconState::new(Hash256::default(), validators)
    }

    fn block_at(slot: u64, parent_root: Hash256) -> (SignedBeaconBlock<E>, Hash256) {
        let mut block = BeaconBlock::<E>::empty(ForkName::Deneb, Slot::new(slot));
        if let BeaconBlock::Deneb(ref mut inner) = block {
            inner.parent_root = parent_root;
        }
        let root = block.canonical_root();
        (
            SignedBeaconBlock::from_block(block, bls::SignatureBytes::empty()),
            root,
        )
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut fc = new_fork_choice(32);
        let (block, root) = block_at(1, Hash256::from_low_u64_be(999));
        let err = fc
            .on_block(
                Slot::new(1),
                block.message(),
                root,
                Duration::from_secs(0),
                &state(),
                PayloadVerificationStatus::Irrelevant,
                DataAvailabilityStatus::PreData,
                &ChainSpec::genesis_spec(ForkName::Deneb),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidBlock(InvalidBlock::UnknownParent(_))
        ));
    }

    #[test]
    fn duplicate_on_block_is_a_no_op() {
        let spec = ChainSpec::genesis_spec(ForkName::Deneb);
        let mut fc = new_fork_choice(32);
        let (block, root) = block_at(1, genesis_root());

        for _ in 0..2 {
            fc.on_block(
                Slot::new(1),
                block.message(),
                root,
                Duration::from_secs(0),
                &state(),
                PayloadVerificationStatus::Irrelevant,
                DataAvailabilityStatus::PreData,
                &spec,
            )
            .unwrap();
        }
        assert_eq!(fc.proto_array().len(), 2);
    }

    #[test]
    fn timely_block_earns_proposer_boost_and_expires() {
        let spec = ChainSpec::genesis_spec(ForkName::Deneb);
        let mut fc = new_fork_choice(32);
        let (block, root) = block_at(1, genesis_root());

        fc.on_block(
            Slot::new(1),
            block.message(),
            root,
            Duration::from_secs(1),
            &state(),
            PayloadVerificationStatus::Irrelevant,
            DataAvailabilityStatus::PreData,
            &spec,
        )
        .unwrap();
        assert_eq!(fc.fc_store().proposer_boost_root(), root);

        // The boost expires on the next tick.
        fc.update_time(Slot::new(2)).unwrap();
        assert_eq!(fc.fc_store().proposer_boost_root(), Hash256::default());
    }

    #[test]
    fn weak_fresh_head_triggers_fcu_override() {
        let spec = ChainSpec::genesis_spec(ForkName::Deneb);
        let mut fc = new_fork_choice(32);
        let (block, root) = block_at(1, genesis_root());

        fc.on_block(
            Slot::new(1),
            block.message(),
            root,
            Duration::from_secs(1),
            &state(),
            PayloadVerificationStatus::Irrelevant,
            DataAvailabilityStatus::PreData,
            &spec,
        )
        .unwrap();
        fc.get_head(Slot::new(1), &spec).unwrap();

        // The head has zero attestation weight beyond its boost: weak.
        assert!(fc.should_override_forkchoice_update(Slot::new(1), &spec).unwrap());
    }

    #[test]
    fn attested_head_is_not_overridden() {
        let spec = ChainSpec::genesis_spec(ForkName::Deneb);
        let mut fc = new_fork_choice(32);
        let (block, root) = block_at(1, genesis_root());

        fc.on_block(
            Slot::new(1),
            block.message(),
            root,
            Duration::from_secs(1),
            &state(),
            PayloadVerificationStatus::Irrelevant,
            DataAvailabilityStatus::PreData,
            &spec,
        )
        .unwrap();

        // Half the validators attest to the head in-block (applied at once).
        let attestation = types::IndexedAttestation::<E> {
            attesting_indices: ssz_types::VariableList::new((0u64..16).collect()).unwrap(),
            data: types::AttestationData {
                slot: Slot::new(1),
                index: 0,
                beacon_block_root: root,
                source: Checkpoint::default(),
                target: Checkpoint {
                    epoch: Epoch::new(0),
                    root,
                },
            },
            signature: bls::AggregateSignature::empty(),
        };
        fc.on_attestation(Slot::new(1), &attestation, true).unwrap();
        fc.get_head(Slot::new(1), &spec).unwrap();

        assert!(!fc.should_override_forkchoice_update(Slot::new(1), &spec).unwrap());
    }

    #[test]
    fn gossip_attestations_queue_until_next_slot() {
        let spec = ChainSpec::genesis_spec(ForkName::Deneb);
        let mut fc = new_fork_choice(32);
        let (block, root) = block_at(1, genesis_root());
        fc.on_block(
            Slot::new(1),
            block.message(),
            root,
            Duration::from_secs(0),
            &state(),
            PayloadVerificationStatus::Irrelevant,
            DataAvailabilityStatus::PreData,
            &spec,
        )
        .unwrap();

        let attestation = types::IndexedAttestation::<E> {
            attesting_indices: ssz_types::VariableList::new(vec![3u64]).unwrap(),
            data: types::AttestationData {
                slot: Slot::new(1),
                index: 0,
                beacon_block_root: root,
                source: Checkpoint::default(),
                target: Checkpoint {
                    epoch: Epoch::new(0),
                    root,
                },
            },
            signature: bls::AggregateSignature::empty(),
        };
        fc.on_attestation(Slot::new(1), &attestation, false).unwrap();
        assert_eq!(fc.queued_attestations().len(), 1);

        fc.get_head(Slot::new(2), &spec).unwrap();
        assert!(fc.queued_attestations().is_empty());
        assert!(fc.proto_array().get_weight(&root).unwrap() > 0);
    }
}
