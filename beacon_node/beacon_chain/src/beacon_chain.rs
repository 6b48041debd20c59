//! The `BeaconChain` struct: the top-level object wiring the seen-caches,
//! the assembler, the verify pipeline, fork choice, storage, the execution
//! layer and the event bus together.
//!
//! Import/commit is serial over blocks: fork-choice mutation happens under
//! a single write lock, and suspension points (EL round-trips, DB writes)
//! sit outside it.

use crate::attestation_verification::{self, AttestationError, VerifiedAggregate};
use crate::blob_verification::{self, GossipBlobError, GossipVerifiedBlob};
use crate::block_input::AvailableData;
use crate::block_verification::{
    self, BlockError, ChainSegmentOptions, ExecutedBlock, GossipVerifiedBlock,
};
use crate::canonical_head::CanonicalHead;
use crate::chain_config::ChainConfig;
use crate::custody_context::CustodyContext;
use crate::data_availability_checker::{Availability, AvailableBlock, DataAvailabilityChecker};
use crate::data_column_verification::{self, GossipDataColumnError, GossipVerifiedDataColumn};
use crate::errors::BeaconChainError;
use crate::events::{
    EventKind, ServerSentEventHandler, SseBlobSidecar, SseBlock, SseDataColumnSidecar,
    SseFinalizedCheckpoint,
};
use crate::observed_attestations::ObservedAggregates;
use crate::observed_block_producers::ObservedBlockProducers;
use crate::observed_data_sidecars::ObservedDataSidecars;
use crate::observed_execution_bids::ObservedExecutionBids;
use crate::state_cache::StateCache;
use crate::state_transition::StateTransition;
use bls::BlsVerifier;
use execution_layer::{EngineApi, ExecutionLayer};
use fork_choice::{DataAvailabilityStatus, InvalidAttestation};
use kzg::Kzg;
use parking_lot::RwLock;
use proto_array::ProtoNode;
use slot_clock::SlotClock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use store::{BlockStore, KeyValueStore};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use types::{
    Attestation, BeaconState, ChainSpec, Checkpoint, EthSpec, Hash256, SignedBeaconBlock, Slot,
};

/// A message for the sync subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotification {
    /// A valid-looking object references a parent we do not have.
    UnknownBlockParent {
        block_root: Hash256,
        parent_root: Hash256,
    },
}

pub trait BeaconChainTypes: Send + Sync + 'static {
    type EthSpec: EthSpec;
    type SlotClock: SlotClock + 'static;
    type KvStore: KeyValueStore;
    type Engine: EngineApi;
}

/// Options controlling a single block-processing call.
#[derive(Debug, Clone, Copy)]
pub struct BlockProcessingOptions {
    /// Verify but do not commit.
    pub verify_only: bool,
    pub skip_verify_block_signatures: bool,
    pub skip_verify_execution_payload: bool,
    /// Downgrade duplicate imports to success.
    pub ignore_if_known: bool,
    /// Persist the block before fork-choice attachment. Losing a
    /// fork-choice head is fatal; wasting disk on an unknown block is not.
    /// Publish paths relax this: the block is already on gossip.
    pub eager_persist_block: bool,
}

impl Default for BlockProcessingOptions {
    fn default() -> Self {
        Self {
            verify_only: false,
            skip_verify_block_signatures: false,
            skip_verify_execution_payload: false,
            ignore_if_known: false,
            eager_persist_block: true,
        }
    }
}

impl BlockProcessingOptions {
    fn segment_options(&self) -> ChainSegmentOptions {
        ChainSegmentOptions {
            verify_only: self.verify_only,
            skip_verify_block_signatures: self.skip_verify_block_signatures,
            skip_verify_execution_payload: self.skip_verify_execution_payload,
            ignore_if_known: self.ignore_if_known,
        }
    }
}

pub struct BeaconChain<T: BeaconChainTypes> {
    pub spec: Arc<ChainSpec>,
    pub config: ChainConfig,
    pub slot_clock: T::SlotClock,
    pub store: BlockStore<T::EthSpec, T::KvStore>,
    pub execution_layer: Arc<ExecutionLayer<T::Engine>>,
    pub kzg: Arc<Kzg>,
    pub bls_verifier: Arc<dyn BlsVerifier>,
    pub state_transition: Arc<dyn StateTransition<T::EthSpec>>,
    pub state_cache: Arc<StateCache<T::EthSpec>>,
    pub canonical_head: CanonicalHead<T>,
    pub data_availability_checker: DataAvailabilityChecker<T::EthSpec>,
    pub custody_context: Arc<CustodyContext>,
    pub observed_block_producers: RwLock<ObservedBlockProducers<T::EthSpec>>,
    pub observed_data_sidecars: RwLock<ObservedDataSidecars<T::EthSpec>>,
    pub observed_aggregates: RwLock<ObservedAggregates>,
    pub observed_execution_bids: RwLock<ObservedExecutionBids<T::EthSpec>>,
    pub event_handler: ServerSentEventHandler<T::EthSpec>,
    /// Slots for which a local validator will propose, driving the
    /// proposer-boost re-org override and payload preparation.
    pub local_proposer_slots: RwLock<HashSet<Slot>>,
    /// Outbound notifications to the sync subsystem.
    pub sync_tx: Option<UnboundedSender<SyncNotification>>,
    pub genesis_block_root: Hash256,
}

impl<T: BeaconChainTypes> BeaconChain<T> {
    /*
     * Clock and head accessors.
     */

    pub fn current_slot(&self) -> Result<Slot, BeaconChainError> {
        self.slot_clock
            .now_or_genesis()
            .ok_or(BeaconChainError::UnableToReadSlot)
    }

    pub fn head_block_root(&self) -> Hash256 {
        self.canonical_head.cached_head().head_block_root
    }

    pub fn head_state(&self) -> Result<Arc<BeaconState<T::EthSpec>>, BeaconChainError> {
        let head_root = self.head_block_root();
        self.state_cache
            .get(&head_root)
            .ok_or(BeaconChainError::MissingBeaconState(head_root))
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.canonical_head.fork_choice.read().finalized_checkpoint()
    }

    pub fn justified_checkpoint(&self) -> Checkpoint {
        self.canonical_head.fork_choice.read().justified_checkpoint()
    }

    pub fn knows_block(&self, block_root: &Hash256) -> bool {
        self.canonical_head.fork_choice.read().contains_block(block_root)
    }

    pub fn fork_choice_block(&self, block_root: &Hash256) -> Option<ProtoNode> {
        self.canonical_head.fork_choice.read().get_block(block_root)
    }

    pub fn is_optimistic_block(&self, block_root: &Hash256) -> bool {
        self.canonical_head
            .fork_choice
            .read()
            .is_optimistic_block(block_root)
            .unwrap_or(false)
    }

    /// Register that a local validator proposes at `slot`.
    pub fn register_local_proposer(&self, slot: Slot) {
        self.local_proposer_slots.write().insert(slot);
    }

    pub fn is_local_proposer(&self, slot: Slot) -> bool {
        self.local_proposer_slots.read().contains(&slot)
    }

    pub fn notify_unknown_block_parent(&self, block_root: Hash256, parent_root: Hash256) {
        debug!(?block_root, ?parent_root, "Unknown block parent");
        if let Some(sync_tx) = &self.sync_tx {
            let _ = sync_tx.send(SyncNotification::UnknownBlockParent {
                block_root,
                parent_root,
            });
        }
    }

    /*
     * Gossip entry points: validate, feed the assembler, import when the
     * data-availability check passes.
     */

    pub fn verify_block_for_gossip(
        &self,
        block: Arc<SignedBeaconBlock<T::EthSpec>>,
    ) -> Result<GossipVerifiedBlock<T::EthSpec>, BlockError> {
        block_verification::validate_block_for_gossip(self, block)
    }

    pub fn verify_blob_sidecar_for_gossip(
        &self,
        blob: Arc<types::BlobSidecar<T::EthSpec>>,
        subnet: u64,
    ) -> Result<GossipVerifiedBlob<T::EthSpec>, GossipBlobError> {
        blob_verification::validate_blob_sidecar_for_gossip(self, blob, subnet)
    }

    pub fn verify_data_column_sidecar_for_gossip(
        &self,
        column: Arc<types::DataColumnSidecar<T::EthSpec>>,
        subnet: u64,
    ) -> Result<GossipVerifiedDataColumn<T::EthSpec>, GossipDataColumnError> {
        data_column_verification::validate_data_column_sidecar_for_gossip(self, column, subnet)
    }

    pub fn verify_aggregate_for_gossip(
        &self,
        attestation: Attestation<T::EthSpec>,
    ) -> Result<VerifiedAggregate<T::EthSpec>, AttestationError> {
        attestation_verification::validate_aggregate_for_gossip(self, attestation)
    }

    pub fn verify_execution_bid_for_gossip(
        &self,
        bid: Arc<types::SignedExecutionPayloadBid<T::EthSpec>>,
    ) -> Result<
        crate::execution_bid_verification::VerifiedExecutionBid<T::EthSpec>,
        crate::execution_bid_verification::ExecutionBidError,
    > {
        crate::execution_bid_verification::validate_execution_bid_for_gossip(self, bid)
    }

    /// Feed a gossip-verified block into the assembler; import if complete.
    pub async fn process_gossip_block(
        self: &Arc<Self>,
        block: GossipVerifiedBlock<T::EthSpec>,
    ) -> Result<Availability<T::EthSpec>, BlockError> {
        let availability = self
            .data_availability_checker
            .observe_block(block.block, false)
            .map_err(|e| BlockError::BeaconChainError(Box::new(BeaconChainError::from_da(e))))?;
        self.import_if_available(availability, BlockProcessingOptions::default())
            .await
    }

    /// Feed a gossip-verified blob into the assembler; import if complete.
    pub async fn process_gossip_blob(
        self: &Arc<Self>,
        blob: GossipVerifiedBlob<T::EthSpec>,
    ) -> Result<Availability<T::EthSpec>, BlockError> {
        let availability = self
            .data_availability_checker
            .observe_blob(blob.into_inner(), false)
            .map_err(|e| BlockError::BeaconChainError(Box::new(BeaconChainError::from_da(e))))?;
        self.import_if_available(availability, BlockProcessingOptions::default())
            .await
    }

    /// Feed a gossip-verified column into the assembler; import if complete.
    pub async fn process_gossip_data_column(
        self: &Arc<Self>,
        column: GossipVerifiedDataColumn<T::EthSpec>,
    ) -> Result<Availability<T::EthSpec>, BlockError> {
        let availability = self
            .data_availability_checker
            .observe_column(column.into_inner(), false)
            .map_err(|e| BlockError::BeaconChainError(Box::new(BeaconChainError::from_da(e))))?;
        self.import_if_available(availability, BlockProcessingOptions::default())
            .await
    }

    /// Apply a gossip-verified aggregate to fork choice.
    pub fn apply_verified_aggregate(
        &self,
        verified: VerifiedAggregate<T::EthSpec>,
    ) -> Result<(), BeaconChainError> {
        let current_slot = self.current_slot()?;
        self.canonical_head
            .fork_choice
            .write()
            .on_attestation(current_slot, &verified.indexed, false)
            .map_err(|e| BeaconChainError::ForkChoiceError(format!("{e:?}")))
    }

    async fn import_if_available(
        self: &Arc<Self>,
        availability: Availability<T::EthSpec>,
        opts: BlockProcessingOptions,
    ) -> Result<Availability<T::EthSpec>, BlockError> {
        match availability {
            Availability::MissingComponents(root) => {
                Ok(Availability::MissingComponents(root))
            }
            Availability::Available(available) => {
                self.process_available_block(*available.clone(), opts).await?;
                Ok(Availability::Available(available))
            }
        }
    }

    /*
     * The verify + import path (C5 then C6).
     */

    /// Verify and commit one available block.
    pub async fn process_available_block(
        self: &Arc<Self>,
        available: AvailableBlock<T::EthSpec>,
        opts: BlockProcessingOptions,
    ) -> Result<Hash256, BlockError> {
        let block_root = available.block_root;

        // Idempotence: a repeat import is a no-op and must not duplicate
        // events.
        if self.knows_block(&block_root) {
            return if opts.ignore_if_known {
                Ok(block_root)
            } else {
                Err(BlockError::BlockIsAlreadyKnown(block_root))
            };
        }

        let parent_root = available.block.parent_root();
        let reconstructed = available.reconstructed_columns.clone();
        let executed = match block_verification::verify_blocks_in_epoch(
            self,
            parent_root,
            vec![available],
            opts.segment_options(),
        )
        .await
        {
            Ok(executed) => executed,
            Err(BlockError::ExecutionPayloadInvalid {
                block_root,
                latest_valid_hash,
            }) => {
                // Excise from fork choice (descendants included) and keep
                // the SSZ for forensics.
                self.on_invalid_payload(block_root, latest_valid_hash);
                return Err(BlockError::ExecutionPayloadInvalid {
                    block_root,
                    latest_valid_hash,
                });
            }
            Err(e) => return Err(e),
        };

        if opts.verify_only {
            return Ok(block_root);
        }

        for executed_block in executed {
            self.import_block(executed_block, &opts).await?;
        }

        // Newly reconstructed columns are re-published observations.
        for column in reconstructed {
            self.event_handler
                .register(EventKind::DataColumnSidecar(
                    SseDataColumnSidecar::from_data_column_sidecar(&column),
                ));
        }

        Ok(block_root)
    }

    fn on_invalid_payload(
        &self,
        block_root: Hash256,
        latest_valid_hash: Option<types::ExecutionBlockHash>,
    ) {
        let mut fork_choice = self.canonical_head.fork_choice.write();
        if fork_choice.contains_block(&block_root) {
            let op = fork_choice::InvalidationOperation {
                head_block_root: block_root,
                latest_valid_hash,
            };
            if let Err(e) = fork_choice.on_invalid_execution_payload(&op) {
                warn!(error = ?e, "Failed to invalidate payload in fork choice");
            }
        }
    }

    /// The strict import/commit ordering. Any reordering here risks an
    /// unrecoverable inconsistency between the store and fork choice.
    async fn import_block(
        self: &Arc<Self>,
        executed: ExecutedBlock<T::EthSpec>,
        opts: &BlockProcessingOptions,
    ) -> Result<Hash256, BlockError> {
        let ExecutedBlock {
            block,
            block_root,
            data,
            post_state,
            payload_status,
        } = executed;

        let current_slot = self.current_slot()?;
        let block_delay = self
            .slot_clock
            .now_duration()
            .and_then(|now| self.slot_clock.seconds_from_slot_start(block.slot(), now))
            .unwrap_or_default();

        let old_finalized = self.finalized_checkpoint();

        // [1] Persist to the hot DB. Pre-emptive: an unknown-to-fork-choice
        // persisted block wastes disk, but a lost fork-choice head is fatal.
        if opts.eager_persist_block {
            self.store
                .put_block(&block_root, &block)
                .map_err(BeaconChainError::from)?;
        }
        match &data {
            AvailableData::Blobs(blobs) => {
                self.store
                    .put_blob_sidecars(&block_root, blobs)
                    .map_err(BeaconChainError::from)?;
            }
            AvailableData::DataColumns(columns) => {
                self.store
                    .put_data_column_sidecars(&block_root, columns)
                    .map_err(BeaconChainError::from)?;
            }
            AvailableData::NoData => {}
        }

        let da_status = match &data {
            AvailableData::NoData => DataAvailabilityStatus::PreData,
            _ => DataAvailabilityStatus::Available,
        };

        // [2] Attach to fork choice.
        {
            let mut fork_choice = self.canonical_head.fork_choice.write();
            fork_choice
                .on_block(
                    current_slot,
                    block.message(),
                    block_root,
                    block_delay,
                    &post_state,
                    payload_status,
                    da_status,
                    &self.spec,
                )
                .map_err(|e| {
                    BlockError::BeaconChainError(Box::new(BeaconChainError::ForkChoiceError(
                        format!("{e:?}"),
                    )))
                })?;
        }
        if !opts.eager_persist_block {
            self.store
                .put_block(&block_root, &block)
                .map_err(BeaconChainError::from)?;
        }

        // [3] Publish the post-state so event handlers and sidecar
        // validation can read it.
        let post_state = Arc::new(post_state);
        self.state_cache.insert(block_root, post_state.clone());

        // [4] Absorb attestations; [5] absorb slashings.
        self.absorb_block_operations(&block, &post_state, current_slot);

        // [6..8] Head recompute, events, EL notification.
        crate::canonical_head::recompute_head_and_notify(self, current_slot).await?;

        // [9] Checkpoint and finalization bookkeeping.
        let new_finalized = self.finalized_checkpoint();
        if block.slot() % T::EthSpec::slots_per_epoch() == 0 {
            // First slot of an epoch: pin the checkpoint state.
            self.state_cache.pin(&block_root);
        }
        if new_finalized.epoch > old_finalized.epoch {
            self.prune_for_finalization(new_finalized);
            let is_optimistic = self.is_optimistic_block(&new_finalized.root);
            self.event_handler
                .register(EventKind::FinalizedCheckpoint(SseFinalizedCheckpoint {
                    checkpoint: new_finalized,
                    execution_optimistic: is_optimistic,
                }));
        }

        // [10] Fan out observations, but not during deep sync.
        if current_slot.saturating_sub(block.slot().as_u64())
            < Slot::new(self.spec.recent_block_event_horizon)
        {
            self.fan_out_block_events(&block, block_root, &data);
        }

        debug!(slot = %block.slot(), root = ?block_root, "Block imported");
        Ok(block_root)
    }

    /// Step [4] and [5]: attestation and slashing absorption.
    ///
    /// A block may carry hundreds of attestations; their errors are tallied
    /// per code and summarised in one log line instead of flooding.
    fn absorb_block_operations(
        &self,
        block: &SignedBeaconBlock<T::EthSpec>,
        post_state: &BeaconState<T::EthSpec>,
        current_slot: Slot,
    ) {
        let current_epoch = current_slot.epoch(T::EthSpec::slots_per_epoch());
        let mut invalid_attestations: HashMap<&'static str, usize> = HashMap::new();
        let mut absorbed = 0usize;

        {
            let mut fork_choice = self.canonical_head.fork_choice.write();
            for attestation in block.body().attestations().iter() {
                let target_epoch = attestation.data.target.epoch;
                if target_epoch + 1 < current_epoch || target_epoch > current_epoch {
                    continue;
                }
                let indexed = match post_state.indexed_attestation(attestation) {
                    Ok(indexed) => indexed,
                    Err(_) => {
                        *invalid_attestations.entry("INDEXING_FAILED").or_default() += 1;
                        continue;
                    }
                };
                match fork_choice.on_attestation(current_slot, &indexed, true) {
                    Ok(()) => absorbed += 1,
                    Err(fork_choice::Error::InvalidAttestation(code)) => {
                        *invalid_attestations
                            .entry(invalid_attestation_code(&code))
                            .or_default() += 1;
                    }
                    Err(e) => {
                        *invalid_attestations.entry("INTERNAL").or_default() += 1;
                        debug!(error = ?e, "Attestation absorption error");
                    }
                }

                // Suppress gossip republish of aggregates we now hold.
                self.observed_aggregates.write().observe_root(
                    attestation.data.slot,
                    attestation.tree_hash_root_for_observation(),
                );
            }

            for slashing in block.body().attester_slashings().iter() {
                fork_choice.on_attester_slashing(slashing);
            }
        }

        if !invalid_attestations.is_empty() {
            warn!(
                absorbed,
                errors = ?invalid_attestations,
                "Invalid attestations in block"
            );
        }
    }

    fn prune_for_finalization(&self, finalized: Checkpoint) {
        let finalized_slot = finalized.epoch.start_slot(T::EthSpec::slots_per_epoch());
        self.observed_block_producers.write().prune(finalized_slot);
        self.observed_data_sidecars.write().prune(finalized_slot);
        self.observed_aggregates.write().prune(finalized_slot);
        self.observed_execution_bids.write().prune(finalized_slot);
        // All inputs for slots <= the finalized start slot are dropped along
        // with their parent-chain references.
        self.data_availability_checker.prune_finalized(finalized_slot);
    }

    fn fan_out_block_events(
        &self,
        block: &SignedBeaconBlock<T::EthSpec>,
        block_root: Hash256,
        data: &AvailableData<T::EthSpec>,
    ) {
        let execution_optimistic = self.is_optimistic_block(&block_root);
        self.event_handler.register(EventKind::Block(SseBlock {
            slot: block.slot(),
            block: block_root,
            execution_optimistic,
        }));

        match data {
            AvailableData::Blobs(blobs) => {
                for blob in blobs {
                    self.event_handler.register(EventKind::BlobSidecar(
                        SseBlobSidecar::from_blob_sidecar(blob),
                    ));
                }
            }
            AvailableData::DataColumns(columns) => {
                for column in columns {
                    self.event_handler.register(EventKind::DataColumnSidecar(
                        SseDataColumnSidecar::from_data_column_sidecar(column),
                    ));
                }
            }
            AvailableData::NoData => {}
        }

        let body = block.body();
        for attestation in body.attestations().iter() {
            self.event_handler
                .register(EventKind::Attestation(Box::new(attestation.clone())));
        }
        for slashing in body.attester_slashings().iter() {
            self.event_handler
                .register(EventKind::AttesterSlashing(Box::new(slashing.clone())));
        }
        for slashing in body.proposer_slashings().iter() {
            self.event_handler
                .register(EventKind::ProposerSlashing(Box::new(slashing.clone())));
        }
        for exit in body.voluntary_exits().iter() {
            self.event_handler
                .register(EventKind::VoluntaryExit(Box::new(exit.clone())));
        }
        for change in body.bls_to_execution_changes().iter() {
            self.event_handler
                .register(EventKind::BlsToExecutionChange(Box::new(change.clone())));
        }
    }

    /*
     * Startup maintenance.
     */

    /// Roll back blocks persisted by an import that aborted between the DB
    /// write and fork-choice attachment.
    pub fn prune_dangling_blocks_on_startup(&self) -> Result<usize, BeaconChainError> {
        let known = {
            let fork_choice = self.canonical_head.fork_choice.read();
            fork_choice.proto_array().iter_roots().collect::<HashSet<_>>()
        };
        self.store
            .prune_dangling_blocks(&known)
            .map_err(BeaconChainError::from)
    }
}

fn invalid_attestation_code(error: &InvalidAttestation) -> &'static str {
    match error {
        InvalidAttestation::EmptyAggregationBitfield => "EMPTY_AGGREGATION_BITFIELD",
        InvalidAttestation::UnknownHeadBlock { .. } => "UNKNOWN_HEAD_BLOCK",
        InvalidAttestation::BadTargetEpoch { .. } => "BAD_TARGET_EPOCH",
        InvalidAttestation::FutureEpoch { .. } => "FUTURE_EPOCH",
        InvalidAttestation::PastEpoch { .. } => "PAST_EPOCH",
        InvalidAttestation::AttestsToFutureBlock { .. } => "ATTESTS_TO_FUTURE_BLOCK",
    }
}

impl BeaconChainError {
    pub(crate) fn from_da(e: crate::data_availability_checker::AvailabilityCheckError) -> Self {
        use crate::data_availability_checker::AvailabilityCheckError as E;
        match e {
            E::BlockInput(inner) => BeaconChainError::BlockInputError(inner),
            E::KzgError(inner) => BeaconChainError::KzgError(inner),
            E::Custody(inner) => {
                BeaconChainError::ForkChoiceError(format!("custody error: {inner:?}"))
            }
            E::ReconstructionFailed(message) => BeaconChainError::ForkChoiceError(message),
            E::MissingBlock(root) => BeaconChainError::MissingBeaconBlock(root),
        }
    }
}
