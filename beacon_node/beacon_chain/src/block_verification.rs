//! Block validation: the gossip stage pipeline and the chain-segment verify
//! pipeline.
//!
//! Gossip validation is fail-fast and side-effect free apart from the
//! seen-caches; every error carries an IGNORE/REJECT action for the peer
//! scorer. The verify pipeline runs after data availability: ancestry →
//! state regen → state transition (signatures deferred) → one BLS batch →
//! execution payload → commitment/data cross-check.

use crate::beacon_chain::{BeaconChain, BeaconChainTypes};
use crate::block_input::AvailableData;
use crate::data_availability_checker::AvailableBlock;
use crate::errors::BeaconChainError;
use crate::state_transition::{BlockProcessingOpts, TransitionError};
use crate::ValidationAction;
use bls::SignatureSet;
use execution_layer::PayloadStatus;
use fork_choice::PayloadVerificationStatus;
use slot_clock::SlotClock;
use ssz_types::typenum::Unsigned;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use types::{
    BeaconState, Domain, EthSpec, Hash256, SignedBeaconBlock, SigningData, Slot,
    compute_signing_root,
};
use tree_hash::TreeHash;

/// An error from block validation, gossip or deeper.
#[derive(Debug)]
pub enum BlockError {
    /// The block is from a future slot (beyond clock disparity).
    ///
    /// ## Peer scoring
    ///
    /// Our clock may be off; do not penalise the sender.
    FutureSlot {
        present_slot: Slot,
        block_slot: Slot,
    },
    /// The block is at or before the finalized slot.
    WouldRevertFinalizedSlot {
        block_slot: Slot,
        finalized_slot: Slot,
    },
    /// The proposer index does not match the parent-state shuffling.
    ///
    /// ## Peer scoring
    ///
    /// Provably invalid; score the sender down.
    IncorrectBlockProposer {
        block_proposer: u64,
        local_shuffling_proposer: u64,
    },
    /// The shuffling needed to check the proposer is not computable yet.
    ShufflingUnavailable(Hash256),
    /// A block for this `(slot, proposer)` was already seen.
    RepeatProposal { proposer: u64, slot: Slot },
    /// The parent block is not known to fork choice. The sync subsystem is
    /// told via an `UnknownBlockParent` notification.
    ParentUnknown { parent_root: Hash256 },
    /// The proposer signature is invalid.
    ProposerSignatureInvalid,
    /// The batched signature verification failed and individual re-checking
    /// located the fault.
    InvalidSignature(SignatureSetLabel),
    /// Slots or parent links in a chain segment do not line up.
    NonLinearSlots {
        parent_slot: Slot,
        block_slot: Slot,
    },
    NonLinearParentRoots {
        expected: Hash256,
        got: Hash256,
    },
    /// The state-transition function rejected the block.
    StateTransitionError(TransitionError),
    /// The EL judged the payload invalid. The block is excised from fork
    /// choice and the raw SSZ is persisted for forensics.
    ExecutionPayloadInvalid {
        block_root: Hash256,
        latest_valid_hash: Option<types::ExecutionBlockHash>,
    },
    /// The available data does not cover the block's commitments.
    DataUnavailable(Hash256),
    /// The block root is already fully imported. Downgraded to success under
    /// `ignore_if_known`.
    BlockIsAlreadyKnown(Hash256),
    BeaconChainError(Box<BeaconChainError>),
}

/// Which signature set of the batch was at fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignatureSetLabel {
    Block,
    Attestation,
    AttesterSlashing,
    ProposerSlashing,
    Deposit,
    VoluntaryExit,
    BlsToExecutionChange,
    SyncAggregate,
}

impl BlockError {
    /// The gossip action for errors that can surface on the block topic.
    pub fn action(&self) -> ValidationAction {
        match self {
            BlockError::FutureSlot { .. }
            | BlockError::WouldRevertFinalizedSlot { .. }
            | BlockError::ShufflingUnavailable(_)
            | BlockError::RepeatProposal { .. }
            | BlockError::ParentUnknown { .. }
            | BlockError::BlockIsAlreadyKnown(_) => ValidationAction::Ignore,
            _ => ValidationAction::Reject,
        }
    }
}

impl From<TransitionError> for BlockError {
    fn from(e: TransitionError) -> Self {
        BlockError::StateTransitionError(e)
    }
}

impl From<BeaconChainError> for BlockError {
    fn from(e: BeaconChainError) -> Self {
        BlockError::BeaconChainError(Box::new(e))
    }
}

/// A block that passed the gossip stages and may be re-published.
#[derive(Debug)]
pub struct GossipVerifiedBlock<E: EthSpec> {
    pub block: Arc<SignedBeaconBlock<E>>,
    pub block_root: Hash256,
    pub seen_timestamp: Duration,
}

/// Options for the chain-segment verify pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainSegmentOptions {
    /// Verify but do not commit (consensus-only API validation).
    pub verify_only: bool,
    pub skip_verify_block_signatures: bool,
    pub skip_verify_execution_payload: bool,
    /// Downgrade duplicate-import errors to success.
    pub ignore_if_known: bool,
}

/// A block that has fully passed the verify pipeline.
pub struct ExecutedBlock<E: EthSpec> {
    pub block: Arc<SignedBeaconBlock<E>>,
    pub block_root: Hash256,
    pub data: AvailableData<E>,
    pub post_state: BeaconState<E>,
    pub payload_status: PayloadVerificationStatus,
}

/// The signing root of a block: `SigningData(block_root, proposer domain)`.
pub fn block_signing_root<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    block_root: Hash256,
    slot: Slot,
) -> Hash256 {
    let fork_name = chain.spec.fork_name_at_slot::<T::EthSpec>(slot);
    let domain = Domain::BeaconProposer.compute(fork_name, chain.config.genesis_validators_root);
    SigningData {
        object_root: block_root,
        domain,
    }
    .tree_hash_root()
}

/// Run the gossip stage pipeline on a block.
pub fn validate_block_for_gossip<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    block: Arc<SignedBeaconBlock<T::EthSpec>>,
) -> Result<GossipVerifiedBlock<T::EthSpec>, BlockError> {
    let block_slot = block.slot();
    let block_root = block.canonical_root();

    // [1] Not from a future slot, allowing for clock disparity.
    let present_slot = chain
        .slot_clock
        .now_with_future_tolerance(chain.spec.maximum_gossip_clock_disparity())
        .ok_or(BeaconChainError::UnableToReadSlot)?;
    if block_slot > present_slot {
        return Err(BlockError::FutureSlot {
            present_slot,
            block_slot,
        });
    }

    // [2] Strictly newer than the finalized slot.
    let finalized_slot = chain
        .finalized_checkpoint()
        .epoch
        .start_slot(T::EthSpec::slots_per_epoch());
    if block_slot <= finalized_slot && finalized_slot > Slot::new(0) {
        return Err(BlockError::WouldRevertFinalizedSlot {
            block_slot,
            finalized_slot,
        });
    }

    // [5] The parent must be known to fork choice; otherwise the sync layer
    // is responsible for fetching it.
    let parent_root = block.parent_root();
    if !chain.knows_block(&parent_root) {
        chain.notify_unknown_block_parent(block_root, parent_root);
        return Err(BlockError::ParentUnknown { parent_root });
    }

    // [3] The proposer must match the parent-state shuffling. A missing
    // parent state means the shuffling is not computable yet: IGNORE.
    let parent_state = chain
        .state_cache
        .get(&parent_root)
        .ok_or(BlockError::ShufflingUnavailable(parent_root))?;
    let expected_proposer = parent_state
        .get_beacon_proposer_index(block_slot)
        .map_err(BeaconChainError::from)?;
    if expected_proposer != block.proposer_index() {
        return Err(BlockError::IncorrectBlockProposer {
            block_proposer: block.proposer_index(),
            local_shuffling_proposer: expected_proposer,
        });
    }

    // [4] First block for this (slot, proposer).
    if chain
        .observed_block_producers
        .read()
        .proposer_has_been_observed(block_slot, block.proposer_index())
        .unwrap_or(false)
    {
        return Err(BlockError::RepeatProposal {
            proposer: block.proposer_index(),
            slot: block_slot,
        });
    }

    // [6] Proposer signature, verified on the main path (not batched) and
    // cached so the block's sidecars can reuse it.
    let signing_root = block_signing_root(chain, block_root, block_slot);
    let pubkey = parent_state
        .pubkey(block.proposer_index())
        .map_err(BeaconChainError::from)?;
    let set = SignatureSet::single_pubkey(block.signature(), Cow::Borrowed(pubkey), signing_root);
    if !chain.bls_verifier.verify_signature_set(&set) {
        return Err(BlockError::ProposerSignatureInvalid);
    }

    {
        let mut observed = chain.observed_block_producers.write();
        let _ = observed.observe_proposal(block_slot, block.proposer_index(), block_root);
        observed.register_verified_proposer_signature(block_root);
    }

    let seen_timestamp = chain.slot_clock.now_duration().unwrap_or_default();
    debug!(slot = %block_slot, root = ?block_root, "Gossip block verified");

    Ok(GossipVerifiedBlock {
        block,
        block_root,
        seen_timestamp,
    })
}

/// The verify pipeline over a chain of available blocks sharing a parent
/// and an epoch.
///
/// Early-exits on the first fatal fault. `parent_root` must be known to
/// fork choice and have a cached post-state.
pub async fn verify_blocks_in_epoch<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    parent_root: Hash256,
    blocks: Vec<AvailableBlock<T::EthSpec>>,
    opts: ChainSegmentOptions,
) -> Result<Vec<ExecutedBlock<T::EthSpec>>, BlockError> {
    if blocks.is_empty() {
        return Ok(vec![]);
    }

    // [1] Ancestry: parent roots chain back to `parent_root`, slots
    // strictly increase.
    let mut expected_parent = parent_root;
    let mut previous_slot: Option<Slot> = None;
    for available in &blocks {
        let block = &available.block;
        if block.parent_root() != expected_parent {
            return Err(BlockError::NonLinearParentRoots {
                expected: expected_parent,
                got: block.parent_root(),
            });
        }
        if let Some(parent_slot) = previous_slot {
            if block.slot() <= parent_slot {
                return Err(BlockError::NonLinearSlots {
                    parent_slot,
                    block_slot: block.slot(),
                });
            }
        }
        expected_parent = available.block_root;
        previous_slot = Some(block.slot());
    }

    // [2] State regen: the parent's post-state from the cache.
    let parent_state = chain
        .state_cache
        .get(&parent_root)
        .ok_or(BeaconChainError::MissingBeaconState(parent_root))?;
    let mut state = (*parent_state).clone();

    // [3] State transition per block, signatures deferred to the batch.
    let mut executed = Vec::with_capacity(blocks.len());
    for available in blocks {
        let block = available.block.clone();
        while state.slot < block.slot() {
            chain
                .state_transition
                .per_slot_processing(&mut state)
                .map_err(BlockError::from)?;
        }
        chain
            .state_transition
            .per_block_processing(
                &mut state,
                &block,
                BlockProcessingOpts {
                    verify_state_root: true,
                    verify_execution_payload: !opts.skip_verify_execution_payload,
                },
            )
            .map_err(BlockError::from)?;

        // [6] Data availability cross-check: the available data must cover
        // every commitment.
        let expected = block.num_expected_blobs();
        let covered = match &available.data {
            AvailableData::NoData => expected == 0,
            AvailableData::Blobs(blobs) => blobs.len() == expected,
            // Columns carry a cell per commitment; custody was already
            // checked when the block became available.
            AvailableData::DataColumns(columns) => columns
                .iter()
                .all(|column| column.kzg_commitments.len() == expected),
        };
        if !covered {
            return Err(BlockError::DataUnavailable(available.block_root));
        }

        executed.push(ExecutedBlock {
            block,
            block_root: available.block_root,
            data: available.data,
            post_state: state.clone(),
            payload_status: PayloadVerificationStatus::Irrelevant,
        });
    }

    // [4] One BLS batch over every signature in the segment.
    if !opts.skip_verify_block_signatures {
        verify_segment_signatures(chain, &executed)?;
    }

    // [5] Execution payloads, in order. SYNCING/ACCEPTED leaves the block
    // optimistic; INVALID is fatal.
    for executed_block in executed.iter_mut() {
        let payload = executed_block.block.body().execution_payload().clone();
        if payload.is_default_with_zero_roots() {
            executed_block.payload_status = PayloadVerificationStatus::Irrelevant;
            continue;
        }
        if opts.skip_verify_execution_payload {
            executed_block.payload_status = PayloadVerificationStatus::Optimistic;
            continue;
        }
        let status = chain
            .execution_layer
            .notify_new_payload(&payload)
            .await
            .map_err(BeaconChainError::from)?;
        executed_block.payload_status = match status {
            PayloadStatus::Valid => PayloadVerificationStatus::Verified,
            PayloadStatus::Syncing | PayloadStatus::Accepted => {
                PayloadVerificationStatus::Optimistic
            }
            PayloadStatus::Invalid { latest_valid_hash } => {
                warn!(
                    root = ?executed_block.block_root,
                    "Execution layer rejected payload"
                );
                return Err(BlockError::ExecutionPayloadInvalid {
                    block_root: executed_block.block_root,
                    latest_valid_hash,
                });
            }
            PayloadStatus::InvalidBlockHash => {
                return Err(BlockError::ExecutionPayloadInvalid {
                    block_root: executed_block.block_root,
                    latest_valid_hash: None,
                });
            }
        };
    }

    Ok(executed)
}

/// Aggregate every signature of the segment into one batch; on failure,
/// re-verify set by set to locate the fault.
fn verify_segment_signatures<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    executed: &[ExecutedBlock<T::EthSpec>],
) -> Result<(), BlockError> {
    let mut sets: Vec<(SignatureSetLabel, SignatureSet)> = Vec::new();

    for executed_block in executed {
        collect_block_signature_sets(chain, executed_block, &mut sets)?;
    }

    let batch = sets.iter().map(|(_, set)| set.clone()).collect::<Vec<_>>();
    if chain.bls_verifier.verify_signature_sets(&batch) {
        return Ok(());
    }

    // Locate the offender for a precise rejection.
    for (label, set) in &sets {
        if !chain.bls_verifier.verify_signature_set(set) {
            return Err(match label {
                SignatureSetLabel::Block => BlockError::ProposerSignatureInvalid,
                other => BlockError::InvalidSignature(*other),
            });
        }
    }
    // The batch failed but every set passed individually: a backend fault.
    Err(BlockError::InvalidSignature(SignatureSetLabel::Block))
}

fn collect_block_signature_sets<'a, T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    executed: &'a ExecutedBlock<T::EthSpec>,
    sets: &mut Vec<(SignatureSetLabel, SignatureSet<'a>)>,
) -> Result<(), BlockError> {
    let block = &executed.block;
    let state = &executed.post_state;
    let fork_name = chain.spec.fork_name_at_slot::<T::EthSpec>(block.slot());
    let gvr = chain.config.genesis_validators_root;

    let pubkey = |validator_index: u64| {
        state
            .pubkey(validator_index)
            .map(|key| Cow::Owned(*key))
            .map_err(|e| BlockError::BeaconChainError(Box::new(e.into())))
    };

    // Block proposer.
    let signing_root = block_signing_root(chain, executed.block_root, block.slot());
    sets.push((
        SignatureSetLabel::Block,
        SignatureSet::single_pubkey(
            block.signature(),
            pubkey(block.proposer_index())?,
            signing_root,
        ),
    ));

    let body = block.body();
    let attester_domain = Domain::BeaconAttester.compute(fork_name, gvr);

    for attestation in body.attestations().iter() {
        let indices = state
            .get_attesting_indices(attestation)
            .map_err(|e| BlockError::BeaconChainError(Box::new(e.into())))?;
        if indices.is_empty() {
            continue;
        }
        let keys = indices
            .iter()
            .map(|index| pubkey(*index))
            .collect::<Result<Vec<_>, _>>()?;
        sets.push((
            SignatureSetLabel::Attestation,
            SignatureSet::multiple_pubkeys(
                &attestation.signature,
                keys,
                compute_signing_root(&attestation.data, attester_domain),
            ),
        ));
    }

    for slashing in body.attester_slashings().iter() {
        for indexed in [&slashing.attestation_1, &slashing.attestation_2] {
            if indexed.attesting_indices.is_empty() {
                continue;
            }
            let keys = indexed
                .attesting_indices
                .iter()
                .map(|index| pubkey(*index))
                .collect::<Result<Vec<_>, _>>()?;
            sets.push((
                SignatureSetLabel::AttesterSlashing,
                SignatureSet::multiple_pubkeys(
                    &indexed.signature,
                    keys,
                    compute_signing_root(&indexed.data, attester_domain),
                ),
            ));
        }
    }

    let proposer_domain = Domain::BeaconProposer.compute(fork_name, gvr);
    for slashing in body.proposer_slashings().iter() {
        for header in [&slashing.signed_header_1, &slashing.signed_header_2] {
            sets.push((
                SignatureSetLabel::ProposerSlashing,
                SignatureSet::single_pubkey(
                    &header.signature,
                    pubkey(header.message.proposer_index)?,
                    compute_signing_root(&header.message, proposer_domain),
                ),
            ));
        }
    }

    let deposit_domain = Domain::Deposit.compute(fork_name, gvr);
    for deposit in body.deposits().iter() {
        sets.push((
            SignatureSetLabel::Deposit,
            SignatureSet::single_pubkey(
                &deposit.data.signature,
                Cow::Owned(deposit.data.pubkey),
                compute_signing_root(&deposit.data, deposit_domain),
            ),
        ));
    }

    let exit_domain = Domain::VoluntaryExit.compute(fork_name, gvr);
    for exit in body.voluntary_exits().iter() {
        sets.push((
            SignatureSetLabel::VoluntaryExit,
            SignatureSet::single_pubkey(
                &exit.signature,
                pubkey(exit.message.validator_index)?,
                compute_signing_root(&exit.message, exit_domain),
            ),
        ));
    }

    let bls_change_domain = Domain::BlsToExecutionChange.compute(fork_name, gvr);
    for change in body.bls_to_execution_changes().iter() {
        sets.push((
            SignatureSetLabel::BlsToExecutionChange,
            SignatureSet::single_pubkey(
                &change.signature,
                Cow::Owned(change.message.from_bls_pubkey),
                compute_signing_root(&change.message, bls_change_domain),
            ),
        ));
    }

    let sync_domain = Domain::SyncCommittee.compute(fork_name, gvr);
    let sync_aggregate = body.sync_aggregate();
    if sync_aggregate.num_set_bits() > 0 {
        // The sync committee is modelled as the lowest-indexed validators;
        // participation bits select from it.
        let committee_size = state
            .validators
            .len()
            .min(<T::EthSpec as EthSpec>::SyncCommitteeSize::to_usize());
        let keys = (0..committee_size as u64)
            .filter(|index| {
                sync_aggregate
                    .sync_committee_bits
                    .get(*index as usize)
                    .unwrap_or(false)
            })
            .map(pubkey)
            .collect::<Result<Vec<_>, _>>()?;
        if !keys.is_empty() {
            sets.push((
                SignatureSetLabel::SyncAggregate,
                SignatureSet::multiple_pubkeys(
                    &sync_aggregate.sync_committee_signature,
                    keys,
                    compute_signing_root(&block.parent_root(), sync_domain),
                ),
            ));
        }
    }

    Ok(())
}
