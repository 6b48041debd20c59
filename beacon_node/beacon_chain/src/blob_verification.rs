//! Gossip validation for blob sidecars (Deneb/Electra).

use crate::beacon_chain::{BeaconChain, BeaconChainTypes};
use crate::block_verification::block_signing_root;
use crate::errors::BeaconChainError;
use crate::ValidationAction;
use bls::SignatureSet;
use slot_clock::SlotClock;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;
use types::{BlobSidecar, EthSpec, Hash256, Slot};

/// An error occurred while validating a gossip blob.
#[derive(Debug)]
pub enum GossipBlobError {
    /// The sidecar is from a slot later than the current slot (with respect
    /// to the gossip clock disparity).
    FutureSlot {
        message_slot: Slot,
        latest_permissible_slot: Slot,
    },
    /// The sidecar is for a finalized slot and is therefore useless.
    PastFinalizedSlot {
        blob_slot: Slot,
        finalized_slot: Slot,
    },
    /// The sidecar was gossiped over an incorrect subnet.
    InvalidSubnet { expected: u64, received: u64 },
    /// The index exceeds the blob cap for the epoch.
    IndexOutOfBounds { index: u64, max: u64 },
    /// The sidecar's header does not match the block already known under
    /// the same root.
    HeaderInconsistentWithBlock { block_root: Hash256 },
    /// The commitments-list inclusion proof is invalid.
    InvalidInclusionProof,
    /// The sidecar's own commitment is not `kzg_commitments[index]`.
    CommitmentMismatch { index: u64 },
    /// The KZG proof for the blob is invalid.
    InvalidKzgProof(kzg::Error),
    /// An identical sidecar was already seen for `(slot, proposer, index)`.
    RepeatSidecar {
        proposer: u64,
        slot: Slot,
        index: u64,
    },
    /// A *different* sidecar was already seen for the tuple.
    NotFirstForTuple {
        proposer: u64,
        slot: Slot,
        index: u64,
    },
    /// The proposer signature on the embedded header is invalid.
    ProposerSignatureInvalid,
    /// The parent block is unknown; the sync layer is notified.
    BlobParentUnknown { parent_root: Hash256 },
    /// Internal failure; validity unknown.
    BeaconChainError(Box<BeaconChainError>),
}

impl GossipBlobError {
    pub fn action(&self) -> ValidationAction {
        match self {
            GossipBlobError::FutureSlot { .. }
            | GossipBlobError::PastFinalizedSlot { .. }
            | GossipBlobError::RepeatSidecar { .. }
            | GossipBlobError::BlobParentUnknown { .. }
            | GossipBlobError::BeaconChainError(_) => ValidationAction::Ignore,
            _ => ValidationAction::Reject,
        }
    }
}

impl From<BeaconChainError> for GossipBlobError {
    fn from(e: BeaconChainError) -> Self {
        GossipBlobError::BeaconChainError(Box::new(e))
    }
}

/// A blob sidecar approved for re-gossip and availability tracking.
#[derive(Debug)]
pub struct GossipVerifiedBlob<E: EthSpec> {
    pub blob: Arc<BlobSidecar<E>>,
}

impl<E: EthSpec> GossipVerifiedBlob<E> {
    pub fn block_root(&self) -> Hash256 {
        self.blob.block_root()
    }

    pub fn slot(&self) -> Slot {
        self.blob.slot()
    }

    pub fn index(&self) -> u64 {
        self.blob.index
    }

    pub fn into_inner(self) -> Arc<BlobSidecar<E>> {
        self.blob
    }
}

pub fn validate_blob_sidecar_for_gossip<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    blob_sidecar: Arc<BlobSidecar<T::EthSpec>>,
    subnet: u64,
) -> Result<GossipVerifiedBlob<T::EthSpec>, GossipBlobError> {
    let blob_slot = blob_sidecar.slot();
    let blob_index = blob_sidecar.index;
    let blob_epoch = blob_sidecar.epoch();
    let block_root = blob_sidecar.block_root();
    let proposer_index = blob_sidecar.block_proposer_index();

    // Correct subnet for the index.
    let expected_subnet = chain.spec.blob_sidecar_subnet_id(blob_index);
    if expected_subnet != subnet {
        return Err(GossipBlobError::InvalidSubnet {
            expected: expected_subnet,
            received: subnet,
        });
    }

    // Index within the epoch's blob cap.
    let max_blobs = chain.spec.max_blobs_per_block_at_epoch(blob_epoch);
    if blob_index >= max_blobs {
        return Err(GossipBlobError::IndexOutOfBounds {
            index: blob_index,
            max: max_blobs,
        });
    }

    // Not from the future, allowing clock disparity.
    let latest_permissible_slot = chain
        .slot_clock
        .now_with_future_tolerance(chain.spec.maximum_gossip_clock_disparity())
        .ok_or(BeaconChainError::UnableToReadSlot)?;
    if blob_slot > latest_permissible_slot {
        return Err(GossipBlobError::FutureSlot {
            message_slot: blob_slot,
            latest_permissible_slot,
        });
    }

    // Not already finalized.
    let finalized_slot = chain
        .finalized_checkpoint()
        .epoch
        .start_slot(T::EthSpec::slots_per_epoch());
    if blob_slot <= finalized_slot && finalized_slot > Slot::new(0) {
        return Err(GossipBlobError::PastFinalizedSlot {
            blob_slot,
            finalized_slot,
        });
    }

    // First sidecar for the (slot, proposer, index) tuple. An identical
    // repeat is benign; a conflicting one is provable misbehaviour. The
    // observation itself is only committed after full validation.
    let observation_root = sidecar_observation_root(&blob_sidecar);
    match chain
        .observed_data_sidecars
        .read()
        .observation(blob_slot, proposer_index, blob_index)
    {
        None => {}
        Some(existing) if existing == observation_root => {
            return Err(GossipBlobError::RepeatSidecar {
                proposer: proposer_index,
                slot: blob_slot,
                index: blob_index,
            });
        }
        Some(_) => {
            return Err(GossipBlobError::NotFirstForTuple {
                proposer: proposer_index,
                slot: blob_slot,
                index: blob_index,
            });
        }
    }

    // If we already hold the block, the embedded header must agree with it.
    if let Some(known) = chain.fork_choice_block(&block_root) {
        if known.slot != blob_slot || known.proposer_index != proposer_index {
            return Err(GossipBlobError::HeaderInconsistentWithBlock { block_root });
        }
    }

    // The commitments-list inclusion proof against the header's body root.
    if !blob_sidecar.verify_inclusion_proof() {
        return Err(GossipBlobError::InvalidInclusionProof);
    }

    // The sidecar's own commitment must be the indexed entry of the list.
    let listed = blob_sidecar
        .kzg_commitments
        .get(blob_index as usize)
        .copied();
    if listed != Some(blob_sidecar.kzg_commitment) {
        return Err(GossipBlobError::CommitmentMismatch { index: blob_index });
    }

    // Individual KZG proof on the main path; the import-time batch runs
    // over the full set once assembled.
    chain
        .kzg
        .verify_blob_kzg_proof(
            &blob_sidecar.blob,
            blob_sidecar.kzg_commitment,
            blob_sidecar.kzg_proof,
        )
        .map_err(GossipBlobError::InvalidKzgProof)?;

    // Proposer signature over the embedded header, reusing the block
    // pipeline's verification when it already ran.
    verify_header_signature(chain, &blob_sidecar)?;

    // Fully valid: claim the tuple.
    let _ = chain.observed_data_sidecars.write().observe_sidecar(
        blob_slot,
        proposer_index,
        blob_index,
        observation_root,
    );

    debug!(
        slot = %blob_slot,
        root = ?block_root,
        index = blob_index,
        "Gossip blob verified"
    );

    Ok(GossipVerifiedBlob { blob: blob_sidecar })
}

/// The sidecar identity for the seen-cache: commitment + proof bytes
/// distinguish conflicting sidecars under one tuple.
fn sidecar_observation_root<E: EthSpec>(sidecar: &BlobSidecar<E>) -> Hash256 {
    use tree_hash::TreeHash;
    sidecar.tree_hash_root()
}

fn verify_header_signature<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    blob_sidecar: &BlobSidecar<T::EthSpec>,
) -> Result<(), GossipBlobError> {
    let block_root = blob_sidecar.block_root();

    if chain
        .observed_block_producers
        .write()
        .proposer_signature_has_been_verified(block_root)
    {
        return Ok(());
    }

    let parent_root = blob_sidecar.block_parent_root();
    let Some(parent_state) = chain.state_cache.get(&parent_root) else {
        chain.notify_unknown_block_parent(block_root, parent_root);
        return Err(GossipBlobError::BlobParentUnknown { parent_root });
    };
    let pubkey = parent_state
        .pubkey(blob_sidecar.block_proposer_index())
        .map_err(|e| GossipBlobError::BeaconChainError(Box::new(e.into())))?;

    let signing_root = block_signing_root(chain, block_root, blob_sidecar.slot());
    let set = SignatureSet::single_pubkey(
        &blob_sidecar.signed_block_header.signature,
        Cow::Borrowed(pubkey),
        signing_root,
    );
    if !chain.bls_verifier.verify_signature_set(&set) {
        return Err(GossipBlobError::ProposerSignatureInvalid);
    }

    chain
        .observed_block_producers
        .write()
        .register_verified_proposer_signature(block_root);
    Ok(())
}
