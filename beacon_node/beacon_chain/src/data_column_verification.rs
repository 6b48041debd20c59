//! Gossip validation for data-column sidecars (Fulu+, PeerDAS).

use crate::beacon_chain::{BeaconChain, BeaconChainTypes};
use crate::block_verification::block_signing_root;
use crate::errors::BeaconChainError;
use crate::ValidationAction;
use bls::SignatureSet;
use slot_clock::SlotClock;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;
use types::{DataColumnSidecar, EthSpec, Hash256, Slot};

#[derive(Debug)]
pub enum GossipDataColumnError {
    FutureSlot {
        message_slot: Slot,
        latest_permissible_slot: Slot,
    },
    PastFinalizedSlot {
        column_slot: Slot,
        finalized_slot: Slot,
    },
    /// The column index is not below `NUMBER_OF_COLUMNS`.
    IndexOutOfBounds { index: u64, max: u64 },
    /// `column_index mod DATA_COLUMN_SIDECAR_SUBNET_COUNT` does not match
    /// the arriving topic's subnet.
    InvalidSubnet { expected: u64, received: u64 },
    /// More commitments than the epoch's blob cap allows.
    TooManyCommitments { count: usize, max: u64 },
    /// `column`, `kzg_commitments` and `kzg_proofs` lengths differ.
    InconsistentLengths {
        column: usize,
        commitments: usize,
        proofs: usize,
    },
    HeaderInconsistentWithBlock { block_root: Hash256 },
    InvalidInclusionProof,
    InvalidKzgProof(kzg::Error),
    RepeatSidecar {
        proposer: u64,
        slot: Slot,
        index: u64,
    },
    NotFirstForTuple {
        proposer: u64,
        slot: Slot,
        index: u64,
    },
    ProposerSignatureInvalid,
    ColumnParentUnknown { parent_root: Hash256 },
    BeaconChainError(Box<BeaconChainError>),
}

impl GossipDataColumnError {
    pub fn action(&self) -> ValidationAction {
        match self {
            GossipDataColumnError::FutureSlot { .. }
            | GossipDataColumnError::PastFinalizedSlot { .. }
            | GossipDataColumnError::RepeatSidecar { .. }
            | GossipDataColumnError::ColumnParentUnknown { .. }
            | GossipDataColumnError::BeaconChainError(_) => ValidationAction::Ignore,
            _ => ValidationAction::Reject,
        }
    }
}

impl From<BeaconChainError> for GossipDataColumnError {
    fn from(e: BeaconChainError) -> Self {
        GossipDataColumnError::BeaconChainError(Box::new(e))
    }
}

/// A data-column sidecar approved for re-gossip and availability tracking.
#[derive(Debug)]
pub struct GossipVerifiedDataColumn<E: EthSpec> {
    pub column: Arc<DataColumnSidecar<E>>,
}

impl<E: EthSpec> GossipVerifiedDataColumn<E> {
    pub fn block_root(&self) -> Hash256 {
        self.column.block_root()
    }

    pub fn index(&self) -> u64 {
        self.column.index
    }

    pub fn into_inner(self) -> Arc<DataColumnSidecar<E>> {
        self.column
    }
}

pub fn validate_data_column_sidecar_for_gossip<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    column: Arc<DataColumnSidecar<T::EthSpec>>,
    subnet: u64,
) -> Result<GossipVerifiedDataColumn<T::EthSpec>, GossipDataColumnError> {
    let column_slot = column.slot();
    let column_index = column.index;
    let column_epoch = column.epoch();
    let block_root = column.block_root();
    let proposer_index = column.block_proposer_index();

    // Index below the column count.
    let number_of_columns = chain.spec.number_of_columns;
    if column_index >= number_of_columns {
        return Err(GossipDataColumnError::IndexOutOfBounds {
            index: column_index,
            max: number_of_columns,
        });
    }

    // Modular subnet mapping.
    let expected_subnet = chain.spec.data_column_sidecar_subnet_id(column_index);
    if expected_subnet != subnet {
        return Err(GossipDataColumnError::InvalidSubnet {
            expected: expected_subnet,
            received: subnet,
        });
    }

    // Commitment count within the epoch schedule.
    let max_blobs = chain.spec.max_blobs_per_block_at_epoch(column_epoch);
    if column.kzg_commitments.len() as u64 > max_blobs {
        return Err(GossipDataColumnError::TooManyCommitments {
            count: column.kzg_commitments.len(),
            max: max_blobs,
        });
    }

    // The three parallel lists must agree.
    if column.column.len() != column.kzg_commitments.len()
        || column.column.len() != column.kzg_proofs.len()
    {
        return Err(GossipDataColumnError::InconsistentLengths {
            column: column.column.len(),
            commitments: column.kzg_commitments.len(),
            proofs: column.kzg_proofs.len(),
        });
    }

    // Timing.
    let latest_permissible_slot = chain
        .slot_clock
        .now_with_future_tolerance(chain.spec.maximum_gossip_clock_disparity())
        .ok_or(BeaconChainError::UnableToReadSlot)?;
    if column_slot > latest_permissible_slot {
        return Err(GossipDataColumnError::FutureSlot {
            message_slot: column_slot,
            latest_permissible_slot,
        });
    }
    let finalized_slot = chain
        .finalized_checkpoint()
        .epoch
        .start_slot(T::EthSpec::slots_per_epoch());
    if column_slot <= finalized_slot && finalized_slot > Slot::new(0) {
        return Err(GossipDataColumnError::PastFinalizedSlot {
            column_slot,
            finalized_slot,
        });
    }

    // Tuple uniqueness, committed only after full validation.
    let observation_root = column_observation_root(&column);
    match chain
        .observed_data_sidecars
        .read()
        .observation(column_slot, proposer_index, column_index)
    {
        None => {}
        Some(existing) if existing == observation_root => {
            return Err(GossipDataColumnError::RepeatSidecar {
                proposer: proposer_index,
                slot: column_slot,
                index: column_index,
            });
        }
        Some(_) => {
            return Err(GossipDataColumnError::NotFirstForTuple {
                proposer: proposer_index,
                slot: column_slot,
                index: column_index,
            });
        }
    }

    // Consistency with the block when already known.
    if let Some(known) = chain.fork_choice_block(&block_root) {
        if known.slot != column_slot || known.proposer_index != proposer_index {
            return Err(GossipDataColumnError::HeaderInconsistentWithBlock { block_root });
        }
    }

    // Commitments-list inclusion proof.
    if !column.verify_inclusion_proof() {
        return Err(GossipDataColumnError::InvalidInclusionProof);
    }

    // Cell-proof batch for this sidecar: one cell per commitment row.
    let mut cells: Vec<&[u8]> = Vec::with_capacity(column.column.len());
    let mut proofs = Vec::with_capacity(column.column.len());
    let mut cell_indices = Vec::with_capacity(column.column.len());
    let mut commitments = Vec::with_capacity(column.column.len());
    for (row, commitment) in column.kzg_commitments.iter().enumerate() {
        // Lengths were checked above.
        if let (Some(cell), Some(proof)) = (column.column.get(row), column.kzg_proofs.get(row)) {
            cells.push(cell);
            proofs.push(*proof);
            cell_indices.push(column_index);
            commitments.push(*commitment);
        }
    }
    chain
        .kzg
        .verify_cell_proof_batch(&cells, &proofs, &cell_indices, &commitments)
        .map_err(GossipDataColumnError::InvalidKzgProof)?;

    // Proposer signature over the embedded header, shared with the block
    // and blob pipelines through the seen-cache.
    verify_header_signature(chain, &column)?;

    // Fully valid: claim the tuple.
    let _ = chain.observed_data_sidecars.write().observe_sidecar(
        column_slot,
        proposer_index,
        column_index,
        observation_root,
    );

    debug!(
        slot = %column_slot,
        root = ?block_root,
        index = column_index,
        "Gossip data column verified"
    );

    Ok(GossipVerifiedDataColumn { column })
}

fn column_observation_root<E: EthSpec>(column: &DataColumnSidecar<E>) -> Hash256 {
    use tree_hash::TreeHash;
    column.tree_hash_root()
}

fn verify_header_signature<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    column: &DataColumnSidecar<T::EthSpec>,
) -> Result<(), GossipDataColumnError> {
    let block_root = column.block_root();

    if chain
        .observed_block_producers
        .write()
        .proposer_signature_has_been_verified(block_root)
    {
        return Ok(());
    }

    let parent_root = column.block_parent_root();
    let Some(parent_state) = chain.state_cache.get(&parent_root) else {
        chain.notify_unknown_block_parent(block_root, parent_root);
        return Err(GossipDataColumnError::ColumnParentUnknown { parent_root });
    };
    let pubkey = parent_state
        .pubkey(column.block_proposer_index())
        .map_err(|e| GossipDataColumnError::BeaconChainError(Box::new(e.into())))?;

    let signing_root = block_signing_root(chain, block_root, column.slot());
    let set = SignatureSet::single_pubkey(
        &column.signed_block_header.signature,
        Cow::Borrowed(pubkey),
        signing_root,
    );
    if !chain.bls_verifier.verify_signature_set(&set) {
        return Err(GossipDataColumnError::ProposerSignatureInvalid);
    }

    chain
        .observed_block_producers
        .write()
        .register_verified_proposer_signature(block_root);
    Ok(())
}
