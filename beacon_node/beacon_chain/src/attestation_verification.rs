//! Gossip validation for aggregate attestations.
//!
//! The full attestation pool and aggregation machinery live elsewhere; the
//! ingestion core validates just enough to feed fork choice and to keep the
//! seen-cache authoritative for republish suppression.

use crate::beacon_chain::{BeaconChain, BeaconChainTypes};
use crate::errors::BeaconChainError;
use crate::observed_attestations::ObserveOutcome;
use crate::ValidationAction;
use bls::SignatureSet;
use slot_clock::SlotClock;
use std::borrow::Cow;
use tracing::debug;
use types::{Attestation, Domain, EthSpec, Hash256, IndexedAttestation, compute_signing_root};

#[derive(Debug)]
pub enum AttestationError {
    /// The target epoch is outside `[current - 1, current]`.
    PastOrFutureEpoch {
        attestation_epoch: types::Epoch,
        current_epoch: types::Epoch,
    },
    /// This exact aggregate was already seen.
    AttestationAlreadyKnown(Hash256),
    /// The attested head block is unknown.
    UnknownHeadBlock { beacon_block_root: Hash256 },
    /// No attesting bits set.
    EmptyAggregationBitfield,
    /// The committee bitfield does not match the committee.
    Invalid(types::BeaconStateError),
    /// The aggregate signature does not verify.
    InvalidSignature,
    BeaconChainError(Box<BeaconChainError>),
}

impl AttestationError {
    pub fn action(&self) -> ValidationAction {
        match self {
            AttestationError::PastOrFutureEpoch { .. }
            | AttestationError::AttestationAlreadyKnown(_)
            | AttestationError::UnknownHeadBlock { .. }
            | AttestationError::BeaconChainError(_) => ValidationAction::Ignore,
            _ => ValidationAction::Reject,
        }
    }
}

/// An aggregate that passed gossip validation, carrying its indexed form.
pub struct VerifiedAggregate<E: EthSpec> {
    pub attestation: Attestation<E>,
    pub indexed: IndexedAttestation<E>,
}

pub fn validate_aggregate_for_gossip<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    attestation: Attestation<T::EthSpec>,
) -> Result<VerifiedAggregate<T::EthSpec>, AttestationError> {
    let data = attestation.data;

    let current_epoch = chain
        .slot_clock
        .now()
        .ok_or_else(|| {
            AttestationError::BeaconChainError(Box::new(BeaconChainError::UnableToReadSlot))
        })?
        .epoch(T::EthSpec::slots_per_epoch());
    if data.target.epoch > current_epoch || data.target.epoch + 1 < current_epoch {
        return Err(AttestationError::PastOrFutureEpoch {
            attestation_epoch: data.target.epoch,
            current_epoch,
        });
    }

    if attestation.num_set_bits() == 0 {
        return Err(AttestationError::EmptyAggregationBitfield);
    }

    let root = attestation.tree_hash_root_for_observation();
    if chain
        .observed_aggregates
        .read()
        .is_known(data.slot, root)
    {
        return Err(AttestationError::AttestationAlreadyKnown(root));
    }

    if !chain.knows_block(&data.beacon_block_root) {
        return Err(AttestationError::UnknownHeadBlock {
            beacon_block_root: data.beacon_block_root,
        });
    }

    // Resolve the committee against the head state and check the signature.
    let head_state = chain
        .head_state()
        .map_err(|e| AttestationError::BeaconChainError(Box::new(e)))?;
    let indexed = head_state
        .indexed_attestation(&attestation)
        .map_err(AttestationError::Invalid)?;

    let fork_name = chain.spec.fork_name_at_slot::<T::EthSpec>(data.slot);
    let domain = Domain::BeaconAttester.compute(fork_name, chain.config.genesis_validators_root);
    let keys = indexed
        .attesting_indices
        .iter()
        .map(|index| {
            head_state
                .pubkey(*index)
                .map(|key| Cow::Owned(*key))
                .map_err(|e| AttestationError::BeaconChainError(Box::new(e.into())))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let set = SignatureSet::multiple_pubkeys(
        &attestation.signature,
        keys,
        compute_signing_root(&data, domain),
    );
    if !chain.bls_verifier.verify_signature_set(&set) {
        return Err(AttestationError::InvalidSignature);
    }

    if chain.observed_aggregates.write().observe_root(data.slot, root)
        == ObserveOutcome::AlreadyKnown
    {
        return Err(AttestationError::AttestationAlreadyKnown(root));
    }

    debug!(slot = %data.slot, root = ?data.beacon_block_root, "Gossip aggregate verified");

    Ok(VerifiedAggregate {
        attestation,
        indexed,
    })
}
