//! The post-state view the ingestion core reads.
//!
//! Epoch processing, rewards and the full validator registry live in the
//! state-transition collaborator; this container carries the caches the core
//! consumes: proposer schedule, committee lookup, checkpoints, and the
//! latest block header. The proposer/committee derivations are deliberately
//! simple and deterministic, standing in for the shuffling caches the
//! collaborator would precompute.

use crate::{
    Attestation, BeaconBlockHeader, ChainSpec, Checkpoint, Epoch, EthSpec, ForkName, Hash256,
    IndexedAttestation, Slot,
};
pub use crate::validator::Validator;
use bls::PublicKeyBytes;
use merkle_proof::merkle_root_from_leaves;
use ssz_types::VariableList;
use std::marker::PhantomData;
use tree_hash::TreeHash;

#[derive(Debug, Clone, PartialEq)]
pub enum BeaconStateError {
    /// An operation expected a different fork variant of a container.
    IncorrectStateVariant,
    UnknownValidator(usize),
    CommitteeIndexOutOfBounds(u64),
    AggregationBitfieldLengthMismatch {
        bitfield_len: usize,
        committee_len: usize,
    },
    IndexedAttestationOverflow,
}

/// A state advanced to a specific slot, with lookup caches warm.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconState<E: EthSpec> {
    pub slot: Slot,
    pub genesis_validators_root: Hash256,
    pub validators: Vec<Validator>,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub latest_block_header: BeaconBlockHeader,
    /// Root of the block at (or latest before) the current epoch's start
    /// slot. Maintained by the state-transition collaborator; feeds
    /// checkpoint roots.
    pub epoch_boundary_root: Hash256,
    /// Epoch-stable randomness driving the proposer rotation. Refreshed by
    /// the state-transition collaborator at epoch boundaries.
    pub proposer_seed: Hash256,
    _phantom: PhantomData<E>,
}

impl<E: EthSpec> BeaconState<E> {
    pub fn new(genesis_validators_root: Hash256, validators: Vec<Validator>) -> Self {
        Self {
            slot: Slot::new(0),
            genesis_validators_root,
            validators,
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
            latest_block_header: BeaconBlockHeader::empty(),
            epoch_boundary_root: Hash256::default(),
            proposer_seed: Hash256::default(),
            _phantom: PhantomData,
        }
    }

    pub fn current_epoch(&self) -> Epoch {
        self.slot.epoch(E::slots_per_epoch())
    }

    pub fn fork_name(&self, spec: &ChainSpec) -> ForkName {
        spec.fork_name_at_slot::<E>(self.slot)
    }

    /// The proposer for `slot`, derived from the epoch seed.
    pub fn get_beacon_proposer_index(&self, slot: Slot) -> Result<u64, BeaconStateError> {
        if self.validators.is_empty() {
            return Err(BeaconStateError::UnknownValidator(0));
        }
        let seed = u64::from_le_bytes(
            self.proposer_seed.as_slice()[..8]
                .try_into()
                .expect("root has at least 8 bytes"),
        );
        Ok((seed.wrapping_add(slot.as_u64())) % self.validators.len() as u64)
    }

    /// The committee attesting at `(slot, committee_index)`.
    ///
    /// One committee per slot; validators rotate through slots by index.
    pub fn get_beacon_committee(
        &self,
        slot: Slot,
        committee_index: u64,
    ) -> Result<Vec<u64>, BeaconStateError> {
        if committee_index != 0 {
            return Err(BeaconStateError::CommitteeIndexOutOfBounds(committee_index));
        }
        let slots_per_epoch = E::slots_per_epoch();
        Ok((0..self.validators.len() as u64)
            .filter(|index| index % slots_per_epoch == slot % slots_per_epoch)
            .collect())
    }

    /// Resolve an attestation's committee bitfield into validator indices.
    pub fn get_attesting_indices(
        &self,
        attestation: &Attestation<E>,
    ) -> Result<Vec<u64>, BeaconStateError> {
        let committee = self.get_beacon_committee(attestation.data.slot, attestation.data.index)?;
        if attestation.aggregation_bits.len() != committee.len() {
            return Err(BeaconStateError::AggregationBitfieldLengthMismatch {
                bitfield_len: attestation.aggregation_bits.len(),
                committee_len: committee.len(),
            });
        }
        Ok(committee
            .into_iter()
            .enumerate()
            .filter_map(|(position, validator_index)| {
                attestation
                    .aggregation_bits
                    .get(position)
                    .ok()
                    .filter(|bit| *bit)
                    .map(|_| validator_index)
            })
            .collect())
    }

    pub fn indexed_attestation(
        &self,
        attestation: &Attestation<E>,
    ) -> Result<IndexedAttestation<E>, BeaconStateError> {
        let mut attesting_indices = self.get_attesting_indices(attestation)?;
        attesting_indices.sort_unstable();
        Ok(IndexedAttestation {
            attesting_indices: VariableList::new(attesting_indices)
                .map_err(|_| BeaconStateError::IndexedAttestationOverflow)?,
            data: attestation.data,
            signature: attestation.signature,
        })
    }

    pub fn pubkey(&self, validator_index: u64) -> Result<&PublicKeyBytes, BeaconStateError> {
        self.validators
            .get(validator_index as usize)
            .map(|validator| &validator.pubkey)
            .ok_or(BeaconStateError::UnknownValidator(validator_index as usize))
    }

    /// Effective balances indexed by validator, for fork-choice weighting.
    pub fn justified_balances(&self) -> Vec<u64> {
        self.validators
            .iter()
            .map(|validator| validator.effective_balance)
            .collect()
    }

    /// The state root. Commits to the fields the core round-trips through
    /// block `state_root` checks; not the full consensus-spec SSZ state root.
    pub fn canonical_root(&self) -> Hash256 {
        let leaves = [
            self.slot.tree_hash_root(),
            self.genesis_validators_root,
            self.latest_block_header.tree_hash_root(),
            self.current_justified_checkpoint.tree_hash_root(),
            self.finalized_checkpoint.tree_hash_root(),
            self.epoch_boundary_root,
            self.proposer_seed,
            (self.validators.len() as u64).tree_hash_root(),
        ];
        merkle_root_from_leaves(&leaves, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MainnetEthSpec;
    use fixed_bytes::FixedBytesExtended;
    use ssz_types::BitList;

    type E = MainnetEthSpec;

    fn state_with_validators(n: usize) -> BeaconState<E> {
        let validators = (0..n)
            .map(|i| {
                let mut pubkey = PublicKeyBytes::empty();
                pubkey.0[0] = i as u8;
                Validator::new(pubkey, 32_000_000_000)
            })
            .collect();
        BeaconState::new(Hash256::from_low_u64_be(42), validators)
    }

    #[test]
    fn proposer_is_deterministic_and_in_range() {
        let state = state_with_validators(100);
        let slot = Slot::new(12);
        let a = state.get_beacon_proposer_index(slot).unwrap();
        let b = state.get_beacon_proposer_index(slot).unwrap();
        assert_eq!(a, b);
        assert!(a < 100);
    }

    #[test]
    fn committee_partitions_validators() {
        let state = state_with_validators(96);
        let mut seen = std::collections::HashSet::new();
        for slot in Epoch::new(0).slot_iter(E::slots_per_epoch()) {
            for index in state.get_beacon_committee(slot, 0).unwrap() {
                assert!(seen.insert(index), "validator {index} in two committees");
            }
        }
        assert_eq!(seen.len(), 96);
    }

    #[test]
    fn attesting_indices_follow_bits() {
        let state = state_with_validators(64);
        let slot = Slot::new(3);
        let committee = state.get_beacon_committee(slot, 0).unwrap();

        let mut bits = BitList::with_capacity(committee.len()).unwrap();
        bits.set(0, true).unwrap();

        let attestation = Attestation::<E> {
            aggregation_bits: bits,
            data: crate::AttestationData {
                slot,
                index: 0,
                ..Default::default()
            },
            signature: bls::AggregateSignature::empty(),
        };

        let indices = state.get_attesting_indices(&attestation).unwrap();
        assert_eq!(indices, vec![committee[0]]);
    }

    #[test]
    fn state_root_tracks_slot() {
        let mut state = state_with_validators(4);
        let before = state.canonical_root();
        state.slot = Slot::new(1);
        assert_ne!(before, state.canonical_root());
    }
}
