use crate::{EthSpec, IndexedAttestation};
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

#[derive(
    Debug, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Derivative,
)]
#[derivative(PartialEq, Eq, Hash(bound = "E: EthSpec"))]
#[serde(bound = "E: EthSpec")]
pub struct AttesterSlashing<E: EthSpec> {
    pub attestation_1: IndexedAttestation<E>,
    pub attestation_2: IndexedAttestation<E>,
}

impl<E: EthSpec> AttesterSlashing<E> {
    /// Validator indices attested in both conflicting attestations, sorted.
    pub fn intersecting_indices(&self) -> Vec<u64> {
        let second = self
            .attestation_2
            .attesting_indices
            .iter()
            .collect::<std::collections::HashSet<_>>();
        let mut indices = self
            .attestation_1
            .attesting_indices
            .iter()
            .filter(|index| second.contains(index))
            .copied()
            .collect::<Vec<_>>();
        indices.sort_unstable();
        indices
    }
}
