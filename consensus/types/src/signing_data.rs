use crate::{ForkName, Hash256};
use ethereum_hashing::hash32_concat;
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

/// Signature domain separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    BeaconProposer,
    BeaconAttester,
    Randao,
    Deposit,
    VoluntaryExit,
    SyncCommittee,
    BlsToExecutionChange,
    BeaconBuilder,
}

impl Domain {
    fn as_u32(self) -> u32 {
        match self {
            Domain::BeaconProposer => 0,
            Domain::BeaconAttester => 1,
            Domain::Randao => 2,
            Domain::Deposit => 3,
            Domain::VoluntaryExit => 4,
            Domain::SyncCommittee => 7,
            Domain::BlsToExecutionChange => 10,
            Domain::BeaconBuilder => 0x1b,
        }
    }

    /// Mix the domain type with the fork and the chain identity.
    ///
    /// The real derivation goes through a fork-data root; the shape that
    /// matters to the core is that domains differ across (type, fork, chain).
    pub fn compute(self, fork_name: ForkName, genesis_validators_root: Hash256) -> Hash256 {
        let mut type_and_fork = [0u8; 32];
        type_and_fork[..4].copy_from_slice(&self.as_u32().to_le_bytes());
        type_and_fork[4..12].copy_from_slice(&fork_name.ordinal().to_le_bytes());
        Hash256::from_slice(&hash32_concat(
            &type_and_fork,
            genesis_validators_root.as_slice(),
        ))
    }
}

/// The container whose hash-tree-root is the message actually signed.
#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct SigningData {
    pub object_root: Hash256,
    pub domain: Hash256,
}

/// `compute_signing_root` from the consensus specs.
pub fn compute_signing_root<T: TreeHash>(object: &T, domain: Hash256) -> Hash256 {
    SigningData {
        object_root: object.tree_hash_root(),
        domain,
    }
    .tree_hash_root()
}
