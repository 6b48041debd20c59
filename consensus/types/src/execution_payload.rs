use crate::ExecutionBlockHash;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

/// The execution payload as seen by the consensus core.
///
/// Only the identity fields are modelled; transaction contents, withdrawals
/// and fee accounting belong to the execution layer and the state-transition
/// collaborator. A zero `block_hash` marks a pre-merge (pre-TTD) payload.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct ExecutionPayload {
    pub parent_hash: ExecutionBlockHash,
    pub block_hash: ExecutionBlockHash,
    #[serde(with = "serde_utils::quoted_u64")]
    pub block_number: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub timestamp: u64,
}

impl ExecutionPayload {
    /// True when this block pre-dates the merge transition.
    pub fn is_default_with_zero_roots(&self) -> bool {
        self.block_hash.is_zero() && self.parent_hash.is_zero()
    }
}
