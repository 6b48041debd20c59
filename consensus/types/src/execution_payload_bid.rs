use crate::{EthSpec, ExecutionBlockHash, Hash256, KzgCommitments, Slot};
use bls::SignatureBytes;
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

/// Execution payload bid submitted by builders in Gloas ePBS.
///
/// The bid commits to the payload via `block_hash` and the blob commitments;
/// the payload itself is revealed later by the builder. During the ePBS
/// transition `execution_payment` is required to be zero: payments settle
/// out-of-band until in-band payment processing is activated.
#[derive(
    Debug, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Derivative,
)]
#[derivative(PartialEq, Eq, Hash(bound = "E: EthSpec"))]
#[serde(bound = "E: EthSpec")]
pub struct ExecutionPayloadBid<E: EthSpec> {
    pub slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    pub builder_index: u64,
    pub parent_block_hash: ExecutionBlockHash,
    pub parent_block_root: Hash256,
    /// Hash of the execution payload being bid on.
    pub block_hash: ExecutionBlockHash,
    #[serde(with = "serde_utils::quoted_u64")]
    pub execution_payment: u64,
    pub blob_kzg_commitments: KzgCommitments<E>,
}

#[derive(
    Debug, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Derivative,
)]
#[derivative(PartialEq, Eq, Hash(bound = "E: EthSpec"))]
#[serde(bound = "E: EthSpec")]
pub struct SignedExecutionPayloadBid<E: EthSpec> {
    pub message: ExecutionPayloadBid<E>,
    pub signature: SignatureBytes,
}
