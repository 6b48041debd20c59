use crate::{EthSpec, ExecutionAddress, Hash256};
use bls::{PublicKeyBytes, SignatureBytes};
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::VariableList;
use tree_hash_derive::TreeHash;

/// EIP-6110 deposit request surfaced by the execution layer.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct DepositRequest {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub amount: u64,
    pub signature: SignatureBytes,
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
}

/// EIP-7002 execution-triggered withdrawal request.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct WithdrawalRequest {
    pub source_address: ExecutionAddress,
    pub validator_pubkey: PublicKeyBytes,
    #[serde(with = "serde_utils::quoted_u64")]
    pub amount: u64,
}

/// EIP-7251 consolidation request.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct ConsolidationRequest {
    pub source_address: ExecutionAddress,
    pub source_pubkey: PublicKeyBytes,
    pub target_pubkey: PublicKeyBytes,
}

/// The EIP-7685 request lists carried in post-Electra block bodies.
///
/// Wire encoding to and from the execution layer
/// (`concat(type_byte, ssz(list))`, ascending types, empty lists omitted)
/// lives in the `execution_layer` crate; this is the SSZ container form.
#[derive(
    Debug, Clone, Default, Serialize, Deserialize, Encode, Decode, TreeHash, Derivative,
)]
#[derivative(PartialEq, Eq, Hash(bound = "E: EthSpec"))]
#[serde(bound = "E: EthSpec")]
pub struct ExecutionRequests<E: EthSpec> {
    pub deposits: VariableList<DepositRequest, E::MaxDepositRequestsPerPayload>,
    pub withdrawals: VariableList<WithdrawalRequest, E::MaxWithdrawalRequestsPerPayload>,
    pub consolidations: VariableList<ConsolidationRequest, E::MaxConsolidationRequestsPerPayload>,
}

impl<E: EthSpec> ExecutionRequests<E> {
    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty() && self.withdrawals.is_empty() && self.consolidations.is_empty()
    }
}
