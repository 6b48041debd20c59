use ssz_types::typenum::{
    U2, U4, U16, U32, U33, U128, U512, U2048, U4096, U8192, U131072, Unsigned,
};
use std::fmt::Debug;
use std::hash::Hash;

/// Compile-time list bounds and preset parameters.
///
/// Mirrors the consensus-spec presets: every SSZ list in the data model takes
/// its bound from an associated type here, so a preset swap is a type swap.
pub trait EthSpec:
    'static + Default + Sync + Send + Clone + Debug + PartialEq + Eq + Hash
{
    type SlotsPerEpoch: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type SlotsPerHistoricalRoot: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxValidatorsPerCommittee: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxProposerSlashings: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxAttesterSlashings: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxAttestations: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxDeposits: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxVoluntaryExits: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxBlsToExecutionChanges: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type SyncCommitteeSize: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type DepositContractTreeDepthPlusOne: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    /// Maximum number of `blob_kzg_commitments` representable in a body.
    type MaxBlobCommitmentsPerBlock: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type BytesPerBlob: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type BytesPerCell: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type NumberOfColumns: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type KzgCommitmentsInclusionProofDepth: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxDepositRequestsPerPayload: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxWithdrawalRequestsPerPayload: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxConsolidationRequestsPerPayload: Unsigned
        + Clone
        + Sync
        + Send
        + Debug
        + PartialEq
        + Eq;

    fn slots_per_epoch() -> u64 {
        Self::SlotsPerEpoch::to_u64()
    }

    fn slots_per_historical_root() -> usize {
        Self::SlotsPerHistoricalRoot::to_usize()
    }

    fn number_of_columns() -> usize {
        Self::NumberOfColumns::to_usize()
    }

    fn max_blob_commitments_per_block() -> usize {
        Self::MaxBlobCommitmentsPerBlock::to_usize()
    }

    fn bytes_per_blob() -> usize {
        Self::BytesPerBlob::to_usize()
    }

    fn bytes_per_cell() -> usize {
        Self::BytesPerCell::to_usize()
    }

    fn kzg_commitments_inclusion_proof_depth() -> usize {
        Self::KzgCommitmentsInclusionProofDepth::to_usize()
    }
}

/// The mainnet preset.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash)]
pub struct MainnetEthSpec;

impl EthSpec for MainnetEthSpec {
    type SlotsPerEpoch = U32;
    type SlotsPerHistoricalRoot = U8192;
    type MaxValidatorsPerCommittee = U2048;
    type MaxProposerSlashings = U16;
    type MaxAttesterSlashings = U2;
    type MaxAttestations = U128;
    type MaxDeposits = U16;
    type MaxVoluntaryExits = U16;
    type MaxBlsToExecutionChanges = U16;
    type SyncCommitteeSize = U512;
    type DepositContractTreeDepthPlusOne = U33;
    type MaxBlobCommitmentsPerBlock = U4096;
    type BytesPerBlob = U131072;
    type BytesPerCell = U2048;
    type NumberOfColumns = U128;
    type KzgCommitmentsInclusionProofDepth = U4;
    type MaxDepositRequestsPerPayload = U8192;
    type MaxWithdrawalRequestsPerPayload = U16;
    type MaxConsolidationRequestsPerPayload = U2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_preset_values() {
        assert_eq!(MainnetEthSpec::slots_per_epoch(), 32);
        assert_eq!(MainnetEthSpec::number_of_columns(), 128);
        assert_eq!(MainnetEthSpec::bytes_per_blob(), 131_072);
        assert_eq!(MainnetEthSpec::kzg_commitments_inclusion_proof_depth(), 4);
    }
}
