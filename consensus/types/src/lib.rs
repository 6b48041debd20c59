//! Consensus-layer types for the block-ingestion core.
//!
//! Fork-variant containers use `superstruct`; wire encoding is SSZ via
//! `ethereum_ssz`, hashing via `tree_hash`. Decoding an object whose shape
//! depends on the fork goes through `from_ssz_bytes_by_fork` at the boundary;
//! inside the core, code branches on [`ForkName`] ordinals or dispatches
//! through the variant enums.

pub mod attestation;
pub mod attester_slashing;
pub mod beacon_block;
pub mod beacon_block_body;
pub mod beacon_block_header;
pub mod beacon_state;
pub mod blob_sidecar;
pub mod bls_to_execution_change;
pub mod chain_spec;
pub mod checkpoint;
pub mod data_column_custody_group;
pub mod data_column_sidecar;
pub mod deposit;
pub mod eth1_data;
pub mod eth_spec;
pub mod execution_block_hash;
pub mod execution_payload;
pub mod execution_payload_bid;
pub mod execution_requests;
pub mod fork_name;
pub mod proposer_slashing;
pub mod signed_beacon_block;
pub mod signing_data;
pub mod slot_epoch;
pub mod sync_aggregate;
pub mod validator;
pub mod voluntary_exit;

pub use attestation::{Attestation, AttestationData, IndexedAttestation};
pub use attester_slashing::AttesterSlashing;
pub use beacon_block::{
    BeaconBlock, BeaconBlockBase, BeaconBlockDeneb, BeaconBlockElectra, BeaconBlockRef,
};
pub use beacon_block_body::{
    BLOB_KZG_COMMITMENTS_INDEX, BeaconBlockBody, BeaconBlockBodyBase, BeaconBlockBodyDeneb,
    BeaconBlockBodyElectra, BeaconBlockBodyRef, KzgCommitments,
};
pub use beacon_block_header::{BeaconBlockHeader, SignedBeaconBlockHeader};
pub use beacon_state::{BeaconState, BeaconStateError, Validator};
pub use blob_sidecar::{Blob, BlobIdentifier, BlobSidecar, BlobSidecarList};
pub use bls_to_execution_change::{BlsToExecutionChange, SignedBlsToExecutionChange};
pub use chain_spec::ChainSpec;
pub use checkpoint::Checkpoint;
pub use data_column_sidecar::{
    Cell, ColumnIndex, DataColumn, DataColumnIdentifier, DataColumnSidecar, DataColumnSidecarList,
};
pub use deposit::{Deposit, DepositData};
pub use eth1_data::Eth1Data;
pub use eth_spec::{EthSpec, MainnetEthSpec};
pub use execution_block_hash::ExecutionBlockHash;
pub use execution_payload::ExecutionPayload;
pub use execution_payload_bid::{ExecutionPayloadBid, SignedExecutionPayloadBid};
pub use execution_requests::{
    ConsolidationRequest, DepositRequest, ExecutionRequests, WithdrawalRequest,
};
pub use fork_name::ForkName;
pub use proposer_slashing::ProposerSlashing;
pub use signed_beacon_block::{
    SignedBeaconBlock, SignedBeaconBlockBase, SignedBeaconBlockDeneb, SignedBeaconBlockElectra,
};
pub use signing_data::{Domain, SigningData, compute_signing_root};
pub use slot_epoch::{Epoch, Slot};
pub use sync_aggregate::SyncAggregate;
pub use voluntary_exit::{SignedVoluntaryExit, VoluntaryExit};

pub use fixed_bytes::{FixedBytesExtended, Hash256};

/// A 32-byte graffiti field; contents are opaque to the core.
pub type Graffiti = Hash256;

/// 20-byte execution-layer address.
pub type ExecutionAddress = ssz_types::FixedVector<u8, ssz_types::typenum::U20>;
