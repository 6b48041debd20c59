use crate::beacon_state::BeaconStateError as Error;
use crate::{
    BeaconBlockBody, BeaconBlockBodyBase, BeaconBlockBodyDeneb, BeaconBlockBodyElectra,
    BeaconBlockBodyRef, BeaconBlockHeader, ChainSpec, Epoch, EthSpec, Eth1Data, ExecutionPayload,
    ForkName, Graffiti, Hash256, Slot, SyncAggregate,
};
use bls::SignatureBytes;
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use ssz::Decode;
use ssz_derive::{Decode, Encode};
use ssz_types::VariableList;
use superstruct::superstruct;
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

/// An unsigned beacon block, fork-variant over its body shape.
#[superstruct(
    variants(Base, Deneb, Electra),
    variant_attributes(
        derive(
            Debug,
            Clone,
            Serialize,
            Deserialize,
            Encode,
            Decode,
            TreeHash,
            Derivative,
        ),
        derivative(PartialEq, Eq, Hash(bound = "E: EthSpec")),
        serde(bound = "E: EthSpec", deny_unknown_fields),
    ),
    ref_attributes(derive(Debug)),
    cast_error(ty = "Error", expr = "Error::IncorrectStateVariant"),
    partial_getter_error(ty = "Error", expr = "Error::IncorrectStateVariant")
)]
#[derive(Debug, Clone, Serialize, Deserialize, Encode, TreeHash, Derivative)]
#[derivative(PartialEq, Eq, Hash(bound = "E: EthSpec"))]
#[serde(bound = "E: EthSpec", untagged)]
#[tree_hash(enum_behaviour = "transparent")]
#[ssz(enum_behaviour = "transparent")]
pub struct BeaconBlock<E: EthSpec> {
    #[superstruct(getter(copy))]
    pub slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    #[superstruct(getter(copy))]
    pub proposer_index: u64,
    #[superstruct(getter(copy))]
    pub parent_root: Hash256,
    #[superstruct(getter(copy))]
    pub state_root: Hash256,
    #[superstruct(only(Base), partial_getter(rename = "body_base"))]
    pub body: BeaconBlockBodyBase<E>,
    #[superstruct(only(Deneb), partial_getter(rename = "body_deneb"))]
    pub body: BeaconBlockBodyDeneb<E>,
    #[superstruct(only(Electra), partial_getter(rename = "body_electra"))]
    pub body: BeaconBlockBodyElectra<E>,
}

impl<'a, E: EthSpec> BeaconBlockRef<'a, E> {
    pub fn body(&self) -> BeaconBlockBodyRef<'a, E> {
        match self {
            BeaconBlockRef::Base(block) => BeaconBlockBodyRef::Base(&block.body),
            BeaconBlockRef::Deneb(block) => BeaconBlockBodyRef::Deneb(&block.body),
            BeaconBlockRef::Electra(block) => BeaconBlockBodyRef::Electra(&block.body),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.slot().epoch(E::slots_per_epoch())
    }

    pub fn num_expected_blobs(&self) -> usize {
        self.body()
            .blob_kzg_commitments_opt()
            .map(|commitments| commitments.len())
            .unwrap_or(0)
    }
}

impl<E: EthSpec> BeaconBlock<E> {
    /// The body variant a block at `fork_name` uses.
    pub fn body_variant_for_fork(fork_name: ForkName) -> ForkName {
        if fork_name.electra_enabled() {
            ForkName::Electra
        } else if fork_name.deneb_enabled() {
            ForkName::Deneb
        } else {
            ForkName::Phase0
        }
    }

    /// An empty block in the shape required by `fork_name`.
    pub fn empty(fork_name: ForkName, slot: Slot) -> Self {
        let base_body = || BeaconBlockBodyBase {
            randao_reveal: SignatureBytes::empty(),
            eth1_data: Eth1Data::default(),
            graffiti: Graffiti::default(),
            proposer_slashings: VariableList::empty(),
            attester_slashings: VariableList::empty(),
            attestations: VariableList::empty(),
            deposits: VariableList::empty(),
            voluntary_exits: VariableList::empty(),
            sync_aggregate: SyncAggregate::empty(),
            execution_payload: ExecutionPayload::default(),
            bls_to_execution_changes: VariableList::empty(),
        };

        if fork_name.electra_enabled() {
            let base = base_body();
            BeaconBlock::Electra(BeaconBlockElectra {
                slot,
                proposer_index: 0,
                parent_root: Hash256::default(),
                state_root: Hash256::default(),
                body: BeaconBlockBodyElectra {
                    randao_reveal: base.randao_reveal,
                    eth1_data: base.eth1_data,
                    graffiti: base.graffiti,
                    proposer_slashings: base.proposer_slashings,
                    attester_slashings: base.attester_slashings,
                    attestations: base.attestations,
                    deposits: base.deposits,
                    voluntary_exits: base.voluntary_exits,
                    sync_aggregate: base.sync_aggregate,
                    execution_payload: base.execution_payload,
                    bls_to_execution_changes: base.bls_to_execution_changes,
                    blob_kzg_commitments: VariableList::empty(),
                    execution_requests: Default::default(),
                },
            })
        } else if fork_name.deneb_enabled() {
            let base = base_body();
            BeaconBlock::Deneb(BeaconBlockDeneb {
                slot,
                proposer_index: 0,
                parent_root: Hash256::default(),
                state_root: Hash256::default(),
                body: BeaconBlockBodyDeneb {
                    randao_reveal: base.randao_reveal,
                    eth1_data: base.eth1_data,
                    graffiti: base.graffiti,
                    proposer_slashings: base.proposer_slashings,
                    attester_slashings: base.attester_slashings,
                    attestations: base.attestations,
                    deposits: base.deposits,
                    voluntary_exits: base.voluntary_exits,
                    sync_aggregate: base.sync_aggregate,
                    execution_payload: base.execution_payload,
                    bls_to_execution_changes: base.bls_to_execution_changes,
                    blob_kzg_commitments: VariableList::empty(),
                },
            })
        } else {
            BeaconBlock::Base(BeaconBlockBase {
                slot,
                proposer_index: 0,
                parent_root: Hash256::default(),
                state_root: Hash256::default(),
                body: base_body(),
            })
        }
    }

    /// SSZ decode with the fork known from context.
    pub fn from_ssz_bytes_by_fork(
        bytes: &[u8],
        fork_name: ForkName,
    ) -> Result<Self, ssz::DecodeError> {
        match Self::body_variant_for_fork(fork_name) {
            ForkName::Electra => BeaconBlockElectra::from_ssz_bytes(bytes).map(Self::Electra),
            ForkName::Deneb => BeaconBlockDeneb::from_ssz_bytes(bytes).map(Self::Deneb),
            _ => BeaconBlockBase::from_ssz_bytes(bytes).map(Self::Base),
        }
    }

    pub fn body(&self) -> BeaconBlockBodyRef<'_, E> {
        match self {
            BeaconBlock::Base(block) => BeaconBlockBodyRef::Base(&block.body),
            BeaconBlock::Deneb(block) => BeaconBlockBodyRef::Deneb(&block.body),
            BeaconBlock::Electra(block) => BeaconBlockBodyRef::Electra(&block.body),
        }
    }

    pub fn into_body(self) -> BeaconBlockBody<E> {
        match self {
            BeaconBlock::Base(block) => BeaconBlockBody::Base(block.body),
            BeaconBlock::Deneb(block) => BeaconBlockBody::Deneb(block.body),
            BeaconBlock::Electra(block) => BeaconBlockBody::Electra(block.body),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.slot().epoch(E::slots_per_epoch())
    }

    /// The hash-tree-root of the block: its identity everywhere in the core.
    pub fn canonical_root(&self) -> Hash256 {
        self.tree_hash_root()
    }

    pub fn body_root(&self) -> Hash256 {
        match self {
            BeaconBlock::Base(block) => block.body.tree_hash_root(),
            BeaconBlock::Deneb(block) => block.body.tree_hash_root(),
            BeaconBlock::Electra(block) => block.body.tree_hash_root(),
        }
    }

    pub fn block_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot(),
            proposer_index: self.proposer_index(),
            parent_root: self.parent_root(),
            state_root: self.state_root(),
            body_root: self.body_root(),
        }
    }

    pub fn fork_name(&self, spec: &ChainSpec) -> ForkName {
        spec.fork_name_at_slot::<E>(self.slot())
    }

    pub fn num_expected_blobs(&self) -> usize {
        self.body()
            .blob_kzg_commitments_opt()
            .map(|commitments| commitments.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MainnetEthSpec;

    type E = MainnetEthSpec;

    #[test]
    fn empty_block_variant_tracks_fork() {
        for (fork, is_deneb, is_electra) in [
            (ForkName::Phase0, false, false),
            (ForkName::Capella, false, false),
            (ForkName::Deneb, true, false),
            (ForkName::Electra, true, true),
            (ForkName::Fulu, true, true),
            (ForkName::Gloas, true, true),
        ] {
            let block = BeaconBlock::<E>::empty(fork, Slot::new(3));
            assert_eq!(
                block.body().blob_kzg_commitments_opt().is_some(),
                is_deneb,
                "{fork}"
            );
            assert_eq!(
                block.body().execution_requests_opt().is_some(),
                is_electra,
                "{fork}"
            );
            assert_eq!(block.slot(), Slot::new(3));
        }
    }

    #[test]
    fn ssz_round_trip_by_fork() {
        use ssz::Encode;
        for fork in [ForkName::Capella, ForkName::Deneb, ForkName::Electra] {
            let block = BeaconBlock::<E>::empty(fork, Slot::new(9));
            let bytes = block.as_ssz_bytes();
            let decoded = BeaconBlock::<E>::from_ssz_bytes_by_fork(&bytes, fork).unwrap();
            assert_eq!(decoded, block);
        }
    }

    #[test]
    fn header_root_matches_block_root() {
        let block = BeaconBlock::<E>::empty(ForkName::Deneb, Slot::new(5));
        assert_eq!(block.block_header().canonical_root(), block.canonical_root());
    }
}
