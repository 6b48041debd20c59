use crate::beacon_state::BeaconStateError as Error;
use crate::{
    BeaconBlock, BeaconBlockBase, BeaconBlockBodyRef, BeaconBlockDeneb, BeaconBlockElectra,
    BeaconBlockHeader, BeaconBlockRef, ChainSpec, Epoch, EthSpec, ForkName, Hash256,
    SignedBeaconBlockHeader, Slot,
};
use bls::SignatureBytes;
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use ssz::Decode;
use ssz_derive::{Decode, Encode};
use superstruct::superstruct;
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

/// A signed beacon block.
///
/// The variants mirror [`BeaconBlock`]; the signature covers the message's
/// hash-tree-root under the proposer domain.
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
pub struct SignedBeaconBlock<E: EthSpec> {
    #[superstruct(only(Base), partial_getter(rename = "message_base"))]
    pub message: BeaconBlockBase<E>,
    #[superstruct(only(Deneb), partial_getter(rename = "message_deneb"))]
    pub message: BeaconBlockDeneb<E>,
    #[superstruct(only(Electra), partial_getter(rename = "message_electra"))]
    pub message: BeaconBlockElectra<E>,
    pub signature: SignatureBytes,
}

impl<E: EthSpec> SignedBeaconBlock<E> {
    pub fn from_block(block: BeaconBlock<E>, signature: SignatureBytes) -> Self {
        match block {
            BeaconBlock::Base(message) => SignedBeaconBlock::Base(SignedBeaconBlockBase {
                message,
                signature,
            }),
            BeaconBlock::Deneb(message) => SignedBeaconBlock::Deneb(SignedBeaconBlockDeneb {
                message,
                signature,
            }),
            BeaconBlock::Electra(message) => {
                SignedBeaconBlock::Electra(SignedBeaconBlockElectra { message, signature })
            }
        }
    }

    /// SSZ decode with the fork known from context.
    pub fn from_ssz_bytes_by_fork(
        bytes: &[u8],
        fork_name: ForkName,
    ) -> Result<Self, ssz::DecodeError> {
        match BeaconBlock::<E>::body_variant_for_fork(fork_name) {
            ForkName::Electra => {
                SignedBeaconBlockElectra::from_ssz_bytes(bytes).map(Self::Electra)
            }
            ForkName::Deneb => SignedBeaconBlockDeneb::from_ssz_bytes(bytes).map(Self::Deneb),
            _ => SignedBeaconBlockBase::from_ssz_bytes(bytes).map(Self::Base),
        }
    }

    pub fn message(&self) -> BeaconBlockRef<'_, E> {
        match self {
            SignedBeaconBlock::Base(block) => BeaconBlockRef::Base(&block.message),
            SignedBeaconBlock::Deneb(block) => BeaconBlockRef::Deneb(&block.message),
            SignedBeaconBlock::Electra(block) => BeaconBlockRef::Electra(&block.message),
        }
    }

    pub fn into_message(self) -> BeaconBlock<E> {
        match self {
            SignedBeaconBlock::Base(block) => BeaconBlock::Base(block.message),
            SignedBeaconBlock::Deneb(block) => BeaconBlock::Deneb(block.message),
            SignedBeaconBlock::Electra(block) => BeaconBlock::Electra(block.message),
        }
    }

    pub fn body(&self) -> BeaconBlockBodyRef<'_, E> {
        match self {
            SignedBeaconBlock::Base(block) => BeaconBlockBodyRef::Base(&block.message.body),
            SignedBeaconBlock::Deneb(block) => BeaconBlockBodyRef::Deneb(&block.message.body),
            SignedBeaconBlock::Electra(block) => {
                BeaconBlockBodyRef::Electra(&block.message.body)
            }
        }
    }

    pub fn slot(&self) -> Slot {
        match self {
            SignedBeaconBlock::Base(block) => block.message.slot,
            SignedBeaconBlock::Deneb(block) => block.message.slot,
            SignedBeaconBlock::Electra(block) => block.message.slot,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.slot().epoch(E::slots_per_epoch())
    }

    pub fn proposer_index(&self) -> u64 {
        match self {
            SignedBeaconBlock::Base(block) => block.message.proposer_index,
            SignedBeaconBlock::Deneb(block) => block.message.proposer_index,
            SignedBeaconBlock::Electra(block) => block.message.proposer_index,
        }
    }

    pub fn parent_root(&self) -> Hash256 {
        match self {
            SignedBeaconBlock::Base(block) => block.message.parent_root,
            SignedBeaconBlock::Deneb(block) => block.message.parent_root,
            SignedBeaconBlock::Electra(block) => block.message.parent_root,
        }
    }

    pub fn state_root(&self) -> Hash256 {
        match self {
            SignedBeaconBlock::Base(block) => block.message.state_root,
            SignedBeaconBlock::Deneb(block) => block.message.state_root,
            SignedBeaconBlock::Electra(block) => block.message.state_root,
        }
    }

    /// The root of the *message*, i.e. the block root used as identity.
    pub fn canonical_root(&self) -> Hash256 {
        match self {
            SignedBeaconBlock::Base(block) => block.message.tree_hash_root(),
            SignedBeaconBlock::Deneb(block) => block.message.tree_hash_root(),
            SignedBeaconBlock::Electra(block) => block.message.tree_hash_root(),
        }
    }

    pub fn block_header(&self) -> BeaconBlockHeader {
        match self {
            SignedBeaconBlock::Base(block) => {
                BeaconBlock::Base(block.message.clone()).block_header()
            }
            SignedBeaconBlock::Deneb(block) => {
                BeaconBlock::Deneb(block.message.clone()).block_header()
            }
            SignedBeaconBlock::Electra(block) => {
                BeaconBlock::Electra(block.message.clone()).block_header()
            }
        }
    }

    pub fn signed_block_header(&self) -> SignedBeaconBlockHeader {
        SignedBeaconBlockHeader {
            message: self.block_header(),
            signature: self.signature().clone(),
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
    fn canonical_root_ignores_signature() {
        let block = BeaconBlock::<E>::empty(ForkName::Deneb, Slot::new(1));
        let signed_a = SignedBeaconBlock::from_block(block.clone(), SignatureBytes::empty());
        let mut signature = SignatureBytes::empty();
        signature.0[0] = 0xff;
        let signed_b = SignedBeaconBlock::from_block(block, signature);

        assert_eq!(signed_a.canonical_root(), signed_b.canonical_root());
    }

    #[test]
    fn signed_header_matches_block() {
        let block = BeaconBlock::<E>::empty(ForkName::Electra, Slot::new(77));
        let root = block.canonical_root();
        let signed = SignedBeaconBlock::from_block(block, SignatureBytes::empty());
        assert_eq!(signed.signed_block_header().message.canonical_root(), root);
        assert_eq!(signed.canonical_root(), root);
    }
}
