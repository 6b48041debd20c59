use crate::beacon_block_body::BLOB_KZG_COMMITMENTS_INDEX;
use crate::{
    EthSpec, Hash256, KzgCommitments, SignedBeaconBlock,
    SignedBeaconBlockHeader, Slot,
};
use derivative::Derivative;
use kzg::{Kzg, KzgCommitment, KzgProof};
use merkle_proof::verify_merkle_proof;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::FixedVector;
use std::sync::Arc;
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

pub type Blob<E> = FixedVector<u8, <E as EthSpec>::BytesPerBlob>;
pub type BlobSidecarList<E> = Vec<Arc<BlobSidecar<E>>>;

/// Identity of one blob: `(block_root, index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct BlobIdentifier {
    pub block_root: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
}

/// A blob travelling alone on gossip, bound to its block by the signed
/// header plus an inclusion proof of the body's commitments list.
#[derive(
    Debug, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Derivative,
)]
#[derivative(PartialEq, Eq, Hash(bound = "E: EthSpec"))]
#[serde(bound = "E: EthSpec")]
pub struct BlobSidecar<E: EthSpec> {
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
    #[serde(with = "ssz_types::serde_utils::hex_fixed_vec")]
    pub blob: Blob<E>,
    pub kzg_commitment: KzgCommitment,
    pub kzg_proof: KzgProof,
    pub signed_block_header: SignedBeaconBlockHeader,
    /// All commitments of the block, so the sidecar's own commitment can be
    /// checked against `kzg_commitments[index]` under one list proof.
    pub kzg_commitments: KzgCommitments<E>,
    pub kzg_commitments_inclusion_proof:
        FixedVector<Hash256, E::KzgCommitmentsInclusionProofDepth>,
}

impl<E: EthSpec> BlobSidecar<E> {
    pub fn id(&self) -> BlobIdentifier {
        BlobIdentifier {
            block_root: self.block_root(),
            index: self.index,
        }
    }

    pub fn slot(&self) -> Slot {
        self.signed_block_header.message.slot
    }

    pub fn epoch(&self) -> crate::Epoch {
        self.slot().epoch(E::slots_per_epoch())
    }

    pub fn block_root(&self) -> Hash256 {
        self.signed_block_header.message.tree_hash_root()
    }

    pub fn block_parent_root(&self) -> Hash256 {
        self.signed_block_header.message.parent_root
    }

    pub fn block_proposer_index(&self) -> u64 {
        self.signed_block_header.message.proposer_index
    }

    /// Verifies the commitments-list inclusion merkle proof against the
    /// header's body root.
    pub fn verify_inclusion_proof(&self) -> bool {
        verify_merkle_proof(
            self.kzg_commitments.tree_hash_root(),
            &self.kzg_commitments_inclusion_proof,
            E::kzg_commitments_inclusion_proof_depth(),
            BLOB_KZG_COMMITMENTS_INDEX,
            self.signed_block_header.message.body_root,
        )
    }

    /// Build the sidecars for a block given its blobs.
    ///
    /// Test and publish-path helper; commitments and proofs come from `kzg`.
    pub fn build_sidecars(
        block: &SignedBeaconBlock<E>,
        blobs: Vec<Blob<E>>,
        kzg: &Kzg,
    ) -> Result<BlobSidecarList<E>, String> {
        let commitments = block
            .body()
            .blob_kzg_commitments_opt()
            .ok_or_else(|| "pre-Deneb block has no commitments".to_string())?;
        if commitments.len() != blobs.len() {
            return Err(format!(
                "blob count {} does not match commitment count {}",
                blobs.len(),
                commitments.len()
            ));
        }

        let inclusion_proof = block
            .clone()
            .into_message()
            .into_body()
            .kzg_commitments_merkle_proof()
            .map_err(|e| format!("{e:?}"))?;
        let signed_block_header = block.signed_block_header();

        blobs
            .into_iter()
            .enumerate()
            .map(|(index, blob)| {
                let kzg_commitment = *commitments
                    .get(index)
                    .ok_or_else(|| "commitment index out of bounds".to_string())?;
                let kzg_proof = kzg
                    .compute_blob_kzg_proof(&blob, kzg_commitment)
                    .map_err(|e| format!("{e:?}"))?;
                Ok(Arc::new(BlobSidecar {
                    index: index as u64,
                    blob,
                    kzg_commitment,
                    kzg_proof,
                    signed_block_header: signed_block_header.clone(),
                    kzg_commitments: commitments.clone(),
                    kzg_commitments_inclusion_proof: inclusion_proof.clone(),
                }))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BeaconBlock, ForkName, MainnetEthSpec, SignedBeaconBlock};
    use bls::SignatureBytes;
    use ssz_types::VariableList;

    type E = MainnetEthSpec;

    fn block_with_blobs(n: usize, kzg: &Kzg) -> (SignedBeaconBlock<E>, Vec<Blob<E>>) {
        let mut block = BeaconBlock::<E>::empty(ForkName::Deneb, Slot::new(1));
        let blobs = (0..n)
            .map(|i| {
                let mut bytes = vec![0u8; E::bytes_per_blob()];
                bytes[0] = i as u8 + 1;
                Blob::<E>::new(bytes).unwrap()
            })
            .collect::<Vec<_>>();
        let commitments = blobs
            .iter()
            .map(|blob| kzg.blob_to_kzg_commitment(blob).unwrap())
            .collect::<Vec<_>>();
        if let BeaconBlock::Deneb(ref mut inner) = block {
            inner.body.blob_kzg_commitments = VariableList::new(commitments).unwrap();
        }
        (
            SignedBeaconBlock::from_block(block, SignatureBytes::empty()),
            blobs,
        )
    }

    #[test]
    fn built_sidecars_verify_inclusion_and_identity() {
        let kzg = Kzg::new_deterministic();
        let (block, blobs) = block_with_blobs(2, &kzg);
        let sidecars = BlobSidecar::build_sidecars(&block, blobs, &kzg).unwrap();

        assert_eq!(sidecars.len(), 2);
        for (i, sidecar) in sidecars.iter().enumerate() {
            assert_eq!(sidecar.index, i as u64);
            assert_eq!(sidecar.block_root(), block.canonical_root());
            assert!(sidecar.verify_inclusion_proof(), "sidecar {i}");
            kzg.verify_blob_kzg_proof(&sidecar.blob, sidecar.kzg_commitment, sidecar.kzg_proof)
                .unwrap();
        }
    }

    #[test]
    fn tampered_inclusion_proof_fails() {
        let kzg = Kzg::new_deterministic();
        let (block, blobs) = block_with_blobs(1, &kzg);
        let sidecars = BlobSidecar::build_sidecars(&block, blobs, &kzg).unwrap();

        let mut bad = (*sidecars[0]).clone();
        bad.signed_block_header.message.body_root = Hash256::default();
        assert!(!bad.verify_inclusion_proof());
    }
}
