use crate::beacon_block_body::BLOB_KZG_COMMITMENTS_INDEX;
use crate::{
    ChainSpec, Epoch, EthSpec, Hash256, KzgCommitments, SignedBeaconBlock,
    SignedBeaconBlockHeader, Slot,
};
use derivative::Derivative;
use kzg::{Kzg, KzgProof};
use merkle_proof::verify_merkle_proof;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{FixedVector, VariableList};
use std::sync::Arc;
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

pub type ColumnIndex = u64;
pub type Cell<E> = FixedVector<u8, <E as EthSpec>::BytesPerCell>;
pub type DataColumn<E> = VariableList<Cell<E>, <E as EthSpec>::MaxBlobCommitmentsPerBlock>;
pub type DataColumnSidecarList<E> = Vec<Arc<DataColumnSidecar<E>>>;

/// Identity of one column: `(block_root, index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct DataColumnIdentifier {
    pub block_root: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: ColumnIndex,
}

/// One column of the erasure-extended blob matrix: cell `index` of every
/// blob in the block, with the cell proofs and the commitments-list
/// inclusion proof binding it to the block body.
#[derive(
    Debug, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Derivative,
)]
#[derivative(PartialEq, Eq, Hash(bound = "E: EthSpec"))]
#[serde(bound = "E: EthSpec")]
pub struct DataColumnSidecar<E: EthSpec> {
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: ColumnIndex,
    #[serde(with = "ssz_types::serde_utils::list_of_hex_fixed_vec")]
    pub column: DataColumn<E>,
    /// All the KZG commitments of the block, used for verifying sample cells.
    pub kzg_commitments: KzgCommitments<E>,
    pub kzg_proofs: VariableList<KzgProof, E::MaxBlobCommitmentsPerBlock>,
    pub signed_block_header: SignedBeaconBlockHeader,
    pub kzg_commitments_inclusion_proof:
        FixedVector<Hash256, E::KzgCommitmentsInclusionProofDepth>,
}

impl<E: EthSpec> DataColumnSidecar<E> {
    pub fn id(&self) -> DataColumnIdentifier {
        DataColumnIdentifier {
            block_root: self.block_root(),
            index: self.index,
        }
    }

    pub fn slot(&self) -> Slot {
        self.signed_block_header.message.slot
    }

    pub fn epoch(&self) -> Epoch {
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

    /// The gossip subnet this column travels on.
    pub fn subnet_id(&self, spec: &ChainSpec) -> u64 {
        spec.data_column_sidecar_subnet_id(self.index)
    }

    /// Verifies the kzg commitments inclusion merkle proof.
    pub fn verify_inclusion_proof(&self) -> bool {
        verify_merkle_proof(
            self.kzg_commitments.tree_hash_root(),
            &self.kzg_commitments_inclusion_proof,
            E::kzg_commitments_inclusion_proof_depth(),
            BLOB_KZG_COMMITMENTS_INDEX,
            self.signed_block_header.message.body_root,
        )
    }

    /// Build all `NUMBER_OF_COLUMNS` sidecars of a block from its blobs.
    pub fn build_sidecars(
        block: &SignedBeaconBlock<E>,
        blobs: &[Vec<u8>],
        kzg: &Kzg,
    ) -> Result<DataColumnSidecarList<E>, String> {
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

        // One row of cells and proofs per blob.
        let mut rows = Vec::with_capacity(blobs.len());
        for blob in blobs {
            rows.push(
                kzg.compute_cells_and_proofs(blob)
                    .map_err(|e| format!("{e:?}"))?,
            );
        }

        let number_of_columns = E::number_of_columns();
        let mut sidecars = Vec::with_capacity(number_of_columns);
        for column_index in 0..number_of_columns {
            let mut column = Vec::with_capacity(rows.len());
            let mut proofs = Vec::with_capacity(rows.len());
            for (cells, cell_proofs) in &rows {
                let cell = cells
                    .get(column_index)
                    .ok_or_else(|| "missing cell".to_string())?;
                column.push(Cell::<E>::new(cell.clone()).map_err(|e| format!("{e:?}"))?);
                proofs.push(
                    *cell_proofs
                        .get(column_index)
                        .ok_or_else(|| "missing cell proof".to_string())?,
                );
            }
            sidecars.push(Arc::new(DataColumnSidecar {
                index: column_index as u64,
                column: DataColumn::<E>::new(column).map_err(|e| format!("{e:?}"))?,
                kzg_commitments: commitments.clone(),
                kzg_proofs: VariableList::new(proofs).map_err(|e| format!("{e:?}"))?,
                signed_block_header: signed_block_header.clone(),
                kzg_commitments_inclusion_proof: inclusion_proof.clone(),
            }));
        }
        Ok(sidecars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BeaconBlock, ForkName, MainnetEthSpec};
    use bls::SignatureBytes;

    type E = MainnetEthSpec;

    fn fulu_block_with_blobs(n: usize, kzg: &Kzg) -> (SignedBeaconBlock<E>, Vec<Vec<u8>>) {
        let mut block = BeaconBlock::<E>::empty(ForkName::Fulu, Slot::new(1));
        let blobs = (0..n).map(|i| vec![i as u8 + 1; 64]).collect::<Vec<_>>();
        let commitments = blobs
            .iter()
            .map(|blob| kzg.blob_to_kzg_commitment(blob).unwrap())
            .collect::<Vec<_>>();
        if let BeaconBlock::Electra(ref mut inner) = block {
            inner.body.blob_kzg_commitments = VariableList::new(commitments).unwrap();
        }
        (
            SignedBeaconBlock::from_block(block, SignatureBytes::empty()),
            blobs,
        )
    }

    #[test]
    fn built_columns_verify() {
        let kzg = Kzg::new_deterministic();
        let spec = ChainSpec::genesis_spec(ForkName::Fulu);
        let (block, blobs) = fulu_block_with_blobs(2, &kzg);
        let sidecars = DataColumnSidecar::build_sidecars(&block, &blobs, &kzg).unwrap();

        assert_eq!(sidecars.len(), E::number_of_columns());
        let sample = &sidecars[17];
        assert_eq!(sample.index, 17);
        assert_eq!(sample.column.len(), 2);
        assert_eq!(sample.kzg_commitments.len(), 2);
        assert_eq!(sample.kzg_proofs.len(), 2);
        assert_eq!(sample.block_root(), block.canonical_root());
        assert!(sample.verify_inclusion_proof());
        assert_eq!(
            sample.subnet_id(&spec),
            17 % spec.data_column_sidecar_subnet_count
        );
    }

    #[test]
    fn subnet_mapping_is_modular() {
        let spec = ChainSpec::genesis_spec(ForkName::Fulu);
        for index in 0..spec.number_of_columns {
            assert_eq!(
                spec.data_column_sidecar_subnet_id(index),
                index % spec.data_column_sidecar_subnet_count
            );
        }
    }
}
