use crate::{CellsAndKzgProofs, Error, KzgCommitment, KzgProof};

/// Label used by backends when a batch fails without attribution.
pub const PROOF_MISMATCH: &str = "proof did not verify";

/// The polynomial-commitment collaborator contract.
///
/// Implementations must guarantee that every batch function returns the same
/// verdict as applying the corresponding single-item function to each item:
/// batching is a throughput optimisation, never a semantic change.
pub trait KzgBackend: Send + Sync {
    fn blob_to_kzg_commitment(&self, blob: &[u8]) -> Result<KzgCommitment, Error>;

    fn compute_blob_kzg_proof(
        &self,
        blob: &[u8],
        commitment: KzgCommitment,
    ) -> Result<KzgProof, Error>;

    fn verify_blob_kzg_proof(
        &self,
        blob: &[u8],
        commitment: KzgCommitment,
        proof: KzgProof,
    ) -> Result<(), Error>;

    fn verify_blob_kzg_proof_batch(
        &self,
        blobs: &[&[u8]],
        commitments: &[KzgCommitment],
        proofs: &[KzgProof],
    ) -> Result<(), Error> {
        for ((blob, commitment), proof) in blobs.iter().zip(commitments).zip(proofs) {
            self.verify_blob_kzg_proof(blob, *commitment, *proof)?;
        }
        Ok(())
    }

    fn compute_cells_and_proofs(&self, blob: &[u8]) -> Result<CellsAndKzgProofs, Error>;

    fn verify_cell_proof_batch(
        &self,
        cells: &[&[u8]],
        proofs: &[KzgProof],
        cell_indices: &[u64],
        commitments: &[KzgCommitment],
    ) -> Result<(), Error>;

    /// Callers have already checked that at least half the cells are present.
    fn recover_cells_and_compute_proofs(
        &self,
        cell_indices: &[u64],
        cells: &[&[u8]],
    ) -> Result<CellsAndKzgProofs, Error>;
}
