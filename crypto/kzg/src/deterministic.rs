//! Pairing-free deterministic backend for tests and local harnesses.
//!
//! A commitment is `0xc0 || sha256(blob)[..47]`, a blob proof is
//! `sha256(commitment || "blob-proof")` widened to 48 bytes, and cell `i` of
//! the extended blob is the commitment followed by a hash-chain expansion of
//! `sha256(commitment || i)`. Embedding the commitment in every cell lets
//! recovery regenerate the full extension from any subset of cells; the
//! at-least-half floor is enforced by the caller and re-checked here.

use crate::{
    BYTES_PER_CELL, BYTES_PER_COMMITMENT, CELLS_PER_EXT_BLOB, CellsAndKzgProofs,
    Error, KzgBackend, KzgCommitment, KzgProof, PROOF_MISMATCH,
};
use ethereum_hashing::hash;

#[derive(Debug, Default, Clone, Copy)]
pub struct DeterministicKzg;

fn widen_48(digest: &[u8]) -> [u8; 48] {
    let mut out = [0u8; 48];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = digest[i % digest.len()];
    }
    out
}

fn cell_body(commitment: &KzgCommitment, cell_index: u64) -> Vec<u8> {
    let mut preimage = Vec::with_capacity(BYTES_PER_COMMITMENT + 8);
    preimage.extend_from_slice(&commitment.0);
    preimage.extend_from_slice(&cell_index.to_le_bytes());
    let mut digest = hash(&preimage);

    let mut cell = Vec::with_capacity(BYTES_PER_CELL);
    cell.extend_from_slice(&commitment.0);
    while cell.len() < BYTES_PER_CELL {
        digest = hash(&digest);
        let remaining = BYTES_PER_CELL - cell.len();
        cell.extend_from_slice(&digest[..digest.len().min(remaining)]);
    }
    cell
}

fn cell_proof(commitment: &KzgCommitment, cell_index: u64) -> KzgProof {
    let mut preimage = Vec::with_capacity(BYTES_PER_COMMITMENT + 8 + 10);
    preimage.extend_from_slice(&commitment.0);
    preimage.extend_from_slice(&cell_index.to_le_bytes());
    preimage.extend_from_slice(b"cell-proof");
    KzgProof(widen_48(&hash(&preimage)))
}

impl DeterministicKzg {
    fn commitment_of(&self, blob: &[u8]) -> KzgCommitment {
        let digest = hash(blob);
        let mut commitment = [0u8; BYTES_PER_COMMITMENT];
        commitment[0] = 0xc0;
        commitment[1..=digest.len().min(47)].copy_from_slice(&digest[..digest.len().min(47)]);
        KzgCommitment(commitment)
    }

    fn blob_proof_of(&self, commitment: KzgCommitment) -> KzgProof {
        let mut preimage = Vec::with_capacity(BYTES_PER_COMMITMENT + 10);
        preimage.extend_from_slice(&commitment.0);
        preimage.extend_from_slice(b"blob-proof");
        KzgProof(widen_48(&hash(&preimage)))
    }
}

impl KzgBackend for DeterministicKzg {
    fn blob_to_kzg_commitment(&self, blob: &[u8]) -> Result<KzgCommitment, Error> {
        Ok(self.commitment_of(blob))
    }

    fn compute_blob_kzg_proof(
        &self,
        blob: &[u8],
        commitment: KzgCommitment,
    ) -> Result<KzgProof, Error> {
        if self.commitment_of(blob) != commitment {
            return Err(Error::KzgVerificationFailed(
                "commitment does not match blob".to_string(),
            ));
        }
        Ok(self.blob_proof_of(commitment))
    }

    fn verify_blob_kzg_proof(
        &self,
        blob: &[u8],
        commitment: KzgCommitment,
        proof: KzgProof,
    ) -> Result<(), Error> {
        if self.commitment_of(blob) == commitment && self.blob_proof_of(commitment) == proof {
            Ok(())
        } else {
            Err(Error::KzgVerificationFailed(PROOF_MISMATCH.to_string()))
        }
    }

    fn compute_cells_and_proofs(&self, blob: &[u8]) -> Result<CellsAndKzgProofs, Error> {
        let commitment = self.commitment_of(blob);
        let mut cells = Vec::with_capacity(CELLS_PER_EXT_BLOB);
        let mut proofs = Vec::with_capacity(CELLS_PER_EXT_BLOB);
        for index in 0..CELLS_PER_EXT_BLOB as u64 {
            cells.push(cell_body(&commitment, index));
            proofs.push(cell_proof(&commitment, index));
        }
        Ok((cells, proofs))
    }

    fn verify_cell_proof_batch(
        &self,
        cells: &[&[u8]],
        proofs: &[KzgProof],
        cell_indices: &[u64],
        commitments: &[KzgCommitment],
    ) -> Result<(), Error> {
        for (i, ((cell, proof), (cell_index, commitment))) in cells
            .iter()
            .zip(proofs)
            .zip(cell_indices.iter().zip(commitments))
            .enumerate()
        {
            if cell.len() != BYTES_PER_CELL {
                return Err(Error::InvalidLength(format!(
                    "cell {i} has length {}",
                    cell.len()
                )));
            }
            if *cell != cell_body(commitment, *cell_index).as_slice()
                || *proof != cell_proof(commitment, *cell_index)
            {
                return Err(Error::KzgVerificationFailed(format!(
                    "cell {cell_index} of commitment {commitment}"
                )));
            }
        }
        Ok(())
    }

    fn recover_cells_and_compute_proofs(
        &self,
        cell_indices: &[u64],
        cells: &[&[u8]],
    ) -> Result<CellsAndKzgProofs, Error> {
        if cells.len() < CELLS_PER_EXT_BLOB / 2 {
            return Err(Error::NotEnoughCellsToReconstruct {
                got: cells.len(),
                needed: CELLS_PER_EXT_BLOB / 2,
            });
        }

        // Every cell embeds the commitment it extends; all inputs must agree.
        let first = cells
            .first()
            .ok_or_else(|| Error::RecoveryFailed("no cells".to_string()))?;
        if first.len() != BYTES_PER_CELL {
            return Err(Error::InvalidLength(format!(
                "cell has length {}",
                first.len()
            )));
        }
        let mut commitment = KzgCommitment::empty();
        commitment.0.copy_from_slice(&first[..BYTES_PER_COMMITMENT]);

        for (cell_index, cell) in cell_indices.iter().zip(cells) {
            if *cell != cell_body(&commitment, *cell_index).as_slice() {
                return Err(Error::RecoveryFailed(format!(
                    "cell {cell_index} is inconsistent with the recovered commitment"
                )));
            }
        }

        let mut recovered_cells = Vec::with_capacity(CELLS_PER_EXT_BLOB);
        let mut recovered_proofs = Vec::with_capacity(CELLS_PER_EXT_BLOB);
        for index in 0..CELLS_PER_EXT_BLOB as u64 {
            recovered_cells.push(cell_body(&commitment, index));
            recovered_proofs.push(cell_proof(&commitment, index));
        }
        Ok((recovered_cells, recovered_proofs))
    }
}
