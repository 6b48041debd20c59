//! KZG polynomial-commitment types and the verification facade.
//!
//! The polynomial-commitment library is a collaborator. This crate owns the
//! byte-level types (`KzgCommitment`, `KzgProof`) and the [`Kzg`] facade the
//! ingestion core calls into; the maths lives behind [`KzgBackend`]. The
//! [`deterministic`] backend gives tests a pairing-free implementation whose
//! batch verdicts match per-item verdicts exactly.

mod trusted_setup;

pub mod deterministic;

pub use trusted_setup::{KzgBackend, PROOF_MISMATCH};

use fixed_bytes::Hash256;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tree_hash::{PackedEncoding, TreeHash, TreeHashType, merkle_root};

pub const BYTES_PER_COMMITMENT: usize = 48;
pub const BYTES_PER_PROOF: usize = 48;
pub const BYTES_PER_FIELD_ELEMENT: usize = 32;
pub const FIELD_ELEMENTS_PER_BLOB: usize = 4096;
pub const BYTES_PER_BLOB: usize = FIELD_ELEMENTS_PER_BLOB * BYTES_PER_FIELD_ELEMENT;
pub const BYTES_PER_CELL: usize = 2048;
/// Cells in the extended (erasure-coded) blob. Twice the original data.
pub const CELLS_PER_EXT_BLOB: usize = 128;

macro_rules! kzg_type {
    ($name: ident, $len: expr, $doc: literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub fn empty() -> Self {
                Self([0; $len])
            }

            pub fn to_fixed_bytes(self) -> [u8; $len] {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let stripped = s
                    .strip_prefix("0x")
                    .ok_or_else(|| "must start with 0x".to_string())?;
                let bytes = hex::decode(stripped).map_err(|e| e.to_string())?;
                if bytes.len() != $len {
                    return Err(format!("wrong byte length: {}", bytes.len()));
                }
                let mut array = [0; $len];
                array.copy_from_slice(&bytes);
                Ok(Self(array))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let string = String::deserialize(deserializer)?;
                Self::from_str(&string).map_err(D::Error::custom)
            }
        }

        impl ssz::Encode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn ssz_bytes_len(&self) -> usize {
                $len
            }

            fn ssz_append(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.0)
            }
        }

        impl ssz::Decode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, ssz::DecodeError> {
                if bytes.len() != $len {
                    return Err(ssz::DecodeError::InvalidByteLength {
                        len: bytes.len(),
                        expected: $len,
                    });
                }
                let mut array = [0; $len];
                array.copy_from_slice(bytes);
                Ok(Self(array))
            }
        }

        impl TreeHash for $name {
            fn tree_hash_type() -> TreeHashType {
                TreeHashType::Vector
            }

            fn tree_hash_packed_encoding(&self) -> PackedEncoding {
                unreachable!("Vector should never be packed.")
            }

            fn tree_hash_packing_factor() -> usize {
                unreachable!("Vector should never be packed.")
            }

            fn tree_hash_root(&self) -> Hash256 {
                merkle_root(&self.0, 0)
            }
        }
    };
}

kzg_type!(
    KzgCommitment,
    BYTES_PER_COMMITMENT,
    "A KZG commitment to a blob of data."
);
kzg_type!(
    KzgProof,
    BYTES_PER_PROOF,
    "A KZG proof, either for a whole blob or a single cell."
);

/// The cells of one extended blob, with their per-cell proofs.
pub type CellsAndKzgProofs = (Vec<Vec<u8>>, Vec<KzgProof>);

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A proof failed verification. Carries a label locating the bad item
    /// when the backend can attribute it.
    KzgVerificationFailed(String),
    /// An input had the wrong length for its type.
    InvalidLength(String),
    /// Not enough cells to run erasure recovery.
    NotEnoughCellsToReconstruct { got: usize, needed: usize },
    /// Cell recovery failed despite sufficient input.
    RecoveryFailed(String),
    /// Mismatched lengths between parallel input lists.
    InconsistentArrayLength(String),
}

/// Facade over the commitment backend. Cheap to clone, shared via `Arc`.
#[derive(Clone)]
pub struct Kzg {
    backend: Arc<dyn KzgBackend>,
}

impl fmt::Debug for Kzg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kzg").finish_non_exhaustive()
    }
}

impl Kzg {
    pub fn new(backend: Arc<dyn KzgBackend>) -> Self {
        Self { backend }
    }

    /// A `Kzg` backed by the deterministic test backend.
    pub fn new_deterministic() -> Self {
        Self::new(Arc::new(deterministic::DeterministicKzg))
    }

    pub fn blob_to_kzg_commitment(&self, blob: &[u8]) -> Result<KzgCommitment, Error> {
        self.backend.blob_to_kzg_commitment(blob)
    }

    pub fn compute_blob_kzg_proof(
        &self,
        blob: &[u8],
        commitment: KzgCommitment,
    ) -> Result<KzgProof, Error> {
        self.backend.compute_blob_kzg_proof(blob, commitment)
    }

    pub fn verify_blob_kzg_proof(
        &self,
        blob: &[u8],
        commitment: KzgCommitment,
        proof: KzgProof,
    ) -> Result<(), Error> {
        self.backend.verify_blob_kzg_proof(blob, commitment, proof)
    }

    /// Batch verification of blob proofs. The verdict is identical to
    /// verifying each triple individually; the batch exists for throughput.
    pub fn verify_blob_kzg_proof_batch(
        &self,
        blobs: &[&[u8]],
        commitments: &[KzgCommitment],
        proofs: &[KzgProof],
    ) -> Result<(), Error> {
        if blobs.len() != commitments.len() || blobs.len() != proofs.len() {
            return Err(Error::InconsistentArrayLength(format!(
                "blobs: {}, commitments: {}, proofs: {}",
                blobs.len(),
                commitments.len(),
                proofs.len()
            )));
        }
        self.backend
            .verify_blob_kzg_proof_batch(blobs, commitments, proofs)
    }

    /// Compute the extended cells and per-cell proofs for a blob.
    pub fn compute_cells_and_proofs(&self, blob: &[u8]) -> Result<CellsAndKzgProofs, Error> {
        self.backend.compute_cells_and_proofs(blob)
    }

    /// Batch verification of cell proofs, `(commitment, cell_index, cell, proof)`
    /// per item.
    pub fn verify_cell_proof_batch(
        &self,
        cells: &[&[u8]],
        proofs: &[KzgProof],
        cell_indices: &[u64],
        commitments: &[KzgCommitment],
    ) -> Result<(), Error> {
        if cells.len() != proofs.len()
            || cells.len() != cell_indices.len()
            || cells.len() != commitments.len()
        {
            return Err(Error::InconsistentArrayLength(format!(
                "cells: {}, proofs: {}, indices: {}, commitments: {}",
                cells.len(),
                proofs.len(),
                cell_indices.len(),
                commitments.len()
            )));
        }
        self.backend
            .verify_cell_proof_batch(cells, proofs, cell_indices, commitments)
    }

    /// Recover all `CELLS_PER_EXT_BLOB` cells (and their proofs) of one
    /// extended blob from at least half of them.
    pub fn recover_cells_and_compute_proofs(
        &self,
        cell_indices: &[u64],
        cells: &[&[u8]],
    ) -> Result<CellsAndKzgProofs, Error> {
        if cell_indices.len() != cells.len() {
            return Err(Error::InconsistentArrayLength(format!(
                "indices: {}, cells: {}",
                cell_indices.len(),
                cells.len()
            )));
        }
        if cells.len() < CELLS_PER_EXT_BLOB / 2 {
            return Err(Error::NotEnoughCellsToReconstruct {
                got: cells.len(),
                needed: CELLS_PER_EXT_BLOB / 2,
            });
        }
        self.backend
            .recover_cells_and_compute_proofs(cell_indices, cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssz::{Decode, Encode};

    #[test]
    fn commitment_ssz_round_trip() {
        let mut commitment = KzgCommitment::empty();
        commitment.0[0] = 0xc0;
        let bytes = commitment.as_ssz_bytes();
        assert_eq!(KzgCommitment::from_ssz_bytes(&bytes).unwrap(), commitment);
    }

    #[test]
    fn display_is_prefixed_hex() {
        let commitment = KzgCommitment::empty();
        let display = commitment.to_string();
        assert!(display.starts_with("0x"));
        assert_eq!(display.len(), 2 + 2 * BYTES_PER_COMMITMENT);
        assert_eq!(KzgCommitment::from_str(&display).unwrap(), commitment);
    }

    #[test]
    fn batch_length_mismatch_is_an_error() {
        let kzg = Kzg::new_deterministic();
        let err = kzg
            .verify_blob_kzg_proof_batch(&[], &[KzgCommitment::empty()], &[])
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentArrayLength(_)));
    }
}
