//! Decides *data availability*: holds `BlockInput`s while their pieces
//! stream in, runs the import-time KZG batches, and performs erasure
//! reconstruction when at least half the columns (but not all custody
//! columns) have arrived.
//!
//! A block "becomes available" when every commitment is covered: by a blob
//! with a valid proof (Deneb/Electra) or by the node's custody columns
//! cross-verified against the commitments (Fulu+). The cache is keyed by
//! lowercase block-root hex and owns each input exclusively; the import
//! pipeline borrows the result for the duration of verification.

use crate::block_input::{AvailableData, BlockInput, BlockInputError};
use crate::custody_context::CustodyContext;
use crate::state_cache::root_hex;
use kzg::Kzg;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};
use types::{
    BlobSidecar, ChainSpec, ColumnIndex, DataColumnSidecar, DataColumnSidecarList, EthSpec,
    Hash256, SignedBeaconBlock, Slot,
};

#[derive(Debug)]
pub enum AvailabilityCheckError {
    BlockInput(BlockInputError),
    KzgError(kzg::Error),
    Custody(types::data_column_custody_group::CustodyGroupError),
    ReconstructionFailed(String),
    /// An input became "ready" with no block present. Internal invariant.
    MissingBlock(Hash256),
}

impl From<BlockInputError> for AvailabilityCheckError {
    fn from(e: BlockInputError) -> Self {
        AvailabilityCheckError::BlockInput(e)
    }
}

impl From<kzg::Error> for AvailabilityCheckError {
    fn from(e: kzg::Error) -> Self {
        AvailabilityCheckError::KzgError(e)
    }
}

/// The state of a block after an observation.
#[derive(Debug)]
pub enum Availability<E: EthSpec> {
    /// Still waiting on pieces.
    MissingComponents(Hash256),
    /// The data-availability check passed; the block may be imported.
    Available(Box<AvailableBlock<E>>),
}

/// A fully available block, ready for the verify pipeline.
#[derive(Debug, Clone)]
pub struct AvailableBlock<E: EthSpec> {
    pub block_root: Hash256,
    pub block: Arc<SignedBeaconBlock<E>>,
    pub data: AvailableData<E>,
    /// Columns recovered by erasure reconstruction, to be re-published.
    pub reconstructed_columns: DataColumnSidecarList<E>,
}

pub struct DataAvailabilityChecker<E: EthSpec> {
    inputs: RwLock<HashMap<String, BlockInput<E>>>,
    kzg: Arc<Kzg>,
    custody_context: Arc<CustodyContext>,
    spec: Arc<ChainSpec>,
}

impl<E: EthSpec> DataAvailabilityChecker<E> {
    pub fn new(kzg: Arc<Kzg>, custody_context: Arc<CustodyContext>, spec: Arc<ChainSpec>) -> Self {
        Self {
            inputs: RwLock::new(HashMap::new()),
            kzg,
            custody_context,
            spec,
        }
    }

    pub fn custody_context(&self) -> Arc<CustodyContext> {
        self.custody_context.clone()
    }

    /// Observe a block. Returns the input's availability afterwards.
    pub fn observe_block(
        &self,
        block: Arc<SignedBeaconBlock<E>>,
        strict: bool,
    ) -> Result<Availability<E>, AvailabilityCheckError> {
        let block_root = block.canonical_root();
        let custody = self.custody_columns_for(block.slot())?;
        let mut inputs = self.inputs.write();
        let ready = match inputs.entry(root_hex(&block_root)) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                match entry.get_mut().add_block(block, strict) {
                    Ok(ready) => ready,
                    Err(BlockInputError::AlreadyAvailable) => true,
                    Err(e) => return Err(e.into()),
                }
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                let input = entry.insert(BlockInput::from_block(block, custody, &self.spec));
                input.ready_for_import()
            }
        };
        self.resolve(&mut inputs, block_root, ready)
    }

    /// Observe a gossip-verified blob sidecar.
    pub fn observe_blob(
        &self,
        blob: Arc<BlobSidecar<E>>,
        strict: bool,
    ) -> Result<Availability<E>, AvailabilityCheckError> {
        let block_root = blob.block_root();
        let mut inputs = self.inputs.write();
        let ready = match inputs.entry(root_hex(&block_root)) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().add_blob(blob, strict)?
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                let input = entry.insert(BlockInput::from_blob(blob, &self.spec));
                input.ready_for_import()
            }
        };
        self.resolve(&mut inputs, block_root, ready)
    }

    /// Observe a gossip-verified data-column sidecar.
    pub fn observe_column(
        &self,
        column: Arc<DataColumnSidecar<E>>,
        strict: bool,
    ) -> Result<Availability<E>, AvailabilityCheckError> {
        let block_root = column.block_root();
        let custody = self.custody_columns_for(column.slot())?;
        let mut inputs = self.inputs.write();
        let ready = match inputs.entry(root_hex(&block_root)) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().add_column(column, strict)?
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                let input = entry.insert(BlockInput::from_column(column, custody));
                input.ready_for_import()
            }
        };
        self.resolve(&mut inputs, block_root, ready)
    }

    /// The cached sidecar indexes for `block_root`, if any input exists.
    pub fn cached_sidecar_indexes(&self, block_root: &Hash256) -> Option<Vec<u64>> {
        let inputs = self.inputs.read();
        let input = inputs.get(&root_hex(block_root))?;
        match input {
            BlockInput::AwaitingBlobs { blobs, .. } => Some(
                blobs
                    .iter()
                    .flatten()
                    .map(|blob| blob.index)
                    .collect(),
            ),
            BlockInput::AwaitingColumns { columns, .. } => Some(
                columns
                    .iter()
                    .flatten()
                    .map(|column| column.index)
                    .collect(),
            ),
            _ => Some(vec![]),
        }
    }

    pub fn has_execution_valid_block(&self, block_root: &Hash256) -> bool {
        self.inputs
            .read()
            .get(&root_hex(block_root))
            .and_then(|input| input.block().cloned())
            .is_some()
    }

    pub fn remove(&self, block_root: &Hash256) {
        self.inputs.write().remove(&root_hex(block_root));
    }

    /// Finalization-driven eviction: drop every input at or before the
    /// finalized start slot.
    pub fn prune_finalized(&self, finalized_start_slot: Slot) {
        self.inputs.write().retain(|_, input| {
            input
                .slot()
                .map(|slot| slot > finalized_start_slot)
                .unwrap_or(false)
        });
    }

    pub fn len(&self) -> usize {
        self.inputs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.read().is_empty()
    }

    fn custody_columns_for(&self, slot: Slot) -> Result<Vec<ColumnIndex>, AvailabilityCheckError> {
        let epoch = slot.epoch(E::slots_per_epoch());
        if !self.spec.is_peer_das_enabled_for_epoch(epoch) {
            return Ok(vec![]);
        }
        self.custody_context
            .custody_columns_at_epoch(epoch, &self.spec)
            .map_err(AvailabilityCheckError::Custody)
    }

    /// If `ready`, run the import-time verification and swap the input into
    /// its `Available` form.
    fn resolve(
        &self,
        inputs: &mut HashMap<String, BlockInput<E>>,
        block_root: Hash256,
        ready: bool,
    ) -> Result<Availability<E>, AvailabilityCheckError> {
        if !ready {
            return Ok(Availability::MissingComponents(block_root));
        }

        let key = root_hex(&block_root);
        let Some(input) = inputs.remove(&key) else {
            return Ok(Availability::MissingComponents(block_root));
        };

        // An input that already completed keeps serving its available form.
        let input = match input {
            BlockInput::Available { block, data } => {
                let available = AvailableBlock {
                    block_root,
                    block: block.clone(),
                    data: data.clone(),
                    reconstructed_columns: vec![],
                };
                inputs.insert(key, BlockInput::Available { block, data });
                return Ok(Availability::Available(Box::new(available)));
            }
            other => other,
        };

        let (input, reconstructed) = self.reconstruct_if_needed(input, block_root)?;

        self.verify_kzg(&input, block_root)?;

        let available_input = input.make_available()?;
        let BlockInput::Available { block, data } = &available_input else {
            return Err(AvailabilityCheckError::MissingBlock(block_root));
        };
        let available = AvailableBlock {
            block_root,
            block: block.clone(),
            data: data.clone(),
            reconstructed_columns: reconstructed,
        };
        inputs.insert(key, available_input);
        Ok(Availability::Available(Box::new(available)))
    }

    /// Erasure-recover missing custody columns when at least half of all
    /// columns are present. Fewer than half is not ready and never gets here.
    fn reconstruct_if_needed(
        &self,
        input: BlockInput<E>,
        block_root: Hash256,
    ) -> Result<(BlockInput<E>, DataColumnSidecarList<E>), AvailabilityCheckError> {
        let (block, mut columns, custody) = match input {
            BlockInput::AwaitingColumns {
                block,
                columns,
                custody,
            } => (block, columns, custody),
            other => return Ok((other, vec![])),
        };

        let custody_complete = custody
            .iter()
            .all(|index| columns.get(*index as usize).is_some_and(Option::is_some));
        if custody_complete {
            return Ok((
                BlockInput::AwaitingColumns {
                    block,
                    columns,
                    custody,
                },
                vec![],
            ));
        }

        let template = columns
            .iter()
            .flatten()
            .next()
            .cloned()
            .ok_or_else(|| AvailabilityCheckError::ReconstructionFailed("no columns".into()))?;
        let row_count = template.kzg_commitments.len();
        let present =
            |columns: &[Option<Arc<DataColumnSidecar<E>>>]| columns.iter().flatten().count();

        debug!(
            ?block_root,
            columns = present(&columns),
            "Reconstructing data columns"
        );

        // Recover each blob row independently, then reassemble the missing
        // column sidecars from the recovered cells.
        let mut recovered_rows = Vec::with_capacity(row_count);
        for row in 0..row_count {
            let mut cell_indices = Vec::new();
            let mut cells: Vec<&[u8]> = Vec::new();
            for column in columns.iter().flatten() {
                let cell = column.column.get(row).ok_or_else(|| {
                    AvailabilityCheckError::ReconstructionFailed(format!(
                        "column {} lacks row {row}",
                        column.index
                    ))
                })?;
                cell_indices.push(column.index);
                cells.push(cell);
            }
            let recovered = self
                .kzg
                .recover_cells_and_compute_proofs(&cell_indices, &cells)
                .map_err(|e| {
                    error!(?block_root, error = ?e, "Error reconstructing data columns");
                    AvailabilityCheckError::ReconstructionFailed(format!("{e:?}"))
                })?;
            recovered_rows.push(recovered);
        }

        let mut reconstructed = Vec::new();
        for index in 0..E::number_of_columns() {
            if columns.get(index).is_some_and(Option::is_some) {
                continue;
            }
            let mut column_cells = Vec::with_capacity(row_count);
            let mut proofs = Vec::with_capacity(row_count);
            for (cells, cell_proofs) in &recovered_rows {
                let cell = cells.get(index).ok_or_else(|| {
                    AvailabilityCheckError::ReconstructionFailed("short recovery".into())
                })?;
                column_cells.push(types::Cell::<E>::new(cell.clone()).map_err(|e| {
                    AvailabilityCheckError::ReconstructionFailed(format!("{e:?}"))
                })?);
                proofs.push(*cell_proofs.get(index).ok_or_else(|| {
                    AvailabilityCheckError::ReconstructionFailed("short proof recovery".into())
                })?);
            }
            let sidecar = Arc::new(DataColumnSidecar {
                index: index as u64,
                column: types::DataColumn::<E>::new(column_cells).map_err(|e| {
                    AvailabilityCheckError::ReconstructionFailed(format!("{e:?}"))
                })?,
                kzg_commitments: template.kzg_commitments.clone(),
                kzg_proofs: ssz_types::VariableList::new(proofs).map_err(|e| {
                    AvailabilityCheckError::ReconstructionFailed(format!("{e:?}"))
                })?,
                signed_block_header: template.signed_block_header.clone(),
                kzg_commitments_inclusion_proof: template
                    .kzg_commitments_inclusion_proof
                    .clone(),
            });
            if let Some(slot_ref) = columns.get_mut(index) {
                *slot_ref = Some(sidecar.clone());
            }
            reconstructed.push(sidecar);
        }

        debug!(
            ?block_root,
            recovered = reconstructed.len(),
            "Reconstructed columns"
        );

        Ok((
            BlockInput::AwaitingColumns {
                block,
                columns,
                custody,
            },
            reconstructed,
        ))
    }

    /// The import-time KZG batch: one call for all of a block's data.
    fn verify_kzg(
        &self,
        input: &BlockInput<E>,
        block_root: Hash256,
    ) -> Result<(), AvailabilityCheckError> {
        match input {
            BlockInput::AwaitingBlobs { block, blobs, .. } => {
                let Some(block) = block else {
                    return Err(AvailabilityCheckError::MissingBlock(block_root));
                };
                let expected = block.num_expected_blobs();
                let mut blob_bytes: Vec<&[u8]> = Vec::with_capacity(expected);
                let mut commitments = Vec::with_capacity(expected);
                let mut proofs = Vec::with_capacity(expected);
                for blob in blobs.iter().take(expected).flatten() {
                    blob_bytes.push(&blob.blob);
                    commitments.push(blob.kzg_commitment);
                    proofs.push(blob.kzg_proof);
                }
                self.kzg
                    .verify_blob_kzg_proof_batch(&blob_bytes, &commitments, &proofs)?;
                Ok(())
            }
            BlockInput::AwaitingColumns {
                columns, custody, ..
            } => {
                let mut cells: Vec<&[u8]> = Vec::new();
                let mut proofs = Vec::new();
                let mut cell_indices = Vec::new();
                let mut commitments = Vec::new();
                for index in custody {
                    let Some(column) = columns.get(*index as usize).and_then(Option::as_ref)
                    else {
                        continue;
                    };
                    for (row, commitment) in column.kzg_commitments.iter().enumerate() {
                        let cell = column.column.get(row).ok_or_else(|| {
                            AvailabilityCheckError::ReconstructionFailed(format!(
                                "column {index} lacks row {row}"
                            ))
                        })?;
                        let proof = column.kzg_proofs.get(row).ok_or_else(|| {
                            AvailabilityCheckError::ReconstructionFailed(format!(
                                "column {index} lacks proof {row}"
                            ))
                        })?;
                        cells.push(cell);
                        proofs.push(*proof);
                        cell_indices.push(column.index);
                        commitments.push(*commitment);
                    }
                }
                self.kzg
                    .verify_cell_proof_batch(&cells, &proofs, &cell_indices, &commitments)?;
                Ok(())
            }
            BlockInput::PreData { .. } | BlockInput::Available { .. } => Ok(()),
        }
    }
}

impl<E: EthSpec> BlockInput<E> {
    /// The slot of this input, from whichever piece is present.
    pub fn slot(&self) -> Option<Slot> {
        if let Some(block) = self.block() {
            return Some(block.slot());
        }
        match self {
            BlockInput::AwaitingBlobs { blobs, .. } => {
                blobs.iter().flatten().next().map(|blob| blob.slot())
            }
            BlockInput::AwaitingColumns { columns, .. } => {
                columns.iter().flatten().next().map(|column| column.slot())
            }
            _ => None,
        }
    }
}
