//! Provides `BlockInput`: the container uniting a signed block with its
//! data-availability payload as the pieces stream in from gossip, sync or
//! the API.
//!
//! The variant is fixed by the fork of the first piece observed and never
//! downgrades. All mutation goes through the typed `add_*` operations; once
//! `Available`, contents are immutable. No I/O happens here: this is a pure
//! function of the observed pieces.

use std::sync::Arc;
use types::{
    BlobSidecar, BlobSidecarList, ChainSpec, ColumnIndex, DataColumnSidecar,
    DataColumnSidecarList, EthSpec, Hash256, SignedBeaconBlock, Slot,
};

#[derive(Debug, Clone, PartialEq)]
pub enum BlockInputError {
    /// Strict-mode observation of a piece that is already held.
    AlreadyKnown,
    /// A piece of the wrong kind for this input's fork variant.
    WrongFork {
        variant: &'static str,
        piece: &'static str,
    },
    /// A second, different block claimed this input's root.
    BlockMismatch { block_root: Hash256 },
    /// A different sidecar already occupies `(slot, proposer_index, index)`.
    SidecarConflict {
        slot: Slot,
        proposer_index: u64,
        index: u64,
    },
    /// The piece does not belong to this input's block root.
    BlockRootMismatch { expected: Hash256, got: Hash256 },
    IndexOutOfBounds { index: u64, max: u64 },
    /// The input is `Available`; it no longer accepts pieces.
    AlreadyAvailable,
    /// `make_available` called before the requirement was met.
    NotReady,
}

/// The data-availability payload of a complete block.
#[derive(Debug, Clone)]
pub enum AvailableData<E: EthSpec> {
    /// Pre-Deneb, or a post-Deneb block with zero commitments.
    NoData,
    Blobs(BlobSidecarList<E>),
    DataColumns(DataColumnSidecarList<E>),
}

/// A block and its data payload, assembled piece by piece.
#[derive(Debug, Clone)]
pub enum BlockInput<E: EthSpec> {
    /// Fork < Deneb: no data-availability requirement.
    PreData { block: Arc<SignedBeaconBlock<E>> },
    /// Deneb/Electra: waiting on blob sidecars.
    AwaitingBlobs {
        block: Option<Arc<SignedBeaconBlock<E>>>,
        /// Sparse, indexed by blob index.
        blobs: Vec<Option<Arc<BlobSidecar<E>>>>,
        /// `len(block.kzg_commitments)`, known once the block is.
        expected: Option<u8>,
    },
    /// Fulu+: waiting on custody data columns.
    AwaitingColumns {
        block: Option<Arc<SignedBeaconBlock<E>>>,
        /// Sparse, indexed by column index.
        columns: Vec<Option<Arc<DataColumnSidecar<E>>>>,
        /// The columns this node must hold before the block is available.
        custody: Vec<ColumnIndex>,
    },
    /// Terminal: the data-availability check has passed.
    Available {
        block: Arc<SignedBeaconBlock<E>>,
        data: AvailableData<E>,
    },
}

impl<E: EthSpec> BlockInput<E> {
    /// Start an input from its block.
    pub fn from_block(
        block: Arc<SignedBeaconBlock<E>>,
        custody: Vec<ColumnIndex>,
        spec: &ChainSpec,
    ) -> Self {
        let fork_name = block.fork_name(spec);
        let expected = block.num_expected_blobs() as u8;
        if !fork_name.deneb_enabled() || expected == 0 {
            // Zero-commitment blocks have nothing to wait for.
            if fork_name.deneb_enabled() {
                return BlockInput::Available {
                    block,
                    data: AvailableData::NoData,
                };
            }
            return BlockInput::PreData { block };
        }
        if fork_name.fulu_enabled() {
            BlockInput::AwaitingColumns {
                block: Some(block),
                columns: vec![None; E::number_of_columns()],
                custody,
            }
        } else {
            // The blob cap steps per fork; size for the block's epoch.
            let max_blobs = spec.max_blobs_per_block_at_epoch(block.epoch()) as usize;
            BlockInput::AwaitingBlobs {
                block: Some(block),
                blobs: vec![None; max_blobs],
                expected: Some(expected),
            }
        }
    }

    /// Start an input from a lone blob sidecar.
    pub fn from_blob(blob: Arc<BlobSidecar<E>>, spec: &ChainSpec) -> Self {
        let max_blobs = spec.max_blobs_per_block_at_epoch(blob.epoch()) as usize;
        let mut input = BlockInput::AwaitingBlobs {
            block: None,
            blobs: vec![None; max_blobs],
            expected: None,
        };
        if let BlockInput::AwaitingBlobs { blobs, .. } = &mut input {
            if let Some(slot) = blobs.get_mut(blob.index as usize) {
                *slot = Some(blob);
            }
        }
        input
    }

    /// Start an input from a lone data-column sidecar.
    pub fn from_column(
        column: Arc<DataColumnSidecar<E>>,
        custody: Vec<ColumnIndex>,
    ) -> Self {
        let mut columns = vec![None; E::number_of_columns()];
        if let Some(slot) = columns.get_mut(column.index as usize) {
            *slot = Some(column);
        }
        BlockInput::AwaitingColumns {
            block: None,
            columns,
            custody,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            BlockInput::PreData { .. } => "PreData",
            BlockInput::AwaitingBlobs { .. } => "AwaitingBlobs",
            BlockInput::AwaitingColumns { .. } => "AwaitingColumns",
            BlockInput::Available { .. } => "Available",
        }
    }

    pub fn block(&self) -> Option<&Arc<SignedBeaconBlock<E>>> {
        match self {
            BlockInput::PreData { block } | BlockInput::Available { block, .. } => Some(block),
            BlockInput::AwaitingBlobs { block, .. }
            | BlockInput::AwaitingColumns { block, .. } => block.as_ref(),
        }
    }

    /// The block root, stable from the first observed piece.
    pub fn block_root(&self) -> Option<Hash256> {
        if let Some(block) = self.block() {
            return Some(block.canonical_root());
        }
        match self {
            BlockInput::AwaitingBlobs { blobs, .. } => blobs
                .iter()
                .flatten()
                .next()
                .map(|blob| blob.block_root()),
            BlockInput::AwaitingColumns { columns, .. } => columns
                .iter()
                .flatten()
                .next()
                .map(|column| column.block_root()),
            _ => None,
        }
    }

    /// Record the block. Idempotent for the identical block; `strict` turns
    /// the repeat into `AlreadyKnown`.
    pub fn add_block(
        &mut self,
        new_block: Arc<SignedBeaconBlock<E>>,
        strict: bool,
    ) -> Result<bool, BlockInputError> {
        if let Some(existing_root) = self.block_root() {
            let new_root = new_block.canonical_root();
            if existing_root != new_root {
                return Err(BlockInputError::BlockRootMismatch {
                    expected: existing_root,
                    got: new_root,
                });
            }
        }

        match self {
            BlockInput::Available { .. } => return Err(BlockInputError::AlreadyAvailable),
            BlockInput::PreData { .. } => {
                return if strict {
                    Err(BlockInputError::AlreadyKnown)
                } else {
                    Ok(self.ready_for_import())
                };
            }
            BlockInput::AwaitingBlobs {
                block, expected, ..
            } => {
                if block.is_some() {
                    return if strict {
                        Err(BlockInputError::AlreadyKnown)
                    } else {
                        Ok(self.ready_for_import())
                    };
                }
                *expected = Some(new_block.num_expected_blobs() as u8);
                *block = Some(new_block);
            }
            BlockInput::AwaitingColumns { block, .. } => {
                if block.is_some() {
                    return if strict {
                        Err(BlockInputError::AlreadyKnown)
                    } else {
                        Ok(self.ready_for_import())
                    };
                }
                *block = Some(new_block);
            }
        }
        Ok(self.ready_for_import())
    }

    pub fn add_blob(
        &mut self,
        blob: Arc<BlobSidecar<E>>,
        strict: bool,
    ) -> Result<bool, BlockInputError> {
        if let Some(expected_root) = self.block_root() {
            let got = blob.block_root();
            if got != expected_root {
                return Err(BlockInputError::BlockRootMismatch {
                    expected: expected_root,
                    got,
                });
            }
        }

        match self {
            BlockInput::Available { .. } => Err(BlockInputError::AlreadyAvailable),
            BlockInput::PreData { .. } | BlockInput::AwaitingColumns { .. } => {
                Err(BlockInputError::WrongFork {
                    variant: self.variant_name(),
                    piece: "blob",
                })
            }
            BlockInput::AwaitingBlobs { blobs, .. } => {
                let index = blob.index;
                let max = blobs.len() as u64;
                let slot_ref = blobs
                    .get_mut(index as usize)
                    .ok_or(BlockInputError::IndexOutOfBounds { index, max })?;
                match slot_ref {
                    Some(existing) if **existing == *blob => {
                        if strict {
                            return Err(BlockInputError::AlreadyKnown);
                        }
                    }
                    Some(existing) => {
                        return Err(BlockInputError::SidecarConflict {
                            slot: existing.slot(),
                            proposer_index: existing.block_proposer_index(),
                            index,
                        });
                    }
                    None => *slot_ref = Some(blob),
                }
                Ok(self.ready_for_import())
            }
        }
    }

    pub fn add_column(
        &mut self,
        column: Arc<DataColumnSidecar<E>>,
        strict: bool,
    ) -> Result<bool, BlockInputError> {
        if let Some(expected_root) = self.block_root() {
            let got = column.block_root();
            if got != expected_root {
                return Err(BlockInputError::BlockRootMismatch {
                    expected: expected_root,
                    got,
                });
            }
        }

        match self {
            BlockInput::Available { .. } => Err(BlockInputError::AlreadyAvailable),
            BlockInput::PreData { .. } | BlockInput::AwaitingBlobs { .. } => {
                Err(BlockInputError::WrongFork {
                    variant: self.variant_name(),
                    piece: "column",
                })
            }
            BlockInput::AwaitingColumns { columns, .. } => {
                let index = column.index;
                let max = columns.len() as u64;
                let slot_ref = columns
                    .get_mut(index as usize)
                    .ok_or(BlockInputError::IndexOutOfBounds { index, max })?;
                match slot_ref {
                    Some(existing) if **existing == *column => {
                        if strict {
                            return Err(BlockInputError::AlreadyKnown);
                        }
                    }
                    Some(existing) => {
                        return Err(BlockInputError::SidecarConflict {
                            slot: existing.slot(),
                            proposer_index: existing.block_proposer_index(),
                            index,
                        });
                    }
                    None => *slot_ref = Some(column),
                }
                Ok(self.ready_for_import())
            }
        }
    }

    /// How many columns have been observed.
    pub fn column_count(&self) -> usize {
        match self {
            BlockInput::AwaitingColumns { columns, .. } => {
                columns.iter().flatten().count()
            }
            BlockInput::Available {
                data: AvailableData::DataColumns(columns),
                ..
            } => columns.len(),
            _ => 0,
        }
    }

    /// All custody columns present?
    pub fn custody_complete(&self) -> bool {
        match self {
            BlockInput::AwaitingColumns {
                columns, custody, ..
            } => custody
                .iter()
                .all(|index| columns.get(*index as usize).is_some_and(Option::is_some)),
            _ => false,
        }
    }

    /// The data-availability readiness rule.
    ///
    /// - `PreData`: the block alone suffices.
    /// - `AwaitingBlobs`: every one of the block's commitments has its blob.
    /// - `AwaitingColumns`: all custody columns present, or at least half of
    ///   all columns (reconstruction can recover the rest).
    pub fn ready_for_import(&self) -> bool {
        match self {
            BlockInput::PreData { .. } => true,
            BlockInput::Available { .. } => true,
            BlockInput::AwaitingBlobs {
                block,
                blobs,
                expected,
            } => {
                let Some(expected) = expected else {
                    return false;
                };
                block.is_some()
                    && (0..*expected as usize)
                        .all(|index| blobs.get(index).is_some_and(Option::is_some))
            }
            BlockInput::AwaitingColumns { block, columns, .. } => {
                block.is_some()
                    && (self.custody_complete()
                        || columns.iter().flatten().count() >= E::number_of_columns() / 2)
            }
        }
    }

    /// Transition into `Available`.
    ///
    /// For columns this requires full custody; reconstruction (which fills
    /// the missing columns in first) is the availability checker's job.
    pub fn make_available(self) -> Result<BlockInput<E>, BlockInputError> {
        match self {
            BlockInput::Available { .. } => Err(BlockInputError::AlreadyAvailable),
            BlockInput::PreData { block } => Ok(BlockInput::Available {
                block,
                data: AvailableData::NoData,
            }),
            BlockInput::AwaitingBlobs {
                block,
                blobs,
                expected,
            } => {
                let block = block.ok_or(BlockInputError::NotReady)?;
                let expected = expected.ok_or(BlockInputError::NotReady)? as usize;
                let collected = blobs
                    .into_iter()
                    .take(expected)
                    .flatten()
                    .collect::<Vec<_>>();
                if collected.len() != expected {
                    return Err(BlockInputError::NotReady);
                }
                Ok(BlockInput::Available {
                    block,
                    data: AvailableData::Blobs(collected),
                })
            }
            BlockInput::AwaitingColumns {
                block,
                columns,
                custody,
            } => {
                let block = block.ok_or(BlockInputError::NotReady)?;
                let custody_satisfied = custody.iter().all(|index| {
                    columns.get(*index as usize).is_some_and(Option::is_some)
                });
                if !custody_satisfied {
                    return Err(BlockInputError::NotReady);
                }
                Ok(BlockInput::Available {
                    block,
                    data: AvailableData::DataColumns(
                        columns.into_iter().flatten().collect(),
                    ),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bls::SignatureBytes;
    use kzg::Kzg;
    use ssz_types::VariableList;
    use types::{BeaconBlock, Blob, ForkName, MainnetEthSpec};

    type E = MainnetEthSpec;

    fn spec() -> ChainSpec {
        ChainSpec::genesis_spec(ForkName::Deneb)
    }

    fn block_with_blobs(
        fork_name: ForkName,
        n: usize,
    ) -> (Arc<SignedBeaconBlock<E>>, Vec<Arc<BlobSidecar<E>>>) {
        let kzg = Kzg::new_deterministic();
        let mut block = BeaconBlock::<E>::empty(fork_name, Slot::new(1));
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
        let commitments = VariableList::new(commitments).unwrap();
        match block {
            BeaconBlock::Base(_) => {}
            BeaconBlock::Deneb(ref mut inner) => {
                inner.body.blob_kzg_commitments = commitments;
            }
            BeaconBlock::Electra(ref mut inner) => {
                inner.body.blob_kzg_commitments = commitments;
            }
        }
        let signed = Arc::new(SignedBeaconBlock::from_block(
            block,
            SignatureBytes::empty(),
        ));
        let sidecars =
            BlobSidecar::build_sidecars(&signed, blobs, &kzg).unwrap();
        (signed, sidecars)
    }

    fn deneb_block_with_blobs(
        n: usize,
    ) -> (Arc<SignedBeaconBlock<E>>, Vec<Arc<BlobSidecar<E>>>) {
        block_with_blobs(ForkName::Deneb, n)
    }

    #[test]
    fn pre_deneb_block_is_immediately_ready() {
        let spec = ChainSpec::genesis_spec(ForkName::Capella);
        let block = Arc::new(SignedBeaconBlock::from_block(
            BeaconBlock::<E>::empty(ForkName::Capella, Slot::new(1)),
            SignatureBytes::empty(),
        ));
        let input = BlockInput::from_block(block, vec![], &spec);
        assert!(matches!(input, BlockInput::PreData { .. }));
        assert!(input.ready_for_import());

        let available = input.make_available().unwrap();
        assert!(matches!(
            available,
            BlockInput::Available {
                data: AvailableData::NoData,
                ..
            }
        ));
    }

    #[test]
    fn out_of_order_blob_assembly() {
        let spec = spec();
        let (block, sidecars) = deneb_block_with_blobs(2);

        // Blob 1 arrives first.
        let mut input = BlockInput::from_blob(sidecars[1].clone(), &spec);
        assert!(!input.ready_for_import(), "no block, no expectation");

        // Then blob 0.
        assert!(!input.add_blob(sidecars[0].clone(), false).unwrap());

        // Then the block: readiness flips.
        assert!(input.add_block(block, false).unwrap());

        let available = input.make_available().unwrap();
        match available {
            BlockInput::Available {
                data: AvailableData::Blobs(blobs),
                ..
            } => {
                // Ascending index order, regardless of arrival order.
                assert_eq!(blobs[0].index, 0);
                assert_eq!(blobs[1].index, 1);
            }
            other => panic!("unexpected variant: {}", other.variant_name()),
        }
    }

    #[test]
    fn duplicate_blob_is_idempotent_and_strict_mode_reports_it() {
        let spec = spec();
        let (block, sidecars) = deneb_block_with_blobs(2);
        let mut input = BlockInput::from_block(block, vec![], &spec);

        assert!(!input.add_blob(sidecars[0].clone(), false).unwrap());
        // Same piece again: idempotent by default.
        assert!(!input.add_blob(sidecars[0].clone(), false).unwrap());
        // Strict mode surfaces the repeat.
        assert_eq!(
            input.add_blob(sidecars[0].clone(), true),
            Err(BlockInputError::AlreadyKnown)
        );
    }

    #[test]
    fn conflicting_sidecar_under_same_index_is_an_error() {
        let spec = spec();
        let (block, sidecars) = deneb_block_with_blobs(2);
        let mut input = BlockInput::from_block(block, vec![], &spec);
        input.add_blob(sidecars[0].clone(), false).unwrap();

        let mut conflicting = (*sidecars[1]).clone();
        conflicting.index = 0;
        // A blob from the same block forged under index 0: same root, same
        // tuple, different contents.
        assert!(matches!(
            input.add_blob(Arc::new(conflicting), false),
            Err(BlockInputError::SidecarConflict { index: 0, .. })
        ));
    }

    #[test]
    fn variant_never_downgrades() {
        let spec = spec();
        let (block, sidecars) = deneb_block_with_blobs(1);
        let mut input = BlockInput::from_block(block, vec![], &spec);
        assert_eq!(input.variant_name(), "AwaitingBlobs");

        // A column for a blob-carrying input is a fork mismatch.
        let column = Arc::new(DataColumnSidecar::<E> {
            index: 0,
            column: Default::default(),
            kzg_commitments: Default::default(),
            kzg_proofs: Default::default(),
            signed_block_header: sidecars[0].signed_block_header.clone(),
            kzg_commitments_inclusion_proof: Default::default(),
        });
        assert!(matches!(
            input.add_column(column, false),
            Err(BlockInputError::WrongFork { .. })
        ));
    }

    #[test]
    fn electra_block_accepts_blobs_beyond_deneb_cap() {
        let spec = ChainSpec::genesis_spec(ForkName::Electra);
        let n = spec.max_blobs_per_block_electra as usize - 2;
        assert!(n > spec.max_blobs_per_block as usize, "cap must step up");

        let (block, sidecars) = block_with_blobs(ForkName::Electra, n);
        let mut input = BlockInput::from_block(block, vec![], &spec);
        assert_eq!(input.variant_name(), "AwaitingBlobs");

        // Readiness flips only once every commitment, including those above
        // the Deneb cap, has its blob.
        for (i, sidecar) in sidecars.iter().enumerate() {
            let ready = input.add_blob(sidecar.clone(), false).unwrap();
            assert_eq!(ready, i + 1 == n, "after blob {i}");
        }

        let available = input.make_available().unwrap();
        match available {
            BlockInput::Available {
                data: AvailableData::Blobs(blobs),
                ..
            } => {
                assert_eq!(blobs.len(), n);
                assert_eq!(blobs.last().unwrap().index, n as u64 - 1);
            }
            other => panic!("unexpected variant: {}", other.variant_name()),
        }
    }

    #[test]
    fn electra_high_index_blob_seeds_input() {
        let spec = ChainSpec::genesis_spec(ForkName::Electra);
        let n = spec.max_blobs_per_block_electra as usize;
        let (block, sidecars) = block_with_blobs(ForkName::Electra, n);

        // A blob above the Deneb cap arrives before its block; it must be
        // retained, not dropped.
        let high_index = spec.max_blobs_per_block as usize;
        let mut input = BlockInput::from_blob(sidecars[high_index].clone(), &spec);
        match &input {
            BlockInput::AwaitingBlobs { blobs, .. } => {
                assert_eq!(blobs.len(), n);
                assert!(blobs[high_index].is_some(), "high-index blob retained");
            }
            other => panic!("unexpected variant: {}", other.variant_name()),
        }

        for (i, sidecar) in sidecars.iter().enumerate() {
            if i != high_index {
                input.add_blob(sidecar.clone(), false).unwrap();
            }
        }
        assert!(!input.ready_for_import(), "block still missing");
        assert!(input.add_block(block, false).unwrap());
        assert!(input.make_available().is_ok());
    }

    #[test]
    fn available_input_is_immutable() {
        let spec = spec();
        let (block, sidecars) = deneb_block_with_blobs(1);
        let mut input = BlockInput::from_block(block.clone(), vec![], &spec);
        assert!(input.add_blob(sidecars[0].clone(), false).unwrap());

        let mut available = input.make_available().unwrap();
        assert_eq!(
            available.add_blob(sidecars[0].clone(), false),
            Err(BlockInputError::AlreadyAvailable)
        );
        assert_eq!(
            available.add_block(block, false),
            Err(BlockInputError::AlreadyAvailable)
        );
    }
}
