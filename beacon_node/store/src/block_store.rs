use crate::{DBColumn, Error, KeyValueStore, KeyValueStoreOp, RangeQuery};
use ssz::{Decode, Encode};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};
use types::{
    BlobSidecar, BlobSidecarList, ChainSpec, ColumnIndex, DataColumnSidecar,
    DataColumnSidecarList, EthSpec, Hash256, SignedBeaconBlock, Slot,
};

/// Hot repositories for blocks and their sidecars.
///
/// Block values are laid out as `slot_be_8B || ssz(block)` so the fork can
/// be resolved before SSZ decoding. Sidecar repositories use the prefixed
/// key layout `bucket_id || era_slot_be_2B || column_index_be_2B`, where
/// `era_slot` is the slot position within its `SLOTS_PER_HISTORICAL_ROOT`
/// window; range scans therefore stay inside one bucket by construction.
#[derive(Debug)]
pub struct BlockStore<E: EthSpec, KV: KeyValueStore> {
    kv: Arc<KV>,
    _phantom: PhantomData<E>,
}

impl<E: EthSpec, KV: KeyValueStore> Clone for BlockStore<E, KV> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            _phantom: PhantomData,
        }
    }
}

fn era_slot<E: EthSpec>(slot: Slot) -> u16 {
    (slot.as_u64() % E::slots_per_historical_root() as u64) as u16
}

impl<E: EthSpec, KV: KeyValueStore> BlockStore<E, KV> {
    pub fn new(kv: Arc<KV>) -> Self {
        Self {
            kv,
            _phantom: PhantomData,
        }
    }

    pub fn kv(&self) -> &Arc<KV> {
        &self.kv
    }

    fn block_key(block_root: &Hash256) -> Vec<u8> {
        DBColumn::BeaconBlock.key(block_root.as_slice())
    }

    fn sidecar_key(column: DBColumn, slot: Slot, index: u64, block_root: &Hash256) -> Vec<u8> {
        let mut key = Vec::with_capacity(2 + 2 + 32);
        key.extend_from_slice(&era_slot::<E>(slot).to_be_bytes());
        key.extend_from_slice(&(index as u16).to_be_bytes());
        key.extend_from_slice(block_root.as_slice());
        column.key(&key)
    }

    pub fn put_block(&self, block_root: &Hash256, block: &SignedBeaconBlock<E>) -> Result<(), Error> {
        let mut value = Vec::with_capacity(8 + block.ssz_bytes_len());
        value.extend_from_slice(&block.slot().as_u64().to_be_bytes());
        value.extend_from_slice(&block.as_ssz_bytes());
        self.kv.put_bytes(&Self::block_key(block_root), &value)
    }

    pub fn get_block(
        &self,
        block_root: &Hash256,
        spec: &ChainSpec,
    ) -> Result<Option<SignedBeaconBlock<E>>, Error> {
        let key = Self::block_key(block_root);
        let Some(value) = self.kv.get_bytes(&key)? else {
            return Ok(None);
        };
        if value.len() < 8 {
            return Err(Error::TruncatedValue {
                key,
                len: value.len(),
            });
        }
        let slot = Slot::new(u64::from_be_bytes(
            value[..8].try_into().expect("checked length above"),
        ));
        let fork_name = spec.fork_name_at_slot::<E>(slot);
        let block = SignedBeaconBlock::from_ssz_bytes_by_fork(&value[8..], fork_name)?;
        Ok(Some(block))
    }

    pub fn block_exists(&self, block_root: &Hash256) -> Result<bool, Error> {
        self.kv.key_exists(&Self::block_key(block_root))
    }

    pub fn delete_block(&self, block_root: &Hash256) -> Result<(), Error> {
        self.kv.key_delete(&Self::block_key(block_root))
    }

    pub fn put_blob_sidecars(
        &self,
        block_root: &Hash256,
        sidecars: &BlobSidecarList<E>,
    ) -> Result<(), Error> {
        let batch = sidecars
            .iter()
            .map(|sidecar| {
                KeyValueStoreOp::PutKeyValue(
                    Self::sidecar_key(
                        DBColumn::BeaconBlobSidecar,
                        sidecar.slot(),
                        sidecar.index,
                        block_root,
                    ),
                    sidecar.as_ssz_bytes(),
                )
            })
            .collect();
        self.kv.do_atomically(batch)
    }

    pub fn get_blob_sidecars(
        &self,
        block_root: &Hash256,
        slot: Slot,
    ) -> Result<BlobSidecarList<E>, Error> {
        self.scan_sidecars(DBColumn::BeaconBlobSidecar, slot, block_root, |bytes| {
            BlobSidecar::from_ssz_bytes(bytes).map(Arc::new)
        })
    }

    pub fn put_data_column_sidecars(
        &self,
        block_root: &Hash256,
        sidecars: &DataColumnSidecarList<E>,
    ) -> Result<(), Error> {
        let batch = sidecars
            .iter()
            .map(|sidecar| {
                KeyValueStoreOp::PutKeyValue(
                    Self::sidecar_key(
                        DBColumn::BeaconDataColumnSidecar,
                        sidecar.slot(),
                        sidecar.index,
                        block_root,
                    ),
                    sidecar.as_ssz_bytes(),
                )
            })
            .collect();
        self.kv.do_atomically(batch)
    }

    pub fn get_data_column_sidecars(
        &self,
        block_root: &Hash256,
        slot: Slot,
    ) -> Result<DataColumnSidecarList<E>, Error> {
        self.scan_sidecars(
            DBColumn::BeaconDataColumnSidecar,
            slot,
            block_root,
            |bytes| DataColumnSidecar::from_ssz_bytes(bytes).map(Arc::new),
        )
    }

    pub fn get_data_column_sidecar(
        &self,
        block_root: &Hash256,
        slot: Slot,
        column_index: ColumnIndex,
    ) -> Result<Option<Arc<DataColumnSidecar<E>>>, Error> {
        let key = Self::sidecar_key(
            DBColumn::BeaconDataColumnSidecar,
            slot,
            column_index,
            block_root,
        );
        self.kv
            .get_bytes(&key)?
            .map(|bytes| DataColumnSidecar::from_ssz_bytes(&bytes).map(Arc::new))
            .transpose()
            .map_err(Into::into)
    }

    fn scan_sidecars<S>(
        &self,
        column: DBColumn,
        slot: Slot,
        block_root: &Hash256,
        decode: impl Fn(&[u8]) -> Result<S, ssz::DecodeError>,
    ) -> Result<Vec<S>, Error> {
        // All sidecars of one block share the era-slot prefix; filter by
        // root suffix to drop same-prefix entries of other blocks.
        let slot_prefix = era_slot::<E>(slot);
        let mut start = vec![column.as_byte()];
        start.extend_from_slice(&slot_prefix.to_be_bytes());
        let end = match slot_prefix.checked_add(1) {
            Some(next) => {
                let mut end = vec![column.as_byte()];
                end.extend_from_slice(&next.to_be_bytes());
                end
            }
            None => column.end_key(),
        };

        let entries = self.kv.iter_range(RangeQuery {
            gte: Some(start),
            lt: Some(end),
            ..RangeQuery::default()
        })?;

        let mut out = Vec::new();
        for (key, value) in entries {
            if key.len() >= 1 + 2 + 2 + 32 && &key[5..] == block_root.as_slice() {
                out.push(decode(&value)?);
            }
        }
        Ok(out)
    }

    /// Store the SSZ of a provably invalid object for forensic inspection.
    pub fn put_invalid_ssz_value(&self, block_root: &Hash256, ssz_bytes: &[u8]) -> Result<(), Error> {
        warn!(root = ?block_root, "Persisting invalid SSZ value for inspection");
        self.kv
            .put_bytes(&DBColumn::InvalidBlock.key(block_root.as_slice()), ssz_bytes)
    }

    pub fn get_invalid_ssz_value(&self, block_root: &Hash256) -> Result<Option<Vec<u8>>, Error> {
        self.kv
            .get_bytes(&DBColumn::InvalidBlock.key(block_root.as_slice()))
    }

    /// Startup rollback: delete hot blocks that never made it into
    /// fork choice (an import aborted between persist and attach).
    pub fn prune_dangling_blocks(&self, fork_choice_roots: &HashSet<Hash256>) -> Result<usize, Error> {
        let entries = self.kv.iter_range(RangeQuery::column(DBColumn::BeaconBlock))?;
        let mut batch = Vec::new();
        for (key, _) in entries {
            if key.len() == 1 + 32 {
                let root = Hash256::from_slice(&key[1..]);
                if !fork_choice_roots.contains(&root) {
                    batch.push(KeyValueStoreOp::DeleteKey(key));
                }
            }
        }
        let pruned = batch.len();
        if pruned > 0 {
            debug!(count = pruned, "Pruning blocks unknown to fork choice");
            self.kv.do_atomically(batch)?;
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use bls::SignatureBytes;
    use types::{BeaconBlock, ForkName, MainnetEthSpec};

    type E = MainnetEthSpec;

    fn store() -> BlockStore<E, MemoryStore> {
        BlockStore::new(Arc::new(MemoryStore::new()))
    }

    fn block(slot: u64) -> (Hash256, SignedBeaconBlock<E>) {
        let block = BeaconBlock::<E>::empty(ForkName::Deneb, Slot::new(slot));
        let root = block.canonical_root();
        (root, SignedBeaconBlock::from_block(block, SignatureBytes::empty()))
    }

    #[test]
    fn block_round_trip() {
        let spec = ChainSpec::genesis_spec(ForkName::Deneb);
        let store = store();
        let (root, signed) = block(5);

        store.put_block(&root, &signed).unwrap();
        let loaded = store.get_block(&root, &spec).unwrap().unwrap();
        assert_eq!(loaded, signed);
        assert!(store.block_exists(&root).unwrap());

        store.delete_block(&root).unwrap();
        assert_eq!(store.get_block(&root, &spec).unwrap(), None);
    }

    #[test]
    fn dangling_blocks_are_pruned() {
        let store = store();
        let (root_a, block_a) = block(1);
        let (root_b, block_b) = block(2);
        store.put_block(&root_a, &block_a).unwrap();
        store.put_block(&root_b, &block_b).unwrap();

        let mut known = HashSet::new();
        known.insert(root_a);

        let pruned = store.prune_dangling_blocks(&known).unwrap();
        assert_eq!(pruned, 1);
        assert!(store.block_exists(&root_a).unwrap());
        assert!(!store.block_exists(&root_b).unwrap());
    }

    #[test]
    fn invalid_ssz_sideband_round_trip() {
        let store = store();
        let root = Hash256::repeat_byte(3);
        store.put_invalid_ssz_value(&root, b"garbage").unwrap();
        assert_eq!(
            store.get_invalid_ssz_value(&root).unwrap(),
            Some(b"garbage".to_vec())
        );
    }
}
