use crate::Error;
use strum::{EnumIter, IntoStaticStr};

/// A bucket: a named, byte-prefixed key space.
///
/// Keys produced under one bucket never collide with another's, and range
/// scans never cross a bucket boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
pub enum DBColumn {
    BeaconBlock,
    BeaconBlobSidecar,
    BeaconDataColumnSidecar,
    /// Provably invalid objects retained for forensic inspection.
    InvalidBlock,
    BeaconMeta,
}

impl DBColumn {
    pub fn as_byte(&self) -> u8 {
        match self {
            DBColumn::BeaconBlock => 0x01,
            DBColumn::BeaconBlobSidecar => 0x02,
            DBColumn::BeaconDataColumnSidecar => 0x03,
            DBColumn::InvalidBlock => 0x04,
            DBColumn::BeaconMeta => 0x05,
        }
    }

    /// Prefix `key` with this bucket's byte.
    pub fn key(&self, key: &[u8]) -> Vec<u8> {
        let mut prefixed = Vec::with_capacity(1 + key.len());
        prefixed.push(self.as_byte());
        prefixed.extend_from_slice(key);
        prefixed
    }

    /// The exclusive upper bound of this bucket's key space.
    pub fn end_key(&self) -> Vec<u8> {
        vec![self.as_byte() + 1]
    }
}

/// A single mutation for an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValueStoreOp {
    PutKeyValue(Vec<u8>, Vec<u8>),
    DeleteKey(Vec<u8>),
}

/// Bounds for a range scan. `None` bounds are open.
#[derive(Debug, Clone, Default)]
pub struct RangeQuery {
    /// Exclusive lower bound.
    pub gt: Option<Vec<u8>>,
    /// Inclusive lower bound.
    pub gte: Option<Vec<u8>>,
    /// Exclusive upper bound.
    pub lt: Option<Vec<u8>>,
    /// Inclusive upper bound.
    pub lte: Option<Vec<u8>>,
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl RangeQuery {
    /// All keys of `column`.
    pub fn column(column: DBColumn) -> Self {
        Self {
            gte: Some(vec![column.as_byte()]),
            lt: Some(column.end_key()),
            ..Self::default()
        }
    }
}

/// The database-engine contract.
///
/// The engine owns its concurrency discipline; callers may issue operations
/// from any thread.
pub trait KeyValueStore: Sync + Send + 'static {
    fn get_bytes(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    fn put_bytes(&self, key: &[u8], value: &[u8]) -> Result<(), Error>;

    fn key_delete(&self, key: &[u8]) -> Result<(), Error>;

    fn key_exists(&self, key: &[u8]) -> Result<bool, Error> {
        Ok(self.get_bytes(key)?.is_some())
    }

    /// Apply a batch atomically: either all mutations land or none do.
    fn do_atomically(&self, batch: Vec<KeyValueStoreOp>) -> Result<(), Error>;

    /// Scan a key range in order (reversed when `query.reverse`).
    fn iter_range(&self, query: RangeQuery) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error>;

    /// Hint that the engine may reclaim space in `[start, end)`.
    fn compact_range(&self, start: &[u8], end: &[u8]) -> Result<(), Error>;

    /// A cheap estimate of the on-disk size of `[start, end)`.
    fn approximate_size(&self, start: &[u8], end: &[u8]) -> Result<usize, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_prefixes_are_distinct_and_ordered() {
        let columns = [
            DBColumn::BeaconBlock,
            DBColumn::BeaconBlobSidecar,
            DBColumn::BeaconDataColumnSidecar,
            DBColumn::InvalidBlock,
            DBColumn::BeaconMeta,
        ];
        for pair in columns.windows(2) {
            assert!(pair[0].as_byte() < pair[1].as_byte());
        }
        for column in columns {
            assert_eq!(column.key(b"abc")[0], column.as_byte());
            assert_eq!(column.end_key(), vec![column.as_byte() + 1]);
        }
    }
}
