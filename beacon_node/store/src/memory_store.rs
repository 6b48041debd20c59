use crate::{Error, KeyValueStore, KeyValueStoreOp, RangeQuery};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// A `BTreeMap`-backed store. The reference implementation of the
/// [`KeyValueStore`] contract and the default for tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    db: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.db.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_bytes(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.db.read().get(key).cloned())
    }

    fn put_bytes(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.db.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn key_delete(&self, key: &[u8]) -> Result<(), Error> {
        self.db.write().remove(key);
        Ok(())
    }

    fn do_atomically(&self, batch: Vec<KeyValueStoreOp>) -> Result<(), Error> {
        let mut db = self.db.write();
        for op in batch {
            match op {
                KeyValueStoreOp::PutKeyValue(key, value) => {
                    db.insert(key, value);
                }
                KeyValueStoreOp::DeleteKey(key) => {
                    db.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn iter_range(&self, query: RangeQuery) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let lower = match (&query.gte, &query.gt) {
            (Some(gte), _) => Bound::Included(gte.clone()),
            (None, Some(gt)) => Bound::Excluded(gt.clone()),
            (None, None) => Bound::Unbounded,
        };
        let upper = match (&query.lte, &query.lt) {
            (Some(lte), _) => Bound::Included(lte.clone()),
            (None, Some(lt)) => Bound::Excluded(lt.clone()),
            (None, None) => Bound::Unbounded,
        };

        let db = self.db.read();
        let iter = db
            .range((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()));

        let mut entries: Vec<_> = if query.reverse {
            let mut collected: Vec<_> = iter.collect();
            collected.reverse();
            collected
        } else {
            iter.collect()
        };

        if let Some(limit) = query.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    fn compact_range(&self, _start: &[u8], _end: &[u8]) -> Result<(), Error> {
        // The BTreeMap has no fragmentation to reclaim.
        Ok(())
    }

    fn approximate_size(&self, start: &[u8], end: &[u8]) -> Result<usize, Error> {
        let db = self.db.read();
        Ok(db
            .range((Bound::Included(start.to_vec()), Bound::Excluded(end.to_vec())))
            .map(|(k, v)| k.len() + v.len())
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(store: &MemoryStore, key: &[u8], value: &[u8]) {
        store.put_bytes(key, value).unwrap();
    }

    #[test]
    fn point_operations() {
        let store = MemoryStore::new();
        kv(&store, b"a", b"1");
        assert_eq!(store.get_bytes(b"a").unwrap(), Some(b"1".to_vec()));
        assert!(store.key_exists(b"a").unwrap());
        store.key_delete(b"a").unwrap();
        assert_eq!(store.get_bytes(b"a").unwrap(), None);
    }

    #[test]
    fn batch_is_applied_in_order() {
        let store = MemoryStore::new();
        store
            .do_atomically(vec![
                KeyValueStoreOp::PutKeyValue(b"a".to_vec(), b"1".to_vec()),
                KeyValueStoreOp::DeleteKey(b"a".to_vec()),
                KeyValueStoreOp::PutKeyValue(b"b".to_vec(), b"2".to_vec()),
            ])
            .unwrap();
        assert_eq!(store.get_bytes(b"a").unwrap(), None);
        assert_eq!(store.get_bytes(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn range_scans_respect_bounds_reverse_and_limit() {
        let store = MemoryStore::new();
        for i in 0u8..10 {
            kv(&store, &[i], &[i]);
        }

        let entries = store
            .iter_range(RangeQuery {
                gte: Some(vec![2]),
                lt: Some(vec![8]),
                ..RangeQuery::default()
            })
            .unwrap();
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0].0, vec![2]);
        assert_eq!(entries[5].0, vec![7]);

        let reversed = store
            .iter_range(RangeQuery {
                gt: Some(vec![2]),
                lte: Some(vec![8]),
                reverse: true,
                limit: Some(2),
                ..RangeQuery::default()
            })
            .unwrap();
        assert_eq!(
            reversed.iter().map(|(k, _)| k[0]).collect::<Vec<_>>(),
            vec![8, 7]
        );
    }

    #[test]
    fn approximate_size_counts_range_only() {
        let store = MemoryStore::new();
        kv(&store, b"a", b"xx");
        kv(&store, b"b", b"yy");
        kv(&store, b"z", b"zz");
        let size = store.approximate_size(b"a", b"c").unwrap();
        assert_eq!(size, 6);
    }
}
