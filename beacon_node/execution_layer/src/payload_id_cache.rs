use crate::{PayloadAttributes, PayloadId};
use lru::LruCache;
use std::num::NonZeroUsize;
use types::{ExecutionBlockHash, Hash256};

const PAYLOAD_ID_LRU_CACHE_SIZE: usize = 10;

/// Key for a payload under construction: the head it builds on plus the
/// attributes it was requested with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadIdCacheKey {
    pub head_block_hash: ExecutionBlockHash,
    pub timestamp: u64,
    pub prev_randao: Hash256,
}

impl PayloadIdCacheKey {
    pub fn new(head_block_hash: ExecutionBlockHash, attributes: &PayloadAttributes) -> Self {
        Self {
            head_block_hash,
            timestamp: attributes.timestamp,
            prev_randao: attributes.prev_randao,
        }
    }
}

#[derive(Debug)]
pub struct PayloadIdCache {
    cache: LruCache<PayloadIdCacheKey, PayloadId>,
}

impl PayloadIdCache {
    pub fn new() -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(PAYLOAD_ID_LRU_CACHE_SIZE).expect("cache size is non-zero"),
            ),
        }
    }

    pub fn insert(&mut self, key: PayloadIdCacheKey, payload_id: PayloadId) {
        self.cache.put(key, payload_id);
    }

    pub fn get(&mut self, key: &PayloadIdCacheKey) -> Option<PayloadId> {
        self.cache.get(key).copied()
    }
}

impl Default for PayloadIdCache {
    fn default() -> Self {
        Self::new()
    }
}
