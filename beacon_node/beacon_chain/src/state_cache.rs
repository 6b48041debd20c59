//! Post-states keyed by block-root hex.
//!
//! The cache is multi-reader/single-writer; readers clone an `Arc` and never
//! mutate. The head state and checkpoint states are pinned with strong
//! references; everything else is evictable.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use types::{BeaconState, EthSpec, Hash256};

/// Unpinned states kept around beyond this count are evicted oldest-first.
const UNPINNED_STATE_BUDGET: usize = 32;

pub fn root_hex(block_root: &Hash256) -> String {
    format!("{block_root:?}")
}

pub struct StateCache<E: EthSpec> {
    inner: RwLock<Inner<E>>,
}

struct Inner<E: EthSpec> {
    states: HashMap<String, Arc<BeaconState<E>>>,
    /// Insertion order of unpinned keys, for eviction.
    insertion_order: Vec<String>,
    pinned: HashSet<String>,
}

impl<E: EthSpec> Default for StateCache<E> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                states: HashMap::new(),
                insertion_order: Vec::new(),
                pinned: HashSet::new(),
            }),
        }
    }
}

impl<E: EthSpec> StateCache<E> {
    pub fn insert(&self, block_root: Hash256, state: Arc<BeaconState<E>>) {
        let key = root_hex(&block_root);
        let mut inner = self.inner.write();
        if inner.states.insert(key.clone(), state).is_none() {
            inner.insertion_order.push(key);
        }
        Self::evict_excess(&mut inner);
    }

    pub fn get(&self, block_root: &Hash256) -> Option<Arc<BeaconState<E>>> {
        self.inner.read().states.get(&root_hex(block_root)).cloned()
    }

    pub fn contains(&self, block_root: &Hash256) -> bool {
        self.inner.read().states.contains_key(&root_hex(block_root))
    }

    /// Pin a state (head or checkpoint): exempt from eviction until
    /// unpinned.
    pub fn pin(&self, block_root: &Hash256) {
        let key = root_hex(block_root);
        let mut inner = self.inner.write();
        inner.pinned.insert(key.clone());
        inner.insertion_order.retain(|existing| *existing != key);
    }

    pub fn unpin(&self, block_root: &Hash256) {
        let key = root_hex(block_root);
        let mut inner = self.inner.write();
        if inner.pinned.remove(&key) && inner.states.contains_key(&key) {
            inner.insertion_order.push(key);
        }
        Self::evict_excess(&mut inner);
    }

    pub fn len(&self) -> usize {
        self.inner.read().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().states.is_empty()
    }

    fn evict_excess(inner: &mut Inner<E>) {
        while inner.insertion_order.len() > UNPINNED_STATE_BUDGET {
            let key = inner.insertion_order.remove(0);
            inner.states.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{FixedBytesExtended, MainnetEthSpec};

    type E = MainnetEthSpec;

    fn state() -> Arc<BeaconState<E>> {
        Arc::new(BeaconState::new(Hash256::zero(), vec![]))
    }

    #[test]
    fn insert_get_and_hex_keying() {
        let cache = StateCache::<E>::default();
        let root = Hash256::from_low_u64_be(0xabcd);
        cache.insert(root, state());
        assert!(cache.contains(&root));
        assert!(cache.get(&root).is_some());
        assert!(root_hex(&root).starts_with("0x"));
    }

    #[test]
    fn pinned_states_survive_eviction() {
        let cache = StateCache::<E>::default();
        let pinned_root = Hash256::from_low_u64_be(0);
        cache.insert(pinned_root, state());
        cache.pin(&pinned_root);

        for i in 1..=(UNPINNED_STATE_BUDGET as u64 + 8) {
            cache.insert(Hash256::from_low_u64_be(i), state());
        }

        assert!(cache.contains(&pinned_root), "pinned state must survive");
        assert!(
            !cache.contains(&Hash256::from_low_u64_be(1)),
            "oldest unpinned state evicted"
        );
    }
}
