use crate::error::Error;
use beacon_chain::{BeaconChain, BeaconChainTypes};
use std::str::FromStr;
use std::sync::Arc;
use types::{EthSpec, Hash256, SignedBeaconBlock, Slot};

/// The `{block_id}` path parameter of the beacon API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockId {
    Head,
    Genesis,
    Finalized,
    Slot(Slot),
    Root(Hash256),
}

impl FromStr for BlockId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "head" => Ok(BlockId::Head),
            "genesis" => Ok(BlockId::Genesis),
            "finalized" => Ok(BlockId::Finalized),
            other if other.starts_with("0x") => {
                let bytes = hex::decode(&other[2..]).map_err(|e| format!("invalid root: {e}"))?;
                if bytes.len() != 32 {
                    return Err(format!("invalid root length: {}", bytes.len()));
                }
                Ok(BlockId::Root(Hash256::from_slice(&bytes)))
            }
            other => other
                .parse::<u64>()
                .map(|slot| BlockId::Slot(Slot::new(slot)))
                .map_err(|_| format!("invalid block id: {other}")),
        }
    }
}

impl BlockId {
    /// Resolve to a concrete `(root, block)` pair.
    pub fn resolve_block<T: BeaconChainTypes>(
        &self,
        chain: &BeaconChain<T>,
    ) -> Result<(Hash256, Arc<SignedBeaconBlock<T::EthSpec>>), Error> {
        let root = match self {
            BlockId::Head => chain.head_block_root(),
            BlockId::Genesis => chain.genesis_block_root,
            BlockId::Finalized => chain.finalized_checkpoint().root,
            BlockId::Slot(slot) => {
                let head = chain.head_block_root();
                let fork_choice = chain.canonical_head.fork_choice.read();
                let root = fork_choice
                    .proto_array()
                    .ancestor_at_slot(head, *slot)
                    .ok_or_else(|| Error::NotFound(format!("no block at slot {slot}")))?;
                // `ancestor_at_slot` returns the nearest earlier block for
                // skip slots; the API treats those as not-found.
                let node = fork_choice
                    .get_block(&root)
                    .ok_or_else(|| Error::NotFound(format!("no block at slot {slot}")))?;
                if node.slot != *slot {
                    return Err(Error::NotFound(format!("no block at slot {slot}")));
                }
                root
            }
            BlockId::Root(root) => *root,
        };

        let block = chain
            .store
            .get_block(&root, &chain.spec)
            .map_err(|e| Error::ServerError(format!("{e:?}")))?
            .map(Arc::new)
            .ok_or_else(|| Error::NotFound(format!("block not found: {root:?}")))?;
        Ok((root, block))
    }
}

/// Is `root` on the canonical chain?
pub fn is_canonical<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    root: Hash256,
    slot: Slot,
) -> bool {
    let head = chain.head_block_root();
    chain
        .canonical_head
        .fork_choice
        .read()
        .proto_array()
        .ancestor_at_slot(head, slot)
        == Some(root)
}

/// Is `root` finalized (canonical and at or before the finalized slot)?
pub fn is_finalized<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    root: Hash256,
    slot: Slot,
) -> bool {
    let finalized_slot = chain
        .finalized_checkpoint()
        .epoch
        .start_slot(T::EthSpec::slots_per_epoch());
    slot <= finalized_slot && is_canonical(chain, root, slot)
}
