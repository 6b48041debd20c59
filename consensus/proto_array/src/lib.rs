//! An arena-backed fork-choice store.
//!
//! Nodes live in a contiguous vector; parent and best-descendant relations
//! are vector indices, never pointers. Pruning at finalization is a
//! compaction pass that rewrites the indices.

mod proto_array;
mod proto_array_fork_choice;

pub use crate::proto_array::{InvalidationOperation, ProtoArray, ProtoNode};
pub use crate::proto_array_fork_choice::{
    Block, ElasticList, ExecutionStatus, JustifiedBalances, ProtoArrayForkChoice, VoteTracker,
    calculate_committee_fraction,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    FinalizedNodeUnknown(types::Hash256),
    JustifiedNodeUnknown(types::Hash256),
    NodeUnknown(types::Hash256),
    InvalidNodeIndex(usize),
    InvalidParentIndex(usize),
    InvalidBestDescendant(usize),
    InvalidNodeDelta(usize),
    DeltaOverflow(usize),
    InvalidDeltaLen { deltas: usize, indices: usize },
    RevertedFinalizedEpoch {
        current_finalized_epoch: types::Epoch,
        new_finalized_epoch: types::Epoch,
    },
    InvalidAncestorOfValidPayload {
        ancestor_block_root: types::Hash256,
        ancestor_payload_block_hash: types::ExecutionBlockHash,
    },
    NoViableHead,
}
