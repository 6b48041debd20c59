//! Typed pub/sub for chain observations.
//!
//! Emission is send-and-forget: `broadcast` channels never block the import
//! path, and a receiver that lags simply misses events. Listeners cannot
//! corrupt import.

use std::sync::Arc;
use tokio::sync::broadcast;
use types::{
    Attestation, AttesterSlashing, BlobSidecar, Checkpoint, DataColumnSidecar, Epoch, EthSpec,
    Hash256, ProposerSlashing, SignedBlsToExecutionChange, SignedVoluntaryExit, Slot,
};

const DEFAULT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct SseHead {
    pub slot: Slot,
    pub block: Hash256,
    pub state: Hash256,
    pub current_duty_dependent_root: Hash256,
    pub previous_duty_dependent_root: Hash256,
    pub epoch_transition: bool,
    pub execution_optimistic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SseBlock {
    pub slot: Slot,
    pub block: Hash256,
    pub execution_optimistic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SseChainReorg {
    pub slot: Slot,
    pub depth: u64,
    pub old_head_block: Hash256,
    pub new_head_block: Hash256,
    pub old_head_state: Hash256,
    pub new_head_state: Hash256,
    pub epoch: Epoch,
    pub execution_optimistic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SseFinalizedCheckpoint {
    pub checkpoint: Checkpoint,
    pub execution_optimistic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SseBlobSidecar {
    pub block_root: Hash256,
    pub index: u64,
    pub slot: Slot,
    pub kzg_commitment: kzg::KzgCommitment,
}

impl SseBlobSidecar {
    pub fn from_blob_sidecar<E: EthSpec>(sidecar: &BlobSidecar<E>) -> Self {
        Self {
            block_root: sidecar.block_root(),
            index: sidecar.index,
            slot: sidecar.slot(),
            kzg_commitment: sidecar.kzg_commitment,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SseDataColumnSidecar {
    pub block_root: Hash256,
    pub index: u64,
    pub slot: Slot,
}

impl SseDataColumnSidecar {
    pub fn from_data_column_sidecar<E: EthSpec>(sidecar: &DataColumnSidecar<E>) -> Self {
        Self {
            block_root: sidecar.block_root(),
            index: sidecar.index,
            slot: sidecar.slot(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EventKind<E: EthSpec> {
    Head(SseHead),
    Block(SseBlock),
    ChainReorg(SseChainReorg),
    FinalizedCheckpoint(SseFinalizedCheckpoint),
    BlobSidecar(SseBlobSidecar),
    DataColumnSidecar(SseDataColumnSidecar),
    Attestation(Box<Attestation<E>>),
    AttesterSlashing(Box<AttesterSlashing<E>>),
    ProposerSlashing(Box<ProposerSlashing>),
    VoluntaryExit(Box<SignedVoluntaryExit>),
    BlsToExecutionChange(Box<SignedBlsToExecutionChange>),
}

pub struct ServerSentEventHandler<E: EthSpec> {
    sender: broadcast::Sender<Arc<EventKind<E>>>,
}

impl<E: EthSpec> Default for ServerSentEventHandler<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl<E: EthSpec> ServerSentEventHandler<E> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EventKind<E>>> {
        self.sender.subscribe()
    }

    /// Fire an event. Never blocks; an event with no subscribers is dropped.
    pub fn register(&self, event: EventKind<E>) {
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{FixedBytesExtended, MainnetEthSpec};

    type E = MainnetEthSpec;

    #[tokio::test]
    async fn events_reach_subscribers() {
        let handler = ServerSentEventHandler::<E>::default();
        let mut receiver = handler.subscribe();

        handler.register(EventKind::Block(SseBlock {
            slot: Slot::new(1),
            block: Hash256::from_low_u64_be(1),
            execution_optimistic: false,
        }));

        match &*receiver.recv().await.unwrap() {
            EventKind::Block(block) => assert_eq!(block.slot, Slot::new(1)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn register_without_subscribers_does_not_block_or_panic() {
        let handler = ServerSentEventHandler::<E>::default();
        for _ in 0..100 {
            handler.register(EventKind::FinalizedCheckpoint(SseFinalizedCheckpoint {
                checkpoint: Checkpoint::default(),
                execution_optimistic: false,
            }));
        }
    }
}
