//! The API publish path (C9).
//!
//! An API-published block is fanned out to gossip *before* local commit:
//! the network sees it at the earliest moment, and the local import then
//! races the gossip copies idempotently. Blinded blocks are reconstructed
//! from the local producer cache or the external builder first.

use crate::Context;
use crate::error::Error;
use axum::http::StatusCode;
use beacon_chain::block_input::AvailableData;
use beacon_chain::block_verification::BlockError;
use beacon_chain::data_availability_checker::AvailableBlock;
use beacon_chain::{BeaconChainTypes, BlockProcessingOptions};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use slot_clock::SlotClock;
use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};
use types::{
    BlobSidecar, BlobSidecarList, DataColumnSidecar, DataColumnSidecarList, EthSpec,
    ExecutionBlockHash, Hash256, SignedBeaconBlock,
};

/// A blinded block: the proposer signed it without holding the payload or
/// blob contents, which must be recovered from the producer cache or the
/// builder before publication.
pub type SignedBlindedBeaconBlock<E> = SignedBeaconBlock<E>;

const PRODUCER_CACHE_SIZE: NonZeroUsize = NonZeroUsize::new(4).expect("non-zero");

/// The validation level selected with the `broadcast_validation` query
/// parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastValidation {
    #[default]
    Gossip,
    Consensus,
    ConsensusAndEquivocation,
    /// Skip validation entirely; the response is 202 Accepted.
    None,
}

/// A block plus the blobs it commits to, as POSTed by validators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "E: EthSpec")]
pub struct PublishBlockRequest<E: EthSpec> {
    pub signed_block: Arc<SignedBeaconBlock<E>>,
    #[serde(default)]
    pub blobs: Vec<Vec<u8>>,
}

/// Messages handed to the gossip publisher.
#[derive(Debug, Clone)]
pub enum NetworkMessage<E: EthSpec> {
    PublishBlock(Arc<SignedBeaconBlock<E>>),
    PublishBlobs(BlobSidecarList<E>),
    PublishColumns(DataColumnSidecarList<E>),
}

/// Locally produced block contents, for blinded-block reconstruction.
pub struct ProducerCache<E: EthSpec> {
    by_block_root: LruCache<Hash256, PublishBlockRequest<E>>,
    by_payload_hash: LruCache<ExecutionBlockHash, Hash256>,
}

impl<E: EthSpec> Default for ProducerCache<E> {
    fn default() -> Self {
        Self {
            by_block_root: LruCache::new(PRODUCER_CACHE_SIZE),
            by_payload_hash: LruCache::new(PRODUCER_CACHE_SIZE),
        }
    }
}

impl<E: EthSpec> ProducerCache<E> {
    pub fn insert(&mut self, contents: PublishBlockRequest<E>) {
        let block_root = contents.signed_block.canonical_root();
        let payload_hash = contents.signed_block.body().execution_payload().block_hash;
        self.by_block_root.put(block_root, contents);
        if !payload_hash.is_zero() {
            self.by_payload_hash.put(payload_hash, block_root);
        }
    }

    pub fn get_by_root(&mut self, block_root: &Hash256) -> Option<PublishBlockRequest<E>> {
        self.by_block_root.get(block_root).cloned()
    }

    pub fn get_by_payload_hash(
        &mut self,
        payload_hash: &ExecutionBlockHash,
    ) -> Option<PublishBlockRequest<E>> {
        let block_root = *self.by_payload_hash.get(payload_hash)?;
        self.by_block_root.get(&block_root).cloned()
    }
}

/// The external-builder contract for blinded blocks.
pub trait BuilderApi<E: EthSpec>: Send + Sync {
    /// Pre-Fulu: submit the blinded block, receive the unblinded contents.
    fn submit_blinded_block(
        &self,
        block: Arc<SignedBlindedBeaconBlock<E>>,
    ) -> Pin<Box<dyn Future<Output = Result<PublishBlockRequest<E>, String>> + Send>>;

    /// Fulu+: the builder publishes the contents itself; no response body.
    fn submit_blinded_block_no_response(
        &self,
        block: Arc<SignedBlindedBeaconBlock<E>>,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
}

/// Publish a full block: validate at the selected level, wait out benign
/// clock skew, fan out, then import.
pub async fn publish_block<T: BeaconChainTypes>(
    ctx: &Arc<Context<T>>,
    request: PublishBlockRequest<T::EthSpec>,
    validation: BroadcastValidation,
) -> Result<StatusCode, Error> {
    let chain = &ctx.chain;
    let block = request.signed_block.clone();
    let block_root = block.canonical_root();

    // Clock-skew handling: a publish slightly ahead of its slot sleeps
    // until the slot starts; a larger skew fails fast.
    wait_for_slot_start(ctx, &block).await?;

    // Assemble availability from the provided contents before validating:
    // the consensus levels need the data at hand.
    let available = make_available(ctx, &request)?;

    match validation {
        BroadcastValidation::None => {}
        BroadcastValidation::Gossip => {
            chain
                .verify_block_for_gossip(block.clone())
                .map_err(|e| map_publish_error(ctx, block_root, e))?;
        }
        BroadcastValidation::Consensus => {
            chain
                .verify_block_for_gossip(block.clone())
                .map_err(|e| map_publish_error(ctx, block_root, e))?;
            verify_consensus(ctx, &available).await?;
        }
        BroadcastValidation::ConsensusAndEquivocation => {
            chain
                .verify_block_for_gossip(block.clone())
                .map_err(|e| map_publish_error(ctx, block_root, e))?;
            verify_consensus(ctx, &available).await?;
            // Equivocation: a *different* block by this proposer for the
            // slot. An identical repeat is not an equivocation.
            let equivocates = {
                let mut observed = chain.observed_block_producers.write();
                let _ = observed.observe_proposal(block.slot(), block.proposer_index(), block_root);
                observed.proposer_has_equivocated(
                    block.slot(),
                    block.proposer_index(),
                    block_root,
                )
            };
            if equivocates {
                return Err(Error::BroadcastValidationFailed(format!(
                    "proposer {} already proposed a different block at slot {}",
                    block.proposer_index(),
                    block.slot()
                )));
            }
        }
    }

    // Fan-out order: the block first, then its data in parallel.
    let _ = ctx
        .network_tx
        .send(NetworkMessage::PublishBlock(block.clone()));
    match &available.data {
        AvailableData::Blobs(blobs) => {
            let _ = ctx
                .network_tx
                .send(NetworkMessage::PublishBlobs(blobs.clone()));
        }
        AvailableData::DataColumns(columns) => {
            let _ = ctx
                .network_tx
                .send(NetworkMessage::PublishColumns(columns.clone()));
        }
        AvailableData::NoData => {}
    }

    // Local import: gossip already carries the block, so there is no
    // disk-persistence urgency.
    let opts = BlockProcessingOptions {
        ignore_if_known: true,
        eager_persist_block: false,
        ..BlockProcessingOptions::default()
    };
    match chain.process_available_block(available, opts).await {
        Ok(_) => {}
        Err(e) => return Err(map_publish_error(ctx, block_root, e)),
    }

    debug!(root = ?block_root, slot = %block.slot(), "Block published");

    if validation == BroadcastValidation::None {
        Ok(StatusCode::ACCEPTED)
    } else {
        Ok(StatusCode::OK)
    }
}

/// Publish a blinded block: reconstruct the contents, then follow the full
/// publish path.
pub async fn publish_blinded_block<T: BeaconChainTypes>(
    ctx: &Arc<Context<T>>,
    block: SignedBlindedBeaconBlock<T::EthSpec>,
    validation: BroadcastValidation,
) -> Result<StatusCode, Error> {
    let block = Arc::new(block);
    let block_root = block.canonical_root();
    let payload_hash = block.body().execution_payload().block_hash;

    // Local producer cache first: by block root, then by payload hash.
    let cached = {
        let mut cache = ctx.producer_cache.write();
        cache
            .get_by_root(&block_root)
            .or_else(|| cache.get_by_payload_hash(&payload_hash))
    };
    if let Some(contents) = cached {
        return publish_block(ctx, contents, validation).await;
    }

    // Otherwise the builder owns the contents.
    let builder = ctx
        .builder
        .as_ref()
        .ok_or_else(|| Error::BadRequest("no builder configured for blinded block".into()))?;

    let fork_name = ctx.chain.spec.fork_name_at_slot::<T::EthSpec>(block.slot());
    if fork_name.fulu_enabled() {
        // Fulu+: the builder publishes directly; nothing further to do
        // locally beyond acknowledging.
        builder
            .submit_blinded_block_no_response(block)
            .await
            .map_err(Error::ServerError)?;
        return Ok(StatusCode::ACCEPTED);
    }

    let contents = builder
        .submit_blinded_block(block)
        .await
        .map_err(Error::ServerError)?;
    publish_block(ctx, contents, validation).await
}

/// Sleep until the block's slot starts when the skew is tolerable; error
/// out when it is not.
async fn wait_for_slot_start<T: BeaconChainTypes>(
    ctx: &Arc<Context<T>>,
    block: &SignedBeaconBlock<T::EthSpec>,
) -> Result<(), Error> {
    let chain = &ctx.chain;
    let Some(until_slot) = chain.slot_clock.duration_to_slot(block.slot()) else {
        // The slot already started (or the clock is unreadable): proceed.
        return Ok(());
    };
    if until_slot > chain.spec.max_api_clock_disparity() {
        return Err(Error::BadRequest(format!(
            "block slot {} starts {}ms in the future, beyond the {}ms tolerance",
            block.slot(),
            until_slot.as_millis(),
            chain.spec.max_api_clock_disparity().as_millis()
        )));
    }
    debug!(
        slot = %block.slot(),
        sleep_ms = until_slot.as_millis() as u64,
        "Publish ahead of slot; waiting"
    );
    tokio::time::sleep(until_slot).await;
    Ok(())
}

/// Build the `AvailableBlock` for the publish path from the POSTed
/// contents.
fn make_available<T: BeaconChainTypes>(
    ctx: &Arc<Context<T>>,
    request: &PublishBlockRequest<T::EthSpec>,
) -> Result<AvailableBlock<T::EthSpec>, Error> {
    let chain = &ctx.chain;
    let block = request.signed_block.clone();
    let block_root = block.canonical_root();
    let expected = block.num_expected_blobs();

    if expected == 0 {
        return Ok(AvailableBlock {
            block_root,
            block,
            data: AvailableData::NoData,
            reconstructed_columns: vec![],
        });
    }
    if request.blobs.len() != expected {
        return Err(Error::BadRequest(format!(
            "block commits to {expected} blobs but {} were provided",
            request.blobs.len()
        )));
    }

    let fork_name = chain.spec.fork_name_at_slot::<T::EthSpec>(block.slot());
    let data = if fork_name.fulu_enabled() {
        let columns = DataColumnSidecar::build_sidecars(&block, &request.blobs, &chain.kzg)
            .map_err(Error::ServerError)?;
        AvailableData::DataColumns(columns)
    } else {
        let blobs = request
            .blobs
            .iter()
            .map(|bytes| {
                types::Blob::<T::EthSpec>::new(bytes.clone())
                    .map_err(|e| Error::BadRequest(format!("bad blob length: {e:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let sidecars = BlobSidecar::build_sidecars(&block, blobs, &chain.kzg)
            .map_err(Error::ServerError)?;
        AvailableData::Blobs(sidecars)
    };

    Ok(AvailableBlock {
        block_root,
        block,
        data,
        reconstructed_columns: vec![],
    })
}

async fn verify_consensus<T: BeaconChainTypes>(
    ctx: &Arc<Context<T>>,
    available: &AvailableBlock<T::EthSpec>,
) -> Result<(), Error> {
    let opts = BlockProcessingOptions {
        verify_only: true,
        skip_verify_execution_payload: true,
        ignore_if_known: true,
        ..BlockProcessingOptions::default()
    };
    ctx.chain
        .process_available_block(available.clone(), opts)
        .await
        .map(|_| ())
        .map_err(|e| map_publish_error(ctx, available.block_root, e))
}

/// Map import errors onto API errors. `ParentUnknown` from local import is
/// re-classified as a sync notification: another publisher may own the
/// parent.
fn map_publish_error<T: BeaconChainTypes>(
    ctx: &Arc<Context<T>>,
    block_root: Hash256,
    error: BlockError,
) -> Error {
    match error {
        BlockError::ParentUnknown { parent_root } => {
            ctx.chain.notify_unknown_block_parent(block_root, parent_root);
            Error::BroadcastValidationFailed(format!("parent unknown: {parent_root:?}"))
        }
        BlockError::BlockIsAlreadyKnown(_) => {
            Error::BadRequest("block is already known".to_string())
        }
        other => {
            warn!(?block_root, error = ?other, "Publish validation failed");
            Error::BroadcastValidationFailed(format!("{other:?}"))
        }
    }
}

/// Record locally produced block contents for later blinded publication.
pub fn cache_produced_block<T: BeaconChainTypes>(
    ctx: &Arc<Context<T>>,
    contents: PublishBlockRequest<T::EthSpec>,
) {
    ctx.producer_cache.write().insert(contents);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;
    use beacon_chain::test_utils::{BeaconChainHarness, E, TestChainTypes};
    use parking_lot::RwLock;
    use slot_clock::SlotClock;
    use std::time::Duration;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
    use types::{ForkName, Slot};

    fn context(
        harness: &BeaconChainHarness,
    ) -> (
        Arc<Context<TestChainTypes>>,
        UnboundedReceiver<NetworkMessage<E>>,
    ) {
        let (network_tx, network_rx) = unbounded_channel();
        (
            Arc::new(Context {
                chain: harness.chain.clone(),
                network_tx,
                producer_cache: RwLock::new(ProducerCache::default()),
                builder: None,
            }),
            network_rx,
        )
    }

    /// Position the manual clock `before` the start of `slot`.
    fn set_clock_before_slot(harness: &BeaconChainHarness, slot: Slot, before: Duration) {
        let start = harness.chain.slot_clock.start_of(slot).unwrap();
        harness.chain.slot_clock.set_current_time(start - before);
    }

    /// S6 (first half): a publish slightly ahead of the slot sleeps until
    /// the slot, then fans out block-first and imports.
    #[tokio::test]
    async fn publish_ahead_of_slot_waits_then_fans_out() {
        let harness = BeaconChainHarness::new(ForkName::Deneb);
        let (ctx, mut network_rx) = context(&harness);

        harness.set_slot(1);
        let (block, blobs) = harness.produce_block(Slot::new(1), &[vec![9u8; 32]]);
        let block_root = block.canonical_root();

        // 400ms ahead: inside both the API and gossip disparity budgets.
        set_clock_before_slot(&harness, Slot::new(1), Duration::from_millis(400));

        let status = publish_block(
            &ctx,
            PublishBlockRequest {
                signed_block: block,
                blobs,
            },
            BroadcastValidation::Gossip,
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(ctx.chain.knows_block(&block_root));

        // Block first, then the data.
        match network_rx.try_recv().unwrap() {
            NetworkMessage::PublishBlock(published) => {
                assert_eq!(published.canonical_root(), block_root)
            }
            other => panic!("expected the block first, got {other:?}"),
        }
        match network_rx.try_recv().unwrap() {
            NetworkMessage::PublishBlobs(blobs) => assert_eq!(blobs.len(), 1),
            other => panic!("expected blobs second, got {other:?}"),
        }
    }

    /// S6 (second half): two seconds ahead is a clock error.
    #[tokio::test]
    async fn publish_too_far_ahead_fails_fast() {
        let harness = BeaconChainHarness::new(ForkName::Deneb);
        let (ctx, _network_rx) = context(&harness);

        harness.set_slot(1);
        let (block, blobs) = harness.produce_block(Slot::new(1), &[]);
        set_clock_before_slot(&harness, Slot::new(1), Duration::from_secs(2));

        let error = publish_block(
            &ctx,
            PublishBlockRequest {
                signed_block: block,
                blobs,
            },
            BroadcastValidation::Gossip,
        )
        .await
        .unwrap_err();
        assert!(matches!(error, Error::BadRequest(_)));
    }

    /// `broadcast_validation=none` skips validation and answers 202.
    #[tokio::test]
    async fn publish_without_validation_is_accepted() {
        let harness = BeaconChainHarness::new(ForkName::Deneb);
        let (ctx, _network_rx) = context(&harness);

        harness.set_slot(1);
        let (block, blobs) = harness.produce_block(Slot::new(1), &[]);
        let status = publish_block(
            &ctx,
            PublishBlockRequest {
                signed_block: block,
                blobs,
            },
            BroadcastValidation::None,
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    /// A second, conflicting block from the same proposer fails the
    /// equivocation-strict publish.
    #[tokio::test]
    async fn conflicting_publish_fails() {
        let harness = BeaconChainHarness::new(ForkName::Deneb);
        let (ctx, _network_rx) = context(&harness);

        harness.set_slot(1);
        let (block_a, blobs_a) = harness.produce_block(Slot::new(1), &[]);
        let parent = block_a.parent_root();
        publish_block(
            &ctx,
            PublishBlockRequest {
                signed_block: block_a,
                blobs: blobs_a,
            },
            BroadcastValidation::ConsensusAndEquivocation,
        )
        .await
        .unwrap();

        // Same slot, same proposer, different contents.
        let (block_b, blobs_b) = harness.produce_block_on(parent, Slot::new(1), &[vec![3u8; 8]]);
        let error = publish_block(
            &ctx,
            PublishBlockRequest {
                signed_block: block_b,
                blobs: blobs_b,
            },
            BroadcastValidation::ConsensusAndEquivocation,
        )
        .await
        .unwrap_err();
        assert!(matches!(error, Error::BroadcastValidationFailed(_)));
    }

    /// A blinded block resolves through the producer cache.
    #[tokio::test]
    async fn blinded_publish_uses_producer_cache() {
        let harness = BeaconChainHarness::new(ForkName::Deneb);
        let (ctx, mut network_rx) = context(&harness);

        harness.set_slot(1);
        let (block, blobs) = harness.produce_block(Slot::new(1), &[vec![5u8; 16]]);
        let block_root = block.canonical_root();
        cache_produced_block(
            &ctx,
            PublishBlockRequest {
                signed_block: block.clone(),
                blobs,
            },
        );

        let status = publish_blinded_block(&ctx, (*block).clone(), BroadcastValidation::Gossip)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(ctx.chain.knows_block(&block_root));
        assert!(matches!(
            network_rx.try_recv().unwrap(),
            NetworkMessage::PublishBlock(_)
        ));
    }

    /// Without a builder or cached contents, a blinded block cannot be
    /// published.
    #[tokio::test]
    async fn blinded_publish_without_source_fails() {
        let harness = BeaconChainHarness::new(ForkName::Deneb);
        let (ctx, _network_rx) = context(&harness);

        harness.set_slot(1);
        let (block, _) = harness.produce_block(Slot::new(1), &[]);
        let error = publish_blinded_block(&ctx, (*block).clone(), BroadcastValidation::Gossip)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::BadRequest(_)));
    }
}
