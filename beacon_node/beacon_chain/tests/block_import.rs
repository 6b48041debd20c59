//! End-to-end import scenarios over the gossip entry points.

use beacon_chain::data_availability_checker::{Availability, AvailableBlock};
use beacon_chain::events::EventKind;
use beacon_chain::test_utils::BeaconChainHarness;
use beacon_chain::block_input::AvailableData;
use beacon_chain::block_verification::BlockError;
use beacon_chain::blob_verification::GossipBlobError;
use beacon_chain::{BlockProcessingOptions, ValidationAction};
use std::sync::Arc;
use types::{Checkpoint, Epoch, ForkName, Slot};

fn collect_events<E: types::EthSpec>(
    receiver: &mut tokio::sync::broadcast::Receiver<Arc<EventKind<E>>>,
) -> Vec<Arc<EventKind<E>>> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

/// S1: post-Deneb gossip happy path. The block and both blobs must arrive
/// before `ReadyForImport` flips; import emits `block`, `blob_sidecar` x2
/// and `head`.
#[tokio::test]
async fn deneb_gossip_happy_path() {
    let harness = BeaconChainHarness::new(ForkName::Deneb);
    let chain = harness.chain.clone();
    let mut events = chain.event_handler.subscribe();

    harness.set_slot(1);
    let (block, blobs) = harness.produce_block(Slot::new(1), &[vec![1u8; 32], vec![2u8; 32]]);
    let block_root = block.canonical_root();
    let sidecars = harness.make_blob_sidecars(&block, &blobs);

    // The block alone does not make the input available.
    let verified = chain.verify_block_for_gossip(block.clone()).unwrap();
    let availability = chain.process_gossip_block(verified).await.unwrap();
    assert!(matches!(availability, Availability::MissingComponents(_)));
    assert!(!chain.knows_block(&block_root));

    // Blob 0 on subnet 0: still missing one.
    let verified = chain
        .verify_blob_sidecar_for_gossip(sidecars[0].clone(), 0)
        .unwrap();
    let availability = chain.process_gossip_blob(verified).await.unwrap();
    assert!(matches!(availability, Availability::MissingComponents(_)));

    // Blob 1 on subnet 1: ready, verified, imported.
    let verified = chain
        .verify_blob_sidecar_for_gossip(sidecars[1].clone(), 1)
        .unwrap();
    let availability = chain.process_gossip_blob(verified).await.unwrap();
    assert!(matches!(availability, Availability::Available(_)));
    assert!(chain.knows_block(&block_root));
    assert_eq!(chain.head_block_root(), block_root);

    let events = collect_events(&mut events);
    let blocks = events
        .iter()
        .filter(|e| matches!(***e, EventKind::Block(_)))
        .count();
    let blob_sidecars = events
        .iter()
        .filter(|e| matches!(***e, EventKind::BlobSidecar(_)))
        .count();
    let heads = events
        .iter()
        .filter(|e| matches!(***e, EventKind::Head(_)))
        .count();
    assert_eq!(blocks, 1);
    assert_eq!(blob_sidecars, 2);
    assert_eq!(heads, 1);
}

/// S2: sidecars ahead of the block, out of index order. The final input
/// holds the blobs in ascending order.
#[tokio::test]
async fn out_of_order_sidecars() {
    let harness = BeaconChainHarness::new(ForkName::Deneb);
    let chain = harness.chain.clone();

    harness.set_slot(1);
    let (block, blobs) = harness.produce_block(Slot::new(1), &[vec![1u8; 32], vec![2u8; 32]]);
    let sidecars = harness.make_blob_sidecars(&block, &blobs);

    // Blob 1 arrives first, then blob 0, then the block.
    let verified = chain
        .verify_blob_sidecar_for_gossip(sidecars[1].clone(), 1)
        .unwrap();
    assert!(matches!(
        chain.process_gossip_blob(verified).await.unwrap(),
        Availability::MissingComponents(_)
    ));

    let verified = chain
        .verify_blob_sidecar_for_gossip(sidecars[0].clone(), 0)
        .unwrap();
    assert!(matches!(
        chain.process_gossip_blob(verified).await.unwrap(),
        Availability::MissingComponents(_)
    ));

    let verified = chain.verify_block_for_gossip(block.clone()).unwrap();
    let availability = chain.process_gossip_block(verified).await.unwrap();

    match availability {
        Availability::Available(available) => match &available.data {
            AvailableData::Blobs(blobs) => {
                assert_eq!(blobs.len(), 2);
                assert_eq!(blobs[0].index, 0);
                assert_eq!(blobs[1].index, 1);
            }
            other => panic!("expected blobs, got {other:?}"),
        },
        Availability::MissingComponents(root) => panic!("still missing components: {root:?}"),
    }
    assert!(chain.knows_block(&block.canonical_root()));
}

/// S3: a different blob under an already-occupied tuple is REJECTed and
/// leaves no trace.
#[tokio::test]
async fn conflicting_sidecar_tuple_is_rejected() {
    let harness = BeaconChainHarness::new(ForkName::Deneb);
    let chain = harness.chain.clone();

    harness.set_slot(1);
    let (block, blobs) = harness.produce_block(Slot::new(1), &[vec![1u8; 32], vec![2u8; 32]]);
    let sidecars = harness.make_blob_sidecars(&block, &blobs);

    let verified = chain.verify_block_for_gossip(block.clone()).unwrap();
    chain.process_gossip_block(verified).await.unwrap();
    let verified = chain
        .verify_blob_sidecar_for_gossip(sidecars[0].clone(), 0)
        .unwrap();
    chain.process_gossip_blob(verified).await.unwrap();

    // Forge a different sidecar claiming the same (slot, proposer, 0).
    let mut forged = (*sidecars[1]).clone();
    forged.index = 0;
    let error = chain
        .verify_blob_sidecar_for_gossip(Arc::new(forged), 0)
        .unwrap_err();
    match &error {
        GossipBlobError::NotFirstForTuple { index: 0, .. } => {}
        other => panic!("expected NotFirstForTuple, got {other:?}"),
    }
    assert_eq!(error.action(), ValidationAction::Reject);

    // No state change: the input still holds exactly one blob.
    let cached = chain
        .data_availability_checker
        .cached_sidecar_indexes(&block.canonical_root())
        .unwrap();
    assert_eq!(cached, vec![0]);
}

/// Property 6: importing the same block twice produces exactly one `block`
/// and one `head` event.
#[tokio::test]
async fn import_is_idempotent() {
    let harness = BeaconChainHarness::new(ForkName::Deneb);
    let chain = harness.chain.clone();
    let mut events = chain.event_handler.subscribe();

    harness.set_slot(1);
    let (block, _) = harness.produce_block(Slot::new(1), &[]);
    let block_root = block.canonical_root();

    let available = AvailableBlock {
        block_root,
        block: block.clone(),
        data: AvailableData::NoData,
        reconstructed_columns: vec![],
    };

    chain
        .process_available_block(available.clone(), BlockProcessingOptions::default())
        .await
        .unwrap();

    // Second import errors as already-known...
    let error = chain
        .process_available_block(available.clone(), BlockProcessingOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(error, BlockError::BlockIsAlreadyKnown(_)));

    // ...and is a silent no-op under ignore_if_known.
    let opts = BlockProcessingOptions {
        ignore_if_known: true,
        ..BlockProcessingOptions::default()
    };
    chain
        .process_available_block(available, opts)
        .await
        .unwrap();

    let events = collect_events(&mut events);
    let blocks = events
        .iter()
        .filter(|e| matches!(***e, EventKind::Block(_)))
        .count();
    let heads = events
        .iter()
        .filter(|e| matches!(***e, EventKind::Head(_)))
        .count();
    assert_eq!(blocks, 1, "exactly one block event");
    assert_eq!(heads, 1, "exactly one head event");
}

/// Property 7: switching to a fork whose LCA is below the old head emits
/// exactly one `chain_reorg` with the LCA depth.
#[tokio::test]
async fn reorg_emits_depth_event() {
    let harness = BeaconChainHarness::new(ForkName::Deneb);
    let chain = harness.chain.clone();

    // A <- B becomes the canonical chain.
    harness.set_slot(1);
    let (block_a, _) = harness.produce_block(Slot::new(1), &[]);
    let root_a = block_a.canonical_root();
    let verified = chain.verify_block_for_gossip(block_a).unwrap();
    chain.process_gossip_block(verified).await.unwrap();

    harness.set_slot(2);
    let (block_b, _) = harness.produce_block(Slot::new(2), &[]);
    let root_b = block_b.canonical_root();
    let verified = chain.verify_block_for_gossip(block_b).unwrap();
    chain.process_gossip_block(verified).await.unwrap();
    assert_eq!(chain.head_block_root(), root_b);

    let mut events = chain.event_handler.subscribe();

    // C forks off A at slot 3; its timely arrival carries the proposer
    // boost, outweighing the voteless B.
    harness.set_slot(3);
    let (block_c, _) = harness.produce_block_on(root_a, Slot::new(3), &[]);
    let root_c = block_c.canonical_root();
    let available = AvailableBlock {
        block_root: root_c,
        block: block_c,
        data: AvailableData::NoData,
        reconstructed_columns: vec![],
    };
    chain
        .process_available_block(available, BlockProcessingOptions::default())
        .await
        .unwrap();

    assert_eq!(chain.head_block_root(), root_c);

    let events = collect_events(&mut events);
    let reorgs = events
        .iter()
        .filter_map(|event| match &**event {
            EventKind::ChainReorg(reorg) => Some(reorg.clone()),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(reorgs.len(), 1, "exactly one chain_reorg event");
    assert_eq!(reorgs[0].depth, 1, "old head B is one slot above the LCA A");
    assert_eq!(reorgs[0].old_head_block, root_b);
    assert_eq!(reorgs[0].new_head_block, root_c);
}

/// S5 / property 8: a weak head plus a local next-slot proposal suppresses
/// `forkchoiceUpdated`.
#[tokio::test]
async fn weak_head_suppresses_forkchoice_updated() {
    let harness = BeaconChainHarness::new(ForkName::Deneb);
    let chain = harness.chain.clone();

    // We propose at slot 2.
    chain.register_local_proposer(Slot::new(2));

    harness.set_slot(1);
    let (block, _) = harness.produce_block(Slot::new(1), &[]);
    let verified = chain.verify_block_for_gossip(block.clone()).unwrap();
    chain.process_gossip_block(verified).await.unwrap();
    assert_eq!(chain.head_block_root(), block.canonical_root());

    // The head is weak (boost only) and we propose next slot: suppressed.
    assert_eq!(
        harness.mock_engine().forkchoice_updated_call_count(),
        0,
        "forkchoiceUpdated must be suppressed for this import"
    );
}

/// The inverse of S5: without a local proposal the EL is notified.
#[tokio::test]
async fn forkchoice_updated_fires_without_local_proposal() {
    let harness = BeaconChainHarness::new(ForkName::Deneb);
    let chain = harness.chain.clone();

    harness.set_slot(1);
    let (block, _) = harness.produce_block(Slot::new(1), &[]);
    let verified = chain.verify_block_for_gossip(block).unwrap();
    chain.process_gossip_block(verified).await.unwrap();

    assert_eq!(harness.mock_engine().forkchoice_updated_call_count(), 1);
}

/// Gossip stage ordering: repeats of a proposal are ignored, unknown
/// parents are ignored and routed to sync.
#[tokio::test]
async fn gossip_block_stages() {
    let harness = BeaconChainHarness::new(ForkName::Deneb);
    let chain = harness.chain.clone();

    harness.set_slot(1);
    let (block, _) = harness.produce_block(Slot::new(1), &[]);
    let verified = chain.verify_block_for_gossip(block.clone()).unwrap();
    chain.process_gossip_block(verified).await.unwrap();

    // The same proposal again: IGNORE.
    let error = chain.verify_block_for_gossip(block.clone()).unwrap_err();
    assert!(matches!(error, BlockError::RepeatProposal { .. }));
    assert_eq!(error.action(), ValidationAction::Ignore);

    // A block on an unknown parent: IGNORE. The parent check fires before
    // proposer/signature validation, so a crudely re-parented block works.
    harness.set_slot(2);
    let (template, _) = harness.produce_block_on(block.canonical_root(), Slot::new(2), &[]);
    let mut orphan = (*template).clone().into_message();
    match &mut orphan {
        types::BeaconBlock::Base(inner) => {
            inner.parent_root = types::Hash256::repeat_byte(0xfe)
        }
        types::BeaconBlock::Deneb(inner) => {
            inner.parent_root = types::Hash256::repeat_byte(0xfe)
        }
        types::BeaconBlock::Electra(inner) => {
            inner.parent_root = types::Hash256::repeat_byte(0xfe)
        }
    }
    let orphan = Arc::new(types::SignedBeaconBlock::from_block(
        orphan,
        bls::SignatureBytes::empty(),
    ));
    let error = chain.verify_block_for_gossip(orphan).unwrap_err();
    assert!(matches!(error, BlockError::ParentUnknown { .. }));
    assert_eq!(error.action(), ValidationAction::Ignore);

    // A future-slot block: IGNORE.
    harness.set_slot(3);
    let (future_block, _) = harness.produce_block_on(block.canonical_root(), Slot::new(5), &[]);
    let error = chain.verify_block_for_gossip(future_block).unwrap_err();
    assert!(matches!(error, BlockError::FutureSlot { .. }));
    assert_eq!(error.action(), ValidationAction::Ignore);
}

/// Finalization advances as epochs fill with blocks; the event fires and
/// the caches are pruned.
#[tokio::test]
async fn finalization_event_and_eviction() {
    let harness = BeaconChainHarness::new(ForkName::Deneb);
    let chain = harness.chain.clone();
    let mut events = chain.event_handler.subscribe();

    let slots_per_epoch = 32u64;
    // Fill epochs 0..3 with blocks; justification rotates each boundary.
    for slot in 1..(3 * slots_per_epoch + 2) {
        harness.set_slot(slot);
        let (block, _) = harness.produce_block(Slot::new(slot), &[]);
        let verified = chain.verify_block_for_gossip(block).unwrap();
        chain.process_gossip_block(verified).await.unwrap();
    }

    assert!(
        chain.finalized_checkpoint().epoch >= Epoch::new(1),
        "finalization advanced: {:?}",
        chain.finalized_checkpoint()
    );

    let finalized_events = collect_events(&mut events)
        .iter()
        .filter(|e| matches!(***e, EventKind::FinalizedCheckpoint(_)))
        .count();
    assert!(finalized_events >= 1, "finalized_checkpoint event fired");
}

/// Attestations absorbed from a block move fork-choice weight.
#[tokio::test]
async fn block_attestations_are_absorbed() {
    let harness = BeaconChainHarness::new(ForkName::Deneb);
    let chain = harness.chain.clone();

    harness.set_slot(1);
    let (block_a, _) = harness.produce_block(Slot::new(1), &[]);
    let root_a = block_a.canonical_root();
    let verified = chain.verify_block_for_gossip(block_a).unwrap();
    chain.process_gossip_block(verified).await.unwrap();

    // A gossip aggregate for A, applied via the attestation pipeline.
    let committee = harness.committee_at_slot(Slot::new(1));
    let attestation = harness.make_aggregate(
        Slot::new(1),
        root_a,
        Checkpoint {
            epoch: Epoch::new(0),
            root: harness.chain.genesis_block_root,
        },
        &committee,
    );
    let verified = chain.verify_aggregate_for_gossip(attestation).unwrap();
    chain.apply_verified_aggregate(verified).unwrap();

    harness.set_slot(2);
    let (block_b, _) = harness.produce_block(Slot::new(2), &[]);
    let verified = chain.verify_block_for_gossip(block_b).unwrap();
    chain.process_gossip_block(verified).await.unwrap();

    let weight = chain
        .canonical_head
        .fork_choice
        .read()
        .proto_array()
        .get_weight(&root_a)
        .unwrap();
    assert!(weight > 0, "attestation weight landed on A: {weight}");
}
