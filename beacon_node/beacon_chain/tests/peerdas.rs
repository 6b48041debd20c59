//! PeerDAS scenarios: column assembly, the half-reconstruction rule, and
//! the Gloas gossip additions.

use beacon_chain::data_availability_checker::Availability;
use beacon_chain::execution_bid_verification::ExecutionBidError;
use beacon_chain::test_utils::BeaconChainHarness;
use beacon_chain::ValidationAction;
use ssz_types::VariableList;
use std::sync::Arc;
use tree_hash::TreeHash;
use types::{
    ColumnIndex, Epoch, EthSpec, ExecutionPayloadBid, ForkName, MainnetEthSpec,
    SignedExecutionPayloadBid, Slot,
};

type E = MainnetEthSpec;

struct ColumnFixture {
    harness: BeaconChainHarness,
    block_root: types::Hash256,
    sidecars: types::DataColumnSidecarList<E>,
    custody: Vec<ColumnIndex>,
}

async fn column_fixture() -> ColumnFixture {
    let harness = BeaconChainHarness::new(ForkName::Fulu);
    let chain = harness.chain.clone();

    harness.set_slot(1);
    let (block, blobs) = harness.produce_block(Slot::new(1), &[vec![1u8; 32], vec![2u8; 32]]);
    let block_root = block.canonical_root();
    let sidecars = harness.make_column_sidecars(&block, &blobs);
    assert_eq!(sidecars.len(), E::number_of_columns());

    let verified = chain.verify_block_for_gossip(block).unwrap();
    let availability = chain.process_gossip_block(verified).await.unwrap();
    assert!(matches!(availability, Availability::MissingComponents(_)));

    let custody = chain
        .custody_context
        .custody_columns_at_epoch(Epoch::new(0), &chain.spec)
        .unwrap();

    ColumnFixture {
        harness,
        block_root,
        sidecars,
        custody,
    }
}

/// Indices that avoid the custody set entirely, so availability can only
/// come from reconstruction.
fn non_custody_indices(fixture: &ColumnFixture, count: usize) -> Vec<u64> {
    (0..E::number_of_columns() as u64)
        .filter(|index| !fixture.custody.contains(index))
        .take(count)
        .collect()
}

/// S4 (first half): exactly half the columns reconstructs the rest and the
/// block imports.
#[tokio::test]
async fn half_columns_reconstruct_and_import() {
    let fixture = column_fixture().await;
    let chain = fixture.harness.chain.clone();
    let half = E::number_of_columns() / 2;

    let indices = non_custody_indices(&fixture, half);
    let (last, first) = indices.split_last().unwrap();

    for index in first {
        let verified = chain
            .verify_data_column_sidecar_for_gossip(
                fixture.sidecars[*index as usize].clone(),
                *index,
            )
            .unwrap();
        let availability = chain.process_gossip_data_column(verified).await.unwrap();
        assert!(
            matches!(availability, Availability::MissingComponents(_)),
            "{} columns are not enough",
            first.len()
        );
    }
    assert!(!chain.knows_block(&fixture.block_root));

    // The 64th column tips it over: reconstruction, then import.
    let verified = chain
        .verify_data_column_sidecar_for_gossip(fixture.sidecars[*last as usize].clone(), *last)
        .unwrap();
    let availability = chain.process_gossip_data_column(verified).await.unwrap();
    match availability {
        Availability::Available(available) => {
            assert!(
                !available.reconstructed_columns.is_empty(),
                "missing columns were recovered"
            );
        }
        Availability::MissingComponents(root) => panic!("still missing: {root:?}"),
    }
    assert!(chain.knows_block(&fixture.block_root));
    assert_eq!(chain.head_block_root(), fixture.block_root);
}

/// S4 (second half): one column short of half keeps the block unavailable
/// and nothing is imported.
#[tokio::test]
async fn below_half_columns_fail_da() {
    let fixture = column_fixture().await;
    let chain = fixture.harness.chain.clone();
    let below_half = E::number_of_columns() / 2 - 1;

    for index in non_custody_indices(&fixture, below_half) {
        let verified = chain
            .verify_data_column_sidecar_for_gossip(
                fixture.sidecars[index as usize].clone(),
                index,
            )
            .unwrap();
        let availability = chain.process_gossip_data_column(verified).await.unwrap();
        assert!(matches!(availability, Availability::MissingComponents(_)));
    }

    assert!(
        !chain.knows_block(&fixture.block_root),
        "the block must not be imported"
    );
    // No EL call was made for the unavailable block.
    assert!(
        fixture.harness.mock_engine().new_payload_calls().is_empty(),
        "no newPayload for an unavailable block"
    );
}

/// Custody columns alone satisfy availability without reconstruction.
#[tokio::test]
async fn custody_columns_complete_availability() {
    let fixture = column_fixture().await;
    let chain = fixture.harness.chain.clone();

    let (last, first) = fixture.custody.split_last().unwrap();
    for index in first {
        let verified = chain
            .verify_data_column_sidecar_for_gossip(
                fixture.sidecars[*index as usize].clone(),
                *index,
            )
            .unwrap();
        let availability = chain.process_gossip_data_column(verified).await.unwrap();
        assert!(matches!(availability, Availability::MissingComponents(_)));
    }

    let verified = chain
        .verify_data_column_sidecar_for_gossip(fixture.sidecars[*last as usize].clone(), *last)
        .unwrap();
    let availability = chain.process_gossip_data_column(verified).await.unwrap();
    match availability {
        Availability::Available(available) => {
            assert!(
                available.reconstructed_columns.is_empty(),
                "custody completion needs no reconstruction"
            );
        }
        Availability::MissingComponents(root) => panic!("still missing: {root:?}"),
    }
    assert!(chain.knows_block(&fixture.block_root));
}

/// Wrong-subnet columns are rejected before anything else.
#[tokio::test]
async fn column_on_wrong_subnet_is_rejected() {
    let fixture = column_fixture().await;
    let chain = fixture.harness.chain.clone();

    let error = chain
        .verify_data_column_sidecar_for_gossip(fixture.sidecars[5].clone(), 6)
        .unwrap_err();
    assert_eq!(error.action(), ValidationAction::Reject);
}

/// Gloas execution-bid gossip: zero payment enforced, duplicates ignored,
/// equivocation rejected.
#[tokio::test]
async fn execution_bid_validation() {
    let harness = BeaconChainHarness::new(ForkName::Gloas);
    let chain = harness.chain.clone();
    harness.set_slot(1);

    let bid = |payment: u64, block_hash: u64| {
        Arc::new(SignedExecutionPayloadBid::<E> {
            message: ExecutionPayloadBid {
                slot: Slot::new(1),
                builder_index: 11,
                parent_block_hash: types::ExecutionBlockHash::zero(),
                parent_block_root: chain.genesis_block_root,
                block_hash: types::ExecutionBlockHash::from_root(
                    types::Hash256::repeat_byte(block_hash as u8),
                ),
                execution_payment: payment,
                blob_kzg_commitments: VariableList::empty(),
            },
            signature: bls::SignatureBytes::empty(),
        })
    };

    // Non-zero payment: REJECT.
    let error = chain
        .verify_execution_bid_for_gossip(bid(5, 1))
        .unwrap_err();
    assert!(matches!(
        error,
        ExecutionBidError::NonZeroExecutionPayment { .. }
    ));
    assert_eq!(error.action(), ValidationAction::Reject);

    // First zero-payment bid passes.
    chain.verify_execution_bid_for_gossip(bid(0, 1)).unwrap();

    // The same bid again: IGNORE.
    let error = chain
        .verify_execution_bid_for_gossip(bid(0, 1))
        .unwrap_err();
    assert!(matches!(error, ExecutionBidError::RepeatBid { .. }));
    assert_eq!(error.action(), ValidationAction::Ignore);

    // A different bid from the same builder in the same slot: equivocation.
    let error = chain
        .verify_execution_bid_for_gossip(bid(0, 2))
        .unwrap_err();
    match &error {
        ExecutionBidError::BuilderEquivocation { first_bid_root, .. } => {
            assert_eq!(*first_bid_root, bid(0, 1).message.tree_hash_root());
        }
        other => panic!("expected equivocation, got {other:?}"),
    }
    assert_eq!(error.action(), ValidationAction::Reject);
}
