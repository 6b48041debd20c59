//! Head tracking and the `forkchoiceUpdated` dispatcher.
//!
//! After every import the head is recomputed. A changed head pins the new
//! head state, emits the `head` event (with duty dependent roots) and, when
//! the old head is not an ancestor of the new one, a `chain_reorg` event
//! with the LCA depth. The EL is then notified — unless the proposer-boost
//! override fires, in which case the notification is suppressed and the
//! *prepared* variant is scheduled shortly before our proposal slot.

use crate::beacon_chain::{BeaconChain, BeaconChainTypes};
use crate::errors::BeaconChainError;
use crate::events::{EventKind, SseChainReorg, SseHead};
use execution_layer::PayloadAttributes;
use fork_choice::{ForkChoice, ForkchoiceUpdateParameters};
use parking_lot::RwLock;
use slot_clock::SlotClock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use types::{EthSpec, ExecutionBlockHash, Hash256, Slot};

use crate::beacon_fork_choice_store::BeaconForkChoiceStore;

pub type BeaconForkChoice<T> = ForkChoice<
    BeaconForkChoiceStore<<T as BeaconChainTypes>::EthSpec>,
    <T as BeaconChainTypes>::EthSpec,
>;

/// The cached head: everything event handlers need without taking the
/// fork-choice lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedHead {
    pub head_block_root: Hash256,
    pub head_slot: Slot,
    pub head_state_root: Hash256,
}

pub struct CanonicalHead<T: BeaconChainTypes> {
    /// Exclusively locked by the importer between suspension points.
    pub fork_choice: RwLock<BeaconForkChoice<T>>,
    cached_head: RwLock<CachedHead>,
}

impl<T: BeaconChainTypes> CanonicalHead<T> {
    pub fn new(fork_choice: BeaconForkChoice<T>, anchor: CachedHead) -> Self {
        Self {
            fork_choice: RwLock::new(fork_choice),
            cached_head: RwLock::new(anchor),
        }
    }

    pub fn cached_head(&self) -> CachedHead {
        *self.cached_head.read()
    }

    fn set_cached_head(&self, cached: CachedHead) {
        *self.cached_head.write() = cached;
    }
}

/// Steps [6] through [8] of import: recompute the head, externalise the
/// change, notify the EL.
pub async fn recompute_head_and_notify<T: BeaconChainTypes>(
    chain: &Arc<BeaconChain<T>>,
    current_slot: Slot,
) -> Result<(), BeaconChainError> {
    let old_head = chain.canonical_head.cached_head();

    // Head computation and reorg detection under one write lock; the lock
    // is released before any suspension point.
    let (new_head_root, fcu_params, reorg) = {
        let mut fork_choice = chain.canonical_head.fork_choice.write();
        let new_head_root = fork_choice
            .get_head(current_slot, &chain.spec)
            .map_err(|e| BeaconChainError::ForkChoiceError(format!("{e:?}")))?;
        let reorg = if new_head_root != old_head.head_block_root {
            fork_choice.common_ancestor(old_head.head_block_root, new_head_root)
        } else {
            None
        };
        (new_head_root, fork_choice.forkchoice_update_parameters(), reorg)
    };

    if new_head_root != old_head.head_block_root {
        on_new_head(chain, current_slot, old_head, new_head_root, reorg)?;
    }

    // [7]/[8] EL notification with the proposer-boost override.
    dispatch_forkchoice_updated(chain, current_slot, fcu_params).await
}

fn on_new_head<T: BeaconChainTypes>(
    chain: &Arc<BeaconChain<T>>,
    current_slot: Slot,
    old_head: CachedHead,
    new_head_root: Hash256,
    reorg: Option<(Hash256, u64)>,
) -> Result<(), BeaconChainError> {
    let new_head_block = chain
        .fork_choice_block(&new_head_root)
        .ok_or(BeaconChainError::HeadMissingFromForkChoice(new_head_root))?;

    // Pin the new head state; release the old pin.
    chain.state_cache.pin(&new_head_root);
    if old_head.head_block_root != new_head_root {
        chain.state_cache.unpin(&old_head.head_block_root);
    }

    let cached = CachedHead {
        head_block_root: new_head_root,
        head_slot: new_head_block.slot,
        head_state_root: new_head_block.state_root,
    };
    chain.canonical_head.set_cached_head(cached);

    let current_epoch = current_slot.epoch(T::EthSpec::slots_per_epoch());
    let (current_duty_dependent_root, previous_duty_dependent_root) = {
        let fork_choice = chain.canonical_head.fork_choice.read();
        (
            fork_choice
                .get_dependent_root(new_head_root, current_epoch)
                .unwrap_or_default(),
            fork_choice
                .get_dependent_root(new_head_root, current_epoch.saturating_sub(1u64))
                .unwrap_or_default(),
        )
    };

    let execution_optimistic = chain.is_optimistic_block(&new_head_root);
    let epoch_transition = old_head.head_slot.epoch(T::EthSpec::slots_per_epoch())
        != new_head_block.slot.epoch(T::EthSpec::slots_per_epoch());

    chain.event_handler.register(EventKind::Head(SseHead {
        slot: new_head_block.slot,
        block: new_head_root,
        state: new_head_block.state_root,
        current_duty_dependent_root,
        previous_duty_dependent_root,
        epoch_transition,
        execution_optimistic,
    }));

    // A reorg is a common ancestor strictly below the old head.
    if let Some((_, depth)) = reorg {
        if depth > 0 {
            debug!(
                depth,
                old_head = ?old_head.head_block_root,
                new_head = ?new_head_root,
                "Chain reorg detected"
            );
            chain
                .event_handler
                .register(EventKind::ChainReorg(SseChainReorg {
                    slot: new_head_block.slot,
                    depth,
                    old_head_block: old_head.head_block_root,
                    new_head_block: new_head_root,
                    old_head_state: old_head.head_state_root,
                    new_head_state: new_head_block.state_root,
                    epoch: current_epoch,
                    execution_optimistic,
                }));
        }
    }

    Ok(())
}

/// Step [7]/[8]: decide whether to call `forkchoiceUpdated` now, and do so.
async fn dispatch_forkchoice_updated<T: BeaconChainTypes>(
    chain: &Arc<BeaconChain<T>>,
    current_slot: Slot,
    params: ForkchoiceUpdateParameters,
) -> Result<(), BeaconChainError> {
    // Pre-TTD chains have no EL to notify.
    let Some(head_hash) = params.head_hash.filter(|hash| !hash.is_zero()) else {
        return Ok(());
    };

    let head_block = chain.fork_choice_block(&params.head_root);
    let next_slot = current_slot + 1;

    // The proposer-boost override: a weak, fresh head we intend to reorg
    // with our own next-slot proposal should not be pinned into the EL.
    let should_override = chain.config.re_org_enabled
        && head_block
            .as_ref()
            .map(|block| block.slot >= current_slot)
            .unwrap_or(false)
        && chain.is_local_proposer(next_slot)
        && chain
            .canonical_head
            .fork_choice
            .read()
            .should_override_forkchoice_update(current_slot, &chain.spec)
            .unwrap_or(false);

    if should_override {
        debug!(
            head = ?params.head_root,
            "Suppressing forkchoiceUpdated for weak head"
        );
        schedule_prepared_forkchoice_updated(chain, next_slot, params);
        return Ok(());
    }

    let safe_hash = params.justified_hash.unwrap_or_else(ExecutionBlockHash::zero);
    let finalized_hash = params.finalized_hash.unwrap_or_else(ExecutionBlockHash::zero);

    // A local proposal next slot wants payload attributes attached.
    let attributes = chain
        .is_local_proposer(next_slot)
        .then(|| payload_attributes_for_slot(chain, next_slot));

    match chain
        .execution_layer
        .notify_forkchoice_updated(head_hash, safe_hash, finalized_hash, attributes)
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.is_aborted() => {
            debug!(error = ?e, "forkchoiceUpdated aborted");
            Ok(())
        }
        Err(e) => {
            warn!(error = ?e, "forkchoiceUpdated failed");
            Ok(())
        }
    }
}

/// The *prepared* `forkchoiceUpdated`, fired shortly before our proposal
/// slot so the EL starts building a payload on the (possibly re-chosen)
/// head.
fn schedule_prepared_forkchoice_updated<T: BeaconChainTypes>(
    chain: &Arc<BeaconChain<T>>,
    proposal_slot: Slot,
    suppressed: ForkchoiceUpdateParameters,
) {
    let lookahead = Duration::from_secs(chain.config.prepare_payload_lookahead_secs);
    let delay = chain
        .slot_clock
        .duration_to_slot(proposal_slot)
        .map(|until_slot| until_slot.saturating_sub(lookahead))
        .unwrap_or_default();

    let chain = chain.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        // Re-read the head: fork choice may have re-chosen since.
        let params = chain
            .canonical_head
            .fork_choice
            .read()
            .forkchoice_update_parameters();
        let params = if params.head_hash.is_some() {
            params
        } else {
            suppressed
        };
        let Some(head_hash) = params.head_hash.filter(|hash| !hash.is_zero()) else {
            return;
        };

        let attributes = payload_attributes_for_slot(&chain, proposal_slot);
        if let Err(e) = chain
            .execution_layer
            .notify_forkchoice_updated(
                head_hash,
                params.justified_hash.unwrap_or_else(ExecutionBlockHash::zero),
                params.finalized_hash.unwrap_or_else(ExecutionBlockHash::zero),
                Some(attributes),
            )
            .await
        {
            if e.is_aborted() {
                debug!(error = ?e, "Prepared forkchoiceUpdated aborted");
            } else {
                warn!(error = ?e, "Prepared forkchoiceUpdated failed");
            }
        }
    });
}

fn payload_attributes_for_slot<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    slot: Slot,
) -> PayloadAttributes {
    PayloadAttributes {
        timestamp: chain
            .slot_clock
            .start_of(slot)
            .map(|start| start.as_secs())
            .unwrap_or_default(),
        prev_randao: Hash256::default(),
        suggested_fee_recipient: Default::default(),
    }
}
