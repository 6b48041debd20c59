//! Gossip validation for Gloas ePBS execution payload bids.
//!
//! During the ePBS transition `execution_payment` must be zero: payments
//! settle out-of-band until in-band payment processing is activated. The
//! check stays strict here and gets revisited with the fork's final
//! semantics.

use crate::beacon_chain::{BeaconChain, BeaconChainTypes};
use crate::errors::BeaconChainError;
use crate::observed_execution_bids::BidObservation;
use crate::ValidationAction;
use slot_clock::SlotClock;
use std::sync::Arc;
use tracing::debug;
use tree_hash::TreeHash;
use types::{Hash256, SignedExecutionPayloadBid, Slot};

#[derive(Debug)]
pub enum ExecutionBidError {
    /// Bids only exist from the Gloas fork onward.
    PriorToGloas { bid_slot: Slot },
    FutureSlot {
        message_slot: Slot,
        latest_permissible_slot: Slot,
    },
    /// In-band payments are disabled during the transition; a non-zero
    /// payment is provably invalid.
    NonZeroExecutionPayment { execution_payment: u64 },
    /// This exact bid was already seen.
    RepeatBid { builder_index: u64, slot: Slot },
    /// The builder submitted a conflicting bid for the slot.
    BuilderEquivocation {
        builder_index: u64,
        slot: Slot,
        first_bid_root: Hash256,
    },
    /// The bid builds on an unknown parent block.
    ParentBlockUnknown { parent_block_root: Hash256 },
    BeaconChainError(Box<BeaconChainError>),
}

impl ExecutionBidError {
    pub fn action(&self) -> ValidationAction {
        match self {
            ExecutionBidError::FutureSlot { .. }
            | ExecutionBidError::RepeatBid { .. }
            | ExecutionBidError::ParentBlockUnknown { .. }
            | ExecutionBidError::BeaconChainError(_) => ValidationAction::Ignore,
            _ => ValidationAction::Reject,
        }
    }
}

/// A bid that passed gossip validation.
#[derive(Debug)]
pub struct VerifiedExecutionBid<E: types::EthSpec> {
    pub bid: Arc<SignedExecutionPayloadBid<E>>,
}

pub fn validate_execution_bid_for_gossip<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    bid: Arc<SignedExecutionPayloadBid<T::EthSpec>>,
) -> Result<VerifiedExecutionBid<T::EthSpec>, ExecutionBidError> {
    let message = &bid.message;

    let fork_name = chain.spec.fork_name_at_slot::<T::EthSpec>(message.slot);
    if !fork_name.gloas_enabled() {
        return Err(ExecutionBidError::PriorToGloas {
            bid_slot: message.slot,
        });
    }

    let latest_permissible_slot = chain
        .slot_clock
        .now_with_future_tolerance(chain.spec.maximum_gossip_clock_disparity())
        .ok_or_else(|| {
            ExecutionBidError::BeaconChainError(Box::new(BeaconChainError::UnableToReadSlot))
        })?;
    if message.slot > latest_permissible_slot {
        return Err(ExecutionBidError::FutureSlot {
            message_slot: message.slot,
            latest_permissible_slot,
        });
    }

    // Payment-in-band is zero during the transition; re-enabled later.
    if message.execution_payment != 0 {
        return Err(ExecutionBidError::NonZeroExecutionPayment {
            execution_payment: message.execution_payment,
        });
    }

    if !chain.knows_block(&message.parent_block_root) {
        return Err(ExecutionBidError::ParentBlockUnknown {
            parent_block_root: message.parent_block_root,
        });
    }

    let bid_root = message.tree_hash_root();
    match chain
        .observed_execution_bids
        .write()
        .observe_bid(message.builder_index, message.slot, bid_root)
        .map_err(|_| ExecutionBidError::RepeatBid {
            builder_index: message.builder_index,
            slot: message.slot,
        })? {
        BidObservation::New => {}
        BidObservation::Duplicate => {
            return Err(ExecutionBidError::RepeatBid {
                builder_index: message.builder_index,
                slot: message.slot,
            });
        }
        BidObservation::Equivocation(first_bid_root) => {
            return Err(ExecutionBidError::BuilderEquivocation {
                builder_index: message.builder_index,
                slot: message.slot,
                first_bid_root,
            });
        }
    }

    debug!(
        slot = %message.slot,
        builder = message.builder_index,
        "Gossip execution bid verified"
    );

    Ok(VerifiedExecutionBid { bid })
}
