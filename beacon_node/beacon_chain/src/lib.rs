//! The block-ingestion core of the beacon node.
//!
//! A signed block plus its data-availability payload (blobs pre-Fulu, data
//! columns post-Fulu) arrives over gossip, sync or the validator API; this
//! crate reassembles the pieces, validates them, drives the state-transition
//! and fork-choice collaborators, commits the result, notifies the execution
//! layer and fans observations out to subscribers.

pub mod attestation_verification;
pub mod beacon_chain;
pub mod beacon_fork_choice_store;
pub mod blob_verification;
pub mod block_input;
pub mod block_verification;
pub mod canonical_head;
pub mod chain_config;
pub mod custody_context;
pub mod data_availability_checker;
pub mod data_column_verification;
pub mod errors;
pub mod events;
pub mod execution_bid_verification;
pub mod observed_attestations;
pub mod observed_block_producers;
pub mod observed_data_sidecars;
pub mod observed_execution_bids;
pub mod state_cache;
pub mod state_transition;
pub mod test_utils;

pub use crate::beacon_chain::{BeaconChain, BeaconChainTypes, BlockProcessingOptions};
pub use crate::beacon_fork_choice_store::BeaconForkChoiceStore;
pub use crate::block_input::{AvailableData, BlockInput, BlockInputError};
pub use crate::canonical_head::CanonicalHead;
pub use crate::chain_config::ChainConfig;
pub use crate::custody_context::CustodyContext;
pub use crate::data_availability_checker::{Availability, AvailableBlock, DataAvailabilityChecker};
pub use crate::errors::BeaconChainError;
pub use crate::events::{EventKind, ServerSentEventHandler};
pub use crate::state_transition::{
    BlockProcessingOpts, StateTransition, TestStateTransition, TransitionError,
};

/// The action a gossip validator instructs the network layer to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationAction {
    /// Drop the message without penalising the sender.
    Ignore,
    /// Drop the message and score the sender down.
    Reject,
}
