//! The fork-choice wrapper around the proto-array store.
//!
//! Owns vote queuing, checkpoint bookkeeping, proposer-boost tracking and
//! the weak-head override used to suppress `forkchoiceUpdated` calls.

mod fork_choice;
mod fork_choice_store;

pub use crate::fork_choice::{
    DataAvailabilityStatus, Error, ForkChoice, ForkChoiceView, ForkchoiceUpdateParameters,
    InvalidAttestation, InvalidBlock, PayloadVerificationStatus, QueuedAttestation,
};
pub use crate::fork_choice_store::ForkChoiceStore;
pub use proto_array::{Block as ProtoBlock, ExecutionStatus, InvalidationOperation};
