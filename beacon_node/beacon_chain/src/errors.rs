use crate::block_input::BlockInputError;
use crate::state_transition::TransitionError;
use types::{BeaconStateError, Hash256, Slot};

#[derive(Debug)]
pub enum BeaconChainError {
    BeaconStateError(BeaconStateError),
    StoreError(store::Error),
    ForkChoiceError(String),
    ExecutionLayerError(execution_layer::Error),
    StateTransitionError(TransitionError),
    BlockInputError(BlockInputError),
    KzgError(kzg::Error),
    /// The slot clock could not be read.
    UnableToReadSlot,
    MissingBeaconState(Hash256),
    MissingBeaconBlock(Hash256),
    HeadMissingFromForkChoice(Hash256),
    /// A publish arrived too far ahead of its slot.
    PublishAheadOfSlot {
        message_slot: Slot,
        available_in: std::time::Duration,
    },
    CanonicalHeadLockTimeout,
}

impl From<BeaconStateError> for BeaconChainError {
    fn from(e: BeaconStateError) -> Self {
        BeaconChainError::BeaconStateError(e)
    }
}

impl From<store::Error> for BeaconChainError {
    fn from(e: store::Error) -> Self {
        BeaconChainError::StoreError(e)
    }
}

impl From<execution_layer::Error> for BeaconChainError {
    fn from(e: execution_layer::Error) -> Self {
        BeaconChainError::ExecutionLayerError(e)
    }
}

impl From<TransitionError> for BeaconChainError {
    fn from(e: TransitionError) -> Self {
        BeaconChainError::StateTransitionError(e)
    }
}

impl From<BlockInputError> for BeaconChainError {
    fn from(e: BlockInputError) -> Self {
        BeaconChainError::BlockInputError(e)
    }
}

impl From<kzg::Error> for BeaconChainError {
    fn from(e: kzg::Error) -> Self {
        BeaconChainError::KzgError(e)
    }
}
