//! The state-transition collaborator contract.
//!
//! The core drives the transition function but never looks inside it: epoch
//! processing, rewards and validator accounting are the collaborator's
//! business. [`TestStateTransition`] is the deterministic implementation the
//! test suite runs against; it enforces the structural checks the core
//! relies on (slot linkage, parent root, proposer, state root) and rotates
//! justification one epoch behind the clock so finalization advances as the
//! chain grows.

use types::{BeaconState, EthSpec, FixedBytesExtended, Hash256, SignedBeaconBlock, Slot};

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionError {
    SlotMismatch {
        state_slot: Slot,
        block_slot: Slot,
    },
    ParentRootMismatch {
        state_parent: Hash256,
        block_parent: Hash256,
    },
    IncorrectProposer {
        expected: u64,
        got: u64,
    },
    StateRootMismatch {
        expected: Hash256,
        got: Hash256,
    },
    BeaconStateError(String),
}

#[derive(Debug, Clone, Copy)]
pub struct BlockProcessingOpts {
    /// Check `block.state_root` against the post-state. Disabled during
    /// block production, where the root is being computed.
    pub verify_state_root: bool,
    /// Structurally verify the execution payload. The engine's `newPayload`
    /// verdict is collected separately by the verify pipeline.
    pub verify_execution_payload: bool,
}

impl Default for BlockProcessingOpts {
    fn default() -> Self {
        Self {
            verify_state_root: true,
            verify_execution_payload: true,
        }
    }
}

/// Signature verification is always deferred here: the verify pipeline
/// batches every signature of a chain segment in one BLS call.
pub trait StateTransition<E: EthSpec>: Send + Sync {
    /// Advance the state one slot (epoch processing included).
    fn per_slot_processing(&self, state: &mut BeaconState<E>) -> Result<(), TransitionError>;

    /// Apply a block to a state already advanced to the block's slot.
    fn per_block_processing(
        &self,
        state: &mut BeaconState<E>,
        block: &SignedBeaconBlock<E>,
        opts: BlockProcessingOpts,
    ) -> Result<(), TransitionError>;
}

/// Deterministic transition function for tests and local harnesses.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestStateTransition;

impl TestStateTransition {
    /// Advance `state` to `slot` by repeated slot processing.
    pub fn advance_to_slot<E: EthSpec>(
        &self,
        state: &mut BeaconState<E>,
        slot: Slot,
    ) -> Result<(), TransitionError> {
        while state.slot < slot {
            self.per_slot_processing(state)?;
        }
        Ok(())
    }
}

impl<E: EthSpec> StateTransition<E> for TestStateTransition {
    fn per_slot_processing(&self, state: &mut BeaconState<E>) -> Result<(), TransitionError> {
        // Fill the pending state root, exactly like `process_slot`: the
        // header was stored with a zero state root when its block applied.
        if state.latest_block_header.state_root == Hash256::zero() {
            state.latest_block_header.state_root = state.canonical_root();
        }

        state.slot += 1;

        // Epoch transition: rotate justification one epoch behind and
        // finalize with a two-epoch lag (the fully-participating case).
        if state.slot % E::slots_per_epoch() == 0 {
            let new_epoch = state.slot.epoch(E::slots_per_epoch());
            let previous_epoch = new_epoch - 1;

            let new_justified = types::Checkpoint {
                epoch: previous_epoch,
                root: state.epoch_boundary_root,
            };
            if state.current_justified_checkpoint.epoch + 1 == new_justified.epoch {
                state.finalized_checkpoint = state.current_justified_checkpoint;
            }
            if new_justified.epoch > state.current_justified_checkpoint.epoch {
                state.current_justified_checkpoint = new_justified;
            }

            // The boundary block of the new epoch is the latest block at or
            // before its start slot.
            state.epoch_boundary_root = state.latest_block_header.canonical_root();
        }

        Ok(())
    }

    fn per_block_processing(
        &self,
        state: &mut BeaconState<E>,
        block: &SignedBeaconBlock<E>,
        opts: BlockProcessingOpts,
    ) -> Result<(), TransitionError> {
        if state.slot != block.slot() {
            return Err(TransitionError::SlotMismatch {
                state_slot: state.slot,
                block_slot: block.slot(),
            });
        }

        let state_parent = state.latest_block_header.canonical_root();
        if state_parent != block.parent_root() {
            return Err(TransitionError::ParentRootMismatch {
                state_parent,
                block_parent: block.parent_root(),
            });
        }

        let expected_proposer = state
            .get_beacon_proposer_index(block.slot())
            .map_err(|e| TransitionError::BeaconStateError(format!("{e:?}")))?;
        if expected_proposer != block.proposer_index() {
            return Err(TransitionError::IncorrectProposer {
                expected: expected_proposer,
                got: block.proposer_index(),
            });
        }

        // Store the header with a zeroed state root; it is filled at the
        // next slot processing, as in `process_block_header`.
        let mut header = block.block_header();
        header.state_root = Hash256::zero();
        state.latest_block_header = header;

        if state.epoch_boundary_root == Hash256::zero() {
            state.epoch_boundary_root = block.parent_root();
        }

        if opts.verify_state_root {
            let computed = state.canonical_root();
            if computed != block.state_root() {
                return Err(TransitionError::StateRootMismatch {
                    expected: computed,
                    got: block.state_root(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bls::SignatureBytes;
    use types::{BeaconBlock, ChainSpec, Epoch, ForkName, MainnetEthSpec, Validator};

    type E = MainnetEthSpec;

    // Build a (state, block) pair at genesis the way the harness does.
    fn genesis() -> (BeaconState<E>, SignedBeaconBlock<E>) {
        let validators = (0..64)
            .map(|i| {
                let mut pubkey = bls::PublicKeyBytes::empty();
                pubkey.0[0] = i as u8;
                Validator::new(pubkey, 32_000_000_000)
            })
            .collect::<Vec<_>>();
        let mut state = BeaconState::<E>::new(Hash256::from_low_u64_be(1), validators);

        let mut block = BeaconBlock::<E>::empty(ForkName::Deneb, Slot::new(0));
        if let BeaconBlock::Deneb(ref mut inner) = block {
            inner.proposer_index = state.get_beacon_proposer_index(Slot::new(0)).unwrap();
        }
        let mut header = block.block_header();
        header.state_root = Hash256::zero();
        state.latest_block_header = header;
        let state_root = state.canonical_root();
        if let BeaconBlock::Deneb(ref mut inner) = block {
            inner.state_root = state_root;
        }
        let mut header = block.block_header();
        header.state_root = Hash256::zero();
        state.latest_block_header = header;
        state.epoch_boundary_root = block.canonical_root();

        (
            state,
            SignedBeaconBlock::from_block(block, SignatureBytes::empty()),
        )
    }

    fn next_block(
        stf: &TestStateTransition,
        state: &mut BeaconState<E>,
        slot: Slot,
    ) -> SignedBeaconBlock<E> {
        stf.advance_to_slot(state, slot).unwrap();
        let parent_root = state.latest_block_header.canonical_root();
        let mut block = BeaconBlock::<E>::empty(ForkName::Deneb, slot);
        if let BeaconBlock::Deneb(ref mut inner) = block {
            inner.parent_root = parent_root;
            inner.proposer_index = state.get_beacon_proposer_index(slot).unwrap();
        }
        // Compute the post-state root with verification off, then commit it.
        let mut trial = state.clone();
        let unsigned = SignedBeaconBlock::from_block(block.clone(), SignatureBytes::empty());
        stf.per_block_processing(
            &mut trial,
            &unsigned,
            BlockProcessingOpts {
                verify_state_root: false,
                verify_execution_payload: false,
            },
        )
        .unwrap();
        if let BeaconBlock::Deneb(ref mut inner) = block {
            inner.state_root = trial.canonical_root();
        }
        let signed = SignedBeaconBlock::from_block(block, SignatureBytes::empty());
        stf.per_block_processing(state, &signed, BlockProcessingOpts::default())
            .unwrap();
        signed
    }

    #[test]
    fn chain_of_blocks_applies_cleanly() {
        let stf = TestStateTransition;
        let (mut state, genesis_block) = genesis();

        let block_1 = next_block(&stf, &mut state, Slot::new(1));
        assert_eq!(block_1.parent_root(), genesis_block.canonical_root());

        let block_2 = next_block(&stf, &mut state, Slot::new(2));
        assert_eq!(block_2.parent_root(), block_1.canonical_root());
    }

    #[test]
    fn wrong_proposer_is_rejected() {
        let stf = TestStateTransition;
        let (mut state, _) = genesis();
        stf.advance_to_slot(&mut state, Slot::new(1)).unwrap();

        let parent_root = state.latest_block_header.canonical_root();
        let mut block = BeaconBlock::<E>::empty(ForkName::Deneb, Slot::new(1));
        if let BeaconBlock::Deneb(ref mut inner) = block {
            inner.parent_root = parent_root;
            inner.proposer_index =
                state.get_beacon_proposer_index(Slot::new(1)).unwrap() + 1;
        }
        let signed = SignedBeaconBlock::from_block(block, SignatureBytes::empty());
        assert!(matches!(
            stf.per_block_processing(
                &mut state,
                &signed,
                BlockProcessingOpts {
                    verify_state_root: false,
                    verify_execution_payload: false
                }
            ),
            Err(TransitionError::IncorrectProposer { .. })
        ));
    }

    #[test]
    fn justification_rotates_across_epochs() {
        let stf = TestStateTransition;
        let (mut state, _) = genesis();
        let _spec = ChainSpec::genesis_spec(ForkName::Deneb);

        // Blocks every slot through epoch 2.
        for slot in 1..(3 * E::slots_per_epoch()) {
            next_block(&stf, &mut state, Slot::new(slot));
        }
        stf.advance_to_slot(&mut state, Slot::new(3 * E::slots_per_epoch()))
            .unwrap();

        assert_eq!(state.current_justified_checkpoint.epoch, Epoch::new(2));
        assert_eq!(state.finalized_checkpoint.epoch, Epoch::new(1));
        assert_ne!(state.finalized_checkpoint.root, Hash256::zero());
    }
}
