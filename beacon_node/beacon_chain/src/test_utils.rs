//! A test harness wiring the chain to a manual clock, an in-memory store,
//! a mock engine and the deterministic crypto backends.

use crate::beacon_chain::{BeaconChain, BeaconChainTypes};
use crate::beacon_fork_choice_store::BeaconForkChoiceStore;
use crate::canonical_head::{CachedHead, CanonicalHead};
use crate::chain_config::ChainConfig;
use crate::custody_context::CustodyContext;
use crate::data_availability_checker::DataAvailabilityChecker;
use crate::events::ServerSentEventHandler;
use crate::observed_attestations::ObservedAggregates;
use crate::observed_block_producers::ObservedBlockProducers;
use crate::observed_data_sidecars::ObservedDataSidecars;
use crate::observed_execution_bids::ObservedExecutionBids;
use crate::state_cache::StateCache;
use crate::state_transition::{BlockProcessingOpts, StateTransition, TestStateTransition};
use bls::deterministic::{DeterministicBls, sign, sign_aggregate};
use execution_layer::{ExecutionLayer, MockEngine};
use fork_choice::{ExecutionStatus, ForkChoice};
use kzg::Kzg;
use parking_lot::RwLock;
use proto_array::JustifiedBalances;
use slot_clock::{ManualSlotClock, SlotClock};
use ssz_types::{BitList, VariableList};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use store::{BlockStore, MemoryStore};
use types::{
    Attestation, AttestationData, BeaconBlock, BeaconState, BlobSidecar, BlobSidecarList,
    ChainSpec, Checkpoint, DataColumnSidecar, DataColumnSidecarList, Domain, EthSpec,
    FixedBytesExtended, ForkName, Hash256, MainnetEthSpec, SignedBeaconBlock, SigningData, Slot,
    Validator,
};
use tree_hash::TreeHash;

pub const VALIDATOR_COUNT: usize = 64;

pub type E = MainnetEthSpec;

pub struct TestChainTypes;

impl BeaconChainTypes for TestChainTypes {
    type EthSpec = E;
    type SlotClock = ManualSlotClock;
    type KvStore = MemoryStore;
    type Engine = MockEngine;
}

pub type TestBeaconChain = BeaconChain<TestChainTypes>;

pub struct BeaconChainHarness {
    pub chain: Arc<TestBeaconChain>,
    pub spec: Arc<ChainSpec>,
    pub kzg: Kzg,
    stf: TestStateTransition,
    /// The state used for producing blocks; tracks the canonical chain tip
    /// the harness extends.
    produce_state: RwLock<BeaconState<E>>,
    pub genesis_block: Arc<SignedBeaconBlock<E>>,
}

pub fn test_validator_pubkey(index: u64) -> bls::PublicKeyBytes {
    let mut pubkey = bls::PublicKeyBytes::empty();
    pubkey.0[..8].copy_from_slice(&index.to_le_bytes());
    pubkey.0[8] = 0xaa;
    pubkey
}

impl BeaconChainHarness {
    pub fn new(fork_name: ForkName) -> Self {
        Self::new_with_validators(fork_name, VALIDATOR_COUNT)
    }

    pub fn new_with_validators(fork_name: ForkName, validator_count: usize) -> Self {
        let spec = Arc::new(ChainSpec::genesis_spec(fork_name));
        let kzg = Kzg::new_deterministic();
        let stf = TestStateTransition;

        let validators = (0..validator_count as u64)
            .map(|index| Validator::new(test_validator_pubkey(index), 32_000_000_000))
            .collect::<Vec<_>>();
        let genesis_validators_root = Hash256::from_low_u64_be(0x6e6e);
        let mut genesis_state = BeaconState::<E>::new(genesis_validators_root, validators);

        // The genesis block commits to the state root computed with its own
        // zero-state-root header installed.
        let mut genesis_block = BeaconBlock::<E>::empty(fork_name, Slot::new(0));
        let proposer = genesis_state
            .get_beacon_proposer_index(Slot::new(0))
            .expect("validators are registered");
        set_block_fields(&mut genesis_block, None, None, Some(proposer));
        let mut header = genesis_block.block_header();
        header.state_root = Hash256::zero();
        genesis_state.latest_block_header = header.clone();
        let genesis_state_root = genesis_state.canonical_root();
        set_block_fields(&mut genesis_block, None, Some(genesis_state_root), None);
        let mut header = genesis_block.block_header();
        header.state_root = Hash256::zero();
        genesis_state.latest_block_header = header;

        let genesis_block_root = genesis_block.canonical_root();
        genesis_state.epoch_boundary_root = genesis_block_root;

        let genesis_block = Arc::new(SignedBeaconBlock::from_block(
            genesis_block,
            sign(
                &test_validator_pubkey(proposer),
                block_signing_root_for(&spec, genesis_validators_root, genesis_block_root, Slot::new(0)),
            ),
        ));

        let state_cache = Arc::new(StateCache::<E>::default());
        let genesis_state = Arc::new(genesis_state);
        state_cache.insert(genesis_block_root, genesis_state.clone());
        state_cache.pin(&genesis_block_root);

        let anchor_checkpoint = Checkpoint {
            epoch: types::Epoch::new(0),
            root: genesis_block_root,
        };
        let fc_store = BeaconForkChoiceStore::new(
            anchor_checkpoint,
            JustifiedBalances::from_effective_balances(genesis_state.justified_balances()),
            state_cache.clone(),
        );
        let fork_choice = ForkChoice::from_anchor(
            fc_store,
            genesis_block_root,
            Slot::new(0),
            genesis_state_root,
            ExecutionStatus::Irrelevant,
        )
        .expect("anchor is valid");

        let slot_clock = ManualSlotClock::new(
            Slot::new(0),
            Duration::from_secs(0),
            Duration::from_secs(spec.seconds_per_slot),
        );

        let config = ChainConfig {
            genesis_validators_root,
            node_id: [7; 32],
            ..ChainConfig::default()
        };
        let custody_context = Arc::new(CustodyContext::new(config.node_id, None, &spec));

        let chain = Arc::new(BeaconChain {
            spec: spec.clone(),
            config,
            slot_clock,
            store: BlockStore::new(Arc::new(MemoryStore::new())),
            execution_layer: Arc::new(ExecutionLayer::new(MockEngine::default())),
            kzg: Arc::new(kzg.clone()),
            bls_verifier: Arc::new(DeterministicBls),
            state_transition: Arc::new(stf),
            state_cache,
            canonical_head: CanonicalHead::new(
                fork_choice,
                CachedHead {
                    head_block_root: genesis_block_root,
                    head_slot: Slot::new(0),
                    head_state_root: genesis_state_root,
                },
            ),
            data_availability_checker: DataAvailabilityChecker::new(
                Arc::new(kzg.clone()),
                custody_context.clone(),
                spec.clone(),
            ),
            custody_context,
            observed_block_producers: RwLock::new(ObservedBlockProducers::default()),
            observed_data_sidecars: RwLock::new(ObservedDataSidecars::default()),
            observed_aggregates: RwLock::new(ObservedAggregates::default()),
            observed_execution_bids: RwLock::new(ObservedExecutionBids::default()),
            event_handler: ServerSentEventHandler::new(64),
            local_proposer_slots: RwLock::new(HashSet::new()),
            sync_tx: None,
            genesis_block_root,
        });

        Self {
            chain,
            spec,
            kzg,
            stf,
            produce_state: RwLock::new((*genesis_state).clone()),
            genesis_block,
        }
    }

    pub fn set_slot(&self, slot: u64) {
        self.chain.slot_clock.set_slot(slot);
    }

    pub fn advance_slot(&self) {
        self.chain.slot_clock.advance_slot();
    }

    /// Produce a signed block at `slot` on top of the harness's produce
    /// state, carrying commitments for `blobs`.
    pub fn produce_block(
        &self,
        slot: Slot,
        blobs: &[Vec<u8>],
    ) -> (Arc<SignedBeaconBlock<E>>, Vec<Vec<u8>>) {
        // Commitments, cells and sidecars must all see identical bytes.
        let blobs = blobs
            .iter()
            .map(|blob| {
                let mut padded = blob.clone();
                padded.resize(E::bytes_per_blob(), 0);
                padded
            })
            .collect::<Vec<_>>();

        let mut state = self.produce_state.write();
        self.stf
            .advance_to_slot(&mut state, slot)
            .expect("state advances");

        let parent_root = state.latest_block_header.canonical_root();
        let proposer = state
            .get_beacon_proposer_index(slot)
            .expect("validators are registered");

        let fork_name = self.spec.fork_name_at_slot::<E>(slot);
        let mut block = BeaconBlock::<E>::empty(fork_name, slot);
        set_block_fields(&mut block, Some(parent_root), None, Some(proposer));
        set_block_payload(&mut block, slot);

        if fork_name.deneb_enabled() && !blobs.is_empty() {
            let commitments = blobs
                .iter()
                .map(|blob| self.kzg.blob_to_kzg_commitment(blob).expect("commitment"))
                .collect::<Vec<_>>();
            set_block_commitments(&mut block, commitments);
        }

        // Compute the committed state root, then apply for real.
        let mut trial = state.clone();
        let unsigned = SignedBeaconBlock::from_block(block.clone(), bls::SignatureBytes::empty());
        self.stf
            .per_block_processing(
                &mut trial,
                &unsigned,
                BlockProcessingOpts {
                    verify_state_root: false,
                    verify_execution_payload: false,
                },
            )
            .expect("trial application succeeds");
        set_block_fields(&mut block, None, Some(trial.canonical_root()), None);

        let block_root = block.canonical_root();
        let signature = sign(
            &test_validator_pubkey(proposer),
            block_signing_root_for(
                &self.spec,
                self.chain.config.genesis_validators_root,
                block_root,
                slot,
            ),
        );
        let signed = SignedBeaconBlock::from_block(block, signature);

        self.stf
            .per_block_processing(&mut state, &signed, BlockProcessingOpts::default())
            .expect("produced block applies");

        (Arc::new(signed), blobs)
    }

    /// Produce a signed block on an explicit parent (for building forks).
    ///
    /// Unlike [`Self::produce_block`], this does not move the harness's
    /// produce state forward.
    pub fn produce_block_on(
        &self,
        parent_root: Hash256,
        slot: Slot,
        blobs: &[Vec<u8>],
    ) -> (Arc<SignedBeaconBlock<E>>, Vec<Vec<u8>>) {
        let blobs = blobs
            .iter()
            .map(|blob| {
                let mut padded = blob.clone();
                padded.resize(E::bytes_per_blob(), 0);
                padded
            })
            .collect::<Vec<_>>();

        let parent_state = self
            .chain
            .state_cache
            .get(&parent_root)
            .expect("parent state is cached");
        let mut state = (*parent_state).clone();
        self.stf
            .advance_to_slot(&mut state, slot)
            .expect("state advances");

        let proposer = state
            .get_beacon_proposer_index(slot)
            .expect("validators are registered");
        let fork_name = self.spec.fork_name_at_slot::<E>(slot);
        let mut block = BeaconBlock::<E>::empty(fork_name, slot);
        set_block_fields(&mut block, Some(parent_root), None, Some(proposer));
        set_block_payload(&mut block, slot);

        if fork_name.deneb_enabled() && !blobs.is_empty() {
            let commitments = blobs
                .iter()
                .map(|blob| self.kzg.blob_to_kzg_commitment(blob).expect("commitment"))
                .collect::<Vec<_>>();
            set_block_commitments(&mut block, commitments);
        }

        let mut trial = state.clone();
        let unsigned = SignedBeaconBlock::from_block(block.clone(), bls::SignatureBytes::empty());
        self.stf
            .per_block_processing(
                &mut trial,
                &unsigned,
                BlockProcessingOpts {
                    verify_state_root: false,
                    verify_execution_payload: false,
                },
            )
            .expect("trial application succeeds");
        set_block_fields(&mut block, None, Some(trial.canonical_root()), None);

        let block_root = block.canonical_root();
        let signature = sign(
            &test_validator_pubkey(proposer),
            block_signing_root_for(
                &self.spec,
                self.chain.config.genesis_validators_root,
                block_root,
                slot,
            ),
        );
        (
            Arc::new(SignedBeaconBlock::from_block(block, signature)),
            blobs,
        )
    }

    /// Blob sidecars for a produced block.
    pub fn make_blob_sidecars(
        &self,
        block: &SignedBeaconBlock<E>,
        blobs: &[Vec<u8>],
    ) -> BlobSidecarList<E> {
        let blobs = blobs
            .iter()
            .map(|bytes| types::Blob::<E>::new(bytes.clone()).expect("blob length"))
            .collect::<Vec<_>>();
        BlobSidecar::build_sidecars(block, blobs, &self.kzg).expect("sidecars build")
    }

    /// All column sidecars for a produced block.
    pub fn make_column_sidecars(
        &self,
        block: &SignedBeaconBlock<E>,
        blobs: &[Vec<u8>],
    ) -> DataColumnSidecarList<E> {
        DataColumnSidecar::build_sidecars(block, blobs, &self.kzg).expect("columns build")
    }

    /// A signed aggregate from `attesters` for `block_root` at `slot`.
    ///
    /// Attesters must be members of the slot's committee.
    pub fn make_aggregate(
        &self,
        slot: Slot,
        block_root: Hash256,
        target: Checkpoint,
        attesters: &[u64],
    ) -> Attestation<E> {
        let state = self.chain.head_state().expect("head state exists");
        let committee = state
            .get_beacon_committee(slot, 0)
            .expect("committee exists");

        let mut bits = BitList::with_capacity(committee.len()).expect("bitfield fits");
        for attester in attesters {
            let position = committee
                .iter()
                .position(|member| member == attester)
                .expect("attester in committee");
            bits.set(position, true).expect("position in range");
        }

        let data = AttestationData {
            slot,
            index: 0,
            beacon_block_root: block_root,
            source: Checkpoint::default(),
            target,
        };

        let fork_name = self.spec.fork_name_at_slot::<E>(slot);
        let domain = Domain::BeaconAttester
            .compute(fork_name, self.chain.config.genesis_validators_root);
        let signing_root = types::compute_signing_root(&data, domain);
        let keys = attesters
            .iter()
            .map(|index| test_validator_pubkey(*index))
            .collect::<Vec<_>>();

        Attestation {
            aggregation_bits: bits,
            data,
            signature: sign_aggregate(&keys, signing_root),
        }
    }

    /// The committee members of `slot`.
    pub fn committee_at_slot(&self, slot: Slot) -> Vec<u64> {
        self.chain
            .head_state()
            .expect("head state exists")
            .get_beacon_committee(slot, 0)
            .expect("committee exists")
    }

    pub fn mock_engine(&self) -> &MockEngine {
        self.chain.execution_layer.engine()
    }
}

fn set_block_fields(
    block: &mut BeaconBlock<E>,
    parent_root: Option<Hash256>,
    state_root: Option<Hash256>,
    proposer_index: Option<u64>,
) {
    macro_rules! apply {
        ($inner: expr) => {{
            if let Some(parent_root) = parent_root {
                $inner.parent_root = parent_root;
            }
            if let Some(state_root) = state_root {
                $inner.state_root = state_root;
            }
            if let Some(proposer_index) = proposer_index {
                $inner.proposer_index = proposer_index;
            }
        }};
    }
    match block {
        BeaconBlock::Base(inner) => apply!(inner),
        BeaconBlock::Deneb(inner) => apply!(inner),
        BeaconBlock::Electra(inner) => apply!(inner),
    }
}

/// Give a post-merge block a distinct, non-zero execution block hash so the
/// EL dispatcher has something to notify about.
fn set_block_payload(block: &mut BeaconBlock<E>, slot: Slot) {
    let block_hash =
        types::ExecutionBlockHash::from_root(Hash256::from_low_u64_be(0xe1_0000 + slot.as_u64()));
    macro_rules! apply {
        ($inner: expr) => {
            $inner.body.execution_payload.block_hash = block_hash
        };
    }
    match block {
        BeaconBlock::Base(inner) => apply!(inner),
        BeaconBlock::Deneb(inner) => apply!(inner),
        BeaconBlock::Electra(inner) => apply!(inner),
    }
}

fn set_block_commitments(block: &mut BeaconBlock<E>, commitments: Vec<kzg::KzgCommitment>) {
    let commitments = VariableList::new(commitments).expect("commitment count in bounds");
    match block {
        BeaconBlock::Base(_) => {}
        BeaconBlock::Deneb(inner) => inner.body.blob_kzg_commitments = commitments,
        BeaconBlock::Electra(inner) => inner.body.blob_kzg_commitments = commitments,
    }
}

fn block_signing_root_for(
    spec: &ChainSpec,
    genesis_validators_root: Hash256,
    block_root: Hash256,
    slot: Slot,
) -> Hash256 {
    let fork_name = spec.fork_name_at_slot::<E>(slot);
    let domain = Domain::BeaconProposer.compute(fork_name, genesis_validators_root);
    SigningData {
        object_root: block_root,
        domain,
    }
    .tree_hash_root()
}
