use crate::proto_array::{InvalidationOperation, ProtoArray, ProtoNode};
use crate::Error;
use std::collections::{BTreeSet, HashMap};
use types::{Checkpoint, Epoch, EthSpec, ExecutionBlockHash, Hash256, Slot};

/// The latest and next-to-be-applied vote of one validator.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VoteTracker {
    pub current_root: Hash256,
    pub next_root: Hash256,
    pub next_epoch: Epoch,
}

/// Represents the verification status of an execution payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExecutionStatus {
    /// An EL has determined that the payload is valid.
    Valid(ExecutionBlockHash),
    /// An EL has determined that the payload is invalid.
    Invalid(ExecutionBlockHash),
    /// An EL has not yet verified the execution payload.
    Optimistic(ExecutionBlockHash),
    /// The block is either prior to the merge fork, or after the merge fork
    /// but before the terminal PoW block has been found.
    Irrelevant,
}

impl ExecutionStatus {
    pub fn block_hash(&self) -> Option<ExecutionBlockHash> {
        match self {
            ExecutionStatus::Valid(hash)
            | ExecutionStatus::Invalid(hash)
            | ExecutionStatus::Optimistic(hash) => Some(*hash),
            ExecutionStatus::Irrelevant => None,
        }
    }

    pub fn is_execution_enabled(&self) -> bool {
        !matches!(self, ExecutionStatus::Irrelevant)
    }

    /// Whenever this function returns `true`, the block is fully valid.
    pub fn is_valid_or_irrelevant(&self) -> bool {
        matches!(self, ExecutionStatus::Valid(_) | ExecutionStatus::Irrelevant)
    }

    pub fn is_strictly_optimistic(&self) -> bool {
        matches!(self, ExecutionStatus::Optimistic(_))
    }

    pub fn is_optimistic_or_invalid(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Optimistic(_) | ExecutionStatus::Invalid(_)
        )
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ExecutionStatus::Invalid(_))
    }
}

/// A block that is to be applied to the fork choice.
///
/// A simplified version of `types::BeaconBlock`.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub slot: Slot,
    pub root: Hash256,
    /// `None` for the anchor (genesis or checkpoint-sync) block.
    pub parent_root: Option<Hash256>,
    pub state_root: Hash256,
    pub target_root: Hash256,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub proposer_index: u64,
    pub execution_status: ExecutionStatus,
    pub data_available: bool,
}

/// Effective balances of the active validator set at the justified state.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JustifiedBalances {
    pub effective_balances: Vec<u64>,
    pub total_effective_balance: u64,
}

impl JustifiedBalances {
    pub fn from_effective_balances(effective_balances: Vec<u64>) -> Self {
        let total_effective_balance = effective_balances.iter().sum();
        Self {
            effective_balances,
            total_effective_balance,
        }
    }
}

/// A Vec-wrapper which will grow to match any request.
///
/// E.g., a `get` or `insert` to an out-of-bounds element will cause the Vec
/// to grow (using Default) to the smallest size required to fulfill the
/// request.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct ElasticList<T>(pub Vec<T>);

impl<T: Default> ElasticList<T> {
    fn ensure(&mut self, i: usize) {
        if self.0.len() <= i {
            self.0.resize_with(i + 1, Default::default);
        }
    }

    pub fn get_mut(&mut self, i: usize) -> &mut T {
        self.ensure(i);
        &mut self.0[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.0.iter_mut()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtoArrayForkChoice {
    pub(crate) proto_array: ProtoArray,
    pub(crate) votes: ElasticList<VoteTracker>,
    pub(crate) balances: JustifiedBalances,
    /// The root currently carrying the proposer boost, if any.
    pub(crate) previous_proposer_boost_root: Hash256,
    pub(crate) previous_proposer_boost_amount: u64,
}

impl ProtoArrayForkChoice {
    /// Create a new arena rooted at the anchor block.
    pub fn new<E: EthSpec>(
        anchor_block_slot: Slot,
        anchor_block_root: Hash256,
        anchor_state_root: Hash256,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
        execution_status: ExecutionStatus,
    ) -> Result<Self, Error> {
        let mut proto_array = ProtoArray {
            prune_threshold: 256,
            justified_checkpoint,
            finalized_checkpoint,
            nodes: Vec::with_capacity(1),
            indices: HashMap::with_capacity(1),
        };

        proto_array.on_block::<E>(Block {
            slot: anchor_block_slot,
            root: anchor_block_root,
            parent_root: None,
            state_root: anchor_state_root,
            target_root: anchor_block_root,
            justified_checkpoint,
            finalized_checkpoint,
            proposer_index: 0,
            execution_status,
            data_available: true,
        })?;

        Ok(Self {
            proto_array,
            votes: ElasticList::default(),
            balances: JustifiedBalances::default(),
            previous_proposer_boost_root: Hash256::default(),
            previous_proposer_boost_amount: 0,
        })
    }

    pub fn process_block<E: EthSpec>(&mut self, block: Block) -> Result<(), Error> {
        self.proto_array.on_block::<E>(block)
    }

    /// Record a validator's latest message. Only the newest target epoch wins.
    pub fn process_attestation(
        &mut self,
        validator_index: usize,
        block_root: Hash256,
        target_epoch: Epoch,
    ) -> Result<(), Error> {
        let vote = self.votes.get_mut(validator_index);
        if target_epoch > vote.next_epoch || *vote == VoteTracker::default() {
            vote.next_root = block_root;
            vote.next_epoch = target_epoch;
        }
        Ok(())
    }

    /// Run LMD-GHOST and return the head.
    #[allow(clippy::too_many_arguments)]
    pub fn find_head<E: EthSpec>(
        &mut self,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
        justified_state_balances: &JustifiedBalances,
        proposer_boost_root: Hash256,
        equivocating_indices: &BTreeSet<u64>,
        current_slot: Slot,
        proposer_score_boost_percent: u64,
    ) -> Result<Hash256, Error> {
        let old_balances = std::mem::take(&mut self.balances);
        let new_balances = justified_state_balances;

        let mut deltas = compute_deltas(
            &self.proto_array.indices,
            &mut self.votes,
            &old_balances.effective_balances,
            &new_balances.effective_balances,
            equivocating_indices,
        )?;

        // Exchange the previous proposer boost for the current one.
        let new_boost_amount = if proposer_boost_root.is_zero() {
            0
        } else {
            calculate_committee_fraction::<E>(new_balances, proposer_score_boost_percent)
        };
        if !self.previous_proposer_boost_root.is_zero() {
            if let Some(&index) = self
                .proto_array
                .indices
                .get(&self.previous_proposer_boost_root)
            {
                let delta = deltas.get_mut(index).ok_or(Error::InvalidNodeDelta(index))?;
                *delta = delta
                    .checked_sub(self.previous_proposer_boost_amount as i64)
                    .ok_or(Error::DeltaOverflow(index))?;
            }
        }
        if new_boost_amount > 0 {
            if let Some(&index) = self.proto_array.indices.get(&proposer_boost_root) {
                let delta = deltas.get_mut(index).ok_or(Error::InvalidNodeDelta(index))?;
                *delta = delta
                    .checked_add(new_boost_amount as i64)
                    .ok_or(Error::DeltaOverflow(index))?;
            }
        }
        self.previous_proposer_boost_root = proposer_boost_root;
        self.previous_proposer_boost_amount = new_boost_amount;

        self.proto_array
            .apply_score_changes(deltas, justified_checkpoint, finalized_checkpoint)?;
        self.balances = new_balances.clone();

        self.proto_array
            .find_head(&justified_checkpoint.root, current_slot)
    }

    pub fn maybe_prune(&mut self, finalized_root: Hash256) -> Result<(), Error> {
        self.proto_array.maybe_prune(finalized_root)
    }

    pub fn process_execution_payload_validation(
        &mut self,
        block_root: Hash256,
    ) -> Result<(), Error> {
        self.proto_array
            .propagate_execution_payload_validation(block_root)
    }

    pub fn process_execution_payload_invalidation(
        &mut self,
        op: &InvalidationOperation,
    ) -> Result<(), Error> {
        self.proto_array
            .propagate_execution_payload_invalidation(op)
    }

    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.proto_array.contains_block(block_root)
    }

    pub fn get_block(&self, block_root: &Hash256) -> Option<&ProtoNode> {
        self.proto_array.get_node(block_root)
    }

    pub fn get_parent(&self, block_root: &Hash256) -> Option<&ProtoNode> {
        let parent_index = self.proto_array.get_node(block_root)?.parent?;
        self.proto_array.nodes.get(parent_index)
    }

    pub fn get_weight(&self, block_root: &Hash256) -> Option<u64> {
        self.proto_array
            .get_node(block_root)
            .map(|node| node.weight)
    }

    pub fn is_descendant(&self, ancestor_root: Hash256, descendant_root: Hash256) -> bool {
        self.proto_array
            .is_descendant(ancestor_root, descendant_root)
    }

    /// The lowest common ancestor of two blocks, with the reorg depth
    /// measured in slots from `old_root`.
    pub fn common_ancestor(&self, old_root: Hash256, new_root: Hash256) -> Option<(Hash256, u64)> {
        let old_slot = self.proto_array.get_node(&old_root)?.slot;
        let ancestor = self.proto_array.common_ancestor(old_root, new_root)?;
        Some((
            ancestor.root,
            old_slot.as_u64().saturating_sub(ancestor.slot.as_u64()),
        ))
    }

    pub fn dependent_root<E: EthSpec>(&self, root: Hash256, epoch: Epoch) -> Option<Hash256> {
        self.proto_array.dependent_root::<E>(root, epoch)
    }

    pub fn ancestor_at_slot(&self, root: Hash256, slot: Slot) -> Option<Hash256> {
        self.proto_array.ancestor_at_slot(root, slot)
    }

    /// Every block root currently in the arena.
    pub fn iter_roots(&self) -> impl Iterator<Item = Hash256> + '_ {
        self.proto_array.nodes.iter().map(|node| node.root)
    }

    pub fn len(&self) -> usize {
        self.proto_array.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proto_array.nodes.is_empty()
    }

    pub fn total_effective_balance(&self) -> u64 {
        self.balances.total_effective_balance
    }
}

/// The weight a fraction of one committee carries, used for the proposer
/// boost and re-org thresholds.
pub fn calculate_committee_fraction<E: EthSpec>(
    justified_balances: &JustifiedBalances,
    fraction_percent: u64,
) -> u64 {
    let committee_weight = justified_balances.total_effective_balance / E::slots_per_epoch();
    committee_weight.saturating_mul(fraction_percent) / 100
}

/// Returns a list of `deltas`, where there is one delta for each of the
/// indices in `indices`.
///
/// The deltas are formed by a change between `old_balances` and
/// `new_balances`, and/or a change of vote in `votes`. Equivocating
/// validators' weight is removed and never re-added.
fn compute_deltas(
    indices: &HashMap<Hash256, usize>,
    votes: &mut ElasticList<VoteTracker>,
    old_balances: &[u64],
    new_balances: &[u64],
    equivocating_indices: &BTreeSet<u64>,
) -> Result<Vec<i64>, Error> {
    let mut deltas = vec![0_i64; indices.len()];

    for (validator_index, vote) in votes.iter_mut().enumerate() {
        // There is no need to create a score change if the validator has
        // never voted.
        if vote.current_root == Hash256::default() && vote.next_root == Hash256::default() {
            continue;
        }

        if equivocating_indices.contains(&(validator_index as u64)) {
            // Remove any weight this validator is currently contributing and
            // freeze their vote so it is never applied again.
            if let Some(&index) = indices.get(&vote.current_root) {
                let delta = deltas.get_mut(index).ok_or(Error::InvalidNodeDelta(index))?;
                let old_balance = old_balances.get(validator_index).copied().unwrap_or(0);
                *delta = delta
                    .checked_sub(old_balance as i64)
                    .ok_or(Error::DeltaOverflow(index))?;
            }
            *vote = VoteTracker::default();
            continue;
        }

        // If the validator was not included in the _old_ balances (i.e., it
        // did not exist yet) then say its balance was zero.
        let old_balance = old_balances.get(validator_index).copied().unwrap_or(0);
        let new_balance = new_balances.get(validator_index).copied().unwrap_or(0);

        if vote.current_root != vote.next_root || old_balance != new_balance {
            if let Some(&index) = indices.get(&vote.current_root) {
                let delta = deltas.get_mut(index).ok_or(Error::InvalidNodeDelta(index))?;
                *delta = delta
                    .checked_sub(old_balance as i64)
                    .ok_or(Error::DeltaOverflow(index))?;
            }
            if let Some(&index) = indices.get(&vote.next_root) {
                let delta = deltas.get_mut(index).ok_or(Error::InvalidNodeDelta(index))?;
                *delta = delta
                    .checked_add(new_balance as i64)
                    .ok_or(Error::DeltaOverflow(index))?;
            }
            vote.current_root = vote.next_root;
        }
    }

    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{FixedBytesExtended, MainnetEthSpec};

    type E = MainnetEthSpec;

    fn root(i: u64) -> Hash256 {
        Hash256::from_low_u64_be(i)
    }

    fn checkpoint(epoch: u64, block: u64) -> Checkpoint {
        Checkpoint {
            epoch: Epoch::new(epoch),
            root: root(block),
        }
    }

    fn block(slot: u64, root_id: u64, parent_id: u64) -> Block {
        Block {
            slot: Slot::new(slot),
            root: root(root_id),
            parent_root: Some(root(parent_id)),
            state_root: Hash256::default(),
            target_root: root(root_id),
            justified_checkpoint: checkpoint(0, 0),
            finalized_checkpoint: checkpoint(0, 0),
            proposer_index: 0,
            execution_status: ExecutionStatus::Irrelevant,
            data_available: true,
        }
    }

    fn new_fork_choice() -> ProtoArrayForkChoice {
        ProtoArrayForkChoice::new::<E>(
            Slot::new(0),
            root(0),
            Hash256::default(),
            checkpoint(0, 0),
            checkpoint(0, 0),
            ExecutionStatus::Irrelevant,
        )
        .unwrap()
    }

    fn balances(n: usize) -> JustifiedBalances {
        JustifiedBalances::from_effective_balances(vec![32_000_000_000; n])
    }

    #[test]
    fn votes_select_heavier_fork() {
        let mut fc = new_fork_choice();
        // Two competing children of the anchor.
        fc.process_block::<E>(block(1, 1, 0)).unwrap();
        fc.process_block::<E>(block(1, 2, 0)).unwrap();

        // Two validators vote for block 1, one for block 2.
        fc.process_attestation(0, root(1), Epoch::new(1)).unwrap();
        fc.process_attestation(1, root(1), Epoch::new(1)).unwrap();
        fc.process_attestation(2, root(2), Epoch::new(1)).unwrap();

        let head = fc
            .find_head::<E>(
                checkpoint(0, 0),
                checkpoint(0, 0),
                &balances(3),
                Hash256::default(),
                &BTreeSet::new(),
                Slot::new(2),
                40,
            )
            .unwrap();
        assert_eq!(head, root(1));
    }

    #[test]
    fn proposer_boost_outweighs_single_vote() {
        let mut fc = new_fork_choice();
        fc.process_block::<E>(block(1, 1, 0)).unwrap();
        fc.process_block::<E>(block(1, 2, 0)).unwrap();

        let balances = balances(128);
        fc.process_attestation(0, root(1), Epoch::new(1)).unwrap();

        let head = fc
            .find_head::<E>(
                checkpoint(0, 0),
                checkpoint(0, 0),
                &balances,
                root(2),
                &BTreeSet::new(),
                Slot::new(2),
                40,
            )
            .unwrap();
        // Boost = (128 * 32e9 / 32) * 40% = 51.2e9 > one 32e9 vote.
        assert_eq!(head, root(2));

        // Boost expires (zero boost root): the voted fork wins again.
        let head = fc
            .find_head::<E>(
                checkpoint(0, 0),
                checkpoint(0, 0),
                &balances,
                Hash256::default(),
                &BTreeSet::new(),
                Slot::new(3),
                40,
            )
            .unwrap();
        assert_eq!(head, root(1));
    }

    #[test]
    fn equivocating_validators_lose_weight() {
        let mut fc = new_fork_choice();
        fc.process_block::<E>(block(1, 1, 0)).unwrap();
        fc.process_block::<E>(block(1, 2, 0)).unwrap();

        fc.process_attestation(0, root(1), Epoch::new(1)).unwrap();
        fc.process_attestation(1, root(2), Epoch::new(1)).unwrap();
        fc.process_attestation(2, root(2), Epoch::new(1)).unwrap();

        // Apply the votes first so the equivocators' weight is on-chain.
        fc.find_head::<E>(
            checkpoint(0, 0),
            checkpoint(0, 0),
            &balances(3),
            Hash256::default(),
            &BTreeSet::new(),
            Slot::new(2),
            40,
        )
        .unwrap();

        let mut equivocators = BTreeSet::new();
        equivocators.insert(1);
        equivocators.insert(2);

        let head = fc
            .find_head::<E>(
                checkpoint(0, 0),
                checkpoint(0, 0),
                &balances(3),
                Hash256::default(),
                &equivocators,
                Slot::new(2),
                40,
            )
            .unwrap();
        assert_eq!(head, root(1), "equivocators' fork must not win");
    }

    #[test]
    fn common_ancestor_depth() {
        let mut fc = new_fork_choice();
        fc.process_block::<E>(block(1, 1, 0)).unwrap();
        fc.process_block::<E>(block(2, 2, 1)).unwrap();
        fc.process_block::<E>(block(3, 3, 2)).unwrap();
        // Fork from block 1.
        fc.process_block::<E>(block(4, 4, 1)).unwrap();

        let (ancestor, depth) = fc.common_ancestor(root(3), root(4)).unwrap();
        assert_eq!(ancestor, root(1));
        assert_eq!(depth, 2, "old head at slot 3, ancestor at slot 1");

        let (_, zero_depth) = fc.common_ancestor(root(2), root(3)).unwrap();
        assert_eq!(zero_depth, 0, "extension is not a reorg");
    }

    #[test]
    fn pruning_rewrites_indices() {
        let mut fc = new_fork_choice();
        for i in 1..=300u64 {
            fc.process_block::<E>(block(i, i, i - 1)).unwrap();
        }
        fc.proto_array.prune_threshold = 1;
        fc.maybe_prune(root(290)).unwrap();

        assert!(!fc.contains_block(&root(1)));
        assert!(fc.contains_block(&root(290)));
        assert!(fc.contains_block(&root(300)));
        assert!(fc.is_descendant(root(290), root(300)));
    }

    #[test]
    fn invalidation_poisons_descendants() {
        let mut fc = new_fork_choice();
        let mut b1 = block(1, 1, 0);
        b1.execution_status =
            ExecutionStatus::Optimistic(ExecutionBlockHash::from_root(root(101)));
        let mut b2 = block(2, 2, 1);
        b2.execution_status =
            ExecutionStatus::Optimistic(ExecutionBlockHash::from_root(root(102)));
        fc.process_block::<E>(b1).unwrap();
        fc.process_block::<E>(b2).unwrap();

        fc.process_execution_payload_invalidation(&InvalidationOperation {
            head_block_root: root(1),
            latest_valid_hash: None,
        })
        .unwrap();

        assert!(fc.get_block(&root(1)).unwrap().execution_status.is_invalid());
        assert!(fc.get_block(&root(2)).unwrap().execution_status.is_invalid());
    }

    #[test]
    fn dependent_root_walks_behind_epoch_start() {
        let mut fc = new_fork_choice();
        // Blocks at slots 1..40 (crossing the epoch-32 boundary).
        for i in 1..=40u64 {
            fc.process_block::<E>(block(i, i, i - 1)).unwrap();
        }
        let dependent = fc.dependent_root::<E>(root(40), Epoch::new(1)).unwrap();
        assert_eq!(dependent, root(31), "last block before slot 32");
    }
}
