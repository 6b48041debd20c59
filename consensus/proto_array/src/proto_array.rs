use crate::Error;
use crate::proto_array_fork_choice::{Block, ExecutionStatus};
use std::collections::HashMap;
use types::{Checkpoint, Epoch, EthSpec, ExecutionBlockHash, Hash256, Slot};

/// A node in the fork-choice arena.
///
/// Relations are indices into `ProtoArray::nodes`; an index is only valid
/// for the lifetime of the arena generation that produced it (pruning
/// rewrites all of them).
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoNode {
    pub slot: Slot,
    pub root: Hash256,
    pub parent: Option<usize>,
    pub state_root: Hash256,
    pub target_root: Hash256,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub proposer_index: u64,
    pub execution_status: ExecutionStatus,
    pub data_available: bool,
    /// Attestation weight of the subtree rooted here, in Gwei.
    pub weight: u64,
    pub best_child: Option<usize>,
    pub best_descendant: Option<usize>,
}

/// Instruction to invalidate a payload and its descendants.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidationOperation {
    /// The consensus block whose payload the EL reported on.
    pub head_block_root: Hash256,
    /// The most recent execution block hash the EL still considers valid,
    /// when it told us.
    pub latest_valid_hash: Option<ExecutionBlockHash>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtoArray {
    /// Do not prune unless more than this many nodes precede the finalized one.
    pub prune_threshold: usize,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub nodes: Vec<ProtoNode>,
    pub indices: HashMap<Hash256, usize>,
}

impl ProtoArray {
    /// Register `block` in the arena.
    ///
    /// A block already known is a no-op; an unknown parent is an error the
    /// caller is expected to have screened out.
    pub fn on_block<E: EthSpec>(&mut self, block: Block) -> Result<(), Error> {
        if self.indices.contains_key(&block.root) {
            return Ok(());
        }

        let node_index = self.nodes.len();
        let parent = match block.parent_root {
            Some(parent_root) => Some(
                *self
                    .indices
                    .get(&parent_root)
                    .ok_or(Error::NodeUnknown(parent_root))?,
            ),
            None => None,
        };

        self.indices.insert(block.root, node_index);
        self.nodes.push(ProtoNode {
            slot: block.slot,
            root: block.root,
            parent,
            state_root: block.state_root,
            target_root: block.target_root,
            justified_checkpoint: block.justified_checkpoint,
            finalized_checkpoint: block.finalized_checkpoint,
            proposer_index: block.proposer_index,
            execution_status: block.execution_status,
            data_available: block.data_available,
            weight: 0,
            best_child: None,
            best_descendant: None,
        });

        if let Some(parent_index) = parent {
            self.maybe_update_best_child_and_descendant(parent_index, node_index)?;
        }

        Ok(())
    }

    /// Apply a batch of score changes, then refresh best-child/descendant
    /// links bottom-up.
    ///
    /// `deltas` must be aligned with `self.nodes` (one entry per node).
    pub fn apply_score_changes(
        &mut self,
        mut deltas: Vec<i64>,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
    ) -> Result<(), Error> {
        if deltas.len() != self.nodes.len() {
            return Err(Error::InvalidDeltaLen {
                deltas: deltas.len(),
                indices: self.nodes.len(),
            });
        }

        self.justified_checkpoint = justified_checkpoint;
        self.finalized_checkpoint = finalized_checkpoint;

        // Back-to-front: children precede parents in delta propagation.
        for node_index in (0..self.nodes.len()).rev() {
            let node_delta = *deltas.get(node_index).ok_or(Error::InvalidNodeDelta(node_index))?;

            let node = self
                .nodes
                .get_mut(node_index)
                .ok_or(Error::InvalidNodeIndex(node_index))?;
            if node_delta < 0 {
                node.weight = node
                    .weight
                    .checked_sub(node_delta.unsigned_abs())
                    .ok_or(Error::DeltaOverflow(node_index))?;
            } else {
                node.weight = node
                    .weight
                    .checked_add(node_delta as u64)
                    .ok_or(Error::DeltaOverflow(node_index))?;
            }

            if let Some(parent_index) = node.parent {
                let parent_delta = deltas
                    .get_mut(parent_index)
                    .ok_or(Error::InvalidParentIndex(parent_index))?;
                *parent_delta = parent_delta
                    .checked_add(node_delta)
                    .ok_or(Error::DeltaOverflow(parent_index))?;
            }
        }

        for node_index in (0..self.nodes.len()).rev() {
            if let Some(parent_index) = self
                .nodes
                .get(node_index)
                .ok_or(Error::InvalidNodeIndex(node_index))?
                .parent
            {
                self.maybe_update_best_child_and_descendant(parent_index, node_index)?;
            }
        }

        Ok(())
    }

    /// Follow best-descendant links from the justified root.
    pub fn find_head(&self, justified_root: &Hash256, current_slot: Slot) -> Result<Hash256, Error> {
        let justified_index = *self
            .indices
            .get(justified_root)
            .ok_or(Error::JustifiedNodeUnknown(*justified_root))?;
        let justified_node = self
            .nodes
            .get(justified_index)
            .ok_or(Error::InvalidNodeIndex(justified_index))?;

        let best_descendant_index = justified_node.best_descendant.unwrap_or(justified_index);
        let best_node = self
            .nodes
            .get(best_descendant_index)
            .ok_or(Error::InvalidBestDescendant(best_descendant_index))?;

        // The best descendant can fall out of viability between updates
        // (e.g. the store's justified checkpoint moved); fail loudly rather
        // than return a non-viable head.
        if !self.node_is_viable_for_head(best_node, current_slot) {
            return Err(Error::NoViableHead);
        }

        Ok(best_node.root)
    }

    /// Prune nodes behind the finalized root, rewriting indices.
    pub fn maybe_prune(&mut self, finalized_root: Hash256) -> Result<(), Error> {
        let finalized_index = *self
            .indices
            .get(&finalized_root)
            .ok_or(Error::FinalizedNodeUnknown(finalized_root))?;

        if finalized_index < self.prune_threshold {
            // Pruning small numbers of nodes is not worth the index rewrite.
            return Ok(());
        }

        for node in self.nodes.iter().take(finalized_index) {
            self.indices.remove(&node.root);
        }
        self.nodes.drain(0..finalized_index);

        for index in self.indices.values_mut() {
            *index = index
                .checked_sub(finalized_index)
                .ok_or(Error::InvalidNodeIndex(*index))?;
        }

        for node in self.nodes.iter_mut() {
            node.parent = node
                .parent
                .and_then(|parent| parent.checked_sub(finalized_index));
            node.best_child = node
                .best_child
                .and_then(|child| child.checked_sub(finalized_index));
            node.best_descendant = node
                .best_descendant
                .and_then(|descendant| descendant.checked_sub(finalized_index));
        }

        Ok(())
    }

    /// Mark the payload of `op.head_block_root` invalid, along with every
    /// descendant. Ancestors up to `latest_valid_hash` are marked valid.
    pub fn propagate_execution_payload_invalidation(
        &mut self,
        op: &InvalidationOperation,
    ) -> Result<(), Error> {
        let invalid_index = *self
            .indices
            .get(&op.head_block_root)
            .ok_or(Error::NodeUnknown(op.head_block_root))?;

        // Without a latest-valid-hash the EL has not implicated any ancestor:
        // invalidate only the reported block and its descendants.
        if op.latest_valid_hash.is_none() {
            let node = self
                .nodes
                .get_mut(invalid_index)
                .ok_or(Error::InvalidNodeIndex(invalid_index))?;
            if let Some(hash) = node.execution_status.block_hash() {
                node.execution_status = ExecutionStatus::Invalid(hash);
            }
        }

        // Walk ancestors: everything up to (and including) the latest valid
        // hash is definitely valid; in between is invalid.
        let mut ancestor_index = op.latest_valid_hash.map(|_| invalid_index);
        while let Some(index) = ancestor_index {
            let node = self
                .nodes
                .get_mut(index)
                .ok_or(Error::InvalidNodeIndex(index))?;
            let block_hash = node.execution_status.block_hash();
            if op.latest_valid_hash.is_some() && block_hash == op.latest_valid_hash {
                // An ancestor the EL vouches for must not already be invalid.
                if node.execution_status.is_invalid() {
                    return Err(Error::InvalidAncestorOfValidPayload {
                        ancestor_block_root: node.root,
                        ancestor_payload_block_hash: block_hash
                            .unwrap_or_else(ExecutionBlockHash::zero),
                    });
                }
                if let Some(hash) = block_hash {
                    node.execution_status = ExecutionStatus::Valid(hash);
                }
                break;
            }
            if let Some(hash) = block_hash {
                node.execution_status = ExecutionStatus::Invalid(hash);
            }
            ancestor_index = node.parent;
        }

        // All descendants of an invalid payload are invalid.
        for index in invalid_index + 1..self.nodes.len() {
            if self.is_descendant_by_index(invalid_index, index)? {
                let node = self
                    .nodes
                    .get_mut(index)
                    .ok_or(Error::InvalidNodeIndex(index))?;
                if let Some(hash) = node.execution_status.block_hash() {
                    node.execution_status = ExecutionStatus::Invalid(hash);
                }
            }
        }

        Ok(())
    }

    /// Upgrade `block_root` (and its ancestors) from optimistic to valid.
    pub fn propagate_execution_payload_validation(
        &mut self,
        block_root: Hash256,
    ) -> Result<(), Error> {
        let mut index = Some(
            *self
                .indices
                .get(&block_root)
                .ok_or(Error::NodeUnknown(block_root))?,
        );
        while let Some(node_index) = index {
            let node = self
                .nodes
                .get_mut(node_index)
                .ok_or(Error::InvalidNodeIndex(node_index))?;
            match node.execution_status {
                ExecutionStatus::Optimistic(hash) => {
                    node.execution_status = ExecutionStatus::Valid(hash);
                    index = node.parent;
                }
                // Valid ancestors imply valid grand-ancestors; stop.
                ExecutionStatus::Valid(_) | ExecutionStatus::Irrelevant => break,
                ExecutionStatus::Invalid(hash) => {
                    return Err(Error::InvalidAncestorOfValidPayload {
                        ancestor_block_root: node.root,
                        ancestor_payload_block_hash: hash,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn contains_block(&self, root: &Hash256) -> bool {
        self.indices.contains_key(root)
    }

    pub fn get_node(&self, root: &Hash256) -> Option<&ProtoNode> {
        self.indices.get(root).and_then(|index| self.nodes.get(*index))
    }

    /// Is `descendant_root` equal to or a descendant of `ancestor_root`?
    pub fn is_descendant(&self, ancestor_root: Hash256, descendant_root: Hash256) -> bool {
        let (Some(&ancestor_index), Some(&descendant_index)) = (
            self.indices.get(&ancestor_root),
            self.indices.get(&descendant_root),
        ) else {
            return false;
        };
        self.is_descendant_by_index(ancestor_index, descendant_index)
            .unwrap_or(false)
    }

    fn is_descendant_by_index(&self, ancestor: usize, descendant: usize) -> Result<bool, Error> {
        let ancestor_slot = self
            .nodes
            .get(ancestor)
            .ok_or(Error::InvalidNodeIndex(ancestor))?
            .slot;
        let mut index = descendant;
        loop {
            if index == ancestor {
                return Ok(true);
            }
            let node = self.nodes.get(index).ok_or(Error::InvalidNodeIndex(index))?;
            if node.slot <= ancestor_slot {
                return Ok(false);
            }
            match node.parent {
                Some(parent) => index = parent,
                None => return Ok(false),
            }
        }
    }

    /// The lowest common ancestor of two known blocks.
    pub fn common_ancestor(&self, a_root: Hash256, b_root: Hash256) -> Option<&ProtoNode> {
        let mut a = *self.indices.get(&a_root)?;
        let mut b = *self.indices.get(&b_root)?;
        loop {
            if a == b {
                return self.nodes.get(a);
            }
            let a_slot = self.nodes.get(a)?.slot;
            let b_slot = self.nodes.get(b)?.slot;
            if a_slot >= b_slot {
                a = self.nodes.get(a)?.parent?;
            } else {
                b = self.nodes.get(b)?.parent?;
            }
        }
    }

    /// The newest ancestor of `root` (inclusive) from a slot `<= slot`.
    ///
    /// Skip slots are handled by walking past them to the most recent block.
    pub fn ancestor_at_slot(&self, root: Hash256, slot: Slot) -> Option<Hash256> {
        let mut index = *self.indices.get(&root)?;
        loop {
            let node = self.nodes.get(index)?;
            if node.slot <= slot {
                return Some(node.root);
            }
            match node.parent {
                Some(parent) => index = parent,
                None => return Some(node.root),
            }
        }
    }

    /// The root of the newest ancestor of `root` from a slot *before*
    /// `epoch`'s start: the duty shuffling decision root for `epoch`.
    pub fn dependent_root<E: EthSpec>(&self, root: Hash256, epoch: Epoch) -> Option<Hash256> {
        let epoch_start = epoch.start_slot(E::slots_per_epoch());
        let mut index = *self.indices.get(&root)?;
        loop {
            let node = self.nodes.get(index)?;
            if node.slot < epoch_start {
                return Some(node.root);
            }
            match node.parent {
                Some(parent) => index = parent,
                // The oldest node in the arena stands in for all pruned
                // history.
                None => return Some(node.root),
            }
        }
    }

    /// Update `parent`'s best-child/best-descendant with candidate `child`.
    fn maybe_update_best_child_and_descendant(
        &mut self,
        parent_index: usize,
        child_index: usize,
    ) -> Result<(), Error> {
        let child = self
            .nodes
            .get(child_index)
            .ok_or(Error::InvalidNodeIndex(child_index))?;
        let parent = self
            .nodes
            .get(parent_index)
            .ok_or(Error::InvalidNodeIndex(parent_index))?;

        let child_leads_to_viable_head = self.node_leads_to_viable_head(child)?;

        enum Change {
            SetToChild,
            SetToNone,
            NoChange,
        }

        let change = if let Some(best_child_index) = parent.best_child {
            if best_child_index == child_index {
                if child_leads_to_viable_head {
                    Change::SetToChild
                } else {
                    Change::SetToNone
                }
            } else {
                let best_child = self
                    .nodes
                    .get(best_child_index)
                    .ok_or(Error::InvalidBestDescendant(best_child_index))?;
                let best_child_viable = self.node_leads_to_viable_head(best_child)?;

                if child_leads_to_viable_head && !best_child_viable {
                    Change::SetToChild
                } else if !child_leads_to_viable_head && best_child_viable {
                    Change::NoChange
                } else if child.weight == best_child.weight {
                    // Tie-break by root to keep head selection stable.
                    if child.root >= best_child.root {
                        Change::SetToChild
                    } else {
                        Change::NoChange
                    }
                } else if child.weight > best_child.weight {
                    Change::SetToChild
                } else {
                    Change::NoChange
                }
            }
        } else if child_leads_to_viable_head {
            Change::SetToChild
        } else {
            Change::NoChange
        };

        match change {
            Change::SetToChild => {
                let child_best_descendant = child.best_descendant;
                let parent = self
                    .nodes
                    .get_mut(parent_index)
                    .ok_or(Error::InvalidNodeIndex(parent_index))?;
                parent.best_child = Some(child_index);
                parent.best_descendant = Some(child_best_descendant.unwrap_or(child_index));
            }
            Change::SetToNone => {
                let parent = self
                    .nodes
                    .get_mut(parent_index)
                    .ok_or(Error::InvalidNodeIndex(parent_index))?;
                parent.best_child = None;
                parent.best_descendant = None;
            }
            Change::NoChange => {}
        }

        Ok(())
    }

    fn node_leads_to_viable_head(&self, node: &ProtoNode) -> Result<bool, Error> {
        let best_descendant_viable = if let Some(best_descendant_index) = node.best_descendant {
            let best_descendant = self
                .nodes
                .get(best_descendant_index)
                .ok_or(Error::InvalidBestDescendant(best_descendant_index))?;
            self.node_is_viable_for_head(best_descendant, Slot::max_value())
        } else {
            false
        };

        Ok(best_descendant_viable || self.node_is_viable_for_head(node, Slot::max_value()))
    }

    /// The "filter_block_tree" rule plus execution validity.
    fn node_is_viable_for_head(&self, node: &ProtoNode, current_slot: Slot) -> bool {
        if node.execution_status.is_invalid() {
            return false;
        }
        if node.slot > current_slot {
            return false;
        }

        let checkpoint_match = |node_checkpoint: Checkpoint, store_checkpoint: Checkpoint| {
            store_checkpoint.epoch == Epoch::new(0)
                || node_checkpoint.epoch == store_checkpoint.epoch
        };

        checkpoint_match(node.justified_checkpoint, self.justified_checkpoint)
            && checkpoint_match(node.finalized_checkpoint, self.finalized_checkpoint)
    }
}
