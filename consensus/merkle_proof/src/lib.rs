//! Binary merkle proofs over `sha256`, as used by SSZ generalized indices.

use ethereum_hashing::{ZERO_HASHES, hash32_concat};
use fixed_bytes::Hash256;

/// Verify that `leaf` occupies generalized-index position
/// `2**depth + index` in the tree committed to by `root`.
///
/// `branch` lists sibling hashes from the leaf up to (but excluding) the root.
pub fn verify_merkle_proof(
    leaf: Hash256,
    branch: &[Hash256],
    depth: usize,
    index: usize,
    root: Hash256,
) -> bool {
    if branch.len() == depth {
        merkle_root_from_branch(leaf, branch, depth, index) == root
    } else {
        false
    }
}

/// Compute the root implied by `leaf` at position `index` with siblings `branch`.
pub fn merkle_root_from_branch(
    leaf: Hash256,
    branch: &[Hash256],
    depth: usize,
    index: usize,
) -> Hash256 {
    assert_eq!(branch.len(), depth, "proof length should equal depth");

    let mut merkle_root = leaf.as_slice().to_vec();

    for (i, leaf) in branch.iter().enumerate().take(depth) {
        let ith_bit = (index >> i) & 0x01;
        if ith_bit == 1 {
            merkle_root = hash32_concat(leaf.as_slice(), &merkle_root)[..].to_vec();
        } else {
            let mut input = merkle_root;
            input.extend_from_slice(leaf.as_slice());
            merkle_root = ethereum_hashing::hash(&input);
        }
    }

    Hash256::from_slice(&merkle_root)
}

/// Compute the merkle root of `leaves` padded with zero-hashes to `2**depth`.
pub fn merkle_root_from_leaves(leaves: &[Hash256], depth: usize) -> Hash256 {
    let mut layer = leaves.iter().map(|l| *l).collect::<Vec<_>>();
    for height in 0..depth {
        if layer.len() % 2 == 1 {
            layer.push(Hash256::from_slice(&ZERO_HASHES[height]));
        }
        layer = layer
            .chunks(2)
            .map(|pair| {
                Hash256::from_slice(&hash32_concat(pair[0].as_slice(), pair[1].as_slice()))
            })
            .collect();
    }
    debug_assert_eq!(layer.len(), 1);
    layer[0]
}

/// Extract the proof branch for `index` out of `leaves` (padded to `2**depth`).
pub fn merkle_branch_from_leaves(leaves: &[Hash256], depth: usize, index: usize) -> Vec<Hash256> {
    let mut branch = Vec::with_capacity(depth);
    let mut layer = leaves.to_vec();
    let mut position = index;

    for height in 0..depth {
        if layer.len() % 2 == 1 {
            layer.push(Hash256::from_slice(&ZERO_HASHES[height]));
        }
        let sibling = position ^ 1;
        branch.push(
            layer
                .get(sibling)
                .copied()
                .unwrap_or_else(|| Hash256::from_slice(&ZERO_HASHES[height])),
        );
        layer = layer
            .chunks(2)
            .map(|pair| {
                Hash256::from_slice(&hash32_concat(pair[0].as_slice(), pair[1].as_slice()))
            })
            .collect();
        position /= 2;
    }

    branch
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixed_bytes::FixedBytesExtended;

    fn leaves(n: u64) -> Vec<Hash256> {
        (0..n).map(Hash256::from_low_u64_be).collect()
    }

    #[test]
    fn branch_proves_every_leaf() {
        let depth = 4;
        let leaves = leaves(11);
        let root = merkle_root_from_leaves(&leaves, depth);

        for (index, leaf) in leaves.iter().enumerate() {
            let branch = merkle_branch_from_leaves(&leaves, depth, index);
            assert!(
                verify_merkle_proof(*leaf, &branch, depth, index, root),
                "leaf {index} should verify"
            );
            // Wrong index must not verify.
            assert!(!verify_merkle_proof(*leaf, &branch, depth, index ^ 1, root));
        }
    }

    #[test]
    fn wrong_length_branch_fails() {
        let depth = 4;
        let leaves = leaves(4);
        let root = merkle_root_from_leaves(&leaves, depth);
        let branch = merkle_branch_from_leaves(&leaves, depth, 0);
        assert!(!verify_merkle_proof(leaves[0], &branch[..3], 3, 0, root));
        assert!(!verify_merkle_proof(leaves[0], &branch[..3], depth, 0, root));
    }
}
