//! Deterministic custody-group assignment for PeerDAS.
//!
//! A node derives which custody groups it is responsible for from its node
//! id alone, so any peer can recompute the assignment. Groups map to column
//! indices by striding: column `g + number_of_custody_groups * i` belongs to
//! group `g`.

use crate::{ChainSpec, ColumnIndex};
use ethereum_hashing::hash;

pub type CustodyIndex = u64;

#[derive(Debug, PartialEq, Clone)]
pub enum CustodyGroupError {
    CustodyGroupCountTooLarge { requested: u64, maximum: u64 },
    InvalidCustodyGroup(CustodyIndex),
}

/// The custody groups assigned to `raw_node_id`, sorted ascending.
///
/// Walks hashes of successive node ids (little-endian increment) until
/// `custody_group_count` distinct groups have been drawn.
pub fn get_custody_groups(
    raw_node_id: [u8; 32],
    custody_group_count: u64,
    spec: &ChainSpec,
) -> Result<Vec<CustodyIndex>, CustodyGroupError> {
    if custody_group_count > spec.number_of_custody_groups {
        return Err(CustodyGroupError::CustodyGroupCountTooLarge {
            requested: custody_group_count,
            maximum: spec.number_of_custody_groups,
        });
    }

    let mut custody_groups = std::collections::BTreeSet::new();
    let mut current_id = raw_node_id;
    while (custody_groups.len() as u64) < custody_group_count {
        let digest = hash(&current_id);
        let group = u64::from_le_bytes(
            digest[..8].try_into().expect("digest has at least 8 bytes"),
        ) % spec.number_of_custody_groups;
        custody_groups.insert(group);

        // Increment the node id as a little-endian 256-bit integer.
        for byte in current_id.iter_mut() {
            let (incremented, overflow) = byte.overflowing_add(1);
            *byte = incremented;
            if !overflow {
                break;
            }
        }
    }

    Ok(custody_groups.into_iter().collect())
}

/// The column indices covered by `custody_group`.
pub fn compute_columns_for_custody_group(
    custody_group: CustodyIndex,
    spec: &ChainSpec,
) -> Result<Vec<ColumnIndex>, CustodyGroupError> {
    if custody_group >= spec.number_of_custody_groups {
        return Err(CustodyGroupError::InvalidCustodyGroup(custody_group));
    }
    let columns_per_group = spec.number_of_columns / spec.number_of_custody_groups;
    Ok((0..columns_per_group)
        .map(|i| spec.number_of_custody_groups * i + custody_group)
        .collect())
}

/// The full set of column indices for a node custodying `custody_group_count`
/// groups, sorted ascending.
pub fn compute_custody_columns(
    raw_node_id: [u8; 32],
    custody_group_count: u64,
    spec: &ChainSpec,
) -> Result<Vec<ColumnIndex>, CustodyGroupError> {
    let mut columns = Vec::new();
    for group in get_custody_groups(raw_node_id, custody_group_count, spec)? {
        columns.extend(compute_columns_for_custody_group(group, spec)?);
    }
    columns.sort_unstable();
    Ok(columns)
}

/// Scale the custody requirement with the stake a node carries.
///
/// `validator_custody_units` counts 32-ETH units of effective balance. The
/// result is clamped to `[validator_custody_requirement,
/// number_of_custody_groups]`, and zero when the node runs no validators.
pub fn get_validators_custody_requirement(
    validator_custody_units: u64,
    spec: &ChainSpec,
) -> u64 {
    if validator_custody_units == 0 {
        return 0;
    }
    validator_custody_units
        .max(spec.validator_custody_requirement)
        .min(spec.number_of_custody_groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ForkName;

    fn node_id(fill: u8) -> [u8; 32] {
        [fill; 32]
    }

    #[test]
    fn custody_groups_are_deterministic_and_sized() {
        let spec = ChainSpec::genesis_spec(ForkName::Fulu);
        for count in [0, 1, 4, 64, 128] {
            let a = get_custody_groups(node_id(7), count, &spec).unwrap();
            let b = get_custody_groups(node_id(7), count, &spec).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.len() as u64, count);
            assert!(a.windows(2).all(|w| w[0] < w[1]), "sorted and distinct");
        }
    }

    #[test]
    fn different_nodes_draw_different_groups() {
        let spec = ChainSpec::genesis_spec(ForkName::Fulu);
        let a = get_custody_groups(node_id(1), 4, &spec).unwrap();
        let b = get_custody_groups(node_id(2), 4, &spec).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn too_many_groups_is_an_error() {
        let spec = ChainSpec::genesis_spec(ForkName::Fulu);
        assert!(get_custody_groups(node_id(0), 129, &spec).is_err());
    }

    #[test]
    fn columns_cover_groups_exactly() {
        let spec = ChainSpec::genesis_spec(ForkName::Fulu);
        // Mainnet: one column per group, so column index == group index.
        for group in [0, 17, 127] {
            assert_eq!(
                compute_columns_for_custody_group(group, &spec).unwrap(),
                vec![group]
            );
        }
        assert!(compute_columns_for_custody_group(128, &spec).is_err());
    }

    #[test]
    fn validator_requirement_scales_and_clamps() {
        let spec = ChainSpec::genesis_spec(ForkName::Fulu);
        assert_eq!(get_validators_custody_requirement(0, &spec), 0);
        assert_eq!(
            get_validators_custody_requirement(1, &spec),
            spec.validator_custody_requirement
        );
        assert_eq!(get_validators_custody_requirement(64, &spec), 64);
        assert_eq!(
            get_validators_custody_requirement(1_000, &spec),
            spec.number_of_custody_groups
        );
    }
}
