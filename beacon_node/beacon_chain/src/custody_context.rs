//! Tracks this node's custody-group obligations under PeerDAS.
//!
//! Every node custodies at least `custody_requirement` groups, derived
//! deterministically from its node id. Staking nodes scale the count with
//! the effective balance of their registered validators; increases apply
//! from a later epoch so subnet subscriptions can catch up. Sampling
//! columns are a superset of custody columns.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};
use types::data_column_custody_group::{
    CustodyGroupError, compute_custody_columns, get_validators_custody_requirement,
};
use types::{ChainSpec, ColumnIndex, Epoch, EthSpec, Hash256, Slot};

/// Registrations older than this many slots fall out of the custody
/// calculation.
const VALIDATOR_REGISTRATION_EXPIRY_SLOTS: u64 = 256;

type SlotAndBalance = (Slot, u64);

/// Validator registrations feeding the balance-proportional custody scaling.
#[derive(Default, Debug)]
struct ValidatorRegistrations {
    /// Validator index to its latest registration slot and effective balance.
    validators: HashMap<usize, SlotAndBalance>,
    /// The custody requirement per epoch, recorded only when it changes.
    epoch_validator_custody_requirements: BTreeMap<Epoch, u64>,
}

impl ValidatorRegistrations {
    fn latest_requirement(&self) -> Option<u64> {
        self.epoch_validator_custody_requirements
            .last_key_value()
            .map(|(_, requirement)| *requirement)
    }

    fn requirement_at_epoch(&self, epoch: Epoch) -> Option<u64> {
        self.epoch_validator_custody_requirements
            .range(..=epoch)
            .last()
            .map(|(_, requirement)| *requirement)
    }

    /// Returns `Some((effective_epoch, new_requirement))` when the update
    /// raises the custody requirement.
    fn register_validators<E: EthSpec>(
        &mut self,
        validators_and_balances: Vec<(usize, u64)>,
        current_slot: Slot,
        spec: &ChainSpec,
    ) -> Option<(Epoch, u64)> {
        for (validator_index, effective_balance) in validators_and_balances {
            self.validators
                .insert(validator_index, (current_slot, effective_balance));
        }
        self.validators
            .retain(|_, (slot, _)| *slot + VALIDATOR_REGISTRATION_EXPIRY_SLOTS >= current_slot);

        // Each `balance_per_additional_custody_group` of stake is one unit.
        let custody_units = self
            .validators
            .values()
            .map(|(_, effective_balance)| effective_balance)
            .sum::<u64>()
            / spec.balance_per_additional_custody_group;
        let requirement = get_validators_custody_requirement(custody_units, spec);

        debug!(custody_units, requirement, "Registered validators");

        if Some(requirement) > self.latest_requirement() {
            // Apply from the next epoch so subnet subscriptions have time to
            // catch up and the column count is stable within an epoch.
            let effective_epoch = current_slot.epoch(E::slots_per_epoch()) + 1;
            self.epoch_validator_custody_requirements
                .entry(effective_epoch)
                .and_modify(|existing| *existing = requirement)
                .or_insert(requirement);
            Some((effective_epoch, requirement))
        } else {
            None
        }
    }
}

/// Per-column peer coverage for a published block, used to surface
/// reorg-risk warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPublishReport {
    pub block_root: Hash256,
    /// Custody columns that reached zero peers.
    pub unserved_custody_columns: Vec<ColumnIndex>,
}

pub struct CustodyContext {
    node_id: [u8; 32],
    /// Base group count before validator scaling (protocol minimum, or the
    /// supernode override).
    base_custody_group_count: u64,
    registrations: RwLock<ValidatorRegistrations>,
}

impl CustodyContext {
    pub fn new(node_id: [u8; 32], override_count: Option<u64>, spec: &ChainSpec) -> Self {
        Self {
            node_id,
            base_custody_group_count: override_count.unwrap_or(spec.custody_requirement),
            registrations: RwLock::new(ValidatorRegistrations::default()),
        }
    }

    /// The number of custody groups this node is responsible for at `epoch`.
    pub fn custody_group_count_at_epoch(&self, epoch: Epoch, spec: &ChainSpec) -> u64 {
        let validator_requirement = self
            .registrations
            .read()
            .requirement_at_epoch(epoch)
            .unwrap_or(0);
        self.base_custody_group_count
            .max(validator_requirement)
            .min(spec.number_of_custody_groups)
    }

    /// The column indices this node must custody at `epoch`, ascending.
    pub fn custody_columns_at_epoch(
        &self,
        epoch: Epoch,
        spec: &ChainSpec,
    ) -> Result<Vec<ColumnIndex>, CustodyGroupError> {
        compute_custody_columns(
            self.node_id,
            self.custody_group_count_at_epoch(epoch, spec),
            spec,
        )
    }

    /// Sampling columns: the custody set widened to at least
    /// `samples_per_slot` groups.
    pub fn sampling_columns_at_epoch(
        &self,
        epoch: Epoch,
        spec: &ChainSpec,
    ) -> Result<Vec<ColumnIndex>, CustodyGroupError> {
        let count = self
            .custody_group_count_at_epoch(epoch, spec)
            .max(spec.samples_per_slot)
            .min(spec.number_of_custody_groups);
        compute_custody_columns(self.node_id, count, spec)
    }

    /// Register local validators; returns the new requirement when it rose.
    pub fn register_validators<E: EthSpec>(
        &self,
        validators_and_balances: Vec<(usize, u64)>,
        current_slot: Slot,
        spec: &ChainSpec,
    ) -> Option<(Epoch, u64)> {
        self.registrations.write().register_validators::<E>(
            validators_and_balances,
            current_slot,
            spec,
        )
    }

    /// Record how many peers each column of a newly imported block was
    /// published to, warning when a custody column reached nobody.
    pub fn report_sent_peers_per_subnet(
        &self,
        block_root: Hash256,
        epoch: Epoch,
        sent_peers_per_column: &[usize],
        spec: &ChainSpec,
    ) -> Result<ColumnPublishReport, CustodyGroupError> {
        let custody_columns = self.custody_columns_at_epoch(epoch, spec)?;
        let unserved_custody_columns = custody_columns
            .into_iter()
            .filter(|index| {
                sent_peers_per_column
                    .get(*index as usize)
                    .is_none_or(|peers| *peers == 0)
            })
            .collect::<Vec<_>>();

        if !unserved_custody_columns.is_empty() {
            warn!(
                ?block_root,
                columns = ?unserved_custody_columns,
                "Custody columns published to zero peers; reorg risk"
            );
        }

        Ok(ColumnPublishReport {
            block_root,
            unserved_custody_columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{FixedBytesExtended, ForkName, MainnetEthSpec};

    type E = MainnetEthSpec;

    fn spec() -> ChainSpec {
        ChainSpec::genesis_spec(ForkName::Fulu)
    }

    fn context() -> CustodyContext {
        CustodyContext::new([7; 32], None, &spec())
    }

    #[test]
    fn custody_is_deterministic_subset_of_sampling() {
        let spec = spec();
        let context = context();
        let custody = context
            .custody_columns_at_epoch(Epoch::new(0), &spec)
            .unwrap();
        let sampling = context
            .sampling_columns_at_epoch(Epoch::new(0), &spec)
            .unwrap();

        assert_eq!(custody.len() as u64, spec.custody_requirement);
        assert_eq!(sampling.len() as u64, spec.samples_per_slot);
        assert!(custody.iter().all(|column| sampling.contains(column)));
        assert_eq!(
            custody,
            context
                .custody_columns_at_epoch(Epoch::new(0), &spec)
                .unwrap()
        );
    }

    #[test]
    fn supernode_override_takes_all_columns() {
        let spec = spec();
        let context = CustodyContext::new([7; 32], Some(spec.number_of_custody_groups), &spec);
        let custody = context
            .custody_columns_at_epoch(Epoch::new(0), &spec)
            .unwrap();
        assert_eq!(custody.len() as u64, spec.number_of_columns);
    }

    #[test]
    fn validator_registration_raises_requirement_next_epoch() {
        let spec = spec();
        let context = context();

        // 64 units of 32 ETH: requirement becomes 64 groups.
        let registration = context.register_validators::<E>(
            (0..64).map(|i| (i, 32_000_000_000)).collect(),
            Slot::new(10),
            &spec,
        );
        let (effective_epoch, requirement) = registration.expect("requirement rises");
        assert_eq!(effective_epoch, Epoch::new(1));
        assert_eq!(requirement, 64);

        // Current epoch still at the base requirement.
        assert_eq!(
            context.custody_group_count_at_epoch(Epoch::new(0), &spec),
            spec.custody_requirement
        );
        assert_eq!(
            context.custody_group_count_at_epoch(Epoch::new(1), &spec),
            64
        );
    }

    #[test]
    fn zero_peer_custody_column_is_flagged() {
        let spec = spec();
        let context = context();
        let custody = context
            .custody_columns_at_epoch(Epoch::new(0), &spec)
            .unwrap();

        // Every column served: no warnings.
        let all_served = vec![2usize; spec.number_of_columns as usize];
        let report = context
            .report_sent_peers_per_subnet(
                Hash256::from_low_u64_be(1),
                Epoch::new(0),
                &all_served,
                &spec,
            )
            .unwrap();
        assert!(report.unserved_custody_columns.is_empty());

        // One custody column at zero peers.
        let mut partial = all_served;
        partial[custody[0] as usize] = 0;
        let report = context
            .report_sent_peers_per_subnet(
                Hash256::from_low_u64_be(1),
                Epoch::new(0),
                &partial,
                &spec,
            )
            .unwrap();
        assert_eq!(report.unserved_custody_columns, vec![custody[0]]);
    }
}
