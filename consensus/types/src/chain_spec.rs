use crate::{Epoch, EthSpec, ForkName, Slot};
use serde::{Deserialize, Serialize};

/// Runtime configuration: fork schedule plus the network parameters the
/// ingestion core reads.
///
/// A fork with `None` for its epoch is disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub config_name: String,
    pub seconds_per_slot: u64,
    pub genesis_slot: Slot,

    /*
     * Fork schedule. `phase0` is implicit at the genesis epoch.
     */
    pub altair_fork_epoch: Option<Epoch>,
    pub bellatrix_fork_epoch: Option<Epoch>,
    pub capella_fork_epoch: Option<Epoch>,
    pub deneb_fork_epoch: Option<Epoch>,
    pub electra_fork_epoch: Option<Epoch>,
    pub fulu_fork_epoch: Option<Epoch>,
    pub gloas_fork_epoch: Option<Epoch>,

    /*
     * Gossip timing.
     */
    pub maximum_gossip_clock_disparity_millis: u64,
    pub max_api_clock_disparity_millis: u64,

    /*
     * Blobs.
     */
    pub max_blobs_per_block: u64,
    pub max_blobs_per_block_electra: u64,
    pub blob_sidecar_subnet_count: u64,
    pub min_epochs_for_blob_sidecars_requests: u64,

    /*
     * PeerDAS.
     */
    pub number_of_columns: u64,
    pub data_column_sidecar_subnet_count: u64,
    pub number_of_custody_groups: u64,
    pub custody_requirement: u64,
    pub validator_custody_requirement: u64,
    pub balance_per_additional_custody_group: u64,
    pub samples_per_slot: u64,

    /*
     * Fork choice.
     */
    pub proposer_score_boost: u64,
    pub reorg_head_weight_threshold: u64,
    pub reorg_max_epochs_since_finalization: Epoch,
    pub intervals_per_slot: u64,

    /*
     * Events.
     */
    pub recent_block_event_horizon: u64,
}

impl ChainSpec {
    pub fn mainnet() -> Self {
        Self {
            config_name: "mainnet".to_string(),
            seconds_per_slot: 12,
            genesis_slot: Slot::new(0),
            altair_fork_epoch: Some(Epoch::new(74240)),
            bellatrix_fork_epoch: Some(Epoch::new(144896)),
            capella_fork_epoch: Some(Epoch::new(194048)),
            deneb_fork_epoch: Some(Epoch::new(269568)),
            electra_fork_epoch: Some(Epoch::new(364032)),
            fulu_fork_epoch: None,
            gloas_fork_epoch: None,
            maximum_gossip_clock_disparity_millis: 500,
            max_api_clock_disparity_millis: 1000,
            max_blobs_per_block: 6,
            max_blobs_per_block_electra: 9,
            blob_sidecar_subnet_count: 6,
            min_epochs_for_blob_sidecars_requests: 4096,
            number_of_columns: 128,
            data_column_sidecar_subnet_count: 128,
            number_of_custody_groups: 128,
            custody_requirement: 4,
            validator_custody_requirement: 8,
            balance_per_additional_custody_group: 32_000_000_000,
            samples_per_slot: 8,
            proposer_score_boost: 40,
            reorg_head_weight_threshold: 20,
            reorg_max_epochs_since_finalization: Epoch::new(2),
            intervals_per_slot: 3,
            recent_block_event_horizon: 64,
        }
    }

    /// A spec with every fork up to and including `fork_name` active from
    /// genesis, and later forks disabled. The workhorse of the test suite.
    pub fn genesis_spec(fork_name: ForkName) -> Self {
        let mut spec = Self::mainnet();
        let enable = |enabled: bool| if enabled { Some(Epoch::new(0)) } else { None };
        spec.altair_fork_epoch = enable(fork_name >= ForkName::Altair);
        spec.bellatrix_fork_epoch = enable(fork_name >= ForkName::Bellatrix);
        spec.capella_fork_epoch = enable(fork_name >= ForkName::Capella);
        spec.deneb_fork_epoch = enable(fork_name >= ForkName::Deneb);
        spec.electra_fork_epoch = enable(fork_name >= ForkName::Electra);
        spec.fulu_fork_epoch = enable(fork_name >= ForkName::Fulu);
        spec.gloas_fork_epoch = enable(fork_name >= ForkName::Gloas);
        spec
    }

    /// The fork active at `epoch`. Downgrade is impossible: a later fork's
    /// epoch is never earlier than a previous fork's.
    pub fn fork_name_at_epoch(&self, epoch: Epoch) -> ForkName {
        let active = |fork_epoch: Option<Epoch>| fork_epoch.is_some_and(|fe| epoch >= fe);
        if active(self.gloas_fork_epoch) {
            ForkName::Gloas
        } else if active(self.fulu_fork_epoch) {
            ForkName::Fulu
        } else if active(self.electra_fork_epoch) {
            ForkName::Electra
        } else if active(self.deneb_fork_epoch) {
            ForkName::Deneb
        } else if active(self.capella_fork_epoch) {
            ForkName::Capella
        } else if active(self.bellatrix_fork_epoch) {
            ForkName::Bellatrix
        } else if active(self.altair_fork_epoch) {
            ForkName::Altair
        } else {
            ForkName::Phase0
        }
    }

    pub fn fork_name_at_slot<E: EthSpec>(&self, slot: Slot) -> ForkName {
        self.fork_name_at_epoch(slot.epoch(E::slots_per_epoch()))
    }

    pub fn fork_epoch(&self, fork_name: ForkName) -> Option<Epoch> {
        match fork_name {
            ForkName::Phase0 => Some(Epoch::new(0)),
            ForkName::Altair => self.altair_fork_epoch,
            ForkName::Bellatrix => self.bellatrix_fork_epoch,
            ForkName::Capella => self.capella_fork_epoch,
            ForkName::Deneb => self.deneb_fork_epoch,
            ForkName::Electra => self.electra_fork_epoch,
            ForkName::Fulu => self.fulu_fork_epoch,
            ForkName::Gloas => self.gloas_fork_epoch,
        }
    }

    pub fn is_peer_das_enabled_for_epoch(&self, epoch: Epoch) -> bool {
        self.fork_name_at_epoch(epoch).fulu_enabled()
    }

    /// The blob count cap for blocks in `epoch`.
    pub fn max_blobs_per_block_at_epoch(&self, epoch: Epoch) -> u64 {
        if self.fork_name_at_epoch(epoch).electra_enabled() {
            self.max_blobs_per_block_electra
        } else {
            self.max_blobs_per_block
        }
    }

    pub fn blob_sidecar_subnet_id(&self, blob_index: u64) -> u64 {
        blob_index % self.blob_sidecar_subnet_count
    }

    pub fn data_column_sidecar_subnet_id(&self, column_index: u64) -> u64 {
        column_index % self.data_column_sidecar_subnet_count
    }

    pub fn maximum_gossip_clock_disparity(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.maximum_gossip_clock_disparity_millis)
    }

    pub fn max_api_clock_disparity(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.max_api_clock_disparity_millis)
    }

    pub fn seconds_per_slot_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.seconds_per_slot)
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MainnetEthSpec;

    #[test]
    fn mainnet_fork_schedule_is_monotone() {
        let spec = ChainSpec::mainnet();
        let epochs = [
            spec.altair_fork_epoch,
            spec.bellatrix_fork_epoch,
            spec.capella_fork_epoch,
            spec.deneb_fork_epoch,
            spec.electra_fork_epoch,
        ];
        for pair in epochs.windows(2) {
            if let (Some(a), Some(b)) = (pair[0], pair[1]) {
                assert!(a <= b);
            }
        }
    }

    #[test]
    fn fork_name_at_slot_boundaries() {
        let spec = ChainSpec::genesis_spec(ForkName::Electra);
        assert_eq!(
            spec.fork_name_at_slot::<MainnetEthSpec>(Slot::new(0)),
            ForkName::Electra
        );

        let mut spec = ChainSpec::genesis_spec(ForkName::Deneb);
        spec.electra_fork_epoch = Some(Epoch::new(10));
        assert_eq!(
            spec.fork_name_at_slot::<MainnetEthSpec>(Slot::new(319)),
            ForkName::Deneb
        );
        assert_eq!(
            spec.fork_name_at_slot::<MainnetEthSpec>(Slot::new(320)),
            ForkName::Electra
        );
    }

    #[test]
    fn disabled_forks_are_skipped() {
        let spec = ChainSpec::genesis_spec(ForkName::Capella);
        assert!(!spec.is_peer_das_enabled_for_epoch(Epoch::new(1_000_000)));
        assert_eq!(spec.fork_epoch(ForkName::Deneb), None);
    }

    #[test]
    fn blob_schedule_steps_at_electra() {
        let mut spec = ChainSpec::genesis_spec(ForkName::Deneb);
        spec.electra_fork_epoch = Some(Epoch::new(5));
        assert_eq!(spec.max_blobs_per_block_at_epoch(Epoch::new(4)), 6);
        assert_eq!(spec.max_blobs_per_block_at_epoch(Epoch::new(5)), 9);
    }
}
