use types::Hash256;

#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Whether to suppress `forkchoiceUpdated` for weak heads when this node
    /// proposes next slot (the proposer-boost re-org optimisation).
    pub re_org_enabled: bool,
    /// Seconds before the next slot at which the *prepared*
    /// `forkchoiceUpdated` (with payload attributes) fires for a local
    /// proposer.
    pub prepare_payload_lookahead_secs: u64,
    /// This node's id, fixing its custody-group assignment.
    pub node_id: [u8; 32],
    /// Force the custody-group count (supernodes), instead of the protocol
    /// minimum plus validator scaling.
    pub custody_group_count_override: Option<u64>,
    /// Genesis validators root, mixed into signing domains.
    pub genesis_validators_root: Hash256,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            re_org_enabled: true,
            prepare_payload_lookahead_secs: 4,
            node_id: [0; 32],
            custody_group_count_override: None,
            genesis_validators_root: Hash256::ZERO,
        }
    }
}
