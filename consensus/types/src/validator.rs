use bls::PublicKeyBytes;
use serde::{Deserialize, Serialize};

/// The slice of a validator record the ingestion core reads.
///
/// Epoch accounting (activation, exits, slashing status) is owned by the
/// state-transition collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub pubkey: PublicKeyBytes,
    #[serde(with = "serde_utils::quoted_u64")]
    pub effective_balance: u64,
}

impl Validator {
    pub fn new(pubkey: PublicKeyBytes, effective_balance: u64) -> Self {
        Self {
            pubkey,
            effective_balance,
        }
    }
}
