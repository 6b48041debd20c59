use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::EnumIter;

/// The named hard forks, in activation order.
///
/// Ordinal comparison is load-bearing: `fork >= ForkName::Deneb` asks
/// "are blob sidecars a thing yet?". Once a slot's epoch has passed a fork
/// boundary, downgrade is impossible.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum ForkName {
    Phase0,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
    Electra,
    Fulu,
    Gloas,
}

impl ForkName {
    pub fn list_all() -> Vec<ForkName> {
        vec![
            ForkName::Phase0,
            ForkName::Altair,
            ForkName::Bellatrix,
            ForkName::Capella,
            ForkName::Deneb,
            ForkName::Electra,
            ForkName::Fulu,
            ForkName::Gloas,
        ]
    }

    pub fn latest() -> ForkName {
        ForkName::Gloas
    }

    /// The fork ordinal, used when mixing the fork into signing domains.
    pub fn ordinal(self) -> u64 {
        self as u64
    }

    pub fn bellatrix_enabled(self) -> bool {
        self >= ForkName::Bellatrix
    }

    pub fn capella_enabled(self) -> bool {
        self >= ForkName::Capella
    }

    /// Blob sidecars and `blob_kzg_commitments` exist.
    pub fn deneb_enabled(self) -> bool {
        self >= ForkName::Deneb
    }

    /// `execution_requests` exist in the block body.
    pub fn electra_enabled(self) -> bool {
        self >= ForkName::Electra
    }

    /// PeerDAS: data availability is column-based, not blob-based.
    pub fn fulu_enabled(self) -> bool {
        self >= ForkName::Fulu
    }

    pub fn gloas_enabled(self) -> bool {
        self >= ForkName::Gloas
    }
}

impl FromStr for ForkName {
    type Err = String;

    fn from_str(fork_name: &str) -> Result<Self, String> {
        Ok(match fork_name.to_lowercase().as_str() {
            "phase0" | "base" => ForkName::Phase0,
            "altair" => ForkName::Altair,
            "bellatrix" | "merge" => ForkName::Bellatrix,
            "capella" => ForkName::Capella,
            "deneb" => ForkName::Deneb,
            "electra" => ForkName::Electra,
            "fulu" => ForkName::Fulu,
            "gloas" => ForkName::Gloas,
            _ => return Err(format!("unknown fork name: {}", fork_name)),
        })
    }
}

impl fmt::Display for ForkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ForkName::Phase0 => "phase0".fmt(f),
            ForkName::Altair => "altair".fmt(f),
            ForkName::Bellatrix => "bellatrix".fmt(f),
            ForkName::Capella => "capella".fmt(f),
            ForkName::Deneb => "deneb".fmt(f),
            ForkName::Electra => "electra".fmt(f),
            ForkName::Fulu => "fulu".fmt(f),
            ForkName::Gloas => "gloas".fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_ordering() {
        let all = ForkName::list_all();
        for pair in all.windows(2) {
            assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn fork_name_string_round_trip() {
        for fork in ForkName::list_all() {
            assert_eq!(ForkName::from_str(&fork.to_string()).unwrap(), fork);
        }
        assert!(ForkName::from_str("petra").is_err());
    }

    #[test]
    fn capability_flags() {
        assert!(!ForkName::Capella.deneb_enabled());
        assert!(ForkName::Deneb.deneb_enabled());
        assert!(!ForkName::Electra.fulu_enabled());
        assert!(ForkName::Fulu.fulu_enabled());
        assert!(ForkName::Gloas.fulu_enabled());
    }
}
