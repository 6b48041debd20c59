//! The `Slot` and `Epoch` integer newtypes.
//!
//! Arithmetic saturates at the numeric bounds; operations that can
//! meaningfully fail expose `checked_*` variants instead.

use fixed_bytes::Hash256;
use serde::{Deserialize, Serialize};
use ssz::{Decode, DecodeError, Encode};
use std::fmt;
use std::hash::Hash;
use tree_hash::{PackedEncoding, TreeHash, TreeHashType};

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(#[serde(with = "serde_utils::quoted_u64")] u64);

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(#[serde(with = "serde_utils::quoted_u64")] u64);

macro_rules! impl_common {
    ($type: ident) => {
        impl $type {
            pub const fn new(value: u64) -> $type {
                $type(value)
            }

            pub const fn as_u64(&self) -> u64 {
                self.0
            }

            pub const fn as_usize(&self) -> usize {
                self.0 as usize
            }

            pub const fn max_value() -> $type {
                $type(u64::MAX)
            }

            pub fn saturating_add<T: Into<u64>>(&self, other: T) -> $type {
                $type(self.0.saturating_add(other.into()))
            }

            pub fn saturating_sub<T: Into<u64>>(&self, other: T) -> $type {
                $type(self.0.saturating_sub(other.into()))
            }

            pub fn checked_sub<T: Into<u64>>(&self, other: T) -> Option<$type> {
                self.0.checked_sub(other.into()).map($type)
            }

            pub fn safe_rem<T: Into<u64>>(&self, other: T) -> Option<u64> {
                let other = other.into();
                if other == 0 { None } else { Some(self.0 % other) }
            }
        }

        impl From<u64> for $type {
            fn from(value: u64) -> Self {
                $type(value)
            }
        }

        impl From<usize> for $type {
            fn from(value: usize) -> Self {
                $type(value as u64)
            }
        }

        impl From<$type> for u64 {
            fn from(value: $type) -> Self {
                value.0
            }
        }

        impl PartialEq<u64> for $type {
            fn eq(&self, other: &u64) -> bool {
                self.0 == *other
            }
        }

        impl PartialOrd<u64> for $type {
            fn partial_cmp(&self, other: &u64) -> Option<std::cmp::Ordering> {
                self.0.partial_cmp(other)
            }
        }

        impl std::ops::Add<u64> for $type {
            type Output = $type;

            fn add(self, other: u64) -> $type {
                $type(self.0.saturating_add(other))
            }
        }

        impl std::ops::Add<$type> for $type {
            type Output = $type;

            fn add(self, other: $type) -> $type {
                $type(self.0.saturating_add(other.0))
            }
        }

        impl std::ops::AddAssign<u64> for $type {
            fn add_assign(&mut self, other: u64) {
                self.0 = self.0.saturating_add(other);
            }
        }

        impl std::ops::Sub<u64> for $type {
            type Output = $type;

            fn sub(self, other: u64) -> $type {
                $type(self.0.saturating_sub(other))
            }
        }

        impl std::ops::Sub<$type> for $type {
            type Output = $type;

            fn sub(self, other: $type) -> $type {
                $type(self.0.saturating_sub(other.0))
            }
        }

        impl std::ops::Rem<u64> for $type {
            type Output = u64;

            fn rem(self, modulus: u64) -> u64 {
                self.0 % modulus
            }
        }

        impl std::ops::Mul<u64> for $type {
            type Output = $type;

            fn mul(self, rhs: u64) -> $type {
                $type(self.0.saturating_mul(rhs))
            }
        }

        impl std::ops::Div<u64> for $type {
            type Output = $type;

            fn div(self, rhs: u64) -> $type {
                $type(self.0 / rhs)
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($type), self.0)
            }
        }

        impl std::str::FromStr for $type {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                u64::from_str(s).map($type)
            }
        }

        impl Encode for $type {
            fn is_ssz_fixed_len() -> bool {
                <u64 as Encode>::is_ssz_fixed_len()
            }

            fn ssz_fixed_len() -> usize {
                <u64 as Encode>::ssz_fixed_len()
            }

            fn ssz_bytes_len(&self) -> usize {
                self.0.ssz_bytes_len()
            }

            fn ssz_append(&self, buf: &mut Vec<u8>) {
                self.0.ssz_append(buf)
            }
        }

        impl Decode for $type {
            fn is_ssz_fixed_len() -> bool {
                <u64 as Decode>::is_ssz_fixed_len()
            }

            fn ssz_fixed_len() -> usize {
                <u64 as Decode>::ssz_fixed_len()
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
                u64::from_ssz_bytes(bytes).map($type)
            }
        }

        impl TreeHash for $type {
            fn tree_hash_type() -> TreeHashType {
                u64::tree_hash_type()
            }

            fn tree_hash_packed_encoding(&self) -> PackedEncoding {
                self.0.tree_hash_packed_encoding()
            }

            fn tree_hash_packing_factor() -> usize {
                u64::tree_hash_packing_factor()
            }

            fn tree_hash_root(&self) -> Hash256 {
                self.0.tree_hash_root()
            }
        }
    };
}

impl_common!(Slot);
impl_common!(Epoch);

impl Slot {
    pub fn epoch(self, slots_per_epoch: u64) -> Epoch {
        Epoch::new(self.0 / slots_per_epoch)
    }
}

impl Epoch {
    pub fn start_slot(self, slots_per_epoch: u64) -> Slot {
        Slot::new(self.0.saturating_mul(slots_per_epoch))
    }

    pub fn end_slot(self, slots_per_epoch: u64) -> Slot {
        Slot::new(
            self.0
                .saturating_add(1)
                .saturating_mul(slots_per_epoch)
                .saturating_sub(1),
        )
    }

    /// An iterator over every slot in the epoch.
    pub fn slot_iter(self, slots_per_epoch: u64) -> impl Iterator<Item = Slot> {
        let start = self.start_slot(slots_per_epoch).as_u64();
        (start..start + slots_per_epoch).map(Slot::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssz::{Decode, Encode};

    #[test]
    fn slot_epoch_conversion() {
        assert_eq!(Slot::new(0).epoch(32), Epoch::new(0));
        assert_eq!(Slot::new(31).epoch(32), Epoch::new(0));
        assert_eq!(Slot::new(32).epoch(32), Epoch::new(1));
        assert_eq!(Epoch::new(2).start_slot(32), Slot::new(64));
        assert_eq!(Epoch::new(2).end_slot(32), Slot::new(95));
    }

    #[test]
    fn saturating_arithmetic() {
        assert_eq!(Slot::new(1) - 2, Slot::new(0));
        assert_eq!(Slot::new(1).checked_sub(2u64), None);
        assert_eq!(Slot::max_value() + 1, Slot::max_value());
    }

    #[test]
    fn ssz_round_trip() {
        let slot = Slot::new(1_048_576);
        let bytes = slot.as_ssz_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(Slot::from_ssz_bytes(&bytes).unwrap(), slot);
    }

    #[test]
    fn serde_quoted() {
        let epoch = Epoch::new(1234);
        let json = serde_json::to_string(&epoch).unwrap();
        assert_eq!(json, "\"1234\"");
        assert_eq!(serde_json::from_str::<Epoch>(&json).unwrap(), epoch);
    }

    #[test]
    fn slot_iter_covers_epoch() {
        let slots = Epoch::new(1).slot_iter(32).collect::<Vec<_>>();
        assert_eq!(slots.len(), 32);
        assert_eq!(slots[0], Slot::new(32));
        assert_eq!(slots[31], Slot::new(63));
    }
}
