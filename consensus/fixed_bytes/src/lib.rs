use alloy_primitives::FixedBytes;

pub use alloy_primitives::{B256, Uint, U128, U256};

pub type Hash64 = alloy_primitives::B64;
pub type Hash256 = B256;

/// Extension trait restoring the old `H256`-style constructors on top of
/// `alloy_primitives::FixedBytes`.
pub trait FixedBytesExtended {
    fn from_low_u64_be(value: u64) -> Self;
    fn from_low_u64_le(value: u64) -> Self;
    fn zero() -> Self;
}

impl<const N: usize> FixedBytesExtended for FixedBytes<N> {
    fn from_low_u64_be(value: u64) -> Self {
        let value_bytes = value.to_be_bytes();
        let mut buffer = [0x0; N];
        let bytes_to_copy = value_bytes.len().min(buffer.len());
        // Panic-free because bytes_to_copy <= buffer.len()
        let start_index = buffer.len().saturating_sub(bytes_to_copy);
        // Panic-free because start_index <= buffer.len()
        // and bytes_to_copy <= value_bytes.len()
        buffer
            .get_mut(start_index..)
            .expect("start_index <= buffer.len()")
            .copy_from_slice(
                value_bytes
                    .get(value_bytes.len().saturating_sub(bytes_to_copy)..)
                    .expect("bytes_to_copy <= value_byte.len()"),
            );
        Self::from(buffer)
    }

    fn from_low_u64_le(value: u64) -> Self {
        let value_bytes = value.to_le_bytes();
        let mut buffer = [0x0; N];
        let bytes_to_copy = value_bytes.len().min(buffer.len());
        buffer
            .get_mut(..bytes_to_copy)
            .expect("bytes_to_copy <= buffer.len()")
            .copy_from_slice(
                value_bytes
                    .get(..bytes_to_copy)
                    .expect("bytes_to_copy <= value_byte.len()"),
            );
        Self::from(buffer)
    }

    fn zero() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_low_u64_be_roundtrip() {
        let hash = Hash256::from_low_u64_be(0xdead_beef);
        let mut expected = [0u8; 32];
        expected[24..].copy_from_slice(&0xdead_beefu64.to_be_bytes());
        assert_eq!(hash.as_slice(), &expected);
    }

    #[test]
    fn from_low_u64_le_roundtrip() {
        let hash = Hash256::from_low_u64_le(0xdead_beef);
        let mut expected = [0u8; 32];
        expected[..8].copy_from_slice(&0xdead_beefu64.to_le_bytes());
        assert_eq!(hash.as_slice(), &expected);
    }

    #[test]
    fn zero_is_all_zero() {
        assert_eq!(Hash256::zero(), Hash256::default());
    }
}
