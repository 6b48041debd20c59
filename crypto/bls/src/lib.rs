//! BLS12-381 types for the consensus layer, behind a backend contract.
//!
//! The pairing implementation itself is a collaborator: the core only ever
//! asks "does this batch of signature sets verify?". Production deployments
//! plug a real backend in through [`BlsVerifier`]; tests use the
//! [`deterministic`] backend, which derives signatures from
//! `hash(pubkey || message)` so that both valid and invalid signatures can be
//! constructed without pairings.

mod signature_set;

pub mod deterministic;

pub use signature_set::SignatureSet;

use fixed_bytes::Hash256;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tree_hash::{PackedEncoding, TreeHash, TreeHashType, merkle_root};

pub const PUBLIC_KEY_BYTES_LEN: usize = 48;
pub const SIGNATURE_BYTES_LEN: usize = 96;

macro_rules! bytes_struct {
    ($name: ident, $len: expr, $doc: literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub fn empty() -> Self {
                Self([0; $len])
            }

            pub fn serialize(&self) -> [u8; $len] {
                self.0
            }

            pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
                if bytes.len() != $len {
                    return Err(Error::InvalidByteLength {
                        got: bytes.len(),
                        expected: $len,
                    });
                }
                let mut array = [0; $len];
                array.copy_from_slice(bytes);
                Ok(Self(array))
            }

            pub fn as_serialized(&self) -> &[u8] {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(&self.0[..]))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let stripped = s
                    .strip_prefix("0x")
                    .ok_or_else(|| "must start with 0x".to_string())?;
                let bytes = hex::decode(stripped).map_err(|e| e.to_string())?;
                Self::deserialize(&bytes).map_err(|e| format!("{:?}", e))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let string = String::deserialize(deserializer)?;
                Self::from_str(&string).map_err(D::Error::custom)
            }
        }

        impl ssz::Encode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn ssz_bytes_len(&self) -> usize {
                $len
            }

            fn ssz_append(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.0)
            }
        }

        impl ssz::Decode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, ssz::DecodeError> {
                Self::deserialize(bytes).map_err(|_| ssz::DecodeError::InvalidByteLength {
                    len: bytes.len(),
                    expected: $len,
                })
            }
        }

        impl TreeHash for $name {
            fn tree_hash_type() -> TreeHashType {
                TreeHashType::Vector
            }

            fn tree_hash_packed_encoding(&self) -> PackedEncoding {
                unreachable!("Vector should never be packed.")
            }

            fn tree_hash_packing_factor() -> usize {
                unreachable!("Vector should never be packed.")
            }

            fn tree_hash_root(&self) -> Hash256 {
                merkle_root(&self.0, 0)
            }
        }
    };
}

bytes_struct!(
    PublicKeyBytes,
    PUBLIC_KEY_BYTES_LEN,
    "A compressed BLS12-381 public key, stored as raw bytes."
);
bytes_struct!(
    SignatureBytes,
    SIGNATURE_BYTES_LEN,
    "A compressed BLS12-381 signature, stored as raw bytes."
);

pub type Signature = SignatureBytes;
pub type AggregateSignature = SignatureBytes;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    InvalidByteLength { got: usize, expected: usize },
}

/// The verification contract the ingestion core programs against.
///
/// `verify_signature_sets` has batch semantics: it returns `true` iff every
/// set in the batch verifies. Callers that need to locate a bad signature
/// after a batch failure re-verify the sets individually.
pub trait BlsVerifier: Send + Sync {
    fn verify_signature_set(&self, set: &SignatureSet) -> bool;

    fn verify_signature_sets(&self, sets: &[SignatureSet]) -> bool {
        sets.iter().all(|set| self.verify_signature_set(set))
    }
}
