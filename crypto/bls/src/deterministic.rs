//! A deterministic, pairing-free stand-in for a BLS backend.
//!
//! A "signature" over `message` by `pubkey` is defined as
//! `sha256(pubkey || message)` repeated to fill 96 bytes, and an aggregate
//! signature folds the per-key signatures together with XOR. This preserves
//! the properties the core cares about (a signature is valid for exactly one
//! `(keys, message)` pair, corrupting any byte invalidates it) without any
//! real cryptography. Strictly for tests and local harnesses.

use crate::{
    BlsVerifier, PublicKeyBytes, SIGNATURE_BYTES_LEN, SignatureBytes, SignatureSet,
};
use ethereum_hashing::hash;
use fixed_bytes::Hash256;

#[derive(Debug, Default, Clone, Copy)]
pub struct DeterministicBls;

/// Produce the unique valid signature for `(pubkey, message)`.
pub fn sign(pubkey: &PublicKeyBytes, message: Hash256) -> SignatureBytes {
    let mut preimage = Vec::with_capacity(pubkey.0.len() + 32);
    preimage.extend_from_slice(&pubkey.0);
    preimage.extend_from_slice(message.as_slice());
    let digest = hash(&preimage);

    let mut sig = [0u8; SIGNATURE_BYTES_LEN];
    for (i, byte) in sig.iter_mut().enumerate() {
        *byte = digest[i % digest.len()];
    }
    SignatureBytes(sig)
}

/// Aggregate per-key signatures over the same message.
pub fn aggregate(signatures: &[SignatureBytes]) -> SignatureBytes {
    let mut agg = [0u8; SIGNATURE_BYTES_LEN];
    for signature in signatures {
        for (agg_byte, sig_byte) in agg.iter_mut().zip(signature.0.iter()) {
            *agg_byte ^= sig_byte;
        }
    }
    SignatureBytes(agg)
}

/// Sign `message` with every key and aggregate the result.
pub fn sign_aggregate(pubkeys: &[PublicKeyBytes], message: Hash256) -> SignatureBytes {
    let signatures = pubkeys
        .iter()
        .map(|pubkey| sign(pubkey, message))
        .collect::<Vec<_>>();
    aggregate(&signatures)
}

impl BlsVerifier for DeterministicBls {
    fn verify_signature_set(&self, set: &SignatureSet) -> bool {
        if set.signing_keys.is_empty() {
            return false;
        }
        let pubkeys = set
            .signing_keys
            .iter()
            .map(|key| **key)
            .collect::<Vec<_>>();
        let expected = sign_aggregate(&pubkeys, set.message);
        *set.signature == expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixed_bytes::FixedBytesExtended;
    use std::borrow::Cow;

    fn pubkey(i: u8) -> PublicKeyBytes {
        let mut key = PublicKeyBytes::empty();
        key.0[0] = i;
        key
    }

    #[test]
    fn single_signature_verifies() {
        let key = pubkey(1);
        let message = Hash256::from_low_u64_be(42);
        let signature = sign(&key, message);

        let set = SignatureSet::single_pubkey(&signature, Cow::Owned(key), message);
        assert!(DeterministicBls.verify_signature_set(&set));
    }

    #[test]
    fn corrupted_signature_fails() {
        let key = pubkey(1);
        let message = Hash256::from_low_u64_be(42);
        let mut signature = sign(&key, message);
        signature.0[17] ^= 0xff;

        let set = SignatureSet::single_pubkey(&signature, Cow::Owned(key), message);
        assert!(!DeterministicBls.verify_signature_set(&set));
    }

    #[test]
    fn aggregate_verifies_and_batch_matches_individual() {
        let keys = vec![pubkey(1), pubkey(2), pubkey(3)];
        let message = Hash256::from_low_u64_be(7);
        let signature = sign_aggregate(&keys, message);

        let set = SignatureSet::multiple_pubkeys(
            &signature,
            keys.iter().map(|k| Cow::Owned(*k)).collect(),
            message,
        );
        assert!(DeterministicBls.verify_signature_set(&set));

        let other_message = Hash256::from_low_u64_be(8);
        let other_signature = sign(&keys[0], other_message);
        let other_set =
            SignatureSet::single_pubkey(&other_signature, Cow::Owned(keys[0]), other_message);

        let batch = vec![set.clone(), other_set];
        assert_eq!(
            DeterministicBls.verify_signature_sets(&batch),
            batch
                .iter()
                .all(|s| DeterministicBls.verify_signature_set(s))
        );
    }
}
