use crate::{PublicKeyBytes, SignatureBytes};
use fixed_bytes::Hash256;
use std::borrow::Cow;

/// A `(signature, signing keys, message)` triple awaiting verification.
///
/// Multiple signing keys model an aggregate signature: the backend is
/// expected to verify the signature against the aggregate of the keys.
#[derive(Clone, Debug)]
pub struct SignatureSet<'a> {
    pub signature: Cow<'a, SignatureBytes>,
    pub signing_keys: Vec<Cow<'a, PublicKeyBytes>>,
    pub message: Hash256,
}

impl<'a> SignatureSet<'a> {
    /// A signature set with a single signing key.
    pub fn single_pubkey(
        signature: &'a SignatureBytes,
        signing_key: Cow<'a, PublicKeyBytes>,
        message: Hash256,
    ) -> Self {
        Self {
            signature: Cow::Borrowed(signature),
            signing_keys: vec![signing_key],
            message,
        }
    }

    /// A signature set for a signature over `message` by all `signing_keys`.
    pub fn multiple_pubkeys(
        signature: &'a SignatureBytes,
        signing_keys: Vec<Cow<'a, PublicKeyBytes>>,
        message: Hash256,
    ) -> Self {
        Self {
            signature: Cow::Borrowed(signature),
            signing_keys,
            message,
        }
    }
}
