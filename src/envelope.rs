//! Hybrid envelopes: an RSA-wrapped AES key plus an AES-GCM sealed payload
//!
//! ## Opening
//!
//! 1. Unwrap the symmetric key with the authority's current private key
//! 2. Open the sealed payload with that key
//! 3. Drop the key (it is zeroized on drop)
//!
//! ## Sealing
//!
//! Callers normally seal on their own side with the published public key.
//! [`seal`] does the same thing server side: fresh AES-256 key, sealed
//! payload, key wrapped to the recipient.

use crate::authority::{encrypt_for, KeyAuthority};
use crate::cipher::{self, SymmetricKey, DEFAULT_KEY_LEN};
use crate::error::Result;
use rsa::RsaPublicKey;
use std::sync::Arc;
use tracing::debug;

/// A wrapped key together with the payload it seals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// RSA-OAEP encrypted symmetric key
    pub wrapped_key: Vec<u8>,
    /// `nonce || ciphertext || tag`
    pub sealed: Vec<u8>,
}

/// Opens envelopes addressed to a [`KeyAuthority`]
#[derive(Clone)]
pub struct EnvelopeProtocol {
    authority: Arc<KeyAuthority>,
}

impl EnvelopeProtocol {
    pub fn new(authority: Arc<KeyAuthority>) -> Self {
        Self { authority }
    }

    pub fn authority(&self) -> &Arc<KeyAuthority> {
        &self.authority
    }

    /// Unwraps `wrapped_key` and opens `sealed` with it
    ///
    /// The error kind says which stage failed: `NoKeyAvailable` or
    /// `UnwrapFailed` from the unwrap, `InvalidKeyLength`,
    /// `MalformedPayload` or `AuthenticationFailed` from the decrypt.
    pub fn open(&self, wrapped_key: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        let key = self.authority.unwrap_key(wrapped_key)?;
        debug!(
            key_len = key.len(),
            sealed_len = sealed.len(),
            "Envelope key unwrapped"
        );
        let plaintext = cipher::decrypt(&key, sealed);
        drop(key);
        plaintext
    }

    pub fn open_envelope(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        self.open(&envelope.wrapped_key, &envelope.sealed)
    }
}

/// Wraps a symmetric key for `recipient`
pub fn wrap_key(recipient: &RsaPublicKey, key: &SymmetricKey) -> Result<Vec<u8>> {
    encrypt_for(recipient, key.as_bytes())
}

/// Seals `plaintext` under a fresh AES-256 key wrapped for `recipient`
pub fn seal(recipient: &RsaPublicKey, plaintext: &[u8]) -> Result<Envelope> {
    let key = SymmetricKey::generate(DEFAULT_KEY_LEN)?;
    let sealed = cipher::encrypt(&key, plaintext)?;
    let wrapped_key = wrap_key(recipient, &key)?;
    Ok(Envelope {
        wrapped_key,
        sealed,
    })
}
