//! AES-GCM sealing with a 16-byte nonce prefix
//!
//! A sealed payload is laid out as:
//!
//! ```text
//! ┌──────────────┬──────────────────────┬──────────────┐
//! │ nonce (16 B) │ ciphertext (n bytes) │ tag (16 B)   │
//! └──────────────┴──────────────────────┴──────────────┘
//! ```
//!
//! The nonce width is wider than the usual 96 bits so payloads sealed by
//! WebCrypto clients with `iv: 16 bytes` open here unchanged. AES-128,
//! AES-192 and AES-256 keys are accepted; the key length picks the cipher.

use crate::error::{GatewayError, Result};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::{Aes128, Aes192, Aes256};
use aes_gcm::{AesGcm, Nonce};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use zeroize::Zeroizing;

/// Nonce width in bytes
pub const NONCE_LEN: usize = 16;

/// GCM authentication tag width in bytes
pub const TAG_LEN: usize = 16;

/// Key length used when the gateway picks a key itself
pub const DEFAULT_KEY_LEN: usize = 32;

type Aes128Gcm16 = AesGcm<Aes128, U16>;
type Aes192Gcm16 = AesGcm<Aes192, U16>;
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Raw AES key bytes, wiped on drop
#[derive(Clone)]
pub struct SymmetricKey(Zeroizing<Vec<u8>>);

impl SymmetricKey {
    /// Wraps raw key bytes. Length is checked when the key is used.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Generates a random key of `len` bytes (16, 24 or 32)
    pub fn generate(len: usize) -> Result<Self> {
        if !is_supported_key_len(len) {
            return Err(GatewayError::InvalidKeyLength(len));
        }
        let mut bytes = Zeroizing::new(vec![0u8; len]);
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| GatewayError::Random)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey([REDACTED; {} bytes])", self.0.len())
    }
}

fn is_supported_key_len(len: usize) -> bool {
    matches!(len, 16 | 24 | 32)
}

/// Seals `plaintext` under `key` with a fresh random nonce
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    encrypt_with_aad(key, plaintext, &[])
}

/// Opens a payload produced by [`encrypt`]
pub fn decrypt(key: &SymmetricKey, sealed: &[u8]) -> Result<Vec<u8>> {
    decrypt_with_aad(key, sealed, &[])
}

/// Seals `plaintext`, binding `aad` into the authentication tag
pub fn encrypt_with_aad(key: &SymmetricKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| GatewayError::Random)?;

    let payload = Payload { msg: plaintext, aad };
    let ciphertext = match key.len() {
        16 => seal_with::<Aes128Gcm16>(key.as_bytes(), &nonce, payload),
        24 => seal_with::<Aes192Gcm16>(key.as_bytes(), &nonce, payload),
        32 => seal_with::<Aes256Gcm16>(key.as_bytes(), &nonce, payload),
        n => Err(GatewayError::InvalidKeyLength(n)),
    }?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Opens a payload sealed with [`encrypt_with_aad`] under the same `aad`
pub fn decrypt_with_aad(key: &SymmetricKey, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if !is_supported_key_len(key.len()) {
        return Err(GatewayError::InvalidKeyLength(key.len()));
    }
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(GatewayError::MalformedPayload(format!(
            "sealed payload is {} bytes, need at least {}",
            sealed.len(),
            NONCE_LEN + TAG_LEN
        )));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let payload = Payload { msg: ciphertext, aad };
    match key.len() {
        16 => open_with::<Aes128Gcm16>(key.as_bytes(), nonce, payload),
        24 => open_with::<Aes192Gcm16>(key.as_bytes(), nonce, payload),
        _ => open_with::<Aes256Gcm16>(key.as_bytes(), nonce, payload),
    }
}

fn seal_with<C>(key: &[u8], nonce: &[u8], payload: Payload<'_, '_>) -> Result<Vec<u8>>
where
    C: KeyInit + Aead<NonceSize = U16>,
{
    let cipher = C::new_from_slice(key).map_err(|_| GatewayError::InvalidKeyLength(key.len()))?;
    cipher
        .encrypt(Nonce::<U16>::from_slice(nonce), payload)
        .map_err(|_| GatewayError::MalformedPayload("plaintext too long".to_string()))
}

fn open_with<C>(key: &[u8], nonce: &[u8], payload: Payload<'_, '_>) -> Result<Vec<u8>>
where
    C: KeyInit + Aead<NonceSize = U16>,
{
    let cipher = C::new_from_slice(key).map_err(|_| GatewayError::InvalidKeyLength(key.len()))?;
    cipher
        .decrypt(Nonce::<U16>::from_slice(nonce), payload)
        .map_err(|_| GatewayError::AuthenticationFailed)
}
