//! Key authority holding the gateway's RSA identity
//!
//! The authority owns a single key slot. Generation computes a new pair
//! without holding any lock and then swaps it in; readers take a snapshot
//! `Arc<KeyPair>` so an unwrap in flight always sees one consistent pair,
//! never the private half of one key and the public half of another.
//!
//! Wrapped keys use RSAES-OAEP with SHA-256 for both the hash and MGF1 and an
//! empty label, which is what WebCrypto's `RSA-OAEP` with `hash: SHA-256`
//! produces.

use crate::cipher::SymmetricKey;
use crate::error::{GatewayError, Result};
use rand::rngs::OsRng;
use ring::digest::{digest, SHA256};
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Modulus size used at startup and when a caller does not ask for one
pub const DEFAULT_KEY_BITS: usize = 4096;

/// Smallest modulus the authority will generate
pub const MIN_KEY_BITS: usize = 2048;

/// Largest modulus the authority will generate
pub const MAX_KEY_BITS: usize = 4096;

/// Checks that `bits` is a modulus size the authority will generate
pub fn validate_bits(bits: usize) -> Result<()> {
    if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&bits) || bits % 8 != 0 {
        return Err(GatewayError::KeyGeneration(format!(
            "unsupported modulus size {} (expected {}..={} bits, multiple of 8)",
            bits, MIN_KEY_BITS, MAX_KEY_BITS
        )));
    }
    Ok(())
}

/// An RSA private key and the public key derived from it
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    /// SubjectPublicKeyInfo DER of `public`
    public_der: Vec<u8>,
    fingerprint: String,
}

impl KeyPair {
    /// Generates a fresh pair with a `bits`-bit modulus
    pub fn generate(bits: usize) -> Result<Self> {
        validate_bits(bits)?;

        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| GatewayError::KeyGeneration(e.to_string()))?;
        Self::from_private(private)
    }

    /// Builds a pair around an existing private key
    pub fn from_private(private: RsaPrivateKey) -> Result<Self> {
        let public = RsaPublicKey::from(&private);
        let public_der = public
            .to_public_key_der()
            .map_err(|e| GatewayError::KeyGeneration(format!("Failed to encode public key: {}", e)))?
            .as_bytes()
            .to_vec();
        let fingerprint = hex::encode(digest(&SHA256, &public_der));

        Ok(Self {
            private,
            public,
            public_der,
            fingerprint,
        })
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// PKIX DER encoding of the public key
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_der
    }

    /// Hex SHA-256 of the PKIX DER public key
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }
}

/// Owner of the gateway's current key pair
pub struct KeyAuthority {
    slot: RwLock<Option<Arc<KeyPair>>>,
}

impl Default for KeyAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyAuthority {
    /// Creates an authority with no key pair; call [`KeyAuthority::generate`]
    /// before unwrapping anything
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Creates an authority that starts out holding `pair`
    pub fn with_key_pair(pair: KeyPair) -> Self {
        Self {
            slot: RwLock::new(Some(Arc::new(pair))),
        }
    }

    /// Generates a new key pair and makes it current
    ///
    /// This is CPU bound (seconds for 4096 bits); async callers should run it
    /// on a blocking thread. The previous pair, if any, is dropped once the
    /// last in-flight reader releases it.
    pub fn generate(&self, bits: usize) -> Result<Arc<KeyPair>> {
        debug!(bits = bits, "Generating RSA key pair");
        let pair = Arc::new(KeyPair::generate(bits)?);

        let previous = self
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&pair));

        info!(
            bits = bits,
            fingerprint = %pair.fingerprint(),
            replaced = previous.is_some(),
            "Key pair generated"
        );
        Ok(pair)
    }

    /// Snapshot of the current pair
    pub fn current(&self) -> Option<Arc<KeyPair>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_key(&self) -> bool {
        self.current().is_some()
    }

    pub fn public_key(&self) -> Option<RsaPublicKey> {
        self.current().map(|pair| pair.public.clone())
    }

    pub fn fingerprint(&self) -> Option<String> {
        self.current().map(|pair| pair.fingerprint.clone())
    }

    /// PKIX DER of the current public key, `None` before the first generate
    pub fn export_public(&self) -> Option<Vec<u8>> {
        self.current().map(|pair| pair.public_der.clone())
    }

    /// PKCS#1 DER of the current private key, `None` before the first generate
    pub fn export_private(&self) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let Some(pair) = self.current() else {
            return Ok(None);
        };
        let doc = pair
            .private
            .to_pkcs1_der()
            .map_err(|e| GatewayError::Encoding(format!("Failed to encode private key: {}", e)))?;
        Ok(Some(Zeroizing::new(doc.as_bytes().to_vec())))
    }

    /// PKCS#8 DER of the current private key, `None` before the first generate
    pub fn export_private_pkcs8(&self) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let Some(pair) = self.current() else {
            return Ok(None);
        };
        let doc = pair
            .private
            .to_pkcs8_der()
            .map_err(|e| GatewayError::Encoding(format!("Failed to encode private key: {}", e)))?;
        Ok(Some(Zeroizing::new(doc.as_bytes().to_vec())))
    }

    /// Parses a foreign public key (PKIX DER, or bare PKCS#1 DER)
    ///
    /// The authority's own key pair is not touched.
    pub fn import_public(der: &[u8]) -> Result<RsaPublicKey> {
        RsaPublicKey::from_public_key_der(der)
            .or_else(|spki_err| {
                RsaPublicKey::from_pkcs1_der(der).map_err(|_| spki_err.to_string())
            })
            .map_err(GatewayError::KeyParse)
    }

    /// Unwraps a symmetric key sealed to the current public key
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<SymmetricKey> {
        self.decrypt(wrapped).map(SymmetricKey::new)
    }

    /// OAEP-decrypts `ciphertext` with the current private key
    ///
    /// Every padding or decryption failure maps to the same
    /// [`GatewayError::UnwrapFailed`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let pair = self.current().ok_or(GatewayError::NoKeyAvailable)?;
        pair.private
            .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| {
                debug!(ciphertext_len = ciphertext.len(), "OAEP decryption rejected");
                GatewayError::UnwrapFailed
            })
    }
}

/// OAEP-encrypts `message` to `public`
pub fn encrypt_for(public: &RsaPublicKey, message: &[u8]) -> Result<Vec<u8>> {
    public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), message)
        .map_err(|_| GatewayError::MessageTooLong {
            len: message.len(),
            bits: public.size() * 8,
        })
}
