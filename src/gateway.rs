//! Gateway operations shared by the HTTP and JSON-RPC transports
//!
//! Requests and responses carry binary values as base64 strings and
//! messages as UTF-8 strings. Field names match the routes the browser
//! client already speaks (`enc_message`, `aes`, `envelope`, `public_key`).

use crate::authority::{encrypt_for, KeyAuthority};
use crate::cipher::{self, SymmetricKey};
use crate::encoding::{decode_field, encode, into_message};
use crate::envelope::EnvelopeProtocol;
use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// `POST /aes/dec`: open a sealed payload with a caller-supplied key
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AesDecryptRequest {
    pub enc_message: String,
    /// Raw AES key
    pub aes: String,
}

/// `POST /rsa/dec`: OAEP-decrypt with the gateway's private key
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RsaDecryptRequest {
    pub enc_message: String,
}

/// `POST /rsa/enc`: OAEP-encrypt a message to a third-party public key
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RsaEncryptRequest {
    /// PKIX DER public key
    pub public_key: String,
    pub message: String,
}

/// `POST /envelope/open`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvelopeOpenRequest {
    /// Wrapped symmetric key
    pub envelope: String,
    pub enc_message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RsaEncryptResponse {
    pub enc_message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKeyResponse {
    /// PKIX DER public key
    pub public_key: String,
    pub fingerprint: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyPairResponse {
    pub public_key: String,
    pub fingerprint: String,
    pub bits: usize,
}

/// Transport-independent gateway operations
pub struct Gateway {
    authority: Arc<KeyAuthority>,
    envelopes: EnvelopeProtocol,
    key_bits: usize,
}

impl Gateway {
    /// Creates a gateway around `authority`; generate calls use `key_bits`
    pub fn new(authority: Arc<KeyAuthority>, key_bits: usize) -> Self {
        Self {
            envelopes: EnvelopeProtocol::new(Arc::clone(&authority)),
            authority,
            key_bits,
        }
    }

    pub fn authority(&self) -> &Arc<KeyAuthority> {
        &self.authority
    }

    /// Generates and installs a new key pair off the async runtime
    pub async fn generate_key_pair(&self) -> Result<KeyPairResponse> {
        let authority = Arc::clone(&self.authority);
        let bits = self.key_bits;
        let pair = tokio::task::spawn_blocking(move || authority.generate(bits))
            .await
            .map_err(|e| GatewayError::KeyGeneration(format!("generation task failed: {}", e)))??;

        Ok(KeyPairResponse {
            public_key: encode(pair.public_key_der()),
            fingerprint: pair.fingerprint().to_string(),
            bits: pair.bits(),
        })
    }

    pub fn public_key(&self) -> Result<PublicKeyResponse> {
        let pair = self.authority.current().ok_or(GatewayError::NoKeyAvailable)?;
        Ok(PublicKeyResponse {
            public_key: encode(pair.public_key_der()),
            fingerprint: pair.fingerprint().to_string(),
        })
    }

    pub fn aes_decrypt(&self, request: AesDecryptRequest) -> Result<MessageResponse> {
        let key = SymmetricKey::new(decode_field("aes", &request.aes)?);
        let sealed = decode_field("enc_message", &request.enc_message)?;
        info!(sealed_len = sealed.len(), "AES decrypt");

        let plaintext = cipher::decrypt(&key, &sealed)?;
        Ok(MessageResponse {
            message: into_message(plaintext)?,
        })
    }

    pub fn rsa_decrypt(&self, request: RsaDecryptRequest) -> Result<MessageResponse> {
        let ciphertext = decode_field("enc_message", &request.enc_message)?;
        info!(ciphertext_len = ciphertext.len(), "RSA decrypt");

        let plaintext = self.authority.decrypt(&ciphertext)?;
        Ok(MessageResponse {
            message: into_message(plaintext)?,
        })
    }

    pub fn rsa_encrypt(&self, request: RsaEncryptRequest) -> Result<RsaEncryptResponse> {
        let der = decode_field("public_key", &request.public_key)?;
        let public = KeyAuthority::import_public(&der)?;
        info!(message_len = request.message.len(), "RSA encrypt");

        let ciphertext = encrypt_for(&public, request.message.as_bytes())?;
        Ok(RsaEncryptResponse {
            enc_message: encode(&ciphertext),
        })
    }

    pub fn open_envelope(&self, request: EnvelopeOpenRequest) -> Result<MessageResponse> {
        let wrapped = decode_field("envelope", &request.envelope)?;
        let sealed = decode_field("enc_message", &request.enc_message)?;
        info!(
            wrapped_len = wrapped.len(),
            sealed_len = sealed.len(),
            "Opening envelope"
        );

        let plaintext = self.envelopes.open(&wrapped, &sealed)?;
        Ok(MessageResponse {
            message: into_message(plaintext)?,
        })
    }
}
