//! Keygate - an in-memory RSA key authority and hybrid-envelope gateway
//!
//! This library holds an RSA key pair for callers that should not hold
//! private key material themselves, including:
//! - Key pair generation, export (PKCS#1/PKCS#8/PKIX DER) and public key import
//! - RSA-OAEP (SHA-256) key unwrapping and direct encryption/decryption
//! - AES-GCM sealing with a 16-byte nonce prefix
//! - Envelope opening: unwrap the symmetric key, then open the payload
//! - HTTP and JSON-RPC handlers exposing those operations

pub mod authority;
pub mod cipher;
pub mod config;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod http;
pub mod rpc;

pub use authority::{KeyAuthority, KeyPair};
pub use cipher::SymmetricKey;
pub use envelope::{Envelope, EnvelopeProtocol};
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
