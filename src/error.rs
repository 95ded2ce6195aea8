//! Error types for the key gateway

use thiserror::Error;

/// Errors that can occur in the gateway
///
/// Cryptographic failures carry fixed messages. Which padding or tag check
/// failed is never reported to the caller.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no key pair available")]
    NoKeyAvailable,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid public key: {0}")]
    KeyParse(String),

    #[error("unable to unwrap key")]
    UnwrapFailed,

    #[error("invalid symmetric key length: {0} bytes")]
    InvalidKeyLength(usize),

    #[error("message authentication failed")]
    AuthenticationFailed,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("message of {len} bytes does not fit a {bits}-bit key")]
    MessageTooLong { len: usize, bits: usize },

    #[error("secure random source unavailable")]
    Random,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Short stable name of the error kind, safe to log
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::NoKeyAvailable => "no_key_available",
            GatewayError::KeyGeneration(_) => "key_generation",
            GatewayError::KeyParse(_) => "key_parse",
            GatewayError::UnwrapFailed => "unwrap_failed",
            GatewayError::InvalidKeyLength(_) => "invalid_key_length",
            GatewayError::AuthenticationFailed => "authentication_failed",
            GatewayError::MalformedPayload(_) => "malformed_payload",
            GatewayError::Encoding(_) => "encoding",
            GatewayError::MessageTooLong { .. } => "message_too_long",
            GatewayError::Random => "random",
            GatewayError::Io(_) => "io",
            GatewayError::Serialization(_) => "serialization",
            GatewayError::Rpc(_) => "rpc",
            GatewayError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
