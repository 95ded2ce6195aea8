//! Wire encoding helpers
//!
//! All binary fields cross the gateway boundary as standard, padded base64.
//! Plaintext messages cross it as UTF-8 strings.

use crate::error::{GatewayError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Decodes a base64 field, naming the field in the error
pub fn decode_field(field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| GatewayError::Encoding(format!("invalid base64 in `{}`: {}", field, e)))
}

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Converts decrypted bytes to a UTF-8 message
pub fn into_message(plaintext: Vec<u8>) -> Result<String> {
    String::from_utf8(plaintext)
        .map_err(|_| GatewayError::Encoding("plaintext is not valid UTF-8".to_string()))
}
