//! JSON-RPC handler for the gateway
//!
//! Method names use the "kg" namespace prefix. Binary values are base64,
//! messages are UTF-8 strings.
//!
//! ## Supported Methods
//!
//! ### Key Management
//! - `kg_generateKeyPair`: Generates a new key pair, returns its public key
//! - `kg_publicKey`: Returns the current public key (PKIX DER)
//!
//! ### Decryption
//! - `kg_aesDecrypt`: Opens a sealed payload with a caller-supplied AES key
//! - `kg_rsaDecrypt`: OAEP-decrypts with the gateway's private key
//! - `kg_openEnvelope`: Unwraps a symmetric key and opens the payload with it
//!
//! ### Encryption
//! - `kg_rsaEncrypt`: OAEP-encrypts a message to a supplied public key

use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

/// JSON-RPC request structure
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    pub id: serde_json::Value,
}

/// JSON-RPC response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: serde_json::Value,
}

/// JSON-RPC error structure
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

// RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Gateway error codes
pub const NO_KEY_AVAILABLE: i32 = -32001;
pub const DECRYPTION_FAILED: i32 = -32002;
pub const INVALID_KEY: i32 = -32003;

impl RpcResponse {
    fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: serde_json::Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(RpcError { code, message }),
            id,
        }
    }
}

/// RPC handler for the gateway
pub struct RpcHandler {
    gateway: Arc<Gateway>,
}

impl RpcHandler {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Handles an incoming JSON-RPC request
    pub async fn handle(&self, request_body: &[u8]) -> Vec<u8> {
        let response = match serde_json::from_slice::<RpcRequest>(request_body) {
            Ok(request) => self.process_request(request).await,
            Err(e) => RpcResponse::failure(
                serde_json::Value::Null,
                PARSE_ERROR,
                format!("Parse error: {}", e),
            ),
        };

        serde_json::to_vec(&response).unwrap_or_else(|_| {
            br#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#
                .to_vec()
        })
    }

    /// Serves newline-delimited requests until the peer closes the stream
    ///
    /// A line longer than `max_line_bytes` gets an `INVALID_REQUEST` error and
    /// the connection is closed without reading the rest of it.
    pub async fn serve_lines<R, W>(&self, reader: R, mut writer: W, max_line_bytes: usize) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let limit = u64::try_from(max_line_bytes).unwrap_or(u64::MAX).saturating_add(1);

        loop {
            line.clear();
            let read = (&mut reader).take(limit).read_until(b'\n', &mut line).await?;
            if read == 0 {
                return Ok(());
            }

            if line.last() != Some(&b'\n') && line.len() > max_line_bytes {
                warn!(limit = max_line_bytes, "RPC request line too large, closing connection");
                let response = RpcResponse::failure(
                    serde_json::Value::Null,
                    INVALID_REQUEST,
                    format!("request exceeds {} bytes", max_line_bytes),
                );
                writer.write_all(&serde_json::to_vec(&response)?).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
                return Ok(());
            }

            let response = self.handle(&line).await;
            writer.write_all(&response).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    /// Processes a parsed RPC request
    async fn process_request(&self, request: RpcRequest) -> RpcResponse {
        debug!(method = %request.method, "Processing RPC request");

        if request.jsonrpc != "2.0" {
            return RpcResponse::failure(
                request.id,
                INVALID_REQUEST,
                "Invalid JSON-RPC version".to_string(),
            );
        }

        let result = match request.method.as_str() {
            "kg_generateKeyPair" => to_value(self.gateway.generate_key_pair().await),
            "kg_publicKey" => to_value(self.gateway.public_key()),
            "kg_aesDecrypt" => {
                parse_params(request.params).and_then(|p| to_value(self.gateway.aes_decrypt(p)))
            }
            "kg_rsaDecrypt" => {
                parse_params(request.params).and_then(|p| to_value(self.gateway.rsa_decrypt(p)))
            }
            "kg_rsaEncrypt" => {
                parse_params(request.params).and_then(|p| to_value(self.gateway.rsa_encrypt(p)))
            }
            "kg_openEnvelope" => {
                parse_params(request.params).and_then(|p| to_value(self.gateway.open_envelope(p)))
            }
            _ => Err(GatewayError::Rpc(format!(
                "Method not found: {}",
                request.method
            ))),
        };

        match result {
            Ok(value) => RpcResponse::success(request.id, value),
            Err(e) => {
                warn!(method = %request.method, kind = e.kind(), "RPC request failed");
                RpcResponse::failure(request.id, error_code(&e), e.to_string())
            }
        }
    }
}

/// Maps a gateway error onto a JSON-RPC error code
pub fn error_code(error: &GatewayError) -> i32 {
    match error {
        GatewayError::Rpc(msg) if msg.starts_with("Method not found") => METHOD_NOT_FOUND,
        GatewayError::Rpc(_)
        | GatewayError::Encoding(_)
        | GatewayError::MessageTooLong { .. } => INVALID_PARAMS,
        GatewayError::NoKeyAvailable => NO_KEY_AVAILABLE,
        GatewayError::UnwrapFailed
        | GatewayError::AuthenticationFailed
        | GatewayError::MalformedPayload(_) => DECRYPTION_FAILED,
        GatewayError::InvalidKeyLength(_) | GatewayError::KeyParse(_) => INVALID_KEY,
        GatewayError::KeyGeneration(_)
        | GatewayError::Random
        | GatewayError::Io(_)
        | GatewayError::Serialization(_)
        | GatewayError::Config(_) => INTERNAL_ERROR,
    }
}

fn to_value<T: Serialize>(result: Result<T>) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(result?)?)
}

/// Helper to parse RPC params
fn parse_params<T: serde::de::DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T> {
    params
        .and_then(|p| {
            if p.is_array() {
                p.as_array().and_then(|arr| arr.first().cloned())
            } else {
                Some(p)
            }
        })
        .ok_or_else(|| GatewayError::Rpc("Missing params".to_string()))
        .and_then(|p| {
            serde_json::from_value(p)
                .map_err(|e| GatewayError::Rpc(format!("Invalid params: {}", e)))
        })
}
