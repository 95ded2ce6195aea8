//! Gateway configuration
//!
//! Defaults are compiled in and can be overridden from the environment:
//!
//! | Variable         | Default                 |
//! |------------------|-------------------------|
//! | `PORT`           | 3000                    |
//! | `USE_RAW_RPC`    | unset (serve HTTP)      |
//! | `RPC_PORT`       | 1234                    |
//! | `KEY_BITS`       | 4096                    |
//! | `ALLOWED_ORIGIN` | `http://localhost:4200` |
//! | `MAX_BODY_BYTES` | 64000                   |

use crate::authority::{validate_bits, DEFAULT_KEY_BITS};
use crate::error::{GatewayError, Result};
use std::str::FromStr;

/// Default HTTP port
pub const HTTP_PORT: u16 = 3000;

/// Default port for line-delimited JSON-RPC over TCP
pub const RPC_PORT: u16 = 1234;

/// Browser origin allowed by CORS
pub const ALLOWED_ORIGIN: &str = "http://localhost:4200";

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64_000;

/// How the gateway is exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeMode {
    /// REST routes and `/rpc` over HTTP/1.1
    Http,
    /// Newline-delimited JSON-RPC over plain TCP
    RawRpc,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub mode: ServeMode,
    pub http_port: u16,
    pub rpc_port: u16,
    /// Modulus size of the startup key pair and of generate calls
    pub key_bits: usize,
    pub allowed_origin: String,
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: ServeMode::Http,
            http_port: HTTP_PORT,
            rpc_port: RPC_PORT,
            key_bits: DEFAULT_KEY_BITS,
            allowed_origin: ALLOWED_ORIGIN.to_string(),
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

impl GatewayConfig {
    /// Reads overrides from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if lookup("USE_RAW_RPC").is_some() {
            config.mode = ServeMode::RawRpc;
        }
        if let Some(port) = lookup("PORT") {
            config.http_port = parse_var("PORT", &port)?;
        }
        if let Some(port) = lookup("RPC_PORT") {
            config.rpc_port = parse_var("RPC_PORT", &port)?;
        }
        if let Some(bits) = lookup("KEY_BITS") {
            config.key_bits = parse_var("KEY_BITS", &bits)?;
        }
        if let Some(origin) = lookup("ALLOWED_ORIGIN") {
            config.allowed_origin = origin;
        }
        if let Some(limit) = lookup("MAX_BODY_BYTES") {
            config.max_body_bytes = parse_var("MAX_BODY_BYTES", &limit)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        validate_bits(self.key_bits)
            .map_err(|_| GatewayError::Config(format!("KEY_BITS {} is not supported", self.key_bits)))?;
        if self.max_body_bytes == 0 {
            return Err(GatewayError::Config(
                "MAX_BODY_BYTES must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| GatewayError::Config(format!("invalid {} `{}`: {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.mode, ServeMode::Http);
        assert_eq!(config.http_port, HTTP_PORT);
        assert_eq!(config.rpc_port, RPC_PORT);
        assert_eq!(config.key_bits, DEFAULT_KEY_BITS);
        assert_eq!(config.allowed_origin, ALLOWED_ORIGIN);
        assert_eq!(config.max_body_bytes, MAX_BODY_BYTES);
    }

    #[test]
    fn test_config_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("USE_RAW_RPC", "1"),
            ("PORT", "8080"),
            ("RPC_PORT", "9000"),
            ("KEY_BITS", "2048"),
            ("ALLOWED_ORIGIN", "https://app.example.com"),
            ("MAX_BODY_BYTES", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.mode, ServeMode::RawRpc);
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.rpc_port, 9000);
        assert_eq!(config.key_bits, 2048);
        assert_eq!(config.allowed_origin, "https://app.example.com");
        assert_eq!(config.max_body_bytes, 1024);
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        for vars in [
            [("PORT", "not-a-port")],
            [("PORT", "70000")],
            [("KEY_BITS", "1024")],
            [("KEY_BITS", "16384")],
            [("KEY_BITS", "2049")],
            [("MAX_BODY_BYTES", "0")],
        ] {
            assert!(matches!(
                GatewayConfig::from_lookup(lookup(&vars)),
                Err(GatewayError::Config(_))
            ));
        }
    }
}
