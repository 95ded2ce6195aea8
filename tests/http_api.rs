//! End-to-end tests for the HTTP surface
//!
//! Clients here encrypt with the `rsa` and `aes-gcm` crates directly, the way
//! an external caller holding only the published public key would.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use keygate::authority::MIN_KEY_BITS;
use keygate::config::GatewayConfig;
use keygate::http::{handle_http_request, AppState};
use keygate::{Gateway, KeyAuthority, KeyPair};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use std::sync::{Arc, OnceLock};

fn shared_pair() -> KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| KeyPair::generate(MIN_KEY_BITS).expect("Failed to generate key"))
        .clone()
}

fn state_with(authority: KeyAuthority, config: GatewayConfig) -> Arc<AppState> {
    let gateway = Arc::new(Gateway::new(Arc::new(authority), MIN_KEY_BITS));
    Arc::new(AppState::new(gateway, &config))
}

fn state() -> Arc<AppState> {
    state_with(
        KeyAuthority::with_key_pair(shared_pair()),
        GatewayConfig::default(),
    )
}

async fn send(
    state: &Arc<AppState>,
    method: Method,
    path: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(path);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Bytes::from(json.to_string())
        }
        None => Bytes::new(),
    };
    let request = builder.body(Full::new(body)).unwrap();

    let response = handle_http_request(Arc::clone(state), request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Seals like a browser client: AES-256-GCM, 16-byte IV prefixed
fn external_seal(key: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let mut nonce = [0u8; 16];
    OsRng.fill_bytes(&mut nonce);
    let cipher = AesGcm::<Aes256, U16>::new_from_slice(key).unwrap();
    let ciphertext = cipher
        .encrypt(Nonce::<U16>::from_slice(&nonce), plaintext)
        .unwrap();
    [nonce.to_vec(), ciphertext].concat()
}

#[tokio::test]
async fn test_envelope_scenario() {
    let state = state();

    let (status, body) = send(&state, Method::GET, "/rsa/pub", None).await;
    assert_eq!(status, StatusCode::OK);
    let der = STANDARD
        .decode(body["public_key"].as_str().unwrap())
        .unwrap();
    let public = RsaPublicKey::from_public_key_der(&der).unwrap();

    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    let wrapped = public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &key)
        .unwrap();
    let sealed = external_seal(&key, b"hello");

    let (status, body) = send(
        &state,
        Method::POST,
        "/envelope/open",
        Some(serde_json::json!({
            "envelope": STANDARD.encode(&wrapped),
            "enc_message": STANDARD.encode(&sealed),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "hello");
}

#[tokio::test]
async fn test_aes_decrypt_route() {
    let state = state();
    let key = [9u8; 32];
    let sealed = external_seal(&key, b"hello");

    let (status, body) = send(
        &state,
        Method::POST,
        "/aes/dec",
        Some(serde_json::json!({
            "enc_message": STANDARD.encode(&sealed),
            "aes": STANDARD.encode(key),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "hello");

    let mut tampered = sealed.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    let (status, body) = send(
        &state,
        Method::POST,
        "/aes/dec",
        Some(serde_json::json!({
            "enc_message": STANDARD.encode(&tampered),
            "aes": STANDARD.encode(key),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "message authentication failed");
}

#[tokio::test]
async fn test_rsa_encrypt_and_decrypt_routes() {
    let state = state();
    let (_, public) = send(&state, Method::GET, "/rsa/pub", None).await;

    let (status, encrypted) = send(
        &state,
        Method::POST,
        "/rsa/enc",
        Some(serde_json::json!({
            "public_key": public["public_key"],
            "message": "hello",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, decrypted) = send(
        &state,
        Method::POST,
        "/rsa/dec",
        Some(serde_json::json!({ "enc_message": encrypted["enc_message"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decrypted["message"], "hello");

    // A failed decrypt is an error, never an empty message
    let (status, body) = send(
        &state,
        Method::POST,
        "/rsa/dec",
        Some(serde_json::json!({ "enc_message": STANDARD.encode([3u8; 256]) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("message").is_none());
    assert_eq!(body["error"], "unable to unwrap key");
}

#[tokio::test]
async fn test_generate_replaces_published_key() {
    let state = state_with(KeyAuthority::new(), GatewayConfig::default());

    let (status, body) = send(&state, Method::GET, "/rsa/pub", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no key pair available");

    let (status, generated) = send(&state, Method::POST, "/rsa", None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, published) = send(&state, Method::GET, "/rsa/pub", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["public_key"], generated["public_key"]);
}

#[tokio::test]
async fn test_rpc_route() {
    let state = state();
    let (status, body) = send(
        &state,
        Method::POST,
        "/rpc",
        Some(serde_json::json!({"jsonrpc": "2.0", "method": "kg_publicKey", "id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["result"]["public_key"].is_string());
}

#[tokio::test]
async fn test_request_validation() {
    let config = GatewayConfig {
        max_body_bytes: 256,
        ..GatewayConfig::default()
    };
    let state = state_with(KeyAuthority::with_key_pair(shared_pair()), config);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/rsa/dec")
        .header("content-type", "text/plain")
        .body(Full::new(Bytes::from_static(b"{}")))
        .unwrap();
    let response = handle_http_request(Arc::clone(&state), request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _) = send(
        &state,
        Method::POST,
        "/rsa/dec",
        Some(serde_json::json!({ "enc_message": "A".repeat(1024) })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (status, body) = send(
        &state,
        Method::POST,
        "/rsa/dec",
        Some(serde_json::json!({ "enc_message": "AA==", "name2": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("name2"));

    let (status, _) = send(&state, Method::GET, "/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&state, Method::GET, "/envelope/open", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    for path in ["/rsa/", "/rpc/"] {
        let (status, _) = send(&state, Method::GET, path, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "GET {}", path);
    }
}

#[tokio::test]
async fn test_cors_preflight() {
    let state = state();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/envelope/open")
        .header("origin", "http://localhost:4200")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = handle_http_request(Arc::clone(&state), request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(
        headers.get("access-control-allow-origin").unwrap().to_str().unwrap(),
        "http://localhost:4200"
    );
    assert_eq!(
        headers.get("access-control-allow-credentials").unwrap().to_str().unwrap(),
        "true"
    );
    assert!(headers.get("access-control-allow-methods").is_some());
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&state(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["key_loaded"], true);
}
