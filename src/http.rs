//! HTTP surface of the gateway
//!
//! | Route                 | Operation                         |
//! |-----------------------|-----------------------------------|
//! | `POST /rsa`           | generate a new key pair (201)     |
//! | `GET /rsa/pub`        | current public key                |
//! | `POST /rsa/dec`       | RSA-OAEP decrypt                  |
//! | `POST /rsa/enc`       | RSA-OAEP encrypt to a public key  |
//! | `POST /aes/dec`       | AES-GCM decrypt with a given key  |
//! | `POST /envelope/open` | open a hybrid envelope            |
//! | `POST /rpc`           | JSON-RPC (see [`crate::rpc`])     |
//! | `GET /health`         | liveness                          |
//!
//! JSON routes require `Content-Type: application/json` and a body no larger
//! than the configured limit. Failures are returned as `{"error": "..."}`.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::rpc::RpcHandler;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS,
    ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE, ORIGIN,
};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const JSON: &str = "application/json";

/// Shared state behind every HTTP connection
pub struct AppState {
    gateway: Arc<Gateway>,
    rpc_handler: RpcHandler,
    allowed_origin: String,
    max_body_bytes: usize,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, config: &GatewayConfig) -> Self {
        Self {
            rpc_handler: RpcHandler::new(Arc::clone(&gateway)),
            gateway,
            allowed_origin: config.allowed_origin.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn rpc_handler(&self) -> &RpcHandler {
        &self.rpc_handler
    }

    /// Largest accepted request, for HTTP bodies and raw RPC lines alike
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }
}

/// Serves one HTTP request
pub async fn handle_http_request<B>(
    state: Arc<AppState>,
    req: Request<B>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let origin = req.headers().get(ORIGIN).cloned();
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = if method == Method::OPTIONS {
        preflight()
    } else if method == Method::POST {
        match Limited::new(req.into_body(), state.max_body_bytes).collect().await {
            Ok(body) => {
                route_post(&state, &path, content_type.as_deref(), body.to_bytes()).await
            }
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body too large".to_string(),
            ),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read request body");
                error_response(StatusCode::BAD_REQUEST, format!("failed to read body: {}", e))
            }
        }
    } else {
        route_get(&state, &method, &path)
    };

    apply_cors(&state.allowed_origin, origin.as_ref(), &mut response);
    Ok(response)
}

fn route_get(state: &AppState, method: &Method, path: &str) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/") => respond(StatusCode::OK, "text/plain", Bytes::from_static(b"welcome")),
        (&Method::GET, "/health") => json_response(
            StatusCode::OK,
            &serde_json::json!({
                "status": "ok",
                "key_loaded": state.gateway.authority().has_key()
            }),
        ),
        (&Method::GET, "/rsa/pub") => result_response(StatusCode::OK, state.gateway.public_key()),
        (_, path) if is_known_route(path) => error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed".to_string(),
        ),
        _ => error_response(StatusCode::NOT_FOUND, "Not found".to_string()),
    }
}

async fn route_post(
    state: &AppState,
    path: &str,
    content_type: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let gateway = &state.gateway;
    match path {
        "/rpc" | "/rpc/" => {
            let response = state.rpc_handler.handle(&body).await;
            respond(StatusCode::OK, JSON, Bytes::from(response))
        }
        "/rsa" | "/rsa/" => result_response(StatusCode::CREATED, gateway.generate_key_pair().await),
        "/rsa/dec" => match parse_json(content_type, &body) {
            Ok(request) => result_response(StatusCode::OK, gateway.rsa_decrypt(request)),
            Err(response) => response,
        },
        "/rsa/enc" => match parse_json(content_type, &body) {
            Ok(request) => result_response(StatusCode::OK, gateway.rsa_encrypt(request)),
            Err(response) => response,
        },
        "/aes/dec" => match parse_json(content_type, &body) {
            Ok(request) => result_response(StatusCode::OK, gateway.aes_decrypt(request)),
            Err(response) => response,
        },
        "/envelope/open" => match parse_json(content_type, &body) {
            Ok(request) => result_response(StatusCode::OK, gateway.open_envelope(request)),
            Err(response) => response,
        },
        path if is_known_route(path) => error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed".to_string(),
        ),
        _ => error_response(StatusCode::NOT_FOUND, "Not found".to_string()),
    }
}

fn is_known_route(path: &str) -> bool {
    matches!(
        path,
        "/" | "/health"
            | "/rpc"
            | "/rpc/"
            | "/rsa"
            | "/rsa/"
            | "/rsa/pub"
            | "/rsa/dec"
            | "/rsa/enc"
            | "/aes/dec"
            | "/envelope/open"
    )
}

/// Decodes a single JSON object, rejecting other content types
fn parse_json<T: DeserializeOwned>(
    content_type: Option<&str>,
    body: &[u8],
) -> std::result::Result<T, Response<Full<Bytes>>> {
    if !content_type.is_some_and(|t| t.starts_with(JSON)) {
        return Err(error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "content-type is not application/json".to_string(),
        ));
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "body must not be empty".to_string(),
        ));
    }
    serde_json::from_slice(body).map_err(|e| {
        let message = if e.is_eof() || e.is_syntax() {
            format!("malformed json: {}", e)
        } else {
            format!("invalid request: {}", e)
        };
        error_response(StatusCode::BAD_REQUEST, message)
    })
}

/// HTTP status for a gateway error
pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::NoKeyAvailable => StatusCode::NOT_FOUND,
        GatewayError::KeyParse(_)
        | GatewayError::UnwrapFailed
        | GatewayError::InvalidKeyLength(_)
        | GatewayError::AuthenticationFailed
        | GatewayError::MalformedPayload(_)
        | GatewayError::Encoding(_)
        | GatewayError::MessageTooLong { .. }
        | GatewayError::Rpc(_) => StatusCode::BAD_REQUEST,
        GatewayError::KeyGeneration(_)
        | GatewayError::Random
        | GatewayError::Io(_)
        | GatewayError::Serialization(_)
        | GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn result_response<T: Serialize>(
    status: StatusCode,
    result: crate::error::Result<T>,
) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => json_response(status, &value),
        Err(e) => {
            warn!(kind = e.kind(), "Request failed");
            error_response(status_for(&e), e.to_string())
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, JSON, Bytes::from(body)),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn error_response(status: StatusCode, message: String) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    respond(status, JSON, Bytes::from(body))
}

fn respond(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn preflight() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Accept, Authorization, Content-Type, X-CSRF-Token, Location"),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("300"));
    response
}

/// Adds CORS headers when the request comes from the allowed origin
fn apply_cors(
    allowed_origin: &str,
    origin: Option<&HeaderValue>,
    response: &mut Response<Full<Bytes>>,
) {
    let Some(origin) = origin else {
        return;
    };
    if allowed_origin != "*" && origin.as_bytes() != allowed_origin.as_bytes() {
        return;
    }

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Link, Location"),
    );
}
