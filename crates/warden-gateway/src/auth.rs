//! API-key authentication.
//!
//! Keys are hashed once at startup; every request's presented key is
//! SHA-256'd and compared in constant time, so neither key length nor
//! prefix leaks through timing. With no keys configured the daemon runs in
//! dev mode and accepts everything (a startup warning says so).

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Hash the configured API keys for constant-time comparison.
#[must_use]
pub fn hash_keys(keys: &[String]) -> Vec<[u8; 32]> {
    keys.iter()
        .map(|key| {
            let digest = Sha256::digest(key.as_bytes());
            digest.into()
        })
        .collect()
}

/// Extract the presented API key from `Authorization: Bearer` or
/// `x-api-key`.
#[must_use]
pub fn presented_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("authorization") {
        if let Ok(text) = value.to_str() {
            if let Some(token) = text.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Whether the presented key matches any configured key. Always true in
/// dev mode (no keys configured).
#[must_use]
pub fn key_is_valid(hashes: &[[u8; 32]], headers: &HeaderMap) -> bool {
    if hashes.is_empty() {
        return true;
    }
    let Some(presented) = presented_key(headers) else {
        return false;
    };
    let digest: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
    hashes
        .iter()
        .any(|expected| bool::from(digest.as_slice().ct_eq(expected.as_slice())))
}

/// Middleware enforcing an API key on protected routes.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if key_is_valid(&state.api_key_hashes, request.headers()) {
        return next.run(request).await;
    }
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({ "error": "invalid or missing API key" })),
    )
        .into_response()
}
