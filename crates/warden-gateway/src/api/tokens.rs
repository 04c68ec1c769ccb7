//! The token surface.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::collections::BTreeMap;

use warden_core::AgentId;
use warden_journal::{JournalRecord, TokenAction};
use warden_tokens::{IssueRequest, Token, TokenError};

use crate::api::api_error;
use crate::state::AppState;

/// Body of `POST /tokens/issue`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueBody {
    agent: AgentId,
    scopes: Vec<String>,
    duration_sec: u64,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    created_by: Option<String>,
    /// Everything else rides along as tags (customer, subscription, ...).
    #[serde(flatten)]
    tags: BTreeMap<String, serde_json::Value>,
}

/// Body of the single-token endpoints.
#[derive(Debug, Deserialize)]
pub struct TokenBody {
    token: String,
}

/// `POST /tokens/issue`.
pub async fn issue(State(state): State<AppState>, Json(body): Json<IssueBody>) -> Response {
    let tags: BTreeMap<String, String> = body
        .tags
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect();

    let issued = state
        .tokens
        .issue(IssueRequest {
            agent: body.agent,
            scopes: body.scopes,
            duration_secs: body.duration_sec,
            reason: body.reason.unwrap_or_default(),
            created_by: body.created_by,
            tags,
        })
        .await;

    match issued {
        Ok(token) => {
            journal_transition(&state, TokenAction::Issued, token.clone());
            Json(serde_json::json!({ "token": token })).into_response()
        },
        Err(e @ (TokenError::DurationOutOfRange { .. } | TokenError::InvalidScope(_))) => {
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        },
        Err(e) => api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

/// `POST /tokens/introspect`. Never reveals why a token is inactive.
pub async fn introspect(State(state): State<AppState>, Json(body): Json<TokenBody>) -> Response {
    Json(state.tokens.introspect(&body.token)).into_response()
}

/// `POST /tokens/pause`.
pub async fn pause(State(state): State<AppState>, Json(body): Json<TokenBody>) -> Response {
    transition(&state, &body.token, TokenAction::Paused).await
}

/// `POST /tokens/resume`.
pub async fn resume(State(state): State<AppState>, Json(body): Json<TokenBody>) -> Response {
    transition(&state, &body.token, TokenAction::Resumed).await
}

/// `POST /tokens/revoke`.
pub async fn revoke(State(state): State<AppState>, Json(body): Json<TokenBody>) -> Response {
    transition(&state, &body.token, TokenAction::Revoked).await
}

/// `GET /tokens/list`.
pub async fn list(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({ "tokens": state.tokens.list() })).into_response()
}

async fn transition(state: &AppState, token_str: &str, action: TokenAction) -> Response {
    let result = match action {
        TokenAction::Paused => state.tokens.pause(token_str).await,
        TokenAction::Resumed => state.tokens.resume(token_str).await,
        TokenAction::Revoked => state.tokens.revoke(token_str).await,
        TokenAction::Issued => unreachable!("issue has its own handler"),
    };

    match result {
        Ok(token) => {
            journal_transition(state, action, token);
            Json(serde_json::json!({ "ok": true })).into_response()
        },
        Err(TokenError::NotFound) => api_error(StatusCode::NOT_FOUND, "unknown token"),
        Err(TokenError::Revoked) => api_error(StatusCode::CONFLICT, "token is revoked"),
        Err(e) => api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

fn journal_transition(state: &AppState, action: TokenAction, token: Token) {
    if let Err(e) = state.record(JournalRecord::Token {
        ts: state.clock.now(),
        action,
        token,
    }) {
        tracing::warn!(error = %e, "journal append failed for token transition");
    }
}
