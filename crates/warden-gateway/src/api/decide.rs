//! The decision surface: `/decide`, `/decide/:id`, `/await/:id`, `/events`.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use warden_core::{ActionDraft, ActionEvent, EventId, Verdict};
use warden_engine::{ConsentError, WaitOutcome};
use warden_journal::JournalRecord;
use warden_tokens::IssueRequest;

use crate::api::{api_error, overloaded};
use crate::auth;
use crate::state::AppState;

/// `POST /decide` — run an action through the decision pipeline.
///
/// Authentication: an API key, or a valid agent token in the body.
pub async fn decide(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<ActionDraft>,
) -> Response {
    let token_is_valid = draft
        .token
        .as_deref()
        .is_some_and(|t| state.tokens.introspect(t).active);
    if !token_is_valid && !auth::key_is_valid(&state.api_key_hashes, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "invalid or missing API key");
    }

    if draft.intent.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "intent must not be empty");
    }

    let mut event = ActionEvent::from_draft(draft, &state.clock);
    let decision = state.engine.decide(&mut event).await;

    let record = JournalRecord::Event {
        event,
        status: decision.status,
        policy: decision.policy.clone(),
    };
    if let Err(e) = state.record(record) {
        tracing::error!(error = %e, "journal append failed, refusing decision");
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "journal unavailable");
    }

    Json(decision).into_response()
}

/// Body of the dashboard's `POST /decide/:id`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanVerdictRequest {
    /// `allow` or `block`.
    verdict: Verdict,
    /// Issue a token alongside an allow.
    #[serde(default)]
    grant_token: Option<GrantTokenRequest>,
    /// Optional reason attached to the decision.
    #[serde(default)]
    reason: Option<String>,
}

/// Token grant riding on a human allow.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantTokenRequest {
    /// Scopes for the granted token; defaults to the asked intent.
    #[serde(default)]
    scopes: Option<Vec<String>>,
    /// Lifetime in seconds; defaults to one hour.
    #[serde(default)]
    duration_sec: Option<u64>,
}

/// `POST /decide/:id` — inject the human verdict for a parked ask.
pub async fn human_verdict(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<HumanVerdictRequest>,
) -> Response {
    let event_id = EventId::new(id);
    let broker = state.engine.consent();

    let Some(agent) = broker.agent_of(&event_id) else {
        return api_error(StatusCode::NOT_FOUND, "unknown event");
    };

    // Repeats are settled up front: the same verdict is a no-op, a
    // conflicting one is rejected, and no second token is issued.
    if let Some(existing) = broker.verdict_of(&event_id) {
        if existing.status == request.verdict {
            return Json(serde_json::json!({ "ok": true, "status": existing.status }))
                .into_response();
        }
        return api_error(StatusCode::CONFLICT, "approval already decided");
    }

    // An allow may carry a freshly issued token back to the waiting agent.
    let granted = if request.verdict == Verdict::Allow {
        match &request.grant_token {
            Some(grant) => {
                let scopes = grant.scopes.clone().unwrap_or_else(|| {
                    broker
                        .intent_of(&event_id)
                        .map_or_else(Vec::new, |intent| vec![intent])
                });
                let issued = state
                    .tokens
                    .issue(IssueRequest {
                        agent: agent.clone(),
                        scopes,
                        duration_secs: grant.duration_sec.unwrap_or(3600),
                        reason: "granted with consent".to_string(),
                        created_by: None,
                        tags: BTreeMap::new(),
                    })
                    .await;
                match issued {
                    Ok(token) => Some(token),
                    Err(e) => return api_error(StatusCode::BAD_REQUEST, e.to_string()),
                }
            },
            None => None,
        }
    } else {
        None
    };

    match broker.decide(&event_id, request.verdict, granted.clone(), request.reason.clone()) {
        Ok(verdict) => {
            let ts = state.clock.now();
            if let Some(token) = granted {
                let _ = state.record(JournalRecord::Token {
                    ts,
                    action: warden_journal::TokenAction::Issued,
                    token,
                });
            }
            if let Err(e) = state.record(JournalRecord::Decision {
                id: event_id,
                ts,
                status: verdict.status,
                reason: verdict.reason.clone(),
            }) {
                tracing::error!(error = %e, "journal append failed for decision");
                return api_error(StatusCode::SERVICE_UNAVAILABLE, "journal unavailable");
            }
            Json(serde_json::json!({ "ok": true, "status": verdict.status })).into_response()
        },
        Err(ConsentError::NotFound) => api_error(StatusCode::NOT_FOUND, "unknown event"),
        Err(ConsentError::AlreadyDecided) => {
            api_error(StatusCode::CONFLICT, "approval already decided")
        },
        Err(ConsentError::InvalidVerdict) => {
            api_error(StatusCode::BAD_REQUEST, "verdict must be allow or block")
        },
        Err(ConsentError::Overloaded) => overloaded("too many pending approvals"),
    }
}

/// `POST /await/:id` — long-poll the consent broker for the verdict.
///
/// The caller may shorten its own wait via the `x-wait-timeout` header
/// (seconds); waits are clamped to the broker's ceiling.
pub async fn await_verdict(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let broker = state.engine.consent();
    let ceiling = broker.ticket_timeout();
    let timeout = headers
        .get("x-wait-timeout")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(ceiling, |secs| Duration::from_secs(secs).min(ceiling));

    match broker.wait(&EventId::new(id), Some(timeout)).await {
        Err(_) => api_error(StatusCode::NOT_FOUND, "unknown event"),
        Ok(WaitOutcome::Decided(verdict)) => {
            let mut body = serde_json::json!({ "status": verdict.status });
            if let Some(token) = verdict.token {
                body["token"] = serde_json::json!(token);
            }
            if let Some(reason) = verdict.reason {
                body["message"] = serde_json::json!(reason);
            }
            Json(body).into_response()
        },
        Ok(WaitOutcome::CallerTimeout) => Json(serde_json::json!({
            "status": Verdict::Block,
            "message": "timeout waiting for approval",
        }))
        .into_response(),
    }
}

/// `POST /events` — record a post-hoc event the agent never asked about.
pub async fn record_event(
    State(state): State<AppState>,
    Json(draft): Json<ActionDraft>,
) -> Response {
    if draft.intent.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "intent must not be empty");
    }
    let event = ActionEvent::from_draft(draft, &state.clock);

    // Post-hoc costs still count toward the spend totals, uncapped — the
    // action already happened.
    let _ = state.engine.ledger().check_and_record(
        &event.agent,
        event.is_llm_intent(),
        event.cost_usd,
        None,
    );

    let record = JournalRecord::Event {
        event,
        status: Verdict::Allow,
        policy: None,
    };
    if let Err(e) = state.record(record) {
        tracing::error!(error = %e, "journal append failed for post-hoc event");
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "journal unavailable");
    }
    Json(serde_json::json!({})).into_response()
}
