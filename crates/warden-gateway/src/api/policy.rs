//! Templates, roles, and the dry-run test surfaces.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use warden_core::AgentId;
use warden_journal::JournalRecord;
use warden_policy::{FilterLevel, ResolvedPolicy, RoleOverrides};

use crate::api::api_error;
use crate::state::AppState;

/// `GET /templates`.
pub async fn list_templates(State(state): State<AppState>) -> Response {
    let templates: Vec<_> = state
        .templates
        .list()
        .iter()
        .map(|t| t.as_ref().clone())
        .collect();
    Json(serde_json::json!({ "templates": templates })).into_response()
}

/// Body of `POST /templates/validate`.
#[derive(Debug, Deserialize)]
pub struct ValidateBody {
    yaml: String,
}

/// `POST /templates/validate`.
pub async fn validate_template(
    State(state): State<AppState>,
    Json(body): Json<ValidateBody>,
) -> Response {
    Json(state.templates.validate_yaml(&body.yaml)).into_response()
}

/// Body of `POST /roles/apply`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRoleBody {
    agent_id: AgentId,
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    overrides: Option<RoleOverrides>,
}

/// `POST /roles/apply` — bind an agent to a template plus overrides.
pub async fn apply_role(
    State(state): State<AppState>,
    Json(body): Json<ApplyRoleBody>,
) -> Response {
    let template = match &body.template {
        Some(name) => match state.templates.get(name) {
            Some(template) => Some(template),
            None => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(serde_json::json!({
                        "ok": false,
                        "error": format!("unknown template: {name}"),
                    })),
                )
                    .into_response();
            },
        },
        None => None,
    };

    let applied = state
        .resolver
        .apply(
            &body.agent_id,
            template.as_deref(),
            body.overrides.unwrap_or_default(),
        )
        .await;

    match applied {
        Ok(policy) => {
            if let Err(e) = state.record(JournalRecord::RoleApplied {
                ts: state.clock.now(),
                agent: body.agent_id.clone(),
                template: policy.template.clone(),
            }) {
                tracing::warn!(error = %e, "journal append failed for role application");
            }
            Json(serde_json::json!({ "ok": true, "policy": policy.as_ref() })).into_response()
        },
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "ok": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// `GET /roles`.
pub async fn list_roles(State(state): State<AppState>) -> Response {
    let roles: Vec<_> = state
        .resolver
        .list()
        .into_iter()
        .map(|(agent, policy)| {
            serde_json::json!({ "agentId": agent, "policy": policy.as_ref() })
        })
        .collect();
    Json(serde_json::json!({ "roles": roles })).into_response()
}

/// `GET /roles/:agent_id`.
pub async fn get_role(State(state): State<AppState>, Path(agent_id): Path<String>) -> Response {
    match state.resolver.get(&AgentId::new(agent_id)) {
        Some(policy) => Json(policy.as_ref().clone()).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "no role bound for agent"),
    }
}

/// Body of `POST /policy/test`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTestBody {
    agent: AgentId,
    intent: String,
    #[serde(default)]
    target: Option<String>,
    /// Ad-hoc policy to evaluate instead of the agent's binding.
    #[serde(default)]
    policy: Option<ResolvedPolicy>,
}

/// `POST /policy/test` — dry run; no journal entry, no side effects.
pub async fn test_policy(
    State(state): State<AppState>,
    Json(body): Json<PolicyTestBody>,
) -> Response {
    let report = state.engine.test_policy(
        &body.agent,
        &body.intent,
        body.target.as_deref(),
        body.policy.as_ref(),
    );
    let mut out = serde_json::json!({ "ok": true });
    if let (serde_json::Value::Object(map), serde_json::Value::Object(extra)) =
        (&mut out, serde_json::json!(report))
    {
        map.extend(extra);
    }
    Json(out).into_response()
}

/// Body of `POST /input-filter/test`.
#[derive(Debug, Deserialize)]
pub struct FilterTestBody {
    content: String,
    policy: FilterLevel,
}

/// `POST /input-filter/test`.
pub async fn test_filter(
    State(state): State<AppState>,
    Json(body): Json<FilterTestBody>,
) -> Response {
    let report = state.engine.filter().scan(&body.content, body.policy);
    let mut out = serde_json::json!({ "ok": true, "policy": body.policy });
    if let (serde_json::Value::Object(map), serde_json::Value::Object(extra)) =
        (&mut out, serde_json::json!(report))
    {
        map.extend(extra);
    }
    Json(out).into_response()
}
