//! Webhooks, metrics, the scope taxonomy, and liveness.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use warden_events::WebhookTarget;

use crate::api::api_error;
use crate::state::AppState;

/// `GET /healthz` — liveness, no auth.
pub async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

/// Body of `POST /webhooks` and `DELETE /webhooks`.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    url: String,
    #[serde(default)]
    secret: Option<String>,
}

fn webhook_list(state: &AppState) -> serde_json::Value {
    json!(state
        .webhooks
        .list()
        .iter()
        .map(|t| t.url.clone())
        .collect::<Vec<_>>())
}

/// `GET /webhooks`.
pub async fn list_webhooks(State(state): State<AppState>) -> Response {
    Json(json!({ "ok": true, "webhooks": webhook_list(&state) })).into_response()
}

/// `POST /webhooks`.
pub async fn add_webhook(State(state): State<AppState>, Json(body): Json<WebhookBody>) -> Response {
    if !body.url.starts_with("http://") && !body.url.starts_with("https://") {
        return api_error(StatusCode::BAD_REQUEST, "url must be http(s)");
    }
    if let Err(e) = state
        .webhooks
        .add(WebhookTarget {
            url: body.url,
            secret: body.secret,
        })
        .await
    {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
    }
    Json(json!({ "ok": true, "webhooks": webhook_list(&state) })).into_response()
}

/// `DELETE /webhooks`.
pub async fn remove_webhook(
    State(state): State<AppState>,
    Json(body): Json<WebhookBody>,
) -> Response {
    if let Err(e) = state.webhooks.remove(&body.url).await {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
    }
    Json(json!({ "ok": true, "webhooks": webhook_list(&state) })).into_response()
}

/// `GET /metrics/llm` — per-agent spend against configured limits.
pub async fn llm_metrics(State(state): State<AppState>) -> Response {
    let summary: Vec<_> = state
        .engine
        .ledger()
        .summary()
        .into_iter()
        .map(|row| {
            let limits = state
                .resolver
                .get(&row.agent)
                .and_then(|policy| policy.limits.clone());
            json!({
                "agent": row.agent,
                "dailyUsd": row.llm_daily_usd,
                "monthlyUsd": row.llm_monthly_usd,
                "totalDailyUsd": row.total_daily_usd,
                "totalMonthlyUsd": row.total_monthly_usd,
                "limits": limits,
            })
        })
        .collect();
    Json(json!({ "summary": summary })).into_response()
}

/// `GET /metrics/chaos` — injection counters and chaos-enabled agents.
pub async fn chaos_metrics(State(state): State<AppState>) -> Response {
    let stats = state.engine.chaos().stats();
    let agents_with_chaos: Vec<_> = state
        .resolver
        .list()
        .into_iter()
        .filter(|(_, policy)| policy.chaos.as_ref().is_some_and(|c| c.enabled))
        .map(|(agent, _)| agent)
        .collect();

    Json(json!({
        "stats": stats,
        "agentsWithChaos": agents_with_chaos,
        "chaosInjectionRate": stats.injection_rate(),
    }))
    .into_response()
}

/// `GET /scopes` — the authoritative scope taxonomy.
pub async fn scopes() -> Response {
    let scopes: serde_json::Map<String, serde_json::Value> = warden_core::scope_catalog()
        .iter()
        .map(|(id, description)| ((*id).to_string(), json!(description)))
        .collect();
    Json(json!({ "scopes": scopes })).into_response()
}
